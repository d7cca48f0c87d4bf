//! Parser benchmarks.
//!
//! Run with: `cargo bench --package orionc-par`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use orionc_par::Program;
use orionc_util::Handler;

fn parse_source(source: &str) -> Program {
    let handler = Handler::new();
    orionc_par::parse(source, &handler)
}

fn bench_parser_simple(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_simple");

    let source = "a = 42;";
    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("assignment", |b| b.iter(|| parse_source(black_box(source))));

    group.finish();
}

fn bench_parser_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_functions");

    let source = r#"
        func main() {
            x = 42;
            y = x + 1;
            return y;
        }

        func fib(n) {
            if (n <= 1) {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }
    "#;

    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("functions", |b| b.iter(|| parse_source(black_box(source))));

    group.finish();
}

fn bench_parser_classes(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_classes");

    let source = r#"
        class Point {
            x = 0;
            y = 0;
            func new(x, y) { this.x = x; this.y = y; }
            func distance_to(other) {
                dx = this.x - other.x;
                dy = this.y - other.y;
                return dx * dx + dy * dy;
            }
        }

        class Rectangle extends Point {
            width = 0;
            height = 0;
        }
    "#;

    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("classes_inheritance", |b| {
        b.iter(|| parse_source(black_box(source)))
    });

    group.finish();
}

fn bench_parser_control_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_control_flow");

    let source = r#"
        func process(n) {
            if (n < 0) {
                return -1;
            } else if (n == 0) {
                return 0;
            } else {
                switch (n) {
                    case 1: return 1;
                    case 2: return 2;
                    default: {
                        sum = 0;
                        i = 0;
                        while (i < n) {
                            sum = sum + i;
                            i = i + 1;
                        }
                        return sum;
                    }
                }
            }
        }
    "#;

    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("control_flow", |b| {
        b.iter(|| parse_source(black_box(source)))
    });

    group.finish();
}

fn bench_parser_match_and_lambda(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_match_lambda");

    let source = r#"
        func classify(n) {
            match (n) {
                case 0 => print "zero";
                case n when n > 0 => print "positive";
                case otherwise => print "negative";
            }
        }

        func main() {
            square = (x) => x * x;
            pipeline = square >> square;
            for i in range(0, 10) {
                print pipeline(i);
            }
        }
    "#;

    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("match_lambda", |b| {
        b.iter(|| parse_source(black_box(source)))
    });

    group.finish();
}

fn bench_parser_complex(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_complex");

    let source = r#"
        module geometry;

        from math_lib import sqrt, pow as power;

        class Shape {
            func area() => 0;
        }

        class Circle extends Shape {
            radius = 0;
            func area() => 3.14159 * this.radius * this.radius;
        }

        aspect Logging {
            pointcut calls = "area*";
            before calls { print "computing area"; }
            after calls { print "done"; }
        }

        macro square(x) {
            return x * x;
        }

        func main() {
            c = new Circle(5);
            try {
                print c.area();
            } catch (e) {
                print e;
            } finally {
                print "cleanup";
            }
        }
    "#;

    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("complex_source", |b| {
        b.iter(|| parse_source(black_box(source)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parser_simple,
    bench_parser_functions,
    bench_parser_classes,
    bench_parser_control_flow,
    bench_parser_match_and_lambda,
    bench_parser_complex
);
criterion_main!(benches);
