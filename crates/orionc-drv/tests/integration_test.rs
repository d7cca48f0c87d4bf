//! CLI-level integration tests: invokes the `orionc` binary directly and
//! inspects its exit code, stdout/stderr, and the emitted `.c` file.
//!
//! Covers the CLI contract (`spec.md` §6) and the six end-to-end scenarios
//! of `spec.md` §8, each asserted by substring rather than full-text
//! equality so incidental whitespace changes in the emitter don't break
//! these tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn orionc() -> Command {
    Command::cargo_bin("orionc").expect("binary should build")
}

fn write_source(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn prints_usage_on_help() {
    orionc()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn prints_version_triple() {
    orionc()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_source_file_exits_nonzero() {
    orionc().arg("no_such_file.l").assert().failure();
}

#[test]
fn scenario_arithmetic_and_print() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "main.l", "main { a = 2; b = 3; print a + b; }");
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("int main(void)"));
    assert!(c.contains("printf"));
}

#[test]
fn scenario_if_else() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "main.l",
        "main { x = 10; if (x > 5) { print \"big\"; } else { print \"small\"; } }",
    );
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("if ("));
    assert!(c.contains("else"));
}

#[test]
fn scenario_class_and_method() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "main.l",
        "class Point { x: int; y: int; func dist() -> int { return self.x + self.y; } } \
         main { p = new Point(); p.x = 3; p.y = 4; print p.dist(); }",
    );
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("struct Point {"));
    assert!(c.contains("static Point* new_Point(void)"));
    assert!(c.contains("static int Point_dist(Point* self)"));
}

#[test]
fn scenario_try_catch() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "main.l",
        "main { try { throw \"ValidationError: bad\"; } catch (e) { print e; } }",
    );
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("setjmp"));
    assert!(c.contains("longjmp"));
}

#[test]
fn scenario_aliased_module_import() {
    let dir = TempDir::new().unwrap();
    write_source(
        &dir,
        "math_lib.l",
        "module math_lib\nexport func multiply(a, b) { return a * b; }\n",
    );
    let src = write_source(
        &dir,
        "main.l",
        "import math_lib as m\nmain { print m.multiply(4, 5); }",
    );
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("extern void math_lib_multiply(void);"));
    assert!(c.contains("math_lib_multiply(4, 5)"));
}

#[test]
fn scenario_for_range() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "main.l", "main { for (i in range(1, 4)) { print i; } }");
    let out = dir.path().join("main.c");

    orionc().arg(&src).arg("-o").arg(&out).assert().success();

    let c = fs::read_to_string(&out).unwrap();
    assert!(c.contains("for ("));
}

#[test]
fn syntax_error_exits_nonzero_and_reports_diagnostic() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "broken.l", "main { x = ; }");
    let out = dir.path().join("broken.c");

    orionc()
        .arg(&src)
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn default_output_path_replaces_extension_with_c() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "main.l", "main { print 1; }");

    orionc().arg(&src).assert().success();

    assert!(dir.path().join("main.c").exists());
}
