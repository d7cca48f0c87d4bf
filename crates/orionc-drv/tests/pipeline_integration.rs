//! Pipeline-level integration tests against `orionc_drv::Session` directly,
//! exercising stages the CLI-level tests in `integration_test.rs` don't
//! reach on their own: optimizer level selection, rewrite statistics, and
//! module-resolution failure paths.

use orionc_drv::{Config, Session};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn opt_level_zero_runs_no_optimizer_passes() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "main.l", "main { x = 1 + 2; print x; }");
    let session = Session::new();
    let config = Config {
        opt_level: 0,
        ..Config::default()
    };
    let report = session.compile(&src, &config).unwrap();
    assert_eq!(report.rewrite_stats.constant_folds, 0);
}

#[test]
fn opt_level_one_folds_constants() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "main.l", "main { x = 1 + 2; print x; }");
    let session = Session::new();
    let config = Config {
        opt_level: 1,
        ..Config::default()
    };
    let report = session.compile(&src, &config).unwrap();
    assert!(report.rewrite_stats.constant_folds >= 1);
}

#[test]
fn missing_imported_module_reports_an_error_but_still_produces_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "main.l", "import nope\nmain { print 1; }");
    let session = Session::new();
    let config = Config::default();
    let report = session.compile(&src, &config).expect("compile should return a report");
    assert!(report.error_count > 0);
}

#[test]
fn composition_hoists_a_wrapper_function() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(
        &dir,
        "main.l",
        "func inc(x: int) -> int { return x + 1; } \
         func dbl(x: int) -> int { return x * 2; } \
         main { f = inc >> dbl; print f(3); }",
    );
    let session = Session::new();
    let config = Config::default();
    let report = session.compile(&src, &config).expect("compile should succeed");
    assert_eq!(report.error_count, 0);
    let stats = report.codegen_stats.expect("emission should have run");
    assert_eq!(stats.compositions_hoisted, 1);
    let generated = fs::read_to_string(&report.output_path).unwrap();
    assert!(generated.contains("compose_0"));
}

#[test]
fn debug_level_three_dumps_generated_source_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "main.l", "main { print \"hi\"; }");
    let session = Session::new();
    let config = Config {
        debug_level: 3,
        ..Config::default()
    };
    let report = session.compile(&src, &config).expect("compile should succeed");
    assert_eq!(report.error_count, 0);
}

#[test]
fn output_path_override_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "main.l", "main { print 1; }");
    let custom_out = dir.path().join("custom.c");
    let session = Session::new();
    let config = Config {
        output: Some(custom_out.clone()),
        ..Config::default()
    };
    let report = session.compile(&src, &config).unwrap();
    assert_eq!(report.output_path, custom_out);
    assert!(custom_out.exists());
}
