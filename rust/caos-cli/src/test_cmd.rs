//! CAOS test runner: runs script files to completion and reports every
//! assertion failure, fault and syntax error.

use crate::colors::{bold, gray, green, red, status_label};
use crate::config::CaosConfig;
use caos_compiler::Dialect;
use caos_runtime::Harness;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct TestResult {
    file: String,
    passed: bool,
    /// Rendered diagnostics, one per problem.
    problems: Vec<String>,
    output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl TestRunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub fn run_tests(
    paths: &[PathBuf],
    dialect: Dialect,
    config: &CaosConfig,
    verbose: bool,
) -> Result<TestRunSummary, String> {
    let mut test_files = Vec::new();
    for path in paths {
        collect_test_files(path, &mut test_files);
    }
    test_files.sort();
    if test_files.is_empty() {
        let searched: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        return Err(format!("no .cos files found in {}", searched.join(", ")));
    }

    println!(
        "{} {} script{} ({})",
        status_label("Running"),
        test_files.len(),
        if test_files.len() == 1 { "" } else { "s" },
        dialect.name()
    );
    let start = std::time::Instant::now();

    let results: Vec<TestResult> = test_files.iter().map(|path| run_file(path, dialect, config)).collect();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    for result in &results {
        let status = if result.passed { green("✓ ok") } else { red("✗ FAILED") };
        println!("  {} {} ... {}", gray("script"), bold(&result.file), status);
        if verbose && !result.output.is_empty() {
            for line in result.output.lines() {
                println!("    {}", gray(line));
            }
        }
    }

    if failed > 0 {
        println!("\n{}", bold("--- FAILURES ---"));
        for result in results.iter().filter(|r| !r.passed) {
            println!("  {} {}:", gray("script"), bold(&result.file));
            for problem in &result.problems {
                println!("{}", problem);
            }
        }
    }

    let elapsed = start.elapsed();
    let mark = if failed == 0 { green("✓") } else { red("✗") };
    println!("{} Finished in {:.2}s: {} passed, {} failed", mark, elapsed.as_secs_f64(), passed, failed);

    Ok(TestRunSummary { total: results.len(), passed, failed })
}

fn run_file(path: &Path, dialect: Dialect, config: &CaosConfig) -> TestResult {
    let file = path.display().to_string();
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            return TestResult {
                file,
                passed: false,
                problems: vec![format!("    cannot read file: {}", e)],
                output: String::new(),
            }
        }
    };

    let mut harness = Harness::new(config.world.clone(), config.scheduler.clone());
    let report = match harness.run(dialect, &source) {
        Ok(report) => report,
        Err(e) => {
            return TestResult {
                problems: vec![e.to_diagnostic(&source, &file).render_plain()],
                file,
                passed: false,
                output: String::new(),
            }
        }
    };

    let mut problems: Vec<String> =
        report.failures.iter().map(|f| f.to_diagnostic(&source, &file).render_plain()).collect();
    if let Some(fault) = &report.fault {
        problems.push(fault.to_diagnostic(&source, &file).render_plain());
    }
    for event in &report.event_faults {
        problems.push(format!("    {} (event script, {})", event.fault, event.process));
    }
    if !report.completed && report.fault.is_none() {
        problems.push(format!("    did not finish within {} tick(s)", report.ticks));
    }

    TestResult { file, passed: report.passed(), problems, output: report.output }
}

fn collect_test_files(path: &Path, files: &mut Vec<PathBuf>) {
    if path.is_file() {
        if is_caos_source(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                collect_test_files(&entry.path(), files);
            }
        }
    }
}

fn is_caos_source(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).map(|ext| ext.eq_ignore_ascii_case("cos")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new(prefix: &str) -> Self {
            let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
            let path = std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), stamp));
            fs::create_dir_all(&path).expect("should create temp test directory");
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn passing_and_failing_scripts_are_counted() {
        let temp = TempDir::new("caos_test_counts");
        let root = temp.path();
        fs::write(root.join("ok.cos"), "setv va00 2 dbg: asrt va00 eq 2\n").expect("should write");
        fs::write(root.join("bad.cos"), "dbg: asrt 1 eq 2\n").expect("should write");
        fs::write(root.join("broken.cos"), "doif 1 eq 1\n").expect("should write");
        fs::write(root.join("notes.txt"), "not a script").expect("should write");

        let summary =
            run_tests(&[root.to_path_buf()], Dialect::C3, &CaosConfig::default(), false).expect("tests should run");
        assert_eq!(summary, TestRunSummary { total: 3, passed: 1, failed: 2 });
        assert!(!summary.is_success());
    }

    #[test]
    fn faults_fail_the_script() {
        let temp = TempDir::new("caos_test_faults");
        let file = temp.path().join("fault.cos");
        fs::write(&file, "setv va00 1\ndivv va00 0\n").expect("should write");

        let result = run_file(&file, Dialect::C3, &CaosConfig::default());
        assert!(!result.passed);
        assert_eq!(result.problems.len(), 1);
        assert!(result.problems[0].contains("E0400"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let temp = TempDir::new("caos_test_empty");
        let err = run_tests(&[temp.path().to_path_buf()], Dialect::C3, &CaosConfig::default(), false).unwrap_err();
        assert!(err.starts_with("no .cos files"));
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(is_caos_source(Path::new("agents/Robin.COS")));
        assert!(!is_caos_source(Path::new("agents/robin.cos.bak")));
    }
}
