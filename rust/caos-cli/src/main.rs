//! CAOS CLI: check, run and test CAOS script files.

use caos_cli::colors::{bold, cyan, gray, green, red, status_label, yellow};
use caos_cli::config::{CaosConfig, CONFIG_FILE};
use caos_cli::test_cmd;
use caos_compiler::Dialect;
use caos_runtime::Harness;
use clap::{Parser as ClapParser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "caos", version, about = "The CAOS agent scripting engine")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a .cos file and report syntax and name errors
    Check {
        file: PathBuf,
        /// Dialect to parse with (default: [vm] dialect from caos.toml, else c3)
        #[arg(long, short)]
        dialect: Option<String>,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a .cos file's installer in a fresh world
    Run {
        file: PathBuf,
        #[arg(long, short)]
        dialect: Option<String>,
        /// Keep the world ticking this many times after the installer finishes
        #[arg(long, default_value_t = 0)]
        ticks: u64,
    },
    /// Run .cos files (or directories of them) and report assertion failures
    Test {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, short)]
        dialect: Option<String>,
        /// Show script output
        #[arg(long)]
        show_output: bool,
    },
    /// List the supported dialects
    Dialects,
    /// Create a caos.toml config file in the current directory
    Init,
}

fn main() {
    let cli = Cli::parse();
    let config = CaosConfig::load();
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Check { file, dialect, json } => cmd_check(&file, resolve(&config, dialect), json),
        Commands::Run { file, dialect, ticks } => cmd_run(&file, resolve(&config, dialect), &config, ticks),
        Commands::Test { paths, dialect, show_output } => {
            cmd_test(&paths, resolve(&config, dialect), &config, show_output)
        }
        Commands::Dialects => cmd_dialects(),
        Commands::Init => cmd_init(),
    }
}

fn init_logging(config: &CaosConfig, verbosity: u8) {
    let level = match verbosity {
        0 => config.log.level.clone().unwrap_or_else(|| "warn".to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn resolve(config: &CaosConfig, explicit: Option<String>) -> Dialect {
    config.dialect(explicit.as_deref()).unwrap_or_else(|e| {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(2);
    })
}

fn read_source(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("{} cannot read file '{}': {}", red("error:"), bold(&path.display().to_string()), e);
        std::process::exit(1);
    })
}

fn cmd_check(file: &Path, dialect: Dialect, json: bool) {
    let source = read_source(file);
    let filename = file.display().to_string();
    let result = caos_compiler::parse_dialect(dialect, &source);

    if json {
        let value = match &result {
            Ok(parsed) => serde_json::json!({
                "file": filename,
                "dialect": dialect.name(),
                "ok": true,
                "events": parsed.events.len(),
                "diagnostics": [],
            }),
            Err(e) => serde_json::json!({
                "file": filename,
                "dialect": dialect.name(),
                "ok": false,
                "diagnostics": [e.to_diagnostic(&source, &filename)],
            }),
        };
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{} {}", red("error:"), e),
        }
        if result.is_err() {
            std::process::exit(1);
        }
        return;
    }

    match result {
        Ok(parsed) => {
            println!(
                "{} {} {}",
                green("✓"),
                bold(&filename),
                gray(&format!("no errors found ({} event script(s))", parsed.events.len()))
            );
        }
        Err(e) => {
            eprint!("{}", e.to_diagnostic(&source, &filename).render_ansi());
            std::process::exit(1);
        }
    }
}

fn cmd_run(file: &Path, dialect: Dialect, config: &CaosConfig, ticks: u64) {
    let source = read_source(file);
    let filename = file.display().to_string();

    println!("{} {} ({})", status_label("Running"), filename, dialect.name());
    let mut harness = Harness::new(config.world.clone(), config.scheduler.clone());
    let report = match harness.run(dialect, &source) {
        Ok(report) => report,
        Err(e) => {
            eprint!("{}", e.to_diagnostic(&source, &filename).render_ansi());
            std::process::exit(1);
        }
    };
    print!("{}", report.output);

    let mut event_faults = report.event_faults.len();
    for extra in 0..ticks {
        let tick = harness.scheduler.tick(&mut harness.world);
        print!("{}", tick.output);
        for failure in &tick.failures {
            eprint!("{}", failure.to_diagnostic(&source, &filename).render_ansi());
        }
        for fault in &tick.faults {
            eprintln!("{} {} ({})", red("event fault:"), fault.fault, fault.process);
        }
        event_faults += tick.faults.len();
        debug!("extra tick {} of {}", extra + 1, ticks);
    }
    if !report.output.is_empty() && !report.output.ends_with('\n') {
        println!();
    }

    for failure in &report.failures {
        eprint!("{}", failure.to_diagnostic(&source, &filename).render_ansi());
    }
    for fault in &report.event_faults {
        eprintln!("{} {} ({})", red("event fault:"), fault.fault, fault.process);
    }
    if let Some(fault) = &report.fault {
        eprint!("{}", fault.to_diagnostic(&source, &filename).render_ansi());
        std::process::exit(1);
    }
    if !report.completed {
        eprintln!("{} installer did not finish after {} tick(s)", yellow("warning:"), report.ticks);
    }
    println!(
        "{} after {} tick(s), {} assertion failure(s), {} event fault(s)",
        status_label("Finished"),
        report.ticks + ticks,
        report.failures.len(),
        event_faults
    );
}

fn cmd_test(paths: &[PathBuf], dialect: Dialect, config: &CaosConfig, show_output: bool) {
    match test_cmd::run_tests(paths, dialect, config, show_output) {
        Ok(summary) => {
            if !summary.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{} {}", red("error:"), e);
            std::process::exit(1);
        }
    }
}

fn cmd_dialects() {
    for dialect in Dialect::all() {
        println!(
            "{} {} {}",
            bold(&format!("{:<4}", dialect.name())),
            cyan(&format!("{:?}", dialect.family())),
            gray(&format!("timeslice {}", dialect.default_timeslice()))
        );
    }
}

fn cmd_init() {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        eprintln!("{} {} already exists, not overwriting", red("error:"), CONFIG_FILE);
        std::process::exit(1);
    }
    std::fs::write(&path, CaosConfig::default_template()).unwrap_or_else(|e| {
        eprintln!("{} writing {}: {}", red("error:"), CONFIG_FILE, e);
        std::process::exit(1);
    });
    println!("{} {}", status_label("Created"), CONFIG_FILE);
}
