//! Routine app E2E acceptance runner.
#![forbid(unsafe_code)]

#[cfg(feature = "chromium")]
mod chromium;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use routine_e2e_common::config::{DEFAULT_DOTENV_FILE, normalize_base_url};
use routine_e2e_common::report::write_report;
use routine_e2e_common::schedule::expected_for_case;
use routine_e2e_common::{
    BUILTIN_CASES, CoverageMode, RunConfig, RunError, RunOptions, RunReport, ScenarioCase,
    Schedule, SessionCookie, SessionPlan, plan_session, validate_catalog,
};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "routine-e2e",
    author,
    version,
    about = "End-to-end acceptance runs for the routine app"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Environment file consulted for unset variables
    #[arg(long, global = true, default_value = DEFAULT_DOTENV_FILE)]
    env_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scenario catalog against the application
    Run {
        /// Application URL (overrides ROUTINE_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,

        /// Results file (overrides ROUTINE_RESULTS_PATH)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Assignee allocation seed (overrides ROUTINE_E2E_SEED)
        #[arg(long)]
        seed: Option<u64>,

        /// Coverage handling: enforce or report
        #[arg(long, value_parser = parse_coverage)]
        coverage: Option<CoverageMode>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// List the scenario catalog
    Cases {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the routine instances each case is expected to generate
    Plan {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_coverage(value: &str) -> Result<CoverageMode, String> {
    value.parse()
}

fn init_logging(level: &str, verbose: bool, log_json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json_layer = log_json.then(|| fmt::layer().json());
    let text_layer = (!log_json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            base_url,
            results,
            seed,
            coverage,
            headed,
        } => {
            let mut config = RunConfig::load(&cli.env_file)?;
            config
                .base_url
                .override_with(base_url.map(|url| normalize_base_url(&url)));
            config.results_path.override_with(results);
            config.seed.override_with(seed.map(Some));
            config.coverage.override_with(coverage);
            config.headless.override_with(headed.then_some(false));

            init_logging(&config.log_level.value, cli.verbose, cli.log_json);
            config.log_sources();

            if let Err(e) = run(config).await {
                error!(error = %e, "Run failed");
                return Err(e);
            }
        }
        Commands::Cases { json } => {
            init_logging("info", cli.verbose, cli.log_json);
            validate_catalog(&BUILTIN_CASES)?;
            print_cases(&BUILTIN_CASES, json)?;
        }
        Commands::Plan { json } => {
            init_logging("info", cli.verbose, cli.log_json);
            validate_catalog(&BUILTIN_CASES)?;
            print_plan(&BUILTIN_CASES, json)?;
        }
    }

    Ok(())
}

async fn run(config: RunConfig) -> Result<()> {
    validate_catalog(&BUILTIN_CASES)?;

    let cookie = match plan_session(
        &config.base_url.value,
        config.session_cookie.value.as_deref(),
    )? {
        SessionPlan::Skip { reason } => {
            warn!(%reason, "SKIP: no session available");
            return Ok(());
        }
        SessionPlan::Inject(cookie) => cookie,
    };

    let seed = config.resolve_seed();
    info!(seed, cases = BUILTIN_CASES.len(), "Starting run");

    let options = RunOptions {
        base_url: config.base_url.value.clone(),
        seed,
        coverage: config.coverage.value,
        timeouts: config.timeouts(),
    };

    let results_path = config.results_path.value.clone();
    match drive(&config, &cookie, options).await? {
        Ok(report) => {
            persist(&results_path, &report)?;
            info!(
                total = report.total_cases(),
                used = report.coverage.used_count,
                candidates = report.coverage.candidate_count,
                "Run complete"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                persist(&results_path, report)?;
            }
            if let RunError::CaseFailed { completed, .. } = &err {
                info!(passed = completed.len(), "Cases passed before the failure");
            }
            Err(err.into())
        }
    }
}

fn persist(results_path: &Path, report: &RunReport) -> Result<()> {
    write_report(results_path, report)?;
    info!(path = %results_path.display(), "Results written");
    Ok(())
}

#[cfg(feature = "chromium")]
async fn drive(
    config: &RunConfig,
    cookie: &SessionCookie,
    options: RunOptions,
) -> Result<Result<RunReport, RunError>> {
    use routine_e2e_common::{RunController, establish};

    let mut ui = chromium::ChromiumUi::launch(config.headless.value).await?;
    let outcome = async {
        establish(&mut ui, &options.base_url, cookie, &options.timeouts).await?;
        let mut controller = RunController::new(options);
        Ok::<_, anyhow::Error>(controller.run(&mut ui, &BUILTIN_CASES).await)
    }
    .await;
    ui.close().await;
    outcome
}

#[cfg(not(feature = "chromium"))]
async fn drive(
    _config: &RunConfig,
    _cookie: &SessionCookie,
    _options: RunOptions,
) -> Result<Result<RunReport, RunError>> {
    Err(routine_e2e_common::E2eError::Config(
        "no browser backend; rebuild with `--features chromium`".to_string(),
    )
    .into())
}

fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Spot { due_date } => format!("due {due_date}"),
        Schedule::Window {
            week_of_month,
            start_month,
            end_month,
        } => format!("week {week_of_month}, {start_month}..{end_month}"),
    }
}

fn print_cases(cases: &[ScenarioCase], as_json: bool) -> Result<()> {
    if as_json {
        let rows: Vec<_> = cases
            .iter()
            .map(|case| {
                json!({
                    "id": case.id,
                    "frequency": case.frequency,
                    "kind": case.kind,
                    "assignees": case.kind.required_assignees(),
                    "schedule": describe_schedule(&case.schedule),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<6} {:<10} {:<11} SCHEDULE", "ID", "FREQUENCY", "KIND");
    for case in cases {
        println!(
            "{:<6} {:<10} {:<11} {}",
            case.id,
            case.frequency,
            case.kind,
            describe_schedule(&case.schedule)
        );
    }
    Ok(())
}

fn print_plan(cases: &[ScenarioCase], as_json: bool) -> Result<()> {
    if as_json {
        let rows: Vec<_> = cases
            .iter()
            .map(|case| {
                let dates: Vec<String> = expected_for_case(case)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                json!({ "id": case.id, "instances": dates })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for case in cases {
        let dates = expected_for_case(case);
        let listed: Vec<String> = dates.iter().map(ToString::to_string).collect();
        println!("{} ({} instance(s)): {}", case.id, dates.len(), listed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "routine-e2e",
            "run",
            "--seed",
            "42",
            "--coverage",
            "report",
            "--headed",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                seed,
                coverage,
                headed,
                ..
            } => {
                assert_eq!(seed, Some(42));
                assert_eq!(coverage, Some(CoverageMode::Report));
                assert!(headed);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_bad_coverage_is_rejected() {
        assert!(Cli::try_parse_from(["routine-e2e", "run", "--coverage", "maybe"]).is_err());
    }

    #[test]
    fn test_case_table_columns_are_padded() {
        let case = &BUILTIN_CASES[0];
        let row = format!("{:<6} {:<10} {:<11}|", case.id, case.frequency, case.kind);
        assert_eq!(row, "O-01   monthly    individual |");
    }

    #[test]
    fn test_describe_schedule() {
        assert_eq!(
            describe_schedule(&BUILTIN_CASES[0].schedule),
            "week 1, 2026-02..2026-02"
        );
    }
}
