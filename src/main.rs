use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lumi_bdd::driver::webdriver::WebDriverFactory;
use lumi_bdd::runner::listener::Listeners;
use lumi_bdd::runner::{ConsoleEventListener, EventEmitter, EventListener, RunOutcome};
use lumi_bdd::steps::StepRegistry;
use lumi_bdd::utils::config::{HarnessConfig, TagList};
use lumi_bdd::{report, runner};

#[derive(Parser)]
#[command(name = "lumi-bdd")]
#[command(version)]
#[command(about = "Behaviour-driven UI automation for mobile and desktop apps", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run feature files
    Run {
        /// Feature files or directories (defaults to the configured feature_dirs)
        paths: Vec<PathBuf>,

        /// JSON or YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for screenshots and reports
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// WebDriver / Appium server URL
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Tag expression term; repeat for AND, separate with commas for OR
        #[arg(short, long)]
        tags: Vec<String>,

        /// Only check that every step has an implementation
        #[arg(long)]
        dry_run: bool,

        /// Leave scenarios excluded by tags out of the console output
        #[arg(long)]
        hide_skipped: bool,
    },

    /// List every available step
    Steps,

    /// Generate a report from a results.json file
    Report {
        /// Path to results.json
        results: PathBuf,

        /// Output format (html, json, junit)
        #[arg(short, long, default_value = "html")]
        format: String,

        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run {
            paths,
            config,
            artifacts,
            webdriver_url,
            tags,
            dry_run,
            hide_skipped,
        } => {
            let mut harness = match &config {
                Some(path) => HarnessConfig::from_file(path)?,
                None => HarnessConfig::default(),
            };
            if !paths.is_empty() {
                harness.feature_dirs = paths;
            }
            if artifacts.is_some() {
                harness.test_artifact_dir = artifacts;
            }
            if let Some(url) = webdriver_url {
                harness.webdriver_url = url;
            }
            if !tags.is_empty() {
                harness.tags = Some(TagList::Many(tags));
            }
            harness.dry_run |= dry_run;
            if hide_skipped {
                harness.show_skipped = false;
            }
            run(Arc::new(harness)).await
        }

        Commands::Steps => {
            let registry = StepRegistry::builtin()?;
            for line in registry.available_steps() {
                println!("{}", line);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            report::generate_report(&results, &format, output.as_deref())?;
            if let Some(path) = output {
                println!(
                    "{} {} report saved to: {}",
                    "📊".to_string().blue(),
                    format,
                    path.display().to_string().cyan()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: Arc<HarnessConfig>) -> anyhow::Result<ExitCode> {
    let registry = StepRegistry::builtin()?;
    let factory = Arc::new(WebDriverFactory::new(&config.webdriver_url)?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n{} Stopping after the current scenario...", "⏹".yellow());
        stop_handler.store(true, Ordering::SeqCst);
    })?;

    let (emitter, receiver) = EventEmitter::new();
    let console = tokio::spawn(ConsoleEventListener::listen(receiver));
    let mut listeners = Listeners::new();
    listeners.push(Box::new(EventListener::new(emitter, config.show_skipped)));

    // the emitter goes away with the listeners, which ends the console task
    let outcome =
        runner::run_features(config.clone(), &registry, factory, None, listeners, stop).await;
    if let Err(e) = console.await {
        log::warn!("console output task failed: {}", e);
    }

    match outcome? {
        RunOutcome::DryRun { scenarios } => {
            println!(
                "{} All steps of {} scenarios are defined",
                "✓".green(),
                scenarios
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Completed(run) => {
            if let Some(dir) = &config.test_artifact_dir {
                println!(
                    "\n{} Reports saved to: {}",
                    "📄".to_string().blue(),
                    dir.display().to_string().cyan()
                );
            }
            if run.succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
