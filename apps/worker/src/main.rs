//! Worker CLI - run the dispatcher or feed its queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use warden::{AlertFactory, JobQueue, Settings, TestFactory, TestRegistry, Worker, queue};

#[derive(Parser)]
#[command(name = "warden-worker")]
#[command(about = "Runs queued service checks and raises alerts on failure")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process jobs until interrupted (default)
    Run,

    /// Process jobs until one does not pass, then exit
    UntilFail,

    /// Push test lines onto the queue
    Enqueue {
        /// Lines such as "host must run ssh otherwise 'ssh down'"
        #[arg(required = true)]
        lines: Vec<String>,

        /// Wrap each line as a JSON job
        #[arg(long)]
        json: bool,
    },

    /// Print the number of queued jobs
    Size,

    /// List the test types this worker understands
    ListTests,

    /// List the alerters this worker can notify
    ListAlerters,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Commands::Run);
    match command {
        Commands::ListTests => {
            for keyword in TestRegistry::with_builtin_tests().known_tests() {
                println!("{keyword}");
            }
        }
        Commands::ListAlerters => {
            for name in AlertFactory::with_builtin_alerters().known_alerters() {
                println!("{name}");
            }
        }
        Commands::Enqueue { lines, json } => {
            let (_, queue) = connect(cli.config.as_ref())?;
            for line in lines {
                let job = if json { serde_json::json!({ "line": line }).to_string() } else { line };
                queue.add(&job).await.context("Failed to enqueue job")?;
            }
            println!("{}", queue.size().await.context("Failed to read queue size")?);
        }
        Commands::Size => {
            let (_, queue) = connect(cli.config.as_ref())?;
            println!("{}", queue.size().await.context("Failed to read queue size")?);
        }
        Commands::UntilFail => {
            let worker = build_worker(cli.config.as_ref())?;
            let passed = worker.process_until_fail().await;
            info!(passed, "Worker finished");
            println!("{passed}");
        }
        Commands::Run => {
            let worker = build_worker(cli.config.as_ref())?;
            tokio::select! {
                _ = worker.run() => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for shutdown signal")?;
                    warn!("Shutdown requested, stopping worker");
                }
            }
        }
    }

    Ok(())
}

fn connect(config: Option<&PathBuf>) -> Result<(Arc<Settings>, Arc<dyn JobQueue>)> {
    let settings = Settings::from_config(config).context("Failed to load settings")?;
    debug!("{settings}");
    let queue = queue::connect(&settings).context("Failed to set up job queue")?;
    Ok((Arc::new(settings), queue))
}

fn build_worker(config: Option<&PathBuf>) -> Result<Worker> {
    let (settings, queue) = connect(config)?;
    let factory = TestFactory::new(Arc::new(TestRegistry::with_builtin_tests()), Arc::clone(&settings));
    let alerters = Arc::new(AlertFactory::with_builtin_alerters());
    for name in settings.alerters().filter(|name| !alerters.contains(name)) {
        warn!(alerter = name, known = ?alerters.known_alerters(), "Configured alerter is not registered");
    }
    Ok(Worker::new(queue, factory, alerters, settings))
}
