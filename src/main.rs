//! A3S Harvest CLI - parallel multi-session scraper.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use a3s_harvest::{
    jobs::JobKind, Backend, CsvSink, FailurePolicy, Harvest, HttpSessionFactory, Pacing, Record,
    RunConfig, RunError, RunSummary, SessionFactory,
};

/// A3S Harvest - parallel multi-session scraper
#[derive(Parser)]
#[command(name = "a3s-harvest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect team URLs from the world ranking
    TeamUrls(RunArgs),

    /// Collect recent match URLs from the results listing
    MatchUrls(RunArgs),

    /// Scrape team profiles
    Teams(RunArgs),

    /// Scrape match pages
    Matches(RunArgs),

    /// Scrape player statistics of the last three months
    Players(RunArgs),

    /// List available jobs
    Jobs,
}

#[derive(Parser)]
struct RunArgs {
    /// Items to process (-1 = all)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Number of concurrent sessions
    #[arg(short, long)]
    sessions: Option<usize>,

    /// Show browser windows
    #[arg(long)]
    headed: bool,

    /// Visible sessions when running headed
    #[arg(long)]
    visible_sessions: Option<usize>,

    /// Pause after each item in seconds: "1" or "0.8,1.2"
    #[arg(short, long)]
    pacing: Option<Pacing>,

    /// What a session does after a failed item: abandon, skip or consecutive:N
    #[arg(long)]
    on_failure: Option<FailurePolicy>,

    /// Route sessions through proxies
    #[arg(long)]
    proxy: bool,

    /// Give every session its own proxy
    #[arg(long)]
    proxy_once: bool,

    /// Proxy list, one server:port[:username:password] per line
    #[arg(long)]
    proxy_file: Option<PathBuf>,

    /// JSON user-agent pool
    #[arg(long)]
    user_agents: Option<PathBuf>,

    /// JSON cookie export injected into every session
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Input table (defaults to the previous job's output)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document retrieval backend
    #[arg(short, long)]
    backend: Option<BackendArg>,

    /// Path to the Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Base URL of the site
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Headless Chrome/Chromium
    Browser,
    /// Plain HTTP requests
    Http,
}

impl RunArgs {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(self, config: &mut RunConfig) {
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(sessions) = self.sessions {
            config.sessions = sessions;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(visible) = self.visible_sessions {
            config.visible_sessions = visible;
        }
        if let Some(pacing) = self.pacing {
            config.pacing = pacing;
        }
        if let Some(policy) = self.on_failure {
            config.on_failure = policy;
        }
        config.use_proxy |= self.proxy || self.proxy_once;
        config.proxy_once |= self.proxy_once;
        if let Some(path) = self.proxy_file {
            config.proxy_file = path;
        }
        if self.user_agents.is_some() {
            config.user_agents = self.user_agents;
        }
        if self.cookies.is_some() {
            config.cookies = self.cookies;
        }
        if self.input.is_some() {
            config.input = self.input;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if let Some(backend) = self.backend {
            config.backend = match backend {
                BackendArg::Browser => Backend::Browser,
                BackendArg::Http => Backend::Http,
            };
        }
        if self.chrome_path.is_some() {
            config.chrome_path = self.chrome_path;
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_filter = if cli.verbose {
        "a3s_harvest=debug"
    } else {
        "a3s_harvest=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (kind, args) = match cli.command {
        Commands::TeamUrls(args) => (JobKind::TeamUrls, args),
        Commands::MatchUrls(args) => (JobKind::MatchUrls, args),
        Commands::Teams(args) => (JobKind::Teams, args),
        Commands::Matches(args) => (JobKind::Matches, args),
        Commands::Players(args) => (JobKind::Players, args),
        Commands::Jobs => return list_jobs(),
    };

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    run_job(kind, config).await
}

fn list_jobs() -> Result<()> {
    println!("Available jobs:\n");
    for kind in JobKind::ALL {
        let input = kind
            .default_input()
            .map_or_else(|| "(site)".to_string(), |p| p.display().to_string());
        println!(
            "    {:<11} {} -> {}",
            kind.name(),
            input,
            kind.default_output().display()
        );
    }
    println!();
    println!("Usage: a3s-harvest teams -n 30 -s 4 --pacing 0.8,1.2");
    Ok(())
}

fn session_factory(config: &RunConfig) -> Result<Arc<dyn SessionFactory>> {
    match config.backend {
        Backend::Http => Ok(Arc::new(
            HttpSessionFactory::new().with_timeout(config.timeout()),
        )),
        Backend::Browser => browser_factory(config),
    }
}

#[cfg(feature = "headless")]
fn browser_factory(config: &RunConfig) -> Result<Arc<dyn SessionFactory>> {
    use a3s_harvest::{BrowserSessionConfig, BrowserSessionFactory};

    Ok(Arc::new(BrowserSessionFactory::new(BrowserSessionConfig {
        chrome_path: config.chrome_path.clone(),
        wait: config.wait.clone(),
        launch_args: config.launch_args.clone(),
    })))
}

#[cfg(not(feature = "headless"))]
fn browser_factory(_config: &RunConfig) -> Result<Arc<dyn SessionFactory>> {
    anyhow::bail!("built without the `headless` feature; use --backend http")
}

async fn run_job(kind: JobKind, config: RunConfig) -> Result<()> {
    let base = config.base_url()?;
    let job = kind.build(&base, config.input.clone(), config.item_limit()?)?;
    let output = config
        .output
        .clone()
        .unwrap_or_else(|| kind.default_output().to_path_buf());

    let harvest = Harvest::with_factory(session_factory(&config)?)
        .identities(config.identity_pool()?)
        .cookies(config.cookies()?)
        .options(config.run_options()?);

    match harvest.run(job, &CsvSink::new(&output)).await {
        Ok(summary) => {
            print_summary(&summary, &output);
            Ok(())
        }
        Err(RunError::Persistence {
            source,
            records,
            summary,
        }) => {
            print_summary(&summary, &output);
            let fallback = recover(kind, &records)?;
            anyhow::bail!(
                "{}; {} records saved to {} instead",
                source,
                records.len(),
                fallback.display()
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// Dumps records that could not be written to the output table.
fn recover(kind: JobKind, records: &[Record]) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let path = std::env::temp_dir().join(format!("a3s-harvest-{}-{}.json", kind, stamp));
    std::fs::write(&path, serde_json::to_string_pretty(records)?)?;
    warn!("Recovered {} records to {}", records.len(), path.display());
    Ok(path)
}

fn print_summary(summary: &RunSummary, output: &Path) {
    let requested = summary
        .requested
        .map_or_else(|| "all".to_string(), |n| n.to_string());
    println!(
        "\n{}: {} records stored ({} requested) in {:.1}s -> {}",
        summary.job,
        summary.stored,
        requested,
        summary.elapsed.as_secs_f64(),
        output.display()
    );
    for worker in &summary.workers {
        println!(
            "    session {}: {} attempted, {} stored, {} failed{}",
            worker.worker_id,
            worker.attempted,
            worker.appended,
            worker.failed,
            worker
                .failure
                .as_ref()
                .map(|f| format!(" (stopped: {})", f))
                .unwrap_or_default()
        );
    }
    if summary.abandoned() > 0 {
        info!(
            abandoned = summary.abandoned(),
            "Some sessions stopped early; rerun with --on-failure skip to continue past failures"
        );
    }
}
