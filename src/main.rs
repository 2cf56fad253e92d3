use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podrelay::client::Repository;
use podrelay::error::{ClientError, PollError};
use podrelay::store::{ChartStore, EpisodeLedger, LookupStore, ResultStore, SubscriptionRegistry};
use podrelay::{
    Action, Client, ClientConfig, Collaborators, FsContentHost, FsStore, GitHubDispatchTrigger,
    HttpClient, HttpStore, ItunesDirectory, NoopReporter, Poller, ProgressEvent,
    ProgressReporter, RequestId, RequestRecord, ReqwestClient, ResultRecord, RssExtractor,
    SharedBlobStore, SharedProgressReporter, Worker, WorkerConfig, WorkerOptions,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "[>] ");
static HOURGLASS: Emoji<'_, '_> = Emoji("⏳ ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Exit code when polling gave up before a result appeared
const EXIT_TIMEOUT: u8 = 2;

/// Run podcast work on ephemeral workers and poll for the result
#[derive(Parser, Debug)]
#[command(name = "podrelay")]
#[command(about = "Run podcast work on ephemeral workers and poll for the result")]
#[command(version)]
struct Cli {
    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle exactly one request and record its result
    Worker(WorkerArgs),

    /// Dispatch an action and wait for its result
    Dispatch {
        #[arg(value_parser = parse_action)]
        action: Action,

        /// Action payload as a JSON object
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Wait for the result of an earlier dispatch
    Poll { request_id: String },

    /// Print published records
    Show {
        #[command(subcommand)]
        what: ShowCommand,
    },
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Dispatch event document to handle (e.g. $GITHUB_EVENT_PATH)
    #[arg(long, conflicts_with_all = ["action", "request_id", "payload"])]
    event: Option<PathBuf>,

    /// Action to run when no event document is given
    #[arg(value_parser = parse_action, required_unless_present = "event")]
    action: Option<Action>,

    #[arg(long)]
    request_id: Option<String>,

    /// Action payload as a JSON object
    #[arg(short, long)]
    payload: Option<String>,

    /// Root of the data store (overrides PODRELAY_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for downloaded episodes (overrides PODRELAY_MEDIA_DIR)
    #[arg(long)]
    media_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ShowCommand {
    /// All current subscriptions
    Subscriptions,
    /// Recorded episodes of one podcast
    Episodes { podcast_id: String },
    /// Published top chart of a country
    Top {
        #[arg(default_value = "us")]
        country: String,
    },
    /// Feed resolved for one iTunes id
    Lookup { itunes_id: String },
    /// Every resolved iTunes id
    Lookups,
}

fn parse_action(value: &str) -> Result<Action, String> {
    value.parse::<Action>().map_err(|e| e.to_string())
}

fn parse_payload(payload: Option<&str>) -> Result<Value> {
    payload
        .map(|raw| serde_json::from_str(raw).context("Payload is not valid JSON"))
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Progress reporter using an indicatif spinner for terminal output
struct IndicatifReporter {
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let main_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {wide_msg}") {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(Duration::from_millis(100));
        Self { main_bar }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Dispatched { request_id, action } => {
                self.main_bar.println(format!(
                    "{ROCKET}Dispatched {} as {}",
                    action.bold(),
                    request_id.cyan()
                ));
            }

            ProgressEvent::PollAttempt {
                request_id,
                attempt,
                max_attempts,
            } => {
                self.main_bar.set_message(format!(
                    "{HOURGLASS}Waiting for {} [{}/{}]",
                    request_id.cyan(),
                    attempt.to_string().yellow(),
                    max_attempts
                ));
            }

            ProgressEvent::ResultReceived {
                success, attempts, ..
            } => {
                self.main_bar.finish_and_clear();
                let status = if success {
                    format!("{SUCCESS}{}", "Succeeded".green().bold())
                } else {
                    format!("{FAILURE}{}", "Failed".red().bold())
                };
                eprintln!("{status} after {attempts} attempt(s)");
            }

            ProgressEvent::PollTimedOut {
                request_id,
                attempts,
            } => {
                self.main_bar.abandon_with_message(format!(
                    "{FAILURE}No result for {} after {} attempts",
                    request_id.red(),
                    attempts
                ));
            }

            ProgressEvent::FeedRefreshStarting {
                title, index, total, ..
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}[{}/{}] {}",
                    (index + 1).to_string().cyan(),
                    total.to_string().cyan(),
                    truncate_title(&title, 40)
                ));
            }

            ProgressEvent::FeedRefreshed {
                title,
                new_episodes,
                ..
            } => {
                self.main_bar.println(format!(
                    "  {SUCCESS}{} {} new",
                    truncate_title(&title, 40).green(),
                    new_episodes.to_string().yellow()
                ));
            }

            ProgressEvent::FeedRefreshFailed { title, error, .. } => {
                self.main_bar.println(format!(
                    "  {CROSS}{} - {}",
                    truncate_title(&title, 30).red(),
                    error.dimmed()
                ));
            }

            ProgressEvent::RefreshCompleted {
                updated,
                failed,
                new_episodes,
            } => {
                self.main_bar.finish_and_clear();
                eprintln!(
                    "{PARTY}{} {} updated, {} new episodes, {} failed",
                    "Refresh complete:".bold().green(),
                    updated.to_string().green().bold(),
                    new_episodes.to_string().yellow(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn reporter(quiet: bool) -> SharedProgressReporter {
    if quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    }
}

fn print_record(record: &ResultRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("Failed to encode result")?;
    println!("{json}");
    Ok(())
}

fn record_exit_code(record: &ResultRecord) -> ExitCode {
    if record.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Timeouts are reported but are not errors of this program
fn poll_outcome(result: Result<ResultRecord, ClientError>) -> Result<ExitCode> {
    match result {
        Ok(record) => {
            print_record(&record)?;
            Ok(record_exit_code(&record))
        }
        Err(ClientError::Poll(PollError::Timeout {
            request_id,
            attempts,
        })) => {
            eprintln!(
                "{FAILURE}{} {} did not finish within {} attempts; poll again with `podrelay poll {}`",
                "Timeout:".red().bold(),
                request_id,
                attempts,
                request_id
            );
            Ok(ExitCode::from(EXIT_TIMEOUT))
        }
        Err(e) => Err(e).context("Request failed"),
    }
}

async fn run_worker(args: WorkerArgs, quiet: bool) -> Result<ExitCode> {
    let mut config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }

    let request = match (&args.event, args.action) {
        (Some(path), _) => {
            let raw = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read event {}", path.display()))?;
            RequestRecord::from_dispatch_event(&raw).context("Failed to decode event")?
        }
        (None, Some(action)) => RequestRecord::new(
            args.request_id.map(RequestId::new),
            action,
            parse_payload(args.payload.as_deref())?,
        ),
        (None, None) => anyhow::bail!("Either --event or an action is required"),
    };

    let http: Arc<dyn HttpClient> = Arc::new(
        ReqwestClient::new(&config.user_agent).context("Failed to build HTTP client")?,
    );
    let worker = Worker::new(
        Collaborators {
            client: http.clone(),
            extractor: Arc::new(RssExtractor),
            directory: Arc::new(ItunesDirectory::new(http)),
            content_host: Arc::new(FsContentHost::new(config.media_dir)),
            store: Arc::new(FsStore::new(config.data_dir)),
        },
        WorkerOptions {
            feed_delay: config.feed_delay,
            top_limit: config.top_limit,
        },
    )
    .with_reporter(reporter(quiet));

    match worker.handle(request).await.context("Worker failed")? {
        Some(record) => {
            print_record(&record)?;
            Ok(record_exit_code(&record))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Read-only view of the published store
fn published_store(config: &ClientConfig) -> Result<SharedBlobStore> {
    let base_url = config.pages_url().context("Cannot locate published data")?;
    let http = ReqwestClient::uncached(&config.user_agent).context("Failed to build HTTP client")?;
    Ok(Arc::new(HttpStore::new(base_url.clone(), Arc::new(http))))
}

async fn run_dispatch(action: Action, payload: Option<String>, quiet: bool) -> Result<ExitCode> {
    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let payload = parse_payload(payload.as_deref())?;
    let repository: Repository = config
        .repository()
        .context("Cannot dispatch without a repository")?
        .clone();
    let store = published_store(&config)?;

    let http = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;
    let trigger = GitHubDispatchTrigger::new(http, config.api_base.clone(), repository, config.token.clone());

    let client = Client::new(Arc::new(trigger), store, config.poll).with_reporter(reporter(quiet));
    poll_outcome(client.request(action, payload).await)
}

async fn run_poll(request_id: String, quiet: bool) -> Result<ExitCode> {
    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let store = published_store(&config)?;
    let poller = Poller::new(ResultStore::new(store), config.poll).with_reporter(reporter(quiet));

    let result = poller
        .wait(&RequestId::new(request_id))
        .await
        .map_err(ClientError::from);
    poll_outcome(result)
}

async fn run_show(what: ShowCommand) -> Result<ExitCode> {
    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let store = published_store(&config)?;

    match what {
        ShowCommand::Subscriptions => {
            let subscriptions = SubscriptionRegistry::new(store)
                .list()
                .await
                .context("Failed to read subscriptions")?;
            if subscriptions.is_empty() {
                println!("{}", "No subscriptions".dimmed());
            }
            for subscription in subscriptions {
                println!(
                    "{HEADPHONES}{} {} ({} episodes)",
                    subscription.id.cyan(),
                    subscription.title.bold(),
                    subscription.episode_count
                );
            }
        }
        ShowCommand::Episodes { podcast_id } => {
            let episodes = EpisodeLedger::new(store)
                .episodes(&podcast_id)
                .await
                .with_context(|| format!("Failed to read episodes of {podcast_id}"))?;
            for episode in episodes {
                let marker = if episode.is_new {
                    "new".yellow().to_string()
                } else {
                    "   ".to_string()
                };
                println!("{marker} {} {}", episode.id.cyan(), truncate_title(&episode.title, 60));
            }
        }
        ShowCommand::Top { country } => {
            let chart = ChartStore::new(store)
                .get(&country.to_lowercase())
                .await
                .with_context(|| format!("Failed to read top chart for {country}"))?;
            println!(
                "{} {} {}",
                "Top podcasts".bold(),
                chart.country.cyan(),
                chart.updated.format("%Y-%m-%d %H:%M UTC").to_string().dimmed()
            );
            for (rank, entry) in chart.podcasts.iter().enumerate() {
                println!("{:>3}. {} - {}", rank + 1, entry.title.bold(), entry.author.dimmed());
            }
        }
        ShowCommand::Lookup { itunes_id } => {
            let lookup = LookupStore::new(store)
                .get(&itunes_id)
                .await
                .with_context(|| format!("No lookup recorded for {itunes_id}"))?;
            println!("{} {}", lookup.itunes_id.cyan(), lookup.title.bold());
            println!("    {}", lookup.feed_url);
        }
        ShowCommand::Lookups => {
            let lookups = LookupStore::new(store)
                .all()
                .await
                .context("Failed to read lookups")?;
            if lookups.is_empty() {
                println!("{}", "No lookups".dimmed());
            }
            for lookup in lookups.values() {
                println!("{} {} {}", lookup.itunes_id.cyan(), lookup.title.bold(), lookup.feed_url.dimmed());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podrelay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if !cli.quiet && !matches!(cli.command, Command::Worker(_)) {
        eprintln!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podrelay".bold().magenta(),
            "- Podcast Relay".dimmed()
        );
    }

    match cli.command {
        Command::Worker(args) => run_worker(args, cli.quiet).await,
        Command::Dispatch { action, payload } => run_dispatch(action, payload, cli.quiet).await,
        Command::Poll { request_id } => run_poll(request_id, cli.quiet).await,
        Command::Show { what } => run_show(what).await,
    }
}
