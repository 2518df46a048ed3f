//! Coursesync CLI - runs the auto-sync scheduler and inspects local state.
//!
//! This tool wires the SQLite-backed buffers, the HTTP client and the
//! scheduler together the same way a host application would.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use coursesync_api::{ApiService, HttpApiService};
use coursesync_common::{Error, Profile, ProfileAccessor, ProfileRequestOptions, ProfileSource};
use coursesync_course::{
    AssessmentEventBuffer, AssessmentEventSyncHandler, ContentStateBuffer, ContentStatesSyncHandler,
    GetContentStateHandler, GetContentStateRequest, UpdateContentStateApiHandler,
};
use coursesync_faq::{GetFaqDetailsHandler, GetFaqRequest};
use coursesync_storage::{CachedItemStore, Database, PreferenceProfileAccessor};
use coursesync_sync::{
    AutoSyncDeps, AutoSyncScheduler, BufferedTelemetry, FileSpeedLogSource, SpeedSampleReporter, SyncMode,
    SyncModePreference, TickReport,
};

use config::SdkConfig;

#[derive(Parser)]
#[command(name = "coursesync")]
#[command(about = "Coursesync - background sync of learner progress and telemetry")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the auto-sync scheduler until interrupted.
    Run {
        /// Tick interval in milliseconds (default: from config).
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Stop after this many ticks.
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Read or change the persisted auto-sync mode.
    Mode {
        #[command(subcommand)]
        action: ModeAction,
    },

    /// Set the active session profile.
    Profile {
        /// Profile identifier.
        #[arg(short, long)]
        uid: String,

        /// Whether the profile is linked to a server account.
        #[arg(short, long, value_enum, default_value = "server")]
        source: SourceArg,
    },

    /// Show buffered record counts.
    Status,

    /// Print the FAQ for a language.
    Faq {
        /// Language code, e.g. "en".
        language: String,

        /// FAQ host overriding the configured one.
        #[arg(long)]
        url: Option<String>,
    },

    /// Print content states of a course batch.
    ContentState {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        course: String,

        #[arg(short, long)]
        batch: String,

        /// Restrict to these content ids.
        #[arg(long)]
        content: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ModeAction {
    /// Print the current mode.
    Get,
    /// Persist a new mode.
    Set {
        #[arg(value_enum)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Off,
    AlwaysOn,
    OverWifi,
}

impl From<ModeArg> for SyncMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Off => SyncMode::Off,
            ModeArg::AlwaysOn => SyncMode::AlwaysOn,
            ModeArg::OverWifi => SyncMode::OverWifi,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Local,
    Server,
}

impl From<SourceArg> for ProfileSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Local => ProfileSource::Local,
            SourceArg::Server => ProfileSource::Server,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SdkConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { interval_ms, ticks } => cmd_run(&config, interval_ms, ticks).await,

        Commands::Mode { action } => cmd_mode(&config, action).await,

        Commands::Profile { uid, source } => cmd_profile(&config, &uid, source.into()).await,

        Commands::Status => cmd_status(&config).await,

        Commands::Faq { language, url } => cmd_faq(&config, language, url).await,

        Commands::ContentState {
            user,
            course,
            batch,
            content,
        } => {
            let request = GetContentStateRequest {
                user_id: user,
                course_id: course,
                batch_id: batch,
                content_ids: content,
                fields: Vec::new(),
            };
            cmd_content_state(&config, &request).await
        }
    }
}

/// Open (creating if needed) the SQLite database.
fn open_database(config: &SdkConfig) -> Result<Arc<Database>> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(db))
}

fn http_client(config: &SdkConfig) -> Result<Arc<dyn ApiService>> {
    let client = HttpApiService::new(config.api.clone()).context("Failed to create HTTP client")?;
    Ok(Arc::new(client))
}

/// Run the scheduler.
async fn cmd_run(config: &SdkConfig, interval_ms: Option<u64>, ticks: Option<u64>) -> Result<()> {
    let db = open_database(config)?;
    let api = http_client(config)?;

    let telemetry = Arc::new(
        BufferedTelemetry::new(db.clone(), api.clone(), config.telemetry.clone())
            .context("Failed to open telemetry buffer")?,
    );
    let update_handler = UpdateContentStateApiHandler::new(api.clone(), config.course.clone());
    let content_states = ContentStateBuffer::new(db.clone()).context("Failed to open content state buffer")?;
    let assessments = AssessmentEventBuffer::new(db.clone()).context("Failed to open assessment buffer")?;

    let deps = AutoSyncDeps {
        speed_reporter: SpeedSampleReporter::new(
            Arc::new(FileSpeedLogSource::new(config.speed_log_path())),
            telemetry.clone(),
        ),
        profiles: Arc::new(PreferenceProfileAccessor::new(db.clone())),
        assessments: Arc::new(AssessmentEventSyncHandler::new(
            update_handler.clone(),
            Arc::new(assessments),
        )),
        content_states: Arc::new(ContentStatesSyncHandler::new(update_handler, Arc::new(content_states))),
        telemetry,
    };
    let scheduler = AutoSyncScheduler::new(deps, db, config.auto_sync.clone());

    match scheduler.get_sync_mode().await? {
        Some(SyncMode::Off) => {
            println!("Auto-sync is turned off. Enable it with: coursesync mode set always-on");
            return Ok(());
        }
        Some(mode) => info!("Auto-sync mode: {}", mode),
        None => info!("Auto-sync mode not set"),
    }

    let mut handle = match interval_ms {
        Some(ms) => scheduler.start(Duration::from_millis(ms)),
        None => scheduler.start_configured(),
    }
    .context("Failed to start auto-sync")?;

    let mut completed = 0;
    loop {
        tokio::select! {
            report = handle.next_tick() => {
                let Some(report) = report else { break };
                print_report(&report);
                completed += 1;
                if ticks.is_some_and(|limit| completed >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping after the current tick");
                break;
            }
        }
    }

    handle.stop().await;
    println!("Auto-sync stopped after {} ticks", completed);

    Ok(())
}

fn print_report(report: &TickReport) {
    println!("Tick {}:", report.sequence);
    println!("  Speed sample: {}", report.speed_sample);
    println!("  Assessment sync: {}", report.assessment_sync);
    println!("  Content state sync: {}", report.content_state_sync);
    println!("  Telemetry flush: {}", report.telemetry_flush);
}

/// Read or write the sync mode.
async fn cmd_mode(config: &SdkConfig, action: ModeAction) -> Result<()> {
    let preference = SyncModePreference::new(open_database(config)?);

    match action {
        ModeAction::Get => match preference.get_sync_mode().await? {
            Some(mode) => println!("{}", mode),
            None => println!("(not set)"),
        },
        ModeAction::Set { mode } => {
            let mode = SyncMode::from(mode);
            preference
                .set_sync_mode(mode)
                .await
                .context("Failed to save sync mode")?;
            println!("Auto-sync mode set to {}", mode);
        }
    }

    Ok(())
}

/// Store the active session profile.
async fn cmd_profile(config: &SdkConfig, uid: &str, source: ProfileSource) -> Result<()> {
    let profile = Profile::new(uid, source).context("Invalid profile")?;
    PreferenceProfileAccessor::new(open_database(config)?)
        .set_active_profile(&profile)
        .await
        .context("Failed to save profile")?;

    println!("Active profile: {} ({})", profile.uid, profile.source);
    Ok(())
}

/// Show what is waiting to be synced.
async fn cmd_status(config: &SdkConfig) -> Result<()> {
    let db = open_database(config)?;
    let api = http_client(config)?;

    let telemetry = BufferedTelemetry::new(db.clone(), api, config.telemetry.clone())?;
    let content_states = ContentStateBuffer::new(db.clone())?;
    let assessments = AssessmentEventBuffer::new(db.clone())?;
    let mode = SyncModePreference::new(db.clone()).get_sync_mode().await?;
    let profile = PreferenceProfileAccessor::new(db)
        .get_active_session_profile(ProfileRequestOptions::default())
        .await;

    println!("Coursesync status:");
    match mode {
        Some(mode) => println!("  Sync mode: {}", mode),
        None => println!("  Sync mode: (not set)"),
    }
    match profile {
        Ok(profile) => println!("  Profile: {} ({})", profile.uid, profile.source),
        Err(Error::NotFound(_)) => println!("  Profile: (none)"),
        Err(e) => {
            warn!("Failed to read profile: {}", e);
            println!("  Profile: (unreadable)");
        }
    }
    println!("  Pending telemetry events: {}", telemetry.pending_count()?);
    println!("  Pending content states: {}", content_states.count()?);
    println!("  Pending assessment events: {}", assessments.count()?);

    Ok(())
}

/// Print the FAQ document.
async fn cmd_faq(config: &SdkConfig, language: String, faq_url: Option<String>) -> Result<()> {
    let db = open_database(config)?;
    let cache = Arc::new(CachedItemStore::new(db, config.cache.clone()));
    let handler = GetFaqDetailsHandler::new(http_client(config)?, config.faq.clone(), cache);

    let faq = handler
        .handle(&GetFaqRequest { language, faq_url })
        .await
        .context("Failed to load FAQ")?;
    println!("{}", serde_json::to_string_pretty(&faq)?);

    Ok(())
}

/// Print content states, remote when reachable, local otherwise.
async fn cmd_content_state(config: &SdkConfig, request: &GetContentStateRequest) -> Result<()> {
    let db = open_database(config)?;
    let cache = Arc::new(CachedItemStore::new(db.clone(), config.cache.clone()));
    let buffer = Arc::new(ContentStateBuffer::new(db)?);
    let handler = GetContentStateHandler::new(http_client(config)?, config.course.clone(), cache, buffer);

    let states = handler
        .handle(request)
        .await
        .context("Failed to load content state")?;
    println!("{}", serde_json::to_string_pretty(&states)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from(["coursesync", "-v", "run", "--interval-ms", "5000", "--ticks", "3"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { interval_ms, ticks } => {
                assert_eq!(interval_ms, Some(5000));
                assert_eq!(ticks, Some(3));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_mode_set_arguments() {
        let cli = Cli::try_parse_from(["coursesync", "mode", "set", "over-wifi"]).unwrap();
        match cli.command {
            Commands::Mode {
                action: ModeAction::Set { mode },
            } => assert_eq!(SyncMode::from(mode), SyncMode::OverWifi),
            _ => panic!("expected mode set"),
        }
        assert!(Cli::try_parse_from(["coursesync", "mode", "set", "sometimes"]).is_err());
    }
}
