//! Atelier CLI - Binary entry point.
//!
//! # Architecture
//!
//! Every command follows the same wiring:
//!
//! ```text
//! config.toml + env -> ClientSettings -> TokenStore -> SessionHolder -> ApiClient
//!                                                                          |
//!                                     command runs, timed by PerfMonitor   v
//!                                                   SessionEvent receiver drained
//! ```
//!
//! A 401 anywhere clears the stored token inside the client; the CLI only reports the
//! login path it was handed.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::{
    env,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{broadcast, oneshot};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use atelier_client::{
    ApiClient, FileTokenStore, FormPart, SessionEvent, SessionHolder, check_health,
};
use atelier_config::{AtelierConfig, BASE_URL_ENV, ClientSettings, idle_backend_choice};
use atelier_perf::{
    FrameClock, IdleBackend, IdleOptions, IdleScheduler, get_memory_usage, log_memory_usage,
    measure_fps, perf_monitor,
};

use cli::{Cli, Commands};

/// Upper bound on the post-command idle memory report.
const IDLE_REPORT_TIMEOUT: Duration = Duration::from_millis(250);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No writable log file: stderr keeps stdout clean for command output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    // ~/.atelier/logs/atelier.log
    atelier_config::atelier_dir()
        .map(|dir| dir.join("logs").join("atelier.log"))
        .into_iter()
        .collect()
}

fn load_config(explicit: Option<&Path>) -> Result<Option<AtelierConfig>> {
    match explicit {
        Some(path) => AtelierConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => AtelierConfig::load().context("loading ~/.atelier/config.toml"),
    }
}

fn build_session(settings: &ClientSettings) -> Arc<SessionHolder> {
    let holder = match &settings.token_path {
        Some(path) => SessionHolder::hydrated(FileTokenStore::new(path)),
        None => {
            tracing::warn!("No home directory; session will not persist");
            SessionHolder::in_memory()
        }
    };
    Arc::new(holder)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let base_url_override = cli.base_url.or_else(|| env::var(BASE_URL_ENV).ok());
    let settings = ClientSettings::resolve_with_env(config.as_ref(), base_url_override);
    tracing::debug!(base_url = %settings.base_url, "Settings resolved");

    let session = build_session(&settings);
    let client = ApiClient::new(&settings, session).context("building HTTP client")?;
    let mut events = client.subscribe();

    let label = cli.command.name();
    perf_monitor().start(label);
    let result = execute(&client, &settings, cli.command).await;
    perf_monitor().end(label);

    report_session_events(&mut events);
    report_memory_when_idle(config.as_ref()).await;

    result
}

async fn execute(client: &ApiClient, settings: &ClientSettings, command: Commands) -> Result<()> {
    match command {
        Commands::Health => {
            let envelope = check_health(client).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Commands::Login { token } => {
            if token.trim().is_empty() {
                anyhow::bail!("Token must not be empty");
            }
            client.session().set_token(Some(token.as_str()));
            println!("Logged in");
        }
        Commands::Logout => {
            client.session().logout();
            println!("Logged out");
        }
        Commands::Status => print_status(client, settings),
        Commands::Get { path, query } => {
            let query: Vec<(&str, &str)> = query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            let payload: serde_json::Value = client
                .get_with_query(&path, &query)
                .await
                .map_err(|err| anyhow::anyhow!(err.diagnostic()))?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Upload { path, file, field } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .map_or_else(|| "upload".to_string(), |name| name.to_string_lossy().into_owned());
            let payload: serde_json::Value = client
                .upload(&path, vec![FormPart::file(field, file_name, bytes)])
                .await
                .map_err(|err| anyhow::anyhow!(err.diagnostic()))?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Fps {
            window_ms,
            refresh_hz,
        } => {
            let mut clock = FrameClock::new(refresh_hz);
            let fps = measure_fps(&mut clock, Duration::from_millis(window_ms)).await;
            println!("{fps:.2} fps");
        }
        Commands::Memory => match get_memory_usage() {
            Some(usage) => println!(
                "used {}MB / total {}MB / limit {}MB ({:.1}%)",
                usage.used,
                usage.total,
                usage.limit,
                usage.percent_of_limit()
            ),
            None => println!("Memory figures are not available on this platform"),
        },
    }
    Ok(())
}

fn print_status(client: &ApiClient, settings: &ClientSettings) {
    let session = client.session();
    println!("base url:   {}", client.base_url());
    println!("timeout:    {}ms", settings.timeout.as_millis());
    println!("login path: {}", settings.login_path);
    match &settings.token_path {
        Some(path) => println!("token file: {}", path.display()),
        None => println!("token file: (memory only)"),
    }
    let state = match session.identity() {
        Some(identity) => format!("signed in as {}", identity.display_name()),
        None if session.is_authenticated() => "signed in".to_string(),
        None => "signed out".to_string(),
    };
    println!("session:    {state}");
}

fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Invalidated { login_path } => {
                eprintln!("Session expired. Sign in again: {login_path}");
            }
        }
    }
}

async fn report_memory_when_idle(config: Option<&AtelierConfig>) {
    let handle = tokio::runtime::Handle::current();
    let backend = IdleBackend::from_choice(&idle_backend_choice(config), &handle);
    let scheduler = IdleScheduler::with_handle(backend, handle);

    let (done_tx, done_rx) = oneshot::channel();
    let pending = scheduler.schedule(
        move || {
            log_memory_usage();
            let _ = done_tx.send(());
        },
        IdleOptions {
            timeout: Some(IDLE_REPORT_TIMEOUT),
        },
    );

    if tokio::time::timeout(IDLE_REPORT_TIMEOUT * 2, done_rx)
        .await
        .is_err()
    {
        scheduler.cancel(pending);
    }
}
