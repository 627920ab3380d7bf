//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, DatabaseOverride, DeadLettersArgs, EnqueueArgs, JobsArgs, JobsCommand,
    RenderArgs, ServeArgs, ServeOverrides, WorkerArgs, WorkerOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kyc-dossier";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_JOB_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_JOB_BACKOFF_MAX_SECS: u64 = 300;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 60;
const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_ARTIFACT_DIR: &str = "pdfs";
const DEFAULT_SUMMARY_PROVIDER: &str = "primary";
const DEFAULT_SUMMARY_HOSTED_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2";
const DEFAULT_SUMMARY_LOCAL_URL: &str = "http://localhost:11434";
const DEFAULT_SUMMARY_LOCAL_MODEL: &str = "llama2";
const DEFAULT_SUMMARY_TEMPERATURE: f32 = 0.7;
const DEFAULT_SUMMARY_MAX_LENGTH: u32 = 150;
const DEFAULT_SUMMARY_TIMEOUT_SECS: u64 = 10;
/// Extra time past the job limit for recording the outcome of the last delivery.
const WORKER_SETTLE_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub artifacts: ArtifactSettings,
    pub summary: SummarySettings,
}

impl Settings {
    /// How long shutdown waits for the worker: the HTTP grace period, stretched so
    /// an in-flight render can reach its own time limit and be settled.
    pub fn worker_drain_timeout(&self) -> Duration {
        self.server
            .graceful_shutdown
            .max(self.jobs.job_timeout.saturating_add(WORKER_SETTLE_MARGIN))
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub enabled: bool,
    pub max_attempts: NonZeroU32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SummarySettings {
    /// Raw selector; unknown values are reported when a summary is requested.
    pub provider: String,
    pub api_key: Option<String>,
    pub hosted_url: Url,
    pub local_url: Url,
    pub local_model: String,
    pub temperature: f32,
    pub max_length: NonZeroU32,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DOSSIER").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        Some(Command::Enqueue(args)) => raw.apply_database_override(&args.database),
        Some(Command::Render(args)) => {
            raw.apply_database_override(&args.database);
            if let Some(directory) = args.artifacts_directory.as_ref() {
                raw.artifacts.directory = Some(directory.clone());
            }
        }
        Some(Command::Jobs(args)) => match &args.command {
            JobsCommand::DeadLetters(list) => raw.apply_database_override(&list.database),
        },
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    artifacts: RawArtifactSettings,
    summary: RawSummarySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(provider) = overrides.summary_provider.as_ref() {
            self.summary.provider = Some(provider.clone());
        }

        self.apply_worker_overrides(&overrides.worker);
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.jobs_enabled {
            self.jobs.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.jobs_timeout_seconds {
            self.jobs.timeout_seconds = Some(seconds);
        }
        if let Some(attempts) = overrides.jobs_max_attempts {
            self.jobs.max_attempts = Some(attempts);
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            jobs,
            artifacts,
            summary,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            artifacts: build_artifact_settings(artifacts)?,
            summary: build_summary_settings(summary)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let max_attempts = non_zero_u32(
        jobs.max_attempts.unwrap_or(DEFAULT_JOB_MAX_ATTEMPTS).into(),
        "jobs.max_attempts",
    )?;
    if i32::try_from(max_attempts.get()).is_err() {
        return Err(LoadError::invalid(
            "jobs.max_attempts",
            "value exceeds supported range for i32",
        ));
    }

    let backoff_base = positive_duration(
        Duration::from_millis(jobs.backoff_base_ms.unwrap_or(DEFAULT_JOB_BACKOFF_BASE_MS)),
        "jobs.backoff_base_ms",
    )?;
    let backoff_max = positive_duration(
        Duration::from_secs(
            jobs.backoff_max_seconds
                .unwrap_or(DEFAULT_JOB_BACKOFF_MAX_SECS),
        ),
        "jobs.backoff_max_seconds",
    )?;
    if backoff_max < backoff_base {
        return Err(LoadError::invalid(
            "jobs.backoff_max_seconds",
            "must not be smaller than jobs.backoff_base_ms",
        ));
    }

    let job_timeout = positive_duration(
        Duration::from_secs(jobs.timeout_seconds.unwrap_or(DEFAULT_JOB_TIMEOUT_SECS)),
        "jobs.timeout_seconds",
    )?;
    let poll_interval = positive_duration(
        Duration::from_millis(
            jobs.poll_interval_ms
                .unwrap_or(DEFAULT_JOB_POLL_INTERVAL_MS),
        ),
        "jobs.poll_interval_ms",
    )?;

    Ok(JobsSettings {
        enabled: jobs.enabled.unwrap_or(false),
        max_attempts,
        backoff_base,
        backoff_max,
        job_timeout,
        poll_interval,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    Ok(ArtifactSettings { directory })
}

fn build_summary_settings(summary: RawSummarySettings) -> Result<SummarySettings, LoadError> {
    let provider = summary
        .provider
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SUMMARY_PROVIDER.to_string());

    let api_key = summary.api_key.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let hosted_url = parse_url(
        summary.hosted_url.as_deref(),
        DEFAULT_SUMMARY_HOSTED_URL,
        "summary.hosted_url",
    )?;
    let local_url = parse_url(
        summary.local_url.as_deref(),
        DEFAULT_SUMMARY_LOCAL_URL,
        "summary.local_url",
    )?;

    let local_model = summary
        .local_model
        .unwrap_or_else(|| DEFAULT_SUMMARY_LOCAL_MODEL.to_string());
    if local_model.trim().is_empty() {
        return Err(LoadError::invalid(
            "summary.local_model",
            "model name must not be empty",
        ));
    }

    let temperature = summary.temperature.unwrap_or(DEFAULT_SUMMARY_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(LoadError::invalid(
            "summary.temperature",
            "must be between 0.0 and 2.0",
        ));
    }

    let max_length = non_zero_u32(
        summary
            .max_length
            .unwrap_or(DEFAULT_SUMMARY_MAX_LENGTH)
            .into(),
        "summary.max_length",
    )?;

    let timeout = positive_duration(
        Duration::from_secs(
            summary
                .timeout_seconds
                .unwrap_or(DEFAULT_SUMMARY_TIMEOUT_SECS),
        ),
        "summary.timeout_seconds",
    )?;

    Ok(SummarySettings {
        provider,
        api_key,
        hosted_url,
        local_url,
        local_model,
        temperature,
        max_length,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    enabled: Option<bool>,
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSummarySettings {
    provider: Option<String>,
    api_key: Option<String>,
    hosted_url: Option<String>,
    local_url: Option<String>,
    local_model: Option<String>,
    temperature: Option<f32>,
    max_length: Option<u32>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_url(value: Option<&str>, default: &str, key: &'static str) -> Result<Url, LoadError> {
    let candidate = value.map(str::trim).unwrap_or(default);
    Url::parse(candidate).map_err(|err| LoadError::invalid(key, format!("invalid url: {err}")))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_duration(value: Duration, key: &'static str) -> Result<Duration, LoadError> {
    if value.is_zero() {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}
