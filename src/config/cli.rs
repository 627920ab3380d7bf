use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the kyc-dossier binary.
#[derive(Debug, Parser)]
#[command(name = "kyc-dossier", version, about = "KYC dossier pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DOSSIER_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service and, when queueing is enabled, the render worker.
    Serve(Box<ServeArgs>),
    /// Run only the render worker.
    Worker(WorkerArgs),
    /// Enqueue a dossier render job for one customer.
    Enqueue(EnqueueArgs),
    /// Render a dossier synchronously, bypassing the queue.
    Render(RenderArgs),
    /// Inspect the job channel.
    Jobs(JobsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub worker: WorkerOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the summary provider (primary|alternate).
    #[arg(long = "summary-provider", value_name = "PROVIDER")]
    pub summary_provider: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the render job queue.
    #[arg(
        long = "jobs-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub jobs_enabled: Option<bool>,

    /// Override the per-job render timeout.
    #[arg(long = "jobs-timeout-seconds", value_name = "SECONDS")]
    pub jobs_timeout_seconds: Option<u64>,

    /// Override how many deliveries a job gets before it is dead-lettered.
    #[arg(long = "jobs-max-attempts", value_name = "COUNT")]
    pub jobs_max_attempts: Option<u32>,

    /// Override the dossier storage directory.
    #[arg(long = "artifacts-directory", value_name = "PATH")]
    pub artifacts_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Customer identifier to render.
    #[arg(value_name = "CUSTOMER_ID")]
    pub customer_id: String,

    /// Block until the job finishes, up to the given number of seconds.
    #[arg(long = "wait", value_name = "SECONDS")]
    pub wait_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the dossier storage directory.
    #[arg(long = "artifacts-directory", value_name = "PATH")]
    pub artifacts_directory: Option<PathBuf>,

    /// Customer identifier to render.
    #[arg(value_name = "CUSTOMER_ID")]
    pub customer_id: String,
}

#[derive(Debug, Args, Clone)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum JobsCommand {
    /// List jobs that were dead-lettered.
    #[command(name = "dead-letters")]
    DeadLetters(DeadLettersArgs),
}

#[derive(Debug, Args, Clone)]
pub struct DeadLettersArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Maximum number of entries to print.
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}
