use std::{process, sync::Arc, time::Duration};

use kyc_dossier::{
    application::{
        customers::CustomerIntakeService,
        dossier::DossierRenderer,
        error::AppError,
        jobs::{
            DossierQueue, EnqueueError, JobRuntime, JobWorkerContext, list_dead_letters,
            wait_for_job_completion,
        },
        repos::{CustomersRepo, JobsRepo},
        summary::SummaryService,
    },
    config,
    domain::{customer::parse_customer_id, types::JobQueue},
    infra::{
        artifacts::ArtifactStorage,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HealthProbe, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Enqueue(args) => run_enqueue(settings, args).await,
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Jobs(args) => match args.command {
            config::JobsCommand::DeadLetters(list) => run_dead_letters(settings, list).await,
        },
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories.clone(), &settings)?;

    let worker = app.runtime.start_worker();

    let health: Arc<dyn HealthProbe> = repositories.clone();
    let state = HttpState {
        intake: app.intake.clone(),
        queue: app.queue.clone(),
        artifacts: app.artifacts.clone(),
        health,
    };
    let result = serve_http(&settings, state).await;

    app.runtime.shutdown();
    if let Some(handle) = worker {
        drain_worker(handle, settings.worker_drain_timeout()).await;
    }
    repositories.close().await;

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories.clone(), &settings)?;

    let Some(handle) = app.runtime.start_worker() else {
        return Err(AppError::validation(
            "dossier queue is disabled; set jobs.enabled to run a worker",
        ));
    };

    info!(
        target = "kyc_dossier::worker",
        worker_id = app.runtime.worker_id(),
        "worker running; press Ctrl-C to stop"
    );
    shutdown_signal().await;

    app.runtime.shutdown();
    drain_worker(handle, settings.worker_drain_timeout()).await;
    repositories.close().await;
    Ok(())
}

async fn run_enqueue(
    settings: config::Settings,
    args: config::EnqueueArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories.clone(), &settings)?;

    let job_id = app
        .queue
        .enqueue(&args.customer_id)
        .await
        .map_err(|err| match err {
            EnqueueError::InvalidCustomerId(err) => AppError::from(err),
            other => AppError::unexpected(other.to_string()),
        })?;

    info!(
        target = "kyc_dossier::enqueue",
        job_id = %job_id,
        customer_id = %args.customer_id,
        "dossier render enqueued"
    );
    println!("{job_id}");

    if let Some(seconds) = args.wait_seconds {
        let job = wait_for_job_completion(
            app.queue.jobs().as_ref(),
            &job_id,
            Duration::from_secs(seconds),
        )
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
        info!(
            target = "kyc_dossier::enqueue",
            job_id = %job.id,
            attempts = job.attempts,
            "dossier render finished"
        );
    }

    repositories.close().await;
    Ok(())
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let customer_id = parse_customer_id(&args.customer_id)?;
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories.clone(), &settings)?;

    let customers: Arc<dyn CustomersRepo> = repositories.clone();
    let mut profile = customers
        .find_customer(customer_id)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?
        .ok_or(AppError::CustomerNotFound(customer_id))?;

    let artifact = app
        .renderer
        .render(&mut profile)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    println!("{}", artifact.path);
    repositories.close().await;
    Ok(())
}

async fn run_dead_letters(
    settings: config::Settings,
    args: config::DeadLettersArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let jobs: Arc<dyn JobsRepo> = repositories.clone();

    let dead = list_dead_letters(jobs.as_ref(), JobQueue::RenderDossier, args.limit)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    for job in &dead {
        let failed_at = job
            .done_at
            .map(|at| at.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}/{}\t{}\t{}",
            job.id,
            failed_at,
            job.attempts,
            job.max_attempts,
            job.payload,
            job.last_error.as_deref().unwrap_or("-"),
        );
    }
    if dead.is_empty() {
        info!(target = "kyc_dossier::jobs", "no dead-lettered jobs");
    }

    repositories.close().await;
    Ok(())
}

struct ApplicationContext {
    intake: Arc<CustomerIntakeService>,
    queue: DossierQueue,
    artifacts: Arc<ArtifactStorage>,
    renderer: Arc<DossierRenderer>,
    runtime: JobRuntime,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let customers_repo: Arc<dyn CustomersRepo> = repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = repositories;

    let artifacts = Arc::new(
        ArtifactStorage::new(settings.artifacts.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let renderer = Arc::new(DossierRenderer::new(
        artifacts.clone(),
        customers_repo.clone(),
    ));

    let summaries = SummaryService::from_settings(&settings.summary).map_err(AppError::from)?;
    let queue = DossierQueue::new(jobs_repo.clone(), &settings.jobs);
    let intake = Arc::new(CustomerIntakeService::new(
        customers_repo.clone(),
        summaries,
        queue.clone(),
        settings.summary.timeout,
    ));

    let context = JobWorkerContext::new(customers_repo, renderer.clone());
    let runtime = JobRuntime::new(jobs_repo, context, &settings.jobs);

    Ok(ApplicationContext {
        intake,
        queue,
        artifacts,
        renderer,
        runtime,
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "kyc_dossier::serve",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn drain_worker(handle: tokio::task::JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, handle).await.is_err() {
        warn!(
            target = "kyc_dossier::shutdown",
            grace_seconds = grace.as_secs(),
            "worker did not stop within the grace period"
        );
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "kyc_dossier::shutdown",
            error = %err,
            "failed to listen for shutdown signal"
        );
        // Without a signal handler the process can only stop when killed.
        std::future::pending::<()>().await;
    }
    info!(target = "kyc_dossier::shutdown", "shutdown requested");
}
