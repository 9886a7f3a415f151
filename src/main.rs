use std::{process, sync::Arc, time::Duration};

use aula::{
    application::{
        audit::AuditTrailService,
        certificates::CertificateService,
        enrollments::EnrollmentService,
        error::AppError,
        events::EventBus,
        lifecycle::CourseLifecycleService,
        progress::ProgressService,
        repos::{
            AuditRepo, CertificatesRepo, CoursesRepo, CoursesWriteRepo, EnrollmentsRepo,
            ProgressRepo,
        },
    },
    config,
    infra::{
        db::{MemoryRepositories, PostgresRepositories},
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tokio::net::TcpListener;
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
        config::Command::Serve(args) => run_serve(settings, *args).await,
        config::Command::BackfillCertificates(args) => run_backfill(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings, args: config::ServeArgs) -> Result<(), AppError> {
    let state = if args.memory {
        info!(
            target = "aula::server",
            "Serving from the in-memory store; data is lost on shutdown"
        );
        build_api_state(Arc::new(MemoryRepositories::new()), None)
    } else {
        let repositories = init_repositories(&settings).await?;
        build_api_state(repositories.clone(), Some(repositories))
    };

    serve_http(&settings, state).await
}

async fn run_backfill(
    settings: config::Settings,
    args: config::BackfillArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_api_state(repositories.clone(), Some(repositories));

    let summary = state
        .certificates
        .backfill(args.course_id)
        .await
        .map_err(|err| AppError::unexpected(format!("certificate backfill failed: {err}")))?;

    info!(
        target = "aula::backfill",
        examined = summary.examined,
        issued = summary.issued,
        "Backfill completed"
    );
    Ok(())
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
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_api_state<R>(repositories: Arc<R>, db: Option<Arc<PostgresRepositories>>) -> ApiState
where
    R: CoursesRepo
        + CoursesWriteRepo
        + EnrollmentsRepo
        + ProgressRepo
        + CertificatesRepo
        + AuditRepo
        + 'static,
{
    let courses_repo: Arc<dyn CoursesRepo> = repositories.clone();
    let courses_write_repo: Arc<dyn CoursesWriteRepo> = repositories.clone();
    let enrollments_repo: Arc<dyn EnrollmentsRepo> = repositories.clone();
    let progress_repo: Arc<dyn ProgressRepo> = repositories.clone();
    let certificates_repo: Arc<dyn CertificatesRepo> = repositories.clone();
    let audit_repo: Arc<dyn AuditRepo> = repositories.clone();

    let events = Arc::new(EventBus::default());
    let audit = AuditTrailService::new(audit_repo);

    let certificates = CertificateService::new(
        courses_repo.clone(),
        enrollments_repo.clone(),
        certificates_repo,
        audit.clone(),
        events.clone(),
    );
    let lifecycle = CourseLifecycleService::new(
        courses_repo.clone(),
        courses_write_repo,
        enrollments_repo.clone(),
        progress_repo.clone(),
        audit.clone(),
        events.clone(),
    );
    let enrollments = EnrollmentService::new(
        courses_repo.clone(),
        enrollments_repo.clone(),
        progress_repo.clone(),
        audit.clone(),
        events.clone(),
    );
    let progress = ProgressService::new(
        courses_repo,
        enrollments_repo,
        progress_repo,
        certificates.clone(),
        audit.clone(),
        events,
    );

    ApiState {
        lifecycle,
        enrollments,
        progress,
        certificates,
        audit,
        db,
    }
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_api_v1_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "aula::server",
        addr = %settings.server.addr,
        "Listening"
    );

    let grace = settings.server.graceful_shutdown;
    let server = async {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                info!(
                    target = "aula::server",
                    "Shutdown signal received; draining connections"
                );
            })
            .await
    };

    // Both branches watch for the signal; the second one starts the drain
    // clock and wins only if open connections outlive the grace period.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline(grace) => {
            warn!(
                target = "aula::server",
                grace_seconds = grace.as_secs(),
                "Drain deadline passed; closing remaining connections"
            );
        }
    }

    Ok(())
}

async fn drain_deadline(grace: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "ctrl-c handler failed; relying on SIGTERM");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "SIGTERM handler failed; relying on ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {}
