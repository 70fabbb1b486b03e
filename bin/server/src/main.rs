//! amber-relay server: event intake, interpretation, wait sweeping, and
//! the operational HTTP surface.

mod config;
mod db;
mod engine;
mod error;
mod routes;

use amber_relay_automation::broker::{NatsDispatcher, NatsEventConsumer};
use amber_relay_automation::{Interpreter, TriggerMatcher};
use amber_relay_email::SmtpMailer;
use amber_relay_scheduler::WaitSweeper;
use config::ServerConfig;
use db::{AutomationRepository, ExecutionRepository, SegmentRepository};
use engine::EventProcessor;
use routes::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let automations = Arc::new(AutomationRepository::new(db_pool.clone()));
    let executions = Arc::new(ExecutionRepository::new(db_pool.clone()));
    let segments = Arc::new(SegmentRepository::new(db_pool.clone()));

    // Broker connections: request/reply dispatch and event intake.
    let broker_config = config.broker.to_broker_config();
    let dispatcher = Arc::new(
        NatsDispatcher::connect(&broker_config)
            .await
            .expect("failed to connect dispatcher to broker"),
    );

    let mailer = Arc::new(SmtpMailer::new(&config.smtp));

    let interpreter = Arc::new(
        Interpreter::new(dispatcher, segments.clone(), mailer)
            .with_max_steps(config.engine.max_steps),
    );
    let matcher = Arc::new(TriggerMatcher::new(segments.clone(), executions.clone()));
    let processor = Arc::new(EventProcessor::new(
        automations.clone(),
        executions.clone(),
        matcher.clone(),
        interpreter.clone(),
    ));

    // Consume domain events from the broker.
    let consumer = NatsEventConsumer::connect(&broker_config)
        .await
        .expect("failed to connect event consumer to broker");
    let event_processor = processor.clone();
    tokio::spawn(async move {
        let result = consumer
            .run(|event| {
                let processor = event_processor.clone();
                async move {
                    processor.process(event).await;
                }
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "event consumer stopped");
        }
    });

    // Spawn the periodic wait sweep.
    let sweeper = WaitSweeper::new(automations.clone(), executions.clone(), interpreter)
        .with_batch_size(config.engine.sweep_batch);
    let sweep_interval_secs = config.engine.sweep_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval_secs));
        loop {
            interval.tick().await;
            match sweeper.sweep(chrono::Utc::now()).await {
                Ok(report) if !report.is_empty() => {
                    tracing::debug!(
                        resumed = report.resumed,
                        missing = report.missing,
                        failed = report.failed,
                        "wait sweep pass"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "wait sweep failed");
                }
            }
        }
    });

    // Operational HTTP surface.
    let app = routes::router(AppState {
        automations,
        executions,
        segments,
        matcher,
        processor,
    });

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.http.bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
