use std::sync::Arc;

use anyhow::{Error, Result};
use ticket_notification::{
    api::{AppState, run_api_server},
    clients::{
        database::{DatabaseClient, OrderRepository},
        health::HealthChecker,
        mail::SmtpMailer,
        pdf::ChromePdfRenderer,
        qr::PngQrEncoder,
        rbmq::RabbitMqClient,
        template::TemplateRenderer,
    },
    command::{NotificationCommand, NotificationPipeline},
    config::Config,
    dispatcher::{Dispatcher, MessageBus},
    models::message::Topic,
    utils::init_tracing,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing();

    info!("Starting ticket notification service");

    let database = Arc::new(
        DatabaseClient::connect(
            &config.mongodb_url,
            &config.mongodb_database,
            &config.order_collection,
        )
        .await?,
    );
    let bus: Arc<dyn MessageBus> = Arc::new(RabbitMqClient::connect(&config).await?);
    let mailer = Arc::new(SmtpMailer::new(&config.smtp_config())?);

    let templates = Arc::new(TemplateRenderer::new()?);
    let pdf = Arc::new(ChromePdfRenderer::new(
        templates.clone(),
        config.chrome_path.clone(),
        config.pdf_render_timeout(),
    ));

    let command: Arc<dyn NotificationCommand> = Arc::new(NotificationPipeline::new(
        Arc::new(OrderRepository::new(
            database.clone(),
            config.order_query_timeout(),
        )),
        mailer.clone(),
        templates,
        pdf,
        Arc::new(PngQrEncoder::new(config.qr_code_size)),
        config.pipeline_settings(),
    ));

    let dispatcher = Arc::new(
        Dispatcher::new(command.clone(), bus.clone())
            .bind(config.otp_topic.clone(), Topic::RegisterOtp)
            .bind(config.ticket_topic.clone(), Topic::TicketEmail)
            .with_failure_policy(config.failure_policy()?),
    );
    info!(
        policy = dispatcher.failure_policy().name(),
        "Failure policy selected"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumers = dispatcher.spawn_consumers(shutdown_rx.clone());

    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(database, bus, mailer),
        command,
    });
    let server = tokio::spawn(run_api_server(
        config.server_port,
        state,
        shutdown_rx,
    ));

    shutdown_signal().await;
    info!("Shutdown signal received, stopping consumers");

    if shutdown_tx.send(true).is_err() {
        warn!("No task was listening for shutdown");
    }

    for consumer in consumers {
        match consumer.await {
            Ok(Ok(processed)) => info!(processed, "Consumer stopped"),
            Ok(Err(e)) => error!(error = %e, "Consumer stopped with error"),
            Err(e) => error!(error = %e, "Consumer task panicked"),
        }
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server stopped with error"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    info!("Ticket notification service stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
