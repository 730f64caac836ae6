mod cli;

use clap::Parser;
use cli::{Cli, Commands, InvokeArgs};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{error, info};

use thumbnailer::config::Config;
use thumbnailer::observability::{self, Metrics};
use thumbnailer::pipeline::Pipeline;
use thumbnailer::queue::SqsQueue;
use thumbnailer::server;
use thumbnailer::storage::StorageClient;
use thumbnailer::worker::{Poller, PollerConfig, SqsBatchEvent, handle_batch, serve_lambda};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.telemetry);

    let metrics = Arc::new(Metrics::new());
    let storage = Arc::new(StorageClient::from_config(&config.storage));
    let pipeline = Arc::new(Pipeline::from_config(
        &config.thumbnail,
        storage,
        metrics.clone(),
    )?);

    match cli.command {
        Commands::Poll => poll(&config, pipeline, metrics).await?,
        Commands::Lambda => {
            info!(bucket = pipeline.destination_bucket(), "Starting Lambda runtime");
            serve_lambda(pipeline).await?
        }
        Commands::Invoke(args) => invoke(&pipeline, &args).await?,
    }

    Ok(())
}

async fn poll(config: &Config, pipeline: Arc<Pipeline>, metrics: Arc<Metrics>) -> Result<(), AnyError> {
    config.validate_for_polling()?;
    let queue = SqsQueue::connect(&config.queue).await?;

    info!(
        queue_url = queue.queue_url(),
        bucket = pipeline.destination_bucket(),
        prefix = pipeline.destination_prefix(),
        "Starting thumbnail worker"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let health = config.telemetry.health_addr.map(|address| {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let stopped = async move {
                let _ = shutdown.changed().await;
            };
            if let Err(e) = server::serve(address, metrics, stopped).await {
                error!(error = %e, "Health endpoint failed");
            }
        })
    });

    let poller = Poller::new(Arc::new(queue), pipeline, PollerConfig::from_config(config));
    let mut shutdown = shutdown_rx;
    poller
        .run(async move {
            let _ = shutdown.changed().await;
        })
        .await;

    if let Some(handle) = health {
        if let Err(e) = handle.await {
            error!(error = %e, "Health endpoint task panicked");
        }
    }

    Ok(())
}

async fn invoke(pipeline: &Pipeline, args: &InvokeArgs) -> Result<(), AnyError> {
    let input = if args.event == "-" {
        let mut input = String::new();
        tokio::io::stdin().read_to_string(&mut input).await?;
        input
    } else {
        tokio::fs::read_to_string(&args.event).await?
    };

    let event = SqsBatchEvent::from_json(&input)?;
    info!(records = event.records.len(), "Processing batch event");

    let response = handle_batch(pipeline, event).await;
    println!("{}", serde_json::to_string(&response)?);

    Ok(())
}
