mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use cli::{Args, BlobBackend, QueueBackend};
use darkroom_core::WorkerGroup;
use darkroom_core::app::{Pipeline, PipelineBuilder};
use darkroom_core::domain::StageKind;
use darkroom_core::impls::{
    ImageBackend, InMemoryDeliveryQueue, LocalBlobStore, NullDetector, OrtDetector,
    RedisDeliveryQueue, S3BlobStore,
};
use darkroom_core::ports::{BlobStore, DeliveryQueue};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse_args();
    let stages = args.stages();

    let pipeline = build_pipeline(&args).await?;
    info!(
        backend = ?args.queue_backend,
        blobs = ?args.blob_backend,
        stages = ?stages,
        ingress = args.serves_ingress(),
        "darkroom starting"
    );

    let group = WorkerGroup::spawn(pipeline.workers(&stages));

    if args.serves_ingress() {
        let addr = SocketAddr::new(args.host, args.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("ingress listening on http://{}", listener.local_addr()?);

        axum::serve(listener, pipeline.ingress())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    info!("shutting down; waiting for in-flight jobs");
    group.shutdown_and_join().await;
    Ok(())
}

async fn build_pipeline(args: &Args) -> Result<Pipeline> {
    let mut builder = PipelineBuilder::new()
        .config(args.pipeline_config())
        .blobs(blob_store(args).await?)
        .transform(Arc::new(ImageBackend::new()));

    // モデルが要るのは object-detect だけ。未指定なら builder が NullDetector に落として警告する
    if !args.stages().contains(&StageKind::ObjectDetect) {
        builder = builder.detector(Arc::new(NullDetector::new()));
    } else if let Some(path) = &args.model_path {
        let detector = OrtDetector::open(path)
            .with_context(|| format!("failed to load detection model {}", path.display()))?;
        builder = builder.detector(Arc::new(detector));
    }

    match args.queue_backend {
        QueueBackend::Memory => {
            if !matches!(args.command, cli::Command::All) {
                warn!("memory queue is process-local; other processes will not see these jobs");
            }
            builder = builder.queue(Arc::new(InMemoryDeliveryQueue::new()));
        }
        QueueBackend::Redis => {
            builder = builder.queue(redis_queue(args).await?);
            // BRPOP が接続を塞ぐので worker ごとに別接続
            for kind in args.stages() {
                builder = builder.stage_queue(kind, redis_queue(args).await?);
            }
        }
    }

    Ok(builder.build()?)
}

async fn blob_store(args: &Args) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match args.blob_backend {
        BlobBackend::Local => Arc::new(
            LocalBlobStore::open(&args.store_root, &args.bucket)
                .await
                .with_context(|| format!("failed to open blob store at {}", args.store_root.display()))?,
        ),
        BlobBackend::S3 => Arc::new(
            S3BlobStore::open(&args.s3_settings(), &args.bucket)
                .await
                .with_context(|| format!("failed to open bucket {} at {}", args.bucket, args.minio_endpoint))?,
        ),
    };
    Ok(store)
}

async fn redis_queue(args: &Args) -> Result<Arc<dyn DeliveryQueue>> {
    let queue = RedisDeliveryQueue::connect(&args.redis_host, args.redis_port)
        .await
        .with_context(|| format!("failed to connect to redis at {}:{}", args.redis_host, args.redis_port))?;
    Ok(Arc::new(queue))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received");
}
