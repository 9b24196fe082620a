use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docqueue_core::{
    Document, GetOptions, InMemoryDocumentStore, Queue, QueueConfig, QueueError, SendOptions,
};

type DemoQueue = Queue<Arc<InMemoryDocumentStore>>;

/// In-memory walkthrough of the queue: send, claim, requeue, ack.
#[derive(Debug, Parser)]
#[command(name = "docqueue", version)]
struct Args {
    /// TOML file with `[get]` / `[index]` sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of messages to send
    #[arg(long, default_value_t = 5)]
    messages: u32,

    /// Claim duration before a message counts as stuck
    #[arg(long, default_value_t = 30)]
    reset_secs: i64,
}

fn load_config(path: Option<&PathBuf>) -> Result<QueueConfig> {
    let Some(path) = path else {
        return Ok(QueueConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// worker：get → 処理 → ack / requeue
///
/// seq 0 のメッセージだけ 1 度 ack_send で送り直し、それ以外（と送り直した分）は ack する。
async fn worker_loop(
    queue: Arc<DemoQueue>,
    options: GetOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let filter = Document::new().with("type", "hello");
    loop {
        let handle = match queue.get_until_shutdown(&filter, &options, &mut shutdown).await {
            Ok(Some(handle)) => handle,
            Ok(None) => continue,
            Err(QueueError::Interrupted) => {
                info!("worker stopping");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let id = handle.id()?;
        let requeued = handle.get("requeued").and_then(|v| v.as_bool()).unwrap_or(false);
        if !requeued && handle.get("seq").and_then(|v| v.as_f64()) == Some(0.0) {
            let payload = handle.payload().with("requeued", true);
            queue
                .ack_send(&handle, payload, SendOptions::new().priority(-1.0))
                .await?;
            info!(%id, "requeued message once");
            continue;
        }

        info!(%id, name = %handle.get("name").map(ToString::to_string).unwrap_or_default(), "processed");
        queue.ack(&handle).await?;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    // (A) ストアと Queue を用意し、get / count 用のインデックスを作る
    let store = Arc::new(InMemoryDocumentStore::new());
    let queue = Arc::new(Queue::with_config(store.clone(), config));
    let options = queue.get_options(TimeDelta::seconds(args.reset_secs));
    queue
        .ensure_get_index(&Document::new().with("type", 1), &Document::new())
        .await?;
    queue
        .ensure_count_index(&Document::new().with("type", 1), true)
        .await?;

    // (B) メッセージ投入（後に送ったものほど priority が小さい = 先に取り出される）
    for seq in 0..args.messages {
        let payload = serde_json::json!({
            "type": "hello",
            "name": format!("message-{seq}"),
            "seq": seq,
        });
        let priority = f64::from(args.messages - seq);
        let id = queue.send(payload, SendOptions::new().priority(priority)).await?;
        info!(%id, seq, priority, "sent");
    }

    // (C) worker を起動
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(worker_loop(queue.clone(), options, shutdown_rx));

    // (D) キューが空になるまでポーリング
    let filter = Document::new().with("type", "hello");
    loop {
        let counts = queue.counts(&filter).await?;
        info!(counts = %serde_json::to_string(&counts)?, "queue depth");
        if counts.total == 0 || worker.is_finished() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    // (E) worker を止める
    if shutdown_tx.send(true).is_err() {
        warn!("worker already gone");
    }
    worker.await.context("worker panicked")??;

    info!(remaining = store.len().await, "done");
    Ok(())
}
