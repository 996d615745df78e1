use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_engine::init_sled_db;
use cf_engine::parse_command;
use cf_engine::ChangeEvent;
use cf_engine::ChangeFeedProcessorBuilder;
use cf_engine::ChangeHandler;
use cf_engine::ConsoleCommand;
use cf_engine::HandlerError;
use cf_engine::Producer;
use cf_engine::Result;
use cf_engine::Settings;
use cf_engine::SledLeaseStore;
use cf_engine::SledSourceStore;
use cf_engine::SourceStore;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// The delegate that receives batches of changes as they appear in the feed.
struct ConsoleChangeHandler;

#[async_trait]
impl ChangeHandler for ConsoleChangeHandler {
    async fn handle_changes(
        &self,
        batch: &[ChangeEvent],
    ) -> std::result::Result<(), HandlerError> {
        println!("Started handling changes...");
        for event in batch {
            println!(
                "Detected operation for item with id {}, created at {}.",
                event.record.id, event.record.creation_time_ms
            );
            // Simulate some asynchronous operation
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        println!("Finished handling changes.");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;

    // Initializing Logs
    let _guard = init_observability()?;

    // Initializing Containers
    let db = init_sled_db(&settings.storage.db_path)?;
    let source: Arc<SledSourceStore> = Arc::new(SledSourceStore::new(db.clone()));
    source
        .create_collection_if_absent(
            &settings.storage.source_collection,
            &settings.storage.partition_key_path,
        )
        .await?;
    let lease_store = Arc::new(SledLeaseStore::new(db, &settings.storage.lease_collection)?);

    // Start the processor
    println!("Starting change feed processor...");
    let mut processor = ChangeFeedProcessorBuilder::new(&settings)
        .source(source.clone())
        .lease_store(lease_store)
        .handler(Arc::new(ConsoleChangeHandler))
        .build()?;
    processor.start().await?;
    println!("Change feed processor started.");

    generate_items(source, &settings).await;

    println!("Stopping change feed processor...");
    processor.stop().await?;
    println!("Stopped change feed processor.");
    Ok(())
}

/// Interactive driver: inserts records based on console input until `exit`
/// or Ctrl+C.
async fn generate_items(
    source: Arc<SledSourceStore>,
    settings: &Settings,
) {
    let producer = Producer::new(source, settings.storage.source_collection.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("Enter a number of items to insert in the collection or 'exit' to stop:");
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("failed to read console input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
                break;
            }
        };

        match parse_command(&line) {
            Some(ConsoleCommand::Exit) => {
                println!();
                break;
            }
            Some(ConsoleCommand::Insert(count)) => {
                println!("Generating {} items...", count);
                match producer.generate(count).await {
                    Ok(report) if report.inserted == report.requested => {}
                    Ok(report) => println!(
                        "Insert aborted: {} of {} items completed.",
                        report.inserted, report.requested
                    ),
                    Err(e) => error!("generation failed: {:?}", e),
                }
            }
            // Anything else is ignored and re-prompted
            None => {}
        }
    }
}

fn init_observability() -> Result<WorkerGuard> {
    cf_engine::metrics::register_custom_metrics();

    let log_file = open_file_for_append(Path::new("logs").join("cf-engine.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

fn open_file_for_append(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(cf_engine::StorageError::IoError)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(cf_engine::StorageError::IoError)?;
    Ok(file)
}
