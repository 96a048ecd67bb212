// src/main.rs

//! Pipeline entry point.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Initialise SQLite (WAL) and spawn the batched match writer
//! 3. Wire the event and match queues, compile the initial rule engine
//! 4. Launch the feed sources and the matching loop
//! 5. Ctrl-C drains gracefully; a second Ctrl-C drops buffered events

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;

use sigwatch::config::load_master_config;
use sigwatch::config::types::MasterConfig;
use sigwatch::db::{MatchWriter, init_database, open_db_connection};
use sigwatch::pipeline::AckQueue;
use sigwatch::processor::{MatchProcessor, MatchSink};
use sigwatch::sources::build_sources;

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Configure global logging as requested in `master.logging`.
fn setup_logging(master: &MasterConfig) -> Result<(), fern::InitError> {
    let level = match master.logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if master.logging.enable {
        let path = master.logging.file.as_deref().unwrap_or("sigwatch.log");
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    // 1 ─ Config & logging
    let cfg_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("default.toml"));
    let master = load_master_config(&cfg_path).unwrap_or_else(|e| fatal!("config", "{}", e));
    setup_logging(&master).expect("logging setup failed");
    log::info!("logging up and running");

    // 2 ─ Database: one connection for the writer, one shared by the
    //     per-source index caches.
    let writer_conn = init_database(&master.database).unwrap_or_else(|e| fatal!("database", "{}", e));
    let cache_conn = open_db_connection(&master.database.path, &master.database)
        .unwrap_or_else(|e| fatal!("database", "{}", e));
    let cache_conn = Arc::new(Mutex::new(cache_conn));

    // 3 ─ Queues & processor
    let event_queue = Arc::new(AckQueue::new(master.pipeline.event_queue_size));
    let match_queue = Arc::new(AckQueue::unbounded());
    let processor = Arc::new(
        MatchProcessor::new(
            &master.rules.paths,
            Arc::clone(&event_queue),
            Arc::clone(&match_queue) as Arc<dyn MatchSink>,
        )
        .unwrap_or_else(|e| fatal!("rules", "{}", e)),
    );

    let writer = MatchWriter {
        conn: writer_conn,
        queue: Arc::clone(&match_queue),
        flush_interval_ms: master.database.flush_interval_ms,
        batch_size: master.database.batch_size,
    };
    let writer_task = tokio::spawn(writer.run());

    // 4 ─ Sources & main loop
    let sources =
        build_sources(&master.sources, &cache_conn).unwrap_or_else(|e| fatal!("sources", "{}", e));
    log::info!("scheduling {} source(s)", sources.len());
    for mut source in sources {
        let queue = Arc::clone(&event_queue);
        tokio::spawn(async move { source.fetch_events_scheduled(queue).await });
    }

    let mut processor_task = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.process().await })
    };
    log::info!("main loop initialized");

    // 5 ─ Shutdown
    tokio::signal::ctrl_c().await.expect("signal handler failed");
    log::warn!("Ctrl-C received, draining buffered events (press again to drop them)");
    if processor.stop_processing(false).await.is_err() {
        log::error!("control queue closed, aborting");
        return;
    }

    tokio::select! {
        _ = &mut processor_task => {}
        _ = tokio::signal::ctrl_c() => {
            log::warn!("second Ctrl-C, dropping buffered events");
            let _ = processor.stop_processing(true).await;
            let _ = (&mut processor_task).await;
        }
    }

    // Let the writer flush whatever is left, then exit.
    match_queue.close();
    let _ = writer_task.await;
    log::info!("shutdown complete");
}
