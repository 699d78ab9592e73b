#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use lecture_scheduler::demo::seed_directory;
    use lecture_scheduler::persistence::{MemoryStore, TimetableStore};
    use lecture_scheduler::{EngineConfig, SchedulingEngine, SystemClock, http_api};
    use tracing_subscriber::EnvFilter;

    let config = EngineConfig::from_env()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr: SocketAddr = config.http_addr.parse()?;

    let store: Arc<dyn TimetableStore> = match &config.database_path {
        #[cfg(feature = "sqlite")]
        Some(path) => Arc::new(lecture_scheduler::persistence::SqliteStore::open(path)?),
        #[cfg(not(feature = "sqlite"))]
        Some(_) => return Err("database_path requires the `sqlite` feature".into()),
        None => {
            let store = MemoryStore::new();
            seed_directory(&store)?;
            Arc::new(store)
        }
    };
    let engine = SchedulingEngine::new(store, Arc::new(SystemClock), &config)?;

    tracing::info!(%addr, "lecture-scheduler HTTP API listening");
    http_api::serve(addr, engine).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
