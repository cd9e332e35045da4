use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::create_backend;

pub async fn handle_status(config: Config, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    let (connected, info) = match create_backend(&config.vector_store) {
        Ok(store) => {
            let connected = store.health_check().await.unwrap_or(false);
            let info = if connected {
                store.get_collection_info().await.ok().flatten()
            } else {
                None
            };
            (connected, info)
        }
        Err(_) => (false, None),
    };

    let status = StatusInfo {
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model_dir: config.embedding.model_dir().display().to_string(),
        max_input_length: config.embedding.max_input_length,
        dimension: config.embedding.dimension,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected: connected,
        collection: config.vector_store.collection.clone(),
        collection_exists: info.is_some(),
        vector_size: info.as_ref().and_then(|i| i.vector_size),
        distance: info.as_ref().and_then(|i| i.distance.clone()),
        points: info.as_ref().map_or(0, |i| i.points_count),
    };

    print!("{}", formatter.format_status(&status));

    if let Some(ref info) = info {
        if !info.matches(config.vector_size()) {
            eprintln!();
            eprintln!(
                "Warning: collection holds {}, but ingestion expects {}-dimensional cosine vectors.",
                info.describe(),
                config.vector_size()
            );
        }
    }

    if !connected && config.vector_store.driver == VectorDriver::Qdrant {
        eprintln!();
        eprintln!("Warning: Qdrant not reachable at {}", config.vector_store.url);
    }

    Ok(())
}
