use anyhow::Result;
use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{ServeFlags, apply_serve_flags};
use crate::core::config::RunboardConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::service::Services;
use crate::core::store::Store;
use crate::core::terminal::{GuideSection, print_goodbye, print_info, print_link};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::{LOG_FEED_CAPACITY, init_tracing};
use crate::platform::{NativePlatform, Platform};

pub async fn run_server(data_dir: &Path, flags: ServeFlags) -> Result<()> {
    if !data_dir.exists() {
        tokio::fs::create_dir_all(data_dir).await?;
        NativePlatform::restrict_dir_permissions(data_dir);
    }

    let mut config = RunboardConfig::load(data_dir).await?;
    apply_serve_flags(&mut config, &flags);

    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(LOG_FEED_CAPACITY);
    init_tracing(&config.logging.level, log_tx.clone());

    info!(
        "Starting runboard (data dir: {}, policy: {:?})",
        data_dir.display(),
        config.runs.transition_policy
    );

    let store = Store::open(config.db_path(data_dir)).await?;
    let services = Services::new(store.clone(), &config);

    let api = ApiServer::new(ApiServerConfig {
        services,
        log_tx,
        api_host: config.server.host.clone(),
        api_port: config.server.port,
    });

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(store)));
    lifecycle.attach(Arc::new(Mutex::new(api)));
    lifecycle.start().await?;
    info!("Lifecycle state: {:?}", lifecycle.state());

    let base = format!("http://{}:{}", config.server.host, config.server.port);
    GuideSection::new("runboard Started")
        .status("Status", &format!("{}", style("RUNNING").green().bold()))
        .status("Store", &config.db_path(data_dir).display().to_string())
        .blank()
        .info(&format!(
            "Run {} to follow a run.",
            style("runboard runs watch <id>").cyan().bold()
        ))
        .hint("Press Ctrl+C to stop.")
        .print();
    print_link("API", &format!("{}/api", base));
    println!();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    print_info("Shutting down...");
    lifecycle.shutdown().await?;
    print_goodbye();
    Ok(())
}
