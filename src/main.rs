mod analysis;
mod app;
mod broker;
mod config;
mod domain;
mod infrastructure;
mod page;
mod panel;
mod platform;
mod scanner;

use anyhow::Result;
use infrastructure::{directories, lifecycle, logging};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (lifecycle, _) = lifecycle::Lifecycle::new();
    lifecycle::install_signal_handlers(lifecycle.clone());

    let app = app::PageSentryApp::initialize(config, lifecycle)?;
    app.run().await
}
