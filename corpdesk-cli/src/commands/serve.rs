//! Serve command - builds the context from the environment and runs the API.

use anyhow::{Context, Result};
use corpdesk::{App, AppContext, ConfigBuilder};

use crate::cli::ServeArgs;

pub async fn run(args: ServeArgs) -> Result<()> {
    let mut builder = ConfigBuilder::new().from_env();
    if let Some(host) = args.host {
        builder = builder.with_host(host);
    }
    if let Some(port) = args.port {
        builder = builder.with_port(port);
    }
    let config = builder.build().context("invalid configuration")?;

    corpdesk::init_tracing_with_config(&config);
    tracing::info!(
        base_url = %config.server.base_url(),
        dev_mode = config.dev.enabled,
        "Starting corpdesk"
    );

    let context = AppContext::from_config(config)
        .await
        .context("failed to initialise services")?;
    App::new(context).serve().await.context("server error")?;
    Ok(())
}
