// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

use anyhow::Result;
use sancho::{SyncApp, configuration::SyncConfiguration, telemetry::setup_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SyncConfiguration::parse();
    setup_tracing(config.verbosity)?;

    let app = SyncApp::build_app(config)?;

    // Run the synchronizer until shutdown.
    app.run().await?;

    Ok(())
}
