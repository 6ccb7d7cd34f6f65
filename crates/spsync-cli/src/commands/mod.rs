//! CLI subcommands and the Graph wiring they share

pub mod column;
pub mod config;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use spsync_core::config::Config;
use spsync_graph::auth::{AccessTokenSource, ClientCredentialsAuth};
use spsync_graph::client::{GraphClient, TransportRetry};
use spsync_graph::columns::ColumnCapabilityManager;
use spsync_graph::site::{self, LibraryContext};
use tracing::info;

/// Fails with every validation problem of `config`, one per line.
pub(crate) fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = errors.iter().map(|e| format!("  {e}")).collect();
    bail!("Invalid configuration:\n{}", lines.join("\n"))
}

/// Authenticated client for the configured tenant.
///
/// The first token is requested here so that bad credentials stop the run
/// before any file is touched.
pub(crate) async fn graph_client(config: &Config) -> Result<GraphClient> {
    let sp = &config.sharepoint;
    let auth = ClientCredentialsAuth::new(
        &sp.tenant_id,
        &sp.client_id,
        &sp.client_secret,
        &sp.login_endpoint,
        &sp.graph_endpoint,
    )?;
    auth.access_token()
        .await
        .context("Authentication with the identity platform failed")?;

    let retry = TransportRetry {
        max_attempts: config.transport.max_attempts,
        default_retry_after: Duration::from_secs(config.transport.default_retry_after_secs),
        ..TransportRetry::default()
    };
    Ok(
        GraphClient::with_token_source(Arc::new(auth), GraphClient::base_url_for(&sp.graph_endpoint))
            .with_retry(retry),
    )
}

/// Resolves the configured site and library.
pub(crate) async fn resolve_target(client: &GraphClient, config: &Config) -> Result<LibraryContext> {
    let sp = &config.sharepoint;
    info!(site = %config.tenant_url(), library = %config.library_name(), "Resolving target library");
    site::resolve_library(client, &sp.host_name, &sp.site_name, &config.library_name()).await
}

pub(crate) fn column_manager(client: &GraphClient, config: &Config) -> ColumnCapabilityManager {
    ColumnCapabilityManager::new(client.clone(), config.metadata.column_name.clone())
        .with_post_create_wait(Duration::from_secs(config.metadata.post_create_wait_secs))
}
