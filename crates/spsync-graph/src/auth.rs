//! App-only authentication for Microsoft Graph
//!
//! spsync runs unattended, so it authenticates as the application with the
//! OAuth2 client credentials grant rather than on behalf of a user.
//!
//! ## Components
//!
//! - [`AccessTokenSource`] - What `GraphClient` asks for a bearer token
//! - [`StaticToken`] - A fixed token (tests, externally acquired tokens)
//! - [`ClientCredentialsAuth`] - Token acquisition and caching against Azure AD

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, Scope,
    TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::GraphError;

/// Tokens are refreshed when they expire within this window.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Supplies bearer tokens for Graph requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<String>;
}

/// Token source returning the same token every time.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// ClientCredentialsAuth
// ============================================================================

#[derive(Debug)]
struct CachedToken {
    secret: String,
    expires_at: Instant,
}

/// Client credentials flow against the Microsoft identity platform.
///
/// Requests `https://{graph_endpoint}/.default` from
/// `https://{login_endpoint}/{tenant}/oauth2/v2.0/token`. The token is cached
/// and re-requested once it is within five minutes of expiry.
pub struct ClientCredentialsAuth {
    client: BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsAuth {
    /// Creates the flow for a tenant on the given sovereign-cloud endpoints.
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        login_endpoint: &str,
        graph_endpoint: &str,
    ) -> Result<Self> {
        let token_url = format!("https://{login_endpoint}/{tenant_id}/oauth2/v2.0/token");
        Self::with_token_url(token_url, client_id, client_secret, graph_endpoint)
    }

    /// Creates the flow against an explicit token URL (useful for testing).
    pub fn with_token_url(
        token_url: impl Into<String>,
        client_id: &str,
        client_secret: &str,
        graph_endpoint: &str,
    ) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(TokenUrl::new(token_url.into()).context("Invalid token URL")?);

        // The token endpoint must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build token HTTP client")?;

        Ok(Self {
            client,
            scope: format!("https://{graph_endpoint}/.default"),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Scope requested from the token endpoint.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    async fn request_token(&self) -> Result<CachedToken> {
        debug!(scope = %self.scope, "Requesting app-only access token");

        let response = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| GraphError::Auth(e.to_string()))?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_LIFETIME);
        info!(expires_in_secs = lifetime.as_secs(), "Obtained access token");

        Ok(CachedToken {
            secret: response.access_token().secret().to_string(),
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl AccessTokenSource for ClientCredentialsAuth {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.secret.clone());
            }
            debug!("Access token close to expiry, refreshing");
        }

        let token = self.request_token().await?;
        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }
}
