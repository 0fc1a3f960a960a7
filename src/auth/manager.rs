//! Owner of the process-wide Twitch credential.
//!
//! The cached credential is served without I/O while it is fresh. Once it
//! enters the renewal window the manager re-reads the persisted record and,
//! if that is stale too, performs exactly one token exchange. Exchanges are
//! serialized behind `renewal` so concurrent callers share one in-flight
//! renewal instead of each issuing their own.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::credential::{Credential, Freshness};
use super::error::CredentialError;
use super::exchange::{Grant, TokenExchange};
use super::store::CredentialStore;

/// Tunables for [`CredentialManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Lead time before expiry at which the credential is renewed
    pub renewal_skew: Duration,
    /// Whether an app access token may be minted with the client-credentials grant
    pub allow_client_credentials: bool,
    /// Redirect URI registered for the authorization-code flow
    pub redirect_uri: String,
}

/// Snapshot of the cached credential, without secrets.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub freshness: Freshness,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
}

pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    cache: RwLock<Credential>,
    renewal: Mutex<()>,
    options: ManagerOptions,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        options: ManagerOptions,
    ) -> Self {
        CredentialManager {
            store,
            exchange,
            cache: RwLock::new(Credential::default()),
            renewal: Mutex::new(()),
            options,
        }
    }

    /// Load the persisted record into the cache. Called once at startup.
    pub async fn hydrate(&self) -> Result<(), CredentialError> {
        if let Some(rec) = self.store.fetch().await? {
            let updated_at = rec.updated_at;
            let cred = Credential::from(rec);
            info!(
                "Credential hydrated from store (written {}, expires at {:?})",
                updated_at, cred.expires_at
            );
            *self.cache.write().await = cred;
        } else {
            info!("No persisted credential found");
        }
        Ok(())
    }

    /// Return an access token, renewing the credential if it is inside the
    /// renewal window.
    pub async fn acquire(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.fresh_cached(Utc::now()).await {
            return Ok(token);
        }

        let _guard = self.renewal.lock().await;

        // Another caller may have renewed while we waited on the guard.
        let now = Utc::now();
        if let Some(token) = self.fresh_cached(now).await {
            return Ok(token);
        }

        let stored = match self.store.fetch().await? {
            Some(rec) => Credential::from(rec),
            None => Credential::default(),
        };

        let grant = match stored.freshness(now, self.options.renewal_skew) {
            Freshness::Fresh => {
                let token = stored.access_token.clone().unwrap_or_default();
                *self.cache.write().await = stored;
                return Ok(token);
            }
            Freshness::Missing => {
                if !self.options.allow_client_credentials {
                    warn!("No credential stored and client-credentials grant disabled");
                    return Err(CredentialError::Unavailable);
                }
                Grant::ClientCredentials
            }
            Freshness::NeedsRenewal | Freshness::Expired => match self.renewal_grant(&stored) {
                Some(grant) => grant,
                None => {
                    warn!("Credential is due for renewal but no renewal path is configured");
                    return stored
                        .unexpired_token(now)
                        .map(str::to_string)
                        .ok_or(CredentialError::Unavailable);
                }
            },
        };

        match self.renew(grant).await {
            Ok(token) => Ok(token),
            Err(CredentialError::RenewalFailed(reason)) => {
                warn!("Credential renewal failed: {}", reason);
                stored
                    .unexpired_token(now)
                    .map(str::to_string)
                    .ok_or(CredentialError::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    /// Force a renewal after the platform rejected `rejected_token`.
    ///
    /// If the cache already holds a different fresh token, someone else has
    /// renewed in the meantime and that token is returned without a new
    /// exchange.
    pub async fn renew_rejected(&self, rejected_token: &str) -> Result<String, CredentialError> {
        let _guard = self.renewal.lock().await;

        let now = Utc::now();
        let mut current = self.cache.read().await.clone();
        if let Some(token) = current.access_token.as_deref() {
            if token != rejected_token
                && current.freshness(now, self.options.renewal_skew) == Freshness::Fresh
            {
                return Ok(token.to_string());
            }
        }

        if current.access_token.is_none() {
            if let Some(rec) = self.store.fetch().await? {
                current = Credential::from(rec);
            }
        }

        let grant = self
            .renewal_grant(&current)
            .ok_or(CredentialError::Unavailable)?;
        info!("Access token rejected, renewing via {}", grant.grant_type());
        self.renew(grant).await
    }

    /// Complete the OAuth redirect callback by exchanging `code` for a user
    /// credential.
    pub async fn complete_authorization(&self, code: &str) -> Result<(), CredentialError> {
        let _guard = self.renewal.lock().await;
        self.renew(Grant::AuthorizationCode {
            code: code.to_string(),
            redirect_uri: self.options.redirect_uri.clone(),
        })
        .await?;
        info!("Authorization code exchanged, credential seeded");
        Ok(())
    }

    pub async fn status(&self) -> CredentialStatus {
        let cred = self.cache.read().await;
        CredentialStatus {
            freshness: cred.freshness(Utc::now(), self.options.renewal_skew),
            expires_at: cred.expires_at,
            has_refresh_token: cred.refresh_token.is_some(),
        }
    }

    async fn fresh_cached(&self, now: DateTime<Utc>) -> Option<String> {
        let cred = self.cache.read().await;
        match cred.freshness(now, self.options.renewal_skew) {
            Freshness::Fresh => cred.access_token.clone(),
            _ => None,
        }
    }

    fn renewal_grant(&self, cred: &Credential) -> Option<Grant> {
        match &cred.refresh_token {
            Some(token) => Some(Grant::RefreshToken(token.clone())),
            None if self.options.allow_client_credentials => Some(Grant::ClientCredentials),
            None => None,
        }
    }

    /// Perform one exchange, then replace the cache and persist the new
    /// triple. Must be called with `renewal` held.
    async fn renew(&self, grant: Grant) -> Result<String, CredentialError> {
        let resp = self.exchange.exchange(&grant).await?;
        let cred = Credential::issued(
            resp.access_token.clone(),
            resp.refresh_token,
            resp.expires_in,
            Utc::now(),
        )
        .ok_or_else(|| {
            CredentialError::RenewalFailed(format!(
                "token lifetime out of range: {}s",
                resp.expires_in
            ))
        })?;

        // The provider may rotate the refresh token, so the new triple is
        // cached even if the write below fails.
        *self.cache.write().await = cred.clone();

        let expires_at_ms = cred.expires_at_ms().unwrap_or_default();
        if let Err(e) = self
            .store
            .upsert(&resp.access_token, cred.refresh_token.as_deref(), expires_at_ms)
            .await
        {
            error!("Failed to persist renewed credential: {}", e);
        }

        info!(
            "Credential renewed via {} (expires in {}s)",
            grant.grant_type(),
            resp.expires_in
        );
        Ok(resp.access_token)
    }
}
