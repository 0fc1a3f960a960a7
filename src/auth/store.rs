//! Credential persistence abstraction.
//!
//! The manager only needs "write the whole triple" and "read it back"; the
//! SQLite-backed implementation lives on [`Database`].

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::CredentialRecord;
use crate::db::Database;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the single credential record. Returns the record id.
    async fn upsert(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<String>;

    async fn fetch(&self) -> Result<Option<CredentialRecord>>;
}

#[async_trait]
impl CredentialStore for Database {
    async fn upsert(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<String> {
        self.upsert_credential(access_token, refresh_token, expires_at_ms)
    }

    async fn fetch(&self) -> Result<Option<CredentialRecord>> {
        self.fetch_credential()
    }
}
