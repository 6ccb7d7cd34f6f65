//! GraphLibrary - IRemoteLibrary implementation for Microsoft Graph API
//!
//! Bundles a [`GraphClient`], a resolved [`LibraryContext`] and the outcome
//! of the column capability check, and routes every port operation to the
//! matching Graph module.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use spsync_core::domain::{Fingerprint, FolderHandle};
use spsync_core::ports::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, MetadataWrite, ProbeResult, RateLimitSummary,
    RemoteEntry, UploadedItem,
};

use crate::client::GraphClient;
use crate::columns::ColumnStatus;
use crate::site::LibraryContext;
use crate::{batch, items, probe, upload};

/// Remote library implementation that delegates to the Microsoft Graph API
pub struct GraphLibrary {
    client: GraphClient,
    context: LibraryContext,
    column: ColumnStatus,
}

impl GraphLibrary {
    pub fn new(client: GraphClient, context: LibraryContext, column: ColumnStatus) -> Self {
        Self {
            client,
            context,
            column,
        }
    }

    pub fn context(&self) -> &LibraryContext {
        &self.context
    }

    /// Whether fingerprints can be read and written.
    pub fn column_available(&self) -> bool {
        self.column.available
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl IRemoteLibrary for GraphLibrary {
    async fn probe_item(
        &self,
        folder: &FolderHandle,
        name: &str,
        with_fingerprint: bool,
    ) -> ProbeResult {
        let field = (with_fingerprint && self.column.available).then_some(self.column.field_name.as_str());
        probe::probe_item(&self.client, &self.context.drive_id, folder, name, field).await
    }

    async fn list_children(&self, folder: &FolderHandle) -> Result<Vec<RemoteEntry>> {
        items::list_children(&self.client, &self.context.drive_id, folder).await
    }

    async fn create_folder(&self, parent: &FolderHandle, name: &str) -> Result<FolderCreation> {
        items::create_folder(&self.client, &self.context.drive_id, parent, name).await
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        items::delete_item(&self.client, &self.context.drive_id, item_id).await
    }

    async fn upload_small(
        &self,
        folder: &FolderHandle,
        name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedItem> {
        upload::upload_small(&self.client, &self.context.drive_id, folder, name, data).await
    }

    async fn create_upload_session(&self, folder: &FolderHandle, name: &str) -> Result<String> {
        upload::create_upload_session(&self.client, &self.context.drive_id, folder, name).await
    }

    async fn upload_chunk(
        &self,
        upload_url: &str,
        data: &[u8],
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome> {
        upload::upload_chunk(&self.client, upload_url, data, offset, total).await
    }

    async fn write_fingerprint(&self, item_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        batch::write_fingerprint(
            &self.client,
            &self.context.drive_id,
            &self.column.field_name,
            item_id,
            fingerprint,
        )
        .await
    }

    async fn write_fingerprints(
        &self,
        writes: &[MetadataWrite],
        batch_size: usize,
    ) -> HashMap<String, bool> {
        batch::write_fingerprints(
            &self.client,
            &self.context.drive_id,
            &self.column.field_name,
            writes,
            batch_size,
        )
        .await
    }

    fn should_slow_down(&self) -> bool {
        self.client.monitor().should_slow_down()
    }

    fn rate_limit_summary(&self) -> Option<RateLimitSummary> {
        Some(self.client.monitor().summary())
    }
}
