//! Fingerprint column capability management
//!
//! The fingerprint lives in a custom single-line text column of the document
//! library. [`ColumnCapabilityManager`] makes sure the column exists, checks
//! that it is usable, and maps display names to the internal field names
//! SharePoint expects in `fields` payloads.
//!
//! Verification problems are reported as warnings only. A freshly created
//! column is often not queryable for a while, and later probes re-check it.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use spsync_core::metadata_debug;
use tracing::{info, warn};

use crate::client::GraphClient;
use crate::site::LibraryContext;
use crate::error_from_response;

/// Minimum max-length able to hold a 32 character fingerprint.
const MIN_TEXT_LENGTH: u64 = 32;

/// Max length of a newly created column.
const CREATED_TEXT_LENGTH: u64 = 255;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDefinition {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    text: Option<TextFacet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextFacet {
    #[serde(default)]
    max_length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ColumnCollection {
    #[serde(default)]
    value: Vec<ColumnDefinition>,
}

impl ColumnDefinition {
    fn matches(&self, column: &str) -> bool {
        self.name.as_deref() == Some(column) || self.display_name.as_deref() == Some(column)
    }

    fn column_type(&self) -> &'static str {
        if self.text.is_some() {
            "text"
        } else {
            "other"
        }
    }
}

/// Cached description of one library column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub internal_name: String,
    pub column_type: String,
    pub id: Option<String>,
    pub description: Option<String>,
}

/// Result of [`ColumnCapabilityManager::ensure_column`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStatus {
    /// Whether fingerprints can be stored at all
    pub available: bool,
    /// Library the column was checked on
    pub library_name: String,
    /// Internal name to use in `fields` payloads
    pub field_name: String,
}

/// Soft problems found by verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnReport {
    pub warnings: Vec<String>,
}

impl ColumnReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Ensures the fingerprint column and resolves field names.
///
/// Holds the per-(site, list) column mapping cache, populated once per pair
/// and never invalidated during a run.
pub struct ColumnCapabilityManager {
    client: GraphClient,
    column: String,
    post_create_wait: Duration,
    mappings: DashMap<(String, String), HashMap<String, ColumnInfo>>,
}

impl ColumnCapabilityManager {
    pub fn new(client: GraphClient, column: impl Into<String>) -> Self {
        Self {
            client,
            column: column.into(),
            post_create_wait: Duration::from_secs(2),
            mappings: DashMap::new(),
        }
    }

    /// Sets the pause between creating the column and verifying it.
    pub fn with_post_create_wait(mut self, wait: Duration) -> Self {
        self.post_create_wait = wait;
        self
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    fn columns_path(library: &LibraryContext) -> String {
        format!("/sites/{}/lists/{}/columns", library.site_id, library.list_id)
    }

    async fn list_columns(&self, library: &LibraryContext) -> Result<Vec<ColumnDefinition>> {
        let columns: ColumnCollection = self
            .client
            .get_json(&Self::columns_path(library))
            .await
            .context("Failed to list library columns")?;
        Ok(columns.value)
    }

    /// Checks for the fingerprint column, creating it when absent.
    ///
    /// A column whose display name differs only in case, or whose internal
    /// name is the encoded form of the configured name, counts as present.
    /// Only a failed lookup or a failed creation makes the column unavailable.
    pub async fn ensure_column(&self, library: &LibraryContext) -> ColumnStatus {
        let unavailable = || ColumnStatus {
            available: false,
            library_name: library.list_name.clone(),
            field_name: self.column.clone(),
        };

        let columns = match self.list_columns(library).await {
            Ok(columns) => columns,
            Err(e) => {
                warn!(column = %self.column, error = %format!("{e:#}"), "Could not read library columns");
                return unavailable();
            }
        };

        self.cache_mapping(library, &columns);
        let definition = match self.find_column(library, columns) {
            Some(existing) => {
                info!(
                    column = %self.column,
                    field = existing.name.as_deref().unwrap_or(&self.column),
                    library = %library.list_name,
                    "Fingerprint column found"
                );
                existing
            }
            None => match self.create_column(library).await {
                Ok(created) => {
                    info!(
                        column = %self.column,
                        wait_ms = self.post_create_wait.as_millis() as u64,
                        "Created fingerprint column, waiting before verification"
                    );
                    tokio::time::sleep(self.post_create_wait).await;
                    created
                }
                Err(e) => {
                    warn!(column = %self.column, error = %format!("{e:#}"), "Could not create fingerprint column");
                    return unavailable();
                }
            },
        };

        let report = self.verify(library, &definition).await;
        for warning in &report.warnings {
            warn!(column = %self.column, "{warning}");
        }

        let field_name = definition.name.clone().unwrap_or_else(|| self.column.clone());
        ColumnStatus {
            available: true,
            library_name: library.list_name.clone(),
            field_name,
        }
    }

    /// Exact name match first, then the column `resolve_field_name` maps
    /// the configured name to.
    fn find_column(&self, library: &LibraryContext, columns: Vec<ColumnDefinition>) -> Option<ColumnDefinition> {
        if let Some(i) = columns.iter().position(|c| c.matches(&self.column)) {
            return columns.into_iter().nth(i);
        }
        let resolved = self.resolve_field_name(&library.site_id, &library.list_id, &self.column);
        let found = columns.into_iter().find(|c| c.name.as_deref() == Some(resolved.as_str()));
        if found.is_some() {
            metadata_debug!(column = %self.column, field = %resolved, "Column matched through field name resolution");
        }
        found
    }

    async fn create_column(&self, library: &LibraryContext) -> Result<ColumnDefinition> {
        let body = serde_json::json!({
            "displayName": self.column,
            "name": self.column,
            "description": "Content fingerprint maintained by spsync",
            "enforceUniqueValues": false,
            "hidden": false,
            "indexed": false,
            "readOnly": false,
            "required": false,
            "text": {
                "allowMultipleLines": false,
                "appendChangesToExistingText": false,
                "linesForEditing": 0,
                "maxLength": CREATED_TEXT_LENGTH
            }
        });

        let response = self
            .client
            .execute(Method::POST, &Self::columns_path(library), |r| r.json(&body))
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(error_from_response(response).await).context("Column creation was refused");
        }
        response
            .json()
            .await
            .context("Failed to parse created column")
    }

    async fn verify(&self, library: &LibraryContext, column: &ColumnDefinition) -> ColumnReport {
        let mut report = ColumnReport::default();

        if column.read_only {
            report.warnings.push("Column is read-only".to_string());
        }
        if column.hidden {
            report.warnings.push("Column is hidden".to_string());
        }
        match &column.text {
            None => report.warnings.push("Column is not a text column".to_string()),
            Some(text) => {
                if let Some(max) = text.max_length.filter(|m| *m < MIN_TEXT_LENGTH) {
                    report.warnings.push(format!(
                        "Column max length {max} is below the {MIN_TEXT_LENGTH} characters a fingerprint needs"
                    ));
                }
            }
        }

        let field = column.name.as_deref().unwrap_or(&self.column);
        let probe = format!(
            "/sites/{}/lists/{}/items?$top=1&$expand=fields($select={field})",
            library.site_id, library.list_id
        );
        match self.client.execute(Method::GET, &probe, |r| r).await {
            Ok(response) if response.status() == StatusCode::OK => {
                metadata_debug!(column = field, "Column probe read succeeded");
            }
            Ok(response) => report.warnings.push(format!(
                "Column probe read returned {}; it may not be queryable yet",
                response.status()
            )),
            Err(e) => report
                .warnings
                .push(format!("Column probe read failed: {e}")),
        }

        report
    }

    // ========================================================================
    // Field name resolution
    // ========================================================================

    /// Loads the display-name mapping of one list into the cache.
    pub async fn load_mapping(&self, library: &LibraryContext) -> Result<()> {
        let key = (library.site_id.clone(), library.list_id.clone());
        if self.mappings.contains_key(&key) {
            return Ok(());
        }
        let columns = self.list_columns(library).await?;
        self.cache_mapping(library, &columns);
        Ok(())
    }

    fn cache_mapping(&self, library: &LibraryContext, columns: &[ColumnDefinition]) {
        let mapping = columns
            .iter()
            .filter_map(|c| {
                let display = c.display_name.clone()?;
                let internal = c.name.clone()?;
                Some((
                    display,
                    ColumnInfo {
                        internal_name: internal,
                        column_type: c.column_type().to_string(),
                        id: c.id.clone(),
                        description: c.description.clone(),
                    },
                ))
            })
            .collect::<HashMap<_, _>>();

        metadata_debug!(columns = mapping.len(), list = %library.list_id, "Cached column mapping");
        self.mappings
            .entry((library.site_id.clone(), library.list_id.clone()))
            .or_insert(mapping);
    }

    /// Internal field name for `display_name` on the given list.
    ///
    /// Order: already-internal names pass through, exact display match,
    /// case-insensitive display match, the hex-encoded transform, else the
    /// name unchanged.
    pub fn resolve_field_name(&self, site_id: &str, list_id: &str, display_name: &str) -> String {
        if looks_internal(display_name) {
            return display_name.to_string();
        }

        let key = (site_id.to_string(), list_id.to_string());
        if let Some(mapping) = self.mappings.get(&key) {
            if let Some(info) = mapping.get(display_name) {
                return info.internal_name.clone();
            }
            if let Some(info) = mapping
                .iter()
                .find(|(display, _)| display.eq_ignore_ascii_case(display_name))
                .map(|(_, info)| info)
            {
                return info.internal_name.clone();
            }
        }

        let encoded = encode_field_name(display_name);
        if encoded != display_name {
            return encoded;
        }
        display_name.to_string()
    }
}

/// Names that already carry SharePoint's encoding, or are lower case with
/// underscores, are taken to be internal names.
fn looks_internal(name: &str) -> bool {
    name.contains("_x00") || (name.contains('_') && !name.chars().any(char::is_uppercase))
}

/// SharePoint's `_xHHHH_` encoding of characters not allowed in internal names.
pub fn encode_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let code = match c {
            ' ' => "_x0020_",
            '#' => "_x0023_",
            '%' => "_x0025_",
            '&' => "_x0026_",
            '*' => "_x002a_",
            '+' => "_x002b_",
            '/' => "_x002f_",
            ':' => "_x003a_",
            '<' => "_x003c_",
            '>' => "_x003e_",
            '?' => "_x003f_",
            '\\' => "_x005c_",
            '|' => "_x007c_",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(code);
    }
    out
}
