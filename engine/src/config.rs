//! Store construction parameters.

use crate::{debounce::DebounceMode, error::Result, item::FieldPolicy, Error};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default quiescence window for coalescing change notifications.
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 3000;

fn default_debounce_window_ms() -> u64 {
    DEFAULT_DEBOUNCE_WINDOW_MS
}

/// HTTP verb of an extra resource method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// An extra operation exposed verbatim on the resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDef {
    /// Verb used for the call
    #[serde(default)]
    pub verb: HttpVerb,
    /// Path appended to the resource url, e.g. `/search`
    #[serde(default)]
    pub path: String,
}

impl MethodDef {
    pub fn new(verb: HttpVerb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
        }
    }
}

/// Configuration for one store.
///
/// `store_id`, `url` and `id_field` are required; [`StoreConfig::validate`]
/// rejects a config where any of them is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Logical namespace of the store's live collection
    #[serde(default)]
    pub store_id: String,
    /// Resource location handed to the resource collaborator
    #[serde(default)]
    pub url: String,
    /// Field carrying the remote identifier, e.g. `id` or `userId`
    #[serde(default)]
    pub id_field: String,
    /// Advisory item count, only forwarded as the initial page limit
    #[serde(default)]
    pub threshold: Option<u64>,
    /// Fields excluded from change detection and remote payloads
    #[serde(default)]
    pub hidden_fields: BTreeSet<String>,
    /// Extra resource methods by name
    #[serde(default)]
    pub methods: BTreeMap<String, MethodDef>,
    /// Debounce quiescence window in milliseconds
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    /// Debounce triggering mode
    #[serde(default)]
    pub debounce_mode: DebounceMode,
}

impl StoreConfig {
    /// Creates a configuration with the required parameters.
    pub fn new(
        store_id: impl Into<String>,
        url: impl Into<String>,
        id_field: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            url: url.into(),
            id_field: id_field.into(),
            threshold: None,
            hidden_fields: BTreeSet::new(),
            methods: BTreeMap::new(),
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            debounce_mode: DebounceMode::default(),
        }
    }

    /// Sets the advisory threshold.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Adds a hidden field.
    pub fn with_hidden_field(mut self, field: impl Into<String>) -> Self {
        self.hidden_fields.insert(field.into());
        self
    }

    /// Adds several hidden fields.
    pub fn with_hidden_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Registers an extra resource method.
    pub fn with_method(mut self, name: impl Into<String>, def: MethodDef) -> Self {
        self.methods.insert(name.into(), def);
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the debounce mode.
    pub fn with_debounce_mode(mut self, mode: DebounceMode) -> Self {
        self.debounce_mode = mode;
        self
    }

    /// Debounce window as a duration.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// The per-store field policy derived from this config.
    pub fn field_policy(&self) -> FieldPolicy {
        FieldPolicy::new(self.id_field.clone(), self.hidden_fields.clone())
    }

    /// Checks required parameters.
    pub fn validate(&self) -> Result<()> {
        if self.store_id.trim().is_empty() {
            return Err(Error::MissingConfig("storeId"));
        }
        if self.url.trim().is_empty() {
            return Err(Error::MissingConfig("url"));
        }
        if self.id_field.trim().is_empty() {
            return Err(Error::MissingConfig("idField"));
        }
        if self.hidden_fields.contains(&self.id_field) {
            return Err(Error::InvalidConfig(format!(
                "id field '{}' cannot be hidden",
                self.id_field
            )));
        }
        Ok(())
    }
}
