//! Per-document compiler settings with an explicit cache lifecycle.
//!
//! Settings are resolved lazily through `workspace/configuration` and cached
//! per document URI. A configuration-change notification flushes the whole
//! cache; closing a document evicts its single entry. Clients that cannot
//! answer scoped configuration requests always get [`Settings::default`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Configuration section the client is asked for.
pub const CONFIG_SECTION: &str = "quill";

const DEFAULT_MAX_PROBLEMS: usize = 1000;
const DEFAULT_EXECUTABLE: &str = "quillc";
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Settings governing one document's compiler invocations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Upper bound on diagnostics published per validation pass.
    pub max_number_of_problems: usize,
    /// Compiler executable, resolved through PATH at invocation time.
    pub executable_path: String,
    /// Milliseconds before a compiler invocation is killed.
    pub max_compiler_invocation_time: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_number_of_problems: DEFAULT_MAX_PROBLEMS,
            executable_path: DEFAULT_EXECUTABLE.to_string(),
            max_compiler_invocation_time: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Extract settings from a `workspace/configuration` result.
    ///
    /// The result is an array with one entry per requested item; a missing,
    /// null, or malformed entry falls back to the defaults.
    #[must_use]
    pub fn from_configuration(result: &Value) -> Self {
        result
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| serde_json::from_value(item.clone()).ok())
            .unwrap_or_default()
    }
}

/// Cached per-document settings.
#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: HashMap<String, Settings>,
}

impl SettingsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Settings> {
        self.entries.get(uri)
    }

    pub fn insert(&mut self, uri: String, settings: Settings) {
        self.entries.insert(uri, settings);
    }

    /// Evict one document's entry (document closed).
    pub fn remove(&mut self, uri: &str) {
        self.entries.remove(uri);
    }

    /// Flush everything (client configuration changed).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
