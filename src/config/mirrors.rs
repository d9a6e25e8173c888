//! Mirror identifier table
//!
//! Download pages reference mirrors by an opaque token embedded in the link
//! path. The directory maps those tokens to friendly names ("server 1", ...)
//! and is loaded once at startup, then shared read-only.

use serde::Deserialize;
use std::collections::HashMap;

/// One `[[mirror]]` entry from the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorEntry {
    /// Opaque token as it appears after `/from/` in a download link
    pub id: String,

    /// Friendly name used as the key in a file's `servers` map
    pub name: String,
}

/// Built-in table. Two near-identical tokens both name "server 1"; both are
/// kept verbatim since either may appear on a download page.
const BUILTIN_MIRRORS: &[(&str, &str)] = &[
    ("c3ae6ee2-8099-7139-713d-3411-c3a6e280947e", "server 1"),
    ("c39ac2af-c381-c2bf-1b25-11c3a4e284a2", "server 2"),
    ("c3ae6ee2-8099-713d-3411-c3a6e280947e", "server 1"),
];

/// Read-only mapping from mirror token to friendly name
#[derive(Debug, Clone, Default)]
pub struct MirrorDirectory {
    names: HashMap<String, String>,
}

impl MirrorDirectory {
    /// Returns the built-in mirror table
    pub fn builtin() -> Self {
        Self {
            names: BUILTIN_MIRRORS
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }

    /// Builds a directory from configured entries, falling back to the
    /// built-in table when none are configured
    pub fn from_entries(entries: &[MirrorEntry]) -> Self {
        if entries.is_empty() {
            return Self::builtin();
        }

        Self {
            names: entries
                .iter()
                .map(|e| (e.id.clone(), e.name.clone()))
                .collect(),
        }
    }

    /// Resolves a mirror token to its friendly name, synthesizing
    /// `server_<token>` for tokens missing from the table
    pub fn resolve(&self, id: &str) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("server_{}", id))
    }

    /// Returns true if the token is listed in the table
    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    /// Distinct friendly names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    /// All (token, name) pairs sorted by name then token
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .names
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)));
        entries
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
