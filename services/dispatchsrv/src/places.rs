//! Place dataset and free-text resolution
//!
//! Places are loaded once from a JSON array and indexed twice:
//! - exact index: every lower-cased name and alias
//! - prefix index: names and aliases of `isPrefix` places, in load order
//!
//! Resolution tries the exact index first, then scans the prefix index and
//! returns the first place whose key starts the lower-cased input.

use std::collections::HashMap;
use std::path::Path;

use common::serde_helpers::deserialize_optional_f64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DispatchError, Result};

/// A named location responders can be sent to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Free text starting with this place's name (e.g. "C5-123") resolves to it
    #[serde(default)]
    pub is_prefix: bool,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Place {
    /// Name followed by aliases, lower-cased
    fn keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.name.to_lowercase()).chain(self.aliases.iter().map(|a| a.to_lowercase()))
    }
}

/// Read-only lookup structures over the place dataset
#[derive(Debug, Default)]
pub struct PlaceResolver {
    places: Vec<Place>,
    exact: HashMap<String, usize>,
    /// Insertion-ordered; a repeated key keeps its slot and takes the later place
    prefixes: Vec<(String, usize)>,
}

impl PlaceResolver {
    /// Build both indices from the dataset in load order
    pub fn from_places(places: Vec<Place>) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes: Vec<(String, usize)> = Vec::new();

        for (idx, place) in places.iter().enumerate() {
            for key in place.keys() {
                if let Some(previous) = exact.insert(key.clone(), idx) {
                    debug!(
                        "Duplicate place key '{}': '{}' replaces '{}'",
                        key, place.name, places[previous].name
                    );
                }

                if place.is_prefix {
                    match prefixes.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => {
                            debug!(
                                "Duplicate prefix key '{}': '{}' replaces '{}'",
                                key, place.name, places[slot.1].name
                            );
                            slot.1 = idx;
                        },
                        None => prefixes.push((key, idx)),
                    }
                }
            }
        }

        debug!(
            "Place indices built: {} places, {} exact keys, {} prefix keys",
            places.len(),
            exact.len(),
            prefixes.len()
        );

        Self {
            places,
            exact,
            prefixes,
        }
    }

    /// Parse a JSON array of places
    pub fn from_json_str(json: &str) -> Result<Self> {
        let places: Vec<Place> = serde_json::from_str(json)?;
        Ok(Self::from_places(places))
    }

    /// Load the dataset file once at startup
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("Cannot read places file {}: {}", path.display(), e))
        })?;
        let resolver = Self::from_json_str(&content)?;
        info!("Loaded {} places from {}", resolver.len(), path.display());
        Ok(resolver)
    }

    /// Resolve free text to a place: exact name/alias first, then prefix
    pub fn resolve(&self, input: &str) -> Option<&Place> {
        if input.is_empty() {
            return None;
        }
        let lowered = input.to_lowercase();

        if let Some(&idx) = self.exact.get(&lowered) {
            return self.places.get(idx);
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix.as_str()))
            .and_then(|(_, idx)| self.places.get(*idx))
    }

    /// Full dataset in original order
    pub fn all_places(&self) -> &[Place] {
        &self.places
    }

    /// Places whose name contains `filter`, ignoring case; blank returns all
    pub fn search(&self, filter: &str) -> Vec<&Place> {
        if filter.trim().is_empty() {
            return self.places.iter().collect();
        }
        let needle = filter.to_lowercase();
        self.places
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}
