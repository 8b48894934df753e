#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Municipality registry lookups for geo-enrich.
//!
//! Cross-references a geocoded `(city, state abbreviation)` pair against
//! the authoritative IBGE municipality list to attach canonical names and
//! identifiers (municipality, meso-region, state).
//!
//! Matching is a first-match linear scan over the registry comparing
//! [`normalize`](normalize::normalize)d names and state abbreviations.
//! There is no partial or fuzzy matching.

pub mod ibge;
pub mod normalize;

use async_trait::async_trait;
use geo_enrich_models::MunicipalityEntry;
use thiserror::Error;

/// Errors from registry requests.
///
/// These never leave [`MunicipalityLookup::lookup_municipality`]; they
/// are logged and collapsed into `None` there.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed (transport, timeout, or non-success status).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How long a fetched registry list is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Fetch once per client and reuse it for every lookup. Only a
    /// successful fetch is kept.
    #[default]
    PerRun,
    /// Fetch the full list again on every lookup.
    PerLookup,
}

/// Resolves a city and state abbreviation to a registry entry.
#[async_trait]
pub trait MunicipalityLookup: Send + Sync {
    /// Returns the matching municipality, or `None` when there is no
    /// match or the registry could not be fetched.
    async fn lookup_municipality(&self, city: &str, state_abbr: &str) -> Option<MunicipalityEntry>;
}

/// Returns the first entry whose normalized name and state abbreviation
/// equal the normalized query.
#[must_use]
pub fn find_municipality<'a>(
    entries: &'a [MunicipalityEntry],
    city: &str,
    state_abbr: &str,
) -> Option<&'a MunicipalityEntry> {
    let city = normalize::normalize(city);
    let state_abbr = normalize::normalize(state_abbr);

    entries.iter().find(|entry| {
        normalize::normalize(&entry.name) == city
            && normalize::normalize(&entry.state_abbr) == state_abbr
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: &str, abbr: &str) -> MunicipalityEntry {
        MunicipalityEntry {
            name: name.to_string(),
            id: id.to_string(),
            state_abbr: abbr.to_string(),
            ..MunicipalityEntry::default()
        }
    }

    #[test]
    fn matches_exact_name_and_state() {
        let entries = vec![
            entry("Campinas", "3509502", "SP"),
            entry("São Paulo", "3550308", "SP"),
        ];
        let found = find_municipality(&entries, "Campinas", "SP").unwrap();
        assert_eq!(found.id, "3509502");
    }

    #[test]
    fn matches_case_and_accent_variants() {
        let entries = vec![
            entry("Campinas", "3509502", "SP"),
            entry("São Paulo", "3550308", "SP"),
        ];
        assert_eq!(
            find_municipality(&entries, "CAMPINAS", "sp").unwrap().id,
            "3509502"
        );
        assert_eq!(
            find_municipality(&entries, "sao paulo", "Sp").unwrap().id,
            "3550308"
        );
    }

    #[test]
    fn state_must_match_too() {
        let entries = vec![
            entry("Bom Jesus", "2201903", "PI"),
            entry("Bom Jesus", "4302501", "RS"),
        ];
        assert_eq!(
            find_municipality(&entries, "Bom Jesus", "RS").unwrap().id,
            "4302501"
        );
        assert!(find_municipality(&entries, "Bom Jesus", "SP").is_none());
    }

    #[test]
    fn first_match_wins() {
        let entries = vec![entry("Duplicada", "1", "MG"), entry("Duplicada", "2", "MG")];
        assert_eq!(find_municipality(&entries, "duplicada", "mg").unwrap().id, "1");
    }

    #[test]
    fn no_partial_matching() {
        let entries = vec![entry("São José dos Campos", "3549904", "SP")];
        assert!(find_municipality(&entries, "São José", "SP").is_none());
        assert!(find_municipality(&[], "São José", "SP").is_none());
    }
}
