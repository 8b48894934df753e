#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for geo-enrich.
//!
//! Resolves a latitude/longitude pair to structured
//! [`AddressComponents`] using the Nominatim / `OpenStreetMap` reverse
//! endpoint. The public instance allows **1 request per second**; the
//! batch engine is responsible for pacing calls.
//!
//! Callers depend on the [`ReverseGeocoder`] trait so the engine can be
//! driven by in-memory fakes in tests.

pub mod nominatim;

use async_trait::async_trait;
use geo_enrich_models::AddressComponents;
use thiserror::Error;

/// Errors from reverse geocoding requests.
///
/// These never leave [`ReverseGeocoder::reverse_geocode`]; they are
/// logged and collapsed into `None` there.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (transport, timeout, or non-success status).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an explicit error payload.
    #[error("Provider error: {message}")]
    Provider {
        /// Message returned by the provider.
        message: String,
    },

    /// The response carried no usable `address` object.
    #[error("No address in response")]
    NoAddress,

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Maps a coordinate pair to address components.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Returns the address components for `(latitude, longitude)`, or
    /// `None` when the lookup failed for any reason.
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Option<AddressComponents>;
}
