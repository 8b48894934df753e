//! Nominatim / `OpenStreetMap` reverse geocoder client.
//!
//! Every request identifies the application through the `User-Agent`
//! header, as required by the Nominatim usage policy.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use async_trait::async_trait;
use geo_enrich_models::AddressComponents;

use crate::{GeocodeError, ReverseGeocoder};

/// Public Nominatim reverse endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Street/neighbourhood granularity.
const ZOOM: &str = "18";

/// Preferred response language for place names.
const ACCEPT_LANGUAGE: &str = "pt-BR";

/// Reverse geocoder backed by a Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimClient {
    /// Creates a client for `base_url` that sends `user_agent` with every
    /// request.
    #[must_use]
    pub fn new(base_url: &str, user_agent: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, user_agent)
    }

    /// Creates a client reusing an existing [`reqwest::Client`].
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str, user_agent: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
            user_agent: user_agent.to_owned(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs one reverse lookup.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on timeout, transport failure, non-success
    /// status, or a response without an address.
    pub async fn fetch_reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<AddressComponents, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", ZOOM.to_string()),
                ("accept-language", ACCEPT_LANGUAGE.to_string()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }

        let body: serde_json::Value = resp.error_for_status()?.json().await?;
        parse_response(&body)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Option<AddressComponents> {
        match self.fetch_reverse(latitude, longitude).await {
            Ok(address) => Some(address),
            Err(e) => {
                log::warn!("Reverse geocoding failed for ({latitude}, {longitude}): {e}");
                None
            }
        }
    }
}

/// Parses a Nominatim reverse response into address components.
///
/// String and numeric members of `address` are kept; anything else is
/// ignored.
fn parse_response(body: &serde_json::Value) -> Result<AddressComponents, GeocodeError> {
    let obj = body.as_object().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an object".to_string(),
    })?;

    if let Some(message) = obj.get("error").and_then(serde_json::Value::as_str) {
        return Err(GeocodeError::Provider {
            message: message.to_string(),
        });
    }

    let Some(address) = obj.get("address").and_then(serde_json::Value::as_object) else {
        return Err(GeocodeError::NoAddress);
    };

    let components: AddressComponents = address
        .iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key.clone(), s.clone())),
            serde_json::Value::Number(n) => Some((key.clone(), n.to_string())),
            _ => None,
        })
        .collect();

    if components.0.is_empty() {
        return Err(GeocodeError::NoAddress);
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    /// Serves a single canned HTTP response and returns the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/reverse", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (url, handle)
    }

    #[test]
    fn parses_reverse_address() {
        let body = serde_json::json!({
            "display_name": "Praça da Sé, São Paulo",
            "address": {
                "road": "Praça da Sé",
                "city": "São Paulo",
                "state": "São Paulo",
                "ISO3166-2-lvl4": "BR-SP",
                "postcode": "01001-000"
            }
        });
        let addr = parse_response(&body).unwrap();
        assert_eq!(addr.city(), "São Paulo");
        assert_eq!(addr.state(), "São Paulo");
        assert_eq!(addr.0.get("postcode").map(String::as_str), Some("01001-000"));
    }

    #[test]
    fn rejects_provider_error() {
        let body = serde_json::json!({ "error": "Unable to geocode" });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Provider { message }) if message == "Unable to geocode"
        ));
    }

    #[test]
    fn rejects_missing_or_empty_address() {
        assert!(matches!(
            parse_response(&serde_json::json!({ "lat": "1" })),
            Err(GeocodeError::NoAddress)
        ));
        assert!(matches!(
            parse_response(&serde_json::json!({ "address": {} })),
            Err(GeocodeError::NoAddress)
        ));
        assert!(matches!(
            parse_response(&serde_json::json!([])),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn sends_identity_header_and_query() {
        let (url, server) =
            serve_once("200 OK", r#"{"address":{"town":"Campinas","state_code":"SP"}}"#).await;
        let client = NominatimClient::new(&url, "GeoEnrichTest/1.0 (test@example.com)");

        let addr = client.reverse_geocode(-22.9, -47.06).await.unwrap();
        assert_eq!(addr.city(), "Campinas");
        assert_eq!(addr.state(), "SP");

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /reverse?"));
        assert!(request_line.contains("format=json"));
        assert!(request_line.contains("lat=-22.9"));
        assert!(request_line.contains("lon=-47.06"));
        assert!(request_line.contains("addressdetails=1"));
        assert!(request_line.contains("zoom=18"));
        assert!(request_line.contains("accept-language=pt-BR"));
        assert!(
            request
                .to_ascii_lowercase()
                .contains("user-agent: geoenrichtest/1.0 (test@example.com)")
        );
    }

    #[tokio::test]
    async fn non_success_status_is_not_found() {
        let (url, server) = serve_once("500 Internal Server Error", "{}").await;
        let client = NominatimClient::new(&url, "GeoEnrichTest/1.0");
        assert!(client.reverse_geocode(0.0, 0.0).await.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_status_is_reported() {
        let (url, server) = serve_once("429 Too Many Requests", "{}").await;
        let client = NominatimClient::new(&url, "GeoEnrichTest/1.0");
        assert!(matches!(
            client.fetch_reverse(0.0, 0.0).await,
            Err(GeocodeError::RateLimited)
        ));
        server.await.unwrap();
    }
}
