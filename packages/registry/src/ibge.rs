//! IBGE "localidades" municipality registry client.
//!
//! The endpoint returns every Brazilian municipality in one JSON array.
//! Each item nests its state (`UF`) under
//! `microrregiao.mesorregiao.UF`. A handful of recently created
//! municipalities have a null `microrregiao`; for those the state is read
//! from `regiao-imediata.regiao-intermediaria.UF` and the meso-region
//! fields stay empty.
//!
//! See <https://servicodados.ibge.gov.br/api/docs/localidades>

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo_enrich_models::MunicipalityEntry;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{MunicipalityLookup, RegistryError, SnapshotPolicy, find_municipality};

/// Public IBGE municipality list.
pub const DEFAULT_BASE_URL: &str = "https://servicodados.ibge.gov.br/api/v1/localidades/municipios";

/// Per-request timeout. The full list is a few megabytes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
struct RawMunicipio {
    id: Option<serde_json::Value>,
    nome: Option<String>,
    microrregiao: Option<RawMicrorregiao>,
    #[serde(rename = "regiao-imediata")]
    regiao_imediata: Option<RawRegiaoImediata>,
}

#[derive(Debug, Deserialize)]
struct RawMicrorregiao {
    mesorregiao: Option<RawMesorregiao>,
}

#[derive(Debug, Deserialize)]
struct RawMesorregiao {
    id: Option<serde_json::Value>,
    nome: Option<String>,
    #[serde(rename = "UF")]
    uf: Option<RawUf>,
}

#[derive(Debug, Deserialize)]
struct RawRegiaoImediata {
    #[serde(rename = "regiao-intermediaria")]
    regiao_intermediaria: Option<RawRegiaoIntermediaria>,
}

#[derive(Debug, Deserialize)]
struct RawRegiaoIntermediaria {
    #[serde(rename = "UF")]
    uf: Option<RawUf>,
}

#[derive(Debug, Deserialize)]
struct RawUf {
    id: Option<serde_json::Value>,
    sigla: Option<String>,
    nome: Option<String>,
}

/// Renders a registry identifier (number or string) as text.
fn code(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

impl From<RawMunicipio> for MunicipalityEntry {
    fn from(raw: RawMunicipio) -> Self {
        let meso = raw.microrregiao.and_then(|m| m.mesorregiao);
        let (meso_region_name, meso_region_id, meso_uf) = match meso {
            Some(m) => (m.nome.unwrap_or_default(), code(m.id.as_ref()), m.uf),
            None => (String::new(), String::new(), None),
        };
        let uf = meso_uf.or_else(|| {
            raw.regiao_imediata
                .and_then(|r| r.regiao_intermediaria)
                .and_then(|r| r.uf)
        });
        let (state_name, state_id, state_abbr) = match uf {
            Some(uf) => (
                uf.nome.unwrap_or_default(),
                code(uf.id.as_ref()),
                uf.sigla.unwrap_or_default(),
            ),
            None => (String::new(), String::new(), String::new()),
        };

        Self {
            name: raw.nome.unwrap_or_default(),
            id: code(raw.id.as_ref()),
            meso_region_name,
            meso_region_id,
            state_name,
            state_id,
            state_abbr,
        }
    }
}

/// Parses the IBGE municipality array.
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] if the body is not an array of
/// municipality objects.
pub fn parse_municipalities(body: serde_json::Value) -> Result<Vec<MunicipalityEntry>, RegistryError> {
    let raw: Vec<RawMunicipio> = serde_json::from_value(body)?;
    Ok(raw.into_iter().map(MunicipalityEntry::from).collect())
}

/// Municipality registry backed by the IBGE API.
#[derive(Debug)]
pub struct IbgeRegistry {
    client: reqwest::Client,
    base_url: String,
    policy: SnapshotPolicy,
    snapshot: Mutex<Option<Arc<Vec<MunicipalityEntry>>>>,
}

impl IbgeRegistry {
    #[must_use]
    pub fn new(base_url: &str, policy: SnapshotPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, policy)
    }

    /// Creates a registry reusing an existing [`reqwest::Client`].
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str, policy: SnapshotPolicy) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
            policy,
            snapshot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Downloads and parses the full municipality list.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on timeout, transport failure, non-success
    /// status, or an unexpected body.
    pub async fn fetch_all(&self) -> Result<Vec<MunicipalityEntry>, RegistryError> {
        let body: serde_json::Value = self
            .client
            .get(&self.base_url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let entries = parse_municipalities(body)?;
        log::debug!("Fetched {} municipalities from {}", entries.len(), self.base_url);
        Ok(entries)
    }

    /// Returns the registry list according to the [`SnapshotPolicy`].
    async fn snapshot(&self) -> Result<Arc<Vec<MunicipalityEntry>>, RegistryError> {
        match self.policy {
            SnapshotPolicy::PerLookup => Ok(Arc::new(self.fetch_all().await?)),
            SnapshotPolicy::PerRun => {
                let mut cached = self.snapshot.lock().await;
                if let Some(entries) = cached.as_ref() {
                    return Ok(Arc::clone(entries));
                }
                let entries = Arc::new(self.fetch_all().await?);
                *cached = Some(Arc::clone(&entries));
                Ok(entries)
            }
        }
    }
}

#[async_trait]
impl MunicipalityLookup for IbgeRegistry {
    async fn lookup_municipality(&self, city: &str, state_abbr: &str) -> Option<MunicipalityEntry> {
        match self.snapshot().await {
            Ok(entries) => find_municipality(&entries, city, state_abbr).cloned(),
            Err(e) => {
                log::error!("Fetching municipality registry failed: {e}");
                None
            }
        }
    }
}
