use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{
    EntityRecord, FetchOutcome, STAT_NAMES, normalize_flavor_text, sanitize_name,
};
use crate::error::{DexError, FailureReason};

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";
const ENGLISH: &str = "en";

/// Fetches one fully assembled entity record from a detail locator.
///
/// Implementations never retry and never return an error: every problem is a
/// `FetchOutcome::Failure` for the caller to count.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, locator: &str) -> FetchOutcome;
}

/// A remote catalog that can also enumerate its detail locators.
#[async_trait]
pub trait CatalogClient: DetailFetcher {
    async fn list(&self, limit: usize) -> Result<Vec<ListingEntry>, DexError>;

    /// Detail locator for free-form user input such as `"Mega Charizard"` or `"25"`.
    fn detail_locator(&self, input: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ListingDocument {
    results: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TypeSlot {
    #[serde(rename = "type")]
    kind: NamedRef,
}

#[derive(Debug, Deserialize)]
struct AbilitySlot {
    ability: NamedRef,
}

#[derive(Debug, Deserialize)]
struct StatSlot {
    stat: NamedRef,
    base_stat: u32,
}

#[derive(Debug, Deserialize)]
struct SpeciesRef {
    url: String,
}

/// Shape of the primary detail payload. Every field is required.
#[derive(Debug, Deserialize)]
struct DetailDocument {
    id: u32,
    name: String,
    types: Vec<TypeSlot>,
    abilities: Vec<AbilitySlot>,
    height: u32,
    weight: u32,
    stats: Vec<StatSlot>,
    species: SpeciesRef,
}

#[derive(Debug, Deserialize)]
struct FlavorTextEntry {
    language: NamedRef,
    flavor_text: String,
}

#[derive(Debug, Deserialize)]
struct SpeciesDocument {
    flavor_text_entries: Vec<FlavorTextEntry>,
}

#[derive(Clone)]
pub struct PokeApiHttpClient {
    client: Client,
    base_url: String,
}

impl PokeApiHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DexError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dex-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DexError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| DexError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self, limit: usize) -> String {
        format!("{}/pokemon?limit={limit}", self.base_url)
    }

    async fn get_json(&self, url: &str) -> Result<Value, FailureReason> {
        debug!(url, "request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FailureReason::NetworkError(err.to_string()))?;
        if let Some(reason) = classify_status(response.status()) {
            return Err(reason);
        }
        response.json::<Value>().await.map_err(|err| {
            if err.is_decode() {
                FailureReason::MalformedData(err.to_string())
            } else {
                FailureReason::NetworkError(err.to_string())
            }
        })
    }

    async fn fetch_record(&self, locator: &str) -> Result<EntityRecord, FailureReason> {
        let detail = self.get_json(locator).await?;
        let species_url = species_locator(&detail)?;
        let species = self.get_json(&species_url).await?;
        extract_record(&detail, &species)
    }
}

#[async_trait]
impl DetailFetcher for PokeApiHttpClient {
    async fn fetch_detail(&self, locator: &str) -> FetchOutcome {
        match self.fetch_record(locator).await {
            Ok(record) => FetchOutcome::Success(record),
            Err(reason) => FetchOutcome::failure(locator, reason),
        }
    }
}

#[async_trait]
impl CatalogClient for PokeApiHttpClient {
    async fn list(&self, limit: usize) -> Result<Vec<ListingEntry>, DexError> {
        let url = self.listing_url(limit);
        debug!(url = %url, "listing request");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| DexError::ListingHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "listing request failed".to_string());
            return Err(DexError::ListingStatus { status, message });
        }
        let raw: Value = response
            .json()
            .await
            .map_err(|err| DexError::ListingMalformed(err.to_string()))?;
        parse_listing(&raw)
    }

    fn detail_locator(&self, input: &str) -> String {
        format!("{}/pokemon/{}", self.base_url, sanitize_name(input))
    }
}

/// `None` for 2xx, otherwise the per-item failure the status maps to.
pub fn classify_status(status: StatusCode) -> Option<FailureReason> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND {
        Some(FailureReason::NotFound)
    } else {
        Some(FailureReason::RemoteError(status.as_u16()))
    }
}

pub fn parse_listing(raw: &Value) -> Result<Vec<ListingEntry>, DexError> {
    ListingDocument::deserialize(raw)
        .map(|doc| doc.results)
        .map_err(|err| DexError::ListingMalformed(err.to_string()))
}

/// The species locator embedded in a primary detail payload.
pub fn species_locator(detail: &Value) -> Result<String, FailureReason> {
    detail
        .get("species")
        .and_then(|value| value.get("url"))
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
        .ok_or_else(|| FailureReason::MalformedData("missing species.url".to_string()))
}

/// Validates both payloads and assembles the record.
///
/// A missing or mistyped field anywhere is `MalformedData`, as is a stat list that is not
/// exactly [`STAT_NAMES`]. A species payload without an English entry yields an empty
/// flavor text.
pub fn extract_record(detail: &Value, species: &Value) -> Result<EntityRecord, FailureReason> {
    let detail = DetailDocument::deserialize(detail)
        .map_err(|err| FailureReason::MalformedData(format!("detail: {err}")))?;
    let species = SpeciesDocument::deserialize(species)
        .map_err(|err| FailureReason::MalformedData(format!("species: {err}")))?;

    if detail.id == 0 {
        return Err(FailureReason::MalformedData("id must be positive".to_string()));
    }
    if detail.name.trim().is_empty() {
        return Err(FailureReason::MalformedData("empty name".to_string()));
    }
    if detail.stats.is_empty() {
        return Err(FailureReason::MalformedData("no stats".to_string()));
    }

    let mut stats = BTreeMap::new();
    for slot in detail.stats {
        if stats.insert(slot.stat.name.clone(), slot.base_stat).is_some() {
            return Err(FailureReason::MalformedData(format!(
                "duplicate stat {}",
                slot.stat.name
            )));
        }
    }
    let missing: Vec<&str> = STAT_NAMES
        .iter()
        .copied()
        .filter(|name| !stats.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(FailureReason::MalformedData(format!(
            "missing stats: {}",
            missing.join(", ")
        )));
    }
    if let Some(extra) = stats.keys().find(|name| !STAT_NAMES.contains(&name.as_str())) {
        return Err(FailureReason::MalformedData(format!("unexpected stat {extra}")));
    }

    let flavor_text = species
        .flavor_text_entries
        .iter()
        .find(|entry| entry.language.name == ENGLISH)
        .map(|entry| normalize_flavor_text(&entry.flavor_text))
        .unwrap_or_default();

    Ok(EntityRecord {
        name: detail.name.to_lowercase(),
        id: detail.id,
        types: detail.types.into_iter().map(|slot| slot.kind.name).collect(),
        abilities: detail
            .abilities
            .into_iter()
            .map(|slot| slot.ability.name)
            .collect(),
        height: detail.height,
        weight: detail.weight,
        stats,
        flavor_text,
    })
}
