//! Product search against the OData catalog.
use crate::error::{Error, Result};
use crate::filter::Filter;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_CATALOG_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContentDate {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Checksum {
    pub value: String,
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// One product of a search result. Only `Id` (non-empty) and `Name` are required; every
/// other field may be missing or carry an unexpected shape.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogItem {
    #[serde(deserialize_with = "non_empty_string")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub content_length: Option<u64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub eviction_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub footprint: Option<String>,
    #[serde(default, deserialize_with = "lenient_checksums")]
    pub checksum: Vec<Checksum>,
    #[serde(default, deserialize_with = "lenient_content_date")]
    pub content_date: Option<ContentDate>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub origin_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub modification_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publication_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub s3_path: Option<String>,
}

/// Items in server order. Duplicates are kept as returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResult {
    pub items: Vec<CatalogItem>,
    pub next_link: Option<String>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Decode a response body. The envelope must be a JSON object with a
    /// `value` array; each element is decoded on its own and undecodable
    /// elements are dropped.
    pub fn from_body(body: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(body).map_err(|e| Error::MalformedResponse(e.to_string()))?;

        let mut items = Vec::with_capacity(envelope.value.len());
        for (index, raw) in envelope.value.into_iter().enumerate() {
            match serde_json::from_value::<CatalogItem>(raw) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping catalog entry {index}: {e}"),
            }
        }

        Ok(Self {
            items,
            next_link: envelope.next_link,
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    value: Vec<Value>,
    #[serde(default, rename = "@odata.nextLink")]
    next_link: Option<String>,
}

pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The filter is already percent-encoded, so the URL is assembled by hand
    /// rather than through a query serializer that would encode it again.
    pub fn search_url(&self, filter: &Filter, top: Option<u32>) -> String {
        let mut url = format!("{}/Products?$filter={}", self.base_url, filter.encode());
        if let Some(top) = top {
            url.push_str(&format!("&$top={top}"));
        }
        url
    }

    pub async fn search(&self, filter: &Filter, top: Option<u32>) -> Result<SearchResult> {
        let url = self.search_url(filter, top);
        debug!("Searching {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::CatalogUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CatalogUnreachable(format!(
                "catalog answered with status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::CatalogUnreachable(e.to_string()))?;

        let result = SearchResult::from_body(&body)?;
        if let Some(next) = &result.next_link {
            debug!("More results available at {next}");
        }
        Ok(result)
    }

    /// Download location of a product's archive.
    pub fn product_value_url(&self, id: &str) -> String {
        product_value_url(&self.base_url, id)
    }
}

pub fn product_value_url(base_url: &str, id: &str) -> String {
    format!("{}/Products({id})/$value", base_url.trim_end_matches('/'))
}

/// Recover the product id from a URL produced by [`product_value_url`].
pub fn product_id_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"/Products\((?<id>[^)]+)\)/\$value$")
        .expect("Regex pattern should always compile");
    let captures = re.captures(url)?;
    Some(captures["id"].to_string())
}

fn non_empty_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        return Err(serde::de::Error::custom("empty product id"));
    }
    Ok(value)
}

fn lenient_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_content_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ContentDate>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(date @ Value::Object(_)) => serde_json::from_value(date).ok(),
        _ => None,
    })
}

fn lenient_checksums<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Checksum>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => vec![Checksum {
            value: s,
            algorithm: None,
        }],
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => vec![],
    })
}
