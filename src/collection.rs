//! Collections served by the catalog and the product types each one accepts.
//!
//! All per-collection behaviour lives in [`PROFILES`]; supporting another
//! collection means adding a row there.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "SENTINEL-1")]
    Sentinel1,
    #[serde(rename = "SENTINEL-2")]
    Sentinel2,
    #[serde(rename = "SENTINEL-3")]
    Sentinel3,
    #[serde(rename = "SENTINEL-5P")]
    Sentinel5P,
}

#[derive(Debug)]
pub struct CollectionProfile {
    pub collection: Collection,
    pub name: &'static str,
    /// Empty when the collection exposes no product type attribute.
    pub product_types: &'static [&'static str],
    pub default_product_type: Option<&'static str>,
    pub product_type_filter: bool,
    pub cloud_cover_filter: bool,
}

pub static PROFILES: [CollectionProfile; 4] = [
    CollectionProfile {
        collection: Collection::Sentinel1,
        name: "SENTINEL-1",
        product_types: &["GRD", "SLC", "OCN", "RAW"],
        default_product_type: Some("GRD"),
        product_type_filter: true,
        cloud_cover_filter: false,
    },
    CollectionProfile {
        collection: Collection::Sentinel2,
        name: "SENTINEL-2",
        product_types: &["S2MSI1C", "S2MSI2A"],
        default_product_type: Some("S2MSI2A"),
        product_type_filter: true,
        cloud_cover_filter: true,
    },
    CollectionProfile {
        collection: Collection::Sentinel3,
        name: "SENTINEL-3",
        product_types: &[],
        default_product_type: None,
        product_type_filter: false,
        cloud_cover_filter: false,
    },
    CollectionProfile {
        collection: Collection::Sentinel5P,
        name: "SENTINEL-5P",
        product_types: &[],
        default_product_type: None,
        product_type_filter: false,
        cloud_cover_filter: false,
    },
];

impl Collection {
    pub fn profile(self) -> &'static CollectionProfile {
        // PROFILES is indexed in declaration order
        &PROFILES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PROFILES
            .iter()
            .find(|p| p.name == s)
            .map(|p| p.collection)
            .ok_or_else(|| Error::InvalidCollection(s.to_string()))
    }
}

impl CollectionProfile {
    /// Resolve the product type to search for. An empty value falls back to the
    /// collection default. Collections without a product type attribute take
    /// whatever they are given, unchecked.
    pub fn resolve_product_type(&self, product_type: &str) -> Result<Option<String>> {
        if product_type.is_empty() {
            return Ok(self.default_product_type.map(str::to_string));
        }
        if !self.product_type_filter {
            return Ok(Some(product_type.to_string()));
        }
        if self.product_types.contains(&product_type) {
            Ok(Some(product_type.to_string()))
        } else {
            Err(Error::InvalidProductType {
                collection: self.name.to_string(),
                product_type: product_type.to_string(),
                available: self.product_types.join(", "),
            })
        }
    }
}

/// Check a raw collection name and product type, returning the collection and
/// the effective product type.
pub fn validate(collection: &str, product_type: &str) -> Result<(Collection, Option<String>)> {
    let collection: Collection = collection.parse()?;
    let product_type = collection.profile().resolve_product_type(product_type)?;
    Ok((collection, product_type))
}
