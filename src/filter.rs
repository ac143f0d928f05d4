//! OData `$filter` expressions for the product catalog.
//!
//! A filter is a conjunction of [`Predicate`] nodes. Rendering produces the
//! plain OData text; [`Filter::encode`] applies the query-string escaping in one
//! place so the business logic never deals with `%20` and `%27`.
use crate::collection::{self, Collection};
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters escaped when a filter is placed in the query string. Parentheses,
/// slashes, colons, semicolons and `=` are kept verbatim, which is what the
/// catalog expects inside `geography'SRID=4326;POINT(..)'` literals.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'+')
    .add(b'<')
    .add(b'>');

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Unvalidated search parameters as supplied by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub collection: String,
    #[serde(default)]
    pub product_type: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub point: GeoPoint,
    pub max_cloud_cover: f64,
}

/// Validated search criteria. Construct through [`SearchParams::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCriteria {
    pub collection: Collection,
    pub product_type: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub point: GeoPoint,
    pub max_cloud_cover: f64,
}

impl SearchParams {
    pub fn validate(self) -> Result<SearchCriteria> {
        let (collection, product_type) =
            collection::validate(&self.collection, &self.product_type)?;

        let GeoPoint {
            latitude,
            longitude,
        } = self.point;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::Config(format!("latitude {latitude} out of range")));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::Config(format!("longitude {longitude} out of range")));
        }
        // Collections without a cloud cover attribute never use the value.
        if collection.profile().cloud_cover_filter && !(0.0..=100.0).contains(&self.max_cloud_cover)
        {
            return Err(Error::Config(format!(
                "cloud cover {} must be between 0 and 100",
                self.max_cloud_cover
            )));
        }

        Ok(SearchCriteria {
            collection,
            product_type,
            start_date: self.start_date,
            end_date: self.end_date,
            point: self.point,
            max_cloud_cover: self.max_cloud_cover,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `Attributes/OData.CSC.StringAttribute/any(...)` with an `eq` comparison
    StringAttributeEq { name: &'static str, value: String },
    /// `Attributes/OData.CSC.DoubleAttribute/any(...)` with an `le` comparison
    DoubleAttributeLe { name: &'static str, value: f64 },
    CollectionName(Collection),
    /// Sensing start strictly between the two instants
    ContentStartBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Intersects(GeoPoint),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// The filter percent-encoded for use as the `$filter` query value.
    pub fn encode(&self) -> String {
        utf8_percent_encode(&self.to_string(), QUERY_VALUE).to_string()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringAttributeEq { name, value } => write!(
                f,
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq {} and att/OData.CSC.StringAttribute/Value eq {})",
                quote(name),
                quote(value)
            ),
            Self::DoubleAttributeLe { name, value } => write!(
                f,
                "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq {} and att/OData.CSC.DoubleAttribute/Value le {value})",
                quote(name)
            ),
            Self::CollectionName(collection) => {
                write!(f, "Collection/Name eq {}", quote(collection.name()))
            }
            Self::ContentStartBetween { start, end } => write!(
                f,
                "ContentDate/Start gt {} and ContentDate/Start lt {}",
                format_instant(start),
                format_instant(end)
            ),
            Self::Intersects(point) => write!(
                f,
                "OData.CSC.Intersects(area=geography'SRID=4326;POINT({} {})')",
                point.longitude, point.latitude
            ),
        }
    }
}

/// OData string literal; embedded apostrophes are doubled.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Millisecond precision with a `Z` suffix, e.g. `2022-01-01T00:00:00.000Z`.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Map validated criteria onto the collection-specific filter.
pub fn build_filter(criteria: &SearchCriteria) -> Filter {
    let profile = criteria.collection.profile();
    let mut filter = Filter::new();

    if profile.product_type_filter {
        if let Some(product_type) = &criteria.product_type {
            filter = filter.and(Predicate::StringAttributeEq {
                name: "productType",
                value: product_type.clone(),
            });
        }
    }
    if profile.cloud_cover_filter {
        filter = filter.and(Predicate::DoubleAttributeLe {
            name: "cloudCover",
            value: criteria.max_cloud_cover,
        });
    }

    filter
        .and(Predicate::CollectionName(criteria.collection))
        .and(Predicate::ContentStartBetween {
            start: criteria.start_date,
            end: criteria.end_date,
        })
        .and(Predicate::Intersects(criteria.point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, day, 0, 0, 0).unwrap()
    }

    fn params(collection: &str, product_type: &str) -> SearchParams {
        SearchParams {
            collection: collection.to_string(),
            product_type: product_type.to_string(),
            start_date: instant(1),
            end_date: instant(3),
            point: GeoPoint::new(43.7819, 11.2876),
            max_cloud_cover: 10.0,
        }
    }

    fn encoded(collection: &str, product_type: &str) -> String {
        build_filter(&params(collection, product_type).validate().unwrap()).encode()
    }

    #[test]
    fn test_sentinel2_filter() {
        let expected = "Attributes/OData.CSC.StringAttribute/any(att:att/Name%20eq%20%27productType%27%20and%20att/OData.CSC.StringAttribute/Value%20eq%20%27S2MSI2A%27)%20and%20Attributes/OData.CSC.DoubleAttribute/any(att:att/Name%20eq%20%27cloudCover%27%20and%20att/OData.CSC.DoubleAttribute/Value%20le%2010)%20and%20Collection/Name%20eq%20%27SENTINEL-2%27%20and%20ContentDate/Start%20gt%202022-01-01T00:00:00.000Z%20and%20ContentDate/Start%20lt%202022-01-03T00:00:00.000Z%20and%20OData.CSC.Intersects(area=geography%27SRID=4326;POINT(11.2876%2043.7819)%27)";
        assert_eq!(encoded("SENTINEL-2", "S2MSI2A"), expected);
        assert_eq!(encoded("SENTINEL-2", "S2MSI2A"), encoded("SENTINEL-2", "S2MSI2A"));
    }

    #[test]
    fn test_sentinel1_filter_has_no_cloud_cover() {
        let expected = "Attributes/OData.CSC.StringAttribute/any(att:att/Name%20eq%20%27productType%27%20and%20att/OData.CSC.StringAttribute/Value%20eq%20%27GRD%27)%20and%20Collection/Name%20eq%20%27SENTINEL-1%27%20and%20ContentDate/Start%20gt%202022-01-01T00:00:00.000Z%20and%20ContentDate/Start%20lt%202022-01-03T00:00:00.000Z%20and%20OData.CSC.Intersects(area=geography%27SRID=4326;POINT(11.2876%2043.7819)%27)";
        assert_eq!(encoded("SENTINEL-1", ""), expected);
    }

    #[test]
    fn test_sentinel3_and_5p_filters() {
        for collection in ["SENTINEL-3", "SENTINEL-5P"] {
            let expected = format!("Collection/Name%20eq%20%27{collection}%27%20and%20ContentDate/Start%20gt%202022-01-01T00:00:00.000Z%20and%20ContentDate/Start%20lt%202022-01-03T00:00:00.000Z%20and%20OData.CSC.Intersects(area=geography%27SRID=4326;POINT(11.2876%2043.7819)%27)");
            assert_eq!(encoded(collection, ""), expected);
            // A product type given for these collections never reaches the filter
            assert_eq!(encoded(collection, "OL_1_EFR___"), expected);
        }
    }

    #[test]
    fn test_single_field_changes_alter_filter() {
        let base = params("SENTINEL-2", "S2MSI2A");
        let render = |p: SearchParams| build_filter(&p.validate().unwrap()).encode();
        let reference = render(base.clone());

        let variants = [
            SearchParams {
                start_date: instant(2),
                ..base.clone()
            },
            SearchParams {
                end_date: instant(4),
                ..base.clone()
            },
            SearchParams {
                point: GeoPoint::new(43.7819, 11.2877),
                ..base.clone()
            },
            SearchParams {
                point: GeoPoint::new(43.7818, 11.2876),
                ..base.clone()
            },
            SearchParams {
                max_cloud_cover: 10.5,
                ..base.clone()
            },
            SearchParams {
                product_type: "S2MSI1C".to_string(),
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(render(variant), reference);
        }
    }

    #[test]
    fn test_quote_doubles_apostrophes() {
        let filter = Filter::new().and(Predicate::StringAttributeEq {
            name: "platformSerialIdentifier",
            value: "O'Neil".to_string(),
        });
        assert!(filter.to_string().ends_with("Value eq 'O''Neil')"));
        assert!(filter.encode().ends_with("%27O%27%27Neil%27)"));
    }

    #[test]
    fn test_format_instant_keeps_milliseconds() {
        let t = Utc.with_ymd_and_hms(2023, 2, 7, 13, 5, 9).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(format_instant(&t), "2023-02-07T13:05:09.042Z");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut p = params("SENTINEL-2", "");
        p.max_cloud_cover = 120.0;
        assert!(p.validate().is_err());

        let mut p = params("SENTINEL-2", "");
        p.point = GeoPoint::new(95.0, 11.0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_cloud_cover_ignored_without_attribute() {
        for collection in ["SENTINEL-1", "SENTINEL-3", "SENTINEL-5P"] {
            let mut p = params(collection, "");
            p.max_cloud_cover = 150.0;
            let criteria = p.validate().unwrap();
            assert!(!build_filter(&criteria).to_string().contains("cloudCover"));
        }
    }
}
