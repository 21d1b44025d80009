//! Core domain types for clickscope
//!
//! These types represent the raw clickstream records as they are loaded,
//! before any filtering or aggregation happens.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Client** | A unique user identifier associated with events |
//! | **SKU** | Stock-keeping unit, the unique product identifier |
//! | **Event** | One add-to-cart, cart-removal, purchase or search record |
//! | **Catalog** | The product properties dataset (SKU, category, price) |
//!
//! Identifiers arrive either as JSON strings or as integers depending on the
//! export, so every identifier type accepts both and normalizes to a string.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================
// Identifiers
// ============================================

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

id_newtype!(
    /// Identifier of the client (end user) that produced an event.
    ClientId
);
id_newtype!(
    /// Stock-keeping unit identifying a product.
    Sku
);
id_newtype!(
    /// Product category identifier.
    Category
);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    UInt(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Int(v) => v.to_string(),
            RawId::UInt(v) => v.to_string(),
            RawId::Text(s) => s,
        }
    }
}

// ============================================
// Datasets
// ============================================

/// The five named resources that make up a complete dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    AddToCart,
    ProductBuy,
    RemoveFromCart,
    SearchQuery,
    ProductProperties,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::AddToCart => "add_to_cart",
            Dataset::ProductBuy => "product_buy",
            Dataset::RemoveFromCart => "remove_from_cart",
            Dataset::SearchQuery => "search_query",
            Dataset::ProductProperties => "product_properties",
        }
    }

    /// File name of the resource (e.g. `product_buy.json`).
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Events
// ============================================

/// Which event collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AddToCart,
    RemoveFromCart,
    ProductBuy,
    SearchQuery,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::AddToCart,
        EventKind::RemoveFromCart,
        EventKind::ProductBuy,
        EventKind::SearchQuery,
    ];

    pub fn dataset(&self) -> Dataset {
        match self {
            EventKind::AddToCart => Dataset::AddToCart,
            EventKind::RemoveFromCart => Dataset::RemoveFromCart,
            EventKind::ProductBuy => Dataset::ProductBuy,
            EventKind::SearchQuery => Dataset::SearchQuery,
        }
    }
}

/// A single clickstream record.
///
/// Cart and purchase events carry a `sku`; page-visit style records may
/// carry a `url`. Search events usually carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub client_id: ClientId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Event {
    pub fn new(client_id: impl Into<ClientId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            client_id: client_id.into(),
            timestamp,
            sku: None,
            url: None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<Sku>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Milliseconds since the UNIX epoch.
    pub fn millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProperties {
    pub sku: Sku,
    pub category: Category,
    pub price: f64,
}

// ============================================
// Timestamp decoding
// ============================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        RawTimestamp::Text(s) => parse_timestamp(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {}", s))),
    }
}

/// Parse a timestamp string.
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS[.fff]` form used by
/// clickstream exports, which is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
