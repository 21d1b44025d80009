//! In-memory event store and dataset ingestion
//!
//! The store holds the five raw datasets after they are fully loaded. It is
//! immutable once built and is shared by reference (or `Arc`) across every
//! aggregator without locking.
//!
//! ## Loading
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐     ┌────────────┐
//! │ DataSource       │ ──► │ EventStore::load     │ ──► │ EventStore │
//! │ (dir / http url) │     │ 5 fetches, join!     │     │ (complete) │
//! └──────────────────┘     └──────────────────────┘     └────────────┘
//! ```
//!
//! All five resources are fetched concurrently. If any one of them fails the
//! whole load fails with [`Error::IncompleteIngestion`]; a partial store is
//! never returned.

use crate::error::{Error, Result};
use crate::types::{Dataset, Event, EventKind, ProductProperties, Sku};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

/// Where the five dataset files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Local directory containing `<dataset>.json` files
    Directory(PathBuf),
    /// HTTP base URL; each dataset is fetched from `<base_url>/<dataset>.json`
    Http(String),
}

impl DataSource {
    /// Human-readable location of one dataset within this source.
    pub fn location(&self, dataset: Dataset) -> String {
        match self {
            DataSource::Directory(dir) => dir.join(dataset.file_name()).display().to_string(),
            DataSource::Http(base) => {
                format!("{}/{}", base.trim_end_matches('/'), dataset.file_name())
            }
        }
    }

    async fn fetch(&self, dataset: Dataset) -> Result<Vec<u8>> {
        let location = self.location(dataset);
        match self {
            DataSource::Directory(_) => tokio::fs::read(&location)
                .await
                .map_err(|e| Error::ingestion(dataset, format!("{}: {}", location, e))),
            DataSource::Http(_) => {
                let response = reqwest::get(&location)
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::ingestion(dataset, e))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::ingestion(dataset, e))?;
                Ok(bytes.to_vec())
            }
        }
    }

    async fn fetch_records<T: DeserializeOwned>(&self, dataset: Dataset) -> Result<Vec<T>> {
        let bytes = self.fetch(dataset).await?;
        let records: Vec<T> =
            serde_json::from_slice(&bytes).map_err(|e| Error::ingestion(dataset, e))?;
        tracing::debug!(
            dataset = %dataset,
            records = records.len(),
            bytes = bytes.len(),
            "Loaded dataset"
        );
        Ok(records)
    }
}

/// Immutable holder of the four event collections and the product catalog.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    add_to_cart: Vec<Event>,
    product_buy: Vec<Event>,
    remove_from_cart: Vec<Event>,
    search_query: Vec<Event>,
    product_properties: Vec<ProductProperties>,
}

impl EventStore {
    /// Build a store from already-materialized collections.
    pub fn from_parts(
        add_to_cart: Vec<Event>,
        product_buy: Vec<Event>,
        remove_from_cart: Vec<Event>,
        search_query: Vec<Event>,
        product_properties: Vec<ProductProperties>,
    ) -> Self {
        Self {
            add_to_cart,
            product_buy,
            remove_from_cart,
            search_query,
            product_properties,
        }
    }

    /// Load all five datasets concurrently.
    ///
    /// Fails with [`Error::IncompleteIngestion`] naming the first dataset (in
    /// load order) that could not be fetched or decoded.
    pub async fn load(source: &DataSource) -> Result<Self> {
        let start = Instant::now();

        let (add_to_cart, product_buy, remove_from_cart, search_query, product_properties) = tokio::join!(
            source.fetch_records::<Event>(Dataset::AddToCart),
            source.fetch_records::<Event>(Dataset::ProductBuy),
            source.fetch_records::<Event>(Dataset::RemoveFromCart),
            source.fetch_records::<Event>(Dataset::SearchQuery),
            source.fetch_records::<ProductProperties>(Dataset::ProductProperties),
        );

        let store = match (
            add_to_cart,
            product_buy,
            remove_from_cart,
            search_query,
            product_properties,
        ) {
            (Ok(add), Ok(buy), Ok(remove), Ok(search), Ok(catalog)) => {
                Self::from_parts(add, buy, remove, search, catalog)
            }
            (add, buy, remove, search, catalog) => {
                let error = [add.err(), buy.err(), remove.err(), search.err(), catalog.err()]
                    .into_iter()
                    .flatten()
                    .next()
                    .unwrap_or_else(|| Error::Config("dataset load failed".to_string()));
                tracing::error!(error = %error, "Dataset ingestion failed");
                return Err(error);
            }
        };

        tracing::info!(
            add_to_cart = store.add_to_cart.len(),
            product_buy = store.product_buy.len(),
            remove_from_cart = store.remove_from_cart.len(),
            search_query = store.search_query.len(),
            product_properties = store.product_properties.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Event store loaded"
        );

        Ok(store)
    }

    /// Events of one kind, in load order.
    pub fn events(&self, kind: EventKind) -> &[Event] {
        match kind {
            EventKind::AddToCart => &self.add_to_cart,
            EventKind::RemoveFromCart => &self.remove_from_cart,
            EventKind::ProductBuy => &self.product_buy,
            EventKind::SearchQuery => &self.search_query,
        }
    }

    /// Every event across the four collections, tagged with its kind.
    pub fn all_events(&self) -> impl Iterator<Item = (EventKind, &Event)> + '_ {
        EventKind::ALL
            .into_iter()
            .flat_map(move |kind| self.events(kind).iter().map(move |e| (kind, e)))
    }

    pub fn purchases(&self) -> &[Event] {
        &self.product_buy
    }

    pub fn searches(&self) -> &[Event] {
        &self.search_query
    }

    pub fn cart_additions(&self) -> &[Event] {
        &self.add_to_cart
    }

    pub fn catalog(&self) -> &[ProductProperties] {
        &self.product_properties
    }

    /// SKU to unit price lookup. Duplicate catalog entries are last-write-wins.
    pub fn price_lookup(&self) -> HashMap<&Sku, f64> {
        self.product_properties
            .iter()
            .map(|p| (&p.sku, p.price))
            .collect()
    }

    /// Distinct-value summary of the loaded data.
    pub fn summary(&self) -> DatasetSummary {
        let clients: HashSet<_> = self.all_events().map(|(_, e)| &e.client_id).collect();
        let skus: HashSet<_> = self.product_properties.iter().map(|p| &p.sku).collect();
        let categories: HashSet<_> = self
            .product_properties
            .iter()
            .map(|p| &p.category)
            .collect();
        let urls: HashSet<_> = self
            .all_events()
            .filter_map(|(_, e)| e.url.as_deref())
            .filter(|u| !u.is_empty())
            .collect();

        DatasetSummary {
            clients: clients.len(),
            skus: skus.len(),
            categories: categories.len(),
            urls: urls.len(),
            add_to_cart: self.add_to_cart.len(),
            product_buy: self.product_buy.len(),
            remove_from_cart: self.remove_from_cart.len(),
            search_query: self.search_query.len(),
        }
    }
}

/// Counts of distinct entities and records in an [`EventStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DatasetSummary {
    pub clients: usize,
    pub skus: usize,
    pub categories: usize,
    pub urls: usize,
    pub add_to_cart: usize,
    pub product_buy: usize,
    pub remove_from_cart: usize,
    pub search_query: usize,
}

impl DatasetSummary {
    /// Total events across the four event collections.
    pub fn total_events(&self) -> usize {
        self.add_to_cart + self.product_buy + self.remove_from_cart + self.search_query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn write_dataset(dir: &std::path::Path, dataset: Dataset, body: &str) {
        std::fs::write(dir.join(dataset.file_name()), body).unwrap();
    }

    fn write_minimal(dir: &std::path::Path) {
        write_dataset(
            dir,
            Dataset::AddToCart,
            r#"[{"client_id": 1, "timestamp": "2022-06-22 10:00:00", "sku": 10}]"#,
        );
        write_dataset(
            dir,
            Dataset::ProductBuy,
            r#"[{"client_id": 1, "timestamp": "2022-06-22 11:00:00", "sku": 10}]"#,
        );
        write_dataset(dir, Dataset::RemoveFromCart, "[]");
        write_dataset(
            dir,
            Dataset::SearchQuery,
            r#"[{"client_id": 2, "timestamp": "2022-06-22 09:00:00", "query": "[0]"}]"#,
        );
        write_dataset(
            dir,
            Dataset::ProductProperties,
            r#"[{"sku": 10, "category": 1, "price": 5.0}]"#,
        );
    }

    #[tokio::test]
    async fn test_load_directory() {
        let temp = TempDir::new().unwrap();
        write_minimal(temp.path());

        let store = EventStore::load(&DataSource::Directory(temp.path().to_path_buf()))
            .await
            .expect("load should succeed");

        assert_eq!(store.cart_additions().len(), 1);
        assert_eq!(store.purchases().len(), 1);
        assert_eq!(store.searches().len(), 1);
        assert_eq!(store.catalog().len(), 1);
        assert_eq!(store.summary().clients, 2);
    }

    #[tokio::test]
    async fn test_missing_dataset_aborts_load() {
        let temp = TempDir::new().unwrap();
        write_minimal(temp.path());
        std::fs::remove_file(temp.path().join("remove_from_cart.json")).unwrap();

        let err = EventStore::load(&DataSource::Directory(temp.path().to_path_buf()))
            .await
            .unwrap_err();

        match err {
            Error::IncompleteIngestion { dataset, .. } => {
                assert_eq!(dataset, Dataset::RemoveFromCart)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_dataset_aborts_load() {
        let temp = TempDir::new().unwrap();
        write_minimal(temp.path());
        write_dataset(temp.path(), Dataset::ProductProperties, "{not json");

        let err = EventStore::load(&DataSource::Directory(temp.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteIngestion {
                dataset: Dataset::ProductProperties,
                ..
            }
        ));
    }

    #[test]
    fn test_http_location() {
        let source = DataSource::Http("https://example.com/subset_data/".to_string());
        assert_eq!(
            source.location(Dataset::SearchQuery),
            "https://example.com/subset_data/search_query.json"
        );
    }

    #[test]
    fn test_price_lookup_last_write_wins() {
        let product = |price| ProductProperties {
            sku: Sku::from("1"),
            category: Category::from("c"),
            price,
        };
        let store = EventStore::from_parts(
            vec![],
            vec![],
            vec![],
            vec![],
            vec![product(1.0), product(2.0)],
        );
        assert_eq!(store.price_lookup().get(&Sku::from("1")), Some(&2.0));
    }

    #[test]
    fn test_all_events_covers_every_collection() {
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        let store = EventStore::from_parts(
            vec![Event::new("a", ts)],
            vec![Event::new("b", ts)],
            vec![Event::new("c", ts)],
            vec![Event::new("d", ts)],
            vec![],
        );
        let kinds: Vec<_> = store.all_events().map(|(k, _)| k).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
        assert_eq!(store.summary().total_events(), 4);
    }
}
