//! Integration tests for clickscope ingestion, filtering and aggregation
//!
//! Fixture datasets live in `tests/fixtures/subset/` and mirror the five
//! JSON files a real export provides.

use chrono::{DateTime, TimeZone, Utc};
use clickscope_core::analytics::{
    run_timed, Aggregator, DelaySearchBinner, ProductRevenueAggregator, UserStatsAggregator,
};
use clickscope_core::{
    Category, ClientId, Dashboard, DataSource, Dimension, Error, Event, EventStore, FilterState,
    FilterUpdate, Filters, ProductProperties, Sku, ValueRange,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/subset")
}

async fn load_fixture() -> EventStore {
    EventStore::load(&DataSource::Directory(fixture_dir()))
        .await
        .expect("fixture should load")
}

fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_717_200_000 + minute * 60, 0).unwrap()
}

fn product(sku: &str, price: f64) -> ProductProperties {
    ProductProperties {
        sku: Sku::from(sku),
        category: Category::from("1"),
        price,
    }
}

/// Filters wide open except for the given overrides.
fn open_filters() -> Filters {
    Filters::unbounded()
}

// ============================================
// Ingestion
// ============================================

#[tokio::test]
async fn test_fixture_loads_all_five_datasets() {
    let store = load_fixture().await;
    let summary = store.summary();

    assert_eq!(summary.add_to_cart, 2);
    assert_eq!(summary.product_buy, 5);
    assert_eq!(summary.remove_from_cart, 1);
    assert_eq!(summary.search_query, 7);
    assert_eq!(summary.total_events(), 15);
    assert_eq!(summary.clients, 5);
    assert_eq!(summary.skus, 4);
    assert_eq!(summary.categories, 3);
    assert_eq!(summary.urls, 0);

    // Integer ids decode to their decimal string form
    assert!(store
        .purchases()
        .iter()
        .any(|e| e.client_id == ClientId::from("5005") && e.sku == Some(Sku::from("1001"))));
}

#[tokio::test]
async fn test_missing_dataset_is_fatal() {
    let temp = TempDir::new().unwrap();
    for name in [
        "add_to_cart.json",
        "product_buy.json",
        "remove_from_cart.json",
        "product_properties.json",
    ] {
        std::fs::copy(fixture_dir().join(name), temp.path().join(name)).unwrap();
    }

    let err = EventStore::load(&DataSource::Directory(temp.path().to_path_buf()))
        .await
        .unwrap_err();
    match err {
        Error::IncompleteIngestion { dataset, .. } => {
            assert_eq!(dataset.as_str(), "search_query")
        }
        other => panic!("expected IncompleteIngestion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_dataset_is_fatal() {
    let temp = TempDir::new().unwrap();
    for entry in std::fs::read_dir(fixture_dir()).unwrap() {
        let path = entry.unwrap().path();
        std::fs::copy(&path, temp.path().join(path.file_name().unwrap())).unwrap();
    }
    std::fs::write(temp.path().join("product_properties.json"), "{not json").unwrap();

    let err = EventStore::load(&DataSource::Directory(temp.path().to_path_buf()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteIngestion { .. }));
    assert!(err.to_string().contains("product_properties"));
}

// ============================================
// Initial bounds
// ============================================

#[tokio::test]
async fn test_initial_bounds_from_fixture() {
    let store = load_fixture().await;
    let state = FilterState::initialize(&store);
    let filters = state.get();

    // 2024-03-01 09:55:00 .. 13:10:00 UTC
    assert_eq!(filters.time_range, ValueRange::new(1_709_286_900, 1_709_298_600));
    assert_eq!(filters.event_count, ValueRange::new(0, 5));
    assert_eq!(filters.buy_count, ValueRange::new(0, 2));
    assert_eq!(filters.search_count, ValueRange::new(0, 3));
    assert_eq!(filters.price_bucket, ValueRange::new(12.5, 99.0));
    assert_eq!(filters.cart_value_bucket, ValueRange::new(25.0, 40.0));

    // c1 buys 9m59.5s after its latest earlier search; 5005's second purchase
    // is 190 minutes after its only search. c2 has no earlier search.
    assert!((filters.delay_minutes.min - 599.5 / 60.0).abs() < 1e-9);
    assert_eq!(filters.delay_minutes.max, 190.0);

    // A, B, Z and 1001 were purchased; Z has no price
    assert_eq!(filters.top_n_products, 4);
    assert_eq!(filters.min_revenue, 12.5);
    assert_eq!(state.bounds(), filters);
}

#[tokio::test]
async fn test_fixture_views_under_initial_filters() {
    let store = load_fixture().await;
    let state = FilterState::initialize(&store);
    let views = Dashboard::default().recompute(&store, state.get());

    // c2 bought before searching (-5 min), outside the delay range
    assert_eq!(views.users.len(), 4);
    assert!(views.users.get(&ClientId::from("c2")).is_none());
    let c1 = views.users.get(&ClientId::from("c1")).unwrap();
    assert_eq!((c1.add_count, c1.buy_count, c1.search_count), (1, 1, 3));
    assert_eq!(c1.delay_minutes(), Some(30.0));
    // c4 never bought, so the delay check does not apply
    assert!(views.users.get(&ClientId::from("c4")).is_some());

    let skus: Vec<_> = views
        .products
        .products
        .iter()
        .map(|p| p.sku.as_str())
        .collect();
    assert_eq!(skus, vec!["B", "A", "1001"]);
    assert_eq!(views.products.dropped_unknown_sku, 1);
    assert_eq!(views.products.get(&Sku::from("A")).unwrap().revenue, 50.0);

    let total: f64 = views.histogram.buckets.iter().map(|b| b.revenue()).sum();
    assert_eq!(total, 102.5);
    assert_eq!(views.histogram.buckets[0].members.len(), 1);
    assert_eq!(views.histogram.buckets[2].members[0].sku.as_str(), "A");
    assert_eq!(views.histogram.buckets[6].members[0].sku.as_str(), "B");

    assert_eq!(views.heatmap.total(), 3);
    assert_eq!(views.heatmap.get(0, "1-10"), 3);
    assert_eq!(views.heatmap.delay_bins.len(), 1);
}

// ============================================
// Concrete scenarios
// ============================================

#[test]
fn test_scenario_search_then_buy_is_included() {
    let store = EventStore::from_parts(
        vec![],
        vec![Event::new("c", at_minute(30))],
        vec![],
        vec![
            Event::new("c", at_minute(0)),
            Event::new("c", at_minute(10)),
            Event::new("c", at_minute(20)),
        ],
        vec![],
    );
    let mut filters = open_filters();
    filters.delay_minutes = ValueRange::new(0.0, 60.0);
    filters.search_count = ValueRange::new(0, 100);

    let users = UserStatsAggregator.aggregate(&store, &filters);
    let stats = users.get(&ClientId::from("c")).expect("client included");
    assert_eq!(stats.search_count, 3);
    assert_eq!(stats.buy_count, 1);
    assert_eq!(stats.delay_minutes(), Some(30.0));

    let heatmap = DelaySearchBinner::default().aggregate(&store, &filters);
    assert_eq!(heatmap.total(), 1);
}

#[test]
fn test_scenario_unknown_sku_is_dropped() {
    let store = EventStore::from_parts(
        vec![],
        vec![
            Event::new("c", at_minute(1)).with_sku("ghost"),
            Event::new("c", at_minute(2)).with_sku("real"),
        ],
        vec![],
        vec![],
        vec![product("real", 10.0)],
    );

    let revenue = ProductRevenueAggregator.aggregate(&store, &open_filters());
    assert_eq!(revenue.len(), 1);
    assert!(revenue.get(&Sku::from("ghost")).is_none());
    assert_eq!(revenue.dropped_unknown_sku, 1);
}

#[test]
fn test_scenario_revenue_floor_above_everything_is_empty() {
    let store = EventStore::from_parts(
        vec![],
        vec![
            Event::new("c", at_minute(1)).with_sku("a"),
            Event::new("d", at_minute(2)).with_sku("b"),
        ],
        vec![],
        vec![],
        vec![product("a", 10.0), product("b", 20.0)],
    );
    let mut filters = open_filters();
    filters.min_revenue = 1_000.0;

    let revenue = ProductRevenueAggregator.aggregate(&store, &filters);
    assert!(revenue.is_empty());
    let histogram = revenue.histogram(ValueRange::new(10.0, 20.0), 20);
    assert_eq!(histogram.max_revenue(), 0.0);
}

#[test]
fn test_scenario_buy_before_search_is_not_tallied() {
    let store = EventStore::from_parts(
        vec![],
        vec![Event::new("c", at_minute(5))],
        vec![],
        vec![Event::new("c", at_minute(10))],
        vec![],
    );

    for delay in [
        ValueRange::new(f64::NEG_INFINITY, f64::INFINITY),
        ValueRange::new(-100.0, 100.0),
        ValueRange::new(-5.0, -5.0),
    ] {
        let mut filters = open_filters();
        filters.delay_minutes = delay;
        let heatmap = DelaySearchBinner::default().aggregate(&store, &filters);
        assert!(heatmap.is_empty(), "delay range {delay} should not tally");
    }
}

// ============================================
// Properties
// ============================================

#[tokio::test]
async fn test_invalid_range_rejected_for_every_interval_dimension() {
    let store = load_fixture().await;
    let mut state = FilterState::initialize(&store);
    let before = state.snapshot();

    let updates = [
        FilterUpdate::TimeRange(ValueRange::new(10, 9)),
        FilterUpdate::EventCount(ValueRange::new(3, 2)),
        FilterUpdate::BuyCount(ValueRange::new(3, 2)),
        FilterUpdate::SearchCount(ValueRange::new(3, 2)),
        FilterUpdate::CartValueBucket(ValueRange::new(3.0, 2.0)),
        FilterUpdate::PriceBucket(ValueRange::new(3.0, 2.0)),
        FilterUpdate::DelayMinutes(ValueRange::new(3.0, 2.0)),
    ];
    for update in updates {
        let err = state.set(update).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }), "{err}");
        assert_eq!(state.get(), &before);
    }
}

#[tokio::test]
async fn test_user_totals_and_range_checks_hold() {
    let store = load_fixture().await;
    let mut filters = FilterState::initialize(&store).snapshot();
    filters.event_count = ValueRange::new(2, 4);
    filters.delay_minutes = ValueRange::new(0.0, 200.0);

    let users = UserStatsAggregator.aggregate(&store, &filters);
    assert!(!users.is_empty());
    for user in users.iter() {
        let independent = store
            .all_events()
            .filter(|(_, e)| e.client_id == user.client_id)
            .count() as u64;
        assert_eq!(user.total_events(), independent);
        assert!(filters.event_count.contains(user.total_events()));
        assert!(filters.buy_count.contains(user.buy_count));
        assert!(filters.search_count.contains(user.search_count));
        if let Some(delay) = user.delay_minutes() {
            assert!(filters.delay_minutes.contains(delay));
        }
    }
}

#[tokio::test]
async fn test_product_result_respects_top_n_order_and_floor() {
    let store = load_fixture().await;
    let mut filters = FilterState::initialize(&store).snapshot();

    for (top_n, min_revenue) in [(1, 0.0), (2, 41.0), (10, 12.5), (0, 0.0)] {
        filters.top_n_products = top_n;
        filters.min_revenue = min_revenue;
        let result = ProductRevenueAggregator.aggregate(&store, &filters);

        assert!(result.len() <= top_n);
        assert!(result
            .products
            .windows(2)
            .all(|pair| pair[0].price >= pair[1].price));
        assert!(result.products.iter().all(|p| p.revenue >= min_revenue));
    }
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let store = load_fixture().await;
    let filters = FilterState::initialize(&store).snapshot();
    let dashboard = Dashboard::default();

    assert_eq!(
        dashboard.recompute(&store, &filters),
        dashboard.recompute(&store, &filters)
    );
    assert_eq!(
        run_timed(&UserStatsAggregator, &store, &filters),
        run_timed(&UserStatsAggregator, &store, &filters)
    );
}

#[tokio::test]
async fn test_tally_sum_matches_eligible_clients() {
    let store = load_fixture().await;
    let binner = DelaySearchBinner::default();

    for (delay, searches) in [
        (ValueRange::new(0.0, 1_000.0), ValueRange::new(0, 100)),
        (ValueRange::new(0.0, 25.0), ValueRange::new(0, 100)),
        (ValueRange::new(0.0, 1_000.0), ValueRange::new(2, 3)),
    ] {
        let mut filters = open_filters();
        filters.delay_minutes = delay;
        filters.search_count = searches;

        let eligible = DelaySearchBinner::journeys(&store, &filters).len() as u64;
        let heatmap = binner.aggregate(&store, &filters);
        assert_eq!(heatmap.total(), eligible);
    }

    let mut filters = open_filters();
    filters.delay_minutes = ValueRange::new(0.0, 25.0);
    // Only c3 (20 min); c1 is 30 min and 5005 is 180 min
    assert_eq!(binner.aggregate(&store, &filters).total(), 1);
}

#[tokio::test]
async fn test_filter_changes_drive_dashboard() {
    let store = Arc::new(load_fixture().await);
    let mut state = FilterState::initialize(&store);
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let id = Dashboard::default().attach(&mut state, store.clone(), move |views| {
        sink.lock().unwrap().push(views.products.len())
    });

    state
        .set(FilterUpdate::TopNProducts(1))
        .expect("valid update");
    let dimension: Dimension = "price_bucket".parse().unwrap();
    assert_eq!(dimension, Dimension::PriceBucket);
    state
        .set(FilterUpdate::PriceBucket(ValueRange::new(0.0, 20.0)))
        .expect("valid update");
    state
        .set(FilterUpdate::TopNProducts(10))
        .expect("valid update");

    assert!(state.unsubscribe(id));
    state
        .set(FilterUpdate::MinRevenue(0.0))
        .expect("valid update");

    assert_eq!(*seen.lock().unwrap(), vec![1, 1, 1]);
}
