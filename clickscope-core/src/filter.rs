//! Filter state shared by every view
//!
//! [`FilterState`] is the only mutable entity in the system. It holds the
//! nine filter dimensions, accepts one update at a time through
//! [`FilterState::set`], and synchronously notifies every subscribed observer
//! with the new [`Filters`] snapshot after each accepted update.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clickscope_core::filter::{FilterState, FilterUpdate};
//! use clickscope_core::range::ValueRange;
//!
//! let mut state = FilterState::initialize(&store);
//! let id = state.subscribe(|filters| println!("buy_count = {}", filters.buy_count));
//! state.set(FilterUpdate::BuyCount(ValueRange::new(1, 10)))?;
//! state.unsubscribe(id);
//! ```
//!
//! Observers receive `&Filters` while the state is borrowed, so an observer
//! cannot call `set` on the state it is reacting to.

use crate::error::{Error, Result};
use crate::range::{lookup_or_drop, ValueRange};
use crate::store::EventStore;
use crate::types::{ClientId, EventKind, Sku};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

const MILLIS_PER_SECOND: i64 = 1000;
const MILLIS_PER_MINUTE: f64 = 60_000.0;

// ============================================
// Dimensions
// ============================================

/// The nine filter dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    TimeRange,
    EventCount,
    BuyCount,
    SearchCount,
    CartValueBucket,
    PriceBucket,
    DelayMinutes,
    TopNProducts,
    MinRevenue,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::TimeRange,
        Dimension::EventCount,
        Dimension::BuyCount,
        Dimension::SearchCount,
        Dimension::CartValueBucket,
        Dimension::PriceBucket,
        Dimension::DelayMinutes,
        Dimension::TopNProducts,
        Dimension::MinRevenue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::TimeRange => "time_range",
            Dimension::EventCount => "event_count",
            Dimension::BuyCount => "buy_count",
            Dimension::SearchCount => "search_count",
            Dimension::CartValueBucket => "cart_value_bucket",
            Dimension::PriceBucket => "price_bucket",
            Dimension::DelayMinutes => "delay_minutes",
            Dimension::TopNProducts => "top_n_products",
            Dimension::MinRevenue => "min_revenue",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::UnknownDimension(s.to_string()))
    }
}

// ============================================
// Filter values
// ============================================

/// A complete, immutable set of filter values.
///
/// Time is in whole UNIX seconds, delays in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub time_range: ValueRange<i64>,
    pub event_count: ValueRange<u64>,
    pub buy_count: ValueRange<u64>,
    pub search_count: ValueRange<u64>,
    pub cart_value_bucket: ValueRange<f64>,
    pub price_bucket: ValueRange<f64>,
    pub delay_minutes: ValueRange<f64>,
    pub top_n_products: usize,
    pub min_revenue: f64,
}

impl Filters {
    /// Filters that exclude nothing.
    pub fn unbounded() -> Self {
        Self {
            time_range: ValueRange::new(i64::MIN, i64::MAX),
            event_count: ValueRange::new(0, u64::MAX),
            buy_count: ValueRange::new(0, u64::MAX),
            search_count: ValueRange::new(0, u64::MAX),
            cart_value_bucket: ValueRange::new(f64::NEG_INFINITY, f64::INFINITY),
            price_bucket: ValueRange::new(f64::NEG_INFINITY, f64::INFINITY),
            delay_minutes: ValueRange::new(f64::NEG_INFINITY, f64::INFINITY),
            top_n_products: usize::MAX,
            min_revenue: 0.0,
        }
    }

    /// Initial filter values derived from the observed data.
    ///
    /// - `time_range`: earliest to latest event across the four collections
    /// - `event_count`, `buy_count`, `search_count`: zero to the per-client maximum
    /// - `price_bucket`: cheapest to most expensive catalog entry
    /// - `cart_value_bucket`: price range of SKUs ever added to a cart
    /// - `delay_minutes`: range of per-purchase delays since that client's
    ///   latest earlier search; purchases with no earlier search are skipped
    /// - `top_n_products`: number of distinct SKUs ever purchased
    /// - `min_revenue`: smallest per-SKU revenue, 0 when nothing sold
    ///
    /// Any range with no observations is `[0, 0]`.
    pub fn from_store(store: &EventStore) -> Self {
        let time_range = min_max(store.all_events().map(|(_, e)| e.millis()))
            .map(|(lo, hi)| {
                ValueRange::new(
                    lo.div_euclid(MILLIS_PER_SECOND),
                    hi.div_euclid(MILLIS_PER_SECOND) + i64::from(hi.rem_euclid(MILLIS_PER_SECOND) != 0),
                )
            })
            .unwrap_or(ValueRange::new(0, 0));

        let mut per_client: HashMap<&ClientId, [u64; 4]> = HashMap::new();
        for (kind, event) in store.all_events() {
            let counts = per_client.entry(&event.client_id).or_default();
            counts[kind_slot(kind)] += 1;
        }
        let max_per_client = |kind: Option<EventKind>| {
            per_client
                .values()
                .map(|counts| match kind {
                    Some(kind) => counts[kind_slot(kind)],
                    None => counts.iter().sum(),
                })
                .max()
                .unwrap_or(0)
        };
        let max_events = max_per_client(None);
        let max_buys = max_per_client(Some(EventKind::ProductBuy));
        let max_searches = max_per_client(Some(EventKind::SearchQuery));

        let prices = store.price_lookup();
        let price_bucket = float_range(store.catalog().iter().map(|p| p.price));
        let cart_value_bucket = float_range(
            store
                .cart_additions()
                .iter()
                .filter_map(|e| e.sku.as_ref())
                .filter_map(|sku| lookup_or_drop(&prices, sku).copied()),
        );
        let delay_minutes = float_range(purchase_delays(store));

        let mut sales: HashMap<&Sku, u64> = HashMap::new();
        for sku in store.purchases().iter().filter_map(|e| e.sku.as_ref()) {
            *sales.entry(sku).or_default() += 1;
        }
        let min_revenue = sales
            .iter()
            .filter_map(|(sku, count)| {
                lookup_or_drop(&prices, *sku).map(|price| *count as f64 * price)
            })
            .reduce(f64::min)
            .unwrap_or(0.0);

        Self {
            time_range,
            event_count: ValueRange::new(0, max_events),
            buy_count: ValueRange::new(0, max_buys),
            search_count: ValueRange::new(0, max_searches),
            cart_value_bucket,
            price_bucket,
            delay_minutes,
            top_n_products: sales.len(),
            min_revenue,
        }
    }

    /// Time range in epoch milliseconds, for comparing event timestamps.
    pub fn time_range_millis(&self) -> ValueRange<i64> {
        ValueRange::new(
            self.time_range.min.saturating_mul(MILLIS_PER_SECOND),
            self.time_range.max.saturating_mul(MILLIS_PER_SECOND),
        )
    }

    /// Apply one update after validating it. On error `self` is unchanged.
    pub fn apply(&mut self, update: FilterUpdate) -> Result<()> {
        update.validate()?;
        match update {
            FilterUpdate::TimeRange(r) => self.time_range = r,
            FilterUpdate::EventCount(r) => self.event_count = r,
            FilterUpdate::BuyCount(r) => self.buy_count = r,
            FilterUpdate::SearchCount(r) => self.search_count = r,
            FilterUpdate::CartValueBucket(r) => self.cart_value_bucket = r,
            FilterUpdate::PriceBucket(r) => self.price_bucket = r,
            FilterUpdate::DelayMinutes(r) => self.delay_minutes = r,
            FilterUpdate::TopNProducts(n) => self.top_n_products = n,
            FilterUpdate::MinRevenue(v) => self.min_revenue = v,
        }
        Ok(())
    }
}

fn kind_slot(kind: EventKind) -> usize {
    match kind {
        EventKind::AddToCart => 0,
        EventKind::RemoveFromCart => 1,
        EventKind::ProductBuy => 2,
        EventKind::SearchQuery => 3,
    }
}

fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((
            if v < lo { v } else { lo },
            if v > hi { v } else { hi },
        )),
    })
}

fn float_range(values: impl Iterator<Item = f64>) -> ValueRange<f64> {
    min_max(values.filter(|v| !v.is_nan()))
        .map(|(lo, hi)| ValueRange::new(lo, hi))
        .unwrap_or(ValueRange::new(0.0, 0.0))
}

/// Minutes from each purchase back to the same client's latest strictly
/// earlier search.
fn purchase_delays(store: &EventStore) -> impl Iterator<Item = f64> + '_ {
    let mut searches: HashMap<&ClientId, Vec<i64>> = HashMap::new();
    for event in store.searches() {
        searches
            .entry(&event.client_id)
            .or_default()
            .push(event.millis());
    }
    for times in searches.values_mut() {
        times.sort_unstable();
    }

    store.purchases().iter().filter_map(move |buy| {
        let bought_at = buy.millis();
        let times = searches.get(&buy.client_id)?;
        let earlier = times.partition_point(|&t| t < bought_at);
        let latest = *times.get(earlier.checked_sub(1)?)?;
        Some((bought_at - latest) as f64 / MILLIS_PER_MINUTE)
    })
}

// ============================================
// Updates
// ============================================

/// A replacement value for exactly one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterUpdate {
    TimeRange(ValueRange<i64>),
    EventCount(ValueRange<u64>),
    BuyCount(ValueRange<u64>),
    SearchCount(ValueRange<u64>),
    CartValueBucket(ValueRange<f64>),
    PriceBucket(ValueRange<f64>),
    DelayMinutes(ValueRange<f64>),
    TopNProducts(usize),
    MinRevenue(f64),
}

impl FilterUpdate {
    pub fn dimension(&self) -> Dimension {
        match self {
            FilterUpdate::TimeRange(_) => Dimension::TimeRange,
            FilterUpdate::EventCount(_) => Dimension::EventCount,
            FilterUpdate::BuyCount(_) => Dimension::BuyCount,
            FilterUpdate::SearchCount(_) => Dimension::SearchCount,
            FilterUpdate::CartValueBucket(_) => Dimension::CartValueBucket,
            FilterUpdate::PriceBucket(_) => Dimension::PriceBucket,
            FilterUpdate::DelayMinutes(_) => Dimension::DelayMinutes,
            FilterUpdate::TopNProducts(_) => Dimension::TopNProducts,
            FilterUpdate::MinRevenue(_) => Dimension::MinRevenue,
        }
    }

    /// The same update with an interval pulled inside the matching interval
    /// of `bounds`. Scalars are returned unchanged.
    pub fn clamped_to(self, bounds: &Filters) -> Self {
        match self {
            FilterUpdate::TimeRange(r) => FilterUpdate::TimeRange(r.clamp_to(&bounds.time_range)),
            FilterUpdate::EventCount(r) => FilterUpdate::EventCount(r.clamp_to(&bounds.event_count)),
            FilterUpdate::BuyCount(r) => FilterUpdate::BuyCount(r.clamp_to(&bounds.buy_count)),
            FilterUpdate::SearchCount(r) => {
                FilterUpdate::SearchCount(r.clamp_to(&bounds.search_count))
            }
            FilterUpdate::CartValueBucket(r) => {
                FilterUpdate::CartValueBucket(r.clamp_to(&bounds.cart_value_bucket))
            }
            FilterUpdate::PriceBucket(r) => {
                FilterUpdate::PriceBucket(r.clamp_to(&bounds.price_bucket))
            }
            FilterUpdate::DelayMinutes(r) => {
                FilterUpdate::DelayMinutes(r.clamp_to(&bounds.delay_minutes))
            }
            FilterUpdate::TopNProducts(_) | FilterUpdate::MinRevenue(_) => self,
        }
    }

    /// Reject intervals with `min > max` (or NaN ends) and NaN scalars.
    pub fn validate(&self) -> Result<()> {
        fn check<T: PartialOrd + Copy + fmt::Display>(
            dimension: Dimension,
            range: &ValueRange<T>,
        ) -> Result<()> {
            if range.is_valid() {
                Ok(())
            } else {
                Err(Error::invalid_range(dimension, range.min, range.max))
            }
        }

        let dimension = self.dimension();
        match self {
            FilterUpdate::TimeRange(r) => check(dimension, r),
            FilterUpdate::EventCount(r) | FilterUpdate::BuyCount(r) | FilterUpdate::SearchCount(r) => {
                check(dimension, r)
            }
            FilterUpdate::CartValueBucket(r)
            | FilterUpdate::PriceBucket(r)
            | FilterUpdate::DelayMinutes(r) => check(dimension, r),
            FilterUpdate::TopNProducts(_) => Ok(()),
            FilterUpdate::MinRevenue(v) if v.is_nan() => Err(Error::InvalidValue {
                dimension: dimension.to_string(),
                value: v.to_string(),
            }),
            FilterUpdate::MinRevenue(_) => Ok(()),
        }
    }
}

// ============================================
// Observable state
// ============================================

/// Handle returned by [`FilterState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Callback invoked with the new filter snapshot after every accepted update.
pub type Observer = Box<dyn Fn(&Filters) + Send + Sync>;

/// Mutable, observable holder of the current [`Filters`].
pub struct FilterState {
    current: Filters,
    bounds: Filters,
    observers: Vec<(SubscriptionId, Observer)>,
}

impl FilterState {
    /// Create a state whose initial values and bounds are `initial`.
    pub fn new(initial: Filters) -> Self {
        Self {
            bounds: initial.clone(),
            current: initial,
            observers: Vec::new(),
        }
    }

    /// Create a state with bounds computed from the loaded data.
    pub fn initialize(store: &EventStore) -> Self {
        let initial = Filters::from_store(store);
        tracing::info!(
            time_range = %initial.time_range,
            event_count = %initial.event_count,
            buy_count = %initial.buy_count,
            search_count = %initial.search_count,
            price_bucket = %initial.price_bucket,
            delay_minutes = %initial.delay_minutes,
            top_n_products = initial.top_n_products,
            min_revenue = initial.min_revenue,
            "Filter state initialized"
        );
        Self::new(initial)
    }

    /// Current filter values.
    pub fn get(&self) -> &Filters {
        &self.current
    }

    /// Owned copy of the current filter values.
    pub fn snapshot(&self) -> Filters {
        self.current.clone()
    }

    /// Values computed at initialization (the slider extents).
    pub fn bounds(&self) -> &Filters {
        &self.bounds
    }

    /// Replace one dimension and notify every observer.
    ///
    /// Intervals are clamped to [`FilterState::bounds`]. An invalid update is
    /// rejected and leaves the state and observers untouched.
    pub fn set(&mut self, update: FilterUpdate) -> Result<()> {
        let applied = update
            .validate()
            .and_then(|()| self.current.apply(update.clamped_to(&self.bounds)));
        if let Err(e) = applied {
            tracing::warn!(dimension = %update.dimension(), error = %e, "Rejected filter update");
            return Err(e);
        }
        tracing::debug!(
            dimension = %update.dimension(),
            observers = self.observers.len(),
            "Filter updated"
        );
        self.notify();
        Ok(())
    }

    /// Register an observer for every future update.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&Filters) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Invoke every observer with the current values.
    pub fn notify(&self) {
        for (_, observer) in &self.observers {
            observer(&self.current);
        }
    }
}

impl fmt::Debug for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterState")
            .field("current", &self.current)
            .field("bounds", &self.bounds)
            .field("observers", &self.observers.len())
            .finish()
    }
}
