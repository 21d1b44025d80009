//! Per-client event statistics for the user segmentation view.
//!
//! One pass over the four event collections counts each client's events by
//! kind (inside the time window) and tracks the earliest search and purchase.
//! A second pass drops clients whose totals fall outside the count ranges or
//! whose search-to-buy delay falls outside the delay range.

use super::engine::{Aggregator, ViewData};
use crate::filter::Filters;
use crate::range::{in_inclusive_range, is_defined_and_in_range};
use crate::store::EventStore;
use crate::types::{ClientId, EventKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Event counts and first-occurrence times for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub client_id: ClientId,
    pub add_count: u64,
    pub remove_count: u64,
    pub buy_count: u64,
    pub search_count: u64,
    /// Earliest search inside the time window
    pub first_search_time: Option<DateTime<Utc>>,
    /// Earliest purchase inside the time window
    pub first_buy_time: Option<DateTime<Utc>>,
}

impl UserStats {
    fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            add_count: 0,
            remove_count: 0,
            buy_count: 0,
            search_count: 0,
            first_search_time: None,
            first_buy_time: None,
        }
    }

    fn record(&mut self, kind: EventKind, at: DateTime<Utc>) {
        let keep_earliest = |slot: &mut Option<DateTime<Utc>>| {
            *slot = Some(slot.map_or(at, |current| current.min(at)));
        };
        match kind {
            EventKind::AddToCart => self.add_count += 1,
            EventKind::RemoveFromCart => self.remove_count += 1,
            EventKind::ProductBuy => {
                self.buy_count += 1;
                keep_earliest(&mut self.first_buy_time);
            }
            EventKind::SearchQuery => {
                self.search_count += 1;
                keep_earliest(&mut self.first_search_time);
            }
        }
    }

    /// add + remove + buy + search.
    pub fn total_events(&self) -> u64 {
        self.add_count + self.remove_count + self.buy_count + self.search_count
    }

    /// Minutes from first search to first purchase, when both exist.
    ///
    /// May be negative when the first purchase precedes the first search.
    pub fn delay_minutes(&self) -> Option<f64> {
        match (self.first_search_time, self.first_buy_time) {
            (Some(search), Some(buy)) => {
                Some(buy.signed_duration_since(search).num_milliseconds() as f64 / 60_000.0)
            }
            _ => None,
        }
    }

    /// Whether this client satisfies all four post-accumulation checks.
    pub fn matches(&self, filters: &Filters) -> bool {
        in_inclusive_range(self.total_events(), &filters.event_count)
            && in_inclusive_range(self.buy_count, &filters.buy_count)
            && in_inclusive_range(self.search_count, &filters.search_count)
            && is_defined_and_in_range(self.delay_minutes(), &filters.delay_minutes)
    }
}

/// One point of the purchases-vs-searches scatter plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScatterPoint {
    pub client_id: ClientId,
    pub buys: u64,
    pub searches: u64,
}

/// Filtered per-client statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserSegmentation {
    users: HashMap<ClientId, UserStats>,
}

impl UserSegmentation {
    pub fn get(&self, client_id: &ClientId) -> Option<&UserStats> {
        self.users.get(client_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserStats> {
        self.users.values()
    }

    /// Scatter points sorted by client id.
    pub fn scatter_points(&self) -> Vec<ScatterPoint> {
        let mut points: Vec<_> = self
            .users
            .values()
            .map(|u| ScatterPoint {
                client_id: u.client_id.clone(),
                buys: u.buy_count,
                searches: u.search_count,
            })
            .collect();
        points.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        points
    }

    /// Axis extents `(max_buys, max_searches)`, each at least 1.
    pub fn axis_max(&self) -> (u64, u64) {
        let max_buys = self.users.values().map(|u| u.buy_count).max().unwrap_or(0);
        let max_searches = self
            .users
            .values()
            .map(|u| u.search_count)
            .max()
            .unwrap_or(0);
        (max_buys.max(1), max_searches.max(1))
    }
}

impl ViewData for UserSegmentation {
    fn record_count(&self) -> usize {
        self.users.len()
    }
}

/// Builds a [`UserSegmentation`] from the four event collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStatsAggregator;

impl UserStatsAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Accumulate per-client statistics inside the time window, before the
    /// count and delay checks are applied.
    pub fn accumulate(store: &EventStore, filters: &Filters) -> HashMap<ClientId, UserStats> {
        let window = filters.time_range_millis();
        let mut users: HashMap<ClientId, UserStats> = HashMap::new();

        for (kind, event) in store.all_events() {
            if !in_inclusive_range(event.millis(), &window) {
                continue;
            }
            users
                .entry(event.client_id.clone())
                .or_insert_with(|| UserStats::new(event.client_id.clone()))
                .record(kind, event.timestamp);
        }

        users
    }
}

impl Aggregator for UserStatsAggregator {
    type Output = UserSegmentation;

    fn name(&self) -> &'static str {
        "user_segmentation"
    }

    fn aggregate(&self, store: &EventStore, filters: &Filters) -> UserSegmentation {
        let mut users = Self::accumulate(store, filters);
        users.retain(|_, user| user.matches(filters));
        UserSegmentation { users }
    }
}
