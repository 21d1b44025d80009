//! Dashboard orchestration.
//!
//! Recomputes all three views from one filter snapshot, and wires that
//! recompute to [`FilterState`] so every accepted filter change produces a
//! fresh set of views.

use super::delay_search::{DelayBinning, DelaySearchBinner, DelaySearchHeatmap};
use super::engine::{run_timed, ViewData};
use super::product_revenue::{
    ProductRevenue, ProductRevenueAggregator, RevenueHistogram, DEFAULT_HISTOGRAM_BUCKETS,
};
use super::user_stats::{UserSegmentation, UserStatsAggregator};
use crate::config::Config;
use crate::filter::{FilterState, Filters, SubscriptionId};
use crate::store::EventStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Every view computed from one filter snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardViews {
    /// The snapshot these views were computed from
    pub filters: Filters,
    pub users: UserSegmentation,
    pub products: ProductRevenue,
    pub histogram: RevenueHistogram,
    pub heatmap: DelaySearchHeatmap,
}

impl DashboardViews {
    /// True when no view has anything to show.
    pub fn is_empty(&self) -> bool {
        ViewData::is_empty(&self.users)
            && ViewData::is_empty(&self.products)
            && ViewData::is_empty(&self.heatmap)
    }
}

/// The configured set of aggregators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dashboard {
    pub users: UserStatsAggregator,
    pub products: ProductRevenueAggregator,
    pub heatmap: DelaySearchBinner,
    pub histogram_buckets: usize,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            users: UserStatsAggregator,
            products: ProductRevenueAggregator,
            heatmap: DelaySearchBinner::default(),
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS,
        }
    }
}

impl Dashboard {
    pub fn from_config(config: &Config) -> Self {
        let binning = match config.heatmap.delay_bin_count {
            Some(count) => DelayBinning::Count(count),
            None => DelayBinning::Width(config.heatmap.delay_bin_width),
        };
        Self {
            users: UserStatsAggregator,
            products: ProductRevenueAggregator,
            heatmap: DelaySearchBinner::new(binning, config.heatmap.search_step),
            histogram_buckets: config.histogram.bucket_count,
        }
    }

    /// Run all three views to completion.
    pub fn recompute(&self, store: &EventStore, filters: &Filters) -> DashboardViews {
        let start = Instant::now();

        let users = run_timed(&self.users, store, filters);
        let products = run_timed(&self.products, store, filters);
        let histogram = products.histogram(filters.price_bucket, self.histogram_buckets);
        let heatmap = run_timed(&self.heatmap, store, filters);

        tracing::info!(
            users = users.len(),
            products = products.len(),
            heatmap_clients = heatmap.total(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Dashboard recomputed"
        );

        DashboardViews {
            filters: filters.clone(),
            users,
            products,
            histogram,
            heatmap,
        }
    }

    /// Recompute on every accepted filter change and hand the views to `sink`.
    ///
    /// The sink must not call back into `state`.
    pub fn attach<F>(
        self,
        state: &mut FilterState,
        store: Arc<EventStore>,
        sink: F,
    ) -> SubscriptionId
    where
        F: Fn(DashboardViews) + Send + Sync + 'static,
    {
        state.subscribe(move |filters| sink(self.recompute(&store, filters)))
    }
}
