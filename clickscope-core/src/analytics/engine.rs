//! Aggregation framework
//!
//! Each view of the dashboard is produced by an [`Aggregator`]: a stateless
//! function of the [`EventStore`] and one [`Filters`] snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────────────────────────────────────┐
//! │ EventStore │──►│ UserStatsAggregator      → UserSegmentation   │
//! │ (immutable)│   │ ProductRevenueAggregator → ProductRevenue     │
//! └────────────┘   │ DelaySearchBinner        → DelaySearchHeatmap │
//! ┌────────────┐   └───────────────────────────────────────────────┘
//! │ Filters    │──►            (each re-run in full per change)
//! └────────────┘
//! ```
//!
//! Aggregators must be:
//! - **Deterministic**: same store and filters produce the same output
//! - **Stateless**: no accumulation carried across calls
//! - **Total**: an empty result is a value, never an error

use crate::filter::Filters;
use crate::store::EventStore;
use std::time::Instant;

/// A view computation over the event store.
pub trait Aggregator {
    /// Derived value produced by one pass.
    type Output: ViewData;

    /// Short name used in logs (e.g. "user_segmentation").
    fn name(&self) -> &'static str;

    /// Run one full pass over the store under `filters`.
    fn aggregate(&self, store: &EventStore, filters: &Filters) -> Self::Output;
}

/// Common accessors of aggregation outputs.
pub trait ViewData {
    /// Number of records (users, products, tallied clients) in the output.
    fn record_count(&self) -> usize;

    /// True when nothing matched; consumers render a neutral "no data" state.
    fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// Run an aggregator and log its timing and result size.
pub fn run_timed<A: Aggregator>(aggregator: &A, store: &EventStore, filters: &Filters) -> A::Output {
    let start = Instant::now();
    let output = aggregator.aggregate(store, filters);
    let duration_ms = start.elapsed().as_millis() as u64;

    if output.is_empty() {
        tracing::debug!(
            view = aggregator.name(),
            duration_ms,
            "Aggregation produced no data"
        );
    } else {
        tracing::debug!(
            view = aggregator.name(),
            records = output.record_count(),
            duration_ms,
            "Aggregation completed"
        );
    }

    output
}
