//! Analytics views for clickscope
//!
//! Provides the three dashboard views:
//! - User segmentation (per-client counts and search-to-buy delay)
//! - Product revenue (price-ranked SKUs and the revenue histogram)
//! - Delay vs. search heat map
//!
//! Every view is a pure function of the [`EventStore`](crate::store::EventStore)
//! and one [`Filters`](crate::filter::Filters) snapshot. See [`engine`] for the
//! shared trait and [`dashboard`] for the wiring to filter changes.

pub mod dashboard;
pub mod delay_search;
pub mod engine;
pub mod product_revenue;
pub mod user_stats;

pub use dashboard::{Dashboard, DashboardViews};
pub use delay_search::{
    CellCount, DelayBin, DelayBinning, DelaySearchBinner, DelaySearchHeatmap, HeatmapCell,
    JourneyRow, SearchBucket,
};
pub use engine::{run_timed, Aggregator, ViewData};
pub use product_revenue::{
    revenue_distribution, HistogramBucket, ProductRevenue, ProductRevenueAggregator,
    ProductSales, RevenueCount, RevenueHistogram,
};
pub use user_stats::{ScatterPoint, UserSegmentation, UserStats, UserStatsAggregator};
