//! # clickscope-core
//!
//! Core library for clickscope, an e-commerce clickstream analytics engine.
//!
//! This library provides:
//! - The in-memory event store and dataset ingestion (directory or HTTP)
//! - The shared filter state with change observers
//! - Three aggregations: user segmentation, product revenue and the
//!   delay vs. search heat map
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Data flow
//!
//! ```text
//! DataSource ──load──► EventStore (immutable)
//!                           │
//! FilterState ──set──► observers ──► Dashboard::recompute ──► DashboardViews
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use clickscope_core::{Config, Dashboard, EventStore, FilterState, FilterUpdate, ValueRange};
//!
//! # async fn run() -> clickscope_core::Result<()> {
//! let config = Config::load()?;
//! let store = EventStore::load(&config.data_source()).await?;
//!
//! let mut filters = FilterState::initialize(&store);
//! filters.set(FilterUpdate::BuyCount(ValueRange::new(1, 5)))?;
//!
//! let views = Dashboard::from_config(&config).recompute(&store, filters.get());
//! println!("{} users match", views.users.len());
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{Dashboard, DashboardViews};
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{Dimension, FilterState, FilterUpdate, Filters, SubscriptionId};
pub use range::ValueRange;
pub use store::{DataSource, DatasetSummary, EventStore};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod logging;
pub mod range;
pub mod store;
pub mod types;
