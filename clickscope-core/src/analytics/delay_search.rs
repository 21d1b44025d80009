//! Search-to-purchase delay vs. search count heat-map.
//!
//! For every client with at least one search and one purchase inside the
//! time window, the delay from the earliest search to the earliest purchase
//! is binned on one axis and the client's search count on the other. Each
//! cell holds the number of clients that fall into it.
//!
//! Bin and bucket construction are pure functions of (domain bound, step) so
//! they can be checked separately from the tally.

use super::engine::{Aggregator, ViewData};
use crate::filter::Filters;
use crate::range::in_inclusive_range;
use crate::store::EventStore;
use crate::types::ClientId;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Default delay bin width in minutes.
pub const DEFAULT_DELAY_BIN_WIDTH: f64 = 4000.0;

/// Default width of a search-count bucket.
pub const DEFAULT_SEARCH_STEP: u64 = 10;

/// Upper limit on the number of delay bins.
pub const MAX_DELAY_BINS: usize = 1000;

/// How the delay axis is divided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayBinning {
    /// Fixed-width bins starting at zero minutes
    Width(f64),
    /// This many equal-width bins spanning zero to the largest observed delay
    Count(usize),
}

impl Default for DelayBinning {
    fn default() -> Self {
        DelayBinning::Width(DEFAULT_DELAY_BIN_WIDTH)
    }
}

// ============================================
// Axis construction
// ============================================

/// One delay bin `[start, end)` in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayBin {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl DelayBin {
    pub fn label(&self) -> String {
        crate::format::format_span(self.start, self.end)
    }
}

/// Delay bins covering `[0, max_delay]`, with the width actually used.
///
/// `Width(w)` yields `floor(max_delay / w) + 1` bins so that the bin of
/// `max_delay` always exists. `Count(n)` yields exactly `n` bins; the largest
/// delay falls into the last one.
///
/// Both modes produce at most [`MAX_DELAY_BINS`] bins. A width that would
/// need more falls back to `Count(MAX_DELAY_BINS)`.
pub fn delay_bins(max_delay: f64, binning: DelayBinning) -> (f64, Vec<DelayBin>) {
    let max_delay = if max_delay.is_finite() { max_delay.max(0.0) } else { 0.0 };
    let by_count = |n: usize| {
        let n = n.clamp(1, MAX_DELAY_BINS);
        let w = if max_delay > 0.0 { max_delay / n as f64 } else { 1.0 };
        (w, n)
    };
    let (width, count) = match binning {
        DelayBinning::Width(w) => {
            let w = if w.is_finite() && w > 0.0 {
                w
            } else {
                DEFAULT_DELAY_BIN_WIDTH
            };
            let needed = (max_delay / w).floor();
            if needed < MAX_DELAY_BINS as f64 {
                (w, needed as usize + 1)
            } else {
                tracing::debug!(width = w, max_delay, "Delay bin width too small, capping bin count");
                by_count(MAX_DELAY_BINS)
            }
        }
        DelayBinning::Count(n) => by_count(n),
    };

    let bins = (0..count)
        .map(|index| DelayBin {
            index,
            start: width * index as f64,
            end: width * (index + 1) as f64,
        })
        .collect();
    (width, bins)
}

/// Index of the delay bin holding `delay`, clamped to the last bin.
pub fn delay_bin_index(delay: f64, width: f64, bin_count: usize) -> usize {
    ((delay / width).floor().max(0.0) as usize).min(bin_count.saturating_sub(1))
}

/// A search-count bucket. `upper == None` marks the final open-ended bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchBucket {
    pub index: usize,
    pub lower: u64,
    pub upper: Option<u64>,
    pub label: String,
}

impl SearchBucket {
    pub fn contains(&self, count: u64) -> bool {
        match self.upper {
            Some(upper) => count >= self.lower && count <= upper,
            None => count >= self.lower,
        }
    }
}

/// Search-count buckets for counts up to `max_count`.
///
/// Produces `ceil(max_count / step)` bounded buckets labeled
/// `"{lower}-{upper}"` (`1-10`, `11-20`, ...) followed by one open bucket
/// labeled `">{bound}"` for counts above the last upper bound.
pub fn search_buckets(max_count: u64, step: u64) -> Vec<SearchBucket> {
    let step = step.max(1);
    let bounded = max_count.div_ceil(step);

    let mut buckets: Vec<SearchBucket> = (0..bounded)
        .map(|i| {
            let lower = i.saturating_mul(step).saturating_add(1);
            let upper = (i + 1).saturating_mul(step);
            SearchBucket {
                index: i as usize,
                lower,
                upper: Some(upper),
                label: format!("{}-{}", lower, upper),
            }
        })
        .collect();

    let bound = bounded.saturating_mul(step);
    buckets.push(SearchBucket {
        index: bounded as usize,
        lower: bound.saturating_add(1),
        upper: None,
        label: format!(">{}", bound),
    });
    buckets
}

/// Index into [`search_buckets`] output for `count`.
///
/// Counts of zero share the first bucket; counts above the last bounded
/// bucket go to the open bucket.
pub fn search_bucket_index(count: u64, step: u64, bounded_buckets: usize) -> usize {
    let step = step.max(1);
    let index = (count.saturating_sub(1) / step) as usize;
    index.min(bounded_buckets)
}

// ============================================
// Heat-map
// ============================================

/// Key of one heat-map cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HeatmapCell {
    pub delay_bin: usize,
    pub search_bucket: String,
}

/// A cell key with its tally, for serialization and iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellCount {
    pub delay_bin: usize,
    pub search_bucket: String,
    pub clients: u64,
}

/// Sparse 2-D tally plus the axis definitions needed to draw it.
///
/// Counts are raw integers; any log or linear color transform is left to
/// the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DelaySearchHeatmap {
    pub delay_bin_width: f64,
    pub delay_bins: Vec<DelayBin>,
    pub search_buckets: Vec<SearchBucket>,
    #[serde(serialize_with = "serialize_cells")]
    pub cells: BTreeMap<HeatmapCell, u64>,
}

impl DelaySearchHeatmap {
    pub fn get(&self, delay_bin: usize, search_bucket: &str) -> u64 {
        self.cells
            .get(&HeatmapCell {
                delay_bin,
                search_bucket: search_bucket.to_string(),
            })
            .copied()
            .unwrap_or(0)
    }

    /// Number of clients tallied across all cells.
    pub fn total(&self) -> u64 {
        self.cells.values().sum()
    }

    /// Largest single cell, 0 when empty.
    pub fn max_cell(&self) -> u64 {
        self.cells.values().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell_counts(&self) -> Vec<CellCount> {
        self.cells
            .iter()
            .map(|(cell, &clients)| CellCount {
                delay_bin: cell.delay_bin,
                search_bucket: cell.search_bucket.clone(),
                clients,
            })
            .collect()
    }
}

fn serialize_cells<S: Serializer>(
    cells: &BTreeMap<HeatmapCell, u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(cells.iter().map(|(cell, &clients)| CellCount {
        delay_bin: cell.delay_bin,
        search_bucket: cell.search_bucket.clone(),
        clients,
    }))
}

impl ViewData for DelaySearchHeatmap {
    fn record_count(&self) -> usize {
        self.total() as usize
    }
}

/// A client that qualifies for the heat-map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyRow {
    pub delay_minutes: f64,
    pub search_count: u64,
}

#[derive(Default)]
struct Journey {
    searches: u64,
    first_search: Option<i64>,
    first_buy: Option<i64>,
}

/// Builds a [`DelaySearchHeatmap`] from searches and purchases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySearchBinner {
    pub binning: DelayBinning,
    pub search_step: u64,
}

impl Default for DelaySearchBinner {
    fn default() -> Self {
        Self {
            binning: DelayBinning::default(),
            search_step: DEFAULT_SEARCH_STEP,
        }
    }
}

impl DelaySearchBinner {
    pub fn new(binning: DelayBinning, search_step: u64) -> Self {
        Self {
            binning,
            search_step,
        }
    }

    /// Clients with at least one search and one purchase in the time window
    /// whose delay is non-negative and in range and whose search count is in
    /// range.
    pub fn journeys(store: &EventStore, filters: &Filters) -> Vec<JourneyRow> {
        let window = filters.time_range_millis();
        let mut journeys: HashMap<&ClientId, Journey> = HashMap::new();

        for event in store.searches() {
            let t = event.millis();
            if !in_inclusive_range(t, &window) {
                continue;
            }
            let journey = journeys.entry(&event.client_id).or_default();
            journey.searches += 1;
            journey.first_search = Some(journey.first_search.map_or(t, |f| f.min(t)));
        }
        for event in store.purchases() {
            let t = event.millis();
            if !in_inclusive_range(t, &window) {
                continue;
            }
            let journey = journeys.entry(&event.client_id).or_default();
            journey.first_buy = Some(journey.first_buy.map_or(t, |f| f.min(t)));
        }

        journeys
            .into_values()
            .filter_map(|j| {
                let delay = (j.first_buy? - j.first_search?) as f64 / 60_000.0;
                let eligible = delay >= 0.0
                    && in_inclusive_range(delay, &filters.delay_minutes)
                    && in_inclusive_range(j.searches, &filters.search_count);
                eligible.then_some(JourneyRow {
                    delay_minutes: delay,
                    search_count: j.searches,
                })
            })
            .collect()
    }

    /// Tally journey rows into heat-map cells.
    pub fn tally(&self, rows: &[JourneyRow]) -> DelaySearchHeatmap {
        if rows.is_empty() {
            return DelaySearchHeatmap::default();
        }

        let max_delay = rows.iter().map(|r| r.delay_minutes).fold(0.0, f64::max);
        let max_searches = rows.iter().map(|r| r.search_count).max().unwrap_or(0);

        let (width, delay_bins) = delay_bins(max_delay, self.binning);
        let search_buckets = search_buckets(max_searches, self.search_step);
        let bounded = search_buckets.len() - 1;

        let mut cells: BTreeMap<HeatmapCell, u64> = BTreeMap::new();
        for row in rows {
            let delay_bin = delay_bin_index(row.delay_minutes, width, delay_bins.len());
            let bucket = &search_buckets[search_bucket_index(row.search_count, self.search_step, bounded)];
            *cells
                .entry(HeatmapCell {
                    delay_bin,
                    search_bucket: bucket.label.clone(),
                })
                .or_default() += 1;
        }

        DelaySearchHeatmap {
            delay_bin_width: width,
            delay_bins,
            search_buckets,
            cells,
        }
    }
}

impl Aggregator for DelaySearchBinner {
    type Output = DelaySearchHeatmap;

    fn name(&self) -> &'static str {
        "delay_search_heatmap"
    }

    fn aggregate(&self, store: &EventStore, filters: &Filters) -> DelaySearchHeatmap {
        let rows = Self::journeys(store, filters);
        self.tally(&rows)
    }
}
