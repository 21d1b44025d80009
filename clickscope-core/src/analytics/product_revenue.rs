//! Per-SKU sales and revenue for the price distribution view.
//!
//! Purchases are joined to catalog prices by SKU. A purchase whose SKU has no
//! catalog entry is dropped (and counted), never reported as an error.
//!
//! The surviving SKUs are ranked by unit **price** (descending) before the
//! top-N cut. The revenue floor is a separate filter applied first.

use super::engine::{Aggregator, ViewData};
use crate::filter::Filters;
use crate::range::{in_inclusive_range, lookup_or_drop, ValueRange};
use crate::store::EventStore;
use crate::types::Sku;
use serde::Serialize;
use std::collections::HashMap;

/// Default number of equal-width price buckets in the revenue histogram.
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 20;

/// Sales of one SKU inside the active filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub sku: Sku,
    pub count: u64,
    pub price: f64,
    /// `count * price`
    pub revenue: f64,
}

/// Filtered, price-ranked product sales.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRevenue {
    /// Sorted by price descending, at most `top_n_products` entries
    pub products: Vec<ProductSales>,
    /// Purchases inside the time window whose SKU had no catalog price
    pub dropped_unknown_sku: usize,
}

impl ProductRevenue {
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn get(&self, sku: &Sku) -> Option<&ProductSales> {
        self.products.iter().find(|p| &p.sku == sku)
    }

    pub fn total_revenue(&self) -> f64 {
        self.products.iter().map(|p| p.revenue).sum()
    }

    /// Equal-width revenue histogram over `domain`.
    pub fn histogram(&self, domain: ValueRange<f64>, bucket_count: usize) -> RevenueHistogram {
        RevenueHistogram::build(&self.products, domain, bucket_count)
    }
}

impl ViewData for ProductRevenue {
    fn record_count(&self) -> usize {
        self.products.len()
    }
}

/// Builds a [`ProductRevenue`] from purchases and the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductRevenueAggregator;

impl ProductRevenueAggregator {
    pub fn new() -> Self {
        Self
    }
}

impl Aggregator for ProductRevenueAggregator {
    type Output = ProductRevenue;

    fn name(&self) -> &'static str {
        "product_revenue"
    }

    fn aggregate(&self, store: &EventStore, filters: &Filters) -> ProductRevenue {
        let prices = store.price_lookup();
        let window = filters.time_range_millis();
        let mut sales: HashMap<&Sku, ProductSales> = HashMap::new();
        let mut dropped_unknown_sku = 0;

        for event in store.purchases() {
            if !in_inclusive_range(event.millis(), &window) {
                continue;
            }
            let Some(sku) = event.sku.as_ref() else {
                dropped_unknown_sku += 1;
                continue;
            };
            let Some(&price) = lookup_or_drop(&prices, sku) else {
                dropped_unknown_sku += 1;
                continue;
            };
            if !in_inclusive_range(price, &filters.price_bucket) {
                continue;
            }
            sales
                .entry(sku)
                .or_insert_with(|| ProductSales {
                    sku: sku.clone(),
                    count: 0,
                    price,
                    revenue: 0.0,
                })
                .count += 1;
        }

        if dropped_unknown_sku > 0 {
            tracing::debug!(
                dropped = dropped_unknown_sku,
                "Dropped purchases with no catalog price"
            );
        }

        let mut products: Vec<ProductSales> = sales
            .into_values()
            .map(|mut p| {
                p.revenue = p.count as f64 * p.price;
                p
            })
            .filter(|p| p.revenue >= filters.min_revenue)
            .collect();

        products.sort_by(|a, b| b.price.total_cmp(&a.price).then_with(|| a.sku.cmp(&b.sku)));
        products.truncate(filters.top_n_products);

        ProductRevenue {
            products,
            dropped_unknown_sku,
        }
    }
}

// ============================================
// Histogram
// ============================================

/// One price bucket `[lower, upper)`; the last bucket also includes `upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub members: Vec<ProductSales>,
}

impl HistogramBucket {
    /// Bar height: sum of member revenue.
    pub fn revenue(&self) -> f64 {
        self.members.iter().map(|p| p.revenue).sum()
    }

    /// Buckets with a degenerate or negative span are kept in the data but
    /// not drawn.
    pub fn is_renderable(&self) -> bool {
        self.lower >= 0.0 && self.upper > self.lower
    }

    /// Members grouped by exact revenue value, ascending by revenue.
    pub fn drill_down(&self) -> Vec<RevenueCount> {
        revenue_distribution(&self.members)
    }
}

/// How many products share one exact revenue value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RevenueCount {
    pub revenue: f64,
    pub count: usize,
}

/// Group products by exact revenue and count each group.
pub fn revenue_distribution(products: &[ProductSales]) -> Vec<RevenueCount> {
    let mut revenues: Vec<f64> = products.iter().map(|p| p.revenue).collect();
    revenues.sort_by(f64::total_cmp);

    let mut groups: Vec<RevenueCount> = Vec::new();
    for revenue in revenues {
        match groups.last_mut() {
            Some(last) if last.revenue == revenue => last.count += 1,
            _ => groups.push(RevenueCount { revenue, count: 1 }),
        }
    }
    groups
}

/// Revenue summed per equal-width price bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueHistogram {
    pub domain: ValueRange<f64>,
    pub buckets: Vec<HistogramBucket>,
}

impl RevenueHistogram {
    /// Partition `products` into `bucket_count` equal-width buckets spanning
    /// `domain`.
    ///
    /// An unbounded domain is narrowed to the observed price range. Products
    /// priced outside the domain are left out.
    pub fn build(products: &[ProductSales], domain: ValueRange<f64>, bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let domain = if domain.min.is_finite() && domain.max.is_finite() {
            domain
        } else {
            observed_domain(products)
        };
        let width = (domain.max - domain.min) / bucket_count as f64;

        let mut buckets: Vec<HistogramBucket> = (0..bucket_count)
            .map(|index| {
                let lower = domain.min + width * index as f64;
                let upper = if index + 1 == bucket_count {
                    domain.max
                } else {
                    domain.min + width * (index + 1) as f64
                };
                HistogramBucket {
                    index,
                    lower,
                    upper,
                    members: Vec::new(),
                }
            })
            .collect();

        for product in products {
            if !in_inclusive_range(product.price, &domain) {
                continue;
            }
            let index = if width > 0.0 {
                (((product.price - domain.min) / width).floor() as usize).min(bucket_count - 1)
            } else {
                0
            };
            buckets[index].members.push(product.clone());
        }

        Self { domain, buckets }
    }

    /// Buckets that should be drawn.
    pub fn renderable(&self) -> impl Iterator<Item = &HistogramBucket> {
        self.buckets.iter().filter(|b| b.is_renderable())
    }

    /// Tallest bar, for the y axis.
    pub fn max_revenue(&self) -> f64 {
        self.buckets
            .iter()
            .map(HistogramBucket::revenue)
            .fold(0.0, f64::max)
    }

    pub fn bucket(&self, index: usize) -> Option<&HistogramBucket> {
        self.buckets.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.members.is_empty())
    }
}

fn observed_domain(products: &[ProductSales]) -> ValueRange<f64> {
    let mut prices = products.iter().map(|p| p.price);
    match prices.next() {
        Some(first) => {
            let (lo, hi) = prices.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
            ValueRange::new(lo, hi)
        }
        None => ValueRange::new(0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Event, ProductProperties};
    use chrono::{TimeZone, Utc};

    fn at(minute: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap()
    }

    fn product(sku: &str, price: f64) -> ProductProperties {
        ProductProperties {
            sku: Sku::from(sku),
            category: Category::from("c"),
            price,
        }
    }

    fn buy(sku: &str, minute: i64) -> Event {
        Event::new("u", at(minute)).with_sku(sku)
    }

    fn store() -> EventStore {
        EventStore::from_parts(
            vec![],
            vec![
                buy("cheap", 0),
                buy("cheap", 1),
                buy("cheap", 2),
                buy("mid", 3),
                buy("mid", 4),
                buy("pricey", 5),
                buy("ghost", 6),
            ],
            vec![],
            vec![],
            vec![
                product("cheap", 2.0),
                product("mid", 10.0),
                product("pricey", 50.0),
            ],
        )
    }

    fn sales(sku: &str, count: u64, price: f64) -> ProductSales {
        ProductSales {
            sku: Sku::from(sku),
            count,
            price,
            revenue: count as f64 * price,
        }
    }

    #[test]
    fn test_revenue_and_price_order() {
        let result = ProductRevenueAggregator.aggregate(&store(), &Filters::unbounded());

        let skus: Vec<_> = result.products.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, vec!["pricey", "mid", "cheap"]);
        assert_eq!(result.get(&Sku::from("cheap")).unwrap().revenue, 6.0);
        assert_eq!(result.get(&Sku::from("mid")).unwrap().revenue, 20.0);
        assert_eq!(result.dropped_unknown_sku, 1);
        assert_eq!(result.total_revenue(), 76.0);
    }

    #[test]
    fn test_top_n_is_by_price_not_revenue() {
        let mut filters = Filters::unbounded();
        filters.top_n_products = 1;
        let result = ProductRevenueAggregator.aggregate(&store(), &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result.products[0].sku.as_str(), "pricey");
    }

    #[test]
    fn test_revenue_floor_and_price_range() {
        let mut filters = Filters::unbounded();
        filters.min_revenue = 20.0;
        filters.price_bucket = ValueRange::new(0.0, 10.0);
        let result = ProductRevenueAggregator.aggregate(&store(), &filters);
        let skus: Vec<_> = result.products.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, vec!["mid"]);
    }

    #[test]
    fn test_time_window_applies_to_purchases() {
        let mut filters = Filters::unbounded();
        filters.time_range = ValueRange::new(at(0).timestamp(), at(1).timestamp());
        let result = ProductRevenueAggregator.aggregate(&store(), &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result.products[0].count, 2);
    }

    #[test]
    fn test_histogram_buckets() {
        let products = vec![sales("a", 1, 0.0), sales("b", 2, 5.0), sales("c", 1, 100.0)];
        let histogram = RevenueHistogram::build(&products, ValueRange::new(0.0, 100.0), 20);

        assert_eq!(histogram.buckets.len(), 20);
        assert_eq!(histogram.buckets[0].members.len(), 1);
        assert_eq!(histogram.buckets[1].lower, 5.0);
        assert_eq!(histogram.buckets[1].revenue(), 10.0);
        // the upper edge lands in the last bucket
        assert_eq!(histogram.buckets[19].members[0].sku.as_str(), "c");
        assert_eq!(histogram.buckets[19].upper, 100.0);
        assert_eq!(histogram.max_revenue(), 100.0);
        assert_eq!(histogram.renderable().count(), 20);
    }

    #[test]
    fn test_degenerate_histogram_keeps_data() {
        let products = vec![sales("a", 3, 7.0)];
        let histogram = RevenueHistogram::build(&products, ValueRange::new(7.0, 7.0), 4);

        assert_eq!(histogram.buckets[0].members.len(), 1);
        assert_eq!(histogram.renderable().count(), 0);
        assert!(!histogram.is_empty());
    }

    #[test]
    fn test_unbounded_domain_uses_observed_prices() {
        let products = vec![sales("a", 1, 10.0), sales("b", 1, 20.0)];
        let histogram = RevenueHistogram::build(&products, Filters::unbounded().price_bucket, 2);
        assert_eq!(histogram.domain, ValueRange::new(10.0, 20.0));
        assert_eq!(histogram.buckets[1].members[0].sku.as_str(), "b");
    }

    #[test]
    fn test_drill_down_groups_by_revenue() {
        let products = vec![
            sales("a", 2, 5.0),
            sales("b", 1, 10.0),
            sales("c", 1, 3.0),
        ];
        let histogram = RevenueHistogram::build(&products, ValueRange::new(0.0, 10.0), 1);
        let distribution = histogram.buckets[0].drill_down();

        assert_eq!(
            distribution,
            vec![
                RevenueCount {
                    revenue: 3.0,
                    count: 1
                },
                RevenueCount {
                    revenue: 10.0,
                    count: 2
                },
            ]
        );
    }
}
