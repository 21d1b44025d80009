//! clickscope-report - clickstream dashboard from the command line
//!
//! Loads the five clickstream datasets, applies filter overrides and prints
//! the user segmentation, product revenue and delay vs. search views.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use clickscope_core::analytics::{DelaySearchHeatmap, RevenueCount};
use clickscope_core::format::{
    format_decimal, format_number, format_range, format_time_range, price_bucket_label,
};
use clickscope_core::{
    Config, Dashboard, DashboardViews, DataSource, DatasetSummary, Dimension, EventStore,
    FilterState, FilterUpdate, Filters, ValueRange,
};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[command(name = "clickscope-report")]
#[command(about = "Filtered clickstream analytics report")]
#[command(version)]
struct Args {
    /// Directory holding the five dataset JSON files
    #[arg(long, conflicts_with = "url")]
    data_dir: Option<PathBuf>,

    /// Base URL serving the five dataset JSON files
    #[arg(long)]
    url: Option<String>,

    /// First day of the time window (YYYY-MM-DD, UTC)
    #[arg(long)]
    from: Option<String>,

    /// Last day of the time window, inclusive (YYYY-MM-DD, UTC)
    #[arg(long)]
    to: Option<String>,

    /// Total events per user, as MIN..MAX (either side may be omitted)
    #[arg(long, value_name = "RANGE")]
    event_count: Option<String>,

    /// Purchases per user, as MIN..MAX
    #[arg(long, value_name = "RANGE")]
    buy_count: Option<String>,

    /// Searches per user, as MIN..MAX
    #[arg(long, value_name = "RANGE")]
    search_count: Option<String>,

    /// Price of SKUs added to cart, as MIN..MAX
    #[arg(long, value_name = "RANGE")]
    cart_value: Option<String>,

    /// Unit price of purchased SKUs, as MIN..MAX
    #[arg(long, value_name = "RANGE")]
    price: Option<String>,

    /// Minutes from first search to first purchase, as MIN..MAX
    #[arg(long, value_name = "RANGE")]
    delay: Option<String>,

    /// Keep only the N most expensive products
    #[arg(long)]
    top_n: Option<usize>,

    /// Drop products whose revenue is below this value
    #[arg(long)]
    min_revenue: Option<f64>,

    /// Show the revenue breakdown of one histogram bucket
    #[arg(long, value_name = "BUCKET")]
    drill_down: Option<usize>,

    /// Export format (md = markdown, json = JSON)
    #[arg(long)]
    export: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = clickscope_core::logging::init(&config.logging).ok();

    let source = match (&args.data_dir, &args.url) {
        (Some(dir), _) => DataSource::Directory(dir.clone()),
        (None, Some(url)) => DataSource::Http(url.clone()),
        (None, None) => config.data_source(),
    };
    tracing::info!(source = ?source, "Starting report");

    let store = EventStore::load(&source)
        .await
        .with_context(|| format!("failed to load datasets from {}", describe_source(&source)))?;
    let store = Arc::new(store);
    let summary = store.summary();

    let mut state = FilterState::initialize(&store);
    let latest: Arc<Mutex<Option<DashboardViews>>> = Arc::new(Mutex::new(None));
    let sink = latest.clone();
    Dashboard::from_config(&config).attach(&mut state, store.clone(), move |views| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(views);
        }
    });

    let updates = filter_updates(&args, state.get())?;
    if updates.is_empty() {
        state.notify();
    }
    for update in updates {
        let dimension = update.dimension();
        state
            .set(update)
            .with_context(|| format!("invalid value for --{}", flag_name(dimension)))?;
    }

    let views = latest
        .lock()
        .map_err(|_| anyhow::anyhow!("dashboard state poisoned"))?
        .take()
        .context("dashboard produced no views")?;

    let drill_down = match args.drill_down {
        Some(index) => {
            let bucket = views.histogram.bucket(index).with_context(|| {
                format!(
                    "histogram has {} buckets, no bucket {}",
                    views.histogram.buckets.len(),
                    index
                )
            })?;
            Some(DrillDown {
                bucket: index,
                label: price_bucket_label(bucket.lower, bucket.upper),
                revenues: bucket.drill_down(),
            })
        }
        None => None,
    };

    match args.export.as_deref() {
        Some("json") => print_json(&summary, &views, drill_down.as_ref())?,
        Some("md") => print_markdown(&summary, &views, drill_down.as_ref()),
        Some(other) => anyhow::bail!("Unknown export format: {}. Use 'md' or 'json'", other),
        None => print_terminal(&summary, &views, drill_down.as_ref()),
    }

    Ok(())
}

// ============================================
// Flag parsing
// ============================================

/// Split `"a..b"` into its two optional endpoints.
fn parse_bounds<T: FromStr>(raw: &str) -> Result<(Option<T>, Option<T>)>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (lo, hi) = raw
        .split_once("..")
        .with_context(|| format!("expected MIN..MAX, got {:?}", raw))?;
    let parse = |s: &str| -> Result<Option<T>> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse::<T>()
                .map(Some)
                .with_context(|| format!("invalid number {:?}", s))
        }
    };
    Ok((parse(lo)?, parse(hi)?))
}

/// Parse a range flag, filling omitted endpoints from `current`.
fn parse_range<T>(raw: &str, current: ValueRange<T>) -> Result<ValueRange<T>>
where
    T: FromStr + PartialOrd + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (lo, hi) = parse_bounds::<T>(raw)?;
    Ok(ValueRange::new(
        lo.unwrap_or(current.min),
        hi.unwrap_or(current.max),
    ))
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", raw))
}

fn day_start(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn day_end(day: NaiveDate) -> i64 {
    day.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Translate flags into filter updates, in dashboard widget order.
fn filter_updates(args: &Args, current: &Filters) -> Result<Vec<FilterUpdate>> {
    let mut updates = Vec::new();

    if args.from.is_some() || args.to.is_some() {
        let min = match &args.from {
            Some(raw) => day_start(parse_day(raw).context("--from")?),
            None => current.time_range.min,
        };
        let max = match &args.to {
            Some(raw) => day_end(parse_day(raw).context("--to")?),
            None => current.time_range.max,
        };
        updates.push(FilterUpdate::TimeRange(ValueRange::new(min, max)));
    }
    if let Some(raw) = &args.event_count {
        let range = parse_range(raw, current.event_count).context("--event-count")?;
        updates.push(FilterUpdate::EventCount(range));
    }
    if let Some(raw) = &args.buy_count {
        let range = parse_range(raw, current.buy_count).context("--buy-count")?;
        updates.push(FilterUpdate::BuyCount(range));
    }
    if let Some(raw) = &args.price {
        let range = parse_range(raw, current.price_bucket).context("--price")?;
        updates.push(FilterUpdate::PriceBucket(range));
    }
    if let Some(raw) = &args.cart_value {
        let range = parse_range(raw, current.cart_value_bucket).context("--cart-value")?;
        updates.push(FilterUpdate::CartValueBucket(range));
    }
    if let Some(raw) = &args.delay {
        let range = parse_range(raw, current.delay_minutes).context("--delay")?;
        updates.push(FilterUpdate::DelayMinutes(range));
    }
    if let Some(raw) = &args.search_count {
        let range = parse_range(raw, current.search_count).context("--search-count")?;
        updates.push(FilterUpdate::SearchCount(range));
    }
    if let Some(n) = args.top_n {
        updates.push(FilterUpdate::TopNProducts(n));
    }
    if let Some(v) = args.min_revenue {
        updates.push(FilterUpdate::MinRevenue(v));
    }

    Ok(updates)
}

fn flag_name(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::TimeRange => "from/--to",
        Dimension::EventCount => "event-count",
        Dimension::BuyCount => "buy-count",
        Dimension::SearchCount => "search-count",
        Dimension::CartValueBucket => "cart-value",
        Dimension::PriceBucket => "price",
        Dimension::DelayMinutes => "delay",
        Dimension::TopNProducts => "top-n",
        Dimension::MinRevenue => "min-revenue",
    }
}

fn describe_source(source: &DataSource) -> String {
    match source {
        DataSource::Directory(dir) => dir.display().to_string(),
        DataSource::Http(url) => url.clone(),
    }
}

/// Display value of one filter dimension.
fn filter_value(filters: &Filters, dimension: Dimension) -> String {
    match dimension {
        Dimension::TimeRange => format_time_range(&filters.time_range),
        Dimension::EventCount => format_range(&filters.event_count, |v| v.to_string()),
        Dimension::BuyCount => format_range(&filters.buy_count, |v| v.to_string()),
        Dimension::SearchCount => format_range(&filters.search_count, |v| v.to_string()),
        Dimension::CartValueBucket => format_range(&filters.cart_value_bucket, format_decimal),
        Dimension::PriceBucket => format_range(&filters.price_bucket, format_decimal),
        Dimension::DelayMinutes => format_range(&filters.delay_minutes, format_decimal),
        Dimension::TopNProducts => filters.top_n_products.to_string(),
        Dimension::MinRevenue => format_decimal(filters.min_revenue),
    }
}

// ============================================
// Output
// ============================================

#[derive(Debug, Serialize)]
struct DrillDown {
    bucket: usize,
    label: String,
    revenues: Vec<RevenueCount>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a DatasetSummary,
    #[serde(flatten)]
    views: &'a DashboardViews,
    drill_down: Option<&'a DrillDown>,
}

const MAX_LISTED_USERS: usize = 10;
const BAR_WIDTH: f64 = 30.0;

fn print_terminal(summary: &DatasetSummary, views: &DashboardViews, drill_down: Option<&DrillDown>) {
    println!();
    println!("╭{}╮", "─".repeat(60));
    println!("│{:^60}│", "CLICKSTREAM REPORT");
    println!("╰{}╯", "─".repeat(60));
    println!();

    println!("DATASET");
    println!(
        "   Events:   {:<12} Clients: {}",
        summary.total_events(),
        summary.clients
    );
    println!(
        "   SKUs:     {:<12} Categories: {}",
        summary.skus, summary.categories
    );
    println!(
        "   Cart adds: {}, removals: {}, purchases: {}, searches: {}",
        summary.add_to_cart, summary.remove_from_cart, summary.product_buy, summary.search_query
    );
    println!();

    println!("FILTERS");
    for dimension in Dimension::ALL {
        println!(
            "   {:<18} {}",
            dimension.as_str(),
            filter_value(&views.filters, dimension)
        );
    }
    println!();

    if views.is_empty() {
        println!("  No data for the current filters.");
        println!();
        return;
    }

    // User segmentation
    println!("USER SEGMENTATION");
    if views.users.is_empty() {
        println!("   No data");
    } else {
        let (max_buys, max_searches) = views.users.axis_max();
        println!(
            "   Users: {:<10} Max buys: {:<6} Max searches: {}",
            views.users.len(),
            max_buys,
            max_searches
        );
        let mut points = views.users.scatter_points();
        points.sort_by(|a, b| b.buys.cmp(&a.buys).then(b.searches.cmp(&a.searches)));
        for point in points.iter().take(MAX_LISTED_USERS) {
            println!(
                "   {:<16} buys {:>4}  searches {:>4}",
                point.client_id, point.buys, point.searches
            );
        }
        if points.len() > MAX_LISTED_USERS {
            println!("   ... and {} more", points.len() - MAX_LISTED_USERS);
        }
    }
    println!();

    // Product revenue
    println!("TOP PRODUCTS BY PRICE");
    if views.products.is_empty() {
        println!("   No data");
    } else {
        println!("   {:<12} {:>10} {:>6} {:>12}", "SKU", "Price", "Sold", "Revenue");
        for p in &views.products.products {
            println!(
                "   {:<12} {:>10} {:>6} {:>12}",
                p.sku,
                format_decimal(p.price),
                p.count,
                format_decimal(p.revenue)
            );
        }
        println!(
            "   Total revenue: {}",
            format_decimal(views.products.total_revenue())
        );
    }
    if views.products.dropped_unknown_sku > 0 {
        println!(
            "   ({} purchases skipped: SKU not in catalog)",
            views.products.dropped_unknown_sku
        );
    }
    println!();

    println!("REVENUE BY PRICE");
    let max_revenue = views.histogram.max_revenue();
    if views.histogram.is_empty() || max_revenue <= 0.0 {
        println!("   No data");
    } else {
        for bucket in views.histogram.renderable() {
            if bucket.members.is_empty() {
                continue;
            }
            let bar = ((bucket.revenue() / max_revenue) * BAR_WIDTH).round() as usize;
            println!(
                "   #{:<3} {:>14} {:<30} {}",
                bucket.index,
                price_bucket_label(bucket.lower, bucket.upper),
                "█".repeat(bar.max(1)),
                format_decimal(bucket.revenue())
            );
        }
    }
    println!();

    if let Some(drill) = drill_down {
        println!("BUCKET #{} ({}) REVENUE BREAKDOWN", drill.bucket, drill.label);
        if drill.revenues.is_empty() {
            println!("   No products in this bucket");
        }
        for entry in &drill.revenues {
            println!(
                "   {:>12}  x{}",
                format_decimal(entry.revenue),
                entry.count
            );
        }
        println!();
    }

    println!("SEARCH TO PURCHASE DELAY (clients)");
    print_heatmap_grid(&views.heatmap, "   ");
    println!();
}

fn print_heatmap_grid(heatmap: &DelaySearchHeatmap, indent: &str) {
    if heatmap.is_empty() {
        println!("{}No data", indent);
        return;
    }
    print!("{}{:<14}", indent, "delay (min)");
    for bucket in &heatmap.search_buckets {
        print!(" {:>8}", bucket.label);
    }
    println!();
    for bin in &heatmap.delay_bins {
        print!("{}{:<14}", indent, bin.label());
        for bucket in &heatmap.search_buckets {
            let count = heatmap.get(bin.index, &bucket.label);
            if count == 0 {
                print!(" {:>8}", ".");
            } else {
                print!(" {:>8}", count);
            }
        }
        println!();
    }
    println!(
        "{}Bin width: {} min, clients: {}",
        indent,
        format_number(heatmap.delay_bin_width),
        heatmap.total()
    );
}

fn print_markdown(summary: &DatasetSummary, views: &DashboardViews, drill_down: Option<&DrillDown>) {
    println!("# Clickstream Report");
    println!();

    println!("## Dataset");
    println!();
    println!("- **Events:** {}", summary.total_events());
    println!("- **Clients:** {}", summary.clients);
    println!("- **SKUs:** {}", summary.skus);
    println!("- **Categories:** {}", summary.categories);
    println!();

    println!("## Filters");
    println!();
    println!("| Dimension | Value |");
    println!("|-----------|-------|");
    for dimension in Dimension::ALL {
        println!(
            "| {} | {} |",
            dimension.as_str(),
            filter_value(&views.filters, dimension)
        );
    }
    println!();

    println!("## User Segmentation");
    println!();
    if views.users.is_empty() {
        println!("*No data*");
    } else {
        println!("{} users match the current filters.", views.users.len());
        println!();
        println!("| Client | Buys | Searches |");
        println!("|--------|------|----------|");
        for point in views.users.scatter_points() {
            println!("| {} | {} | {} |", point.client_id, point.buys, point.searches);
        }
    }
    println!();

    println!("## Top Products by Price");
    println!();
    if views.products.is_empty() {
        println!("*No data*");
    } else {
        println!("| SKU | Price | Sold | Revenue |");
        println!("|-----|-------|------|---------|");
        for p in &views.products.products {
            println!(
                "| {} | {} | {} | {} |",
                p.sku,
                format_decimal(p.price),
                p.count,
                format_decimal(p.revenue)
            );
        }
    }
    println!();

    println!("## Revenue by Price");
    println!();
    if views.histogram.is_empty() {
        println!("*No data*");
    } else {
        println!("| Bucket | Price | Products | Revenue |");
        println!("|--------|-------|----------|---------|");
        for bucket in views.histogram.renderable() {
            if bucket.members.is_empty() {
                continue;
            }
            println!(
                "| {} | {} | {} | {} |",
                bucket.index,
                price_bucket_label(bucket.lower, bucket.upper),
                bucket.members.len(),
                format_decimal(bucket.revenue())
            );
        }
    }
    println!();

    if let Some(drill) = drill_down {
        println!("### Bucket {} ({})", drill.bucket, drill.label);
        println!();
        println!("| Revenue | Products |");
        println!("|---------|----------|");
        for entry in &drill.revenues {
            println!("| {} | {} |", format_decimal(entry.revenue), entry.count);
        }
        println!();
    }

    println!("## Search to Purchase Delay");
    println!();
    if views.heatmap.is_empty() {
        println!("*No data*");
    } else {
        println!("| Delay (min) | Searches | Clients |");
        println!("|-------------|----------|---------|");
        for cell in views.heatmap.cell_counts() {
            let delay = views
                .heatmap
                .delay_bins
                .get(cell.delay_bin)
                .map(|bin| bin.label())
                .unwrap_or_default();
            println!("| {} | {} | {} |", delay, cell.search_bucket, cell.clients);
        }
    }
    println!();

    println!("---");
    println!("*Generated by clickscope-report*");
}

fn print_json(
    summary: &DatasetSummary,
    views: &DashboardViews,
    drill_down: Option<&DrillDown>,
) -> Result<()> {
    let report = JsonReport {
        summary,
        views,
        drill_down,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
