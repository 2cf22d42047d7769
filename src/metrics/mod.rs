/// Prometheus metrics for the search core.
///
/// Metrics are process-global and usable without registration; `init_metrics`
/// adds them to [`PROMETHEUS_REGISTRY`] so `gather_metrics` can export them.
///
/// # Example
/// ```no_run
/// use incident_kb_search::metrics::SEARCH_QUERIES_TOTAL;
///
/// SEARCH_QUERIES_TOTAL.with_label_values(&["index"]).inc();
/// ```
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};

const NAMESPACE: &str = "kb_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Total number of search calls
    ///
    /// Labels: outcome (index, cache, empty, error)
    pub static ref SEARCH_QUERIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_queries_total", "Total number of search calls")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create SEARCH_QUERIES_TOTAL metric");

    /// Search latency in seconds
    ///
    /// Labels: source (index, cache)
    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_duration_seconds",
            "Search latency in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["source"]
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    /// Index access failures surfaced to callers
    pub static ref INDEX_ERRORS_TOTAL: Counter = Counter::with_opts(
        Opts::new("index_errors_total", "Index access failures")
            .namespace(NAMESPACE)
    ).expect("Failed to create INDEX_ERRORS_TOTAL metric");

    /// Non-fatal query parse warnings
    ///
    /// Labels: kind
    pub static ref PARSE_WARNINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("parse_warnings_total", "Query parse warnings")
            .namespace(NAMESPACE),
        &["kind"]
    ).expect("Failed to create PARSE_WARNINGS_TOTAL metric");

    /// Fuzzy vocabulary lookups
    pub static ref FUZZY_LOOKUPS_TOTAL: Counter = Counter::with_opts(
        Opts::new("fuzzy_lookups_total", "Fuzzy vocabulary lookups")
            .namespace(NAMESPACE)
    ).expect("Failed to create FUZZY_LOOKUPS_TOTAL metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache operations
    ///
    /// Labels: tier (l1, l2, cold), outcome (hit, miss, set, evicted, promoted, demoted, expired)
    pub static ref CACHE_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_operations_total", "Cache operations by tier and outcome")
            .namespace(NAMESPACE),
        &["tier", "outcome"]
    ).expect("Failed to create CACHE_OPERATIONS_TOTAL metric");

    /// Live entries per cache tier
    ///
    /// Labels: tier
    pub static ref CACHE_ENTRIES: GaugeVec = GaugeVec::new(
        Opts::new("cache_entries", "Live entries per cache tier")
            .namespace(NAMESPACE),
        &["tier"]
    ).expect("Failed to create CACHE_ENTRIES metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build information
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register all metrics with [`PROMETHEUS_REGISTRY`]
///
/// # Errors
///
/// Returns an error if a metric is already registered (calling this twice).
pub fn init_metrics() -> Result<(), prometheus::Error> {
    // Register search metrics
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_QUERIES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INDEX_ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PARSE_WARNINGS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(FUZZY_LOOKUPS_TOTAL.clone()))?;

    // Register cache metrics
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_OPERATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_ENTRIES.clone()))?;

    // Register system metrics
    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
