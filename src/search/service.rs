//! Main search service implementation

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::cache::{query_cache_key, ColdStore, InMemoryColdStore, SearchCache};
use crate::config::Config;
use crate::fuzzy::FuzzyMatcher;
use crate::metrics::{SEARCH_DURATION_SECONDS, SEARCH_QUERIES_TOTAL};
use crate::models::Document;
use crate::query::{FilterOperator, ParsedQuery, QueryFilter, QueryParser};
use crate::ranking::{
    InMemoryIndex, KnowledgeIndex, RankOptions, RankingEngine, RankingProfile, ResultSource,
    SearchError, SearchResult,
};
use crate::search::config::SearchConfig;
use crate::search::options::{SearchOptions, SearchResponse, SearchStatistics, SortOrder};

/// Caller-facing search facade
///
/// Parses, ranks and caches; one instance is shared by all callers.
pub struct SearchService {
    config: SearchConfig,
    parser: QueryParser,
    fuzzy: Arc<FuzzyMatcher>,
    engine: RankingEngine,
    index: Arc<dyn KnowledgeIndex>,
    cache: SearchCache,
    total_queries: AtomicU64,
    total_time_micros: AtomicU64,
}

impl SearchService {
    /// Create a search service over `index`
    ///
    /// A cold cache tier backed by memory is attached when
    /// `cache.persistence_enabled` is set.
    pub fn new(config: &Config, index: Arc<dyn KnowledgeIndex>) -> Self {
        let cold: Option<Arc<dyn ColdStore>> = if config.cache.persistence_enabled {
            Some(Arc::new(InMemoryColdStore::new()))
        } else {
            None
        };
        Self::build(config, index, cold)
    }

    /// Create a search service whose cache spills to `cold`
    pub fn with_cold_store(config: &Config, index: Arc<dyn KnowledgeIndex>, cold: Arc<dyn ColdStore>) -> Self {
        Self::build(config, index, Some(cold))
    }

    /// Create a search service over an in-memory index of `documents`
    pub fn in_memory(config: &Config, documents: Vec<Document>) -> (Self, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new(documents));
        let service = Self::new(config, index.clone());
        (service, index)
    }

    fn build(config: &Config, index: Arc<dyn KnowledgeIndex>, cold: Option<Arc<dyn ColdStore>>) -> Self {
        let cache = match cold {
            Some(cold) => SearchCache::with_cold_store(config.cache.clone(), cold),
            None => SearchCache::new(config.cache.clone()),
        };
        let fuzzy = Arc::new(FuzzyMatcher::new(config.fuzzy.clone()));
        let engine = RankingEngine::new(config.ranking.clone(), fuzzy.clone()).with_cache(cache.clone());

        info!(
            cache_enabled = config.search.cache_enabled,
            fuzzy_fallback = config.ranking.fuzzy_fallback,
            "Search service initialized"
        );

        Self {
            config: config.search.clone(),
            parser: QueryParser::new(config.query.clone()),
            fuzzy,
            engine,
            index,
            cache,
            total_queries: AtomicU64::new(0),
            total_time_micros: AtomicU64::new(0),
        }
    }

    /// Start the cache expiry sweep; needs a running Tokio runtime
    pub fn start_background_tasks(&self) {
        if self.config.background_sweep {
            self.cache.start_sweeper();
        }
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    pub fn index(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.index
    }

    /// Search the knowledge base
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();

        if let Err(e) = self.check_request(query, options) {
            SEARCH_QUERIES_TOTAL.with_label_values(&["error"]).inc();
            return Err(e);
        }

        let query = query.trim();
        if query.is_empty() {
            SEARCH_QUERIES_TOTAL.with_label_values(&["empty"]).inc();
            return Ok(SearchResponse {
                results: Vec::new(),
                total_hits: 0,
                query: String::new(),
                profile: options.profile.unwrap_or_default(),
                processing_time_ms: 0,
                from_cache: false,
                offset: options.offset,
                limit: options.limit,
                warnings: Vec::new(),
            });
        }

        let cache_key = self.cache_key(query, options);
        if let Some(key) = &cache_key {
            if let Some(mut cached) = self.cache.get::<SearchResponse>(key).await {
                cached.from_cache = true;
                cached.processing_time_ms = started.elapsed().as_millis() as u64;
                for result in &mut cached.results {
                    result.metadata.source = ResultSource::Cache;
                }
                self.record(started, "cache");
                debug!(query = %query, hits = cached.total_hits, "Served from cache");
                return Ok(cached);
            }
        }

        let parsed = self.prepare_query(query, options);
        let profile = options
            .profile
            .unwrap_or_else(|| RankingProfile::select(&parsed));
        let rank_options = RankOptions {
            profile: Some(profile),
            weights: None,
            include_highlights: options.include_highlights,
            include_explanation: options.include_explanation,
        };

        let mut results = match self.engine.search(&parsed, self.index.as_ref(), &rank_options).await {
            Ok(results) => results,
            Err(e) => {
                SEARCH_QUERIES_TOTAL.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };
        sort_results(&mut results, options.sort);

        let total_hits = results.len();
        let page: Vec<SearchResult> = results
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect();

        let response = SearchResponse {
            results: page,
            total_hits,
            query: query.to_string(),
            profile,
            processing_time_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
            offset: options.offset,
            limit: options.limit,
            warnings: parsed.warnings,
        };

        if let Some(key) = &cache_key {
            if let Err(e) = self.cache.set(key, &response, Some(self.config.cache_ttl())).await {
                warn!(key = %key, error = %e, "Failed to cache search response");
            }
        }

        self.record(started, "index");
        debug!(
            query = %query,
            profile = %profile,
            total_hits,
            returned = response.results.len(),
            "Search completed"
        );
        Ok(response)
    }

    fn check_request(&self, query: &str, options: &SearchOptions) -> Result<(), SearchError> {
        options.validate()?;

        let max_length = self.parser.config().max_length;
        if query.trim().chars().count() > max_length {
            return Err(SearchError::InvalidOptions(format!(
                "query exceeds {max_length} characters"
            )));
        }
        Ok(())
    }

    fn cache_key(&self, query: &str, options: &SearchOptions) -> Option<String> {
        if !self.config.cache_enabled || !options.use_cache {
            return None;
        }
        match query_cache_key(query, &options.cache_key_options()) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Could not build cache key, bypassing cache");
                None
            }
        }
    }

    /// Parse and fold caller options into the query
    fn prepare_query(&self, query: &str, options: &SearchOptions) -> ParsedQuery {
        let mut parsed = self.parser.parse(query, None);

        if let Some(category) = &options.category {
            parsed
                .filters
                .push(QueryFilter::new("category", FilterOperator::Equals, category.trim()));
        }
        for tag in &options.tags {
            parsed
                .filters
                .push(QueryFilter::new("tags", FilterOperator::Equals, tag.trim()));
        }

        if options.fuzzy {
            for term in parsed.terms.iter_mut() {
                if term.is_positive() && !term.is_phrase() && term.wildcard.is_none() {
                    term.fuzzy = true;
                }
            }
        }
        parsed
    }

    fn record(&self, started: Instant, source: &str) {
        let elapsed = started.elapsed();
        SEARCH_QUERIES_TOTAL.with_label_values(&[source]).inc();
        SEARCH_DURATION_SECONDS
            .with_label_values(&[source])
            .observe(elapsed.as_secs_f64());
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_time_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Completions for partially typed input
    ///
    /// Operator and field completions come first, then completions and
    /// spelling corrections of the last word from the index vocabulary.
    pub async fn suggest(&self, partial: &str) -> Vec<String> {
        let max = self.config.suggestion_limit;
        if max == 0 || partial.trim().is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut suggestions: Vec<String> = self
            .parser
            .suggest(partial, &QueryParser::known_fields())
            .into_iter()
            .filter(|s| seen.insert(s.to_lowercase()))
            .collect();

        let ends_with_space = partial.ends_with(char::is_whitespace);
        let fragment = partial.split_whitespace().last().unwrap_or("");
        if !ends_with_space && !fragment.is_empty() && !fragment.contains(':') {
            let head = &partial[..partial.len() - fragment.len()];
            let word = fragment.trim_start_matches(['+', '-', '(']);
            let prefix = &fragment[..fragment.len() - word.len()];

            match self.index.vocabulary().await {
                Ok(vocabulary) => {
                    for term in self.fuzzy.suggest(word, vocabulary.as_slice(), max) {
                        let completion = format!("{head}{prefix}{term}");
                        if seen.insert(completion.to_lowercase()) {
                            suggestions.push(completion);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Vocabulary unavailable for suggestions"),
            }
        }

        suggestions.truncate(max);
        suggestions
    }

    /// Index, cache and query counters
    pub async fn get_statistics(&self) -> SearchStatistics {
        let index_size = match self.index.collection_stats().await {
            Ok(stats) => stats.document_count,
            Err(e) => {
                warn!(error = %e, "Index statistics unavailable");
                0
            }
        };
        let vocabulary_size = match self.index.vocabulary().await {
            Ok(vocabulary) => vocabulary.len(),
            Err(e) => {
                warn!(error = %e, "Index vocabulary unavailable");
                0
            }
        };

        let cache = self.cache.get_stats().await;
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let total_micros = self.total_time_micros.load(Ordering::Relaxed);

        SearchStatistics {
            index_size,
            vocabulary_size,
            cache_size: cache.entries(),
            total_queries,
            average_query_time_ms: if total_queries == 0 {
                0.0
            } else {
                total_micros as f64 / total_queries as f64 / 1000.0
            },
            cache,
        }
    }

    /// Compact the index and drop expired cache entries
    pub async fn optimize(&self) -> Result<(), SearchError> {
        let started = Instant::now();
        self.index
            .optimize()
            .await
            .map_err(|e| SearchError::index_access("optimize", started, e))?;
        let purged = self.cache.purge_expired();
        info!(purged, elapsed_ms = started.elapsed().as_millis() as u64, "Search optimized");
        Ok(())
    }

    /// Drop every cached response and expansion
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        self.fuzzy.clear_cache();
    }

    /// Drop cached entries whose keys match a glob such as `search:vsam*`
    pub async fn invalidate(&self, pattern: &str) -> crate::Result<usize> {
        let removed = self.cache.delete_pattern(pattern).await?;
        info!(pattern = %pattern, removed, "Cache invalidated");
        Ok(removed)
    }
}

/// Reorder by the requested sort; ties keep relevance order
fn sort_results(results: &mut [SearchResult], sort: SortOrder) {
    match sort {
        SortOrder::Relevance => {}
        SortOrder::Usage => {
            results.sort_by(|a, b| b.document.usage_count.cmp(&a.document.usage_count));
        }
        SortOrder::Recent => {
            results.sort_by(|a, b| b.document.updated_at.cmp(&a.document.updated_at));
        }
        SortOrder::SuccessRate => {
            results.sort_by(|a, b| {
                let a = a.document.success_rate().unwrap_or(0.5);
                let b = b.document.success_rate().unwrap_or(0.5);
                b.total_cmp(&a)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SearchService {
        let documents = vec![
            Document::new("kb-1", "VSAM status 35", "Open fails", "Define the cluster", "VSAM")
                .with_usage(5, 1, 1),
            Document::new("kb-2", "VSAM status 37", "Out of space", "Extend the dataset", "VSAM")
                .with_usage(50, 9, 1),
        ];
        SearchService::in_memory(&Config::default(), documents).0
    }

    #[tokio::test]
    async fn test_second_search_is_cached() {
        let service = service();
        let options = SearchOptions::default();

        let first = service.search("vsam status", &options).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.total_hits, 2);

        let second = service.search("  VSAM   status ", &options).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.total_hits, 2);
        assert!(second
            .results
            .iter()
            .all(|r| r.metadata.source == ResultSource::Cache));
    }

    #[tokio::test]
    async fn test_sort_by_usage_and_pagination() {
        let service = service();
        let options = SearchOptions::default().with_sort(SortOrder::Usage).with_limit(1);

        let page = service.search("vsam", &options).await.unwrap();
        assert_eq!(page.total_hits, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].document.id, "kb-2");

        let next = service
            .search("vsam", &options.clone().with_offset(1))
            .await
            .unwrap();
        assert_eq!(next.results[0].document.id, "kb-1");
    }

    #[tokio::test]
    async fn test_invalid_limit_is_rejected() {
        let service = service();
        let err = service
            .search("vsam", &SearchOptions::default().with_limit(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn test_empty_query_is_empty_response() {
        let response = service().search("   ", &SearchOptions::default()).await.unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_hits, 0);
    }

    #[tokio::test]
    async fn test_statistics_count_queries() {
        let service = service();
        service.search("vsam", &SearchOptions::default()).await.unwrap();
        service.search("vsam", &SearchOptions::default()).await.unwrap();

        let stats = service.get_statistics().await;
        assert_eq!(stats.index_size, 2);
        assert!(stats.vocabulary_size > 5);
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.cache.hits, 1);
    }
}
