//! End-to-end tests for the search service

mod common;

use common::{knowledge_base, test_service};
use incident_kb_search::config::Config;
use incident_kb_search::models::Document;
use incident_kb_search::ranking::{MatchType, RankingProfile, ResultSource, SearchError};
use incident_kb_search::search::*;
use std::sync::Arc;

#[tokio::test]
async fn test_identifier_query_returns_single_entry() {
    let (service, _) = test_service();
    let response = service
        .search("\"S0C7\" AND VSAM", &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.total_hits, 1);
    assert_eq!(response.results[0].document.title, "VSAM S0C7 Error Resolution");
    assert!(matches!(
        response.results[0].match_type,
        MatchType::Boolean | MatchType::Exact
    ));
    assert_eq!(response.profile, RankingProfile::Precision);
    assert!(!response.from_cache);
}

#[tokio::test]
async fn test_sql_code_query_uses_precision() {
    let (service, _) = test_service();
    let response = service
        .search("deadlock -911", &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.profile, RankingProfile::Precision);
    assert_eq!(response.total_hits, 1);
    assert_eq!(response.results[0].document.id, "kb-2");
}

#[tokio::test]
async fn test_cached_response_is_marked() {
    let (service, _) = test_service();
    let options = SearchOptions::default();

    let first = service.search("abend", &options).await.unwrap();
    let second = service.search("ABEND", &options).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.total_hits, second.total_hits);
    assert!(first
        .results
        .iter()
        .all(|r| r.metadata.source == ResultSource::Index));
    assert!(second
        .results
        .iter()
        .all(|r| r.metadata.source == ResultSource::Cache));
}

#[tokio::test]
async fn test_bypassing_cache() {
    let (service, _) = test_service();
    let options = SearchOptions {
        use_cache: false,
        ..SearchOptions::default()
    };

    service.search("abend", &options).await.unwrap();
    let again = service.search("abend", &options).await.unwrap();
    assert!(!again.from_cache);
    assert_eq!(service.get_statistics().await.cache_size, 0);
}

#[tokio::test]
async fn test_tracking_fields_share_cache_entry() {
    let (service, _) = test_service();
    let first = SearchOptions {
        session_id: Some("s-1".into()),
        ..SearchOptions::default()
    };
    let second = SearchOptions {
        user_id: Some("u-7".into()),
        ..SearchOptions::default()
    };

    service.search("deadlock", &first).await.unwrap();
    assert!(service.search("deadlock", &second).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_category_and_tag_filters() {
    let (service, _) = test_service();

    let response = service
        .search("abend", &SearchOptions::default().with_category("jcl"))
        .await
        .unwrap();
    assert_eq!(response.total_hits, 1);
    assert_eq!(response.results[0].document.id, "kb-3");

    let response = service
        .search("abend", &SearchOptions::default().with_tags(vec!["S0C7"]))
        .await
        .unwrap();
    assert_eq!(response.total_hits, 1);
    assert_eq!(response.results[0].document.id, "kb-1");
}

#[tokio::test]
async fn test_fuzzy_option_marks_terms_fuzzy() {
    let (service, _) = test_service();
    let response = service
        .search("databse", &SearchOptions::default().with_fuzzy(true))
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.document.id.as_str()).collect();
    assert!(ids.contains(&"kb-4"));
    assert!(ids.contains(&"kb-6"));
    assert!(response
        .results
        .iter()
        .all(|r| r.match_type == MatchType::Fuzzy));
}

#[tokio::test]
async fn test_sort_orders() {
    let (service, _) = test_service();

    let by_usage = service
        .search("abend", &SearchOptions::default().with_sort(SortOrder::Usage))
        .await
        .unwrap();
    let usage: Vec<u64> = by_usage.results.iter().map(|r| r.document.usage_count).collect();
    assert!(usage.windows(2).all(|w| w[0] >= w[1]));

    let by_recent = service
        .search("abend", &SearchOptions::default().with_sort(SortOrder::Recent))
        .await
        .unwrap();
    assert!(by_recent
        .results
        .windows(2)
        .all(|w| w[0].document.updated_at >= w[1].document.updated_at));

    let by_success = service
        .search("abend", &SearchOptions::default().with_sort(SortOrder::SuccessRate))
        .await
        .unwrap();
    let rates: Vec<f64> = by_success
        .results
        .iter()
        .map(|r| r.document.success_rate().unwrap_or(0.5))
        .collect();
    assert!(rates.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_pagination_reports_total_hits() {
    let (service, _) = test_service();
    let all = service
        .search("abend", &SearchOptions::default())
        .await
        .unwrap();
    assert!(all.total_hits >= 3);

    let page = service
        .search("abend", &SearchOptions::default().with_limit(1).with_offset(1))
        .await
        .unwrap();
    assert_eq!(page.total_hits, all.total_hits);
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].document.id, all.results[1].document.id);

    let past_end = service
        .search("abend", &SearchOptions::default().with_offset(100))
        .await
        .unwrap();
    assert!(past_end.results.is_empty());
    assert_eq!(past_end.total_hits, all.total_hits);
}

#[tokio::test]
async fn test_limit_out_of_range() {
    let (service, _) = test_service();
    for limit in [0, MAX_LIMIT + 1] {
        let err = service
            .search("abend", &SearchOptions::default().with_limit(limit))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidOptions(_)));
    }
}

#[tokio::test]
async fn test_over_long_query_rejected() {
    let (service, _) = test_service();
    let err = service
        .search(&"vsam ".repeat(300), &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidOptions(_)));
}

#[tokio::test]
async fn test_no_match_is_success() {
    let (service, _) = test_service();
    let response = service
        .search("kubernetes", &SearchOptions::default())
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total_hits, 0);
}

#[tokio::test]
async fn test_parse_warnings_are_returned() {
    let (service, _) = test_service();
    let response = service
        .search("(abend OR vsam", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!response.warnings.is_empty());
    assert!(response.total_hits > 0);
}

#[tokio::test]
async fn test_explanation_and_highlights_can_be_disabled() {
    let (service, _) = test_service();
    let options = SearchOptions {
        include_explanation: false,
        include_highlights: false,
        ..SearchOptions::default()
    };
    let response = service.search("vsam", &options).await.unwrap();
    assert!(response.total_hits > 0);
    assert!(response
        .results
        .iter()
        .all(|r| r.explanation.is_none() && r.highlights.is_empty()));

    let response = service.search("vsam", &SearchOptions::default()).await.unwrap();
    assert!(response.results[0].explanation.is_some());
    assert!(!response.results[0].highlights.is_empty());
}

#[tokio::test]
async fn test_suggest_completes_vocabulary_and_fields() {
    let (service, _) = test_service();

    let suggestions = service.suggest("vsam dead").await;
    assert!(suggestions.contains(&"vsam deadlock".to_string()));

    let suggestions = service.suggest("ti").await;
    assert!(suggestions.contains(&"title:".to_string()));

    let suggestions = service.suggest("vsam dedlock").await;
    assert!(suggestions.contains(&"vsam deadlock".to_string()));

    assert!(service.suggest("").await.is_empty());
}

#[tokio::test]
async fn test_suggestion_limit() {
    let mut config = Config::default();
    config.search.suggestion_limit = 2;
    let (service, _) = SearchService::in_memory(&config, knowledge_base());

    assert!(service.suggest("s").await.len() <= 2);
}

#[tokio::test]
async fn test_invalidate_after_collection_change() {
    let (service, index) = test_service();
    let options = SearchOptions::default();

    assert_eq!(service.search("cartridge", &options).await.unwrap().total_hits, 0);

    let mut documents = knowledge_base();
    documents.push(Document::new(
        "kb-7",
        "Cartridge mount pending",
        "Job waits for a tape cartridge",
        "Reply to the mount message",
        "Storage",
    ));
    index.replace_documents(documents);

    assert!(service.search("cartridge", &options).await.unwrap().from_cache);

    let removed = service.invalidate("search:cartridge*").await.unwrap();
    assert_eq!(removed, 1);
    let fresh = service.search("cartridge", &options).await.unwrap();
    assert!(!fresh.from_cache);
    assert_eq!(fresh.total_hits, 1);
}

#[tokio::test]
async fn test_statistics_and_maintenance() {
    let (service, _) = test_service();
    service.search("abend", &SearchOptions::default()).await.unwrap();
    service.search("abend", &SearchOptions::default()).await.unwrap();

    let stats = service.get_statistics().await;
    assert_eq!(stats.index_size, 6);
    assert!(stats.vocabulary_size > 20);
    assert_eq!(stats.total_queries, 2);
    assert!(stats.cache_size >= 1);
    assert_eq!(stats.cache.hits, 1);

    service.optimize().await.unwrap();
    service.clear_cache().await;
    assert_eq!(service.get_statistics().await.cache_size, 0);
}

#[tokio::test]
async fn test_concurrent_searches_share_service() {
    let (service, _) = test_service();
    let service = Arc::new(service);

    let handles: Vec<_> = ["vsam", "abend", "deadlock", "spool", "vsam", "abend"]
        .into_iter()
        .map(|query| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .search(query, &SearchOptions::default())
                    .await
                    .map(|r| r.total_hits)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap() > 0);
    }
}
