//! Query execution and scoring

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use super::bm25::{Bm25, Signals};
use super::error::{IndexError, SearchError};
use super::index::{CollectionStats, InMemoryIndex, KnowledgeIndex, Posting};
use super::models::{MatchType, RankOptions, RankingConfig, ResultMetadata, ResultSource, SearchResult};
use super::snippet::field_highlights;
use super::weights::{RankingProfile, RankingWeights};
use crate::cache::{expansion_cache_key, SearchCache};
use crate::fuzzy::{FuzzyMatcher, FuzzyOptions, MAX_RESULTS_CAP};
use crate::metrics::INDEX_ERRORS_TOTAL;
use crate::models::{Document, DocumentField, FIELD_COUNT};
use crate::query::{FilterOperator, ParsedQuery, QueryFilter, QueryTerm, Wildcard};
use crate::text::part_sequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExpansionKind {
    Exact,
    Wildcard,
    Fuzzy,
}

/// An index key a query term is looked up under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Expansion {
    key: String,
    weight: f64,
    kind: ExpansionKind,
}

impl Expansion {
    fn exact(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            weight: 1.0,
            kind: ExpansionKind::Exact,
        }
    }
}

/// How one positive term is executed
#[derive(Debug)]
struct TermPlan<'q> {
    term: &'q QueryTerm,
    fields: Vec<DocumentField>,
    expansions: Vec<Expansion>,
    /// Phrase words in order; empty for non-phrase terms
    words: Vec<String>,
    fallback: bool,
}

/// Accumulated evidence for one document
#[derive(Debug)]
struct Candidate {
    lexical: f64,
    /// Best expansion weight per term plan, 0 when unmatched
    matched: Vec<f64>,
    keys: BTreeMap<DocumentField, BTreeSet<String>>,
    fuzzy: bool,
    wildcard: bool,
    phrase: bool,
    field: bool,
    fallback: bool,
}

impl Candidate {
    fn new(terms: usize) -> Self {
        Self {
            lexical: 0.0,
            matched: vec![0.0; terms],
            keys: BTreeMap::new(),
            fuzzy: false,
            wildcard: false,
            phrase: false,
            field: false,
            fallback: false,
        }
    }

    fn matched_count(&self) -> usize {
        self.matched.iter().filter(|w| **w > 0.0).count()
    }
}

/// Collection-wide inputs shared by every phrase term
#[derive(Clone, Copy)]
struct PhraseScoring<'a> {
    stats: &'a CollectionStats,
    documents: &'a [Document],
    weights: &'a RankingWeights,
    field_boosts: &'a [f64; FIELD_COUNT],
    bm25: &'a Bm25,
    plan_count: usize,
}

/// Posting lists and vocabulary fetched once per search
struct IndexReader<'a> {
    index: &'a dyn KnowledgeIndex,
    postings: HashMap<String, Arc<Vec<Posting>>>,
    vocabulary: Option<Arc<Vec<String>>>,
}

impl<'a> IndexReader<'a> {
    fn new(index: &'a dyn KnowledgeIndex) -> Self {
        Self {
            index,
            postings: HashMap::new(),
            vocabulary: None,
        }
    }

    async fn postings(&mut self, key: &str) -> Result<Arc<Vec<Posting>>, IndexError> {
        if let Some(list) = self.postings.get(key) {
            return Ok(list.clone());
        }
        let list = self.index.postings(key).await?;
        self.postings.insert(key.to_string(), list.clone());
        Ok(list)
    }

    async fn vocabulary(&mut self) -> Result<Arc<Vec<String>>, IndexError> {
        if let Some(vocabulary) = &self.vocabulary {
            return Ok(vocabulary.clone());
        }
        let vocabulary = self.index.vocabulary().await?;
        self.vocabulary = Some(vocabulary.clone());
        Ok(vocabulary)
    }
}

/// Executes parsed queries against a [`KnowledgeIndex`]
pub struct RankingEngine {
    config: RankingConfig,
    fuzzy: Arc<FuzzyMatcher>,
    cache: Option<SearchCache>,
}

impl RankingEngine {
    pub fn new(config: RankingConfig, fuzzy: Arc<FuzzyMatcher>) -> Self {
        Self {
            config,
            fuzzy,
            cache: None,
        }
    }

    /// Memoize query expansions in `cache`
    pub fn with_cache(mut self, cache: SearchCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn fuzzy_matcher(&self) -> &Arc<FuzzyMatcher> {
        &self.fuzzy
    }

    /// Rank an ad-hoc document set
    pub async fn search_documents(
        &self,
        parsed: &ParsedQuery,
        documents: Vec<Document>,
        options: &RankOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let index = InMemoryIndex::new(documents);
        self.search(parsed, &index, options).await
    }

    /// Score, filter and order every candidate for `parsed`
    pub async fn search(
        &self,
        parsed: &ParsedQuery,
        index: &dyn KnowledgeIndex,
        options: &RankOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let started = Instant::now();
        let positive: Vec<&QueryTerm> = parsed
            .positive_terms()
            .filter(|term| !term_fields(term).is_empty())
            .collect();
        if positive.is_empty() {
            debug!(query = %parsed.original, "No positive terms, empty result");
            return Ok(Vec::new());
        }

        let stats = index
            .collection_stats()
            .await
            .map_err(|e| self.index_failure(parsed, started, e))?;
        if stats.document_count == 0 {
            return Ok(Vec::new());
        }
        let documents = index
            .snapshot()
            .await
            .map_err(|e| self.index_failure(parsed, started, e))?;

        let profile = options
            .profile
            .unwrap_or_else(|| RankingProfile::select(parsed));
        let weights = options.weights.clone().unwrap_or_else(|| profile.weights());

        let mut reader = IndexReader::new(index);
        let (candidates, plan_count) = self
            .collect_candidates(parsed, &positive, &stats, &documents, &weights, &mut reader)
            .await
            .map_err(|e| self.index_failure(parsed, started, e))?;
        let excluded = self
            .prohibited_documents(parsed, &documents, &mut reader)
            .await
            .map_err(|e| self.index_failure(parsed, started, e))?;

        let required: Vec<usize> = positive
            .iter()
            .enumerate()
            .filter(|(_, term)| term.required)
            .map(|(i, _)| i)
            .collect();
        let minimum = parsed
            .options
            .minimum_should_match
            .map(|n| n.min(plan_count));

        let now = Utc::now();
        let candidate_count = candidates.len();
        let mut ranked: Vec<(usize, f64, Candidate)> = candidates
            .into_iter()
            .filter(|(doc, _)| *doc < documents.len() && !excluded.contains(doc))
            .filter(|(doc, _)| passes_filters(&parsed.filters, &documents[*doc]))
            .filter(|(_, c)| match minimum {
                Some(n) => c.matched_count() >= n,
                None => c.matched_count() > 0 && required.iter().all(|&i| c.matched[i] > 0.0),
            })
            .map(|(doc, c)| {
                let signals = Signals::of(&documents[doc], now, self.config.recency_days);
                let score = signals.blend(c.lexical, &weights);
                (doc, score, c)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| documents[a.0].id.cmp(&documents[b.0].id))
        });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let results: Vec<SearchResult> = ranked
            .into_iter()
            .map(|(doc, score, candidate)| {
                self.build_result(
                    parsed,
                    &documents[doc],
                    score,
                    candidate,
                    plan_count,
                    profile,
                    options,
                    elapsed_ms,
                )
            })
            .collect();

        debug!(
            query = %parsed.original,
            profile = %profile,
            candidates = candidate_count,
            results = results.len(),
            excluded = excluded.len(),
            elapsed_ms,
            "Query ranked"
        );
        Ok(results)
    }

    fn index_failure(&self, parsed: &ParsedQuery, started: Instant, cause: IndexError) -> SearchError {
        INDEX_ERRORS_TOTAL.inc();
        error!(query = %parsed.original, error = %cause, "Index access failed during search");
        SearchError::index_access(&parsed.original, started, cause)
    }

    async fn collect_candidates(
        &self,
        parsed: &ParsedQuery,
        positive: &[&QueryTerm],
        stats: &CollectionStats,
        documents: &[Document],
        weights: &RankingWeights,
        reader: &mut IndexReader<'_>,
    ) -> Result<(HashMap<usize, Candidate>, usize), IndexError> {
        let mut plans = Vec::with_capacity(positive.len());
        for term in positive {
            plans.push(self.plan_term(parsed, term, stats.generation, reader).await?);
        }

        let bm25 = self.config.bm25();
        let field_boosts = field_boosts(parsed);
        let mut candidates: HashMap<usize, Candidate> = HashMap::new();

        for (t, plan) in plans.iter().enumerate() {
            if plan.term.is_phrase() {
                let scoring = PhraseScoring {
                    stats,
                    documents,
                    weights,
                    field_boosts: &field_boosts,
                    bm25: &bm25,
                    plan_count: plans.len(),
                };
                self.score_phrase(t, plan, &scoring, reader, &mut candidates)
                    .await?;
                continue;
            }

            for expansion in &plan.expansions {
                let postings = reader.postings(&expansion.key).await?;
                if postings.is_empty() {
                    continue;
                }
                let idf = bm25.idf(stats.document_count, postings.len());

                for posting in postings.iter() {
                    let mut contribution = 0.0;
                    let mut hit_fields = Vec::new();
                    for &field in &plan.fields {
                        let frequency = posting.frequency(field);
                        if frequency == 0 {
                            continue;
                        }
                        contribution += idf
                            * bm25.term_weight(frequency, posting.length(field), stats.average_length(field))
                            * weights.field(field)
                            * plan.term.boost
                            * field_boosts[field.index()]
                            * expansion.weight;
                        hit_fields.push(field);
                    }
                    if hit_fields.is_empty() {
                        continue;
                    }

                    let candidate = candidates
                        .entry(posting.doc)
                        .or_insert_with(|| Candidate::new(plans.len()));
                    candidate.lexical += contribution;
                    candidate.matched[t] = candidate.matched[t].max(expansion.weight);
                    for field in hit_fields {
                        candidate
                            .keys
                            .entry(field)
                            .or_default()
                            .insert(expansion.key.clone());
                    }
                    match expansion.kind {
                        ExpansionKind::Fuzzy => {
                            candidate.fuzzy = true;
                            candidate.fallback |= plan.fallback;
                        }
                        ExpansionKind::Wildcard => candidate.wildcard = true,
                        ExpansionKind::Exact => {}
                    }
                    candidate.field |= plan.term.field.is_some();
                }
            }
        }

        Ok((candidates, plans.len()))
    }

    async fn plan_term<'q>(
        &self,
        parsed: &ParsedQuery,
        term: &'q QueryTerm,
        generation: u64,
        reader: &mut IndexReader<'_>,
    ) -> Result<TermPlan<'q>, IndexError> {
        let mut plan = TermPlan {
            term,
            fields: term_fields(term),
            expansions: Vec::new(),
            words: Vec::new(),
            fallback: false,
        };

        if term.is_phrase() {
            plan.words = part_sequence(&term.text);
            return Ok(plan);
        }

        if let Some(wildcard) = term.wildcard {
            plan.expansions = self
                .wildcard_expansions(&term.text, wildcard, generation, reader)
                .await?;
            return Ok(plan);
        }

        plan.expansions.push(Expansion::exact(term.text.clone()));
        let distance = term
            .fuzzy_distance
            .unwrap_or(parsed.options.fuzzy_distance) as usize;

        if term.fuzzy {
            let fuzzy = self
                .fuzzy_expansions(&term.text, distance, generation, reader)
                .await?;
            plan.expansions.extend(fuzzy);
        } else if self.config.fuzzy_fallback && reader.postings(&term.text).await?.is_empty() {
            let fuzzy = self
                .fuzzy_expansions(&term.text, distance, generation, reader)
                .await?;
            if !fuzzy.is_empty() {
                debug!(term = %term.text, expansions = fuzzy.len(), "No exact hit, using fuzzy fallback");
                plan.fallback = true;
                plan.expansions.extend(fuzzy);
            }
        }

        Ok(plan)
    }

    async fn wildcard_expansions(
        &self,
        text: &str,
        wildcard: Wildcard,
        generation: u64,
        reader: &mut IndexReader<'_>,
    ) -> Result<Vec<Expansion>, IndexError> {
        let key = expansion_cache_key(generation, &format!("wildcard-{wildcard}"), text);
        if let Some(expansions) = self.memoized(&key).await {
            return Ok(expansions);
        }

        let vocabulary = reader.vocabulary().await?;
        let expansions: Vec<Expansion> = vocabulary
            .iter()
            .filter(|candidate| wildcard.matches(text, candidate))
            .take(self.config.max_wildcard_expansions)
            .map(|candidate| Expansion {
                key: candidate.clone(),
                weight: self.config.wildcard_weight,
                kind: ExpansionKind::Wildcard,
            })
            .collect();

        self.memoize(&key, &expansions).await;
        Ok(expansions)
    }

    async fn fuzzy_expansions(
        &self,
        text: &str,
        distance: usize,
        generation: u64,
        reader: &mut IndexReader<'_>,
    ) -> Result<Vec<Expansion>, IndexError> {
        let key = expansion_cache_key(generation, &format!("fuzzy-{distance}"), text);
        if let Some(expansions) = self.memoized(&key).await {
            return Ok(expansions);
        }

        let vocabulary = reader.vocabulary().await?;
        let options = FuzzyOptions {
            max_distance: distance,
            min_similarity: self.config.min_similarity,
            max_results: MAX_RESULTS_CAP,
            ..self.fuzzy.defaults().clone()
        };
        let expansions: Vec<Expansion> = self
            .fuzzy
            .find_matches(text, vocabulary.as_slice(), Some(&options))
            .into_iter()
            .map(|m| Expansion {
                key: m.term,
                weight: m.similarity,
                kind: ExpansionKind::Fuzzy,
            })
            .collect();

        self.memoize(&key, &expansions).await;
        Ok(expansions)
    }

    async fn memoized(&self, key: &str) -> Option<Vec<Expansion>> {
        let cache = self.cache.as_ref()?;
        cache.get::<Vec<Expansion>>(key).await
    }

    async fn memoize(&self, key: &str, expansions: &[Expansion]) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.set(key, &expansions, None).await {
            warn!(key = %key, error = %e, "Failed to memoize expansion");
        }
    }

    async fn score_phrase(
        &self,
        t: usize,
        plan: &TermPlan<'_>,
        scoring: &PhraseScoring<'_>,
        reader: &mut IndexReader<'_>,
        candidates: &mut HashMap<usize, Candidate>,
    ) -> Result<(), IndexError> {
        let PhraseScoring {
            stats,
            documents,
            weights,
            field_boosts,
            bm25,
            plan_count,
        } = *scoring;
        if plan.words.is_empty() {
            return Ok(());
        }

        let mut lists = Vec::with_capacity(plan.words.len());
        for word in &plan.words {
            lists.push(reader.postings(word).await?);
        }

        let slop = plan.term.proximity.unwrap_or(0) as usize;
        let mut shared: HashMap<usize, Vec<&Posting>> = HashMap::new();
        for posting in lists[0].iter() {
            shared.insert(posting.doc, vec![posting]);
        }
        for list in &lists[1..] {
            let mut next = HashMap::new();
            for posting in list.iter() {
                if let Some(mut found) = shared.remove(&posting.doc) {
                    found.push(posting);
                    next.insert(posting.doc, found);
                }
            }
            shared = next;
        }

        let idfs: Vec<f64> = lists
            .iter()
            .map(|list| bm25.idf(stats.document_count, list.len()))
            .collect();

        for (doc, postings) in shared {
            let Some(document) = documents.get(doc) else {
                continue;
            };

            let mut contribution = 0.0;
            let mut hit_fields = Vec::new();
            for &field in &plan.fields {
                if postings.iter().any(|p| p.frequency(field) == 0) {
                    continue;
                }
                let sequence = part_sequence(&document.field_text(field));
                if !phrase_occurs(&sequence, &plan.words, slop) {
                    continue;
                }

                let lexical: f64 = postings
                    .iter()
                    .zip(&idfs)
                    .map(|(p, idf)| {
                        idf * bm25.term_weight(p.frequency(field), p.length(field), stats.average_length(field))
                    })
                    .sum();
                contribution += lexical
                    * weights.field(field)
                    * plan.term.boost
                    * field_boosts[field.index()]
                    * self.config.phrase_bonus;
                hit_fields.push(field);
            }
            if hit_fields.is_empty() {
                continue;
            }

            let candidate = candidates
                .entry(doc)
                .or_insert_with(|| Candidate::new(plan_count));
            candidate.lexical += contribution;
            candidate.matched[t] = 1.0;
            candidate.phrase = true;
            candidate.field |= plan.term.field.is_some();
            for field in hit_fields {
                candidate
                    .keys
                    .entry(field)
                    .or_default()
                    .extend(plan.words.iter().cloned());
            }
        }

        Ok(())
    }

    /// Documents excluded by prohibited terms
    async fn prohibited_documents(
        &self,
        parsed: &ParsedQuery,
        documents: &[Document],
        reader: &mut IndexReader<'_>,
    ) -> Result<HashSet<usize>, IndexError> {
        let mut excluded = HashSet::new();
        for term in parsed.terms.iter().filter(|t| t.prohibited && !t.text.is_empty()) {
            let fields = term_fields(term);
            if fields.is_empty() {
                continue;
            }

            if term.is_phrase() {
                let words = part_sequence(&term.text);
                let Some(first) = words.first() else {
                    continue;
                };
                let slop = term.proximity.unwrap_or(0) as usize;
                for posting in reader.postings(first).await?.iter() {
                    let Some(document) = documents.get(posting.doc) else {
                        continue;
                    };
                    let occurs = fields.iter().any(|field| {
                        phrase_occurs(&part_sequence(&document.field_text(*field)), &words, slop)
                    });
                    if occurs {
                        excluded.insert(posting.doc);
                    }
                }
                continue;
            }

            let keys: Vec<String> = match term.wildcard {
                Some(wildcard) => reader
                    .vocabulary()
                    .await?
                    .iter()
                    .filter(|candidate| wildcard.matches(&term.text, candidate))
                    .take(self.config.max_wildcard_expansions)
                    .cloned()
                    .collect(),
                None => vec![term.text.clone()],
            };
            for key in keys {
                for posting in reader.postings(&key).await?.iter() {
                    if fields.iter().any(|field| posting.frequency(*field) > 0) {
                        excluded.insert(posting.doc);
                    }
                }
            }
        }
        Ok(excluded)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        parsed: &ParsedQuery,
        document: &Document,
        score: f64,
        candidate: Candidate,
        plan_count: usize,
        profile: RankingProfile,
        options: &RankOptions,
        elapsed_ms: u64,
    ) -> SearchResult {
        let matched = candidate.matched_count();
        let match_type = if candidate.fuzzy {
            MatchType::Fuzzy
        } else if candidate.wildcard {
            MatchType::Wildcard
        } else if parsed.explicit_boolean {
            MatchType::Boolean
        } else if candidate.phrase {
            MatchType::Phrase
        } else if candidate.field {
            MatchType::Field
        } else if matched == plan_count {
            MatchType::Exact
        } else {
            MatchType::Partial
        };

        let highlights = if options.include_highlights {
            let settings = self.config.snippet_settings();
            candidate
                .keys
                .iter()
                .map(|(field, keys)| field_highlights(document, *field, keys, &settings))
                .filter(|highlights| !highlights.is_empty())
                .take(self.config.max_snippets)
                .flatten()
                .collect()
        } else {
            Vec::new()
        };

        let explanation = options.include_explanation.then(|| {
            let fields: Vec<String> = candidate.keys.keys().map(|f| f.to_string()).collect();
            let terms: BTreeSet<&str> = candidate
                .keys
                .values()
                .flat_map(|keys| keys.iter().map(String::as_str))
                .collect();
            format!(
                "profile={}; fields={}; fuzzy={}; terms={}",
                profile,
                fields.join(","),
                if candidate.fuzzy { "yes" } else { "no" },
                terms.into_iter().collect::<Vec<_>>().join(",")
            )
        });

        let confidence = if plan_count == 0 {
            0.0
        } else {
            (candidate.matched.iter().sum::<f64>() / plan_count as f64).clamp(0.0, 1.0)
        };

        SearchResult {
            document: document.clone(),
            score,
            match_type,
            highlights,
            explanation,
            metadata: ResultMetadata {
                processing_time_ms: elapsed_ms,
                source: ResultSource::Index,
                confidence,
                fallback_used: candidate.fallback,
            },
        }
    }
}

/// Fields a term is scored in; empty when its field does not exist
fn term_fields(term: &QueryTerm) -> Vec<DocumentField> {
    match &term.field {
        None => DocumentField::ALL.to_vec(),
        Some(name) => DocumentField::from_name(name).into_iter().collect(),
    }
}

fn field_boosts(parsed: &ParsedQuery) -> [f64; FIELD_COUNT] {
    let mut boosts = [1.0; FIELD_COUNT];
    for (name, boost) in &parsed.options.field_boosts {
        if let Some(field) = DocumentField::from_name(name) {
            boosts[field.index()] = boost.max(0.0);
        }
    }
    boosts
}

/// Hard filters on `category`, `tags` and `id`; other fields never filter
fn passes_filters(filters: &[QueryFilter], document: &Document) -> bool {
    filters.iter().all(|filter| match filter.field.as_str() {
        "category" => filter.accepts(&document.category),
        "id" => filter.accepts(&document.id),
        "tags" | "tag" => match filter.operator {
            FilterOperator::NotEquals => document.tags.iter().all(|t| filter.accepts(t)),
            _ => document.tags.iter().any(|t| filter.accepts(t)),
        },
        _ => true,
    })
}

/// Whether `words` occur in order in `sequence` with at most `slop` extra words between them
fn phrase_occurs(sequence: &[String], words: &[String], slop: usize) -> bool {
    let Some((first, rest)) = words.split_first() else {
        return false;
    };

    'start: for (i, word) in sequence.iter().enumerate() {
        if word != first {
            continue;
        }
        let mut position = i;
        for next in rest {
            match sequence[position + 1..].iter().position(|w| w == next) {
                Some(offset) => position += offset + 1,
                None => continue 'start,
            }
        }
        let gaps = position - i - rest.len();
        if gaps <= slop {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParser;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "kb-1",
                "VSAM S0C7 Error Resolution",
                "Batch job abends with S0C7 while reading a VSAM file",
                "Check packed decimal fields in the copybook",
                "VSAM",
            )
            .with_tags(vec!["vsam", "s0c7", "abend"]),
            Document::new(
                "kb-2",
                "S0C7 data exception in COBOL",
                "Program abends with S0C7 on a COMPUTE statement",
                "Initialize numeric fields before use",
                "COBOL",
            )
            .with_tags(vec!["cobol", "s0c7"]),
            Document::new(
                "kb-3",
                "VSAM status 35 on open",
                "File not found when opening the VSAM cluster",
                "Define the cluster with IDCAMS",
                "VSAM",
            )
            .with_tags(vec!["vsam", "file-status"]),
            Document::new(
                "kb-4",
                "DB2 deadlock SQLCODE -911",
                "Transactions roll back with database deadlock",
                "Review the commit frequency",
                "DB2",
            )
            .with_tags(vec!["db2", "deadlock"]),
        ]
    }

    fn engine() -> RankingEngine {
        RankingEngine::new(RankingConfig::default(), Arc::new(FuzzyMatcher::default()))
    }

    async fn run(query: &str) -> Vec<SearchResult> {
        let parsed = QueryParser::default().parse(query, None);
        engine()
            .search_documents(&parsed, corpus(), &RankOptions::default())
            .await
            .unwrap()
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.id.as_str()).collect()
    }

    #[test]
    fn test_phrase_occurs_with_slop() {
        let sequence = words("job abends with s0c7 while reading");
        assert!(phrase_occurs(&sequence, &words("abends with"), 0));
        assert!(!phrase_occurs(&sequence, &words("abends s0c7"), 0));
        assert!(phrase_occurs(&sequence, &words("abends s0c7"), 1));
        assert!(!phrase_occurs(&sequence, &words("s0c7 abends"), 5));
        assert!(!phrase_occurs(&sequence, &[], 0));
    }

    #[tokio::test]
    async fn test_boolean_and_with_phrase_identifier() {
        let results = run("\"S0C7\" AND VSAM").await;
        assert_eq!(ids(&results), vec!["kb-1"]);
        assert_eq!(results[0].match_type, MatchType::Boolean);
    }

    #[tokio::test]
    async fn test_signed_sql_code_matches() {
        let results = run("deadlock -911").await;
        assert_eq!(ids(&results), vec!["kb-4"]);
        assert!(results[0].highlights.iter().any(|h| h.context.contains("<mark>-911</mark>")));

        assert_eq!(ids(&run("911").await), vec!["kb-4"]);
    }

    #[tokio::test]
    async fn test_prohibited_terms_exclude() {
        let results = run("s0c7 -cobol").await;
        assert_eq!(ids(&results), vec!["kb-1"]);
    }

    #[tokio::test]
    async fn test_fuzzy_term_expands() {
        let results = run("databse~2").await;
        assert_eq!(ids(&results), vec!["kb-4"]);
        assert_eq!(results[0].match_type, MatchType::Fuzzy);
        assert!(!results[0].metadata.fallback_used);
        assert!(results[0].explanation.as_deref().unwrap().contains("fuzzy=yes"));
    }

    #[tokio::test]
    async fn test_fuzzy_fallback_is_flagged() {
        let results = run("deadlok").await;
        assert_eq!(ids(&results), vec!["kb-4"]);
        assert!(results[0].metadata.fallback_used);
    }

    #[tokio::test]
    async fn test_wildcard_expands_vocabulary() {
        let results = run("dead*").await;
        assert_eq!(ids(&results), vec!["kb-4"]);
        assert_eq!(results[0].match_type, MatchType::Wildcard);
    }

    #[tokio::test]
    async fn test_field_term_scores_only_that_field() {
        let results = run("title:cluster").await;
        assert!(results.is_empty());

        let results = run("solution:cluster").await;
        assert_eq!(ids(&results), vec!["kb-3"]);
        assert_eq!(results[0].match_type, MatchType::Field);
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let results = run("s0c7 id:kb-2").await;
        assert_eq!(ids(&results), vec!["kb-2"]);
    }

    #[tokio::test]
    async fn test_explanation_and_highlights() {
        let results = run("vsam cluster").await;
        assert_eq!(ids(&results), vec!["kb-3"]);
        let result = &results[0];
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(
            result.explanation.as_deref(),
            Some("profile=domain_focused; fields=title,problem,solution,tags,category; fuzzy=no; terms=cluster,vsam")
        );
        assert!(result.highlights.len() >= 3);
        assert!(result.highlights[0].context.contains("<mark>VSAM</mark>"));
        assert!((result.metadata.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let docs = vec![
            Document::new("b", "same text", "", "", ""),
            Document::new("a", "same text", "", "", ""),
        ];
        let parsed = QueryParser::default().parse("same", None);
        let results = engine()
            .search_documents(&parsed, docs, &RankOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["a", "b"]);
        assert_eq!(results[0].score, results[1].score);
    }

    #[tokio::test]
    async fn test_no_positive_terms_is_empty() {
        assert!(run("-vsam").await.is_empty());
        assert!(run("").await.is_empty());
    }

    #[tokio::test]
    async fn test_minimum_should_match() {
        let parser = QueryParser::default();
        let mut options = parser.config().defaults.clone();
        options.default_operator = crate::query::DefaultOperator::Or;
        options.minimum_should_match = Some(2);
        let parsed = parser.parse("vsam cobol deadlock", Some(&options));

        let results = engine()
            .search_documents(&parsed, corpus(), &RankOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());

        options.minimum_should_match = Some(1);
        let parsed = parser.parse("vsam cobol deadlock", Some(&options));
        let results = engine()
            .search_documents(&parsed, corpus(), &RankOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
    }
}
