use std::collections::HashSet;
use std::time::Instant;

use crate::config::{MAX_BOOST, MIN_BOOST};
use crate::error::{Result, ServiceError};
use crate::llm::embeddings::embed_single;
use crate::models::{Filters, HybridHit, HybridOutcome, Strategy};
use crate::search::retrieval::{preview, Retriever};
use crate::search::store::RecordStore;
use crate::search::vector::Neighbor;

/// Hybrid query input. Tags feed both the semantic query and the vibe boost.
#[derive(Debug, Clone, Default)]
pub struct HybridQuery {
    pub free_text: Option<String>,
    pub tags: Vec<String>,
    pub avoid_terms: Vec<String>,
    pub top_k: usize,
    pub filters: Filters,
    pub boost_factor: f32,
}

/// Everything a candidate is judged against during re-ranking.
#[derive(Debug, Clone)]
pub struct RerankRules<'a> {
    /// Lowercased, deduplicated tags
    pub tags: Vec<String>,
    /// Lowercased avoid terms
    pub avoid: Vec<String>,
    pub filters: &'a Filters,
    pub group_key: &'a str,
    pub boost_factor: f32,
}

impl Retriever {
    /// Semantic search over `free_text` + `tags`, followed by avoid-term
    /// exclusion, hard filters and a multiplicative boost per matching tag.
    ///
    /// Pipeline:
    /// 1. Compose one query string (free text, then each tag, space-joined).
    /// 2. Overfetch `top_k * overfetch_factor` neighbours.
    /// 3. Drop candidates containing any avoid term, then apply hard filters.
    /// 4. Score `original * boost^matches` where `matches` counts distinct tags
    ///    found in the text.
    /// 5. Sort by boosted score and keep `top_k`.
    ///
    /// Only the overfetched window is re-ranked; a candidate just outside it is
    /// never seen no matter how well it would have been boosted.
    pub async fn hybrid_search(&self, query: &HybridQuery) -> Result<HybridOutcome> {
        self.check_top_k(query.top_k)?;
        if !query.boost_factor.is_finite()
            || !(MIN_BOOST..=MAX_BOOST).contains(&query.boost_factor)
        {
            return Err(ServiceError::Validation(format!(
                "boost_factor must be between {MIN_BOOST} and {MAX_BOOST}, got {}",
                query.boost_factor
            )));
        }

        let Some(composed) = compose_query(query.free_text.as_deref(), &query.tags) else {
            return Ok(HybridOutcome::empty(Strategy::NoQuery));
        };

        let snapshot = self.engine().snapshot();
        if snapshot.index.is_empty() {
            return Ok(HybridOutcome::empty(Strategy::EmptyIndex));
        }

        let started = Instant::now();
        let query_vector = embed_single(self.embedder(), &composed).await?;
        let k = query
            .top_k
            .saturating_mul(self.settings().overfetch_factor)
            .min(snapshot.index.len());
        let neighbors = snapshot.index.search(&query_vector, k)?;

        let rules = RerankRules {
            tags: normalize_terms(&query.tags),
            avoid: normalize_terms(&query.avoid_terms),
            filters: &query.filters,
            group_key: &self.settings().group_key,
            boost_factor: query.boost_factor,
        };
        let mut hits = rerank_candidates(&snapshot.records, &neighbors, &rules);
        let total_candidates = hits.len();
        hits.truncate(query.top_k);

        tracing::info!(
            "Hybrid search {:?}: {} of {} candidates kept, {} returned in {:.2}ms",
            preview(&composed),
            total_candidates,
            neighbors.len(),
            hits.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(HybridOutcome {
            hits,
            strategy: Strategy::Hybrid,
            composed_query: Some(composed),
            total_candidates,
        })
    }
}

/// Join free text and tags into the string that gets embedded.
/// Blank parts are skipped; `None` when nothing is left.
pub fn compose_query(free_text: Option<&str>, tags: &[String]) -> Option<String> {
    let parts: Vec<&str> = free_text
        .into_iter()
        .chain(tags.iter().map(String::as_str))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Trim, lowercase, drop blanks and duplicates, keeping first-seen order.
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Number of distinct tags that occur in `text_lower`.
pub fn count_vibe_matches(text_lower: &str, tags: &[String]) -> u32 {
    tags.iter().filter(|t| text_lower.contains(t.as_str())).count() as u32
}

/// `score * boost^matches`, dividing instead for negative similarities so a
/// tag match always moves the score up.
pub fn boost_score(score: f32, boost_factor: f32, vibe_matches: u32) -> f32 {
    if vibe_matches == 0 {
        return score;
    }
    let factor = boost_factor.powi(vibe_matches as i32);
    if score >= 0.0 {
        score * factor
    } else {
        score / factor
    }
}

/// Filter and re-score overfetched neighbours, best first.
///
/// Avoid terms win over everything: a candidate containing one is dropped
/// regardless of score or tag matches.
pub fn rerank_candidates(
    records: &RecordStore,
    neighbors: &[Neighbor],
    rules: &RerankRules<'_>,
) -> Vec<HybridHit> {
    let mut hits: Vec<HybridHit> = neighbors
        .iter()
        .filter_map(|n| {
            let record = records.get(n.position)?;
            let text_lower = record.text.to_lowercase();

            if rules.avoid.iter().any(|a| text_lower.contains(a.as_str())) {
                return None;
            }
            if !rules.filters.matches(record, rules.group_key) {
                return None;
            }

            let vibe_matches = count_vibe_matches(&text_lower, &rules.tags);
            let score = boost_score(n.score, rules.boost_factor, vibe_matches);

            Some(HybridHit {
                id: record.id.clone(),
                score,
                original_score: n.score,
                vibe_matches,
                category: record.category.clone(),
                text: record.text.clone(),
                attributes: record.attributes.clone(),
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn store() -> RecordStore {
        RecordStore::from_records(vec![
            Record::new("quiet", "zone", "A Quiet beach town"),
            Record::new("both", "zone", "a quiet, peaceful beach town"),
            Record::new("crowded", "zone", "quiet but crowded peaceful bay"),
            Record::new("plain", "poi", "night market"),
        ])
    }

    fn neighbors() -> Vec<Neighbor> {
        vec![
            Neighbor { score: 0.9, position: 3 },
            Neighbor { score: 0.8, position: 2 },
            Neighbor { score: 0.7, position: 0 },
            Neighbor { score: 0.6, position: 1 },
        ]
    }

    fn rules<'a>(filters: &'a Filters, tags: &[&str], avoid: &[&str], boost: f32) -> RerankRules<'a> {
        let to_vec = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        RerankRules {
            tags: normalize_terms(&to_vec(tags)),
            avoid: normalize_terms(&to_vec(avoid)),
            filters,
            group_key: "province",
            boost_factor: boost,
        }
    }

    fn find<'a>(hits: &'a [HybridHit], id: &str) -> &'a HybridHit {
        hits.iter().find(|h| h.id == id).unwrap()
    }

    #[test]
    fn test_compose_query_order_and_blanks() {
        let tags = vec!["quiet".to_string(), " ".to_string(), "beach".to_string()];
        assert_eq!(
            compose_query(Some(" seaside trip "), &tags).as_deref(),
            Some("seaside trip quiet beach")
        );
        assert_eq!(compose_query(None, &tags).as_deref(), Some("quiet beach"));
        assert_eq!(compose_query(Some(""), &[]), None);
    }

    #[test]
    fn test_normalize_terms_dedupes_case_insensitively() {
        let terms = vec!["Quiet".to_string(), "quiet ".to_string(), "".to_string()];
        assert_eq!(normalize_terms(&terms), vec!["quiet"]);
    }

    #[test]
    fn test_single_tag_match_boosts_once() {
        let filters = Filters::default();
        let hits = rerank_candidates(&store(), &neighbors(), &rules(&filters, &["quiet"], &[], 1.5));
        let quiet = find(&hits, "quiet");
        assert_eq!(quiet.vibe_matches, 1);
        assert!((quiet.score - 0.7 * 1.5).abs() < 1e-6);
        assert!((quiet.original_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_boost_compounds_per_distinct_tag_not_occurrence() {
        let filters = Filters::default();
        let hits = rerank_candidates(
            &store(),
            &neighbors(),
            &rules(&filters, &["quiet", "peaceful", "QUIET"], &[], 1.5),
        );
        let both = find(&hits, "both");
        assert_eq!(both.vibe_matches, 2);
        assert!((both.score - 0.6 * 1.5 * 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_avoid_term_excludes_regardless_of_matches() {
        let filters = Filters::default();
        let hits = rerank_candidates(
            &store(),
            &neighbors(),
            &rules(&filters, &["quiet", "peaceful"], &["CROWDED"], 2.0),
        );
        assert!(hits.iter().all(|h| h.id != "crowded"));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_results_sorted_by_boosted_score() {
        let filters = Filters::default();
        let hits = rerank_candidates(&store(), &neighbors(), &rules(&filters, &["quiet"], &[], 2.0));
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, sorted);
        // 0.8 * 2 for the crowded bay beats the unboosted 0.9 market
        assert_eq!(hits[0].id, "crowded");
    }

    #[test]
    fn test_hard_filters_apply() {
        let filters = Filters::category("poi");
        let hits = rerank_candidates(&store(), &neighbors(), &rules(&filters, &[], &[], 1.2));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "plain");
    }

    #[test]
    fn test_larger_boost_never_lowers_matched_scores() {
        let filters = Filters::default();
        let low = rerank_candidates(&store(), &neighbors(), &rules(&filters, &["quiet"], &[], 1.1));
        let high = rerank_candidates(&store(), &neighbors(), &rules(&filters, &["quiet"], &[], 1.9));
        for hit in &low {
            let other = find(&high, &hit.id);
            if hit.vibe_matches == 0 {
                assert_eq!(hit.score, other.score);
            } else {
                assert!(other.score >= hit.score);
            }
        }
    }

    #[test]
    fn test_larger_boost_raises_negative_matched_scores() {
        let records = RecordStore::from_records(vec![
            Record::new("neg", "zone", "quiet place"),
            Record::new("other", "zone", "busy road"),
        ]);
        let neighbors = vec![
            Neighbor { score: -0.1, position: 1 },
            Neighbor { score: -0.2, position: 0 },
        ];
        let filters = Filters::default();

        let low = rerank_candidates(&records, &neighbors, &rules(&filters, &["quiet"], &[], 1.1));
        let high = rerank_candidates(&records, &neighbors, &rules(&filters, &["quiet"], &[], 1.9));

        let (lo, hi) = (find(&low, "neg"), find(&high, "neg"));
        assert_eq!(lo.vibe_matches, 1);
        assert!(lo.score > lo.original_score);
        assert!(hi.score >= lo.score);
        assert!((hi.score - (-0.2 / 1.9)).abs() < 1e-6);
        assert_eq!(find(&high, "other").score, -0.1);
        // -0.2 / 1.9 is still below -0.1
        assert_eq!(high[0].id, "other");
    }

    #[test]
    fn test_boost_score_is_identity_without_matches() {
        assert_eq!(boost_score(0.4, 2.0, 0), 0.4);
        assert_eq!(boost_score(-0.4, 2.0, 0), -0.4);
        assert!((boost_score(0.4, 1.5, 2) - 0.9).abs() < 1e-6);
        assert!((boost_score(-0.9, 1.5, 2) - (-0.4)).abs() < 1e-6);
    }
}
