use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open attribute payload carried alongside a record.
///
/// Opaque to the engine apart from the configured grouping key.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One indexed item. `text` is exactly what was embedded for its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(alias = "type")]
    pub category: String,
    pub text: String,
    #[serde(default, alias = "payload", deserialize_with = "null_as_default")]
    pub attributes: Attributes,
}

impl Record {
    pub fn new(id: impl Into<String>, category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            text: text.into(),
            attributes: Attributes::new(),
        }
    }

    /// Attach an attribute (builder pattern).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute rendered as a string: strings verbatim, other JSON values
    /// through their JSON form.
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Hard filters applied after retrieval. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub category: Option<String>,
    pub group: Option<String>,
}

impl Filters {
    pub fn new(category: Option<String>, group: Option<String>) -> Self {
        fn normalize(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.is_empty())
        }
        Self {
            category: normalize(category),
            group: normalize(group),
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self::new(Some(category.into()), None)
    }

    /// True when the record passes the category and group filters.
    /// A record without the group attribute never matches a set group filter.
    pub fn matches(&self, record: &Record, group_key: &str) -> bool {
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }
        if let Some(group) = &self.group {
            if record.attribute_str(group_key).as_deref() != Some(group.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A plain search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub category: String,
    pub text: String,
    pub attributes: Attributes,
}

/// A hybrid search hit with its boost breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridHit {
    pub id: String,
    /// Score after vibe boosting
    pub score: f32,
    /// Raw similarity from the index
    pub original_score: f32,
    /// Number of distinct tags found in the text
    pub vibe_matches: u32,
    pub category: String,
    pub text: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Hybrid,
    NoQuery,
    EmptyIndex,
}

/// Result of a hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridOutcome {
    pub hits: Vec<HybridHit>,
    pub strategy: Strategy,
    /// The text actually embedded, when a query was composed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composed_query: Option<String>,
    pub total_candidates: usize,
}

impl HybridOutcome {
    pub fn empty(strategy: Strategy) -> Self {
        Self {
            hits: Vec::new(),
            strategy,
            composed_query: None,
            total_candidates: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResult {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

// ─── Requests / responses ────────────────────────────────

fn default_top_k() -> usize {
    10
}

/// Upsert request
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRequest {
    pub items: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub result: UpsertResult,
}

/// Plain search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, alias = "filter_type")]
    pub filter_category: Option<String>,
    #[serde(default, alias = "filter_province")]
    pub filter_group: Option<String>,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn filters(&self) -> Filters {
        Filters::new(self.filter_category.clone(), self.filter_group.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<ScoredRecord>,
}

/// Hybrid search request
#[derive(Debug, Clone, Deserialize)]
pub struct HybridSearchRequest {
    #[serde(default)]
    pub free_text: Option<String>,
    #[serde(default, alias = "vibes", deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, alias = "avoid", deserialize_with = "null_as_default")]
    pub avoid_terms: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, alias = "filter_type")]
    pub filter_category: Option<String>,
    #[serde(default, alias = "filter_province")]
    pub filter_group: Option<String>,
    #[serde(default, alias = "boost_vibes")]
    pub boost_factor: Option<f32>,
}

impl HybridSearchRequest {
    pub fn filters(&self) -> Filters {
        Filters::new(self.filter_category.clone(), self.filter_group.clone())
    }
}

/// Embed request
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub dimension: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub index_type: String,
    pub vectors: usize,
    pub records: usize,
    pub consistent: bool,
    pub faulted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub vectors: usize,
    pub records: usize,
    pub dimension: usize,
    pub index_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accepts_legacy_field_names() {
        let json = r#"{"id":"z1","type":"zone","text":"quiet beach","payload":{"province":"Da Nang"}}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.category, "zone");
        assert_eq!(record.attribute_str("province").as_deref(), Some("Da Nang"));
    }

    #[test]
    fn test_record_attributes_default_to_empty() {
        let record: Record =
            serde_json::from_str(r#"{"id":"a","category":"poi","text":"market"}"#).unwrap();
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn test_filters_treat_empty_strings_as_unset() {
        let filters = Filters::new(Some(String::new()), Some(String::new()));
        assert_eq!(filters, Filters::default());
        assert!(filters.matches(&Record::new("a", "zone", "x"), "province"));
    }

    #[test]
    fn test_group_filter_requires_attribute() {
        let filters = Filters::new(None, Some("Hue".into()));
        let with = Record::new("a", "zone", "x").with_attribute("province", "Hue");
        let other = Record::new("b", "zone", "x").with_attribute("province", "Hanoi");
        let without = Record::new("c", "zone", "x");
        assert!(filters.matches(&with, "province"));
        assert!(!filters.matches(&other, "province"));
        assert!(!filters.matches(&without, "province"));
    }

    #[test]
    fn test_hybrid_request_aliases() {
        let json = r#"{"vibes":["quiet"],"avoid":["crowded"],"boost_vibes":1.5,"filter_type":"zone"}"#;
        let req: HybridSearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.tags, vec!["quiet"]);
        assert_eq!(req.avoid_terms, vec!["crowded"]);
        assert_eq!(req.boost_factor, Some(1.5));
        assert_eq!(req.top_k, 10);
        assert_eq!(req.filters().category.as_deref(), Some("zone"));
    }

    #[test]
    fn test_explicit_nulls_read_as_defaults() {
        let record: Record =
            serde_json::from_str(r#"{"id":"a","type":"poi","text":"market","payload":null}"#)
                .unwrap();
        assert!(record.attributes.is_empty());

        let req: HybridSearchRequest =
            serde_json::from_str(r#"{"free_text":"beach","vibes":null,"avoid":null}"#).unwrap();
        assert!(req.tags.is_empty());
        assert!(req.avoid_terms.is_empty());
        assert_eq!(req.free_text.as_deref(), Some("beach"));
    }

    #[test]
    fn test_strategy_serializes_to_snake_case() {
        let json = serde_json::to_value(Strategy::EmptyIndex).unwrap();
        assert_eq!(json, "empty_index");
    }
}
