//! Knowledge base: accumulated, de-duplicated facts per category.
//!
//! Facts enter the base only through [`KnowledgeBase::merge`], which applies
//! two filters in order:
//!
//! 1. **Meaningfulness** ([`is_meaningful`]): rejects empty strings, strings
//!    of five characters or fewer, and boilerplate non-answers such as
//!    `"Not applicable"`.
//! 2. **Novelty**: rejects a fact already present verbatim in its category.
//!
//! Entries are appended, never reordered or removed, so merging the same
//! input twice leaves the base unchanged.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use vigil_types::{KnowledgeCategory, KnowledgeFacts};

use crate::StoreError;

/// Phrases that mark an extracted value as a non-answer.  Matched
/// case-insensitively as substrings.
pub const NON_ANSWER_PHRASES: [&str; 14] = [
    "not available",
    "no information available",
    "none",
    "not specified",
    "not applicable",
    "unspecified",
    "not provided",
    "not discernible",
    "none discernible",
    "none apparent",
    "no person",
    "no visible person",
    "not applicable from",
    "no physical appearance",
];

/// Values with this many characters or fewer (after trimming) carry no
/// usable fact.
const MIN_FACT_CHARS: usize = 5;

/// Meaningfulness filter for a candidate fact.
pub fn is_meaningful(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.chars().count() <= MIN_FACT_CHARS {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !NON_ANSWER_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Category-partitioned fact lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    appearance: Vec<String>,
    behaviors: Vec<String>,
    environment: Vec<String>,
    medical_indicators: Vec<String>,
}

/// What a single merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Categories that received a new fact, in category order.
    pub added: Vec<KnowledgeCategory>,
    /// Whether the updated base reached the backing store.
    pub persisted: bool,
}

impl MergeReport {
    pub fn facts_added(&self) -> usize {
        self.added.len()
    }
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Facts accumulated for `category`, oldest first.
    pub fn facts(&self, category: KnowledgeCategory) -> &[String] {
        match category {
            KnowledgeCategory::Appearance => &self.appearance,
            KnowledgeCategory::Behaviors => &self.behaviors,
            KnowledgeCategory::Environment => &self.environment,
            KnowledgeCategory::MedicalIndicators => &self.medical_indicators,
        }
    }

    fn facts_mut(&mut self, category: KnowledgeCategory) -> &mut Vec<String> {
        match category {
            KnowledgeCategory::Appearance => &mut self.appearance,
            KnowledgeCategory::Behaviors => &mut self.behaviors,
            KnowledgeCategory::Environment => &mut self.environment,
            KnowledgeCategory::MedicalIndicators => &mut self.medical_indicators,
        }
    }

    pub fn is_empty(&self) -> bool {
        KnowledgeCategory::ALL
            .iter()
            .all(|c| self.facts(*c).is_empty())
    }

    /// Append `fact` to `category` unless it is already present.  Returns
    /// whether the base changed.  No meaningfulness check is applied.
    pub(crate) fn push_unique(&mut self, category: KnowledgeCategory, fact: String) -> bool {
        let list = self.facts_mut(category);
        if list.iter().any(|existing| *existing == fact) {
            return false;
        }
        list.push(fact);
        true
    }

    /// Apply both filters to every category of `facts`.
    pub fn merge(&mut self, facts: &KnowledgeFacts) -> Vec<KnowledgeCategory> {
        let mut added = Vec::new();
        for category in KnowledgeCategory::ALL {
            let candidate = facts.get(category).trim();
            if !is_meaningful(candidate) {
                debug!(%category, candidate, "fact rejected as not meaningful");
                continue;
            }
            if self.push_unique(category, candidate.to_string()) {
                added.push(category);
            }
        }
        added
    }

    /// Rebuild a base from its persisted JSON form.
    ///
    /// Each category is read independently and kept exactly as stored: a
    /// missing or non-array category starts empty, repeated entries stay, and
    /// a non-string entry is kept as its JSON text.  A non-object value is an
    /// empty base.
    pub fn from_value(value: &Value) -> Self {
        let mut base = Self::new();
        let Some(object) = value.as_object() else {
            warn!("knowledge base is not an object; starting empty");
            return base;
        };
        for category in KnowledgeCategory::ALL {
            let Some(entries) = object.get(category.key()).and_then(Value::as_array) else {
                continue;
            };
            base.facts_mut(category).extend(entries.iter().map(|entry| match entry {
                Value::String(fact) => fact.clone(),
                other => other.to_string(),
            }));
        }
        base
    }

    /// Persisted JSON form: `{appearance: [...], behaviors: [...], ...}`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for category in KnowledgeCategory::ALL {
            let facts = self
                .facts(category)
                .iter()
                .cloned()
                .map(Value::String)
                .collect();
            object.insert(category.key().to_string(), Value::Array(facts));
        }
        Value::Object(object)
    }
}

/// Persistence contract for the knowledge base.
pub trait KnowledgeStore: Send {
    /// Load the persisted base; a missing or corrupt base is empty.
    fn load(&self) -> KnowledgeBase;

    /// Replace the persisted base with `base`.
    fn save(&mut self, base: &KnowledgeBase) -> Result<(), StoreError>;

    /// Load, merge `facts`, and persist the result unconditionally.
    ///
    /// Never fails outward: a failed save is logged and reported through
    /// [`MergeReport::persisted`].
    fn merge(&mut self, facts: &KnowledgeFacts) -> MergeReport {
        let mut base = self.load();
        let added = base.merge(facts);
        let persisted = match self.save(&base) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "knowledge base could not be saved");
                false
            }
        };
        MergeReport { added, persisted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct MemoryKnowledge {
        stored: Option<KnowledgeBase>,
        saves: usize,
    }

    impl KnowledgeStore for MemoryKnowledge {
        fn load(&self) -> KnowledgeBase {
            self.stored.clone().unwrap_or_default()
        }

        fn save(&mut self, base: &KnowledgeBase) -> Result<(), StoreError> {
            self.saves += 1;
            self.stored = Some(base.clone());
            Ok(())
        }
    }

    fn sample_facts() -> KnowledgeFacts {
        KnowledgeFacts {
            appearance: "wearing a blue robe, sitting upright".into(),
            behaviors: "none".into(),
            environment: "".into(),
            medical_indicators: "visible tremor in left hand".into(),
        }
    }

    #[test]
    fn filter_rejects_non_answers_and_short_values() {
        for rejected in ["", "none", "Not Applicable", "ab", "     ", "NONE APPARENT here", "12345"] {
            assert!(!is_meaningful(rejected), "{rejected:?} should be rejected");
        }
        assert!(is_meaningful("sitting upright in a chair"));
        assert!(is_meaningful("  pale skin  "));
    }

    #[test]
    fn filter_is_a_substring_match() {
        // "none" inside a longer word still counts as a non-answer.
        assert!(!is_meaningful("nonetheless calm"));
    }

    #[test]
    fn merge_into_empty_base() {
        let mut base = KnowledgeBase::new();
        let added = base.merge(&sample_facts());
        assert_eq!(
            added,
            vec![KnowledgeCategory::Appearance, KnowledgeCategory::MedicalIndicators]
        );
        assert_eq!(
            base.to_value(),
            json!({
                "appearance": ["wearing a blue robe, sitting upright"],
                "behaviors": [],
                "environment": [],
                "medical_indicators": ["visible tremor in left hand"],
            })
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = KnowledgeBase::new();
        once.merge(&sample_facts());
        let mut twice = once.clone();
        let added = twice.merge(&sample_facts());
        assert!(added.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_trims_before_novelty_check() {
        let mut base = KnowledgeBase::new();
        base.merge(&KnowledgeFacts {
            environment: "dim bedroom with a lamp".into(),
            ..Default::default()
        });
        let added = base.merge(&KnowledgeFacts {
            environment: "  dim bedroom with a lamp \n".into(),
            ..Default::default()
        });
        assert!(added.is_empty());
        assert_eq!(base.facts(KnowledgeCategory::Environment).len(), 1);
    }

    #[test]
    fn merge_appends_in_order() {
        let mut base = KnowledgeBase::new();
        for fact in ["first observation", "second observation"] {
            base.merge(&KnowledgeFacts {
                behaviors: fact.into(),
                ..Default::default()
            });
        }
        assert_eq!(
            base.facts(KnowledgeCategory::Behaviors),
            ["first observation", "second observation"]
        );
    }

    #[test]
    fn from_value_is_lenient_per_category() {
        let base = KnowledgeBase::from_value(&json!({
            "appearance": ["tall", "tall", 7, "grey hair"],
            "behaviors": "not a list",
            "unknown": ["ignored"],
        }));
        assert_eq!(base.facts(KnowledgeCategory::Appearance), ["tall", "tall", "7", "grey hair"]);
        assert!(base.facts(KnowledgeCategory::Behaviors).is_empty());
        assert!(base.facts(KnowledgeCategory::Environment).is_empty());
    }

    #[test]
    fn merge_never_drops_loaded_entries() {
        let mut base = KnowledgeBase::from_value(&json!({
            "appearance": ["grey hair", 42, "grey hair"],
        }));
        assert!(base.merge(&KnowledgeFacts::default()).is_empty());
        assert_eq!(
            base.to_value()["appearance"],
            json!(["grey hair", "42", "grey hair"])
        );

        // Novelty still applies to new candidates.
        let facts = KnowledgeFacts {
            appearance: "grey hair".into(),
            ..KnowledgeFacts::default()
        };
        assert!(base.merge(&facts).is_empty());
        assert_eq!(base.facts(KnowledgeCategory::Appearance).len(), 3);
    }

    #[test]
    fn from_value_non_object_is_empty() {
        assert!(KnowledgeBase::from_value(&json!([1, 2, 3])).is_empty());
        assert!(KnowledgeBase::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn store_merge_always_saves() {
        let mut store = MemoryKnowledge::default();
        let report = store.merge(&KnowledgeFacts::default());
        assert!(report.persisted);
        assert_eq!(report.facts_added(), 0);
        assert_eq!(store.saves, 1);
        assert!(store.load().is_empty());

        let report = store.merge(&sample_facts());
        assert_eq!(report.facts_added(), 2);
        assert_eq!(store.saves, 2);
    }
}
