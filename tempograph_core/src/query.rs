//! Query strategy heuristics and the transformation record.
//!
//! A natural-language query is turned into a retrieval plan in two steps:
//! pick a strategy (entity-filter vs. open semantic search) and extract the
//! probable entity names a filter would anchor on. Both steps are cheap text
//! heuristics; the language model is only consulted for optional query
//! enhancement, which lives in the engine.
//!
//! Every search response carries a [`Transformation`] record explaining what
//! was decided and why, so strategy selection is auditable rather than a
//! black box.

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Retrieval strategy for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Anchor retrieval on resolved entities, then rank their neighborhood.
    EntityFilter,
    /// Rank the partition's whole current fact set.
    SemanticSearch,
}

/// Record of how a query was transformed before retrieval. Part of the
/// search response contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformation {
    /// Query as submitted.
    pub original_query: String,
    /// Query actually used for retrieval (equals the original unless
    /// enhancement ran and succeeded).
    pub rewritten_query: String,
    /// Whether language-model enhancement changed the query.
    pub query_was_enhanced: bool,
    /// Strategy that was ultimately executed.
    pub strategy: Strategy,
    /// Whether the strategy came from heuristics rather than a caller
    /// override.
    pub auto_detected: bool,
    /// Human-readable explanation of the strategy choice.
    pub reason: String,
    /// Entity names the heuristics pulled out of the query.
    pub detected_entities: Vec<String>,
    /// Detected names that resolved to stored entities in the partition.
    pub resolved_entity_ids: Vec<EntityId>,
    /// Whether an entity-filter plan fell back to semantic search because
    /// nothing resolved.
    pub fell_back: bool,
}

/// Generic question openings that signal recall-style queries better served
/// by open semantic search.
const QUESTION_PATTERNS: &[&str] = &[
    "what car",
    "what vehicle",
    "when is",
    "where is",
    "how much",
    "do you have",
    "can i",
    "tell me about",
];

/// Question words, function words, and generic verbs that are never entity
/// names.
const STOP_WORDS: &[&str] = &[
    "what", "where", "when", "who", "how", "why", "which", "is", "are", "was", "were", "be",
    "been", "being", "the", "a", "an", "and", "or", "but", "in", "at", "to", "for", "of", "on",
    "with", "his", "her", "their", "my", "your", "its", "working", "work", "works", "role", "job",
    "position", "title", "left", "departure", "purchase", "buy", "service", "maintenance",
];

fn strip_punctuation(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Capitalized words beyond the first word of the query. Sentence-initial
/// capitalization carries no signal.
fn capitalized_word_count(query: &str) -> usize {
    query
        .split_whitespace()
        .enumerate()
        .filter(|(i, word)| {
            let clean = strip_punctuation(word);
            *i > 0 && clean.len() > 1 && clean.chars().next().is_some_and(char::is_uppercase)
        })
        .count()
}

/// Decide whether a query should anchor on entities.
///
/// Two or more mid-sentence capitalized words read as entity names and win
/// outright; a generic question pattern forces semantic search; otherwise a
/// single capitalized word is enough to try the filter.
pub fn should_use_entity_filter(query: &str) -> bool {
    let capitalized = capitalized_word_count(query);
    if capitalized >= 2 {
        return true;
    }
    let lower = query.to_lowercase();
    if QUESTION_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    capitalized >= 1
}

/// Explain a strategy choice in terms a caller can act on.
pub fn strategy_reason(query: &str, use_entity_filter: bool) -> String {
    let capitalized = capitalized_word_count(query);
    if use_entity_filter {
        match capitalized {
            0 => "manual override -> entity filter".to_string(),
            1 => "found 1 entity name -> use entity filter for precision".to_string(),
            n => format!("found {n} entity names (capitalized words) -> use entity filter for precision"),
        }
    } else {
        let lower = query.to_lowercase();
        if let Some(pattern) = QUESTION_PATTERNS.iter().find(|p| lower.contains(*p)) {
            return format!(
                "generic question pattern '{pattern}' detected -> use semantic search for recall"
            );
        }
        if capitalized == 0 {
            "no entity names found -> use semantic search for recall".to_string()
        } else {
            "manual override -> semantic search".to_string()
        }
    }
}

/// Extract probable entity names from a query.
///
/// Lenient on purpose: any non-stop-word that is capitalized or longer than
/// two characters is kept, normalized to leading-uppercase. Resolution
/// against the store decides what is real.
pub fn extract_entity_names(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter_map(|word| {
            let clean = strip_punctuation(word);
            if clean.is_empty() || STOP_WORDS.contains(&clean.to_lowercase().as_str()) {
                return None;
            }
            let starts_upper = clean.chars().next().is_some_and(char::is_uppercase);
            if starts_upper || clean.len() > 2 {
                let mut chars = clean.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>()
                        + &chars.as_str().to_lowercase(),
                    None => return None,
                };
                Some(capitalized)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_capitalized_words_choose_entity_filter() {
        assert!(should_use_entity_filter("What happened to David Chen?"));
        assert!(should_use_entity_filter("Did Sarah Martinez meet John Anderson"));
    }

    #[test]
    fn test_question_pattern_forces_semantic_search() {
        assert!(!should_use_entity_filter("What car should I consider?"));
        assert!(!should_use_entity_filter("when is my next appointment"));
        assert!(!should_use_entity_filter("Tell me about the warranty"));
    }

    #[test]
    fn test_single_capitalized_word_is_enough() {
        assert!(should_use_entity_filter("what happened to Acme"));
    }

    #[test]
    fn test_sentence_initial_capital_carries_no_signal() {
        assert!(!should_use_entity_filter("Something went wrong yesterday"));
    }

    #[test]
    fn test_strategy_reason_counts_names() {
        let reason = strategy_reason("What happened to David Chen?", true);
        assert!(reason.contains("2 entity names"), "got: {reason}");
        let reason = strategy_reason("what about Acme", true);
        assert!(reason.contains("1 entity name"), "got: {reason}");
        let reason = strategy_reason("plain lowercase query", false);
        assert!(reason.contains("no entity names"), "got: {reason}");
        let reason = strategy_reason("What car did he buy", false);
        assert!(reason.contains("what car"), "got: {reason}");
    }

    #[test]
    fn test_strategy_reason_manual_overrides() {
        assert!(strategy_reason("lowercase only", true).contains("manual override"));
        assert!(strategy_reason("ask about David Chen", false).contains("manual override"));
    }

    #[test]
    fn test_extract_entity_names_drops_stop_words() {
        let names = extract_entity_names("What happened to David Chen?");
        assert_eq!(names, vec!["Happened", "David", "Chen"]);
    }

    #[test]
    fn test_extract_entity_names_strips_punctuation_and_normalizes() {
        let names = extract_entity_names("who is sarah at TechVision?");
        assert_eq!(names, vec!["Sarah", "Techvision"]);
    }

    #[test]
    fn test_extract_entity_names_empty_query() {
        assert!(extract_entity_names("").is_empty());
        assert!(extract_entity_names("what is the").is_empty());
    }

    #[test]
    fn test_transformation_serializes_strategy_snake_case() {
        let t = Transformation {
            original_query: "q".into(),
            rewritten_query: "q".into(),
            query_was_enhanced: false,
            strategy: Strategy::EntityFilter,
            auto_detected: true,
            reason: "r".into(),
            detected_entities: vec![],
            resolved_entity_ids: vec![],
            fell_back: false,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["strategy"], "entity_filter");
    }
}
