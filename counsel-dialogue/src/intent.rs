//! Intent and domain classification
//!
//! Deterministic, word-boundary keyword classifiers used to seed question
//! generation and template fallback. Troubleshooting terms dominate, and
//! "research" outranks "learn" when both appear. Domain matching checks
//! whole words so substrings never leak across domains ("app" must not
//! match inside "appliance").

use std::collections::BTreeSet;

/// User intent behind the opening query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Purchase,
    Learning,
    Comparison,
    Research,
    Planning,
    Troubleshooting,
    General,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Intent::Purchase => "purchase",
            Intent::Learning => "learning",
            Intent::Comparison => "comparison",
            Intent::Research => "research",
            Intent::Planning => "planning",
            Intent::Troubleshooting => "troubleshooting",
            Intent::General => "general",
        };
        write!(f, "{}", label)
    }
}

/// Subject domain of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Technology,
    Health,
    Finance,
    Home,
    Travel,
    Education,
    Food,
    Other,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Domain::Technology => "technology",
            Domain::Health => "health",
            Domain::Finance => "finance",
            Domain::Home => "home",
            Domain::Travel => "travel",
            Domain::Education => "education",
            Domain::Food => "food",
            Domain::Other => "other",
        };
        write!(f, "{}", label)
    }
}

const TROUBLESHOOTING_TERMS: &[&str] = &[
    "won't", "wont", "broken", "error", "fix", "crash", "fails", "failing", "doesn't",
];
const RESEARCH_TERMS: &[&str] = &["research", "study", "analyze", "investigate"];
const COMPARISON_TERMS: &[&str] = &["compare", "vs", "versus", "difference", "better"];
const PURCHASE_TERMS: &[&str] = &["buy", "purchase", "cheap", "price", "afford", "need", "shopping"];
const LEARNING_TERMS: &[&str] = &["learn", "understand", "explain", "tutorial", "beginner"];
const PLANNING_TERMS: &[&str] = &["plan", "planning", "organize", "schedule", "prepare"];

/// Domains ordered most-specific first; technology last because its
/// vocabulary is the most generic.
const DOMAIN_TABLE: &[(Domain, &[&str])] = &[
    (
        Domain::Health,
        &["health", "medical", "doctor", "medicine", "fitness", "diet", "wellness", "symptom"],
    ),
    (
        Domain::Finance,
        &["money", "investment", "bank", "financial", "stock", "loan", "savings", "insurance"],
    ),
    (
        Domain::Home,
        &["home", "house", "furniture", "appliance", "garden", "kitchen", "room", "solar", "renovation"],
    ),
    (
        Domain::Travel,
        &["travel", "trip", "vacation", "flight", "hotel", "destination", "itinerary"],
    ),
    (
        Domain::Education,
        &["course", "school", "education", "training", "degree", "university", "curriculum"],
    ),
    (
        Domain::Food,
        &["food", "recipe", "restaurant", "cooking", "meal", "cuisine", "ingredient"],
    ),
    (
        Domain::Technology,
        &["computer", "software", "app", "tech", "digital", "programming", "code", "laptop", "phone", "gadget"],
    ),
];

/// Split a query into lowercase words; apostrophes stay inside words so
/// contractions like "won't" survive intact.
fn words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

fn contains_any(query_words: &[String], terms: &[&str]) -> bool {
    query_words.iter().any(|w| terms.contains(&w.as_str()))
}

/// Classify the intent of an opening query.
///
/// Precedence: troubleshooting on explicit failure terms, then research
/// (which wins over learning even when both appear), comparison, purchase,
/// learning, planning.
pub fn classify_intent(query: &str) -> Intent {
    let query_words = words(query);

    if contains_any(&query_words, TROUBLESHOOTING_TERMS) {
        Intent::Troubleshooting
    } else if contains_any(&query_words, RESEARCH_TERMS) {
        Intent::Research
    } else if contains_any(&query_words, COMPARISON_TERMS) {
        Intent::Comparison
    } else if contains_any(&query_words, PURCHASE_TERMS) {
        Intent::Purchase
    } else if contains_any(&query_words, LEARNING_TERMS) {
        Intent::Learning
    } else if contains_any(&query_words, PLANNING_TERMS) {
        Intent::Planning
    } else {
        Intent::General
    }
}

/// Classify the subject domain by whole-word keyword matching.
///
/// The domain with the most hits wins; ties resolve to the more specific
/// domain (earlier in the table).
pub fn classify_domain(query: &str) -> Domain {
    let query_words = words(query);

    let mut best = Domain::Other;
    let mut best_hits = 0usize;
    for (domain, terms) in DOMAIN_TABLE {
        let hits = query_words
            .iter()
            .filter(|w| terms.contains(&w.as_str()))
            .count();
        if hits > best_hits {
            best = *domain;
            best_hits = hits;
        }
    }

    best
}

/// Union of all domain vocabularies, used for relevance scoring.
pub fn all_domain_terms() -> BTreeSet<&'static str> {
    DOMAIN_TABLE
        .iter()
        .flat_map(|(_, terms)| terms.iter().copied())
        .collect()
}
