//! Response interpretation for the Stack Overflow MCP tools.
//!
//! Both `so_search` and `get_content` return the same envelope shape:
//!
//! ```text
//! {
//!   "Items": [
//!     { "Site": "Stack Overflow", "Type": "Question", "Id": "1752414", "Data": { ... } }
//!   ],
//!   "Errors": []
//! }
//! ```
//!
//! `Data` carries the question (or answer) payload. Search results embed an
//! `answers` sub-array inside each question's `Data`; `get_content` responses
//! usually do not. Everything in this module is a pure function over parsed
//! input, and selection and ordering are deterministic so the same response
//! always formats the same way.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

// ============================================================================
// Wire Types
// ============================================================================

/// Top-level envelope returned by every tool call.
///
/// Generic over the payload: the search path reads `Envelope<Question>`, the
/// accepted-answer fetch reads `Envelope<Answer>`.
#[derive(Debug, Default, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de> + Default"))]
pub struct Envelope<T> {
    #[serde(rename = "Items", default)]
    pub items: Vec<Item<T>>,
    /// Error markers from the server. Shape is opaque to us.
    #[serde(rename = "Errors", default)]
    pub errors: Vec<serde_json::Value>,
}

/// A single result item inside the envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de> + Default"))]
pub struct Item<T> {
    #[serde(rename = "Site", default)]
    pub site: String,
    #[serde(rename = "Type", default)]
    pub item_type: String,
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Data", default)]
    pub data: T,
}

/// Question payload. Every field defaults: a missing field is an empty
/// value, never a parse failure.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub answer_count: u32,
    #[serde(default)]
    pub score: i64,
    /// 0 means no accepted answer.
    #[serde(default)]
    pub accepted_answer_id: u64,
    #[serde(default)]
    pub creation_date: i64,
    #[serde(default)]
    pub last_activity_date: i64,
    #[serde(default)]
    pub question_id: u64,
    #[serde(default)]
    pub body_markdown: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    /// Embedded in `so_search` results; empty for `get_content` responses
    /// even when answers exist on the site (`answer_count` still reports them).
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// Answer payload, either embedded in a question or fetched via
/// `get_content "SO_A<id>"`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Answer {
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub last_activity_date: i64,
    #[serde(default)]
    pub answer_id: u64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub body_markdown: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
}

/// Author information.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub link: String,
}

// ============================================================================
// Error Type
// ============================================================================

/// The response text was not a well-formed envelope.
#[derive(Debug)]
pub struct ParseError(serde_json::Error);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed response: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// Parsing
// ============================================================================

/// Deserializes an envelope from tool response text.
///
/// Unknown fields are ignored for forward compatibility; missing fields
/// (including the `Items` array itself) become empty values. Only text
/// that is not a JSON object at all is an error.
pub fn parse_envelope<T>(text: &str) -> Result<Envelope<T>, ParseError>
where
    T: DeserializeOwned + Default,
{
    serde_json::from_str(text).map_err(ParseError)
}

/// Parses a `so_search` response.
pub fn parse_search(text: &str) -> Result<Envelope<Question>, ParseError> {
    parse_envelope(text)
}

/// Parses a `get_content "SO_A<id>"` response.
pub fn parse_answer(text: &str) -> Result<Envelope<Answer>, ParseError> {
    parse_envelope(text)
}

// ============================================================================
// Selection
// ============================================================================

/// Returns the highest-ranked question from the envelope.
///
/// Items whose `Type` is set to something other than `"Question"` are
/// excluded (an unset `Type` counts as a question). When `tag_hints` is
/// non-empty the candidates are first restricted to questions whose tags
/// intersect the hints, case-insensitively; if that restriction leaves
/// nothing, the hints are ignored rather than returning no result.
///
/// Ranking: score descending, ties broken by view count descending. The
/// sort is stable, so equal candidates keep their envelope order.
pub fn best_question<'a>(
    envelope: &'a Envelope<Question>,
    tag_hints: &[String],
) -> Option<&'a Question> {
    select(envelope, tag_hints, false)
}

/// Like [`best_question`], but candidates must carry at least one embedded
/// answer. Used as a preferred first pass: a question with inline answer
/// bodies can be displayed without a second fetch.
pub fn best_question_with_answers<'a>(
    envelope: &'a Envelope<Question>,
    tag_hints: &[String],
) -> Option<&'a Question> {
    select(envelope, tag_hints, true)
}

fn select<'a>(
    envelope: &'a Envelope<Question>,
    tag_hints: &[String],
    require_answers: bool,
) -> Option<&'a Question> {
    let mut candidates: Vec<&Question> = envelope
        .items
        .iter()
        .filter(|item| item.item_type.is_empty() || item.item_type == "Question")
        .map(|item| &item.data)
        .filter(|q| !require_answers || !q.answers.is_empty())
        .collect();

    if candidates.is_empty() {
        return None;
    }

    if !tag_hints.is_empty() {
        let matching: Vec<&Question> = candidates
            .iter()
            .copied()
            .filter(|q| {
                q.tags
                    .iter()
                    .any(|t| tag_hints.iter().any(|h| h.eq_ignore_ascii_case(t)))
            })
            .collect();
        // Fallback-safe: an empty intersection means the hints are dropped,
        // never that the search comes back empty.
        if !matching.is_empty() {
            candidates = matching;
        }
    }

    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(b.view_count.cmp(&a.view_count)));
    candidates.first().copied()
}

/// Orders answers for display: accepted first, then score descending.
/// Stable on ties so formatting stays deterministic.
pub fn sort_answers(answers: &[Answer]) -> Vec<Answer> {
    let mut sorted = answers.to_vec();
    sorted.sort_by(|a, b| b.is_accepted.cmp(&a.is_accepted).then(b.score.cmp(&a.score)));
    sorted
}

// ============================================================================
// Question ID Extraction
// ============================================================================

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    // Priority order matters: the explicit SO_Q token wins over URL forms,
    // which win over the loose "question: NNNNN" phrasing.
    [
        r"SO_Q(\d+)",
        r"/questions/(\d+)",
        r"stackoverflow\.com/q/(\d+)",
        r"(?i)question\s*(?:id)?[:\s]+(\d{5,})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Scans free text for a Stack Overflow question ID.
///
/// Best-effort: the server's output format is not a contract, so this
/// returns the first digit group from the first matching pattern and `None`
/// when nothing matches.
pub fn extract_question_id(text: &str) -> Option<String> {
    for re in ID_PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            return Some(caps[1].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(score: i64, view_count: u64, tags: &[&str]) -> Question {
        Question {
            score,
            view_count,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn envelope_of(questions: Vec<Question>) -> Envelope<Question> {
        Envelope {
            items: questions
                .into_iter()
                .enumerate()
                .map(|(i, q)| Item {
                    site: "Stack Overflow".to_string(),
                    item_type: "Question".to_string(),
                    id: i.to_string(),
                    data: q,
                })
                .collect(),
            errors: vec![],
        }
    }

    fn hints(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_full_envelope() {
        let text = r#"{
            "Items": [{
                "Site": "Stack Overflow",
                "Type": "Question",
                "Id": "1752414",
                "Data": {
                    "tags": ["go", "string"],
                    "owner": {"display_name": "gopher", "link": "https://example.com/u/1"},
                    "is_answered": true,
                    "view_count": 178410,
                    "answer_count": 2,
                    "score": 42,
                    "accepted_answer_id": 1752241,
                    "creation_date": 1258400000,
                    "question_id": 1752414,
                    "body_markdown": "How do I reverse a string?",
                    "link": "https://stackoverflow.com/q/1752414",
                    "title": "How to reverse a string in Go?",
                    "answers": [{
                        "owner": {"display_name": "ferris"},
                        "is_accepted": true,
                        "answer_id": 1752241,
                        "score": 55,
                        "body_markdown": "Use runes."
                    }]
                }
            }],
            "Errors": []
        }"#;
        let envelope = parse_search(text).unwrap();
        assert_eq!(envelope.items.len(), 1);
        let q = &envelope.items[0].data;
        assert_eq!(q.title, "How to reverse a string in Go?");
        assert_eq!(q.score, 42);
        assert_eq!(q.view_count, 178410);
        assert_eq!(q.accepted_answer_id, 1752241);
        assert_eq!(q.answers.len(), 1);
        assert!(q.answers[0].is_accepted);
    }

    #[test]
    fn test_parse_missing_payload_fields_default() {
        let text = r#"{"Items": [{"Data": {"title": "sparse"}}], "Errors": []}"#;
        let envelope = parse_search(text).unwrap();
        let q = &envelope.items[0].data;
        assert_eq!(q.title, "sparse");
        assert_eq!(q.score, 0);
        assert_eq!(q.accepted_answer_id, 0);
        assert!(q.tags.is_empty());
        assert!(q.answers.is_empty());
        assert!(envelope.items[0].item_type.is_empty());
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let text = r#"{"Items": [], "Errors": [], "NextPage": 2}"#;
        assert!(parse_search(text).is_ok());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_search("not json at all").is_err());
    }

    #[test]
    fn test_parse_missing_items_yields_empty_envelope() {
        let envelope = parse_search(r#"{"Errors": []}"#).unwrap();
        assert!(envelope.items.is_empty());
    }

    // ── Selection ───────────────────────────────────────────────────────

    #[test]
    fn test_best_question_picks_highest_score() {
        let envelope = envelope_of(vec![
            question(3, 100, &[]),
            question(9, 50, &[]),
            question(5, 999, &[]),
        ]);
        let best = best_question(&envelope, &[]).unwrap();
        assert_eq!(best.score, 9);
    }

    #[test]
    fn test_best_question_ties_broken_by_views() {
        let envelope = envelope_of(vec![
            question(5, 100, &[]),
            question(5, 5000, &[]),
            question(5, 300, &[]),
        ]);
        let best = best_question(&envelope, &[]).unwrap();
        assert_eq!(best.view_count, 5000);
    }

    #[test]
    fn test_best_question_stable_on_full_tie() {
        let mut first = question(5, 100, &["a"]);
        first.title = "first".to_string();
        let mut second = question(5, 100, &["b"]);
        second.title = "second".to_string();
        let envelope = envelope_of(vec![first, second]);
        let best = best_question(&envelope, &[]).unwrap();
        assert_eq!(best.title, "first");
    }

    #[test]
    fn test_best_question_skips_non_question_items() {
        let mut envelope = envelope_of(vec![question(100, 0, &[])]);
        envelope.items[0].item_type = "Article".to_string();
        assert!(best_question(&envelope, &[]).is_none());
    }

    #[test]
    fn test_best_question_accepts_untyped_items() {
        let mut envelope = envelope_of(vec![question(1, 0, &[])]);
        envelope.items[0].item_type = String::new();
        assert!(best_question(&envelope, &[]).is_some());
    }

    #[test]
    fn test_best_question_empty_envelope() {
        let envelope = envelope_of(vec![]);
        assert!(best_question(&envelope, &[]).is_none());
    }

    #[test]
    fn test_tag_hints_prefer_matching_question() {
        let envelope = envelope_of(vec![
            question(90, 0, &["python"]),
            question(10, 0, &["rust"]),
        ]);
        let best = best_question(&envelope, &hints(&["rust"])).unwrap();
        assert_eq!(best.score, 10);
    }

    #[test]
    fn test_tag_hints_case_insensitive() {
        let envelope = envelope_of(vec![
            question(90, 0, &["python"]),
            question(10, 0, &["Rust"]),
        ]);
        let best = best_question(&envelope, &hints(&["rust"])).unwrap();
        assert_eq!(best.score, 10);
    }

    #[test]
    fn test_tag_hints_fall_back_when_nothing_matches() {
        let envelope = envelope_of(vec![
            question(90, 0, &["python"]),
            question(10, 0, &["go"]),
        ]);
        let with_hints = best_question(&envelope, &hints(&["haskell"])).unwrap();
        let without = best_question(&envelope, &[]).unwrap();
        assert_eq!(with_hints.score, without.score);
        assert_eq!(with_hints.score, 90);
    }

    #[test]
    fn test_best_with_answers_requires_embedded_answers() {
        let mut high = question(90, 0, &[]);
        high.answer_count = 4; // answer_count > 0 is not enough
        let mut low = question(10, 0, &[]);
        low.answers.push(Answer::default());
        let envelope = envelope_of(vec![high, low]);

        let best = best_question_with_answers(&envelope, &[]).unwrap();
        assert_eq!(best.score, 10);
        // Plain selection still prefers the higher score.
        assert_eq!(best_question(&envelope, &[]).unwrap().score, 90);
    }

    #[test]
    fn test_best_with_answers_none_when_no_candidate_qualifies() {
        let envelope = envelope_of(vec![question(90, 0, &[])]);
        assert!(best_question_with_answers(&envelope, &[]).is_none());
    }

    // ── Answer ordering ─────────────────────────────────────────────────

    #[test]
    fn test_sort_answers_accepted_first_then_score() {
        let answers = vec![
            Answer { score: 5, ..Default::default() },
            Answer { is_accepted: true, score: 1, ..Default::default() },
            Answer { score: 9, ..Default::default() },
        ];
        let sorted = sort_answers(&answers);
        assert!(sorted[0].is_accepted);
        assert_eq!(sorted[0].score, 1);
        assert_eq!(sorted[1].score, 9);
        assert_eq!(sorted[2].score, 5);
    }

    #[test]
    fn test_sort_answers_does_not_mutate_input() {
        let answers = vec![
            Answer { score: 1, ..Default::default() },
            Answer { score: 9, ..Default::default() },
        ];
        let _ = sort_answers(&answers);
        assert_eq!(answers[0].score, 1);
    }

    // ── ID extraction ───────────────────────────────────────────────────

    #[test]
    fn test_extract_id_from_marker_token() {
        assert_eq!(
            extract_question_id("see SO_Q1752414 for details").as_deref(),
            Some("1752414")
        );
    }

    #[test]
    fn test_extract_id_marker_beats_loose_phrase() {
        let text = "question: 55555 ... token SO_Q1752414";
        assert_eq!(extract_question_id(text).as_deref(), Some("1752414"));
    }

    #[test]
    fn test_extract_id_from_question_url() {
        let text = "https://stackoverflow.com/questions/1752414/how-to";
        assert_eq!(extract_question_id(text).as_deref(), Some("1752414"));
    }

    #[test]
    fn test_extract_id_from_short_url() {
        let text = "see stackoverflow.com/q/1752414";
        assert_eq!(extract_question_id(text).as_deref(), Some("1752414"));
    }

    #[test]
    fn test_extract_id_loose_phrase_needs_five_digits() {
        assert_eq!(extract_question_id("Question ID: 98765").as_deref(), Some("98765"));
        assert!(extract_question_id("question: 123").is_none());
    }

    #[test]
    fn test_extract_id_none_when_nothing_matches() {
        assert!(extract_question_id("no identifiers here").is_none());
    }
}
