//! # Stack Overflow response handling
//!
//! The core of the tool, split in two:
//!
//! - [`response`]: deserializes the tool-response envelope, ranks candidate
//!   questions, and selects the best match
//! - [`format`]: turns the selected record into a Markdown document with
//!   deterministic section ordering and truncation
//!
//! Plus [`hints`], the static query-word → tag table that biases ranking.
//! All of it is pure; I/O lives in `mcp` and `session`.

pub mod format;
pub mod hints;
pub mod response;

pub use format::{format_number, format_question, format_search_results};
pub use hints::detect_tag_hints;
pub use response::{
    Answer, Envelope, Item, Owner, ParseError, Question, best_question,
    best_question_with_answers, extract_question_id, parse_answer, parse_search, sort_answers,
};
