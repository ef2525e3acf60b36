//! Document formatting: turns a selected question (and its answers) into a
//! Markdown document ready for the terminal renderer.
//!
//! Section order is fixed and output is a pure function of the input record:
//! title, meta line, tags, attribution, body, link, answers. Absent optional
//! fields are omitted rather than erroring, so a malformed-but-parseable
//! record still formats.

use chrono::{TimeZone, Utc};

use super::response::{Envelope, Question, sort_answers};

/// Builds the full question document, including up to `max_answers` embedded
/// answers (0, or more than available, means all).
pub fn format_question(q: &Question, max_answers: usize) -> String {
    let mut doc = String::new();

    doc.push_str(&format!("# {}\n\n", decode_entities(&q.title)));

    let mut meta = format!(
        "Score: **{}**  |  Views: **{}**  |  Answers: **{}**",
        q.score,
        format_number(q.view_count as i64),
        q.answer_count
    );
    if q.is_answered {
        meta.push_str("  |  ✅ Answered");
    }
    doc.push_str(&meta);
    doc.push_str("\n\n");

    if !q.tags.is_empty() {
        let tags: Vec<String> = q.tags.iter().map(|t| format!("`{t}`")).collect();
        doc.push_str(&tags.join("  "));
        doc.push_str("\n\n");
    }

    if !q.owner.display_name.is_empty() {
        doc.push_str(&format!("Asked by **{}**", decode_entities(&q.owner.display_name)));
        if let Some(date) = format_date(q.creation_date) {
            doc.push_str(&format!(" on {date}"));
        }
        doc.push_str("\n\n");
    }

    doc.push_str("---\n\n");
    doc.push_str(&decode_entities(&q.body_markdown));
    doc.push_str("\n\n");

    if !q.link.is_empty() {
        doc.push_str(&format!("🔗 {}\n\n", q.link));
    }

    if !q.answers.is_empty() {
        format_answer_section(&mut doc, q, max_answers);
    } else if q.answer_count > 0 && !q.link.is_empty() {
        // No answer bodies in this record (typical for get_content responses),
        // but the site has some: point the user there.
        doc.push_str("---\n\n");
        let word = if q.answer_count == 1 { "answer" } else { "answers" };
        doc.push_str(&format!(
            "📝 **{} {word}** available on Stack Overflow:\n{}\n",
            q.answer_count, q.link
        ));
    }

    doc
}

fn format_answer_section(doc: &mut String, q: &Question, max_answers: usize) {
    let answers = sort_answers(&q.answers);
    let shown = if max_answers == 0 || max_answers > answers.len() {
        answers.len()
    } else {
        max_answers
    };

    doc.push_str("---\n\n");
    doc.push_str(&format!("## Top {shown} Answer(s)\n\n"));

    for (i, answer) in answers.iter().take(shown).enumerate() {
        let mut label = format!("### Answer {}", i + 1);
        if answer.is_accepted {
            label.push_str("  ✅ Accepted");
        }
        if answer.score > 0 {
            label.push_str(&format!("  (Score: {})", answer.score));
        }
        doc.push_str(&label);
        doc.push_str("\n\n");

        if !answer.owner.display_name.is_empty() {
            doc.push_str(&format!("By **{}**\n\n", decode_entities(&answer.owner.display_name)));
        }

        doc.push_str(&decode_entities(&answer.body_markdown));
        doc.push_str("\n\n");

        if i < shown - 1 {
            doc.push_str("---\n\n");
        }
    }

    if answers.len() > shown {
        doc.push_str(&format!(
            "\n*({} more answers on Stack Overflow)*\n",
            answers.len() - shown
        ));
    }
}

/// Builds a numbered quick-pick list of search results, preserving envelope
/// order. Used when no single best match can be identified.
pub fn format_search_results(envelope: &Envelope<Question>, max_results: usize) -> String {
    if envelope.items.is_empty() {
        return "No results found.".to_string();
    }

    let mut doc = String::from("# Stack Overflow Search Results\n\n");

    let shown = if max_results == 0 || max_results > envelope.items.len() {
        envelope.items.len()
    } else {
        max_results
    };

    for (i, item) in envelope.items.iter().take(shown).enumerate() {
        let q = &item.data;
        let answered = if q.is_answered { " ✅" } else { "" };
        let tags = if q.tags.is_empty() {
            String::new()
        } else {
            let ts: Vec<String> = q.tags.iter().map(|t| format!("`{t}`")).collect();
            format!(" — {}", ts.join(" "))
        };
        doc.push_str(&format!(
            "{}. **{}**{}  \n   Score: {} | Answers: {}{}  \n   {}\n\n",
            i + 1,
            decode_entities(&q.title),
            answered,
            q.score,
            q.answer_count,
            tags,
            q.link
        ));
    }

    doc
}

/// Formats a timestamp (seconds since epoch) as e.g. "Nov 17, 2009".
/// Returns `None` for zero/negative timestamps.
pub fn format_date(timestamp: i64) -> Option<String> {
    if timestamp <= 0 {
        return None;
    }
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%b %-d, %Y").to_string())
}

/// Renders an integer with thousands separators (178410 → "178,410").
pub fn format_number(n: i64) -> String {
    if n < 0 {
        return format!("-{}", format_number(-n));
    }
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

// ============================================================================
// HTML Entity Decoding
// ============================================================================

/// Named entities Stack Overflow actually emits in `body_markdown` and
/// titles. Anything unrecognized is left verbatim.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("hellip", "…"),
    ("mdash", "—"),
    ("ndash", "–"),
    ("lsquo", "‘"),
    ("rsquo", "’"),
    ("ldquo", "“"),
    ("rdquo", "”"),
    ("times", "×"),
    ("copy", "©"),
    ("ge", "≥"),
    ("le", "≤"),
    ("rarr", "→"),
    ("larr", "←"),
    ("deg", "°"),
];

/// Decodes numeric (`&#39;`, `&#x27;`) and common named HTML entity
/// references to literal characters.
///
/// Single pass, so double-escaped text decodes one level per call
/// (`&amp;lt;` → `&lt;`), matching how the origin site escapes.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_one(tail, &mut out) {
            Some(consumed) => rest = &tail[consumed..],
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Tries to decode a single entity at the start of `text` (which begins with
/// `&`), appending the replacement to `out`. Returns the byte length
/// consumed, or `None` when the text is not a decodable entity (nothing is
/// appended).
fn decode_one(text: &str, out: &mut String) -> Option<usize> {
    let semi = text[1..].find(';').map(|i| i + 1)?;
    if semi > 10 {
        return None; // too long to be an entity
    }
    let name = &text[1..semi];

    if let Some(rest) = name.strip_prefix('#') {
        let code = if let Some(hex) = rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            rest.parse::<u32>().ok()?
        };
        // Any valid scalar value decodes; surrogates and out-of-range
        // codepoints are left verbatim.
        out.push(char::from_u32(code)?);
        return Some(semi + 1);
    }

    let (_, replacement) = NAMED_ENTITIES.iter().find(|(n, _)| *n == name)?;
    out.push_str(replacement);
    Some(semi + 1)
}
