//! # Search session
//!
//! Drives queries end to end: call the `so_search` tool, pick the best
//! question, fetch the accepted answer body when it isn't embedded, format
//! as Markdown, and render to the terminal. Also hosts the interactive
//! prompt loop used when no query is given on the command line.

use std::io::Write;
use std::time::Duration;

use crossterm::style::Stylize;
use log::{debug, info, warn};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ResolvedConfig;
use crate::mcp::{ToolClient, ToolError};
use crate::render::{self, RenderOptions};
use crate::stack::{
    Answer, Envelope, Question, best_question, best_question_with_answers, detect_tag_hints,
    format_question, format_search_results, parse_answer, parse_search,
};

/// Words that end the interactive loop.
const EXIT_WORDS: &[&str] = &["quit", "exit", "q"];

// ============================================================================
// Document Building (pure of terminal concerns, exercised by tests)
// ============================================================================

/// Per-query knobs, collapsed from [`ResolvedConfig`] and CLI flags.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Answers shown per question. 0 = show all.
    pub max_answers: usize,
    /// Rows shown in list mode.
    pub max_results: usize,
    /// Skip best-question selection and list everything.
    pub list: bool,
    /// Deadline for each tool call.
    pub call_timeout: Duration,
}

impl QueryOptions {
    pub fn from_config(config: &ResolvedConfig, list: bool) -> Self {
        Self {
            max_answers: config.max_answers,
            max_results: config.max_results,
            list,
            call_timeout: config.call_timeout,
        }
    }
}

/// Runs one query against the server and returns the Markdown document.
///
/// Malformed search payloads degrade to an empty result set; only transport
/// and tool failures surface as errors.
pub async fn build_document(
    client: &mut ToolClient,
    query: &str,
    opts: &QueryOptions,
) -> Result<String, ToolError> {
    let text = client
        .call_tool("so_search", json!({ "query": query }), opts.call_timeout)
        .await?;

    let envelope: Envelope<Question> = match parse_search(&text) {
        Ok(env) => env,
        Err(e) => {
            warn!("Unparseable search payload, treating as no results: {e}");
            Envelope::default()
        }
    };
    debug!(
        "Search returned {} item(s), {} error marker(s)",
        envelope.items.len(),
        envelope.errors.len()
    );

    if opts.list {
        return Ok(format_search_results(&envelope, opts.max_results));
    }

    let hints = detect_tag_hints(query);
    if !hints.is_empty() {
        debug!("Tag hints from query: {hints:?}");
    }

    // Prefer a question that already carries answer bodies. Otherwise fall
    // back to the best question overall and fetch its accepted answer.
    if let Some(q) = best_question_with_answers(&envelope, &hints) {
        info!("Selected question {} with embedded answers", q.question_id);
        return Ok(format_question(q, opts.max_answers));
    }

    if let Some(q) = best_question(&envelope, &hints) {
        info!("Selected question {} without embedded answers", q.question_id);
        let mut question = q.clone();
        if question.accepted_answer_id > 0
            && let Some(answer) =
                fetch_accepted_answer(client, question.accepted_answer_id, opts.call_timeout).await
        {
            question.answers.push(answer);
        }
        return Ok(format_question(&question, opts.max_answers));
    }

    Ok(format_search_results(&envelope, opts.max_results))
}

/// Fetches the accepted answer body via `get_content`.
///
/// Best effort: any failure is logged and the caller renders the question
/// without the body.
async fn fetch_accepted_answer(
    client: &mut ToolClient,
    answer_id: u64,
    call_timeout: Duration,
) -> Option<Answer> {
    let id = format!("SO_A{answer_id}");
    let text = match client
        .call_tool("get_content", json!({ "query": id }), call_timeout)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!("Accepted answer fetch failed for {id}: {e}");
            return None;
        }
    };

    let envelope = match parse_answer(&text) {
        Ok(env) => env,
        Err(e) => {
            warn!("Unparseable answer payload for {id}: {e}");
            return None;
        }
    };

    envelope.items.into_iter().next().map(|item| {
        let mut answer = item.data;
        // Fetched by accepted-answer id, so mark it regardless of what the
        // payload claims.
        answer.is_accepted = true;
        answer
    })
}

// ============================================================================
// Interactive Session
// ============================================================================

pub struct Session {
    client: ToolClient,
    config: ResolvedConfig,
}

impl Session {
    /// Connects to the configured MCP server, reporting progress on stdout.
    pub async fn connect(config: ResolvedConfig) -> Result<Self, ToolError> {
        if config.color {
            println!("{}", "⚡ soq — Stack Overflow in your terminal".bold());
        } else {
            println!("⚡ soq — Stack Overflow in your terminal");
        }
        status(&config, "⏳ Connecting to Stack Overflow MCP server...");
        status(
            &config,
            "  (first run may open a browser for Stack Overflow login)",
        );

        let client = match ToolClient::connect(
            &config.server_command,
            &config.server_args,
            config.connect_timeout,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                print_error(&config, &format!("Failed to connect: {e}"));
                if e.is_command_not_found() {
                    print_error(
                        &config,
                        &format!(
                            "'{}' was not found on PATH. The default server bridge \
                             requires Node.js; install it from https://nodejs.org/",
                            config.server_command
                        ),
                    );
                }
                return Err(e);
            }
        };

        if config.color {
            println!("{}\n", "✅ Connected!".green().bold());
        } else {
            println!("✅ Connected!\n");
        }
        Ok(Self { client, config })
    }

    /// Answers a single query and prints the rendered document.
    pub async fn answer(&mut self, query: &str, list: bool) {
        status(&self.config, &format!("🔍 Searching for: {query:?}\n"));
        let opts = QueryOptions::from_config(&self.config, list);
        match build_document(&mut self.client, query, &opts).await {
            Ok(doc) => {
                let render_opts = RenderOptions {
                    color: self.config.color,
                    width: self.config.width,
                };
                println!("{}", render::render(&doc, &render_opts));
            }
            Err(e) => print_error(&self.config, &format!("Query failed: {e}")),
        }
    }

    /// Prompt loop. Ends on EOF or an exit word.
    pub async fn repl(&mut self, list: bool) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt(&self.config)?;
            let Some(line) = lines.next_line().await? else {
                break; // EOF
            };
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
                break;
            }
            self.answer(query, list).await;
            println!();
        }
        status(&self.config, "\n👋 Goodbye!");
        Ok(())
    }
}

// ============================================================================
// Terminal Output Helpers
// ============================================================================

fn prompt(config: &ResolvedConfig) -> std::io::Result<()> {
    if config.color {
        print!("{} ", "❓ Ask:".bold().cyan());
    } else {
        print!("❓ Ask: ");
    }
    std::io::stdout().flush()
}

fn status(config: &ResolvedConfig, message: &str) {
    if config.color {
        println!("{}", message.dark_grey());
    } else {
        println!("{message}");
    }
}

fn print_error(config: &ResolvedConfig, message: &str) {
    if config.color {
        eprintln!("{}", message.red());
    } else {
        eprintln!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use serde_json::{Value, json};

    fn opts() -> QueryOptions {
        QueryOptions {
            max_answers: 3,
            max_results: 10,
            list: false,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn tool_text(payload: &Value) -> Value {
        json!({
            "content": [{ "type": "text", "text": payload.to_string() }],
            "isError": false
        })
    }

    fn question_json(id: u64, title: &str, score: i64) -> Value {
        json!({
            "Site": "stackoverflow",
            "Type": "Question",
            "Id": format!("SO_Q{id}"),
            "Data": {
                "question_id": id,
                "title": title,
                "score": score,
                "is_answered": true,
                "view_count": 100,
                "answer_count": 1,
                "tags": ["rust"],
                "link": format!("https://stackoverflow.com/q/{id}"),
            }
        })
    }

    async fn build(transport: MockTransport, query: &str, opts: &QueryOptions) -> Result<String, ToolError> {
        let mut client = ToolClient::with_transport(Box::new(transport));
        build_document(&mut client, query, opts).await
    }

    #[tokio::test]
    async fn test_build_document_renders_best_question() {
        let payload = json!({
            "Items": [
                question_json(1, "Lower scored", 2),
                question_json(2, "Higher scored", 9),
            ],
            "Errors": []
        });
        let transport = MockTransport::new(vec![Ok(tool_text(&payload))]);
        let doc = build(transport, "rust borrow checker", &opts()).await.unwrap();
        assert!(doc.starts_with("# Higher scored"));
    }

    #[tokio::test]
    async fn test_build_document_garbage_payload_degrades_to_no_results() {
        let transport = MockTransport::new(vec![Ok(json!({
            "content": [{ "type": "text", "text": "definitely not json" }],
            "isError": false
        }))]);
        let doc = build(transport, "anything", &opts()).await.unwrap();
        assert_eq!(doc, "No results found.");
    }

    #[tokio::test]
    async fn test_build_document_list_mode_skips_selection() {
        let payload = json!({
            "Items": [question_json(1, "Only question", 5)],
            "Errors": []
        });
        let transport = MockTransport::new(vec![Ok(tool_text(&payload))]);
        let mut list_opts = opts();
        list_opts.list = true;
        let doc = build(transport, "rust", &list_opts).await.unwrap();
        assert!(doc.starts_with("# Stack Overflow Search Results"));
        assert!(doc.contains("Only question"));
    }

    #[tokio::test]
    async fn test_build_document_fetches_accepted_answer() {
        let mut question = question_json(7, "Needs a body", 5);
        question["Data"]["accepted_answer_id"] = json!(42);
        let search_payload = json!({ "Items": [question], "Errors": [] });

        let answer_payload = json!({
            "Items": [{
                "Site": "stackoverflow",
                "Type": "Answer",
                "Id": "SO_A42",
                "Data": {
                    "answer_id": 42,
                    "score": 12,
                    "body_markdown": "Use `Rc<RefCell<T>>`.",
                }
            }],
            "Errors": []
        });

        let transport = MockTransport::new(vec![
            Ok(tool_text(&search_payload)),
            Ok(tool_text(&answer_payload)),
        ]);
        let log = transport.log();
        let doc = build(transport, "rust shared ownership", &opts()).await.unwrap();

        let calls = log.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1["name"], "get_content");
        assert_eq!(calls[1].1["arguments"]["query"], "SO_A42");
        drop(calls);

        assert!(doc.contains("Use `Rc<RefCell<T>>`."));
        assert!(doc.contains("✅ Accepted"));
    }

    #[tokio::test]
    async fn test_build_document_answer_fetch_failure_is_swallowed() {
        let mut question = question_json(7, "Needs a body", 5);
        question["Data"]["accepted_answer_id"] = json!(42);
        let search_payload = json!({ "Items": [question], "Errors": [] });

        let transport = MockTransport::new(vec![
            Ok(tool_text(&search_payload)),
            Err(crate::mcp::TransportError::Closed),
        ]);
        let doc = build(transport, "rust", &opts()).await.unwrap();
        assert!(doc.starts_with("# Needs a body"));
    }

    #[tokio::test]
    async fn test_build_document_propagates_search_failure() {
        let transport = MockTransport::new(vec![Err(crate::mcp::TransportError::Closed)]);
        let err = build(transport, "rust", &opts()).await.unwrap_err();
        assert!(matches!(err, ToolError::Connect(_) | ToolError::Call(_)));
    }
}
