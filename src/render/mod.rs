//! Markdown → ANSI terminal renderer.
//!
//! Thin wrapper around `pulldown_cmark` that converts markdown events into
//! styled terminal lines. Headings, bold, italic, inline code, fenced code
//! blocks (with syntect highlighting), lists, blockquotes, links, and rules.
//!
//! Styling is driven entirely by the [`RenderOptions`] value passed per call;
//! there is no process-wide theme. With `color: false` the output is plain
//! wrapped text suitable for pipes.

use std::sync::LazyLock;

use crossterm::style::{Color, Stylize};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const ANSI_RESET: &str = "\x1b[0m";

/// Rendering configuration, passed explicitly to [`render`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Emit ANSI styling. Off = plain wrapped text.
    pub color: bool,
    /// Target line width for paragraph wrapping.
    pub width: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { color: true, width: 100 }
    }
}

/// Renders a markdown document to a terminal-ready string.
pub fn render(markdown: &str, opts: &RenderOptions) -> String {
    let mut cmark_opts = Options::empty();
    cmark_opts.insert(Options::ENABLE_STRIKETHROUGH);
    cmark_opts.insert(Options::ENABLE_TASKLISTS);

    let mut w = Writer::new(opts);
    for event in Parser::new_ext(markdown, cmark_opts) {
        w.handle(event);
    }
    w.finish()
}

// ── Style ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
    dim: bool,
    crossed: bool,
    fg: Option<Color>,
    bg: Option<Color>,
}

impl Style {
    fn bold() -> Self {
        Style { bold: true, ..Default::default() }
    }

    fn fg(color: Color) -> Self {
        Style { fg: Some(color), ..Default::default() }
    }

    /// Overlay another style on top of this one. Flags accumulate, colors
    /// are replaced when the overlay sets them.
    fn patch(mut self, overlay: Style) -> Self {
        self.bold |= overlay.bold;
        self.italic |= overlay.italic;
        self.underline |= overlay.underline;
        self.dim |= overlay.dim;
        self.crossed |= overlay.crossed;
        if overlay.fg.is_some() {
            self.fg = overlay.fg;
        }
        if overlay.bg.is_some() {
            self.bg = overlay.bg;
        }
        self
    }

    fn paint(&self, text: &str, color: bool) -> String {
        if !color || *self == Style::default() || text.is_empty() {
            return text.to_string();
        }
        let mut styled = text.stylize();
        if let Some(fg) = self.fg {
            styled = styled.with(fg);
        }
        if let Some(bg) = self.bg {
            styled = styled.on(bg);
        }
        if self.bold {
            styled = styled.bold();
        }
        if self.italic {
            styled = styled.italic();
        }
        if self.underline {
            styled = styled.underlined();
        }
        if self.dim {
            styled = styled.dim();
        }
        if self.crossed {
            styled = styled.crossed_out();
        }
        styled.to_string()
    }
}

// ── Writer ──────────────────────────────────────────────────────────────────

struct Writer<'a> {
    opts: &'a RenderOptions,
    out: String,
    /// Inline style stack (bold, italic, heading text, etc.). Styles compose
    /// via `patch` so nested bold+italic works.
    styles: Vec<Style>,
    /// Current block's styled runs, wrapped and emitted on flush.
    para: Vec<(String, Style)>,
    /// Per-line prefixes (blockquote `│ `), innermost last.
    prefixes: Vec<&'static str>,
    /// List nesting: None = unordered, Some(n) = ordered at index n.
    list_indices: Vec<Option<u64>>,
    /// Marker for the first line of the current list item.
    pending_marker: Option<String>,
    /// Active syntax highlighter for fenced code blocks.
    highlighter: Option<HighlightLines<'static>>,
    in_code_block: bool,
    /// Stored link URL, appended after the link text closes.
    link_url: Option<String>,
    /// Whether the next block should be preceded by a blank line.
    needs_blank: bool,
}

impl<'a> Writer<'a> {
    fn new(opts: &'a RenderOptions) -> Self {
        Self {
            opts,
            out: String::new(),
            styles: vec![],
            para: vec![],
            prefixes: vec![],
            list_indices: vec![],
            pending_marker: None,
            highlighter: None,
            in_code_block: false,
            link_url: None,
            needs_blank: false,
        }
    }

    fn finish(mut self) -> String {
        self.flush_para();
        self.out
    }

    // ── Style helpers ───────────────────────────────────────────────────

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, overlay: Style) {
        self.styles.push(self.style().patch(overlay));
    }

    fn pop_style(&mut self) {
        self.styles.pop();
    }

    // ── Line helpers ────────────────────────────────────────────────────

    fn prefix_width(&self) -> usize {
        self.prefixes.iter().map(|p| p.chars().count()).sum()
    }

    fn painted_prefix(&self) -> String {
        let border = Style::fg(Color::DarkGrey);
        self.prefixes
            .iter()
            .map(|p| border.paint(p, self.opts.color))
            .collect()
    }

    fn push_line(&mut self, content: &str) {
        self.out.push_str(&self.painted_prefix());
        self.out.push_str(content);
        self.out.push('\n');
    }

    fn blank_if_needed(&mut self) {
        if self.needs_blank {
            self.push_line("");
            self.needs_blank = false;
        }
    }

    /// Wraps and emits the buffered block, honoring the list-item marker.
    fn flush_para(&mut self) {
        let marker = self.pending_marker.take();
        if self.para.iter().all(|(t, _)| t.trim().is_empty()) && marker.is_none() {
            self.para.clear();
            return;
        }

        let marker_width = marker.as_ref().map(|m| m.chars().count()).unwrap_or(0);
        let width = self
            .opts
            .width
            .saturating_sub(self.prefix_width() + marker_width)
            .max(20);
        let lines = wrap_runs(&self.para, width);
        self.para.clear();

        let continuation = " ".repeat(marker_width);
        let marker_style = Style::fg(Color::DarkGrey);
        if lines.is_empty() {
            if let Some(m) = marker {
                let painted = marker_style.paint(&m, self.opts.color);
                self.push_line(&painted);
            }
            return;
        }

        for (i, runs) in lines.iter().enumerate() {
            let lead = if i == 0 {
                marker
                    .as_deref()
                    .map(|m| marker_style.paint(m, self.opts.color))
                    .unwrap_or_default()
            } else {
                continuation.clone()
            };
            let body: String = runs
                .iter()
                .map(|(text, style)| style.paint(text, self.opts.color))
                .collect();
            self.push_line(&format!("{lead}{body}"));
        }
    }

    fn push_run(&mut self, text: String, style: Style) {
        // Merge into the previous run when the style matches, keeping the
        // wrap input compact.
        if let Some((last, last_style)) = self.para.last_mut()
            && *last_style == style
        {
            last.push_str(&text);
            return;
        }
        self.para.push((text, style));
    }

    // ── Event dispatch ──────────────────────────────────────────────────

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.open(tag),
            Event::End(tag) => self.close(tag),
            Event::Text(t) => self.text(t),
            Event::Code(c) => self.inline_code(c),
            Event::SoftBreak => self.push_run(" ".to_string(), self.style()),
            Event::HardBreak => self.flush_para(),
            Event::Rule => {
                self.flush_para();
                self.blank_if_needed();
                let bar = "─".repeat(self.opts.width.min(40));
                let painted = Style::fg(Color::DarkGrey).paint(&bar, self.opts.color);
                self.push_line(&painted);
                self.needs_blank = true;
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_run(marker.to_string(), self.style());
            }
            _ => {} // HTML, footnotes, math: skip
        }
    }

    fn open(&mut self, tag: Tag<'_>) {
        match tag {
            // ── Block elements ──────────────────────────────────────────
            Tag::Paragraph => self.blank_if_needed(),
            Tag::Heading { level, .. } => {
                self.blank_if_needed();
                let hs = heading_style(level);
                let depth = heading_depth(level) as usize;
                self.push_run(format!("{} ", "#".repeat(depth)), hs);
                self.push_style(hs);
            }
            Tag::BlockQuote(_) => {
                self.flush_para();
                self.blank_if_needed();
                self.prefixes.push("│ ");
                self.push_style(Style {
                    dim: true,
                    italic: true,
                    ..Default::default()
                });
            }
            Tag::CodeBlock(kind) => {
                self.flush_para();
                self.blank_if_needed();
                let lang = match &kind {
                    CodeBlockKind::Fenced(l) => l.as_ref().to_string(),
                    CodeBlockKind::Indented => String::new(),
                };

                let border = Style::fg(Color::DarkGrey);
                let top = if lang.is_empty() {
                    border.paint("╭──", self.opts.color)
                } else {
                    format!(
                        "{}{}{}",
                        border.paint("╭── ", self.opts.color),
                        border.patch(Style::bold()).paint(&lang, self.opts.color),
                        border.paint(" ──", self.opts.color),
                    )
                };
                self.push_line(&top);
                self.prefixes.push("│ ");

                self.in_code_block = true;
                if self.opts.color
                    && !lang.is_empty()
                    && let Some(syn) = SYNTAX_SET.find_syntax_by_token(&lang)
                {
                    let theme = &THEME_SET.themes["base16-ocean.dark"];
                    self.highlighter = Some(HighlightLines::new(syn, theme));
                }
            }
            Tag::List(start) => {
                self.flush_para();
                if self.list_indices.is_empty() {
                    self.blank_if_needed();
                }
                self.list_indices.push(start);
            }
            Tag::Item => {
                self.flush_para();
                let depth = self.list_indices.len().saturating_sub(1);
                let indent = "  ".repeat(depth);
                if let Some(idx) = self.list_indices.last_mut() {
                    self.pending_marker = Some(match idx {
                        None => format!("{indent}- "),
                        Some(n) => {
                            let marker = format!("{indent}{n}. ");
                            *n += 1;
                            marker
                        }
                    });
                }
            }

            // ── Inline elements ─────────────────────────────────────────
            Tag::Emphasis => self.push_style(Style {
                italic: true,
                ..Default::default()
            }),
            Tag::Strong => self.push_style(Style::bold()),
            Tag::Strikethrough => self.push_style(Style {
                crossed: true,
                ..Default::default()
            }),
            Tag::Link { dest_url, .. } => {
                self.link_url = Some(dest_url.to_string());
                self.push_style(Style {
                    underline: true,
                    fg: Some(Color::Cyan),
                    ..Default::default()
                });
            }
            _ => {} // Tables, images, definitions: skip
        }
    }

    fn close(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_para();
                self.needs_blank = true;
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush_para();
                self.needs_blank = true;
            }
            TagEnd::BlockQuote(_) => {
                self.flush_para();
                self.prefixes.pop();
                self.pop_style();
                self.needs_blank = true;
            }
            TagEnd::CodeBlock => {
                self.highlighter = None;
                self.in_code_block = false;
                self.prefixes.pop(); // remove │ before the bottom border
                let bottom = Style::fg(Color::DarkGrey).paint("╰──", self.opts.color);
                self.push_line(&bottom);
                self.needs_blank = true;
            }
            TagEnd::List(_) => {
                self.flush_para();
                self.list_indices.pop();
                self.needs_blank = true;
            }
            TagEnd::Item => self.flush_para(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link_url.take() {
                    let link_style = Style {
                        underline: true,
                        fg: Some(Color::Cyan),
                        ..Default::default()
                    };
                    self.push_run(" (".to_string(), self.style());
                    self.push_run(url, self.style().patch(link_style));
                    self.push_run(")".to_string(), self.style());
                }
            }
            _ => {}
        }
    }

    // ── Content handlers ────────────────────────────────────────────────

    fn text(&mut self, cow: CowStr<'_>) {
        let text = cow.replace('\t', "    ");

        if self.in_code_block {
            self.code_lines(&text);
            return;
        }

        let style = self.style();
        self.push_run(text, style);
    }

    /// Emits code block content line by line, never wrapped.
    fn code_lines(&mut self, text: &str) {
        if let Some(mut hl) = self.highlighter.take() {
            for line in LinesWithEndings::from(text) {
                if let Ok(ranges) = hl.highlight_line(line, &SYNTAX_SET) {
                    let escaped = as_24_bit_terminal_escaped(&ranges, false);
                    let content = format!("{}{ANSI_RESET}", escaped.trim_end_matches('\n'));
                    self.push_line(&content);
                } else {
                    self.push_line(line.trim_end_matches('\n'));
                }
            }
            self.highlighter = Some(hl);
            return;
        }

        for line in text.lines() {
            self.push_line(line);
        }
    }

    fn inline_code(&mut self, cow: CowStr<'_>) {
        let style = Style {
            fg: Some(Color::White),
            bg: Some(Color::DarkGrey),
            ..Default::default()
        };
        self.push_run(cow.to_string(), style);
    }
}

// ── Wrapping ────────────────────────────────────────────────────────────────

/// Wraps styled runs to `width` columns, splitting runs across lines while
/// keeping each fragment's style.
///
/// Break positions come from `textwrap` on the concatenated plain text; the
/// plain and wrapped character streams are then walked together to carry
/// styles across the breaks.
fn wrap_runs(runs: &[(String, Style)], width: usize) -> Vec<Vec<(String, Style)>> {
    if runs.is_empty() {
        return vec![];
    }

    let plain: String = runs.iter().map(|(t, _)| t.as_str()).collect();
    let wrapped = textwrap::fill(&plain, width);

    let chars: Vec<(char, Style)> = runs
        .iter()
        .flat_map(|(t, s)| t.chars().map(move |c| (c, *s)))
        .collect();

    let mut lines: Vec<Vec<(String, Style)>> = vec![vec![]];
    let mut i = 0usize;
    for wc in wrapped.chars() {
        if wc == '\n' {
            // textwrap consumed whitespace at the break point.
            while i < chars.len() && chars[i].0.is_whitespace() {
                i += 1;
            }
            lines.push(vec![]);
            continue;
        }
        // Skip source whitespace textwrap trimmed (leading/collapsed).
        while i < chars.len() && chars[i].0 != wc && chars[i].0.is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let (c, style) = chars[i];
        i += 1;
        if let Some(line) = lines.last_mut() {
            match line.last_mut() {
                Some((text, last_style)) if *last_style == style => text.push(c),
                _ => line.push((c.to_string(), style)),
            }
        }
    }

    lines.retain(|l| !l.is_empty());
    lines
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn heading_style(level: HeadingLevel) -> Style {
    match level {
        HeadingLevel::H1 => Style {
            bold: true,
            underline: true,
            ..Default::default()
        },
        HeadingLevel::H2 => Style::bold(),
        _ => Style {
            bold: true,
            italic: true,
            ..Default::default()
        },
    }
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
