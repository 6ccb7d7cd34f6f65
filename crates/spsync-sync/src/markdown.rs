//! Markdown to HTML conversion
//!
//! Markdown files are published as standalone, styled HTML documents so they
//! render in the SharePoint browser view. Fenced `mermaid` blocks are
//! sanitized and handed to an [`IDiagramRenderer`]; a block whose rendering
//! fails stays a code block.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use spsync_core::ports::IDiagramRenderer;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout of one `mmdc` invocation.
pub const MERMAID_TIMEOUT: Duration = Duration::from_secs(30);

const STYLE: &str = r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif;
            font-size: 16px;
            line-height: 1.5;
            color: #1f2328;
            max-width: 980px;
            margin: 0 auto;
            padding: 45px;
            word-wrap: break-word;
        }
        h1, h2 { padding-bottom: .3em; border-bottom: 1px solid #d1d9e0; }
        h1, h2, h3, h4, h5, h6 { margin-top: 24px; margin-bottom: 16px; font-weight: 600; line-height: 1.25; }
        code { padding: .2em .4em; font-size: 85%; background-color: #eff1f3; border-radius: 6px; }
        pre { padding: 16px; overflow: auto; font-size: 85%; line-height: 1.45; background-color: #f6f8fa; border-radius: 6px; }
        pre code { padding: 0; background: transparent; white-space: break-spaces; }
        blockquote { margin: 0; padding: 0 1em; color: #59636e; border-left: .25em solid #d1d9e0; }
        table { border-collapse: collapse; margin: 16px 0; }
        th, td { padding: 6px 13px; border: 1px solid #d1d9e0; }
        tr:nth-child(2n) { background-color: #f6f8fa; }
        a { color: #0969da; text-decoration: none; }
        a:hover { text-decoration: underline; }
        hr { height: .25em; padding: 0; margin: 24px 0; background-color: #d1d9e0; border: 0; }
        img { max-width: 100%; box-sizing: content-box; }
        .mermaid-diagram { text-align: center; margin: 16px 0; padding: 16px; background-color: #f6f8fa; border-radius: 6px; overflow-x: auto; }
        .mermaid-diagram svg { max-width: 100%; height: auto; }
        li:has(> input[type="checkbox"]) { list-style-type: none; }
"#;

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

fn is_mermaid(info: &str) -> bool {
    info.split_whitespace().next() == Some("mermaid")
}

/// Sources of every fenced mermaid block, in document order.
pub fn mermaid_blocks(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) if is_mermaid(&info) => {
                current = Some(String::new());
            }
            Event::Text(text) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(buf) = current.take() {
                    blocks.push(buf);
                }
            }
            _ => {}
        }
    }
    blocks
}

/// Renders `markdown` to an HTML fragment.
///
/// `diagrams` holds one entry per mermaid block; `Some(svg)` replaces the
/// block, `None` keeps it as a code block.
pub fn render_body(markdown: &str, diagrams: Vec<Option<String>>) -> String {
    let mut diagrams = diagrams.into_iter();
    let mut events = Vec::new();
    let mut replacing = false;

    for event in Parser::new_ext(markdown, options()) {
        let opens_mermaid = matches!(
            &event,
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) if is_mermaid(info)
        );
        if opens_mermaid {
            match diagrams.next().flatten() {
                Some(svg) => {
                    events.push(Event::Html(format!("<div class=\"mermaid-diagram\">{svg}</div>\n").into()));
                    replacing = true;
                }
                None => events.push(event),
            }
        } else if replacing {
            if matches!(event, Event::End(TagEnd::CodeBlock)) {
                replacing = false;
            }
        } else {
            events.push(event);
        }
    }

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, events.into_iter());
    body
}

/// Wraps an HTML fragment in a complete styled document.
pub fn html_document(title: &str, body: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"utf-8\">\n    \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n    \
         <title>{title}</title>\n    <style>{STYLE}    </style>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Mermaid sanitization
// ============================================================================

/// Rewrites mermaid source into a form `mmdc` accepts.
///
/// - `<br/>` and `<br />` become `<br>`
/// - every other HTML tag is removed
/// - the bare word `end` becomes `End`
/// - `& # % | "` inside `[..]`, `(..)` and `{..}` labels become entities
/// - braces are dropped from `%%` comment lines
pub fn sanitize_mermaid(source: &str) -> String {
    let normalized = strip_tags(source);
    let normalized = capitalize_end(&normalized);
    normalized
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("%%") {
                line.chars().filter(|c| *c != '{' && *c != '}').collect()
            } else {
                encode_labels(line)
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Keeps `<br>` (normalizing its self-closing forms), removes other tags.
fn strip_tags(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let after = candidate[1..].strip_prefix('/').unwrap_or(&candidate[1..]);
        let is_tag = after.starts_with(|c: char| c.is_ascii_alphabetic());
        match (is_tag, candidate.find('>')) {
            (true, Some(end)) => {
                let name: String = after
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                if name.eq_ignore_ascii_case("br") {
                    out.push_str("<br>");
                }
                rest = &candidate[end + 1..];
            }
            _ => {
                out.push('<');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn capitalize_end(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut prev: Option<char> = None;
    let mut rest = source;
    while !rest.is_empty() {
        if rest.starts_with("end")
            && !prev.is_some_and(is_word_char)
            && !rest[3..].starts_with(is_word_char)
        {
            out.push_str("End");
            prev = Some('d');
            rest = &rest[3..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
            prev = Some(c);
        }
        rest = chars.as_str();
    }
    out
}

fn encode_label_char(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&#38;"),
        '#' => out.push_str("&#35;"),
        '%' => out.push_str("&#37;"),
        '|' => out.push_str("&#124;"),
        '"' => out.push_str("&#34;"),
        _ => out.push(c),
    }
}

fn encode_labels(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    // (opener, closer, depth) of the label being read
    let mut label: Option<(char, char, usize)> = None;
    for c in line.chars() {
        match label {
            None => {
                let closer = match c {
                    '[' => Some(']'),
                    '(' => Some(')'),
                    '{' => Some('}'),
                    _ => None,
                };
                if let Some(closer) = closer {
                    label = Some((c, closer, 1));
                }
                out.push(c);
            }
            Some((open, close, depth)) => {
                if c == close {
                    label = (depth > 1).then_some((open, close, depth - 1));
                    out.push(c);
                } else if c == open {
                    label = Some((open, close, depth + 1));
                    out.push(c);
                } else {
                    encode_label_char(c, &mut out);
                }
            }
        }
    }
    out
}

// ============================================================================
// Converter
// ============================================================================

/// Converts Markdown files to standalone HTML documents.
pub struct MarkdownConverter {
    renderer: Arc<dyn IDiagramRenderer>,
}

impl MarkdownConverter {
    pub fn new(renderer: Arc<dyn IDiagramRenderer>) -> Self {
        Self { renderer }
    }

    /// Full HTML document for `markdown`, titled `title`.
    pub async fn to_html(&self, markdown: &str, title: &str) -> String {
        let mut diagrams = Vec::new();
        for source in mermaid_blocks(markdown) {
            let svg = self.renderer.to_svg(&sanitize_mermaid(&source)).await;
            if svg.is_none() {
                debug!(title, "Diagram left as code block");
            }
            diagrams.push(svg);
        }
        html_document(title, &render_body(markdown, diagrams))
    }

    /// Converts `source` and writes `<stem>.html` into `dest_dir`.
    pub async fn convert_file(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let markdown = tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Markdown file has no usable name")?;

        let html = self.to_html(&markdown, stem).await;
        tokio::fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(format!("{stem}.html"));
        tokio::fs::write(&target, html)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        Ok(target)
    }
}

/// Renders diagrams with the mermaid CLI (`mmdc`).
pub struct MermaidCliRenderer {
    program: PathBuf,
    timeout: Duration,
    puppeteer_config: Option<PathBuf>,
}

impl MermaidCliRenderer {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("mmdc"),
            timeout: MERMAID_TIMEOUT,
            puppeteer_config: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_puppeteer_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.puppeteer_config = Some(path.into());
        self
    }

    async fn render(&self, source: &str) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("diagram.mmd");
        let output = dir.path().join("diagram.svg");
        tokio::fs::write(&input, source).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-i").arg(&input).arg("-o").arg(&output);
        if let Some(config) = &self.puppeteer_config {
            cmd.arg("--puppeteerConfigFile").arg(config);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::piped()).kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .context("mmdc timed out")?
            .with_context(|| format!("Failed to run {}", self.program.display()))?;
        if !result.status.success() {
            anyhow::bail!(
                "mmdc exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        let svg = tokio::fs::read_to_string(&output).await?;
        Ok(strip_xml_declaration(&svg).trim().to_string())
    }
}

impl Default for MermaidCliRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_xml_declaration(svg: &str) -> &str {
    let trimmed = svg.trim_start();
    match (trimmed.starts_with("<?xml"), trimmed.find("?>")) {
        (true, Some(end)) => &trimmed[end + 2..],
        _ => trimmed,
    }
}

#[async_trait]
impl IDiagramRenderer for MermaidCliRenderer {
    async fn to_svg(&self, source: &str) -> Option<String> {
        match self.render(source).await {
            Ok(svg) => Some(svg),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Mermaid rendering failed");
                None
            }
        }
    }
}
