//! # Docwatch Render
//!
//! The default [`Converter`] for docwatch: renders Markdown documents into
//! standalone HTML pages.

use std::path::{Path, PathBuf};

use docwatch_watcher::{Converter, Result, WatcherError, converted_path, write_atomic};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use tracing::debug;

/// Renders Markdown files to HTML.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    /// Parser extensions.
    options: Options,
}

impl MarkdownConverter {
    /// Create a converter with tables, footnotes, strikethrough and task lists.
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }

    /// Replace the parser extensions.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Render `markdown` to a complete HTML document.
    ///
    /// The title is the text of the first level-1 heading, or `fallback_title`
    /// when there is none.
    pub fn render(&self, markdown: &str, fallback_title: &str) -> String {
        let events: Vec<Event<'_>> = Parser::new_ext(markdown, self.options).collect();
        let title = first_h1(&events).unwrap_or_else(|| fallback_title.to_string());

        let mut body = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut body, events.into_iter());

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
            escape_html(&title)
        )
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for MarkdownConverter {
    fn convert(
        &self,
        source: &Path,
        content_root: &Path,
        output_root: &Path,
        out_format: &str,
    ) -> Result<PathBuf> {
        let target = converted_path(source, content_root, output_root, out_format)?;

        let bytes = std::fs::read(source)?;
        let markdown = String::from_utf8(bytes).map_err(|e| WatcherError::Conversion {
            path: source.to_path_buf(),
            message: format!("not valid UTF-8: {e}"),
        })?;

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let page = self.render(&markdown, &stem);

        write_atomic(&target, page.as_bytes())?;
        debug!("Rendered {} -> {}", source.display(), target.display());
        Ok(target)
    }
}

/// Plain text of the first `# heading`, if any.
fn first_h1(events: &[Event<'_>]) -> Option<String> {
    let start = events.iter().position(|e| {
        matches!(
            e,
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            })
        )
    })?;

    let mut title = String::new();
    for event in &events[start + 1..] {
        match event {
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => break,
            Event::Text(text) | Event::Code(text) => title.push_str(text),
            Event::SoftBreak | Event::HardBreak => title.push(' '),
            _ => {}
        }
    }

    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
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
