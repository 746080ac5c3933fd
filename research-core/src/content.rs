//! HTML content extraction: strips boilerplate and returns readable text.
//!
//! Parses raw HTML, skips non-content elements (scripts, styles, navigation),
//! finds the main content area, keeps block structure as lines, and then runs
//! a line-level noise filter before prefixing the page title as a heading.

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Marker appended when text is cut to the character limit.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

/// Elements dropped together with everything inside them.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe", "template",
];

/// Elements whose end starts a new paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "article", "section", "blockquote",
    "pre", "table", "ul", "ol", "dl", "dd", "dt", "figure", "figcaption",
];

const BULLET_CHARS: &[char] = &['•', '·', '●', '○', '◦', '‣', '⁃'];
const LIST_MARKER_CHARS: &[char] = &['•', '-', '*', '·', '►', '▸', '▹', '→', '‣', '⁃', '●', ' '];

/// Lines shorter than this are buffered and joined into one line.
const SHORT_LINE_CHARS: usize = 25;
const SHORT_LINE_RUN: usize = 5;
const MAX_JOINED_CHARS: usize = 300;

/// Readable content of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Page title with any trailing site name removed.
    pub title: String,
    /// Clean text, starting with `# {title}` when a title was found.
    pub text: String,
}

/// Turns a raw response body into readable text. Must be pure and infallible:
/// unparseable input yields empty text.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &str, navigation_patterns: &[String]) -> Extracted;
}

/// [`Extractor`] for HTML documents built on `scraper`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(&self, raw: &str, navigation_patterns: &[String]) -> Extracted {
        let document = Html::parse_document(raw);

        let raw_title = extract_title(&document);
        let title = strip_site_suffix(&raw_title);

        let mut blocks = String::new();
        if let Some(main) = main_element(&document) {
            collect_blocks(main, &mut blocks);
        }
        let body = filter_lines(&blocks, &title, &raw_title, navigation_patterns);

        let text = match (title.is_empty(), body.is_empty()) {
            (true, _) => body,
            (false, true) => format!("# {title}"),
            (false, false) => format!("# {title}\n\n{body}"),
        };
        Extracted { title, text }
    }
}

/// Cut `text` to at most `max_chars` characters, appending [`TRUNCATION_MARKER`].
pub fn truncate_to_limit(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((end, _)) => {
            let mut truncated = text[..end].trim_end().to_owned();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }
}

fn site_suffix_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[|\-–—]\s*[^|\-–—]{3,50}$").ok())
        .as_ref()
}

fn strip_site_suffix(title: &str) -> String {
    match site_suffix_re() {
        Some(re) => re.replace(title, "").trim().to_owned(),
        None => title.trim().to_owned(),
    }
}

/// The `<title>` text, falling back to the first `<h1>`.
fn extract_title(document: &Html) -> String {
    for selector_str in ["title", "h1"] {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            let text = el.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// The main content area: tries content-specific selectors in priority order,
/// falling back to `<body>`.
fn main_element(document: &Html) -> Option<ElementRef<'_>> {
    for selector_str in ["article", "main", "[role=\"main\"]", "body"] {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            if element.text().any(|t| !t.trim().is_empty()) {
                return Some(element);
            }
        }
    }
    None
}

/// Render an element's text with one line per block and bullets for list items.
fn collect_blocks(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                for (i, piece) in text.split_whitespace().enumerate() {
                    if i > 0 || text.starts_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(piece);
                }
                if text.ends_with(char::is_whitespace) && !text.trim().is_empty() {
                    out.push(' ');
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if BOILERPLATE_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if name == "li" {
                    out.push_str("\n• ");
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_blocks(child_el, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push_str("\n\n");
                } else if matches!(name, "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn is_navigation_line(line: &str, patterns: &[String]) -> bool {
    let lower = line.to_lowercase();
    patterns.iter().any(|p| lower.starts_with(p.as_str()))
}

fn flush_short(buffer: &mut Vec<String>, lines: &mut Vec<String>) {
    if buffer.len() <= 2 {
        lines.append(buffer);
    } else {
        lines.push(buffer.join(" | "));
        buffer.clear();
    }
}

/// Drop navigation remnants, symbol spam, duplicates and UI fragments, and
/// collapse runs of short lines.
fn filter_lines(text: &str, title: &str, raw_title: &str, navigation: &[String]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut short_buffer: Vec<String> = Vec::new();
    let mut prev_line = String::new();
    let mut title_seen = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_navigation_line(line, navigation) {
            continue;
        }

        let len = line.chars().count();
        let alnum = line.chars().filter(|c| c.is_alphanumeric()).count();
        if len > 3 && (alnum as f64) / (len as f64) < 0.3 {
            continue;
        }
        if line.chars().filter(|c| BULLET_CHARS.contains(c)).count() >= 4 {
            continue;
        }
        if line.trim_matches(LIST_MARKER_CHARS).chars().count() < 2 {
            continue;
        }
        if line == prev_line {
            continue;
        }
        if !title.is_empty() && !title_seen && (strip_site_suffix(line) == title || line == raw_title)
        {
            title_seen = true;
            continue;
        }

        let is_heading = line.starts_with('#');
        if len < 15
            && line.split_whitespace().count() <= 2
            && !is_heading
            && !line.chars().any(char::is_lowercase)
        {
            continue;
        }

        if len < SHORT_LINE_CHARS && !is_heading {
            short_buffer.push(line.to_owned());
            if short_buffer.len() >= SHORT_LINE_RUN {
                let joined = short_buffer.join(" | ");
                if joined.chars().count() < MAX_JOINED_CHARS {
                    lines.push(joined);
                }
                short_buffer.clear();
            }
        } else {
            if !short_buffer.is_empty() {
                flush_short(&mut short_buffer, &mut lines);
            }
            lines.push(line.to_owned());
            prev_line = line.to_owned();
        }
    }
    if !short_buffer.is_empty() {
        flush_short(&mut short_buffer, &mut lines);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav() -> Vec<String> {
        vec!["skip to".into(), "jump to".into()]
    }

    fn extract(html: &str) -> Extracted {
        HtmlExtractor.extract(html, &nav())
    }

    #[test]
    fn title_becomes_heading_without_site_suffix() {
        let html = "<html><head><title>My Page | Site Name</title></head><body><p>Hello world, this is a test paragraph with enough content to pass.</p></body></html>";
        let page = extract(html);
        assert_eq!(page.title, "My Page");
        assert!(page.text.starts_with("# My Page\n\n"));
        assert!(!page.text.lines().next().unwrap_or("").contains("Site Name"));
    }

    #[test]
    fn title_falls_back_to_first_heading() {
        let html = "<html><body><h1>Fallback Heading</h1><p>Some paragraph long enough to be kept as a line.</p></body></html>";
        let page = extract(html);
        assert_eq!(page.title, "Fallback Heading");
        // The heading line itself is not repeated in the body.
        assert_eq!(page.text.matches("Fallback Heading").count(), 1);
    }

    #[test]
    fn boilerplate_elements_removed() {
        let html = r#"<html><body>
            <header>Header content</header>
            <nav>Nav links</nav>
            <script>var x = 1; alert('hi');</script>
            <style>.foo { color: red; }</style>
            <main><p>Main content of the page that matters.</p></main>
            <aside>Sidebar stuff</aside>
            <noscript>Enable JS please</noscript>
            <footer>Footer info</footer>
        </body></html>"#;
        let page = extract(html);
        assert!(page.text.contains("Main content of the page"));
        for noise in ["Header content", "Nav links", "alert", "color: red", "Sidebar", "Enable JS", "Footer"] {
            assert!(!page.text.contains(noise), "{noise} leaked");
        }
    }

    #[test]
    fn article_preferred_over_body() {
        let html = r#"<html><body>
            <div>Outer div text that is long enough to keep around</div>
            <article><p>Article content here, long enough to be kept.</p></article>
        </body></html>"#;
        let page = extract(html);
        assert!(page.text.contains("Article content"));
        assert!(!page.text.contains("Outer div"));
    }

    #[test]
    fn blocks_become_lines_and_entities_decode() {
        let html = "<body><p>First paragraph &amp; more words here.</p><p>Second paragraph with other words.</p></body>";
        let page = extract(html);
        assert_eq!(
            page.text,
            "First paragraph & more words here.\nSecond paragraph with other words."
        );
    }

    #[test]
    fn navigation_lines_dropped() {
        let html = "<body><p>Skip to main content</p><p>The real article text starts right here.</p></body>";
        let page = extract(html);
        assert!(!page.text.contains("Skip to"));
        assert!(page.text.contains("real article text"));
    }

    #[test]
    fn symbol_heavy_and_bullet_spam_dropped() {
        let html = "<body><p>|| -- == // ** ## ++</p><p>• Home • About • Blog • Contact us today</p><p>A normal sentence that carries real information.</p></body>";
        let page = extract(html);
        assert!(!page.text.contains("=="));
        assert!(!page.text.contains("Contact us"));
        assert!(page.text.contains("normal sentence"));
    }

    #[test]
    fn uppercase_ui_fragments_dropped() {
        let html = "<body><p>MENU</p><p>SIGN IN</p><p>Actual prose sentence with lowercase letters.</p></body>";
        let page = extract(html);
        assert!(!page.text.contains("MENU"));
        assert!(!page.text.contains("SIGN IN"));
    }

    #[test]
    fn consecutive_duplicate_lines_dropped() {
        let html = "<body><p>This line is repeated for no good reason.</p><p>This line is repeated for no good reason.</p></body>";
        let page = extract(html);
        assert_eq!(page.text.matches("repeated").count(), 1);
    }

    #[test]
    fn short_line_runs_are_joined() {
        let html = "<body><ul><li>alpha one</li><li>beta two</li><li>gamma three</li><li>delta four</li><li>epsilon five</li></ul><p>Closing paragraph that is definitely long.</p></body>";
        let page = extract(html);
        assert!(page
            .text
            .contains("• alpha one | • beta two | • gamma three | • delta four | • epsilon five"));
    }

    #[test]
    fn empty_input_yields_empty_text() {
        assert_eq!(extract(""), Extracted::default());
        assert!(extract("<html><body>   \n\n  </body></html>").text.is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(50);
        let cut = truncate_to_limit(&text, 10);
        assert!(cut.starts_with(&"é".repeat(10)));
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_to_limit("short", 10), "short");
    }
}
