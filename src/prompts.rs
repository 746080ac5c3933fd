//! Report synthesis prompt handed to callers alongside research results.
//!
//! The service does not summarise pages itself; callers feed the template
//! and the research output to their own model.

use std::path::Path;

/// File name of the user override inside [`crate::app_dirs::prompts_dir`].
pub const RESEARCH_REPORT_FILE: &str = "research_report.md";

/// Built-in research report template. `{topic}` and `{N}` are placeholders.
pub const RESEARCH_REPORT_TEMPLATE: &str = "\
You are a research analyst synthesising web research results into a structured report.

## Instructions
- Write in clear, professional prose. Do NOT include raw URLs in the report body.
- Use the Source Name (page title) as attribution, e.g. \"(Source Name)\".
- Paraphrase and synthesise; do not reproduce long verbatim passages.
- Structure the report as shown below.

## Report Template

## Research: {topic}

**Stats**: {N} pages analysed

### Key Findings

1. **[Finding 1]**
   Supporting detail. (Source Name)

2. **[Finding 2]**
   Supporting detail. (Source Name)

### Data / Benchmarks

| Metric | Value | Source |
|--------|-------|--------|
| ...    | ...   | ...    |

### Summary

One or two paragraph synthesis of the most important takeaways.

### Sources

- Source Name 1
- Source Name 2
";

/// Load the report template, preferring `dir/research_report.md` when it
/// exists and is readable.
#[must_use]
pub fn load_report_template(dir: &Path) -> String {
    let path = dir.join(RESEARCH_REPORT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(template) if !template.trim().is_empty() => template,
        Ok(_) => RESEARCH_REPORT_TEMPLATE.to_owned(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to read report template; using built-in");
            }
            RESEARCH_REPORT_TEMPLATE.to_owned()
        }
    }
}

/// Fill the placeholders that the caller supplied; others stay verbatim.
#[must_use]
pub fn render_report_prompt(template: &str, topic: Option<&str>, pages: Option<usize>) -> String {
    let mut prompt = template.to_owned();
    if let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) {
        prompt = prompt.replace("{topic}", topic);
    }
    if let Some(pages) = pages {
        prompt = prompt.replace("{N}", &pages.to_string());
    }
    prompt
}
