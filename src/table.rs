/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::table
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Render package lists as markdown pipe-tables or HTML tables
    with the fixed column order name, version, description.

  Security / Safety Notes:
    Cell values are escaped so that metadata text can never
    break table structure or inject template markers.

  Dependencies:
    None beyond std.

  Operational Scope:
    Used by the markdown-docs renderer for every package list
    and download overview it emits.

  Revision History:
    2025-02-03 COD  Authored table formatters.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Total functions: formatting never fails
    - Deterministic, lossless escaping
============================================================*/

use serde::Deserialize;

use crate::model::PackageEntry;

/// Placeholder shown for a package without a version.
pub const MISSING_VERSION: &str = "-";

const HEADERS: [&str; 3] = ["Name", "Version", "Description"];

/// Turns an ordered package list into a table.
pub trait TableFormatter {
    /// Render `entries` in order; an empty list yields a header-only table.
    fn format(&self, entries: &[PackageEntry]) -> String;

    /// Render arbitrary rows under the given headers.
    fn format_rows(&self, headers: &[&str], rows: &[Vec<String>]) -> String;
}

/// Table syntax selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStyle {
    #[default]
    Markdown,
    Html,
}

impl TableStyle {
    pub fn formatter(self) -> Box<dyn TableFormatter + Send + Sync> {
        match self {
            TableStyle::Markdown => Box::new(MarkdownTable),
            TableStyle::Html => Box::new(HtmlTable),
        }
    }
}

fn package_rows(entries: &[PackageEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            vec![
                entry.name().to_string(),
                entry.version().unwrap_or(MISSING_VERSION).to_string(),
                entry.description().to_string(),
            ]
        })
        .collect()
}

/// GitHub-flavoured markdown pipe-table.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownTable;

impl TableFormatter for MarkdownTable {
    fn format(&self, entries: &[PackageEntry]) -> String {
        self.format_rows(&HEADERS, &package_rows(entries))
    }

    fn format_rows(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut lines = Vec::with_capacity(rows.len() + 2);
        lines.push(markdown_row(headers.iter().copied()));
        lines.push(markdown_row(headers.iter().map(|_| "---")));
        for row in rows {
            let escaped: Vec<String> = row.iter().map(|cell| escape_markdown_cell(cell)).collect();
            lines.push(markdown_row(escaped.iter().map(String::as_str)));
        }
        lines.join("\n")
    }
}

fn markdown_row<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut row = String::from("|");
    for cell in cells {
        row.push(' ');
        row.push_str(cell);
        row.push_str(" |");
    }
    row
}

/// Escape a value for a markdown table cell without losing information.
///
/// `\`, `|`, `&` and `<` are escaped so they render literally. `\n` becomes
/// `<br>` and `\r` becomes `&#13;`, so `\r\n`, `\n` and `\r` stay distinct.
/// Leading and trailing whitespace, which markdown would strip from a cell,
/// is kept as numeric character references.
pub fn escape_markdown_cell(value: &str) -> String {
    let lead = value.len() - value.trim_start().len();
    let tail = value.trim_end().len().max(lead);
    let mut out = String::with_capacity(value.len());
    for (idx, ch) in value.char_indices() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '\n' => out.push_str("<br>"),
            '\r' => out.push_str("&#13;"),
            edge if edge.is_whitespace() && (idx < lead || idx >= tail) => {
                out.push_str(&format!("&#{};", u32::from(edge)));
            }
            other => out.push(other),
        }
    }
    out
}

/// Plain HTML table.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTable;

impl TableFormatter for HtmlTable {
    fn format(&self, entries: &[PackageEntry]) -> String {
        self.format_rows(&HEADERS, &package_rows(entries))
    }

    fn format_rows(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut out = String::from("<table>\n<thead>\n<tr>");
        for header in headers {
            out.push_str("<th>");
            out.push_str(&escape_html(header));
            out.push_str("</th>");
        }
        out.push_str("</tr>\n</thead>\n<tbody>\n");
        for row in rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str("<td>");
                out.push_str(&escape_html(cell));
                out.push_str("</td>");
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>");
        out
    }
}

/// Escape text for HTML element content.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
