/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::template
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Replace the region between a start/end marker pair inside a
    template document, leaving every other byte untouched.

  Security / Safety Notes:
    Plain string search only; documents are never parsed as
    markdown or HTML.

  Dependencies:
    None beyond std.

  Operational Scope:
    Used by the markdown-docs renderer once per marker pair.

  Revision History:
    2025-02-03 COD  Authored marker substitution.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Idempotent output for identical input
    - Hard failure on missing markers, never a silent no-op
============================================================*/

use crate::error::{BundleDocsError, Result};

/// Start marker of the single region in a simple tool's document.
pub const CONTENT_START: &str = "<!-- CONTENT_START -->";
/// End marker of the single region in a simple tool's document.
pub const CONTENT_END: &str = "<!-- CONTENT_END -->";

/// A start/end marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    pub start: String,
    pub end: String,
}

impl MarkerPair {
    /// The plain `CONTENT_START` / `CONTENT_END` pair.
    pub fn content() -> Self {
        Self {
            start: CONTENT_START.to_string(),
            end: CONTENT_END.to_string(),
        }
    }

    /// The pair delimiting one variant's section, e.g. `<!-- CONTENT_START:9.2 -->`.
    pub fn for_variant(key: &str) -> Self {
        Self {
            start: format!("<!-- CONTENT_START:{key} -->"),
            end: format!("<!-- CONTENT_END:{key} -->"),
        }
    }

    /// True when the document contains the start marker.
    pub fn present_in(&self, document: &str) -> bool {
        document.contains(&self.start)
    }

    pub fn render(&self, document: &str, replacement: &str) -> Result<String> {
        render(document, &self.start, &self.end, replacement)
    }
}

/// Replace the span strictly between `start_marker` and the first
/// `end_marker` after it.
///
/// Both markers are kept verbatim. The replacement is framed by exactly one
/// newline on each side, so rendering the same input twice is byte-identical.
pub fn render(
    document: &str,
    start_marker: &str,
    end_marker: &str,
    replacement: &str,
) -> Result<String> {
    for marker in [start_marker, end_marker] {
        if replacement.contains(marker) {
            return Err(BundleDocsError::MarkerInReplacement {
                marker: marker.to_string(),
            });
        }
    }

    let Some(start_idx) = document.find(start_marker) else {
        return Err(BundleDocsError::MarkerNotFound {
            marker: start_marker.to_string(),
        });
    };
    let region_start = start_idx + start_marker.len();

    let Some(offset) = document[region_start..].find(end_marker) else {
        // End marker exists but only before (or overlapping) the start marker.
        return Err(if document.contains(end_marker) {
            BundleDocsError::MarkersOutOfOrder {
                start: start_marker.to_string(),
                end: end_marker.to_string(),
            }
        } else {
            BundleDocsError::MarkerNotFound {
                marker: end_marker.to_string(),
            }
        });
    };
    let region_end = region_start + offset;

    let body = replacement.trim_matches('\n');
    let mut out = String::with_capacity(document.len() + body.len());
    out.push_str(&document[..region_start]);
    out.push('\n');
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out.push_str(&document[region_end..]);
    Ok(out)
}
