use serde::{Deserialize, Serialize};

use crate::error::ToolResultParseError;

/// Citation backing an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingReference {
    pub id: String,
    /// Source title, with `#page=<n>` appended when the chunk names a page
    pub name: String,
    /// Excerpt of the cited content
    pub content: String,
}

/// Document carried (as a JSON string) by `extension.middle_tier_tool_response`
#[derive(Debug, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub sources: Vec<ToolSource>,
}

#[derive(Debug, Deserialize)]
pub struct ToolSource {
    pub chunk_id: String,
    pub title: String,
    #[serde(default)]
    pub chunk: String,
}

/// Parse a tool result into grounding references
///
/// All-or-nothing: a malformed document yields an error and no references.
pub fn parse_tool_result(raw: &str) -> Result<Vec<GroundingReference>, ToolResultParseError> {
    let result: ToolResult = serde_json::from_str(raw)?;

    Ok(result
        .sources
        .into_iter()
        .map(|source| GroundingReference {
            name: display_name(&source.chunk_id, &source.title),
            id: source.chunk_id,
            content: source.chunk,
        })
        .collect())
}

/// `"docA_pages_7"` + `"Manual"` -> `"Manual#page=7"`; no page suffix keeps the title
pub fn display_name(chunk_id: &str, title: &str) -> String {
    match page_number(chunk_id) {
        Some(page) => format!("{}#page={}", title, page),
        None => title.to_string(),
    }
}

/// Digits of a trailing `_pages_<digits>`
fn page_number(chunk_id: &str) -> Option<&str> {
    let (_, page) = chunk_id.rsplit_once("_pages_")?;
    (!page.is_empty() && page.bytes().all(|b| b.is_ascii_digit())).then_some(page)
}
