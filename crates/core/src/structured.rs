use crate::error::ExtractionError;
use crate::models::ExtractedFields;
use crate::traits::{CompletionClient, CompletionRequest};
use tracing::debug;

/// Longest excerpt forwarded to the language model. Anything past this
/// is dropped to bound prompt cost; long chunks lose their tail.
const MAX_EXCERPT_CHARS: usize = 2000;
const COMPLETION_TEMPERATURE: f32 = 0.0;
const COMPLETION_MAX_TOKENS: u32 = 500;

pub struct StructuredExtractor<C> {
    client: C,
}

impl<C: CompletionClient> StructuredExtractor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub async fn extract(
        &self,
        chunk_text: &str,
        query: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        let excerpt = truncate_chars(chunk_text, MAX_EXCERPT_CHARS);
        let prompt = build_prompt(excerpt, query);

        let raw = self
            .client
            .complete(CompletionRequest {
                prompt: &prompt,
                temperature: COMPLETION_TEMPERATURE,
                max_tokens: COMPLETION_MAX_TOKENS,
            })
            .await?;

        debug!(response_len = raw.len(), "received completion");
        parse_fields(&raw)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

fn build_prompt(excerpt: &str, query: &str) -> String {
    format!(
        r#"You are analyzing a scientific research document excerpt.

Query: {query}

Document excerpt:
{excerpt}

Extract the following if present in the text:
1. Research methodology/approach
2. Materials or substances studied
3. Key findings or outcomes
4. Challenges, problems, limitations, or failure modes mentioned (look for explicit statements AND implicit challenges being addressed)

Return as JSON with these exact keys:
{{"methodology": "...", "materials": "...", "findings": "...", "challenges": "..."}}

For challenges: Include both explicitly stated problems AND problems that are implicitly being solved by the research (e.g., if text discusses "stabilizing" something, the challenge is instability; if it discusses "improving biocompatibility", the challenge is poor biocompatibility).

If a field is not found, use "Not mentioned" as the value.
"#
    )
}

/// Models routinely wrap JSON in a markdown fence. One surrounding
/// fence is stripped; anything else malformed is a hard failure, never
/// repaired by guessing.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match rest.split_once('\n') {
        Some((_language_tag, body)) => body,
        None => rest,
    };

    body.trim().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_fields(raw: &str) -> Result<ExtractedFields, ExtractionError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|source| ExtractionError::Malformed {
        raw: raw.to_string(),
        source,
    })
}
