use crate::models::ScoredChunk;

/// Sentence the model is told to use when the context does not answer the question.
pub const INSUFFICIENT_CONTEXT_REPLY: &str =
    "I'm sorry, but the provided document does not contain enough information to answer that question.";

const SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    /// Chunks that made it into the context, in the order given.
    pub included_chunk_ids: Vec<String>,
    pub dropped: usize,
}

pub struct PromptBuilder;

impl PromptBuilder {
    /// Lays chunks out best first and drops them from the tail once the
    /// context would exceed `max_context_chars`. A top chunk that is too large
    /// on its own is cut down instead of dropped.
    pub fn build_context(chunks: &[ScoredChunk], max_context_chars: usize) -> (String, Vec<String>) {
        let mut context = String::new();
        let mut used = 0usize;
        let mut included = Vec::new();

        for (position, scored) in chunks.iter().enumerate() {
            let block = format!("[{}] {}", scored.chunk.chunk_id, scored.chunk.text);
            let separator = if context.is_empty() { 0 } else { SEPARATOR.len() };
            let block_len = block.chars().count();

            if used + separator + block_len > max_context_chars {
                if position == 0 && max_context_chars > 0 {
                    context = block.chars().take(max_context_chars).collect();
                    included.push(scored.chunk.chunk_id.clone());
                }
                break;
            }

            if separator > 0 {
                context.push_str(SEPARATOR);
            }
            context.push_str(&block);
            used += separator + block_len;
            included.push(scored.chunk.chunk_id.clone());
        }

        (context, included)
    }

    pub fn build(question: &str, chunks: &[ScoredChunk], max_context_chars: usize) -> BuiltPrompt {
        let (context, included_chunk_ids) = Self::build_context(chunks, max_context_chars);
        let dropped = chunks.len() - included_chunk_ids.len();

        let text = format!(
            r#"Instructions:
You answer questions about a single document using ONLY the Context below.

- Base every statement on the Context. Do not use outside knowledge and do not guess.
- If wording differs, you may match closely related phrases in the Context, but never invent facts.
- If the Context does not contain the answer, reply exactly: "{insufficient}"
- Keep the answer concise, clear and polite. Do not ask the user for personal information.

Context:
{context}

User's Question: {question}

Answer:"#,
            insufficient = INSUFFICIENT_CONTEXT_REPLY,
            context = context,
            question = question.trim(),
        );

        BuiltPrompt {
            text,
            included_chunk_ids,
            dropped,
        }
    }
}
