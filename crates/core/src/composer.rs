use crate::error::RagError;
use crate::models::{Answer, ScoredChunk};
use crate::prompt::PromptBuilder;
use crate::traits::LanguageModel;
use tracing::{debug, error};

pub struct AnswerComposer<'a, L> {
    model: &'a L,
    max_context_chars: usize,
}

impl<'a, L> AnswerComposer<'a, L>
where
    L: LanguageModel + Send + Sync,
{
    pub fn new(model: &'a L, max_context_chars: usize) -> Self {
        Self {
            model,
            max_context_chars,
        }
    }

    /// Asks the model with the retrieved chunks as context. The answer cites
    /// exactly the chunks that fit into the prompt.
    pub async fn compose(&self, question: &str, chunks: &[ScoredChunk]) -> Result<Answer, RagError> {
        let prompt = PromptBuilder::build(question, chunks, self.max_context_chars);
        debug!(
            model = self.model.name(),
            included = prompt.included_chunk_ids.len(),
            dropped = prompt.dropped,
            "prompt built"
        );

        let answer = self.model.complete(&prompt.text).await.map_err(|failure| {
            error!(model = self.model.name(), error = %failure, "generation failed");
            failure
        })?;

        Ok(Answer {
            answer: answer.trim().to_string(),
            source_chunk_ids: prompt.included_chunk_ids,
        })
    }
}
