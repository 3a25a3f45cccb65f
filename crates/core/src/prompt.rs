use crate::error::AskError;
use crate::models::ScoredChunk;

const CONTEXT_SEPARATOR: &str = "\n\n";

fn render(context: &str, question: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer: "
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub text: String,
    /// How many of the ranked chunks made it into the prompt.
    pub context_used: usize,
}

/// Fills the question-answering template with as much ranked context as
/// fits in `max_chars`. Lowest-ranked chunks are dropped first; if even the
/// best chunk alone is too long it is cut to the remaining room.
pub fn assemble_prompt(
    question: &str,
    ranked: &[ScoredChunk],
    max_chars: usize,
) -> Result<AssembledPrompt, AskError> {
    let bare = render("", question);
    let bare_len = bare.chars().count();
    if bare_len >= max_chars {
        return Err(AskError::QuestionTooLong {
            limit: max_chars,
            actual: question.chars().count(),
        });
    }

    for used in (1..=ranked.len()).rev() {
        let context = ranked[..used]
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let text = render(&context, question);
        if text.chars().count() <= max_chars {
            return Ok(AssembledPrompt {
                text,
                context_used: used,
            });
        }
    }

    match ranked.first() {
        Some(best) => {
            let room = max_chars - bare_len;
            let clipped: String = best.chunk.text.chars().take(room).collect();
            Ok(AssembledPrompt {
                text: render(&clipped, question),
                context_used: 1,
            })
        }
        None => Ok(AssembledPrompt {
            text: bare,
            context_used: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn hit(index: u64, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                chunk_id: format!("c{index}"),
                doc_id: "doc-1".to_string(),
                chunk_index: index,
                start_char: 0,
                text: text.to_string(),
            },
            score: 1.0 - index as f32 * 0.1,
        }
    }

    #[test]
    fn template_holds_context_then_question() -> Result<(), AskError> {
        let ranked = vec![hit(0, "Paris is the capital."), hit(1, "Lyon is a city.")];
        let prompt = assemble_prompt("What is the capital?", &ranked, 10_000)?;

        assert_eq!(prompt.context_used, 2);
        let paris = prompt.text.find("Paris is").expect("best chunk in prompt");
        let lyon = prompt.text.find("Lyon is").expect("second chunk in prompt");
        assert!(paris < lyon);
        assert!(prompt.text.ends_with("Query: What is the capital?\nAnswer: "));
        Ok(())
    }

    #[test]
    fn lowest_ranked_context_is_dropped_first() -> Result<(), AskError> {
        let ranked = vec![hit(0, &"a".repeat(100)), hit(1, &"b".repeat(100))];
        let limit = render(&"a".repeat(100), "q").chars().count() + 10;

        let prompt = assemble_prompt("q", &ranked, limit)?;
        assert_eq!(prompt.context_used, 1);
        assert!(!prompt.text.contains("bbbb"));
        assert!(prompt.text.chars().count() <= limit);
        Ok(())
    }

    #[test]
    fn oversized_best_chunk_is_clipped() -> Result<(), AskError> {
        let ranked = vec![hit(0, &"a".repeat(500))];
        let limit = render("", "q").chars().count() + 40;

        let prompt = assemble_prompt("q", &ranked, limit)?;
        assert_eq!(prompt.context_used, 1);
        assert_eq!(prompt.text.chars().count(), limit);
        Ok(())
    }

    #[test]
    fn question_without_room_is_rejected() {
        let result = assemble_prompt(&"why ".repeat(100), &[hit(0, "x")], 120);
        assert!(matches!(result, Err(AskError::QuestionTooLong { .. })));
    }
}
