use crate::database::SearchHit;
use crate::providers::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are a Helpful AI Bot. \
You take the context and question from user. Your answer should be based on the specific context.";

pub const HUMAN_TEMPLATE: &str = "Answer the question based on the given context.
Context:
{context}

Question:
{question}

Answer: ";

/// Chunk texts separated by blank lines.
pub fn format_docs(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System message plus a human message with `{context}` and `{question}` slots.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    system: String,
    human: String,
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            human: HUMAN_TEMPLATE.to_string(),
        }
    }
}

impl ChatTemplate {
    pub fn render(&self, context: &str, question: &str) -> Vec<ChatMessage> {
        let human = fill(&self.human, &[("context", context), ("question", question)]);
        vec![ChatMessage::system(self.system.clone()), ChatMessage::user(human)]
    }
}

/// Single-pass substitution, so values containing `{question}` are left alone.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
