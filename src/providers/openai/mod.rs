pub mod openai;

pub use openai::{OpenAIProvider, OpenAISettings};
