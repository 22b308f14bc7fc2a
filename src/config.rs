use clap::{Args, ValueEnum};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read credential file {path}: {source}")]
    CredentialFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Credential file {0} is empty")]
    EmptyCredential(PathBuf),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Gemini,
    Openai,
}

impl ProviderKind {
    pub fn default_api_base(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn default_chat_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-pro-latest",
            ProviderKind::Openai => "gpt-4-turbo-preview",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "models/embedding-001",
            ProviderKind::Openai => "text-embedding-3-small",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// SQLite file inside the persist directory.
    Local,
    Qdrant,
}

/// Runtime settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct RagConfig {
    /// PDF document to answer questions about.
    #[arg(long, env = "PAPERQA_PDF", default_value = "leavenocontext.pdf")]
    pub pdf_path: PathBuf,

    /// File holding the API key. Ignored when the key is set in the environment.
    #[arg(long, env = "PAPERQA_API_KEY_FILE", default_value = "api_key.txt")]
    pub api_key_file: PathBuf,

    #[arg(long, env = "PAPERQA_PROVIDER", value_enum, default_value_t = ProviderKind::Gemini)]
    pub provider: ProviderKind,

    #[arg(long, env = "PAPERQA_CHAT_MODEL")]
    pub chat_model: Option<String>,

    #[arg(long, env = "PAPERQA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Override the provider's API base URL.
    #[arg(long, env = "PAPERQA_API_BASE")]
    pub api_base: Option<String>,

    #[arg(long, env = "PAPERQA_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, env = "PAPERQA_STORE", value_enum, default_value_t = StoreKind::Local)]
    pub store: StoreKind,

    /// Directory the local vector store is persisted to.
    #[arg(long, env = "PAPERQA_PERSIST_DIR", default_value = "./chroma_db_")]
    pub persist_dir: PathBuf,

    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6334")]
    pub qdrant_url: String,

    #[arg(long, env = "PAPERQA_COLLECTION", default_value = "paper_chunks")]
    pub collection: String,

    /// Maximum chunk length in characters.
    #[arg(long, default_value_t = 500)]
    pub chunk_size: usize,

    /// Characters carried over between consecutive chunks.
    #[arg(long, default_value_t = 100)]
    pub chunk_overlap: usize,

    /// Number of chunks handed to the model per question.
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    #[arg(long, env = "PAPERQA_EMBED_BATCH", default_value_t = 32)]
    pub embed_batch_size: usize,

    #[arg(long, env = "PAPERQA_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    #[arg(long, env = "PAPERQA_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    #[arg(long, env = "PAPERQA_BIND", default_value = "127.0.0.1:8501")]
    pub bind: SocketAddr,

    #[arg(
        long,
        env = "PAPERQA_TITLE",
        default_value = "📃Clarify your Doubts on paper \"Leave No Context\"🛫"
    )]
    pub title: String,

    #[arg(
        long,
        env = "PAPERQA_SUBTITLE",
        default_value = "An ai driven question answer system on paper leave no context"
    )]
    pub subtitle: String,
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top-k must be at least 1".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError::Invalid("embedding batch size must be at least 1".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection name is required".to_string()));
        }
        Ok(())
    }

    pub fn chat_model(&self) -> String {
        self.chat_model
            .clone()
            .unwrap_or_else(|| self.provider.default_chat_model().to_string())
    }

    pub fn embedding_model(&self) -> String {
        self.embedding_model
            .clone()
            .unwrap_or_else(|| self.provider.default_embedding_model().to_string())
    }

    pub fn api_base(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| self.provider.default_api_base().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Environment first, credential file second.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        let env_names: &[&str] = match self.provider {
            ProviderKind::Gemini => &["PAPERQA_API_KEY", "GOOGLE_API_KEY"],
            ProviderKind::Openai => &["PAPERQA_API_KEY", "OPENAI_API_KEY"],
        };
        for name in env_names {
            if let Ok(key) = env::var(name) {
                if !key.trim().is_empty() {
                    return Ok(key.trim().to_string());
                }
            }
        }
        read_api_key(&self.api_key_file)
    }
}

pub fn read_api_key(path: &Path) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialFile {
        path: path.to_path_buf(),
        source,
    })?;
    let key = raw.trim();
    if key.is_empty() {
        return Err(ConfigError::EmptyCredential(path.to_path_buf()));
    }
    Ok(key.to_string())
}
