use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;

use paperqa::api::{self, AppState};
use paperqa::config::RagConfig;
use paperqa::database::{open_store, VectorStore};
use paperqa::document::{PdfLoader, TextSplitter};
use paperqa::llm::{
    ensure_index, ingest_document, IngestOptions, IngestReport, RagChain, RagError, Retriever,
};
use paperqa::providers::Providers;

#[derive(Parser, Debug)]
#[command(author, version, about = "Question answering over a research paper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: RagConfig,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index the paper and serve the question page (default)
    Serve {
        /// Skip ingestion when the store already holds chunks
        #[arg(long)]
        reuse_index: bool,
    },
    /// Rebuild the index and exit
    Ingest,
    /// Answer a single question on the terminal
    Ask {
        question: Vec<String>,
        /// Re-ingest the paper even if the store already holds chunks
        #[arg(long)]
        rebuild: bool,
    },
}

struct Pipeline {
    providers: Providers,
    store: Arc<dyn VectorStore>,
    loader: PdfLoader,
    splitter: TextSplitter,
    options: IngestOptions,
}

impl Pipeline {
    async fn build(config: &RagConfig, show_progress: bool) -> anyhow::Result<Self> {
        config.validate().context("Invalid configuration")?;
        let api_key = config.api_key().context("Failed to load API key")?;
        let providers = Providers::from_config(config, api_key).context("Failed to create model provider")?;
        log::info!(
            "Using chat model {} and embedding model {}",
            providers.chat.model_name(),
            providers.embeddings.model_name()
        );
        let store = open_store(config).await.context("Failed to open vector store")?;

        Ok(Self {
            providers,
            store,
            loader: PdfLoader::new(&config.pdf_path),
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            options: IngestOptions {
                batch_size: config.embed_batch_size,
                show_progress,
            },
        })
    }

    async fn prepare(&self, reuse: bool) -> anyhow::Result<Option<IngestReport>> {
        ensure_index(
            &self.loader,
            &self.splitter,
            &self.providers.embeddings,
            &self.store,
            &self.options,
            reuse,
        )
        .await
        .with_context(|| format!("Failed to index {}", self.loader.path().display()))
    }

    fn chain(&self, top_k: usize) -> RagChain {
        let retriever = Retriever::new(self.providers.embeddings.clone(), self.store.clone(), top_k);
        RagChain::new(retriever, self.providers.chat.clone())
    }
}

fn print_report(report: &IngestReport) {
    println!(
        "{} {} pages, {} chunks, {} dims in {:.1}s",
        "Indexed".green().bold(),
        report.pages,
        report.chunks,
        report.dimensions,
        report.elapsed.as_secs_f64()
    );
}

async fn run_server(config: &RagConfig, reuse: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::build(config, true).await?;
    if let Some(report) = pipeline.prepare(reuse).await? {
        print_report(&report);
    }

    let state = AppState::new(Arc::new(pipeline.chain(config.top_k)), &config.title, &config.subtitle);
    let app = api::create_api(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    log::info!("Server successfully bound to {}", config.bind);
    println!("{} http://{}", "Open".cyan().bold(), config.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn run_ingest(config: &RagConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::build(config, true).await?;
    let report = ingest_document(
        &pipeline.loader,
        &pipeline.splitter,
        &pipeline.providers.embeddings,
        &pipeline.store,
        &pipeline.options,
    )
    .await
    .with_context(|| format!("Failed to index {}", config.pdf_path.display()))?;
    print_report(&report);
    Ok(())
}

async fn run_ask(config: &RagConfig, question: &str, reuse: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::build(config, false).await?;
    pipeline.prepare(reuse).await?;

    match pipeline.chain(config.top_k).invoke(question).await {
        Ok(answer) if answer.is_empty() => {
            println!("{}", "Please enter the questions related to the given paper".yellow());
        }
        Ok(answer) => {
            println!("{}", "View solution :".bright_blue().bold());
            println!("{}", answer.text);
            for source in &answer.sources {
                println!(
                    "{}",
                    format!("  p.{} ({:.3}) {}", source.page, source.score, source.excerpt).dimmed()
                );
            }
        }
        Err(RagError::EmptyQuestion) => {
            println!("{}", RagError::EmptyQuestion.to_string().yellow());
        }
        Err(e) => {
            log::error!("Failed to answer question: {}", e);
            println!("{}", format!("Error occurred: {}", e).red());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve { reuse_index: false }) {
        Command::Serve { reuse_index } => run_server(&cli.config, reuse_index).await,
        Command::Ingest => run_ingest(&cli.config).await,
        Command::Ask { question, rebuild } => run_ask(&cli.config, &question.join(" "), !rebuild).await,
    }
}
