use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_qa_core::{
    discover_pdf_files, AskError, CharacterNgramEmbedder, DocumentQa, EmbeddingClient,
    FsIndexStore, GenerationClient, OpenAiChat, OpenAiConfig, OpenAiEmbeddings, PipelineOptions,
    Readiness, RetryPolicy,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use unconfigured::Unconfigured;

mod unconfigured;

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding uploaded PDFs and their indexes.
    #[arg(long, env = "PDF_QA_STORAGE_DIR", default_value = "./pdf-qa-data")]
    storage_dir: PathBuf,

    /// API key for the hosted embedding and completion models.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1/")]
    openai_base_url: String,

    /// Embedding model name.
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Output size of the embedding model.
    #[arg(long, default_value = "1536")]
    embedding_dimensions: usize,

    /// Completion model name.
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Which embedder builds and queries indexes.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// Chunk length in characters.
    #[arg(long, default_value = "512")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, default_value = "50")]
    chunk_overlap: usize,

    /// Number of chunks placed in the prompt.
    #[arg(long, default_value = "2")]
    top_k: usize,

    /// Seconds to wait for each provider call.
    #[arg(long, default_value = "30")]
    provider_timeout_secs: u64,

    /// Total attempts per provider call, including the first.
    #[arg(long, default_value = "1")]
    retry_attempts: usize,

    /// Keep at most this many indexes in memory.
    #[arg(long)]
    cache_capacity: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Hosted embedding model.
    Openai,
    /// Offline character trigram hashing.
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a PDF, or every PDF under a folder, and wait for indexing.
    Submit {
        #[arg(long)]
        path: PathBuf,
        /// Give up waiting for a build after this many seconds.
        #[arg(long, default_value = "600")]
        wait_secs: u64,
    },
    /// Print the readiness of a document.
    Status {
        #[arg(long)]
        doc_id: String,
    },
    /// Ask one question about a ready document.
    Ask {
        #[arg(long)]
        doc_id: String,
        #[arg(long)]
        question: String,
        /// Print the chunks the answer was grounded on.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Rebuild a document's index from its stored bytes.
    Reindex {
        #[arg(long)]
        doc_id: String,
        #[arg(long, default_value = "600")]
        wait_secs: u64,
    },
    /// Ask questions about one document until end of input.
    Chat {
        #[arg(long)]
        doc_id: String,
    },
}

impl Cli {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts.max(1),
                ..RetryPolicy::default()
            },
            cache_capacity: self.cache_capacity,
            ..PipelineOptions::default()
        }
    }

    fn openai_config(&self) -> Option<OpenAiConfig> {
        let api_key = self.openai_api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        let mut config = OpenAiConfig::new(api_key);
        config.base_url = self.openai_base_url.clone();
        config.embedding_model = self.embedding_model.clone();
        config.embedding_dimensions = self.embedding_dimensions;
        config.chat_model = self.chat_model.clone();
        Some(config)
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
        Ok(match (self.embedder, self.openai_config()) {
            (EmbedderKind::Ngram, _) => Arc::new(CharacterNgramEmbedder::default()),
            (EmbedderKind::Openai, Some(config)) => Arc::new(OpenAiEmbeddings::new(config)?),
            (EmbedderKind::Openai, None) => {
                Arc::new(Unconfigured::new(&self.embedding_model))
            }
        })
    }

    fn generator(&self) -> anyhow::Result<Arc<dyn GenerationClient>> {
        Ok(match self.openai_config() {
            Some(config) => Arc::new(OpenAiChat::new(config)?),
            None => Arc::new(Unconfigured::new(&self.chat_model)),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let store = Arc::new(FsIndexStore::new(&cli.storage_dir));
    let qa = DocumentQa::new(store, cli.embedder()?, cli.generator()?, cli.options())
        .context("invalid pipeline options")?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        storage_dir = %cli.storage_dir.display(),
        "pdf-qa boot"
    );

    match cli.command {
        Command::Submit { path, wait_secs } => {
            submit(&qa, &path, Duration::from_secs(wait_secs)).await?;
        }
        Command::Status { doc_id } => {
            let state = qa.readiness(&doc_id).await?;
            println!("{doc_id}\t{state}");
        }
        Command::Ask {
            doc_id,
            question,
            show_sources,
        } => {
            let answer = qa.ask(&doc_id, &question).await?;
            println!("{}", answer.text.trim());
            if show_sources {
                for source in &answer.sources {
                    println!(
                        "  [chunk {}] score={:.4} start_char={}",
                        source.chunk.chunk_index, source.score, source.chunk.start_char
                    );
                    println!("  {}", preview(&source.chunk.text, 160));
                }
            }
        }
        Command::Reindex { doc_id, wait_secs } => {
            qa.reindex(&doc_id).await?;
            let state = qa
                .wait_until_settled(&doc_id, Duration::from_secs(wait_secs))
                .await?;
            println!("{doc_id}\t{state}");
        }
        Command::Chat { doc_id } => chat(&qa, &doc_id).await?,
    }

    Ok(())
}

/// Background builds die with the process, so every submission is awaited.
async fn submit(qa: &DocumentQa, path: &Path, wait: Duration) -> anyhow::Result<()> {
    let files = if path.is_dir() {
        discover_pdf_files(path)
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        bail!("{} is neither a file nor a folder", path.display());
    };

    if files.is_empty() {
        println!("no PDFs found under {}", path.display());
        return Ok(());
    }

    let mut submitted = Vec::with_capacity(files.len());
    for file in files {
        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        match qa.submit_document(bytes, &filename).await {
            Ok(doc_id) => {
                println!("{doc_id}\t{}", file.display());
                submitted.push((doc_id, file));
            }
            Err(error) => warn!(path = %file.display(), error = %error, "skipped pdf"),
        }
    }

    let mut ready = 0usize;
    for (doc_id, file) in &submitted {
        let state = qa.wait_until_settled(doc_id, wait).await?;
        if state.is_ready() {
            ready += 1;
        }
        println!("{doc_id}\t{state}\t{}", file.display());
    }
    info!(submitted = submitted.len(), ready, "submission finished");
    Ok(())
}

struct ChatTurn {
    question: String,
    answer: String,
}

async fn chat(qa: &DocumentQa, doc_id: &str) -> anyhow::Result<()> {
    match qa.readiness(doc_id).await? {
        Readiness::Ready => {}
        Readiness::Unknown => bail!(AskError::DocumentUnknown(doc_id.to_string())),
        other => bail!("document {doc_id} is {other}"),
    }

    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for (turn_no, turn) in history.iter().enumerate() {
                    println!("{}. Q: {}", turn_no + 1, turn.question);
                    println!("   A: {}", turn.answer);
                }
                continue;
            }
            _ => {}
        }

        match qa.ask(doc_id, question).await {
            Ok(answer) => {
                let text = answer.text.trim().to_string();
                println!("{text}");
                history.push(ChatTurn {
                    question: question.to_string(),
                    answer: text,
                });
            }
            Err(error) => {
                warn!(doc_id, error = %error, "chat turn failed");
                println!("error: {error}");
            }
        }
    }

    info!(doc_id, turns = history.len(), "chat ended");
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push_str("...");
    }
    preview
}
