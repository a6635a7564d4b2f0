//! mailsense - Command-line entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use mailsense::assistant::{ChatSession, EmailSearchTool, OpenAiAssistantClient, ToolRegistry};
use mailsense::config::{self, Settings};
use mailsense::corpus::Corpus;
use mailsense::domain::{AssistantId, ThreadId};
use mailsense::embedding::{CandleEngine, EmbeddingConfig, EmbeddingProvider, SimilarityIndex};
use mailsense::generator::EmailGenerator;
use mailsense::providers::ai::OpenAiCompatibleProvider;

#[derive(Parser)]
#[command(name = "mailsense", version, about = "Semantic search over an email corpus")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default settings file for editing.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Embed every email in the corpus and write the artifact.
    Index {
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rank the corpus against a query.
    Search {
        query: String,
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Talk to the hosted assistant with email search wired in.
    Chat {
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        assistant_id: Option<String>,
        /// Continue an existing thread instead of starting a new one.
        #[arg(long)]
        thread: Option<String>,
    },
    /// Generate a synthetic corpus with a chat model.
    Generate {
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "could not read .env");
        }
    }

    let cli = Cli::parse();
    let settings_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };

    match cli.command {
        Commands::Init { force } => handle_init(&settings_path, force),
        Commands::Index { corpus, output } => {
            let settings = load_settings(&settings_path)?;
            let corpus = corpus.unwrap_or_else(|| settings.index.corpus_dir.clone());
            let output = output.unwrap_or_else(|| settings.index.artifact.clone());
            tokio::task::spawn_blocking(move || handle_index(&settings, &corpus, &output)).await?
        }
        Commands::Search {
            query,
            corpus,
            index,
            top_k,
        } => {
            let settings = load_settings(&settings_path)?;
            let corpus = corpus.unwrap_or_else(|| settings.index.corpus_dir.clone());
            let index = index.unwrap_or_else(|| settings.index.artifact.clone());
            tokio::task::spawn_blocking(move || {
                handle_search(&settings, &corpus, &index, &query, top_k)
            })
            .await?
        }
        Commands::Chat {
            corpus,
            index,
            assistant_id,
            thread,
        } => {
            let settings = load_settings(&settings_path)?;
            let corpus = corpus.unwrap_or_else(|| settings.index.corpus_dir.clone());
            let index = index.unwrap_or_else(|| settings.index.artifact.clone());
            handle_chat(&settings, corpus, index, assistant_id, thread).await
        }
        Commands::Generate {
            output,
            count,
            model,
        } => {
            let settings = load_settings(&settings_path)?;
            let output = output.unwrap_or_else(|| settings.index.corpus_dir.clone());
            handle_generate(&settings, &output, count, model).await
        }
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings =
        Settings::load(path).with_context(|| format!("loading {}", path.display()))?;
    settings.apply_env();
    Ok(settings)
}

fn load_provider(config: EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let engine = CandleEngine::load(config).context("loading the embedding model")?;
    Ok(Arc::new(engine))
}

fn handle_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }
    Settings::default()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn handle_index(settings: &Settings, corpus_dir: &Path, output: &Path) -> Result<()> {
    let corpus = Corpus::load(corpus_dir)?;
    let provider = load_provider(settings.embedding.clone())?;

    let index = SimilarityIndex::build(provider, &corpus.bodies())?;
    index
        .persist(output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Indexed {} emails into {}", index.len(), output.display());
    Ok(())
}

fn handle_search(
    settings: &Settings,
    corpus_dir: &Path,
    index_path: &Path,
    query: &str,
    top_k: usize,
) -> Result<()> {
    let corpus = Corpus::load(corpus_dir)?;
    let provider = load_provider(settings.embedding.clone())?;
    let index = SimilarityIndex::open(provider, index_path)?;

    anyhow::ensure!(
        index.len() == corpus.len(),
        "{} has {} rows but {} holds {} emails; run `mailsense index` again",
        index_path.display(),
        index.len(),
        corpus_dir.display(),
        corpus.len()
    );

    for result in index.top_k(query, top_k)? {
        let doc = corpus
            .get(result.index)
            .with_context(|| format!("row {} missing from the corpus", result.index))?;
        println!("{:>4}  {:+.4}  {}", result.index, result.score, doc.email.subject);
        println!("      {}", doc.email.snippet(120));
    }
    Ok(())
}

async fn handle_chat(
    settings: &Settings,
    corpus_dir: PathBuf,
    index_path: PathBuf,
    assistant_id: Option<String>,
    thread: Option<String>,
) -> Result<()> {
    let api_key = config::api_key().context("set OPENAI_API_KEY to chat")?;
    let assistant_id = assistant_id
        .or_else(|| settings.assistant.assistant_id.clone())
        .context("no assistant id; pass --assistant-id or set MAILSENSE_ASSISTANT_ID")?;

    let embedding = settings.embedding.clone();
    let top_k = settings.index.top_k;
    let search = tokio::task::spawn_blocking(move || -> Result<EmailSearchTool> {
        let corpus = Corpus::load(&corpus_dir)?;
        let provider = load_provider(embedding)?;
        let index = SimilarityIndex::open(provider, &index_path)?;
        Ok(EmailSearchTool::new(Arc::new(index), Arc::new(corpus), top_k)?)
    })
    .await??;
    let tools = ToolRegistry::new().with_tool(search);

    let mut client = OpenAiAssistantClient::new(api_key);
    if let Some(base_url) = &settings.assistant.base_url {
        client = client.with_base_url(base_url);
    }

    let mut session = ChatSession::new(
        Arc::new(client),
        AssistantId::from(assistant_id),
        Arc::new(tools),
    )
    .with_backoff(settings.assistant.poll.backoff())
    .with_max_polls(settings.assistant.max_polls);
    if let Some(thread) = thread {
        session = session.with_thread(ThreadId::from(thread));
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ask anything about your emails. Ctrl-D to quit.");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match session.send(line).await {
            Ok(reply) => println!("{reply}\n"),
            Err(e) => tracing::error!(error = %e, "assistant turn failed"),
        }
    }

    if let Some(thread) = session.thread() {
        println!("Thread {thread}; pass --thread {thread} to continue it.");
    }
    Ok(())
}

async fn handle_generate(
    settings: &Settings,
    output: &Path,
    count: usize,
    model: Option<String>,
) -> Result<()> {
    let api_key = config::api_key().context("set OPENAI_API_KEY to generate emails")?;

    let mut generator_config = settings.generator.clone();
    if let Some(model) = model {
        generator_config.model = model;
    }
    let provider = OpenAiCompatibleProvider::openai(api_key, generator_config.model.clone());
    let generator = EmailGenerator::new(Arc::new(provider), generator_config);

    let written = generator.generate(count, output).await?;
    println!("Wrote {} emails to {}", written.len(), output.display());
    Ok(())
}
