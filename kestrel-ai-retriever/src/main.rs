use clap::{Args as ClapArgs, Parser, Subcommand};
use kestrel_ai_embed::{EmbedConfig, EmbedProviderKind, EmbeddingProvider, create_provider};
use kestrel_ai_retriever::{
    KnowledgeStore, Retriever, VectorStore, storage::sqlite_store::SqliteStore,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A CLI tool to administer kestrel-ai vector collections stored in SQLite.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite vector database
    #[arg(short, long, default_value = ".kestrel-ai.db")]
    db: PathBuf,

    /// Collection to operate on
    #[arg(short, long, default_value = "monitor")]
    collection: String,

    #[command(flatten)]
    embedding: EmbeddingArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Embedder used by `search`, and by `init` when no dimension is given.
#[derive(ClapArgs, Debug)]
struct EmbeddingArgs {
    /// Embedding provider (ollama, openai or fastembed)
    #[arg(long, default_value = "ollama")]
    embedding_provider: String,

    /// Embedding model name
    #[arg(long, default_value = "nomic-embed-text:latest")]
    embedding_model: String,

    /// Embedding service URL, when not the provider default
    #[arg(long)]
    embedding_url: Option<String>,
}

impl EmbeddingArgs {
    fn config(&self) -> anyhow::Result<EmbedConfig> {
        let provider: EmbedProviderKind = self.embedding_provider.parse()?;
        let mut config = EmbedConfig::new(provider, self.embedding_model.clone());
        if let Some(url) = &self.embedding_url {
            config = config.with_base_url(url.clone());
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if provider == EmbedProviderKind::OpenAi {
                config = config.with_api_key(key);
            }
        }
        Ok(config)
    }

    async fn provider(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        Ok(create_provider(&self.config()?).await?)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the collection
    Init {
        /// Vector dimension; asks the embedder when omitted
        #[arg(long)]
        dimension: Option<usize>,
    },
    /// Show collection statistics
    Stats,
    /// List stored passages
    List {
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search the collection with a text query
    Search {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = 4)]
        top_k: usize,
        /// Minimum similarity score
        #[arg(short, long, default_value_t = 0.7)]
        threshold: f32,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let store = SqliteStore::open(&args.db, args.collection.clone()).await?;

    let result = match args.command {
        Commands::Init { dimension } => {
            let dimension = match dimension {
                Some(dimension) => dimension,
                None => args.embedding.provider().await?.embedding_dimension(),
            };
            store.create_collection(dimension).await?;
            println!(
                "Initialized collection '{}' (dimension {}) in {}",
                args.collection,
                dimension,
                args.db.display()
            );
            Ok(())
        }
        Commands::Stats => {
            match store.collection_info().await? {
                Some(info) => {
                    println!("Collection Statistics:");
                    println!("  Name: {}", info.name);
                    println!("  Dimension: {}", info.dimension);
                    println!("  Passages: {}", info.points);
                    println!("  Database: {}", args.db.display());
                }
                None => println!(
                    "Collection '{}' does not exist in {}",
                    args.collection,
                    args.db.display()
                ),
            }
            Ok(())
        }
        Commands::List { limit, format } => {
            let passages = store.list(limit).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&passages)?),
                OutputFormat::Summary => {
                    println!("Found {} passages:", passages.len());
                    for passage in passages {
                        let source = passage.metadata.get("source").map_or("-", |s| s.as_str());
                        println!(
                            "  {} | {} | {}",
                            &passage.id[..12.min(passage.id.len())],
                            source,
                            preview(&passage.text)
                        );
                    }
                }
                OutputFormat::Full => {
                    for passage in passages {
                        println!("ID: {}", passage.id);
                        for (key, value) in &passage.metadata {
                            println!("{key}: {value}");
                        }
                        println!("Content:\n{}", passage.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            format,
        } => {
            let knowledge =
                KnowledgeStore::new(args.embedding.provider().await?, Arc::new(store.clone()));
            knowledge.verify().await?;
            let retriever = Retriever::new(knowledge, top_k, threshold)?;
            let passages = retriever.retrieve(&query).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&passages)?),
                OutputFormat::Summary => {
                    println!("Found {} similar passages:", passages.len());
                    for passage in passages {
                        println!("  Similarity: {:.3} | {}", passage.score, preview(&passage.text));
                    }
                }
                OutputFormat::Full => {
                    for passage in passages {
                        println!("Similarity: {:.3}", passage.score);
                        for (key, value) in &passage.metadata {
                            println!("{key}: {value}");
                        }
                        println!("Content:\n{}", passage.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
    };

    store.close().await;
    result
}
