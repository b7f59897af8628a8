use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docmind_core::{
    extract_entities, filter_chunks, load_document, page_heatmap, rank_scored, ChatMessage,
    ChatSession, ChunkingOptions, ExtractionConfig, GeminiGenerator, GeneratorConfig,
    LopdfExtractor, ProcessingStatus, RemoteEngineConfig, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docmind", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Characters per chunk window
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks of a page
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,

    /// Remote extraction engine used when local PDF parsing fails
    #[arg(long, env = "DOCMIND_REMOTE_ENGINE_URL")]
    remote_engine_url: Option<String>,

    /// Bearer token for the remote extraction engine
    #[arg(long, env = "DOCMIND_REMOTE_ENGINE_KEY", hide_env_values = true)]
    remote_engine_key: Option<String>,
}

#[derive(Args)]
struct GeneratorArgs {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Model name
    #[arg(long, default_value = docmind_core::generation::DEFAULT_MODEL)]
    model: String,

    /// Generative Language API base URL
    #[arg(long, default_value = docmind_core::generation::DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Sampling temperature
    #[arg(long, default_value_t = docmind_core::generation::DEFAULT_TEMPERATURE)]
    temperature: f32,
}

impl GeneratorArgs {
    fn into_config(self) -> GeneratorConfig {
        GeneratorConfig {
            api_key: self.api_key,
            model: self.model,
            base_url: self.api_base_url,
            temperature: self.temperature,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the chunks cut from a PDF.
    Chunks {
        #[arg(long)]
        pdf: PathBuf,
        /// Only print chunks from this page.
        #[arg(long)]
        page: Option<u32>,
    },
    /// Rank the chunks of a PDF against a query without calling the model.
    Rank {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Print the score of every returned chunk.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Show entity tags, the page heatmap, and filtered chunks.
    Inspect {
        #[arg(long)]
        pdf: PathBuf,
        /// `p<N>` for a page, anything else for a text match.
        #[arg(long, default_value = "")]
        search: String,
        /// Keep chunks containing any of these tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Ask one grounded question about a PDF.
    Ask {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long)]
        query: String,
        #[command(flatten)]
        generator: GeneratorArgs,
    },
    /// Interactive grounded chat over a PDF.
    Chat {
        #[arg(long)]
        pdf: PathBuf,
        #[command(flatten)]
        generator: GeneratorArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docmind boot"
    );

    let options = ChunkingOptions {
        chunk_size: cli.chunk_size,
        overlap: cli.overlap,
    };
    let extractor = LopdfExtractor::new(ExtractionConfig {
        remote_engine: RemoteEngineConfig::from_parts(cli.remote_engine_url, cli.remote_engine_key),
    });

    match cli.command {
        Command::Chunks { pdf, page } => {
            let loaded = load_document(&pdf, &extractor, options)?;
            println!(
                "document: {} pages={} chunks={} sha256={}",
                loaded.fingerprint.file_name,
                loaded.fingerprint.page_count,
                loaded.chunks.len(),
                loaded.fingerprint.checksum
            );

            for chunk in loaded
                .chunks
                .iter()
                .filter(|chunk| page.map_or(true, |page| chunk.page_number == page))
            {
                println!(
                    "[{}] page={} index={}/{} chars={}",
                    chunk.id,
                    chunk.page_number,
                    chunk.metadata.chunk_index + 1,
                    chunk.metadata.total_chunks,
                    chunk.text.chars().count()
                );
                println!("{}", chunk.text);
            }
        }
        Command::Rank {
            pdf,
            query,
            top_k,
            explain,
        } => {
            let loaded = load_document(&pdf, &extractor, options)?;
            let ranked = rank_scored(&query, &loaded.chunks, top_k);

            println!("query: {query}");
            if ranked.is_empty() {
                println!("no chunk matched the query terms");
            }

            for item in ranked {
                if explain {
                    println!("[{}] page={} score={:.2}", item.chunk.id, item.chunk.page_number, item.score);
                } else {
                    println!("[{}] page={}", item.chunk.id, item.chunk.page_number);
                }
                println!("  {}", item.chunk.text);
            }
        }
        Command::Inspect { pdf, search, tags } => {
            let loaded = load_document(&pdf, &extractor, options)?;
            let entities = extract_entities(&loaded.chunks)?;

            println!("document: {}", loaded.fingerprint.file_name);
            println!("entities: {}", entities.join(", "));
            for (page, count) in page_heatmap(&loaded.chunks) {
                println!("page {page:>4}: {}", "#".repeat(count));
            }

            let filtered = filter_chunks(&loaded.chunks, &search, &tags);
            println!("matching chunks: {}", filtered.len());
            for chunk in filtered {
                println!("[{}] {}", chunk.id, chunk.text);
            }
        }
        Command::Ask {
            pdf,
            query,
            generator,
        } => {
            let generator = GeminiGenerator::new(generator.into_config())?;
            let mut session = ChatSession::new(extractor, generator, options);
            session.load(&pdf)?;

            let reply = session.ask(&query).await?;
            print_reply(&reply);
        }
        Command::Chat { pdf, generator } => {
            let generator = GeminiGenerator::new(generator.into_config())?;
            let mut session = ChatSession::new(extractor, generator, options);
            session.load(&pdf)?;

            if let Some(greeting) = session.messages().first() {
                println!("{}\n", greeting.content);
            }
            println!("type a question, /sources to show the last citations, /quit to leave");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut stdout = tokio::io::stdout();
            let mut last_sources: Vec<String> = Vec::new();

            loop {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };

                match line.trim() {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/sources" => {
                        if last_sources.is_empty() {
                            println!("no sources for the last answer");
                        }
                        for id in &last_sources {
                            if let Some(chunk) = session.chunk_by_id(id) {
                                println!("[{}] page {}\n{}\n", chunk.id, chunk.page_number, chunk.text);
                            }
                        }
                    }
                    question => {
                        let reply = session.ask(question).await?;
                        last_sources = reply.sources.iter().map(|chunk| chunk.id.clone()).collect();
                        print_reply(&reply);
                    }
                }
            }

            if session.state().status == ProcessingStatus::Ready {
                info!(messages = session.messages().len(), "chat session closed");
            }
        }
    }

    Ok(())
}

fn print_reply(reply: &ChatMessage) {
    println!("{}", reply.content);
    if !reply.sources.is_empty() {
        let pages = reply
            .sources
            .iter()
            .map(|chunk| format!("p{} ({})", chunk.page_number, chunk.id))
            .collect::<Vec<_>>();
        println!("sources: {}", pages.join(", "));
    }
    println!();
}
