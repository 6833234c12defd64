//! GraphRAG CLI
//!
//! Builds a knowledge graph from text files and answers questions over it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use graphrag_agents::{
    GraphRag, GraphRagConfig, IngestReport, TeiClient, TextGenerator, TgiClient,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

type Session = GraphRag<TgiClient, TeiClient>;

/// GraphRAG - local and global question answering over a knowledge graph
#[derive(Parser)]
#[command(name = "graphrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Chunk size in characters (defaults to GRAPHRAG_CHUNK_SIZE or 1000)
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Chunk overlap in characters (defaults to GRAPHRAG_CHUNK_OVERLAP or 200)
    #[arg(long, global = true)]
    overlap: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Entity neighborhood search
    Local,
    /// Community summary search
    Global,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files and answer one question
    Ask {
        /// The question
        question: String,

        /// Documents to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Retrieval mode
        #[arg(short, long, value_enum, default_value_t = Mode::Local)]
        mode: Mode,

        /// Number of entities (local) or communities (global) to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Ingest files and print graph statistics
    Stats {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ingest files and print communities with their summaries
    Communities {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ingest files and write a JSON snapshot
    Export {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Ingest files, then answer questions interactively
    Interactive {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check the generation and embedding services
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs to stderr; stdout carries answers and reports
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let tei = TeiClient::default_local();
    let tgi = TgiClient::default_local();

    if let Commands::Health = cli.command {
        return cmd_health(&tei, &tgi).await;
    }

    let mut config = GraphRagConfig::from_env();
    if let Some(size) = cli.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = cli.overlap {
        config.chunk_overlap = overlap;
    }
    config.validate()?;

    check_services(&tei, &tgi).await?;
    let mut session = GraphRag::new(tgi, tei, config);

    match cli.command {
        Commands::Ask {
            question,
            files,
            mode,
            top_k,
        } => {
            ingest(&mut session, &files).await?;
            cmd_ask(&session, &question, mode, top_k, cli.verbose).await?;
        }
        Commands::Stats { files } => {
            let report = ingest(&mut session, &files).await?;
            print_stats(&report);
        }
        Commands::Communities { files } => {
            ingest(&mut session, &files).await?;
            cmd_communities(&session);
        }
        Commands::Export { files, output } => {
            ingest(&mut session, &files).await?;
            cmd_export(&session, &output)?;
        }
        Commands::Interactive { files } => {
            ingest(&mut session, &files).await?;
            cmd_interactive(&session).await?;
        }
        Commands::Health => {
            // Handled before ingestion.
        }
    }

    Ok(())
}

async fn check_services(tei: &TeiClient, tgi: &TgiClient) -> Result<()> {
    let tei_ok = tei.health().await.unwrap_or(false);
    if !tei_ok {
        eprintln!("Error: embeddings service is not reachable.");
        eprintln!("  TEI (embeddings, {}): {}", tei.provider_name(), tei.base_url());
        anyhow::bail!("Embeddings service unavailable");
    }

    let tgi_ok = tgi.health().await.unwrap_or(false);
    if !tgi_ok {
        eprintln!("Error: generation service is not reachable.");
        eprintln!("  TGI (generation, {}): {}", tgi.provider_name(), tgi.base_url());
        anyhow::bail!("Generation service unavailable");
    }

    Ok(())
}

fn read_documents(files: &[PathBuf]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

async fn ingest(session: &mut Session, files: &[PathBuf]) -> Result<IngestReport> {
    let documents = read_documents(files)?;
    let chunk_size = session.config().chunk_size;
    let report = session
        .insert(documents.as_slice(), chunk_size)
        .await
        .context("Ingestion failed")?;

    info!(
        "Ingested {} documents into {} chunks in {} ms",
        report.document_count,
        report.chunk_count,
        (report.finished_at - report.started_at).num_milliseconds()
    );
    Ok(report)
}

async fn cmd_ask(
    session: &Session,
    question: &str,
    mode: Mode,
    top_k: Option<usize>,
    verbose: bool,
) -> Result<()> {
    let answer = match mode {
        Mode::Local => {
            let top_k = top_k.unwrap_or(session.config().local_top_k);
            if verbose {
                let context = session.local_context(question, top_k).await?;
                eprintln!("Selected entities:");
                for (name, score) in &context.selected {
                    eprintln!("  • {} ({:.3})", name, score);
                }
                session.generator().complete(&context.prompt, None).await?
            } else {
                session.query_local(question, top_k).await?
            }
        }
        Mode::Global => {
            let top_k = top_k.unwrap_or(session.config().global_top_k);
            if verbose {
                let context = session.global_context(question, top_k).await?;
                eprintln!("Selected communities:");
                for (id, score) in &context.selected {
                    eprintln!("  • {} ({:.3})", id, score);
                }
                session.generator().complete(&context.prompt, None).await?
            } else {
                session.query_global(question, top_k).await?
            }
        }
    };

    println!("{}", answer);
    Ok(())
}

fn print_stats(report: &IngestReport) {
    println!("Graph Statistics:");
    println!("  • Documents: {}", report.document_count);
    println!("  • Chunks: {}", report.chunk_count);
    println!("  • Entities: {}", report.stats.entity_count);
    println!("  • Relationships: {}", report.stats.relationship_count);
    println!("  • Average degree: {:.2}", report.stats.avg_degree);
    println!("  • Communities: {}", report.community_count);
}

fn cmd_communities(session: &Session) {
    let (Some(communities), Some(summaries)) = (session.communities(), session.summaries()) else {
        println!("No communities.");
        return;
    };

    if communities.is_empty() {
        println!("No communities.");
        return;
    }

    for (id, members) in communities {
        println!("Community {} ({} members):", id, members.len());
        for member in members {
            println!("  • {}", member);
        }
        if let Some(summary) = summaries.get(id) {
            println!("  Summary: {}", summary.trim());
        }
        println!();
    }
}

fn cmd_export(session: &Session, output: &Path) -> Result<()> {
    let json = session.export_json()?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("✓ Exported snapshot to {}", output.display());
    Ok(())
}

async fn cmd_health(tei: &TeiClient, tgi: &TgiClient) -> Result<()> {
    let tei_ok = tei.health().await.unwrap_or(false);
    let tgi_ok = tgi.health().await.unwrap_or(false);

    println!(
        "TEI (embeddings, {}): {} [{}]",
        tei.provider_name(),
        tei.base_url(),
        if tei_ok { "ok" } else { "unreachable" }
    );
    println!(
        "TGI (generation, {}): {} [{}]",
        tgi.provider_name(),
        tgi.base_url(),
        if tgi_ok { "ok" } else { "unreachable" }
    );

    if !(tei_ok && tgi_ok) {
        anyhow::bail!("One or more services are unavailable");
    }
    Ok(())
}

async fn cmd_interactive(session: &Session) -> Result<()> {
    println!("GraphRAG - Interactive Mode");
    println!("Commands: /local <question>, /global <question>, /stats, /help, /quit");
    println!("A line without a command runs a local search.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let local_top_k = session.config().local_top_k;
    let global_top_k = session.config().global_top_k;

    loop {
        print!("graphrag> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let line = line.trim();
        let (cmd, arg) = match line.split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };

        let result = match cmd {
            "" => continue,
            "/quit" | "/exit" | "/q" => break,
            "/help" | "/h" => {
                println!("/local <question>   search the entity neighborhood");
                println!("/global <question>  search community summaries");
                println!("/stats              show graph statistics");
                println!("/quit               exit");
                continue;
            }
            "/stats" => {
                if let Some(report) = session.last_report() {
                    print_stats(report);
                }
                continue;
            }
            "/local" | "/global" if arg.is_empty() => {
                println!("Usage: {} <question>", cmd);
                continue;
            }
            "/local" => session.query_local(arg, local_top_k).await,
            "/global" => session.query_global(arg, global_top_k).await,
            other if other.starts_with('/') => {
                println!("Unknown command: {} (try /help)", other);
                continue;
            }
            _ => session.query_local(line, local_top_k).await,
        };

        match result {
            Ok(answer) => println!("{}\n", answer.trim()),
            Err(e) => println!("Error: {}", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}
