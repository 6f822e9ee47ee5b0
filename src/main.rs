//! # Sahayak CLI (`sahayak`)
//!
//! Command-line front-end for the answer engine: build the knowledge index,
//! ask grounded questions, run the loan eligibility evaluator and start the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! sahayak --config ./config/sahayak.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sahayak init` | Create the SQLite database and run schema migrations |
//! | `sahayak ingest [path]` | Ingest the knowledge folder, a sub-folder or one file |
//! | `sahayak remove <source>` | Remove a source and its chunks |
//! | `sahayak search "<query>"` | Retrieval only, ranked chunks with scores |
//! | `sahayak ask "<question>"` | Full pipeline: retrieve, assemble, generate |
//! | `sahayak explain term|scheme <name>` | Phrase and answer an explanation question |
//! | `sahayak reindex` | Re-embed every chunk and swap in a fresh index |
//! | `sahayak status` | Store and index counters |
//! | `sahayak eligibility ...` | Evaluate a loan applicant profile |
//! | `sahayak serve` | Start the HTTP server |
//! | `sahayak completions <shell>` | Print shell completions |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sahayak_rag::config::{load_config, Config};
use sahayak_rag::eligibility::{evaluate, ApplicantProfile};
use sahayak_rag::engine::{AskOptions, RagEngine};
use sahayak_rag::ingest::FolderReport;
use sahayak_rag::models::AnsweredQuery;
use sahayak_rag::retriever::{RetrieveOptions, MAX_TOP_K};
use sahayak_rag::server;
use sahayak_rag::store::SqliteStore;

/// Sahayak: grounded answers over a curated financial-literacy knowledge base.
///
/// All commands except `completions` read a TOML configuration file named by
/// `--config`.
#[derive(Parser)]
#[command(
    name = "sahayak",
    about = "Sahayak: grounded question answering over a curated knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sahayak.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest documents into the store and the vector index.
    ///
    /// Without a path the configured `[knowledge].root` is scanned.
    /// Unchanged sources are skipped.
    Ingest {
        /// A file or folder. Defaults to the knowledge root.
        path: Option<PathBuf>,

        /// Re-ingest sources even when their content is unchanged.
        #[arg(long)]
        full: bool,

        /// Remove stored sources that no longer exist in the folder.
        #[arg(long)]
        prune: bool,
    },

    /// Remove a source (as listed by `status`) and its chunks.
    Remove {
        source_path: String,
    },

    /// Retrieve the chunks most similar to a query.
    Search {
        query: String,

        #[arg(long, value_parser = parse_top_k)]
        top_k: Option<usize>,

        #[arg(long)]
        min_similarity: Option<f32>,
    },

    /// Answer a question from the knowledge base.
    Ask {
        question: String,

        #[arg(long, value_parser = parse_top_k)]
        top_k: Option<usize>,

        /// Do not append the `Sources:` footer.
        #[arg(long)]
        no_sources: bool,

        /// Print the full answer trace as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Explain a financial term or a government scheme.
    Explain {
        #[command(subcommand)]
        topic: ExplainTopic,
    },

    /// Re-embed every stored chunk with the configured embedder.
    Reindex,

    /// Show store and index status.
    Status,

    /// Evaluate loan eligibility and EMI for an applicant.
    Eligibility {
        /// Annual income in rupees.
        #[arg(long)]
        income_annum: f64,

        /// Requested loan amount in rupees.
        #[arg(long)]
        loan_amount: f64,

        /// Loan term: years when at most 20, months otherwise.
        #[arg(long)]
        loan_term: f64,

        #[arg(long)]
        cibil_score: f64,

        #[arg(long, default_value_t = 0)]
        dependents: u32,

        /// Print the month-by-month amortisation table.
        #[arg(long)]
        schedule: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ExplainTopic {
    /// e.g. `sahayak explain term "CIBIL score"`
    Term { name: String },
    /// e.g. `sahayak explain scheme "PM Kisan"`
    Scheme { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "sahayak", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Eligibility {
            income_annum,
            loan_amount,
            loan_term,
            cibil_score,
            dependents,
            schedule,
        } => {
            let profile = ApplicantProfile {
                income_annum: *income_annum,
                loan_amount: *loan_amount,
                loan_term: *loan_term,
                cibil_score: *cibil_score,
                no_of_dependents: *dependents,
            };
            print_eligibility(&profile, *schedule)?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg.db.path).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, full, prune } => {
            let engine = open_engine(cfg).await?;
            match path {
                Some(p) if p.is_file() => {
                    let report = engine.ingest_path(&p, full).await?;
                    println!(
                        "{}: {:?} (version {}, {} chunks)",
                        report.source_path, report.status, report.version, report.chunks
                    );
                }
                other => {
                    let report = engine.ingest_folder(other.as_deref(), full, prune).await?;
                    print_folder_report(&report);
                }
            }
        }
        Commands::Remove { source_path } => {
            let engine = open_engine(cfg).await?;
            if engine.remove_source(&source_path).await? {
                println!("Removed {}", source_path);
            } else {
                println!("No source named {}", source_path);
            }
        }
        Commands::Search {
            query,
            top_k,
            min_similarity,
        } => {
            let engine = open_engine(cfg).await?;
            let result = engine
                .search(
                    &query,
                    RetrieveOptions {
                        top_k,
                        min_similarity,
                    },
                )
                .await?;
            if result.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in result.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} #{}",
                    rank + 1,
                    hit.score,
                    hit.chunk.source_path,
                    hit.chunk.ordinal
                );
                println!("   {}", snippet(&hit.chunk.text, 160));
            }
        }
        Commands::Ask {
            question,
            top_k,
            no_sources,
            json,
        } => {
            let engine = open_engine(cfg).await?;
            let options = AskOptions {
                retrieve: RetrieveOptions {
                    top_k,
                    min_similarity: None,
                },
                include_sources: no_sources.then_some(false),
            };
            let answered = engine.ask_with(&question, options).await;
            print_answer(&answered, json)?;
        }
        Commands::Explain { topic } => {
            let engine = open_engine(cfg).await?;
            let answered = match topic {
                ExplainTopic::Term { name } => engine.explain_term(&name).await,
                ExplainTopic::Scheme { name } => engine.explain_scheme(&name).await,
            };
            print_answer(&answered, false)?;
        }
        Commands::Reindex => {
            let engine = open_engine(cfg).await?;
            let report = engine.reindex().await?;
            println!(
                "Reindexed {} chunks with {} (index version {})",
                report.chunks, report.model_id, report.index_version
            );
        }
        Commands::Status => {
            let engine = open_engine(cfg).await?;
            let status = engine.status().await?;
            println!("documents:           {}", status.documents);
            println!("chunks:              {}", status.chunks);
            println!("embeddings:          {}", status.embeddings);
            println!("index chunks:        {}", status.index_chunks);
            println!("index version:       {}", status.index_version);
            println!(
                "index dims:          {}",
                status.index_dims.map_or("-".to_string(), |d| d.to_string())
            );
            println!("embedding model:     {}", status.embedding_model);
            println!("generation model:    {}", status.generation_model);
            println!("generator available: {}", status.generator_available);
            println!("rebuild required:    {}", status.rebuild_required);
            for source in engine.store().list_sources().await? {
                println!(
                    "  {} (v{}, {} chunks)",
                    source.source_path, source.version, source.chunk_count
                );
            }
        }
        Commands::Serve => {
            let engine = open_engine(cfg).await?;
            server::run_server(Arc::new(engine)).await?;
        }
        Commands::Completions { .. } | Commands::Eligibility { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

async fn open_engine(cfg: Config) -> anyhow::Result<RagEngine> {
    Ok(RagEngine::open(cfg).await?)
}

fn print_folder_report(report: &FolderReport) {
    println!("Scanned {} files", report.scanned);
    for r in &report.indexed {
        println!("  indexed {} (version {}, {} chunks)", r.source_path, r.version, r.chunks);
    }
    println!("  unchanged: {}", report.unchanged);
    for removed in &report.removed {
        println!("  removed {}", removed);
    }
    for failure in &report.failed {
        println!("  FAILED {}: {}", failure.source_path, failure.error);
    }
}

fn print_answer(answered: &AnsweredQuery, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answered)?);
        return Ok(());
    }
    println!("{}", answered.generated_answer.answer_text);
    println!();
    println!(
        "outcome: {:?}, confidence: {:.2}, chunks retrieved: {}",
        answered.generated_answer.outcome,
        answered.confidence,
        answered.retrieval_results.len()
    );
    Ok(())
}

fn print_eligibility(profile: &ApplicantProfile, schedule: bool) -> anyhow::Result<()> {
    let result = evaluate(profile)?;
    println!("eligible:           {}", result.eligible);
    println!("interest rate:      {}%", result.interest_rate);
    println!("max amount:         {:.2}", result.max_amount);
    println!("recommended amount: {:.2}", result.recommended_amount);
    println!("tenure:             {} months", result.tenure_months);
    println!("EMI:                {:.2}", result.emi);
    for reason in &result.reasons {
        println!("  - {}", reason);
    }
    if schedule {
        println!("{:>5} {:>12} {:>12} {:>12} {:>14}", "month", "emi", "principal", "interest", "balance");
        for row in &result.emi_schedule {
            println!(
                "{:>5} {:>12.2} {:>12.2} {:>12.2} {:>14.2}",
                row.month, row.emi, row.principal, row.interest, row.balance
            );
        }
    }
    Ok(())
}

fn parse_top_k(s: &str) -> Result<usize, String> {
    let k: usize = s.parse().map_err(|e| format!("{e}"))?;
    if k == 0 || k > MAX_TOP_K {
        return Err(format!("must be in 1..={}", MAX_TOP_K));
    }
    Ok(k)
}

/// First `max` characters on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}
