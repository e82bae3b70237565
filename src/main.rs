use anyhow::{Context, Result};
use clap::Parser;
use querygpt_engine::engine::QueryEngine;
use querygpt_engine::jira::TicketContext;
use querygpt_engine::llm::ChatClient;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "querygpt")]
#[command(about = "Natural-language to SQL query assistant")]
struct Args {
    /// The question in natural language
    question: String,

    /// Path to the schema CSV export
    #[arg(long, default_value = "metadata/schema.csv")]
    schema_csv: PathBuf,

    /// Path to the descriptions/relationships metadata JSON
    #[arg(long, default_value = "metadata/schema.json")]
    metadata: PathBuf,

    /// Tenant identifier
    #[arg(short, long, default_value = "default")]
    tenant: String,

    /// Backend base URL (or set QUERYGPT_BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Path to a pre-resolved ticket context JSON file
    #[arg(long)]
    ticket: Option<PathBuf>,

    /// Accept the suggested shortlist without confirmation
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let base_url = args
        .backend_url
        .clone()
        .or_else(|| std::env::var("QUERYGPT_BACKEND_URL").ok())
        .context("backend URL missing: pass --backend-url or set QUERYGPT_BACKEND_URL")?;

    let transport = Arc::new(ChatClient::new(base_url));
    let mut engine = QueryEngine::new(transport, args.tenant.clone());
    engine
        .schema_mut()
        .load_from_files(&args.schema_csv, &args.metadata)
        .context("failed to load schema")?;

    let ticket: Option<TicketContext> = match &args.ticket {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read ticket file {}", path.display()))?;
            Some(serde_json::from_str(&text).context("invalid ticket context JSON")?)
        }
        None => None,
    };

    info!("Question: {}", args.question);

    let shortlist = engine.suggest(&args.question, ticket.as_ref()).await?;
    if shortlist.is_empty() {
        println!("No candidate tables found for this question.");
        return Ok(());
    }
    println!("Tables to be used: {}", shortlist.join(", "));

    if !args.yes && !confirm()? {
        println!("Aborted.");
        return Ok(());
    }

    let result = engine
        .generate(&args.question, Some(&shortlist), ticket.as_ref())
        .await?;

    match &result.error {
        Some(message) => println!("\n{}", message),
        None => {
            println!("\nSQL:\n{}", result.query);
            if let Some(explanation) = &result.explanation {
                println!("\nExplanation:\n{}", explanation);
            }
            if !result.suggested_indexes.is_empty() {
                println!("\nSuggested indexes:");
                for index in &result.suggested_indexes {
                    println!("  {}", index);
                }
            }
        }
    }

    engine.reset().await;
    Ok(())
}

fn confirm() -> Result<bool> {
    print!("Looks good? [Y/n] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(!line.trim().to_lowercase().starts_with('n'))
}
