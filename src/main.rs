mod telemetry;

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use ai_llm_service::{LlmServiceProfiles, configs_from_env};
use colored::Colorize;
use futures::StreamExt;
use rag_orchestrator::{
    Collaborators, IndicatifProgress, MemoryConversationStore, OrchestratorConfig, OrchestratorError, Progress,
    QdrantRetriever, Query, RagEngine, Source,
};
use rag_store::{RagConfig, RagStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A .env file is optional; the process environment wins either way.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let cfg = OrchestratorConfig::from_env()?;
    let (fast, slow, embedding) = configs_from_env()?;
    let llm = Arc::new(LlmServiceProfiles::new(fast, Some(slow), embedding));
    let store = RagStore::new(RagConfig::from_env()?)?;

    let progress = Arc::new(IndicatifProgress::spinner());
    let engine = RagEngine::new(
        &cfg,
        Collaborators {
            embedder: llm.clone(),
            retriever: Arc::new(QdrantRetriever::new(store, llm.clone())),
            generator: llm.clone(),
            judge: llm,
            store: Arc::new(MemoryConversationStore::new(cfg.store)),
        },
    )
    .with_progress(progress.clone());

    let conversation_id = std::env::var("CONVERSATION_ID")
        .unwrap_or_else(|_| format!("console-{}", chrono::Utc::now().timestamp_millis()));
    info!(%conversation_id, domain = %cfg.domain.name, decision = ?cfg.decision_mode, "console chat started");
    println!(
        "{}",
        "Ask a question. Commands: /files a.md,b.md  /clear  /quit".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut filenames: Vec<String> = Vec::new();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                engine.clear(&conversation_id).await?;
                println!("{}", "conversation cleared".dimmed());
                continue;
            }
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("/files") {
            filenames = rest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            println!("{} {:?}", "searching only in:".dimmed(), filenames);
            continue;
        }

        let query = Query::new(line).with_filenames(filenames.clone());
        if let Err(e) = run_turn(&engine, &conversation_id, query).await {
            progress.finish("failed");
            error!(error = %e, "turn failed");
            eprintln!("{} {e}", "error:".red().bold());
        }
    }

    Ok(())
}

/// Streams one answer to stdout, prints its sources and records the turn.
async fn run_turn(engine: &RagEngine, conversation_id: &str, query: Query) -> Result<(), OrchestratorError> {
    let mut pending = engine.ask(conversation_id, query).await?;
    println!(
        "{} {} ({:.2})",
        "strategy:".dimmed(),
        pending.decision.strategy.to_string().cyan(),
        pending.decision.confidence
    );

    let mut answer = String::new();
    while let Some(chunk) = pending.stream.next().await {
        let chunk = chunk.map_err(OrchestratorError::Generation)?;
        print!("{chunk}");
        let _ = std::io::stdout().flush();
        answer.push_str(&chunk);
    }
    println!();

    print_sources(&pending.sources);
    engine.record_turn(pending, answer).await?;
    Ok(())
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    println!("{}", "Sources:".bold());
    for s in sources {
        println!("  {} {}", s.title.yellow(), s.url.dimmed());
    }
}
