//! Counsel CLI - interactive consultative research sessions

use anyhow::{Context, Result};
use clap::Parser;
use counsel_core::{init_logging, ConversationMode, CounselSettings, LoggingConfig};
use counsel_dialogue::PersonalizationEngine;
use counsel_llm::create_provider_client;
use counsel_research::{ResearchPipeline, StageStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod store;
mod ui;

use store::FileSessionStore;
use ui::TerminalUi;

#[derive(Parser)]
#[command(name = "counsel")]
#[command(about = "Consultative research assistant: clarification dialogue plus staged research")]
#[command(version)]
struct Cli {
    /// The research question to investigate
    query: String,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force a conversation mode: quick, standard, deep, adaptive
    #[arg(short, long)]
    mode: Option<String>,

    /// Run without an LLM provider (deterministic fallbacks only)
    #[arg(long)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode(value: &str) -> Result<ConversationMode> {
    match value.to_lowercase().as_str() {
        "quick" => Ok(ConversationMode::Quick),
        "standard" => Ok(ConversationMode::Standard),
        "deep" => Ok(ConversationMode::Deep),
        "adaptive" => Ok(ConversationMode::Adaptive),
        other => anyhow::bail!("Unknown conversation mode: {}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    init_logging(&logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let settings = match &cli.config {
        Some(path) => CounselSettings::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CounselSettings::default(),
    };

    let initial_mode = cli.mode.as_deref().map(parse_mode).transpose()?;

    let llm = if cli.offline {
        info!("Running offline; all AI paths use deterministic fallbacks");
        None
    } else {
        match create_provider_client(&settings.ai).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "No LLM provider available, continuing offline");
                None
            }
        }
    };

    let ui = TerminalUi;
    let mut engine = PersonalizationEngine::new(settings.clone(), llm.clone());
    if let Some(dir) = &settings.storage.session_dir {
        engine = engine.with_session_store(Arc::new(FileSessionStore::new(dir)));
    }

    println!("🔍 Counsel — let me ask a few questions to focus the research.");
    println!("   (answer 'quit' at any time to stop)");

    let outcome = engine.run(&cli.query, &ui, initial_mode).await?;
    if outcome.aborted {
        println!("\nDialogue ended early; running research with what we have.");
    }

    let cancel = counsel_core::CancelToken::new();
    let pipeline = ResearchPipeline::new(&settings, llm);
    let bundle = pipeline.run(&outcome.context, Some(&ui), &cancel).await;

    print_bundle_summary(&bundle);
    Ok(())
}

fn print_bundle_summary(bundle: &counsel_research::ResearchBundle) {
    println!();
    println!("================================================");
    println!("Research results for: {}", bundle.query);
    println!("Session: {}", bundle.session_id);
    println!("Overall confidence: {:.0}%", bundle.confidence_score * 100.0);
    println!("================================================");

    for stage in &bundle.stages {
        let marker = match stage.status {
            StageStatus::Ok => "✓",
            StageStatus::Partial => "~",
            StageStatus::Fallback => "✗",
        };
        println!("\n{} Stage {}: {}", marker, stage.stage_index, stage.stage_name);
        println!("  {}", stage.findings.summary);
    }

    println!("\n------------------------------------------------");
    println!("Conclusions: {}", bundle.final_conclusions.summary);
    if let Some(recommendation) = bundle
        .final_conclusions
        .extras
        .get("primary_recommendation")
        .and_then(|v| v.as_str())
    {
        println!("Primary recommendation: {}", recommendation);
    }
    if !bundle.knowledge_base.key_facts.is_empty() {
        println!("\nKey facts:");
        for fact in bundle.knowledge_base.key_facts.iter().take(5) {
            println!("  - {}", fact);
        }
    }
}
