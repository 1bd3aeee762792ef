//! Computer Use Agent - goal planning from the command line
//!
//! This is the CLI entry point for the computer-agent tool.
//! Run with: cargo run --bin computer-agent -- plan "<goal>"

use computer_use_agent::{
    InstructionDecomposer, KnowledgeBase, KnowledgeRetriever, ModelClient, Settings,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let settings = Settings::from_env();

    let knowledge = match &settings.knowledge_base_path {
        Some(path) => KnowledgeBase::load(path)?,
        None => KnowledgeBase::new(),
    };

    println!("🖥️  Computer Use Agent");
    println!("================================================");
    println!(
        "Reasoning Model: {} @ {}",
        settings.reasoning_model_name, settings.reasoning_base_url
    );
    println!(
        "Vision Model: {} @ {}",
        settings.vlm_model_name, settings.vlm_base_url
    );
    println!("Language: {}", settings.lang);
    match &settings.knowledge_base_path {
        Some(path) => println!("Knowledge Base: {} ({} records)", path.display(), knowledge.len()),
        None => println!("Knowledge Base: none"),
    }
    println!("================================================\n");

    let retriever = KnowledgeRetriever::new(Arc::new(knowledge));
    let oracle = Arc::new(ModelClient::new(settings.reasoning_model_config()));
    let decomposer = InstructionDecomposer::new(oracle).with_retriever(retriever.clone());

    match args.get(1).map(String::as_str) {
        Some("plan") if args.len() > 2 => plan(&decomposer, &args[2..].join(" ")).await,
        Some("lookup") if args.len() > 2 => lookup(&retriever, &args[2..].join(" ")).await,
        Some(_) => {
            print_usage();
            Ok(())
        }
        None => interactive(&decomposer).await,
    }
}

fn print_usage() {
    println!("Usage:");
    println!("  computer-agent plan <goal>      Decompose a goal into instructions");
    println!("  computer-agent lookup <query>   Find the best knowledge-base match");
    println!("  computer-agent                  Interactive planning");
}

async fn plan(decomposer: &InstructionDecomposer, goal: &str) -> anyhow::Result<()> {
    println!("📝 Goal: {}\n", goal);

    let instructions = decomposer.decompose(goal).await?;
    for (idx, instruction) in instructions.iter().enumerate() {
        println!("{:>3}. {}", idx + 1, instruction);
    }
    Ok(())
}

async fn lookup(retriever: &KnowledgeRetriever, query: &str) -> anyhow::Result<()> {
    match retriever.find(query).await? {
        Some(record) => {
            println!("✅ {} ({})", record.name, record.id);
            println!("   {}", record.description);
            for instruction in &record.instructions {
                println!("   - {}", instruction);
            }
        }
        None => println!("No matching record for '{}'", query),
    }
    Ok(())
}

async fn interactive(decomposer: &InstructionDecomposer) -> anyhow::Result<()> {
    println!("Interactive mode. Type a goal and press Enter.");
    println!("Type 'quit' or 'exit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("📝 Goal: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let goal = line.trim();

        if goal.is_empty() {
            continue;
        }

        if goal == "quit" || goal == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        if let Err(e) = plan(decomposer, goal).await {
            eprintln!("\n❌ Error: {}\n", e);
        }
        println!();
    }

    Ok(())
}
