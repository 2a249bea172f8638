use anyhow::Result;
use clap::Parser;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chaintrace::agent::providers::OpenAiReasoner;
use chaintrace::config::Settings;
use chaintrace::gateway::HttpGateway;
use chaintrace::runtime::AgentRuntime;

#[derive(Debug, Parser)]
#[command(name = "chaintrace", about = "Ask questions over a supply-chain property graph")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    config: Option<String>,

    /// Answer one question and exit instead of starting the REPL.
    #[arg(long)]
    question: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings);

    // RUST_LOG wins over the configured level when it mentions this crate.
    let log_level = settings.logging.level.to_lowercase();
    let default_directive = format!("chaintrace={log_level}");
    let env_override = env::var("RUST_LOG").unwrap_or_default();
    let combined_filter = if env_override.trim().is_empty() {
        default_directive.clone()
    } else if env_override.contains("chaintrace") {
        env_override
    } else {
        format!("{env_override},{default_directive}")
    };

    tracing_subscriber::fmt()
        .with_env_filter(combined_filter)
        .with_target(true)
        .init();

    let mut gateway = HttpGateway::new(&settings.gateway);
    if let (Ok(username), Ok(password)) =
        (env::var("GRAPH_USERNAME"), env::var("GRAPH_PASSWORD"))
    {
        gateway = gateway.with_auth(username, password);
    }

    let provider = match env::var("OPENAI_API_KEY") {
        Ok(key) => OpenAiReasoner::with_api_key(key),
        Err(_) => OpenAiReasoner::new(),
    };

    let runtime = AgentRuntime::new(Arc::new(gateway), Arc::new(provider), settings)?;
    let readiness = runtime.warm().await;
    if !readiness.is_ready() {
        eprintln!(
            "warning: graph store not fully reachable (schema: {}, index: {})",
            readiness.schema_warm, readiness.index_ready
        );
    }

    if let Some(question) = cli.question {
        let answer = runtime.ask(&question).await;
        println!("{}", answer.answer);
        return Ok(());
    }

    run_repl(&runtime).await
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(endpoint) = env::var("GRAPH_URI") {
        settings.gateway.endpoint = endpoint;
    }
    if let Ok(database) = env::var("GRAPH_DATABASE") {
        settings.gateway.database = database;
    }
}

async fn run_repl(runtime: &AgentRuntime) -> Result<()> {
    println!("chaintrace - ask about the supply-chain graph (empty line to quit)");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        let answer = runtime.ask(question).await;
        println!("{}", answer.answer);
        if !answer.trace.is_empty() {
            println!();
            for step in &answer.trace {
                let mark = if step.success { "ok" } else { "failed" };
                println!("  [{mark}] {} ({:?})", step.tool, step.elapsed);
            }
        }
    }
    Ok(())
}
