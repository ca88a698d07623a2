use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use pagepilot::agent::Agent;
use pagepilot::chrome::BrowserSession;
use pagepilot::logging;
use pagepilot::planner::{
    DEFAULT_LLM_BASE_URL, DEFAULT_MODEL, DEFAULT_TASK_ENDPOINT, ModelConfig, PlannerClient,
};
use pagepilot::types::ExecutionSettings;

/// Drive a browser through a natural-language task.
#[derive(Parser, Debug)]
#[command(name = "pagepilot", version, about)]
struct Cli {
    /// The task to carry out, e.g. "search for rust async tutorials"
    task: String,

    /// Planning backend endpoint
    #[arg(long, default_value = DEFAULT_TASK_ENDPOINT)]
    backend: String,

    /// Model the backend should plan with
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible base URL forwarded to the backend
    #[arg(long, default_value = DEFAULT_LLM_BASE_URL)]
    llm_url: String,

    /// Conversation session id
    #[arg(long, default_value = "default")]
    session: String,

    /// Open this URL before running the task
    #[arg(long)]
    start_url: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Cap on executed actions per task
    #[arg(long, default_value_t = 10)]
    max_actions: usize,

    /// Skip the visual highlight on targeted elements
    #[arg(long)]
    no_highlight: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();
    let cli = Cli::parse();

    let session = tokio::task::spawn_blocking({
        let headed = cli.headed;
        move || BrowserSession::launch(!headed)
    })
    .await??;

    if let Some(url) = &cli.start_url {
        info!(%url, "opening start page");
        // blocks on CDP, so step off the async runtime first
        tokio::task::block_in_place(|| session.goto(url))?;
    }

    let config = ModelConfig {
        api_key: std::env::var("PLANNER_API_KEY").ok(),
        model: cli.model,
        base_url: cli.llm_url,
        ..ModelConfig::default()
    };
    let planner = PlannerClient::new(cli.backend, config);
    let settings = ExecutionSettings {
        max_actions: cli.max_actions,
        highlight_elements: !cli.no_highlight,
        ..ExecutionSettings::default()
    };

    let agent = Agent::new(session.document(), planner, settings);
    let outcome = agent.run_task(&cli.task, &cli.session).await?;

    println!("Understanding: {}", outcome.understanding);
    if let Some(reason) = &outcome.degraded {
        println!("Note: planned from a degraded snapshot ({reason})");
    }
    for (index, result) in outcome.results.iter().enumerate() {
        let mark = if result.success { "ok" } else { "FAILED" };
        let detail = result
            .message
            .as_deref()
            .or(result.error.as_deref())
            .unwrap_or("");
        println!("  step {}: [{mark}] {detail}", index + 1);
    }
    println!("Result: {}", outcome.summary);

    Ok(())
}
