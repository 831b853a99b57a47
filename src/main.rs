use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use citycast::{
    init_tracing, shutdown_tracing, AppConfig, AppContext, CityTool, GeminiClient,
    KeywordModel, LanguageModel, ModelProvider, Result, ToolRequest,
};

/// Weather, time and directions agent
#[derive(Parser, Debug)]
#[command(name = "citycast", author, version, about, long_about = None)]
struct Cli {
    /// Optional TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up the weather report for a city
    Weather { city: String },
    /// Show the current local time in a city
    Time { city: String },
    /// List the tools available to the agent
    Tools,
    /// Chat with the agent, one message per line on stdin
    Chat,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!(%err, "citycast failed");
        eprintln!("error: {err}");
        shutdown_tracing();
        std::process::exit(1);
    }
    shutdown_tracing();
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env_or_file(cli.config.as_deref())?;
    init_tracing(&config.telemetry)?;

    match cli.command {
        Commands::Weather { city } => lookup(config, CityTool::GetWeather, city).await,
        Commands::Time { city } => lookup(config, CityTool::GetCurrentTime, city).await,
        Commands::Tools => {
            let ctx = AppContext::build(config).await?;
            for tool in ctx.tools().describe() {
                println!("{:<24} {}", tool.name, tool.description);
            }
            ctx.shutdown().await
        }
        Commands::Chat => {
            let ctx = AppContext::build(config).await?;
            let result = match ctx.config().model.provider {
                ModelProvider::Gemini => {
                    let model = Arc::new(GeminiClient::from_config(&ctx.config().model)?);
                    chat(&ctx, model).await
                }
                ModelProvider::Keyword => chat(&ctx, Arc::new(KeywordModel)).await,
            };
            ctx.shutdown().await?;
            result
        }
    }
}

async fn lookup(mut config: AppConfig, tool: CityTool, city: String) -> Result<()> {
    // Direct lookups never need the directions connector.
    config.directions.enabled = false;
    let ctx = AppContext::build(config).await?;
    let result = ctx.dispatcher().dispatch(&ToolRequest::new(tool, city));
    println!("{}", serde_json::to_string_pretty(&result)?);
    ctx.shutdown().await
}

async fn chat<M: LanguageModel>(ctx: &AppContext, model: Arc<M>) -> Result<()> {
    let mut agent = ctx.agent(model);
    info!(agent = agent.name(), tools = agent.tools().len(), "chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }
        match agent.respond(input).await {
            Ok(reply) => println!("{reply}"),
            Err(err) => {
                error!(%err, "agent turn failed");
                eprintln!("error: {err}");
            }
        }
    }
    Ok(())
}
