use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nova_chat::commands;
use nova_chat::config::Config;

#[derive(Parser)]
#[command(name = "nova")]
#[command(version)]
#[command(about = "Chat with Gemini from your terminal", long_about = None)]
struct Cli {
    /// Use this config file instead of ~/.nova/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured model for this run
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send one prompt in a new conversation and stream the reply
    Ask {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        /// Attach an image (png, jpg, gif, webp; max 5MB)
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// List saved conversations
    List,
    /// Print a saved conversation
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the streamed reply, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.set_model_override(model);
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat(config).await,
        Commands::Ask { prompt, image } => {
            commands::ask(&config, &prompt.join(" "), image.as_deref()).await
        }
        Commands::List => commands::list_conversations(&config),
        Commands::Show { id } => commands::show_conversation(&config, &id),
    }
}
