//! toolweave CLI — the main entry point.
//!
//! Commands:
//! - `init`           — Write a default config
//! - `chat`           — Interactive chat or single-message mode
//! - `serve`          — Start the HTTP gateway
//! - `conversations`  — List, show or delete saved conversations

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolweave",
    about = "toolweave — streaming tool-calling chat for local and hosted models",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Chat with the model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage saved conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List conversations, newest first
    List,
    /// Print a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Chat output goes to stdout; keep logs quiet unless asked
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            message,
            conversation,
        } => commands::chat::run(message, conversation).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Conversations { action } => match action {
            ConversationAction::List => commands::conversations::list().await?,
            ConversationAction::Show { id } => commands::conversations::show(&id).await?,
            ConversationAction::Delete { id } => commands::conversations::delete(&id).await?,
        },
    }

    Ok(())
}
