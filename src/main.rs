mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// quill: an agent loop over a sandboxed in-memory file store.
#[derive(Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Settings file (defaults to ~/.quill/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Keep everything in memory for this invocation.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the loop with responses replayed from a transcript file.
    Run {
        /// JSON transcript of model responses.
        #[arg(long)]
        transcript: PathBuf,
        /// User message appended before the loop starts.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// List stored files.
    Files {
        #[arg(long)]
        prefix: Option<String>,
        /// Include kind, size and modification time.
        #[arg(long)]
        long: bool,
    },

    /// Print one stored file.
    Cat { path: String },

    /// Print the conversation history.
    History,

    /// Manage named checkpoints of the store and history.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommand,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    Create {
        #[arg(default_value = "manual")]
        label: String,
    },
    List,
    Restore { id: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = commands::App::load(cli.settings.as_deref(), cli.ephemeral)?;

    match cli.command {
        Commands::Run { transcript, prompt } => {
            commands::run(&app, &transcript, prompt.as_deref()).await?;
        }
        Commands::Files { prefix, long } => commands::files(&app, prefix.as_deref(), long)?,
        Commands::Cat { path } => commands::cat(&app, &path)?,
        Commands::History => commands::history(&app)?,
        Commands::Checkpoint { action } => match action {
            CheckpointCommand::Create { label } => commands::checkpoint_create(&app, &label)?,
            CheckpointCommand::List => commands::checkpoint_list(&app)?,
            CheckpointCommand::Restore { id } => commands::checkpoint_restore(&app, &id)?,
            CheckpointCommand::Delete { id } => commands::checkpoint_delete(&app, &id)?,
        },
    }

    Ok(())
}
