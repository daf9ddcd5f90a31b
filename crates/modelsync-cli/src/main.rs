//! modelsync CLI - track, save and inspect resources from the command line.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "modelsync")]
#[command(author, version, about = "Model change tracking and sync CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "human")]
    format: output::OutputFormat,

    /// Store path (defaults to current directory)
    #[arg(long, short = 'C', global = true)]
    path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init {
        /// Store name
        #[arg(long)]
        name: Option<String>,
    },

    /// Assign fields on a resource and save it
    Save {
        /// Collection name (e.g., notes)
        collection: String,

        /// Existing resource id (omit to create)
        #[arg(long)]
        id: Option<String>,

        /// Apply fields only after the save succeeds
        #[arg(long)]
        wait: bool,

        /// Send only the changed fields on update
        #[arg(long)]
        patch: bool,

        /// Field assignments (key=value)
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Fetch a resource through a tracked model
    Fetch {
        /// Collection name
        collection: String,

        /// Resource id
        id: String,
    },

    /// List resources in a collection
    #[command(alias = "ls")]
    List {
        /// Collection name
        collection: String,
    },

    /// Start the HTTP resource server
    Serve {
        /// Port to listen on
        #[arg(long, short = 'p', default_value = "17474")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let store_path = match cli.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init { name } => commands::init(&store_path, name, cli.format),
        Commands::Save {
            collection,
            id,
            wait,
            patch,
            assignments,
        } => commands::save(
            &store_path,
            &collection,
            id.as_deref(),
            &assignments,
            commands::SaveFlags { wait, patch },
            cli.format,
        ),
        Commands::Fetch { collection, id } => {
            commands::fetch(&store_path, &collection, &id, cli.format)
        }
        Commands::List { collection } => commands::list(&store_path, &collection, cli.format),
        Commands::Serve { port, host } => commands::serve(&store_path, &host, port),
    }
}
