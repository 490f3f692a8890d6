pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "school-meal")]
#[command(about = "School meal management backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to the configured API port)")]
        port: Option<u16>,
    },

    #[command(about = "Create the database and apply migrations")]
    InitDb,

    #[command(about = "Create a super-admin account")]
    CreateSuper {
        #[arg(long, help = "Login account")]
        account: String,
        #[arg(long, help = "Password")]
        password: String,
        #[arg(long, help = "Display name")]
        display_name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port } => commands::serve::handle(port).await,
        Commands::InitDb => commands::init::handle(output_format).await,
        Commands::CreateSuper {
            account,
            password,
            display_name,
        } => commands::admin::create_super(&account, &password, display_name.as_deref(), output_format).await,
    }
}
