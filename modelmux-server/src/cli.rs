use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "modelmux",
    about = "modelmux - intent-aware AI request router",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "MODELMUX_PORT")]
    pub port: Option<u16>,

    #[arg(short, long, env = "MODELMUX_CONFIG", default_value = "./modelmux.json")]
    pub config: PathBuf,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the gateway (default if no command specified)")]
    Serve,

    #[command(about = "Load and validate the gateway file and environment")]
    CheckConfig {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Show the candidates a request would be routed to (no network)")]
    Routes {
        #[arg(short, long, default_value = "auto", help = "Requested model")]
        model: String,

        #[arg(short, long, help = "User message text")]
        text: String,

        #[arg(short, long, help = "User id from the gateway file")]
        user: Option<String>,

        #[arg(long, help = "Intent hint (code, translate, summarize, ...)")]
        hint: Option<String>,
    },
}
