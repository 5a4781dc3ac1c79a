// src/cli.rs

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat with any OpenAI-compatible endpoint from the terminal.
#[derive(Parser, Debug, Clone)]
#[command(name = "parley", version)]
pub struct Cli {
    /// Where chats and settings are stored. Defaults to the platform data directory.
    #[arg(long, env = "PARLEY_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk.
    #[arg(long, default_value_t = false, global = true)]
    pub ephemeral: bool,

    /// API base URL, e.g. https://api.openai.com/v1. Saved for later runs.
    #[arg(long, env = "PARLEY_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// API key sent as a bearer token. Saved for later runs.
    #[arg(long, env = "PARLEY_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model to select. Saved for later runs.
    #[arg(long, short = 'm', env = "PARLEY_MODEL", global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Interactive chat (the default).
    Chat {
        /// Chat to resume; a new chat is started when omitted.
        #[arg(long)]
        chat: Option<String>,
    },

    /// List the models available at the configured endpoint.
    Models,

    /// Write a chat transcript as standalone HTML.
    Export {
        chat: String,

        /// Output file; stdout when omitted.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Run the local echo endpoint (POST/GET /api/chat).
    ServeEcho {
        #[arg(long, default_value_t = 3001)]
        port: u16,

        /// Artificial response delay in milliseconds.
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["parley"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.ephemeral);
    }

    #[test]
    fn test_serve_echo_flags() {
        let cli = Cli::try_parse_from(["parley", "serve-echo", "--port", "8080", "--delay-ms", "0"]).unwrap();
        match cli.command {
            Some(Command::ServeEcho { port, delay_ms }) => {
                assert_eq!(port, 8080);
                assert_eq!(delay_ms, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["parley", "models", "--ephemeral", "--model", "gpt"]).unwrap();
        assert!(cli.ephemeral);
        assert_eq!(cli.model.as_deref(), Some("gpt"));
    }
}
