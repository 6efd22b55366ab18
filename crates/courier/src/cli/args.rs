use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use courier_core::session::SessionMode;

/// Run paced, retrying message sessions against a conversation target.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Engine config file (TOML). Defaults to ./.courier/config.toml, then the user config dir
    #[arg(long, env = "COURIER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Serve the session API over HTTP
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
        /// Address to bind to (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one session in the foreground and stream its log
    Run(RunArgs),
    /// Save a submission summary and print its preview; nothing is sent
    Preview(PreviewArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Token mode: single or multi
    #[arg(long, default_value = "single")]
    pub mode: SessionMode,
    /// Target conversation identifier
    #[arg(long)]
    pub target: String,
    /// Name prefixed to every message
    #[arg(long)]
    pub name: String,
    /// Message file, one message per line
    #[arg(long)]
    pub messages: PathBuf,
    /// Token file, one token per line (multi mode, or the first line in single mode)
    #[arg(long)]
    pub tokens: Option<PathBuf>,
    /// Single-mode access token
    #[arg(long, env = "COURIER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    /// Proxy file, one proxy per line
    #[arg(long)]
    pub proxies: Option<PathBuf>,
    /// Seconds to wait between sends
    #[arg(long, default_value_t = 1.0)]
    pub interval: f64,
    /// Attempts per message
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
    /// Seconds to wait between failed attempts
    #[arg(long, default_value_t = 2.0)]
    pub retry_delay: f64,
    /// Start over after each full pass until stopped
    #[arg(long)]
    pub repeat: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PreviewArgs {
    /// Token mode: single or multi
    #[arg(long, default_value = "single")]
    pub mode: SessionMode,
    /// Target conversation identifier
    #[arg(long)]
    pub target: String,
    /// Name prefixed to every message
    #[arg(long)]
    pub name: String,
    /// Interval as it should appear in the summary
    #[arg(long)]
    pub interval: String,
    /// Message file
    #[arg(long)]
    pub messages: PathBuf,
    /// Token file (required in multi mode)
    #[arg(long)]
    pub tokens: Option<PathBuf>,
    /// Directory for the summary file (overrides the config file)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_defaults() {
        let cli = Cli::try_parse_from([
            "courier",
            "run",
            "--target",
            "123",
            "--name",
            "Ana",
            "--messages",
            "msgs.txt",
            "--mode",
            "multi",
            "--tokens",
            "tokens.txt",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.mode, SessionMode::Multi);
        assert_eq!(args.max_retries, 3);
        assert!((args.interval - 1.0).abs() < f64::EPSILON);
        assert!(!args.repeat);
    }

    #[test]
    fn rejects_unknown_mode() {
        let result = Cli::try_parse_from([
            "courier",
            "run",
            "--target",
            "1",
            "--name",
            "n",
            "--messages",
            "m.txt",
            "--mode",
            "several",
        ]);
        assert!(result.is_err());
    }
}
