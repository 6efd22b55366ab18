use clap::Parser;
use courier::cli::{Cli, Commands};
use courier::commands::{
    Command, preview::PreviewCommand, run::RunCommand, serve::ServeCommand,
};
use courier_core::EngineConfig;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let (mut config, source) = EngineConfig::load(cli.config.as_deref())?;

    // Level configured via RUST_LOG
    courier_core::utils::tracing::init_tracing(config.log_dir.as_deref())?;
    source.report();

    match cli.command {
        Commands::Serve { port, bind } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            ServeCommand { config }.execute().await
        }
        Commands::Run(args) => RunCommand { config, args }.execute().await,
        Commands::Preview(args) => PreviewCommand { config, args }.execute().await,
    }
}
