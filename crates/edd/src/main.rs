mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "edd", &mut std::io::stdout());
            Ok(())
        }

        // Local commands never open a connection
        Command::Config(args) => {
            let (cfg, path) = commands::load_config(&cli.global)?;
            commands::config_cmd::handle(&args, &cfg, &path)
        }
        Command::Products => {
            let (cfg, _) = commands::load_config(&cli.global)?;
            commands::products::handle(&cfg, &cli.global)
        }

        cmd => {
            let (cfg, _) = commands::load_config(&cli.global)?;
            let product = commands::resolve_product(&cli.global, &cfg)?;

            tracing::debug!(command = ?cmd, product = %product.product_id, "dispatching command");
            commands::dispatch(cmd, product, &cli.global).await
        }
    }
}
