use clap::Parser;
use prerender::{Host, HostConfig, HostError, shutdown_signal};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "prerender-host")]
#[command(version)]
#[command(about = "Serve a single-page application with server-side prerendering")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(env = "PRERENDER_CONFIG")]
    config: Option<PathBuf>,
}

async fn run(config: &HostConfig) -> Result<(), HostError> {
    info!(
        environment = %config.environment,
        listen = %config.listen,
        "starting prerender host"
    );

    let host = Host::start(config).await?;
    host.run(shutdown_signal()).await?;

    info!("prerender host stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match HostConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let guard = match config.log.clone().merge_env().init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&config).await;
    if let Err(e) = &result {
        error!(fatal = e.is_configuration(), "{}", e);
    }

    // Flush buffered log lines before exiting
    drop(guard);

    if let Err(e) = result {
        std::process::exit(e.exit_code());
    }
}
