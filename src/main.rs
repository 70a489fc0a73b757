use std::process::ExitCode;

use clap::error::ErrorKind;

use kube_external_forward::{
    cli::Cli,
    config::Config,
    errors::DisplayCauses,
    shutdown::Shutdown,
};

#[tokio::main]
async fn main() -> ExitCode {
    kube_external_forward::logging::init();

    // Usage errors exit 1 like every other failure; help and version exit 0.
    let cli = match <Cli as clap::Parser>::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                return ExitCode::FAILURE;
            }
        },
    };
    let config = match Config::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}", DisplayCauses(&e));
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let token = shutdown.token();
    let timer = config.dev.and_then(|dev| dev.duration);
    tokio::spawn(async move {
        let reason = shutdown.interrupted(timer).await;
        tracing::info!(?reason, "interrupted, shutting down");
    });

    match kube_external_forward::run(config, token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "session failed");
            eprint!("{}", DisplayCauses(&e));
            ExitCode::FAILURE
        }
    }
}
