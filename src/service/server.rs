//! Server launcher

use std::{io, path::PathBuf, process::ExitCode};

use clap::{Arg, ArgAction, ArgMatches, Command};
use futures::future::{self, Either};
use log::info;
use tokio::runtime::Builder;

use phantom_service::{config::Config, run_server};

use crate::logging;

/// Defines command line options
pub fn define_command_line_options(app: Command) -> Command {
    app.arg(
        Arg::new("CONFIG")
            .short('c')
            .long("config")
            .num_args(1)
            .action(ArgAction::Set)
            .default_value("config.yaml")
            .value_parser(clap::value_parser!(PathBuf))
            .help("phantom configuration file"),
    )
}

/// Program entrance `main`
pub fn main(matches: &ArgMatches) -> ExitCode {
    let config_path = matches.get_one::<PathBuf>("CONFIG").expect("`config` has a default");

    let config = match Config::load_from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("loading config {:?}, {}", config_path, err);
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_level(&config.log_level);

    info!("phantom server {}", crate::VERSION);

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("create tokio Runtime failed, {}", err);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let shutdown = wait_for_shutdown();
        let server = run_server(config);

        tokio::pin!(shutdown);
        tokio::pin!(server);

        match future::select(server, shutdown).await {
            // Server future resolved with an error, listener failures in most cases
            Either::Left((Err(err), ..)) => {
                eprintln!("server aborted with {}", err);
                ExitCode::FAILURE
            }
            // The receive loop never returns Ok
            Either::Left((Ok(..), ..)) => {
                eprintln!("server exited unexpectedly");
                ExitCode::FAILURE
            }
            // A shutdown signal arrived, graceful exit
            Either::Right(..) => ExitCode::SUCCESS,
        }
    })
}

/// Resolves once the process is asked to stop: SIGINT or SIGTERM on unix
#[cfg(unix)]
async fn wait_for_shutdown() -> io::Result<()> {
    use futures::pin_mut;
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let interrupt = interrupt.recv();
    let terminate = terminate.recv();
    pin_mut!(interrupt, terminate);

    let name = match future::select(interrupt, terminate).await {
        Either::Left(..) => "SIGINT",
        Either::Right(..) => "SIGTERM",
    };

    info!("{} received, shutting down", name);

    Ok(())
}

/// Resolves once the process is asked to stop: ctrl-c elsewhere
#[cfg(not(unix))]
async fn wait_for_shutdown() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;

    info!("ctrl-c received, shutting down");

    Ok(())
}
