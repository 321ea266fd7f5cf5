//! The demo-web-service binary.
//!
//! Run with:
//!   TEST_MODE=true cargo run
//!
//! Try:
//!   curl http://localhost:8080/api/health
//!   curl http://localhost:8080/api/users/42
//!   curl -X POST http://localhost:8080/api/users -d '{"name":"alice"}'

use std::net::SocketAddr;
use std::process::ExitCode;

use demo_web_service::middleware::{guard, install_panic_hook};
use demo_web_service::models::VersionInfo;
use demo_web_service::server::Timeouts;
use demo_web_service::telemetry::{self, LogConfig};
use demo_web_service::{Config, Error, Server, ShutdownOutcome, app};
use tracing::info;

fn main() -> ExitCode {
    if let Err(e) = telemetry::init(&LogConfig::from_env()) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }
    install_panic_hook();

    match guard(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn run() -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(serve())
}

async fn serve() -> Result<(), Error> {
    let build = VersionInfo::current();
    info!(
        version = %build.version,
        module = %build.module,
        goVersion = %build.runtime_version,
        "Starting application"
    );

    let config = Config::from_env();
    info!(
        serverPort = %config.port,
        read_timeout = ?config.read_timeout,
        write_timeout = ?config.write_timeout,
        idle_timeout = ?config.idle_timeout,
        shutdown_timeout = ?config.shutdown_timeout,
        allowed_origins = ?config.allowed_origins,
        test_mode = config.test_mode,
        "Configuration loaded"
    );

    let raw = config.addr();
    let addr: SocketAddr = raw
        .parse()
        .map_err(|source| Error::InvalidAddr { addr: raw.clone(), source })?;

    let app = app::build(&config);
    info!("Routes configured");

    let server = Server::bind(addr, app)
        .await?
        .timeouts(Timeouts {
            read: config.read_limit(),
            idle: config.idle_limit(),
        })
        .shutdown_timeout(config.shutdown_timeout);
    info!(port = %config.port, "Server starting");

    match server.serve().await? {
        ShutdownOutcome::Graceful => {}
        ShutdownOutcome::Forced { abandoned } => {
            info!(abandoned, "Shutdown finished after aborting connections");
        }
    }
    Ok(())
}
