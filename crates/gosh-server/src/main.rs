//! goshd binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use gosh_core::error::Result;
use gosh_server::platform::{
    FsKeyStore, OsProcessLauncher, OsPtyFactory, PasswordFileProvider, SystemIdentityDirectory,
};
use gosh_server::{Cli, DaemonConfig, HostServices, Listener, SessionHost, TlsTransportFactory};

fn main() {
    let cli = Cli::parse();

    let mut config = match DaemonConfig::load(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("goshd: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    if let Err(e) = gosh_core::init_logging(
        cli.verbosity(&config),
        cli.log_file.as_deref(),
        cli.log_format.into(),
    ) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "goshd starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("goshd: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli, config)) {
        eprintln!("goshd: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: DaemonConfig) -> Result<()> {
    let transports = TlsTransportFactory::from_pem_files(&cli.cert_file, &cli.key_file)?;

    let services = HostServices {
        pty: OsPtyFactory,
        launcher: OsProcessLauncher,
        identities: Arc::new(SystemIdentityDirectory),
        keys: Arc::new(FsKeyStore::new(config.authorized_keys_dir())),
        credentials: Arc::new(PasswordFileProvider::new(
            config.authentication.password_file.clone(),
        )),
    };
    let host = SessionHost::new(config.auth_config(), config.session_config(), services);

    info!(
        addr = %config.bind_addr(),
        max_sessions = config.authentication.max_sessions,
        "Binding server"
    );
    let listener =
        Listener::bind(config.bind_addr(), config.listener_config(), transports, host).await?;

    listener
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => {
                    warn!(error = %e, "Cannot listen for interrupts");
                    std::future::pending::<()>().await
                }
            }
        })
        .await
}
