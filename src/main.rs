use anyhow::{Context, Result};
use clap::Parser;
use proxy_config_sync::core::{Orchestrator, Validate};
use proxy_config_sync::sources::{ArgsSource, ConfigurationSource, FileSource, SyncSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Keep proxy config files in sync with Nacos and reload nginx on change
#[derive(Parser, Debug)]
#[command(name = "proxy-config-sync", version, about)]
struct Args {
    /// Nacos server address
    #[arg(short = 's', long = "server", required_unless_present = "config")]
    server: Option<String>,

    /// Nacos server port
    #[arg(short = 'p', long = "port", required_unless_present = "config")]
    port: Option<u16>,

    /// Nacos namespace id
    #[arg(short = 'n', long = "namespace", required_unless_present = "config")]
    namespace: Option<String>,

    /// Watched entries: dataId*group*file, several joined with '#'
    #[arg(short = 'f', long = "files", required_unless_present = "config")]
    files: Option<String>,

    /// Send an alert for every change
    #[arg(short = 'a', long = "alert", requires = "alert_url")]
    alert: bool,

    /// Webhook URL alerts are posted to
    #[arg(long = "alert-url")]
    alert_url: Option<String>,

    /// Load settings from a YAML, TOML, or JSON file instead
    #[arg(
        short = 'c',
        long = "config",
        conflicts_with_all = ["server", "port", "namespace", "files", "alert"]
    )]
    config: Option<PathBuf>,

    /// Command that validates the proxy configuration
    #[arg(long = "test-cmd")]
    test_cmd: Option<String>,

    /// Command that reloads the proxy
    #[arg(long = "reload-cmd")]
    reload_cmd: Option<String>,

    /// Seconds each reload command may run, 0 for no limit
    #[arg(long = "reload-timeout")]
    reload_timeout: Option<u64>,
}

impl Args {
    fn settings(&self) -> Result<SyncSettings> {
        let mut settings = match &self.config {
            Some(path) => FileSource::new(path)
                .with_env_overrides("PROXY_SYNC", "__")
                .load()?,
            None => {
                let mut source = ArgsSource::new(
                    self.server.clone().unwrap_or_default(),
                    self.port.unwrap_or_default(),
                    self.namespace.clone().unwrap_or_default(),
                    self.files.clone().unwrap_or_default(),
                );
                if self.alert {
                    source = source.with_alert(self.alert_url.clone());
                }
                source.load()?
            }
        };

        if let Some(command) = &self.test_cmd {
            settings.reload.test_command = command.clone();
        }
        if let Some(command) = &self.reload_cmd {
            settings.reload.reload_command = command.clone();
        }
        if let Some(secs) = self.reload_timeout {
            settings.reload.timeout_secs = secs;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = args.settings().context("invalid settings")?;
    info!(
        server = %settings.server.address,
        port = settings.server.port,
        namespace = %settings.server.namespace,
        entries = settings.files.len(),
        alerts = settings.alert.enabled,
        "starting proxy-config-sync"
    );

    let shutdown = shutdown_signal();
    let orchestrator = Orchestrator::builder_from_settings(&settings)?.build()?;
    orchestrator
        .run_until(shutdown)
        .await
        .context("startup failed")?;

    Ok(())
}

/// Install the termination handlers now and resolve once one fires.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::SignalKind;

    let mut hangup = install(SignalKind::hangup(), "SIGHUP");
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT");
    let mut terminate = install(SignalKind::terminate(), "SIGTERM");
    let mut quit = install(SignalKind::quit(), "SIGQUIT");

    async move {
        let received = tokio::select! {
            Some(()) = recv(&mut hangup) => "SIGHUP",
            Some(()) = recv(&mut interrupt) => "SIGINT",
            Some(()) = recv(&mut terminate) => "SIGTERM",
            Some(()) = recv(&mut quit) => "SIGQUIT",
            else => "closed",
        };
        info!(signal = received, "received shutdown signal");
    }
}

#[cfg(unix)]
fn install(
    kind: tokio::signal::unix::SignalKind,
    name: &'static str,
) -> Option<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(kind)
        .map_err(|e| error!(signal = name, error = %e, "failed to install signal handler"))
        .ok()
}

#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c");
    }
}
