mod host;
mod logging;
mod tls;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pulse_agent::{AgentConfig, Supervisor, TxtNameProvider};
use pulse_wire::PROTO_PORT;
use tracing::info;

use crate::host::ProcHostInfo;
use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "pulsed", version, about = "TLS heartbeat endpoint daemon")]
struct Cli {
    /// Server certificate chain (PEM).
    #[arg(long, value_name = "FILE", env = "PULSED_CERT")]
    cert: PathBuf,

    /// Server private key (PEM).
    #[arg(long, value_name = "FILE", env = "PULSED_KEY")]
    key: PathBuf,

    /// Rendezvous TXT record name to probe. Probing idles without one.
    #[arg(long, value_name = "NAME", env = "PULSED_TXT_RECORD")]
    txt_record: Option<String>,

    /// Heartbeat port.
    #[arg(long, value_name = "PORT", default_value_t = PROTO_PORT)]
    port: u16,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Baseline log level (stderr); a `RUST_LOG` directive overrides it.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

struct CliTxtName(Option<String>);

impl TxtNameProvider for CliTxtName {
    fn txt_name(&self) -> Option<String> {
        self.0.clone()
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> pulse_agent::Result<()> {
    let tls = tls::load_server_config(&cli.cert, &cli.key)?;
    let resolver = hickory_resolver::TokioAsyncResolver::tokio_from_system_conf()
        .map_err(io::Error::other)?;

    let cfg = AgentConfig::builder()
        .tls(tls)
        .resolver(Arc::new(resolver))
        .txt_name(Arc::new(CliTxtName(cli.txt_record)))
        .host_info(Arc::new(ProcHostInfo::new()))
        .port(cli.port)
        .build()?;

    let supervisor = Supervisor::start(cfg);
    wait_for_signal().await?;
    info!("shutdown signal received");
    supervisor.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
