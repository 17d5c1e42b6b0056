use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use pulse_wire::{HostInfo, PROTO_PORT};

use crate::error::{AgentError, Result};

/// Supplies the host identification record served for HOST_INFO.
///
/// Optional: when absent, the agent answers HOST_INFO with STATUS/UNIMPL.
pub trait HostInfoProvider: Send + Sync {
    fn host_info(&self) -> io::Result<HostInfo>;
}

/// Supplies the rendezvous TXT record name probed by the scheduler.
///
/// Returning `None` skips that probe cycle.
pub trait TxtNameProvider: Send + Sync {
    fn txt_name(&self) -> Option<String>;
}

/// Asynchronous TXT lookup facility.
///
/// The resolver is an external collaborator; the agent only needs
/// query-by-name with a record list on success.
#[async_trait::async_trait]
pub trait TxtResolver: Send + Sync {
    async fn lookup_txt(&self, name: &str) -> io::Result<Vec<Vec<u8>>>;
}

#[async_trait::async_trait]
impl TxtResolver for hickory_resolver::TokioAsyncResolver {
    async fn lookup_txt(&self, name: &str) -> io::Result<Vec<Vec<u8>>> {
        let lookup = self.txt_lookup(name).await.map_err(io::Error::other)?;
        Ok(lookup
            .iter()
            .flat_map(|txt| txt.txt_data().iter().map(|data| data.to_vec()))
            .collect())
    }
}

/// Timer and interval settings.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Bound on the inbound TLS handshake.
    pub handshake_timeout: Duration,
    /// A serving session closes after this long without a complete frame.
    pub idle_timeout: Duration,
    /// Bound on the best-effort TLS close-notify at teardown.
    pub close_timeout: Duration,
    /// Wait between failed listener bind attempts.
    pub bind_retry: Duration,
    /// Base interval between rendezvous probes.
    ///
    /// Deliberately short for testing; production deployments should use
    /// intervals on the order of 30 minutes with comparable jitter.
    pub probe_base: Duration,
    /// Random jitter added on top of `probe_base`.
    pub probe_jitter: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(3),
            bind_retry: Duration::from_secs(5),
            probe_base: Duration::from_millis(59_000),
            probe_jitter: Duration::from_millis(2_000),
        }
    }
}

/// Validated agent configuration.
///
/// Construct via [`AgentConfig::builder`]; `build()` rejects a missing
/// TLS config, resolver, or TXT name provider with
/// [`AgentError::MissingConfig`].
pub struct AgentConfig {
    pub(crate) tls: Arc<rustls::ServerConfig>,
    pub(crate) resolver: Arc<dyn TxtResolver>,
    pub(crate) txt_name: Arc<dyn TxtNameProvider>,
    pub(crate) host_info: Option<Arc<dyn HostInfoProvider>>,
    pub(crate) port: u16,
    pub(crate) timing: Timing,
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("port", &self.port)
            .field("timing", &self.timing)
            .field("host_info", &self.host_info.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Default)]
pub struct AgentConfigBuilder {
    tls: Option<Arc<rustls::ServerConfig>>,
    resolver: Option<Arc<dyn TxtResolver>>,
    txt_name: Option<Arc<dyn TxtNameProvider>>,
    host_info: Option<Arc<dyn HostInfoProvider>>,
    port: Option<u16>,
    timing: Option<Timing>,
}

impl AgentConfigBuilder {
    /// TLS server configuration for inbound heartbeat connections. Required.
    pub fn tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// TXT lookup facility used by the probe scheduler. Required.
    pub fn resolver(mut self, resolver: Arc<dyn TxtResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Rendezvous TXT record name provider. Required.
    pub fn txt_name(mut self, provider: Arc<dyn TxtNameProvider>) -> Self {
        self.txt_name = Some(provider);
        self
    }

    /// Host info provider. Optional; HOST_INFO answers UNIMPL without it.
    pub fn host_info(mut self, provider: Arc<dyn HostInfoProvider>) -> Self {
        self.host_info = Some(provider);
        self
    }

    /// Override the heartbeat port. Defaults to [`PROTO_PORT`].
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Override timer settings.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<AgentConfig> {
        Ok(AgentConfig {
            tls: self.tls.ok_or(AgentError::MissingConfig("tls"))?,
            resolver: self.resolver.ok_or(AgentError::MissingConfig("resolver"))?,
            txt_name: self.txt_name.ok_or(AgentError::MissingConfig("txt_name"))?,
            host_info: self.host_info,
            port: self.port.unwrap_or(PROTO_PORT),
            timing: self.timing.unwrap_or_default(),
        })
    }
}
