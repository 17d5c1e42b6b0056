//! Shared fixtures for unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use pulse_wire::HostInfo;
use tokio::sync::Notify;

use crate::config::{
    AgentConfig, AgentConfigBuilder, HostInfoProvider, TxtNameProvider, TxtResolver,
};

pub(crate) struct TlsIdentity {
    pub server: Arc<rustls::ServerConfig>,
    pub client: Arc<rustls::ClientConfig>,
}

/// Self-signed identity for "localhost" plus a client config trusting it.
pub(crate) fn tls_identity() -> TlsIdentity {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("certificate generation should succeed");
    let cert_der = cert.cert.der().clone();
    let key_der = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let server = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der.into())
        .expect("server config should build");

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).expect("root should be addable");
    let client = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsIdentity {
        server: Arc::new(server),
        client: Arc::new(client),
    }
}

/// Resolver that records queries and serves canned records.
pub(crate) struct MockResolver {
    pub queries: Mutex<Vec<String>>,
    pub queried: Notify,
    pub records: Vec<Vec<u8>>,
}

#[async_trait::async_trait]
impl TxtResolver for MockResolver {
    async fn lookup_txt(&self, name: &str) -> io::Result<Vec<Vec<u8>>> {
        self.queries
            .lock()
            .expect("queries lock should not be poisoned")
            .push(name.to_owned());
        self.queried.notify_one();
        Ok(self.records.clone())
    }
}

pub(crate) fn mock_resolver() -> Arc<MockResolver> {
    Arc::new(MockResolver {
        queries: Mutex::new(Vec::new()),
        queried: Notify::new(),
        records: vec![b"ep=192.0.2.10:64420".to_vec()],
    })
}

struct StaticTxtName(String);

impl TxtNameProvider for StaticTxtName {
    fn txt_name(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub(crate) fn static_txt_name(name: &str) -> Arc<dyn TxtNameProvider> {
    Arc::new(StaticTxtName(name.to_owned()))
}

struct FixedHostInfo(HostInfo);

impl HostInfoProvider for FixedHostInfo {
    fn host_info(&self) -> io::Result<HostInfo> {
        Ok(self.0)
    }
}

pub(crate) fn sample_host_info() -> HostInfo {
    HostInfo {
        uptime_secs: 3600,
        pid: 1234,
        prog_ver: *b"pulse-test\0\0\0\0\0\0",
        boot_id: [0x5A; 16],
        os: 1,
        arch: 2,
    }
}

pub(crate) fn fixed_host_info() -> Arc<dyn HostInfoProvider> {
    Arc::new(FixedHostInfo(sample_host_info()))
}

struct FailingHostInfo(i32);

impl HostInfoProvider for FailingHostInfo {
    fn host_info(&self) -> io::Result<HostInfo> {
        Err(io::Error::from_raw_os_error(self.0))
    }
}

pub(crate) fn failing_host_info(errno: i32) -> Arc<dyn HostInfoProvider> {
    Arc::new(FailingHostInfo(errno))
}

/// Config with all required collaborators filled in.
pub(crate) fn config() -> AgentConfig {
    config_with(|b| b)
}

pub(crate) fn config_with<F>(customize: F) -> AgentConfig
where
    F: FnOnce(AgentConfigBuilder) -> AgentConfigBuilder,
{
    let builder = AgentConfig::builder()
        .tls(tls_identity().server)
        .resolver(mock_resolver())
        .txt_name(static_txt_name("rendezvous.example.net"));
    customize(builder)
        .build()
        .expect("test config should build")
}
