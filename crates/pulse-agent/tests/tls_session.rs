//! End-to-end exchanges against a live agent over TCP and TLS.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use pulse_agent::{AgentConfig, HostInfoProvider, Supervisor, TxtNameProvider, TxtResolver};
use pulse_wire::{
    decode_head, decode_host_info, decode_status, decode_stdio, encode_cmd, encode_head,
    encode_stdio, CmdSpec, HostInfo, MsgHead, Op, Status, StdioHead,
};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

struct NullResolver;

#[async_trait::async_trait]
impl TxtResolver for NullResolver {
    async fn lookup_txt(&self, _name: &str) -> io::Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }
}

struct StaticName(&'static str);

impl TxtNameProvider for StaticName {
    fn txt_name(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

struct FixedInfo(HostInfo);

impl HostInfoProvider for FixedInfo {
    fn host_info(&self) -> io::Result<HostInfo> {
        Ok(self.0)
    }
}

fn host_info() -> HostInfo {
    HostInfo {
        uptime_secs: 86_400,
        pid: 4242,
        prog_ver: *b"pulsed-it\0\0\0\0\0\0\0",
        boot_id: [0xA7; 16],
        os: 1,
        arch: 2,
    }
}

struct TlsPair {
    server: Arc<rustls::ServerConfig>,
    client: Arc<rustls::ClientConfig>,
}

fn tls_pair() -> TlsPair {
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

    TlsPair {
        server: Arc::new(server),
        client: Arc::new(client),
    }
}

/// Grab an ephemeral port that is very likely still free.
async fn pick_port() -> u16 {
    let probe = TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("ephemeral bind should succeed");
    probe.local_addr().expect("local addr").port()
}

async fn start_agent() -> (Supervisor, Arc<rustls::ClientConfig>, u16) {
    let pair = tls_pair();
    let port = pick_port().await;
    let cfg = AgentConfig::builder()
        .tls(pair.server)
        .resolver(Arc::new(NullResolver))
        .txt_name(Arc::new(StaticName("rendezvous.example.net")))
        .host_info(Arc::new(FixedInfo(host_info())))
        .port(port)
        .build()
        .expect("config should build");
    (Supervisor::start(cfg), pair.client, port)
}

async fn connect_tcp(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("agent never started listening on port {port}");
}

async fn connect_tls(client: Arc<rustls::ClientConfig>, port: u16) -> TlsStream<TcpStream> {
    let tcp = connect_tcp(port).await;
    let name = ServerName::try_from("localhost").expect("valid server name");
    TlsConnector::from(client)
        .connect(name, tcp)
        .await
        .expect("TLS handshake should succeed")
}

async fn fill<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut BytesMut) {
    let mut tmp = [0u8; 512];
    let n = stream.read(&mut tmp).await.expect("read should succeed");
    assert!(n > 0, "peer closed mid-exchange");
    buf.extend_from_slice(&tmp[..n]);
}

async fn recv_head<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut BytesMut) -> MsgHead {
    loop {
        if let Some(head) = decode_head(buf).expect("well-formed header") {
            return head;
        }
        fill(stream, buf).await;
    }
}

async fn send_frame<S: AsyncWrite + Unpin>(stream: &mut S, head: MsgHead, body: &[u8]) {
    let mut out = BytesMut::new();
    encode_head(&head, &mut out).expect("encodable header");
    out.extend_from_slice(body);
    stream.write_all(&out).await.expect("write should succeed");
}

#[tokio::test]
async fn host_info_over_tls() {
    let (supervisor, client, port) = start_agent().await;
    let mut stream = connect_tls(client, port).await;

    send_frame(&mut stream, MsgHead::request(1, Op::HostInfo), &[]).await;
    let mut buf = BytesMut::new();
    let head = recv_head(&mut stream, &mut buf).await;
    assert_eq!(
        head,
        MsgHead::request(1, Op::HostInfo).response(Op::HostInfo)
    );
    let info = loop {
        if let Some(info) = decode_host_info(&mut buf).expect("well-formed body") {
            break info;
        }
        fill(&mut stream, &mut buf).await;
    };
    assert_eq!(info, host_info());

    supervisor.stop().await;
}

#[tokio::test]
async fn command_execution_over_tls() {
    let (supervisor, client, port) = start_agent().await;
    let mut stream = connect_tls(client, port).await;

    let spec = CmdSpec::new(
        vec!["/bin/sh".into(), "-c".into(), "printf pulse; exit 5".into()],
        false,
    )
    .expect("valid command");
    let mut body = BytesMut::new();
    encode_cmd(&spec, &mut body).expect("encodable command");
    send_frame(&mut stream, MsgHead::request(2, Op::RunCmd), &body).await;

    let mut eof = BytesMut::new();
    encode_stdio(&StdioHead::eof(false), &mut eof).expect("encodable sub-frame");
    stream.write_all(&eof).await.expect("write should succeed");

    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    let mut open = 2;
    while open > 0 {
        let head = loop {
            if let Some(head) = decode_stdio(&mut buf).expect("well-formed sub-frame") {
                break head;
            }
            fill(&mut stream, &mut buf).await;
        };
        while buf.len() < head.len {
            fill(&mut stream, &mut buf).await;
        }
        let payload = buf.split_to(head.len);
        if head.is_eof() {
            open -= 1;
        } else if !head.is_stderr {
            out.extend_from_slice(&payload);
        }
    }
    assert_eq!(out, b"pulse");

    let head = recv_head(&mut stream, &mut buf).await;
    assert_eq!(head.id, 2);
    assert_eq!(head.op, Op::Status);
    assert!(head.is_response);
    let status = loop {
        if let Some(status) = decode_status(&mut buf).expect("well-formed status") {
            break status;
        }
        fill(&mut stream, &mut buf).await;
    };
    assert_eq!(status, Status::ok(5));

    supervisor.stop().await;
}

#[tokio::test]
async fn shutdown_closes_live_sessions() {
    let (supervisor, client, port) = start_agent().await;
    let mut stream = connect_tls(client, port).await;

    // Prove the session is live before pulling the plug.
    send_frame(&mut stream, MsgHead::request(3, Op::HostInfo), &[]).await;
    let mut buf = BytesMut::new();
    recv_head(&mut stream, &mut buf).await;

    timeout(Duration::from_secs(10), supervisor.stop())
        .await
        .expect("shutdown should drain the session");

    // The agent closed its side; the next read reports end-of-stream.
    let mut tmp = [0u8; 64];
    loop {
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {} // residual response bytes
        }
    }
}

#[tokio::test]
async fn garbage_handshake_does_not_wedge_the_listener() {
    let (supervisor, client, port) = start_agent().await;

    let mut raw = connect_tcp(port).await;
    raw.write_all(b"this is not a ClientHello")
        .await
        .expect("write should succeed");
    drop(raw);

    // A proper client still gets served.
    let mut stream = connect_tls(client, port).await;
    send_frame(&mut stream, MsgHead::request(4, Op::HostInfo), &[]).await;
    let mut buf = BytesMut::new();
    let head = recv_head(&mut stream, &mut buf).await;
    assert_eq!(head.op, Op::HostInfo);

    supervisor.stop().await;
}
