//! TCP listener and session task management.
//!
//! Binds the heartbeat port (dual-stack where available, retrying
//! forever on failure), performs the TLS handshake under a timeout, and
//! runs one session task per accepted connection. On shutdown the
//! listener stops accepting first, then waits for live sessions to
//! drain.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::AgentConfig;
use crate::session::Session;

/// Matches the intentionally small accept queue of the protocol: peers
/// connect rarely and one at a time.
const BACKLOG: u32 = 4;

pub(crate) async fn run(cfg: Arc<AgentConfig>, cancel: CancellationToken) {
    let listener = match bind_with_retry(&cfg, &cancel).await {
        Some(listener) => listener,
        None => return, // cancelled while binding
    };
    serve(listener, cfg, cancel).await;
}

fn bind_on(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

/// Prefer a dual-stack v6 socket; fall back to v4 on v6-less hosts.
fn bind(port: u16) -> io::Result<TcpListener> {
    bind_on(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))).or_else(|err| {
        debug!(%err, "v6 bind failed, trying v4");
        bind_on(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    })
}

/// Keep trying to bind until it works or shutdown is requested.
async fn bind_with_retry(cfg: &AgentConfig, cancel: &CancellationToken) -> Option<TcpListener> {
    loop {
        match bind(cfg.port) {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    info!(%addr, "listening");
                }
                return Some(listener);
            }
            Err(err) => {
                warn!(port = cfg.port, %err, "bind failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = time::sleep(cfg.timing.bind_retry) => {}
                }
            }
        }
    }
}

async fn serve(listener: TcpListener, cfg: Arc<AgentConfig>, cancel: CancellationToken) {
    let acceptor = TlsAcceptor::from(cfg.tls.clone());
    let mut sessions: JoinSet<()> = JoinSet::new();
    let mut peers: HashMap<Id, SocketAddr> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(res) = sessions.join_next_with_id(), if !sessions.is_empty() => {
                reap(res, &mut peers);
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted");
                        let task = handle_connection(
                            stream,
                            acceptor.clone(),
                            cfg.clone(),
                            cancel.child_token(),
                        );
                        let handle = sessions.spawn(task.instrument(info_span!("session", %peer)));
                        peers.insert(handle.id(), peer);
                    }
                    Err(err) => {
                        // Accept failures are transient (fd pressure,
                        // aborted connections); keep serving.
                        warn!(%err, "accept failed");
                    }
                }
            }
        }
    }

    // Stop accepting first, then let live sessions wind down. Each holds
    // a child token, so they have already seen the shutdown signal.
    drop(listener);
    while let Some(res) = sessions.join_next_with_id().await {
        reap(res, &mut peers);
    }
    info!("listener stopped");
}

fn reap(res: Result<(Id, ()), JoinError>, peers: &mut HashMap<Id, SocketAddr>) {
    match res {
        Ok((id, ())) => {
            if let Some(peer) = peers.remove(&id) {
                debug!(%peer, "session ended");
            }
        }
        Err(err) => {
            let peer = peers.remove(&err.id());
            warn!(?peer, %err, "session task failed");
        }
    }
}

/// TLS handshake under its timeout, then the session loop.
///
/// A failed or timed-out handshake drops the socket without ceremony.
async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    cfg: Arc<AgentConfig>,
    cancel: CancellationToken,
) {
    let handshake = time::timeout(cfg.timing.handshake_timeout, acceptor.accept(stream));
    let tls = tokio::select! {
        _ = cancel.cancelled() => return,
        res = handshake => match res {
            Ok(Ok(tls)) => tls,
            Ok(Err(err)) => {
                debug!(%err, "TLS handshake failed");
                return;
            }
            Err(_) => {
                debug!("TLS handshake timed out");
                return;
            }
        },
    };
    Session::new(tls, cfg, cancel).run().await;
}
