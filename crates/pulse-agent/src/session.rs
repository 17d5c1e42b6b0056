//! Per-connection request/response state machine.
//!
//! One session serves one established TLS stream. Frames are decoded
//! incrementally from a bounded inbound buffer; responses accumulate in
//! an outbound buffer and flush as the socket allows. A session ends on
//! peer close, idle timeout, shutdown, or a protocol violation (after
//! the STATUS/PROTO_ERR report has flushed).

use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use pulse_wire::{
    decode_cmd, decode_head, encode_head, encode_host_info, encode_status, CmdSpec, MsgHead, Op,
    Status, PROTO_MIN_BUF, PROTO_SUB_MIN_BUF,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::AgentConfig;
use crate::relay;

pub(crate) struct Session<S> {
    rd: ReadHalf<S>,
    wr: WriteHalf<S>,
    inbuf: BytesMut,
    outbuf: BytesMut,
    scratch: Box<[u8]>,
    /// RUN_CMD header whose body has not fully arrived yet.
    pending: Option<MsgHead>,
    cfg: Arc<AgentConfig>,
    cancel: CancellationToken,
    /// Cleared on a protocol violation; the session flushes and closes.
    valid: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub(crate) fn new(stream: S, cfg: Arc<AgentConfig>, cancel: CancellationToken) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            rd,
            wr,
            inbuf: BytesMut::with_capacity(PROTO_MIN_BUF),
            outbuf: BytesMut::with_capacity(PROTO_SUB_MIN_BUF),
            scratch: vec![0u8; PROTO_MIN_BUF].into_boxed_slice(),
            pending: None,
            cfg,
            cancel,
            valid: true,
        }
    }

    /// Serve the connection until it ends, then close it down.
    pub(crate) async fn run(mut self) {
        let idle = self.cfg.timing.idle_timeout;
        let mut deadline = Instant::now() + idle;
        loop {
            if !self.valid && self.outbuf.is_empty() {
                break;
            }
            let space = PROTO_MIN_BUF.saturating_sub(self.inbuf.len());
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    trace!("shutting down");
                    break;
                }
                _ = time::sleep_until(deadline) => {
                    debug!("idle timeout");
                    break;
                }
                res = self.wr.write(&self.outbuf[..]), if !self.outbuf.is_empty() => {
                    match res {
                        Ok(n) if n > 0 => self.outbuf.advance(n),
                        _ => break,
                    }
                }
                res = self.rd.read(&mut self.scratch[..space]), if self.valid && space > 0 => {
                    let n = match res {
                        Ok(0) => break, // peer closed
                        Ok(n) => n,
                        Err(err) => {
                            debug!(%err, "read failed");
                            break;
                        }
                    };
                    self.inbuf.extend_from_slice(&self.scratch[..n]);
                    match self.consume().await {
                        Ok(true) => deadline = Instant::now() + idle,
                        Ok(false) => {
                            if self.inbuf.len() >= PROTO_MIN_BUF {
                                debug!("inbound buffer full without a complete frame");
                                break;
                            }
                        }
                        Err(err) => {
                            debug!(%err, "session failed");
                            break;
                        }
                    }
                }
            }
        }
        self.close().await;
    }

    /// Handle every complete frame currently buffered.
    ///
    /// Returns whether at least one frame completed, which refreshes the
    /// idle deadline.
    async fn consume(&mut self) -> io::Result<bool> {
        let mut progressed = false;
        while self.valid {
            let head = match self.pending.take() {
                Some(head) => head,
                None => match decode_head(&mut self.inbuf) {
                    Ok(Some(head)) => head,
                    Ok(None) => break,
                    Err(err) => {
                        debug!(%err, "bad frame header");
                        self.raise_proto_err(0);
                        progressed = true;
                        break;
                    }
                },
            };

            if head.is_response || (head.id == 0 && head.op != Op::Noop) {
                debug!(op = head.op.name(), id = head.id, "protocol violation");
                self.raise_proto_err(head.id);
                progressed = true;
                break;
            }

            match head.op {
                Op::Noop => {
                    trace!("noop");
                    progressed = true;
                }
                Op::HostInfo => {
                    self.answer_host_info(&head);
                    progressed = true;
                }
                Op::RunCmd => match decode_cmd(&mut self.inbuf) {
                    Ok(Some(spec)) => {
                        progressed = true;
                        self.exec(&head, &spec).await?;
                    }
                    Ok(None) => {
                        // Header consumed, body still in flight.
                        self.pending = Some(head);
                        break;
                    }
                    Err(err) => {
                        debug!(%err, "bad command body");
                        self.raise_proto_err(head.id);
                        progressed = true;
                        break;
                    }
                },
                op => {
                    debug!(op = op.name(), id = head.id, "unsupported op");
                    self.queue_status(&head, Status::unimpl());
                    progressed = true;
                }
            }
        }
        Ok(progressed)
    }

    fn answer_host_info(&mut self, head: &MsgHead) {
        match &self.cfg.host_info {
            None => self.queue_status(head, Status::unimpl()),
            Some(provider) => match provider.host_info() {
                Ok(info) => {
                    self.queue_head(head.response(Op::HostInfo));
                    encode_host_info(&info, &mut self.outbuf);
                }
                Err(err) => {
                    debug!(%err, "host info query failed");
                    self.queue_status(head, Status::errno(err.raw_os_error().unwrap_or(0)));
                }
            },
        }
    }

    /// Run a command, relaying stdio inline for attached requests.
    async fn exec(&mut self, head: &MsgHead, spec: &CmdSpec) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        debug!(id = head.id, prog = %spec.args[0], detach = spec.detach, "run command");

        // The relay takes over the stream; queued responses go first.
        while !self.outbuf.is_empty() {
            let n = self.wr.write(&self.outbuf[..]).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            self.outbuf.advance(n);
        }

        let outcome = relay::run(
            spec,
            &mut self.rd,
            &mut self.wr,
            &mut self.inbuf,
            &mut self.outbuf,
        )
        .await;
        if !outcome.conn_ok {
            self.valid = false;
            self.outbuf.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "stream no longer frame-aligned",
            ));
        }
        self.queue_status(head, outcome.status);
        Ok(())
    }

    /// Report a protocol violation and mark the session for teardown
    /// once the report has flushed.
    fn raise_proto_err(&mut self, id: u16) {
        self.queue_status(
            &MsgHead {
                id,
                is_response: false,
                op: Op::Status,
            },
            Status::proto_err(),
        );
        self.valid = false;
    }

    fn queue_status(&mut self, req: &MsgHead, status: Status) {
        self.queue_head(req.response(Op::Status));
        encode_status(&status, &mut self.outbuf);
    }

    fn queue_head(&mut self, head: MsgHead) {
        // Ids that came off the wire fit in 15 bits.
        encode_head(&head, &mut self.outbuf).expect("response id in range");
    }

    /// Best-effort TLS close-notify, bounded by the close timeout.
    async fn close(mut self) {
        if time::timeout(self.cfg.timing.close_timeout, self.wr.shutdown())
            .await
            .is_err()
        {
            trace!("close-notify timed out");
        }
    }
}
