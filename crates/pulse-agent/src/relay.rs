//! Command execution and stdio relaying for RUN_CMD.
//!
//! An attached command turns the encrypted stream into a stdio tunnel
//! until the child exits: peer bytes flow into the child's stdin, child
//! stdout/stderr flow back as stdio sub-frames, and the final STATUS
//! frame carries the exit classification. A detached command is spawned
//! in its own session and confirmed immediately.

use std::io;
use std::process::{ExitStatus, Stdio};

use bytes::{Buf, BytesMut};
use pulse_wire::{
    decode_stdio, encode_stdio, CmdSpec, Status, StdioHead, PROTO_SUB_MIN_BUF, STDIO_LEN_MAX,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

/// Result of a RUN_CMD exchange.
pub(crate) struct Outcome {
    /// STATUS body to report for the request.
    pub status: Status,
    /// False when the stream is no longer frame-aligned and the session
    /// must close without answering.
    pub conn_ok: bool,
}

/// Execute `spec`, relaying stdio over `rd`/`wr` unless detached.
///
/// `inbuf` may already hold pipelined stdio sub-frames received together
/// with the RUN_CMD request; `outbuf` must be empty on entry.
pub(crate) async fn run<R, W>(
    spec: &CmdSpec,
    rd: &mut R,
    wr: &mut W,
    inbuf: &mut BytesMut,
    outbuf: &mut BytesMut,
) -> Outcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if spec.detach {
        return Outcome {
            status: spawn_detached(spec),
            conn_ok: true,
        };
    }

    let mut cmd = build_command(spec);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            debug!(prog = %spec.args[0], %err, "spawn failed");
            return Outcome {
                status: status_from_io(&err),
                conn_ok: true,
            };
        }
    };
    trace!(prog = %spec.args[0], pid = child.id(), "relaying");

    match relay_streams(&mut child, rd, wr, inbuf, outbuf).await {
        Ok(()) => match child.wait().await {
            Ok(exit) => Outcome {
                status: Status::ok(classify_exit(exit)),
                conn_ok: true,
            },
            Err(err) => Outcome {
                status: status_from_io(&err),
                conn_ok: true,
            },
        },
        Err(err) => {
            debug!(%err, "relay aborted");
            let _ = child.start_kill();
            let _ = child.wait().await;
            Outcome {
                status: status_from_io(&err),
                conn_ok: false,
            }
        }
    }
}

fn build_command(spec: &CmdSpec) -> Command {
    let mut cmd = Command::new(&spec.args[0]);
    cmd.args(&spec.args[1..]);
    cmd
}

/// Spawn a fire-and-forget child in its own session.
///
/// The child is not waited on here; the runtime reaps it when it exits.
fn spawn_detached(spec: &CmdSpec) -> Status {
    let mut cmd = build_command(spec);
    cmd.stdin(Stdio::null());
    // Release builds detach the child's output entirely; debug builds
    // leave stdout/stderr inherited so local runs stay observable.
    #[cfg(not(debug_assertions))]
    {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    }
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    match cmd.spawn() {
        Ok(child) => {
            trace!(prog = %spec.args[0], pid = child.id(), "detached");
            drop(child);
            Status::ok(0)
        }
        Err(err) => {
            debug!(prog = %spec.args[0], %err, "detached spawn failed");
            status_from_io(&err)
        }
    }
}

/// Parser state for the inbound stdin sub-stream.
#[derive(Default)]
struct Inbound {
    /// Payload bytes outstanding for the current sub-frame.
    rem: usize,
    /// Current sub-frame carried the final flag.
    fin: bool,
    /// No further stdin sub-frames are expected.
    done: bool,
}

/// Consume as much of the stdin sub-stream from `inbuf` as possible.
///
/// Payload bytes are staged for the child, or discarded once its stdin
/// has gone away. Bytes past the channel's end are left untouched; they
/// belong to the next protocol frame.
fn pump_inbound(
    inbuf: &mut BytesMut,
    st: &mut Inbound,
    stage: &mut BytesMut,
    stdin_open: bool,
) -> pulse_wire::Result<()> {
    loop {
        if st.done {
            return Ok(());
        }
        if st.rem > 0 {
            let take = st.rem.min(inbuf.len());
            if take == 0 {
                return Ok(());
            }
            let payload = inbuf.split_to(take);
            if stdin_open {
                stage.extend_from_slice(&payload);
            }
            st.rem -= take;
            if st.rem == 0 && st.fin {
                st.done = true;
            }
            continue;
        }
        match decode_stdio(inbuf)? {
            None => return Ok(()),
            Some(head) => {
                if head.is_eof() {
                    st.done = true;
                } else {
                    st.rem = head.len;
                    st.fin = head.is_final;
                }
            }
        }
    }
}

async fn write_stdin(stdin: &mut Option<ChildStdin>, buf: &[u8]) -> io::Result<usize> {
    match stdin {
        Some(pipe) => pipe.write(buf).await,
        None => std::future::pending().await,
    }
}

/// Read from whichever output channel is ready, preferring `prefer_err`
/// so a chatty channel cannot starve the other. Each channel fills its
/// own buffer; the returned flag tells the caller which one holds data.
async fn read_child_out(
    stdout: &mut Option<ChildStdout>,
    stderr: &mut Option<ChildStderr>,
    prefer_err: bool,
    obuf: &mut [u8],
    ebuf: &mut [u8],
) -> (bool, io::Result<usize>) {
    match (stdout, stderr) {
        (Some(out), Some(err)) => {
            if prefer_err {
                tokio::select! {
                    biased;
                    res = err.read(ebuf) => (true, res),
                    res = out.read(obuf) => (false, res),
                }
            } else {
                tokio::select! {
                    biased;
                    res = out.read(obuf) => (false, res),
                    res = err.read(ebuf) => (true, res),
                }
            }
        }
        (Some(out), None) => (false, out.read(obuf).await),
        (None, Some(err)) => (true, err.read(ebuf).await),
        (None, None) => std::future::pending().await,
    }
}

/// Shuttle bytes between the peer and the child until both directions
/// are drained.
///
/// Returns `Err` only for conditions that leave the stream unusable:
/// transport failure, peer EOF mid-exchange, or a malformed sub-frame.
async fn relay_streams<R, W>(
    child: &mut Child,
    rd: &mut R,
    wr: &mut W,
    inbuf: &mut BytesMut,
    outbuf: &mut BytesMut,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stdin = child.stdin.take();
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let mut st = Inbound::default();
    let mut stage = BytesMut::new();
    let mut prefer_err = false;
    let mut ochunk = vec![0u8; STDIO_LEN_MAX];
    let mut echunk = vec![0u8; STDIO_LEN_MAX];
    let mut net = vec![0u8; 2048];

    // Sub-frames pipelined behind the request may already be buffered.
    pump_inbound(inbuf, &mut st, &mut stage, stdin.is_some()).map_err(malformed)?;

    loop {
        if st.done && stage.is_empty() {
            // Everything the peer sent has reached the child.
            stdin = None;
        }
        if st.done
            && stage.is_empty()
            && outbuf.is_empty()
            && stdout.is_none()
            && stderr.is_none()
        {
            return Ok(());
        }

        tokio::select! {
            res = wr.write(&outbuf[..]), if !outbuf.is_empty() => {
                let n = res?;
                if n == 0 {
                    return Err(io::ErrorKind::WriteZero.into());
                }
                outbuf.advance(n);
            }
            // Staged-but-unwritten stdin bytes count against the cap,
            // or a peer could grow the stage without limit while the
            // child ignores its stdin.
            res = rd.read(&mut net), if !st.done && stage.len() + inbuf.len() < PROTO_SUB_MIN_BUF => {
                let n = res?;
                if n == 0 {
                    // Peer hung up before closing the stdin channel.
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                inbuf.extend_from_slice(&net[..n]);
                pump_inbound(inbuf, &mut st, &mut stage, stdin.is_some())
                    .map_err(malformed)?;
            }
            res = write_stdin(&mut stdin, &stage), if !stage.is_empty() => {
                match res {
                    Ok(n) if n > 0 => {
                        stage.advance(n);
                    }
                    _ => {
                        // Child stopped reading; drop the rest quietly.
                        stdin = None;
                        stage.clear();
                    }
                }
            }
            res = read_child_out(&mut stdout, &mut stderr, prefer_err, &mut ochunk, &mut echunk),
                if outbuf.is_empty() && (stdout.is_some() || stderr.is_some()) =>
            {
                let (is_stderr, res) = res;
                // A read failure on a stdio pipe ends that channel.
                let n = res.unwrap_or(0);
                let head = StdioHead {
                    len: n,
                    is_stderr,
                    is_final: n == 0,
                };
                encode_stdio(&head, outbuf).map_err(malformed)?;
                let chunk = if is_stderr { &echunk } else { &ochunk };
                outbuf.extend_from_slice(&chunk[..n]);
                if n == 0 {
                    if is_stderr {
                        stderr = None;
                    } else {
                        stdout = None;
                    }
                }
                prefer_err = !prefer_err;
            }
        }
    }
}

fn malformed(err: pulse_wire::WireError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn status_from_io(err: &io::Error) -> Status {
    Status::errno(err.raw_os_error().unwrap_or(0))
}

/// Map an exit status to the wire classification: the exit code when the
/// child exited, `128 + signal` when it was killed, `-1` otherwise.
fn classify_exit(exit: ExitStatus) -> i32 {
    if let Some(code) = exit.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = exit.signal() {
            return 128 + sig;
        }
    }
    -1
}
