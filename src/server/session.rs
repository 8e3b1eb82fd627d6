//! Per-connection session task
//!
//! One task per socket: it reads inbound bytes, hands every complete record
//! to the coordinator and writes whatever the coordinator queued for this
//! session. Reads are cancel-safe, so both directions share one `select!`.
//! Records that touch the repository finish on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::coordinator::{Coordinator, Flow, Outbound};
use crate::protocol::FrameBuffer;

const READ_CHUNK: usize = 4096;

/// Drive one client connection until either side closes it.
pub async fn run_session<S>(coordinator: Arc<Coordinator>, stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let id = coordinator.connect(outbox);
    info!(session = id, %peer, "client connected");

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut frames = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    let reason = loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = match read {
                    Ok(0) => break "peer closed connection",
                    Ok(n) => n,
                    Err(e) => {
                        warn!(session = id, error = %e, "read failed");
                        break "read error";
                    }
                };
                if let Err(e) = frames.extend(&chunk[..n]) {
                    warn!(session = id, error = %e, "dropping session");
                    break "oversized record";
                }
                if dispatch_records(&coordinator, id, &mut frames).await == Flow::Disconnect {
                    break "disconnected by server";
                }
            }
            outbound = inbox.recv() => match outbound {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = writer.write_all(text.as_bytes()).await {
                        warn!(session = id, error = %e, "write failed");
                        break "write error";
                    }
                }
                Some(Outbound::Close) | None => break "closed by server",
            },
        }
    };

    coordinator.disconnect(id);

    // Flush anything queued before the disconnect, e.g. a shutdown notice.
    while let Ok(Outbound::Frame(text)) = inbox.try_recv() {
        if writer.write_all(text.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
    info!(session = id, %peer, reason, "client disconnected");
}

async fn dispatch_records(
    coordinator: &Arc<Coordinator>,
    id: u64,
    frames: &mut FrameBuffer,
) -> Flow {
    loop {
        let record = match frames.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                warn!(session = id, error = %e, "disconnecting session after malformed input");
                return Flow::Disconnect;
            }
        };
        debug!(session = id, bytes = record.len(), "record received");

        let dispatch = coordinator.receive(id, &record);
        let flow = if dispatch.has_effects() {
            let coordinator = Arc::clone(coordinator);
            match tokio::task::spawn_blocking(move || coordinator.complete(dispatch)).await {
                Ok(flow) => flow,
                Err(e) => {
                    error!(session = id, error = %e, "persistence task failed");
                    Flow::Disconnect
                }
            }
        } else {
            dispatch.flow()
        };
        if flow == Flow::Disconnect {
            return Flow::Disconnect;
        }
    }
}
