//! Raw byte relay entered after a successful protocol selection.
//!
//! Once a protocol is agreed the tool stops framing entirely and forwards
//! bytes verbatim in both directions. This is a best-effort diagnostic
//! bridge: it returns as soon as either direction finishes, and the other
//! direction is abandoned. Process exit is the teardown mechanism, so no
//! close ordering is guaranteed for the half that is still open.

use tokio::io::{self, AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Pipe bytes between the connection and the operator's streams until
/// either direction reaches end-of-stream or fails. Copy errors are
/// reported through the log, not propagated.
pub async fn run<R, W, I, O>(mut conn_rd: R, mut conn_wr: W, mut input: I, mut output: O)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let mut inbound = tokio::spawn(async move { io::copy(&mut conn_rd, &mut output).await });

    tokio::select! {
        res = &mut inbound => match res {
            Ok(Ok(bytes)) => debug!(bytes, "peer closed the connection"),
            Ok(Err(e)) => warn!(error = %e, "read error"),
            Err(e) => warn!(error = %e, "relay task failed"),
        },
        res = io::copy(&mut input, &mut conn_wr) => match res {
            Ok(bytes) => debug!(bytes, "operator input closed"),
            Err(e) => warn!(error = %e, "write error"),
        },
    }
}
