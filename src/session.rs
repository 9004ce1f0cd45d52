//! Negotiation session: hello exchange, operator command loop, and the
//! hand-off into relay mode.
//!
//! The session is strictly synchronous before relay: every outbound frame
//! is followed by a blocking read of the corresponding response. It is
//! generic over the connection and the operator's streams so the whole
//! state machine can be driven against in-memory pipes in tests.

use crate::frame::{self, FrameError};
use crate::listing;
use crate::relay;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Protocol identifier sent as the payload of the first frame by each side.
pub const PROTOCOL_ID: &str = "/multistream/1.0.0";

/// Immutable per-session settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Echo outbound and inbound payloads with directional markers.
    pub verbose: bool,
}

/// One line of operator input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Literal `ls`: ask the peer for its supported protocols.
    ListRequest,
    /// A protocol identifier to propose, prefixed with `/`.
    ProtocolProposal(String),
    /// Anything else, forwarded verbatim with no special handling. The
    /// empty line lands here rather than faulting.
    Other,
}

impl Command {
    fn classify(line: &str) -> Self {
        if line == "ls" {
            Command::ListRequest
        } else if line.starts_with('/') {
            Command::ProtocolProposal(line.to_string())
        } else {
            Command::Other
        }
    }
}

/// A single negotiation session over one connection.
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session { config }
    }

    /// Drive the handshake and command loop over `conn`, reading operator
    /// lines from `input` and writing displayed text to `output`. Returns
    /// cleanly on operator end-of-input or after relay mode finishes; any
    /// frame or I/O error aborts the session.
    pub async fn run<C, I, O>(&self, conn: C, mut input: I, mut output: O) -> Result<(), FrameError>
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let (mut rd, mut wr) = tokio::io::split(conn);

        // Hello exchange: each side leads with its own identifier.
        self.echo_outbound(&mut output, PROTOCOL_ID.as_bytes()).await?;
        frame::write(&mut wr, PROTOCOL_ID.as_bytes()).await?;
        let hello = frame::read(&mut rd).await?;
        self.echo_inbound(&mut output, &hello).await?;

        let mut line = String::new();
        loop {
            self.prompt(&mut output).await?;
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                debug!("end of operator input");
                return Ok(());
            }
            let text = line.trim_end_matches(['\r', '\n']).to_string();
            let command = Command::classify(&text);

            self.echo_outbound(&mut output, text.as_bytes()).await?;
            frame::write(&mut wr, text.as_bytes()).await?;
            let reply = frame::read(&mut rd).await?;

            match command {
                Command::ListRequest => {
                    let protocols = listing::parse(&reply).await;
                    debug!(count = protocols.len(), "received protocol listing");
                    for proto in &protocols {
                        output.write_all(proto.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                    }
                    output.flush().await?;
                }
                command => {
                    self.echo_inbound(&mut output, &reply).await?;

                    // Look-ahead: the peer either proposes multistream back
                    // or has already switched to the selected protocol.
                    let lookahead = frame::read(&mut rd).await?;
                    if String::from_utf8_lossy(&lookahead).trim() == PROTOCOL_ID {
                        frame::write(&mut wr, PROTOCOL_ID.as_bytes()).await?;
                        self.echo_inbound(&mut output, PROTOCOL_ID.as_bytes()).await?;
                        self.echo_outbound(&mut output, PROTOCOL_ID.as_bytes()).await?;
                    } else if let Command::ProtocolProposal(proto) = command {
                        info!(protocol = %proto, "protocol selected, entering relay");
                        // The look-ahead frame already belongs to the
                        // selected protocol; surface it before going raw.
                        output.write_all(&lookahead).await?;
                        output.write_all(b"\n").await?;
                        output.flush().await?;
                        relay::run(rd, wr, input, output).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn echo_outbound<O>(&self, output: &mut O, payload: &[u8]) -> Result<(), FrameError>
    where
        O: AsyncWrite + Unpin,
    {
        if self.config.verbose {
            output.write_all(b"> ").await?;
            output.write_all(payload).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok(())
    }

    async fn echo_inbound<O>(&self, output: &mut O, payload: &[u8]) -> Result<(), FrameError>
    where
        O: AsyncWrite + Unpin,
    {
        if self.config.verbose {
            output.write_all(b"< ").await?;
        }
        output.write_all(payload).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }

    async fn prompt<O>(&self, output: &mut O) -> Result<(), FrameError>
    where
        O: AsyncWrite + Unpin,
    {
        if self.config.verbose {
            output.write_all(b"> ").await?;
            output.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_classify() {
        assert_eq!(Command::classify("ls"), Command::ListRequest);
        assert_eq!(
            Command::classify("/foo/1.0"),
            Command::ProtocolProposal("/foo/1.0".to_string())
        );
        assert_eq!(Command::classify("hello"), Command::Other);
        assert_eq!(Command::classify(""), Command::Other);
    }

    async fn read_all(mut rx: tokio::io::DuplexStream) -> String {
        let mut buf = Vec::new();
        rx.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_hello_exchange() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            let hello = frame::read(&mut peer).await.unwrap();
            assert_eq!(&hello[..], PROTOCOL_ID.as_bytes());
            frame::write(&mut peer, PROTOCOL_ID.as_bytes()).await.unwrap();
        });

        let session = Session::new(SessionConfig::default());
        session.run(conn, &b""[..], out_tx).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(read_all(out_rx).await, "/multistream/1.0.0\n");
    }

    #[tokio::test]
    async fn test_list_request_prints_each_protocol() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            frame::read(&mut peer).await.unwrap();
            frame::write(&mut peer, PROTOCOL_ID.as_bytes()).await.unwrap();

            let request = frame::read(&mut peer).await.unwrap();
            assert_eq!(&request[..], b"ls");

            let mut body = BytesMut::new();
            frame::put_uvarint(&mut body, 2);
            body.extend_from_slice(&frame::encode(b"/foo/1.0"));
            body.extend_from_slice(&frame::encode(b"/bar/2.0"));
            // The last inner newline doubles as the outer terminator.
            body.truncate(body.len() - 1);
            frame::write(&mut peer, &body).await.unwrap();
        });

        let session = Session::new(SessionConfig::default());
        session.run(conn, &b"ls\n"[..], out_tx).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(
            read_all(out_rx).await,
            "/multistream/1.0.0\n/foo/1.0\n/bar/2.0\n"
        );
    }

    #[tokio::test]
    async fn test_protocol_switch_enters_relay() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            frame::read(&mut peer).await.unwrap();
            frame::write(&mut peer, PROTOCOL_ID.as_bytes()).await.unwrap();

            let proposal = frame::read(&mut peer).await.unwrap();
            assert_eq!(&proposal[..], b"/foo/1.0");
            frame::write(&mut peer, b"ok").await.unwrap();
            frame::write(&mut peer, b"na").await.unwrap();

            // After the switch, operator bytes must arrive unframed.
            let mut raw = vec![0u8; 9];
            peer.read_exact(&mut raw).await.unwrap();
            assert_eq!(&raw, b"raw bytes");
        });

        let session = Session::new(SessionConfig::default());
        session
            .run(conn, &b"/foo/1.0\nraw bytes"[..], out_tx)
            .await
            .unwrap();
        peer_task.await.unwrap();

        assert_eq!(read_all(out_rx).await, "/multistream/1.0.0\nok\nna\n");
    }

    #[tokio::test]
    async fn test_peer_reproposal_is_acknowledged() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            frame::read(&mut peer).await.unwrap();
            frame::write(&mut peer, PROTOCOL_ID.as_bytes()).await.unwrap();

            frame::read(&mut peer).await.unwrap();
            frame::write(&mut peer, b"ok").await.unwrap();
            // Padded with whitespace: the comparison trims.
            frame::write(&mut peer, b" /multistream/1.0.0 ").await.unwrap();

            let ack = frame::read(&mut peer).await.unwrap();
            assert_eq!(&ack[..], PROTOCOL_ID.as_bytes());
        });

        let session = Session::new(SessionConfig::default());
        session.run(conn, &b"hey\n"[..], out_tx).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(
            read_all(out_rx).await,
            "/multistream/1.0.0\nok\n/multistream/1.0.0\n"
        );
    }

    #[tokio::test]
    async fn test_verbose_markers() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            frame::read(&mut peer).await.unwrap();
            frame::write(&mut peer, PROTOCOL_ID.as_bytes()).await.unwrap();
        });

        let session = Session::new(SessionConfig { verbose: true });
        session.run(conn, &b""[..], out_tx).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(
            read_all(out_rx).await,
            "> /multistream/1.0.0\n< /multistream/1.0.0\n> "
        );
    }

    #[tokio::test]
    async fn test_peer_hello_without_newline_is_malformed() {
        let (conn, mut peer) = tokio::io::duplex(4096);
        let (out_tx, _out_rx) = tokio::io::duplex(4096);

        let peer_task = tokio::spawn(async move {
            frame::read(&mut peer).await.unwrap();
            // Correct length, wrong terminator.
            peer.write_all(b"\x03ab!").await.unwrap();
        });

        let session = Session::new(SessionConfig::default());
        match session.run(conn, &b""[..], out_tx).await {
            Err(FrameError::MalformedFrame) => {}
            other => panic!("unexpected: {:?}", other),
        }
        peer_task.await.unwrap();
    }
}
