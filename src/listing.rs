//! Parser for the list-protocols (`ls`) response body.
//!
//! The payload of an `ls` response is `varint(count)` followed by `count`
//! inner frames, each carrying one protocol-identifier string. The outer
//! decode already consumed the newline that terminates the final inner
//! frame, so one is appended before parsing.

use crate::frame;
use tracing::debug;

/// Parse a list-protocols response payload into protocol identifiers, in
/// order. The listing is advisory: a sub-decode failure stops parsing early
/// and returns the entries collected so far, never an error.
pub async fn parse(payload: &[u8]) -> Vec<String> {
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.extend_from_slice(payload);
    body.push(b'\n');

    let mut source = &body[..];
    let count = match frame::read_uvarint(&mut source).await {
        Ok(count) => count,
        Err(e) => {
            debug!(error = %e, "unreadable listing count");
            return Vec::new();
        }
    };

    let mut protocols = Vec::new();
    for _ in 0..count {
        match frame::read(&mut source).await {
            Ok(entry) => protocols.push(String::from_utf8_lossy(&entry).into_owned()),
            Err(e) => {
                debug!(error = %e, parsed = protocols.len(), "listing truncated");
                break;
            }
        }
    }
    protocols
}
