//! Newline-delimited JSON frames exchanged over the control socket

use pkgd_dispatch::{Reply, Request};
use pkgd_errors::{DispatchError, Error};
use pkgd_events::ProgressEvent;
use serde::{Deserialize, Serialize};

/// One client request; `id` is echoed on every frame it causes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub id: u64,
    pub request: Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Reply { id: u64, reply: Reply },
    /// Live event of an operation attached under `id`
    Event { id: u64, event: ProgressEvent },
    /// No more events follow for `id`
    End { id: u64, end: bool },
}

impl ServerFrame {
    pub fn reply(id: u64, reply: Reply) -> Self {
        Self::Reply { id, reply }
    }

    pub fn event(id: u64, event: ProgressEvent) -> Self {
        Self::Event { id, event }
    }

    pub fn end(id: u64) -> Self {
        Self::End { id, end: true }
    }

    /// Error reply for a line that is not a valid request
    pub fn malformed(id: u64, reason: impl Into<String>) -> Self {
        let error = Error::from(DispatchError::malformed(reason));
        Self::reply(id, Reply::from(&error))
    }
}

/// Parse a request line
///
/// On failure returns the frame id if one could be recovered, and the reason.
pub fn decode(line: &[u8]) -> Result<ClientFrame, (u64, String)> {
    serde_json::from_slice::<ClientFrame>(line).map_err(|error| {
        let id = serde_json::from_slice::<serde_json::Value>(line)
            .ok()
            .and_then(|value| value.get("id").and_then(serde_json::Value::as_u64))
            .unwrap_or(0);
        (id, error.to_string())
    })
}

/// Serialize a frame as one line, newline included
pub fn encode(frame: &ServerFrame) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(line)
}
