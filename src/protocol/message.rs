//! Frame codec: raw WebSocket frames to and from [`ServerMessage`].

/// Prefix of every message-bearing inbound frame.
const FRAME_PREFIX: &str = "a[\"";
/// Suffix of every message-bearing inbound frame.
const FRAME_SUFFIX: &str = "\"]";

/// One decoded inbound message: `(room, type, args…)`.
///
/// Messages without a room component (server-global lines such as the
/// handshake challenge or query responses) carry an empty `room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub room: String,
    pub kind: String,
    pub args: Vec<String>,
}

impl ServerMessage {
    /// Re-join the argument tail with the pipe delimiter.
    ///
    /// Some payloads (the handshake challenge, query-response JSON) may
    /// themselves contain pipes, so the split args have to be glued back
    /// together before use.
    pub fn rest(&self) -> String {
        self.args.join("|")
    }

    /// Re-join the arguments starting at `from`.
    pub fn rest_from(&self, from: usize) -> String {
        if from >= self.args.len() {
            return String::new();
        }
        self.args[from..].join("|")
    }
}

/// Decode one inbound frame into a [`ServerMessage`].
///
/// Frames that do not carry the array-literal envelope (the connection-open
/// marker and periodic heartbeats from the framing layer) are not messages
/// and decode to `None`, as do envelopes too short to hold a payload.
pub fn decode_frame(frame: &str) -> Option<ServerMessage> {
    let inner = frame
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_SUFFIX)?;

    let mut parts = inner.split('|');
    let room = parts.next()?.to_string();
    let kind = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();

    Some(ServerMessage { room, kind, args })
}

/// Encode one outbound command into the wire envelope.
///
/// The payload is `room|command` (empty room for server-global commands),
/// wrapped as a one-element JSON array. JSON encoding also takes care of
/// escaping quotes and backslashes inside the command text.
pub fn encode_frame(room: &str, command: &str) -> String {
    let payload = format!("{room}|{command}");
    // Serializing a &[&str; 1] cannot fail.
    serde_json::to_string(&[payload.as_str()]).unwrap_or_else(|_| format!("[\"{payload}\"]"))
}

/// Undo the frame-level escaping on an embedded payload.
///
/// Inbound frames arrive JSON-escaped but are split without unescaping, so
/// embedded JSON payloads (user-details reports) still carry `\"` and `\\`
/// sequences that must be removed before parsing.
pub fn unescape_payload(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('/') => out.push('/'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
