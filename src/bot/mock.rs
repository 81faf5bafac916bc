//! Mock transport and login service for deterministic testing.
//!
//! [`MockTransport`] implements the [`Transport`] trait without a network:
//! it captures every outbound frame and feeds back scripted inbound frames,
//! either reactively (a reply rule fires when a matching command is sent)
//! or pushed by hand through the [`MockServerHandle`]. Use this for
//! integration tests that need to drive the full handshake and battle
//! choreography.
//!
//! # Example
//! ```no_run
//! use ringside::bot::mock::ScriptBuilder;
//!
//! let (transport, server) = ScriptBuilder::new()
//!     .challstr("4|abc")
//!     .on_command("userdetails bob", &["|queryresponse|userdetails|{}"])
//!     .build();
//! // pass `transport` to BotConnection::establish, drive `server` from the test
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::bot::auth::{AuthError, CurrentUser, LoginReply, LoginService};
use crate::bot::transport::{Transport, TransportError};

/// Build one inbound wire frame around a message payload.
pub fn frame(payload: &str) -> String {
    let encoded = serde_json::to_string(&[payload])
        .unwrap_or_else(|_| format!("[\"{payload}\"]"));
    format!("a{encoded}")
}

struct ReplyRule {
    /// Substring of the outbound frame that triggers this rule.
    trigger: String,
    replies: Vec<String>,
    consumed: bool,
}

struct Shared {
    in_tx: Mutex<Option<mpsc::UnboundedSender<Result<String, TransportError>>>>,
    sent: Mutex<Vec<String>>,
    rules: Mutex<Vec<ReplyRule>>,
    transport_closed: Mutex<bool>,
}

impl Shared {
    fn deliver(&self, item: Result<String, TransportError>) {
        if let Some(tx) = self.in_tx.lock().as_ref() {
            let _ = tx.send(item);
        }
    }
}

/// Scripted in-memory transport.
pub struct MockTransport {
    in_rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    shared: Arc<Shared>,
}

/// Test-side handle to a [`MockTransport`]: inject frames, fail or close
/// the connection, and inspect captured outbound traffic.
#[derive(Clone)]
pub struct MockServerHandle {
    shared: Arc<Shared>,
}

impl MockServerHandle {
    /// Inject one inbound message payload.
    pub fn push(&self, payload: &str) {
        self.shared.deliver(Ok(frame(payload)));
    }

    /// Inject one raw inbound frame (no envelope added).
    pub fn push_raw(&self, raw: &str) {
        self.shared.deliver(Ok(raw.to_string()));
    }

    /// Surface a transport error on the next receive.
    pub fn fail_connection(&self) {
        self.shared.deliver(Err(TransportError::Closed));
    }

    /// End the inbound stream, as if the server closed the socket.
    pub fn close_connection(&self) {
        self.shared.in_tx.lock().take();
    }

    /// Every outbound frame captured so far.
    pub fn sent_frames(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// Captured outbound frames, unwrapped to their `room|command` payloads.
    pub fn sent_payloads(&self) -> Vec<String> {
        self.shared
            .sent
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str::<Vec<String>>(f).ok())
            .flatten()
            .collect()
    }

    /// Whether any captured payload contains the given fragment.
    pub fn sent_contains(&self, fragment: &str) -> bool {
        self.sent_payloads().iter().any(|p| p.contains(fragment))
    }

    /// Whether the connection side called `close()` on the transport.
    pub fn transport_closed(&self) -> bool {
        *self.shared.transport_closed.lock()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.shared.sent.lock().push(frame.clone());

        let mut replies = Vec::new();
        for rule in self.shared.rules.lock().iter_mut() {
            if !rule.consumed && frame.contains(&rule.trigger) {
                rule.consumed = true;
                replies.extend(rule.replies.iter().cloned());
            }
        }
        for reply in replies {
            self.shared.deliver(Ok(reply));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.in_rx.recv().await
    }

    async fn close(&mut self) {
        *self.shared.transport_closed.lock() = true;
    }
}

/// Fluent builder for a scripted mock server.
#[derive(Default)]
pub struct ScriptBuilder {
    on_connect: Vec<String>,
    rules: Vec<ReplyRule>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver this payload as soon as the connection opens.
    pub fn on_connect(mut self, payload: &str) -> Self {
        self.on_connect.push(frame(payload));
        self
    }

    /// Deliver a handshake challenge line on connect.
    pub fn challstr(self, value: &str) -> Self {
        self.on_connect(&format!("|challstr|{value}"))
    }

    /// Reply with the given payloads when an outbound frame containing
    /// `trigger` is sent. Each rule fires once.
    pub fn on_command(mut self, trigger: &str, payloads: &[&str]) -> Self {
        self.rules.push(ReplyRule {
            trigger: trigger.to_string(),
            replies: payloads.iter().map(|p| frame(p)).collect(),
            consumed: false,
        });
        self
    }

    pub fn build(self) -> (MockTransport, MockServerHandle) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        for f in &self.on_connect {
            let _ = in_tx.send(Ok(f.clone()));
        }

        let shared = Arc::new(Shared {
            in_tx: Mutex::new(Some(in_tx)),
            sent: Mutex::new(Vec::new()),
            rules: Mutex::new(self.rules),
            transport_closed: Mutex::new(false),
        });

        (
            MockTransport {
                in_rx,
                shared: Arc::clone(&shared),
            },
            MockServerHandle { shared },
        )
    }
}

/// Record of one call to a [`MockLoginService`].
#[derive(Debug, Clone)]
pub struct LoginCall {
    pub name: String,
    pub challstr: String,
}

/// Canned login service for tests.
pub struct MockLoginService {
    reply: LoginReply,
    calls: Mutex<Vec<LoginCall>>,
}

impl MockLoginService {
    /// A login exchange that succeeds with a signed assertion.
    pub fn accepting() -> Self {
        Self::with_reply(LoginReply {
            actionsuccess: true,
            curuser: CurrentUser { loggedin: true },
            assertion: "signed-assertion".into(),
        })
    }

    /// A login exchange the server reports as unsuccessful.
    pub fn rejecting() -> Self {
        Self::with_reply(LoginReply {
            actionsuccess: false,
            ..Default::default()
        })
    }

    /// A successful action whose session is not marked logged-in.
    pub fn logged_out() -> Self {
        Self::with_reply(LoginReply {
            actionsuccess: true,
            curuser: CurrentUser { loggedin: false },
            assertion: "signed-assertion".into(),
        })
    }

    /// An assertion carrying the reserved guest sentinel prefix.
    pub fn guest() -> Self {
        Self::with_reply(LoginReply {
            actionsuccess: true,
            curuser: CurrentUser { loggedin: true },
            assertion: ";;Your name must be registered.".into(),
        })
    }

    pub fn with_reply(reply: LoginReply) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Captured login calls for assertions.
    pub fn calls(&self) -> Vec<LoginCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LoginService for MockLoginService {
    async fn login(
        &self,
        name: &str,
        _password: &str,
        challstr: &str,
    ) -> Result<LoginReply, AuthError> {
        self.calls.lock().push(LoginCall {
            name: name.to_string(),
            challstr: challstr.to_string(),
        });
        Ok(self.reply.clone())
    }
}
