//! One account's socket lifecycle: connect, authenticate, idle-listen,
//! close.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bot::account::BotAccount;
use crate::bot::auth::LoginService;
use crate::bot::correlate::{await_match, CorrelateError, MatchOutcome, MessageBus};
use crate::bot::error::BotError;
use crate::bot::transport::{Transport, TransportError, WsTransport};
use crate::config::ServerConfig;
use crate::protocol::{commands, decode_frame, encode_frame};

/// How long to wait for the server's handshake challenge line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of one bot connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingChallenge,
    Authenticating,
    Ready,
    Closed,
}

/// Handle to one authenticated connection.
///
/// Cheap to clone: clones share the outbound channel, the inbound bus, the
/// state cell and the cancellation scope of the same underlying socket.
#[derive(Clone, Debug)]
pub struct BotConnection {
    account: BotAccount,
    bus: MessageBus,
    out_tx: mpsc::UnboundedSender<String>,
    state: Arc<RwLock<ConnectionState>>,
    scope: CancellationToken,
}

impl BotConnection {
    /// Open a socket to the server and drive the full authentication
    /// handshake. On success the connection is `Ready`.
    pub async fn connect(
        account: BotAccount,
        server: &ServerConfig,
        login: &dyn LoginService,
        scope: CancellationToken,
    ) -> Result<Self, BotError> {
        let transport = WsTransport::connect(server).await?;
        Self::establish(transport, account, login, scope).await
    }

    /// Drive the handshake over an already-connected transport.
    ///
    /// Any transport error or timeout during the sequence shuts the
    /// connection down and surfaces the triggering error; retrying is the
    /// caller's policy.
    pub async fn establish(
        transport: impl Transport,
        account: BotAccount,
        login: &dyn LoginService,
        scope: CancellationToken,
    ) -> Result<Self, BotError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let bus = MessageBus::new();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        // Attach the challenge observer before the reader task starts, so
        // the first inbound line cannot slip past it.
        let challstr_wait = await_match(&bus, &scope, HANDSHAKE_TIMEOUT, |m| {
            if m.kind == "challstr" {
                MatchOutcome::Matched(m.rest())
            } else {
                MatchOutcome::Pending
            }
        });

        let conn = Self {
            account,
            bus: bus.clone(),
            out_tx,
            state: Arc::clone(&state),
            scope: scope.clone(),
        };

        tokio::spawn(io_loop(
            Box::new(transport),
            out_rx,
            bus,
            state,
            scope,
            conn.account.name.clone(),
        ));

        match conn.handshake(login, challstr_wait).await {
            Ok(()) => {
                conn.set_state(ConnectionState::Ready);
                conn.spawn_idle_logger();
                tracing::info!(bot = %conn.account.name, "connection ready");
                Ok(conn)
            }
            Err(e) => {
                conn.shutdown(&format!("handshake failed: {e}"));
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        login: &dyn LoginService,
        challstr_wait: impl std::future::Future<Output = Result<String, CorrelateError>>,
    ) -> Result<(), BotError> {
        self.set_state(ConnectionState::AwaitingChallenge);
        let challstr = challstr_wait.await.map_err(BotError::Handshake)?;

        self.set_state(ConnectionState::Authenticating);
        let reply = login
            .login(&self.account.name, &self.account.password, &challstr)
            .await?;
        let assertion = reply.assertion_for(&self.account.name)?;

        self.send_command("", &commands::trust_rename(&self.account.name, assertion))?;
        Ok(())
    }

    /// Send one command into the given room (empty room = server-global).
    pub fn send_command(&self, room: &str, command: &str) -> Result<(), BotError> {
        tracing::debug!(bot = %self.account.name, room, command, "send");
        self.out_tx
            .send(encode_frame(room, command))
            .map_err(|_| BotError::ConnectionClosed)
    }

    /// Abort this connection's cancellation scope.
    ///
    /// Both error paths and explicit teardown may call this concurrently;
    /// a second call is a logged no-op.
    pub fn shutdown(&self, reason: &str) {
        if self.scope.is_cancelled() {
            tracing::debug!(bot = %self.account.name, reason, "shutdown already in progress");
            return;
        }
        tracing::info!(bot = %self.account.name, reason, "shutting down connection");
        self.scope.cancel();
    }

    pub fn account(&self) -> &BotAccount {
        &self.account
    }

    pub fn name(&self) -> &str {
        &self.account.name
    }

    /// Inbound message bus for correlation.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Cancellation scope shared with every session using this connection.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.write() = next;
    }

    /// Log otherwise-unclaimed inbound traffic once the connection is
    /// `Ready`. Diagnostic only; never affects control flow.
    fn spawn_idle_logger(&self) {
        let mut rx = self.bus.subscribe();
        let scope = self.scope.clone();
        let name = self.account.name.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = scope.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(m) => {
                            tracing::trace!(bot = %name, room = %m.room, kind = %m.kind, "inbound")
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

enum IoEvent {
    Outbound(Option<String>),
    Inbound(Option<Result<String, TransportError>>),
    Abort,
}

/// Single task owning the transport: writes queued frames, decodes inbound
/// frames onto the bus, and tears everything down on the first fault.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    bus: MessageBus,
    state: Arc<RwLock<ConnectionState>>,
    scope: CancellationToken,
    name: String,
) {
    let reason = loop {
        let event = tokio::select! {
            _ = scope.cancelled() => IoEvent::Abort,
            frame = out_rx.recv() => IoEvent::Outbound(frame),
            frame = transport.recv() => IoEvent::Inbound(frame),
        };

        match event {
            IoEvent::Abort => break "scope aborted",
            IoEvent::Outbound(Some(frame)) => {
                if let Err(e) = transport.send(frame).await {
                    tracing::error!(bot = %name, error = %e, "transport send failed");
                    break "transport send failure";
                }
            }
            IoEvent::Outbound(None) => break "all connection handles dropped",
            IoEvent::Inbound(Some(Ok(frame))) => {
                if let Some(message) = decode_frame(&frame) {
                    bus.publish(message);
                }
            }
            IoEvent::Inbound(Some(Err(e))) => {
                tracing::error!(bot = %name, error = %e, "transport receive failed");
                break "transport receive failure";
            }
            IoEvent::Inbound(None) => break "closed by server",
        }
    };

    transport.close().await;
    *state.write() = ConnectionState::Closed;
    // Transport loss is fatal to every wait sharing this scope.
    scope.cancel();
    tracing::info!(bot = %name, reason, "connection closed");
}
