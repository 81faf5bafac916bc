//! Process-level connection pool.
//!
//! One pool is constructed at startup, owns the root cancellation scope
//! and every bot connection, and is passed to each battle invocation. A
//! transport fault on any owned connection aborts the root scope, which
//! settles every pending wait across all connections and closes every
//! socket.

use tokio_util::sync::CancellationToken;

use crate::battle::choreography;
use crate::battle::error::BattleError;
use crate::battle::spec::BattleSpec;
use crate::battle::BattleSession;
use crate::bot::account::{to_user_id, BotAccount};
use crate::bot::auth::HttpLoginService;
use crate::bot::connection::BotConnection;
use crate::bot::error::BotError;
use crate::config::ServerConfig;

pub struct ConnectionPool {
    scope: CancellationToken,
    connections: Vec<BotConnection>,
    server: ServerConfig,
    /// Battle permit: concurrent battle requests against the same pool
    /// serialize FIFO for the foreground phase of the choreography.
    battle_permit: tokio::sync::Mutex<()>,
}

impl ConnectionPool {
    /// Connect and authenticate every account concurrently.
    ///
    /// A failure on any account cancels the shared scope, tearing down the
    /// sibling connections as well.
    pub async fn connect(
        accounts: Vec<BotAccount>,
        server: ServerConfig,
    ) -> Result<Self, BotError> {
        let scope = CancellationToken::new();
        let login = HttpLoginService::new(&server.login_url);

        let pending = accounts
            .into_iter()
            .map(|account| BotConnection::connect(account, &server, &login, scope.clone()));

        let connections = match futures::future::try_join_all(pending).await {
            Ok(connections) => connections,
            Err(e) => {
                scope.cancel();
                return Err(e);
            }
        };

        tracing::info!(bots = connections.len(), "connection pool ready");
        Ok(Self {
            scope,
            connections,
            server,
            battle_permit: tokio::sync::Mutex::new(()),
        })
    }

    /// Run one battle on the pool's first two connections.
    pub async fn run_battle(&self, spec: &mut BattleSpec) -> Result<BattleSession, BattleError> {
        let _permit = self.battle_permit.lock().await;
        let (a, b) = self.pair()?;
        choreography::run(a, b, spec, &self.server.client_base_url, &self.scope).await
    }

    /// The two connections used for battle choreography.
    pub fn pair(&self) -> Result<(&BotConnection, &BotConnection), BattleError> {
        match self.connections.as_slice() {
            [a, b, ..] if a.is_ready() && b.is_ready() => Ok((a, b)),
            [_, _, ..] => Err(BattleError::PoolNotReady(
                "a pooled connection is no longer ready".into(),
            )),
            _ => Err(BattleError::PoolNotReady(
                "pool needs at least two connections".into(),
            )),
        }
    }

    /// Look up a connection by account name.
    pub fn get(&self, name: &str) -> Option<&BotConnection> {
        let id = to_user_id(name);
        self.connections.iter().find(|c| c.account().user_id() == id)
    }

    pub fn connections(&self) -> &[BotConnection] {
        &self.connections
    }

    /// Root cancellation scope shared by every pooled connection.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Tear down every connection. Safe to call more than once.
    pub fn shutdown(&self, reason: &str) {
        if self.scope.is_cancelled() {
            tracing::debug!(reason, "pool shutdown already in progress");
            return;
        }
        tracing::info!(reason, "shutting down connection pool");
        self.scope.cancel();
    }
}
