//! Connection handshake scenarios over the scripted transport.

use std::time::Duration;

use ringside::bot::account::BotAccount;
use ringside::bot::auth::AuthError;
use ringside::bot::connection::{BotConnection, ConnectionState};
use ringside::bot::correlate::{await_match, CorrelateError, MatchOutcome};
use ringside::bot::error::BotError;
use ringside::bot::mock::{MockLoginService, ScriptBuilder};
use tokio_util::sync::CancellationToken;

use super::common::{ready_bot, wait_until, TEST_CHALLSTR};

#[tokio::test]
async fn handshake_reaches_ready_and_claims_name() {
    let scope = CancellationToken::new();
    let (transport, server) = ScriptBuilder::new().challstr(TEST_CHALLSTR).build();
    let login = MockLoginService::accepting();

    let conn = BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot One", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect("handshake should succeed");

    assert_eq!(conn.state(), ConnectionState::Ready);

    // The login exchange saw the challenge from the handshake line.
    let calls = login.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "Ring Bot One");
    assert_eq!(calls[0].challstr, TEST_CHALLSTR);

    // The assertion was presented back over the socket.
    assert!(server.sent_contains("/trn Ring Bot One,0,signed-assertion"));
    assert!(!scope.is_cancelled());
}

#[tokio::test]
async fn rejected_login_fails_connect_and_aborts_scope() {
    let scope = CancellationToken::new();
    let (transport, _server) = ScriptBuilder::new().challstr(TEST_CHALLSTR).build();
    let login = MockLoginService::rejecting();

    let err = BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot One", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect_err("rejected login must fail the handshake");

    assert!(matches!(
        err,
        BotError::Auth(AuthError::Rejected { .. })
    ));
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn guest_assertion_fails_connect() {
    let scope = CancellationToken::new();
    let (transport, server) = ScriptBuilder::new().challstr(TEST_CHALLSTR).build();
    let login = MockLoginService::guest();

    let err = BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot One", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect_err("guest assertion must fail the handshake");

    assert!(matches!(
        err,
        BotError::Auth(AuthError::GuestAssertion { .. })
    ));
    // The reserved assertion never goes out on the wire.
    assert!(!server.sent_contains("/trn"));
}

#[tokio::test]
async fn logged_out_session_fails_connect() {
    let scope = CancellationToken::new();
    let (transport, _server) = ScriptBuilder::new().challstr(TEST_CHALLSTR).build();
    let login = MockLoginService::logged_out();

    let err = BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot One", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect_err("logged-out session must fail the handshake");

    assert!(matches!(err, BotError::Auth(AuthError::NotLoggedIn { .. })));
}

#[tokio::test(start_paused = true)]
async fn missing_challenge_times_out_the_handshake() {
    let scope = CancellationToken::new();
    // No challstr scripted: the handshake has nothing to wait on.
    let (transport, _server) = ScriptBuilder::new().build();
    let login = MockLoginService::accepting();

    let err = BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot One", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect_err("handshake must time out without a challenge");

    assert!(matches!(
        err,
        BotError::Handshake(CorrelateError::Timeout(_))
    ));
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn auth_failure_on_one_connection_rejects_sibling_waits() {
    let scope = CancellationToken::new();
    let (healthy, _server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;

    // A long wait pending on the healthy sibling.
    let sibling_wait = await_match(
        healthy.bus(),
        &scope,
        Duration::from_secs(600),
        |m| {
            if m.kind == "never" {
                MatchOutcome::Matched(())
            } else {
                MatchOutcome::Pending
            }
        },
    );

    // The second connection fails authentication; the shared scope aborts.
    let (transport, _) = ScriptBuilder::new().challstr(TEST_CHALLSTR).build();
    let login = MockLoginService::rejecting();
    BotConnection::establish(
        transport,
        BotAccount::new("Ring Bot Two", "pw"),
        &login,
        scope.clone(),
    )
    .await
    .expect_err("second handshake must fail");

    assert!(scope.is_cancelled());
    assert!(matches!(
        sibling_wait.await,
        Err(CorrelateError::Cancelled)
    ));
}

#[tokio::test]
async fn transport_fault_closes_connection_and_aborts_scope() {
    let scope = CancellationToken::new();
    let (conn, server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;

    let pending = await_match(conn.bus(), &scope, Duration::from_secs(600), |m| {
        if m.kind == "never" {
            MatchOutcome::Matched(())
        } else {
            MatchOutcome::Pending
        }
    });

    server.fail_connection();

    assert!(matches!(pending.await, Err(CorrelateError::Cancelled)));
    wait_until(|| conn.state() == ConnectionState::Closed)
        .await
        .expect("connection should close after a transport fault");
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn server_close_tears_down_connection() {
    let scope = CancellationToken::new();
    let (conn, server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;

    server.close_connection();

    wait_until(|| conn.state() == ConnectionState::Closed)
        .await
        .expect("connection should close after server hangup");
    assert!(scope.is_cancelled());
    assert!(matches!(
        conn.send_command("", "/cmd userdetails someone"),
        Ok(_) | Err(BotError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let scope = CancellationToken::new();
    let (conn, _server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;

    conn.shutdown("test teardown");
    assert!(scope.is_cancelled());
    // Second call is a logged no-op.
    conn.shutdown("test teardown again");
}
