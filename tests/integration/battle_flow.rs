//! End-to-end battle choreography over scripted transports.

use ringside::battle::choreography;
use ringside::battle::error::BattleError;
use ringside::battle::spec::{BattleSpec, SideSpec};
use ringside::bot::mock::ScriptBuilder;
use tokio_util::sync::CancellationToken;

use super::common::{
    ready_bot, userdetails_offline, userdetails_online, wait_for_sent, wait_until,
};

const BASE_URL: &str = "https://play.example.org";

fn side(team: &str, users: &[&str]) -> SideSpec {
    SideSpec::new(team, users.iter().map(|u| u.to_string()).collect())
}

fn test_spec() -> BattleSpec {
    BattleSpec::new(
        "scripted exhibition match",
        "gen1ou",
        side("packed-team-a", &["Alice"]),
        side("packed-team-b", &["Bob"]),
    )
}

#[tokio::test]
async fn full_battle_resolves_session_url_and_result_link() {
    let scope = CancellationToken::new();

    let script_a = ScriptBuilder::new()
        .on_command("userdetails Alice", &[&userdetails_online("Alice")])
        .on_command("userdetails Bob", &[&userdetails_online("Bob")]);
    let (a, a_server) = ready_bot("Ring Bot One", script_a, &scope).await;
    let (b, b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let run_scope = scope.clone();
    let (a_task, b_task) = (a.clone(), b.clone());
    let choreo = tokio::spawn(async move {
        let mut spec = test_spec();
        let session =
            choreography::run(&a_task, &b_task, &mut spec, BASE_URL, &run_scope).await;
        (session, spec)
    });

    // A challenges B once both players are confirmed online; the server
    // then relays the private challenge notice to B.
    wait_for_sent(&a_server, "/challenge Ring Bot Two, gen1ou").await;
    b_server.push("|pm| Ring Bot One| Ring Bot Two|/challenge gen1ou");

    // B accepts; the server opens the battle room on A's stream.
    wait_for_sent(&b_server, "/accept Ring Bot One").await;
    a_server.push("battle-x-1|init|battle");

    let (session, spec) = choreo.await.expect("choreography task panicked");
    let session = session.expect("choreography should succeed");

    assert_eq!(session.room, "battle-x-1");
    assert_eq!(session.url, format!("{BASE_URL}/battle-x-1"));
    assert_eq!(spec.sides[0].confirmed(), Some("Alice"));
    assert_eq!(spec.sides[1].confirmed(), Some("Bob"));

    // Teams went to their owning connections before the challenge.
    assert!(a_server.sent_contains("/utm packed-team-a"));
    assert!(b_server.sent_contains("/utm packed-team-b"));

    // Room setup: message, timer, slot handover, B vacates.
    assert!(a_server.sent_contains("battle-x-1|scripted exhibition match"));
    assert!(a_server.sent_contains("battle-x-1|/timer on"));
    assert!(a_server.sent_contains("battle-x-1|/leavebattle"));
    assert!(a_server.sent_contains("/addplayer Alice, p1"));
    assert!(a_server.sent_contains("/addplayer Bob, p2"));
    assert!(b_server.sent_contains("battle-x-1|/leavebattle"));
    assert!(b_server.sent_contains("/noreply /leave battle-x-1"));

    // The background watcher is attached once it subscribes alongside the
    // idle logger.
    wait_until(|| a.bus().observer_count() >= 2)
        .await
        .expect("outcome watcher should attach");

    a_server.push("battle-x-1|win|Alice");
    wait_for_sent(&a_server, "battle-x-1|/savereplay").await;
    a_server.push(
        "battle-x-1|raw|<a href=\"https://replay.example.org/battle-x-1\">replay</a>",
    );

    let link = session.result().await.expect("result link should resolve");
    assert_eq!(link, "https://replay.example.org/battle-x-1");

    // Final vacate from the watcher.
    wait_for_sent(&a_server, "/noreply /leave battle-x-1").await;
}

#[tokio::test]
async fn offline_candidate_fails_before_any_challenge() {
    let scope = CancellationToken::new();

    let script_a = ScriptBuilder::new()
        .on_command("userdetails Alice", &[&userdetails_offline("Alice")])
        .on_command("userdetails Bob", &[&userdetails_online("Bob")]);
    let (a, a_server) = ready_bot("Ring Bot One", script_a, &scope).await;
    let (b, b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let mut spec = test_spec();
    let err = choreography::run(&a, &b, &mut spec, BASE_URL, &scope)
        .await
        .expect_err("offline candidate must fail the choreography");

    match err {
        BattleError::OfflineOrUnregistered(reason) => {
            assert!(reason.contains("Alice"), "diagnostic names the user: {reason}");
        }
        other => panic!("expected OfflineOrUnregistered, got {other:?}"),
    }

    // Defensive ordering: no team or challenge ever went out.
    assert!(!a_server.sent_contains("/utm"));
    assert!(!a_server.sent_contains("/challenge"));
    assert!(!b_server.sent_contains("/utm"));
    assert!(spec.sides[0].confirmed().is_none());

    // Step-scoped failure: both connections stay usable.
    assert!(a.is_ready());
    assert!(b.is_ready());
    assert!(!scope.is_cancelled());
}

#[tokio::test]
async fn first_online_candidate_claims_the_side() {
    let scope = CancellationToken::new();

    // Carol replies first and claims the second side; Bob's later reply is
    // ignored.
    let script_a = ScriptBuilder::new()
        .on_command("userdetails Alice", &[&userdetails_online("Alice")])
        .on_command(
            "userdetails Bob",
            &[&userdetails_online("Carol"), &userdetails_online("Bob")],
        );
    let (a, a_server) = ready_bot("Ring Bot One", script_a, &scope).await;
    let (b, b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let run_scope = scope.clone();
    let (a_task, b_task) = (a.clone(), b.clone());
    let choreo = tokio::spawn(async move {
        let mut spec = BattleSpec::new(
            "tie-break check",
            "gen1ou",
            side("packed-team-a", &["Alice"]),
            side("packed-team-b", &["Bob", "Carol"]),
        );
        let session =
            choreography::run(&a_task, &b_task, &mut spec, BASE_URL, &run_scope).await;
        (session, spec)
    });

    wait_for_sent(&a_server, "/challenge").await;
    b_server.push("|pm| Ring Bot One| Ring Bot Two|/challenge gen1ou");
    wait_for_sent(&b_server, "/accept").await;
    a_server.push("battle-y-9|init|battle");

    let (session, spec) = choreo.await.expect("choreography task panicked");
    session.expect("choreography should succeed");

    assert_eq!(spec.sides[1].confirmed(), Some("Carol"));
    assert!(a_server.sent_contains("/addplayer Carol, p2"));
    assert!(!a_server.sent_contains("/addplayer Bob"));
}

#[tokio::test(start_paused = true)]
async fn missing_lookup_replies_time_out_as_offline() {
    let scope = CancellationToken::new();

    // No user-details rules: lookups go unanswered.
    let (a, a_server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;
    let (b, _b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let mut spec = test_spec();
    let err = choreography::run(&a, &b, &mut spec, BASE_URL, &scope)
        .await
        .expect_err("unanswered lookups must time out");

    assert!(matches!(err, BattleError::OfflineOrUnregistered(_)));
    assert!(a_server.sent_contains("userdetails Alice"));
    assert!(!a_server.sent_contains("/challenge"));
}

#[tokio::test(start_paused = true)]
async fn unaccepted_challenge_times_out() {
    let scope = CancellationToken::new();

    let script_a = ScriptBuilder::new()
        .on_command("userdetails Alice", &[&userdetails_online("Alice")])
        .on_command("userdetails Bob", &[&userdetails_online("Bob")]);
    let (a, a_server) = ready_bot("Ring Bot One", script_a, &scope).await;
    let (b, _b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let mut spec = test_spec();
    let err = choreography::run(&a, &b, &mut spec, BASE_URL, &scope)
        .await
        .expect_err("an ignored challenge must time out");

    assert!(matches!(err, BattleError::ChallengeTimeout(_)));
    // The challenge did go out; the battle never started.
    assert!(a_server.sent_contains("/challenge Ring Bot Two, gen1ou"));
    assert!(!a_server.sent_contains("/timer on"));
}

#[tokio::test]
async fn invalid_spec_fails_fast_without_io() {
    let scope = CancellationToken::new();
    let (a, a_server) = ready_bot("Ring Bot One", ScriptBuilder::new(), &scope).await;
    let (b, _b_server) = ready_bot("Ring Bot Two", ScriptBuilder::new(), &scope).await;

    let mut spec = test_spec();
    spec.sides[0].team.clear();

    let err = choreography::run(&a, &b, &mut spec, BASE_URL, &scope)
        .await
        .expect_err("empty team must be rejected");

    assert!(matches!(err, BattleError::InvalidSpec(_)));
    assert!(!a_server.sent_contains("userdetails"));
}
