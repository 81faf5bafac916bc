//! Battle choreography: drives two ready connections through the ordered
//! steps of one battle.
//!
//! The sequence is linear, each step bounded by its own timeout and
//! cancellation scope: confirm players → submit teams → challenge →
//! acceptance → room init → room setup → return. The long outcome wait and
//! result retrieval run in a background task behind an independently
//! awaitable future, so the caller can announce the session URL as soon as
//! the room exists.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::battle::error::BattleError;
use crate::battle::spec::BattleSpec;
use crate::bot::account::to_user_id;
use crate::bot::connection::BotConnection;
use crate::bot::correlate::{await_match, CorrelateError, MatchOutcome};
use crate::bot::error::BotError;
use crate::protocol::{commands, unescape_payload, ServerMessage};

const PLAYER_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_INIT_TIMEOUT: Duration = Duration::from_secs(30);
const OUTCOME_TIMEOUT: Duration = Duration::from_secs(3600);
const RESULT_LINK_TIMEOUT: Duration = Duration::from_secs(60);

/// A started battle.
///
/// `url` is available immediately; the persisted-result link resolves much
/// later through [`BattleSession::result`]. Dropping the session detaches
/// the background wait without cancelling it.
#[derive(Debug)]
pub struct BattleSession {
    /// Server-side room identifier for this battle.
    pub room: String,
    /// Externally visible session URL.
    pub url: String,
    result: oneshot::Receiver<Result<String, BattleError>>,
}

impl BattleSession {
    /// Await the persisted-result link for the finished battle.
    pub async fn result(self) -> Result<String, BattleError> {
        match self.result.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BattleError::Cancelled(
                "result task ended without reporting".into(),
            )),
        }
    }
}

/// Run one battle between `a` and `b`.
///
/// On success the spec's sides carry their confirmed usernames and the
/// returned [`BattleSession`] holds the session URL plus the result
/// future. Step failures reject only this run; both connections stay
/// `Ready` unless the failure was connection-fatal.
pub async fn run(
    a: &BotConnection,
    b: &BotConnection,
    spec: &mut BattleSpec,
    client_base_url: &str,
    scope: &CancellationToken,
) -> Result<BattleSession, BattleError> {
    let span = tracing::info_span!("battle", run = %Uuid::new_v4());
    let bg_span = span.clone();
    async move {
        // Validate: fail fast, no I/O.
        spec.validate()?;
        if a.account().user_id() == b.account().user_id() {
            return Err(BattleError::InvalidSpec(
                "the two bot accounts must be distinct".into(),
            ));
        }

        // AwaitPlayers: look up every candidate, bind the first online one
        // per side.
        let (first, second) = confirm_players(a, spec, scope).await?;
        spec.sides[0].confirm(&first);
        spec.sides[1].confirm(&second);
        tracing::info!(first, second, "both sides confirmed");

        // SubmitTeams + challenge. The acceptance wait is attached before
        // the challenge goes out so the notice cannot be missed.
        let step = scope.child_token();
        let accepted = {
            let from = a.account().user_id();
            let to = b.account().user_id();
            await_match(b.bus(), &step, CHALLENGE_TIMEOUT, move |m| {
                if is_challenge_notice(m, &from, &to) {
                    MatchOutcome::Matched(())
                } else {
                    MatchOutcome::Pending
                }
            })
        };
        a.send_command("", &commands::use_team(&spec.sides[0].team))?;
        b.send_command("", &commands::use_team(&spec.sides[1].team))?;
        a.send_command("", &commands::challenge(b.name(), &spec.chalcode))?;
        accepted
            .await
            .map_err(|e| step_error(e, BattleError::ChallengeTimeout(CHALLENGE_TIMEOUT)))?;

        // Accept, then wait for the room to initialize on A.
        let step = scope.child_token();
        let init = await_match(a.bus(), &step, SESSION_INIT_TIMEOUT, |m| {
            if m.kind == "init" && !m.room.is_empty() {
                MatchOutcome::Matched(m.room.clone())
            } else {
                MatchOutcome::Pending
            }
        });
        b.send_command("", &commands::accept(a.name()))?;
        let room = init
            .await
            .map_err(|e| step_error(e, BattleError::SessionInitTimeout(SESSION_INIT_TIMEOUT)))?;
        tracing::info!(room, "battle room initialized");

        // RoomSetup: post the message, start the timer, hand both player
        // slots to the confirmed users. B vacates now; A stays to watch
        // the outcome and leaves at the end.
        a.send_command(&room, &spec.message)?;
        a.send_command(&room, &commands::timer_on())?;
        a.send_command(&room, &commands::leave_battle())?;
        a.send_command(&room, &commands::add_player(&first, "p1"))?;
        b.send_command(&room, &commands::leave_battle())?;
        a.send_command(&room, &commands::add_player(&second, "p2"))?;
        b.send_command("", &commands::leave(&room))?;

        // Return immediately; the outcome wait continues in the background.
        let url = format!("{}/{}", client_base_url.trim_end_matches('/'), room);
        let (tx, rx) = oneshot::channel();
        let watcher = a.clone();
        let watched_room = room.clone();
        let outcome_scope = scope.child_token();
        tokio::spawn(
            async move {
                let outcome = await_result(&watcher, &watched_room, &outcome_scope).await;
                if let Err(e) = &outcome {
                    tracing::warn!(error = %e, "battle result wait failed");
                }
                let _ = tx.send(outcome);
            }
            .instrument(bg_span),
        );

        tracing::info!(url, "battle session started");
        Ok(BattleSession { room, url, result: rx })
    }
    .instrument(span)
    .await
}

/// Account report returned by a user-details lookup.
#[derive(Debug, Deserialize)]
struct UserDetails {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rooms: Option<serde_json::Value>,
}

impl UserDetails {
    /// Online users carry active-room data; offline or unregistered
    /// accounts report none.
    fn is_online(&self) -> bool {
        matches!(&self.rooms, Some(serde_json::Value::Object(rooms)) if !rooms.is_empty())
    }
}

/// Send a lookup for every candidate on both sides and wait until each
/// side has one confirmed-online username.
///
/// The first candidate observed online claims its side; later replies for
/// a confirmed side are ignored. A candidate reported without active-room
/// data fails the step with a per-user diagnostic.
async fn confirm_players(
    a: &BotConnection,
    spec: &BattleSpec,
    scope: &CancellationToken,
) -> Result<(String, String), BattleError> {
    let step = scope.child_token();

    let candidates: [Vec<String>; 2] = [
        spec.sides[0].usernames.clone(),
        spec.sides[1].usernames.clone(),
    ];
    let mut bound: [Option<String>; 2] = [None, None];

    let wait = await_match(a.bus(), &step, PLAYER_CONFIRM_TIMEOUT, move |m| {
        let Some(details) = parse_user_details(m) else {
            return MatchOutcome::Pending;
        };
        let id = to_user_id(&details.name);

        for (side, names) in candidates.iter().enumerate() {
            if bound[side].is_some() {
                continue;
            }
            let Some(display) = names.iter().find(|n| to_user_id(n) == id) else {
                continue;
            };
            if !details.is_online() {
                return MatchOutcome::Reject(format!(
                    "{} is offline or unregistered",
                    details.name
                ));
            }
            bound[side] = Some(display.clone());
            break;
        }

        match (&bound[0], &bound[1]) {
            (Some(first), Some(second)) => MatchOutcome::Matched((first.clone(), second.clone())),
            _ => MatchOutcome::Pending,
        }
    });

    for side in &spec.sides {
        for username in &side.usernames {
            a.send_command("", &commands::userdetails(username))?;
        }
    }

    wait.await.map_err(|e| match e {
        CorrelateError::Timeout(t) => BattleError::OfflineOrUnregistered(format!(
            "no lookup reply for every side within {t:?}"
        )),
        CorrelateError::Rejected(reason) => BattleError::OfflineOrUnregistered(reason),
        CorrelateError::Cancelled => BattleError::Cancelled("player confirmation aborted".into()),
        CorrelateError::ConnectionClosed => BattleError::Connection(BotError::ConnectionClosed),
    })
}

fn parse_user_details(m: &ServerMessage) -> Option<UserDetails> {
    if m.kind != "queryresponse" || m.args.first().map(String::as_str) != Some("userdetails") {
        return None;
    }
    let raw = unescape_payload(&m.rest_from(1));
    match serde_json::from_str(&raw) {
        Ok(details) => Some(details),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable user-details payload");
            None
        }
    }
}

/// A private challenge notice from `from` to `to`.
fn is_challenge_notice(m: &ServerMessage, from: &str, to: &str) -> bool {
    m.kind == "pm"
        && m.args.len() >= 3
        && to_user_id(&m.args[0]) == from
        && to_user_id(&m.args[1]) == to
        && m.args[2].trim_start().starts_with("/challenge")
}

/// Background tail of the choreography: outcome wait, result persist,
/// link extraction, final vacate.
async fn await_result(
    a: &BotConnection,
    room: &str,
    scope: &CancellationToken,
) -> Result<String, BattleError> {
    let step = scope.child_token();
    await_match(a.bus(), &step, OUTCOME_TIMEOUT, |m| {
        if m.room == room && (m.kind == "win" || m.kind == "tie") {
            MatchOutcome::Matched(())
        } else {
            MatchOutcome::Pending
        }
    })
    .await
    .map_err(|e| step_error(e, BattleError::OutcomeTimeout(OUTCOME_TIMEOUT)))?;
    tracing::info!(room, "battle reached a terminal outcome");

    let step = scope.child_token();
    let link = await_match(a.bus(), &step, RESULT_LINK_TIMEOUT, |m| {
        if m.room != room && !m.room.is_empty() {
            return MatchOutcome::Pending;
        }
        // The notice arrives frame-escaped, quotes included.
        match extract_link(&unescape_payload(&m.rest())) {
            Some(link) => MatchOutcome::Matched(link),
            None => MatchOutcome::Pending,
        }
    });
    a.send_command(room, &commands::save_replay())?;
    let link = link
        .await
        .map_err(|e| step_error(e, BattleError::ResultLinkTimeout(RESULT_LINK_TIMEOUT)))?;

    a.send_command("", &commands::leave(room))?;
    tracing::info!(room, link, "battle result persisted");
    Ok(link)
}

/// Pull the `href` attribute out of a persisted-result notice.
fn extract_link(text: &str) -> Option<String> {
    static HREF: OnceLock<Option<Regex>> = OnceLock::new();
    let re = HREF
        .get_or_init(|| Regex::new(r#"href="([^"]+)""#).ok())
        .as_ref()?;
    re.captures(text).map(|c| c[1].to_string())
}

/// Map a correlation failure to the step's own timeout error.
fn step_error(e: CorrelateError, on_timeout: BattleError) -> BattleError {
    match e {
        CorrelateError::Timeout(_) => on_timeout,
        CorrelateError::Rejected(reason) => BattleError::Cancelled(reason),
        CorrelateError::Cancelled => BattleError::Cancelled("step scope aborted".into()),
        CorrelateError::ConnectionClosed => BattleError::Connection(BotError::ConnectionClosed),
    }
}
