//! Outbound command constructors.
//!
//! Every command the engine sends is built here so the exact wire text
//! lives in one place. Commands are plain strings; [`encode_frame`] wraps
//! them in the wire envelope at send time.
//!
//! [`encode_frame`]: super::encode_frame

/// Query whether a user is online and where.
pub fn userdetails(username: &str) -> String {
    format!("/cmd userdetails {username}")
}

/// Claim the authenticated name using the assertion from the login exchange.
pub fn trust_rename(username: &str, assertion: &str) -> String {
    format!("/trn {username},0,{assertion}")
}

/// Submit a packed team for the next challenge.
pub fn use_team(packed_team: &str) -> String {
    format!("/utm {packed_team}")
}

/// Challenge another user under the given challenge format string.
pub fn challenge(username: &str, chalcode: &str) -> String {
    format!("/challenge {username}, {chalcode}")
}

/// Accept a pending challenge from the given user.
pub fn accept(username: &str) -> String {
    format!("/accept {username}")
}

/// Enable the turn timer in the current room.
pub fn timer_on() -> String {
    "/timer on".to_string()
}

/// Give up the player slot in the current battle room.
pub fn leave_battle() -> String {
    "/leavebattle".to_string()
}

/// Leave a room without a server acknowledgment.
pub fn leave(room: &str) -> String {
    format!("/noreply /leave {room}")
}

/// Bind a user to a player slot in the current battle room.
pub fn add_player(username: &str, slot: &str) -> String {
    format!("/addplayer {username}, {slot}")
}

/// Ask the server to persist the finished battle and return a link.
pub fn save_replay() -> String {
    "/savereplay".to_string()
}
