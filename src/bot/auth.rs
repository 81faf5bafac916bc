//! Out-of-band HTTP login exchange.
//!
//! Authentication happens outside the socket: the server's handshake line
//! carries a one-time challenge string, which is submitted together with
//! the account credentials to an HTTP endpoint. The endpoint returns a
//! signed assertion that is presented back over the socket.

use async_trait::async_trait;
use serde::Deserialize;

/// Assertions starting with this prefix are error messages for
/// unregistered (guest) names, not signed tokens.
const GUEST_ASSERTION_PREFIX: &str = ";;";

/// Authentication failure. Fatal to the connection being established.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The login request itself failed.
    #[error("login request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("malformed login reply: {0}")]
    MalformedReply(String),

    /// The server reported the login action as unsuccessful.
    #[error("login rejected for {name}")]
    Rejected { name: String },

    /// The login action succeeded but the session is not marked logged-in.
    #[error("session not logged in after login action for {name}")]
    NotLoggedIn { name: String },

    /// The returned assertion is a guest error message, not a token.
    #[error("guest assertion returned for {name}: {detail}")]
    GuestAssertion { name: String, detail: String },
}

/// Decoded login response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginReply {
    #[serde(default)]
    pub actionsuccess: bool,
    #[serde(default)]
    pub curuser: CurrentUser,
    #[serde(default)]
    pub assertion: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub loggedin: bool,
}

impl LoginReply {
    /// Validate the reply and extract the signed assertion.
    pub fn assertion_for(&self, name: &str) -> Result<&str, AuthError> {
        if !self.actionsuccess {
            return Err(AuthError::Rejected { name: name.into() });
        }
        if !self.curuser.loggedin {
            return Err(AuthError::NotLoggedIn { name: name.into() });
        }
        if self.assertion.starts_with(GUEST_ASSERTION_PREFIX) {
            return Err(AuthError::GuestAssertion {
                name: name.into(),
                detail: self.assertion.clone(),
            });
        }
        Ok(&self.assertion)
    }
}

/// Seam for the login exchange, mockable in tests.
#[async_trait]
pub trait LoginService: Send + Sync {
    async fn login(&self, name: &str, password: &str, challstr: &str)
        -> Result<LoginReply, AuthError>;
}

/// Production login service posting to the configured HTTP endpoint.
pub struct HttpLoginService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLoginService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LoginService for HttpLoginService {
    async fn login(
        &self,
        name: &str,
        password: &str,
        challstr: &str,
    ) -> Result<LoginReply, AuthError> {
        let body = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("act", "login"),
                ("name", name),
                ("pass", password),
                ("challstr", challstr),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_login_body(&body)
    }
}

/// Decode the login response body.
///
/// The first byte of the body is a non-JSON sentinel and must be stripped
/// before decoding the remaining JSON object.
pub fn parse_login_body(body: &str) -> Result<LoginReply, AuthError> {
    let mut chars = body.chars();
    if chars.next().is_none() {
        return Err(AuthError::MalformedReply("empty response body".into()));
    }
    let json = chars.as_str();
    serde_json::from_str(json).map_err(|e| AuthError::MalformedReply(e.to_string()))
}
