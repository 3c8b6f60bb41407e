//! Refresh endpoint wire contract
//!
//! `POST /auth/refresh` with `{"refresh_token": "..."}`; a successful reply
//! carries `access_token` and optionally a rotated `refresh_token`. The
//! HTTP call itself goes through the client's transport so it shares the
//! transport's timeout; this module only builds the body and validates the
//! reply.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Body of the refresh call.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Raw refresh reply. Both fields are optional on the wire so a reply that
/// omits `access_token` can be reported precisely instead of as a parse error.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Validated result of a refresh.
#[derive(Debug)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// `None` when the server did not rotate the refresh token
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// A 2xx reply without a usable `access_token` is a failed refresh.
    pub fn into_tokens(self) -> Result<RefreshedTokens> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::TokenExchange("refresh response has no access_token".into()))?;
        Ok(RefreshedTokens {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

/// Validate a refresh reply given its HTTP status and decoded JSON body.
pub fn parse_refresh_response(status: u16, body: &serde_json::Value) -> Result<RefreshedTokens> {
    if status == 401 || status == 403 {
        return Err(Error::InvalidCredentials(format!(
            "refresh token rejected ({status}): {body}"
        )));
    }
    if !(200..300).contains(&status) {
        return Err(Error::TokenExchange(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let response: TokenResponse = serde_json::from_value(body.clone())
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;
    response.into_tokens()
}
