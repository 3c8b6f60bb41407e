//! Session credentials for the API client
//!
//! Owns the two pieces of persistent authentication state the client needs:
//! the access/refresh token pair and the time of the last successful refresh.
//! Also defines the wire contract of the refresh endpoint so the client can
//! validate a refresh response without knowing the JSON shape.
//!
//! Credential flow:
//! 1. Login hands tokens to `CredentialStore::set_tokens()`
//! 2. The dispatcher reads `CredentialStore::access_token()` for every request
//! 3. On a critical 401 the coordinator posts `RefreshRequest` to `REFRESH_PATH`
//! 4. `token::parse_refresh_response()` validates the reply
//! 5. New tokens go back through `set_tokens()`; a failed refresh calls `clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, StoreFuture,
};
pub use error::{Error, Result};
pub use token::{RefreshRequest, RefreshedTokens, TokenResponse, parse_refresh_response};
