//! Authentication module
//!
//! The platform authenticates every call with an OAuth2 bearer token.
//!
//! - `AuthContext` holds the current token and is shared read-only by the
//!   transport and the report controller for the duration of a sync.
//! - `TokenRefresher` is the hook that obtains a new token; the bundled
//!   `OAuth2RefreshTokenRefresher` performs the refresh-token grant.

mod context;
mod refresher;

pub use context::{AuthContext, CachedToken};
pub use refresher::{OAuth2RefreshTokenRefresher, TokenRefresher, DEFAULT_TOKEN_URL};
