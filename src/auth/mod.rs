//! Authentication: bearer token sources for the socket handshake.

mod token;

pub use token::{token_expired, Claims, SharedToken, StaticToken, TokenSource};
