//! Authentication module for UniGoods
//!
//! Bearer-token verification against the shared HS256 secret.

mod jwt;

pub use jwt::{generate_token, verify_token, Claims, JwtError, JwtKeys};
