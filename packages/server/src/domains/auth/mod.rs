//! Auth domain - verification of identity provider tokens.
//!
//! Users sign in elsewhere; this service only checks the bearer JWT and
//! reads the owner id from its subject.

pub mod jwt;

pub use jwt::{Claims, JwtService};
