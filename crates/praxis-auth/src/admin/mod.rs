//! Administrative surface for grants and delegations.
//!
//! [`GrantService`] is the only writer of the grant and delegation stores.
//! It enforces the grantor ceiling (no one grants authority above their own
//! rank) and keeps both logs append-only.

mod service;

pub use service::GrantService;
