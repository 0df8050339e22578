//! Sign-in state for calview.
//!
//! Token acquisition happens outside this crate; a Microsoft bearer token is
//! handed in and kept in memory alongside the signed-in user.

pub mod profile;
pub mod session;

pub use profile::{GraphProfile, GraphProfileClient};
pub use session::{AuthSession, GraphToken, User, GRAPH_SCOPES};
