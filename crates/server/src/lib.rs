//! HTTP surface for rulegate: admin API, API-key gate, per-request policy
//! middleware and the upstream forwarder.

pub mod admin;
pub mod auth;
pub mod gate;
pub mod inspect;
pub mod router;
pub mod startup;
pub mod state;
pub mod upstream;

pub use inspect::{Inspector, PassThrough, RequestMeta, Verdict};
pub use router::build_router;
pub use state::AppState;
