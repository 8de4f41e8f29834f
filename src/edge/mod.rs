//! The edge surface: viewer-request envelope, canonical responses,
//! and the request orchestrator.

mod envelope;
mod orchestrator;
mod response;

pub use envelope::{CdnRequest, HeaderEntry, HeaderMap, ViewerRequestEvent};
pub use orchestrator::{EdgeOutcome, Orchestrator};
pub use response::CdnResponse;
