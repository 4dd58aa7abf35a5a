// Core moderation module - the content moderation pipeline.
//
// `models` holds the domain types, `policy` classifies content, `store` and
// `dispatch` are the ports the infra layer implements, `router` normalizes
// raw triggers, and `orchestrator` drives one invocation end to end.

pub mod dispatch;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod router;
pub mod store;

pub use dispatch::*;
pub use models::*;
pub use orchestrator::*;
pub use policy::*;
pub use router::*;
pub use store::*;
