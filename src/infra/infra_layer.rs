// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "store/mod.rs"]
pub mod store;

#[path = "dispatch/mod.rs"]
pub mod dispatch;
