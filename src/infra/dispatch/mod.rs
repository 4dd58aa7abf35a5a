// Alert dispatcher implementations.

pub mod webhook_dispatcher;

pub use webhook_dispatcher::WebhookDispatcher;
