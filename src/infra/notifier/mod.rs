//! Event sinks feeding the real-time notification relay.

pub mod broadcast;

pub use broadcast::BroadcastEventSink;
