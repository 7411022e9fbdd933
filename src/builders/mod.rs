//! Builders to construct the booking engine from configuration.

pub mod engine_builder;

pub use engine_builder::{build_engine, build_from_config, connect_store};
