//! # Comet Core
//!
//! The channel engine behind the comet long-polling pub/sub relay.
//!
//! Clients subscribe to numbered channels over long-held HTTP GETs that
//! complete with JSONP frames; publishers push short messages over HTTP and
//! the engine fans them out to every parked subscriber. Each channel keeps a
//! small ring of recent messages so a reconnecting client can resume by
//! sequence number instead of missing the window between polls.
//!
//! This crate is transport-agnostic: [`engine::Engine`] consumes parsed
//! request parameters and produces either a finished [`engine::Reply`] or a
//! parked subscription whose frames arrive on a channel. An HTTP layer turns
//! those into real responses.

pub mod channel;
pub mod config;
pub mod engine;
pub mod frame;
pub mod pool;
pub mod seq;
pub mod subscriber;

pub use config::{AuthMode, ConfigError, EngineConfig};
pub use engine::{CONTENT_TYPE_HTML, CONTENT_TYPE_JS, Engine, Parked, Reply, SubOutcome, SubRequest};
pub use subscriber::SubscriberKey;

/// Callback name used when a request does not provide `cb`.
pub const DEFAULT_JSONP_CALLBACK: &str = "jsonp";
