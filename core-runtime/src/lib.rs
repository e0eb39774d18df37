//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the photo sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, the bridge wiring performed by
//! [`config::CoreConfig`], and the broadcast channel used to report auth,
//! media and sync activity to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
