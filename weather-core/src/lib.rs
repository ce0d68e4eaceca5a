//! Core library for the weather tracker.
//!
//! This crate defines:
//! - Credential and last-selection storage
//! - The WeatherAPI.com client and the provider abstraction over it
//! - The debounced search / weather fetch orchestrator
//! - Configuration and shared domain models
//!
//! It is used by `weather-cli`, but any front end can drive a [`WeatherTracker`].

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod provider;
pub mod tracker;
pub mod transport;

pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use config::Config;
pub use credentials::{ApiKeySlot, CredentialStore, KeyringStore, MemoryCredentialStore};
pub use error::WeatherError;
pub use model::{Condition, Location, Weather};
pub use provider::{WeatherProvider, weatherapi::WeatherApiProvider};
pub use tracker::{SearchState, WeatherTracker, search_trigger};
pub use transport::{ReqwestTransport, Transport};
