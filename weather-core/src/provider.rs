use crate::{Location, Weather, WeatherError};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod weatherapi;

/// What the tracker needs from a weather backend.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Places matching `term`, in upstream order.
    async fn search(&self, term: &str) -> Result<Vec<Location>, WeatherError>;

    /// Normalized current conditions for `city`.
    async fn current_weather(&self, city: &str) -> Result<Weather, WeatherError>;
}
