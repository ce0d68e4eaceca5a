use thiserror::Error;

/// Failures surfaced by the weather API client and the local stores.
///
/// The tracker never lets these escape: it logs them and settles into a
/// quiescent state. Callers of [`crate::WeatherProvider`] get them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("search term is empty")]
    EmptySearchTerm,

    #[error("city name is empty")]
    InvalidCityName,

    #[error(
        "no API key stored.\n\
         Hint: run `weather configure` and enter your WeatherAPI.com key."
    )]
    MissingCredential,

    #[error("bad response from weather API: {0}")]
    BadResponse(String),

    #[error("failed to decode weather API payload: {0}")]
    DecodeFailure(String),

    #[error("no cached location: {0}")]
    CacheUnavailable(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}
