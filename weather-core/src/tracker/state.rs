use crate::{Location, Weather};

/// Everything the presentation layer renders.
///
/// Only the tracker's event loop writes this; consumers get clones through a
/// watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    /// Exactly what the user typed.
    pub query_text: String,
    pub is_search_active: bool,
    pub results: Vec<Location>,
    /// Normalized term whose lookup produced `results`.
    ///
    /// `None` until the next lookup lands after a selection. A selection also
    /// resets duplicate suppression, so retyping the term that was just
    /// searched triggers a fresh lookup instead of leaving this unset.
    pub results_query: Option<String>,
    pub selected: Option<Location>,
    pub current_weather: Option<Weather>,
    /// The location `current_weather` was fetched for. Differs from `selected`
    /// while a fetch is pending or after one failed.
    pub weather_for: Option<Location>,
    pub is_loading: bool,
    pub credential_missing: bool,
}

/// The term actually fed to the search pipeline: `text` minus every non-letter.
pub fn search_trigger(text: &str) -> String {
    text.chars().filter(|c| c.is_alphabetic()).collect()
}
