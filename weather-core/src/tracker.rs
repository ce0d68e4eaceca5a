//! The search/fetch orchestrator.
//!
//! A [`WeatherTracker`] is a cheap handle to one event-loop task that owns the
//! [`SearchState`]. User intents travel to the loop over a channel and are
//! applied one at a time; network calls run on their own tasks and report back
//! over a second channel, tagged with a sequence number so that only the most
//! recently issued lookup or weather fetch is allowed to touch state.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{self, Instant},
};

use crate::{ApiKeySlot, CacheStore, Location, Weather, WeatherError, WeatherProvider};

mod debounce;
pub mod state;

use debounce::Debouncer;
pub use state::{SearchState, search_trigger};

#[derive(Debug)]
enum Intent {
    SetQuery(String),
    SetSearchActive(bool),
    SelectLocation(Location),
    RestoreFromCache,
    SkipRestore,
    SubmitCredential(String),
    ClearCredential,
    RefreshCredentialStatus,
    ForgetLocation,
}

#[derive(Debug)]
struct Envelope {
    intent: Intent,
    applied: oneshot::Sender<()>,
}

#[derive(Debug)]
enum Completion {
    Search {
        seq: u64,
        term: String,
        result: Result<Vec<Location>, WeatherError>,
    },
    Weather {
        seq: u64,
        location: Location,
        result: Result<Weather, WeatherError>,
    },
}

/// Handle to the orchestrator. Clone freely; the loop stops when the last
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct WeatherTracker {
    intents: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<SearchState>,
}

impl WeatherTracker {
    /// Starts the event loop on the current tokio runtime.
    ///
    /// `credential_missing` is computed here; `is_loading` stays set until
    /// [`WeatherTracker::restore_from_cache`] or [`WeatherTracker::skip_restore`]
    /// has run.
    pub fn spawn(
        provider: Arc<dyn WeatherProvider>,
        api_key: ApiKeySlot,
        cache: Arc<dyn CacheStore>,
        debounce: Duration,
    ) -> Self {
        let initial = SearchState {
            is_loading: true,
            credential_missing: !api_key.is_present(),
            ..SearchState::default()
        };

        let (published, state) = watch::channel(initial.clone());
        let (intents, intent_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            state: initial,
            published,
            provider,
            api_key,
            cache,
            debouncer: Debouncer::new(debounce),
            completions,
            search_seq: 0,
            weather_seq: 0,
            pending_search: None,
            pending_weather: None,
            restoring: true,
        };
        tokio::spawn(event_loop.run(intent_rx, completion_rx));

        Self { intents, state }
    }

    /// Updates the displayed query; the letters-only trigger enters the debounce.
    pub async fn set_query(&self, text: impl Into<String>) {
        self.send(Intent::SetQuery(text.into())).await;
    }

    pub async fn set_search_active(&self, active: bool) {
        self.send(Intent::SetSearchActive(active)).await;
    }

    /// Returns once the selection is applied; the weather arrives later.
    pub async fn select_location(&self, location: Location) {
        self.send(Intent::SelectLocation(location)).await;
    }

    pub async fn restore_from_cache(&self) {
        self.send(Intent::RestoreFromCache).await;
    }

    /// Ends startup without reading the cache, for front ends that are about
    /// to select a location anyway.
    pub async fn skip_restore(&self) {
        self.send(Intent::SkipRestore).await;
    }

    pub async fn submit_credential(&self, api_key: impl Into<String>) {
        self.send(Intent::SubmitCredential(api_key.into())).await;
    }

    /// Leaves `credential_missing` untouched; see [`Self::refresh_credential_status`].
    pub async fn clear_credential(&self) {
        self.send(Intent::ClearCredential).await;
    }

    pub async fn refresh_credential_status(&self) {
        self.send(Intent::RefreshCredentialStatus).await;
    }

    /// Drops the cached selection along with the selected location and its weather.
    pub async fn forget_location(&self) {
        self.send(Intent::ForgetLocation).await;
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.clone()
    }

    /// Waits for the first published state satisfying `ready`.
    pub async fn wait_until(&self, mut ready: impl FnMut(&SearchState) -> bool) -> SearchState {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|state| ready(state)).await.map(|state| state.clone()).ok();
        settled.unwrap_or_else(|| self.state())
    }

    async fn send(&self, intent: Intent) {
        let (applied, ack) = oneshot::channel();
        if self.intents.send(Envelope { intent, applied }).is_err() {
            tracing::warn!("tracker event loop is gone; intent dropped");
            return;
        }
        let _ = ack.await;
    }
}

struct EventLoop {
    state: SearchState,
    published: watch::Sender<SearchState>,
    provider: Arc<dyn WeatherProvider>,
    api_key: ApiKeySlot,
    cache: Arc<dyn CacheStore>,
    debouncer: Debouncer,
    completions: mpsc::UnboundedSender<Completion>,
    search_seq: u64,
    weather_seq: u64,
    pending_search: Option<u64>,
    pending_weather: Option<u64>,
    restoring: bool,
}

impl EventLoop {
    async fn run(
        mut self,
        mut intents: mpsc::UnboundedReceiver<Envelope>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                biased;

                Some(done) = completions.recv() => {
                    self.on_completion(done);
                    self.publish();
                }
                envelope = intents.recv() => {
                    let Some(Envelope { intent, applied }) = envelope else { break };
                    self.on_intent(intent);
                    self.publish();
                    let _ = applied.send(());
                }
                () = sleep_until(deadline) => {
                    if let Some(term) = self.debouncer.fire() {
                        self.dispatch_search(term);
                    }
                    self.publish();
                }
            }
        }

        tracing::debug!("tracker event loop stopped");
    }

    fn publish(&mut self) {
        self.state.is_loading =
            self.restoring || self.pending_search.is_some() || self.pending_weather.is_some();

        let next = &self.state;
        self.published.send_if_modified(|current| {
            if *current == *next {
                return false;
            }
            *current = next.clone();
            true
        });
    }

    fn on_intent(&mut self, intent: Intent) {
        match intent {
            Intent::SetQuery(text) => {
                let trigger = search_trigger(&text);
                self.state.query_text = text;
                self.debouncer.push(trigger, Instant::now());
            }
            Intent::SetSearchActive(active) => self.state.is_search_active = active,
            Intent::SelectLocation(location) => self.select_location(location),
            Intent::RestoreFromCache => self.restore_from_cache(),
            Intent::SkipRestore => self.restoring = false,
            Intent::SubmitCredential(api_key) => {
                let saved = self.api_key.save(&api_key);
                if let Err(err) = &saved {
                    tracing::warn!("unable to store API key: {err:#}");
                }
                self.state.credential_missing = saved.is_err();
            }
            Intent::ClearCredential => {
                if let Err(err) = self.api_key.delete() {
                    tracing::warn!("unable to delete API key: {err:#}");
                }
            }
            Intent::RefreshCredentialStatus => {
                self.state.credential_missing = !self.api_key.is_present();
            }
            Intent::ForgetLocation => {
                if let Err(err) = self.cache.clear() {
                    tracing::warn!("unable to clear cached location: {err:#}");
                }
                self.state.selected = None;
                self.state.current_weather = None;
                self.state.weather_for = None;
                self.pending_weather = None;
            }
        }
    }

    fn select_location(&mut self, location: Location) {
        tracing::info!(location = %location, "location selected");

        self.state.selected = Some(location.clone());
        self.state.is_search_active = false;
        self.state.query_text.clear();
        self.state.results.clear();
        self.state.results_query = None;
        self.pending_search = None;
        // The list is gone, so even the term that filled it must look up again.
        self.debouncer.forget_last();
        self.debouncer.push(String::new(), Instant::now());

        // Caching is best-effort; the fetch goes ahead regardless.
        match serde_json::to_vec(&location) {
            Ok(bytes) => {
                if let Err(err) = self.cache.store(&bytes) {
                    tracing::warn!("unable to cache location: {err:#}");
                }
            }
            Err(err) => tracing::error!("unable to serialize location: {err}"),
        }

        self.fetch_weather(location);
    }

    fn restore_from_cache(&mut self) {
        self.restoring = false;

        let bytes = match self.cache.retrieve() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::info!("nothing to restore: {err}");
                return;
            }
        };

        let location: Location = match serde_json::from_slice(&bytes) {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!("unable to decode cached location: {err}");
                return;
            }
        };

        tracing::info!(location = %location, "restored cached location");
        self.state.selected = Some(location.clone());
        self.fetch_weather(location);
    }

    fn dispatch_search(&mut self, term: String) {
        self.search_seq += 1;
        let seq = self.search_seq;
        self.pending_search = Some(seq);

        let provider = Arc::clone(&self.provider);
        let done = self.completions.clone();
        tokio::spawn(async move {
            let result = provider.search(&term).await;
            let _ = done.send(Completion::Search { seq, term, result });
        });
    }

    fn fetch_weather(&mut self, location: Location) {
        self.weather_seq += 1;
        let seq = self.weather_seq;
        self.pending_weather = Some(seq);

        let provider = Arc::clone(&self.provider);
        let done = self.completions.clone();
        tokio::spawn(async move {
            let result = provider.current_weather(&location.name).await;
            let _ = done.send(Completion::Weather { seq, location, result });
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Search { seq, term, result } => {
                if self.pending_search != Some(seq) {
                    tracing::debug!(term = %term, seq, "dropping superseded search results");
                    return;
                }
                self.pending_search = None;

                self.state.results = match result {
                    Ok(locations) => locations,
                    Err(WeatherError::EmptySearchTerm) => Vec::new(),
                    Err(err) => {
                        tracing::warn!(term = %term, "unable to fetch search results: {err}");
                        Vec::new()
                    }
                };
                self.state.results_query = Some(term);
            }
            Completion::Weather { seq, location, result } => {
                if self.pending_weather != Some(seq)
                    || self.state.selected.as_ref() != Some(&location)
                {
                    tracing::debug!(location = %location, seq, "dropping stale weather");
                    return;
                }
                self.pending_weather = None;

                match result {
                    Ok(weather) => {
                        self.state.current_weather = Some(weather);
                        self.state.weather_for = Some(location);
                    }
                    Err(err) => {
                        tracing::warn!(location = %location, "unable to fetch weather: {err}");
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
