use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{Password, Select};
use weather_core::{
    ApiKeySlot, Config, FileCacheStore, KeyringStore, Location, MemoryCredentialStore,
    SearchState, Weather, WeatherApiProvider, WeatherTracker, search_trigger,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the WeatherAPI.com API key and optionally adjust settings.
    ///
    /// With only settings flags given, the API key is left alone.
    Configure {
        /// API key; prompted for when omitted.
        #[arg(long)]
        key: Option<String>,

        /// Base URL of the WeatherAPI.com REST API.
        #[arg(long)]
        base_url: Option<String>,

        /// Quiet period before a search is sent, in milliseconds.
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Remove the stored API key.
    ForgetKey,

    /// Search for a city, pick one and show its current weather.
    Search {
        /// City name or part of it. Only letters are used for the lookup.
        query: String,
    },

    /// Show current weather for the last selected city.
    Show,

    /// Forget the last selected city.
    Forget,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        // Settings go first so a broken `base_url` can be repaired here.
        if let Command::Configure { key, base_url, debounce_ms } = &self.command {
            if apply_settings(&mut config, base_url.clone(), *debounce_ms)? {
                config.save()?;
                println!("Settings saved to {}", Config::config_file_path()?.display());
            }
            if key.is_none() && (base_url.is_some() || debounce_ms.is_some()) {
                return Ok(());
            }
        }

        let tracker = build_tracker(&config)?;

        match self.command {
            Command::Configure { key, .. } => {
                let key = match key {
                    Some(key) => key,
                    None => prompt_api_key().await?,
                };
                tracker.submit_credential(key).await;
                if tracker.state().credential_missing {
                    bail!("Failed to store the API key (set RUST_LOG=warn for details)");
                }
                println!("API key stored.");
            }
            Command::ForgetKey => {
                tracker.clear_credential().await;
                tracker.refresh_credential_status().await;
                if !tracker.state().credential_missing {
                    bail!("The API key could not be removed from the keyring");
                }
                println!("API key removed.");
            }
            Command::Search { query } => {
                ensure_credential(&tracker).await?;

                let trigger = search_trigger(&query);
                if trigger.is_empty() {
                    bail!("Search query must contain at least one letter");
                }

                // The pick below replaces any cached city, so don't fetch its weather.
                tracker.skip_restore().await;
                tracker.set_search_active(true).await;
                tracker.set_query(query).await;

                let state = tracker
                    .wait_until(|s| s.results_query.as_deref() == Some(trigger.as_str()))
                    .await;

                if state.results.is_empty() {
                    println!("No locations found - please try a different search query.");
                    return Ok(());
                }

                let choice = pick_location(state.results).await?;
                tracker.select_location(choice).await;

                let state = tracker.wait_until(|s| !s.is_loading).await;
                print_selected(&state)?;
            }
            Command::Show => {
                ensure_credential(&tracker).await?;

                tracker.restore_from_cache().await;
                let state = tracker.wait_until(|s| !s.is_loading).await;

                if state.selected.is_none() {
                    println!("No city selected.\nHint: run `weather search <city>` first.");
                    return Ok(());
                }
                print_selected(&state)?;
            }
            Command::Forget => {
                tracker.forget_location().await;
                println!("Forgot the selected city.");
            }
        }

        Ok(())
    }
}

fn build_tracker(config: &Config) -> anyhow::Result<WeatherTracker> {
    let api_key = ApiKeySlot::new(Arc::new(KeyringStore), config.credential_service.clone());
    let cache = FileCacheStore::new(config.cache_file_path()?);
    let provider = WeatherApiProvider::from_config(config, api_key.clone())
        .context("Invalid `base_url` in configuration")?;

    Ok(WeatherTracker::spawn(Arc::new(provider), api_key, Arc::new(cache), config.debounce()))
}

/// Writes the given settings into `config`. Returns whether anything changed.
fn apply_settings(
    config: &mut Config,
    base_url: Option<String>,
    debounce_ms: Option<u64>,
) -> anyhow::Result<bool> {
    let mut changed = false;

    if let Some(base_url) = base_url {
        let mut candidate = config.clone();
        candidate.base_url = base_url;
        let no_key = ApiKeySlot::new(Arc::new(MemoryCredentialStore::default()), "");
        WeatherApiProvider::from_config(&candidate, no_key)
            .with_context(|| format!("Invalid base URL: {}", candidate.base_url))?;
        changed |= config.base_url != candidate.base_url;
        config.base_url = candidate.base_url;
    }

    if let Some(debounce_ms) = debounce_ms {
        changed |= config.debounce_ms != debounce_ms;
        config.debounce_ms = debounce_ms;
    }

    Ok(changed)
}

async fn ensure_credential(tracker: &WeatherTracker) -> anyhow::Result<()> {
    if !tracker.state().credential_missing {
        return Ok(());
    }

    println!("WeatherAPI.com requires a valid API key.");
    let key = prompt_api_key().await?;
    tracker.submit_credential(key).await;

    if tracker.state().credential_missing {
        bail!("Failed to store the API key (set RUST_LOG=warn for details)");
    }
    Ok(())
}

// inquire blocks on stdin, so prompts run off the async workers.
async fn prompt_api_key() -> anyhow::Result<String> {
    tokio::task::spawn_blocking(|| {
        Password::new("Please enter your API key:")
            .without_confirmation()
            .with_help_message("Get one for free at https://www.weatherapi.com")
            .prompt()
    })
    .await?
    .context("No API key entered")
}

async fn pick_location(results: Vec<Location>) -> anyhow::Result<Location> {
    tokio::task::spawn_blocking(move || Select::new("Select a location:", results).prompt())
        .await?
        .context("No location selected")
}

fn print_selected(state: &SearchState) -> anyhow::Result<()> {
    let Some(location) = &state.selected else {
        bail!("No location selected");
    };

    match (&state.current_weather, &state.weather_for) {
        (Some(weather), Some(fetched_for)) if fetched_for == location => {
            println!("{}", render(location, weather));
            Ok(())
        }
        _ => bail!("Could not fetch weather for {location} (set RUST_LOG=warn for details)"),
    }
}

/// Integer-Celsius summary of one location's weather.
fn render(location: &Location, weather: &Weather) -> String {
    let mut out = format!(
        "{location}\n  {}°  (feels like {}°)\n  Humidity {}%   UV {}\n  Icon {}",
        whole(weather.temperature_c),
        whole(weather.feels_like_c),
        weather.humidity,
        whole(weather.uv),
        weather.condition.icon_url,
    );

    if let Some(observed_at) = weather.observed_at {
        let local = observed_at.with_timezone(&Local);
        out.push_str(&format!("\n  Updated {}", local.format("%Y-%m-%d %H:%M")));
    }

    out
}

fn whole(value: f64) -> i64 {
    value as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_core::Condition;

    fn tokyo() -> Location {
        Location::new(Some(1), "Tokyo", "Kantō", "Japan")
    }

    fn weather() -> Weather {
        Weather {
            temperature_c: 26.0,
            humidity: 75,
            uv: 4.0,
            feels_like_c: -3.0,
            condition: Condition { icon_url: "https://abc.com/123.png".into() },
            observed_at: None,
        }
    }

    #[test]
    fn render_uses_whole_degrees() {
        let out = render(&tokyo(), &weather());

        assert!(out.starts_with("Tokyo (Kantō, Japan)"));
        assert!(out.contains("26°  (feels like -3°)"));
        assert!(out.contains("Humidity 75%   UV 4"));
        assert!(out.contains("Icon https://abc.com/123.png"));
        assert!(!out.contains("Updated"));
    }

    #[test]
    fn stale_weather_is_not_printed_for_new_selection() {
        let state = SearchState {
            selected: Some(Location::new(None, "Atlantis", "", "")),
            current_weather: Some(weather()),
            weather_for: Some(tokyo()),
            ..SearchState::default()
        };

        let err = print_selected(&state).unwrap_err();
        assert!(err.to_string().contains("Could not fetch weather for Atlantis"));
    }

    #[test]
    fn cli_parses_search() {
        let cli = Cli::try_parse_from(["weather", "search", "New York"]).unwrap();
        assert!(matches!(cli.command, Command::Search { query } if query == "New York"));
    }

    #[test]
    fn cli_parses_configure_with_key() {
        let cli = Cli::try_parse_from(["weather", "configure", "--key", "ABC123"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Configure { key: Some(k), base_url: None, debounce_ms: None } if k == "ABC123"
        ));
    }

    #[test]
    fn cli_parses_configure_settings() {
        let cli = Cli::try_parse_from([
            "weather",
            "configure",
            "--base-url",
            "http://localhost:8080/v1/",
            "--debounce-ms",
            "150",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Configure { key: None, base_url: Some(url), debounce_ms: Some(150) }
                if url == "http://localhost:8080/v1/"
        ));
    }

    #[test]
    fn configured_settings_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();

        let changed =
            apply_settings(&mut config, Some("http://localhost:8080/v1/".into()), Some(150))
                .unwrap();
        assert!(changed);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.base_url, "http://localhost:8080/v1/");
        assert_eq!(loaded.debounce_ms, 150);
        assert_eq!(loaded.credential_service, config.credential_service);
    }

    #[test]
    fn unchanged_settings_are_not_reported() {
        let mut config = Config::default();
        let same = config.debounce_ms;
        assert!(!apply_settings(&mut config, None, Some(same)).unwrap());
        assert!(!apply_settings(&mut config, None, None).unwrap());
    }

    #[test]
    fn unparsable_base_url_is_rejected() {
        let mut config = Config::default();
        let before = config.base_url.clone();

        let err = apply_settings(&mut config, Some("not a url".into()), None).unwrap_err();
        assert!(err.to_string().contains("Invalid base URL"));
        assert_eq!(config.base_url, before);
    }
}
