use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use crate::{
    ApiKeySlot, Config, Location, Weather, WeatherError,
    model::Condition,
    transport::{ReqwestTransport, Transport, fetch_json},
};

use super::WeatherProvider;

/// WeatherAPI.com client.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    base_url: Url,
    api_key: ApiKeySlot,
    transport: Arc<dyn Transport>,
}

impl WeatherApiProvider {
    pub fn new(
        base_url: &str,
        api_key: ApiKeySlot,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, WeatherError> {
        // `Url::join` drops the last segment unless it ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|err| WeatherError::InvalidUrl(format!("{base_url}: {err}")))?;

        Ok(Self { base_url, api_key, transport })
    }

    pub fn from_config(config: &Config, api_key: ApiKeySlot) -> Result<Self, WeatherError> {
        Self::new(&config.base_url, api_key, Arc::new(ReqwestTransport::new()))
    }

    fn search_url(&self, term: &str) -> Result<Url, WeatherError> {
        self.endpoint("search.json", &[("q", term)])
    }

    fn current_url(&self, city: &str) -> Result<Url, WeatherError> {
        self.endpoint("current.json", &[("q", city), ("aqi", "no")])
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, WeatherError> {
        let api_key = self.api_key.get().ok_or(WeatherError::MissingCredential)?;

        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| WeatherError::InvalidUrl(format!("{path}: {err}")))?;

        url.query_pairs_mut()
            .append_pair("key", &api_key)
            .extend_pairs(params.iter().copied());

        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: u8,
    uv: f64,
    feelslike_c: f64,
    condition: WaCondition,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    #[allow(dead_code)]
    location: Location,
    current: WaCurrent,
}

/// Rounds the numeric readings and turns the protocol-relative icon into a full URL.
///
/// `f64::round` rounds half away from zero, so 2.5 becomes 3.0 and -2.5 becomes -3.0.
/// Humidity is a percentage; anything above 100 is treated as a malformed payload.
fn normalize(raw: WaCurrent) -> Result<Weather, WeatherError> {
    if raw.humidity > 100 {
        return Err(WeatherError::DecodeFailure(format!(
            "humidity {}% is out of range",
            raw.humidity
        )));
    }

    Ok(Weather {
        temperature_c: raw.temp_c.round(),
        humidity: raw.humidity,
        uv: raw.uv.round(),
        feels_like_c: raw.feelslike_c.round(),
        condition: Condition { icon_url: absolute_icon_url(&raw.condition.icon) },
        observed_at: raw.last_updated_epoch.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    })
}

fn absolute_icon_url(icon: &str) -> String {
    if icon.starts_with("//") { format!("https:{icon}") } else { icon.to_string() }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn search(&self, term: &str) -> Result<Vec<Location>, WeatherError> {
        if term.is_empty() {
            return Err(WeatherError::EmptySearchTerm);
        }

        let url = self.search_url(term)?;
        let locations: Vec<Location> = fetch_json(self.transport.as_ref(), url).await?;

        tracing::debug!(term, count = locations.len(), "search completed");
        Ok(locations)
    }

    async fn current_weather(&self, city: &str) -> Result<Weather, WeatherError> {
        if city.is_empty() {
            return Err(WeatherError::InvalidCityName);
        }

        let url = self.current_url(city)?;
        let parsed: WaResponse = fetch_json(self.transport.as_ref(), url).await?;

        normalize(parsed.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use parking_lot::Mutex;

    const SERVICE: &str = "test.weatherapi";

    /// Replies with a fixed body and remembers every requested URL.
    #[derive(Debug, Default)]
    struct RecordingTransport {
        body: String,
        requests: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn get(&self, url: Url) -> Result<Vec<u8>, WeatherError> {
            self.requests.lock().push(url);
            Ok(self.body.clone().into_bytes())
        }
    }

    fn provider_with(key: Option<&str>, body: &str) -> (WeatherApiProvider, Arc<RecordingTransport>) {
        let store = match key {
            Some(key) => MemoryCredentialStore::with_secret(SERVICE, key),
            None => MemoryCredentialStore::default(),
        };
        let transport =
            Arc::new(RecordingTransport { body: body.to_string(), ..Default::default() });
        let provider = WeatherApiProvider::new(
            "https://api.weatherapi.com/v1",
            ApiKeySlot::new(Arc::new(store), SERVICE),
            transport.clone(),
        )
        .expect("valid base url");
        (provider, transport)
    }

    fn raw(temp_c: f64, uv: f64, feelslike_c: f64, icon: &str) -> WaCurrent {
        WaCurrent {
            temp_c,
            humidity: 75,
            uv,
            feelslike_c,
            condition: WaCondition { icon: icon.to_string() },
            last_updated_epoch: None,
        }
    }

    #[test]
    fn normalize_rounds_and_fixes_icon() {
        let weather = normalize(raw(25.7, 3.8, 24.1, "//abc.com/123.png")).unwrap();

        assert_eq!(weather.temperature_c, 26.0);
        assert_eq!(weather.uv, 4.0);
        assert_eq!(weather.feels_like_c, 24.0);
        assert_eq!(weather.humidity, 75);
        assert_eq!(weather.condition.icon_url, "https://abc.com/123.png");
    }

    #[test]
    fn normalize_rounds_half_away_from_zero() {
        let weather = normalize(raw(2.5, 0.5, -2.5, "//x/y.png")).unwrap();
        assert_eq!(weather.temperature_c, 3.0);
        assert_eq!(weather.uv, 1.0);
        assert_eq!(weather.feels_like_c, -3.0);
    }

    #[test]
    fn humidity_above_one_hundred_is_decode_failure() {
        let mut current = raw(20.0, 1.0, 20.0, "//x");
        current.humidity = 100;
        assert_eq!(normalize(current).unwrap().humidity, 100);

        let mut current = raw(20.0, 1.0, 20.0, "//x");
        current.humidity = 150;
        assert!(matches!(
            normalize(current),
            Err(WeatherError::DecodeFailure(msg)) if msg.contains("150")
        ));
    }

    #[test]
    fn absolute_icon_url_is_left_alone() {
        assert_eq!(absolute_icon_url("https://cdn/x.png"), "https://cdn/x.png");
    }

    #[test]
    fn observed_at_comes_from_epoch() {
        let mut current = raw(1.0, 1.0, 1.0, "//x");
        current.last_updated_epoch = Some(1_700_000_000);
        let weather = normalize(current).unwrap();
        assert_eq!(weather.observed_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_version_segment() {
        let (provider, _) = provider_with(Some("KEY"), "[]");
        let url = provider.search_url("Tokyo").unwrap();
        assert_eq!(url.as_str(), "https://api.weatherapi.com/v1/search.json?key=KEY&q=Tokyo");
    }

    #[test]
    fn current_url_disables_air_quality() {
        let (provider, _) = provider_with(Some("KEY"), "{}");
        let url = provider.current_url("New York").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.weatherapi.com/v1/current.json?key=KEY&q=New+York&aqi=no"
        );
    }

    #[test]
    fn invalid_base_url() {
        let store = Arc::new(MemoryCredentialStore::default());
        let err = WeatherApiProvider::new(
            "not a url",
            ApiKeySlot::new(store, SERVICE),
            Arc::new(RecordingTransport::default()),
        )
        .unwrap_err();
        assert!(matches!(err, WeatherError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn search_empty_term() {
        let (provider, transport) = provider_with(Some("KEY"), "[]");
        assert_eq!(provider.search("").await.unwrap_err(), WeatherError::EmptySearchTerm);
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn current_weather_empty_city() {
        let (provider, _) = provider_with(Some("KEY"), "{}");
        assert_eq!(
            provider.current_weather("").await.unwrap_err(),
            WeatherError::InvalidCityName
        );
    }

    #[tokio::test]
    async fn search_without_credential_makes_no_request() {
        let (provider, transport) = provider_with(None, "[]");
        assert_eq!(provider.search("Tokyo").await.unwrap_err(), WeatherError::MissingCredential);
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn search_returns_locations_verbatim() {
        let body = r#"[{"id":1,"name":"Tokyo","region":"Kantō","country":"Japan"}]"#;
        let (provider, transport) = provider_with(Some("ABC123"), body);

        let locations = provider.search("Tokyo").await.unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "Tokyo");
        assert_eq!(locations[0].id, Some(1));

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].query().unwrap_or_default().contains("key=ABC123"));
    }

    #[tokio::test]
    async fn current_weather_missing_field_is_decode_failure() {
        let body = r#"{
            "location": {"name":"Tokyo","region":"Kantō","country":"Japan"},
            "current": {"temp_c": 20.0, "humidity": 50, "uv": 1.0, "condition": {"icon": "//x"}}
        }"#;
        let (provider, _) = provider_with(Some("KEY"), body);

        let err = provider.current_weather("Tokyo").await.unwrap_err();
        assert!(matches!(err, WeatherError::DecodeFailure(msg) if msg.contains("feelslike_c")));
    }
}
