pub mod datagov;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Timelike};
use serde::Deserialize;

use crate::base::types::Res;

// Types.

/// A low/high pair, e.g. a temperature band.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

/// A start/end time window, as ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Period {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Wind {
    pub speed: Range,
    pub direction: String,
}

/// The island-wide outlook of a 24 hour forecast.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneralForecast {
    pub forecast: String,
    pub relative_humidity: Range,
    pub temperature: Range,
    pub wind: Wind,
}

/// Per-region forecasts for one period of the day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Regions {
    pub north: String,
    pub south: String,
    pub east: String,
    pub west: String,
    pub central: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastPeriod {
    pub time: Period,
    pub regions: Regions,
}

/// The latest 24 hour forecast.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Forecast24 {
    pub update_timestamp: String,
    pub valid_period: Period,
    pub general: GeneralForecast,
    #[serde(default)]
    pub periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub forecast: String,
    pub relative_humidity: Range,
    pub temperature: Range,
    pub wind: Wind,
}

/// The latest 4 day outlook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Forecast4d {
    pub update_timestamp: String,
    #[serde(default)]
    pub forecasts: Vec<DailyForecast>,
}

/// A rain map image (PNG) and the time its radar frame was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Rainmap {
    pub taken_at: DateTime<FixedOffset>,
    pub image: Vec<u8>,
}

/// Rounds a time down to the previous multiple of `minutes`.
pub fn round_down(time: DateTime<FixedOffset>, minutes: u32) -> DateTime<FixedOffset> {
    let excess = Duration::minutes((time.minute() % minutes) as i64) + Duration::seconds(time.second() as i64) + Duration::nanoseconds(time.nanosecond() as i64);

    time - excess
}

// Traits.

/// Generic weather client trait that clients must implement.
#[async_trait]
pub trait GenericWeatherClient: Send + Sync + 'static {
    /// Fetch the latest 24 hour forecast.
    async fn forecast24(&self) -> Res<Forecast24>;

    /// Fetch the latest 4 day outlook.
    async fn forecast4d(&self) -> Res<Forecast4d>;

    /// Fetch the most recent rain map taken at or before `at`, drawn over the island map as PNG.
    async fn rainmap(&self, at: DateTime<FixedOffset>) -> Res<Rainmap>;
}

// Structs.

/// Weather client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct WeatherClient {
    inner: Arc<dyn GenericWeatherClient>,
}

impl Deref for WeatherClient {
    type Target = dyn GenericWeatherClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl WeatherClient {
    pub fn new(inner: Arc<dyn GenericWeatherClient>) -> Self {
        Self { inner }
    }
}

// Mocks.

#[cfg(test)]
mockall::mock! {
    pub Weather {}

    #[async_trait]
    impl GenericWeatherClient for Weather {
        async fn forecast24(&self) -> Res<Forecast24>;
        async fn forecast4d(&self) -> Res<Forecast4d>;
        async fn rainmap(&self, at: DateTime<FixedOffset>) -> Res<Rainmap>;
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_down_to_five_minutes() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T13:47:31.250+08:00").unwrap();

        assert_eq!(round_down(time, 5), DateTime::parse_from_rfc3339("2024-05-01T13:45:00+08:00").unwrap());
    }

    #[test]
    fn round_down_keeps_aligned_time() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T13:45:00+08:00").unwrap();

        assert_eq!(round_down(time, 5), time);
    }

    #[test]
    fn forecast24_deserializes_api_item() {
        let item = serde_json::json!({
            "update_timestamp": "2024-05-01T11:32:28+08:00",
            "timestamp": "2024-05-01T11:30:00+08:00",
            "valid_period": { "start": "2024-05-01T12:00:00+08:00", "end": "2024-05-02T12:00:00+08:00" },
            "general": {
                "forecast": "Thundery Showers",
                "relative_humidity": { "low": 60, "high": 95 },
                "temperature": { "low": 25, "high": 34 },
                "wind": { "speed": { "low": 10, "high": 20 }, "direction": "SSE" }
            },
            "periods": [{
                "time": { "start": "2024-05-01T12:00:00+08:00", "end": "2024-05-01T18:00:00+08:00" },
                "regions": { "west": "Cloudy", "east": "Fair", "central": "Cloudy", "south": "Fair", "north": "Showers" }
            }]
        });

        let forecast: Forecast24 = serde_json::from_value(item).unwrap();

        assert_eq!(forecast.general.temperature, Range { low: 25.0, high: 34.0 });
        assert_eq!(forecast.periods[0].regions.north, "Showers");
    }
}
