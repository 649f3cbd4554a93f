//! `/weather`: Singapore forecasts and the rain area radar.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::warn;

use crate::{
    base::{
        reply::{InlineKeyboard, ParseMode, Reply},
        types::{ChatId, Res},
    },
    service::weather::{Forecast4d, Forecast24, Range, Regions, WeatherClient},
};

use super::{CommandHandler, HandlerContext, Invocation};

const API_ERROR: &str = "API Error, Please try again later";

/// Singapore Standard Time.
const SGT_OFFSET_SECONDS: i32 = 8 * 3600;

/// The newest radar frame is usually a few minutes behind the clock.
const RAINMAP_LAG_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubCommand {
    Forecast24,
    Forecast4d,
    Rainmap,
    Help,
}

impl FromStr for SubCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forecast24" => Ok(SubCommand::Forecast24),
            "forecast4d" => Ok(SubCommand::Forecast4d),
            "rainmap" => Ok(SubCommand::Rainmap),
            "help" => Ok(SubCommand::Help),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    North,
    South,
    East,
    West,
    Central,
}

impl Region {
    const ALL: [Region; 5] = [Region::North, Region::South, Region::East, Region::West, Region::Central];

    fn name(self) -> &'static str {
        match self {
            Region::North => "north",
            Region::South => "south",
            Region::East => "east",
            Region::West => "west",
            Region::Central => "central",
        }
    }

    fn forecast(self, regions: &Regions) -> &str {
        match self {
            Region::North => &regions.north,
            Region::South => &regions.south,
            Region::East => &regions.east,
            Region::West => &regions.west,
            Region::Central => &regions.central,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL.into_iter().find(|region| region.name() == s).ok_or_else(|| {
            let expected = Region::ALL.map(Region::name).join(", ");
            format!("Invalid region: \"{s}\"\n\nExpected options:\n{expected}")
        })
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Formats an ISO-8601 timestamp, falling back to the raw string.
fn format_time(iso: &str, format: &str) -> String {
    DateTime::parse_from_rfc3339(iso).map(|t| t.format(format).to_string()).unwrap_or_else(|_| iso.to_string())
}

fn format_range(range: &Range, unit: &str) -> String {
    format!("{} - {}{unit}", range.low, range.high)
}

fn render_forecast24(forecast: &Forecast24, region: Region) -> String {
    let general = &forecast.general;

    let mut html = format!(
        "<b>24 Hour Forecast ({region})</b>\n\
         <i>Updated: {}</i>\n\n\
         <b>General</b>\n\
         {}\n\
         Temperature: {}\n\
         Humidity: {}\n\
         Wind: {} {}\n\n\
         <b>{}</b>",
        format_time(&forecast.update_timestamp, "%Y-%m-%d %H:%M"),
        escape_html(&general.forecast),
        format_range(&general.temperature, " °C"),
        format_range(&general.relative_humidity, " %"),
        escape_html(&general.wind.direction),
        format_range(&general.wind.speed, " km/h"),
        region.name().to_uppercase(),
    );

    for period in &forecast.periods {
        html.push_str(&format!(
            "\n<code>{} - {}</code> {}",
            format_time(&period.time.start, "%a %H:%M"),
            format_time(&period.time.end, "%H:%M"),
            escape_html(region.forecast(&period.regions)),
        ));
    }

    html
}

fn render_forecast4d(outlook: &Forecast4d) -> String {
    let mut html = format!("<b>4 Day Outlook</b>\n<i>Updated: {}</i>", format_time(&outlook.update_timestamp, "%Y-%m-%d %H:%M"));

    for day in &outlook.forecasts {
        html.push_str(&format!(
            "\n\n<b>{}</b>\n{}\nTemperature: {}\nHumidity: {}\nWind: {} {}",
            escape_html(&day.date),
            escape_html(&day.forecast),
            format_range(&day.temperature, " °C"),
            format_range(&day.relative_humidity, " %"),
            escape_html(&day.wind.direction),
            format_range(&day.wind.speed, " km/h"),
        ));
    }

    html
}

fn help_text(trigger: &str) -> String {
    format!(
        "<b>Singapore Weather</b>\n\
         Data from data.gov.sg and weather.gov.sg.\n\n\
         <b>Usage</b>\n\
         <code>{trigger} forecast24 [region]</code>: 24 hour forecast, by region\n\
         <code>{trigger} forecast4d</code>: 4 day outlook\n\
         <code>{trigger} rainmap</code>: latest rain area radar\n\
         <code>{trigger} help</code>: show this message"
    )
}

/// The `/weather` command.
pub struct Weather {
    trigger: String,
    client: WeatherClient,
}

impl Weather {
    pub fn new(prefix: char, client: WeatherClient) -> Self {
        Self {
            trigger: format!("{prefix}weather"),
            client,
        }
    }

    fn error_reply(&self, chat_id: ChatId, sub_command: &str, message: &str) -> Reply {
        let scope = if sub_command.is_empty() { self.trigger.clone() } else { format!("{} {sub_command}", self.trigger) };

        Reply::text(chat_id, format!("[{scope}]:\n{message}"))
    }

    fn menu(&self, chat_id: ChatId) -> Res<Reply> {
        let labels = vec![vec!["24 Hours Forecast"], vec!["4 Day Outlook"], vec!["Rainmap"], vec!["Help"]];
        let data = ["forecast24", "forecast4d", "rainmap", "help"].map(|sub| vec![format!("{} {sub}", self.trigger)]).to_vec();

        Ok(Reply::text(chat_id, format!("[{}] Select an Option", self.trigger)).with_keyboard(InlineKeyboard::new(labels, data)?))
    }

    fn region_menu(&self, chat_id: ChatId) -> Res<Reply> {
        let labels = vec![vec!["North"], vec!["West", "Central", "East"], vec!["South"]];
        let data = [vec![Region::North], vec![Region::West, Region::Central, Region::East], vec![Region::South]]
            .map(|row| row.into_iter().map(|region| format!("{} forecast24 {region}", self.trigger)).collect::<Vec<_>>())
            .to_vec();

        Ok(Reply::text(chat_id, format!("[{} forecast24] Select an Option", self.trigger)).with_keyboard(InlineKeyboard::new(labels, data)?))
    }

    async fn forecast24(&self, invocation: &Invocation, chat_id: ChatId) -> Res<Reply> {
        let argc = invocation.tokens().len();

        let region = match invocation.arguments() {
            [_] => return self.region_menu(chat_id),
            [_, region] => region,
            _ => return Ok(self.error_reply(chat_id, "forecast24", &format!("Too many arguments, expected 3, got {argc}"))),
        };

        let region = match region.parse::<Region>() {
            Ok(region) => region,
            Err(message) => return Ok(self.error_reply(chat_id, "forecast24", &message)),
        };

        match self.client.forecast24().await {
            Ok(forecast) => Ok(Reply::text(chat_id, render_forecast24(&forecast, region)).with_parse_mode(ParseMode::Html)),
            Err(e) => {
                warn!("24 hour forecast unavailable: {}", e);
                Ok(self.error_reply(chat_id, "forecast24", API_ERROR))
            }
        }
    }

    async fn forecast4d(&self, chat_id: ChatId) -> Res<Reply> {
        match self.client.forecast4d().await {
            Ok(outlook) => Ok(Reply::text(chat_id, render_forecast4d(&outlook)).with_parse_mode(ParseMode::Html)),
            Err(e) => {
                warn!("4 day outlook unavailable: {}", e);
                Ok(self.error_reply(chat_id, "forecast4d", API_ERROR))
            }
        }
    }

    async fn rainmap(&self, chat_id: ChatId) -> Res<Reply> {
        let sgt = FixedOffset::east_opt(SGT_OFFSET_SECONDS).ok_or_else(|| anyhow!("invalid Singapore offset"))?;
        let at = Utc::now().with_timezone(&sgt) - Duration::minutes(RAINMAP_LAG_MINUTES);

        match self.client.rainmap(at).await {
            Ok(rainmap) => {
                let caption = format!("Updated: {}", rainmap.taken_at.format("%Y-%m-%d %H:%M"));
                Ok(Reply::photo(chat_id, rainmap.image, Some(caption)))
            }
            Err(e) => {
                warn!("Rain map unavailable: {}", e);
                Ok(self.error_reply(chat_id, "rainmap", API_ERROR))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for Weather {
    fn trigger(&self) -> &str {
        &self.trigger
    }

    fn description(&self) -> &str {
        "Singapore Weather"
    }

    async fn handle(&self, invocation: &Invocation, context: &HandlerContext<'_>) -> Res<Vec<Reply>> {
        let chat_id = context.chat_id;

        let Some(sub_command) = invocation.arguments().first() else {
            return Ok(vec![self.menu(chat_id)?]);
        };

        let reply = match sub_command.parse::<SubCommand>() {
            Ok(SubCommand::Forecast24) => self.forecast24(invocation, chat_id).await?,
            Ok(SubCommand::Forecast4d) => self.forecast4d(chat_id).await?,
            Ok(SubCommand::Rainmap) => self.rainmap(chat_id).await?,
            Ok(SubCommand::Help) => Reply::text(chat_id, help_text(&self.trigger)).with_parse_mode(ParseMode::Html),
            Err(()) => self.error_reply(chat_id, "", &format!("Invalid arguments: {:?}", invocation.arguments())),
        };

        Ok(vec![reply])
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        base::reply::ReplyPayload,
        command::testing::{Harness, button_data},
        service::weather::{MockWeather, Rainmap},
    };

    fn weather(mock: MockWeather) -> Weather {
        Weather::new('/', WeatherClient::new(Arc::new(mock)))
    }

    fn sample_forecast24() -> Forecast24 {
        serde_json::from_value(serde_json::json!({
            "update_timestamp": "2024-05-01T11:32:28+08:00",
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
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn bare_command_shows_menu() {
        let harness = Harness::new().await;

        let replies = harness.run(&weather(MockWeather::new()), "/weather").await;

        assert_eq!(replies[0].as_text(), Some("[/weather] Select an Option"));
        assert_eq!(
            button_data(&replies[0]),
            [["/weather forecast24"], ["/weather forecast4d"], ["/weather rainmap"], ["/weather help"]]
        );
    }

    #[tokio::test]
    async fn forecast24_without_region_shows_region_menu() {
        let harness = Harness::new().await;

        let replies = harness.run(&weather(MockWeather::new()), "/weather forecast24").await;

        let rows = button_data(&replies[0]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], ["/weather forecast24 west", "/weather forecast24 central", "/weather forecast24 east"]);
    }

    #[tokio::test]
    async fn forecast24_renders_region() {
        let harness = Harness::new().await;
        let mut mock = MockWeather::new();
        mock.expect_forecast24().times(1).returning(|| Ok(sample_forecast24()));

        let replies = harness.run(&weather(mock), "/weather forecast24 north").await;
        let text = replies[0].as_text().unwrap();

        assert_eq!(replies[0].parse_mode, Some(ParseMode::Html));
        assert!(text.starts_with("<b>24 Hour Forecast (north)</b>"));
        assert!(text.contains("Temperature: 25 - 34 °C"));
        assert!(text.contains("Showers"));
    }

    #[tokio::test]
    async fn forecast24_validates_region_and_arity() {
        let harness = Harness::new().await;
        let mut mock = MockWeather::new();
        mock.expect_forecast24().never();
        let weather = weather(mock);

        let replies = harness.run(&weather, "/weather forecast24 mars").await;
        assert!(replies[0].as_text().unwrap().starts_with("[/weather forecast24]:\nInvalid region: \"mars\""));

        let replies = harness.run(&weather, "/weather forecast24 north south").await;
        assert_eq!(replies[0].as_text(), Some("[/weather forecast24]:\nToo many arguments, expected 3, got 4"));
    }

    #[tokio::test]
    async fn upstream_failure_is_reported() {
        let harness = Harness::new().await;
        let mut mock = MockWeather::new();
        mock.expect_forecast4d().returning(|| Err(anyhow!("502 Bad Gateway")));

        let replies = harness.run(&weather(mock), "/weather forecast4d").await;

        assert_eq!(replies[0].as_text(), Some("[/weather forecast4d]:\nAPI Error, Please try again later"));
    }

    #[tokio::test]
    async fn rainmap_is_sent_as_captioned_photo() {
        let harness = Harness::new().await;
        let mut mock = MockWeather::new();
        mock.expect_rainmap().withf(|at| at.offset().local_minus_utc() == SGT_OFFSET_SECONDS).times(1).returning(|_| {
            Ok(Rainmap {
                taken_at: DateTime::parse_from_rfc3339("2024-05-01T09:05:00+08:00").unwrap(),
                image: vec![0x89, 0x50, 0x4e, 0x47],
            })
        });

        let replies = harness.run(&weather(mock), "/weather rainmap").await;

        let ReplyPayload::Photo { bytes, caption } = &replies[0].payload else {
            panic!("expected a photo");
        };
        assert_eq!(caption.as_deref(), Some("Updated: 2024-05-01 09:05"));
        assert_eq!(bytes, &[0x89, 0x50, 0x4e, 0x47]);
    }

    #[tokio::test]
    async fn unknown_sub_command_lists_arguments() {
        let harness = Harness::new().await;

        let replies = harness.run(&weather(MockWeather::new()), "/weather tides today").await;

        assert_eq!(replies[0].as_text(), Some("[/weather]:\nInvalid arguments: [\"tides\", \"today\"]"));
    }
}
