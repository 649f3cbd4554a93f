//! data.gov.sg / weather.gov.sg implementation of the weather client.

use std::{io::Cursor, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use image::{
    DynamicImage, ImageFormat, RgbaImage,
    imageops::{self, FilterType},
};
use serde::{Deserialize, de::DeserializeOwned};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::base::{config::Config, types::Res};

use super::{Forecast4d, Forecast24, GenericWeatherClient, Rainmap, WeatherClient, round_down};

/// How many earlier radar frames to try when the latest is not published yet.
const RAINMAP_MAX_STEPS_BACK: u32 = 10;

/// Radar frames are published every five minutes.
const RAINMAP_INTERVAL_MINUTES: u32 = 5;

/// Opacity of rain pixels drawn over the base map.
const RAIN_ALPHA: u8 = 70;

// Extra methods on `WeatherClient` applied by the data.gov.sg implementation.

impl WeatherClient {
    /// Creates a new data.gov.sg weather client.
    pub fn datagov(config: &Config) -> Res<Self> {
        let client = DataGovWeatherClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

/// Every environment endpoint wraps its payload in an `items` array.
#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// Builds the radar image URL for a frame time.
fn rainmap_url(base_url: &str, time: DateTime<FixedOffset>) -> String {
    format!("{}/dpsri_70km_{}0000dBR.dpsri.png", base_url.trim_end_matches('/'), time.format("%Y%m%d%H%M"))
}

/// Walks back from `at` one frame at a time until `fetch` returns a published frame.
///
/// `fetch` yields `Ok(None)` for a frame that is not published. A failed request
/// counts the same way, so one bad frame never hides an earlier good one.
async fn find_frame<F, Fut>(at: DateTime<FixedOffset>, mut fetch: F) -> Res<(DateTime<FixedOffset>, Vec<u8>)>
where
    F: FnMut(DateTime<FixedOffset>) -> Fut,
    Fut: Future<Output = Res<Option<Vec<u8>>>>,
{
    let mut frame = round_down(at, RAINMAP_INTERVAL_MINUTES);

    for _ in 0..=RAINMAP_MAX_STEPS_BACK {
        match fetch(frame).await {
            Ok(Some(image)) => {
                debug!("Found radar frame at `{}`.", frame);
                return Ok((frame, image));
            }
            Ok(None) => {}
            Err(e) => warn!("Radar frame `{}` request failed: {}", frame, e),
        }

        frame -= Duration::minutes(RAINMAP_INTERVAL_MINUTES as i64);
    }

    Err(anyhow!("No radar frame published in the last {} minutes", RAINMAP_MAX_STEPS_BACK * RAINMAP_INTERVAL_MINUTES))
}

/// The static layers a radar frame is drawn between, at the base map's size.
struct MapLayers {
    base: RgbaImage,
    township: RgbaImage,
}

impl MapLayers {
    fn new(base: &DynamicImage, township: &DynamicImage) -> Self {
        let base = base.to_rgba8();
        let township = imageops::resize(&township.to_rgba8(), base.width(), base.height(), FilterType::CatmullRom);

        Self { base, township }
    }

    /// Draws a translucent radar frame over the base map, under the township labels, as PNG.
    fn compose(&self, radar: &DynamicImage) -> Res<Vec<u8>> {
        let mut map = self.base.clone();

        let mut rain = imageops::resize(&radar.to_rgba8(), map.width(), map.height(), FilterType::CatmullRom);
        for pixel in rain.pixels_mut() {
            if pixel.0[3] > 0 {
                pixel.0[3] = RAIN_ALPHA;
            }
        }

        imageops::overlay(&mut map, &rain, 0, 0);
        imageops::overlay(&mut map, &self.township, 0, 0);

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(map).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        Ok(png)
    }
}

/// Weather client implementation.
#[derive(Clone)]
struct DataGovWeatherClient {
    http: reqwest::Client,
    api_base_url: String,
    rainmap_base_url: String,
    base_map_url: String,
    township_url: String,
    /// Fetched on first use; a failed fetch is retried on the next request.
    layers: Arc<OnceCell<Arc<MapLayers>>>,
}

impl DataGovWeatherClient {
    fn new(config: &Config) -> Res<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_base_url: config.weather_api_base_url.trim_end_matches('/').to_string(),
            rainmap_base_url: config.rainmap_base_url.clone(),
            base_map_url: config.rainmap_base_map_url.clone(),
            township_url: config.rainmap_township_url.clone(),
            layers: Arc::new(OnceCell::new()),
        })
    }

    async fn latest_item<T: DeserializeOwned>(&self, endpoint: &str) -> Res<T> {
        let url = format!("{}/{}", self.api_base_url, endpoint);
        let response: ItemsResponse<T> = self.http.get(&url).send().await?.error_for_status()?.json().await?;

        response.items.into_iter().next().ok_or_else(|| anyhow!("`{endpoint}` returned no items"))
    }

    async fn fetch_image(&self, url: &str) -> Res<DynamicImage> {
        let bytes = self.http.get(url).send().await?.error_for_status()?.bytes().await?;

        Ok(image::load_from_memory(&bytes)?)
    }

    async fn layers(&self) -> Res<Arc<MapLayers>> {
        let layers = self
            .layers
            .get_or_try_init(|| async {
                let (base, township) = futures::future::try_join(self.fetch_image(&self.base_map_url), self.fetch_image(&self.township_url)).await?;
                info!("Loaded rain map layers ({}x{}).", base.width(), base.height());

                Res::Ok(Arc::new(MapLayers::new(&base, &township)))
            })
            .await?;

        Ok(layers.clone())
    }

    async fn fetch_frame(&self, frame: DateTime<FixedOffset>) -> Res<Option<Vec<u8>>> {
        let response = self.http.get(rainmap_url(&self.rainmap_base_url, frame)).send().await?;

        if !response.status().is_success() {
            warn!("Radar frame `{}` not available ({}).", frame, response.status());
            return Ok(None);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}

#[async_trait]
impl GenericWeatherClient for DataGovWeatherClient {
    #[instrument(skip(self))]
    async fn forecast24(&self) -> Res<Forecast24> {
        self.latest_item("24-hour-weather-forecast").await
    }

    #[instrument(skip(self))]
    async fn forecast4d(&self) -> Res<Forecast4d> {
        self.latest_item("4-day-weather-forecast").await
    }

    #[instrument(skip(self))]
    async fn rainmap(&self, at: DateTime<FixedOffset>) -> Res<Rainmap> {
        let layers = self.layers().await?;
        let (taken_at, radar) = find_frame(at, |frame| self.fetch_frame(frame)).await?;

        let image = tokio::task::spawn_blocking(move || layers.compose(&image::load_from_memory(&radar)?)).await??;

        Ok(Rainmap { taken_at, image })
    }
}

// Tests.
