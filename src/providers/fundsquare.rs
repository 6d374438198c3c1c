use super::calendar::{MadridCalendar, TradingCalendar};
use super::util::{get_text, http_client};
use crate::core::config::Fund;
use crate::core::price::{DatedObservation, Observation, Source};
use crate::core::source::PriceSource;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Fundsquare sends numbers either as JSON numbers or as strings.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
        Null(()),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        NumberOrString::Null(()) => Ok(0.0),
    }
}

#[derive(Debug, Deserialize)]
struct NavItem {
    /// Calculation time of the NAV, epoch milliseconds.
    #[serde(rename = "dtHrCalcVni", default, deserialize_with = "lenient_f64")]
    calculated_at_ms: f64,
    #[serde(rename = "pxVniPart", default, deserialize_with = "lenient_f64")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct FundsquareResponse {
    #[serde(rename = "EUR", default)]
    eur: Vec<NavItem>,
}

/// Fundsquare NAV feed. Only the most recent EUR NAV is used.
pub struct FundsquareProvider {
    base_url: String,
    client: reqwest::Client,
    calendar: Arc<dyn TradingCalendar>,
}

impl FundsquareProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_calendar(base_url, timeout, Arc::new(MadridCalendar))
    }

    pub fn with_calendar(
        base_url: &str,
        timeout: Duration,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self> {
        Ok(FundsquareProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
            calendar,
        })
    }

    fn latest_observation(
        &self,
        isin: &str,
        response: FundsquareResponse,
    ) -> Result<DatedObservation> {
        let latest = response
            .eur
            .into_iter()
            .max_by(|a, b| a.calculated_at_ms.total_cmp(&b.calculated_at_ms))
            .ok_or_else(|| anyhow!("No EUR data for {}", isin))?;

        if !(latest.calculated_at_ms > 0.0 && latest.price > 0.0) || !latest.price.is_finite() {
            return Err(anyhow!(
                "Invalid NAV for {}: price {} at {}",
                isin,
                latest.price,
                latest.calculated_at_ms
            ));
        }

        let timestamp_ms = latest.calculated_at_ms as i64;
        let date = self
            .calendar
            .trading_date(timestamp_ms)
            .ok_or_else(|| anyhow!("NAV timestamp out of range for {}: {}", isin, timestamp_ms))?;

        Ok(DatedObservation {
            date,
            observation: Observation::new(latest.price, Source::Fundsquare)
                .with_source_timestamp(timestamp_ms),
        })
    }
}

#[async_trait]
impl PriceSource for FundsquareProvider {
    fn source(&self) -> Source {
        Source::Fundsquare
    }

    #[instrument(name = "FundsquareFetch", skip(self, fund), fields(isin = %fund.isin))]
    async fn fetch_observations(&self, fund: &Fund) -> Result<Vec<DatedObservation>> {
        let id = fund
            .fundsquare
            .as_deref()
            .ok_or_else(|| anyhow!("No Fundsquare id configured for {}", fund.isin))?;

        let url = format!("{}/Fundsquare/application/vni/{}", self.base_url, id);
        debug!("Requesting NAV from {}", url);

        let referer = format!("{}/", self.base_url);
        let body = get_text(
            &self.client,
            &url,
            &[
                ("accept", "application/json,text/plain,*/*"),
                ("referer", referer.as_str()),
            ],
        )
        .await?;

        let response: FundsquareResponse = serde_json::from_str(&body).with_context(|| {
            format!(
                "Failed to parse Fundsquare response for {}. Response: '{body}'",
                fund.isin
            )
        })?;

        let observation = self.latest_observation(&fund.isin, response)?;
        debug!(
            date = %observation.date,
            close = observation.observation.close,
            "Latest NAV"
        );
        Ok(vec![observation])
    }
}
