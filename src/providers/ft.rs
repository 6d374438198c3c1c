use super::util::{get_text, http_client};
use crate::core::config::Fund;
use crate::core::price::{DatedObservation, Observation, Source};
use crate::core::source::PriceSource;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};

static RESULTS_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<table[^>]*class="[^"]*mod-tearsheet-historical-prices__results[^"]*"[^>]*>(.*?)</table>"#,
    )
    .expect("valid regex")
});
static TBODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tbody[^>]*>(.*?)</tbody>").expect("valid regex"));
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid regex"));
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
// "Tuesday, February 10, 2026" or "Tue, Feb 10, 2026"
static FT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]{3,}),?\s+([A-Za-z]{3,})\s+(\d{1,2}),?\s+(\d{4})").expect("valid regex")
});

const DATE_COLUMN: usize = 0;
const CLOSE_COLUMN: usize = 4;

fn cell_text(html: &str) -> String {
    let text = TAG.replace_all(html, " ").replace("&nbsp;", " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_ft_date(text: &str) -> Option<NaiveDate> {
    let caps = FT_DATE.captures(text)?;
    let normalized = format!("{} {:0>2}, {}", &caps[2], &caps[3], &caps[4]);
    NaiveDate::parse_from_str(&normalized, "%B %d, %Y").ok()
}

fn parse_ft_number(text: &str) -> Option<f64> {
    let clean: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    clean
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Extracts `(date, close)` pairs from the historical prices table, newest
/// first. A date seen twice keeps its last close.
fn parse_ft_history(html: &str) -> Vec<(NaiveDate, f64)> {
    let Some(table) = RESULTS_TABLE.captures(html) else {
        return Vec::new();
    };
    let Some(body) = TBODY.captures(&table[1]) else {
        return Vec::new();
    };

    let mut prices = BTreeMap::new();
    for row in ROW.captures_iter(&body[1]) {
        let cells: Vec<String> = CELL
            .captures_iter(&row[1])
            .map(|cell| cell_text(&cell[1]))
            .collect();
        if cells.len() <= CLOSE_COLUMN {
            continue;
        }
        if let (Some(date), Some(close)) = (
            parse_ft_date(&cells[DATE_COLUMN]),
            parse_ft_number(&cells[CLOSE_COLUMN]),
        ) {
            prices.insert(date, close);
        }
    }
    prices.into_iter().rev().collect()
}

/// Financial Times fund tearsheet, which serves the whole visible price history.
pub struct FtProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FtProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(FtProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PriceSource for FtProvider {
    fn source(&self) -> Source {
        Source::Ft
    }

    #[instrument(name = "FtFetch", skip(self, fund), fields(isin = %fund.isin))]
    async fn fetch_observations(&self, fund: &Fund) -> Result<Vec<DatedObservation>> {
        let symbol = fund
            .ft
            .as_deref()
            .ok_or_else(|| anyhow!("No FT symbol configured for {}", fund.isin))?;

        let url = format!(
            "{}/data/funds/tearsheet/historical?s={}",
            self.base_url, symbol
        );
        debug!("Requesting price history from {}", url);

        let html = get_text(
            &self.client,
            &url,
            &[("accept", "text/html,application/xhtml+xml")],
        )
        .await?;

        let history = parse_ft_history(&html);
        if history.is_empty() {
            return Err(anyhow!("No price data extracted for {}", fund.isin));
        }
        debug!("Extracted {} historical prices", history.len());

        Ok(history
            .into_iter()
            .map(|(date, close)| DatedObservation {
                date,
                observation: Observation::new(close, Source::Ft),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FT_HTML: &str = r#"
<html><body>
<table class="mod-ui-table mod-tearsheet-historical-prices__results mod-ui-table--freeze-pane">
  <thead><tr><th>Date</th><th>Open</th><th>High</th><th>Low</th><th>Close</th><th>Volume</th></tr></thead>
  <tbody>
    <tr>
      <td class="mod-ui-table__cell--text"><span class="mod-ui-hide-small-below">Tuesday, February 10, 2026</span><span class="mod-ui-hide-medium-above">Tue, Feb 10, 2026</span></td>
      <td>780.94</td><td>780.94</td><td>780.94</td><td>780.94</td><td>----</td>
    </tr>
    <tr>
      <td><span>Monday, February 9, 2026</span></td>
      <td>1,002.10</td><td>1,002.10</td><td>1,002.10</td><td>1,002.10</td><td>----</td>
    </tr>
    <tr>
      <td>Fri, Feb 6, 2026</td><td>1</td><td>1</td><td>1</td><td>0.00</td><td>----</td>
    </tr>
    <tr><td>not a date</td><td>1</td><td>1</td><td>1</td><td>5.00</td><td>----</td></tr>
    <tr><td>Thu, Feb 5, 2026</td><td>1</td></tr>
  </tbody>
</table>
</body></html>"#;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fund() -> Fund {
        Fund {
            isin: "LU0563745743".to_string(),
            ft: Some("LU0563745743:EUR".to_string()),
            fundsquare: None,
        }
    }

    #[test]
    fn test_parse_ft_date() {
        assert_eq!(
            parse_ft_date("Tuesday, January 28, 2026"),
            Some(day("2026-01-28"))
        );
        assert_eq!(parse_ft_date("Tue, Jan 28, 2026"), Some(day("2026-01-28")));
        assert_eq!(parse_ft_date("Mon, Feb 2 2026"), Some(day("2026-02-02")));
        assert_eq!(parse_ft_date("Tue, Foo 28, 2026"), None);
        assert_eq!(parse_ft_date(""), None);
    }

    #[test]
    fn test_parse_ft_number() {
        assert_eq!(parse_ft_number("780.94"), Some(780.94));
        assert_eq!(parse_ft_number(" 1,002.10 "), Some(1002.10));
        assert_eq!(parse_ft_number("0.00"), None);
        assert_eq!(parse_ft_number("-3"), None);
        assert_eq!(parse_ft_number("----"), None);
    }

    #[test]
    fn test_parse_ft_history() {
        let history = parse_ft_history(FT_HTML);
        assert_eq!(
            history,
            vec![(day("2026-02-10"), 780.94), (day("2026-02-09"), 1002.10)]
        );
    }

    #[test]
    fn test_parse_ft_history_without_table() {
        assert!(parse_ft_history("<html><table><tbody></tbody></table></html>").is_empty());
    }

    #[tokio::test]
    async fn test_successful_ft_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/funds/tearsheet/historical"))
            .and(query_param("s", "LU0563745743:EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FT_HTML))
            .mount(&mock_server)
            .await;

        let provider = FtProvider::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let observations = provider.fetch_observations(&fund()).await.unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].date, day("2026-02-10"));
        assert_eq!(
            observations[0].observation,
            Observation::new(780.94, Source::Ft)
        );
        assert_eq!(observations[1].observation.close, 1002.10);
    }

    #[tokio::test]
    async fn test_ft_page_without_prices_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/funds/tearsheet/historical"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let provider = FtProvider::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let err = provider.fetch_observations(&fund()).await.unwrap_err();
        assert_eq!(err.to_string(), "No price data extracted for LU0563745743");
    }

    #[tokio::test]
    async fn test_ft_fund_without_symbol() {
        let provider = FtProvider::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let mut fund = fund();
        fund.ft = None;
        let err = provider.fetch_observations(&fund).await.unwrap_err();
        assert!(err.to_string().contains("No FT symbol"));
    }
}
