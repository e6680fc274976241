use std::future::Future;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::query::{create_url, QueryParameters};
use crate::response::{parse_response, ErrorValue};
use crate::table::SensorTable;

/// Something that can deliver readings for a query.
pub trait ReadingSource: Send + Sync {
    fn fetch(
        &self,
        query: &QueryParameters,
    ) -> impl Future<Output = Result<SensorTable, ErrorValue>> + Send;
}

/// Fetches readings from the sensor data endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    time_zone: Tz,
    retention: Option<usize>,
}

impl HttpSource {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        time_zone: Tz,
        retention: Option<usize>,
    ) -> color_eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            time_zone,
            retention,
        })
    }

    pub fn url_for(&self, query: &QueryParameters) -> String {
        create_url(&self.base_url, query.pairs())
    }

    async fn get(&self, url: &str) -> Result<(u16, Vec<u8>), reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

impl ReadingSource for HttpSource {
    async fn fetch(&self, query: &QueryParameters) -> Result<SensorTable, ErrorValue> {
        let url = self.url_for(query);
        debug!("GET {url}");

        let (status, body) = self.get(&url).await.map_err(|e| {
            warn!("Request to {url} failed: {e}");
            ErrorValue::Request(e.to_string())
        })?;

        let raw = parse_response(status, &body).inspect_err(|e| {
            warn!("Fetching {} for sensor {} failed: {e}", query.gas, query.address);
        })?;
        debug!("Received {} rows for sensor {}", raw.len(), query.address);

        SensorTable::from_raw(raw, self.time_zone, self.retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Gas, SensorAddress};
    use chrono::NaiveDate;

    #[test]
    fn url_uses_configured_base() {
        let source = HttpSource::new(
            "http://127.0.0.1:1880/drone-data",
            Duration::from_secs(5),
            chrono_tz::Europe::Berlin,
            None,
        )
        .unwrap();
        let query = QueryParameters::new(
            Gas::O2,
            SensorAddress::new(2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 24).unwrap(),
            1,
        );
        assert_eq!(
            source.url_for(&query),
            "http://127.0.0.1:1880/drone-data?gas=O2&dd=24&mm=12&yyyy=2024&last_rows=1&addr=02"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let source = HttpSource::new(
            "http://127.0.0.1:9/drone-data",
            Duration::from_millis(500),
            chrono_tz::Europe::Berlin,
            None,
        )
        .unwrap();
        let query = QueryParameters::new(
            Gas::Co2,
            SensorAddress::new(1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            1,
        );
        let error = source.fetch(&query).await.unwrap_err();
        assert!(matches!(error, ErrorValue::Request(_)));
    }
}
