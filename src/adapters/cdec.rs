//! Client for the California Data Exchange Center (CDEC) JSON data servlet.
//!
//! Common sensor numbers: 1 river stage, 20 river discharge, 25 water
//! temperature, 41 mean daily flow, 70 pumping discharge, 100 electrical
//! conductivity.

use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const CDEC_JSON_URL: &str = "http://cdec.water.ca.gov/dynamicapp/req/JSONDataServlet";

/// CDEC reports missing observations with this value.
pub const CDEC_MISSING: f64 = -9999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum DurationCode {
    Daily,
    Hourly,
    Event,
    Monthly,
}

impl DurationCode {
    pub fn code(&self) -> &'static str {
        match self {
            DurationCode::Daily => "D",
            DurationCode::Hourly => "H",
            DurationCode::Event => "E",
            DurationCode::Monthly => "M",
        }
    }
}

impl fmt::Display for DurationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DurationCode {
    type Err = CalSimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "D" | "DAILY" => Ok(DurationCode::Daily),
            "H" | "HOURLY" => Ok(DurationCode::Hourly),
            "E" | "EVENT" => Ok(DurationCode::Event),
            "M" | "MONTHLY" => Ok(DurationCode::Monthly),
            other => Err(CalSimError::InvalidConfigValueError {
                field: "duration".to_string(),
                value: other.to_string(),
                reason: "Expected one of D, H, E, M".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdecQuery {
    pub stations: Vec<String>,
    pub sensor: u32,
    pub duration: DurationCode,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CdecQuery {
    pub fn new(stations: Vec<String>, sensor: u32, duration: DurationCode) -> Self {
        Self {
            stations,
            sensor,
            duration,
            start: NaiveDate::from_ymd_opt(1969, 10, 31).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2015, 9, 30).unwrap_or_default(),
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let stations: Vec<String> = self
            .stations
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if stations.is_empty() {
            return Err(CalSimError::MissingConfigError {
                field: "stations".to_string(),
            });
        }
        if self.start > self.end {
            return Err(CalSimError::validation(format!(
                "Start date {} is after end date {}",
                self.start, self.end
            )));
        }
        Ok(vec![
            ("Stations", stations.join(",")),
            ("SensorNums", self.sensor.to_string()),
            ("dur_code", self.duration.code().to_string()),
            ("Start", self.start.format("%Y-%m-%d").to_string()),
            ("End", self.end.format("%Y-%m-%d").to_string()),
        ])
    }
}

/// One row of the servlet's JSON "records" output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdecRecord {
    #[serde(rename = "stationId")]
    pub station_id: String,
    #[serde(rename = "durCode", default)]
    pub dur_code: String,
    #[serde(rename = "SENSOR_NUM")]
    pub sensor_num: u32,
    #[serde(rename = "sensorType", default)]
    pub sensor_type: String,
    pub date: String,
    #[serde(rename = "obsDate", default)]
    pub obs_date: String,
    pub value: Option<f64>,
    #[serde(rename = "dataFlag", default)]
    pub data_flag: String,
    #[serde(default)]
    pub units: String,
}

impl CdecRecord {
    pub fn observed_value(&self) -> Option<f64> {
        self.value.filter(|v| *v != CDEC_MISSING)
    }
}

pub struct CdecClient {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl CdecClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(Duration::from_secs(seconds));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query station data and return the servlet body as a JSON string.
    pub async fn fetch_raw(&self, query: &CdecQuery) -> Result<String> {
        let params = query.params()?;
        let mut request = self.client.get(&self.base_url).query(&params);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!("Making CDEC request to: {} {:?}", self.base_url, params);
        let response = request.send().await?;
        tracing::debug!("CDEC response status: {}", response.status());

        let body = response.error_for_status()?.text().await?;
        Ok(body.replace('\r', ""))
    }

    pub async fn fetch_records(&self, query: &CdecQuery) -> Result<Vec<CdecRecord>> {
        let body = self.fetch_raw(query).await?;
        let records: Vec<CdecRecord> = serde_json::from_str(&body)?;
        tracing::info!(
            "📡 Retrieved {} CDEC records for {}",
            records.len(),
            query.stations.join(",")
        );
        Ok(records)
    }
}

impl Default for CdecClient {
    fn default() -> Self {
        Self::new(CDEC_JSON_URL)
    }
}
