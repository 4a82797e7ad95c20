use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// One booking row as served by the PMS API. Never mutated here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PmsBooking {
    pub booking_id: String,
    #[serde(default)]
    pub ota_booking_id: Option<String>,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub guest_last_name: Option<String>,
    #[serde(default)]
    pub guest_first_name: Option<String>,
    #[serde(default)]
    pub registered_name: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub check_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub check_out_date: Option<NaiveDate>,
    #[serde(default)]
    pub nights: Option<i64>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub customer_remarks: Option<String>,
    #[serde(default)]
    pub deposit_paid: Option<f64>,
    #[serde(default)]
    pub room_total: Option<f64>,
    #[serde(default)]
    pub rooms: Vec<RoomLine>,
    #[serde(default)]
    pub room_numbers: Vec<String>,
    /// Room-assignment history (ASSIGN_DT rows) used by the status resolver.
    #[serde(default)]
    pub assignments: Vec<AssignmentTransition>,
}

impl PmsBooking {
    pub fn ota_reference(&self) -> Option<&str> {
        self.ota_booking_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoomLine {
    #[serde(default, alias = "ROOM_TYPE_CODE")]
    pub room_type_code: Option<String>,
    #[serde(default, alias = "ROOM_TYPE_NAME")]
    pub room_type_name: Option<String>,
    #[serde(default, alias = "ROOM_COUNT")]
    pub room_count: Option<i64>,
    #[serde(default)]
    pub adult_count: Option<i64>,
    #[serde(default)]
    pub child_count: Option<i64>,
    #[serde(default)]
    pub rent_amount: Option<f64>,
    #[serde(default)]
    pub room_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AssignmentTransition {
    #[serde(alias = "STATUS_COD")]
    pub status_code: String,
    #[serde(default, alias = "BEGIN_DAT")]
    pub begin_date: Option<NaiveDate>,
    #[serde(default, alias = "ROOM_NOS")]
    pub room_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PmsSearchQuery {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub booking_id: Option<String>,
}

/// Every variant means "provider unavailable"; callers degrade instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum PmsError {
    #[error("PMS_API_BASE_URL is not configured")]
    NotConfigured,
    #[error("PMS request timed out")]
    Timeout,
    #[error("PMS request failed: {0}")]
    Request(String),
    #[error("PMS returned status {0}")]
    Status(u16),
    #[error("PMS response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct PmsEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
}

impl PmsEnvelope {
    /// A reply flagged `success: false` carries no usable rows, whatever `data` holds.
    fn into_data(self) -> Result<Value, PmsError> {
        if !self.success {
            tracing::warn!("PMS reply flagged success=false");
            return Err(PmsError::Decode("reply flagged success=false".to_string()));
        }
        Ok(self.data)
    }
}

#[derive(Clone)]
pub struct PmsClient {
    http: Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl PmsClient {
    pub fn new(http: Client, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Check-in list for the local day `offset` days from today (0 = today, -1 = yesterday).
    pub async fn checkin_by_offset(&self, offset: i64) -> Result<Vec<PmsBooking>, PmsError> {
        let mut url = self.endpoint(&["bookings", "checkin-by-date"])?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string());
        let data = self.fetch(url).await?.into_data()?;
        Ok(parse_booking_rows(&data))
    }

    pub async fn search(&self, query: &PmsSearchQuery) -> Result<Vec<PmsBooking>, PmsError> {
        let mut url = self.endpoint(&["bookings", "search"])?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in [
                ("name", &query.name),
                ("phone", &query.phone),
                ("booking_id", &query.booking_id),
            ] {
                if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                    pairs.append_pair(key, value);
                }
            }
        }
        let data = self.fetch(url).await?.into_data()?;
        Ok(parse_booking_rows(&data))
    }

    /// `Ok(None)` when the PMS has no such booking.
    pub async fn booking(&self, booking_id: &str) -> Result<Option<PmsBooking>, PmsError> {
        let url = self.endpoint(&["bookings", booking_id.trim()])?;
        let data = match self.fetch(url).await {
            Ok(envelope) => envelope.into_data()?,
            Err(PmsError::Status(404)) => return Ok(None),
            Err(error) => return Err(error),
        };
        if data.is_null() {
            return Ok(None);
        }
        Ok(parse_booking_row(&data))
    }

    pub async fn ping(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else {
            return false;
        };
        matches!(
            self.http.get(url).timeout(self.timeout).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PmsError> {
        let base = self.base_url.as_deref().ok_or(PmsError::NotConfigured)?;
        let mut url = Url::parse(base).map_err(|e| PmsError::Request(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| PmsError::Request("PMS base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<PmsEnvelope, PmsError> {
        let resp = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %url, "PMS request failed");
                if e.is_timeout() {
                    PmsError::Timeout
                } else {
                    PmsError::Request(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PmsError::Status(404));
        }
        if !status.is_success() {
            tracing::warn!(status = %status, url = %url, "PMS returned non-success status");
            return Err(PmsError::Status(status.as_u16()));
        }

        resp.json::<PmsEnvelope>().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "PMS response body could not be decoded");
            PmsError::Decode(e.to_string())
        })
    }
}

/// Decode rows one by one so a single malformed row never drops the batch.
pub fn parse_booking_rows(data: &Value) -> Vec<PmsBooking> {
    let rows = match data {
        Value::Array(rows) => rows.as_slice(),
        // Some PMS endpoints wrap the list: { "bookings": [...] }
        Value::Object(obj) => match obj.get("bookings") {
            Some(Value::Array(rows)) => rows.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    rows.iter().filter_map(parse_booking_row).collect()
}

fn parse_booking_row(row: &Value) -> Option<PmsBooking> {
    match serde_json::from_value::<PmsBooking>(row.clone()) {
        Ok(booking) if !booking.booking_id.trim().is_empty() => Some(booking),
        Ok(_) => {
            tracing::warn!("Skipping PMS row without booking_id");
            None
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                booking_id = row.get("booking_id").and_then(|v| v.as_str()).unwrap_or(""),
                "Skipping malformed PMS row"
            );
            None
        }
    }
}
