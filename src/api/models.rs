//! Request bodies and response shapes of the job-fetch backend.
//!
//! Transaction records are passed through as delivered; the typed views only
//! name the fields, they never validate them.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::core::{ClientError, ClientResult};

/// Wire format for dates: `DD/MM/YYYY`
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn format_date_dmy(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Body of every date-range operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRangeBody {
    pub from: String,
    pub to: String,
    pub cookie: String,
}

impl DateRangeBody {
    pub fn new(from: NaiveDate, to: NaiveDate, cookie: impl Into<String>) -> Self {
        Self {
            from: format_date_dmy(from),
            to: format_date_dmy(to),
            cookie: cookie.into(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "from": self.from,
            "to": self.to,
            "cookie": self.cookie,
        })
    }
}

#[derive(Serialize)]
pub(crate) struct LoginBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Which data endpoint to read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Whatever the backend has cached for the range
    #[default]
    Cached,
    /// Discard the cache and return an empty result set
    ForceEmpty,
    /// Discard the cache and scrape the range again
    ForceRefresh,
}

impl FetchMode {
    pub fn endpoint(&self) -> &'static str {
        match self {
            FetchMode::Cached => "data-cached",
            FetchMode::ForceEmpty => "force-empty",
            FetchMode::ForceRefresh => "force-refresh",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FetchMode::Cached => "cached",
            FetchMode::ForceEmpty => "force-empty",
            FetchMode::ForceRefresh => "force-refresh",
        };
        write!(f, "{name}")
    }
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cached" | "data-cached" => Ok(FetchMode::Cached),
            "force-empty" => Ok(FetchMode::ForceEmpty),
            "force-refresh" => Ok(FetchMode::ForceRefresh),
            other => Err(format!(
                "unknown fetch mode '{other}', expected cached, force-empty or force-refresh"
            )),
        }
    }
}

/// Fields the backend may add beyond the ones named here, kept as delivered
pub type ExtraFields = serde_json::Map<String, JsonValue>;

/// Reply to `POST /start-fetch`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartFetchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// One transaction record, passed through untouched.
///
/// The accessors read the usual wire fields without requiring them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(pub JsonValue);

impl Transaction {
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(JsonValue::as_str)
    }

    pub fn date(&self) -> Option<&str> {
        self.text("tanggal_transaksi")
    }

    pub fn time(&self) -> Option<&str> {
        self.text("waktu_transaksi")
    }

    pub fn description(&self) -> Option<&str> {
        self.text("keterangan")
    }

    pub fn receipt_no(&self) -> Option<&str> {
        self.text("no_nota")
    }

    /// Amount as delivered; a number or a formatted string such as `"25.000"`
    pub fn amount(&self) -> Option<&JsonValue> {
        self.field("total_tagihan")
    }
}

/// Flat shape: `data` is the list of transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl TransactionsResponse {
    /// `total_transaksi` when the backend reports it as a count, else the record count
    pub fn total(&self) -> u64 {
        self.extra
            .get("total_transaksi")
            .and_then(JsonValue::as_u64)
            .unwrap_or_else(|| self.transactions().len() as u64)
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.data.as_deref().unwrap_or_default()
    }
}

/// Job-wrapped shape: `data` holds a [`TransactionsResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedTransactionsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub data: TransactionsResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Shape without any `data`, e.g. job state or an unauthorized payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Discriminator for [`DataResponse`], read from the type of the `data` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Flat,
    Nested,
    Status,
}

impl ResponseShape {
    pub fn of(value: &JsonValue) -> ClientResult<Self> {
        match value.get("data") {
            Some(JsonValue::Array(_)) => Ok(ResponseShape::Flat),
            Some(JsonValue::Object(_)) => Ok(ResponseShape::Nested),
            None | Some(JsonValue::Null) => Ok(ResponseShape::Status),
            Some(other) => Err(ClientError::Decode(format!(
                "unexpected `data` field: {other}"
            ))),
        }
    }
}

/// Reply of the data endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataResponse {
    Flat(TransactionsResponse),
    Nested(NestedTransactionsResponse),
    Status(StatusResponse),
}

impl DataResponse {
    pub fn from_value(value: JsonValue) -> ClientResult<Self> {
        let response = match ResponseShape::of(&value)? {
            ResponseShape::Flat => DataResponse::Flat(serde_json::from_value(value)?),
            ResponseShape::Nested => DataResponse::Nested(serde_json::from_value(value)?),
            ResponseShape::Status => DataResponse::Status(serde_json::from_value(value)?),
        };
        Ok(response)
    }

    pub fn shape(&self) -> ResponseShape {
        match self {
            DataResponse::Flat(_) => ResponseShape::Flat,
            DataResponse::Nested(_) => ResponseShape::Nested,
            DataResponse::Status(_) => ResponseShape::Status,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            DataResponse::Flat(flat) => flat.status.as_deref(),
            DataResponse::Nested(nested) => nested.status.as_deref(),
            DataResponse::Status(status) => status.status.as_deref(),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            DataResponse::Flat(flat) => flat.job_id.as_deref(),
            DataResponse::Nested(nested) => nested.job_id.as_deref(),
            DataResponse::Status(status) => status.job_id.as_deref(),
        }
    }

    /// Transactions carried by the response, whichever shape it has
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            DataResponse::Flat(flat) => flat.transactions(),
            DataResponse::Nested(nested) => nested.data.transactions(),
            DataResponse::Status(_) => &[],
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            DataResponse::Flat(flat) => flat.total(),
            DataResponse::Nested(nested) => nested.data.total(),
            DataResponse::Status(_) => 0,
        }
    }
}

impl<'de> Deserialize<'de> for DataResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        DataResponse::from_value(value).map_err(serde::de::Error::custom)
    }
}
