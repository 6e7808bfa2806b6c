use crate::time::{chile_today, format_chile};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Day strings written by the earliest deployments, e.g. `Mon Mar 10 2025`.
const LEGACY_DAY_FORMAT: &str = "%a %b %d %Y";

/// The counter state as the rest of the crate sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub dias_sin_accidentes: u64,
    pub ultima_actualizacion: DateTime<Utc>,
    pub last_run_chile_date: NaiveDate,
    pub record_anterior: Option<u64>,
    /// Fields written by other readers of the file, carried through untouched.
    pub extra: Map<String, Value>,
}

impl CounterRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            dias_sin_accidentes: 0,
            ultima_actualizacion: now,
            last_run_chile_date: chile_today(now),
            record_anterior: None,
            extra: Map::new(),
        }
    }
}

/// On-disk layout of the data file.
///
/// Only the count is strictly typed. The other fields are kept as raw JSON so
/// that a single odd value from an older revision cannot make the whole file
/// unreadable; [`StoredRecord::migrate`] interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub dias_sin_accidentes: Option<u64>,
    pub ultima_actualizacion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_chile_date: Option<Value>,
    /// Mirror of `lastRunChileDate` kept for older readers of the same file.
    pub ultimo_incremento: Option<Value>,
    pub record_anterior: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// No usable `lastRunChileDate`; the rollover day lives in `ultimoIncremento`, if anywhere.
    Legacy,
    Current,
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub from: SchemaVersion,
    pub record: CounterRecord,
    /// True when the canonical record differs from what was read and must be rewritten.
    pub rewritten: bool,
}

impl StoredRecord {
    pub fn schema_version(&self) -> SchemaVersion {
        match self.last_run_chile_date.as_ref().and_then(parse_date) {
            Some(_) => SchemaVersion::Current,
            None => SchemaVersion::Legacy,
        }
    }

    pub fn migrate(self, now: DateTime<Utc>) -> Migration {
        let from = self.schema_version();
        let mut rewritten = from == SchemaVersion::Legacy;

        let last_run_chile_date = match from {
            SchemaVersion::Current => self.last_run_chile_date.as_ref().and_then(parse_date),
            SchemaVersion::Legacy => self.ultimo_incremento.as_ref().and_then(parse_legacy_day),
        }
        .unwrap_or_else(|| chile_today(now));

        let ultima_actualizacion = match self.ultima_actualizacion.as_ref().and_then(parse_instant)
        {
            Some((instant, canonical)) => {
                rewritten |= !canonical;
                instant
            }
            None => {
                rewritten = true;
                now
            }
        };

        let dias_sin_accidentes = self.dias_sin_accidentes.unwrap_or_else(|| {
            rewritten = true;
            0
        });

        let record_anterior = match &self.record_anterior {
            None | Some(Value::Null) => None,
            Some(value) => {
                rewritten |= value.as_u64().is_none();
                parse_non_negative(value)
            }
        };

        Migration {
            from,
            record: CounterRecord {
                dias_sin_accidentes,
                ultima_actualizacion,
                last_run_chile_date,
                record_anterior,
                extra: self.extra,
            },
            rewritten,
        }
    }
}

impl From<&CounterRecord> for StoredRecord {
    fn from(record: &CounterRecord) -> Self {
        let date = Value::String(record.last_run_chile_date.format(DATE_FORMAT).to_string());
        Self {
            dias_sin_accidentes: Some(record.dias_sin_accidentes),
            ultima_actualizacion: Some(Value::String(format_instant(record.ultima_actualizacion))),
            last_run_chile_date: Some(date.clone()),
            ultimo_incremento: Some(date),
            record_anterior: record.record_anterior.map(Value::from),
            extra: record.extra.clone(),
        }
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.as_str()?.trim(), DATE_FORMAT).ok()
}

/// Accepts RFC 3339 strings and epoch milliseconds; the flag is false for the latter.
fn parse_instant(value: &Value) -> Option<(DateTime<Utc>, bool)> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|parsed| (parsed.with_timezone(&Utc), true)),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|instant| (instant, false)),
        _ => None,
    }
}

fn parse_legacy_day(value: &Value) -> Option<NaiveDate> {
    if let Some((instant, _)) = parse_instant(value) {
        return Some(chile_today(instant));
    }
    let raw = value.as_str()?.trim();
    parse_date(value).or_else(|| NaiveDate::parse_from_str(raw, LEGACY_DAY_FORMAT).ok())
}

pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a non-negative whole number sent either as a JSON number or a string.
///
/// Strings are read like the admin page has always sent them: leading
/// whitespace and an optional `+` are skipped and the leading digits are used,
/// so `"3.5"` is 3 and `"12 días"` is 12.
pub fn parse_non_negative(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(text) => {
            let text = text.trim_start();
            let text = text.strip_prefix('+').unwrap_or(text);
            let end = text
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(text.len());
            text[..end].parse().ok()
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub password: Option<String>,
    pub dias: Option<Value>,
    pub record_anterior: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterView {
    pub dias_sin_accidentes: u64,
    pub ultima_actualizacion: String,
    pub ultima_actualizacion_formatted: String,
    pub record_anterior: Option<u64>,
}

impl From<&CounterRecord> for CounterView {
    fn from(record: &CounterRecord) -> Self {
        Self {
            dias_sin_accidentes: record.dias_sin_accidentes,
            ultima_actualizacion: format_instant(record.ultima_actualizacion),
            ultima_actualizacion_formatted: format_chile(record.ultima_actualizacion),
            record_anterior: record.record_anterior,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CounterResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: CounterView,
}
