//! Report records and export formats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::analytics::{
    AggregatedValue, AppointmentLogEntry, MetricValue, RevenueRow, ServiceUsageRow,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported export format '{0}' (expected excel, pdf or word)")]
pub struct UnsupportedFormat(pub String);

/// Output format of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Spreadsheet,
    Pdf,
    Document,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Spreadsheet => "xlsx",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Document => "docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Document => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl FromStr for ReportFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ReportFormat::Spreadsheet),
            "pdf" => Ok(ReportFormat::Pdf),
            "word" | "docx" => Ok(ReportFormat::Document),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

/// A single field value in a report record.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Timestamp(DateTime<Utc>),
    Null,
}

/// Timestamp text used in every export format, e.g. `2025-03-01T09:30:00.000Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl CellValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Integer(n) => serde_json::Value::from(*n),
            CellValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Timestamp(ts) => serde_json::Value::String(format_timestamp(ts)),
            CellValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<MetricValue> for CellValue {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Count(n) => CellValue::Integer(n),
            MetricValue::Amount(a) => CellValue::Decimal(a),
        }
    }
}

/// A flat record with fields in their natural order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRecord {
    fields: Vec<(String, CellValue)>,
}

impl ReportRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: CellValue) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, CellValue)] {
        &self.fields
    }

    /// Compact JSON object with keys in field order.
    pub fn to_json_line(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}:{}",
                    serde_json::Value::String(k.clone()),
                    v.to_json()
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{}}}", body)
    }
}

/// Conversion of a result row into a report record.
pub trait ToReportRecord {
    fn to_report_record(&self) -> ReportRecord;
}

impl ToReportRecord for AggregatedValue {
    fn to_report_record(&self) -> ReportRecord {
        ReportRecord::new()
            .field("label", CellValue::Text(self.label.clone()))
            .field("value", self.value.into())
    }
}

impl ToReportRecord for AppointmentLogEntry {
    fn to_report_record(&self) -> ReportRecord {
        ReportRecord::new()
            .field("created_at", CellValue::Timestamp(self.created_at))
            .field("staff", CellValue::Text(self.staff.clone()))
            .field("procedure_type", CellValue::Text(self.procedure_type.clone()))
            .field("status", CellValue::Text(self.status.clone()))
    }
}

impl ToReportRecord for RevenueRow {
    fn to_report_record(&self) -> ReportRecord {
        ReportRecord::new()
            .field("role", CellValue::Text(self.role.clone()))
            .field("method", CellValue::Text(self.method.clone()))
            .field("total_revenue", CellValue::Decimal(self.total_revenue))
    }
}

impl ToReportRecord for ServiceUsageRow {
    fn to_report_record(&self) -> ReportRecord {
        ReportRecord::new()
            .field("service_name", CellValue::Text(self.service_name.clone()))
            .field("role", CellValue::Text(self.role.clone()))
            .field("usage_count", CellValue::Integer(self.usage_count))
    }
}

pub fn to_records<T: ToReportRecord>(rows: &[T]) -> Vec<ReportRecord> {
    rows.iter().map(ToReportRecord::to_report_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_tokens() {
        assert_eq!("excel".parse::<ReportFormat>().unwrap(), ReportFormat::Spreadsheet);
        assert_eq!("XLSX".parse::<ReportFormat>().unwrap(), ReportFormat::Spreadsheet);
        assert_eq!("pdf".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert_eq!("word".parse::<ReportFormat>().unwrap(), ReportFormat::Document);
        assert_eq!(
            "csv".parse::<ReportFormat>().unwrap_err(),
            UnsupportedFormat("csv".to_string())
        );
    }

    #[test]
    fn test_json_line_preserves_field_order() {
        let record = ReportRecord::new()
            .field("staff", CellValue::Text("dr.chipo".to_string()))
            .field("count", CellValue::Integer(25))
            .field("avg", CellValue::Decimal(1.5))
            .field("note", CellValue::Null);
        assert_eq!(
            record.to_json_line(),
            r#"{"staff":"dr.chipo","count":25,"avg":1.5,"note":null}"#
        );
    }

    #[test]
    fn test_json_line_escapes_text() {
        let record = ReportRecord::new().field("name", CellValue::Text("say \"hi\"".to_string()));
        assert_eq!(record.to_json_line(), r#"{"name":"say \"hi\""}"#);
    }

    #[test]
    fn test_appointment_entry_record() {
        let entry = AppointmentLogEntry {
            created_at: Utc.with_ymd_and_hms(2025, 7, 1, 9, 30, 0).unwrap(),
            staff: "dr.chipo".to_string(),
            procedure_type: "Dental".to_string(),
            status: "completed".to_string(),
        };
        let record = entry.to_report_record();
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["created_at", "staff", "procedure_type", "status"]
        );
        assert!(record.to_json_line().starts_with(r#"{"created_at":"2025-07-01T09:30:00.000Z""#));
    }

    #[test]
    fn test_aggregated_value_record() {
        let record = AggregatedValue::amount("doctor/online", 120.0).to_report_record();
        assert_eq!(record.get("value"), Some(&CellValue::Decimal(120.0)));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_non_finite_decimal_is_null() {
        assert_eq!(CellValue::Decimal(f64::NAN).to_json(), serde_json::Value::Null);
    }
}
