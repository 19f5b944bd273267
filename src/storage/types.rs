//! Record kinds and on-disk naming.
//!
//! - Metrics snapshots: `<metrics_dir>/metrics_YYYYMMDD_HHMMSS_mmm.json`,
//!   one file per capture instant.
//! - Log lines: `<logs_dir>/log_YYYYMMDD.txt`, one file per day, each line
//!   formatted as `[HH:MM:SS] message`.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Kind of record handed to local persistence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RecordKind {
    /// Serialized snapshot; create-or-truncate, one file per record.
    Metrics,
    /// Plaintext log line; appended to the daily log file.
    ErrorLog,
}

/// File name for a metrics snapshot captured at `ts`.
///
/// `attempt` disambiguates names that already exist on disk; zero means
/// no suffix.
pub fn metrics_file_name<Tz: TimeZone>(ts: &DateTime<Tz>, attempt: u32) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = ts.format("%Y%m%d_%H%M%S_%3f");
    if attempt == 0 {
        format!("metrics_{stamp}.json")
    } else {
        format!("metrics_{stamp}-{attempt}.json")
    }
}

/// File name of the daily log that receives lines written at `ts`.
pub fn log_file_name<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("log_{}.txt", ts.format("%Y%m%d"))
}

/// Format a single log line, newline included.
pub fn format_log_line<Tz: TimeZone>(ts: &DateTime<Tz>, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}\n", ts.format("%H:%M:%S"), message.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_record_kind_from_str() {
        assert_eq!(RecordKind::from_str("metrics").unwrap(), RecordKind::Metrics);
        assert_eq!(RecordKind::from_str("error_log").unwrap(), RecordKind::ErrorLog);
        assert_eq!(RecordKind::from_str("ERROR_LOG").unwrap(), RecordKind::ErrorLog);
        assert!(RecordKind::from_str("events").is_err());
    }

    #[test]
    fn test_record_kind_as_str() {
        assert_eq!(RecordKind::Metrics.as_ref(), "metrics");
        assert_eq!(RecordKind::ErrorLog.to_string(), "error_log");
    }

    #[test]
    fn test_metrics_file_name() {
        assert_eq!(metrics_file_name(&ts(), 0), "metrics_20240309_070502_042.json");
        assert_eq!(metrics_file_name(&ts(), 2), "metrics_20240309_070502_042-2.json");
    }

    #[test]
    fn test_log_file_name_and_line() {
        assert_eq!(log_file_name(&ts()), "log_20240309.txt");
        assert_eq!(
            format_log_line(&ts(), "Data collection started\n"),
            "[07:05:02] Data collection started\n"
        );
    }
}
