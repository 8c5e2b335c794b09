//! Normalize raw source lines into canonical LogEvents.
//!
//! JSON-object parsing is attempted first; failures fall back to a
//! line-oriented plaintext parser (leading timestamp, level token, optional
//! `[service]` override). Lines yielding no message are skipped and counted,
//! never fatal. Sources are independent and safe to normalize concurrently.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::types::{Level, LogEvent, LogSource, SourceDiagnostics};

/// Events plus accounting for one source.
#[derive(Debug)]
pub struct NormalizedSource {
  pub events: Vec<LogEvent>,
  pub diagnostics: SourceDiagnostics,
}

// Leading-timestamp shapes, tried in fixed priority order.
static TS_ISO: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
    .unwrap()
});
static TS_SYSLOG: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Z][a-z]{2}\s+\d{1,2}\s\d{2}:\d{2}:\d{2}").unwrap());

static LEVEL_TOKEN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)^\[?(trace|debug|info|notice|warn|warning|err|error|crit|critical|fatal)\]?:?\s+",
  )
  .unwrap()
});

static SERVICE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]\s]+)\]\s*").unwrap());

/// Parse a timestamp string, trying formats in fixed priority order:
/// RFC 3339, naive ISO-8601, `YYYY-MM-DD HH:MM:SS`, then syslog
/// `Mon DD HH:MM:SS` (year resolved to the current UTC year).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(Utc.from_utc_datetime(&naive));
    }
  }
  let with_year = format!("{} {}", Utc::now().year(), s);
  if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S") {
    return Some(Utc.from_utc_datetime(&naive));
  }
  None
}

/// Normalize one source. Ordering across sources is irrelevant downstream,
/// so callers may run several of these concurrently.
pub fn normalize_source(source: &LogSource) -> NormalizedSource {
  let declared_service = source.service.to_ascii_lowercase();
  let mut events = Vec::with_capacity(source.lines.len());
  let mut malformed: u64 = 0;
  // File-order fallback for lines with no resolvable timestamp.
  let mut last_timestamp: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

  for (seq, raw) in source.lines.iter().enumerate() {
    let parsed = parse_json_line(raw).or_else(|| parse_plain_line(raw));
    let Some(parsed) = parsed else {
      malformed += 1;
      continue;
    };

    let (timestamp, time_inferred) = match parsed.timestamp {
      Some(ts) => {
        last_timestamp = ts;
        (ts, false)
      }
      None => (last_timestamp, true),
    };

    events.push(LogEvent {
      id: format!("{}#{}", source.id, seq),
      timestamp,
      time_inferred,
      service: parsed
        .service
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| declared_service.clone()),
      level: parsed.level,
      message: parsed.message,
      source_ref: source.id.clone(),
      raw: raw.clone(),
    });
  }

  if malformed > 0 {
    debug!(source = %source.id, malformed, "skipped malformed lines");
  }

  NormalizedSource {
    diagnostics: SourceDiagnostics {
      source_id: source.id.clone(),
      lines_read: source.lines.len() as u64,
      events_normalized: events.len() as u64,
      malformed_count: malformed,
    },
    events,
  }
}

struct ParsedLine {
  timestamp: Option<DateTime<Utc>>,
  level: Level,
  message: String,
  service: Option<String>,
}

/// JSON-object path. Non-object JSON values fall through to the plaintext
/// parser; an object without a usable message is malformed.
fn parse_json_line(raw: &str) -> Option<ParsedLine> {
  let value: Value = serde_json::from_str(raw.trim()).ok()?;
  let obj = value.as_object()?;

  let message = ["message", "msg"]
    .iter()
    .find_map(|k| obj.get(*k).and_then(Value::as_str))
    .map(str::trim)
    .filter(|m| !m.is_empty())?
    .to_string();

  let timestamp = ["timestamp", "time", "ts"].iter().find_map(|k| {
    let v = obj.get(*k)?;
    match v {
      Value::String(s) => parse_timestamp(s),
      // Bare numbers are Unix seconds.
      Value::Number(n) => {
        let secs = n.as_f64()?;
        Utc.timestamp_opt(secs as i64, 0).single()
      }
      _ => None,
    }
  });

  let level = ["level", "severity"]
    .iter()
    .find_map(|k| obj.get(*k).and_then(Value::as_str))
    .map(Level::from_str_loose)
    .unwrap_or(Level::Unknown);

  let service = obj
    .get("service")
    .and_then(Value::as_str)
    .map(str::to_string);

  Some(ParsedLine {
    timestamp,
    level,
    message,
    service,
  })
}

/// Plaintext path: `<timestamp> <LEVEL> [service] message`, every part
/// optional except the message.
fn parse_plain_line(raw: &str) -> Option<ParsedLine> {
  let mut rest = raw.trim();
  if rest.is_empty() {
    return None;
  }

  let mut timestamp = None;
  for pattern in [&*TS_ISO, &*TS_SYSLOG] {
    if let Some(m) = pattern.find(rest) {
      if let Some(ts) = parse_timestamp(m.as_str()) {
        timestamp = Some(ts);
        rest = rest[m.end()..].trim_start();
        break;
      }
    }
  }

  let mut level = Level::Unknown;
  if let Some(caps) = LEVEL_TOKEN.captures(rest) {
    level = Level::from_str_loose(&caps[1]);
    rest = &rest[caps.get(0).unwrap().end()..];
  }

  let mut service = None;
  if let Some(caps) = SERVICE_TOKEN.captures(rest) {
    service = Some(caps[1].to_string());
    rest = &rest[caps.get(0).unwrap().end()..];
  }

  let message = rest.trim();
  if message.is_empty() {
    return None;
  }

  Some(ParsedLine {
    timestamp,
    level,
    message: message.to_string(),
    service,
  })
}
