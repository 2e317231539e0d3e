use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use tracing::warn;

/// Deserialize an array field, treating `null` as empty
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Deserialize a string field, treating `null` as empty
pub(crate) fn deserialize_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// gzip magic number
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress gzip data
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Turn a downloaded body into text, inflating it first if it is gzip
pub fn decode_body(data: &[u8]) -> Result<String, std::io::Error> {
    let bytes = if data.starts_with(&GZIP_MAGIC) {
        decompress_gzip(data)?
    } else {
        data.to_vec()
    };
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// 32-bit string hash over UTF-16 code units (`h = 31 * h + c`, wrapping)
fn string_hash(data: &str) -> i32 {
    data.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Weak, fast hash: eight hex digits of the string hash followed by eight of its length
pub fn compute_weak_hash(data: &str) -> String {
    format!("{:08x}{:08x}", string_hash(data) as u32, data.len() as u32)
}

/// Cache file name for a data-file URL
pub fn cache_key_for_url(url: &str) -> String {
    format!("{}.json", compute_weak_hash(url.trim()))
}

/// Import fingerprint accumulator.
///
/// Each field is written as `label` + value so that moving a value from one
/// field to a neighbouring one still changes the digest.
#[derive(Default)]
pub struct Fingerprint {
    hasher: blake3::Hasher,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, label: &str, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        self.hasher.update(label.as_bytes());
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn number(self, label: &str, value: impl ToString) -> Self {
        self.field(label, value.to_string())
    }

    pub fn list<I, S>(mut self, label: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for v in values {
            self = self.field(label, v);
        }
        self
    }

    pub fn finish(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// Lower-case, collapse every run of non-alphanumerics into `-`, trim dashes
pub fn sanitize_id(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = true;
    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Parse an RFC3339 / ISO-8601 timestamp (or a plain millis number) into epoch millis.
///
/// Unparsable input yields 0 and a warning.
pub fn parse_timestamp_millis(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
        serde_json::Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return dt.timestamp_millis();
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Utc.from_utc_datetime(&naive).timestamp_millis();
            }
            if let Ok(millis) = s.parse::<i64>() {
                return millis;
            }
            warn!("[Parser] unparsable timestamp {:?}, using 0", s);
            0
        }
        _ => 0,
    }
}

/// Format a UTC instant as an RFC1123 HTTP date
pub fn format_http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Validate an RFC1123 HTTP date and normalize it; `None` when malformed
pub fn normalize_http_date(value: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| format_http_date(dt.with_timezone(&Utc)))
}

/// Current time in epoch millis
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn weak_hash_matches_known_values() {
        // "" hashes to 0, "a" to 97
        assert_eq!(compute_weak_hash(""), "0000000000000000");
        assert_eq!(compute_weak_hash("a"), "0000006100000001");
        assert_eq!(
            cache_key_for_url("  https://example.com/a.json "),
            cache_key_for_url("https://example.com/a.json")
        );
    }

    #[test]
    fn fingerprint_is_deterministic_and_label_sensitive() {
        let a = Fingerprint::new().field("title", "x").field("url", "y").finish();
        let b = Fingerprint::new().field("title", "x").field("url", "y").finish();
        let c = Fingerprint::new().field("title", "xy").field("url", "").finish();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sanitize_collapses_punctuation() {
        assert_eq!(sanitize_id("  Android: Keynote!! "), "android-keynote");
        assert_eq!(sanitize_id("1403679600000-1403683200000"), "1403679600000-1403683200000");
        assert_eq!(sanitize_id("***"), "");
    }

    #[test]
    fn parses_iso_and_numeric_timestamps() {
        let v = serde_json::json!("2014-06-25T16:00:00Z");
        assert_eq!(parse_timestamp_millis(&v), 1_403_712_000_000);
        let v = serde_json::json!("2014-06-25T16:00:00");
        assert_eq!(parse_timestamp_millis(&v), 1_403_712_000_000);
        assert_eq!(parse_timestamp_millis(&serde_json::json!(42)), 42);
        assert_eq!(parse_timestamp_millis(&serde_json::json!("soon")), 0);
    }

    #[test]
    fn http_date_validation() {
        assert_eq!(
            normalize_http_date("Sun, 06 Nov 1994 08:49:37 GMT").as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert_eq!(normalize_http_date("yesterday"), None);
    }

    #[test]
    fn decode_body_inflates_gzip() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(br#"{"rooms":[]}"#).unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(decode_body(&gz).unwrap(), r#"{"rooms":[]}"#);
        assert_eq!(decode_body(b"plain").unwrap(), "plain");
    }
}
