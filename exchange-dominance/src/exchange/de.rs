use super::RawBar;
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de::Error};
use serde_json::Value;

/// Deserialise an `f64` that venues encode either as a JSON number or a numeric string.
pub fn de_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value).ok_or_else(|| Error::custom(format!("expected numeric value, got {value}")))
}

/// As [`de_flexible_f64`], mapping `null` and empty strings to `None`.
pub fn de_opt_flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(value) => value_to_f64(&value)
            .map(Some)
            .ok_or_else(|| Error::custom(format!("expected numeric value, got {value}"))),
    }
}

/// Read a numeric [`Value`] that may be encoded as a string.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Read an epoch timestamp [`Value`] in milliseconds.
pub fn value_to_datetime_ms(value: &Value) -> Option<DateTime<Utc>> {
    value_to_f64(value).and_then(|millis| DateTime::from_timestamp_millis(millis as i64))
}

/// Read an epoch timestamp [`Value`] in seconds.
pub fn value_to_datetime_secs(value: &Value) -> Option<DateTime<Utc>> {
    value_to_f64(value).and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

/// Unit of the timestamp column of an OHLCV row.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EpochUnit {
    Millis,
    Secs,
}

/// Column positions of an array encoded OHLCV row.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BarLayout {
    pub time: usize,
    pub unit: EpochUnit,
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
}

impl BarLayout {
    /// `[time, open, high, low, close, volume, ..]` - the most common layout.
    pub const fn standard(unit: EpochUnit) -> Self {
        Self {
            time: 0,
            unit,
            open: 1,
            high: 2,
            low: 3,
            close: 4,
            volume: 5,
        }
    }

    /// Parse every row, returning the bars sorted oldest first.
    pub fn parse_rows(&self, rows: &[Vec<Value>]) -> Result<Vec<RawBar>, ApiError> {
        let mut bars = rows
            .iter()
            .map(|row| {
                self.parse_row(row)
                    .ok_or_else(|| ApiError::Malformed(format!("unexpected OHLCV row: {row:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        bars.sort_by_key(|bar| bar.open_time);
        Ok(bars)
    }

    fn parse_row(&self, row: &[Value]) -> Option<RawBar> {
        let number = |index: usize| row.get(index).and_then(value_to_f64);
        let time = row.get(self.time)?;

        Some(RawBar {
            open_time: match self.unit {
                EpochUnit::Millis => value_to_datetime_ms(time)?,
                EpochUnit::Secs => value_to_datetime_secs(time)?,
            },
            open: number(self.open)?,
            high: number(self.high)?,
            low: number(self.low)?,
            close: number(self.close)?,
            volume: number(self.volume)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_layout_parse_rows() {
        let rows: Vec<Vec<Value>> = serde_json::from_str(
            r#"[
                ["1700086400", "11", "13", "10", "12", "200"],
                [1700000000, 10, 12, 9, 11, 100]
            ]"#,
        )
        .unwrap();

        let bars = BarLayout::standard(EpochUnit::Secs).parse_rows(&rows).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open_time.timestamp(), 1_700_000_000);
        assert_eq!(bars[0].volume, 100.0);
        assert_eq!(bars[1].close, 12.0);

        let truncated: Vec<Vec<Value>> = serde_json::from_str(r#"[[1700000000, 10, 12]]"#).unwrap();
        assert!(matches!(
            BarLayout::standard(EpochUnit::Secs).parse_rows(&truncated),
            Err(ApiError::Malformed(_))
        ));
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "de_flexible_f64")]
        value: f64,
        #[serde(default, deserialize_with = "de_opt_flexible_f64")]
        optional: Option<f64>,
    }

    #[test]
    fn test_de_flexible_f64() {
        struct TestCase {
            input: &'static str,
            expected: Option<(f64, Option<f64>)>,
        }

        let tests = vec![
            TestCase {
                // TC0: numeric string
                input: r#"{"value": "1.5", "optional": "2"}"#,
                expected: Some((1.5, Some(2.0))),
            },
            TestCase {
                // TC1: JSON numbers
                input: r#"{"value": 3, "optional": 0.25}"#,
                expected: Some((3.0, Some(0.25))),
            },
            TestCase {
                // TC2: missing, null & empty optional
                input: r#"{"value": "4"}"#,
                expected: Some((4.0, None)),
            },
            TestCase {
                // TC3: empty string optional
                input: r#"{"value": "4", "optional": ""}"#,
                expected: Some((4.0, None)),
            },
            TestCase {
                // TC4: non numeric string is rejected
                input: r#"{"value": "abc"}"#,
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<Sample>(test.input)
                .ok()
                .map(|sample| (sample.value, sample.optional));
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_value_to_datetime() {
        let millis = value_to_datetime_ms(&Value::from(1_700_000_000_000_i64)).unwrap();
        let secs = value_to_datetime_secs(&Value::from("1700000000")).unwrap();
        assert_eq!(millis, secs);
    }
}
