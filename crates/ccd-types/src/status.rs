use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{geometry::SensorRect, CcdError, Result};

pub const CUR_IMAGE_TIME: &str = "curImageTime";
pub const STATUS_VAL: &str = "statusVal";
pub const COOLER_ON: &str = "coolerOn";

/// Camera state as reported by `statusVal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraStatus {
    NoImage,
    Idle,
    ExposureInProgress,
    Downloading,
    /// Any code the dashboard does not recognise.
    Error(i64),
}

impl CameraStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => CameraStatus::NoImage,
            1 => CameraStatus::Idle,
            2 => CameraStatus::ExposureInProgress,
            3 => CameraStatus::Downloading,
            other => CameraStatus::Error(other),
        }
    }

    /// Only exact integers, as JSON numbers or integer strings, are codes.
    /// Fractions and out-of-range numbers yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = match value {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        Some(Self::from_code(code))
    }

    pub fn label(self) -> String {
        match self {
            CameraStatus::NoImage => "No Image".into(),
            CameraStatus::Idle => "Ready / Idle".into(),
            CameraStatus::ExposureInProgress => "Exposure in Progress".into(),
            CameraStatus::Downloading => "Downloading".into(),
            CameraStatus::Error(code) => format!("Error, code={code}"),
        }
    }

    /// Whether a new capture may be triggered in this state.
    pub fn capture_allowed(self) -> bool {
        !matches!(
            self,
            CameraStatus::ExposureInProgress | CameraStatus::Downloading
        )
    }
}

/// One `/getData` response: a flat mapping of field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    fields: Map<String, Value>,
}

impl StatusSnapshot {
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| CcdError::Payload(format!("invalid JSON: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(CcdError::Payload(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn subframe(&self) -> Option<SensorRect> {
        self.rect("subFrameOrigin", "subFrameSize")
    }

    pub fn roi(&self) -> Option<SensorRect> {
        self.rect("roiOrigin", "roiSize")
    }

    fn rect(&self, origin: &str, size: &str) -> Option<SensorRect> {
        Some(SensorRect::new(
            self.int(&format!("{origin}X"))?,
            self.int(&format!("{origin}Y"))?,
            self.int(&format!("{size}X"))?,
            self.int(&format!("{size}Y"))?,
        ))
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(as_i64)
    }
}

/// Integers may arrive as JSON numbers or as numeric strings.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_map_to_labels() {
        let labels: Vec<String> = (0..4).map(|c| CameraStatus::from_code(c).label()).collect();
        assert_eq!(
            labels,
            vec![
                "No Image",
                "Ready / Idle",
                "Exposure in Progress",
                "Downloading"
            ]
        );
        assert!(CameraStatus::from_code(-1).label().contains("-1"));
        assert!(CameraStatus::from_code(42).label().contains("42"));
    }

    #[test]
    fn capture_disabled_while_busy() {
        for code in -2..8 {
            let allowed = CameraStatus::from_code(code).capture_allowed();
            assert_eq!(allowed, !(code == 2 || code == 3), "code {code}");
        }
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(StatusSnapshot::parse("[1, 2]").is_err());
        assert!(StatusSnapshot::parse("not json").is_err());
        assert!(StatusSnapshot::parse("{}").is_ok());
    }

    #[test]
    fn geometry_requires_all_fields() {
        let snapshot = StatusSnapshot::from_value(json!({
            "subFrameOriginX": 10,
            "subFrameOriginY": "20",
            "subFrameSizeX": 300.0,
            "subFrameSizeY": 200,
            "roiOriginX": 5,
            "roiOriginY": 5,
            "roiSizeX": 50,
        }))
        .expect("object");
        assert_eq!(snapshot.subframe(), Some(SensorRect::new(10, 20, 300, 200)));
        assert_eq!(snapshot.roi(), None);
    }

    #[test]
    fn status_value_must_be_an_exact_integer() {
        assert_eq!(
            CameraStatus::from_value(&json!(2)),
            Some(CameraStatus::ExposureInProgress)
        );
        assert_eq!(CameraStatus::from_value(&json!(" 3 ")), Some(CameraStatus::Downloading));
        assert_eq!(CameraStatus::from_value(&json!(-4)), Some(CameraStatus::Error(-4)));
        assert_eq!(CameraStatus::from_value(&json!(2.5)), None);
        assert_eq!(CameraStatus::from_value(&json!("2.0")), None);
        assert_eq!(CameraStatus::from_value(&json!(u64::MAX)), None);
        assert_eq!(CameraStatus::from_value(&json!(true)), None);
    }
}
