//! Vehicle telemetry snapshots.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The latest known vehicle state.
///
/// Every field is optional: `None` means the vehicle has not reported it, which
/// is different from reporting zero. Snapshots are replaced whole on every
/// telemetry frame, so a field missing from the newest frame is `None` even if
/// an earlier frame carried it.
///
/// Numeric fields accept JSON numbers or numeric strings. Anything else
/// (`null`, booleans, non-numeric text) reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub x_position: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub y_position: Option<f64>,
    /// Degrees, counter-clockwise from the +x axis.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Centimetres to the nearest obstacle ahead.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub distance_front: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub distance_left: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub distance_right: Option<f64>,
}

/// Which range sensor reported an obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleSide {
    Front,
    Left,
    Right,
}

impl TelemetrySnapshot {
    /// Reported position, if both coordinates are known.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.x_position?, self.y_position?))
    }

    /// Planar distance from the reported position to `(x, y)`.
    pub fn distance_to(&self, x: f64, y: f64) -> Option<f64> {
        let (px, py) = self.position()?;
        Some((px - x).hypot(py - y))
    }

    /// The closest reported obstacle.
    pub fn nearest_obstacle(&self) -> Option<(ObstacleSide, f64)> {
        [
            (ObstacleSide::Front, self.distance_front),
            (ObstacleSide::Left, self.distance_left),
            (ObstacleSide::Right, self.distance_right),
        ]
        .into_iter()
        .filter_map(|(side, d)| d.map(|d| (side, d)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }))
}
