//! Control commands pushed from the dashboard to the vehicle.
//!
//! A command is a name plus an open set of extra fields. On the wire the name
//! and the fields share one flat object: `{"command": "manual", "direction":
//! "forward", "speed": 150}`. Command names are not validated here; the vehicle
//! decides what it understands.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const COMMAND_KEY: &str = "command";

/// A control command with arbitrary extra fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    data: Map<String, Value>,
}

impl Command {
    /// Create a command with no extra fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Map::new(),
        }
    }

    /// Create a command from a name and a prepared field map.
    pub fn with_data(name: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Add an extra field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Manual drive: a direction from the drive pad and a motor speed.
    pub fn manual(direction: Direction, speed: u32) -> Self {
        Self::new("manual")
            .with("direction", direction.as_str())
            .with("speed", speed)
    }

    /// Halt the vehicle.
    pub fn stop() -> Self {
        Self::new("stop")
    }

    /// Set the autonomous-drive target in arena coordinates.
    pub fn set_target(x: f64, y: f64) -> Self {
        Self::new("setTarget").with("x", x).with("y", y)
    }

    /// Begin driving toward the current target.
    pub fn start() -> Self {
        Self::new("start")
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extra fields.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Look up a single extra field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

// The name is written first; an explicit "command" entry in `data` wins, the
// same way a later key wins in an object spread.
impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.data.len() + 1))?;
        match self.data.get(COMMAND_KEY) {
            Some(overridden) => map.serialize_entry(COMMAND_KEY, overridden)?,
            None => map.serialize_entry(COMMAND_KEY, &self.name)?,
        }
        for (key, value) in &self.data {
            if key != COMMAND_KEY {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut data = Map::<String, Value>::deserialize(deserializer)?;
        let name = match data.remove(COMMAND_KEY) {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "command must be a string, got: {other}"
                )));
            }
            None => return Err(de::Error::missing_field(COMMAND_KEY)),
        };
        Ok(Self { name, data })
    }
}

/// Drive-pad direction for manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "stop" => Ok(Direction::Stop),
            _ => Err(DirectionParseError(s.to_string())),
        }
    }
}

/// Error parsing a drive direction.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown direction: {0}")]
pub struct DirectionParseError(String);
