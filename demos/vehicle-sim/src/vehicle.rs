//! Vehicle state and simulation.

use anyhow::{Context, bail};
use serde_json::Value;
use teleop_core::{Command, Direction, TelemetrySnapshot};

/// Half the side of the square arena, in metres. The origin is the centre.
const ARENA: f64 = 5.0;
/// Top speed at full motor duty, m/s.
const MAX_SPEED: f64 = 1.2;
/// Speed used when driving to a target on its own.
const CRUISE_SPEED: f64 = 0.6;
/// Degrees per second when turning.
const TURN_RATE: f64 = 90.0;
/// Ultrasonic sensor range, centimetres.
const SENSOR_RANGE: f64 = 400.0;
/// Close enough to count as arrived, metres.
const ARRIVAL_RADIUS: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Idle,
    Manual { direction: Direction, duty: u8 },
    Auto,
}

/// A differential-drive vehicle in a walled arena.
pub struct Vehicle {
    pub x: f64,
    pub y: f64,
    /// Degrees, counter-clockwise from +x, in `[0, 360)`.
    pub heading: f64,
    /// Signed ground speed, m/s. Negative when reversing.
    pub speed: f64,
    pub mode: Mode,
    pub target: Option<(f64, f64)>,
}

impl Vehicle {
    pub fn new() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            heading: 90.0,
            speed: 0.0,
            mode: Mode::Idle,
            target: None,
        }
    }

    /// Apply a control command from a dashboard.
    pub fn apply(&mut self, command: &Command) -> anyhow::Result<()> {
        match command.name() {
            "manual" => {
                let direction: Direction = command
                    .get("direction")
                    .and_then(Value::as_str)
                    .context("manual needs a direction")?
                    .parse()?;
                let duty = command
                    .get("speed")
                    .and_then(number)
                    .map(|s| s.clamp(0.0, 255.0) as u8)
                    .unwrap_or(u8::MAX);
                self.mode = match direction {
                    Direction::Stop => Mode::Idle,
                    direction => Mode::Manual { direction, duty },
                };
            }
            "stop" => self.mode = Mode::Idle,
            "setTarget" => {
                let x = command.get("x").and_then(number).context("setTarget needs x")?;
                let y = command.get("y").and_then(number).context("setTarget needs y")?;
                if x.abs() > ARENA || y.abs() > ARENA {
                    bail!("target ({x}, {y}) is outside the arena");
                }
                self.target = Some((x, y));
            }
            "start" => {
                if self.target.is_none() {
                    bail!("no target set");
                }
                self.mode = Mode::Auto;
            }
            other => bail!("unknown command: {other}"),
        }
        Ok(())
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        let mut turn = 0.0;
        self.speed = match self.mode {
            Mode::Idle => 0.0,
            Mode::Manual { direction, duty } => {
                let speed = MAX_SPEED * f64::from(duty) / 255.0;
                match direction {
                    Direction::Forward => speed,
                    Direction::Backward => -speed,
                    Direction::Left => {
                        turn = TURN_RATE;
                        0.0
                    }
                    Direction::Right => {
                        turn = -TURN_RATE;
                        0.0
                    }
                    Direction::Stop => 0.0,
                }
            }
            Mode::Auto => match self.target {
                Some((tx, ty)) if (tx - self.x).hypot(ty - self.y) > ARRIVAL_RADIUS => {
                    let bearing = (ty - self.y).atan2(tx - self.x).to_degrees();
                    let error = wrap_signed(bearing - self.heading);
                    turn = error.clamp(-TURN_RATE, TURN_RATE);
                    // Turn on the spot until roughly facing the target
                    if error.abs() < 30.0 { CRUISE_SPEED } else { 0.0 }
                }
                _ => {
                    tracing::info!("Arrived at target ({:.2}, {:.2})", self.x, self.y);
                    self.mode = Mode::Idle;
                    self.target = None;
                    0.0
                }
            },
        };

        self.heading = (self.heading + turn * dt).rem_euclid(360.0);
        let rad = self.heading.to_radians();
        self.x = (self.x + self.speed * rad.cos() * dt).clamp(-ARENA, ARENA);
        self.y = (self.y + self.speed * rad.sin() * dt).clamp(-ARENA, ARENA);
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            speed: Some(self.speed.abs()),
            x_position: Some(self.x),
            y_position: Some(self.y),
            heading: Some(self.heading),
            distance_front: Some(self.range(0.0)),
            distance_left: Some(self.range(90.0)),
            distance_right: Some(self.range(-90.0)),
        }
    }

    /// Distance in centimetres from the vehicle to the arena wall along
    /// `offset` degrees from the heading, capped at the sensor range.
    fn range(&self, offset: f64) -> f64 {
        let rad = (self.heading + offset).to_radians();
        let (dx, dy) = (rad.cos(), rad.sin());
        let along = |pos: f64, d: f64| {
            if d.abs() < 1e-9 {
                f64::INFINITY
            } else {
                (ARENA.copysign(d) - pos) / d
            }
        };
        let metres = along(self.x, dx).min(along(self.y, dy));
        (metres * 100.0).clamp(0.0, SENSOR_RANGE)
    }
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept JSON numbers and numeric strings.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Map an angle into `(-180, 180]`.
fn wrap_signed(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}
