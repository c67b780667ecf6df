use serde_json::Value;

use crate::{config::SourceSpec, types::SourceKind};

/// Plausible ambient range in °C; anything outside is treated as a sensor fault.
const MIN_PLAUSIBLE_TEMP: f32 = -50.0;
const MAX_PLAUSIBLE_TEMP: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceReading {
    pub value: Option<f32>,
    pub is_stale: bool,
}

/// Normalizes a sensor state or a delegated climate device's current
/// temperature into a single reading with a staleness flag.
#[derive(Debug, Clone)]
pub struct TemperatureSource {
    spec: SourceSpec,
    max_age_ms: u64,
    value: Option<f32>,
    last_update_ms: Option<u64>,
    available: bool,
}

impl TemperatureSource {
    pub fn new(spec: SourceSpec, max_age_ms: u64) -> Self {
        Self {
            spec,
            max_age_ms,
            value: None,
            last_update_ms: None,
            available: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Feeds a raw state payload from the source entity.
    pub fn ingest(&mut self, payload: &str, now_ms: u64) -> SourceReading {
        let value = match self.spec.kind {
            SourceKind::Sensor => parse_sensor_state(payload),
            SourceKind::Climate => parse_climate_state(payload),
        };
        self.update(value, now_ms)
    }

    /// Records a new value; `None` marks the source unavailable while keeping
    /// the last known value around.
    pub fn update(&mut self, value: Option<f32>, now_ms: u64) -> SourceReading {
        match value {
            Some(value) => {
                self.value = Some(value);
                self.last_update_ms = Some(now_ms);
                self.available = true;
            }
            None => self.available = false,
        }
        self.current(now_ms)
    }

    pub fn current(&self, now_ms: u64) -> SourceReading {
        let fresh = self.available
            && self
                .last_update_ms
                .map(|last| now_ms.saturating_sub(last) < self.max_age_ms)
                .unwrap_or(false);

        SourceReading {
            value: self.value,
            is_stale: !fresh,
        }
    }
}

fn plausible(value: f32) -> Option<f32> {
    (value.is_finite() && (MIN_PLAUSIBLE_TEMP..=MAX_PLAUSIBLE_TEMP).contains(&value))
        .then_some(value)
}

fn parse_sensor_state(payload: &str) -> Option<f32> {
    payload.trim().parse::<f32>().ok().and_then(plausible)
}

fn parse_climate_state(payload: &str) -> Option<f32> {
    let state: Value = serde_json::from_str(payload).ok()?;
    let value = match state.get("current_temperature")? {
        Value::Number(number) => number.as_f64()? as f32,
        Value::String(text) => text.trim().parse::<f32>().ok()?,
        _ => return None,
    };
    plausible(value)
}
