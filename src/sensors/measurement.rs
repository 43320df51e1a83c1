//! Measurement kinds tracked by the fusion engine.
//!
//! Every kind carries fixed metadata (numeric representation, unit, display
//! formatting and accumulation rules) that is defined once in [`KIND_INFO`].

use serde::{Deserialize, Serialize};

use crate::sensors::types::SensorValue;

/// Category of physical quantity tracked during an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Ground speed in m/s
    Speed,
    /// Pace in seconds per meter
    Pace,
    /// Pedalling or running cadence in rpm
    Cadence,
    /// Cumulative session distance in meters
    Distance,
    /// Distance since the last lap boundary in meters
    LapDistance,
    /// Heart rate in bpm
    HeartRate,
    /// Instantaneous power in watts
    Power,
    /// Left pedal share of power in percent
    PowerBalance,
    /// Combined pedal smoothness in percent
    PedalSmoothness,
    /// Combined torque effectiveness in percent
    TorqueEffectiveness,
    /// Altitude above sea level in meters
    Altitude,
    /// Latitude in degrees
    Latitude,
    /// Longitude in degrees
    Longitude,
    /// Cumulative stride count
    Strides,
    /// Cumulative energy expenditure in kcal
    Calories,
}

/// Underlying numeric representation of a kind's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Integer,
    Real,
}

/// Immutable metadata for one [`MeasurementKind`].
#[derive(Debug)]
pub struct KindInfo {
    /// Stable name used in logs and config files
    pub name: &'static str,
    /// Display unit
    pub unit: &'static str,
    /// Numeric representation
    pub representation: Representation,
    /// Decimal places shown by the formatter
    pub decimals: usize,
    /// Whether transient missing readings are suppressed by a threshold filter
    pub supports_filtering: bool,
    /// Whether negative values are invalid for this kind
    pub non_negative: bool,
    /// Whether this kind is backed by an accumulator cell
    pub accumulator: bool,
    /// Accumulator kind whose increments also feed this one
    pub accumulates_from: Option<MeasurementKind>,
}

const fn info(
    name: &'static str,
    unit: &'static str,
    representation: Representation,
    decimals: usize,
) -> KindInfo {
    KindInfo {
        name,
        unit,
        representation,
        decimals,
        supports_filtering: false,
        non_negative: true,
        accumulator: false,
        accumulates_from: None,
    }
}

const fn filtered(mut kind: KindInfo) -> KindInfo {
    kind.supports_filtering = true;
    kind
}

const fn signed(mut kind: KindInfo) -> KindInfo {
    kind.non_negative = false;
    kind
}

const fn accumulated(mut kind: KindInfo, from: Option<MeasurementKind>) -> KindInfo {
    kind.accumulator = true;
    kind.accumulates_from = from;
    kind
}

/// Metadata table, indexed by `MeasurementKind as usize`.
pub static KIND_INFO: [KindInfo; MeasurementKind::COUNT] = [
    info("speed", "m/s", Representation::Real, 2),
    info("pace", "s/m", Representation::Real, 3),
    filtered(info("cadence", "rpm", Representation::Real, 0)),
    accumulated(info("distance", "m", Representation::Real, 1), None),
    accumulated(
        info("lap_distance", "m", Representation::Real, 1),
        Some(MeasurementKind::Distance),
    ),
    filtered(info("heart_rate", "bpm", Representation::Integer, 0)),
    filtered(info("power", "W", Representation::Integer, 0)),
    info("power_balance", "%", Representation::Real, 1),
    info("pedal_smoothness", "%", Representation::Real, 1),
    info("torque_effectiveness", "%", Representation::Real, 1),
    signed(info("altitude", "m", Representation::Real, 1)),
    signed(info("latitude", "°", Representation::Real, 6)),
    signed(info("longitude", "°", Representation::Real, 6)),
    accumulated(info("strides", "", Representation::Integer, 0), None),
    accumulated(info("calories", "kcal", Representation::Real, 0), None),
];

impl MeasurementKind {
    /// Number of kinds.
    pub const COUNT: usize = 15;

    /// All kinds in declaration order.
    pub const ALL: [MeasurementKind; Self::COUNT] = [
        MeasurementKind::Speed,
        MeasurementKind::Pace,
        MeasurementKind::Cadence,
        MeasurementKind::Distance,
        MeasurementKind::LapDistance,
        MeasurementKind::HeartRate,
        MeasurementKind::Power,
        MeasurementKind::PowerBalance,
        MeasurementKind::PedalSmoothness,
        MeasurementKind::TorqueEffectiveness,
        MeasurementKind::Altitude,
        MeasurementKind::Latitude,
        MeasurementKind::Longitude,
        MeasurementKind::Strides,
        MeasurementKind::Calories,
    ];

    /// Fixed metadata for this kind.
    pub fn info(&self) -> &'static KindInfo {
        &KIND_INFO[*self as usize]
    }

    pub fn is_accumulator(&self) -> bool {
        self.info().accumulator
    }

    pub fn supports_filtering(&self) -> bool {
        self.info().supports_filtering
    }

    /// Kinds whose accumulators also receive this kind's increments.
    pub fn dependents(&self) -> impl Iterator<Item = MeasurementKind> {
        let source = *self;
        Self::ALL
            .into_iter()
            .filter(move |k| k.info().accumulates_from == Some(source))
    }

    /// Convert a raw physical quantity into this kind's representation.
    pub fn value_of(&self, raw: f64) -> SensorValue {
        match self.info().representation {
            Representation::Integer => SensorValue::Integer(raw.round() as i64),
            Representation::Real => SensorValue::Real(raw),
        }
    }

    /// Check a value against this kind's domain.
    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite() && (!self.info().non_negative || value >= 0.0)
    }

    /// Render a value for display.
    pub fn format(&self, value: SensorValue) -> String {
        let info = self.info();

        if *self == MeasurementKind::Pace {
            // seconds per meter -> min:sec per km
            let secs_per_km = value.as_f64() * 1000.0;
            if !secs_per_km.is_finite() || secs_per_km <= 0.0 {
                return "--:-- /km".to_string();
            }
            let total = secs_per_km.round() as u64;
            return format!("{}:{:02} /km", total / 60, total % 60);
        }

        let number = match value {
            SensorValue::Integer(v) => v.to_string(),
            SensorValue::Real(v) => format!("{:.*}", info.decimals, v),
        };

        if info.unit.is_empty() {
            number
        } else {
            format!("{} {}", number, info.unit)
        }
    }
}

impl std::fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.info().name)
    }
}
