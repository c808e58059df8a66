//! PID registry + decoder (C5): the static, compile-time table of PID
//! definitions and the pure raw-to-engineering conversion function.
//!
//! The table below is transcribed bit-exactly from the reference
//! implementation's `pid_definitions[]` table — every id, scale, offset,
//! priority and default rate here is load-bearing, not illustrative.

use std::fmt;

/// Physical unit of a decoded PID value. Two variants (`Ratio`, `Count`)
/// have no PID in the current table but are part of the closed enum and
/// both display as an empty string, matching the reference's unit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidUnit {
    None,
    Percent,
    DegreesC,
    Kpa,
    Rpm,
    Kmh,
    Degrees,
    GramsSec,
    Seconds,
    Km,
    Volts,
    Minutes,
    Ratio,
    Count,
    Pa,
    Ma,
    Nm,
    Lph,
}

impl fmt::Display for PidUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PidUnit::None | PidUnit::Ratio | PidUnit::Count => "",
            PidUnit::Percent => "%",
            PidUnit::DegreesC => "\u{b0}C",
            PidUnit::Kpa => "kPa",
            PidUnit::Rpm => "RPM",
            PidUnit::Kmh => "km/h",
            PidUnit::Degrees => "\u{b0}",
            PidUnit::GramsSec => "g/s",
            PidUnit::Seconds => "s",
            PidUnit::Km => "km",
            PidUnit::Volts => "V",
            PidUnit::Minutes => "min",
            PidUnit::Pa => "Pa",
            PidUnit::Ma => "mA",
            PidUnit::Nm => "Nm",
            PidUnit::Lph => "L/h",
        };
        f.write_str(s)
    }
}

/// Wire encoding of a PID's raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidDataType {
    U8,
    U16,
    U32,
    I8,
    I16,
    Float,
    Bitfield,
}

/// Polling priority tier. Ordered so `High < Medium < Low` numerically,
/// matching the "lowest priority number wins" selection rule used by both
/// the scheduler and `PidManager::next_pid_to_read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PidPriority {
    High = 0,
    Medium = 1,
    Low = 2,
}

/// A single row of the static PID table. Immutable, shared, looked up by id.
#[derive(Debug, Clone, Copy)]
pub struct PidDefinition {
    pub id: u8,
    pub name: &'static str,
    pub mnemonic: &'static str,
    pub unit: PidUnit,
    pub data_type: PidDataType,
    pub data_bytes: u8,
    pub min: f32,
    pub max: f32,
    pub scale: f32,
    pub offset: f32,
    pub priority: PidPriority,
    pub default_rate_ms: u16,
}

use PidDataType::{Bitfield, Float, I16, I8, U16, U32, U8};
use PidPriority::{High, Low, Medium};
use PidUnit::{
    DegreesC, GramsSec, Kmh, Kpa, Lph, None as UnitNone, Nm, Percent, Rpm, Seconds, Volts,
    Degrees, Km, Minutes, Ratio,
};

/// The full PID table, sorted by id (lookup below is a linear scan over
/// this small, L1-resident table rather than a binary search; the table
/// declaration order matches id order so a reader can audit "sorted by id"
/// from the source directly).
pub static PID_DEFINITIONS: &[PidDefinition] = &[
    def(0x00, "PIDs supported [01-20]", "PIDS_A", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0x01, "Monitor status", "MIL_STATUS", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 1000),
    def(0x03, "Fuel system status", "FUEL_SYS", UnitNone, Bitfield, 2, 0.0, 0.0, 1.0, 0.0, Low, 5000),
    def(0x04, "Calculated engine load", "ENGINE_LOAD", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, High, 250),
    def(0x05, "Engine coolant temp", "COOLANT_TEMP", DegreesC, U8, 1, -40.0, 215.0, 1.0, -40.0, Medium, 1000),
    def(0x06, "Short term fuel trim Bank 1", "STFT_B1", Percent, U8, 1, -100.0, 99.2, 0.781_25, -100.0, Medium, 500),
    def(0x07, "Long term fuel trim Bank 1", "LTFT_B1", Percent, U8, 1, -100.0, 99.2, 0.781_25, -100.0, Low, 2000),
    def(0x08, "Short term fuel trim Bank 2", "STFT_B2", Percent, U8, 1, -100.0, 99.2, 0.781_25, -100.0, Medium, 500),
    def(0x09, "Long term fuel trim Bank 2", "LTFT_B2", Percent, U8, 1, -100.0, 99.2, 0.781_25, -100.0, Low, 2000),
    def(0x0A, "Fuel pressure", "FUEL_PRESS", Kpa, U8, 1, 0.0, 765.0, 3.0, 0.0, Medium, 1000),
    def(0x0B, "Intake manifold pressure", "MAP", Kpa, U8, 1, 0.0, 255.0, 1.0, 0.0, High, 250),
    def(0x0C, "Engine RPM", "RPM", Rpm, U16, 2, 0.0, 16383.75, 0.25, 0.0, High, 100),
    def(0x0D, "Vehicle speed", "SPEED", Kmh, U8, 1, 0.0, 255.0, 1.0, 0.0, High, 250),
    def(0x0E, "Timing advance", "TIMING_ADV", Degrees, U8, 1, -64.0, 63.5, 0.5, -64.0, Medium, 500),
    def(0x0F, "Intake air temperature", "IAT", DegreesC, U8, 1, -40.0, 215.0, 1.0, -40.0, Medium, 1000),
    def(0x10, "MAF air flow rate", "MAF", GramsSec, U16, 2, 0.0, 655.35, 0.01, 0.0, High, 250),
    def(0x11, "Throttle position", "TPS", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, High, 100),
    def(0x1C, "OBD standards", "OBD_STD", UnitNone, U8, 1, 0.0, 255.0, 1.0, 0.0, Low, 0),
    def(0x1F, "Run time since engine start", "RUN_TIME", Seconds, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 5000),
    def(0x20, "PIDs supported [21-40]", "PIDS_B", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0x21, "Distance with MIL on", "MIL_DIST", Km, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 5000),
    def(0x2F, "Fuel tank level", "FUEL_LEVEL", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, Low, 5000),
    def(0x31, "Distance since codes cleared", "CLR_DIST", Km, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 5000),
    def(0x33, "Barometric pressure", "BARO", Kpa, U8, 1, 0.0, 255.0, 1.0, 0.0, Low, 10000),
    def(0x40, "PIDs supported [41-60]", "PIDS_C", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0x42, "Control module voltage", "CTRL_VOLT", Volts, U16, 2, 0.0, 65.535, 0.001, 0.0, Low, 5000),
    def(0x43, "Absolute load value", "ABS_LOAD", Percent, U16, 2, 0.0, 25700.0, 0.392_157, 0.0, Medium, 500),
    def(0x44, "Commanded AFR", "CMD_AFR", Ratio, U16, 2, 0.0, 2.0, 0.0000305, 0.0, Medium, 500),
    def(0x45, "Relative throttle position", "REL_TPS", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, High, 100),
    def(0x46, "Ambient air temperature", "AMB_TEMP", DegreesC, U8, 1, -40.0, 215.0, 1.0, -40.0, Low, 10000),
    def(0x47, "Absolute throttle position B", "ABS_TPS_B", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, Medium, 250),
    def(0x49, "Accelerator pedal position D", "ACCEL_D", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, High, 100),
    def(0x4A, "Accelerator pedal position E", "ACCEL_E", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, High, 100),
    def(0x4C, "Commanded throttle actuator", "CMD_THROT", Percent, U8, 1, 0.0, 100.0, 0.392_157, 0.0, Medium, 250),
    def(0x4D, "Time run with MIL on", "MIL_TIME", Minutes, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 5000),
    def(0x4E, "Time since codes cleared", "CLR_TIME", Minutes, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 5000),
    def(0x51, "Fuel type", "FUEL_TYPE", UnitNone, U8, 1, 0.0, 255.0, 1.0, 0.0, Low, 0),
    def(0x5C, "Engine oil temperature", "OIL_TEMP", DegreesC, U8, 1, -40.0, 210.0, 1.0, -40.0, Medium, 2000),
    def(0x5E, "Engine fuel rate", "FUEL_RATE", Lph, U16, 2, 0.0, 3276.75, 0.05, 0.0, Medium, 1000),
    def(0x60, "PIDs supported [61-80]", "PIDS_D", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0x62, "Actual engine torque %", "ACT_TORQ", Percent, U8, 1, -125.0, 130.0, 1.0, -125.0, Medium, 500),
    def(0x63, "Engine reference torque", "REF_TORQ", Nm, U16, 2, 0.0, 65535.0, 1.0, 0.0, Low, 0),
    def(0x80, "PIDs supported [81-A0]", "PIDS_E", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0xA0, "PIDs supported [A1-C0]", "PIDS_F", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
    def(0xC0, "PIDs supported [C1-E0]", "PIDS_G", UnitNone, Bitfield, 4, 0.0, 0.0, 1.0, 0.0, High, 0),
];

const fn def(
    id: u8,
    name: &'static str,
    mnemonic: &'static str,
    unit: PidUnit,
    data_type: PidDataType,
    data_bytes: u8,
    min: f32,
    max: f32,
    scale: f32,
    offset: f32,
    priority: PidPriority,
    default_rate_ms: u16,
) -> PidDefinition {
    PidDefinition {
        id,
        name,
        mnemonic,
        unit,
        data_type,
        data_bytes,
        min,
        max,
        scale,
        offset,
        priority,
        default_rate_ms,
    }
}

/// Looks up a PID's static definition, or `None` if the table has no entry
/// for it (the caller then falls back to the unknown-PID decode rule).
#[must_use]
pub fn find_definition(pid: u8) -> Option<&'static PidDefinition> {
    PID_DEFINITIONS.iter().find(|d| d.id == pid)
}

/// A decoded PID value: integer raw, float engineering, unit tag, capture
/// timestamp, validity flag. The timestamp is always zero here — the
/// caller (the PID manager) stamps it from its injected clock.
#[derive(Debug, Clone, Copy)]
pub struct PidValue {
    pub raw_value: i32,
    pub eng_value: f32,
    pub unit: PidUnit,
    pub timestamp_ms: u32,
    pub valid: bool,
}

impl Default for PidValue {
    fn default() -> Self {
        PidValue {
            raw_value: 0,
            eng_value: 0.0,
            unit: PidUnit::None,
            timestamp_ms: 0,
            valid: false,
        }
    }
}

/// Failure of [`convert_raw_to_eng`]: the only way this pure function fails
/// is a data buffer shorter than the definition demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooShort;

/// Pure raw-to-engineering conversion (C5). No state, thread-safe,
/// reentrant.
pub fn convert_raw_to_eng(pid: u8, raw_data: &[u8]) -> Result<PidValue, TooShort> {
    let Some(def) = find_definition(pid) else {
        let mut value = PidValue::default();
        if let Some(&first) = raw_data.first() {
            value.raw_value = i32::from(first);
            value.eng_value = f32::from(first);
            value.unit = PidUnit::None;
            value.valid = true;
        }
        return Ok(value);
    };

    if raw_data.len() < def.data_bytes as usize {
        return Err(TooShort);
    }

    let raw: i32 = match def.data_type {
        U8 => i32::from(raw_data[0]),
        U16 => i32::from(u16::from_be_bytes([raw_data[0], raw_data[1]])),
        U32 | Bitfield => {
            i32::from_be_bytes([raw_data[0], raw_data[1], raw_data[2], raw_data[3]])
        }
        I8 => i32::from(raw_data[0] as i8),
        I16 => i32::from(i16::from_be_bytes([raw_data[0], raw_data[1]])),
        // The reference falls back to the first raw byte for FLOAT and any
        // unrecognized type. No current PID uses FLOAT; a future one would
        // need this arm revisited rather than this fallback trusted blindly.
        Float => i32::from(raw_data[0]),
    };

    Ok(PidValue {
        raw_value: raw,
        eng_value: (raw as f32) * def.scale + def.offset,
        unit: def.unit,
        timestamp_ms: 0,
        valid: true,
    })
}
