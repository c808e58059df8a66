//! Readiness monitor tracking (C11, readiness half): accepts already-parsed
//! monitor status and exposes the accessor surface `readiness.h` defines.
//! Decoding the mode-0x01 PID 0x01/0x41 readiness bitfield itself is the
//! named out-of-scope "OBD-II frame parser" collaborator — this module
//! starts from a [`MonitorInfo`] array, not raw response bytes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorType {
    Misfire,
    FuelSystem,
    Components,
    Catalyst,
    HeatedCatalyst,
    EvapSystem,
    SecondaryAir,
    AcRefrigerant,
    O2Sensor,
    O2SensorHeater,
    EgrVvt,
    NmhcCatalyst,
    NoxAftertreatment,
    BoostPressure,
    ExhaustGasSensor,
    PmFilter,
}

pub const MONITOR_COUNT: usize = 16;
pub const MONITOR_TYPES: [MonitorType; MONITOR_COUNT] = [
    MonitorType::Misfire,
    MonitorType::FuelSystem,
    MonitorType::Components,
    MonitorType::Catalyst,
    MonitorType::HeatedCatalyst,
    MonitorType::EvapSystem,
    MonitorType::SecondaryAir,
    MonitorType::AcRefrigerant,
    MonitorType::O2Sensor,
    MonitorType::O2SensorHeater,
    MonitorType::EgrVvt,
    MonitorType::NmhcCatalyst,
    MonitorType::NoxAftertreatment,
    MonitorType::BoostPressure,
    MonitorType::ExhaustGasSensor,
    MonitorType::PmFilter,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    NotSupported,
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    Spark,
    Compression,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorInfo {
    pub monitor_type: MonitorType,
    pub status: MonitorStatus,
    pub supported: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessData {
    pub monitors: [MonitorInfo; MONITOR_COUNT],
    pub engine_type: EngineType,
    pub mil_on: bool,
    pub dtc_count: u8,
    pub timestamp_ms: u32,
    pub valid: bool,
}

impl Default for ReadinessData {
    fn default() -> Self {
        let blank = MonitorInfo {
            monitor_type: MonitorType::Misfire,
            status: MonitorStatus::NotSupported,
            supported: false,
        };
        ReadinessData {
            monitors: [blank; MONITOR_COUNT],
            engine_type: EngineType::Unknown,
            mil_on: false,
            dtc_count: 0,
            timestamp_ms: 0,
            valid: false,
        }
    }
}

pub struct ReadinessManager<Cb> {
    data: ReadinessData,
    callback: Option<Cb>,
}

impl<Cb> ReadinessManager<Cb>
where
    Cb: FnMut(&ReadinessData),
{
    #[must_use]
    pub fn new(callback: Option<Cb>) -> Self {
        ReadinessManager { data: ReadinessData::default(), callback }
    }

    pub fn update(&mut self, data: ReadinessData) {
        self.data = data;
        if let Some(cb) = &mut self.callback {
            cb(&self.data);
        }
    }

    #[must_use]
    pub fn data(&self) -> &ReadinessData {
        &self.data
    }

    #[must_use]
    pub fn monitor_status(&self, monitor: MonitorType) -> MonitorStatus {
        self.data
            .monitors
            .iter()
            .find(|m| m.monitor_type == monitor)
            .map_or(MonitorStatus::NotSupported, |m| m.status)
    }

    #[must_use]
    pub fn is_monitor_supported(&self, monitor: MonitorType) -> bool {
        self.data
            .monitors
            .iter()
            .any(|m| m.monitor_type == monitor && m.supported)
    }

    #[must_use]
    pub fn complete_count(&self) -> u8 {
        self.count_with(|m| m.supported && m.status == MonitorStatus::Complete)
    }

    #[must_use]
    pub fn incomplete_count(&self) -> u8 {
        self.count_with(|m| m.supported && m.status == MonitorStatus::Incomplete)
    }

    #[must_use]
    pub fn supported_count(&self) -> u8 {
        self.count_with(|m| m.supported)
    }

    fn count_with(&self, pred: impl Fn(&MonitorInfo) -> bool) -> u8 {
        u8::try_from(self.data.monitors.iter().filter(|m| pred(m)).count()).unwrap_or(u8::MAX)
    }

    #[must_use]
    pub fn engine_type(&self) -> EngineType {
        self.data.engine_type
    }
}
