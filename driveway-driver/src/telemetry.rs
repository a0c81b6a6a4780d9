//! Role-specific telemetry and actuator seams.

use heapless::Vec;

/// Upper bound on TF-Luna pairs a sensor snapshot can carry.
pub const MAX_TF_LUNA_PAIRS: usize = 8;

/// Electrical measurements exposed by the power-supply hardware.
pub trait PmsTelemetry {
    /// Input voltage in millivolts.
    fn vbus_mv(&mut self) -> u16;
    /// System rail in millivolts.
    fn vsys_mv(&mut self) -> u16;
    /// Output current in milliamps, signed for charge/regen.
    fn iout_ma(&mut self) -> i16;
    /// Fault bitmask.
    fn faults(&mut self) -> u16;
}

/// Fan/cooling controller on the power supply.
pub trait Cooling {
    fn set_duty_pct(&mut self, pct: u8);
    fn duty_pct(&self) -> u8;
}

/// Cached board temperature probe (DS18B20 or similar).
pub trait BoardTemp {
    /// Temperature in tenths of a degree Celsius, if a reading is available.
    fn read_c_x10(&mut self) -> Option<i16>;
}

/// Bank of relay outputs (shift register, GPIO expander, ...).
pub trait RelayBank {
    /// Number of mapped channels (≤ 32).
    fn channels(&self) -> u8;
    fn set(&mut self, idx: u8, on: bool);
    fn toggle(&mut self, idx: u8);
    fn get(&self, idx: u8) -> bool;
}

/// Crossing direction derived from a TF-Luna pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Direction {
    #[default]
    None = 0,
    AToB = 1,
    BToA = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TfLunaPair {
    pub index: u8,
    pub present_a: bool,
    pub present_b: bool,
    pub direction: Direction,
    /// Effective or averaged frame rate.
    pub rate_hz: u16,
}

/// One coherent reading of the sensor head.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    /// Ambient light.
    pub lux: f32,
    pub is_day: bool,
    pub pairs: Vec<TfLunaPair, MAX_TF_LUNA_PAIRS>,
}

/// Sensor head seam: TF-Luna pairs plus the ambient light sensor.
pub trait SensorSource {
    /// Polls the hardware; `None` when no coherent snapshot is available.
    fn poll(&mut self) -> Option<SensorSnapshot>;
}
