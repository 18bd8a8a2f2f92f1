//! Static configuration

/// DMC5 controller configuration
///
/// The limit values are re-sent every fifth tick. The DMC5 keeps no memory of
/// them and falls back to its defaults once they stop arriving.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmcConfig {
    /// Scheduler interval in microseconds
    pub tick_interval_us: u32,
    /// Speed in rpm at or above which the power stage stays enabled
    ///
    /// Compared against the absolute actual speed, so the power stage is
    /// also held on while the motor spins in reverse.
    pub high_speed_threshold: u16,
    /// Max requested torque in 0.1Nm, applied in both directions
    pub max_torque: i16,
    /// Max requested speed in rpm, applied in both directions
    pub max_rpm: i16,
    /// Set the oscillation limiter bit while running
    pub enable_oscillation_limiter: bool,
    /// Torque slew rate in 0.01Nm/s, 0 disables
    pub torque_slew_rate: u16,
    /// Speed slew rate in rpm/s, 0 disables
    pub speed_slew_rate: u16,
    /// Max mechanical power while motoring in 4W steps
    pub max_mechanical_power_motor: u16,
    /// Max mechanical power while regenerating in 4W steps
    pub max_mechanical_power_regen: u16,
    /// Minimum DC voltage while motoring in 0.1V
    pub dc_voltage_limit_motor: u16,
    /// Maximum DC voltage while regenerating in 0.1V
    pub dc_voltage_limit_regen: u16,
    /// DC current limit while motoring in 0.1A
    pub dc_current_limit_motor: u16,
    /// DC current limit while regenerating in 0.1A
    pub dc_current_limit_regen: u16,
}

impl Default for DmcConfig {
    fn default() -> Self {
        DmcConfig {
            tick_interval_us: 20_000,
            high_speed_threshold: 1000,
            max_torque: 2000,
            max_rpm: 6000,
            enable_oscillation_limiter: false,
            torque_slew_rate: 0,
            speed_slew_rate: 0,
            max_mechanical_power_motor: 50_000,
            max_mechanical_power_regen: 50_000,
            dc_voltage_limit_motor: 1000,
            dc_voltage_limit_regen: 1000,
            dc_current_limit_motor: 0,
            dc_current_limit_regen: 0,
        }
    }
}

/// Throttle calibration configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Time the pedal must be held still before sampling starts, in ms
    pub wait_ms: u32,
    /// Sampling window per pedal position, in ms
    pub calibrate_ms: u32,
    /// Allowed jitter, as percent of the ADC range
    pub max_throttle_reading_deviation_percent: u8,
    /// Highest raw ADC reading
    pub adc_full_scale: u16,
    /// Readings at or below this are a grounded, unconnected input
    pub grounded_threshold: u16,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            wait_ms: 2000,
            calibrate_ms: 1000,
            max_throttle_reading_deviation_percent: 5,
            adc_full_scale: 4095,
            grounded_threshold: 50,
        }
    }
}

impl DetectorConfig {
    /// Allowed deviation in raw ADC counts
    pub fn tolerance(&self) -> u16 {
        (u32::from(self.adc_full_scale) * u32::from(self.max_throttle_reading_deviation_percent)
            / 100) as u16
    }
}
