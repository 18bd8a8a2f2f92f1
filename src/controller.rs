//! DMC5 command loop
//!
//! [`DmcController`] is the only owner of the inverter's [`Telemetry`]. The
//! decode path (`handle_frame`, `dispatch`, `poll`) writes it and the encode
//! path (`handle_tick`) reads it, both through `&mut self`, so a port that
//! receives frames in an interrupt has to put the whole controller behind one
//! lock rather than sharing fields.

/*
 At high speed the power stage must not be switched off: a field weakening
 current is needed to hold the torque at zero and dropping it produces heavy
 regenerative torque that cannot be controlled.
*/

use bitflags::bitflags;
use embedded_hal::can::{nb::Can, Frame, Id, StandardId};
use heapless::{consts::U32, Vec};
use log::{debug, info, trace, warn};

use crate::commands::{Control, Control2, ControlBits, Limits};
use crate::config::DmcConfig;
use crate::device::{AcceptanceFilter, DeviceId, MaskedId, Scheduler};
use crate::diagnostics::{
    self, Condition, ERROR_CONDITIONS, STATUS_CONDITIONS, WARNING_CONDITIONS,
};
use crate::responses::{torque_nm, ActualValues, Errors, Status, Temperature, TorqueLimit};
use crate::{Error, FrameId, FRAME_LEN};

/// Subscription covering 0x258 - 0x268
pub const STATUS_FILTER: MaskedId = MaskedId::standard(0x248, 0x7cc);
/// Subscription for 0x458
pub const TEMPERATURE_FILTER: MaskedId = MaskedId::standard(0x458, 0x7ff);

/// Number of ticks between two `DMC_CTRL2` / `DMC_LIM` frames
const SLOW_FRAME_TICKS: u8 = 5;

bitflags! {
    /// Readiness bits of the status word
    pub struct StatusBits: u16 {
        /// Ready to enable the power stage
        const READY = 1 << 1;
        /// Power stage running
        const RUNNING = 1 << 2;
        /// At least one warning is set
        const WARNING = 1 << 14;
        /// At least one error is set
        const ERROR = 1 << 15;
    }
}

/// Torque or speed control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Requested torque is the setpoint
    Torque,
    /// Requested speed is the setpoint
    Speed,
}

impl Default for PowerMode {
    fn default() -> Self {
        PowerMode::Torque
    }
}

/// Last state reported by the DMC5
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    /// Ready to enable the power stage
    pub ready: bool,
    /// Power stage running
    pub running: bool,
    /// Error present
    pub error: bool,
    /// Warning present
    pub warning: bool,

    /// Raw status word
    pub status_bits: u16,
    /// Raw error word
    pub error_bits: u32,
    /// Raw warning word
    pub warning_bits: u16,

    /// Torque available in 0.01Nm
    pub torque_available: i16,
    /// Actual torque in 0.01Nm
    pub torque_actual: i16,
    /// Actual speed in rpm
    pub speed_actual: i16,

    /// DC voltage in 0.1V
    pub dc_voltage: u16,
    /// DC current in 0.1A
    pub dc_current: i16,
    /// AC current in 0.25A
    pub ac_current: u16,
    /// Mechanical power in 1/62.5kW
    pub mechanical_power: i16,

    /// Inverter temperature in 0.5C
    pub temperature_inverter: i16,
    /// Motor temperature in 0.5C
    pub temperature_motor: i16,
    /// System temperature in C
    pub temperature_system: i16,

    /// Max positive torque in 0.01Nm
    pub max_positive_torque: i16,
    /// Min negative torque in 0.01Nm
    pub min_negative_torque: i16,
    /// Active limiter state
    pub limiter_state: u8,
}

impl Telemetry {
    /// Takes over a status frame, recomputing all readiness flags
    pub fn apply_status(&mut self, status: &Status) {
        let flags = StatusBits::from_bits_truncate(status.bits);

        self.status_bits = status.bits;
        self.torque_available = status.torque_available;
        self.torque_actual = status.torque_actual;
        self.speed_actual = status.speed_actual;

        self.ready = flags.contains(StatusBits::READY);
        self.running = flags.contains(StatusBits::RUNNING);
        self.error = flags.contains(StatusBits::ERROR);
        self.warning = flags.contains(StatusBits::WARNING);
    }

    /// Takes over an actual values frame
    pub fn apply_actual_values(&mut self, values: &ActualValues) {
        self.dc_voltage = values.dc_voltage;
        self.dc_current = values.dc_current;
        self.ac_current = values.ac_current;
        self.mechanical_power = values.mechanical_power;
    }

    /// Takes over an error frame
    pub fn apply_errors(&mut self, errors: &Errors) {
        self.error_bits = errors.errors;
        self.warning_bits = errors.warnings;
    }

    /// Takes over a torque limit frame
    pub fn apply_torque_limit(&mut self, limit: &TorqueLimit) {
        self.max_positive_torque = limit.max_positive_torque;
        self.min_negative_torque = limit.min_negative_torque;
        self.limiter_state = limit.limiter_state;
    }

    /// Takes over a temperature frame
    pub fn apply_temperature(&mut self, temp: &Temperature) {
        self.temperature_inverter = temp.inverter;
        self.temperature_motor = temp.motor;
        self.temperature_system = temp.system_celsius();
    }

    /// Actual torque in Nm
    pub fn torque_actual_nm(&self) -> f32 {
        torque_nm(self.torque_actual)
    }

    /// Torque available in Nm
    pub fn torque_available_nm(&self) -> f32 {
        torque_nm(self.torque_available)
    }

    /// Status bits currently set, readiness included
    pub fn active_limitations(&self) -> Vec<&'static Condition, U32> {
        collect(&STATUS_CONDITIONS, u32::from(self.status_bits))
    }

    /// Errors currently reported
    pub fn active_errors(&self) -> Vec<&'static Condition, U32> {
        collect(&ERROR_CONDITIONS, self.error_bits)
    }

    /// Warnings currently reported
    pub fn active_warnings(&self) -> Vec<&'static Condition, U32> {
        collect(&WARNING_CONDITIONS, u32::from(self.warning_bits))
    }
}

fn collect(table: &'static [Condition], word: u32) -> Vec<&'static Condition, U32> {
    let mut found = Vec::new();
    for c in diagnostics::active(table, word) {
        // tables are shorter than the capacity
        let _ = found.push(c);
    }
    found
}

/// Brusa DMC5 attached to a CAN transport
pub struct DmcController<B> {
    bus: B,
    config: DmcConfig,
    telemetry: Telemetry,
    power_mode: PowerMode,
    requested_torque: i16,
    requested_rpm: i16,
    requested_throttle: i16,
    tick_counter: u8,
    dropped_frames: u32,
}

impl<B: Can> DmcController<B> {
    /// Creates a controller with all telemetry zeroed
    pub fn new(bus: B, config: DmcConfig) -> Self {
        DmcController {
            bus,
            config,
            telemetry: Telemetry::default(),
            power_mode: PowerMode::default(),
            requested_torque: 0,
            requested_rpm: 0,
            requested_throttle: 0,
            tick_counter: 0,
            dropped_frames: 0,
        }
    }

    /// Device id used for scheduler registration
    pub fn id(&self) -> DeviceId {
        DeviceId::BrusaDmc5
    }

    /// Subscribes to the DMC5 frames and registers with the scheduler
    pub fn setup<S: Scheduler>(&mut self, scheduler: &mut S)
    where
        B: AcceptanceFilter,
    {
        scheduler.detach(self.id());

        self.bus.attach(STATUS_FILTER);
        self.bus.attach(TEMPERATURE_FILTER);

        scheduler.attach(self.id(), self.config.tick_interval_us);
        info!(
            "DMC5: attached as device {:#06x}, tick interval {}us",
            self.id().value(),
            self.config.tick_interval_us
        );
    }

    /// Unregisters from the scheduler and drops the subscriptions
    pub fn teardown<S: Scheduler>(&mut self, scheduler: &mut S)
    where
        B: AcceptanceFilter,
    {
        scheduler.detach(self.id());

        self.bus.detach(STATUS_FILTER);
        self.bus.detach(TEMPERATURE_FILTER);
    }

    /// Sends the frames due on this tick
    ///
    /// `DMC_CTRL` goes out every tick, `DMC_CTRL2` and `DMC_LIM` after it on
    /// every fifth tick. Every due frame is attempted even if an earlier one
    /// was rejected.
    pub fn handle_tick(&mut self) -> Result<(), Error> {
        self.tick_counter += 1;

        let mut result = self.send(FrameId::Control, self.control_frame().encode());

        if self.tick_counter >= SLOW_FRAME_TICKS {
            let control2 = self.send(FrameId::Control2, self.control2_frame().encode());
            let limits = self.send(FrameId::Limits, self.limits_frame().encode());
            result = result.and(control2).and(limits);
            self.tick_counter = 0;
        }

        result
    }

    /// Primary command for the current telemetry and requests
    pub fn control_frame(&self) -> Control {
        let t = &self.telemetry;
        let mut control = Control {
            bits: ControlBits::ENABLE_POSITIVE_TORQUE_SPEED
                | ControlBits::ENABLE_NEGATIVE_TORQUE_SPEED,
            speed: 0,
            torque: 0,
        };

        if t.error {
            control.bits |= ControlBits::CLEAR_ERROR_LATCH;
            return control;
        }

        if t.ready || t.speed_actual.unsigned_abs() >= self.config.high_speed_threshold {
            control.bits |= ControlBits::ENABLE_POWER_STAGE;

            if t.running {
                if self.config.enable_oscillation_limiter {
                    control.bits |= ControlBits::ENABLE_OSCILLATION_LIMITER;
                }
                if self.power_mode == PowerMode::Speed {
                    control.bits |= ControlBits::ENABLE_SPEED_MODE;
                }

                control.speed = self.requested_rpm;
                // 0.1Nm -> 0.01Nm
                control.torque = self.requested_torque.saturating_mul(10);
            }
        }

        control
    }

    /// Secondary command from the configuration
    pub fn control2_frame(&self) -> Control2 {
        Control2 {
            torque_slew_rate: self.config.torque_slew_rate,
            speed_slew_rate: self.config.speed_slew_rate,
            max_mechanical_power_motor: self.config.max_mechanical_power_motor,
            max_mechanical_power_regen: self.config.max_mechanical_power_regen,
        }
    }

    /// DC limits from the configuration
    pub fn limits_frame(&self) -> Limits {
        Limits {
            dc_voltage_limit_motor: self.config.dc_voltage_limit_motor,
            dc_voltage_limit_regen: self.config.dc_voltage_limit_regen,
            dc_current_limit_motor: self.config.dc_current_limit_motor,
            dc_current_limit_regen: self.config.dc_current_limit_regen,
        }
    }

    // Fire and forget, the transport owns retries
    fn send(&mut self, id: FrameId, data: [u8; FRAME_LEN]) -> Result<(), Error> {
        let raw = id.value();
        let std_id = StandardId::new(raw as u16).ok_or(Error::InvalidId(raw))?;
        let frame = B::Frame::new(std_id, &data).ok_or(Error::InvalidId(raw))?;

        match self.bus.transmit(&frame) {
            Ok(_) => Ok(()),
            Err(nb::Error::WouldBlock) => {
                self.dropped_frames = self.dropped_frames.wrapping_add(1);
                warn!("DMC5: transmit mailbox full, dropped frame {:X}", raw);
                Err(Error::Transmit)
            }
            Err(nb::Error::Other(e)) => {
                self.dropped_frames = self.dropped_frames.wrapping_add(1);
                warn!("DMC5: transmit of frame {:X} failed: {:?}", raw, e);
                Err(Error::Transmit)
            }
        }
    }

    /// Drains the receive queue without blocking
    ///
    /// Returns the number of frames taken off the bus. Malformed frames are
    /// dropped and do not stop the drain.
    pub fn poll(&mut self) -> Result<usize, Error> {
        let mut received = 0;

        loop {
            match self.bus.receive() {
                Ok(frame) => {
                    received += 1;
                    let _ = self.handle_frame(&frame);
                }
                Err(nb::Error::WouldBlock) => return Ok(received),
                Err(nb::Error::Other(e)) => {
                    warn!("DMC5: receive failed: {:?}", e);
                    return Err(Error::Receive);
                }
            }
        }
    }

    /// Handles a frame delivered by the transport
    ///
    /// Frames outside the two subscriptions are not for us and ignored.
    pub fn handle_frame<F: Frame>(&mut self, frame: &F) -> Result<(), Error> {
        let id = match frame.id() {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => {
                trace!("DMC5: ignoring extended frame {:X}", id.as_raw());
                return Ok(());
            }
        };

        if frame.is_remote_frame()
            || !(STATUS_FILTER.matches(id) || TEMPERATURE_FILTER.matches(id))
        {
            trace!("DMC5: ignoring frame {:X}", id);
            return Ok(());
        }

        self.dispatch(id, frame.data())
    }

    /// Decodes a DMC5 frame into the telemetry
    ///
    /// Unknown identifiers are logged and dropped. A payload that is not 8
    /// bytes long leaves the telemetry untouched and is reported.
    pub fn dispatch(&mut self, id: u32, data: &[u8]) -> Result<(), Error> {
        let result = self.decode(id, data);
        if let Err(ref e) = result {
            debug!("DMC5: dropped frame: {}", e);
        }
        result
    }

    fn decode(&mut self, id: u32, data: &[u8]) -> Result<(), Error> {
        match FrameId::from_u32(id) {
            Some(FrameId::Status) => {
                let status = Status::decode(data)?;
                debug!(
                    "status: {:X}, torque avail: {}Nm, actual torque: {}Nm, speed actual: {}rpm",
                    status.bits,
                    torque_nm(status.torque_available),
                    torque_nm(status.torque_actual),
                    status.speed_actual
                );
                self.telemetry.apply_status(&status);
                diagnostics::report(&STATUS_CONDITIONS, u32::from(status.bits));
            }
            Some(FrameId::ActualValues) => {
                let values = ActualValues::decode(data)?;
                debug!(
                    "actual values: DC Volts: {}V, DC current: {}A, AC current: {}A, mechPower: {}kW",
                    values.dc_voltage_volts(),
                    values.dc_current_amps(),
                    values.ac_current_amps(),
                    values.mechanical_power_kw()
                );
                self.telemetry.apply_actual_values(&values);
            }
            Some(FrameId::Errors) => {
                let errors = Errors::decode(data)?;
                debug!("errors: {:X}, warning: {:X}", errors.errors, errors.warnings);
                self.telemetry.apply_errors(&errors);
                diagnostics::report(&ERROR_CONDITIONS, errors.errors);
                diagnostics::report(&WARNING_CONDITIONS, u32::from(errors.warnings));
            }
            Some(FrameId::TorqueLimit) => {
                let limit = TorqueLimit::decode(data)?;
                debug!(
                    "torque limit: max positive: {}Nm, min negative: {}Nm, limiter state: {}",
                    torque_nm(limit.max_positive_torque),
                    torque_nm(limit.min_negative_torque),
                    limit.limiter_state
                );
                self.telemetry.apply_torque_limit(&limit);
            }
            Some(FrameId::Temperature) => {
                let temp = Temperature::decode(data)?;
                debug!(
                    "temperature: inverter: {}C, motor: {}C, system: {}C",
                    temp.inverter_celsius(),
                    temp.motor_celsius(),
                    temp.system_celsius()
                );
                self.telemetry.apply_temperature(&temp);
            }
            _ => debug!("DMC5: received unknown frame id {:X}", id),
        }

        Ok(())
    }

    /// Requests a torque in 0.1Nm, clamped to the configured maximum
    pub fn set_torque(&mut self, torque: i16) {
        let max = self.config.max_torque.saturating_abs();
        self.requested_torque = torque.max(-max).min(max);
    }

    /// Requests a speed in rpm, clamped to the configured maximum
    pub fn set_speed(&mut self, rpm: i16) {
        let max = self.config.max_rpm.saturating_abs();
        self.requested_rpm = rpm.max(-max).min(max);
    }

    /// Requests a throttle level in 0.1%, -1000 to 1000
    ///
    /// Scales the configured maximum torque or speed, depending on the power
    /// mode.
    pub fn set_throttle(&mut self, throttle: i16) {
        let throttle = throttle.max(-1000).min(1000);
        self.requested_throttle = throttle;

        match self.power_mode {
            PowerMode::Torque => {
                let max = i32::from(self.config.max_torque.saturating_abs());
                let torque = max * i32::from(throttle) / 1000;
                self.set_torque(torque as i16);
            }
            PowerMode::Speed => {
                let max = i32::from(self.config.max_rpm.saturating_abs());
                let rpm = max * i32::from(throttle) / 1000;
                self.set_speed(rpm as i16);
            }
        }
    }

    /// Switches between torque and speed control
    pub fn set_power_mode(&mut self, mode: PowerMode) {
        self.power_mode = mode;
    }

    /// Current power mode
    pub fn power_mode(&self) -> PowerMode {
        self.power_mode
    }

    /// Requested torque in 0.1Nm
    pub fn requested_torque(&self) -> i16 {
        self.requested_torque
    }

    /// Requested speed in rpm
    pub fn requested_rpm(&self) -> i16 {
        self.requested_rpm
    }

    /// Requested throttle in 0.1%
    pub fn requested_throttle(&self) -> i16 {
        self.requested_throttle
    }

    /// Last reported inverter state
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Ticks since the last `DMC_CTRL2` / `DMC_LIM`, 0 to 4
    pub fn tick_counter(&self) -> u8 {
        self.tick_counter
    }

    /// Frames the transport refused so far
    pub fn dropped_frames(&self) -> u32 {
        self.dropped_frames
    }

    /// Configuration in use
    pub fn config(&self) -> &DmcConfig {
        &self.config
    }

    /// Underlying transport
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Underlying transport, mutable
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
