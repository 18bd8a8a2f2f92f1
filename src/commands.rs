//! Commands sent to the DMC5

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::FRAME_LEN;

bitflags! {
    /// Control word, byte 0 of `DMC_CTRL`
    pub struct ControlBits: u8 {
        /// Allow positive torque / speed
        const ENABLE_POSITIVE_TORQUE_SPEED = 1 << 1;
        /// Allow negative torque / speed
        const ENABLE_NEGATIVE_TORQUE_SPEED = 1 << 2;
        /// Ask the controller to clear its latched error
        const CLEAR_ERROR_LATCH = 1 << 3;
        /// Enable the oscillation limiter
        const ENABLE_OSCILLATION_LIMITER = 1 << 5;
        /// Speed mode instead of torque mode
        const ENABLE_SPEED_MODE = 1 << 6;
        /// Enable the power stage
        const ENABLE_POWER_STAGE = 1 << 7;
    }
}

/// Primary command (`DMC_CTRL`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    /// Control bits
    pub bits: ControlBits,
    /// Requested speed in rpm
    pub speed: i16,
    /// Requested torque in 0.01Nm
    pub torque: i16,
}

impl Control {
    /// Payload with unused bytes zeroed
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut data = [0u8; FRAME_LEN];
        data[0] = self.bits.bits();
        BigEndian::write_i16(&mut data[2..4], self.speed);
        BigEndian::write_i16(&mut data[4..6], self.torque);
        data
    }
}

/// Secondary command (`DMC_CTRL2`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control2 {
    /// Torque slew rate in 0.01Nm/s, 0 disables
    pub torque_slew_rate: u16,
    /// Speed slew rate in rpm/s, 0 disables
    pub speed_slew_rate: u16,
    /// Max mechanical power while motoring in 4W steps
    pub max_mechanical_power_motor: u16,
    /// Max mechanical power while regenerating in 4W steps
    pub max_mechanical_power_regen: u16,
}

impl Control2 {
    /// Payload
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut data = [0u8; FRAME_LEN];
        BigEndian::write_u16(&mut data[0..2], self.torque_slew_rate);
        BigEndian::write_u16(&mut data[2..4], self.speed_slew_rate);
        BigEndian::write_u16(&mut data[4..6], self.max_mechanical_power_motor);
        BigEndian::write_u16(&mut data[6..8], self.max_mechanical_power_regen);
        data
    }
}

/// DC limits (`DMC_LIM`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Minimum DC voltage while motoring in 0.1V
    pub dc_voltage_limit_motor: u16,
    /// Maximum DC voltage while regenerating in 0.1V
    pub dc_voltage_limit_regen: u16,
    /// DC current limit while motoring in 0.1A
    pub dc_current_limit_motor: u16,
    /// DC current limit while regenerating in 0.1A
    pub dc_current_limit_regen: u16,
}

impl Limits {
    /// Payload
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut data = [0u8; FRAME_LEN];
        BigEndian::write_u16(&mut data[0..2], self.dc_voltage_limit_motor);
        BigEndian::write_u16(&mut data[2..4], self.dc_voltage_limit_regen);
        BigEndian::write_u16(&mut data[4..6], self.dc_current_limit_motor);
        BigEndian::write_u16(&mut data[6..8], self.dc_current_limit_regen);
        data
    }
}
