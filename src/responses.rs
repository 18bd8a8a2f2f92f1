//! Frames reported by the DMC5

use byteorder::{BigEndian, ByteOrder};

use crate::{payload, Error, FrameId};

/// Decoded `DMC_TRQS` frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    /// Readiness and limitation bits
    pub bits: u16,
    /// Torque available in 0.01Nm
    pub torque_available: i16,
    /// Actual torque in 0.01Nm
    pub torque_actual: i16,
    /// Actual speed in rpm
    pub speed_actual: i16,
}

impl Status {
    /// Decodes an 8 byte payload
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let data = payload(FrameId::Status.value(), data)?;

        Ok(Status {
            bits: BigEndian::read_u16(&data[0..2]),
            torque_available: BigEndian::read_i16(&data[2..4]),
            torque_actual: BigEndian::read_i16(&data[4..6]),
            speed_actual: BigEndian::read_i16(&data[6..8]),
        })
    }
}

/// Decoded `DMC_ACTV` frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActualValues {
    /// DC voltage in 0.1V
    pub dc_voltage: u16,
    /// DC current in 0.1A
    pub dc_current: i16,
    /// AC current in 0.25A
    pub ac_current: u16,
    /// Mechanical power in 1/62.5kW
    pub mechanical_power: i16,
}

impl ActualValues {
    /// Decodes an 8 byte payload
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let data = payload(FrameId::ActualValues.value(), data)?;

        Ok(ActualValues {
            dc_voltage: BigEndian::read_u16(&data[0..2]),
            dc_current: BigEndian::read_i16(&data[2..4]),
            ac_current: BigEndian::read_u16(&data[4..6]),
            mechanical_power: BigEndian::read_i16(&data[6..8]),
        })
    }

    /// DC voltage in V
    pub fn dc_voltage_volts(&self) -> f32 {
        f32::from(self.dc_voltage) / 10.0
    }

    /// DC current in A
    pub fn dc_current_amps(&self) -> f32 {
        f32::from(self.dc_current) / 10.0
    }

    /// AC current in A
    pub fn ac_current_amps(&self) -> f32 {
        f32::from(self.ac_current) / 4.0
    }

    /// Mechanical power in kW
    pub fn mechanical_power_kw(&self) -> f32 {
        f32::from(self.mechanical_power) / 62.5
    }
}

/// Decoded `DMC_ERR` frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Errors {
    /// Error word
    pub errors: u32,
    /// Warning word
    pub warnings: u16,
}

impl Errors {
    /// Decodes an 8 byte payload
    ///
    /// The error word is split on the wire: bytes 0-1 carry the low half and
    /// bytes 4-5 the high half. Bytes 2-3 are not part of it.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let data = payload(FrameId::Errors.value(), data)?;

        let low = u32::from(BigEndian::read_u16(&data[0..2]));
        let high = u32::from(BigEndian::read_u16(&data[4..6]));

        Ok(Errors {
            errors: low | (high << 16),
            warnings: BigEndian::read_u16(&data[6..8]),
        })
    }
}

/// Decoded `DMC_TRQS2` frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorqueLimit {
    /// Max positive torque in 0.01Nm
    pub max_positive_torque: i16,
    /// Min negative torque in 0.01Nm
    pub min_negative_torque: i16,
    /// Active limiter state
    pub limiter_state: u8,
}

impl TorqueLimit {
    /// Decodes an 8 byte payload
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let data = payload(FrameId::TorqueLimit.value(), data)?;

        Ok(TorqueLimit {
            max_positive_torque: BigEndian::read_i16(&data[0..2]),
            min_negative_torque: BigEndian::read_i16(&data[2..4]),
            limiter_state: data[4],
        })
    }
}

/// Decoded `DMC_TEMP` frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    /// Inverter temperature in 0.5C
    pub inverter: i16,
    /// Motor temperature in 0.5C
    pub motor: i16,
    /// System temperature in C, offset by 50
    pub system: u8,
}

impl Temperature {
    /// Decodes an 8 byte payload
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let data = payload(FrameId::Temperature.value(), data)?;

        Ok(Temperature {
            inverter: BigEndian::read_i16(&data[0..2]),
            motor: BigEndian::read_i16(&data[2..4]),
            system: data[4],
        })
    }

    /// Inverter temperature in C
    pub fn inverter_celsius(&self) -> f32 {
        f32::from(self.inverter) / 2.0
    }

    /// Motor temperature in C
    pub fn motor_celsius(&self) -> f32 {
        f32::from(self.motor) / 2.0
    }

    /// System temperature in C
    pub fn system_celsius(&self) -> i16 {
        i16::from(self.system) - 50
    }
}

/// Converts 0.01Nm to Nm
pub fn torque_nm(centi_nm: i16) -> f32 {
    f32::from(centi_nm) / 100.0
}
