//! Brusa DMC5 motor controller library
//!
//! Drives a DMC5 inverter over CAN: a [`DmcController`] re-sends the command
//! frames on every scheduler tick, gated by the state the inverter reports
//! back, and decodes the inverter's status, error and telemetry frames. A
//! [`ThrottleDetector`] runs the independent pedal calibration procedure for
//! one or two potentiometers.
//!
//! All multi-byte fields on the wire are big-endian and every frame carries
//! exactly 8 data bytes.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

use core::convert::TryInto;
use failure::Fail;

pub mod commands;
pub mod config;
pub mod controller;
pub mod detector;
pub mod device;
pub mod diagnostics;
pub mod responses;
pub mod throttle;

pub use crate::config::{DetectorConfig, DmcConfig};
pub use crate::controller::{DmcController, PowerMode, Telemetry};
pub use crate::detector::{CalibrationResult, DetectionState, ThrottleDetector};

/// Length of every DMC5 frame payload
pub const FRAME_LEN: usize = 8;

/// Errors returned if an operation fails
#[derive(Fail, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// Payload was not exactly 8 bytes long
    #[fail(display = "frame {:#x} carries {} bytes, expected 8", id, len)]
    InvalidLength {
        /// Identifier of the offending frame
        id: u32,
        /// Number of bytes received
        len: usize,
    },
    /// Identifier cannot be put on the bus as a standard frame
    #[fail(display = "invalid frame identifier {:#x}", _0)]
    InvalidId(u32),
    /// Transport did not accept one or more frames
    #[fail(display = "Error occured during transmit")]
    Transmit,
    /// Transport reported a receive error
    #[fail(display = "Error occured during receive")]
    Receive,
    /// A calibration run is already active on this throttle
    #[fail(display = "Throttle calibration already in progress")]
    CalibrationInProgress,
}

/// CAN identifiers used by the DMC5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameId {
    /// Primary command, sent every tick (DMC_CTRL)
    Control,
    /// Voltage and current limits, sent every 5th tick (DMC_LIM)
    Limits,
    /// Secondary command, sent every 5th tick (DMC_CTRL2)
    Control2,
    /// Readiness, limitations, torque and speed (DMC_TRQS)
    Status,
    /// DC/AC electrical values (DMC_ACTV)
    ActualValues,
    /// Error and warning words (DMC_ERR)
    Errors,
    /// Torque limiter state (DMC_TRQS2)
    TorqueLimit,
    /// Inverter, motor and system temperatures (DMC_TEMP)
    Temperature,
}

impl FrameId {
    /// Raw 11 bit identifier
    pub fn value(self) -> u32 {
        match self {
            FrameId::Control => 0x210,
            FrameId::Limits => 0x211,
            FrameId::Control2 => 0x212,
            FrameId::Status => 0x258,
            FrameId::ActualValues => 0x259,
            FrameId::Errors => 0x25a,
            FrameId::TorqueLimit => 0x268,
            FrameId::Temperature => 0x458,
        }
    }

    /// Looks up a raw identifier, `None` if the DMC5 does not use it
    pub fn from_u32(id: u32) -> Option<Self> {
        match id {
            0x210 => Some(FrameId::Control),
            0x211 => Some(FrameId::Limits),
            0x212 => Some(FrameId::Control2),
            0x258 => Some(FrameId::Status),
            0x259 => Some(FrameId::ActualValues),
            0x25a => Some(FrameId::Errors),
            0x268 => Some(FrameId::TorqueLimit),
            0x458 => Some(FrameId::Temperature),
            _ => None,
        }
    }
}

/// Checks that `data` is a complete DMC5 payload
///
/// Short or long payloads are a protocol violation and are never padded or
/// truncated.
pub fn payload(id: u32, data: &[u8]) -> Result<&[u8; FRAME_LEN], Error> {
    data.try_into().map_err(|_| Error::InvalidLength {
        id,
        len: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_ids_round_trip_through_lookup() {
        for id in [
            FrameId::Control,
            FrameId::Limits,
            FrameId::Control2,
            FrameId::Status,
            FrameId::ActualValues,
            FrameId::Errors,
            FrameId::TorqueLimit,
            FrameId::Temperature,
        ]
        .iter()
        {
            assert_eq!(FrameId::from_u32(id.value()), Some(*id));
        }
        assert_eq!(FrameId::from_u32(0x260), None);
    }

    #[test]
    fn payload_rejects_wrong_length() {
        assert_eq!(
            payload(0x258, &[0; 7]),
            Err(Error::InvalidLength { id: 0x258, len: 7 })
        );
        assert_eq!(
            payload(0x258, &[0; 9]),
            Err(Error::InvalidLength { id: 0x258, len: 9 })
        );
        assert_eq!(payload(0x258, &[1; 8]), Ok(&[1u8; 8]));
    }
}
