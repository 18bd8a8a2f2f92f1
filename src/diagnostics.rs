//! Bit level diagnostics reported by the DMC5
//!
//! Every bit of the status, error and warning words maps to one named
//! condition with a fixed log severity.

use log::{log, Level};

/// Log severity of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational
    Info,
    /// Degraded operation
    Warn,
    /// Fault
    Error,
}

impl Severity {
    /// Matching `log` level
    pub fn level(self) -> Level {
        match self {
            Severity::Info => Level::Info,
            Severity::Warn => Level::Warn,
            Severity::Error => Level::Error,
        }
    }
}

/// A single bit of a diagnostic word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    /// Bit mask within the word
    pub mask: u32,
    /// Log severity when set
    pub severity: Severity,
    /// Human readable description
    pub description: &'static str,
}

const fn condition(bit: u32, severity: Severity, description: &'static str) -> Condition {
    Condition {
        mask: 1 << bit,
        severity,
        description,
    }
}

/// Status word (`DMC_TRQS` bytes 0-1)
pub static STATUS_CONDITIONS: [Condition; 15] = [
    condition(0, Severity::Info, "torque limitation is active"),
    condition(1, Severity::Info, "ready"),
    condition(2, Severity::Info, "running"),
    condition(3, Severity::Info, "torque limit by motor model"),
    condition(4, Severity::Info, "torque limit by mechanical power"),
    condition(5, Severity::Info, "torque limit by max torque"),
    condition(6, Severity::Info, "torque limit by AC current"),
    condition(7, Severity::Warn, "torque limit by temperature"),
    condition(8, Severity::Info, "torque limit by speed"),
    condition(9, Severity::Info, "torque limit by DC voltage"),
    condition(10, Severity::Info, "torque limit by DC current"),
    condition(11, Severity::Info, "torque limit by slew rate"),
    condition(12, Severity::Warn, "torque limit by motor temperature"),
    condition(14, Severity::Warn, "warning is present, see warning message"),
    condition(15, Severity::Error, "error is present, see error message"),
];

/// Error word (`DMC_ERR` bytes 0-1 and 4-5)
pub static ERROR_CONDITIONS: [Condition; 27] = [
    condition(0, Severity::Error, "speed sensor supply"),
    condition(1, Severity::Error, "speed sensor"),
    condition(2, Severity::Error, "can limit message invalid"),
    condition(3, Severity::Error, "can control message invalid"),
    condition(4, Severity::Error, "can limit message lost"),
    condition(5, Severity::Error, "overvoltage sky converter"),
    condition(6, Severity::Error, "voltage measurement"),
    condition(7, Severity::Error, "short circuit"),
    condition(8, Severity::Error, "can control message lost"),
    condition(9, Severity::Error, "overtemp"),
    condition(10, Severity::Error, "overtemp motor"),
    condition(11, Severity::Error, "overspeed"),
    condition(12, Severity::Error, "undervoltage"),
    condition(13, Severity::Error, "overvoltage"),
    condition(14, Severity::Error, "overcurrent"),
    condition(15, Severity::Error, "initalisation"),
    condition(16, Severity::Error, "analogInput"),
    condition(17, Severity::Error, "driver shutdown"),
    condition(18, Severity::Error, "power mismatch"),
    condition(19, Severity::Error, "can Control2 message lost"),
    condition(20, Severity::Error, "motor Eeprom"),
    condition(21, Severity::Error, "storage"),
    condition(22, Severity::Error, "lost signal on enable pin"),
    condition(23, Severity::Error, "can communication startup"),
    condition(24, Severity::Error, "internal supply"),
    condition(25, Severity::Error, "AC Overcurrent"),
    condition(26, Severity::Error, "OS trap"),
];

/// Warning word (`DMC_ERR` bytes 6-7)
pub static WARNING_CONDITIONS: [Condition; 10] = [
    condition(0, Severity::Warn, "system check active"),
    condition(1, Severity::Warn, "external shutdown path Aw2 off"),
    condition(2, Severity::Warn, "external shutdown path Aw1 off"),
    condition(3, Severity::Warn, "oscillation limit controller active"),
    condition(4, Severity::Warn, "driver shutdown path active"),
    condition(5, Severity::Warn, "power mismatch detected"),
    condition(6, Severity::Warn, "speed sensor signal"),
    condition(7, Severity::Warn, "HV undervoltage"),
    condition(8, Severity::Warn, "maximum modulation limiter"),
    condition(9, Severity::Warn, "temperature sensor"),
];

/// Conditions of `table` whose bit is set in `word`
pub fn active(table: &'static [Condition], word: u32) -> impl Iterator<Item = &'static Condition> {
    table.iter().filter(move |c| word & c.mask != 0)
}

/// Logs every active condition of `table` once, at its own severity
pub fn report(table: &'static [Condition], word: u32) {
    for c in active(table, word) {
        log!(c.severity.level(), "DMC5: {}", c.description);
    }
}
