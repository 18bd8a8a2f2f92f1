//! Raw throttle potentiometer access

/// Potentiometer channel of a throttle pedal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// First potentiometer, always wired
    First,
    /// Second potentiometer, optional
    Second,
}

/// Raw ADC readings of up to two throttle potentiometers
///
/// An unconnected channel reads as grounded, close to 0.
pub trait PotentiometerReader {
    /// Raw reading of `channel`
    fn read(&mut self, channel: Channel) -> u16;
}
