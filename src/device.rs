//! Collaborators the controller is attached to
//!
//! The scheduler, the CAN acceptance filters and the millisecond clock live
//! outside this crate. They are handed in explicitly so tests can swap them.

/// Devices this crate registers with a [`Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceId {
    /// Brusa DMC5 motor controller
    BrusaDmc5,
}

impl DeviceId {
    /// Numeric device id
    pub fn value(self) -> u16 {
        match self {
            DeviceId::BrusaDmc5 => 0x1001,
        }
    }
}

/// Periodic tick source
pub trait Scheduler {
    /// Calls the device's tick handler every `interval_us` microseconds
    fn attach(&mut self, device: DeviceId, interval_us: u32);
    /// Stops ticking the device
    fn detach(&mut self, device: DeviceId);
}

/// Masked standard identifier subscription
///
/// A frame matches if `frame_id & mask == id & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskedId {
    /// Identifier
    pub id: u32,
    /// Bits of the identifier that must match
    pub mask: u32,
}

impl MaskedId {
    /// Standard identifier subscription
    pub const fn standard(id: u32, mask: u32) -> Self {
        MaskedId { id, mask }
    }

    /// Whether `id` passes this filter
    pub fn matches(&self, id: u32) -> bool {
        id & self.mask == self.id & self.mask
    }
}

/// Receive filter configuration of a CAN peripheral
pub trait AcceptanceFilter {
    /// Starts delivering frames that match `filter`
    fn attach(&mut self, filter: MaskedId);
    /// Stops delivering frames that match `filter`
    fn detach(&mut self, filter: MaskedId);
}

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary epoch, wrapping
    fn ms(&self) -> u32;
}
