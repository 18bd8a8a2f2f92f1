#![allow(dead_code)]

use std::collections::VecDeque;

use brusa_dmc::device::{AcceptanceFilter, DeviceId, MaskedId, Scheduler};
use embedded_hal::can::{self, nb::Can, ExtendedId, Id, StandardId};

#[derive(Debug, Clone, PartialEq)]
pub struct TestFrame {
    pub id: Id,
    pub remote: bool,
    pub data: Vec<u8>,
}

impl TestFrame {
    pub fn standard(id: u16, data: &[u8]) -> Self {
        TestFrame {
            id: Id::Standard(StandardId::new(id).unwrap()),
            remote: false,
            data: data.to_vec(),
        }
    }

    pub fn extended(id: u32, data: &[u8]) -> Self {
        TestFrame {
            id: Id::Extended(ExtendedId::new(id).unwrap()),
            remote: false,
            data: data.to_vec(),
        }
    }

    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => id.as_raw(),
        }
    }
}

impl can::Frame for TestFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        Some(TestFrame {
            id: id.into(),
            remote: false,
            data: data.to_vec(),
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(TestFrame {
            id: id.into(),
            remote: true,
            data: Vec::new(),
        })
    }

    fn is_extended(&self) -> bool {
        match self.id {
            Id::Extended(_) => true,
            Id::Standard(_) => false,
        }
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusError;

impl can::Error for BusError {
    fn kind(&self) -> can::ErrorKind {
        can::ErrorKind::Other
    }
}

/// Records transmitted frames and replays queued ones
#[derive(Debug, Default)]
pub struct MockBus {
    pub sent: Vec<TestFrame>,
    pub rx: VecDeque<TestFrame>,
    pub filters: Vec<MaskedId>,
    /// Frame ids the mailbox refuses
    pub busy: Vec<u32>,
    pub rx_error: bool,
}

impl MockBus {
    pub fn sent_ids(&self) -> Vec<u32> {
        self.sent.iter().map(TestFrame::raw_id).collect()
    }

    pub fn last_sent(&self, id: u32) -> Option<&TestFrame> {
        self.sent.iter().rev().find(|f| f.raw_id() == id)
    }
}

impl Can for MockBus {
    type Frame = TestFrame;
    type Error = BusError;

    fn transmit(&mut self, frame: &TestFrame) -> nb::Result<Option<TestFrame>, BusError> {
        if self.busy.contains(&frame.raw_id()) {
            return Err(nb::Error::WouldBlock);
        }
        self.sent.push(frame.clone());
        Ok(None)
    }

    fn receive(&mut self) -> nb::Result<TestFrame, BusError> {
        if self.rx_error {
            return Err(nb::Error::Other(BusError));
        }
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl AcceptanceFilter for MockBus {
    fn attach(&mut self, filter: MaskedId) {
        self.filters.push(filter);
    }

    fn detach(&mut self, filter: MaskedId) {
        self.filters.retain(|f| *f != filter);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerCall {
    Attach(DeviceId, u32),
    Detach(DeviceId),
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub calls: Vec<SchedulerCall>,
}

impl Scheduler for RecordingScheduler {
    fn attach(&mut self, device: DeviceId, interval_us: u32) {
        self.calls.push(SchedulerCall::Attach(device, interval_us));
    }

    fn detach(&mut self, device: DeviceId) {
        self.calls.push(SchedulerCall::Detach(device));
    }
}
