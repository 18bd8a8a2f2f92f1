mod common;

use brusa_dmc::commands::ControlBits;
use brusa_dmc::controller::{STATUS_FILTER, TEMPERATURE_FILTER};
use brusa_dmc::device::DeviceId;
use brusa_dmc::{DmcConfig, DmcController, Error, PowerMode, Telemetry};

use common::{MockBus, RecordingScheduler, SchedulerCall, TestFrame};

const CONTROL: u32 = 0x210;
const LIMITS: u32 = 0x211;
const CONTROL2: u32 = 0x212;

fn controller() -> DmcController<MockBus> {
    DmcController::new(MockBus::default(), DmcConfig::default())
}

fn status(bits: u16, speed: i16) -> [u8; 8] {
    let [b0, b1] = bits.to_be_bytes();
    let [s0, s1] = speed.to_be_bytes();
    [b0, b1, 0, 0, 0, 0, s0, s1]
}

fn last_control(dmc: &DmcController<MockBus>) -> Vec<u8> {
    dmc.bus().last_sent(CONTROL).unwrap().data.clone()
}

const READY: u16 = 1 << 1;
const RUNNING: u16 = 1 << 2;
const WARNING: u16 = 1 << 14;
const ERROR: u16 = 1 << 15;

#[test]
fn setup_subscribes_and_attaches() {
    let mut dmc = controller();
    let mut scheduler = RecordingScheduler::default();

    dmc.setup(&mut scheduler);

    assert_eq!(
        scheduler.calls,
        vec![
            SchedulerCall::Detach(DeviceId::BrusaDmc5),
            SchedulerCall::Attach(DeviceId::BrusaDmc5, 20_000),
        ]
    );
    assert_eq!(dmc.bus().filters, vec![STATUS_FILTER, TEMPERATURE_FILTER]);

    dmc.teardown(&mut scheduler);
    assert_eq!(
        scheduler.calls.last(),
        Some(&SchedulerCall::Detach(DeviceId::BrusaDmc5))
    );
    assert!(dmc.bus().filters.is_empty());
}

#[test]
fn slow_frames_follow_control_every_fifth_tick() {
    let mut dmc = controller();

    for expected in [1, 2, 3, 4].iter() {
        dmc.handle_tick().unwrap();
        assert_eq!(dmc.tick_counter(), *expected);
    }
    assert_eq!(dmc.bus().sent_ids(), vec![CONTROL; 4]);

    dmc.handle_tick().unwrap();
    assert_eq!(dmc.tick_counter(), 0);
    assert_eq!(
        &dmc.bus().sent_ids()[4..],
        &[CONTROL, CONTROL2, LIMITS][..]
    );

    for _ in 0..10 {
        dmc.handle_tick().unwrap();
    }
    let ids = dmc.bus().sent_ids();
    assert_eq!(ids.iter().filter(|id| **id == CONTROL).count(), 15);
    assert_eq!(ids.iter().filter(|id| **id == CONTROL2).count(), 3);
    assert_eq!(ids.iter().filter(|id| **id == LIMITS).count(), 3);
}

#[test]
fn limit_frames_carry_configuration() {
    let mut dmc = controller();

    for _ in 0..5 {
        dmc.handle_tick().unwrap();
    }

    assert_eq!(
        dmc.bus().last_sent(CONTROL2).unwrap().data,
        vec![0, 0, 0, 0, 0xc3, 0x50, 0xc3, 0x50]
    );
    assert_eq!(
        dmc.bus().last_sent(LIMITS).unwrap().data,
        vec![0x03, 0xe8, 0x03, 0xe8, 0, 0, 0, 0]
    );
}

#[test]
fn idle_controller_only_enables_directions() {
    let mut dmc = controller();

    dmc.handle_tick().unwrap();

    assert_eq!(last_control(&dmc), vec![0x06, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn error_requests_latch_clear_only() {
    let mut dmc = controller();
    dmc.set_torque(100);
    dmc.set_speed(500);

    for speed in [0i16, 999, 1000, 5000, -5000].iter() {
        dmc.dispatch(0x258, &status(ERROR | READY | RUNNING, *speed))
            .unwrap();
        dmc.handle_tick().unwrap();

        let control = last_control(&dmc);
        assert_eq!(control, vec![0x0e, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(control[0] & ControlBits::ENABLE_POWER_STAGE.bits(), 0);
    }
}

#[test]
fn high_speed_keeps_power_stage_enabled() {
    let mut dmc = controller();

    dmc.dispatch(0x258, &status(0, 1500)).unwrap();
    dmc.handle_tick().unwrap();
    assert_eq!(last_control(&dmc)[0], 0x86);

    dmc.dispatch(0x258, &status(0, -1500)).unwrap();
    dmc.handle_tick().unwrap();
    assert_eq!(last_control(&dmc)[0], 0x86);

    dmc.dispatch(0x258, &status(0, 999)).unwrap();
    dmc.handle_tick().unwrap();
    assert_eq!(last_control(&dmc)[0], 0x06);
}

#[test]
fn running_status_frame_scenario() {
    let mut dmc = controller();
    dmc.set_torque(50);
    dmc.set_speed(1200);

    dmc.dispatch(0x258, &[0x00, 0x04, 0x00, 0xc8, 0x00, 0x64, 0x03, 0xe8])
        .unwrap();

    let t = dmc.telemetry();
    assert_eq!(t.status_bits, 0x0004);
    assert_eq!(t.torque_available, 200);
    assert_eq!(t.torque_actual, 100);
    assert_eq!(t.speed_actual, 1000);
    assert!(t.running);
    assert!(!t.ready);
    assert_eq!(t.torque_available_nm(), 2.0);
    assert_eq!(t.torque_actual_nm(), 1.0);

    dmc.handle_tick().unwrap();
    // 1200rpm, 5.0Nm as 500 * 0.01Nm
    assert_eq!(
        last_control(&dmc),
        vec![0x86, 0, 0x04, 0xb0, 0x01, 0xf4, 0, 0]
    );
}

#[test]
fn speed_mode_and_oscillation_limiter_bits() {
    let config = DmcConfig {
        enable_oscillation_limiter: true,
        ..DmcConfig::default()
    };
    let mut dmc = DmcController::new(MockBus::default(), config);
    dmc.set_power_mode(PowerMode::Speed);

    dmc.dispatch(0x258, &status(READY | RUNNING, 0)).unwrap();
    dmc.handle_tick().unwrap();

    assert_eq!(last_control(&dmc)[0], 0x80 | 0x40 | 0x20 | 0x06);
}

#[test]
fn ready_but_not_running_sends_no_setpoints() {
    let mut dmc = controller();
    dmc.set_torque(100);
    dmc.set_speed(100);

    dmc.dispatch(0x258, &status(READY, 0)).unwrap();
    dmc.handle_tick().unwrap();

    assert_eq!(last_control(&dmc), vec![0x86, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn flags_are_recomputed_on_every_status() {
    let mut dmc = controller();

    dmc.dispatch(0x258, &status(READY | RUNNING | WARNING, 0))
        .unwrap();
    let first = dmc.telemetry().clone();
    dmc.dispatch(0x258, &status(READY | RUNNING | WARNING, 0))
        .unwrap();
    assert_eq!(*dmc.telemetry(), first);
    assert!(first.warning);

    dmc.dispatch(0x258, &status(0, 0)).unwrap();
    let t = dmc.telemetry();
    assert!(!t.ready && !t.running && !t.error && !t.warning);
}

#[test]
fn error_clears_once_status_stops_reporting_it() {
    let mut dmc = controller();

    dmc.dispatch(0x258, &status(ERROR, 0)).unwrap();
    dmc.handle_tick().unwrap();
    assert_eq!(last_control(&dmc)[0], 0x0e);

    dmc.dispatch(0x258, &status(READY, 0)).unwrap();
    dmc.handle_tick().unwrap();
    assert_eq!(last_control(&dmc)[0], 0x86);
}

#[test]
fn error_frame_uses_split_byte_pairs() {
    let mut dmc = controller();

    dmc.dispatch(0x25a, &[0x00, 0x80, 0xff, 0xff, 0x02, 0x00, 0x00, 0x81])
        .unwrap();

    let t = dmc.telemetry();
    assert_eq!(t.error_bits, 0x0200_0080);
    assert_eq!(t.warning_bits, 0x0081);
    let errors: Vec<_> = t.active_errors().iter().map(|c| c.description).collect();
    assert_eq!(errors, vec!["short circuit", "AC Overcurrent"]);
    let warnings: Vec<_> = t.active_warnings().iter().map(|c| c.description).collect();
    assert_eq!(warnings, vec!["system check active", "HV undervoltage"]);
}

#[test]
fn telemetry_frames_are_decoded() {
    let mut dmc = controller();

    dmc.dispatch(0x259, &[0x0f, 0xa0, 0x00, 0x64, 0x00, 0x28, 0x00, 0x7d])
        .unwrap();
    dmc.dispatch(0x268, &[0x03, 0xe8, 0xfc, 0x18, 2, 0, 0, 0])
        .unwrap();
    dmc.dispatch(0x458, &[0x00, 0x50, 0x00, 0x64, 75, 0, 0, 0])
        .unwrap();

    let t = dmc.telemetry();
    assert_eq!(t.dc_voltage, 4000);
    assert_eq!(t.dc_current, 100);
    assert_eq!(t.ac_current, 40);
    assert_eq!(t.mechanical_power, 125);
    assert_eq!(t.max_positive_torque, 1000);
    assert_eq!(t.min_negative_torque, -1000);
    assert_eq!(t.limiter_state, 2);
    assert_eq!(t.temperature_inverter, 80);
    assert_eq!(t.temperature_motor, 100);
    assert_eq!(t.temperature_system, 25);
}

#[test]
fn malformed_payload_leaves_state_untouched() {
    let mut dmc = controller();
    dmc.dispatch(0x258, &status(READY, 10)).unwrap();
    let before = dmc.telemetry().clone();

    assert_eq!(
        dmc.dispatch(0x258, &[0, 0, 0, 0]),
        Err(Error::InvalidLength { id: 0x258, len: 4 })
    );
    assert_eq!(*dmc.telemetry(), before);
}

#[test]
fn unknown_ids_are_dropped() {
    let mut dmc = controller();

    assert_eq!(dmc.dispatch(0x25b, &[0xff; 8]), Ok(()));
    assert_eq!(dmc.dispatch(0x210, &[0xff; 8]), Ok(()));
    assert_eq!(*dmc.telemetry(), Telemetry::default());
}

#[test]
fn poll_drains_subscribed_frames() {
    let mut dmc = controller();
    {
        let rx = &mut dmc.bus_mut().rx;
        rx.push_back(TestFrame::standard(0x258, &status(READY, 42)));
        rx.push_back(TestFrame::standard(0x300, &status(ERROR, 0)));
        rx.push_back(TestFrame::extended(0x258, &status(ERROR, 0)));
        rx.push_back(TestFrame::standard(0x458, &[0, 0, 0]));
        rx.push_back(TestFrame::standard(0x459, &status(ERROR, 0)));
    }

    assert_eq!(dmc.poll(), Ok(5));

    let t = dmc.telemetry();
    assert!(t.ready);
    assert!(!t.error);
    assert_eq!(t.speed_actual, 42);
    assert_eq!(dmc.poll(), Ok(0));
}

#[test]
fn poll_reports_receive_errors() {
    let mut dmc = controller();
    dmc.bus_mut().rx_error = true;

    assert_eq!(dmc.poll(), Err(Error::Receive));
}

#[test]
fn busy_mailbox_does_not_skip_later_frames() {
    let mut dmc = controller();
    dmc.bus_mut().busy.push(CONTROL);

    for _ in 0..4 {
        assert_eq!(dmc.handle_tick(), Err(Error::Transmit));
    }
    assert_eq!(dmc.handle_tick(), Err(Error::Transmit));

    assert_eq!(dmc.bus().sent_ids(), vec![CONTROL2, LIMITS]);
    assert_eq!(dmc.dropped_frames(), 5);
    assert_eq!(dmc.tick_counter(), 0);
}

#[test]
fn requests_are_clamped_and_scaled() {
    let config = DmcConfig {
        max_torque: 300,
        max_rpm: 4000,
        ..DmcConfig::default()
    };
    let mut dmc = DmcController::new(MockBus::default(), config);

    dmc.set_torque(1000);
    assert_eq!(dmc.requested_torque(), 300);
    dmc.set_torque(-1000);
    assert_eq!(dmc.requested_torque(), -300);
    dmc.set_speed(i16::min_value());
    assert_eq!(dmc.requested_rpm(), -4000);

    dmc.set_throttle(500);
    assert_eq!(dmc.requested_throttle(), 500);
    assert_eq!(dmc.requested_torque(), 150);

    dmc.set_power_mode(PowerMode::Speed);
    dmc.set_throttle(2000);
    assert_eq!(dmc.requested_throttle(), 1000);
    assert_eq!(dmc.requested_rpm(), 4000);
}

#[test]
fn torque_conversion_saturates() {
    let config = DmcConfig {
        max_torque: i16::max_value(),
        ..DmcConfig::default()
    };
    let mut dmc = DmcController::new(MockBus::default(), config);
    dmc.set_torque(5000);

    dmc.dispatch(0x258, &status(READY | RUNNING, 0)).unwrap();

    assert_eq!(dmc.control_frame().torque, i16::max_value());
}

#[test]
fn negative_limits_clamp_by_magnitude() {
    let config = DmcConfig {
        max_torque: i16::min_value(),
        max_rpm: -4000,
        ..DmcConfig::default()
    };
    let mut dmc = DmcController::new(MockBus::default(), config);

    dmc.set_torque(i16::min_value());
    assert_eq!(dmc.requested_torque(), -i16::max_value());
    dmc.set_torque(250);
    assert_eq!(dmc.requested_torque(), 250);

    dmc.set_speed(5000);
    assert_eq!(dmc.requested_rpm(), 4000);
    dmc.set_speed(-5000);
    assert_eq!(dmc.requested_rpm(), -4000);

    dmc.set_power_mode(PowerMode::Speed);
    dmc.set_throttle(500);
    assert_eq!(dmc.requested_rpm(), 2000);
}
