// SPDX-FileCopyrightText: The midiplug authors
// SPDX-License-Identifier: MPL-2.0

use std::time::{Duration, Instant};

use super::*;
use crate::{
    notify::{
        INPUT_DEVICE_ATTACHED, INPUT_DEVICE_DETACHED, OUTPUT_DEVICE_ATTACHED,
        OUTPUT_DEVICE_DETACHED,
    },
    transport::mock::{
        hardware_endpoint, notification, virtual_endpoint, MockTransport, RecordingSink,
    },
};

fn new_reconciler(transport: &MockTransport, sink: &RecordingSink) -> HotplugReconciler {
    let config = Config::default().with_idle_backoff(Duration::from_millis(1));
    let context = HotplugContext::new(transport.clone(), sink.clone(), config);
    HotplugReconciler::new(Arc::new(context))
}

fn wait_for_workers(reconciler: &mut HotplugReconciler, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        reconciler.reap_finished_workers();
        if reconciler.worker_count() == count {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn attach_and_detach_on_visibility_change() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![
            hardware_endpoint(1, Direction::Input, "Keys"),
            hardware_endpoint(1, Direction::Output, "Keys"),
        ],
    );
    transport.set_visible(
        DeviceFamily::Virtual,
        vec![virtual_endpoint(128, Direction::Output, "Synth")],
    );
    reconciler.tick();
    assert_eq!(
        vec![
            notification(INPUT_DEVICE_ATTACHED, "hw:1-0-0"),
            notification(OUTPUT_DEVICE_ATTACHED, "hw:1-0-0"),
            notification(OUTPUT_DEVICE_ATTACHED, "seq:128-0"),
        ],
        sink.take()
    );
    assert_eq!(1, reconciler.worker_count());

    transport.set_visible(DeviceFamily::Hardware, vec![]);
    reconciler.tick();
    assert_eq!(
        vec![
            notification(INPUT_DEVICE_DETACHED, "hw:1-0-0"),
            notification(OUTPUT_DEVICE_DETACHED, "hw:1-0-0"),
        ],
        sink.take()
    );
    let registry = reconciler.context().registry();
    let id = DeviceId::hardware(1, 0, 0);
    assert!(!registry.contains(EndpointKind::HARDWARE_INPUT, &id));
    assert!(!registry.contains(EndpointKind::HARDWARE_OUTPUT, &id));
    assert!(registry.contains(
        EndpointKind::VIRTUAL_OUTPUT,
        &DeviceId::virtual_port(128, 0)
    ));

    // The cancelled worker terminates and is reaped
    assert!(wait_for_workers(&mut reconciler, 0));
}

#[test]
fn attach_before_detach_within_family() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![
            hardware_endpoint(1, Direction::Output, "A"),
            hardware_endpoint(2, Direction::Output, "B"),
        ],
    );
    reconciler.tick();
    assert_eq!(2, sink.take().len());

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![
            hardware_endpoint(2, Direction::Output, "B"),
            hardware_endpoint(3, Direction::Output, "C"),
        ],
    );
    reconciler.tick();
    assert_eq!(
        vec![
            notification(OUTPUT_DEVICE_ATTACHED, "hw:3-0-0"),
            notification(OUTPUT_DEVICE_DETACHED, "hw:1-0-0"),
        ],
        sink.take()
    );
    let mut registered = reconciler
        .context()
        .registry()
        .device_ids(EndpointKind::HARDWARE_OUTPUT);
    registered.sort();
    assert_eq!(
        vec![DeviceId::hardware(2, 0, 0), DeviceId::hardware(3, 0, 0)],
        registered
    );
}

#[test]
fn attach_is_idempotent() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);

    transport.set_visible(
        DeviceFamily::Virtual,
        vec![
            virtual_endpoint(20, Direction::Input, "Sequencer"),
            virtual_endpoint(20, Direction::Output, "Sequencer"),
        ],
    );
    reconciler.tick();
    assert_eq!(2, sink.take().len());
    reconciler.tick();
    reconciler.tick();
    assert!(sink.take().is_empty());
    assert_eq!(2, transport.open_count());
    assert_eq!(1, reconciler.worker_count());

    reconciler.shutdown().unwrap();
}

#[test]
fn names_are_cached_on_first_discovery() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);
    let id = DeviceId::hardware(2, 0, 0);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![hardware_endpoint(2, Direction::Output, "Pads")],
    );
    reconciler.tick();
    transport.set_visible(DeviceFamily::Hardware, vec![]);
    reconciler.tick();
    transport.set_visible(
        DeviceFamily::Hardware,
        vec![hardware_endpoint(2, Direction::Output, "Renamed")],
    );
    reconciler.tick();

    assert_eq!(
        Some("Pads"),
        reconciler
            .context()
            .registry()
            .name_for(&id)
            .as_deref()
            .map(String::as_str)
    );
    assert_eq!(
        vec![
            notification(OUTPUT_DEVICE_ATTACHED, "hw:2-0-0"),
            notification(OUTPUT_DEVICE_DETACHED, "hw:2-0-0"),
            notification(OUTPUT_DEVICE_ATTACHED, "hw:2-0-0"),
        ],
        sink.take()
    );
}

#[test]
fn enumeration_failure_skips_detach() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![hardware_endpoint(1, Direction::Output, "Keys")],
    );
    reconciler.tick();
    assert_eq!(1, sink.take().len());

    transport.fail_enumeration(DeviceFamily::Hardware, true);
    reconciler.tick();
    assert!(sink.take().is_empty());
    assert!(reconciler
        .context()
        .registry()
        .contains(EndpointKind::HARDWARE_OUTPUT, &DeviceId::hardware(1, 0, 0)));

    transport.fail_enumeration(DeviceFamily::Hardware, false);
    transport.set_visible(DeviceFamily::Hardware, vec![]);
    reconciler.tick();
    assert_eq!(
        vec![notification(OUTPUT_DEVICE_DETACHED, "hw:1-0-0")],
        sink.take()
    );
}

#[test]
fn open_failure_is_retried() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);
    let id = DeviceId::virtual_port(130, 0);

    transport.set_visible(
        DeviceFamily::Virtual,
        vec![virtual_endpoint(130, Direction::Output, "Busy")],
    );
    transport.fail_open(&id, true);
    reconciler.tick();
    assert!(sink.take().is_empty());

    transport.fail_open(&id, false);
    reconciler.tick();
    assert_eq!(
        vec![notification(OUTPUT_DEVICE_ATTACHED, "seq:130-0")],
        sink.take()
    );
}

#[test]
fn disabled_family_is_ignored() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let config = Config::default().with_family(DeviceFamily::Virtual, false);
    let context = HotplugContext::new(transport.clone(), sink.clone(), config);
    let mut reconciler = HotplugReconciler::new(Arc::new(context));

    transport.set_visible(
        DeviceFamily::Virtual,
        vec![virtual_endpoint(128, Direction::Output, "Synth")],
    );
    reconciler.tick();
    assert!(sink.take().is_empty());
    assert_eq!(0, transport.open_count());
}

#[test]
fn worker_decodes_received_bytes() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);
    let id = DeviceId::hardware(1, 0, 0);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![hardware_endpoint(1, Direction::Input, "Keys")],
    );
    reconciler.tick();

    // Split in the middle of a message, using running status
    transport.push_input(&id, &[0x90, 60]);
    transport.push_input(&id, &[100, 61, 0, 0xf8]);
    let expected = vec![
        notification(INPUT_DEVICE_ATTACHED, "hw:1-0-0"),
        notification("OnMidiNoteOn", "hw:1-0-0,0,60,100"),
        notification("OnMidiNoteOn", "hw:1-0-0,0,61,0"),
        notification("OnMidiTimingClock", "hw:1-0-0"),
    ];
    assert!(sink.wait_until(|received| received.len() >= expected.len()));
    assert_eq!(expected, sink.take());

    reconciler.shutdown().unwrap();
    assert_eq!(0, reconciler.worker_count());
}

#[test]
fn worker_reads_with_empty_buffer_size() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut config = Config::default().with_idle_backoff(Duration::from_millis(1));
    config.read_buffer_size = 0;
    let context = HotplugContext::new(transport.clone(), sink.clone(), config);
    let mut reconciler = HotplugReconciler::new(Arc::new(context));
    let id = DeviceId::hardware(1, 0, 0);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![hardware_endpoint(1, Direction::Input, "Keys")],
    );
    reconciler.tick();
    transport.push_input(&id, &[0xc0, 5]);
    assert!(sink.wait_until(|received| received.len() >= 2));
    assert_eq!(
        vec![
            notification(INPUT_DEVICE_ATTACHED, "hw:1-0-0"),
            notification("OnMidiProgramChange", "hw:1-0-0,0,5"),
        ],
        sink.take()
    );

    reconciler.shutdown().unwrap();
}

#[test]
fn read_failure_detaches_input_and_output_once() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);
    let id = DeviceId::hardware(3, 0, 0);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![
            hardware_endpoint(3, Direction::Input, "Mixer"),
            hardware_endpoint(3, Direction::Output, "Mixer"),
        ],
    );
    reconciler.tick();
    assert_eq!(2, sink.take().len());

    transport.disconnect_input(&id);
    assert!(sink.wait_until(|received| received.len() >= 2));
    assert!(wait_for_workers(&mut reconciler, 0));
    assert_eq!(
        vec![
            notification(INPUT_DEVICE_DETACHED, "hw:3-0-0"),
            notification(OUTPUT_DEVICE_DETACHED, "hw:3-0-0"),
        ],
        sink.take()
    );

    // The reconciler must not report the same transitions again
    transport.set_visible(DeviceFamily::Hardware, vec![]);
    reconciler.tick();
    assert!(sink.take().is_empty());
}

#[test]
fn shutdown_joins_workers_and_clears_registry() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let mut reconciler = new_reconciler(&transport, &sink);

    transport.set_visible(
        DeviceFamily::Hardware,
        vec![
            hardware_endpoint(1, Direction::Input, "A"),
            hardware_endpoint(2, Direction::Input, "B"),
        ],
    );
    transport.set_visible(
        DeviceFamily::Virtual,
        vec![virtual_endpoint(20, Direction::Input, "C")],
    );
    reconciler.tick();
    assert_eq!(3, reconciler.worker_count());
    sink.take();

    reconciler.shutdown().unwrap();
    assert_eq!(0, reconciler.worker_count());
    let registry = reconciler.context().registry();
    assert!(registry.device_ids(EndpointKind::HARDWARE_INPUT).is_empty());
    assert!(registry.device_ids(EndpointKind::VIRTUAL_INPUT).is_empty());
    assert!(sink.take().is_empty());
}

#[test]
fn stale_worker_keeps_reattached_endpoints() {
    let transport = MockTransport::default();
    let sink = RecordingSink::default();
    let reconciler = new_reconciler(&transport, &sink);
    let context = reconciler.context();
    let id = DeviceId::hardware(5, 0, 0);

    // Input and output re-attached after the stale worker had been cancelled
    let stale_token = WorkerToken::new();
    stale_token.cancel();
    assert!(context.registry().insert(
        EndpointKind::HARDWARE_INPUT,
        id.clone(),
        EndpointHandle::Input(WorkerToken::new())
    ));
    let output = transport
        .open_output(&hardware_endpoint(5, Direction::Output, "Pads"))
        .unwrap();
    assert!(context.registry().insert(
        EndpointKind::HARDWARE_OUTPUT,
        id.clone(),
        EndpointHandle::Output(output)
    ));

    context.detach_failed_input(EndpointKind::HARDWARE_INPUT, &id, &stale_token);
    assert!(context
        .registry()
        .contains(EndpointKind::HARDWARE_INPUT, &id));
    assert!(context
        .registry()
        .contains(EndpointKind::HARDWARE_OUTPUT, &id));
    assert!(sink.take().is_empty());
}
