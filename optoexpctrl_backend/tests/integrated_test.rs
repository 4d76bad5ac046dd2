use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use maplit::hashmap;
use optocompiler_backend::*;
use optoexpctrl_backend::*;

fn registry(n: usize) -> StimulusPoints {
    let mut points = StimulusPoints::new();
    for i in 0..n {
        points.add_point([10.0 * i as f64, 0.0], 0);
    }
    points
}

fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        wait_poll_interval: 0.01,
        ..Default::default()
    }
}

fn executor(device: SimulatedLabJack, config: ExecutorConfig) -> (SequenceExecutor<SimulatedLabJack>, Arc<RecordingDisplay>) {
    let display = Arc::new(RecordingDisplay::new());
    let executor = SequenceExecutor::new(device, display.clone(), config).unwrap();
    (executor, display)
}

/// Two elements: laser on over point 0, then laser off over point 1.
fn two_element_program(loop_count: usize, duration: f64) -> (Program, StimulusPoints) {
    let points = registry(3);
    let elements = vec![
        ProtocolElement::new(vec![SelectedStimulusPoint::normal(0)], true, false, false, false, duration).unwrap(),
        ProtocolElement::timed(vec![SelectedStimulusPoint::normal(1)], duration).unwrap(),
    ];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, loop_count, &points).unwrap();
    (program, points)
}

fn drain(events: &Receiver<ExecutorEvent>) -> Vec<ExecutorEvent> {
    events.try_iter().collect()
}

fn progress_count(events: &[ExecutorEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ExecutorEvent::LoopProgress(_)))
        .count()
}

#[test]
fn completed_run_emits_events_in_order() {
    let (program, points) = two_element_program(2, 0.01);
    let (mut executor, display) = executor(SimulatedLabJack::new(), fast_config());
    let events = executor.subscribe();

    executor.start(&program, &points).unwrap();
    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert_eq!(executor.state(), ExecutorState::Completed);

    let kinds: Vec<String> = drain(&events)
        .iter()
        .map(|event| match event {
            ExecutorEvent::ElementChanged {
                loop_index,
                element_index,
                ..
            } => format!("element {} {}", loop_index, element_index),
            ExecutorEvent::LoopProgress(p) => format!("progress {}", p),
            other => format!("{:?}", other),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "Started",
            "element 0 0",
            "element 0 1",
            "progress 0.5",
            "element 1 0",
            "element 1 1",
            "progress 1",
            "DisplayCleared",
            "Completed",
        ]
    );
    assert_eq!(display.frames(), vec![vec![0], vec![1], vec![0], vec![1], vec![]]);

    let device = executor.device();
    let device = device.lock();
    assert_eq!(
        device.executed(),
        &[
            vec![Command::BitStateWrite { fio: Fio::Fio4, state: true }],
            vec![Command::BitStateWrite { fio: Fio::Fio4, state: false }],
            vec![Command::BitStateWrite { fio: Fio::Fio4, state: true }],
            vec![Command::BitStateWrite { fio: Fio::Fio4, state: false }],
        ]
    );
    // Before and after the run
    assert_eq!(device.clear_count(), 2);
    assert!(device.connection_check());
}

#[test]
fn interrupt_stops_at_the_loop_boundary() {
    let (program, points) = two_element_program(3, 0.15);
    let (mut executor, _display) = executor(SimulatedLabJack::new(), fast_config());
    let events = executor.subscribe();

    executor.start(&program, &points).unwrap();
    thread::sleep(Duration::from_millis(50));
    executor.interrupt();
    assert_eq!(
        executor.join(),
        Some(RunOutcome::Interrupted(InterruptReason::Requested))
    );
    assert_eq!(executor.state(), ExecutorState::Interrupted);

    let events = drain(&events);
    assert_eq!(progress_count(&events), 1);
    assert!(!events.iter().any(|event| matches!(
        event,
        ExecutorEvent::ElementChanged { loop_index, .. } if *loop_index > 0
    )));
    assert_eq!(
        &events[events.len() - 2..],
        &[
            ExecutorEvent::DisplayCleared,
            ExecutorEvent::Interrupted(InterruptReason::Requested)
        ]
    );
}

#[test]
fn interruptible_waits_end_the_element_early() {
    let (program, points) = two_element_program(2, 10.0);
    let config = ExecutorConfig {
        interrupt_during_waits: true,
        ..fast_config()
    };
    let (mut executor, _display) = executor(SimulatedLabJack::new(), config);
    let events = executor.subscribe();

    let start = Instant::now();
    executor.start(&program, &points).unwrap();
    thread::sleep(Duration::from_millis(50));
    executor.interrupt();
    assert_eq!(
        executor.join(),
        Some(RunOutcome::Interrupted(InterruptReason::Requested))
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(progress_count(&drain(&events)), 0);
}

#[test]
fn hardware_failure_interrupts_without_retry() {
    let (program, points) = two_element_program(2, 0.0);
    let mut device = SimulatedLabJack::new();
    device.fail_on_batch(1);
    let (mut executor, display) = executor(device, fast_config());
    let events = executor.subscribe();

    executor.start(&program, &points).unwrap();
    let outcome = executor.join();
    assert!(matches!(
        outcome,
        Some(RunOutcome::Interrupted(InterruptReason::Hardware(_)))
    ));

    let events = drain(&events);
    assert_eq!(progress_count(&events), 0);
    assert!(matches!(
        events.last(),
        Some(ExecutorEvent::Interrupted(InterruptReason::Hardware(_)))
    ));
    assert_eq!(display.last_frame(), Some(vec![]));
    let device = executor.device();
    assert_eq!(device.lock().executed().len(), 1);
    assert!(device.lock().connection_check());
}

#[test]
fn waiting_element_polls_until_the_line_drops() {
    let points = registry(2);
    let elements = vec![ProtocolElement::waiting(vec![SelectedStimulusPoint::normal(1)]).unwrap()];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();

    let mut device = SimulatedLabJack::new();
    device.set_input(Fio::Fio7, true);
    let (mut executor, _display) = executor(device, fast_config());

    let start = Instant::now();
    executor.start(&program, &points).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(executor.is_running());
    executor.device().lock().set_input(Fio::Fio7, false);

    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(executor.device().lock().read_count() >= 2);
}

#[test]
fn trigger_level_is_configurable() {
    let points = registry(1);
    let elements = vec![ProtocolElement::waiting(vec![]).unwrap()];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();

    let mut device = SimulatedLabJack::new();
    device.set_input(Fio::Fio7, true);
    let config = ExecutorConfig {
        wait_trigger_level: true,
        ..fast_config()
    };
    let (mut executor, _display) = executor(device, config);
    executor.start(&program, &points).unwrap();
    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert_eq!(executor.device().lock().read_count(), 1);
}

#[test]
fn start_is_validated_synchronously() {
    let points = registry(2);
    let empty = Program::generate_with(&[], Pattern::Normal, 0, 1, &points).unwrap();
    let (mut executor, _display) = executor(SimulatedLabJack::new(), fast_config());
    assert!(matches!(
        executor.start(&empty, &points),
        Err(ExecutorError::EmptyProgram)
    ));
    assert_eq!(executor.state(), ExecutorState::Idle);

    let (program, points) = two_element_program(2, 0.2);
    executor.start(&program, &points).unwrap();
    assert!(matches!(
        executor.start(&program, &points),
        Err(ExecutorError::Busy)
    ));
    assert!(matches!(
        executor.start_states(vec![LabJackState::default()], 1, 0.0),
        Err(ExecutorError::Busy)
    ));
    executor.interrupt();
    executor.join();

    // A finished executor accepts a new run
    executor.start(&program, &points).unwrap();
    executor.interrupt();
    assert!(executor.join().is_some());
}

#[test]
fn waiting_program_needs_a_wait_line() {
    let json = serde_json::to_string(&hashmap! {
        "line_mapping" => hashmap! { "FIO4" => "Laser", "FIO5" => "PMT" },
    })
    .unwrap();
    let config = ExecutorConfig::from_json_str(&json).unwrap();
    let points = registry(1);
    let elements = vec![ProtocolElement::waiting(vec![]).unwrap()];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();

    let (mut executor, _display) = executor(SimulatedLabJack::new(), config);
    assert!(matches!(
        executor.start(&program, &points),
        Err(ExecutorError::MissingWaitLine)
    ));
}

#[test]
fn raw_states_repeat_with_progress() {
    let mut first = LabJackState {
        duration: 0.005,
        ..Default::default()
    };
    first.set_line(Fio::Fio4, true);
    first.set_voltage(Dac::Dac0, 2.5);
    let second = LabJackState {
        duration: 0.005,
        ..Default::default()
    };

    let (mut executor, display) = executor(SimulatedLabJack::new(), fast_config());
    let events = executor.subscribe();
    executor.start_states(vec![first, second], 3, 0.01).unwrap();
    assert_eq!(executor.join(), Some(RunOutcome::Completed));

    let events = drain(&events);
    assert_eq!(progress_count(&events), 3);
    assert!(!events.contains(&ExecutorEvent::DisplayCleared));
    assert!(display.frames().is_empty());

    let device = executor.device();
    let device = device.lock();
    assert_eq!(device.executed().len(), 6);
    assert_eq!(
        device.executed()[0],
        vec![
            Command::BitStateWrite { fio: Fio::Fio4, state: true },
            Command::Dac8 { dac: Dac::Dac0, code: 128 },
        ]
    );
}

#[test]
fn raw_states_are_validated() {
    let (mut executor, _display) = executor(SimulatedLabJack::new(), fast_config());
    assert!(matches!(
        executor.start_states(vec![LabJackState::default()], 0, 0.0),
        Err(ExecutorError::InvalidRepetitions(0))
    ));
    assert!(matches!(
        executor.start_states(vec![], 2, 0.0),
        Err(ExecutorError::EmptyProgram)
    ));
    let bad = LabJackState {
        duration: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        executor.start_states(vec![LabJackState::default(), bad], 1, 0.0),
        Err(ExecutorError::InvalidStateDuration { index: 1, .. })
    ));
}

#[test]
fn generation_failure_on_the_worker_is_reported() {
    let points = registry(3);
    let mut seq = ProtocolSequence::new(Pattern::IncrementByOne, 0);
    seq.push(ProtocolElement::timed(vec![SelectedStimulusPoint::new(9, Pattern::IncrementByOne)], 0.0).unwrap());

    let (mut executor, display) = executor(SimulatedLabJack::new(), fast_config());
    let events = executor.subscribe();
    executor.start_sequence(&seq, &points, 2).unwrap();
    assert!(matches!(
        executor.join(),
        Some(RunOutcome::Interrupted(InterruptReason::Generation(_)))
    ));
    let events = drain(&events);
    assert_eq!(events.first(), Some(&ExecutorEvent::Started));
    assert!(matches!(
        events.last(),
        Some(ExecutorEvent::Interrupted(InterruptReason::Generation(_)))
    ));
    assert_eq!(display.frames(), vec![Vec::<usize>::new()]);
}

#[test]
fn sequence_runs_generate_on_the_worker() {
    let points = registry(4);
    let mut seq = ProtocolSequence::new(Pattern::IncrementByOne, 0);
    seq.push(ProtocolElement::timed(vec![SelectedStimulusPoint::new(2, Pattern::IncrementByOne)], 0.0).unwrap());

    let (mut executor, display) = executor(SimulatedLabJack::new(), fast_config());
    executor.start_sequence(&seq, &points, 4).unwrap();
    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert_eq!(display.frames(), vec![vec![2], vec![3], vec![0], vec![1], vec![]]);
}

#[test]
fn disconnected_device_still_drives_the_display() {
    let (program, points) = two_element_program(2, 0.0);
    let (mut executor, display) = executor(SimulatedLabJack::disconnected(), fast_config());
    executor.start(&program, &points).unwrap();
    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert_eq!(display.frames().len(), 5);
    assert!(executor.device().lock().executed().is_empty());
    assert!(matches!(executor.clear_lines(), Err(ExecutorError::Device(_))));
}

#[test]
fn wait_on_a_disconnected_device_is_a_hardware_failure() {
    let points = registry(2);
    let elements = vec![
        ProtocolElement::timed(vec![SelectedStimulusPoint::normal(0)], 0.0).unwrap(),
        ProtocolElement::waiting(vec![SelectedStimulusPoint::normal(1)]).unwrap(),
    ];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 2, &points).unwrap();
    let (mut executor, display) = executor(SimulatedLabJack::disconnected(), fast_config());
    let events = executor.subscribe();

    executor.start(&program, &points).unwrap();
    assert!(matches!(
        executor.join(),
        Some(RunOutcome::Interrupted(InterruptReason::Hardware(_)))
    ));
    assert_eq!(display.frames(), vec![vec![0], vec![1], vec![]]);
    assert_eq!(progress_count(&drain(&events)), 0);
}

#[test]
fn connection_check_is_suspended_for_the_whole_run() {
    let points = registry(1);
    let elements = vec![ProtocolElement::waiting(vec![SelectedStimulusPoint::normal(0)]).unwrap()];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();

    let mut device = SimulatedLabJack::new();
    device.set_input(Fio::Fio7, true);
    let (mut executor, _display) = executor(device, fast_config());
    assert!(executor.device().lock().connection_check());

    executor.start(&program, &points).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(executor.is_running());
    assert!(!executor.device().lock().connection_check());

    executor.device().lock().set_input(Fio::Fio7, false);
    assert_eq!(executor.join(), Some(RunOutcome::Completed));
    assert!(executor.device().lock().connection_check());
}

#[test]
fn very_long_elements_still_sleep() {
    let points = registry(1);
    let elements = vec![ProtocolElement::timed(vec![SelectedStimulusPoint::normal(0)], 1e20).unwrap()];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();
    let config = ExecutorConfig {
        interrupt_during_waits: true,
        ..fast_config()
    };
    let (mut executor, _display) = executor(SimulatedLabJack::new(), config);

    executor.start(&program, &points).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(executor.is_running());
    executor.interrupt();
    assert_eq!(
        executor.join(),
        Some(RunOutcome::Interrupted(InterruptReason::Requested))
    );
}

/// Panics whenever it is asked to show points.
struct PanickingDisplay;

impl StimulusDisplay for PanickingDisplay {
    fn display_points(&self, points: &[StimulusPoint]) {
        if !points.is_empty() {
            panic!("display lost");
        }
    }
}

#[test]
fn display_panic_ends_the_run_and_cleans_up() {
    let points = registry(2);
    let elements = vec![
        ProtocolElement::new(vec![], true, false, false, false, 0.0).unwrap(),
        ProtocolElement::timed(vec![SelectedStimulusPoint::normal(1)], 0.0).unwrap(),
    ];
    let program = Program::generate_with(&elements, Pattern::Normal, 0, 1, &points).unwrap();
    let mut executor = SequenceExecutor::new(SimulatedLabJack::new(), Arc::new(PanickingDisplay), fast_config()).unwrap();
    let events = executor.subscribe();

    executor.start(&program, &points).unwrap();
    let outcome = executor.join();
    assert!(matches!(
        &outcome,
        Some(RunOutcome::Interrupted(InterruptReason::Panicked(message))) if message.contains("display lost")
    ));
    assert_eq!(executor.state(), ExecutorState::Interrupted);

    let events = drain(&events);
    assert!(matches!(
        &events[events.len() - 2..],
        [
            ExecutorEvent::DisplayCleared,
            ExecutorEvent::Interrupted(InterruptReason::Panicked(_))
        ]
    ));
    {
        let device = executor.device();
        let device = device.lock();
        // The laser went high in the first element and was cleared afterwards
        assert_eq!(device.executed().len(), 1);
        assert!(!device.output(Fio::Fio4));
        assert!(device.connection_check());
    }

    assert!(executor.start(&program, &points).is_ok());
    assert!(executor.join().is_some());
}
