//! # Sequence execution
//!
//! [`SequenceExecutor`] runs a generated [`Program`] (or a raw list of [`LabJackState`]s) on a
//! dedicated worker thread, driving a [`DigitalIoDevice`] and a [`StimulusDisplay`] in step.
//!
//! ## Run lifecycle
//!
//! `Idle -> Running -> {Completed, Interrupted}`. A finished executor can be started again.
//!
//! 1. `start*` validates synchronously (busy executor, empty program, missing wait line) and
//!    snapshots everything the worker needs: resolved stimulus points, LabJack states and the
//!    configuration. The caller's registry is never touched by the worker.
//! 2. The worker suspends the device's connection check, clears the lines and compiles the
//!    command batches once, from the initial sequence.
//! 3. For every element: show its points, emit [`ExecutorEvent::ElementChanged`], execute its
//!    batch if non-empty, then either poll the wait line or sleep for the element's duration.
//! 4. After every loop: emit [`ExecutorEvent::LoopProgress`], check the interrupt token, then
//!    sleep the inter-loop delay if another loop follows.
//! 5. On any terminal state the display is cleared ([`ExecutorEvent::DisplayCleared`]), the
//!    device lines are cleared, the connection check resumes and [`ExecutorEvent::Completed`] or
//!    [`ExecutorEvent::Interrupted`] is emitted.
//!
//! Device failures end the run immediately with [`InterruptReason::Hardware`]; nothing is retried.
//! A panic inside the element loop (for instance in the display) is caught and ends the run with
//! [`InterruptReason::Panicked`] after the same cleanup.
//!
//! ## Events
//!
//! Owners call [`SequenceExecutor::subscribe`] for a crossbeam receiver of [`ExecutorEvent`]s.
//! Events are one-way; the worker never waits on a subscriber.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, info, log_enabled, warn, Level};
use parking_lot::Mutex;

use optocompiler_backend::{
    CommandBatch, Fio, LabJackState, LineRole, Pattern, Program, ProtocolElement, ProtocolSequence,
    StimulusPoint, StimulusPoints, ValidationError,
};

use crate::config::{ConfigError, ExecutorConfig};
use crate::device::{DeviceError, DigitalIoDevice};
use crate::display::StimulusDisplay;
use crate::interrupt::InterruptToken;
use crate::utils::{secs, TickTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterruptReason {
    /// The owner asked the run to stop.
    Requested,
    Hardware(DeviceError),
    /// Program generation on the worker failed.
    Generation(String),
    /// Code running on the worker panicked; carries the panic message.
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    Started,
    ElementChanged {
        loop_index: usize,
        element_index: usize,
        points: Vec<StimulusPoint>,
    },
    /// Fraction of loops finished, in `(0, 1]`.
    LoopProgress(f64),
    DisplayCleared,
    Completed,
    Interrupted(InterruptReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Interrupted(InterruptReason),
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("a run is already in progress")]
    Busy,
    #[error("nothing to execute: the program has no elements")]
    EmptyProgram,
    #[error("the program waits for a trigger but no line is mapped to Wait")]
    MissingWaitLine,
    #[error("repetitions must be at least 1 (got {0})")]
    InvalidRepetitions(usize),
    #[error("state {index} has an invalid duration {duration}")]
    InvalidStateDuration { index: usize, duration: f64 },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Compile(#[from] optocompiler_backend::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn the executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One element of a run, with everything the worker needs already resolved.
#[derive(Debug, Clone)]
struct Step {
    /// `None` for raw-state runs, which leave the display alone.
    points: Option<Vec<StimulusPoint>>,
    batch: usize,
    wait: bool,
    duration: f64,
}

#[derive(Debug, Clone)]
struct Plan {
    states: Vec<LabJackState>,
    loops: Vec<Vec<Step>>,
    inter_loop_delay: f64,
    wait_line: Option<Fio>,
}

impl Plan {
    fn from_program(
        program: &Program,
        registry: &StimulusPoints,
        config: &ExecutorConfig,
    ) -> optocompiler_backend::Result<Self> {
        let states = program
            .initial_sequence()
            .iter()
            .map(|element| LabJackState::from_element(element, &config.line_mapping))
            .collect();
        let mut loops = Vec::with_capacity(program.loop_count());
        for (loop_index, elements) in program.loops().iter().enumerate() {
            let mut steps = Vec::with_capacity(elements.len());
            for (iteration, element) in elements.iter().enumerate() {
                let points = program
                    .resolve_points(loop_index, iteration, registry)?
                    .into_iter()
                    .cloned()
                    .collect();
                steps.push(Step {
                    points: Some(points),
                    batch: iteration,
                    wait: element.wait(),
                    duration: element.duration(),
                });
            }
            loops.push(steps);
        }
        Ok(Self {
            states,
            loops,
            inter_loop_delay: config.inter_loop_delay,
            wait_line: config.line_mapping.line_for(LineRole::Wait),
        })
    }

    fn from_states(states: Vec<LabJackState>, repetitions: usize, delay: f64) -> Self {
        let steps: Vec<Step> = states
            .iter()
            .enumerate()
            .map(|(batch, state)| Step {
                points: None,
                batch,
                wait: false,
                duration: state.duration,
            })
            .collect();
        Self {
            states,
            loops: vec![steps; repetitions],
            inter_loop_delay: delay,
            wait_line: None,
        }
    }
}

enum Job {
    Run(Plan),
    Generate {
        elements: Vec<ProtocolElement>,
        pattern: Pattern,
        random_seed: u64,
        loop_count: usize,
        registry: StimulusPoints,
    },
}

impl Job {
    fn drives_display(&self) -> bool {
        match self {
            Job::Run(plan) => plan
                .loops
                .iter()
                .flatten()
                .any(|step| step.points.is_some()),
            Job::Generate { .. } => true,
        }
    }

    fn into_plan(self, config: &ExecutorConfig) -> Result<Plan, InterruptReason> {
        match self {
            Job::Run(plan) => Ok(plan),
            Job::Generate {
                elements,
                pattern,
                random_seed,
                loop_count,
                registry,
            } => {
                let program = Program::generate_with(&elements, pattern, random_seed, loop_count, &registry)
                    .map_err(|err| InterruptReason::Generation(err.to_string()))?;
                Plan::from_program(&program, &registry, config)
                    .map_err(|err| InterruptReason::Generation(err.to_string()))
            }
        }
    }
}

struct Shared {
    state: Mutex<ExecutorState>,
    token: Mutex<InterruptToken>,
    listeners: Mutex<Vec<Sender<ExecutorEvent>>>,
}

impl Shared {
    fn emit(&self, event: ExecutorEvent) {
        self.listeners
            .lock()
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    fn set_state(&self, state: ExecutorState) {
        *self.state.lock() = state;
    }
}

pub struct SequenceExecutor<D: DigitalIoDevice + 'static> {
    device: Arc<Mutex<D>>,
    display: Arc<dyn StimulusDisplay>,
    config: ExecutorConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<RunOutcome>>,
}

impl<D: DigitalIoDevice + 'static> SequenceExecutor<D> {
    pub fn new(device: D, display: Arc<dyn StimulusDisplay>, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            display,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ExecutorState::Idle),
                token: Mutex::new(InterruptToken::new()),
                listeners: Mutex::new(Vec::new()),
            }),
            worker: None,
        })
    }

    pub fn subscribe(&self) -> Receiver<ExecutorEvent> {
        let (sender, receiver) = unbounded();
        self.shared.listeners.lock().push(sender);
        receiver
    }

    pub fn state(&self) -> ExecutorState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ExecutorState::Running
    }

    /// Shared handle to the device. The worker locks it once per command or poll.
    pub fn device(&self) -> Arc<Mutex<D>> {
        self.device.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ExecutorConfig) -> Result<(), ExecutorError> {
        self.ensure_idle()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Drives every line to idle outside of a run.
    pub fn clear_lines(&mut self) -> Result<(), ExecutorError> {
        self.ensure_idle()?;
        self.device.lock().clear_all_lines()?;
        Ok(())
    }

    /// Executes an already generated program. Points are resolved against `registry` now.
    pub fn start(&mut self, program: &Program, registry: &StimulusPoints) -> Result<(), ExecutorError> {
        self.ensure_idle()?;
        if program.is_empty() {
            return Err(ExecutorError::EmptyProgram);
        }
        self.check_wait_line(program.initial_sequence())?;
        let plan = Plan::from_program(program, registry, &self.config)?;
        self.launch(Job::Run(plan))
    }

    /// Generates the program on the worker, then executes it.
    ///
    /// Generation failures end the run with [`InterruptReason::Generation`].
    pub fn start_sequence(
        &mut self,
        sequence: &ProtocolSequence,
        registry: &StimulusPoints,
        loop_count: usize,
    ) -> Result<(), ExecutorError> {
        self.ensure_idle()?;
        if sequence.is_empty() {
            return Err(ExecutorError::EmptyProgram);
        }
        if loop_count < 1 {
            return Err(optocompiler_backend::Error::from(ValidationError::InvalidLoopCount(loop_count)).into());
        }
        self.check_wait_line(sequence.elements())?;
        self.launch(Job::Generate {
            elements: sequence.elements().to_vec(),
            pattern: sequence.pattern(),
            random_seed: sequence.random_seed(),
            loop_count,
            registry: registry.clone(),
        })
    }

    /// Runs raw device states `repetitions` times, sleeping `delay` seconds between repetitions.
    pub fn start_states(
        &mut self,
        states: Vec<LabJackState>,
        repetitions: usize,
        delay: f64,
    ) -> Result<(), ExecutorError> {
        self.ensure_idle()?;
        if states.is_empty() {
            return Err(ExecutorError::EmptyProgram);
        }
        if repetitions < 1 {
            return Err(ExecutorError::InvalidRepetitions(repetitions));
        }
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::InvalidTime {
                field: "delay",
                value: delay,
            }
            .into());
        }
        if let Some((index, state)) = states
            .iter()
            .enumerate()
            .find(|(_, state)| !state.duration.is_finite() || state.duration < 0.0)
        {
            return Err(ExecutorError::InvalidStateDuration {
                index,
                duration: state.duration,
            });
        }
        self.launch(Job::Run(Plan::from_states(states, repetitions, delay)))
    }

    /// Asks the current run to stop. It ends at the next loop boundary, or sooner when
    /// `interrupt_during_waits` is set.
    pub fn interrupt(&self) {
        self.shared.token.lock().request();
    }

    /// Blocks until the current run ends. Returns `None` if nothing was started.
    pub fn join(&mut self) -> Option<RunOutcome> {
        let handle = self.worker.take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!("executor thread panicked");
                self.shared.set_state(ExecutorState::Interrupted);
                None
            }
        }
    }

    fn ensure_idle(&mut self) -> Result<(), ExecutorError> {
        if self.is_running() {
            return Err(ExecutorError::Busy);
        }
        // The previous worker has already published its terminal state
        self.join();
        Ok(())
    }

    fn check_wait_line(&self, elements: &[ProtocolElement]) -> Result<(), ExecutorError> {
        let waits = elements.iter().any(|element| element.wait());
        if waits && self.config.line_mapping.line_for(LineRole::Wait).is_none() {
            return Err(ExecutorError::MissingWaitLine);
        }
        Ok(())
    }

    fn launch(&mut self, job: Job) -> Result<(), ExecutorError> {
        let token = InterruptToken::new();
        *self.shared.token.lock() = token.clone();
        self.shared.set_state(ExecutorState::Running);

        let worker = Worker {
            device: self.device.clone(),
            display: self.display.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
            token,
        };
        let spawned = thread::Builder::new()
            .name("sequence-executor".to_string())
            .spawn(move || worker.run(job));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ExecutorState::Idle);
                Err(err.into())
            }
        }
    }
}

impl<D: DigitalIoDevice + 'static> Drop for SequenceExecutor<D> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("dropping executor: interrupting and joining the worker");
            self.interrupt();
            self.join();
        }
    }
}

struct Worker<D: DigitalIoDevice> {
    device: Arc<Mutex<D>>,
    display: Arc<dyn StimulusDisplay>,
    config: ExecutorConfig,
    shared: Arc<Shared>,
    token: InterruptToken,
}

impl<D: DigitalIoDevice> Worker<D> {
    fn run(self, job: Job) -> RunOutcome {
        self.shared.emit(ExecutorEvent::Started);
        let drives_display = job.drives_display();

        let outcome = match job.into_plan(&self.config) {
            Ok(plan) => {
                info!(
                    "starting run: {} loops x {} elements",
                    plan.loops.len(),
                    plan.states.len()
                );
                self.run_with_device(&plan)
            }
            Err(reason) => RunOutcome::Interrupted(reason),
        };

        if drives_display {
            match panic::catch_unwind(AssertUnwindSafe(|| self.display.display_points(&[]))) {
                Ok(()) => self.shared.emit(ExecutorEvent::DisplayCleared),
                Err(payload) => warn!("failed to clear the display: {}", panic_message(payload.as_ref())),
            }
        }
        match &outcome {
            RunOutcome::Completed => {
                info!("run completed");
                self.shared.set_state(ExecutorState::Completed);
                self.shared.emit(ExecutorEvent::Completed);
            }
            RunOutcome::Interrupted(reason) => {
                info!("run interrupted: {:?}", reason);
                self.shared.set_state(ExecutorState::Interrupted);
                self.shared.emit(ExecutorEvent::Interrupted(reason.clone()));
            }
        }
        outcome
    }

    /// Wraps the element loop in the device lifecycle.
    fn run_with_device(&self, plan: &Plan) -> RunOutcome {
        let compiled = {
            let mut device = self.device.lock();
            device.set_connection_check(false);
            if self.config.clear_lines_on_start && device.is_connected() {
                if let Err(err) = device.clear_all_lines() {
                    warn!("failed to clear lines before the run: {}", err);
                }
            }
            device.compile_batches(&plan.states)
        };

        let outcome = match compiled {
            Ok(batches) => match panic::catch_unwind(AssertUnwindSafe(|| self.run_loops(plan, &batches))) {
                Ok(Ok(())) => RunOutcome::Completed,
                Ok(Err(reason)) => RunOutcome::Interrupted(reason),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("run panicked: {}", message);
                    RunOutcome::Interrupted(InterruptReason::Panicked(message))
                }
            },
            Err(err) => RunOutcome::Interrupted(InterruptReason::Hardware(err)),
        };

        let mut device = self.device.lock();
        if device.is_connected() {
            if let Err(err) = device.clear_all_lines() {
                warn!("failed to clear lines after the run: {}", err);
            }
        }
        device.set_connection_check(true);
        outcome
    }

    fn run_loops(&self, plan: &Plan, batches: &[CommandBatch]) -> Result<(), InterruptReason> {
        let total = plan.loops.len();
        let mut timer = TickTimer::new();
        for (loop_index, steps) in plan.loops.iter().enumerate() {
            debug!("loop {}/{}", loop_index + 1, total);
            for (element_index, step) in steps.iter().enumerate() {
                if let Some(points) = &step.points {
                    self.display.display_points(points);
                }
                self.shared.emit(ExecutorEvent::ElementChanged {
                    loop_index,
                    element_index,
                    points: step.points.clone().unwrap_or_default(),
                });

                let batch = batches.get(step.batch).map_or(&[][..], |batch| batch.as_slice());
                if !batch.is_empty() {
                    self.device
                        .lock()
                        .execute_batch(batch)
                        .map_err(InterruptReason::Hardware)?;
                }
                if log_enabled!(Level::Trace) {
                    timer.tick_trace(&format!("loop {} element {} setup", loop_index, element_index));
                }

                if step.wait {
                    self.wait_for_signal(plan.wait_line)?;
                } else {
                    self.pause(step.duration)?;
                }
            }

            self.shared
                .emit(ExecutorEvent::LoopProgress((loop_index + 1) as f64 / total as f64));
            if self.token.is_requested() {
                return Err(InterruptReason::Requested);
            }
            if loop_index + 1 < total {
                self.pause(plan.inter_loop_delay)?;
            }
        }
        Ok(())
    }

    /// Sleeps for `seconds`; ends early on interrupt only when configured to.
    fn pause(&self, seconds: f64) -> Result<(), InterruptReason> {
        if self.config.interrupt_during_waits {
            if self.token.sleep(secs(seconds)) {
                return Err(InterruptReason::Requested);
            }
        } else {
            thread::sleep(secs(seconds));
        }
        Ok(())
    }

    /// Polls the wait line until it reads the configured trigger level.
    fn wait_for_signal(&self, line: Option<Fio>) -> Result<(), InterruptReason> {
        let line = line.ok_or_else(|| {
            InterruptReason::Hardware(DeviceError::new("no line is mapped to Wait"))
        })?;
        debug!("waiting for {} to read {}", line, self.config.wait_trigger_level);
        loop {
            let level = self
                .device
                .lock()
                .read_digital_line(line)
                .map_err(InterruptReason::Hardware)?;
            if level == self.config.wait_trigger_level {
                return Ok(());
            }
            self.pause(self.config.wait_poll_interval)?;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
