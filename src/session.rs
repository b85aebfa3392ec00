//! One driver-challenge session: source buffer, assembled program, machine
//! state, and the scheduler state machine the embedding UI drives.

use std::time::{Duration, Instant};

use miette::Report;

use crate::device::Device;
use crate::editor::{Cursor, SourceBuffer};
use crate::error::{fault_report, AssemblyFault, Fault, RuntimeFault};
use crate::parser;
use crate::program::Program;
use crate::runtime::{self, CompletionSpec, CpuState};
use crate::stream::DataStream;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Status {
    #[default]
    Editing,
    Running,
    Paused,
    Error,
    Success,
}

/// Per-puzzle wiring: block entry labels, completion predicate, step cadence.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Canonical entry label per source block, in block order.
    pub entry_labels: Vec<String>,
    pub completion: CompletionSpec,
    /// Minimum wall-clock time between auto-run steps. Zero means
    /// unthrottled, for headless runs.
    pub cadence: Duration,
    /// Fixed seed for the data stream, for reproducible runs.
    pub stream_seed: Option<u64>,
}

impl SessionConfig {
    /// The canonical LAPC-1 driver challenge: three stages, ~100ms steps.
    pub fn lapc1() -> Self {
        SessionConfig {
            entry_labels: vec![
                "POWER_ON".into(),
                "SET_VOLUME".into(),
                "DATA_CHECK".into(),
            ],
            completion: CompletionSpec::lapc1(),
            cadence: Duration::from_millis(100),
            stream_seed: None,
        }
    }

    /// LAPC-1 semantics over caller-defined blocks.
    pub fn with_entry_labels(entry_labels: Vec<String>) -> Self {
        SessionConfig {
            entry_labels,
            ..Self::lapc1()
        }
    }
}

/// A single player's driver-challenge instance. Sessions own all of their
/// state; run one per player.
pub struct Session {
    config: SessionConfig,
    buffer: SourceBuffer,
    cursor: Cursor,
    program: Option<Program>,
    cpu: CpuState,
    device: Device,
    stream: DataStream,
    status: Status,
    fault: Option<Fault>,
    completed: bool,
    last_step: Option<Instant>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let stream = match config.stream_seed {
            Some(seed) => DataStream::with_seed(seed),
            None => DataStream::new(),
        };
        let buffer = SourceBuffer::new(config.entry_labels.len());
        Session {
            config,
            buffer,
            cursor: Cursor::default(),
            program: None,
            cpu: CpuState::new(),
            device: Device::new(),
            stream,
            status: Status::Editing,
            fault: None,
            completed: false,
            last_step: None,
        }
    }

    pub fn lapc1() -> Self {
        Self::new(SessionConfig::lapc1())
    }

    /// Replace the per-block source text. Honored in the same states as
    /// editing; ignored while running.
    pub fn load_source(&mut self, blocks: Vec<Vec<String>>) {
        if self.can_edit() {
            self.buffer.load(blocks);
            self.cursor = Cursor::default();
        }
    }

    /// Assemble and link the current source, replacing any prior program.
    /// Does not change the scheduler state; `request_run` does.
    pub fn assemble(&mut self) -> Result<(), AssemblyFault> {
        match parser::assemble(&self.config.entry_labels, self.buffer.blocks()) {
            Ok(program) => {
                self.program = Some(program);
                Ok(())
            }
            Err(fault) => {
                self.program = None;
                Err(fault)
            }
        }
    }

    /// Re-assemble and start auto-run from the first block's entry label.
    pub fn request_run(&mut self) {
        if !matches!(self.status, Status::Editing | Status::Paused | Status::Error) {
            return;
        }
        match self.assemble() {
            Ok(()) => {
                let entry = self
                    .config
                    .entry_labels
                    .first()
                    .and_then(|label| self.program.as_ref()?.label_index(label))
                    .unwrap_or(0);
                self.cpu.index = entry;
                self.fault = None;
                self.last_step = None;
                self.status = Status::Running;
            }
            Err(fault) => {
                self.fault = Some(Fault::Assembly(fault));
                self.status = Status::Error;
            }
        }
    }

    pub fn request_pause(&mut self) {
        if self.status == Status::Running {
            self.status = Status::Paused;
        }
    }

    /// Tear down the machine for a fresh session. Source text is preserved;
    /// this is also the only way out of `Success`.
    pub fn request_reset(&mut self) {
        self.cpu.reset();
        self.device.reset();
        self.stream.reset();
        self.program = None;
        self.fault = None;
        self.completed = false;
        self.last_step = None;
        self.status = Status::Editing;
    }

    /// Operator has seen the fault: clear the machine, keep the source, and
    /// return to editing. The fault stays readable as the most recent one.
    pub fn acknowledge_error(&mut self) {
        if self.status != Status::Error {
            return;
        }
        self.cpu.reset();
        self.device.reset();
        self.stream.reset();
        self.last_step = None;
        self.status = Status::Editing;
    }

    /// Host-driven heartbeat, called once per frame. Opens the cadence gate
    /// at most once per interval; the card's data stream advances on every
    /// open gate regardless of state, the engine only while running.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let gate_open = match self.last_step {
            Some(last) => now.duration_since(last) >= self.config.cadence,
            None => true,
        };
        if !gate_open {
            return;
        }
        self.last_step = Some(now);
        if self.status == Status::Running {
            let _ = self.step_machine();
        } else {
            self.stream.tick(&mut self.device);
        }
    }

    /// Drive one data-stream tick and one engine step, ignoring the cadence.
    /// This is the UI's single-step entry point.
    pub fn step(&mut self) -> Result<(), RuntimeFault> {
        if matches!(self.status, Status::Error | Status::Success) {
            return Ok(());
        }
        self.step_machine()
    }

    fn step_machine(&mut self) -> Result<(), RuntimeFault> {
        self.stream.tick(&mut self.device);
        let Some(program) = self.program.as_ref() else {
            return Ok(());
        };
        match runtime::step(program, &mut self.cpu, &mut self.device) {
            Ok(()) => {
                let done = !self.completed
                    && self
                        .config
                        .completion
                        .satisfied(program, &self.cpu, &self.device);
                if done {
                    self.completed = true;
                    self.status = Status::Success;
                }
                Ok(())
            }
            Err(fault) => {
                self.fault = Some(Fault::Runtime(fault.clone()));
                self.status = Status::Error;
                Err(fault)
            }
        }
    }

    // --- read accessors for the embedding UI ---

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The assembled program, if the last assembly succeeded. Instructions
    /// carry block/line positions for editor highlighting.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn last_fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn source(&self) -> &SourceBuffer {
        &self.buffer
    }

    /// Rendered diagnostic for the most recent fault, against the current
    /// text of the block it occurred in.
    pub fn fault_diagnostic(&self) -> Option<Report> {
        let fault = self.fault.as_ref()?;
        let (block, _) = fault.location();
        let src = if block < self.buffer.block_count() {
            self.buffer.block_text(block)
        } else {
            String::new()
        };
        Some(fault_report(fault, &src))
    }

    // --- editing operations, honored while not running ---

    fn can_edit(&self) -> bool {
        matches!(self.status, Status::Editing | Status::Paused | Status::Error)
    }

    pub fn insert_char(&mut self, ch: char) {
        if self.can_edit() {
            self.buffer.insert_char(&mut self.cursor, ch);
        }
    }

    pub fn backspace(&mut self) {
        if self.can_edit() {
            self.buffer.backspace(&mut self.cursor);
        }
    }

    pub fn insert_newline(&mut self) {
        if self.can_edit() {
            self.buffer.insert_newline(&mut self.cursor);
        }
    }

    pub fn cursor_left(&mut self) {
        if self.can_edit() {
            self.buffer.move_left(&mut self.cursor);
        }
    }

    pub fn cursor_right(&mut self) {
        if self.can_edit() {
            self.buffer.move_right(&mut self.cursor);
        }
    }

    pub fn cursor_up(&mut self) {
        if self.can_edit() {
            self.buffer.move_up(&mut self.cursor);
        }
    }

    pub fn cursor_down(&mut self) {
        if self.can_edit() {
            self.buffer.move_down(&mut self.cursor);
        }
    }

    /// Park the cursor on the most recent fault's line, for the editor's
    /// jump-to-error affordance.
    pub fn cursor_to_fault(&mut self) {
        if !self.can_edit() {
            return;
        }
        if let Some(fault) = &self.fault {
            let (block, line) = fault.location();
            self.buffer.move_to_line(&mut self.cursor, block, line);
        }
    }
}
