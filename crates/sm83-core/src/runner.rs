//! Run loop and background worker.
//!
//! The loop only looks at the cancel flag between instructions, so a
//! cancelled run always ends on a clean boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel as cb;

use crate::cpu::{Cpu, Registers};
use crate::error::Fault;
use crate::gameboy::GameBoy;
use crate::mmu::Memory;

/// Snapshots queued before the worker starts dropping them.
const SNAPSHOT_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_cycles: Option<u64>,
    pub max_instructions: Option<u64>,
    /// Publish a snapshot every this many instructions; 0 disables them.
    pub snapshot_interval: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_cycles: None,
            max_instructions: None,
            snapshot_interval: 100_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// The shared flag itself, for code that can only set an `AtomicBool`,
    /// such as a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    CycleLimit,
    InstructionLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// M-cycles executed by this run.
    pub cycles: u64,
    /// `step` calls completed, including idle halted cycles.
    pub instructions: u64,
    pub stop: StopReason,
}

/// Register state published between instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub registers: Registers,
    pub cycles: u64,
    pub instructions: u64,
}

/// Step `cpu` until a limit is hit or `cancel` is set.
pub fn run<M: Memory + ?Sized>(
    cpu: &mut Cpu,
    mem: &mut M,
    limits: RunLimits,
    cancel: &CancelToken,
) -> Result<RunReport, Fault> {
    run_with(cpu, mem, limits, cancel, |_, _| {})
}

/// [`run`], calling `on_boundary` with the instruction count after every
/// step.
pub fn run_with<M, F>(
    cpu: &mut Cpu,
    mem: &mut M,
    limits: RunLimits,
    cancel: &CancelToken,
    mut on_boundary: F,
) -> Result<RunReport, Fault>
where
    M: Memory + ?Sized,
    F: FnMut(&Cpu, u64),
{
    let start = cpu.cycles;
    let mut instructions = 0u64;

    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if limits.max_cycles.is_some_and(|max| cpu.cycles - start >= max) {
            break StopReason::CycleLimit;
        }
        if limits.max_instructions.is_some_and(|max| instructions >= max) {
            break StopReason::InstructionLimit;
        }
        cpu.step(mem)?;
        instructions += 1;
        on_boundary(cpu, instructions);
    };

    Ok(RunReport {
        cycles: cpu.cycles - start,
        instructions,
        stop,
    })
}

/// A run on a worker thread.
pub struct RunHandle {
    cancel: CancelToken,
    snapshots: cb::Receiver<Snapshot>,
    thread: JoinHandle<(GameBoy, Result<RunReport, Fault>)>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn snapshots(&self) -> &cb::Receiver<Snapshot> {
        &self.snapshots
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take the machine back.
    pub fn join(self) -> thread::Result<(GameBoy, Result<RunReport, Fault>)> {
        self.thread.join()
    }
}

/// Move `gb` to a worker thread and run it there. Snapshots are dropped
/// rather than stalling emulation when nobody drains the channel.
pub fn spawn(mut gb: GameBoy, limits: RunLimits) -> RunHandle {
    let cancel = CancelToken::new();
    let (tx, rx) = cb::bounded(SNAPSHOT_QUEUE);
    let token = cancel.clone();

    let thread = thread::spawn(move || {
        let start = gb.cpu.cycles;
        let interval = limits.snapshot_interval;
        let (cpu, mmu) = (&mut gb.cpu, &mut gb.mmu);
        let result = run_with(cpu, mmu, limits, &token, |cpu, n| {
            if interval != 0 && n % interval == 0 {
                let _ = tx.try_send(Snapshot {
                    registers: cpu.regs,
                    cycles: cpu.cycles - start,
                    instructions: n,
                });
            }
        });
        if let Ok(report) = &result {
            let _ = tx.try_send(Snapshot {
                registers: gb.cpu.regs,
                cycles: report.cycles,
                instructions: report.instructions,
            });
        }
        (gb, result)
    });

    RunHandle {
        cancel,
        snapshots: rx,
        thread,
    }
}
