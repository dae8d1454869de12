//! Power-aware command scheduler for the rotating part of the dome.
//!
//! The slip ring can only carry so much continuous power. When power
//! management is active, power-drawing commands go through a priority
//! queue and are only released while the estimated draw fits the remaining
//! budget. A command that does not fit gets its stop companions scheduled
//! ahead of it, so ongoing lower-priority motion is shut down first.

use std::collections::HashMap;

use heapless::binary_heap::{BinaryHeap, Min};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{
    APS_POWER_DRAW, CONTINUOUS_ELECTRONICS_POWER_DRAW, CONTINUOUS_SLIP_RING_POWER_CAPACITY,
    FANS_POWER_DRAW, LOUVERS_POWER_DRAW, LWS_POWER_DRAW,
};
use crate::protocol::{CommandName, LlcName};

const MAX_QUEUED_COMMANDS: usize = 32;

/// Policy selector for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerManagementMode {
    NoPowerManagement,
    Operations,
    Maintenance,
    Emergency,
}

/// A command waiting for power budget, with the parameters it will be sent
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledCommand {
    pub command: CommandName,
    pub params: Map<String, Value>,
}

impl ScheduledCommand {
    pub fn new(command: CommandName) -> Self {
        Self {
            command,
            params: Map::new(),
        }
    }

    pub fn with_params(command: CommandName, params: Map<String, Value>) -> Self {
        Self { command, params }
    }
}

/// Preemptive stops injected ahead of a command that does not fit the
/// budget. Each one names the subsystem whose draw it removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCompanion {
    StopEl,
    StopLouvers,
    StopShutter,
    StopFans,
}

impl StopCompanion {
    fn llc(&self) -> LlcName {
        match self {
            StopCompanion::StopEl => LlcName::Lwscs,
            StopCompanion::StopLouvers => LlcName::Lcs,
            StopCompanion::StopShutter => LlcName::Apscs,
            StopCompanion::StopFans => LlcName::Amcs,
        }
    }

    fn to_command(self) -> ScheduledCommand {
        match self {
            StopCompanion::StopEl => ScheduledCommand::new(CommandName::StopEl),
            StopCompanion::StopLouvers => ScheduledCommand::new(CommandName::StopLouvers),
            StopCompanion::StopShutter => ScheduledCommand::new(CommandName::StopShutter),
            StopCompanion::StopFans => {
                let mut params = Map::new();
                params.insert("speed".into(), 0.0.into());
                ScheduledCommand::with_params(CommandName::Fans, params)
            }
        }
    }
}

#[derive(Debug)]
struct QueueEntry {
    priority: u32,
    seq: u64,
    command: ScheduledCommand,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // The sequence number keeps equal priorities FIFO.
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u32,
    pub total_issued: u32,
    pub total_discarded: u32,
}

/// The power-aware command queue.
pub struct PowerScheduler {
    mode: PowerManagementMode,
    queue: BinaryHeap<QueueEntry, Min, MAX_QUEUED_COMMANDS>,
    seq: u64,
    stats: SchedulerStats,
}

impl std::fmt::Debug for PowerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerScheduler")
            .field("mode", &self.mode)
            .field("queued", &self.queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl PowerScheduler {
    pub fn new() -> Self {
        Self {
            mode: PowerManagementMode::NoPowerManagement,
            queue: BinaryHeap::new(),
            seq: 0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn mode(&self) -> PowerManagementMode {
        self.mode
    }

    /// Switch modes. Priorities and companions change meaning between
    /// modes, so the queue is discarded.
    pub fn set_mode(&mut self, mode: PowerManagementMode) {
        if mode != self.mode {
            let dropped = self.queue.len();
            if dropped > 0 {
                warn!(dropped, ?mode, "discarding queued commands on mode change");
                self.stats.total_discarded += dropped as u32;
            }
            self.queue.clear();
            self.mode = mode;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// The queued commands in the order they would be issued.
    pub fn queued_commands(&self) -> Vec<ScheduledCommand> {
        let mut entries: Vec<&QueueEntry> = self.queue.iter().collect();
        entries.sort_by_key(|e| (e.priority, e.seq));
        entries.iter().map(|e| e.command.clone()).collect()
    }

    /// Enqueue a command. Commands without a priority in the current mode
    /// are discarded, e.g. `openShutter` during an emergency.
    pub fn schedule(&mut self, command: ScheduledCommand) -> Result<(), &'static str> {
        let Some(priority) = command_priority(self.mode, &command) else {
            warn!(command = %command.command, mode = ?self.mode, "discarding command without a priority in this mode");
            self.stats.total_discarded += 1;
            return Ok(());
        };
        self.push(priority, command)
    }

    /// Pop the next admissible command, given the per-subsystem draws from
    /// the latest telemetry. Returns `None` when nothing can be issued this
    /// tick; a command that does not fit is requeued behind its stop
    /// companions.
    pub fn next_command(
        &mut self,
        current_power_draw: &HashMap<LlcName, f64>,
    ) -> Option<ScheduledCommand> {
        let total_draw: f64 = current_power_draw.values().sum();
        let power_available =
            CONTINUOUS_SLIP_RING_POWER_CAPACITY - CONTINUOUS_ELECTRONICS_POWER_DRAW - total_draw;

        let entry = self.queue.pop()?;
        let needed = estimated_power_draw(&entry.command);
        debug!(
            command = %entry.command.command,
            needed,
            power_available,
            "considering queued command"
        );
        if needed <= power_available {
            self.stats.total_issued += 1;
            return Some(entry.command);
        }

        for companion in stop_companions(self.mode, entry.command.command) {
            let draws_power = current_power_draw
                .get(&companion.llc())
                .is_some_and(|&draw| draw > 0.0);
            let already_queued = self
                .queue
                .iter()
                .any(|queued| queued.command.command == companion.to_command().command);
            if draws_power && !already_queued {
                let stop = companion.to_command();
                let priority = command_priority(self.mode, &stop)
                    .expect("stop companions have priorities in every active mode");
                let _ = self.push(priority, stop);
            }
        }
        // Requeue with the original sequence number so FIFO order among
        // equal priorities survives the round trip.
        if self
            .queue
            .push(QueueEntry {
                priority: entry.priority,
                seq: entry.seq,
                command: entry.command,
            })
            .is_err()
        {
            warn!("power queue full, dropping requeued command");
            self.stats.total_discarded += 1;
        }
        None
    }

    fn push(&mut self, priority: u32, command: ScheduledCommand) -> Result<(), &'static str> {
        let entry = QueueEntry {
            priority,
            seq: self.seq,
            command,
        };
        self.seq += 1;
        if self.queue.push(entry).is_err() {
            self.stats.total_discarded += 1;
            return Err("power queue full");
        }
        self.stats.total_scheduled += 1;
        Ok(())
    }
}

impl Default for PowerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimated draw on the slip ring while the command's motion runs [W].
fn estimated_power_draw(command: &ScheduledCommand) -> f64 {
    match command.command {
        CommandName::OpenShutter | CommandName::CloseShutter | CommandName::Home => APS_POWER_DRAW,
        CommandName::SetLouvers | CommandName::CloseLouvers => LOUVERS_POWER_DRAW,
        CommandName::MoveEl | CommandName::CrawlEl => LWS_POWER_DRAW,
        CommandName::Fans => {
            let speed = command
                .params
                .get("speed")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            if speed > 0.0 {
                FANS_POWER_DRAW
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Priority of a command in a mode; lower wins, `None` means the command
/// is not admissible in that mode at all.
fn command_priority(mode: PowerManagementMode, command: &ScheduledCommand) -> Option<u32> {
    use CommandName as C;
    use PowerManagementMode as M;
    let fans_off = command.command == C::Fans && estimated_power_draw(command) == 0.0;
    match (mode, command.command) {
        (M::NoPowerManagement, _) => None,

        (_, C::StopEl) => Some(1),
        (_, C::StopLouvers) => Some(2),
        (_, C::StopShutter) => Some(3),
        (_, C::Fans) if fans_off => Some(4),
        (_, C::CloseShutter) => Some(5),
        (_, C::CloseLouvers) => Some(6),

        (M::Operations, C::OpenShutter) => Some(7),
        (M::Operations, C::Home) => Some(8),
        (M::Operations | M::Maintenance, C::SetLouvers) => Some(9),
        (M::Operations | M::Maintenance, C::MoveEl) => Some(10),
        (M::Operations | M::Maintenance, C::CrawlEl) => Some(11),
        (M::Operations | M::Maintenance, C::Fans) => Some(12),

        _ => None,
    }
}

/// Stops to inject ahead of `command` when it does not fit the budget.
fn stop_companions(mode: PowerManagementMode, command: CommandName) -> &'static [StopCompanion] {
    use CommandName as C;
    use PowerManagementMode as M;
    use StopCompanion as S;
    match (mode, command) {
        (M::Emergency, C::CloseShutter | C::CloseLouvers) => &[S::StopEl],
        (_, C::OpenShutter | C::CloseShutter | C::Home) => {
            &[S::StopEl, S::StopLouvers, S::StopFans]
        }
        (_, C::MoveEl | C::CrawlEl) => &[S::StopLouvers, S::StopShutter, S::StopFans],
        (_, C::SetLouvers | C::CloseLouvers) => &[S::StopEl, S::StopShutter, S::StopFans],
        _ => &[],
    }
}
