//! Core commit state machine
//!
//! `CommitState` holds the pure transition logic: each tick consumes the
//! current state and returns the next one together with what happened.
//! `CommitStateMachine` owns a `CommitState` exclusively, feeds it frames
//! and poll ticks, applies commits to the output and broadcasts events.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::alphabet::{Action, Classification, Label};
use crate::config::CommitConfig;
use crate::events::CommitEvent;
use crate::output::ActionExecutor;

use super::timer::CommitTimer;
use super::vote::VoteBuffer;

/// Coarse state, as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No window open
    #[default]
    Idle,
    /// Window open, countdown running
    Dwelling,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Dwelling => write!(f, "Dwelling"),
        }
    }
}

/// An open commit window
#[derive(Debug, Clone, PartialEq)]
pub struct DwellWindow {
    /// Label whose confidence opened (or last restarted) the window
    leading: Label,
    votes: VoteBuffer,
    timer: CommitTimer,
}

impl DwellWindow {
    fn open(label: Label, now_ms: u64, config: &CommitConfig) -> Self {
        let mut votes = VoteBuffer::new();
        votes.push(label);
        Self {
            leading: label,
            votes,
            timer: CommitTimer::start(now_ms, config.dwell_duration_ms),
        }
    }

    /// Reopen in place for a new leading label, reusing the vote allocation
    fn restart(&mut self, label: Label, now_ms: u64, config: &CommitConfig) {
        self.votes.clear();
        self.votes.push(label);
        self.timer.restart(now_ms, config.dwell_duration_ms);
        self.leading = label;
    }

    pub fn leading(&self) -> Label {
        self.leading
    }

    pub fn votes(&self) -> &VoteBuffer {
        &self.votes
    }

    pub fn timer(&self) -> &CommitTimer {
        &self.timer
    }
}

/// A finished dwell window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Commit {
    /// Majority label over the window
    pub label: Label,
    pub action: Action,
    /// Votes cast during the window
    pub votes: usize,
    /// Time from window open to commit
    pub elapsed_ms: u64,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Opened(Label),
    Extended(Label),
    Restarted { from: Label, to: Label },
    Aborted { leading: Label, votes: usize },
    Committed(Commit),
}

/// Result of feeding one tick to a `CommitState`
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: CommitState,
    /// In order of occurrence; at most one is a commit
    pub outcomes: Vec<Outcome>,
}

impl Transition {
    fn new(state: CommitState) -> Self {
        Self {
            state,
            outcomes: Vec::new(),
        }
    }

    fn with(mut self, outcome: Outcome) -> Self {
        self.outcomes.push(outcome);
        self
    }

    /// The commit produced by this tick, if any
    pub fn commit(&self) -> Option<&Commit> {
        self.outcomes.iter().find_map(|o| match o {
            Outcome::Committed(commit) => Some(commit),
            _ => None,
        })
    }
}

/// Commit window state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CommitState {
    #[default]
    Idle,
    Dwelling(DwellWindow),
}

impl CommitState {
    pub fn phase(&self) -> Phase {
        match self {
            CommitState::Idle => Phase::Idle,
            CommitState::Dwelling(_) => Phase::Dwelling,
        }
    }

    pub fn window(&self) -> Option<&DwellWindow> {
        match self {
            CommitState::Idle => None,
            CommitState::Dwelling(window) => Some(window),
        }
    }

    /// Votes in the open window, zero when idle
    pub fn vote_count(&self) -> usize {
        self.window().map_or(0, |w| w.votes().len())
    }

    /// Countdown left for display, `None` when idle
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.window().map(|w| w.timer().remaining(now_ms))
    }

    /// Feed one frame. `None` means no hand or no usable classification.
    pub fn step(
        self,
        input: Option<Classification>,
        now_ms: u64,
        config: &CommitConfig,
    ) -> Transition {
        match self {
            CommitState::Idle => Self::step_idle(input, now_ms, config),
            CommitState::Dwelling(window) => Self::step_dwelling(window, input, now_ms, config),
        }
    }

    /// Timer-only tick: commit if the dwell has elapsed
    pub fn poll(self, now_ms: u64) -> Transition {
        match self {
            CommitState::Dwelling(window) if window.timer.elapsed(now_ms) => {
                close(window, now_ms)
            }
            state => Transition::new(state),
        }
    }

    /// External reset: drop any open window without committing
    pub fn reset(self) -> Transition {
        match self {
            CommitState::Idle => Transition::new(CommitState::Idle),
            CommitState::Dwelling(window) => abort(window),
        }
    }

    fn step_idle(
        input: Option<Classification>,
        now_ms: u64,
        config: &CommitConfig,
    ) -> Transition {
        match input {
            Some(c) if c.confidence >= config.confidence_threshold => {
                Transition::new(CommitState::Dwelling(DwellWindow::open(c.label, now_ms, config)))
                    .with(Outcome::Opened(c.label))
            }
            _ => Transition::new(CommitState::Idle),
        }
    }

    fn step_dwelling(
        mut window: DwellWindow,
        input: Option<Classification>,
        now_ms: u64,
        config: &CommitConfig,
    ) -> Transition {
        let expired = window.timer.elapsed(now_ms);

        match input {
            // Hand lost
            None if expired => close(window, now_ms),
            None => abort(window),

            // A different confident sign
            Some(c)
                if c.confidence >= config.confidence_threshold && c.label != window.leading =>
            {
                if expired {
                    // The deadline passed before this sign arrived; the
                    // finished window commits and the sign opens a new one.
                    let closed = close(window, now_ms);
                    let mut next = Self::step_idle(Some(c), now_ms, config);
                    let mut outcomes = closed.outcomes;
                    outcomes.append(&mut next.outcomes);
                    return Transition {
                        state: next.state,
                        outcomes,
                    };
                }
                let from = window.leading;
                window.restart(c.label, now_ms, config);
                Transition::new(CommitState::Dwelling(window))
                    .with(Outcome::Restarted { from, to: c.label })
            }

            // Same sign repeated, or any low-confidence sample
            Some(c) => {
                window.votes.push(c.label);
                if expired {
                    let closed = close(window, now_ms);
                    let mut outcomes = vec![Outcome::Extended(c.label)];
                    outcomes.extend(closed.outcomes);
                    return Transition {
                        state: closed.state,
                        outcomes,
                    };
                }
                Transition::new(CommitState::Dwelling(window)).with(Outcome::Extended(c.label))
            }
        }
    }
}

/// Close a window by majority vote
fn close(window: DwellWindow, now_ms: u64) -> Transition {
    debug_assert!(!window.votes.is_empty(), "dwell window closed with no votes");

    match window.votes.majority() {
        Some(label) => Transition::new(CommitState::Idle).with(Outcome::Committed(Commit {
            label,
            action: label.action(),
            votes: window.votes.len(),
            elapsed_ms: window.timer.elapsed_ms(now_ms),
        })),
        None => abort(window),
    }
}

fn abort(window: DwellWindow) -> Transition {
    Transition::new(CommitState::Idle).with(Outcome::Aborted {
        leading: window.leading,
        votes: window.votes.len(),
    })
}

/// Inputs accepted by the running state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// One classifier frame; `None` when no hand was detected
    Frame(Option<Classification>),
    /// Abort any open window and clear the output
    Reset,
    /// A frame source reached its end
    SourceClosed,
}

/// Snapshot of the machine for status queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub phase: Phase,
    pub leading_label: Option<Label>,
    pub votes: usize,
    pub remaining_ms: Option<u64>,
    pub output: String,
    pub commits: u64,
    pub aborts: u64,
}

/// Owns the commit state and drives it from frames and the poll clock
pub struct CommitStateMachine<E> {
    state: CommitState,
    config: CommitConfig,
    poll_interval: Duration,
    /// Origin of the millisecond clock handed to `CommitState`
    epoch: Instant,
    executor: E,
    commits: u64,
    aborts: u64,
    /// Channel for emitting commit events
    event_tx: broadcast::Sender<CommitEvent>,
    status_tx: watch::Sender<MachineStatus>,
}

impl<E: ActionExecutor> CommitStateMachine<E> {
    /// Create a new state machine
    pub fn new(
        config: CommitConfig,
        poll_interval: Duration,
        executor: E,
        event_tx: broadcast::Sender<CommitEvent>,
    ) -> Self {
        let (status_tx, _) = watch::channel(MachineStatus::default());
        Self {
            state: CommitState::Idle,
            config,
            poll_interval,
            epoch: Instant::now(),
            executor,
            commits: 0,
            aborts: 0,
            event_tx,
            status_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &CommitState {
        &self.state
    }

    pub fn text(&self) -> &str {
        self.executor.text()
    }

    /// Receiver for status snapshots, refreshed on every tick
    pub fn status(&self) -> watch::Receiver<MachineStatus> {
        self.status_tx.subscribe()
    }

    /// Run the state machine until every input sender is dropped
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<Input>) {
        info!(
            threshold = self.config.confidence_threshold,
            dwell_ms = self.config.dwell_duration_ms,
            poll_ms = self.poll_interval.as_millis() as u64,
            "commit state machine started in Idle state"
        );

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => {
                        let now_ms = self.now_ms();
                        self.handle_input(input, now_ms);
                    }
                    None => break,
                },
                _ = poll.tick() => {
                    let now_ms = self.now_ms();
                    self.handle_poll(now_ms);
                }
            }
        }

        info!(
            commits = self.commits,
            aborts = self.aborts,
            output = %self.text(),
            "commit state machine stopped"
        );
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Handle one input at `now_ms`, returning the commit it caused
    pub fn handle_input(&mut self, input: Input, now_ms: u64) -> Option<Commit> {
        let old_phase = self.state.phase();
        let state = std::mem::take(&mut self.state);
        let reset = input == Input::Reset;
        let transition = match input {
            Input::Frame(frame) => state.step(frame, now_ms, &self.config),
            Input::Reset => {
                self.executor.clear();
                info!("output reset");
                state.reset()
            }
            Input::SourceClosed => {
                info!("frame source closed, treating as hand lost");
                state.step(None, now_ms, &self.config)
            }
        };
        let committed = self.apply(old_phase, transition, now_ms);

        // Any abort is announced before the cleared output.
        if reset {
            self.emit(CommitEvent::OutputChanged {
                text: String::new(),
            });
        }
        committed
    }

    /// Handle a poll tick at `now_ms`
    pub fn handle_poll(&mut self, now_ms: u64) -> Option<Commit> {
        let old_phase = self.state.phase();
        let state = std::mem::take(&mut self.state);
        self.apply(old_phase, state.poll(now_ms), now_ms)
    }

    fn apply(&mut self, old_phase: Phase, transition: Transition, now_ms: u64) -> Option<Commit> {
        let committed = transition.commit().copied();
        let Transition { state, outcomes } = transition;
        self.state = state;

        for outcome in outcomes {
            match outcome {
                Outcome::Opened(label) => {
                    debug!(%label, "window opened");
                    self.emit(CommitEvent::WindowOpened { label });
                }
                Outcome::Extended(label) => {
                    let label_votes = self.state.window().map_or(0, |w| w.votes().count(label));
                    debug!(%label, label_votes, votes = self.state.vote_count(), "vote added");
                }
                Outcome::Restarted { from, to } => {
                    debug!(%from, %to, "window restarted");
                    self.emit(CommitEvent::WindowRestarted { from, to });
                }
                Outcome::Aborted { leading, votes } => {
                    self.aborts += 1;
                    info!(label = %leading, votes, "window aborted");
                    self.emit(CommitEvent::WindowAborted {
                        label: leading,
                        votes,
                    });
                }
                Outcome::Committed(commit) => {
                    self.commits += 1;
                    info!(
                        label = %commit.label,
                        votes = commit.votes,
                        elapsed_ms = commit.elapsed_ms,
                        "committed"
                    );
                    self.emit(CommitEvent::Committed {
                        label: commit.label,
                        action: commit.action,
                        votes: commit.votes,
                        elapsed_ms: commit.elapsed_ms,
                    });
                    self.execute(commit.action);
                }
            }
        }

        let new_phase = self.state.phase();
        if old_phase != new_phase {
            debug!(from = %old_phase, to = %new_phase, "state transition");
        }

        self.publish_status(now_ms);
        committed
    }

    fn execute(&mut self, action: Action) {
        let search = self.executor.execute(action);
        match action {
            Action::AppendLetter(_) | Action::ClearOutput => {
                self.emit(CommitEvent::OutputChanged {
                    text: self.executor.text().to_string(),
                });
            }
            Action::TriggerSearch => {
                if let Some(request) = search {
                    info!(query = %request.query, "search requested");
                    self.emit(CommitEvent::SearchRequested {
                        query: request.query,
                        url: request.url,
                    });
                }
            }
        }
    }

    fn publish_status(&self, now_ms: u64) {
        let status = MachineStatus {
            phase: self.state.phase(),
            leading_label: self.state.window().map(|w| w.leading()),
            votes: self.state.vote_count(),
            remaining_ms: self.state.remaining_ms(now_ms),
            output: self.executor.text().to_string(),
            commits: self.commits,
            aborts: self.aborts,
        };
        self.status_tx.send_replace(status);
    }

    fn emit(&self, event: CommitEvent) {
        debug!(%event, "emitting commit event");
        let _ = self.event_tx.send(event);
    }
}
