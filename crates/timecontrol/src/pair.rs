//! Two-sided clock state machine shared by every time-control family.
//!
//! A [`ClockPair`] owns one countdown per side and enforces the
//! `ready -> running <-> paused -> {elapsed | over}` lifecycle. Families plug in
//! through [`Family`]: they pick the countdown type, decide what completing a
//! move does to the mover's clock, and define the per-side snapshot projection.
//!
//! Elapse is delivered once, through the [`ElapsedReceiver`] handed out at
//! construction. It may already hold a record when a mutating call returns,
//! since overdue clocks are detected synchronously.

use crate::clock::Countdown;
use crate::error::{ClockError, ClockResult, InvalidTransition};
use crate::timer::{FireHook, Scheduler, Timer, TimerToken, TokioScheduler};
use clock_core::time::process_time_source;
use clock_core::{ClockValue, Side, TimeSource, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use telemetry::ClockMetrics;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, trace};

/// Lifecycle state of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    /// Built or restored, not started yet.
    Ready,
    /// The side to move is counting down.
    Running,
    /// Both clocks stopped for a break.
    Paused,
    /// A side ran out of time.
    Elapsed,
    /// Ended by the caller for a reason unrelated to time.
    Over,
}

impl PairState {
    /// `elapsed` and `over` admit nothing but reads and `finish`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PairState::Elapsed | PairState::Over)
    }

    fn as_str(self) -> &'static str {
        match self {
            PairState::Ready => "ready",
            PairState::Running => "running",
            PairState::Paused => "paused",
            PairState::Elapsed => "elapsed",
            PairState::Over => "over",
        }
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guarded operations, named in [`InvalidTransition`] errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// [`ClockPair::start`]
    Start,
    /// [`ClockPair::pause`]
    Pause,
    /// [`ClockPair::resume`]
    Resume,
    /// [`ClockPair::push`]
    Push,
    /// [`ClockPair::restore`]
    Restore,
    /// [`ClockPair::on_clock_elapsed`]
    Elapse,
    /// [`ClockPair::strict_elapsed_side`] and [`ClockPair::strict_elapsed_at`]
    ReadElapsed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Push => "push",
            Action::Restore => "restore",
            Action::Elapse => "report elapse",
            Action::ReadElapsed => "read elapsed record",
        })
    }
}

/// Time-control family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    /// Fixed bonus per move.
    Increment,
    /// Main time followed by reloadable periods (byoyomi).
    PeriodBank,
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FamilyKind::Increment => "increment",
            FamilyKind::PeriodBank => "period_bank",
        })
    }
}

/// Which side ran out, and when. Set at most once per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElapsedRecord {
    pub side: Side,
    pub at: Timestamp,
}

/// Receives the single elapse notification of a pair.
pub type ElapsedReceiver = oneshot::Receiver<ElapsedRecord>;

/// Serializable projection of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub state: PairState,
    pub side_to_move: Side,
    pub players: [T; 2],
    /// Exact elapse instant; present only for `elapsed` snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_at: Option<Timestamp>,
}

impl<T> Snapshot<T> {
    pub fn player(&self, side: Side) -> &T {
        &self.players[side.index()]
    }
}

/// Family-specific rules plugged into a [`ClockPair`].
pub trait Family: Send + 'static {
    /// Per-side countdown.
    type Countdown: Countdown + fmt::Debug;
    /// Per-side snapshot projection.
    type Player: Clone + PartialEq + fmt::Debug + Send + 'static;

    const KIND: FamilyKind;

    /// Fresh countdown for one side.
    fn countdown(&self, timer: Timer) -> Self::Countdown;

    /// Stop the mover at `at` and apply the per-move adjustment. Returns the
    /// elapse instant when the mover was already out of time.
    fn complete_move(&self, mover: &mut Self::Countdown, at: Timestamp) -> Option<Timestamp>;

    fn project(&self, clock: &Self::Countdown) -> Self::Player;

    /// Main value carried by a projection.
    fn player_value(player: &Self::Player) -> ClockValue;

    /// Reject projections this family could never have produced.
    fn validate_player(&self, _player: &Self::Player) -> Result<(), InvalidTransition> {
        Ok(())
    }

    /// Load a projection and arm it; overdue values report their historical instant.
    fn load(
        &self,
        clock: &mut Self::Countdown,
        player: &Self::Player,
        now: Timestamp,
    ) -> Option<Timestamp>;

    /// Load a projection without arming or reporting anything.
    fn load_inert(&self, clock: &mut Self::Countdown, player: &Self::Player);
}

/// Collaborators shared by pairs: where timers run, what "now" is, and the counters.
#[derive(Clone)]
pub struct ClockEnv {
    pub scheduler: Arc<dyn Scheduler>,
    pub time: Arc<dyn TimeSource>,
    pub metrics: ClockMetrics,
}

impl ClockEnv {
    pub fn new(scheduler: Arc<dyn Scheduler>, time: Arc<dyn TimeSource>) -> Self {
        Self { scheduler, time, metrics: ClockMetrics::new() }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: ClockMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Tokio timers on the current runtime plus the process time source.
    pub fn tokio_current() -> Option<Self> {
        let time = process_time_source();
        let scheduler = TokioScheduler::try_current(Arc::clone(&time))?;
        Some(Self::new(Arc::new(scheduler), time))
    }
}

impl fmt::Debug for ClockEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockEnv").field("metrics", &self.metrics).finish_non_exhaustive()
    }
}

struct PairCore<F: Family> {
    family: F,
    state: PairState,
    side_to_move: Side,
    clocks: [F::Countdown; 2],
    elapsed: Option<ElapsedRecord>,
    signal: Option<oneshot::Sender<ElapsedRecord>>,
    time: Arc<dyn TimeSource>,
    metrics: ClockMetrics,
}

impl<F: Family> PairCore<F> {
    fn clock(&self, side: Side) -> &F::Countdown {
        &self.clocks[side.index()]
    }

    fn clock_mut(&mut self, side: Side) -> &mut F::Countdown {
        &mut self.clocks[side.index()]
    }

    fn must_be(&self, action: Action, expected: PairState) -> Result<(), InvalidTransition> {
        if self.state == expected {
            Ok(())
        } else {
            Err(InvalidTransition::WrongState { action, expected, actual: self.state })
        }
    }

    fn transition(&mut self, to: PairState) {
        debug!(
            family = %F::KIND,
            from = %self.state,
            %to,
            side_to_move = %self.side_to_move,
            "clock pair transition"
        );
        self.state = to;
    }

    fn settle(&mut self, side: Side, due: Option<Timestamp>) -> ClockResult<()> {
        match due {
            Some(at) => self.on_clock_elapsed(side, at),
            None => Ok(()),
        }
    }

    fn start(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.must_be(Action::Start, PairState::Ready)?;
        self.transition(PairState::Running);
        let side = self.side_to_move;
        let due = self.clock_mut(side).arm(at, now);
        self.settle(side, due)
    }

    fn pause(&mut self, at: Timestamp) -> ClockResult<()> {
        self.must_be(Action::Pause, PairState::Running)?;
        self.transition(PairState::Paused);
        let side = self.side_to_move;
        let due = self.clock_mut(side).halt(at);
        self.settle(side, due)
    }

    fn resume(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.must_be(Action::Resume, PairState::Paused)?;
        self.transition(PairState::Running);
        let side = self.side_to_move;
        let due = self.clock_mut(side).arm(at, now);
        self.settle(side, due)
    }

    fn push(&mut self, side: Side, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.must_be(Action::Push, PairState::Running)?;
        if side != self.side_to_move {
            return Err(InvalidTransition::NotToMove { side, to_move: self.side_to_move }.into());
        }
        self.metrics.record_push();
        let Self { family, clocks, .. } = self;
        let due = family.complete_move(&mut clocks[side.index()], at);
        if due.is_some() {
            return self.settle(side, due);
        }
        let next = side.opponent();
        self.side_to_move = next;
        trace!(family = %F::KIND, mover = %side, %next, %at, "move completed");
        let due = self.clock_mut(next).arm(at, now);
        self.settle(next, due)
    }

    fn finish(&mut self, at: Timestamp) {
        match self.state {
            PairState::Elapsed | PairState::Over => {
                debug!(family = %F::KIND, state = %self.state, "finish on terminal pair ignored");
                return;
            }
            PairState::Running => {
                let side = self.side_to_move;
                if let Some(ran_out) = self.clock_mut(side).halt(at) {
                    debug!(family = %F::KIND, %side, %ran_out, "finished after clock ran out");
                }
            }
            PairState::Ready | PairState::Paused => {}
        }
        self.transition(PairState::Over);
    }

    fn on_clock_elapsed(&mut self, side: Side, at: Timestamp) -> ClockResult<()> {
        match self.state {
            PairState::Running | PairState::Paused => {}
            PairState::Elapsed => return Err(ClockError::DoubleElapse { side, at }),
            actual => {
                return Err(InvalidTransition::WrongState {
                    action: Action::Elapse,
                    expected: PairState::Running,
                    actual,
                }
                .into())
            }
        }
        self.transition(PairState::Elapsed);
        let record = ElapsedRecord { side, at };
        self.elapsed = Some(record);
        self.metrics.record_elapse();
        info!(family = %F::KIND, %side, %at, "clock elapsed");
        if let Some(tx) = self.signal.take() {
            if tx.send(record).is_err() {
                debug!(%side, "elapse receiver already dropped");
            }
        }
        Ok(())
    }

    fn on_timer(&mut self, side: Side, token: TimerToken) {
        let now = self.time.now();
        let Some(at) = self.clock_mut(side).wake(token, now) else {
            trace!(family = %F::KIND, %side, ?token, "timer wake produced no elapse");
            return;
        };
        if let Err(err) = self.on_clock_elapsed(side, at) {
            error!(family = %F::KIND, %side, %at, error = %err, "timer elapse rejected");
        }
    }

    fn validate(&self, snapshot: &Snapshot<F::Player>) -> Result<(), InvalidTransition> {
        for side in Side::BOTH {
            let player = snapshot.player(side);
            self.family.validate_player(player)?;
            if !F::player_value(player).is_elapsing() {
                continue;
            }
            if side != snapshot.side_to_move {
                return Err(InvalidTransition::Snapshot(format!(
                    "side {side} is elapsing but side {} is to move",
                    snapshot.side_to_move
                )));
            }
            if !matches!(snapshot.state, PairState::Running | PairState::Elapsed) {
                return Err(InvalidTransition::Snapshot(format!(
                    "side {side} is elapsing in a {} snapshot",
                    snapshot.state
                )));
            }
        }
        let mover = snapshot.side_to_move;
        let mover_elapsing = F::player_value(snapshot.player(mover)).is_elapsing();
        if snapshot.state == PairState::Running && !mover_elapsing {
            return Err(InvalidTransition::Snapshot(format!(
                "running snapshot but side {mover} is not elapsing"
            )));
        }
        if snapshot.elapsed_at.is_some() && snapshot.state != PairState::Elapsed {
            return Err(InvalidTransition::Snapshot(format!(
                "elapse instant present in a {} snapshot",
                snapshot.state
            )));
        }
        Ok(())
    }

    fn restore(&mut self, snapshot: &Snapshot<F::Player>, now: Timestamp) -> ClockResult<()> {
        self.must_be(Action::Restore, PairState::Ready)?;
        self.validate(snapshot)?;
        self.metrics.record_restore();

        let mover = snapshot.side_to_move;
        self.side_to_move = mover;
        let Self { family, clocks, .. } = self;
        for side in Side::BOTH {
            family.load_inert(&mut clocks[side.index()], snapshot.player(side));
        }

        match snapshot.state {
            PairState::Running => {
                self.transition(PairState::Running);
                let Self { family, clocks, .. } = self;
                let due = family.load(&mut clocks[mover.index()], snapshot.player(mover), now);
                self.settle(mover, due)
            }
            PairState::Elapsed => {
                // The signal already went out when the pair first elapsed.
                let at = snapshot
                    .elapsed_at
                    .or_else(|| F::player_value(snapshot.player(mover)).elapses_at())
                    .unwrap_or(now);
                self.transition(PairState::Elapsed);
                self.elapsed = Some(ElapsedRecord { side: mover, at });
                Ok(())
            }
            state => {
                self.transition(state);
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> Snapshot<F::Player> {
        Snapshot {
            state: self.state,
            side_to_move: self.side_to_move,
            players: [self.family.project(&self.clocks[0]), self.family.project(&self.clocks[1])],
            elapsed_at: self.elapsed.map(|r| r.at),
        }
    }

    fn elapsed_record(&self) -> Result<ElapsedRecord, InvalidTransition> {
        self.must_be(Action::ReadElapsed, PairState::Elapsed)?;
        self.elapsed.ok_or(InvalidTransition::WrongState {
            action: Action::ReadElapsed,
            expected: PairState::Elapsed,
            actual: self.state,
        })
    }
}

/// The clock state machine for one match.
///
/// All operations are synchronous. Timer wakes share the pair's lock, and
/// every explicit call re-derives the clocks from stored instants, so the
/// explicit call always wins over a wake racing it.
pub struct ClockPair<F: Family> {
    core: Arc<Mutex<PairCore<F>>>,
}

impl<F: Family> ClockPair<F> {
    /// A `ready` pair with side 0 to move, plus the receiver of its elapse signal.
    pub fn new(family: F, env: &ClockEnv) -> (Self, ElapsedReceiver) {
        let (tx, rx) = oneshot::channel();
        let core = Arc::new_cyclic(|weak: &Weak<Mutex<PairCore<F>>>| {
            let clocks =
                Side::BOTH.map(|side| family.countdown(wake_timer(weak, side, &env.scheduler)));
            Mutex::new(PairCore {
                family,
                state: PairState::Ready,
                side_to_move: Side::First,
                clocks,
                elapsed: None,
                signal: Some(tx),
                time: Arc::clone(&env.time),
                metrics: env.metrics.clone(),
            })
        });
        (Self { core }, rx)
    }

    fn core(&self) -> MutexGuard<'_, PairCore<F>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> FamilyKind {
        F::KIND
    }

    pub fn state(&self) -> PairState {
        self.core().state
    }

    pub fn side_to_move(&self) -> Side {
        self.core().side_to_move
    }

    /// Elapse record, if the pair has elapsed. Never errors, unlike the strict accessors.
    pub fn elapsed(&self) -> Option<ElapsedRecord> {
        self.core().elapsed
    }

    /// `ready -> running`, arming the side to move from `at`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn start(&mut self, at: Timestamp) -> ClockResult<()> {
        let mut core = self.core();
        let now = core.time.now();
        core.start(at, now)
    }

    /// [`start`](Self::start) judged against an explicit `now`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn start_at(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.core().start(at, now)
    }

    /// `running -> paused`, stopping the side to move at `at`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn pause(&mut self, at: Timestamp) -> ClockResult<()> {
        self.core().pause(at)
    }

    /// `paused -> running`, re-arming the side to move from `at`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn resume(&mut self, at: Timestamp) -> ClockResult<()> {
        let mut core = self.core();
        let now = core.time.now();
        core.resume(at, now)
    }

    /// [`resume`](Self::resume) judged against an explicit `now`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn resume_at(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.core().resume(at, now)
    }

    /// `side` completed a move at `at`; the opponent's clock starts from `at`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn push(&mut self, side: Side, at: Timestamp) -> ClockResult<()> {
        let mut core = self.core();
        let now = core.time.now();
        core.push(side, at, now)
    }

    /// [`push`](Self::push) judged against an explicit `now`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn push_at(&mut self, side: Side, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        self.core().push(side, at, now)
    }

    /// End the match for a reason unrelated to time. Valid from any state;
    /// a no-op once the pair is `elapsed` or `over`.
    #[instrument(level = "debug", skip(self), fields(family = %F::KIND))]
    pub fn finish(&mut self, at: Timestamp) {
        self.core().finish(at);
    }

    /// Report that `side` ran out at `at`. Clocks call this through their
    /// timers; a second report is [`ClockError::DoubleElapse`].
    pub fn on_clock_elapsed(&mut self, side: Side, at: Timestamp) -> ClockResult<()> {
        self.core().on_clock_elapsed(side, at)
    }

    /// Rehydrate a `ready` pair. Time lost since the snapshot was taken is
    /// replayed against the time source, which may elapse the pair at a
    /// historical instant before this returns.
    #[instrument(level = "debug", skip(self, snapshot), fields(family = %F::KIND, state = %snapshot.state))]
    pub fn restore(&mut self, snapshot: &Snapshot<F::Player>) -> ClockResult<()> {
        let mut core = self.core();
        let now = core.time.now();
        core.restore(snapshot, now)
    }

    /// [`restore`](Self::restore) as of an explicit `now`, e.g. to replay a
    /// snapshot up to a chosen instant.
    #[instrument(level = "debug", skip(self, snapshot), fields(family = %F::KIND, state = %snapshot.state))]
    pub fn restore_at(
        &mut self,
        snapshot: &Snapshot<F::Player>,
        now: Timestamp,
    ) -> ClockResult<()> {
        self.core().restore(snapshot, now)
    }

    /// Exact projection of both clocks; restoring it reproduces this pair.
    pub fn snapshot(&self) -> Snapshot<F::Player> {
        self.core().snapshot()
    }

    /// Side that ran out. Errors unless the pair is `elapsed`.
    pub fn strict_elapsed_side(&self) -> Result<Side, InvalidTransition> {
        self.core().elapsed_record().map(|r| r.side)
    }

    /// Instant the pair elapsed. Errors unless the pair is `elapsed`.
    pub fn strict_elapsed_at(&self) -> Result<Timestamp, InvalidTransition> {
        self.core().elapsed_record().map(|r| r.at)
    }

    /// Main value of `side`.
    pub fn value(&self, side: Side) -> ClockValue {
        self.core().clock(side).main_value()
    }

    /// Signed milliseconds of main time left for `side` now.
    pub fn remaining(&self, side: Side) -> i64 {
        let core = self.core();
        core.clock(side).main_value().remaining_at(core.time.now())
    }

    /// Signed milliseconds left for `side` now, banked time included.
    pub fn total_remaining(&self, side: Side) -> i64 {
        let core = self.core();
        core.clock(side).total_value().remaining_at(core.time.now())
    }

    pub(crate) fn with_clock<R>(&self, side: Side, f: impl FnOnce(&F::Countdown) -> R) -> R {
        f(self.core().clock(side))
    }
}

impl<F: Family> fmt::Debug for ClockPair<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core();
        f.debug_struct("ClockPair")
            .field("family", &F::KIND)
            .field("state", &core.state)
            .field("side_to_move", &core.side_to_move)
            .field("clocks", &core.clocks)
            .field("elapsed", &core.elapsed)
            .finish()
    }
}

fn wake_timer<F: Family>(
    weak: &Weak<Mutex<PairCore<F>>>,
    side: Side,
    scheduler: &Arc<dyn Scheduler>,
) -> Timer {
    let weak = weak.clone();
    let hook: FireHook = Arc::new(move |token| {
        // A dropped pair leaves nothing to wake.
        if let Some(core) = weak.upgrade() {
            core.lock().unwrap_or_else(PoisonError::into_inner).on_timer(side, token);
        }
    });
    Timer::new(Arc::clone(scheduler), hook)
}
