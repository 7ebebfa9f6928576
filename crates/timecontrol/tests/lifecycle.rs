mod common;

use clock_core::Side;
use common::Harness;
use timecontrol::{
    Action, ClockError, IncrementClockPair, IncrementOptions, InvalidTransition, PairState,
    PeriodBankClockPair, PeriodBankOptions, SafetyOptions,
};

fn increment(h: &Harness) -> IncrementClockPair {
    IncrementClockPair::create(
        IncrementOptions::new(60_000).with_increment(1_000),
        &SafetyOptions::default(),
        &h.env,
    )
    .unwrap()
    .0
}

fn wrong_state(err: ClockError) -> (Action, PairState) {
    match err {
        ClockError::InvalidTransition(InvalidTransition::WrongState { action, actual, .. }) => {
            (action, actual)
        }
        other => panic!("expected wrong-state error, got {other:?}"),
    }
}

#[test]
fn double_push_is_rejected() {
    let h = Harness::new();
    let mut p = increment(&h);
    p.start(h.now()).unwrap();
    p.push(Side::First, h.now().add_ms(1_000)).unwrap();
    let err = p.push(Side::First, h.now().add_ms(2_000)).unwrap_err();

    assert!(err.is_invalid_transition());
    assert!(matches!(
        err,
        ClockError::InvalidTransition(InvalidTransition::NotToMove {
            side: Side::First,
            to_move: Side::Second
        })
    ));
    assert_eq!(p.side_to_move(), Side::Second);
}

#[test]
fn guarded_operations_require_their_state() {
    let h = Harness::new();
    let mut p = increment(&h);
    let now = h.now();

    assert_eq!(wrong_state(p.pause(now).unwrap_err()), (Action::Pause, PairState::Ready));
    assert_eq!(wrong_state(p.resume(now).unwrap_err()), (Action::Resume, PairState::Ready));
    assert_eq!(wrong_state(p.push(Side::First, now).unwrap_err()), (Action::Push, PairState::Ready));

    p.start(now).unwrap();
    assert_eq!(wrong_state(p.start(now).unwrap_err()), (Action::Start, PairState::Running));
    assert_eq!(wrong_state(p.resume(now).unwrap_err()), (Action::Resume, PairState::Running));

    p.pause(now).unwrap();
    assert_eq!(wrong_state(p.pause(now).unwrap_err()), (Action::Pause, PairState::Paused));
    assert_eq!(wrong_state(p.push(Side::First, now).unwrap_err()), (Action::Push, PairState::Paused));
}

#[test]
fn rejected_call_changes_nothing() {
    let h = Harness::new();
    let mut p = increment(&h);
    p.start(h.now()).unwrap();
    let before = p.snapshot();
    assert!(p.push(Side::Second, h.now().add_ms(10)).is_err());
    assert!(p.resume(h.now()).is_err());
    assert_eq!(p.snapshot(), before);
}

#[test]
fn finish_works_from_every_live_state() {
    let h = Harness::new();

    let mut ready = increment(&h);
    ready.finish(h.now());
    assert_eq!(ready.state(), PairState::Over);

    let mut running = increment(&h);
    running.start(h.now()).unwrap();
    running.finish(h.now().add_ms(5_000));
    assert_eq!(running.state(), PairState::Over);
    assert_eq!(running.remaining(Side::First), 55_000);
    assert_eq!(h.scheduler.pending(), 0);

    let mut paused = increment(&h);
    paused.start(h.now()).unwrap();
    paused.pause(h.now()).unwrap();
    paused.finish(h.now());
    assert_eq!(paused.state(), PairState::Over);

    for p in [&mut ready, &mut running, &mut paused] {
        let now = h.now();
        assert!(p.start(now).unwrap_err().is_invalid_transition());
        assert!(p.pause(now).unwrap_err().is_invalid_transition());
        assert!(p.resume(now).unwrap_err().is_invalid_transition());
        assert!(p.push(Side::First, now).unwrap_err().is_invalid_transition());
    }
}

#[test]
fn finish_keeps_elapsed_record() {
    let h = Harness::new();
    let mut p = increment(&h);
    let start = h.now().add_ms(-120_000);
    p.start(start).unwrap();
    p.finish(h.now());
    assert_eq!(p.state(), PairState::Elapsed);
    assert_eq!(p.strict_elapsed_at().unwrap(), start.add_ms(60_000));
}

#[test]
fn strict_accessors_require_elapsed() {
    let h = Harness::new();
    let mut p = increment(&h);
    assert!(p.strict_elapsed_side().is_err());
    p.start(h.now()).unwrap();
    assert!(matches!(
        p.strict_elapsed_at(),
        Err(InvalidTransition::WrongState { action: Action::ReadElapsed, actual: PairState::Running, .. })
    ));
    assert_eq!(p.elapsed(), None);
}

#[test]
fn elapse_report_on_finished_pair_is_rejected() {
    let h = Harness::new();
    let (mut p, _rx) =
        PeriodBankClockPair::create(PeriodBankOptions::new(1_000, 1_000, 1), &h.env).unwrap();
    p.finish(h.now());
    let err = p.on_clock_elapsed(Side::First, h.now()).unwrap_err();
    assert_eq!(wrong_state(err), (Action::Elapse, PairState::Over));
}

#[test]
fn dropped_pair_leaves_timers_inert() {
    let h = Harness::new();
    let mut p = increment(&h);
    p.start(h.now()).unwrap();
    assert_eq!(h.scheduler.pending(), 1);
    drop(p);
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.advance(120_000), 0);
}
