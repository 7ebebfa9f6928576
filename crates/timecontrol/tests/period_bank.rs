mod common;

use clock_core::{ClockValue, Side};
use common::Harness;
use timecontrol::{
    ElapsedReceiver, ElapsedRecord, PairState, PeriodBankClockPair, PeriodBankOptions,
    PeriodBankPlayer, Snapshot,
};

fn pair(h: &Harness, initial: u64, period: u64, count: u32) -> (PeriodBankClockPair, ElapsedReceiver) {
    PeriodBankClockPair::create(PeriodBankOptions::new(initial, period, count), &h.env).unwrap()
}

#[test]
fn restore_replays_lost_periods() {
    let h = Harness::new();
    let (mut p, mut rx) = pair(&h, 10_000, 10_000, 10);
    let overdue = PeriodBankPlayer {
        remaining: ClockValue::elapsing(h.now().add_ms(-45_500)),
        remaining_total: ClockValue::elapsing(h.now().add_ms(34_500)),
        remaining_periods: 8,
    };
    let idle = PeriodBankPlayer {
        remaining: ClockValue::frozen(10_000),
        remaining_total: ClockValue::frozen(110_000),
        remaining_periods: 10,
    };
    p.restore(&Snapshot {
        state: PairState::Running,
        side_to_move: Side::First,
        players: [overdue, idle],
        elapsed_at: None,
    })
    .unwrap();

    assert_eq!(p.state(), PairState::Running);
    assert_eq!(p.remaining_periods(Side::First), 3);
    assert_eq!(p.remaining(Side::First), 4_500);
    assert_eq!(p.total_remaining(Side::First), 34_500);
    assert!(rx.try_recv().is_err());
}

#[test]
fn restore_past_the_whole_bank_elapses_historically() {
    let h = Harness::new();
    let (mut p, mut rx) = pair(&h, 1_000, 500, 2);
    let overdue = PeriodBankPlayer {
        remaining: ClockValue::elapsing(h.now().add_ms(-5_000)),
        remaining_total: ClockValue::elapsing(h.now().add_ms(-4_000)),
        remaining_periods: 2,
    };
    let idle = PeriodBankPlayer {
        remaining: ClockValue::frozen(1_000),
        remaining_total: ClockValue::frozen(2_000),
        remaining_periods: 2,
    };
    p.restore(&Snapshot {
        state: PairState::Running,
        side_to_move: Side::First,
        players: [overdue, idle],
        elapsed_at: None,
    })
    .unwrap();

    // Main time ran out 5s ago; the two 500ms periods carried it 1s further.
    let ran_out = h.now().add_ms(-4_000);
    assert_eq!(p.state(), PairState::Elapsed);
    assert_eq!(p.strict_elapsed_at().unwrap(), ran_out);
    assert_eq!(rx.try_recv().unwrap(), ElapsedRecord { side: Side::First, at: ran_out });
    assert_eq!(p.remaining_periods(Side::First), 0);
    assert_eq!(p.value(Side::First), ClockValue::frozen(0));
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn move_inside_period_reloads_it() {
    let h = Harness::new();
    let (mut p, _rx) = pair(&h, 1_000, 5_000, 3);
    p.start(h.now()).unwrap();
    h.advance(1_000);
    assert_eq!(p.remaining_periods(Side::First), 2);
    h.advance(2_000);
    p.push(Side::First, h.now()).unwrap();

    assert!(p.in_periods(Side::First));
    assert_eq!(p.remaining_periods(Side::First), 2);
    assert_eq!(p.value(Side::First), ClockValue::frozen(5_000));
}

#[test]
fn move_inside_main_time_is_not_reloaded() {
    let h = Harness::new();
    let (mut p, _rx) = pair(&h, 10_000, 5_000, 3);
    p.start(h.now()).unwrap();
    h.advance(4_000);
    p.push(Side::First, h.now()).unwrap();

    assert!(!p.in_periods(Side::First));
    assert_eq!(p.value(Side::First), ClockValue::frozen(6_000));
}

#[test]
fn timer_walks_through_every_period_then_elapses() {
    let h = Harness::new();
    let (mut p, mut rx) = pair(&h, 1_000, 500, 2);
    let start = h.now();
    p.start(start).unwrap();

    assert_eq!(h.advance(1_000), 1);
    assert_eq!(p.remaining_periods(Side::First), 1);
    assert_eq!(h.advance(500), 1);
    assert_eq!(p.remaining_periods(Side::First), 0);
    assert!(rx.try_recv().is_err());
    assert_eq!(h.advance(500), 1);

    assert_eq!(p.state(), PairState::Elapsed);
    assert_eq!(rx.try_recv().unwrap().at, start.add_ms(2_000));
}

#[test]
fn periods_are_independent_per_side() {
    let h = Harness::new();
    let (mut p, _rx) = pair(&h, 0, 1_000, 3);
    p.start(h.now()).unwrap();
    // Zero main time: the first period is taken as soon as the clock starts.
    assert_eq!(p.remaining_periods(Side::First), 2);
    h.advance(300);
    p.push(Side::First, h.now()).unwrap();

    assert_eq!(p.remaining_periods(Side::Second), 2);
    assert_eq!(p.value(Side::First), ClockValue::frozen(1_000));
    assert_eq!(p.remaining(Side::Second), 1_000);
}

#[test]
fn pause_pays_from_bank_and_resume_keeps_it() {
    let h = Harness::new();
    let (mut p, _rx) = pair(&h, 1_000, 500, 3);
    p.start(h.now()).unwrap();
    h.time.advance_ms(1_200);
    p.pause(h.now()).unwrap();

    assert_eq!(p.remaining_periods(Side::First), 2);
    assert_eq!(p.value(Side::First), ClockValue::frozen(300));
    h.time.advance_ms(60_000);
    p.resume(h.now()).unwrap();
    assert_eq!(p.remaining(Side::First), 300);
}

#[test]
fn pause_with_empty_bank_elapses_at_pause_instant() {
    let h = Harness::new();
    let (mut p, _rx) = pair(&h, 1_000, 500, 1);
    p.start(h.now()).unwrap();
    h.time.advance_ms(2_000);
    let at = h.now();
    p.pause(at).unwrap();
    assert_eq!(p.strict_elapsed_at().unwrap(), at);
}
