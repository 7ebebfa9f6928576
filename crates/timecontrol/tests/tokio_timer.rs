use clock_core::{Side, SystemTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use timecontrol::{
    ClockEnv, IncrementClockPair, IncrementOptions, PairState, SafetyOptions, TokioScheduler,
};

fn env() -> ClockEnv {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let scheduler = TokioScheduler::try_current(Arc::clone(&time)).expect("inside a runtime");
    ClockEnv::new(Arc::new(scheduler), time)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_clock_elapses_on_its_own() {
    let env = env();
    let (mut pair, rx) =
        IncrementClockPair::create(IncrementOptions::new(60), &SafetyOptions::default(), &env)
            .unwrap();
    let start = env.time.now();
    pair.start(start).unwrap();

    let record = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert_eq!(record.side, Side::First);
    assert_eq!(record.at, start.add_ms(60));
    assert_eq!(pair.state(), PairState::Elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_cancels_pending_wake() {
    let env = env();
    let (mut pair, mut rx) = IncrementClockPair::create(
        IncrementOptions::new(80).with_increment(10_000),
        &SafetyOptions::default(),
        &env,
    )
    .unwrap();
    pair.start(env.time.now()).unwrap();
    pair.push(Side::First, env.time.now()).unwrap();
    pair.push(Side::Second, env.time.now()).unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(pair.state(), PairState::Running);
}

#[tokio::test]
async fn env_picks_up_current_runtime() {
    assert!(ClockEnv::tokio_current().is_some());
}
