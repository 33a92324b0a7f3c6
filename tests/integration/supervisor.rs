//! Scheduling behavior of the supervisor under a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use ao_price_oracle::engine::{ControllerSettings, Supervisor, SupervisorConfig, UpdateController};

use crate::fakes::{FakePriceSource, FakeSubmitter};

const PID: &str = "agYcCFJtrMG6cqMuZfskIkFTGvUPddICmtQSBIoPdiA";
const PERIOD: Duration = Duration::from_secs(1);

fn supervisor(
    source: &Arc<FakePriceSource>,
    submitter: &Arc<FakeSubmitter>,
    serialize_cycles: bool,
) -> Supervisor {
    let controller = UpdateController::new(
        source.clone(),
        submitter.clone(),
        ControllerSettings::new(PID),
    );
    Supervisor::new(
        Arc::new(controller),
        SupervisorConfig {
            update_interval: PERIOD,
            serialize_cycles,
            shutdown_grace: Duration::from_secs(10),
        },
    )
}

fn after_ticks(ticks: u32) -> Duration {
    PERIOD * ticks + Duration::from_millis(10)
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_first_cycle_immediately() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;

    assert_eq!(source.calls(), 1);
    assert_eq!(submitter.send_count(), 1);
    let status = sup.status();
    assert!(status.is_running);
    assert!(status.timer_armed);
    assert_eq!(status.update_interval_ms, 1000);
    assert_eq!(status.process_id, PID);
}

#[tokio::test(start_paused = true)]
async fn test_timer_fires_every_period() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    tokio::time::sleep(after_ticks(3)).await;

    assert_eq!(source.calls(), 4);
    assert_eq!(submitter.send_count(), 4);
    assert_eq!(submitter.results_fetched(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_is_noop() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    sup.start().await;
    assert_eq!(source.calls(), 1);

    // Only one timer is armed.
    tokio::time::sleep(after_ticks(1)).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_cycles() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    tokio::time::sleep(after_ticks(1)).await;
    assert_eq!(source.calls(), 2);

    sup.stop();
    let status = sup.status();
    assert!(!status.is_running);
    assert!(!status.timer_armed);

    tokio::time::sleep(after_ticks(5)).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_not_running() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.stop();
    assert!(!sup.status().is_running);
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    sup.stop();
    sup.start().await;
    assert_eq!(source.calls(), 2);
    assert!(sup.status().timer_armed);

    tokio::time::sleep(after_ticks(1)).await;
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_once_does_not_arm_timer() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let sup = supervisor(&source, &submitter, false);

    let report = sup.run_once().await;
    assert!(report.is_success());
    assert!(!sup.status().is_running);
    assert!(!sup.status().timer_armed);

    tokio::time::sleep(after_ticks(3)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failures_keep_schedule_alive() {
    let source = Arc::new(FakePriceSource::failing());
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    tokio::time::sleep(after_ticks(2)).await;

    assert_eq!(source.calls(), 3);
    assert_eq!(submitter.send_count(), 0);
    assert!(sup.status().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_updates_keep_schedule_alive() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::silent());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    tokio::time::sleep(after_ticks(2)).await;

    assert_eq!(submitter.send_count(), 3);
    assert_eq!(submitter.results_fetched(), 3);
    assert!(sup.status().is_running);
    assert!(sup.status().timer_armed);
    for tags in submitter.sent() {
        assert!(tags.iter().any(|t| t.name == "Price" && t.value == "12.345678"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycles_overlap_by_default() {
    let source = Arc::new(FakePriceSource::with_delay(12.345678, PERIOD * 5 / 2));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    tokio::time::sleep(PERIOD * 5 / 2).await;

    assert!(source.max_active() >= 2);
    assert!(sup.status().cycles_in_flight >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_serialized_cycles_skip_busy_ticks() {
    let source = Arc::new(FakePriceSource::with_delay(12.345678, PERIOD * 5 / 2));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, true);

    sup.start().await;
    tokio::time::sleep(PERIOD * 6).await;

    assert_eq!(source.max_active(), 1);
    assert!(source.calls() >= 2);
    assert!(sup.status().cycles_in_flight <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_disarms_timer() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    sup.start().await;
    drop(sup);

    tokio::time::sleep(after_ticks(3)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown_already_signalled() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();
    sup.run_until_shutdown(rx).await;

    assert_eq!(source.calls(), 1);
    assert!(!sup.status().is_running);

    tokio::time::sleep(after_ticks(3)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown_on_signal() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(PERIOD * 5 / 2).await;
        let _ = tx.send(());
    });
    sup.run_until_shutdown(rx).await;

    assert_eq!(source.calls(), 3);
    tokio::time::sleep(after_ticks(3)).await;
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown_on_closed_channel() {
    let source = Arc::new(FakePriceSource::new(12.345678));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    let (tx, rx) = broadcast::channel::<()>(1);
    drop(tx);
    sup.run_until_shutdown(rx).await;

    assert_eq!(source.calls(), 1);
    assert!(!sup.status().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_cycle() {
    let source = Arc::new(FakePriceSource::with_delay(12.345678, PERIOD / 2));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    // First cycle runs 0..0.5s, the tick at 1.5s runs until 2.0s.
    let started = Instant::now();
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(PERIOD * 7 / 4).await;
        let _ = tx.send(());
    });
    sup.run_until_shutdown(rx).await;

    // Returns as soon as the last cycle ends.
    let elapsed = started.elapsed();
    assert!(elapsed >= PERIOD * 2 && elapsed < PERIOD * 2 + Duration::from_millis(5));
    assert_eq!(source.calls(), 2);
    assert_eq!(source.completed(), 2);
    assert_eq!(submitter.send_count(), 2);
    assert_eq!(sup.status().cycles_in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_gives_up_after_grace_period() {
    let source = Arc::new(FakePriceSource::with_delay(12.345678, Duration::from_secs(30)));
    let submitter = Arc::new(FakeSubmitter::acking());
    let mut sup = supervisor(&source, &submitter, false);

    // First cycle blocks start until 30s; the tick at 31s runs until 61s.
    let started = Instant::now();
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(40)).await;
        let _ = tx.send(());
    });
    sup.run_until_shutdown(rx).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(50) && elapsed < Duration::from_millis(50_005));
    assert_eq!(sup.status().cycles_in_flight, 1);
    assert_eq!(source.completed(), 1);
}
