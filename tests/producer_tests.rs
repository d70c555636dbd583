mod test_harness;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use jobrunner::config::ProducerConfig;
use jobrunner::error::JobRunnerError;
use jobrunner::job::JobContext;
use jobrunner::scheduler::{JobProducer, ProducerState};
use jobrunner::shutdown::StopOutcome;
use jobrunner::worker::{job_queue, JobReceiver};
use test_harness::{assert_eventually, TestSource};

const MINUTE: Duration = Duration::from_secs(60);

/// Execute everything currently queued, in queue order.
async fn drain(receiver: &JobReceiver, count: usize) {
    let ctx = JobContext::new(CancellationToken::new(), Duration::from_secs(5));
    for _ in 0..count {
        let job = receiver.recv().await.expect("queue should hold a job");
        job.execute(&ctx).await.unwrap();
    }
}

#[tokio::test]
async fn test_initial_poll_enqueues_full_batch_in_order() {
    let (sender, receiver) = job_queue(100);
    let source = TestSource::batch(100);
    let mut producer = JobProducer::new(
        Arc::new(source.clone()),
        sender.clone(),
        ProducerConfig::default(),
    );

    producer.start().unwrap();
    assert_eventually(
        || async { sender.len() == 100 },
        Duration::from_secs(2),
        "first poll should fill the queue",
    )
    .await;

    assert_eq!(producer.stop(Duration::from_secs(1)).await, StopOutcome::Clean);

    drain(&receiver, 100).await;
    assert_eq!(source.executed(), (0..100).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_polls_align_then_repeat_every_interval() {
    let (sender, _receiver) = job_queue(10);
    let source = TestSource::empty();
    let mut producer = JobProducer::new(Arc::new(source.clone()), sender, ProducerConfig::default());

    let run_for = MINUTE * 3 + Duration::from_secs(30);
    producer.start().unwrap();
    tokio::time::sleep(run_for).await;
    producer.stop(Duration::from_secs(1)).await;

    let reads = source.read_times();
    assert!(reads.len() >= 4, "expected at least 4 polls, got {}", reads.len());

    // Alignment sleep is positive and never exceeds one interval.
    let alignment = reads[1] - reads[0];
    assert!(alignment > Duration::ZERO && alignment <= MINUTE);

    let slack = Duration::from_secs(1);
    for pair in reads[1..].windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= MINUTE && gap <= MINUTE + slack,
            "tick-driven polls must be one interval apart, got {:?}",
            gap
        );
    }

    // Startup poll, boundary poll, then one per elapsed interval.
    let expected = 2 + ((run_for - alignment).as_secs() / MINUTE.as_secs()) as usize;
    assert_eq!(reads.len(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_source_error_skips_pass_and_keeps_polling() {
    let (sender, _receiver) = job_queue(10);
    let source = TestSource::failing();
    let mut producer = JobProducer::new(
        Arc::new(source.clone()),
        sender.clone(),
        ProducerConfig::default(),
    );

    producer.start().unwrap();
    tokio::time::sleep(MINUTE + Duration::from_secs(30)).await;

    assert!(source.read_count() >= 2, "next pass should still happen");
    assert!(sender.is_empty());
    assert_eq!(producer.state(), ProducerState::Running);

    assert_eq!(producer.stop(Duration::from_secs(1)).await, StopOutcome::Clean);
    assert_eq!(producer.state(), ProducerState::Stopped);
}

#[tokio::test]
async fn test_stop_while_blocked_on_full_queue_returns_promptly() {
    let (sender, _receiver) = job_queue(1);
    let source = TestSource::batch(5);
    let mut producer = JobProducer::new(
        Arc::new(source.clone()),
        sender.clone(),
        ProducerConfig::default(),
    );

    producer.start().unwrap();
    assert_eventually(
        || async { sender.len() == 1 },
        Duration::from_secs(2),
        "queue should fill up",
    )
    .await;

    let start = std::time::Instant::now();
    let outcome = producer.stop(Duration::from_secs(5)).await;

    assert_eq!(outcome, StopOutcome::Clean);
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "stop must not wait for queue space (took {:?})",
        start.elapsed()
    );
    assert_eq!(sender.len(), 1, "no job is enqueued after stop");
}

#[tokio::test]
async fn test_batch_is_capped_per_poll() {
    let (sender, receiver) = job_queue(500);
    let source = TestSource::batch(150);
    let config = ProducerConfig::default().with_max_jobs_per_poll(100);
    let mut producer = JobProducer::new(Arc::new(source.clone()), sender.clone(), config);

    producer.start().unwrap();
    assert_eventually(
        || async { sender.len() >= 100 },
        Duration::from_secs(2),
        "first poll should enqueue its capped batch",
    )
    .await;
    producer.stop(Duration::from_secs(1)).await;

    let queued = sender.len();
    drain(&receiver, queued).await;
    let executed = source.executed();
    assert!(executed.len() >= 100);
    assert!(
        executed.iter().all(|tag| *tag < 100),
        "no pass may take more than 100 jobs from the source"
    );
}

#[tokio::test]
async fn test_closed_queue_ends_loop() {
    let (sender, receiver) = job_queue(1);
    let source = TestSource::batch(5);
    let mut producer = JobProducer::new(
        Arc::new(source.clone()),
        sender.clone(),
        ProducerConfig::default(),
    );

    producer.start().unwrap();
    assert_eventually(
        || async { sender.len() == 1 },
        Duration::from_secs(2),
        "queue should fill up",
    )
    .await;

    receiver.close();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(producer.stop(Duration::from_millis(100)).await, StopOutcome::Clean);
}

#[tokio::test]
async fn test_lifecycle_rules() {
    let (sender, _receiver) = job_queue(1);
    let mut producer = JobProducer::new(
        Arc::new(TestSource::empty()),
        sender.clone(),
        ProducerConfig::default(),
    );
    assert_eq!(producer.state(), ProducerState::Idle);

    producer.start().unwrap();
    assert_eq!(producer.state(), ProducerState::Running);
    assert!(matches!(
        producer.start(),
        Err(JobRunnerError::AlreadyStarted(_))
    ));

    assert_eq!(producer.stop(Duration::from_secs(1)).await, StopOutcome::Clean);
    assert_eq!(producer.state(), ProducerState::Stopped);

    // Stopped producers stay stopped.
    assert!(producer.start().is_err());
    assert_eq!(producer.stop(Duration::from_secs(1)).await, StopOutcome::Clean);

    // Stopping a producer that never started is a no-op.
    let mut idle = JobProducer::new(Arc::new(TestSource::empty()), sender, ProducerConfig::default());
    assert_eq!(idle.stop(Duration::ZERO).await, StopOutcome::Clean);
    assert_eq!(idle.state(), ProducerState::Stopped);
}
