#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use omni_poller::test_support::{ScriptStep, ScriptedSource, updates};
use omni_poller::{
    Backoff, CancellationToken, FetchError, LongPoller, PollError, Poller, RetryPolicy, Update,
    UpdateSource,
};
use tokio::sync::mpsc;

const FAST_TIMEOUT: Duration = Duration::from_millis(20);

/// Fails every fetch without ever suspending.
#[derive(Default)]
struct FailingSource {
    fetches: AtomicUsize,
}

#[async_trait]
impl UpdateSource for FailingSource {
    async fn fetch_updates(
        &self,
        _since_id: i64,
        _timeout: Duration,
    ) -> std::result::Result<Vec<Update>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Other("invalid api base".to_string()))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

async fn recv_ids(rx: &mut mpsc::Receiver<Update>, count: usize) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("destination closed early"))?;
        ids.push(update.id);
    }
    Ok(ids)
}

fn spawn_long_poller(
    poller: LongPoller,
    source: Arc<ScriptedSource>,
    capacity: usize,
) -> (
    mpsc::Receiver<Update>,
    CancellationToken,
    tokio::task::JoinHandle<omni_poller::Result<()>>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let stop = CancellationToken::new();
    let token = stop.clone();
    let source: Arc<dyn UpdateSource> = source;
    let task = tokio::spawn(async move { poller.poll(source, tx, token).await });
    (rx, stop, task)
}

#[tokio::test]
async fn long_poller_delivers_in_order_and_advances_cursor() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Batch(updates(&[1, 2, 3])),
        ScriptStep::Fail("network down".to_string()),
        ScriptStep::Batch(updates(&[4, 6])),
    ]));
    let (mut rx, stop, task) =
        spawn_long_poller(LongPoller::new(FAST_TIMEOUT), Arc::clone(&source), 16);

    assert_eq!(recv_ids(&mut rx, 5).await?, vec![1, 2, 3, 4, 6]);
    wait_until(|| source.fetch_count() >= 4).await?;

    stop.cancel();
    task.await??;

    let requested = source.requested_since_ids();
    assert_eq!(&requested[..4], &[1, 4, 4, 7]);
    assert!(requested[3..].iter().all(|since_id| *since_id == 7));
    Ok(())
}

#[tokio::test]
async fn long_poller_cursor_never_moves_backwards() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Batch(updates(&[10, 12])),
        ScriptStep::Batch(updates(&[11])),
    ]));
    let (mut rx, stop, task) =
        spawn_long_poller(LongPoller::new(FAST_TIMEOUT), Arc::clone(&source), 16);

    assert_eq!(recv_ids(&mut rx, 3).await?, vec![10, 12, 11]);
    wait_until(|| source.fetch_count() >= 3).await?;
    stop.cancel();
    task.await??;

    let requested = source.requested_since_ids();
    assert_eq!(&requested[..3], &[1, 13, 13]);
    Ok(())
}

#[tokio::test]
async fn long_poller_stopped_before_start_fetches_nothing() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([ScriptStep::Batch(updates(&[1]))]));
    let (tx, mut rx) = mpsc::channel(4);
    let stop = CancellationToken::new();
    stop.cancel();

    LongPoller::new(FAST_TIMEOUT)
        .poll(source.clone(), tx, stop)
        .await?;

    assert_eq!(source.fetch_count(), 0);
    assert!(rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn long_poller_blocks_fetching_while_destination_is_full() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Batch(updates(&[1, 2, 3])),
        ScriptStep::Batch(updates(&[4])),
    ]));
    let (mut rx, stop, task) =
        spawn_long_poller(LongPoller::new(FAST_TIMEOUT), Arc::clone(&source), 1);

    wait_until(|| source.fetch_count() == 1).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.fetch_count(), 1);

    assert_eq!(recv_ids(&mut rx, 1).await?, vec![1]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.fetch_count(), 1);

    assert_eq!(recv_ids(&mut rx, 3).await?, vec![2, 3, 4]);
    assert!(source.fetch_count() >= 2);

    stop.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn long_poller_blocked_send_observes_stop() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([ScriptStep::Batch(updates(&[1, 2]))]));
    let (mut rx, stop, task) =
        spawn_long_poller(LongPoller::new(FAST_TIMEOUT), Arc::clone(&source), 1);

    wait_until(|| rx.len() == 1).await?;
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await???;

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(recv_ids(&mut rx, 1).await?, vec![1]);
    assert!(rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn long_poller_reports_closed_destination() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([ScriptStep::Batch(updates(&[1]))]));
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let result = LongPoller::new(FAST_TIMEOUT)
        .poll(source, tx, CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PollError::DestinationClosed)));
    Ok(())
}

#[tokio::test]
async fn long_poller_gives_up_after_retry_limit() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(
        (0..5).map(|attempt| ScriptStep::Fail(format!("failure {attempt}"))),
    ));
    let (tx, _rx) = mpsc::channel(1);
    let poller = LongPoller::new(FAST_TIMEOUT)
        .with_retry_policy(RetryPolicy::unlimited().with_max_attempts(3));

    let result = poller
        .poll(source.clone(), tx, CancellationToken::new())
        .await;
    match result {
        Err(PollError::RetryLimitExceeded {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("failure 2"));
        }
        other => anyhow::bail!("unexpected result: {other:?}"),
    }
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(source.requested_since_ids(), vec![1, 1, 1]);
    Ok(())
}

#[tokio::test]
async fn long_poller_success_resets_failure_count() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Fail("first".to_string()),
        ScriptStep::Batch(updates(&[1])),
        ScriptStep::Fail("second".to_string()),
        ScriptStep::Batch(updates(&[2])),
    ]));
    let poller = LongPoller::new(FAST_TIMEOUT)
        .with_retry_policy(RetryPolicy::unlimited().with_max_attempts(2));
    let (mut rx, stop, task) = spawn_long_poller(poller, Arc::clone(&source), 4);

    assert_eq!(recv_ids(&mut rx, 2).await?, vec![1, 2]);
    stop.cancel();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn long_poller_waits_out_exponential_backoff() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([
        ScriptStep::Fail("a".to_string()),
        ScriptStep::Fail("b".to_string()),
        ScriptStep::Fail("c".to_string()),
        ScriptStep::Batch(updates(&[1])),
    ]));
    let poller = LongPoller::new(FAST_TIMEOUT).with_retry_policy(
        RetryPolicy::unlimited().with_backoff(Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        }),
    );
    let started = tokio::time::Instant::now();
    let (mut rx, stop, task) = spawn_long_poller(poller, Arc::clone(&source), 4);

    assert_eq!(recv_ids(&mut rx, 1).await?, vec![1]);
    assert!(started.elapsed() >= Duration::from_millis(700));

    stop.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn long_poller_stop_waits_for_in_flight_fetch_by_default() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([ScriptStep::Hang]));
    let (_rx, stop, task) =
        spawn_long_poller(LongPoller::new(FAST_TIMEOUT), Arc::clone(&source), 1);

    wait_until(|| source.fetch_count() == 1).await?;
    stop.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished());

    task.abort();
    Ok(())
}

#[tokio::test]
async fn interruptible_long_poller_abandons_in_flight_fetch() -> Result<()> {
    let source = Arc::new(ScriptedSource::new([ScriptStep::Hang]));
    let poller = LongPoller::new(FAST_TIMEOUT).interruptible(true);
    let (mut rx, stop, task) = spawn_long_poller(poller, Arc::clone(&source), 1);

    wait_until(|| source.fetch_count() == 1).await?;
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await???;

    assert_eq!(source.fetch_count(), 1);
    assert!(rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn long_poller_immediate_retries_still_observe_stop() -> Result<()> {
    let source = Arc::new(FailingSource::default());
    let (tx, _rx) = mpsc::channel(1);
    let stop = CancellationToken::new();
    let token = stop.clone();
    let dyn_source: Arc<dyn UpdateSource> = source.clone();
    let task =
        tokio::spawn(async move { LongPoller::default().poll(dyn_source, tx, token).await });

    wait_until(|| source.fetches.load(Ordering::SeqCst) >= 3).await?;
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await???;
    Ok(())
}
