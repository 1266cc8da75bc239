//! Wall-clock driven status polling.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use ccd_client::CameraApi;
use ccd_ops::PollStats;
use ccd_types::{status::StatusSnapshot, CcdError};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// What one poll tick produced.
#[derive(Debug)]
pub enum PollResult {
    Snapshot(StatusSnapshot),
    /// The server answered with something that is not a snapshot.
    Malformed(String),
    Failed(CcdError),
}

#[derive(Debug)]
pub struct PollOutcome {
    /// Tick sequence number, increasing across restarts.
    pub seq: u64,
    pub result: PollResult,
}

/// Issues one status fetch per tick. Each fetch runs in its own task so a
/// slow response never delays the next tick.
pub struct Poller {
    handle: Option<JoinHandle<()>>,
    next_seq: Arc<AtomicU64>,
    stats: PollStats,
}

impl Poller {
    pub fn new(stats: PollStats) -> Self {
        Self {
            handle: None,
            next_seq: Arc::new(AtomicU64::new(0)),
            stats,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starting an already running poller keeps the existing timer.
    pub fn start<A>(
        &mut self,
        period: Duration,
        api: Arc<A>,
        sink: mpsc::Sender<PollOutcome>,
    ) -> bool
    where
        A: CameraApi + ?Sized + 'static,
    {
        if self.is_running() {
            warn!("poller already running; ignoring second start");
            return false;
        }
        info!("Polling status every {:?}", period);
        let next_seq = self.next_seq.clone();
        let stats = self.stats.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if sink.is_closed() {
                    debug!("poll sink closed; poller exiting");
                    break;
                }
                let seq = next_seq.fetch_add(1, Ordering::SeqCst) + 1;
                stats.record_tick().await;
                let api = api.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    let outcome = fetch_once(api.as_ref(), seq).await;
                    // A closed sink means the loop is gone; the result is moot.
                    let _ = sink.send(outcome).await;
                });
            }
        }));
        true
    }

    /// Halts the timer. Fetches already in flight still deliver.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                info!("Polling stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub async fn fetch_once<A>(api: &A, seq: u64) -> PollOutcome
where
    A: CameraApi + ?Sized,
{
    let result = match api.fetch_status().await {
        Ok(body) => match StatusSnapshot::parse(&body) {
            Ok(snapshot) => PollResult::Snapshot(snapshot),
            Err(err) => PollResult::Malformed(err.to_string()),
        },
        Err(err) => PollResult::Failed(err),
    };
    PollOutcome { seq, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_client::MockCamera;

    #[tokio::test]
    async fn ticks_deliver_increasing_sequence_numbers() {
        let stats = PollStats::new();
        let mut poller = Poller::new(stats.clone());
        let (tx, mut rx) = mpsc::channel(16);
        let camera = Arc::new(MockCamera::new());

        assert!(poller.start(Duration::from_millis(10), camera.clone(), tx.clone()));
        assert!(!poller.start(Duration::from_millis(10), camera, tx));
        assert!(poller.is_running());

        let first = rx.recv().await.expect("first outcome");
        let second = rx.recv().await.expect("second outcome");
        assert!(matches!(first.result, PollResult::Snapshot(_)));
        // Fetches may complete out of order.
        assert_ne!(first.seq, second.seq);

        assert!(poller.stop());
        assert!(!poller.is_running());
        assert!(!poller.stop());
        assert!(stats.snapshot().await.ticks >= 2);
    }

    #[tokio::test]
    async fn slow_fetch_does_not_hold_back_ticks() {
        let stats = PollStats::new();
        let mut poller = Poller::new(stats.clone());
        let (tx, mut rx) = mpsc::channel(64);
        let camera = Arc::new(MockCamera::new().with_latency(Duration::from_millis(300)));

        poller.start(Duration::from_millis(20), camera, tx);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(rx.try_recv().is_err(), "no fetch can finish before its latency");
        assert!(stats.snapshot().await.ticks >= 5);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("outcome after latency")
            .expect("outcome");
        assert!(matches!(first.result, PollResult::Snapshot(_)));
        poller.stop();
    }

    #[tokio::test]
    async fn restart_continues_the_sequence() {
        let mut poller = Poller::new(PollStats::new());
        let (tx, mut rx) = mpsc::channel(16);
        let camera = Arc::new(MockCamera::new());

        poller.start(Duration::from_secs(60), camera.clone(), tx.clone());
        let first = rx.recv().await.expect("immediate first tick");
        poller.stop();

        poller.start(Duration::from_secs(60), camera, tx);
        let second = rx.recv().await.expect("first tick after restart");
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn malformed_and_failed_fetches_are_classified() {
        let camera = MockCamera::new();
        camera.push_status("<h1>ERROR</h1>");
        camera.push_failure("connection reset");

        let outcome = fetch_once(&camera, 1).await;
        assert!(matches!(outcome.result, PollResult::Malformed(_)));
        let outcome = fetch_once(&camera, 2).await;
        assert!(matches!(outcome.result, PollResult::Failed(_)));
    }
}
