//! Retry timers for inventory masking.
//!
//! Masking sessions never sleep. They arm a per-client timer through
//! [`RetryScheduler`]; the timer only posts a message back to the main loop,
//! where the retry itself runs alongside every other mutation.

use crate::network::ServerMessage;
use crate::probe::CancellationToken;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub trait RetryScheduler {
    /// Starts (or restarts) the recurring retry timer for `client_id`.
    fn arm(&mut self, client_id: u32, period: Duration, token: CancellationToken);
    fn disarm(&mut self, client_id: u32);
    fn is_armed(&self, client_id: u32) -> bool;
}

/// Timer backed by a tokio task per client.
pub struct TokioScheduler {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    timers: HashMap<u32, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(server_tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            server_tx,
            timers: HashMap::new(),
        }
    }
}

impl RetryScheduler for TokioScheduler {
    fn arm(&mut self, client_id: u32, period: Duration, token: CancellationToken) {
        self.disarm(client_id);

        let server_tx = self.server_tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if token.is_cancelled() {
                    break;
                }
                if server_tx
                    .send(ServerMessage::RetryInventory { client_id })
                    .is_err()
                {
                    break;
                }
            }
            debug!("Retry timer for client {} stopped", client_id);
        });
        self.timers.insert(client_id, handle);
    }

    fn disarm(&mut self, client_id: u32) {
        if let Some(handle) = self.timers.remove(&client_id) {
            handle.abort();
        }
    }

    fn is_armed(&self, client_id: u32) -> bool {
        self.timers
            .get(&client_id)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for handle in self.timers.values() {
            handle.abort();
        }
    }
}

/// Deterministic scheduler: records arm/disarm calls and never fires on its own.
/// Drive retries by calling the masking retry entry point directly.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    armed: HashMap<u32, Duration>,
    arm_count: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(&self, client_id: u32) -> Option<Duration> {
        self.armed.get(&client_id).copied()
    }

    /// Number of `arm` calls so far.
    pub fn arm_count(&self) -> usize {
        self.arm_count
    }
}

impl RetryScheduler for ManualScheduler {
    fn arm(&mut self, client_id: u32, period: Duration, _token: CancellationToken) {
        self.arm_count += 1;
        self.armed.insert(client_id, period);
    }

    fn disarm(&mut self, client_id: u32) {
        self.armed.remove(&client_id);
    }

    fn is_armed(&self, client_id: u32) -> bool {
        self.armed.contains_key(&client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_records_calls() {
        let mut scheduler = ManualScheduler::new();
        scheduler.arm(4, Duration::from_millis(1000), CancellationToken::new());

        assert!(scheduler.is_armed(4));
        assert_eq!(scheduler.period(4), Some(Duration::from_millis(1000)));
        assert_eq!(scheduler.arm_count(), 1);

        scheduler.disarm(4);
        assert!(!scheduler.is_armed(4));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_posts_retries() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        scheduler.arm(7, Duration::from_millis(10), CancellationToken::new());
        assert!(scheduler.is_armed(7));

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer never fired");
        match message {
            Some(ServerMessage::RetryInventory { client_id }) => assert_eq!(client_id, 7),
            other => panic!("Unexpected message: {:?}", other),
        }

        scheduler.disarm(7);
        assert!(!scheduler.is_armed(7));
    }

    #[tokio::test]
    async fn test_tokio_timer_stops_on_cancellation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);
        let token = CancellationToken::new();

        token.cancel();
        scheduler.arm(7, Duration::from_millis(5), token);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.is_armed(7));
    }
}
