//! Periodic status requests while connected.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::state::ConnectionState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Owns at most one repeating timer.
///
/// The poller only produces ticks; whoever owns it sends the request. The
/// immediate request on start is also the owner's job, which is why
/// [`StatusPoller::follow`] reports when it started.
#[derive(Debug)]
pub struct StatusPoller {
    period: Duration,
    interval: Option<Interval>,
}

impl StatusPoller {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
        }
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    pub const fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// (Re)starts the timer. The first tick is one period from now.
    pub fn start(&mut self) {
        self.stop();
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Returns whether a timer was running.
    pub fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    /// Runs while `state` is connected and stops otherwise.
    ///
    /// Returns true only when this call started the timer, which is when the
    /// owner should send an immediate request.
    pub fn follow(&mut self, state: &ConnectionState) -> bool {
        match (state.is_connected(), self.is_running()) {
            (true, false) => {
                self.start();
                true
            }
            (false, true) => {
                self.stop();
                false
            }
            _ => false,
        }
    }

    /// Completes at the next tick. Never completes while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts ticks delivered within `window`.
    async fn ticks_within(poller: &mut StatusPoller, window: Duration) -> usize {
        let deadline = Instant::now() + window;
        let mut ticks = 0;
        loop {
            tokio::select! {
                () = poller.tick() => ticks += 1,
                () = time::sleep_until(deadline) => return ticks,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_after_start() {
        let mut poller = StatusPoller::default();
        poller.start();
        assert_eq!(ticks_within(&mut poller, Duration::from_millis(4_900)).await, 0);
        assert_eq!(ticks_within(&mut poller, Duration::from_millis(10_000)).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_poller_never_ticks() {
        let mut poller = StatusPoller::default();
        poller.start();
        assert!(poller.stop());
        assert!(!poller.stop());
        assert_eq!(ticks_within(&mut poller, Duration::from_secs(60)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_a_single_timer() {
        let mut poller = StatusPoller::default();
        poller.start();
        time::sleep(Duration::from_secs(3)).await;
        poller.start();
        // Only the restarted timer fires, 5s after the restart.
        assert_eq!(ticks_within(&mut poller, Duration::from_millis(4_500)).await, 0);
        assert_eq!(ticks_within(&mut poller, Duration::from_secs(1)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn follows_connection_state() {
        let mut poller = StatusPoller::default();
        assert!(poller.follow(&ConnectionState::Connected));
        assert!(!poller.follow(&ConnectionState::Connected), "already running");
        assert!(poller.is_running());

        assert!(!poller.follow(&ConnectionState::Reconnecting));
        assert!(!poller.is_running());

        assert!(poller.follow(&ConnectionState::Connected));
        assert!(!poller.follow(&ConnectionState::Failed("x".to_string())));
        assert!(!poller.is_running());
    }
}
