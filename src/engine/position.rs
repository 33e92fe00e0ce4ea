//! Rate-limited position sampling

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Positions worth publishing from one sample
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    /// New value for the observable state
    pub ui: Option<f64>,
    /// New value for the media surface
    pub os: Option<f64>,
}

/// Decides which position changes are worth republishing.
///
/// The UI gets every change larger than `epsilon`; the media surface gets the
/// same but at most once per `os_interval`.
pub struct PositionSampler {
    epsilon: f64,
    os_interval: Duration,
    last_ui: Option<f64>,
    last_os: Option<(f64, Instant)>,
}

impl PositionSampler {
    pub fn new(epsilon: f64, os_interval: Duration) -> Self {
        Self {
            epsilon,
            os_interval,
            last_ui: None,
            last_os: None,
        }
    }

    pub fn sample(&mut self, position: f64, now: Instant) -> Sample {
        let ui = match self.last_ui {
            Some(last) if (position - last).abs() <= self.epsilon => None,
            _ => Some(position),
        };
        if ui.is_some() {
            self.last_ui = Some(position);
        }

        let os = match self.last_os {
            Some((_, at)) if now.saturating_duration_since(at) < self.os_interval => None,
            Some((last, _)) if (position - last).abs() <= self.epsilon => None,
            _ => Some(position),
        };
        if os.is_some() {
            self.last_os = Some((position, now));
        }

        Sample { ui, os }
    }

    /// Publish unconditionally; used on seek, pause and track change
    pub fn force(&mut self, position: f64, now: Instant) -> Sample {
        self.last_ui = Some(position);
        self.last_os = Some((position, now));
        Sample {
            ui: Some(position),
            os: Some(position),
        }
    }

    pub fn reset(&mut self) {
        self.last_ui = None;
        self.last_os = None;
    }
}

/// The engine's single sampling loop.
///
/// One ticker task lives for the whole engine; `start`/`stop` only gate it,
/// so no timers pile up across play/pause cycles.
pub struct PositionTracker {
    active: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PositionTracker {
    /// Spawn the ticker; `on_tick` returns false once nobody is listening
    pub fn spawn<F>(period: Duration, on_tick: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let (active, mut active_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                if !*active_rx.borrow_and_update() {
                    if active_rx.changed().await.is_err() {
                        break;
                    }
                    ticker.reset();
                    continue;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                    changed = active_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!("Position ticker stopped");
        });

        Self {
            active,
            task: Some(task),
        }
    }

    pub fn start(&self) {
        self.active.send_replace(true);
    }

    pub fn stop(&self) {
        self.active.send_replace(false);
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow() && self.task.is_some()
    }

    /// Tear down the loop; later `start` calls have no effect
    pub fn dispose(&mut self) {
        self.active.send_replace(false);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn epsilon_suppresses_small_changes() {
        let mut sampler = PositionSampler::new(0.05, Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(sampler.sample(1.0, start).ui, Some(1.0));
        assert_eq!(sampler.sample(1.02, start).ui, None);
        assert_eq!(sampler.sample(1.3, start).ui, Some(1.3));
    }

    #[test]
    fn os_publication_is_rate_limited() {
        let mut sampler = PositionSampler::new(0.05, Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(sampler.sample(0.0, start).os, Some(0.0));
        assert_eq!(sampler.sample(0.25, start + Duration::from_millis(250)).os, None);
        assert_eq!(sampler.sample(0.5, start + Duration::from_millis(500)).os, None);
        assert_eq!(sampler.sample(1.0, start + Duration::from_secs(1)).os, Some(1.0));
    }

    #[test]
    fn force_bypasses_limits() {
        let mut sampler = PositionSampler::new(0.05, Duration::from_secs(1));
        let start = Instant::now();
        sampler.sample(10.0, start);

        let forced = sampler.force(10.0, start + Duration::from_millis(10));
        assert_eq!(forced, Sample { ui: Some(10.0), os: Some(10.0) });
        assert_eq!(sampler.sample(10.01, start + Duration::from_millis(20)), Sample::default());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_only_while_active() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = PositionTracker::spawn(Duration::from_millis(250), move || tx.send(()).is_ok());

        let idle = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(idle.is_err());

        tracker.start();
        assert!(tracker.is_active());
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }

        tracker.stop();
        while rx.try_recv().is_ok() {}
        let stopped = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(stopped.is_err());

        tracker.dispose();
        tracker.start();
        assert!(!tracker.is_active());
    }
}
