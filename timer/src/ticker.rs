use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::event::TimerEvent;
use crate::policy::Moment;

/// Emits [`TimerEvent::Tick`] with the current [`Moment`] every configured
/// tick interval. This is the only place the timer reads real time on its own.
///
/// The interval is re-read from the shared config on every tick so a reloaded
/// `tick_interval_ms` takes effect without a restart.
pub async fn run(config: Arc<RwLock<Config>>, tx: mpsc::Sender<TimerEvent>) {
    let mut period = config.read().await.general.effective_tick_interval();
    let mut ticker = interval(period);
    // A stop that waits out its grace period blocks the event loop; don't
    // replay the ticks that piled up behind it.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if tx.send(TimerEvent::Tick(Moment::now())).await.is_err() {
            break;
        }

        let configured = config.read().await.general.effective_tick_interval();
        if configured != period {
            tracing::debug!(?configured, "tick interval changed");
            period = configured;
            ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_ticks_until_receiver_closes() {
        let mut config = Config::default();
        config.general.tick_interval_ms = 100;
        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(run(Arc::new(RwLock::new(config)), tx));

        for _ in 0..2 {
            match rx.recv().await {
                Some(TimerEvent::Tick(_)) => {}
                _ => panic!("expected a tick"),
            }
        }

        drop(rx);
        handle.await.unwrap();
    }
}
