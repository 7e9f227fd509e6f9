use log::{debug, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use super::Shared;
use crate::{operation, Motor, MovementSensor};

/// Handle to the background task that feeds sensor readings through the controllers.
#[derive(Debug)]
pub(super) struct ControlLoop {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ControlLoop {
    /// Spawn the loop. The first tick runs one `period` from now.
    pub(super) fn spawn<M, S>(shared: Arc<Shared<M, S>>, period: Duration) -> Self
    where
        M: Motor + 'static,
        S: MovementSensor + 'static,
    {
        let (cancel, cancelled) = watch::channel(false);
        let handle = tokio::spawn(run(shared, period, cancelled));
        debug!("control loop started with a period of {:?}", period);

        Self { cancel, handle }
    }

    /// Ask the loop to exit without waiting for it.
    pub(super) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Ask the loop to exit and wait until it has.
    pub(super) async fn shutdown(self) {
        self.cancel();
        if let Err(error) = self.handle.await {
            warn!("control loop exited abnormally: {}", error);
        }
    }
}

async fn run<M, S>(shared: Arc<Shared<M, S>>, period: Duration, mut cancelled: watch::Receiver<bool>)
where
    M: Motor,
    S: MovementSensor,
{
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = operation::cancelled(&mut cancelled) => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            _ = operation::cancelled(&mut cancelled) => break,
            result = shared.tick(period) => {
                if let Err(error) = result {
                    warn!("control loop: {}", error);
                }
            }
        }
    }

    debug!("control loop stopped");
}
