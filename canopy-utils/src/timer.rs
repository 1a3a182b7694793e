//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// One-shot timer backing a confirmed-commit rollback deadline.
///
/// The expiry callback runs exactly once, when the deadline passes. An
/// extending confirmed commit pushes the deadline out with
/// [`RollbackTimer::extend`]; a confirming commit disarms the timer by
/// dropping the handle.
#[derive(Debug)]
pub struct RollbackTimer {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

#[derive(Debug)]
struct Shared {
    deadline: Mutex<Instant>,
    changed: Notify,
}

// ===== impl RollbackTimer =====

impl RollbackTimer {
    /// Arms the timer. `on_expiry` runs once the deadline passes without
    /// an intervening extension covering it.
    pub fn arm<F, Fut>(timeout: Duration, on_expiry: F) -> RollbackTimer
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        debug!(?timeout, "rollback timer armed");
        let shared = Arc::new(Shared {
            deadline: Mutex::new(Instant::now() + timeout),
            changed: Notify::new(),
        });

        let worker_shared = shared.clone();
        let mut on_expiry = Some(on_expiry);
        let worker = tokio::spawn(async move {
            loop {
                let deadline = *worker_shared.deadline.lock().unwrap();
                tokio::select! {
                    _ = sleep_until(deadline) => {
                        // The deadline may have moved while sleeping.
                        let current =
                            *worker_shared.deadline.lock().unwrap();
                        if current <= Instant::now() {
                            if let Some(on_expiry) = on_expiry.take() {
                                (on_expiry)().await;
                            }
                            break;
                        }
                    }
                    _ = worker_shared.changed.notified() => {}
                }
            }
        });

        RollbackTimer { shared, worker }
    }

    /// Postpones the deadline; the superseded one no longer fires.
    pub fn extend(&self, timeout: Duration) {
        debug!(?timeout, "rollback timer extended");
        *self.shared.deadline.lock().unwrap() = Instant::now() + timeout;
        self.shared.changed.notify_one();
    }

    /// Time left until the rollback fires.
    pub fn remaining(&self) -> Duration {
        self.shared
            .deadline
            .lock()
            .unwrap()
            .saturating_duration_since(Instant::now())
    }
}

impl Drop for RollbackTimer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
