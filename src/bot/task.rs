// src/bot/task.rs - Stop handle for long-running background loops

use anyhow::{Context, Result};
use log::debug;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Owns a spawned loop. The loop watches the paired receiver and exits as soon
/// as a stop is requested, abandoning whatever it was waiting on.
pub struct TaskHandle {
    name: String,
    stop_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, stop_tx: watch::Sender<bool>, join: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            stop_tx,
            join: Mutex::new(Some(join)),
        }
    }

    /// Create the stop channel a task should select on
    pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_stop(&self) {
        // No receiver left means the task already ended
        let _ = self.stop_tx.send(true);
    }

    /// Request a stop and wait for the task to finish. Calling it twice is fine.
    pub async fn stop(&self) -> Result<()> {
        self.request_stop();
        let join = self.join.lock().await.take();
        if let Some(join) = join {
            join.await.with_context(|| format!("Task {} did not finish cleanly", self.name))?;
            debug!("Task {} stopped", self.name);
        }
        Ok(())
    }

    pub async fn abort(&self) {
        if let Some(join) = self.join.lock().await.take() {
            join.abort();
            debug!("Task {} aborted", self.name);
        }
    }

    pub async fn is_finished(&self) -> bool {
        self.join.lock().await.as_ref().map_or(true, |j| j.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleeping_task() {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();
        let join = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
                _ = stop_rx.changed() => {}
            }
        });
        let handle = TaskHandle::new("sleeper", stop_tx, join);

        assert!(!handle.is_finished().await);
        handle.stop().await.unwrap();
        assert!(handle.is_finished().await);
        handle.stop().await.unwrap();
        assert_eq!(handle.name(), "sleeper");
    }
}
