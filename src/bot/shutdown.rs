// src/bot/shutdown.rs - Orderly stop of the watcher's background tasks

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tokio::time::timeout;

use crate::bot::task::TaskHandle;

pub const DEFAULT_COMPONENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// Stop requested, components not yet stopped
    Draining,
    Terminating,
    Stopped,
}

/// What happened to each registered component
#[derive(Debug, Clone, Default)]
pub struct ShutdownStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stopped: Vec<String>,
    /// Stopped only after `force_shutdown`; also listed in `stopped`
    pub forced: Vec<String>,
    /// (component, reason)
    pub failed: Vec<(String, String)>,
}

#[async_trait]
pub trait ShutdownComponent: Send + Sync {
    fn name(&self) -> &str;

    async fn shutdown(&self) -> Result<()>;

    /// Called when `shutdown` failed or timed out
    async fn force_shutdown(&self) -> Result<()> {
        self.shutdown().await
    }
}

#[async_trait]
impl ShutdownComponent for TaskHandle {
    fn name(&self) -> &str {
        TaskHandle::name(self)
    }

    async fn shutdown(&self) -> Result<()> {
        self.stop().await
    }

    async fn force_shutdown(&self) -> Result<()> {
        self.abort().await;
        Ok(())
    }
}

/// Waits for Ctrl+C / SIGTERM (or an explicit trigger) and then stops the
/// registered components in registration order, each under its own timeout.
pub struct GracefulShutdown {
    component_timeout: Duration,
    phase_tx: watch::Sender<ShutdownPhase>,
    stats: RwLock<ShutdownStats>,
    components: RwLock<Vec<Box<dyn ShutdownComponent>>>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new(DEFAULT_COMPONENT_TIMEOUT)
    }
}

impl GracefulShutdown {
    pub fn new(component_timeout: Duration) -> Self {
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        Self {
            component_timeout,
            phase_tx,
            stats: RwLock::new(ShutdownStats::default()),
            components: RwLock::new(Vec::new()),
        }
    }

    pub async fn register_component(&self, component: Box<dyn ShutdownComponent>) {
        debug!("Will stop '{}' on shutdown", component.name());
        self.components.write().await.push(component);
    }

    /// Listen for Ctrl+C and, on unix, SIGTERM
    pub fn start_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl+C received, stopping chatwatch");
                    manager.trigger_shutdown();
                }
                Err(e) => error!("Cannot listen for Ctrl+C: {}", e),
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term) => {
                        term.recv().await;
                        info!("SIGTERM received, stopping chatwatch");
                        manager.trigger_shutdown();
                    }
                    Err(e) => error!("Cannot listen for SIGTERM: {}", e),
                }
            });
        }
    }

    /// Move from Running to Draining; later calls are no-ops
    pub fn trigger_shutdown(&self) {
        self.phase_tx.send_if_modified(|phase| {
            if *phase == ShutdownPhase::Running {
                *phase = ShutdownPhase::Draining;
                true
            } else {
                false
            }
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.phase_tx.borrow() != ShutdownPhase::Running
    }

    pub fn get_phase(&self) -> ShutdownPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    pub async fn get_stats(&self) -> ShutdownStats {
        self.stats.read().await.clone()
    }

    /// Block until a shutdown is requested, then stop every component
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        let mut phase = self.subscribe();
        phase
            .wait_for(|p| *p != ShutdownPhase::Running)
            .await
            .map_err(|e| anyhow::anyhow!("shutdown channel closed: {}", e))?;

        self.stop_components().await;
        Ok(())
    }

    async fn stop_components(&self) {
        let started = Utc::now();
        self.stats.write().await.started_at = Some(started);
        self.phase_tx.send_replace(ShutdownPhase::Terminating);

        let components = self.components.read().await;
        info!("Stopping {} component(s)", components.len());
        for component in components.iter() {
            self.stop_one(component.as_ref()).await;
        }

        let finished = Utc::now();
        self.stats.write().await.completed_at = Some(finished);
        self.phase_tx.send_replace(ShutdownPhase::Stopped);
        info!("Shutdown finished in {} ms", (finished - started).num_milliseconds());
    }

    async fn stop_one(&self, component: &dyn ShutdownComponent) {
        let name = component.name().to_string();
        let limit = self.component_timeout;

        let reason = match timeout(limit, component.shutdown()).await {
            Ok(Ok(())) => {
                debug!("'{}' stopped", name);
                self.stats.write().await.stopped.push(name);
                return;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("no response within {:?}", limit),
        };

        warn!("'{}' did not stop cleanly ({}), forcing", name, reason);
        let forced = match timeout(limit, component.force_shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(reason),
        };

        let mut stats = self.stats.write().await;
        match forced {
            Ok(()) => {
                stats.forced.push(name.clone());
                stats.stopped.push(name);
            }
            Err(reason) => {
                error!("'{}' could not be stopped: {}", name, reason);
                stats.failed.push((name, reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Stops,
        Fails,
        Hangs,
    }

    struct ScriptedComponent {
        label: &'static str,
        behaviour: Behaviour,
        attempts: Arc<AtomicUsize>,
    }

    fn component(label: &'static str, behaviour: Behaviour) -> (ScriptedComponent, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let component = ScriptedComponent {
            label,
            behaviour,
            attempts: Arc::clone(&attempts),
        };
        (component, attempts)
    }

    #[async_trait]
    impl ShutdownComponent for ScriptedComponent {
        fn name(&self) -> &str {
            self.label
        }

        async fn shutdown(&self) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Stops => Ok(()),
                Behaviour::Fails => anyhow::bail!("refused to stop"),
                Behaviour::Hangs => std::future::pending().await,
            }
        }

        async fn force_shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn run(manager: &GracefulShutdown) {
        manager.trigger_shutdown();
        manager.wait_for_shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_moves_to_draining_once() {
        let manager = GracefulShutdown::default();
        assert_eq!(manager.get_phase(), ShutdownPhase::Running);
        assert!(!manager.is_shutdown_requested());

        let mut phase = manager.subscribe();
        manager.trigger_shutdown();
        manager.trigger_shutdown();
        assert_eq!(manager.get_phase(), ShutdownPhase::Draining);
        assert!(phase.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_stops_components() {
        let manager = Arc::new(GracefulShutdown::default());
        let (scheduler, attempts) = component("scheduler", Behaviour::Stops);
        manager.register_component(Box::new(scheduler)).await;

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait_for_shutdown().await })
        };
        manager.trigger_shutdown();
        waiter.await.unwrap().unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_phase(), ShutdownPhase::Stopped);
        let stats = manager.get_stats().await;
        assert_eq!(stats.stopped, vec!["scheduler"]);
        assert!(stats.completed_at >= stats.started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_and_hanging_components_are_forced() {
        let manager = GracefulShutdown::default();
        let (failing, _) = component("feed_client", Behaviour::Fails);
        let (hanging, _) = component("promotion", Behaviour::Hangs);
        manager.register_component(Box::new(failing)).await;
        manager.register_component(Box::new(hanging)).await;

        run(&manager).await;

        let stats = manager.get_stats().await;
        assert_eq!(stats.forced, vec!["feed_client", "promotion"]);
        assert_eq!(stats.stopped, vec!["feed_client", "promotion"]);
        assert!(stats.failed.is_empty());
    }

    #[tokio::test]
    async fn test_task_handles_are_components() {
        let (stop_tx, mut stop_rx) = TaskHandle::channel();
        let join = tokio::spawn(async move {
            let _ = stop_rx.changed().await;
        });
        let manager = GracefulShutdown::default();
        manager
            .register_component(Box::new(TaskHandle::new("flush_scheduler", stop_tx, join)))
            .await;

        run(&manager).await;
        assert_eq!(manager.get_stats().await.stopped, vec!["flush_scheduler"]);
    }
}
