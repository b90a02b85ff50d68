// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: start, runtime config updates, graceful shutdown.
//!
//! `start()` spawns one loop per flush family plus a config watcher. The
//! loops only hold a weak reference to the engine, so dropping every
//! handle without calling `shutdown()` still lets them exit.

use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncEngineConfig;
use crate::error::SyncError;
use crate::model::Family;
use crate::uploader::Uploader;

use super::{EngineInner, EngineState, SyncEngine};

impl<U: Uploader> SyncEngine<U> {
    /// Spawn the per-family flush loops. Idempotent while running.
    ///
    /// Work enqueued before `start()` is flushed once its quiet period has
    /// passed.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SyncError> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == EngineState::Created {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return match self.state() {
                EngineState::Running => Ok(()),
                _ => Err(SyncError::ShutDown),
            };
        }
        crate::metrics::set_engine_state(&EngineState::Running.to_string());

        let mut tasks: Vec<JoinHandle<()>> = Family::ALL
            .into_iter()
            .map(|family| self.spawn_family_loop(family))
            .collect();
        if let Some(rx) = self.inner.config_rx.lock().take() {
            tasks.push(self.spawn_config_watcher(rx));
        }
        self.inner.tasks.lock().extend(tasks);

        info!("Sync engine running");
        Ok(())
    }

    fn spawn_family_loop(&self, family: Family) -> JoinHandle<()> {
        let engine = Arc::downgrade(&self.inner);
        let slot = Arc::clone(self.slot(family));
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = slot.debouncer.fired() => {
                        let Some(engine) = upgrade(&engine) else { break };
                        engine.on_tick(family);
                    }
                }
            }
            debug!(%family, "Family loop stopped");
        })
    }

    fn spawn_config_watcher(&self, mut config_rx: watch::Receiver<SyncEngineConfig>) -> JoinHandle<()> {
        let engine = Arc::downgrade(&self.inner);
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    changed = config_rx.changed() => {
                        if changed.is_err() {
                            debug!("Config sender dropped, watcher exiting");
                            break;
                        }
                        let config = config_rx.borrow_and_update().clone();
                        let Some(engine) = upgrade(&engine) else { break };
                        if let Err(e) = engine.update_config(config) {
                            warn!(error = %e, "Ignoring invalid config update");
                        }
                    }
                }
            }
        })
    }

    /// Replace the configuration at runtime.
    ///
    /// New intervals apply from the next time a family is armed; a deadline
    /// that is already set is left alone. Invalid configs are rejected and
    /// the current one stays in place.
    pub fn update_config(&self, config: SyncEngineConfig) -> Result<(), SyncError> {
        config.validate()?;
        info!(
            data_flush_ms = config.data_flush_ms,
            fast_status_flush_ms = config.fast_status_flush_ms,
            cdr_flush_ms = config.cdr_flush_ms,
            features = ?config.features,
            "Config updated"
        );
        *self.inner.config.write() = config;
        Ok(())
    }

    /// Stop the loops, wait for in-flight rounds and run a final round per
    /// family when `flush_on_shutdown` is set. Enqueues are refused from
    /// here on.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let claimed = {
            // Waits out enqueues that already passed their state check
            let _intake = self.inner.intake.write();
            self.inner.state.send_if_modified(|state| {
                if matches!(state, EngineState::Created | EngineState::Running) {
                    *state = EngineState::ShuttingDown;
                    true
                } else {
                    false
                }
            })
        };
        if !claimed {
            debug!("Shutdown already in progress or done");
            return;
        }
        crate::metrics::set_engine_state(&EngineState::ShuttingDown.to_string());
        info!("Initiating sync engine shutdown...");
        let shutdown_start = tokio::time::Instant::now();

        self.inner.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let final_flush = self.inner.config.read().flush_on_shutdown;
        for family in Family::ALL {
            let slot = self.slot(family);
            slot.debouncer.disarm();
            if slot.guard.is_busy() {
                debug!(%family, "Waiting for the in-flight round");
            }
            let Some(permit) = slot.guard.enter().await else { continue };
            if final_flush {
                self.run_round(family, permit).await;
            }
        }

        self.set_state(EngineState::Stopped);
        info!(
            elapsed_ms = shutdown_start.elapsed().as_millis() as u64,
            "Sync engine shutdown complete"
        );
    }
}

fn upgrade<U: Uploader>(engine: &Weak<EngineInner<U>>) -> Option<SyncEngine<U>> {
    engine.upgrade().map(|inner| SyncEngine { inner })
}
