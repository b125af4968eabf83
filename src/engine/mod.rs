//! Execution engine module
//!
//! The subtask run loop shared by collect, extract and convert.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SubtaskRunner` - runs one subtask with checkpointing and progress
//! - `Collector`, `Extractor`, `Convertor` - the three subtask kinds
//! - `Progress` / `RunSummary` - what a run reports
//!
//! A run records its row in the subtask run table before doing any work,
//! then processes items inside a transaction that is committed at every
//! checkpoint. A failure rolls back the in-flight batch only. Runs that share
//! a storage handle are serialised on its run lock.

mod subtasks;
mod types;

pub use subtasks::{Collector, Convertor, Extractor, Subtask};
pub use types::{subtask_description, subtask_name, Progress, RunStatus, RunSummary};

use crate::config::RunnerConfig;
use crate::context::Context;
use crate::error::Result;
use crate::state::{State, StateManager};
use crate::stream::AnyStream;
use crate::types::Phase;
use futures::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Runs subtasks against a context
#[derive(Debug, Clone, Default)]
pub struct SubtaskRunner {
    config: RunnerConfig,
    progress: Option<UnboundedSender<Progress>>,
}

impl SubtaskRunner {
    /// Create a runner with the given configuration
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Send progress events to a channel
    #[must_use]
    pub fn with_progress(mut self, sender: UnboundedSender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one phase of a stream
    pub async fn run(
        &self,
        stream: &dyn AnyStream,
        ctx: &Context,
        phase: Phase,
    ) -> Result<RunSummary> {
        if !stream.should_run_on(&ctx.scope) {
            let name = subtask_name(phase, stream.plugin(), stream.name());
            info!(subtask = %name, scope = %ctx.scope.id, "Stream does not apply to scope, skipping");
            return Ok(RunSummary::skipped(name));
        }

        let batch_size = self.config.fetch_batch_size.max(1);
        match phase {
            Phase::Collect => {
                self.run_subtask(&Collector::new(stream, batch_size), ctx)
                    .await
            }
            Phase::Extract => {
                self.run_subtask(&Extractor::new(stream, batch_size), ctx)
                    .await
            }
            Phase::Convert => {
                self.run_subtask(&Convertor::new(stream, batch_size), ctx)
                    .await
            }
        }
    }

    /// Run a subtask to completion
    pub async fn run_subtask<T: Subtask>(&self, subtask: &T, ctx: &Context) -> Result<RunSummary> {
        let name = subtask.name();
        // Held until the run returns; other runs on this storage wait here
        let _run = ctx.storage.lock_run().await;
        let start = Instant::now();
        let manager = StateManager::new(ctx.storage.clone())?;

        subtask.prepare(ctx)?;
        let run_id = manager.start_run(&name, ctx.connection.id)?;
        info!(
            subtask = %name,
            run_id,
            status = %RunStatus::Running,
            partition = %ctx.partition(),
            incremental = ctx.options.incremental,
            "Subtask running"
        );

        ctx.storage.begin()?;
        match self.execute(subtask, ctx, &manager, &name, run_id).await {
            Ok((processed, state)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let status = RunStatus::Completed;
                info!(subtask = %name, run_id, %status, processed, duration_ms, "Subtask completed");
                Ok(RunSummary {
                    subtask: name,
                    run_id: Some(run_id),
                    status,
                    processed,
                    state,
                    duration_ms,
                })
            }
            Err(e) => {
                error!(
                    subtask = %name,
                    run_id,
                    status = %RunStatus::Failed,
                    error = %e,
                    "Subtask failed"
                );
                if let Err(rollback) = ctx.storage.rollback() {
                    warn!(subtask = %name, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn execute<T: Subtask>(
        &self,
        subtask: &T,
        ctx: &Context,
        manager: &StateManager,
        name: &str,
        run_id: i64,
    ) -> Result<(u64, State)> {
        let mut state = if ctx.options.incremental {
            manager.resume_state(
                self.config.resume_from,
                name,
                ctx.connection.id,
                Some(run_id),
            )?
        } else {
            subtask.delete(ctx)?;
            State::new()
        };

        let total = subtask.total(ctx)?;
        let interval = self.config.checkpoint_interval.max(1) as u64;
        let mut processed = 0_u64;
        let mut reported = 0_u64;

        let mut items = subtask.fetch(state.clone(), ctx);
        while let Some(next) = items.next().await {
            let (item, next_state) = next?;
            processed += 1;
            subtask.process(item, ctx).await?;
            state = next_state;

            if processed % interval == 0 {
                manager.checkpoint(run_id, &state)?;
                ctx.storage.commit()?;
                ctx.storage.begin()?;
                debug!(subtask = name, run_id, processed, "Checkpoint");
                self.report(name, processed - reported, processed, total);
                reported = processed;
            }
        }
        drop(items);

        if processed != reported {
            self.report(name, processed - reported, processed, total);
        }

        manager.complete(run_id, &state)?;
        ctx.storage.commit()?;
        Ok((processed, state))
    }

    fn report(&self, subtask: &str, increment: u64, current: u64, total: Option<u64>) {
        if let Some(sender) = &self.progress {
            let progress = Progress {
                subtask: subtask.to_string(),
                increment,
                current,
                total,
            };
            if sender.send(progress).is_err() {
                debug!(subtask, "Progress receiver dropped");
            }
        }
    }
}
