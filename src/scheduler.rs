//! Materialization of task graphs.
//!
//! The scheduler walks a task's dependencies depth first, in declaration
//! order, and runs every task whose target is absent. A present target is
//! never looked behind: its task does not run and its dependencies are not
//! even resolved.

mod diagnostics;
mod plan;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use camino::Utf8PathBuf;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{ArcStr, Hash32};
use crate::error::Error;
use crate::target::Target;
use crate::task::{Input, Inputs, Task};
use crate::utils::{STYLE_PROGRESS, STYLE_TASK, as_overhead};

pub use diagnostics::{Diagnostics, TaskExecution};
pub use plan::{Plan, PlanNode};

/// Runs tasks so that their targets become present.
///
/// With more than one job, the dependencies of a task are materialized side
/// by side on a dedicated thread pool. Every target still has at most one
/// writer at a time.
pub struct Scheduler {
    pool: Option<rayon::ThreadPool>,
    /// One lock per target location, held while that target is written.
    locks: Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>,
    diagnostics: Mutex<Diagnostics>,
}

/// State shared by a single `materialize` call.
struct Run<'a> {
    cancel: &'a CancellationToken,
    progress: Span,
}

impl Scheduler {
    pub fn new(jobs: usize) -> Result<Self, Error> {
        let pool = match jobs {
            0 | 1 => None,
            jobs => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .thread_name(|i| format!("kumo-worker-{i}"))
                    .build()?,
            ),
        };

        Ok(Self {
            pool,
            locks: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(Diagnostics::default()),
        })
    }

    pub fn jobs(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads())
    }

    /// The dependency graph below `root` as it stands on disk.
    pub fn plan(&self, root: &dyn Task) -> Result<Plan, Error> {
        Plan::build(root)
    }

    /// Ensures the target of `root` is present and returns it.
    ///
    /// When the target already exists this returns immediately, without
    /// resolving dependencies. Otherwise every absent dependency is
    /// materialized first, then `root` runs with the opened dependency
    /// artifacts. On failure nothing is left at the target location.
    pub fn materialize(&self, root: &dyn Task, cancel: &CancellationToken) -> Result<Target, Error> {
        let s = Instant::now();
        let target = root.output();

        if target.exists() {
            tracing::debug!("{} is present, nothing to do", target);
            self.record_hit(&target);
            return Ok(target);
        }

        let plan = self.plan(root)?;
        let pending = plan.pending().count() as u64;

        let progress = tracing::span!(Level::INFO, "materialize", root = %root.name());
        progress.pb_set_style(&STYLE_PROGRESS);
        progress.pb_set_length(pending);
        progress.pb_set_message("Materializing tasks...");
        let _enter = progress.enter();

        let run = Run {
            cancel,
            progress: progress.clone(),
        };

        let target = self.ensure(root, &run, &[])?;
        tracing::info!("Materialized {} {}", target, as_overhead(s));

        Ok(target)
    }

    /// Returns what was done so far and starts counting afresh.
    pub fn take_diagnostics(&self) -> Diagnostics {
        let mut diagnostics = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *diagnostics)
    }

    fn ensure(&self, task: &dyn Task, run: &Run<'_>, path: &[Hash32]) -> Result<Target, Error> {
        let name = task.name();

        if run.cancel.is_cancelled() {
            return Err(Error::Cancelled(name));
        }

        let fingerprint = task.id().fingerprint();
        if path.contains(&fingerprint) {
            return Err(Error::Cycle(name));
        }

        let target = task.output();
        if target.exists() {
            self.record_hit(&target);
            return Ok(target);
        }

        let mut path = path.to_vec();
        path.push(fingerprint);

        let deps = task.dependencies()?;
        let entries = deps.entries();

        let wrap = |label: &ArcStr, e: Error| match e {
            Error::Cancelled(_) | Error::Cycle(_) => e,
            e => Error::DependencyFailed {
                label: label.to_string(),
                task: name.clone(),
                source: Box::new(e),
            },
        };

        let targets: Vec<Target> = match &self.pool {
            Some(pool) if entries.len() > 1 => {
                let results: Vec<_> = pool.install(|| {
                    entries
                        .par_iter()
                        .map(|(_, dep)| self.ensure(dep.as_ref(), run, &path))
                        .collect()
                });

                // the first failure in declaration order wins
                let mut targets = Vec::with_capacity(results.len());
                for ((label, _), result) in entries.iter().zip(results) {
                    targets.push(result.map_err(|e| wrap(label, e))?);
                }
                targets
            }
            _ => {
                let mut targets = Vec::with_capacity(entries.len());
                for (label, dep) in entries {
                    targets.push(
                        self.ensure(dep.as_ref(), run, &path)
                            .map_err(|e| wrap(label, e))?,
                    );
                }
                targets
            }
        };

        let mut inputs = Vec::with_capacity(targets.len());
        for ((label, dep), target) in entries.iter().zip(&targets) {
            inputs.push(Input {
                label: label.clone(),
                kind: dep.id().kind(),
                artifact: target.open().map_err(|e| wrap(label, e))?,
            });
        }

        self.execute(task, &name, target, &Inputs(inputs), run)
    }

    /// Runs a single task whose dependencies are all present.
    fn execute(
        &self,
        task: &dyn Task,
        name: &str,
        target: Target,
        inputs: &Inputs,
        run: &Run<'_>,
    ) -> Result<Target, Error> {
        let lock = self.lock_for(&target);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // someone else may have written it while we waited
        if target.exists() {
            self.record_hit(&target);
            return Ok(target);
        }

        if run.cancel.is_cancelled() {
            return Err(Error::Cancelled(name.to_string()));
        }

        let span = tracing::span!(Level::INFO, "task", name = %name, kind = %task.id().kind());
        span.pb_set_style(&STYLE_TASK);
        span.pb_set_message(&format!("Running {name}"));
        let _enter = span.enter();

        let mut staging = target.stage()?;
        let start = Instant::now();

        let result = match catch_unwind(AssertUnwindSafe(|| task.run(inputs, &mut staging))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("Task panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("Task panicked: {s}")
                } else {
                    String::from("Task panicked with unknown payload")
                };

                Err(anyhow::anyhow!(msg))
            }
        };

        let duration = start.elapsed();

        if let Err(source) = result {
            tracing::error!("{} failed: {:#}", name, source);
            return Err(Error::Task {
                task: name.to_string(),
                source,
            });
        }

        if staging.written() == 0 {
            return Err(Error::Task {
                task: name.to_string(),
                source: anyhow::anyhow!("task wrote no artifact to {}", target),
            });
        }

        if run.cancel.is_cancelled() {
            return Err(Error::Cancelled(name.to_string()));
        }

        let target = staging.commit()?;
        tracing::debug!("Wrote {} {}", target, as_overhead(start));

        self.record_execution(TaskExecution {
            task: name.to_string(),
            location: target.location().to_path_buf(),
            start,
            duration,
        });
        run.progress.pb_inc(1);

        Ok(target)
    }

    fn lock_for(&self, target: &Target) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(target.location().to_path_buf())
            .or_default()
            .clone()
    }

    fn record_hit(&self, target: &Target) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cached
            .push(target.location().to_path_buf());
    }

    fn record_execution(&self, execution: TaskExecution) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .executions
            .push(execution);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs())
            .finish_non_exhaustive()
    }
}
