use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::comparison::{Comparison, ComparisonParams};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, Error, UnsupportedTaskType};
use crate::field::Field2d;
use crate::params::Params;
use crate::render::RenderFn;
use crate::scheduler::{Diagnostics, Plan, Scheduler};
use crate::target::Target;
use crate::task::{Task, TaskKind};
use crate::utils::as_overhead;

/// Settings shared by every task of a pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory every artifact is written under.
    pub store: Utf8PathBuf,
    /// Worker threads used for sibling dependencies. `1` runs everything on
    /// the calling thread.
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: Utf8PathBuf::from("out"),
            jobs: 1,
        }
    }
}

/// Collects producers and renderers before the pipeline is sealed.
///
/// ```
/// use kumo::{Field2d, Pipeline, TaskKind};
///
/// let pipeline = Pipeline::builder()
///     .store("out")
///     .producer(TaskKind::ObjectTwoScalesComposition, &["bins"], |params| {
///         let bins = params.get_i64("bins")? as usize;
///         let coords: Vec<f64> = (0..bins).map(|i| i as f64).collect();
///         Ok(Field2d::from_fn(("y", "x"), (coords.clone(), coords), |i, j| (i * j) as f64)?)
///     })
///     .finish()
///     .unwrap();
///
/// assert!(pipeline.catalog().contains(TaskKind::ObjectTwoScalesComposition));
/// ```
#[derive(Debug)]
pub struct PipelineBuilder {
    config: Config,
    catalog: Catalog,
    dispatcher: Dispatcher,
}

impl PipelineBuilder {
    fn new() -> Self {
        let config = Config::default();

        Self {
            catalog: Catalog::new(config.store.clone()),
            dispatcher: Dispatcher::builtin(),
            config,
        }
    }

    pub fn store(mut self, store: impl Into<Utf8PathBuf>) -> Self {
        self.config.store = store.into();
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers the function computing fields of `kind`. Parameters named in
    /// `required` are checked whenever a task of that kind is built.
    pub fn producer<F>(mut self, kind: TaskKind, required: &[&'static str], func: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<Field2d> + Send + Sync + 'static,
    {
        self.catalog.register(kind, required, func);
        self
    }

    /// Registers or replaces the renderer used for comparisons of `kind`.
    pub fn renderer(mut self, kind: TaskKind, func: RenderFn) -> Self {
        self.dispatcher.register(kind, func);
        self
    }

    /// Seals the registries. Fails if a producer kind cannot be rendered.
    pub fn finish(self) -> Result<Pipeline, Error> {
        let Self {
            config,
            catalog,
            dispatcher,
        } = self;

        if config.jobs == 0 {
            return Err(ConfigurationError::invalid("jobs", "at least one worker is required").into());
        }

        if catalog.contains(TaskKind::ComparisonPlot) {
            return Err(ConfigurationError::invalid(
                "producer",
                format!("{} cannot have a producer", TaskKind::ComparisonPlot),
            )
            .into());
        }

        dispatcher.validate(catalog.kinds())?;

        let catalog = catalog.with_store(config.store.clone());
        let scheduler = Scheduler::new(config.jobs)?;

        tracing::debug!(
            "Pipeline ready: store {}, {} jobs, producers {:?}",
            config.store,
            config.jobs,
            catalog.kinds().collect::<Vec<_>>()
        );

        Ok(Pipeline {
            config,
            catalog: Arc::new(catalog),
            dispatcher: Arc::new(dispatcher),
            scheduler,
        })
    }
}

/// A sealed set of producers and renderers, with the scheduler that runs
/// them against one artifact store.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    catalog: Arc<Catalog>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Scheduler,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Utf8Path {
        &self.config.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn select_renderer(&self, type_name: &str) -> Result<RenderFn, UnsupportedTaskType> {
        self.dispatcher.select_renderer(type_name)
    }

    /// Builds a comparison task, validating its parameters.
    pub fn comparison(&self, params: ComparisonParams) -> Result<Comparison, Error> {
        Comparison::new(params, self.catalog.clone(), self.dispatcher.clone())
    }

    pub fn comparison_from_json(&self, json: &str) -> Result<Comparison, Error> {
        self.comparison(ComparisonParams::from_json(json)?)
    }

    pub fn plan(&self, root: &dyn Task) -> Result<Plan, Error> {
        self.scheduler.plan(root)
    }

    /// Ensures the target of `root` is present, running whatever is missing.
    /// See [`Scheduler::materialize`].
    pub fn materialize(&self, root: &dyn Task, cancel: &CancellationToken) -> Result<Target, Error> {
        let s = Instant::now();
        let result = self.scheduler.materialize(root, cancel);

        match &result {
            Ok(target) => eprintln!("Finished {} {}", target, as_overhead(s)),
            Err(e) => tracing::error!("{} failed: {}", root.name(), e),
        }

        result
    }

    /// Builds and materializes a comparison in one go.
    pub fn compare(&self, params: ComparisonParams) -> Result<Target, Error> {
        let comparison = self.comparison(params)?;
        self.materialize(&comparison, &CancellationToken::new())
    }

    /// Returns what the scheduler did since the last call.
    pub fn take_diagnostics(&self) -> Diagnostics {
        self.scheduler.take_diagnostics()
    }
}
