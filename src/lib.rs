#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod catalog;
mod comparison;
mod core;
mod dispatch;
mod error;
mod field;
mod params;
mod pipeline;
pub mod render;
mod scheduler;
mod target;
mod task;
mod utils;

pub use tokio_util::sync::CancellationToken;

pub use crate::catalog::{Catalog, ProducerFn, ProducerTask};
pub use crate::comparison::{Comparison, ComparisonParams, Variants};
pub use crate::core::Hash32;
pub use crate::dispatch::Dispatcher;
pub use crate::error::*;
pub use crate::field::{Field2d, FieldError};
pub use crate::params::{Params, Value, resolve};
pub use crate::pipeline::{Config, Pipeline, PipelineBuilder};
pub use crate::render::{PlotParameters, RenderFn};
pub use crate::scheduler::{Diagnostics, Plan, PlanNode, Scheduler, TaskExecution};
pub use crate::target::{Artifact, Staging, Target};
pub use crate::task::{Dependencies, Input, Inputs, Task, TaskId, TaskKind};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
