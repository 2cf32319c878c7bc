//! All the generic task-related abstractions.
//!
//! A [`Task`] is a unit of work identified by a [`TaskKind`] and a resolved
//! parameter set. It declares the upstream tasks it needs as a labeled
//! [`Dependencies`] map, owns exactly one [`Target`], and writes that target
//! when run. Tasks never run themselves; the [`Scheduler`] decides when.
//!
//! [`Scheduler`]: crate::Scheduler

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{ArcStr, Hash32};
use crate::error::{ConfigurationError, Error, UnsupportedTaskType};
use crate::params::Params;
use crate::target::{Artifact, Staging, Target};

/// The closed set of task types the pipeline knows how to build.
///
/// Every kind has a dotted name, which is what parameter files use to refer
/// to it (the `base_class` of a comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    /// Joint distribution of cloud objects over two length scales.
    ObjectTwoScalesComposition,
    /// Joint distribution of cloud objects in filamentarity/planarity space.
    ObjectFilamentarityPlanarity,
    /// A rendered comparison of several variants of one of the above.
    ComparisonPlot,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ObjectTwoScalesComposition,
        TaskKind::ObjectFilamentarityPlanarity,
        TaskKind::ComparisonPlot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::ObjectTwoScalesComposition => "objects.ObjectTwoScalesComposition",
            TaskKind::ObjectFilamentarityPlanarity => "objects.ObjectFilamentarityPlanarity",
            TaskKind::ComparisonPlot => "viz.ComparisonPlot",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = UnsupportedTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnsupportedTaskType(s.to_string()))
    }
}

/// What makes two task nodes the same unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskId {
    kind: TaskKind,
    params: Params,
}

impl TaskId {
    pub fn new(kind: TaskKind, params: Params) -> Self {
        Self { kind, params }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// BLAKE3 of the kind name and the canonical parameter encoding.
    pub fn fingerprint(&self) -> Hash32 {
        let mut buffer = String::from(self.kind.name());
        buffer.push('\0');
        buffer.push_str(&self.params.to_canonical_json());
        Hash32::hash(buffer)
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.describe() {
            Some(params) => write!(f, "{}({params})", self.kind),
            None => write!(f, "{}()", self.kind),
        }
    }
}

/// Labeled upstream tasks, kept in insertion order.
///
/// The order is what a comparison uses to assign colors and legend entries;
/// correctness never depends on it.
#[derive(Default)]
pub struct Dependencies {
    entries: Vec<(ArcStr, Box<dyn Task>)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependency under `label`. Each label may appear once.
    pub fn insert(
        &mut self,
        label: impl Into<ArcStr>,
        task: Box<dyn Task>,
    ) -> Result<(), ConfigurationError> {
        let label = label.into();

        if self.entries.iter().any(|(existing, _)| *existing == label) {
            return Err(ConfigurationError::DuplicateLabel(label.to_string()));
        }

        self.entries.push((label, task));
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&dyn Task> {
        self.entries
            .iter()
            .find(|(existing, _)| &**existing == label)
            .map(|(_, task)| task.as_ref())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| &**label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Task)> {
        self.entries
            .iter()
            .map(|(label, task)| (&**label, task.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[(ArcStr, Box<dyn Task>)] {
        &self.entries
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(label, task)| (label, task.id())))
            .finish()
    }
}

/// A materialized dependency, tagged with the label it was declared under.
#[derive(Debug, Clone)]
pub struct Input {
    pub label: ArcStr,
    pub kind: TaskKind,
    pub artifact: Artifact,
}

/// Every input of a task, in the order its dependencies were declared.
#[derive(Debug, Clone, Default)]
pub struct Inputs(pub(crate) Vec<Input>);

impl Inputs {
    pub fn get(&self, label: &str) -> Option<&Input> {
        self.0.iter().find(|input| &*input.label == label)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Input> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Inputs {
    type Item = &'a Input;
    type IntoIter = std::slice::Iter<'a, Input>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A node in the task graph.
///
/// `dependencies` and `output` must be pure: the scheduler calls them freely,
/// including for planning, without expecting any work to happen.
pub trait Task: Send + Sync {
    fn id(&self) -> &TaskId;

    /// Human readable name used in logs and diagnostics.
    fn name(&self) -> String {
        self.id().to_string()
    }

    fn dependencies(&self) -> Result<Dependencies, Error> {
        Ok(Dependencies::new())
    }

    fn output(&self) -> Target;

    /// Performs the work, writing exactly one artifact into `staging`.
    ///
    /// Only called once every dependency's target is present. Whatever is
    /// written is discarded unless this returns `Ok`.
    fn run(&self, inputs: &Inputs, staging: &mut Staging) -> anyhow::Result<()>;
}
