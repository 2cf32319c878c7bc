//! Selection of the rendering routine for a comparison.
//!
//! The table is closed: it is filled while the pipeline is being built and
//! never changes afterwards. Asking for a kind that was not registered is an
//! [`UnsupportedTaskType`] error rather than a fallback.

use std::collections::BTreeMap;

use crate::error::UnsupportedTaskType;
use crate::render::{self, RenderFn};
use crate::task::TaskKind;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: BTreeMap<TaskKind, RenderFn>,
}

impl Dispatcher {
    /// An empty table. Every lookup fails until something is registered.
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// The renderers shipped with the crate. Both distribution kinds are
    /// joint distributions over two variables and share the contour plot.
    pub fn builtin() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(TaskKind::ObjectTwoScalesComposition, render::scales_dist_2d);
        dispatcher.register(TaskKind::ObjectFilamentarityPlanarity, render::scales_dist_2d);
        dispatcher
    }

    pub(crate) fn register(&mut self, kind: TaskKind, func: RenderFn) {
        self.table.insert(kind, func);
    }

    pub fn supports(&self, kind: TaskKind) -> bool {
        self.table.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.table.keys().copied()
    }

    pub fn select(&self, kind: TaskKind) -> Result<RenderFn, UnsupportedTaskType> {
        self.table
            .get(&kind)
            .copied()
            .ok_or_else(|| UnsupportedTaskType(kind.name().to_string()))
    }

    /// Looks up a renderer by the dotted name of a task type.
    pub fn select_renderer(&self, type_name: &str) -> Result<RenderFn, UnsupportedTaskType> {
        let kind: TaskKind = type_name.parse()?;
        self.select(kind)
    }

    /// Fails on the first kind without a renderer.
    pub fn validate(&self, kinds: impl IntoIterator<Item = TaskKind>) -> Result<(), UnsupportedTaskType> {
        for kind in kinds {
            self.select(kind)?;
        }
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::builtin()
    }
}
