//! The task construction surface.
//!
//! Cloud-object statistics are computed elsewhere. The pipeline only sees them
//! as producers: closures that turn a resolved parameter set into a
//! [`Field2d`]. The [`Catalog`] maps each [`TaskKind`] to its producer and
//! builds the task nodes that run them and cache their output.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{ConfigurationError, Error, UnsupportedTaskType};
use crate::field::Field2d;
use crate::params::Params;
use crate::target::{Staging, Target};
use crate::task::{Inputs, Task, TaskId, TaskKind};

/// Function computing a field from resolved parameters.
pub type ProducerFn = Arc<dyn Fn(&Params) -> anyhow::Result<Field2d> + Send + Sync>;

#[derive(Clone)]
struct Producer {
    required: Vec<&'static str>,
    func: ProducerFn,
}

/// Registry of producers, keyed by task kind.
#[derive(Clone)]
pub struct Catalog {
    store: Utf8PathBuf,
    producers: BTreeMap<TaskKind, Producer>,
}

impl Catalog {
    pub(crate) fn new(store: impl Into<Utf8PathBuf>) -> Self {
        Self {
            store: store.into(),
            producers: BTreeMap::new(),
        }
    }

    pub(crate) fn register<F>(&mut self, kind: TaskKind, required: &[&'static str], func: F)
    where
        F: Fn(&Params) -> anyhow::Result<Field2d> + Send + Sync + 'static,
    {
        self.producers.insert(
            kind,
            Producer {
                required: required.to_vec(),
                func: Arc::new(func),
            },
        );
    }

    pub(crate) fn with_store(mut self, store: impl Into<Utf8PathBuf>) -> Self {
        self.store = store.into();
        self
    }

    pub fn store(&self) -> &Utf8Path {
        &self.store
    }

    /// Kinds with a registered producer, in a stable order.
    pub fn kinds(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.producers.keys().copied()
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.producers.contains_key(&kind)
    }

    /// Builds a task node from a dotted type name.
    pub fn construct(&self, type_name: &str, params: Params) -> Result<Box<dyn Task>, Error> {
        let kind: TaskKind = type_name.parse()?;
        Ok(Box::new(self.build(kind, params)?))
    }

    /// Builds the producer task for `kind`, checking required parameters.
    pub fn build(&self, kind: TaskKind, params: Params) -> Result<ProducerTask, Error> {
        let producer = self
            .producers
            .get(&kind)
            .ok_or_else(|| UnsupportedTaskType(kind.name().to_string()))?;

        if let Some(key) = producer.required.iter().find(|key| !params.contains(key)) {
            return Err(ConfigurationError::Missing(key.to_string()).into());
        }

        let id = TaskId::new(kind, params);
        let target = Target::new(producer_location(&self.store, &id));

        Ok(ProducerTask {
            id,
            target,
            func: producer.func.clone(),
        })
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("store", &self.store)
            .field("kinds", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `<store>/<kind>/<fingerprint>.cbor`
fn producer_location(store: &Utf8Path, id: &TaskId) -> Utf8PathBuf {
    store
        .join(id.kind().name())
        .join(id.fingerprint().short())
        .with_extension("cbor")
}

/// A task node that runs a producer and caches the field it returns.
pub struct ProducerTask {
    id: TaskId,
    target: Target,
    func: ProducerFn,
}

impl Task for ProducerTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn output(&self) -> Target {
        self.target.clone()
    }

    fn run(&self, _: &Inputs, staging: &mut Staging) -> anyhow::Result<()> {
        let field = (self.func)(self.id.params())
            .with_context(|| format!("producer for {} failed", self.id.kind()))?;

        field.write_cbor(staging)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn constant(_: &Params) -> anyhow::Result<Field2d> {
        Ok(Field2d::new(("y", "x"), (vec![0.0], vec![0.0]), vec![1.0])?)
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new("store");
        catalog.register(TaskKind::ObjectTwoScalesComposition, &["alpha"], constant);
        catalog
    }

    #[test]
    fn test_construct_from_dotted_name() {
        let task = catalog()
            .construct("objects.ObjectTwoScalesComposition", params! { "alpha" => 1 })
            .unwrap();

        assert_eq!(task.id().kind(), TaskKind::ObjectTwoScalesComposition);
        let location = task.output().location().to_path_buf();
        assert!(location.starts_with("store/objects.ObjectTwoScalesComposition"));
        assert_eq!(location.extension(), Some("cbor"));
    }

    #[test]
    fn test_unknown_type_name() {
        let err = catalog()
            .construct("unregistered.Type", Params::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unsupported(UnsupportedTaskType(name)) if name == "unregistered.Type"));
    }

    #[test]
    fn test_known_kind_without_producer() {
        let err = catalog()
            .build(TaskKind::ObjectFilamentarityPlanarity, Params::new())
            .err()
            .unwrap();

        assert!(matches!(err, Error::Unsupported(UnsupportedTaskType(name)) if name == "objects.ObjectFilamentarityPlanarity"));
    }

    #[test]
    fn test_missing_required_parameter_named() {
        let err = catalog()
            .build(TaskKind::ObjectTwoScalesComposition, params! { "beta" => 1 })
            .err()
            .unwrap();

        assert!(matches!(err, Error::Configuration(ConfigurationError::Missing(key)) if key == "alpha"));
    }

    #[test]
    fn test_location_follows_identity() {
        let catalog = catalog();
        let a = catalog.build(TaskKind::ObjectTwoScalesComposition, params! { "alpha" => 1 }).unwrap();
        let b = catalog.build(TaskKind::ObjectTwoScalesComposition, params! { "alpha" => 1 }).unwrap();
        let c = catalog.build(TaskKind::ObjectTwoScalesComposition, params! { "alpha" => 2 }).unwrap();

        assert_eq!(a.output(), b.output());
        assert_ne!(a.output(), c.output());
    }
}
