//! The comparison plot, the one task with dependencies of its own.
//!
//! A comparison takes a base task type, one shared parameter set and a list
//! of labeled variants. Every variant, layered over the shared parameters,
//! becomes a dependency of the base type. Once those are present their
//! fields are drawn together in a single figure, with one colormap and one
//! legend entry per label.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, Error, UnsupportedTaskType};
use crate::params::{Params, Value, resolve};
use crate::render::{Dataset, PlotParameters, RenderRequest};
use crate::target::{Staging, Target};
use crate::task::{Dependencies, Inputs, Task, TaskId, TaskKind};

/// Everything needed to describe a comparison, in the layout parameter files
/// use.
///
/// ```
/// let params = kumo::ComparisonParams::from_json(r#"{
///     "base_class": "objects.ObjectTwoScalesComposition",
///     "parameter_sets": { "v1": { "alpha": 1 }, "v2": { "alpha": 2 } },
///     "global_parameters": { "bins": 10 },
///     "name": "cmp1"
/// }"#).unwrap();
///
/// assert_eq!(params.parameter_sets.labels().collect::<Vec<_>>(), ["v1", "v2"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonParams {
    /// Dotted name of the task type every variant is an instance of.
    pub base_class: String,
    pub parameter_sets: Variants,
    #[serde(default)]
    pub global_parameters: Params,
    #[serde(default)]
    pub plot_parameters: PlotParameters,
    /// Names the output file, `<name>.png`.
    pub name: String,
}

impl ComparisonParams {
    pub fn new(base_class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base_class: base_class.into(),
            parameter_sets: Variants::default(),
            global_parameters: Params::new(),
            plot_parameters: PlotParameters::default(),
            name: name.into(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn global(mut self, params: Params) -> Self {
        self.global_parameters = params;
        self
    }

    pub fn plot(mut self, plot: PlotParameters) -> Self {
        self.plot_parameters = plot;
        self
    }

    /// Appends a variant.
    pub fn variant(
        mut self,
        label: impl Into<String>,
        params: Params,
    ) -> Result<Self, ConfigurationError> {
        self.parameter_sets.push(label, params)?;
        Ok(self)
    }
}

/// Labeled parameter sets, in the order they were written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variants(Vec<(String, Params)>);

impl Variants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        label: impl Into<String>,
        params: Params,
    ) -> Result<(), ConfigurationError> {
        let label = label.into();

        if self.get(&label).is_some() {
            return Err(ConfigurationError::DuplicateLabel(label));
        }

        self.0.push((label, params));
        Ok(())
    }

    /// Drops the variant under `label`, returning it.
    pub fn remove(&mut self, label: &str) -> Option<Params> {
        let index = self.0.iter().position(|(l, _)| l == label)?;
        Some(self.0.remove(index).1)
    }

    pub fn get(&self, label: &str) -> Option<&Params> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| p)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Params)> {
        self.0.iter().map(|(label, params)| (label.as_str(), params))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Variants {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, params) in &self.0 {
            map.serialize_entry(label, params)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Variants {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VariantsVisitor;

        impl<'de> Visitor<'de> for VariantsVisitor {
            type Value = Variants;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from labels to parameter sets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Variants, A::Error> {
                let mut variants = Variants::new();

                while let Some((label, params)) = map.next_entry::<String, Params>()? {
                    variants.push(label, params).map_err(de::Error::custom)?;
                }

                Ok(variants)
            }
        }

        deserializer.deserialize_map(VariantsVisitor)
    }
}

/// A comparison plot task.
pub struct Comparison {
    id: TaskId,
    base: TaskKind,
    name: String,
    variants: Variants,
    global: Params,
    plot: PlotParameters,
    target: Target,
    catalog: Arc<Catalog>,
    dispatcher: Arc<Dispatcher>,
}

impl Comparison {
    pub(crate) fn new(
        params: ComparisonParams,
        catalog: Arc<Catalog>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, Error> {
        let ComparisonParams {
            base_class,
            parameter_sets: variants,
            global_parameters: global,
            plot_parameters: plot,
            name,
        } = params;

        validate_name(&name)?;

        let base: TaskKind = base_class.parse()?;
        if base == TaskKind::ComparisonPlot || !catalog.contains(base) {
            return Err(UnsupportedTaskType(base_class).into());
        }
        dispatcher.select(base)?;

        if variants.is_empty() {
            return Err(
                ConfigurationError::invalid("parameter_sets", "at least one variant is required")
                    .into(),
            );
        }

        let id = TaskId::new(TaskKind::ComparisonPlot, identity(base, &name, &variants, &global, &plot)?);
        let target = Target::new(catalog.store().join(format!("{name}.png")));

        Ok(Self {
            id,
            base,
            name,
            variants,
            global,
            plot,
            target,
            catalog,
            dispatcher,
        })
    }

    pub fn base(&self) -> TaskKind {
        self.base
    }

    pub fn variants(&self) -> &Variants {
        &self.variants
    }

    pub fn global(&self) -> &Params {
        &self.global
    }

    pub fn plot(&self) -> &PlotParameters {
        &self.plot
    }

    /// Decodes every input and checks they all share one kind.
    fn datasets(&self, inputs: &Inputs) -> anyhow::Result<(TaskKind, Vec<Dataset>)> {
        let kind = inputs.iter().next().map_or(self.base, |input| input.kind);
        let mut datasets = Vec::with_capacity(inputs.len());

        for input in inputs {
            if input.kind != kind {
                return Err(ConfigurationError::invalid(
                    "parameter_sets",
                    format!(
                        "variant '{}' is a {} but '{}' is a {}",
                        input.label,
                        input.kind,
                        datasets.first().map_or("", |d: &Dataset| d.label.as_str()),
                        kind
                    ),
                )
                .into());
            }

            let field = input
                .artifact
                .field()
                .with_context(|| format!("couldn't read variant '{}'", input.label))?;

            datasets.push(Dataset {
                label: input.label.to_string(),
                field,
            });
        }

        Ok((kind, datasets))
    }
}

/// Output names must stay inside the store.
fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() {
        return Err(ConfigurationError::invalid("name", "must not be empty"));
    }

    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigurationError::invalid(
            "name",
            format!("'{name}' is not a plain file name"),
        ));
    }

    Ok(())
}

/// Every input of the comparison, variants in their declared order.
fn identity(
    base: TaskKind,
    name: &str,
    variants: &Variants,
    global: &Params,
    plot: &PlotParameters,
) -> Result<Params, ConfigurationError> {
    let variants = variants
        .iter()
        .map(|(label, params)| Value::List(vec![label.into(), params.clone().into()]))
        .collect::<Vec<_>>();

    Ok(Params::new()
        .with("base_class", base.name())
        .with("name", name)
        .with("global_parameters", global.clone())
        .with("parameter_sets", Value::List(variants))
        .with("plot_parameters", serde_json::to_string(plot)?))
}

impl Task for Comparison {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn name(&self) -> String {
        format!("{}({})", TaskKind::ComparisonPlot, self.name)
    }

    fn dependencies(&self) -> Result<Dependencies, Error> {
        let mut deps = Dependencies::new();

        for (label, variant) in self.variants.iter() {
            let params = resolve(&self.global, variant);
            let task = self.catalog.build(self.base, params)?;
            deps.insert(label, Box::new(task))?;
        }

        Ok(deps)
    }

    fn output(&self) -> Target {
        self.target.clone()
    }

    fn run(&self, inputs: &Inputs, staging: &mut Staging) -> anyhow::Result<()> {
        let (kind, datasets) = self.datasets(inputs)?;
        let render = self.dispatcher.select(kind)?;

        let figure = render(&RenderRequest {
            datasets: &datasets,
            plot: &self.plot,
            global: &self.global,
        })
        .with_context(|| format!("couldn't render {}", self.name))?;

        figure.write_png(&mut *staging)?;

        tracing::debug!(
            "Rendered {} ({}x{}, {} datasets)",
            self.target,
            figure.width(),
            figure.height(),
            datasets.len()
        );

        Ok(())
    }
}

impl fmt::Debug for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparison")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("variants", &self.variants)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field2d;
    use crate::params;

    fn catalog() -> Arc<Catalog> {
        let mut catalog = Catalog::new("store");
        catalog.register(TaskKind::ObjectTwoScalesComposition, &[], |_| {
            Ok(Field2d::new(("y", "x"), (vec![0.0], vec![0.0]), vec![1.0])?)
        });
        Arc::new(catalog)
    }

    fn comparison(params: ComparisonParams) -> Result<Comparison, Error> {
        Comparison::new(params, catalog(), Arc::new(Dispatcher::builtin()))
    }

    fn cmp1() -> ComparisonParams {
        ComparisonParams::new("objects.ObjectTwoScalesComposition", "cmp1")
            .global(params! { "bins" => 10 })
            .variant("v1", params! { "alpha" => 1 })
            .unwrap()
            .variant("v2", params! { "alpha" => 2 })
            .unwrap()
    }

    #[test]
    fn test_variants_keep_file_order() {
        let params = ComparisonParams::from_json(
            r#"{
                "base_class": "objects.ObjectTwoScalesComposition",
                "parameter_sets": { "zeta": {}, "alpha": {}, "mid": {} },
                "name": "ordered"
            }"#,
        )
        .unwrap();

        assert_eq!(
            params.parameter_sets.labels().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
        assert!(params.global_parameters.is_empty());
    }

    #[test]
    fn test_duplicate_variant_rejected() {
        let err = ComparisonParams::from_json(
            r#"{
                "base_class": "objects.ObjectTwoScalesComposition",
                "parameter_sets": { "v1": {}, "v1": {} },
                "name": "dup"
            }"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("'v1'"));
    }

    #[test]
    fn test_dependencies_resolve_variants() {
        let cmp = comparison(cmp1()).unwrap();
        let deps = cmp.dependencies().unwrap();

        assert_eq!(deps.labels().collect::<Vec<_>>(), vec!["v1", "v2"]);

        let v2 = deps.get("v2").unwrap();
        assert_eq!(v2.id().kind(), TaskKind::ObjectTwoScalesComposition);
        assert_eq!(v2.id().params(), &params! { "alpha" => 2, "bins" => 10 });
    }

    #[test]
    fn test_output_named_after_comparison() {
        let cmp = comparison(cmp1()).unwrap();
        assert_eq!(cmp.output().location().as_str(), "store/cmp1.png");
        assert_eq!(cmp.name(), "viz.ComparisonPlot(cmp1)");
    }

    #[test]
    fn test_identity_covers_variant_order() {
        let reordered = ComparisonParams::new("objects.ObjectTwoScalesComposition", "cmp1")
            .global(params! { "bins" => 10 })
            .variant("v2", params! { "alpha" => 2 })
            .unwrap()
            .variant("v1", params! { "alpha" => 1 })
            .unwrap();

        let one = comparison(cmp1()).unwrap();
        let two = comparison(reordered).unwrap();

        assert_ne!(one.id().fingerprint(), two.id().fingerprint());
        assert_eq!(one.output(), two.output());
    }

    #[test]
    fn test_rejects_bad_names() {
        for name in ["", "..", "a/b", "c\\d"] {
            let mut params = cmp1();
            params.name = name.to_string();

            let err = comparison(params).unwrap_err();
            assert!(
                matches!(&err, Error::Configuration(ConfigurationError::Invalid { key, .. }) if key == "name"),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_unknown_base() {
        let mut params = cmp1();
        params.base_class = "objects.Nonexistent".into();

        let err = comparison(params).unwrap_err();
        assert!(matches!(err, Error::Unsupported(UnsupportedTaskType(name)) if name == "objects.Nonexistent"));
    }

    #[test]
    fn test_rejects_base_without_producer() {
        let mut params = cmp1();
        params.base_class = "objects.ObjectFilamentarityPlanarity".into();

        let err = comparison(params).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_rejects_no_variants() {
        let params = ComparisonParams::new("objects.ObjectTwoScalesComposition", "empty");

        let err = comparison(params).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::Invalid { key, .. }) if key == "parameter_sets"
        ));
    }
}
