//! dependency graph of a configuration
//!
//! The [Graph] owns every entity, stored per kind in declaration order. Edges are [EntityId]s: indices into those
//! per-kind collections. Entities never point at each other directly.
//!
//! The graph is not sorted. Evaluation order is derived by topologically sorting [Entity::dependencies].
use crate::config::{
    OutputConfig, ProviderConfig, ResourceConfig, ResourceMode, VariableConfig,
};
use crate::plugin::ProviderInfo;
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Provider,
    Resource,
    Output,
    Local,
    Variable,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Provider => f.write_str("provider"),
            EntityKind::Resource => f.write_str("resource"),
            EntityKind::Output => f.write_str("output"),
            EntityKind::Local => f.write_str("local"),
            EntityKind::Variable => f.write_str("variable"),
        }
    }
}

/// Index of an entity within its kind's collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Provider(usize),
    Resource(usize),
    Output(usize),
    Local(usize),
    Variable(usize),
}

impl EntityId {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityId::Provider(_) => EntityKind::Provider,
            EntityId::Resource(_) => EntityKind::Resource,
            EntityId::Output(_) => EntityKind::Output,
            EntityId::Local(_) => EntityKind::Local,
            EntityId::Variable(_) => EntityKind::Variable,
        }
    }
}

/// Kind and identifier of an entity, used in diagnostics
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct EntityLabel {
    pub kind: EntityKind,
    pub name: String,
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} `{}`", self.kind, self.name)
    }
}

/// Common capabilities of all graph nodes
pub trait Entity: std::fmt::Debug {
    fn kind(&self) -> EntityKind;

    /// Identifier, unique within the entity's kind
    fn name(&self) -> &str;

    /// Entities this entity depends on directly
    fn dependencies(&self) -> &[EntityId];

    fn label(&self) -> EntityLabel {
        EntityLabel::new(self.kind(), self.name().to_string())
    }
}

#[derive(Debug)]
pub struct Provider {
    pub(crate) config: ProviderConfig,
    pub(crate) name: String,
    pub(crate) properties: IndexMap<String, Value>,
    pub(crate) dependencies: Vec<EntityId>,
    pub(crate) info: ProviderInfo,
}

impl Provider {
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    /// Metadata reported by the provider plugin
    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }
}

#[derive(Debug)]
pub struct Resource {
    pub(crate) config: ResourceConfig,
    pub(crate) id: String,
    pub(crate) provider: usize,
    pub(crate) count: Option<Value>,
    pub(crate) properties: IndexMap<String, Value>,
    pub(crate) dependencies: Vec<EntityId>,
    pub(crate) explicit_dependencies: Vec<EntityId>,
}

impl Resource {
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn mode(&self) -> ResourceMode {
        self.config.mode
    }

    /// The owning provider
    pub fn provider(&self) -> EntityId {
        EntityId::Provider(self.provider)
    }

    pub fn count(&self) -> Option<&Value> {
        self.count.as_ref()
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    /// Dependencies named in `depends_on`, in declaration order
    pub fn explicit_dependencies(&self) -> &[EntityId] {
        &self.explicit_dependencies
    }
}

#[derive(Debug)]
pub struct Output {
    pub(crate) config: OutputConfig,
    pub(crate) value: Value,
    pub(crate) dependencies: Vec<EntityId>,
    pub(crate) explicit_dependencies: Vec<EntityId>,
}

impl Output {
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn sensitive(&self) -> bool {
        self.config.sensitive
    }

    pub fn explicit_dependencies(&self) -> &[EntityId] {
        &self.explicit_dependencies
    }
}

#[derive(Debug)]
pub struct Local {
    pub(crate) name: String,
    pub(crate) properties: IndexMap<String, Value>,
    pub(crate) dependencies: Vec<EntityId>,
}

impl Local {
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn value(&self) -> Option<&Value> {
        self.properties.get(crate::builder::VALUE_KEY)
    }
}

#[derive(Debug)]
pub struct Variable {
    pub(crate) config: VariableConfig,
    pub(crate) default: Value,
}

impl Variable {
    pub fn config(&self) -> &VariableConfig {
        &self.config
    }

    /// [Value::Null] when no default is declared
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

impl Entity for Provider {
    fn kind(&self) -> EntityKind {
        EntityKind::Provider
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[EntityId] {
        &self.dependencies
    }
}

impl Entity for Resource {
    fn kind(&self) -> EntityKind {
        EntityKind::Resource
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[EntityId] {
        &self.dependencies
    }
}

impl Entity for Output {
    fn kind(&self) -> EntityKind {
        EntityKind::Output
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn dependencies(&self) -> &[EntityId] {
        &self.dependencies
    }
}

impl Entity for Local {
    fn kind(&self) -> EntityKind {
        EntityKind::Local
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[EntityId] {
        &self.dependencies
    }
}

impl Entity for Variable {
    fn kind(&self) -> EntityKind {
        EntityKind::Variable
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    /// Variables are sources
    fn dependencies(&self) -> &[EntityId] {
        &[]
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) providers: Vec<Provider>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) locals: Vec<Local>,
    pub(crate) variables: Vec<Variable>,
}

impl Graph {
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Looks up a provider by its full name (`name` or `name.alias`)
    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name() == id)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name() == name)
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().find(|l| l.name() == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn provider_of(&self, resource: &Resource) -> &Provider {
        &self.providers[resource.provider]
    }

    /// # Panic
    /// Panics if the id does not belong to this graph
    pub fn entity(&self, id: EntityId) -> &dyn Entity {
        match id {
            EntityId::Provider(index) => &self.providers[index],
            EntityId::Resource(index) => &self.resources[index],
            EntityId::Output(index) => &self.outputs[index],
            EntityId::Local(index) => &self.locals[index],
            EntityId::Variable(index) => &self.variables[index],
        }
    }

    /// All entities, grouped by kind
    pub fn entities(&self) -> impl Iterator<Item = &dyn Entity> {
        let providers = self.providers.iter().map(|e| e as &dyn Entity);
        let resources = self.resources.iter().map(|e| e as &dyn Entity);
        let outputs = self.outputs.iter().map(|e| e as &dyn Entity);
        let locals = self.locals.iter().map(|e| e as &dyn Entity);
        let variables = self.variables.iter().map(|e| e as &dyn Entity);

        providers
            .chain(resources)
            .chain(outputs)
            .chain(locals)
            .chain(variables)
    }

    /// Address an entity is referenced by, e.g. `var.region` or `aws_instance.web`
    pub fn address(&self, id: EntityId) -> String {
        let name = self.entity(id).name();
        match id.kind() {
            EntityKind::Provider => format!("provider.{name}"),
            EntityKind::Resource => name.to_string(),
            EntityKind::Output => format!("output.{name}"),
            EntityKind::Local => format!("local.{name}"),
            EntityKind::Variable => format!("var.{name}"),
        }
    }

    fn addresses(&self, ids: &[EntityId]) -> Vec<String> {
        ids.iter().map(|id| self.address(*id)).collect()
    }
}

#[derive(Serialize)]
struct ProviderView<'g> {
    plugin: &'g str,
    dependencies: Vec<String>,
    properties: &'g IndexMap<String, Value>,
}

#[derive(Serialize)]
struct ResourceView<'g> {
    provider: &'g str,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<&'g Value>,
    dependencies: Vec<String>,
    explicit_dependencies: Vec<String>,
    properties: &'g IndexMap<String, Value>,
}

#[derive(Serialize)]
struct OutputView<'g> {
    sensitive: bool,
    dependencies: Vec<String>,
    explicit_dependencies: Vec<String>,
    value: &'g Value,
}

#[derive(Serialize)]
struct LocalView<'g> {
    dependencies: Vec<String>,
    value: Option<&'g Value>,
}

#[derive(Serialize)]
struct VariableView<'g> {
    default: &'g Value,
}

impl Serialize for Graph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let providers: IndexMap<&str, ProviderView> = self
            .providers
            .iter()
            .map(|p| {
                let view = ProviderView {
                    plugin: &p.info.name,
                    dependencies: self.addresses(&p.dependencies),
                    properties: &p.properties,
                };
                (p.name(), view)
            })
            .collect();

        let resources: IndexMap<&str, ResourceView> = self
            .resources
            .iter()
            .map(|r| {
                let view = ResourceView {
                    provider: self.provider_of(r).name(),
                    count: r.count(),
                    dependencies: self.addresses(&r.dependencies),
                    explicit_dependencies: self.addresses(&r.explicit_dependencies),
                    properties: &r.properties,
                };
                (r.name(), view)
            })
            .collect();

        let outputs: IndexMap<&str, OutputView> = self
            .outputs
            .iter()
            .map(|o| {
                let view = OutputView {
                    sensitive: o.sensitive(),
                    dependencies: self.addresses(&o.dependencies),
                    explicit_dependencies: self.addresses(&o.explicit_dependencies),
                    value: &o.value,
                };
                (o.name(), view)
            })
            .collect();

        let locals: IndexMap<&str, LocalView> = self
            .locals
            .iter()
            .map(|l| {
                let view = LocalView {
                    dependencies: self.addresses(&l.dependencies),
                    value: l.value(),
                };
                (l.name(), view)
            })
            .collect();

        let variables: IndexMap<&str, VariableView> = self
            .variables
            .iter()
            .map(|v| (v.name(), VariableView { default: &v.default }))
            .collect();

        let mut ser = serializer.serialize_map(Some(5))?;
        ser.serialize_entry("providers", &providers)?;
        ser.serialize_entry("resources", &resources)?;
        ser.serialize_entry("outputs", &outputs)?;
        ser.serialize_entry("locals", &locals)?;
        ser.serialize_entry("variables", &variables)?;
        ser.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plugin::OfflineLoader;
    use crate::tf_config;
    use pretty_assertions::assert_eq;

    fn graph() -> Graph {
        let config = tf_config! {r#"
        variable "region" {}

        locals {
          prefix = "${var.region}-"
        }

        output "bucket" {
          value = "${aws_s3_bucket.logs.id}"
        }

        resource "aws_s3_bucket" "logs" {
          bucket = "${local.prefix}logs"
        }

        provider "aws" {
          region = "${var.region}"
        }
        "#};
        crate::build_graph(&config, &OfflineLoader).unwrap()
    }

    #[test]
    fn entities_are_grouped_by_kind() {
        let graph = graph();
        let labels: Vec<String> = graph.entities().map(|e| e.label().to_string()).collect();
        assert_eq!(
            labels,
            vec![
                "provider `aws`",
                "resource `aws_s3_bucket.logs`",
                "output `bucket`",
                "local `prefix`",
                "variable `region`",
            ]
        );
    }

    #[test]
    fn addresses() {
        let graph = graph();
        let addresses: Vec<String> = [
            EntityId::Provider(0),
            EntityId::Resource(0),
            EntityId::Output(0),
            EntityId::Local(0),
            EntityId::Variable(0),
        ]
        .into_iter()
        .map(|id| graph.address(id))
        .collect();
        assert_eq!(
            addresses,
            vec![
                "provider.aws",
                "aws_s3_bucket.logs",
                "output.bucket",
                "local.prefix",
                "var.region",
            ]
        );
    }

    #[test]
    fn entity_lookup_by_id() {
        let graph = graph();
        let logs = graph.resource("aws_s3_bucket.logs").unwrap();
        assert_eq!(graph.entity(logs.provider()).label(), graph.providers()[0].label());

        let dependency = graph.entity(logs.dependencies()[0]);
        assert_eq!(dependency.kind(), EntityKind::Local);
        assert_eq!(dependency.name(), "prefix");
    }
}
