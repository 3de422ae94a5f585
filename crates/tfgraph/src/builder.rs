//! Graph construction
//!
//! Building happens in two phases:
//!
//! 1. [Builder::new] registers every declaration in a per-kind name table. This fixes each entity's [EntityId] and
//!    makes forward references possible: a resource may reference a local that is declared further down.
//! 2. [Builder::build] resolves each entity: its properties are walked, the collected names are resolved against the
//!    name tables and `depends_on` is merged in. Builders only ever consult the name tables, never other built
//!    entities.
//!
//! The first error aborts the build. There are no partial graphs.
use crate::config::{
    Config, LocalConfig, OutputConfig, ProviderConfig, RawProperties, ResourceConfig,
    VariableConfig,
};
use crate::graph::{
    EntityId, EntityKind, EntityLabel, Graph, Local, Output, Provider, Resource, Variable,
};
use crate::plugin::{PluginError, ProviderInfo, ProviderInfoLoader};
use crate::reference::{Reference, ReferenceError};
use crate::value::Value;
use crate::walker::{self, WalkError};
use indexmap::{IndexMap, IndexSet};

/// Key under which outputs (and locals) store their value
pub const VALUE_KEY: &str = "value";

/// Builds the dependency graph of a configuration
pub fn build_graph(config: &Config, loader: &dyn ProviderInfoLoader) -> Result<Graph, BuildError> {
    Builder::new(config)?.build(loader)
}

/// Name tables of all declared entities
///
/// The position of a declaration within its table is the index of its [EntityId].
pub struct Builder<'c> {
    providers: IndexMap<String, &'c ProviderConfig>,
    resources: IndexMap<String, &'c ResourceConfig>,
    outputs: IndexMap<String, &'c OutputConfig>,
    locals: IndexMap<String, &'c LocalConfig>,
    variables: IndexMap<String, &'c VariableConfig>,
}

impl<'c> Builder<'c> {
    pub fn new(config: &'c Config) -> Result<Self, BuildError> {
        Ok(Self {
            providers: table(EntityKind::Provider, &config.providers, |p| p.full_name())?,
            resources: table(EntityKind::Resource, &config.resources, |r| r.id())?,
            outputs: table(EntityKind::Output, &config.outputs, |o| o.name.clone())?,
            locals: table(EntityKind::Local, &config.locals, |l| l.name.clone())?,
            variables: table(EntityKind::Variable, &config.variables, |v| v.name.clone())?,
        })
    }

    pub fn build(&self, loader: &dyn ProviderInfoLoader) -> Result<Graph, BuildError> {
        let infos = self.load_provider_infos(loader)?;

        let mut graph = Graph::default();
        for ((name, config), info) in self.providers.iter().zip(infos) {
            graph.providers.push(self.build_provider(name, config, info)?);
        }
        for (id, config) in &self.resources {
            graph.resources.push(self.build_resource(id, config)?);
        }
        // outputs are sinks, nothing can reference them
        for (name, config) in &self.outputs {
            graph.outputs.push(self.build_output(name, config)?);
        }
        for (name, config) in &self.locals {
            graph.locals.push(self.build_local(name, config)?);
        }
        // variables are sources, they may not reference anything
        for config in self.variables.values() {
            graph.variables.push(self.build_variable(config)?);
        }

        tracing::info!(
            providers = graph.providers.len(),
            resources = graph.resources.len(),
            outputs = graph.outputs.len(),
            locals = graph.locals.len(),
            variables = graph.variables.len(),
            "graph built"
        );

        Ok(graph)
    }

    /// Runs the loader for every provider in parallel
    ///
    /// Results are returned in provider table order. The first failing provider (in that order) wins.
    fn load_provider_infos(
        &self,
        loader: &dyn ProviderInfoLoader,
    ) -> Result<Vec<ProviderInfo>, BuildError> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .providers
                .iter()
                .map(|(full_name, config)| {
                    let handle = scope.spawn(move || loader.load(&config.name));
                    (full_name, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(full_name, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                    result.map_err(|source| BuildError::Plugin {
                        provider: full_name.clone(),
                        source,
                    })
                })
                .collect()
        })
    }

    #[tracing::instrument(level = "debug", skip(self, config, info))]
    fn build_provider(
        &self,
        name: &str,
        config: &ProviderConfig,
        info: ProviderInfo,
    ) -> Result<Provider, BuildError> {
        let entity = EntityLabel::new(EntityKind::Provider, name.to_string());
        let (properties, dependencies) = self.build_properties(&entity, &config.properties)?;

        Ok(Provider {
            config: config.clone(),
            name: name.to_string(),
            properties,
            dependencies: dependencies.into_iter().collect(),
            info,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, config))]
    fn build_resource(&self, id: &str, config: &ResourceConfig) -> Result<Resource, BuildError> {
        let entity = EntityLabel::new(EntityKind::Resource, id.to_string());

        let provider_name = config.provider_full_name();
        let Some(provider) = self.providers.get_index_of(&provider_name) else {
            return Err(BuildError::MissingProvider {
                entity,
                provider: provider_name,
            });
        };

        let (properties, mut names) = walker::walk_properties(&config.properties)
            .map_err(|source| BuildError::property(&entity, source))?;
        let (count, count_names) = match &config.count {
            Some(count) => {
                let (count, count_names) = walker::walk_value(Some(count))
                    .map_err(|source| BuildError::property(&entity, source))?;
                (Some(count), count_names)
            }
            None => (None, IndexSet::new()),
        };
        names.extend(count_names);

        let mut dependencies = self.resolve_names(&entity, &names)?;
        let explicit_dependencies =
            self.merge_explicit(&entity, &mut dependencies, &config.depends_on)?;

        Ok(Resource {
            config: config.clone(),
            id: id.to_string(),
            provider,
            count,
            properties,
            dependencies: dependencies.into_iter().collect(),
            explicit_dependencies,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, config))]
    fn build_output(&self, name: &str, config: &OutputConfig) -> Result<Output, BuildError> {
        let entity = EntityLabel::new(EntityKind::Output, name.to_string());
        let (properties, mut dependencies) = self.build_properties(&entity, &config.properties)?;
        let explicit_dependencies =
            self.merge_explicit(&entity, &mut dependencies, &config.depends_on)?;

        Ok(Output {
            config: config.clone(),
            value: promote_value(properties),
            dependencies: dependencies.into_iter().collect(),
            explicit_dependencies,
        })
    }

    #[tracing::instrument(level = "debug", skip(self, config))]
    fn build_local(&self, name: &str, config: &LocalConfig) -> Result<Local, BuildError> {
        let entity = EntityLabel::new(EntityKind::Local, name.to_string());
        let (properties, dependencies) = self.build_properties(&entity, &config.properties())?;

        Ok(Local {
            name: name.to_string(),
            properties,
            dependencies: dependencies.into_iter().collect(),
        })
    }

    /// Variables are sources: a default that mentions any name at all is rejected, including informational ones like
    /// `path.module` that would never become an edge.
    #[tracing::instrument(level = "debug", skip_all, fields(name = %config.name))]
    fn build_variable(&self, config: &VariableConfig) -> Result<Variable, BuildError> {
        let entity = EntityLabel::new(EntityKind::Variable, config.name.clone());
        let (default, names) = walker::walk_value(config.default.as_ref())
            .map_err(|source| BuildError::property(&entity, source))?;

        if !names.is_empty() {
            return Err(BuildError::VariableHasDependencies {
                variable: config.name.clone(),
                names: names.into_iter().collect(),
            });
        }

        Ok(Variable {
            config: config.clone(),
            default,
        })
    }

    fn build_properties(
        &self,
        entity: &EntityLabel,
        properties: &RawProperties,
    ) -> Result<(IndexMap<String, Value>, IndexSet<EntityId>), BuildError> {
        let (properties, names) = walker::walk_properties(properties)
            .map_err(|source| BuildError::property(entity, source))?;
        let dependencies = self.resolve_names(entity, &names)?;
        Ok((properties, dependencies))
    }

    /// Resolves symbolic names to the entities they reference
    pub fn resolve_names(
        &self,
        entity: &EntityLabel,
        names: &IndexSet<String>,
    ) -> Result<IndexSet<EntityId>, BuildError> {
        let mut dependencies = IndexSet::new();

        for name in names {
            let reference =
                Reference::parse(name).map_err(|source| BuildError::InvalidReference {
                    entity: entity.clone(),
                    name: name.clone(),
                    source,
                })?;

            let dependency = match reference {
                Reference::Count { .. }
                | Reference::Path { .. }
                | Reference::SelfAttribute { .. }
                | Reference::Simple { .. }
                | Reference::Terraform { .. } => continue,
                Reference::Module { .. } => {
                    return Err(BuildError::UnsupportedReference {
                        entity: entity.clone(),
                        name: name.clone(),
                    })
                }
                Reference::Local { name: local } => match self.locals.get_index_of(&local) {
                    Some(index) => EntityId::Local(index),
                    None => {
                        return Err(BuildError::UnknownLocal {
                            entity: entity.clone(),
                            name: local,
                        })
                    }
                },
                ref resource @ Reference::Resource { .. } => {
                    let id = resource.resource_id().unwrap_or_default();
                    match self.resources.get_index_of(&id) {
                        Some(index) => EntityId::Resource(index),
                        None => {
                            return Err(BuildError::UnknownResource {
                                entity: entity.clone(),
                                name: id,
                            })
                        }
                    }
                }
                Reference::UserVariable { name: variable } => {
                    match self.variables.get_index_of(&variable) {
                        Some(index) => EntityId::Variable(index),
                        None => {
                            return Err(BuildError::UnknownVariable {
                                entity: entity.clone(),
                                name: variable,
                            })
                        }
                    }
                }
            };

            tracing::trace!(%entity, %name, ?dependency, "reference resolved");
            dependencies.insert(dependency);
        }

        Ok(dependencies)
    }

    /// Adds `depends_on` entries to the dependencies
    ///
    /// Returns the explicit dependencies in declaration order. They may also have been found by reference.
    pub fn merge_explicit(
        &self,
        entity: &EntityLabel,
        dependencies: &mut IndexSet<EntityId>,
        depends_on: &[String],
    ) -> Result<Vec<EntityId>, BuildError> {
        let mut explicit = Vec::with_capacity(depends_on.len());

        for name in depends_on {
            if name.starts_with("module.") {
                return Err(BuildError::UnsupportedReference {
                    entity: entity.clone(),
                    name: name.clone(),
                });
            }

            let Some(index) = self.resources.get_index_of(name) else {
                return Err(BuildError::UnknownResource {
                    entity: entity.clone(),
                    name: name.clone(),
                });
            };

            let dependency = EntityId::Resource(index);
            dependencies.insert(dependency);
            explicit.push(dependency);
        }

        Ok(explicit)
    }
}

fn table<'c, T>(
    kind: EntityKind,
    declarations: &'c [T],
    name_of: impl Fn(&T) -> String,
) -> Result<IndexMap<String, &'c T>, BuildError> {
    let mut table = IndexMap::with_capacity(declarations.len());
    for declaration in declarations {
        let name = name_of(declaration);
        if table.contains_key(&name) {
            return Err(BuildError::DuplicateEntity { kind, name });
        }
        table.insert(name, declaration);
    }
    Ok(table)
}

/// `{ value = X }` becomes `X`, any other shape stays an object
fn promote_value(properties: IndexMap<String, Value>) -> Value {
    if properties.len() != 1 {
        return Value::Object(properties);
    }

    match properties.into_iter().next() {
        Some((key, value)) if key == VALUE_KEY => value,
        Some((key, value)) => Value::Object(IndexMap::from([(key, value)])),
        None => Value::Object(IndexMap::new()),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("{kind} `{name}` is declared more than once")]
    DuplicateEntity { kind: EntityKind, name: String },
    #[error("{entity}: invalid property value")]
    Property {
        entity: EntityLabel,
        #[source]
        source: WalkError,
    },
    #[error("{entity}: invalid reference `{name}`")]
    InvalidReference {
        entity: EntityLabel,
        name: String,
        #[source]
        source: ReferenceError,
    },
    #[error("{entity}: module references are not supported (`{name}`)")]
    UnsupportedReference { entity: EntityLabel, name: String },
    #[error("{entity}: unknown local `{name}`")]
    UnknownLocal { entity: EntityLabel, name: String },
    #[error("{entity}: unknown resource `{name}`")]
    UnknownResource { entity: EntityLabel, name: String },
    #[error("{entity}: unknown variable `{name}`")]
    UnknownVariable { entity: EntityLabel, name: String },
    #[error("{entity}: provider `{provider}` is not declared")]
    MissingProvider {
        entity: EntityLabel,
        provider: String,
    },
    #[error("variable `{variable}`: default values may not reference anything ({})", .names.join(", "))]
    VariableHasDependencies { variable: String, names: Vec<String> },
    #[error("provider `{provider}`: unable to load provider info")]
    Plugin {
        provider: String,
        #[source]
        source: PluginError,
    },
}

impl BuildError {
    fn property(entity: &EntityLabel, source: WalkError) -> Self {
        BuildError::Property {
            entity: entity.clone(),
            source,
        }
    }
}
