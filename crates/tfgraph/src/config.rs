//! declarations parsed from terraform configuration files
//!
//! [Config] holds the per-kind declarations (providers, resources, outputs, locals and variables) that the graph is
//! built from. Each declaration carries its identity, its raw property tree (the unevaluated [hcl::Expression]s) and
//! any meta arguments (`depends_on`, `provider`, `count`, ...) that are not properties.
//!
//! Files are parsed with [hcl_edit] and follow the terraform 0.11 layout:
//! ```hcl
//! provider "aws" {
//!   region = "${var.region}"
//! }
//!
//! resource "aws_instance" "web" {
//!   ami        = "ami-12345"
//!   depends_on = ["aws_s3_bucket.logs"]
//! }
//! ```
use hcl::{Block, Body, Expression, ObjectKey, Structure};
use std::path::{Path, PathBuf};

/// Raw, unresolved properties of a declaration
pub type RawProperties = hcl::Object<ObjectKey, Expression>;

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub providers: Vec<ProviderConfig>,
    pub resources: Vec<ResourceConfig>,
    pub outputs: Vec<OutputConfig>,
    pub locals: Vec<LocalConfig>,
    pub variables: Vec<VariableConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Provider type, used to locate its plugin
    pub name: String,
    pub alias: Option<String>,
    pub version: Option<String>,
    pub properties: RawProperties,
}

impl ProviderConfig {
    /// `name` or `name.alias`
    pub fn full_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMode {
    /// `resource` blocks
    Managed,
    /// `data` blocks
    Data,
}

impl ResourceMode {
    pub fn resource_id(&self, kind: &str, name: &str) -> String {
        match self {
            ResourceMode::Managed => format!("{kind}.{name}"),
            ResourceMode::Data => format!("data.{kind}.{name}"),
        }
    }

    pub(crate) fn reference_form(&self) -> &'static str {
        match self {
            ResourceMode::Managed => "TYPE.NAME.ATTR",
            ResourceMode::Data => "data.TYPE.NAME.ATTR",
        }
    }
}

impl std::fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceMode::Managed => f.write_str("resource"),
            ResourceMode::Data => f.write_str("data source"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    pub mode: ResourceMode,
    pub kind: String,
    pub name: String,
    /// Explicit `provider` meta argument
    pub provider: Option<String>,
    pub count: Option<Expression>,
    pub depends_on: Vec<String>,
    pub properties: RawProperties,
}

impl ResourceConfig {
    pub fn id(&self) -> String {
        self.mode.resource_id(&self.kind, &self.name)
    }

    /// Full name of the owning provider
    ///
    /// Either the explicit `provider` or the resource type up to the first `_`.
    pub fn provider_full_name(&self) -> String {
        if let Some(provider) = &self.provider {
            return provider.clone();
        }

        match self.kind.split_once('_') {
            Some((prefix, _)) => prefix.to_string(),
            None => self.kind.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub name: String,
    pub sensitive: bool,
    pub depends_on: Vec<String>,
    pub properties: RawProperties,
}

#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct LocalConfig {
    pub name: String,
    pub value: Expression,
}

impl LocalConfig {
    /// A local's properties consist of its value only
    pub fn properties(&self) -> RawProperties {
        let mut properties = RawProperties::new();
        properties.insert(
            ObjectKey::Identifier(hcl::Identifier::unchecked("value")),
            self.value.clone(),
        );
        properties
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableConfig {
    pub name: String,
    pub default: Option<Expression>,
    pub description: Option<String>,
    pub type_hint: Option<String>,
}

impl Config {
    /// Adds all declarations of a parsed document
    pub fn insert(&mut self, document: hcl_edit::structure::Body) -> Result<(), ConfigError> {
        let body: Body = document.into();

        for structure in body.iter() {
            match structure {
                Structure::Attribute(attribute) => {
                    return Err(ConfigError::RootAttribute(attribute.key.to_string()))
                }
                Structure::Block(block) => self.insert_block(block)?,
            }
        }

        Ok(())
    }

    fn insert_block(&mut self, block: &Block) -> Result<(), ConfigError> {
        let ident = block.identifier.as_str();
        tracing::trace!(block = ident, labels = ?block.labels, "declaration");

        match ident {
            "provider" => {
                let [name] = labels::<1>(block)?;
                let entity = format!("provider `{name}`");
                self.providers.push(ProviderConfig {
                    alias: string_argument(&block.body, "alias", &entity)?,
                    version: string_argument(&block.body, "version", &entity)?,
                    properties: properties(&block.body, &["alias", "version"]),
                    name,
                });
            }
            "resource" | "data" => {
                let [kind, name] = labels::<2>(block)?;
                let mode = match ident {
                    "data" => ResourceMode::Data,
                    _ => ResourceMode::Managed,
                };
                let entity = format!("{mode} `{}`", mode.resource_id(&kind, &name));
                self.resources.push(ResourceConfig {
                    mode,
                    provider: string_argument(&block.body, "provider", &entity)?,
                    count: argument(&block.body, "count").cloned(),
                    depends_on: depends_on(&block.body, &entity)?,
                    properties: properties(
                        &block.body,
                        &[
                            "provider",
                            "count",
                            "depends_on",
                            "lifecycle",
                            "provisioner",
                            "connection",
                        ],
                    ),
                    kind,
                    name,
                });
            }
            "output" => {
                let [name] = labels::<1>(block)?;
                let entity = format!("output `{name}`");
                let sensitive = match argument(&block.body, "sensitive") {
                    None => false,
                    Some(Expression::Bool(sensitive)) => *sensitive,
                    Some(_) => {
                        return Err(ConfigError::InvalidArgument {
                            entity,
                            argument: "sensitive",
                            expected: "a boolean",
                        })
                    }
                };
                self.outputs.push(OutputConfig {
                    sensitive,
                    depends_on: depends_on(&block.body, &entity)?,
                    properties: properties(
                        &block.body,
                        &["description", "sensitive", "depends_on"],
                    ),
                    name,
                });
            }
            "locals" => {
                labels::<0>(block)?;
                for attribute in block.body.attributes() {
                    self.locals.push(LocalConfig::new(
                        attribute.key.to_string(),
                        attribute.expr.clone(),
                    ));
                }
            }
            "variable" => {
                let [name] = labels::<1>(block)?;
                let entity = format!("variable `{name}`");
                self.variables.push(VariableConfig {
                    default: argument(&block.body, "default").cloned(),
                    description: string_argument(&block.body, "description", &entity)?,
                    type_hint: string_argument(&block.body, "type", &entity)?,
                    name,
                });
            }
            "module" => {
                let name = block
                    .labels
                    .first()
                    .map(|label| label.as_str().to_string())
                    .unwrap_or_default();
                return Err(ConfigError::ModuleBlock(name));
            }
            "terraform" => {}
            _ => return Err(ConfigError::UnknownBlockType(ident.to_string())),
        }

        Ok(())
    }

    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        let body = hcl_edit::parser::parse_body(&file_contents)?;

        self.insert(body).map_err(|source| LoadError::Invalid {
            path: file_path,
            source,
        })
    }

    /// Loads all `*.tf` files of a directory (not recursive)
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_tf_file = dir_entry.file_name().to_string_lossy().ends_with(".tf");
            if is_tf_file {
                file_paths.push(dir_entry.path());
            }
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_owned()));
        }

        // read_dir order is platform dependent
        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

impl TryFrom<hcl_edit::structure::Body> for Config {
    type Error = ConfigError;

    fn try_from(value: hcl_edit::structure::Body) -> Result<Self, Self::Error> {
        let mut config = Config::default();
        config.insert(value)?;
        Ok(config)
    }
}

fn labels<const N: usize>(block: &Block) -> Result<[String; N], ConfigError> {
    let labels: Vec<String> = block
        .labels
        .iter()
        .map(|label| label.as_str().to_string())
        .collect();

    labels
        .try_into()
        .map_err(|labels: Vec<String>| ConfigError::LabelCount {
            block: block.identifier.to_string(),
            expected: N,
            found: labels.len(),
        })
}

fn argument<'b>(body: &'b Body, key: &str) -> Option<&'b Expression> {
    body.attributes()
        .find(|attribute| attribute.key.as_str() == key)
        .map(|attribute| &attribute.expr)
}

fn string_argument(
    body: &Body,
    key: &'static str,
    entity: &str,
) -> Result<Option<String>, ConfigError> {
    match argument(body, key) {
        None => Ok(None),
        Some(Expression::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ConfigError::InvalidArgument {
            entity: entity.to_string(),
            argument: key,
            expected: "a string",
        }),
    }
}

fn depends_on(body: &Body, entity: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidArgument {
        entity: entity.to_string(),
        argument: "depends_on",
        expected: "a list of strings",
    };

    match argument(body, "depends_on") {
        None => Ok(vec![]),
        Some(Expression::Array(elements)) => elements
            .iter()
            .map(|element| match element {
                Expression::String(name) => Ok(name.clone()),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

/// Turns a block body into its property object
///
/// Attributes become entries. Nested blocks are grouped by their type into a list of objects, block labels nest as
/// object keys: `ingress "a" { port = 1 }` becomes `ingress = [{ a = { port = 1 } }]`.
fn properties(body: &Body, meta_arguments: &[&str]) -> RawProperties {
    let mut properties = RawProperties::new();

    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => {
                if meta_arguments.contains(&attribute.key.as_str()) {
                    continue;
                }
                properties.insert(
                    ObjectKey::Identifier(attribute.key.clone()),
                    attribute.expr.clone(),
                );
            }
            Structure::Block(block) => {
                if meta_arguments.contains(&block.identifier.as_str()) {
                    continue;
                }

                let mut value = Expression::Object(self::properties(&block.body, &[]));
                for label in block.labels.iter().rev() {
                    let mut labeled = RawProperties::new();
                    labeled.insert(
                        ObjectKey::Expression(Expression::String(label.as_str().to_string())),
                        value,
                    );
                    value = Expression::Object(labeled);
                }

                let key = ObjectKey::Identifier(block.identifier.clone());
                match properties.get_mut(&key) {
                    Some(Expression::Array(elements)) => elements.push(value),
                    _ => {
                        properties.insert(key, Expression::Array(vec![value]));
                    }
                }
            }
        }
    }

    properties
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("root attributes are not allowed (`{0}`)")]
    RootAttribute(String),
    #[error("unknown block type `{0}`")]
    UnknownBlockType(String),
    #[error("`{block}` blocks need {expected} label(s), found {found}")]
    LabelCount {
        block: String,
        expected: usize,
        found: usize,
    },
    #[error("module `{0}`: modules are not supported")]
    ModuleBlock(String),
    #[error("{entity}: `{argument}` must be {expected}")]
    InvalidArgument {
        entity: String,
        argument: &'static str,
        expected: &'static str,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No .tf files found in directory {}", .0.display())]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
    #[error("Invalid configuration in {}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

/// Utility macro to create a [Config] from hcl source
///
/// ```
/// # use tfgraph::tf_config;
/// let config = tf_config!(r#"variable "region" { default = "eu-west-1" }"#);
/// assert_eq!(config.variables.len(), 1);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tfgraph::tf_config;
/// tf_config!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! tf_config {
    { $expr:expr } => {
        $crate::config::Config::try_from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
            .expect("configuration must be valid")
    };
}
