//! # tfgraph - dependency graphs of terraform configurations
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfgraph` works internally.
//!
//! ### Loading files
//!
//! Each `.tf` file is parsed as a `body` ([hcl_edit::structure::Body]) and its blocks are sorted into the per-kind
//! declarations of a [config::Config]:
//!
//! | block                 | declaration                  |
//! |-----------------------|------------------------------|
//! | `provider "aws"`      | [config::ProviderConfig]     |
//! | `resource "t" "n"`    | [config::ResourceConfig]     |
//! | `data "t" "n"`        | [config::ResourceConfig]     |
//! | `output "o"`          | [config::OutputConfig]       |
//! | `locals`              | one [config::LocalConfig] per attribute |
//! | `variable "v"`        | [config::VariableConfig]     |
//!
//! Meta arguments (`depends_on`, `count`, `provider`, ...) are split off, everything else stays an unevaluated
//! property tree. `module` blocks are rejected.
//!
//! ### Walking properties
//!
//! see [walker::PropertyWalker]
//!
//! Property trees are walked depth-first. Literal strings stay strings (`"$${x}"` is the literal `${x}`), template
//! strings are parsed and kept as [value::Interpolation]s. While walking we visit each variable access (a
//! [hcl::expr::Traversal] such as `var.region` or `aws_instance.web.*.id`) and collect its symbolic name.
//!
//! ### Resolving references
//!
//! A symbolic name is classified as a [reference::Reference]. Some are informational (`count.index`, `path.module`,
//! `self.id`, `terraform.workspace`) and never become edges. The others name a local, a variable or a resource and
//! are looked up in the name tables of the [builder::Builder]. `depends_on` adds further resource edges.
//!
//! **Example**
//!
//! ```hcl
//! provider "aws" {}
//!
//! resource "aws_instance" "web" {
//!   ami        = "${var.ami}"
//!   count      = "${local.instances}"
//!   depends_on = ["aws_s3_bucket.logs"]
//! }
//! ```
//!
//! | symbolic name   | reference                        | dependency             |
//! |-----------------|----------------------------------|------------------------|
//! | `var.ami`       | [reference::Reference::UserVariable] | `var.ami`          |
//! | `local.instances` | [reference::Reference::Local]  | `local.instances`      |
//! | (`depends_on`)  |                                  | `aws_s3_bucket.logs`   |
//!
//! The resource is linked to provider `aws` as its owner. That link is not a dependency.
//!
//! ### Provider metadata
//!
//! Every provider is backed by a plugin that reports its [plugin::ProviderInfo]. Plugins run in parallel before any
//! entity is built, see [plugin::PluginLoader].
//!
//! ### Output
//!
//! The result is a [graph::Graph] that owns all entities. Edges are [graph::EntityId]s. The graph is serialized via
//! [serde], interpolations are written as their source text.
//!
pub mod builder;
pub mod config;
pub mod graph;
pub mod plugin;
pub mod reference;
pub mod value;
pub mod walker;
mod visit;

pub use builder::build_graph;
