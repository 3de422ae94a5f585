//! symbolic references found inside interpolations
//!
//! A reference is the dotted name of a variable access, such as `var.region`, `aws_instance.web.*.id` or
//! `count.index`. [ReferenceCollector] extracts these names from parsed templates and [Reference::parse]
//! classifies them.
use crate::config::ResourceMode;
use crate::visit::Visit;
use hcl::{Expression, Traversal, TraversalOperator};
use indexmap::IndexSet;

/// Classified variable reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `count.FIELD`
    Count { field: String },
    /// `path.FIELD`
    Path { field: String },
    /// `self.FIELD`
    SelfAttribute { field: String },
    /// A name without any dots
    Simple { name: String },
    /// `terraform.FIELD`
    Terraform { field: String },
    /// `module.NAME.FIELD`
    Module { name: String, field: String },
    /// `local.NAME`
    Local { name: String },
    /// `TYPE.NAME.FIELD` or `data.TYPE.NAME.FIELD`
    Resource {
        mode: ResourceMode,
        kind: String,
        name: String,
        field: String,
    },
    /// `var.NAME`
    UserVariable { name: String },
}

impl Reference {
    pub fn parse(name: &str) -> Result<Self, ReferenceError> {
        if let Some(field) = name.strip_prefix("count.") {
            return Ok(Reference::Count {
                field: field.to_string(),
            });
        }
        if let Some(field) = name.strip_prefix("path.") {
            return Ok(Reference::Path {
                field: field.to_string(),
            });
        }
        if let Some(field) = name.strip_prefix("self.") {
            return Ok(Reference::SelfAttribute {
                field: field.to_string(),
            });
        }
        if let Some(field) = name.strip_prefix("terraform.") {
            return Ok(Reference::Terraform {
                field: field.to_string(),
            });
        }
        if let Some(rest) = name.strip_prefix("var.") {
            return match rest.split_once('.') {
                _ if rest.is_empty() => Err(ReferenceError::MissingName {
                    reference: name.to_string(),
                }),
                Some((variable, element)) => Err(ReferenceError::VariableDotIndex {
                    variable: variable.to_string(),
                    element: element.to_string(),
                }),
                None => Ok(Reference::UserVariable {
                    name: rest.to_string(),
                }),
            };
        }
        if let Some(rest) = name.strip_prefix("local.") {
            return match rest.split_once('.') {
                _ if rest.is_empty() => Err(ReferenceError::MissingName {
                    reference: name.to_string(),
                }),
                Some((local, _)) => Err(ReferenceError::LocalDotIndex {
                    local: local.to_string(),
                }),
                None => Ok(Reference::Local {
                    name: rest.to_string(),
                }),
            };
        }
        if name.starts_with("module.") {
            let mut parts = name.splitn(3, '.').skip(1);
            return match (parts.next(), parts.next()) {
                (Some(module), Some(field)) if !module.is_empty() && !field.is_empty() => {
                    Ok(Reference::Module {
                        name: module.to_string(),
                        field: field.to_string(),
                    })
                }
                _ => Err(ReferenceError::IncompleteModule {
                    reference: name.to_string(),
                }),
            };
        }
        if !name.contains('.') {
            return Ok(Reference::Simple {
                name: name.to_string(),
            });
        }

        let (mode, parts) = match name.strip_prefix("data.") {
            Some(rest) => (ResourceMode::Data, rest.splitn(3, '.').collect::<Vec<_>>()),
            None => (ResourceMode::Managed, name.splitn(3, '.').collect()),
        };
        match parts.as_slice() {
            [kind, resource, field]
                if !kind.is_empty() && !resource.is_empty() && !field.is_empty() =>
            {
                Ok(Reference::Resource {
                    mode,
                    kind: kind.to_string(),
                    name: resource.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Err(ReferenceError::IncompleteResource {
                reference: name.to_string(),
                mode,
            }),
        }
    }

    /// Composite id of the referenced resource
    pub fn resource_id(&self) -> Option<String> {
        match self {
            Reference::Resource {
                mode, kind, name, ..
            } => Some(mode.resource_id(kind, name)),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("`{reference}` does not name anything")]
    MissingName { reference: String },
    #[error("invalid dot index in `var.{variable}.{element}`; values in maps and lists must be accessed with bracket indexing, like `var.{variable}[\"{element}\"]`")]
    VariableDotIndex { variable: String, element: String },
    #[error("can't use dot (.) attribute access in `local.{local}`; use bracket indexing")]
    LocalDotIndex { local: String },
    #[error("`{reference}`: module references must have three parts: module.NAME.ATTR")]
    IncompleteModule { reference: String },
    #[error("`{reference}`: {} references must have the form {}", .mode, .mode.reference_form())]
    IncompleteResource {
        reference: String,
        mode: ResourceMode,
    },
}

/// Collects the symbolic names of all visited traversals
#[derive(derive_new::new)]
pub(crate) struct ReferenceCollector<'n> {
    names: &'n mut IndexSet<String>,
}

impl<'n> Visit<Traversal> for ReferenceCollector<'n> {
    fn visit(&mut self, traversal: &Traversal) {
        if let Some(name) = traversal.symbolic_name() {
            tracing::trace!(%name, "reference found");
            self.names.insert(name);
        }
    }
}

pub(crate) trait TraversalExt {
    fn symbolic_name(&self) -> Option<String>;
}

impl TraversalExt for Traversal {
    /// Dotted name of the variable access
    ///
    /// Attribute access, legacy indices (`.0`) and attribute splats (`.*`) are part of the name. Bracket
    /// indices and full splats end it, so `var.map["key"]` is named `var.map`.
    ///
    /// Traversals not rooted in a variable (e.g. `func().attr`) have no name.
    fn symbolic_name(&self) -> Option<String> {
        let Expression::Variable(var) = &self.expr else {
            return None;
        };

        let mut name = var.as_str().to_string();
        for operator in &self.operators {
            match operator {
                TraversalOperator::GetAttr(ident) => {
                    name.push('.');
                    name.push_str(ident.as_str());
                }
                TraversalOperator::LegacyIndex(index) => {
                    name.push('.');
                    name.push_str(&index.to_string());
                }
                TraversalOperator::AttrSplat => name.push_str(".*"),
                _ => break,
            }
        }

        Some(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::visit::VisitTraversals;
    use pretty_assertions::assert_eq;

    fn names(template: &str) -> Vec<String> {
        let template: hcl::Template = template.parse().expect("template must parse");
        let mut names = IndexSet::new();
        template.visit_traversals(&mut ReferenceCollector::new(&mut names));
        names.into_iter().collect()
    }

    #[test]
    fn symbolic_names() {
        assert_eq!(names("${var.region}"), vec!["var.region"]);
        assert_eq!(names("${aws_instance.web.*.id}"), vec!["aws_instance.web.*.id"]);
        assert_eq!(names("${aws_instance.web.0.id}"), vec!["aws_instance.web.0.id"]);
        assert_eq!(names(r#"${var.amis["us-east-1"]}"#), vec!["var.amis"]);
        assert_eq!(names("${count.index}"), vec!["count.index"]);
        assert_eq!(names("${foo}"), vec!["foo"]);
    }

    #[test]
    fn names_are_distinct() {
        assert_eq!(
            names("${var.a}-${var.b}-${var.a}-${upper(var.b)}"),
            vec!["var.a", "var.b"]
        );
    }

    #[test]
    fn classify_informational() {
        assert_eq!(
            Reference::parse("count.index"),
            Ok(Reference::Count {
                field: "index".into()
            })
        );
        assert_eq!(
            Reference::parse("path.module"),
            Ok(Reference::Path {
                field: "module".into()
            })
        );
        assert_eq!(
            Reference::parse("self.private_ip"),
            Ok(Reference::SelfAttribute {
                field: "private_ip".into()
            })
        );
        assert_eq!(
            Reference::parse("terraform.workspace"),
            Ok(Reference::Terraform {
                field: "workspace".into()
            })
        );
        assert_eq!(
            Reference::parse("foo"),
            Ok(Reference::Simple { name: "foo".into() })
        );
    }

    #[test]
    fn classify_entities() {
        assert_eq!(
            Reference::parse("var.region"),
            Ok(Reference::UserVariable {
                name: "region".into()
            })
        );
        assert_eq!(
            Reference::parse("local.tags"),
            Ok(Reference::Local {
                name: "tags".into()
            })
        );
        assert_eq!(
            Reference::parse("module.network.vpc_id"),
            Ok(Reference::Module {
                name: "network".into(),
                field: "vpc_id".into()
            })
        );

        let managed = Reference::parse("aws_instance.web.*.id").unwrap();
        assert_eq!(
            managed,
            Reference::Resource {
                mode: ResourceMode::Managed,
                kind: "aws_instance".into(),
                name: "web".into(),
                field: "*.id".into(),
            }
        );
        assert_eq!(managed.resource_id().as_deref(), Some("aws_instance.web"));

        let data = Reference::parse("data.aws_ami.ubuntu.id").unwrap();
        assert_eq!(data.resource_id().as_deref(), Some("data.aws_ami.ubuntu"));
    }

    #[test]
    fn classify_malformed() {
        assert_eq!(
            Reference::parse("var.map.key"),
            Err(ReferenceError::VariableDotIndex {
                variable: "map".into(),
                element: "key".into()
            })
        );
        assert_eq!(
            Reference::parse("local.a.b"),
            Err(ReferenceError::LocalDotIndex { local: "a".into() })
        );
        assert_eq!(
            Reference::parse("var."),
            Err(ReferenceError::MissingName {
                reference: "var.".into()
            })
        );
        assert!(matches!(
            Reference::parse("module.network"),
            Err(ReferenceError::IncompleteModule { .. })
        ));
        assert!(matches!(
            Reference::parse("aws_instance.web"),
            Err(ReferenceError::IncompleteResource {
                mode: ResourceMode::Managed,
                ..
            })
        ));
        assert!(matches!(
            Reference::parse("data.aws_ami.ubuntu"),
            Err(ReferenceError::IncompleteResource {
                mode: ResourceMode::Data,
                ..
            })
        ));
    }
}
