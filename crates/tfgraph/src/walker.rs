//! Property walker
//!
//! Walks raw property trees, parses every template string and collects the symbolic names of all variable accesses
//! it finds along the way.
//!
//! The parser has already split quoted strings: pure literals arrive as [Expression::String] with their escapes
//! resolved (`"$${x}"` is the text `${x}`), everything else as [Expression::TemplateExpr]. Plain strings are never
//! parsed again, so code that builds expressions by hand must use [TemplateExpr] for interpolations.
//!
//! | raw value                 | resolved value                               |
//! |---------------------------|----------------------------------------------|
//! | `true`, `1`, `1.5`        | passed through                               |
//! | `"text"`, `"$${text}"`    | [Value::String]                              |
//! | `"${var.x}"`              | [Value::Interpolation], `var.x` is collected |
//! | `[...]`, `{...}`          | walked element by element                    |
//! | anything else             | [WalkError::UnsupportedType]                 |
use crate::config::RawProperties;
use crate::reference::ReferenceCollector;
use crate::value::{Interpolation, Value};
use crate::visit::VisitTraversals;
use hcl::{template::Element, Expression, ObjectKey, Template, TemplateExpr};
use indexmap::{IndexMap, IndexSet};

/// Walks a top-level value
///
/// A missing value resolves to [Value::Null] without any names.
pub fn walk_value(value: Option<&Expression>) -> Result<(Value, IndexSet<String>), WalkError> {
    let mut walker = PropertyWalker::default();
    let value = match value {
        None | Some(Expression::Null) => Value::Null,
        Some(expr) => walker.walk(expr)?,
    };
    Ok((value, walker.into_names()))
}

/// Walks a property object
pub fn walk_properties(
    properties: &RawProperties,
) -> Result<(IndexMap<String, Value>, IndexSet<String>), WalkError> {
    let mut walker = PropertyWalker::default();
    let properties = walker.walk_object(properties)?;
    Ok((properties, walker.into_names()))
}

#[derive(Debug, Default)]
pub struct PropertyWalker {
    names: IndexSet<String>,
    path: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl PropertyWalker {
    /// Symbolic names found so far, in order of their first occurrence
    pub fn names(&self) -> &IndexSet<String> {
        &self.names
    }

    pub fn into_names(self) -> IndexSet<String> {
        self.names
    }

    pub fn walk(&mut self, expr: &Expression) -> Result<Value, WalkError> {
        match expr {
            Expression::Bool(value) => Ok(Value::Boolean(*value)),
            Expression::Number(number) => self.walk_number(number),
            Expression::String(literal) => Ok(Value::String(literal.clone())),
            Expression::TemplateExpr(template_expr) => {
                let template = Template::from_expr(template_expr).map_err(|source| {
                    WalkError::ExpressionSyntax {
                        path: self.path(),
                        raw: template_source(template_expr).to_string(),
                        source,
                    }
                })?;
                Ok(self.resolve_template(template_source(template_expr).to_string(), template))
            }
            Expression::Array(elements) => {
                let mut walked = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    self.path.push(PathSegment::Index(index));
                    walked.push(self.walk(element)?);
                    self.path.pop();
                }
                Ok(Value::Array(walked))
            }
            Expression::Object(object) => self.walk_object(object).map(Value::Object),
            other => Err(self.unsupported(expression_kind(other))),
        }
    }

    pub fn walk_object(
        &mut self,
        object: &hcl::Object<ObjectKey, Expression>,
    ) -> Result<IndexMap<String, Value>, WalkError> {
        let mut walked = IndexMap::with_capacity(object.len());
        for (key, value) in object.iter() {
            let key = match key {
                ObjectKey::Identifier(ident) => ident.to_string(),
                ObjectKey::Expression(Expression::String(key)) => key.clone(),
                other => {
                    return Err(WalkError::InvalidKeyType {
                        path: self.path(),
                        key: format!("{other:?}"),
                    })
                }
            };

            self.path.push(PathSegment::Key(key.clone()));
            let value = self.walk(value)?;
            self.path.pop();

            walked.insert(key, value);
        }
        Ok(walked)
    }

    fn walk_number(&self, number: &hcl::Number) -> Result<Value, WalkError> {
        if number.is_f64() {
            if let Some(decimal) = number.as_f64() {
                return Ok(Value::Decimal(decimal));
            }
        }

        match number.as_i64() {
            Some(integer) => Ok(Value::Integer(integer)),
            None => Err(self.unsupported("out of range integer")),
        }
    }

    /// Literal templates collapse into plain strings, everything else is kept as an [Interpolation]
    fn resolve_template(&mut self, raw: String, template: Template) -> Value {
        if let Some(literal) = literal_text(&template) {
            return Value::String(literal);
        }

        template.visit_traversals(&mut ReferenceCollector::new(&mut self.names));
        Value::Interpolation(Interpolation::new(raw, template))
    }

    fn unsupported(&self, kind: &'static str) -> WalkError {
        WalkError::UnsupportedType {
            path: self.path(),
            kind,
        }
    }

    fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                }
                PathSegment::Index(index) => path.push_str(&format!("[{index}]")),
            }
        }
        path
    }
}

fn template_source(template_expr: &TemplateExpr) -> &str {
    match template_expr {
        TemplateExpr::QuotedString(source) => source,
        TemplateExpr::Heredoc(heredoc) => &heredoc.template,
    }
}

/// Text of a template that consists of literals only
fn literal_text(template: &Template) -> Option<String> {
    let mut text = String::new();
    for element in template.elements() {
        let Element::Literal(literal) = element else {
            return None;
        };
        text.push_str(literal);
    }
    Some(text)
}

fn expression_kind(expr: &Expression) -> &'static str {
    match expr {
        Expression::Null => "null",
        Expression::Variable(_) => "variable",
        Expression::Traversal(_) => "traversal",
        Expression::FuncCall(_) => "function call",
        Expression::Parenthesis(_) => "parenthesized expression",
        Expression::Conditional(_) => "conditional",
        Expression::Operation(_) => "operation",
        Expression::ForExpr(_) => "for expression",
        _ => "expression",
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WalkError {
    #[error("unsupported value type ({kind}) at `{path}`")]
    UnsupportedType { path: String, kind: &'static str },
    #[error("invalid interpolation `{raw}` at `{path}`")]
    ExpressionSyntax {
        path: String,
        raw: String,
        #[source]
        source: hcl::Error,
    },
    #[error("object key {key} at `{path}` is not a string")]
    InvalidKeyType { path: String, key: String },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Expression {
        let body = hcl_edit::parser::parse_body(&format!("value = {source}")).unwrap();
        let body: hcl::Body = body.into();
        body.into_attributes().next().unwrap().expr
    }

    fn walk(source: &str) -> Result<(Value, Vec<String>), WalkError> {
        let (value, names) = walk_value(Some(&expr(source)))?;
        Ok((value, names.into_iter().collect()))
    }

    #[test]
    fn string_free_trees_pass_through() {
        let (value, names) = walk("{ a = true, b = [1, 2.5, { c = false }], d = {} }").unwrap();

        let expected: Value = [
            ("a", Value::Boolean(true)),
            (
                "b",
                Value::Array(vec![
                    Value::Integer(1),
                    Value::Decimal(2.5),
                    [("c", false)].into_iter().collect(),
                ]),
            ),
            ("d", Value::Object(IndexMap::new())),
        ]
        .into_iter()
        .collect();

        assert_eq!(value, expected);
        assert!(names.is_empty());
    }

    #[test]
    fn literal_strings_stay_strings() {
        let (value, names) = walk(r#""hello world""#).unwrap();
        assert_eq!(value, Value::String("hello world".into()));
        assert!(names.is_empty());
    }

    #[test]
    fn interpolations_are_kept() {
        let (value, names) = walk(r#""${var.x}""#).unwrap();
        let interpolation = value.as_interpolation().expect("must be an interpolation");
        assert_eq!(interpolation.source(), "${var.x}");
        assert_eq!(names, vec!["var.x"]);
    }

    #[test]
    fn names_are_collected_once() {
        let (_, names) =
            walk(r#"["${var.a}", { b = "${var.a}-${local.b}" }, "${local.b}"]"#).unwrap();
        assert_eq!(names, vec!["var.a", "local.b"]);
    }

    #[test]
    fn sequence_order_is_preserved() {
        let (value, _) = walk(r#"["b", "a", "${var.c}"]"#).unwrap();
        let Value::Array(elements) = value else {
            panic!("must be an array");
        };
        assert_eq!(elements[0], Value::String("b".into()));
        assert_eq!(elements[1], Value::String("a".into()));
        assert!(elements[2].as_interpolation().is_some());
    }

    #[test]
    fn escaped_interpolations_are_literals() {
        let (value, names) = walk(r#""Hello $${var.who}""#).unwrap();
        assert_eq!(value, Value::String("Hello ${var.who}".into()));
        assert!(names.is_empty());

        let (value, names) = walk(r#""%%{ if true }x%%{ endif }""#).unwrap();
        assert_eq!(value, Value::String("%{ if true }x%{ endif }".into()));
        assert!(names.is_empty());
    }

    #[test]
    fn plain_strings_are_not_parsed_again() {
        let mut walker = PropertyWalker::default();
        let value = walker
            .walk(&Expression::String("${aws_instance.web.id}".into()))
            .unwrap();
        assert_eq!(value, Value::String("${aws_instance.web.id}".into()));
        assert!(walker.names().is_empty());
    }

    #[test]
    fn template_expressions_are_parsed() {
        let mut walker = PropertyWalker::default();
        let template = TemplateExpr::QuotedString("${aws_instance.web.id}".into());
        let value = walker.walk(&Expression::from(template)).unwrap();
        assert!(value.as_interpolation().is_some());
        assert_eq!(
            walker.names().iter().collect::<Vec<_>>(),
            vec!["aws_instance.web.id"]
        );
    }

    #[test]
    fn syntax_errors() {
        let mut walker = PropertyWalker::default();
        let template = TemplateExpr::QuotedString("${var.x".into());
        let err = walker
            .walk(&Expression::from(template))
            .unwrap_err();
        assert!(matches!(err, WalkError::ExpressionSyntax { raw, .. } if raw == "${var.x"));
    }

    #[test]
    fn unsupported_types() {
        let err = walk("{ a = [1, var.x] }").unwrap_err();
        let WalkError::UnsupportedType { path, kind } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(path, "a[1]");
        assert_eq!(kind, "traversal");

        assert!(matches!(
            walk("{ a = null }"),
            Err(WalkError::UnsupportedType { kind: "null", .. })
        ));
    }

    #[test]
    fn invalid_keys() {
        let err = walk("{ (var.key) = 1 }").unwrap_err();
        assert!(matches!(err, WalkError::InvalidKeyType { .. }));
    }

    #[test]
    fn missing_values_walk_to_null() {
        let (value, names) = walk_value(None).unwrap();
        assert_eq!(value, Value::Null);
        assert!(names.is_empty());
    }
}
