use super::Visit;
use hcl::{
    template::{Directive, Element},
    Expression, Operation, Template, TemplateExpr, Traversal, TraversalOperator,
};

/// Recursively visit all [hcl::Traversal]s
///
/// Standalone variables are presented to the visitor as traversals without operators.
pub trait VisitTraversals {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>);
}

impl VisitTraversals for Expression {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        match self {
            Expression::Variable(variable) => {
                let traversal = Traversal::new(
                    Expression::Variable(variable.clone()),
                    Vec::<TraversalOperator>::new(),
                );
                visitor.visit(&traversal);
            }
            Expression::Traversal(traversal) => {
                visitor.visit(traversal);

                // the root variable is part of the traversal itself
                if !matches!(traversal.expr, Expression::Variable(_)) {
                    traversal.expr.visit_traversals(visitor);
                }

                for operator in &traversal.operators {
                    if let TraversalOperator::Index(index) = operator {
                        index.visit_traversals(visitor);
                    }
                }
            }
            Expression::Array(array) => {
                for expr in array {
                    expr.visit_traversals(visitor);
                }
            }
            Expression::Object(object) => {
                for value in object.values() {
                    value.visit_traversals(visitor);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                template_expr.visit_traversals(visitor);
            }
            Expression::FuncCall(func_call) => {
                for arg in &func_call.args {
                    arg.visit_traversals(visitor);
                }
            }
            Expression::Parenthesis(expr) => {
                expr.visit_traversals(visitor);
            }
            Expression::Conditional(cond) => {
                cond.cond_expr.visit_traversals(visitor);
                cond.true_expr.visit_traversals(visitor);
                cond.false_expr.visit_traversals(visitor);
            }
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Binary(binop) => {
                    binop.lhs_expr.visit_traversals(visitor);
                    binop.rhs_expr.visit_traversals(visitor);
                }
                Operation::Unary(unop) => {
                    unop.expr.visit_traversals(visitor);
                }
            },
            Expression::ForExpr(forexpr) => {
                forexpr.collection_expr.visit_traversals(visitor);
                forexpr
                    .key_expr
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
                forexpr.value_expr.visit_traversals(visitor);
                forexpr
                    .cond_expr
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
            }
            _ => {}
        }
    }
}

impl VisitTraversals for TemplateExpr {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        if let Ok(template) = Template::from_expr(self) {
            template.visit_traversals(visitor);
        }
    }
}

impl VisitTraversals for Template {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        for element in self.elements() {
            match element {
                Element::Interpolation(interpolation) => {
                    interpolation.expr.visit_traversals(visitor);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        ifdir.cond_expr.visit_traversals(visitor);
                        ifdir.true_template.visit_traversals(visitor);
                        ifdir
                            .false_template
                            .iter()
                            .for_each(|t| t.visit_traversals(visitor));
                    }
                    Directive::For(fordir) => {
                        fordir.collection_expr.visit_traversals(visitor);
                        fordir.template.visit_traversals(visitor);
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roots(template: &str) -> Vec<String> {
        let template: Template = template.parse().expect("template must parse");
        let mut found = vec![];
        template.visit_traversals(&mut |traversal: &Traversal| {
            if let Expression::Variable(var) = &traversal.expr {
                found.push(var.as_str().to_string());
            }
        });
        found
    }

    #[test]
    fn visits_nested_expressions() {
        assert_eq!(
            roots(r#"${lookup(var.tags, "Name", local.fallback)}"#),
            vec!["var", "local"]
        );
        assert_eq!(
            roots("${var.enabled ? aws_instance.a.id : aws_instance.b.id}"),
            vec!["var", "aws_instance", "aws_instance"]
        );
    }

    #[test]
    fn visits_directives() {
        assert_eq!(
            roots("%{ if var.on }${local.a}%{ else }${local.b}%{ endif }"),
            vec!["var", "local", "local"]
        );
    }

    #[test]
    fn literals_have_no_traversals() {
        assert!(roots("just text").is_empty());
    }

    #[test]
    fn index_expressions_are_visited() {
        assert_eq!(roots("${var.list[local.i]}"), vec!["var", "local"]);
    }
}
