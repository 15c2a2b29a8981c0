//! Build-time unrolling of provably fixed for-each templates.
//!
//! When the iterated collection is fixed at build time (an inline literal
//! list or an integer range), the emitters expand the template into N
//! sibling nodes so the rest of the pipeline treats the iteration variable
//! as an ordinary compile-time constant. Anything else stays a dynamic
//! iteration construct backed by a runtime length variable.

use crate::kir::{ComponentNode, Expression, Number};

/// Upper bound on unrolled range size; larger ranges stay dynamic.
const MAX_UNROLL: i64 = 1024;

/// Elements of a provably build-time-fixed collection, or `None` when the
/// source needs runtime iteration.
pub fn unrollable_elements(source: &Expression) -> Option<Vec<Expression>> {
    if let Expression::Array(elements) = source {
        if elements.iter().all(Expression::is_constant) {
            return Some(elements.clone());
        }
        return None;
    }

    if let Some((start, end)) = source.as_range_call() {
        if let (&Expression::Number(Number::Int(a)), &Expression::Number(Number::Int(b))) =
            (start, end)
        {
            if a <= b && b - a <= MAX_UNROLL {
                return Some((a..b).map(Expression::int).collect());
            }
        }
    }

    None
}

/// Instantiate a template subtree for one unrolled element: occurrences of
/// the loop variable become the element value.
pub fn instantiate_template(node: &ComponentNode, item: &str, value: &Expression) -> ComponentNode {
    let mut out = node.clone();

    if out.text_expression.as_deref() == Some(item) {
        out.text = Some(literal_text(value));
        out.text_expression = None;
    }

    for binding in out.property_bindings.values_mut() {
        binding.source = rewrite_var(&binding.source, item, value);
    }

    out.children = out
        .children
        .iter()
        .map(|child| instantiate_template(child, item, value))
        .collect();
    out
}

/// Replace free occurrences of a variable with a literal expression.
pub fn rewrite_var(expr: &Expression, name: &str, value: &Expression) -> Expression {
    match expr {
        Expression::Var(v) if v == name => value.clone(),
        Expression::Member { object, property } => Expression::Member {
            object: Box::new(rewrite_var(object, name, value)),
            property: property.clone(),
        },
        Expression::Index { object, index } => Expression::Index {
            object: Box::new(rewrite_var(object, name, value)),
            index: Box::new(rewrite_var(index, name, value)),
        },
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(rewrite_var(operand, name, value)),
        },
        Expression::Binary { op, lhs, rhs } => Expression::Binary {
            op: *op,
            lhs: Box::new(rewrite_var(lhs, name, value)),
            rhs: Box::new(rewrite_var(rhs, name, value)),
        },
        Expression::Call { function, args } => Expression::Call {
            function: function.clone(),
            args: args.iter().map(|a| rewrite_var(a, name, value)).collect(),
        },
        Expression::MethodCall {
            receiver,
            method,
            args,
        } => Expression::MethodCall {
            receiver: Box::new(rewrite_var(receiver, name, value)),
            method: method.clone(),
            args: args.iter().map(|a| rewrite_var(a, name, value)).collect(),
        },
        Expression::Array(elements) => Expression::Array(
            elements
                .iter()
                .map(|e| rewrite_var(e, name, value))
                .collect(),
        ),
        Expression::Ternary {
            condition,
            then_expr,
            else_expr,
        } => Expression::Ternary {
            condition: Box::new(rewrite_var(condition, name, value)),
            then_expr: Box::new(rewrite_var(then_expr, name, value)),
            else_expr: Box::new(rewrite_var(else_expr, name, value)),
        },
        other => other.clone(),
    }
}

/// Display text for an unrolled literal element.
pub fn literal_text(value: &Expression) -> String {
    match value {
        Expression::String(s) => s.clone(),
        Expression::Number(n) => match *n {
            Number::Int(v) => v.to_string(),
            Number::Float(v) => v.to_string(),
        },
        Expression::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
