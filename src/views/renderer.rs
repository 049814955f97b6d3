use super::ast::{BinaryOperator, Expression, Node, Template, UnaryOperator};
use super::bindings::{Binding, Bindings};
use super::functions::FunctionRegistry;
use crate::error::{Error, Result};
use crate::security::HtmlEscaper;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Receives `{{ include }}` nodes during rendering
///
/// The renderer evaluates the `with { ... }` values in the caller's scope
/// and hands them over; the handler decides how the partial is resolved,
/// cached and rendered.
pub trait IncludeHandler {
    fn render_include(&mut self, name: &str, variables: Bindings) -> Result<String>;
}

/// Context for template rendering
pub struct RenderContext {
    /// Bound variables
    data: Map<String, Value>,

    /// Loop variables, innermost last
    locals: Vec<(String, Value)>,

    /// Callable functions
    functions: FunctionRegistry,
}

impl RenderContext {
    /// Create a render context with the built-in functions
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            locals: Vec::new(),
            functions: FunctionRegistry::default(),
        }
    }

    pub fn from_bindings(bindings: &Bindings) -> Self {
        Self::new(bindings.to_template_data())
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Resolve a bare name: loop variables, then bindings, then a
    /// zero-argument call to a registered function
    fn resolve_variable(&self, name: &str) -> Result<Value> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.data.get(name) {
            return Ok(value.clone());
        }
        if self.functions.contains(name) {
            return self.functions.call(name, &[]);
        }
        Ok(Value::Null)
    }

    fn evaluate_expression(&self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::Number(n) => Ok(number(*n)),
            Expression::Boolean(b) => Ok(Value::Bool(*b)),
            Expression::Null => Ok(Value::Null),

            Expression::Variable(name) => self.resolve_variable(name),

            Expression::PropertyAccess { object, property } => {
                let object = self.evaluate_expression(object)?;
                Ok(property_of(&object, property))
            }

            Expression::Index { object, index } => {
                let object = self.evaluate_expression(object)?;
                let index = self.evaluate_expression(index)?;
                Ok(index_of(&object, &index))
            }

            Expression::Array(items) => {
                let values: Result<Vec<Value>> =
                    items.iter().map(|e| self.evaluate_expression(e)).collect();
                Ok(Value::Array(values?))
            }

            Expression::FunctionCall { name, args } => {
                let args: Result<Vec<Value>> =
                    args.iter().map(|e| self.evaluate_expression(e)).collect();
                self.functions.call(name, &args?)
            }

            Expression::BinaryOp { left, op, right } => self.evaluate_binary_op(left, *op, right),

            Expression::UnaryOp { op, operand } => {
                let operand = self.evaluate_expression(operand)?;
                match op {
                    UnaryOperator::Not => Ok(Value::Bool(!is_truthy(&operand))),
                    UnaryOperator::Minus => {
                        let n = arithmetic_operand(&operand, "-")?;
                        Ok(number(-n))
                    }
                }
            }
        }
    }

    /// Evaluate a binary operation; `and`/`or` short-circuit
    fn evaluate_binary_op(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
    ) -> Result<Value> {
        let left = self.evaluate_expression(left)?;

        match op {
            BinaryOperator::And => {
                if !is_truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(is_truthy(&self.evaluate_expression(right)?)));
            }
            BinaryOperator::Or => {
                if is_truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(is_truthy(&self.evaluate_expression(right)?)));
            }
            _ => {}
        }

        let right = self.evaluate_expression(right)?;

        match op {
            BinaryOperator::Xor => Ok(Value::Bool(is_truthy(&left) ^ is_truthy(&right))),

            BinaryOperator::Equal => Ok(Value::Bool(loose_equals(&left, &right))),
            BinaryOperator::NotEqual => Ok(Value::Bool(!loose_equals(&left, &right))),
            BinaryOperator::Identical => Ok(Value::Bool(strict_equals(&left, &right))),
            BinaryOperator::NotIdentical => Ok(Value::Bool(!strict_equals(&left, &right))),

            BinaryOperator::LessThan => Ok(Value::Bool(
                compare(&left, &right) == Some(Ordering::Less),
            )),
            BinaryOperator::LessThanOrEqual => Ok(Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOperator::GreaterThan => Ok(Value::Bool(
                compare(&left, &right) == Some(Ordering::Greater),
            )),
            BinaryOperator::GreaterThanOrEqual => Ok(Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Greater | Ordering::Equal)
            ))),

            BinaryOperator::Add => {
                if let (Value::String(l), Value::String(r)) = (&left, &right) {
                    return Ok(Value::String(format!("{}{}", l, r)));
                }
                let (l, r) = (arithmetic_operand(&left, "+")?, arithmetic_operand(&right, "+")?);
                Ok(number(l + r))
            }
            BinaryOperator::Subtract => {
                let (l, r) = (arithmetic_operand(&left, "-")?, arithmetic_operand(&right, "-")?);
                Ok(number(l - r))
            }
            BinaryOperator::Multiply => {
                let (l, r) = (arithmetic_operand(&left, "*")?, arithmetic_operand(&right, "*")?);
                Ok(number(l * r))
            }
            BinaryOperator::Divide => {
                let (l, r) = (arithmetic_operand(&left, "/")?, arithmetic_operand(&right, "/")?);
                if r == 0.0 {
                    return Err(Error::render_failed("division by zero"));
                }
                Ok(number(l / r))
            }
            BinaryOperator::Modulo => {
                let (l, r) = (arithmetic_operand(&left, "%")?, arithmetic_operand(&right, "%")?);
                if r == 0.0 {
                    return Err(Error::render_failed("modulo by zero"));
                }
                Ok(number(l % r))
            }

            BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
        }
    }
}

/// Template renderer
pub struct Renderer<'a> {
    context: RenderContext,
    include_handler: Option<&'a mut dyn IncludeHandler>,
}

impl<'a> Renderer<'a> {
    pub fn new(context: RenderContext) -> Self {
        Self {
            context,
            include_handler: None,
        }
    }

    pub fn with_include_handler(mut self, handler: &'a mut dyn IncludeHandler) -> Self {
        self.include_handler = Some(handler);
        self
    }

    /// Render a template
    pub fn render(&mut self, template: &Template) -> Result<String> {
        self.render_nodes(&template.nodes)
    }

    /// Evaluate a single expression against the current context
    pub fn evaluate(&self, expr: &Expression) -> Result<Value> {
        self.context.evaluate_expression(expr)
    }

    fn render_nodes(&mut self, nodes: &[Node]) -> Result<String> {
        let mut output = String::new();
        for node in nodes {
            output.push_str(&self.render_node(node)?);
        }
        Ok(output)
    }

    fn render_node(&mut self, node: &Node) -> Result<String> {
        match node {
            Node::Text(text) => Ok(text.clone()),

            Node::Output(expr) => {
                let value = self.context.evaluate_expression(expr)?;
                Ok(HtmlEscaper::escape(&display_value(&value)))
            }

            Node::Conditional {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                if is_truthy(&self.context.evaluate_expression(condition)?) {
                    return self.render_nodes(then_branch);
                }

                for (else_if_condition, body) in else_if_branches {
                    if is_truthy(&self.context.evaluate_expression(else_if_condition)?) {
                        return self.render_nodes(body);
                    }
                }

                match else_branch {
                    Some(body) => self.render_nodes(body),
                    None => Ok(String::new()),
                }
            }

            Node::Loop {
                item_name,
                collection,
                body,
            } => {
                let items = match self.context.evaluate_expression(collection)? {
                    Value::Array(items) => items,
                    Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                    Value::Null => Vec::new(),
                    other => {
                        log::warn!(
                            "Cannot iterate over {} in 'for {} in ...'; skipping loop",
                            type_name(&other),
                            item_name
                        );
                        Vec::new()
                    }
                };

                let mut output = String::new();
                for item in items {
                    self.context.locals.push((item_name.clone(), item));
                    let rendered = self.render_nodes(body);
                    self.context.locals.pop();
                    output.push_str(&rendered?);
                }
                Ok(output)
            }

            Node::Include { name, variables } => {
                let mut extra = Bindings::new();
                for (key, expr) in variables {
                    let value = self.context.evaluate_expression(expr)?;
                    extra.insert(key.clone(), Binding::Value(value));
                }

                match self.include_handler.as_mut() {
                    Some(handler) => handler.render_include(name, extra),
                    None => Err(Error::render_failed(format!(
                        "cannot include '{}' without an include handler",
                        name
                    ))),
                }
            }
        }
    }
}

/// Falsy: null, false, 0, "", [] and {}
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Unescaped output text for a value
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Integral results become integers so they print without a fraction
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Numeric view of a value: numbers, numeric strings, booleans, null as 0
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn arithmetic_operand(value: &Value, op: &str) -> Result<f64> {
    to_number(value).ok_or_else(|| {
        Error::render_failed(format!(
            "unsupported operand type {} for '{}'",
            type_name(value),
            op
        ))
    })
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn property_of(object: &Value, property: &str) -> Value {
    match object {
        Value::Object(map) => map.get(property).cloned().unwrap_or(Value::Null),
        Value::Array(arr) => match property {
            "length" => Value::from(arr.len()),
            _ => property
                .parse::<usize>()
                .ok()
                .and_then(|i| arr.get(i).cloned())
                .unwrap_or(Value::Null),
        },
        Value::String(s) if property == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn index_of(object: &Value, index: &Value) -> Value {
    match (object, index) {
        (Value::Array(arr), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| arr.get(i as usize).cloned())
            .unwrap_or(Value::Null),
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Object(map), Value::Number(n)) => {
            map.get(&display_value(&Value::Number(n.clone())))
                .cloned()
                .unwrap_or(Value::Null)
        }
        (Value::Array(_), Value::String(key)) => property_of(object, key),
        _ => Value::Null,
    }
}

/// `==`: numbers and numeric strings compare by value, null and booleans
/// by truthiness
fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other),
        (Value::Bool(b), other) | (other, Value::Bool(b)) => *b == is_truthy(other),
        (Value::String(l), Value::String(r)) => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) if !l.trim().is_empty() && !r.trim().is_empty() => a == b,
            _ => l == r,
        },
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (to_number(left), to_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => strict_equals(left, right),
    }
}

/// `===`: same type and same value
fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| strict_equals(a, b))
        }
        _ => left == right,
    }
}

/// Ordering for `< <= > >=`; incomparable values yield `None`
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(l.cmp(r)),
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => to_number(left)?.partial_cmp(&to_number(right)?),
    }
}
