//! Expression evaluation.
//!
//! Evaluation is eager: every right-hand side is reduced to a [`Value`] the
//! moment the resolver reaches it, so a reassignment of `x` in terms of
//! `$(x)` reads the previous value. `null` is stored like any other value;
//! list construction drops it and property collection treats it as unset.
//!
//! A [`Context`] carries the active toolset and configuration, a stack of
//! [`Scope`] layers (module scopes below, target scope on top), and the
//! in-flight definition stack that turns `foo = $(foo)` into
//! [`EvalError::RecursiveReference`] instead of an unknown-variable error.

use std::borrow::Cow;

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::lexer::Span;

/// A fully evaluated value.
///
/// Lists are flat: list literals splice nested list values and drop nulls
/// while evaluating, so a stored `List` only contains scalars.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// The absent value; elided from lists, unsets properties.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// String scalar.
    Str(String),
    /// Ordered list of scalars.
    List(Vec<Value>),
}

impl Value {
    /// Noun used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "a boolean",
            Self::Str(_) => "a string",
            Self::List(_) => "a list",
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// The string, if this is one.
    #[must_use]
    pub const fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// List normalization: null becomes empty, a scalar becomes a
    /// one-element list, a list stays itself.
    #[must_use]
    pub fn into_list(self) -> Vec<Self> {
        match self {
            Self::Null => Vec::new(),
            Self::List(items) => items,
            scalar => vec![scalar],
        }
    }
}

/// Failure to evaluate an expression.
#[derive(Clone, Debug, Diagnostic, Eq, Error, PartialEq)]
pub enum EvalError {
    /// `$(name)` with no binding in any visible scope.
    #[error("reference to unknown variable `$({name})`")]
    #[diagnostic(code(kiln::eval::unknown_variable))]
    UnknownVariable {
        /// The unresolved name.
        name: String,
        /// Where the reference appears.
        span: Span,
    },
    /// A definition referred to itself while being evaluated.
    #[error("variable `{name}` is defined recursively, references itself")]
    #[diagnostic(code(kiln::eval::recursive_reference))]
    RecursiveReference {
        /// The self-referential name.
        name: String,
        /// Where the reference appears.
        span: Span,
    },
    /// A guard or ternary condition that is not a boolean.
    #[error("condition must be a boolean, got {found}")]
    #[diagnostic(code(kiln::eval::non_boolean_condition))]
    NonBooleanCondition {
        /// What the condition evaluated to.
        found: &'static str,
        /// Where the condition appears.
        span: Span,
    },
    /// A boolean operator applied to a non-boolean operand.
    #[error("`{op}` requires boolean operands, got {found}")]
    #[diagnostic(code(kiln::eval::non_boolean_operand))]
    NonBooleanOperand {
        /// The operator as written.
        op: &'static str,
        /// What the operand evaluated to.
        found: &'static str,
        /// Where the operand appears.
        span: Span,
    },
    /// `==` / `!=` applied to a list operand.
    #[error("`{op}` compares scalars, got a list")]
    #[diagnostic(code(kiln::eval::list_comparison))]
    ListComparison {
        /// The comparison operator.
        op: BinaryOp,
        /// Where the list operand appears.
        span: Span,
    },
}

impl EvalError {
    /// Source span the error points at.
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::UnknownVariable { span, .. }
            | Self::RecursiveReference { span, .. }
            | Self::NonBooleanCondition { span, .. }
            | Self::NonBooleanOperand { span, .. }
            | Self::ListComparison { span, .. } => *span,
        }
    }
}

/// One layer of bindings.
///
/// Toolset-qualified assignments matching the active toolset land in a
/// separate override table that wins over the bare table regardless of
/// write order, so `gnu.cflags = …; cflags = …;` still resolves to the
/// qualified value under the `gnu` toolset.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    bare: IndexMap<String, Value>,
    overrides: IndexMap<String, Value>,
}

impl Scope {
    /// Looks `name` up in this layer only, override first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.overrides.get(name).or_else(|| self.bare.get(name))
    }

    /// All bindings with override precedence applied, in first-write order.
    #[must_use]
    pub fn flattened(&self) -> IndexMap<String, Value> {
        let mut merged = IndexMap::new();
        for (name, value) in &self.bare {
            let effective = self.overrides.get(name).unwrap_or(value);
            merged.insert(name.clone(), effective.clone());
        }
        for (name, value) in &self.overrides {
            if !merged.contains_key(name) {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }
}

/// Evaluation context for one (toolset, configuration) variant.
///
/// The base scope always exists; [`Context::push_scope`] opens nested
/// layers on top of it (module scope, then target scope).
#[derive(Clone, Debug)]
pub struct Context {
    toolset: String,
    config: String,
    base: Scope,
    nested: Vec<Scope>,
    in_flight: Vec<String>,
}

impl Context {
    /// A context with a single empty scope layer.
    #[must_use]
    pub fn new(toolset: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            toolset: toolset.into(),
            config: config.into(),
            base: Scope::default(),
            nested: Vec::new(),
            in_flight: Vec::new(),
        }
    }

    /// Active toolset identifier.
    #[must_use]
    pub fn toolset(&self) -> &str {
        &self.toolset
    }

    /// Active configuration identifier.
    #[must_use]
    pub fn config(&self) -> &str {
        &self.config
    }

    /// Opens a nested scope layer.
    pub fn push_scope(&mut self) {
        self.nested.push(Scope::default());
    }

    /// Drops the innermost nested layer; the base layer always stays.
    pub fn pop_scope(&mut self) {
        self.nested.pop();
    }

    /// Binds `name` in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.current_mut().bare.insert(name.into(), value);
    }

    /// Binds a toolset-qualified override for `name` in the innermost scope.
    pub fn set_override(&mut self, name: impl Into<String>, value: Value) {
        self.current_mut().overrides.insert(name.into(), value);
    }

    /// Innermost-outward lookup, override-before-bare within each layer.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.nested
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.base.get(name))
    }

    /// The innermost scope layer.
    #[must_use]
    pub fn innermost(&self) -> &Scope {
        self.nested.last().unwrap_or(&self.base)
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.nested.last_mut().unwrap_or(&mut self.base)
    }

    /// Evaluates the right-hand side of `name`'s definition. A reference to
    /// `name` from inside `expr` that finds no previous binding reports a
    /// recursive definition rather than an unknown variable.
    ///
    /// # Errors
    ///
    /// Returns any [`EvalError`] raised while reducing `expr`.
    pub fn eval_definition(&mut self, name: &str, expr: &Expr) -> Result<Value, EvalError> {
        self.in_flight.push(name.to_owned());
        let value = self.eval(expr);
        self.in_flight.pop();
        value
    }

    /// Reduces `expr` to a value.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] for unknown references, recursive
    /// definitions, and operator type mismatches.
    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Str(text) => Ok(Value::Str(text.clone())),
            ExprKind::Bool(flag) => Ok(Value::Bool(*flag)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Ref(name) => self.lookup(name, expr.span),
            ExprKind::List(items) => self.eval_list(items),
            ExprKind::Not(inner) => {
                let operand = self.eval(inner)?;
                operand
                    .as_bool()
                    .map(|flag| Value::Bool(!flag))
                    .ok_or_else(|| EvalError::NonBooleanOperand {
                        op: "!",
                        found: operand.type_name(),
                        span: inner.span,
                    })
            }
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                when_true,
                when_false,
            } => {
                if self.eval_condition(cond)? {
                    self.eval(when_true)
                } else {
                    self.eval(when_false)
                }
            }
        }
    }

    /// Evaluates a guard to a boolean.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::NonBooleanCondition`] when the guard reduces to
    /// anything but a boolean, or any error raised while reducing it.
    pub fn eval_condition(&self, expr: &Expr) -> Result<bool, EvalError> {
        let value = self.eval(expr)?;
        value.as_bool().ok_or_else(|| EvalError::NonBooleanCondition {
            found: value.type_name(),
            span: expr.span,
        })
    }

    fn eval_list(&self, items: &[Expr]) -> Result<Value, EvalError> {
        let mut flattened = Vec::new();
        for item in items {
            match self.eval(item)? {
                Value::Null => {}
                Value::List(nested) => flattened.extend(nested),
                scalar => flattened.push(scalar),
            }
        }
        Ok(Value::List(flattened))
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And => {
                if !self.boolean_operand(lhs, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.boolean_operand(rhs, "&&")?))
            }
            BinaryOp::Or => {
                if self.boolean_operand(lhs, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.boolean_operand(rhs, "||")?))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                let equal = scalar_eq(op, &left, lhs.span, &right, rhs.span)?;
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
        }
    }

    fn boolean_operand(&self, expr: &Expr, op: &'static str) -> Result<bool, EvalError> {
        let value = self.eval(expr)?;
        value.as_bool().ok_or_else(|| EvalError::NonBooleanOperand {
            op,
            found: value.type_name(),
            span: expr.span,
        })
    }

    fn lookup(&self, name: &str, span: Span) -> Result<Value, EvalError> {
        if name == "toolset" {
            return Ok(Value::Str(self.toolset.clone()));
        }
        if name == "config" {
            return Ok(Value::Str(self.config.clone()));
        }
        if let Some((qualifier, rest)) = name.split_once('.') {
            if qualifier == self.toolset {
                return self.lookup(rest, span);
            }
            return Err(EvalError::UnknownVariable {
                name: name.to_owned(),
                span,
            });
        }
        if let Some(value) = self.get(name) {
            return Ok(value.clone());
        }
        if self.in_flight.iter().any(|pending| pending == name) {
            return Err(EvalError::RecursiveReference {
                name: name.to_owned(),
                span,
            });
        }
        Err(EvalError::UnknownVariable {
            name: name.to_owned(),
            span,
        })
    }
}

/// Concatenation for `+=`: lists concatenate, a scalar joins as one
/// element, null contributes nothing.
#[must_use]
pub fn append(current: Value, addition: Value) -> Value {
    let mut items = current.into_list();
    match addition {
        Value::Null => {}
        Value::List(added) => items.extend(added),
        scalar => items.push(scalar),
    }
    Value::List(items)
}

fn scalar_eq(
    op: BinaryOp,
    left: &Value,
    left_span: Span,
    right: &Value,
    right_span: Span,
) -> Result<bool, EvalError> {
    if matches!(left, Value::List(_)) {
        return Err(EvalError::ListComparison {
            op,
            span: left_span,
        });
    }
    if matches!(right, Value::List(_)) {
        return Err(EvalError::ListComparison {
            op,
            span: right_span,
        });
    }
    let equal = match (scalar_form(left), scalar_form(right)) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(lhs), Some(rhs)) => lhs == rhs,
    };
    Ok(equal)
}

// Booleans compare against their literal spellings so `$(toolset) == gnu`
// and `flag == true` go through one code path.
fn scalar_form(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Str(text) => Some(Cow::Borrowed(text.as_str())),
        Value::Bool(flag) => Some(Cow::Borrowed(if *flag { "true" } else { "false" })),
        Value::Null | Value::List(_) => None,
    }
}
