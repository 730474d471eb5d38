//! Tree-walking expression evaluator.
//!
//! Evaluation is synchronous except for `EXISTS`, which issues a containment
//! query through the context's graph driver. Three-valued logic is collapsed
//! at each comparison: a null operand yields `false` except for the null
//! predicates, and `null == null` is `true`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{OnceLock, RwLock};

use crate::builtins;
use crate::context::EvaluationContext;
use crate::dsl::ast::{ArithOp, CmpOp, Expr};
use crate::error::{EvalError, GraphError};
use crate::query::{safe_label, GuardFragment};
use crate::value::Value;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

/// Compiles an implicitly anchored match pattern through a bounded cache.
fn cached_regex(pattern: &str) -> Result<regex::Regex, EvalError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().map_err(|_| EvalError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "regex cache lock poisoned".to_string(),
        })?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let anchored = format!("^(?:{pattern})$");
    let compiled = regex::Regex::new(&anchored).map_err(|e| EvalError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut guard = cache.write().map_err(|_| EvalError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: "regex cache lock poisoned".to_string(),
    })?;

    if guard.len() >= REGEX_CACHE_MAX {
        // Keep the cache bounded to avoid unbounded memory usage.
        guard.clear();
    }

    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, EvalError>> + Send + 'a>>;

/// Evaluates expressions against one firing's context.
pub struct ExpressionEvaluator<'a> {
    ctx: &'a EvaluationContext,
}

impl<'a> ExpressionEvaluator<'a> {
    /// Creates an evaluator over the given context.
    #[must_use]
    pub const fn new(ctx: &'a EvaluationContext) -> Self {
        Self { ctx }
    }

    /// Evaluates an expression to a value.
    ///
    /// # Errors
    /// `UnknownFunction`, `UnknownVariable`, argument/pattern errors, and
    /// graph I/O failures from `EXISTS`.
    pub async fn evaluate(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval(expr).await
    }

    /// Evaluates an expression and collapses it to a boolean.
    ///
    /// # Errors
    /// As [`evaluate`](Self::evaluate).
    pub async fn evaluate_truthy(&self, expr: &Expr) -> Result<bool, EvalError> {
        Ok(self.eval(expr).await?.is_truthy())
    }

    fn eval<'b>(&'b self, expr: &'b Expr) -> EvalFuture<'b> {
        Box::pin(async move {
            match expr {
                Expr::Literal(value) => Ok(value.clone()),
                Expr::Path(path) => Ok(self.ctx.resolve_path(path)),
                Expr::Compare { op, left, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(Value::Bool(compare(*op, &left, &right)))
                }
                Expr::Arith { op, left, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(arith(*op, &left, &right))
                }
                Expr::In { value, list } => {
                    let value = self.eval(value).await?;
                    Ok(Value::Bool(list.iter().any(|item| equal(&value, item))))
                }
                Expr::IsNull { value, negated } => {
                    let value = self.eval(value).await?;
                    Ok(Value::Bool(value.is_null() != *negated))
                }
                Expr::And(left, right) => {
                    if !self.eval(left).await?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval(right).await?.is_truthy()))
                }
                Expr::Or(left, right) => {
                    if self.eval(left).await?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval(right).await?.is_truthy()))
                }
                Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner).await?.is_truthy())),
                Expr::Call { name, args } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg).await?);
                    }
                    builtins::call(name, &values, self.ctx)
                }
                Expr::Matches { value, pattern } => {
                    let value = self.eval(value).await?;
                    match value {
                        Value::String(text) => {
                            let re = cached_regex(pattern)?;
                            Ok(Value::Bool(re.is_match(&text)))
                        }
                        _ => Ok(Value::Bool(false)),
                    }
                }
                Expr::Changed { property, from, to } => Ok(Value::Bool(self.changed(
                    property,
                    from.as_ref(),
                    to.as_ref(),
                ))),
                Expr::Exists {
                    left,
                    relationship,
                    right,
                    filter,
                } => self.exists(left, relationship, right, filter.as_deref()).await,
            }
        })
    }

    /// `CHANGED` consults the firing's old-value map. Only the triggering
    /// property is recorded there, so the predicate is `false` for any other
    /// property.
    fn changed(&self, property: &str, from: Option<&Value>, to: Option<&Value>) -> bool {
        let Some(old) = self.ctx.old_value(property) else {
            return false;
        };
        let new = self.ctx.this.property(property);
        match (from, to) {
            (Some(from), Some(to)) => equal(old, from) && equal(&new, to),
            _ => !equal(old, &new),
        }
    }

    async fn exists(
        &self,
        left: &str,
        relationship: &str,
        right: &str,
        filter: Option<&Expr>,
    ) -> Result<Value, EvalError> {
        let source = self
            .ctx
            .entity(left)
            .ok_or_else(|| EvalError::UnknownVariable {
                name: left.to_string(),
            })?;
        let target = self
            .ctx
            .entity(right)
            .ok_or_else(|| EvalError::UnknownVariable {
                name: right.to_string(),
            })?;

        let left_alias = safe_label(left)?;
        let right_alias = safe_label(right)?;
        let rel = safe_label(relationship)?;
        let source_label = safe_label(&source.entity_type)?;
        let target_label = safe_label(&target.entity_type)?;

        let mut params = HashMap::new();
        params.insert(
            format!("id_{left_alias}"),
            Value::String(source.id.clone()),
        );
        params.insert(
            format!("id_{right_alias}"),
            Value::String(target.id.clone()),
        );

        let mut query = format!(
            "MATCH ({left_alias}:{source_label})-[:{rel}]->({right_alias}:{target_label}) \
             WHERE {left_alias}.id = $id_{left_alias} AND {right_alias}.id = $id_{right_alias}"
        );
        if let Some(filter) = filter {
            let mut fragment = GuardFragment::new(params.len());
            let clause = fragment.translate(filter)?;
            params.extend(fragment.into_params());
            query.push_str(" AND ");
            query.push_str(&clause);
        }
        query.push_str(&format!(" RETURN {left_alias}"));

        let driver = self.ctx.driver().ok_or_else(|| {
            EvalError::Graph(GraphError::Disconnected {
                message: "no graph driver attached to evaluation context".to_string(),
            })
        })?;

        let rows = driver.run(&query, params).await?;
        Ok(Value::Bool(!rows.is_empty()))
    }
}

/// Structural equality with int/float coercion; `null == null` holds.
pub(crate) fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64 - b).abs() == 0.0
        }
        _ => left == right,
    }
}

/// Binary comparison with the spec's null collapse.
pub(crate) fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    if op == CmpOp::Eq {
        return equal(left, right);
    }
    if op == CmpOp::Ne {
        // Any null operand collapses to false; null != null is also false.
        if left.is_null() || right.is_null() {
            return false;
        }
        return !equal(left, right);
    }

    // Ordering operators: null operands and mixed types yield false.
    if left.is_null() || right.is_null() {
        return false;
    }
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
        _ => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return false;
            };
            let Some(ordering) = a.partial_cmp(&b) else {
                return false;
            };
            ordering
        }
    };
    match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    }
}

/// Additive arithmetic. Null operands propagate null; incompatible operand
/// types evaluate to null rather than failing the firing.
pub(crate) fn arith(op: ArithOp, left: &Value, right: &Value) -> Value {
    use chrono::Duration;

    if left.is_null() || right.is_null() {
        return Value::Null;
    }

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Value::Int(match op {
            ArithOp::Add => a.saturating_add(*b),
            ArithOp::Sub => a.saturating_sub(*b),
        }),
        (Value::Duration(a), Value::Duration(b)) => Value::Duration(match op {
            ArithOp::Add => a.saturating_add(*b),
            ArithOp::Sub => a.saturating_sub(*b),
        }),
        (Value::Timestamp(ts), d @ Value::Duration(_)) => {
            let Some(delta) = crate::builtins::duration_millis(d) else {
                return Value::Null;
            };
            Value::Timestamp(match op {
                ArithOp::Add => *ts + delta,
                ArithOp::Sub => *ts - delta,
            })
        }
        (d @ Value::Duration(_), Value::Timestamp(ts)) => match op {
            ArithOp::Add => match crate::builtins::duration_millis(d) {
                Some(delta) => Value::Timestamp(*ts + delta),
                None => Value::Null,
            },
            ArithOp::Sub => Value::Null,
        },
        (Value::Timestamp(a), Value::Timestamp(b)) => match op {
            ArithOp::Sub => Value::Duration(
                (*a - *b)
                    .num_milliseconds(),
            ),
            ArithOp::Add => Value::Null,
        },
        _ => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Value::Null;
            };
            Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
            })
        }
    }
}
