//! Translation of `FOR` clauses into parameterized graph queries.
//!
//! Every user-supplied literal is bound through a `$param_N` parameter; no
//! literal is ever concatenated into query text. Labels spliced into the
//! query (entity types, relationship types, properties, aliases) are
//! restricted to `[A-Za-z_][A-Za-z0-9_]*` and validated up front.
//!
//! `CHANGED` has no graph-side equivalent: when it appears as a top-level
//! conjunct of a guard it is split off into a residual predicate for the
//! engine to evaluate per row; anywhere else it is a translation error, as
//! are function calls in any guard position.

use std::collections::HashMap;

use crate::dsl::ast::{ArithOp, CmpOp, Expr, ForClause};
use crate::error::TranslationError;
use crate::value::Value;

/// Validates a label for direct inclusion in query text.
///
/// # Errors
/// `UnsafeLabel` when the label is empty, starts with a digit, or contains
/// anything outside `[A-Za-z0-9_]`.
pub fn safe_label(label: &str) -> Result<&str, TranslationError> {
    let mut chars = label.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(label)
    } else {
        Err(TranslationError::UnsafeLabel {
            label: label.to_string(),
        })
    }
}

/// An outer variable already bound to a concrete entity.
#[derive(Debug, Clone)]
pub struct BoundVar {
    /// Variable name (becomes a node alias).
    pub name: String,
    /// Entity type label.
    pub entity_type: String,
    /// Concrete entity id, bound through an identity parameter.
    pub id: String,
}

impl BoundVar {
    /// Creates a bound variable record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

/// A translated query plus its parameter mapping.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    /// The query text.
    pub query: String,
    /// Named parameters referenced by the text.
    pub params: HashMap<String, Value>,
    /// Guard conjuncts the query could not express (`CHANGED`); the engine
    /// evaluates these per result row.
    pub residual: Option<Expr>,
}

/// Compiles `FOR` clauses to queries. Stateless; every translation starts a
/// fresh `param_0` counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTranslator;

impl QueryTranslator {
    /// Creates a translator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Translates one `FOR` clause given the already-bound outer variables.
    ///
    /// A bound variable whose name equals the loop variable pins the loop to
    /// that concrete entity (the triggering-entity anchor); other bound
    /// variables become additional node aliases with identity constraints.
    ///
    /// # Errors
    /// `UnsafeLabel` for invalid labels, `Unsupported` for guard constructs
    /// with no query equivalent.
    pub fn translate(
        &self,
        clause: &ForClause,
        bound: &[BoundVar],
    ) -> Result<TranslatedQuery, TranslationError> {
        let loop_alias = safe_label(&clause.variable)?;
        let loop_label = safe_label(&clause.entity_type)?;

        let mut nodes = vec![format!("({loop_alias}:{loop_label})")];
        let mut constraints = Vec::new();
        let mut params = HashMap::new();

        for var in bound {
            let alias = safe_label(&var.name)?;
            let label = safe_label(&var.entity_type)?;
            if var.name != clause.variable {
                nodes.push(format!("({alias}:{label})"));
            }
            constraints.push(format!("{alias}.id = $id_{alias}"));
            params.insert(format!("id_{alias}"), Value::String(var.id.clone()));
        }

        let mut residual = None;
        if let Some(guard) = &clause.guard {
            let (translatable, left_over) = split_residual(guard)?;
            if let Some(expr) = translatable {
                let mut fragment = GuardFragment::new(0);
                constraints.push(fragment.translate(&expr)?);
                params.extend(fragment.into_params());
            }
            residual = left_over;
        }

        let mut query = format!("MATCH {}", nodes.join(", "));
        if !constraints.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&constraints.join(" AND "));
        }
        query.push_str(&format!(" RETURN {loop_alias}"));

        Ok(TranslatedQuery {
            query,
            params,
            residual,
        })
    }
}

/// Splits `CHANGED` conjuncts out of a guard.
///
/// Returns `(translatable, residual)`. `CHANGED` below anything other than a
/// top-level `AND` spine cannot be split and fails the translation.
fn split_residual(
    guard: &Expr,
) -> Result<(Option<Expr>, Option<Expr>), TranslationError> {
    match guard {
        Expr::Changed { .. } => Ok((None, Some(guard.clone()))),
        Expr::And(left, right) => {
            let (lt, lr) = split_residual(left)?;
            let (rt, rr) = split_residual(right)?;
            Ok((combine(lt, rt), combine(lr, rr)))
        }
        _ if contains_changed(guard) => Err(TranslationError::Unsupported {
            construct: "CHANGED predicate".to_string(),
        }),
        _ => Ok((Some(guard.clone()), None)),
    }
}

fn combine(left: Option<Expr>, right: Option<Expr>) -> Option<Expr> {
    match (left, right) {
        (Some(l), Some(r)) => Some(Expr::And(Box::new(l), Box::new(r))),
        (Some(e), None) | (None, Some(e)) => Some(e),
        (None, None) => None,
    }
}

fn contains_changed(expr: &Expr) -> bool {
    match expr {
        Expr::Changed { .. } => true,
        Expr::Compare { left, right, .. } | Expr::Arith { left, right, .. } => {
            contains_changed(left) || contains_changed(right)
        }
        Expr::And(left, right) | Expr::Or(left, right) => {
            contains_changed(left) || contains_changed(right)
        }
        Expr::Not(inner) => contains_changed(inner),
        Expr::In { value, .. } | Expr::IsNull { value, .. } | Expr::Matches { value, .. } => {
            contains_changed(value)
        }
        Expr::Call { args, .. } => args.iter().any(contains_changed),
        Expr::Exists { filter, .. } => filter.as_deref().is_some_and(contains_changed),
        Expr::Literal(_) | Expr::Path(_) => false,
    }
}

/// Translates one guard expression into query text, accumulating fresh
/// parameters. Also used for the filter inside evaluator-issued `EXISTS`
/// containment queries.
#[derive(Debug)]
pub(crate) struct GuardFragment {
    params: HashMap<String, Value>,
    counter: usize,
}

impl GuardFragment {
    pub(crate) fn new(counter_start: usize) -> Self {
        Self {
            params: HashMap::new(),
            counter: counter_start,
        }
    }

    pub(crate) fn into_params(self) -> HashMap<String, Value> {
        self.params
    }

    fn fresh_param(&mut self, value: Value) -> String {
        let name = format!("param_{}", self.counter);
        self.counter += 1;
        self.params.insert(name.clone(), value);
        name
    }

    pub(crate) fn translate(&mut self, expr: &Expr) -> Result<String, TranslationError> {
        match expr {
            Expr::Literal(value) => {
                let name = self.fresh_param(value.clone());
                Ok(format!("${name}"))
            }
            Expr::Path(path) => match path.segments.as_slice() {
                [head] => Ok(safe_label(head)?.to_string()),
                [head, property] => {
                    Ok(format!("{}.{}", safe_label(head)?, safe_label(property)?))
                }
                _ => Err(TranslationError::Unsupported {
                    construct: format!("nested property path '{path}'"),
                }),
            },
            Expr::Compare { op, left, right } => {
                let left = self.translate(left)?;
                let right = self.translate(right)?;
                let op = match op {
                    CmpOp::Eq => "=",
                    CmpOp::Ne => "<>",
                    CmpOp::Lt => "<",
                    CmpOp::Gt => ">",
                    CmpOp::Le => "<=",
                    CmpOp::Ge => ">=",
                };
                Ok(format!("{left} {op} {right}"))
            }
            Expr::Arith { op, left, right } => {
                let left = self.translate(left)?;
                let right = self.translate(right)?;
                let op = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                };
                Ok(format!("({left} {op} {right})"))
            }
            Expr::In { value, list } => {
                let value = self.translate(value)?;
                let name = self.fresh_param(Value::List(list.clone()));
                Ok(format!("{value} IN ${name}"))
            }
            Expr::IsNull { value, negated } => {
                let value = self.translate(value)?;
                if *negated {
                    Ok(format!("{value} IS NOT NULL"))
                } else {
                    Ok(format!("{value} IS NULL"))
                }
            }
            Expr::And(left, right) => {
                let left = self.translate(left)?;
                let right = self.translate(right)?;
                Ok(format!("({left} AND {right})"))
            }
            Expr::Or(left, right) => {
                let left = self.translate(left)?;
                let right = self.translate(right)?;
                Ok(format!("({left} OR {right})"))
            }
            Expr::Not(inner) => {
                let inner = self.translate(inner)?;
                Ok(format!("NOT ({inner})"))
            }
            Expr::Matches { value, pattern } => {
                let value = self.translate(value)?;
                let name = self.fresh_param(Value::String(pattern.clone()));
                Ok(format!("{value} =~ ${name}"))
            }
            Expr::Exists {
                left,
                relationship,
                right,
                filter,
            } => {
                let left = safe_label(left)?;
                let rel = safe_label(relationship)?;
                let right = safe_label(right)?;
                let mut clause = format!("EXISTS {{ MATCH ({left})-[:{rel}]->({right})");
                if let Some(filter) = filter {
                    let filter = self.translate(filter)?;
                    clause.push_str(" WHERE ");
                    clause.push_str(&filter);
                }
                clause.push_str(" }");
                Ok(clause)
            }
            Expr::Call { name, .. } => Err(TranslationError::Unsupported {
                construct: format!("function call {name}()"),
            }),
            Expr::Changed { .. } => Err(TranslationError::Unsupported {
                construct: "CHANGED predicate".to_string(),
            }),
        }
    }
}
