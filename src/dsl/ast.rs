//! Abstract syntax for the rule DSL.
//!
//! Every node class is a closed tagged enum so each walker (evaluator,
//! translator, executor, engine) dispatches exhaustively. Nodes render back
//! to canonical DSL text via `Display`; reparsing the canonical text yields a
//! structurally equal tree.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::TriggerKind;
use crate::value::Value;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// The DSL spelling of this operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    /// True for `<`, `>`, `<=`, `>=`.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge)
    }
}

/// Additive arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
}

impl ArithOp {
    /// The DSL spelling of this operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
        }
    }
}

/// A dotted property path. The head is `this` or a bound variable name; the
/// remaining segments navigate properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathExpr {
    /// Path segments, head first. Never empty.
    pub segments: Vec<String>,
}

impl PathExpr {
    /// Creates a path from segments.
    ///
    /// # Panics
    /// Panics if `segments` is empty; the parser never produces one.
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        assert!(!segments.is_empty(), "path must have at least one segment");
        Self { segments }
    }

    /// The head segment (`this` or a variable name).
    #[must_use]
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// True when the head is the `this` keyword.
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.head() == "this"
    }

    /// The final segment when the path navigates a property.
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        if self.segments.len() > 1 {
            self.segments.last().map(String::as_str)
        } else {
            None
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", content = "data", rename_all = "snake_case")]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A property path or bare variable reference.
    Path(PathExpr),
    /// Binary comparison.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Additive arithmetic.
    Arith {
        /// Operator.
        op: ArithOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Membership in a literal list.
    In {
        /// Tested value.
        value: Box<Expr>,
        /// Literal members.
        list: Vec<Value>,
    },
    /// `IS NULL` / `IS NOT NULL`.
    IsNull {
        /// Tested value.
        value: Box<Expr>,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
    /// Short-circuit conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Built-in function call.
    Call {
        /// Function name.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
    },
    /// Relationship existence test.
    Exists {
        /// Source variable.
        left: String,
        /// Relationship type label.
        relationship: String,
        /// Target variable.
        right: String,
        /// Optional filter appended to the containment subquery.
        filter: Option<Box<Expr>>,
    },
    /// Anchored regular-expression match against a literal pattern.
    Matches {
        /// Tested value.
        value: Box<Expr>,
        /// Pattern source.
        pattern: String,
    },
    /// Change predicate against the firing's old-value map.
    Changed {
        /// Property name under test.
        property: String,
        /// Required prior value (`CHANGED FROM a …`).
        from: Option<Value>,
        /// Required new value (`… TO b`).
        to: Option<Value>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Path(p) => write!(f, "{p}"),
            Self::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::Arith { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::In { value, list } => {
                write!(f, "{value} IN [")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::IsNull { value, negated } => {
                if *negated {
                    write!(f, "{value} IS NOT NULL")
                } else {
                    write!(f, "{value} IS NULL")
                }
            }
            Self::And(left, right) => write!(f, "({left} AND {right})"),
            Self::Or(left, right) => write!(f, "({left} OR {right})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Exists {
                left,
                relationship,
                right,
                filter,
            } => {
                write!(f, "EXISTS({left} -[{relationship}]-> {right}")?;
                if let Some(filter) = filter {
                    write!(f, " WHERE {filter}")?;
                }
                write!(f, ")")
            }
            Self::Matches { value, pattern } => {
                write!(f, "{value} MATCHES {}", Value::String(pattern.clone()))
            }
            Self::Changed { property, from, to } => {
                write!(f, "{property} CHANGED")?;
                if let (Some(from), Some(to)) = (from, to) {
                    write!(f, " FROM {from} TO {to}")?;
                }
                Ok(())
            }
        }
    }
}

/// A statement inside a rule body or effect block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    /// Property write.
    Set {
        /// Target path; head is a bound variable (or `this` in effects).
        target: PathExpr,
        /// Value expression.
        value: Expr,
    },
    /// Action invocation.
    Trigger {
        /// Declared entity type of the action.
        entity_type: String,
        /// Action name.
        action: String,
        /// Bound variable naming the target entity.
        target: String,
        /// Argument mapping (name → expression).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<BTreeMap<String, Expr>>,
    },
    /// Nested iteration.
    For(ForClause),
}

/// A `FOR (var:Type WHERE guard) { … }` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForClause {
    /// Loop variable.
    pub variable: String,
    /// Entity type iterated over.
    pub entity_type: String,
    /// Optional guard expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expr>,
    /// Body statements in declaration order.
    pub statements: Vec<Stmt>,
}

impl Stmt {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            Self::Set { target, value } => writeln!(f, "{pad}SET {target} = {value};"),
            Self::Trigger {
                entity_type,
                action,
                target,
                args,
            } => {
                write!(f, "{pad}TRIGGER {entity_type}.{action} ON {target}")?;
                if let Some(args) = args {
                    write!(f, " WITH {{")?;
                    for (i, (name, value)) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{name}: {value}")?;
                    }
                    write!(f, "}}")?;
                }
                writeln!(f, ";")
            }
            Self::For(clause) => clause.fmt_indented(f, indent),
        }
    }
}

impl ForClause {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        write!(f, "{pad}FOR ({}:{}", self.variable, self.entity_type)?;
        if let Some(guard) = &self.guard {
            write!(f, " WHERE {guard}")?;
        }
        writeln!(f, ") {{")?;
        for stmt in &self.statements {
            stmt.fmt_indented(f, indent + 1)?;
        }
        writeln!(f, "{pad}}}")
    }
}

impl fmt::Display for ForClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Declared type name (`string`, `number`, `boolean`, …).
    pub param_type: String,
    /// True when the parameter may be omitted.
    pub optional: bool,
}

/// A named boolean guard on an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    /// Optional label for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Guard expression; first falsy precondition stops the action.
    pub condition: Expr,
    /// Failure message surfaced to the caller.
    pub on_failure: String,
}

/// An `ACTION Type.name { … }` declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    /// Entity type the action operates on.
    pub entity_type: String,
    /// Action name, unique per entity type.
    pub name: String,
    /// Declared parameters in order.
    pub parameters: Vec<Parameter>,
    /// Preconditions in declaration order.
    pub preconditions: Vec<Precondition>,
    /// Effect statements; empty when the action declares no effect.
    pub effect: Vec<Stmt>,
}

impl ActionDef {
    /// The registry key `Type.name`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity_type, self.name)
    }
}

impl fmt::Display for ActionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACTION {}.{}", self.entity_type, self.name)?;
        if !self.parameters.is_empty() {
            write!(f, "(")?;
            for (i, p) in self.parameters.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", p.name, p.param_type)?;
                if p.optional {
                    write!(f, "?")?;
                }
            }
            write!(f, ")")?;
        }
        writeln!(f, " {{")?;
        for pre in &self.preconditions {
            write!(f, "  PRECONDITION")?;
            if let Some(label) = &pre.label {
                write!(f, " {label}")?;
            }
            writeln!(
                f,
                ": {} ON_FAILURE: {}",
                pre.condition,
                Value::String(pre.on_failure.clone())
            )?;
        }
        if !self.effect.is_empty() {
            writeln!(f, "  EFFECT {{")?;
            for stmt in &self.effect {
                stmt.fmt_indented(f, 2)?;
            }
            writeln!(f, "  }}")?;
        }
        writeln!(f, "}}")
    }
}

/// The declared shape of an event a rule reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Event kind.
    pub kind: TriggerKind,
    /// Entity type the trigger watches.
    pub entity_type: String,
    /// Watched property; present iff `kind` is `Update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl Trigger {
    /// The key this trigger is indexed under.
    #[must_use]
    pub fn key(&self) -> String {
        crate::event::trigger_key(self.kind, &self.entity_type, self.property.as_deref())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ON {}({}", self.kind, self.entity_type)?;
        if let Some(property) = &self.property {
            write!(f, ".{property}")?;
        }
        write!(f, ")")
    }
}

/// A `RULE name { … }` declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Rule name, unique across the registry.
    pub name: String,
    /// Scheduling priority; higher fires first. Defaults to 0.
    pub priority: i32,
    /// The event shape this rule reacts to.
    pub trigger: Trigger,
    /// The outer iteration clause.
    pub body: ForClause,
}

impl fmt::Display for RuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RULE {}", self.name)?;
        if self.priority != 0 {
            write!(f, " PRIORITY {}", self.priority)?;
        }
        writeln!(f, " {{")?;
        writeln!(f, "  {}", self.trigger)?;
        self.body.fmt_indented(f, 1)?;
        writeln!(f, "}}")
    }
}

/// One top-level declaration from a parse unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Declaration {
    /// An action definition.
    Action(ActionDef),
    /// A rule definition.
    Rule(RuleDef),
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(a) => write!(f, "{a}"),
            Self::Rule(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_accessors() {
        let path = PathExpr::new(vec!["this".into(), "status".into()]);
        assert!(path.is_this());
        assert_eq!(path.property(), Some("status"));
        assert_eq!(path.to_string(), "this.status");

        let bare = PathExpr::new(vec!["amount".into()]);
        assert_eq!(bare.property(), None);
    }

    #[test]
    fn test_trigger_key() {
        let t = Trigger {
            kind: TriggerKind::Update,
            entity_type: "Supplier".into(),
            property: Some("status".into()),
        };
        assert_eq!(t.key(), "UPDATE|Supplier|status");
        assert_eq!(t.to_string(), "ON UPDATE(Supplier.status)");
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::And(
            Box::new(Expr::Compare {
                op: CmpOp::Eq,
                left: Box::new(Expr::Path(PathExpr::new(vec!["po".into(), "status".into()]))),
                right: Box::new(Expr::Literal(Value::String("Open".into()))),
            }),
            Box::new(Expr::Exists {
                left: "po".into(),
                relationship: "orderedFrom".into(),
                right: "s".into(),
                filter: None,
            }),
        );
        assert_eq!(
            expr.to_string(),
            "(po.status == \"Open\" AND EXISTS(po -[orderedFrom]-> s))"
        );
    }

    #[test]
    fn test_changed_display() {
        let bare = Expr::Changed {
            property: "status".into(),
            from: None,
            to: None,
        };
        assert_eq!(bare.to_string(), "status CHANGED");

        let full = Expr::Changed {
            property: "status".into(),
            from: Some(Value::String("Draft".into())),
            to: Some(Value::String("Open".into())),
        };
        assert_eq!(full.to_string(), "status CHANGED FROM \"Draft\" TO \"Open\"");
    }
}
