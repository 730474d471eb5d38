//! Parser for the rule DSL.
//!
//! A hand-written recursive-descent parser with one token of lookahead plus
//! a peek slot for distinguishing function calls from paths. On any error the
//! whole parse fails; no partial AST is ever returned. A post-parse pass
//! enforces the structural rules the grammar cannot express: unique names,
//! trigger shape, and variable binding.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use crate::error::ParseError;
use crate::event::TriggerKind;
use crate::value::Value;

use super::ast::{
    ActionDef, ArithOp, CmpOp, Declaration, Expr, ForClause, Parameter, PathExpr, Precondition,
    RuleDef, Stmt, Trigger,
};
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

/// Parses a DSL unit into its declarations.
///
/// # Errors
/// Returns `ParseError::Syntax` for malformed text (with the 1-based
/// location of the first unexpected token) and `ParseError::Semantic` for
/// duplicate names, invalid trigger shapes, or dangling variables.
pub fn parse(text: &str) -> Result<Vec<Declaration>, ParseError> {
    let mut parser = Parser::new(text);
    let declarations = parser.parse_unit()?;
    validate_unit(&declarations)?;
    Ok(declarations)
}

/// Parses a `.dsl` file into its declarations.
///
/// # Errors
/// Returns `ParseError::Io` when the file cannot be read, otherwise as
/// [`parse`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Declaration>, ParseError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse(&text)
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    peeked: Token,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        let peeked = lexer.next_token();
        Self {
            lexer,
            current,
            peeked,
        }
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peeked = std::mem::replace(&mut self.peeked, next);
        std::mem::replace(&mut self.current, peeked)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.current.span.line,
            column: self.current.span.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if &self.current.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                kind.describe(),
                self.current.kind.describe()
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {}", other.describe()))),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.current.kind {
            TokenKind::Str(text) => {
                let text = text.clone();
                self.advance();
                Ok(text)
            }
            other => Err(self.error(format!("expected {what}, found {}", other.describe()))),
        }
    }

    fn check_lex_error(&self) -> Result<(), ParseError> {
        if let TokenKind::Error(message) = &self.current.kind {
            Err(self.error(message.clone()))
        } else {
            Ok(())
        }
    }

    // unit := (action_def | rule_def)*
    fn parse_unit(&mut self) -> Result<Vec<Declaration>, ParseError> {
        let mut declarations = Vec::new();
        loop {
            self.check_lex_error()?;
            match &self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Action => declarations.push(Declaration::Action(self.parse_action()?)),
                TokenKind::Rule => declarations.push(Declaration::Rule(self.parse_rule()?)),
                other => {
                    return Err(self.error(format!(
                        "expected 'ACTION' or 'RULE', found {}",
                        other.describe()
                    )));
                }
            }
        }
        Ok(declarations)
    }

    // action_def := "ACTION" type "." name param_list? "{" precondition+ effect? "}"
    fn parse_action(&mut self) -> Result<ActionDef, ParseError> {
        self.expect(&TokenKind::Action)?;
        let entity_type = self.expect_ident("entity type")?;
        self.expect(&TokenKind::Dot)?;
        let name = self.expect_ident("action name")?;

        let mut parameters = Vec::new();
        if self.current.kind == TokenKind::LParen {
            self.advance();
            loop {
                let param_name = self.expect_ident("parameter name")?;
                self.expect(&TokenKind::Colon)?;
                let param_type = self.expect_ident("parameter type")?;
                let optional = if self.current.kind == TokenKind::Question {
                    self.advance();
                    true
                } else {
                    false
                };
                parameters.push(Parameter {
                    name: param_name,
                    param_type,
                    optional,
                });
                if self.current.kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }

        self.expect(&TokenKind::LBrace)?;

        let mut preconditions = Vec::new();
        while self.current.kind == TokenKind::Precondition {
            preconditions.push(self.parse_precondition()?);
        }
        if preconditions.is_empty() {
            return Err(self.error(format!(
                "expected 'PRECONDITION', found {}",
                self.current.kind.describe()
            )));
        }

        let mut effect = Vec::new();
        if self.current.kind == TokenKind::Effect {
            self.advance();
            self.expect(&TokenKind::LBrace)?;
            while self.current.kind != TokenKind::RBrace {
                self.check_lex_error()?;
                effect.push(self.parse_statement()?);
            }
            self.expect(&TokenKind::RBrace)?;
        }

        self.expect(&TokenKind::RBrace)?;

        Ok(ActionDef {
            entity_type,
            name,
            parameters,
            preconditions,
            effect,
        })
    }

    // precondition := "PRECONDITION" label? ":" expr "ON_FAILURE" ":" string
    fn parse_precondition(&mut self) -> Result<Precondition, ParseError> {
        self.expect(&TokenKind::Precondition)?;
        let label = if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        };
        self.expect(&TokenKind::Colon)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::OnFailure)?;
        self.expect(&TokenKind::Colon)?;
        let on_failure = self.expect_string("failure message string")?;
        Ok(Precondition {
            label,
            condition,
            on_failure,
        })
    }

    // rule_def := "RULE" name ("PRIORITY" int)? "{" trigger for_clause "}"
    fn parse_rule(&mut self) -> Result<RuleDef, ParseError> {
        self.expect(&TokenKind::Rule)?;
        let name = self.expect_ident("rule name")?;

        let mut priority = 0;
        if self.current.kind == TokenKind::Priority {
            self.advance();
            let negative = if self.current.kind == TokenKind::Minus {
                self.advance();
                true
            } else {
                false
            };
            match self.current.kind {
                TokenKind::Int(v) => {
                    self.advance();
                    let v = i32::try_from(v)
                        .map_err(|_| self.error("priority out of range".to_string()))?;
                    priority = if negative { -v } else { v };
                }
                _ => {
                    return Err(self.error(format!(
                        "expected priority integer, found {}",
                        self.current.kind.describe()
                    )));
                }
            }
        }

        self.expect(&TokenKind::LBrace)?;
        let trigger = self.parse_trigger()?;
        if self.current.kind != TokenKind::For {
            return Err(self.error(format!(
                "expected 'FOR', found {}",
                self.current.kind.describe()
            )));
        }
        let body = self.parse_for()?;
        self.expect(&TokenKind::RBrace)?;

        Ok(RuleDef {
            name,
            priority,
            trigger,
            body,
        })
    }

    // trigger := "ON" kind "(" type ("." property)? ")"
    fn parse_trigger(&mut self) -> Result<Trigger, ParseError> {
        self.expect(&TokenKind::On)?;
        let kind = match self.current.kind {
            TokenKind::Update => TriggerKind::Update,
            TokenKind::Create => TriggerKind::Create,
            TokenKind::Delete => TriggerKind::Delete,
            TokenKind::Link => TriggerKind::Link,
            TokenKind::Scan => TriggerKind::Scan,
            _ => {
                return Err(self.error(format!(
                    "expected trigger kind (UPDATE, CREATE, DELETE, LINK, SCAN), found {}",
                    self.current.kind.describe()
                )));
            }
        };
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let entity_type = self.expect_ident("entity type")?;
        let property = if self.current.kind == TokenKind::Dot {
            self.advance();
            Some(self.expect_ident("property name")?)
        } else {
            None
        };
        self.expect(&TokenKind::RParen)?;

        Ok(Trigger {
            kind,
            entity_type,
            property,
        })
    }

    // for_clause := "FOR" "(" var ":" type ("WHERE" expr)? ")" "{" stmt* "}"
    fn parse_for(&mut self) -> Result<ForClause, ParseError> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;
        let variable = self.expect_ident("loop variable")?;
        self.expect(&TokenKind::Colon)?;
        let entity_type = self.expect_ident("entity type")?;
        let guard = if self.current.kind == TokenKind::Where {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            self.check_lex_error()?;
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(ForClause {
            variable,
            entity_type,
            guard,
            statements,
        })
    }

    // stmt := set_stmt | trigger_stmt | for_clause
    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.current.kind {
            TokenKind::Set => self.parse_set(),
            TokenKind::Trigger => self.parse_trigger_stmt(),
            TokenKind::For => Ok(Stmt::For(self.parse_for()?)),
            _ => Err(self.error(format!(
                "expected 'SET', 'TRIGGER' or 'FOR', found {}",
                self.current.kind.describe()
            ))),
        }
    }

    // set_stmt := "SET" path "=" expr ";"
    fn parse_set(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::Set)?;
        let target = self.parse_path()?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Set { target, value })
    }

    // trigger_stmt := "TRIGGER" type "." name "ON" var ("WITH" object)? ";"
    fn parse_trigger_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::Trigger)?;
        let entity_type = self.expect_ident("entity type")?;
        self.expect(&TokenKind::Dot)?;
        let action = self.expect_ident("action name")?;
        self.expect(&TokenKind::On)?;
        let target = self.expect_ident("target variable")?;
        let args = if self.current.kind == TokenKind::With {
            self.advance();
            Some(self.parse_object()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Trigger {
            entity_type,
            action,
            target,
            args,
        })
    }

    // object := "{" (name ":" expr ("," name ":" expr)*)? "}"
    fn parse_object(&mut self) -> Result<BTreeMap<String, Expr>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut members = BTreeMap::new();
        if self.current.kind != TokenKind::RBrace {
            loop {
                let line = self.current.span.line;
                let column = self.current.span.column;
                let name = self.expect_ident("argument name")?;
                self.expect(&TokenKind::Colon)?;
                let value = self.parse_expr()?;
                if members.insert(name.clone(), value).is_some() {
                    return Err(ParseError::Syntax {
                        line,
                        column,
                        message: format!("duplicate argument '{name}'"),
                    });
                }
                if self.current.kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(members)
    }

    // expr := or_expr
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.current.kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.current.kind == TokenKind::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.current.kind == TokenKind::Not {
            self.advance();
            let inner = self.parse_not()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_comparison()
        }
    }

    // comparison := "EXISTS" "(" pattern ")" | term (comp_op term | "IN" list
    //             | "IS" ["NOT"] "NULL" | "MATCHES" string | "CHANGED" ...)?
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        if self.current.kind == TokenKind::Exists {
            self.advance();
            self.expect(&TokenKind::LParen)?;
            let expr = self.parse_pattern()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(expr);
        }

        let left = self.parse_term()?;

        let op = match self.current.kind {
            TokenKind::EqEq => Some(CmpOp::Eq),
            TokenKind::NotEq => Some(CmpOp::Ne),
            TokenKind::Lt => Some(CmpOp::Lt),
            TokenKind::Gt => Some(CmpOp::Gt),
            TokenKind::Le => Some(CmpOp::Le),
            TokenKind::Ge => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_term()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        match self.current.kind {
            TokenKind::In => {
                self.advance();
                self.expect(&TokenKind::LBracket)?;
                let mut list = Vec::new();
                if self.current.kind != TokenKind::RBracket {
                    loop {
                        list.push(self.parse_literal()?);
                        if self.current.kind == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::In {
                    value: Box::new(left),
                    list,
                })
            }
            TokenKind::Is => {
                self.advance();
                let negated = if self.current.kind == TokenKind::Not {
                    self.advance();
                    true
                } else {
                    false
                };
                self.expect(&TokenKind::Null)?;
                Ok(Expr::IsNull {
                    value: Box::new(left),
                    negated,
                })
            }
            TokenKind::Matches => {
                self.advance();
                let pattern = self.expect_string("match pattern string")?;
                Ok(Expr::Matches {
                    value: Box::new(left),
                    pattern,
                })
            }
            TokenKind::Changed => {
                self.advance();
                let property = match left {
                    Expr::Path(path) => path.segments.last().cloned().unwrap_or_default(),
                    _ => {
                        return Err(
                            self.error("CHANGED applies to a property path".to_string())
                        );
                    }
                };
                let (from, to) = if self.current.kind == TokenKind::From {
                    self.advance();
                    let from = self.parse_literal()?;
                    self.expect(&TokenKind::To)?;
                    let to = self.parse_literal()?;
                    (Some(from), Some(to))
                } else {
                    (None, None)
                };
                Ok(Expr::Changed { property, from, to })
            }
            // Bare `a -[rel]-> b` in expression position is EXISTS sugar.
            TokenKind::RelOpen => {
                let Expr::Path(path) = left else {
                    return Err(self
                        .error("relationship pattern must start with a variable".to_string()));
                };
                if path.segments.len() != 1 {
                    return Err(self
                        .error("relationship pattern must start with a variable".to_string()));
                }
                self.advance();
                let relationship = self.expect_ident("relationship type")?;
                self.expect(&TokenKind::RelClose)?;
                let right = self.expect_ident("target variable")?;
                Ok(Expr::Exists {
                    left: path.segments.into_iter().next().unwrap_or_default(),
                    relationship,
                    right,
                    filter: None,
                })
            }
            _ => Ok(left),
        }
    }

    // pattern := var "-[" rel "]->" var ("WHERE" expr)?
    fn parse_pattern(&mut self) -> Result<Expr, ParseError> {
        let left = self.expect_ident("source variable")?;
        self.expect(&TokenKind::RelOpen)?;
        let relationship = self.expect_ident("relationship type")?;
        self.expect(&TokenKind::RelClose)?;
        let right = self.expect_ident("target variable")?;
        let filter = if self.current.kind == TokenKind::Where {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::Exists {
            left,
            relationship,
            right,
            filter,
        })
    }

    // term := factor (("+" | "-") factor)*
    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    // factor := literal | path | function_call | "(" expr ")"
    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        self.check_lex_error()?;
        match &self.current.kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peeked.kind == TokenKind::LParen {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    let mut args = Vec::new();
                    if self.current.kind != TokenKind::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.current.kind == TokenKind::Comma {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Path(self.parse_path()?))
                }
            }
            TokenKind::Str(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Minus => Ok(Expr::Literal(self.parse_literal()?)),
            other => Err(self.error(format!("expected expression, found {}", other.describe()))),
        }
    }

    // path := name ("." name)*
    fn parse_path(&mut self) -> Result<PathExpr, ParseError> {
        let mut segments = vec![self.expect_ident("variable or 'this'")?];
        while self.current.kind == TokenKind::Dot {
            self.advance();
            segments.push(self.expect_ident("property name")?);
        }
        Ok(PathExpr::new(segments))
    }

    fn parse_literal(&mut self) -> Result<Value, ParseError> {
        let negative = if self.current.kind == TokenKind::Minus {
            self.advance();
            true
        } else {
            false
        };
        let value = match &self.current.kind {
            TokenKind::Int(v) => Value::Int(if negative { -v } else { *v }),
            TokenKind::Float(v) => Value::Float(if negative { -v } else { *v }),
            TokenKind::Str(s) if !negative => Value::String(s.clone()),
            TokenKind::True if !negative => Value::Bool(true),
            TokenKind::False if !negative => Value::Bool(false),
            TokenKind::Null if !negative => Value::Null,
            other => {
                return Err(self.error(format!("expected literal, found {}", other.describe())));
            }
        };
        self.advance();
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Post-parse validation
// ---------------------------------------------------------------------------

fn validate_unit(declarations: &[Declaration]) -> Result<(), ParseError> {
    let mut rule_names = HashSet::new();
    let mut action_names = HashSet::new();

    for declaration in declarations {
        match declaration {
            Declaration::Rule(rule) => {
                if !rule_names.insert(rule.name.clone()) {
                    return Err(ParseError::Semantic {
                        message: format!("duplicate rule '{}'", rule.name),
                    });
                }
                validate_trigger(&rule.trigger)?;
                let mut scope = Vec::new();
                validate_for(&rule.body, &mut scope)?;
            }
            Declaration::Action(action) => {
                if !action_names.insert(action.qualified_name()) {
                    return Err(ParseError::Semantic {
                        message: format!("duplicate action '{}'", action.qualified_name()),
                    });
                }
                let mut scope: Vec<String> = vec!["this".to_string()];
                scope.extend(action.parameters.iter().map(|p| p.name.clone()));
                for precondition in &action.preconditions {
                    validate_expr(&precondition.condition, &scope)?;
                }
                for statement in &action.effect {
                    validate_stmt(statement, &mut scope)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_trigger(trigger: &Trigger) -> Result<(), ParseError> {
    match (trigger.kind, trigger.property.is_some()) {
        (TriggerKind::Update, false) => Err(ParseError::Semantic {
            message: format!(
                "UPDATE trigger on '{}' requires a property",
                trigger.entity_type
            ),
        }),
        (TriggerKind::Update, true) => Ok(()),
        (kind, true) => Err(ParseError::Semantic {
            message: format!(
                "{kind} trigger on '{}' must not name a property",
                trigger.entity_type
            ),
        }),
        (_, false) => Ok(()),
    }
}

fn validate_for(clause: &ForClause, scope: &mut Vec<String>) -> Result<(), ParseError> {
    if scope.iter().any(|v| v == &clause.variable) {
        return Err(ParseError::Semantic {
            message: format!("variable '{}' is already bound", clause.variable),
        });
    }
    scope.push(clause.variable.clone());
    if let Some(guard) = &clause.guard {
        validate_expr(guard, scope)?;
    }
    for statement in &clause.statements {
        validate_stmt(statement, scope)?;
    }
    scope.pop();
    Ok(())
}

fn validate_stmt(stmt: &Stmt, scope: &mut Vec<String>) -> Result<(), ParseError> {
    match stmt {
        Stmt::Set { target, value } => {
            if target.property().is_none() {
                return Err(ParseError::Semantic {
                    message: format!("SET target '{target}' must name a property"),
                });
            }
            require_bound(target.head(), scope)?;
            validate_expr(value, scope)
        }
        Stmt::Trigger { target, args, .. } => {
            require_bound(target, scope)?;
            if let Some(args) = args {
                for value in args.values() {
                    validate_expr(value, scope)?;
                }
            }
            Ok(())
        }
        Stmt::For(clause) => validate_for(clause, scope),
    }
}

fn validate_expr(expr: &Expr, scope: &[String]) -> Result<(), ParseError> {
    match expr {
        Expr::Literal(_) | Expr::Changed { .. } => Ok(()),
        Expr::Path(path) => require_bound(path.head(), scope),
        Expr::Compare { left, right, .. } | Expr::Arith { left, right, .. } => {
            validate_expr(left, scope)?;
            validate_expr(right, scope)
        }
        Expr::In { value, .. } | Expr::IsNull { value, .. } | Expr::Matches { value, .. } => {
            validate_expr(value, scope)
        }
        Expr::And(left, right) | Expr::Or(left, right) => {
            validate_expr(left, scope)?;
            validate_expr(right, scope)
        }
        Expr::Not(inner) => validate_expr(inner, scope),
        Expr::Call { args, .. } => {
            for arg in args {
                validate_expr(arg, scope)?;
            }
            Ok(())
        }
        Expr::Exists { left, right, filter, .. } => {
            require_bound(left, scope)?;
            require_bound(right, scope)?;
            if let Some(filter) = filter {
                validate_expr(filter, scope)?;
            }
            Ok(())
        }
    }
}

fn require_bound(name: &str, scope: &[String]) -> Result<(), ParseError> {
    if scope.iter().any(|v| v == name) {
        Ok(())
    } else {
        Err(ParseError::Semantic {
            message: format!("variable '{name}' is not bound by an enclosing FOR"),
        })
    }
}
