//! Expression types for the plan algebra
//!
//! Expressions are pure values; identity is structural. Predicates wrap a
//! boolean expression, join conditions pair two expressions with a
//! comparison operator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::DataType;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
}

impl BinaryOp {
    /// SQL-style symbol for display
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
        }
    }

    /// Check if this is a comparison operator
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// Algebraic expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    /// Column reference, optionally qualified with a table name or alias
    Column {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualifier: Option<String>,
        name: String,
    },
    /// Literal value with an optional declared type
    Literal {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_type: Option<DataType>,
    },
    /// Binary operation
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call
    Function { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Column reference
    pub fn column(qualifier: impl Into<Option<String>>, name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: qualifier.into(),
            name: name.into(),
        }
    }

    /// Qualified column reference from string slices
    pub fn qualified_column(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Literal with no declared type
    pub fn literal(value: Value) -> Self {
        Expr::Literal {
            value,
            data_type: None,
        }
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Function call
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// The operator at the root of this expression, if it is a binary op
    pub fn top_operator(&self) -> Option<BinaryOp> {
        match self {
            Expr::BinaryOp { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Collect every column reference in this expression, in order
    pub fn referenced_columns(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<ColumnRef>) {
        match self {
            Expr::Column { qualifier, name } => out.push(ColumnRef {
                table: qualifier.clone(),
                name: name.clone(),
                alias: None,
            }),
            Expr::Literal { .. } => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Table qualifier when this expression is a qualified column
    pub fn column_qualifier(&self) -> Option<&str> {
        match self {
            Expr::Column {
                qualifier: Some(q), ..
            } => Some(q.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column {
                qualifier: Some(q),
                name,
            } => write!(f, "{}.{}", q, name),
            Expr::Column {
                qualifier: None,
                name,
            } => write!(f, "{}", name),
            Expr::Literal { value, .. } => write!(f, "{}", value),
            Expr::BinaryOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Projection or grouping column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table name or alias qualifying the column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnRef {
    /// Unqualified column
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
            alias: None,
        }
    }

    /// Qualified column
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            alias: None,
        }
    }

    /// Rename the output column
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The `*` wildcard projection
    pub fn wildcard() -> Self {
        Self::new("*")
    }

    /// Check if this is the `*` wildcard
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

/// Boolean-valued expression wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub expression: Expr,
}

impl Predicate {
    pub fn new(expression: Expr) -> Self {
        Self { expression }
    }

    /// Operator at the root of the wrapped expression
    pub fn top_operator(&self) -> Option<BinaryOp> {
        self.expression.top_operator()
    }

    /// Columns the predicate references
    pub fn referenced_columns(&self) -> Vec<ColumnRef> {
        self.expression.referenced_columns()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Join condition: `left op right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left: Expr,
    pub right: Expr,
    #[serde(rename = "operator")]
    pub op: BinaryOp,
}

impl JoinCondition {
    pub fn new(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Self { left, right, op }
    }

    /// Equi-join between two qualified columns
    pub fn equi(
        left_table: impl Into<String>,
        left_column: impl Into<String>,
        right_table: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            left: Expr::qualified_column(left_table, left_column),
            right: Expr::qualified_column(right_table, right_column),
            op: BinaryOp::Eq,
        }
    }

    /// The condition with its sides swapped
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            left: self.right.clone(),
            right: self.left.clone(),
            op: self.op,
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// Aggregate function kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
        };
        f.write_str(name)
    }
}

/// Aggregate function application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    #[serde(rename = "type")]
    pub kind: AggregateKind,
    /// Argument column; absent for `count(*)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggregateExpr {
    pub fn new(kind: AggregateKind, column: Option<Expr>) -> Self {
        Self {
            kind,
            column,
            alias: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Sort key: expression plus direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expression: Expr,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(expression: Expr) -> Self {
        Self {
            expression,
            ascending: true,
        }
    }

    pub fn desc(expression: Expr) -> Self {
        Self {
            expression,
            ascending: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let expr = Expr::binary(
            BinaryOp::Gt,
            Expr::qualified_column("users", "age"),
            Expr::literal(Value::Integer(30)),
        );
        assert_eq!(expr.to_string(), "(users.age > 30)");
    }

    #[test]
    fn test_referenced_columns() {
        let expr = Expr::binary(
            BinaryOp::And,
            Expr::binary(
                BinaryOp::Eq,
                Expr::qualified_column("a", "id"),
                Expr::qualified_column("b", "a_id"),
            ),
            Expr::binary(
                BinaryOp::Lt,
                Expr::column(None, "total"),
                Expr::literal(Value::Float(99.5)),
            ),
        );
        let cols = expr.referenced_columns();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].table.as_deref(), Some("a"));
        assert_eq!(cols[2].name, "total");
        assert_eq!(cols[2].table, None);
    }

    #[test]
    fn test_join_condition_swapped() {
        let cond = JoinCondition::equi("orders", "user_id", "users", "id");
        let swapped = cond.swapped();
        assert_eq!(swapped.left, cond.right);
        assert_eq!(swapped.right, cond.left);
        assert_eq!(swapped.op, BinaryOp::Eq);
    }

    #[test]
    fn test_wildcard() {
        assert!(ColumnRef::wildcard().is_wildcard());
        assert!(!ColumnRef::new("name").is_wildcard());
    }
}
