//! Indented pretty-printer for plan trees
//!
//! Each node renders on one line with its payload summary; row and cost
//! annotations are appended when present.

use std::fmt;

use crate::plan::{Operator, PlanNode};

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with_indent(f, 0)
    }
}

impl PlanNode {
    fn fmt_with_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{}{}", "  ".repeat(indent), self.op.name())?;

        match &self.op {
            Operator::Scan { table, alias } => {
                write!(f, " [table={}", table)?;
                if let Some(alias) = alias {
                    write!(f, " as {}", alias)?;
                }
                write!(f, "]")?;
            }
            Operator::Filter { predicate, .. } => {
                write!(f, " [predicate={}]", predicate)?;
            }
            Operator::Project { columns, .. } => {
                write!(f, " [columns={}]", columns.len())?;
            }
            Operator::Join {
                join_type,
                condition,
                ..
            } => {
                write!(f, " [type={}", join_type)?;
                if let Some(cond) = condition {
                    write!(f, ", on={}", cond)?;
                }
                write!(f, "]")?;
            }
            Operator::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                write!(
                    f,
                    " [groupBy={}, aggregates={}]",
                    group_by.len(),
                    aggregates.len()
                )?;
            }
            Operator::Sort { order_by, .. } => {
                write!(f, " [orderBy={}]", order_by.len())?;
            }
            Operator::Limit { limit, offset, .. } => {
                if let Some(limit) = limit {
                    write!(f, " [limit={}", limit)?;
                    if let Some(offset) = offset {
                        write!(f, ", offset={}", offset)?;
                    }
                    write!(f, "]")?;
                } else if let Some(offset) = offset {
                    write!(f, " [offset={}]", offset)?;
                }
            }
            Operator::Union { .. } | Operator::Subquery { .. } => {}
        }

        if self.estimated_rows.is_some() || self.estimated_cost.is_some() {
            write!(f, " [")?;
            if let Some(rows) = self.estimated_rows {
                write!(f, "rows={}", rows)?;
            }
            if let Some(cost) = self.estimated_cost {
                if self.estimated_rows.is_some() {
                    write!(f, ", ")?;
                }
                write!(f, "cost={:.2}", cost)?;
            }
            write!(f, "]")?;
        }

        for child in self.children() {
            writeln!(f)?;
            child.fmt_with_indent(f, indent + 1)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::plan::{BinaryOp, Expr, JoinCondition, JoinType, PlanNode, Predicate, Value};

    #[test]
    fn test_display_scan_with_alias() {
        let plan = PlanNode::scan("users", Some("u".to_string()));
        assert_eq!(plan.to_string(), "scan [table=users as u]");
    }

    #[test]
    fn test_display_nested_with_annotations() {
        let mut scan = PlanNode::scan("users", None);
        scan.estimated_rows = Some(5000);
        scan.estimated_cost = Some(100.0);

        let filter = PlanNode::filter(
            scan,
            Predicate::new(Expr::binary(
                BinaryOp::Gt,
                Expr::column(None, "age"),
                Expr::literal(Value::Integer(30)),
            )),
        );

        let rendered = filter.to_string();
        assert!(rendered.starts_with("filter [predicate=(age > 30)]"));
        assert!(rendered.contains("\n  scan [table=users] [rows=5000, cost=100.00]"));
    }

    #[test]
    fn test_display_join() {
        let plan = PlanNode::join(
            PlanNode::scan("a", None),
            PlanNode::scan("b", None),
            JoinType::Inner,
            Some(JoinCondition::equi("a", "id", "b", "a_id")),
        );
        let rendered = plan.to_string();
        assert!(rendered.starts_with("join [type=inner, on=a.id = b.a_id]"));
    }
}
