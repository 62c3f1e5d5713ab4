//! Visitor protocol for plan trees
//!
//! One hook per operator variant, all defaulting to no-ops. Traversal is
//! pre-order: the node's hook runs before its children are walked.

use crate::error::Result;
use crate::plan::{Operator, PlanNode};

/// Visitor over plan nodes
///
/// A hook returning an error stops the walk and propagates the error.
pub trait PlanVisitor {
    fn visit_scan(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_filter(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_project(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_join(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_aggregate(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_sort(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_limit(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_union(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }

    fn visit_subquery(&mut self, _node: &PlanNode) -> Result<()> {
        Ok(())
    }
}

impl PlanNode {
    /// Walk this subtree pre-order, dispatching to the visitor hooks
    pub fn accept<V: PlanVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        match &self.op {
            Operator::Scan { .. } => visitor.visit_scan(self)?,
            Operator::Filter { .. } => visitor.visit_filter(self)?,
            Operator::Project { .. } => visitor.visit_project(self)?,
            Operator::Join { .. } => visitor.visit_join(self)?,
            Operator::Aggregate { .. } => visitor.visit_aggregate(self)?,
            Operator::Sort { .. } => visitor.visit_sort(self)?,
            Operator::Limit { .. } => visitor.visit_limit(self)?,
            Operator::Union { .. } => visitor.visit_union(self)?,
            Operator::Subquery { .. } => visitor.visit_subquery(self)?,
        }

        for child in self.children() {
            child.accept(visitor)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{JoinCondition, JoinType};

    #[derive(Default)]
    struct CountingVisitor {
        scans: usize,
        joins: usize,
        order: Vec<&'static str>,
    }

    impl PlanVisitor for CountingVisitor {
        fn visit_scan(&mut self, _node: &PlanNode) -> Result<()> {
            self.scans += 1;
            self.order.push("scan");
            Ok(())
        }

        fn visit_join(&mut self, _node: &PlanNode) -> Result<()> {
            self.joins += 1;
            self.order.push("join");
            Ok(())
        }
    }

    #[test]
    fn test_preorder_walk() {
        let plan = PlanNode::join(
            PlanNode::scan("a", None),
            PlanNode::scan("b", None),
            JoinType::Inner,
            Some(JoinCondition::equi("a", "id", "b", "id")),
        );

        let mut visitor = CountingVisitor::default();
        plan.accept(&mut visitor).unwrap();

        assert_eq!(visitor.scans, 2);
        assert_eq!(visitor.joins, 1);
        assert_eq!(visitor.order, vec!["join", "scan", "scan"]);
    }

    struct FailingVisitor;

    impl PlanVisitor for FailingVisitor {
        fn visit_scan(&mut self, node: &PlanNode) -> Result<()> {
            Err(crate::Error::Internal(format!("stopped at {}", node.id)))
        }
    }

    #[test]
    fn test_error_stops_walk() {
        let plan = PlanNode::scan("a", None);
        assert!(plan.accept(&mut FailingVisitor).is_err());
    }
}
