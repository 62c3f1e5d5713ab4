//! Join-order enumeration
//!
//! Extracts a join graph from the input plan and searches for a cheaper
//! join order: exhaustively via bitmask dynamic programming for small
//! problems, by greedy construction heuristics for larger ones. Physical
//! operator alternatives are generated for every candidate before costing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::stats::join_edge_selectivity;
use crate::catalog::Catalog;
use crate::cost::{CostModel, SimpleCostModel, DEFAULT_TABLE_ROWS};
use crate::error::{Error, Result};
use crate::plan::{
    AggregateAlgorithm, BuildSide, Expr, JoinAlgorithm, JoinCondition, JoinType, Operator,
    PhysicalHint, PlanNode, ScanStrategy, SortAlgorithm,
};

/// Largest join-graph size handled by the bitmask DP
const DP_TABLE_LIMIT: usize = 4;

/// Hard bound on the DP bitmask width
const DP_MASK_LIMIT: usize = 16;

/// Search strategy chosen by the enumerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationStrategy {
    SingleTable,
    DynamicProgramming,
    Greedy,
}

impl fmt::Display for EnumerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnumerationStrategy::SingleTable => "single_table",
            EnumerationStrategy::DynamicProgramming => "dynamic_programming",
            EnumerationStrategy::Greedy => "greedy",
        };
        f.write_str(name)
    }
}

/// Counters over one enumeration call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PruningStatistics {
    pub plans_generated: usize,
    pub plans_pruned: usize,
    pub plans_evaluated: usize,
}

/// Outcome of one enumeration call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationResult {
    pub best_plan: PlanNode,
    pub all_plans: Vec<PlanNode>,
    pub plan_count: usize,
    pub best_cost: f64,
    #[serde(rename = "enum_strategy")]
    pub strategy: EnumerationStrategy,
    #[serde(rename = "search_space_size")]
    pub search_space: usize,
    pub pruning_stats: PruningStatistics,
}

/// One table in the join graph
#[derive(Debug, Clone)]
struct TableInfo {
    name: String,
    cardinality: i64,
}

/// One join predicate connecting two tables
#[derive(Debug, Clone)]
struct JoinEdge {
    left: String,
    right: String,
    selectivity: f64,
    join_type: JoinType,
    condition: JoinCondition,
}

/// Undirected multigraph of tables and join predicates
#[derive(Debug, Clone)]
struct JoinGraph {
    tables: Vec<TableInfo>,
    edges: Vec<JoinEdge>,
}

impl JoinGraph {
    fn degree(&self, table: &str) -> usize {
        self.edges
            .iter()
            .filter(|e| e.left == table || e.right == table)
            .count()
    }

    fn average_selectivity(&self, table: &str) -> f64 {
        let touching: Vec<f64> = self
            .edges
            .iter()
            .filter(|e| e.left == table || e.right == table)
            .map(|e| e.selectivity)
            .collect();
        if touching.is_empty() {
            0.5
        } else {
            touching.iter().sum::<f64>() / touching.len() as f64
        }
    }

    /// First edge connecting the accumulated table set to `table`
    fn edge_for(&self, accumulated: &HashSet<String>, table: &str) -> Option<&JoinEdge> {
        self.edges.iter().find(|e| {
            (e.left == table && accumulated.contains(&e.right))
                || (e.right == table && accumulated.contains(&e.left))
        })
    }
}

/// Join-order and physical-alternative enumerator
pub struct PlanEnumerator {
    catalog: Arc<Catalog>,
    cost_model: SimpleCostModel,
    max_plans: usize,
}

impl PlanEnumerator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            cost_model: SimpleCostModel::new(),
            max_plans: crate::config::DEFAULT_MAX_QUERY_PLANS,
        }
    }

    /// Override the cap on plans costed per call
    #[must_use]
    pub fn with_max_plans(mut self, max_plans: usize) -> Self {
        self.max_plans = max_plans;
        self
    }

    /// Enumerate alternatives for a plan and pick the cheapest
    pub fn enumerate(&self, plan: &PlanNode) -> Result<EnumerationResult> {
        let tables = plan.scan_tables();
        let mut stats = PruningStatistics::default();

        if tables.len() <= 1 {
            let mut candidates = vec![plan.clone()];
            candidates.extend(self.physical_alternatives(plan));
            let candidates = dedup_by_signature_with_hints(candidates);
            return self.select_best(candidates, EnumerationStrategy::SingleTable, stats);
        }

        let graph = self.build_join_graph(plan, &tables);

        if tables.len() <= DP_TABLE_LIMIT {
            debug!(tables = tables.len(), "enumerating join orders with bitmask DP");
            let (full_cover, near_complete) = self.dp_join_orders(&graph, &mut stats)?;
            let Some(best_order) = full_cover else {
                return Err(Error::Internal(
                    "join graph has no edge covering every table".to_string(),
                ));
            };

            // Only full-cover plans compete; near-complete DP entries ride
            // along in all_plans for explanation
            let mut candidates = vec![best_order.clone()];
            candidates.extend(self.physical_alternatives(&best_order));
            let candidates = dedup_by_signature_with_hints(candidates);

            let mut result =
                self.select_best(candidates, EnumerationStrategy::DynamicProgramming, stats)?;
            result.all_plans.extend(near_complete);
            result.plan_count = result.all_plans.len();
            result.search_space = result.all_plans.len();
            Ok(result)
        } else {
            debug!(tables = tables.len(), "enumerating join orders greedily");
            let orders = self.greedy_join_orders(&graph);
            let mut all = Vec::new();
            for order in &orders {
                all.push(order.clone());
                all.extend(self.physical_alternatives(order));
            }
            let all = dedup_by_signature_with_hints(all);
            self.select_best(all, EnumerationStrategy::Greedy, stats)
        }
    }

    // ============ Join graph ============

    fn build_join_graph(&self, plan: &PlanNode, tables: &[String]) -> JoinGraph {
        let table_infos = tables
            .iter()
            .map(|name| TableInfo {
                name: name.clone(),
                cardinality: self.table_cardinality(name),
            })
            .collect();

        let mut edges = Vec::new();
        collect_join_edges(plan, &mut edges);

        JoinGraph {
            tables: table_infos,
            edges,
        }
    }

    fn table_cardinality(&self, table: &str) -> i64 {
        match self.catalog.get_table(table) {
            Ok(schema) => schema.row_count,
            Err(_) => DEFAULT_TABLE_ROWS,
        }
    }

    // ============ Bitmask DP ============

    /// Cheapest join order per table subset, bottom-up by subset size.
    /// Returns the full-cover plan and the near-complete entries (subsets
    /// of size >= n-1) kept for explanation.
    fn dp_join_orders(
        &self,
        graph: &JoinGraph,
        stats: &mut PruningStatistics,
    ) -> Result<(Option<PlanNode>, Vec<PlanNode>)> {
        let n = graph.tables.len();
        if n > DP_MASK_LIMIT {
            return Err(Error::Internal(format!(
                "join graph of {} tables exceeds the DP mask width",
                n
            )));
        }

        let full_mask: usize = (1 << n) - 1;
        let mut dp: Vec<Option<PlanNode>> = vec![None; 1 << n];

        for (i, table) in graph.tables.iter().enumerate() {
            dp[1 << i] = Some(PlanNode::scan(table.name.clone(), None));
        }

        // Subsets by ascending size; each split via subset-of-subset
        // iteration over proper bipartitions
        for size in 2..=n {
            for mask in 1..=full_mask {
                if mask.count_ones() as usize != size {
                    continue;
                }
                if let Some(best) = self.best_join_for_subset(mask, &dp, graph, stats) {
                    dp[mask] = Some(best);
                }
            }
        }

        let full_cover = dp[full_mask].clone();

        let mut near_complete = Vec::new();
        if full_cover.is_some() {
            for (mask, entry) in dp.iter().enumerate() {
                if mask != full_mask && mask.count_ones() as usize >= n - 1 {
                    if let Some(plan) = entry {
                        near_complete.push(plan.clone());
                    }
                }
            }
        }

        Ok((full_cover, dedup_by_signature(near_complete)))
    }

    fn best_join_for_subset(
        &self,
        mask: usize,
        dp: &[Option<PlanNode>],
        graph: &JoinGraph,
        stats: &mut PruningStatistics,
    ) -> Option<PlanNode> {
        let mut best: Option<(PlanNode, f64)> = None;

        let mut left = (mask - 1) & mask;
        while left > 0 {
            let right = mask ^ left;

            if let (Some(left_plan), Some(right_plan)) = (&dp[left], &dp[right]) {
                if let Some(edge) = find_join_edge(left, right, graph) {
                    let candidate = PlanNode::join(
                        left_plan.clone(),
                        right_plan.clone(),
                        edge.join_type,
                        Some(edge.condition.clone()),
                    );
                    self.consider(candidate, &mut best, stats);

                    let mirrored = PlanNode::join(
                        right_plan.clone(),
                        left_plan.clone(),
                        edge.join_type,
                        Some(edge.condition.swapped()),
                    );
                    self.consider(mirrored, &mut best, stats);
                }
            }

            left = (left - 1) & mask;
        }

        best.map(|(plan, _)| plan)
    }

    /// Cost a DP candidate against the running best; candidates whose cost
    /// estimation fails are skipped
    fn consider(
        &self,
        candidate: PlanNode,
        best: &mut Option<(PlanNode, f64)>,
        stats: &mut PruningStatistics,
    ) {
        stats.plans_generated += 1;

        let Ok(cost) = self.cost_model.estimate_cost(&candidate, &self.catalog) else {
            return;
        };
        stats.plans_evaluated += 1;

        match best {
            Some((_, best_cost)) if cost.total_cost >= *best_cost => {}
            _ => *best = Some((candidate, cost.total_cost)),
        }
    }

    // ============ Greedy heuristics ============

    /// The three construction heuristics; each yields one candidate order
    fn greedy_join_orders(&self, graph: &JoinGraph) -> Vec<PlanNode> {
        let mut orders = Vec::new();
        if let Some(plan) = self.cardinality_order(graph) {
            orders.push(plan);
        }
        if let Some(plan) = self.selectivity_order(graph) {
            orders.push(plan);
        }
        if let Some(plan) = self.mixed_heuristic_order(graph) {
            orders.push(plan);
        }
        orders
    }

    /// Left-deep chain over tables sorted by ascending cardinality
    fn cardinality_order(&self, graph: &JoinGraph) -> Option<PlanNode> {
        if graph.tables.len() < 2 {
            return None;
        }

        let mut tables = graph.tables.clone();
        tables.sort_by_key(|t| t.cardinality);

        self.left_deep_chain(graph, tables.iter().map(|t| t.name.as_str()))
    }

    /// Graft edges in ascending selectivity order, then append leftovers
    fn selectivity_order(&self, graph: &JoinGraph) -> Option<PlanNode> {
        if graph.tables.len() < 2 {
            return None;
        }

        let mut edges = graph.edges.clone();
        edges.sort_by(|a, b| a.selectivity.total_cmp(&b.selectivity));

        let mut used: HashSet<String> = HashSet::new();
        let mut current: Option<PlanNode> = None;

        for edge in &edges {
            let pair_join = |left: PlanNode| {
                PlanNode::join(
                    left,
                    PlanNode::scan(edge.right.clone(), None),
                    edge.join_type,
                    Some(edge.condition.clone()),
                )
            };

            current = match current.take() {
                None => Some(pair_join(PlanNode::scan(edge.left.clone(), None))),
                Some(plan) => {
                    let has_left = plan.contains_table(&edge.left);
                    let has_right = plan.contains_table(&edge.right);

                    if has_left && !has_right {
                        Some(PlanNode::join(
                            plan,
                            PlanNode::scan(edge.right.clone(), None),
                            edge.join_type,
                            Some(edge.condition.clone()),
                        ))
                    } else if has_right && !has_left {
                        Some(PlanNode::join(
                            plan,
                            PlanNode::scan(edge.left.clone(), None),
                            edge.join_type,
                            Some(edge.condition.clone()),
                        ))
                    } else if !has_left && !has_right {
                        // Neither endpoint joined yet: bring in the pair and
                        // attach it with a default condition
                        let pair = pair_join(PlanNode::scan(edge.left.clone(), None));
                        Some(PlanNode::join(
                            plan,
                            pair,
                            JoinType::Inner,
                            Some(default_join_condition(Some(&edge.left), &edge.right)),
                        ))
                    } else {
                        Some(plan)
                    }
                }
            };
            used.insert(edge.left.clone());
            used.insert(edge.right.clone());
        }

        // Tables no selected edge covered
        for table in &graph.tables {
            if !used.contains(&table.name) {
                let scan = PlanNode::scan(table.name.clone(), None);
                current = Some(match current.take() {
                    None => scan,
                    Some(plan) => PlanNode::join(
                        plan,
                        scan,
                        JoinType::Inner,
                        Some(default_join_condition(None, &table.name)),
                    ),
                });
            }
        }

        current
    }

    /// Score tables by smallness, connectedness and edge selectivity, then
    /// chain in descending score
    fn mixed_heuristic_order(&self, graph: &JoinGraph) -> Option<PlanNode> {
        if graph.tables.len() < 2 {
            return None;
        }

        let mut scored: Vec<(f64, &TableInfo)> = graph
            .tables
            .iter()
            .map(|table| {
                let mut score = 0.0;
                if table.cardinality > 0 {
                    score += 1_000_000.0 / table.cardinality as f64;
                }
                score += (graph.degree(&table.name) * 100) as f64;
                score += (1.0 - graph.average_selectivity(&table.name)) * 500.0;
                (score, table)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        self.left_deep_chain(graph, scored.iter().map(|(_, t)| t.name.as_str()))
    }

    /// Build a left-deep chain over tables in the given order, joining each
    /// new table with a graph edge when one connects it to the accumulated
    /// set, else a default equi-condition
    fn left_deep_chain<'a>(
        &self,
        graph: &JoinGraph,
        order: impl Iterator<Item = &'a str>,
    ) -> Option<PlanNode> {
        let mut accumulated: HashSet<String> = HashSet::new();
        let mut current: Option<PlanNode> = None;

        for table in order {
            let scan = PlanNode::scan(table.to_string(), None);
            current = Some(match current.take() {
                None => scan,
                Some(plan) => {
                    let condition = graph
                        .edge_for(&accumulated, table)
                        .map(|edge| edge.condition.clone())
                        .unwrap_or_else(|| default_join_condition(None, table));
                    PlanNode::join(plan, scan, JoinType::Inner, Some(condition))
                }
            });
            accumulated.insert(table.to_string());
        }

        current
    }

    // ============ Physical alternatives ============

    /// Stamped physical variants of a plan: algorithm choices at this node
    /// combined with alternatives for each child subtree
    fn physical_alternatives(&self, plan: &PlanNode) -> Vec<PlanNode> {
        let mut alternatives = Vec::new();

        let hints: Vec<PhysicalHint> = match &plan.op {
            Operator::Join { .. } => vec![
                PhysicalHint::Join(JoinAlgorithm::Hash {
                    build_side: BuildSide::Left,
                }),
                PhysicalHint::Join(JoinAlgorithm::SortMerge),
                PhysicalHint::Join(JoinAlgorithm::NestedLoop),
            ],
            Operator::Aggregate { .. } => vec![
                PhysicalHint::Aggregate(AggregateAlgorithm::Hash),
                PhysicalHint::Aggregate(AggregateAlgorithm::Sort),
            ],
            Operator::Sort { .. } => vec![
                PhysicalHint::Sort(SortAlgorithm::Quicksort),
                PhysicalHint::Sort(SortAlgorithm::External),
            ],
            Operator::Scan { table, .. } => {
                let mut hints = vec![PhysicalHint::Scan(ScanStrategy::Sequential)];
                if let Ok(schema) = self.catalog.get_table(table) {
                    if let Some(index) = schema.indexes.first() {
                        hints.push(PhysicalHint::Scan(ScanStrategy::Index {
                            index_name: index.name.clone(),
                        }));
                    }
                }
                hints
            }
            _ => Vec::new(),
        };

        for hint in hints {
            let mut alternative = plan.clone();
            alternative.physical = Some(hint);
            alternatives.push(alternative);
        }

        // Graft child alternatives into copies of every variant so far
        for (i, child) in plan.children().into_iter().enumerate() {
            if alternatives.len() >= self.max_plans {
                break;
            }
            let mut base: Vec<PlanNode> = vec![plan.clone()];
            base.extend(alternatives.iter().cloned());

            for child_alt in self.physical_alternatives(child) {
                for candidate in &base {
                    if alternatives.len() >= self.max_plans {
                        break;
                    }
                    let mut grafted = candidate.clone();
                    if let Some(slot) = grafted.children_mut().into_iter().nth(i) {
                        *slot = child_alt.clone();
                    }
                    alternatives.push(grafted);
                }
            }
        }

        dedup_by_signature_with_hints(alternatives)
    }

    // ============ Selection ============

    fn select_best(
        &self,
        candidates: Vec<PlanNode>,
        strategy: EnumerationStrategy,
        mut stats: PruningStatistics,
    ) -> Result<EnumerationResult> {
        if candidates.is_empty() {
            return Err(Error::Internal("no plans to evaluate".to_string()));
        }

        stats.plans_generated += candidates.len();

        // The configured cap bounds this selection stage; candidates beyond
        // it are discarded without costing
        let mut best: Option<(usize, f64)> = None;
        let mut evaluated_here = 0usize;
        for (i, candidate) in candidates.iter().enumerate() {
            if evaluated_here >= self.max_plans {
                stats.plans_pruned += candidates.len() - i;
                break;
            }

            let Ok(cost) = self.cost_model.estimate_cost(candidate, &self.catalog) else {
                continue;
            };
            evaluated_here += 1;
            stats.plans_evaluated += 1;

            match best {
                Some((_, best_cost)) if cost.total_cost >= best_cost => {}
                _ => best = Some((i, cost.total_cost)),
            }
        }

        let Some((best_index, best_cost)) = best else {
            return Err(Error::Internal("no valid plan found".to_string()));
        };

        debug!(
            strategy = %strategy,
            candidates = candidates.len(),
            evaluated = stats.plans_evaluated,
            best_cost,
            "enumeration finished"
        );

        let best_plan = candidates[best_index].clone();
        let plan_count = candidates.len();
        Ok(EnumerationResult {
            best_plan,
            search_space: plan_count,
            plan_count,
            all_plans: candidates,
            best_cost,
            strategy,
            pruning_stats: stats,
        })
    }
}

/// Default equi-condition used when no join edge connects two inputs
fn default_join_condition(left_table: Option<&str>, right_table: &str) -> JoinCondition {
    let left = match left_table {
        Some(table) => Expr::qualified_column(table, "id"),
        None => Expr::column(None, "id"),
    };
    JoinCondition::new(
        left,
        crate::plan::BinaryOp::Eq,
        Expr::qualified_column(right_table, "id"),
    )
}

/// Collect a join edge from every Join whose condition sides reference two
/// distinct table qualifiers
fn collect_join_edges(plan: &PlanNode, edges: &mut Vec<JoinEdge>) {
    if let Operator::Join {
        join_type,
        condition: Some(condition),
        ..
    } = &plan.op
    {
        let left = condition.left.column_qualifier();
        let right = condition.right.column_qualifier();
        if let (Some(left), Some(right)) = (left, right) {
            if condition.op.is_comparison() && left != right {
                edges.push(JoinEdge {
                    left: left.to_string(),
                    right: right.to_string(),
                    selectivity: join_edge_selectivity(condition.op),
                    join_type: *join_type,
                    condition: condition.clone(),
                });
            }
        }
    }

    for child in plan.children() {
        collect_join_edges(child, edges);
    }
}

/// Find an edge connecting the two subsets encoded as bitmasks
fn find_join_edge<'a>(left_mask: usize, right_mask: usize, graph: &'a JoinGraph) -> Option<&'a JoinEdge> {
    let in_mask = |mask: usize, table: &str| {
        graph
            .tables
            .iter()
            .enumerate()
            .any(|(i, t)| mask & (1 << i) != 0 && t.name == table)
    };

    graph.edges.iter().find(|edge| {
        (in_mask(left_mask, &edge.left) && in_mask(right_mask, &edge.right))
            || (in_mask(left_mask, &edge.right) && in_mask(right_mask, &edge.left))
    })
}

/// Drop structural duplicates, keeping first occurrences
fn dedup_by_signature(plans: Vec<PlanNode>) -> Vec<PlanNode> {
    let mut seen = HashSet::new();
    plans
        .into_iter()
        .filter(|plan| seen.insert(plan.signature()))
        .collect()
}

/// Dedup that also distinguishes physical hints, so stamped variants of one
/// shape survive
fn dedup_by_signature_with_hints(plans: Vec<PlanNode>) -> Vec<PlanNode> {
    let mut seen = HashSet::new();
    plans
        .into_iter()
        .filter(|plan| seen.insert(hinted_signature(plan)))
        .collect()
}

fn hinted_signature(plan: &PlanNode) -> String {
    let mut sig = String::from(plan.op.name());
    if let Operator::Scan { table, .. } = &plan.op {
        sig.push(':');
        sig.push_str(table);
    }
    if let Some(hint) = &plan.physical {
        sig.push('@');
        sig.push_str(match hint {
            PhysicalHint::Join(alg) => alg.as_str(),
            PhysicalHint::Aggregate(alg) => alg.as_str(),
            PhysicalHint::Sort(alg) => alg.as_str(),
            PhysicalHint::Scan(strategy) => strategy.as_str(),
        });
    }
    for child in plan.children() {
        sig.push('(');
        sig.push_str(&hinted_signature(child));
        sig.push(')');
    }
    sig
}
