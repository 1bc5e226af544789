//! Query planner for optimizing query execution
//!
//! Creates execution plans with cost estimation and index selection

use super::ast::{Filter, Query};
use super::index_selector::{IndexChoice, IndexSelector};
use crate::index::IndexDefinition;

/// Query planner for creating optimized execution plans
pub struct QueryPlanner {
    index_selector: IndexSelector,
}

impl QueryPlanner {
    /// Create a planner that only knows about collection scans
    pub fn new() -> Self {
        Self {
            index_selector: IndexSelector::new(),
        }
    }

    /// Create a planner over the given index definitions
    pub fn with_indexes(indexes: Vec<IndexDefinition>) -> Self {
        Self {
            index_selector: IndexSelector::with_indexes(indexes),
        }
    }

    /// Mark indexes that hold array-valued keys
    pub fn with_multikey_indexes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_selector = self.index_selector.with_multikey(names);
        self
    }

    /// Create an execution plan for a query
    pub fn create_plan(&self, query: &Query) -> QueryPlan {
        let mut plan = QueryPlan::new();

        plan.execution_strategy = match self
            .index_selector
            .select_index(&query.filter, query.sort.as_ref())
        {
            Some(choice) => ExecutionStrategy::IndexScan(choice),
            None => ExecutionStrategy::CollectionScan,
        };

        plan.estimated_cost = self.estimate_cost(query, &plan);

        plan.needs_sort = query.sort.as_ref().map(|s| !s.is_empty()).unwrap_or(false);
        plan.needs_projection = query.projection.is_some();
        plan.has_skip = query.skip.unwrap_or(0) > 0;
        plan.has_limit = query.limit.unwrap_or(0) > 0;

        plan
    }

    /// Estimate the cost of executing a query
    fn estimate_cost(&self, query: &Query, plan: &QueryPlan) -> f64 {
        let uses_index = plan.index().is_some();
        let mut cost = if uses_index { 100.0 } else { 1000.0 };

        cost += self.estimate_filter_cost(&query.filter) * 10.0;

        if query.sort.is_some() {
            cost += if uses_index { 50.0 } else { 500.0 };
        }

        if query.projection.is_some() {
            cost += 10.0;
        }

        cost
    }

    /// Estimate the cost of a filter
    fn estimate_filter_cost(&self, filter: &Filter) -> f64 {
        match filter {
            Filter::Empty => 0.0,
            Filter::Eq { .. } => 1.0,
            Filter::Ne { .. } => 1.5,
            Filter::Gt { .. } | Filter::Gte { .. } | Filter::Lt { .. } | Filter::Lte { .. } => 2.0,
            Filter::In { values, .. } => values.len() as f64 * 0.5,
            Filter::Nin { values, .. } => values.len() as f64 * 0.7,
            Filter::Exists { .. } => 1.0,
            Filter::Regex { .. } => 10.0,
            Filter::And(filters) => filters.iter().map(|f| self.estimate_filter_cost(f)).sum(),
            Filter::Or(filters) | Filter::Nor(filters) => {
                filters.iter().map(|f| self.estimate_filter_cost(f)).sum::<f64>() * 1.5
            }
            Filter::Not(filter) => self.estimate_filter_cost(filter) * 1.2,
        }
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Query execution plan
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub execution_strategy: ExecutionStrategy,
    pub estimated_cost: f64,
    pub needs_sort: bool,
    pub needs_projection: bool,
    pub has_skip: bool,
    pub has_limit: bool,
}

impl QueryPlan {
    /// Create a new collection-scan plan
    pub fn new() -> Self {
        Self {
            execution_strategy: ExecutionStrategy::CollectionScan,
            estimated_cost: 0.0,
            needs_sort: false,
            needs_projection: false,
            has_skip: false,
            has_limit: false,
        }
    }

    /// Chosen index, if any
    pub fn index(&self) -> Option<&IndexChoice> {
        match &self.execution_strategy {
            ExecutionStrategy::IndexScan(choice) => Some(choice),
            ExecutionStrategy::CollectionScan => None,
        }
    }

    /// `COLLSCAN` or `IXSCAN { field: dir, ... }`
    pub fn summary(&self) -> String {
        match &self.execution_strategy {
            ExecutionStrategy::CollectionScan => "COLLSCAN".to_string(),
            ExecutionStrategy::IndexScan(choice) => format!("IXSCAN {}", choice.key),
        }
    }
}

impl Default for QueryPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution strategy
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStrategy {
    /// Scan the entire collection
    CollectionScan,
    /// Scan the chosen index, then fetch and filter
    IndexScan(IndexChoice),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKeySpec;
    use crate::query::ast::Sort;

    fn planner() -> QueryPlanner {
        QueryPlanner::with_indexes(vec![
            IndexDefinition::primary(),
            IndexDefinition::new(IndexKeySpec::new().asc("author").desc("published_year")),
        ])
    }

    #[test]
    fn test_create_plan_empty_query() {
        let plan = planner().create_plan(&Query::new());
        assert_eq!(plan.execution_strategy, ExecutionStrategy::CollectionScan);
        assert_eq!(plan.summary(), "COLLSCAN");
        assert!(!plan.needs_sort);
        assert!(!plan.needs_projection);
    }

    #[test]
    fn test_create_plan_with_index() {
        let query = Query::with_filter(Filter::eq("author", "George Orwell"));
        let plan = planner().create_plan(&query);
        assert_eq!(plan.index().map(|c| c.name.as_str()), Some("author_1_published_year_-1"));
        assert_eq!(plan.summary(), "IXSCAN { author: 1, published_year: -1 }");
    }

    #[test]
    fn test_unindexed_field_scans_collection() {
        let query = Query::with_filter(Filter::eq("genre", "Fiction"));
        let plan = planner().create_plan(&query);
        assert!(plan.index().is_none());
        assert_eq!(QueryPlanner::new().create_plan(&query).summary(), "COLLSCAN");
    }

    #[test]
    fn test_create_plan_with_sort_skip_limit() {
        let query = Query::new().sort(Sort::new().asc("title")).skip(5).limit(0);
        let plan = planner().create_plan(&query);
        assert!(plan.needs_sort);
        assert!(plan.has_skip);
        assert!(!plan.has_limit);
    }

    #[test]
    fn test_estimate_filter_cost() {
        let planner = QueryPlanner::new();
        assert_eq!(planner.estimate_filter_cost(&Filter::eq("name", "John")), 1.0);
        assert_eq!(planner.estimate_filter_cost(&Filter::regex("email", ".*")), 10.0);

        let and_cost = planner.estimate_filter_cost(&Filter::and(vec![
            Filter::eq("name", "John"),
            Filter::gt("age", 18i32),
        ]));
        assert_eq!(and_cost, 3.0);
    }

    #[test]
    fn test_index_plan_is_cheaper() {
        let query = Query::with_filter(Filter::eq("author", "George Orwell"));
        let indexed = planner().create_plan(&query);
        let scanned = QueryPlanner::new().create_plan(&query);
        assert!(indexed.estimated_cost < scanned.estimated_cost);
    }
}
