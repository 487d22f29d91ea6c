//! Best effort cardinality estimation.
use serde::Deserialize;

use crate::config::PhysicalOptimizationConfig;
use crate::error::OptResult;
use crate::operator::LogicalOperator;
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, Plan};

/// Statistics of a data source.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Statistics {
    /// Total number of rows. This may be an estimated value.
    row_count: u64,
    avg_tuple_bytes: u64,
}

impl Statistics {
    pub fn new(row_count: u64, avg_tuple_bytes: u64) -> Self {
        Self {
            row_count,
            avg_tuple_bytes,
        }
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn avg_tuple_bytes(&self) -> u64 {
        self.avg_tuple_bytes
    }
}

/// Estimated size of an operator's output. `None` when nothing is known.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LogicalProperties {
    pub cardinality: Option<u64>,
    pub avg_tuple_bytes: Option<u64>,
}

impl LogicalProperties {
    pub fn new(cardinality: Option<u64>, avg_tuple_bytes: Option<u64>) -> Self {
        Self {
            cardinality,
            avg_tuple_bytes,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    fn with_cardinality(self, cardinality: Option<u64>) -> Self {
        Self {
            cardinality,
            ..self
        }
    }

    /// Frames needed to hold the whole output.
    pub fn frames(&self, config: &PhysicalOptimizationConfig) -> Option<u64> {
        let bytes = self.cardinality?.checked_mul(self.avg_tuple_bytes?)?;
        Some(config.frames_for(bytes))
    }
}

/// Estimates the output size of `node`, memoized in `ctx`.
pub fn estimate_logical_properties(
    plan: &Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
) -> OptResult<LogicalProperties> {
    if let Some(props) = ctx.logical_properties(node) {
        return Ok(*props);
    }

    let inputs = plan
        .inputs(node)
        .into_iter()
        .map(|input| estimate_logical_properties(plan, ctx, input))
        .collect::<OptResult<Vec<_>>>()?;
    let first = inputs.first().copied().unwrap_or_default();

    let props = match plan.operator(node) {
        LogicalOperator::EmptyTupleSource(_) => LogicalProperties::new(Some(1), Some(0)),
        LogicalOperator::DataSourceScan(scan) => ctx
            .metadata()
            .statistics(scan.data_source())
            .map(|stats| {
                LogicalProperties::new(Some(stats.row_count()), Some(stats.avg_tuple_bytes()))
            })
            .unwrap_or_default(),
        LogicalOperator::Select(_)
        | LogicalOperator::Assign(_)
        | LogicalOperator::Project(_)
        | LogicalOperator::Exchange(_)
        | LogicalOperator::Replicate(_)
        | LogicalOperator::RunningAggregate(_)
        | LogicalOperator::Subplan(_)
        | LogicalOperator::GroupBy(_)
        | LogicalOperator::Distinct(_)
        | LogicalOperator::Write(_)
        | LogicalOperator::InsertDelete(_)
        | LogicalOperator::Sink(_) => first,
        LogicalOperator::Order(order) => match order.top_k {
            Some(k) => first.with_cardinality(Some(min_known(first.cardinality, k as u64))),
            None => first,
        },
        LogicalOperator::Limit(limit) => {
            first.with_cardinality(Some(min_known(first.cardinality, limit.limit as u64)))
        }
        LogicalOperator::Aggregate(_) => first.with_cardinality(Some(1)),
        LogicalOperator::UnionAll(_) => {
            let cardinality = inputs
                .iter()
                .map(|input| input.cardinality)
                .sum::<Option<u64>>();
            let avg_tuple_bytes = inputs
                .iter()
                .map(|input| input.avg_tuple_bytes)
                .max()
                .flatten();
            LogicalProperties::new(cardinality, avg_tuple_bytes)
        }
        LogicalOperator::NestedTupleSource(_)
        | LogicalOperator::Join(_)
        | LogicalOperator::Unnest(_)
        | LogicalOperator::Script(_) => LogicalProperties::unknown(),
    };

    ctx.set_logical_properties(node, props);
    Ok(props)
}

fn min_known(cardinality: Option<u64>, bound: u64) -> u64 {
    cardinality.map(|c| c.min(bound)).unwrap_or(bound)
}
