use std::borrow::Cow;
use std::default::Default;
use std::io::{BufWriter, Write};

use ptree::print_config::UTF_CHARS;
use ptree::{write_tree_with, PrintConfig, Style, TreeItem};

use crate::operator::OperatorTrait;
use crate::plan::{NodeId, Plan};

#[derive(Copy, Clone)]
enum ExplainItem {
    Operator(NodeId),
    NestedPlan { owner: NodeId, index: usize },
}

#[derive(Clone)]
struct ExplainNode<'a> {
    plan: &'a Plan,
    item: ExplainItem,
}

impl<'a> TreeItem for ExplainNode<'a> {
    type Child = Self;

    fn write_self<W: Write>(&self, f: &mut W, style: &Style) -> std::io::Result<()> {
        match self.item {
            ExplainItem::Operator(id) => {
                let node = self.plan.node(id);
                match &node.physical {
                    Some(physical) => write!(
                        f,
                        "{}",
                        style.paint(format!(
                            "{} [{}] {}",
                            node.operator, physical, node.execution_mode
                        ))
                    ),
                    None => write!(f, "{}", style.paint(&node.operator)),
                }
            }
            ExplainItem::NestedPlan { index, .. } => {
                write!(f, "{}", style.paint(format!("nested plan #{}", index)))
            }
        }
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let child = |item| ExplainNode {
            plan: self.plan,
            item,
        };
        let children: Vec<Self> = match self.item {
            ExplainItem::Operator(id) => {
                let mut children: Vec<Self> = self
                    .plan
                    .inputs(id)
                    .into_iter()
                    .map(|input| child(ExplainItem::Operator(input)))
                    .collect();
                let nested_count = self.plan.operator(id).nested_plans().len();
                children.extend(
                    (0..nested_count)
                        .map(|index| child(ExplainItem::NestedPlan { owner: id, index })),
                );
                children
            }
            ExplainItem::NestedPlan { owner, index } => self
                .plan
                .operator(owner)
                .nested_plans()
                .get(index)
                .map(|nested| {
                    nested
                        .roots
                        .iter()
                        .map(|root| child(ExplainItem::Operator(*root)))
                        .collect()
                })
                .unwrap_or_default(),
        };
        Cow::from(children)
    }
}

pub fn explain<W: Write>(plan: &Plan, output: &mut W) -> std::io::Result<()> {
    let config = PrintConfig {
        indent: 3,
        characters: UTF_CHARS.into(),
        ..Default::default()
    };
    let root = ExplainNode {
        plan,
        item: ExplainItem::Operator(plan.root()),
    };
    write_tree_with(&root, output, &config)
}

pub fn explain_to_string(plan: &Plan) -> std::io::Result<String> {
    let mut buf = BufWriter::new(Vec::new());

    explain(plan, &mut buf)?;

    let bytes = buf.into_inner()?;
    String::from_utf8(bytes)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use crate::expr::FunctionIdentifier::{Count, Gt};
    use crate::expr::{Expression, LogicalVariable};
    use crate::plan::explain::explain_to_string;
    use crate::plan::PlanBuilder;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_explain_logical_plan() {
        let plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .select(Expression::call(
                Gt,
                vec![v(1).into(), Expression::constant(2i64)],
            ))
            .limit(10)
            .project(vec![v(1)])
            .build()
            .unwrap();

        let expected_result = "\
Project { variables: [$1] }
└─ Limit { limit: 10 }
   └─ Select { condition: gt($1, 2) }
      └─ DataSourceScan { data_source: \"A\", variables: [$1, $2] }
         └─ EmptyTupleSource
";

        let result = explain_to_string(&plan).unwrap();

        assert_eq!(expected_result, result);
    }

    #[test]
    fn test_explain_nested_plan() {
        let plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(vec![(v(3), v(1).into())], vec![], |nested| {
                nested.aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
            })
            .build()
            .unwrap();

        let expected_result = "\
GroupBy { group_by: [$3 := $1] }
├─ DataSourceScan { data_source: \"A\", variables: [$1, $2] }
│  └─ EmptyTupleSource
└─ nested plan #0
   └─ Aggregate { aggregates: [$4 := count($2)] }
      └─ NestedTupleSource
";

        let result = explain_to_string(&plan).unwrap();

        assert_eq!(expected_result, result);
    }
}
