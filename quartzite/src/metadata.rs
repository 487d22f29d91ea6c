//! Access to data sources and expression types.
//!
//! The optimizer never reads data. What it knows about a data source, its columns, keys,
//! storage partitioning and size, comes from a [`MetadataProvider`].
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use arrow_schema::{DataType, SchemaRef};

use crate::error::{OptError, OptResult};
use crate::expr::{builtin_expression_type, Expression, LogicalVariable, TypeEnvironment};
use crate::properties::{
    FunctionalDependency, LocalProperty, NodeDomain, OrderColumn, PartitioningProperty,
    StructuralPropertiesVector,
};
use crate::stat::Statistics;

/// How a data source is stored across partitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataSourcePartitioning {
    Unpartitioned,
    Random,
    /// Hash partitioned on the primary key.
    HashOnPrimaryKey,
}

#[derive(Clone, Debug)]
pub struct DataSource {
    name: String,
    schema: SchemaRef,
    primary_key: Vec<String>,
    partitioning: DataSourcePartitioning,
    domain: NodeDomain,
    ordered_by_primary_key: bool,
    statistics: Option<Statistics>,
}

impl DataSource {
    pub fn new<S: Into<String>>(name: S, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            primary_key: vec![],
            partitioning: DataSourcePartitioning::Unpartitioned,
            domain: NodeDomain::Default,
            ordered_by_primary_key: false,
            statistics: None,
        }
    }

    pub fn with_primary_key<S: Into<String>, I: IntoIterator<Item = S>>(mut self, key: I) -> Self {
        self.primary_key = key.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_partitioning(mut self, partitioning: DataSourcePartitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    pub fn with_domain(mut self, domain: NodeDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn ordered_by_primary_key(mut self) -> Self {
        self.ordered_by_primary_key = true;
        self
    }

    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn partitioning(&self) -> DataSourcePartitioning {
        self.partitioning
    }

    pub fn domain(&self) -> &NodeDomain {
        &self.domain
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    /// Checks that `vars` binds one variable per column.
    fn check_arity(&self, vars: &[LogicalVariable]) -> OptResult<()> {
        if vars.len() != self.schema.fields().len() {
            bail!(OptError::malformed(
                "DataSourceScan",
                format!(
                    "{} variables bound to data source {} with {} columns",
                    vars.len(),
                    self.name,
                    self.schema.fields().len()
                )
            ));
        }
        Ok(())
    }

    /// Variables bound to the primary key columns.
    pub fn primary_key_variables(
        &self,
        vars: &[LogicalVariable],
    ) -> OptResult<Vec<LogicalVariable>> {
        self.check_arity(vars)?;
        self.primary_key
            .iter()
            .map(|column| match self.schema.index_of(column) {
                Ok(idx) => Ok(vars[idx]),
                Err(_) => bail!(OptError::malformed(
                    "DataSourceScan",
                    format!("primary key {} is not a column of {}", column, self.name)
                )),
            })
            .collect()
    }

    /// Type of each bound variable.
    pub fn column_types(
        &self,
        vars: &[LogicalVariable],
    ) -> OptResult<Vec<(LogicalVariable, DataType)>> {
        self.check_arity(vars)?;
        Ok(vars
            .iter()
            .zip(self.schema.fields().iter())
            .map(|(var, field)| (*var, field.data_type().clone()))
            .collect())
    }
}

pub trait MetadataProvider {
    fn find_data_source(&self, name: &str) -> Option<&DataSource>;

    fn expression_type(&self, expr: &Expression, env: &TypeEnvironment) -> OptResult<DataType> {
        builtin_expression_type(expr, env)
    }

    /// Dependencies a data source guarantees: its primary key determines every column.
    fn data_source_fds(
        &self,
        name: &str,
        vars: &[LogicalVariable],
    ) -> OptResult<Vec<FunctionalDependency>> {
        let source = data_source_or_fail(self, name)?;
        let keys = source.primary_key_variables(vars)?;
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let tail: Vec<LogicalVariable> =
            vars.iter().filter(|v| !keys.contains(v)).copied().collect();
        if tail.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![FunctionalDependency::new(keys, tail)])
    }

    /// Partitioning and order a data source is stored with.
    fn data_source_properties(
        &self,
        name: &str,
        vars: &[LogicalVariable],
    ) -> OptResult<StructuralPropertiesVector> {
        let source = data_source_or_fail(self, name)?;
        let keys = source.primary_key_variables(vars)?;
        let domain = Some(source.domain().clone());
        let partitioning = match source.partitioning() {
            DataSourcePartitioning::Unpartitioned => PartitioningProperty::Unpartitioned,
            DataSourcePartitioning::HashOnPrimaryKey if !keys.is_empty() => {
                PartitioningProperty::HashPartitioned {
                    columns: keys.clone(),
                    domain,
                }
            }
            _ => PartitioningProperty::Random { domain },
        };
        let local = if source.ordered_by_primary_key {
            keys.iter()
                .map(|key| LocalProperty::Order(OrderColumn::asc(*key)))
                .collect()
        } else {
            vec![]
        };
        Ok(StructuralPropertiesVector::new(Some(partitioning), local))
    }

    fn statistics(&self, name: &str) -> Option<Statistics> {
        self.find_data_source(name)
            .and_then(|source| source.statistics().cloned())
    }
}

fn data_source_or_fail<'a, M: MetadataProvider + ?Sized>(
    provider: &'a M,
    name: &str,
) -> OptResult<&'a DataSource> {
    match provider.find_data_source(name) {
        Some(source) => Ok(source),
        None => bail!(OptError::malformed(
            "DataSourceScan",
            format!("unknown data source {}", name)
        )),
    }
}

/// Data sources registered by name.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadataProvider {
    sources: HashMap<String, DataSource>,
}

impl InMemoryMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: DataSource) -> Option<DataSource> {
        self.sources.insert(source.name().to_string(), source)
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.register(source);
        self
    }

    pub fn into_arc(self) -> Arc<dyn MetadataProvider> {
        Arc::new(self)
    }
}

impl MetadataProvider for InMemoryMetadataProvider {
    fn find_data_source(&self, name: &str) -> Option<&DataSource> {
        self.sources.get(name)
    }
}
