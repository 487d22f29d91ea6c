use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use maplit::hashmap;
use quartzite::metadata::{DataSource, DataSourcePartitioning, InMemoryMetadataProvider};
use quartzite::stat::Statistics;

pub const LINEITEM_SCHEMA_JSON: &str = r#"{
    "fields": [
        {"name": "orderkey", "nullable": false, "data_type": "Int64", "dict_id": 0, "dict_is_ordered": false, "metadata": {}},
        {"name": "quantity", "nullable": false, "data_type": "Int32", "dict_id": 0, "dict_is_ordered": false, "metadata": {}},
        {"name": "comment", "nullable": true, "data_type": "Utf8", "dict_id": 0, "dict_is_ordered": false, "metadata": {}}
    ],
    "metadata": {}
}"#;

/// A data source whose columns are all 64 bit integers.
pub fn int_source(name: &str, columns: &[&str]) -> DataSource {
    let fields: Vec<Field> = columns
        .iter()
        .map(|column| Field::new(*column, DataType::Int64, true))
        .collect();
    DataSource::new(name, Arc::new(Schema::new(fields)))
}

pub fn json_source(name: &str, json: &str) -> DataSource {
    let schema: Schema = serde_json::from_str(json).unwrap();
    DataSource::new(name, Arc::new(schema))
}

/// Randomly partitioned source with `rows` tuples of 100 bytes.
pub fn sized_source(name: &str, columns: &[&str], rows: u64) -> DataSource {
    int_source(name, columns)
        .with_partitioning(DataSourcePartitioning::Random)
        .with_statistics(Statistics::new(rows, 100))
}

pub fn catalog(sources: Vec<DataSource>) -> InMemoryMetadataProvider {
    sources
        .into_iter()
        .fold(InMemoryMetadataProvider::new(), |metadata, source| {
            metadata.with_source(source)
        })
}

/// Join inputs by name, `A(x, a)` and `B(y, b)`, with the given row counts.
pub fn join_catalog(a_rows: u64, b_rows: u64) -> InMemoryMetadataProvider {
    let columns: HashMap<&str, (&[&str], u64)> = hashmap! {
        "A" => (&["x", "a"][..], a_rows),
        "B" => (&["y", "b"][..], b_rows),
    };
    catalog(
        columns
            .into_iter()
            .map(|(name, (columns, rows))| sized_source(name, columns, rows))
            .collect(),
    )
}
