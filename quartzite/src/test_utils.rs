use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

use crate::metadata::{DataSource, InMemoryMetadataProvider, MetadataProvider};

/// A data source whose columns are all 64 bit integers.
pub fn data_source(name: &str, columns: &[&str]) -> DataSource {
    let fields: Vec<Field> = columns
        .iter()
        .map(|column| Field::new(*column, DataType::Int64, true))
        .collect();
    DataSource::new(name, Arc::new(Schema::new(fields)))
}

/// A data source with a schema written as arrow JSON.
pub fn data_source_from_schema(name: &str, json: &str) -> DataSource {
    let schema: Schema = serde_json::from_str(json).unwrap();
    DataSource::new(name, Arc::new(schema))
}

pub fn metadata_with(sources: Vec<DataSource>) -> InMemoryMetadataProvider {
    sources
        .into_iter()
        .fold(InMemoryMetadataProvider::new(), |metadata, source| {
            metadata.with_source(source)
        })
}

pub fn empty_metadata() -> Arc<dyn MetadataProvider> {
    InMemoryMetadataProvider::new().into_arc()
}
