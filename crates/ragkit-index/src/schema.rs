use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const VECTOR_TABLE: &str = "vectors";

/// `id: Utf8, vector: FixedSizeList<Float32, dim>`
pub fn build_vector_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}
