use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use std::sync::Arc;

use docqa_core::types::PassageId;

pub const ID_COLUMN: &str = "passage_id";
pub const VECTOR_COLUMN: &str = "vector";

pub fn passage_vector_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Int64, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            true,
        ),
    ]))
}

/// One row per (id, vector); every vector must already have length `dim`.
pub fn vectors_to_record_batch(rows: &[(PassageId, Vec<f32>)], dim: usize) -> Result<RecordBatch, ArrowError> {
    let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
    let vectors = rows.iter().map(|(_, v)| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
    RecordBatch::try_new(
        passage_vector_schema(dim),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
        ],
    )
}
