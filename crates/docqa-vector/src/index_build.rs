//! IVF-PQ parameters and index creation for large slots.
//!
//! Small corpora are served by a flat scan; an IVF-PQ index is only trained
//! once a slot holds at least [`MIN_ROWS_FOR_IVFPQ`] vectors.

use anyhow::Result;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::{DistanceType, Table};

use crate::schema::VECTOR_COLUMN;

/// PQ training needs 256 centroids per sub-vector; keep a wide margin.
pub const MIN_ROWS_FOR_IVFPQ: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let nlist = sqrt_n.clamp(1, 65536).min(total_rows.saturating_sub(1).max(1));
    let preferred = if dim >= 1024 { 32 } else { 16 };
    // Sub-vector count must divide the dimension.
    let m = [preferred, 16, 8, 4, 2, 1]
        .into_iter()
        .find(|m| *m <= dim && dim % m == 0)
        .unwrap_or(1);
    IvfPqParams { nlist, m }
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
    table
        .create_index(
            &[VECTOR_COLUMN],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Dot)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .execute()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_scale_with_rows_and_divide_dim() {
        let p = compute_ivfpq_params(10_000, 384);
        assert_eq!(p, IvfPqParams { nlist: 100, m: 16 });
        assert_eq!(compute_ivfpq_params(1_000_000, 1024).m, 32);
        assert_eq!(compute_ivfpq_params(5000, 12).m, 4);
        assert_eq!(compute_ivfpq_params(1, 8).nlist, 1);
    }
}
