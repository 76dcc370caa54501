use std::cmp::Ordering;

use crate::types::ScoredResult;

/// Orders results best-first by `score`; equal scores fall back to passage id ascending.
pub fn sort_desc_by<F>(results: &mut [ScoredResult], score: F)
where
    F: Fn(&ScoredResult) -> f32,
{
    results.sort_by(|a, b| compare_desc(score(a), score(b)).then_with(|| a.passage_id.cmp(&b.passage_id)));
}

pub fn top_k_by<F>(mut results: Vec<ScoredResult>, k: usize, score: F) -> Vec<ScoredResult>
where
    F: Fn(&ScoredResult) -> f32,
{
    sort_desc_by(&mut results, score);
    results.truncate(k);
    results
}

// Non-finite scores (NaN from a corrupt embedding) rank last.
fn rank_key(score: f32) -> f32 {
    if score.is_finite() { score } else { f32::NEG_INFINITY }
}

fn compare_desc(a: f32, b: f32) -> Ordering {
    rank_key(b).total_cmp(&rank_key(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: i64, cos: f32) -> ScoredResult {
        ScoredResult {
            passage_id: id,
            document_id: 1,
            content: format!("p{id}"),
            source_document_name: "doc".to_string(),
            cosine_similarity: cos,
            fused_score: None,
            rerank_score: None,
        }
    }

    #[test]
    fn ties_break_by_passage_id() {
        let ranked = top_k_by(vec![result(7, 0.5), result(3, 0.5), result(5, 0.9)], 3, |r| r.cosine_similarity);
        let ids: Vec<i64> = ranked.iter().map(|r| r.passage_id).collect();
        assert_eq!(ids, vec![5, 3, 7]);
    }

    #[test]
    fn nan_scores_rank_last() {
        let ranked = top_k_by(vec![result(1, f32::NAN), result(2, -0.9), result(3, 0.4)], 3, |r| r.cosine_similarity);
        let ids: Vec<i64> = ranked.iter().map(|r| r.passage_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        let top = top_k_by(vec![result(4, f32::NAN), result(5, 0.1)], 1, |r| r.cosine_similarity);
        assert_eq!(top[0].passage_id, 5);
    }

    #[test]
    fn top_k_zero_is_empty() {
        assert!(top_k_by(vec![result(1, 0.1)], 0, |r| r.cosine_similarity).is_empty());
    }
}
