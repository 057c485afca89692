// Vector helpers shared by the query builder, the profile updater and the in-memory store

use serde_json::Value;

/// L2 norm
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length. Returns `None` for zero or non-finite norms.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let n = norm(v);
    if !n.is_finite() || n <= f32::EPSILON {
        return None;
    }
    Some(v.iter().map(|x| x / n).collect())
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity, 0.0 when either side has no direction or the lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let denom = norm(a) * norm(b);
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot(a, b) / denom
    }
}

/// Weighted arithmetic mean of equally sized vectors.
///
/// Returns `None` when the input is empty, the dimensions disagree or the weights sum to zero.
pub fn weighted_mean(vectors: &[(&[f32], f32)]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.0.len();
    let mut acc = vec![0.0_f32; dim];
    let mut total = 0.0_f32;

    for (v, w) in vectors {
        if v.len() != dim {
            return None;
        }
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += x * w;
        }
        total += w;
    }

    if total <= f32::EPSILON {
        return None;
    }
    Some(acc.into_iter().map(|a| a / total).collect())
}

/// Numbers, or strings like "$1,299.00"; non-finite values are rejected
pub fn parse_amount(v: &Value) -> Option<f64> {
    let amount = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(['$', ','], "").trim().parse().ok(),
        _ => None,
    };
    amount.filter(|a: &f64| a.is_finite())
}
