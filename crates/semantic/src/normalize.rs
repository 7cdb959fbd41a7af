/// In-place L2 normalization helper to keep allocations down during hot paths.
/// Zero vectors are left untouched.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// Averages the token embeddings of one sequence, counting only positions whose attention
/// mask is set.
///
/// `hidden` is the row-major `[seq_len, hidden_dim]` slice for a single input.
pub(crate) fn masked_mean_pool(hidden: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0f32; hidden_dim];
    if hidden_dim == 0 {
        return pooled;
    }

    let mut counted = 0f32;
    for (token, row) in hidden.chunks_exact(hidden_dim).enumerate() {
        if mask.get(token).copied().unwrap_or(0) == 0 {
            continue;
        }
        counted += 1.0;
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
    }

    if counted > 0.0 {
        for acc in pooled.iter_mut() {
            *acc /= counted;
        }
    }
    pooled
}
