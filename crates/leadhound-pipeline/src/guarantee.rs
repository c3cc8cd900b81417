/// Leads to delete so that at most `target_count` remain.
///
/// `scored` holds `(lead id, relevance)` pairs. Survivors are the highest
/// relevance leads; ties go to the lower id, which is the earlier fetch. The
/// returned ids are in ascending order. Running it again on the survivors
/// returns nothing.
#[must_use]
pub fn select_excess(scored: &[(i64, u8)], target_count: u32) -> Vec<i64> {
    let target = usize::try_from(target_count).unwrap_or(usize::MAX);
    if scored.len() <= target {
        return Vec::new();
    }

    let mut ranked = scored.to_vec();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut excess: Vec<i64> = ranked[target..].iter().map(|(id, _)| *id).collect();
    excess.sort_unstable();
    excess
}
