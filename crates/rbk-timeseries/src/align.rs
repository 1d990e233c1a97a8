use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::TimeSeries;

/// Key of the series with the most observations. Ties go to the smallest key.
pub fn longest_key<K: Ord + Clone>(map: &BTreeMap<K, TimeSeries>) -> Option<K> {
    let mut best: Option<(&K, usize)> = None;
    for (k, s) in map {
        match best {
            Some((_, n)) if n >= s.len() => {}
            _ => best = Some((k, s.len())),
        }
    }
    best.map(|(k, _)| k.clone())
}

/// Re-grid every series onto the dates of the longest one.
///
/// Missing points carry the previous value forward; whatever is still NaN
/// afterwards (leading gaps, NaN inputs) becomes 0.0. All returned series
/// share one grid and one length.
pub fn align_to_longest<K: Ord + Clone>(map: BTreeMap<K, TimeSeries>) -> BTreeMap<K, TimeSeries> {
    let Some(key) = longest_key(&map) else {
        return map;
    };
    let grid: Vec<NaiveDate> = map.get(&key).map(|s| s.dates()).unwrap_or_default();

    let aligned: BTreeMap<K, TimeSeries> = map
        .into_iter()
        .map(|(k, s)| {
            let out = s.reindex_forward_fill(&grid).replace_nan(0.0);
            (k, out)
        })
        .collect();

    tracing::debug!(series = aligned.len(), grid_len = grid.len(), "aligned series onto common grid");
    aligned
}
