use std::time::Duration;

/// Indices of the minimum and maximum keyed items, skipping items whose key
/// is `None`. Ties keep the earliest index.
pub fn extremes<T>(items: &[T], key: impl Fn(&T) -> Option<Duration>) -> Option<(usize, usize)> {
    let mut found: Option<(usize, Duration, usize, Duration)> = None;

    for (i, item) in items.iter().enumerate() {
        let Some(k) = key(item) else { continue };
        found = Some(match found {
            None => (i, k, i, k),
            Some((fi, fk, si, sk)) => {
                let (fi, fk) = if k < fk { (i, k) } else { (fi, fk) };
                let (si, sk) = if k > sk { (i, k) } else { (si, sk) };
                (fi, fk, si, sk)
            }
        });
    }

    found.map(|(fi, _, si, _)| (fi, si))
}
