//! Work items and their distribution across sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{HarvestError, Result};

/// One unit of fetch-and-extract work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkItem {
    /// A document URL.
    Url(String),
    /// A pagination offset.
    Offset(u64),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Url(url) => f.write_str(url),
            WorkItem::Offset(offset) => write!(f, "offset {}", offset),
        }
    }
}

impl From<&str> for WorkItem {
    fn from(url: &str) -> Self {
        WorkItem::Url(url.to_string())
    }
}

impl From<String> for WorkItem {
    fn from(url: String) -> Self {
        WorkItem::Url(url)
    }
}

impl From<u64> for WorkItem {
    fn from(offset: u64) -> Self {
        WorkItem::Offset(offset)
    }
}

/// Requested item count; `-1` on the command line means all available items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemLimit {
    #[default]
    All,
    Count(usize),
}

impl ItemLimit {
    /// Parses the `-1 = all` convention.
    pub fn from_signed(n: i64) -> Result<Self> {
        match n {
            -1 => Ok(ItemLimit::All),
            n if n >= 0 => Ok(ItemLimit::Count(n as usize)),
            n => Err(HarvestError::Config(format!(
                "item limit must be -1 or non-negative, got {}",
                n
            ))),
        }
    }

    /// Resolves the limit against the number of available items.
    pub fn resolve(self, available: usize) -> usize {
        match self {
            ItemLimit::All => available,
            ItemLimit::Count(n) => n.min(available),
        }
    }
}

/// Splits `items` into `k` balanced partitions.
///
/// Each item goes to the partition with the fewest elements, ties going to the
/// lowest index. Partition sizes differ by at most one and every partition
/// keeps the relative order of its items.
pub fn partition<T>(items: Vec<T>, k: usize) -> Result<Vec<Vec<T>>> {
    if k == 0 {
        return Err(HarvestError::Config(
            "session count must be at least 1".to_string(),
        ));
    }

    let mut parts: Vec<Vec<T>> = (0..k).map(|_| Vec::new()).collect();
    for item in items {
        let smallest = parts
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (p.len(), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);
        parts[smallest].push(item);
    }
    Ok(parts)
}

/// Pagination offsets covering `limit` entries, `step` entries per page.
///
/// The limit is rounded up to the next multiple of `step`, since a page is
/// always fetched whole.
pub fn offsets(limit: usize, step: usize) -> Vec<WorkItem> {
    if step == 0 {
        return Vec::new();
    }
    let rounded = limit.div_ceil(step) * step;
    (0..rounded)
        .step_by(step)
        .map(|o| WorkItem::Offset(o as u64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes<T>(parts: &[Vec<T>]) -> Vec<usize> {
        parts.iter().map(Vec::len).collect()
    }

    #[test]
    fn test_partition_three_into_two() {
        let parts = partition(vec!["https://x/1", "https://x/2", "https://x/3"], 2).unwrap();
        assert_eq!(parts, vec![vec!["https://x/1", "https://x/3"], vec!["https://x/2"]]);
    }

    #[test]
    fn test_partition_balance_many_shapes() {
        for n in 0..40 {
            for k in 1..9 {
                let parts = partition((0..n).collect::<Vec<_>>(), k).unwrap();
                let s = sizes(&parts);
                assert_eq!(s.len(), k);
                assert_eq!(s.iter().sum::<usize>(), n);
                let max = *s.iter().max().unwrap();
                let min = *s.iter().min().unwrap();
                assert!(max - min <= 1, "n={} k={} sizes={:?}", n, k, s);
            }
        }
    }

    #[test]
    fn test_partition_totality_and_order() {
        let items: Vec<u32> = (0..23).collect();
        let parts = partition(items.clone(), 4).unwrap();

        let mut seen: Vec<u32> = parts.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, items);

        for p in &parts {
            assert!(p.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_partition_more_sessions_than_items() {
        let parts = partition(vec![1, 2], 5).unwrap();
        assert_eq!(sizes(&parts), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_partition_zero_sessions_rejected() {
        let result = partition(vec![1], 0);
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_offsets_round_up() {
        let o = offsets(901, 100);
        assert_eq!(o.len(), 10);
        assert_eq!(o.first(), Some(&WorkItem::Offset(0)));
        assert_eq!(o.last(), Some(&WorkItem::Offset(900)));
    }

    #[test]
    fn test_offsets_exact() {
        assert_eq!(offsets(200, 100), vec![WorkItem::Offset(0), WorkItem::Offset(100)]);
        assert!(offsets(0, 100).is_empty());
    }

    #[test]
    fn test_item_limit() {
        assert_eq!(ItemLimit::from_signed(-1).unwrap(), ItemLimit::All);
        assert_eq!(ItemLimit::from_signed(5).unwrap().resolve(3), 3);
        assert_eq!(ItemLimit::All.resolve(7), 7);
        assert!(ItemLimit::from_signed(-2).is_err());
    }

    #[test]
    fn test_work_item_display() {
        assert_eq!(WorkItem::from("https://x/1").to_string(), "https://x/1");
        assert_eq!(WorkItem::from(300u64).to_string(), "offset 300");
    }
}
