//! Slot placement for the process block
//!
//! Template rows carry process-name labels. A line whose name matches a label
//! goes to that row; everything else fills the block's free rows in order.

use std::collections::HashSet;

/// Where a line ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Row labeled with the line's process name
    Matched(u32),
    /// First free block row at the time of placement
    Fallback(u32),
}

impl Placement {
    pub fn row(self) -> u32 {
        match self {
            Placement::Matched(row) | Placement::Fallback(row) => row,
        }
    }
}

/// Assign rows to `keys` (one per line, in line order).
///
/// - `labels`: `(row, label)` pairs in scan order, from the template before clearing
/// - `free_rows`: block rows available for fallback, in order
/// - blank keys get `None`
///
/// Matches are resolved first so a fallback never lands on a row a later line
/// claims by label. Each labeled row is claimed at most once; a repeated
/// process name moves on to the next row with the same label, then to fallback.
/// Lines left over when the block is full get `None`.
pub fn assign_slots(labels: &[(u32, String)], free_rows: &[u32], keys: &[&str]) -> Vec<Option<Placement>> {
    let mut claimed: HashSet<u32> = HashSet::new();
    let mut result: Vec<Option<Placement>> = vec![None; keys.len()];

    for (idx, key) in keys.iter().enumerate() {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let hit = labels
            .iter()
            .find(|(row, label)| label.trim() == key && !claimed.contains(row));
        if let Some((row, _)) = hit {
            claimed.insert(*row);
            result[idx] = Some(Placement::Matched(*row));
        }
    }

    let mut free = free_rows.iter().filter(|row| !claimed.contains(*row));
    for (idx, key) in keys.iter().enumerate() {
        if key.trim().is_empty() || result[idx].is_some() {
            continue;
        }
        result[idx] = free.next().map(|row| Placement::Fallback(*row));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(u32, &str)]) -> Vec<(u32, String)> {
        pairs.iter().map(|(r, l)| (*r, l.to_string())).collect()
    }

    #[test]
    fn test_matching_label_wins() {
        let labels = labels(&[(30, "사출"), (31, "조립")]);
        let free: Vec<u32> = (27..=45).collect();
        let slots = assign_slots(&labels, &free, &["조립"]);
        assert_eq!(slots, vec![Some(Placement::Matched(31))]);
    }

    #[test]
    fn test_unmatched_takes_first_free_row() {
        let free: Vec<u32> = (27..=45).collect();
        let slots = assign_slots(&[], &free, &["도장", "검사"]);
        assert_eq!(
            slots,
            vec![Some(Placement::Fallback(27)), Some(Placement::Fallback(28))]
        );
    }

    #[test]
    fn test_fallback_skips_rows_claimed_later() {
        // "조립" appears second but its labeled row 27 is reserved before fallback runs
        let labels = labels(&[(27, "조립")]);
        let free: Vec<u32> = (27..=30).collect();
        let slots = assign_slots(&labels, &free, &["도장", "조립"]);
        assert_eq!(
            slots,
            vec![Some(Placement::Fallback(28)), Some(Placement::Matched(27))]
        );
    }

    #[test]
    fn test_blank_keys_are_skipped() {
        let free = vec![27, 28];
        let slots = assign_slots(&[], &free, &["", "  ", "검사"]);
        assert_eq!(slots, vec![None, None, Some(Placement::Fallback(27))]);
    }

    #[test]
    fn test_overflow_yields_none() {
        let free = vec![27];
        let slots = assign_slots(&[], &free, &["A", "B"]);
        assert_eq!(slots, vec![Some(Placement::Fallback(27)), None]);
    }

    #[test]
    fn test_duplicate_names_do_not_share_a_row() {
        let labels = labels(&[(50, "포장")]);
        let free = vec![27, 28];
        let slots = assign_slots(&labels, &free, &["포장", "포장"]);
        assert_eq!(
            slots,
            vec![Some(Placement::Matched(50)), Some(Placement::Fallback(27))]
        );
    }

    #[test]
    fn test_repeated_label_takes_topmost_row_first() {
        let labels = labels(&[(30, "조립"), (35, "조립")]);
        let free: Vec<u32> = (27..=45).collect();

        let one = assign_slots(&labels, &free, &["조립"]);
        assert_eq!(one, vec![Some(Placement::Matched(30))]);

        let two = assign_slots(&labels, &free, &["조립", "조립"]);
        assert_eq!(
            two,
            vec![Some(Placement::Matched(30)), Some(Placement::Matched(35))]
        );
    }

    #[test]
    fn test_label_match_trims_whitespace() {
        let labels = labels(&[(33, " 프레스 ")]);
        let slots = assign_slots(&labels, &[27], &["프레스"]);
        assert_eq!(slots[0].map(Placement::row), Some(33));
    }
}
