// ABOUTME: Splits an id set into membership-query sized chunks
// ABOUTME: Chunks are disjoint, ordered, and never larger than the ceiling

use std::collections::HashSet;
use std::hash::Hash;

/// Partition `ids` into chunks of at most `ceiling` values.
///
/// Duplicates are dropped (first occurrence kept) so the chunks form a true
/// partition of the id set and no value is queried twice. A ceiling of zero is
/// treated as one.
pub fn partition<T>(ids: &[T], ceiling: usize) -> Vec<Vec<T>>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::with_capacity(ids.len());
    let unique: Vec<T> = ids
        .iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect();

    unique
        .chunks(ceiling.max(1))
        .map(<[T]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{i:03}")).collect()
    }

    #[rstest]
    #[case::empty(0, 10, 0)]
    #[case::single(1, 10, 1)]
    #[case::exactly_one_chunk(10, 10, 1)]
    #[case::one_over(11, 10, 2)]
    #[case::exact_multiple(20, 10, 2)]
    #[case::three_chunks(25, 10, 3)]
    #[case::ceiling_of_one(3, 1, 3)]
    fn test_chunk_count(#[case] len: usize, #[case] ceiling: usize, #[case] expected: usize) {
        let chunks = partition(&ids(len), ceiling);

        assert_eq!(chunks.len(), expected);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= ceiling));
    }

    #[test]
    fn test_chunks_cover_input_in_order() {
        let input = ids(25);
        let chunks = partition(&input, 10);

        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(chunks[2].len(), 5);

        let flattened: Vec<String> = chunks.into_iter().flatten().collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let input = vec!["a", "b", "a", "c", "b"];
        let chunks = partition(&input, 2);

        assert_eq!(chunks, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_zero_ceiling_behaves_like_one() {
        let chunks = partition(&["x", "y"], 0);
        assert_eq!(chunks, vec![vec!["x"], vec!["y"]]);
    }
}
