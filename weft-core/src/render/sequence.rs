//! Longest increasing subsequence, used by the keyed children diff to find
//! the nodes that can stay where they are.

/// Positions of a longest strictly increasing subsequence of `values`.
///
/// Entries equal to `0` mean "no old counterpart" and never join the
/// sequence. The returned positions are ascending.
///
/// ```rust
/// use weft_core::render::longest_increasing_subsequence;
///
/// assert_eq!(longest_increasing_subsequence(&[3, 4, 2]), vec![0, 1]);
/// assert_eq!(longest_increasing_subsequence(&[0, 5, 0, 6]), vec![1, 3]);
/// ```
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut predecessors: Vec<Option<usize>> = vec![None; values.len()];

    // tails[k] is the position of the smallest tail of an increasing run
    // of length k + 1.
    let mut tails: Vec<usize> = Vec::new();

    for (position, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }

        let length = tails.partition_point(|&tail| values[tail] < value);
        if length > 0 {
            predecessors[position] = Some(tails[length - 1]);
        }
        if length == tails.len() {
            tails.push(position);
        } else {
            tails[length] = position;
        }
    }

    let mut sequence = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        sequence.push(position);
        cursor = predecessors[position];
    }
    sequence.reverse();
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_increasing(values: &[usize], positions: &[usize]) -> bool {
        positions.windows(2).all(|pair| pair[0] < pair[1] && values[pair[0]] < values[pair[1]])
    }

    #[test]
    fn empty_input() {
        assert!(longest_increasing_subsequence(&[]).is_empty());
        assert!(longest_increasing_subsequence(&[0, 0]).is_empty());
    }

    #[test]
    fn already_sorted() {
        assert_eq!(longest_increasing_subsequence(&[1, 2, 3, 4]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reversed_keeps_one() {
        assert_eq!(longest_increasing_subsequence(&[4, 3, 2, 1]).len(), 1);
    }

    #[test]
    fn skips_zero_entries() {
        let values = [2, 0, 3, 0, 1, 4];
        let sequence = longest_increasing_subsequence(&values);
        assert_eq!(sequence, vec![0, 2, 5]);
        assert!(sequence.iter().all(|&position| values[position] != 0));
    }

    #[test]
    fn finds_a_longest_run() {
        let values = [5, 3, 4, 8, 6, 7, 1, 2];
        let sequence = longest_increasing_subsequence(&values);
        assert_eq!(sequence.len(), 4);
        assert!(is_increasing(&values, &sequence));
    }
}
