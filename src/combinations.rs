use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};

/// Ordered tuple of distinct asset indices into a panel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCombination(Vec<usize>);

impl AssetCombination {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lazy lexicographic enumeration of all `k`-subsets of `0..n`.
///
/// Cloning the enumerator (or calling [`Combinations::restart`]) gives a
/// fresh pass over the same sequence.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    k: usize,
    current: Option<Vec<usize>>,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Result<Self> {
        if k < 1 || k > n {
            return Err(AdvisorError::Configuration(format!(
                "portfolio size {} must be between 1 and the universe size {}",
                k, n
            )));
        }
        Ok(Self {
            n,
            k,
            current: Some((0..k).collect()),
        })
    }

    pub fn restart(&mut self) {
        self.current = Some((0..self.k).collect());
    }

    /// Number of combinations a full pass yields, C(n, k).
    pub fn total(&self) -> usize {
        binomial(self.n, self.k)
    }
}

impl Iterator for Combinations {
    type Item = AssetCombination;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let item = AssetCombination(current.clone());

        // Advance: find the rightmost index that can still move right.
        let mut next = current;
        let mut i = self.k;
        while i > 0 {
            i -= 1;
            if next[i] < self.n - self.k + i {
                next[i] += 1;
                for j in i + 1..self.k {
                    next[j] = next[j - 1] + 1;
                }
                self.current = Some(next);
                break;
            }
        }

        Some(item)
    }
}

pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = result * (n - i) as u128 / (i + 1) as u128;
    }
    usize::try_from(result).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_five_choose_three() {
        let combos: Vec<AssetCombination> = Combinations::new(5, 3).unwrap().collect();
        assert_eq!(combos.len(), 10);

        let unique: HashSet<_> = combos.iter().cloned().collect();
        assert_eq!(unique.len(), 10, "No combination should repeat");

        for combo in &combos {
            assert_eq!(combo.len(), 3);
            let members: HashSet<_> = combo.indices().iter().collect();
            assert_eq!(members.len(), 3, "No duplicate asset within a combination");
        }

        assert_eq!(combos[0].indices(), &[0, 1, 2]);
        assert_eq!(combos[1].indices(), &[0, 1, 3]);
        assert_eq!(combos[9].indices(), &[2, 3, 4]);
    }

    #[test]
    fn test_lexicographic_order() {
        let combos: Vec<Vec<usize>> = Combinations::new(6, 2)
            .unwrap()
            .map(|c| c.indices().to_vec())
            .collect();
        let mut sorted = combos.clone();
        sorted.sort();
        assert_eq!(combos, sorted);
    }

    #[test]
    fn test_full_and_single_size() {
        let all: Vec<_> = Combinations::new(4, 4).unwrap().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].indices(), &[0, 1, 2, 3]);

        let singles: Vec<_> = Combinations::new(3, 1).unwrap().collect();
        assert_eq!(singles.len(), 3);
    }

    #[test]
    fn test_restart_replays_sequence() {
        let mut combos = Combinations::new(5, 2).unwrap();
        let first: Vec<_> = combos.by_ref().collect();
        assert!(combos.next().is_none());
        combos.restart();
        let second: Vec<_> = combos.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_size_is_configuration_error() {
        assert!(matches!(Combinations::new(3, 0), Err(AdvisorError::Configuration(_))));
        assert!(matches!(Combinations::new(3, 4), Err(AdvisorError::Configuration(_))));
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 3), 10);
        assert_eq!(binomial(12, 5), 792);
        assert_eq!(binomial(4, 0), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(Combinations::new(12, 5).unwrap().total(), 792);
    }
}
