use crate::context::MaskContext;

/// Canonical identity of a mask: the set of drawable indices that form it.
///
/// Stored sorted and de-duplicated so that two authored lists with the same
/// members compare equal regardless of order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MaskKey(Vec<usize>);

impl MaskKey {
    pub fn new(ids: &[usize]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    pub fn ids(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Index of the context whose mask is set-equal to `key`, if any.
pub fn find_equivalent(contexts: &[MaskContext], key: &MaskKey) -> Option<usize> {
    contexts.iter().position(|c| c.key() == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn test_order_is_irrelevant() {
        assert_eq!(MaskKey::new(&[3, 1, 2]), MaskKey::new(&[1, 2, 3]));
    }

    #[test]
    fn test_subset_is_not_equal() {
        assert_ne!(MaskKey::new(&[1, 2]), MaskKey::new(&[1, 2, 3]));
        assert_ne!(MaskKey::new(&[1, 2, 3]), MaskKey::new(&[1, 2, 4]));
    }

    #[test]
    fn test_find_equivalent_matches_any_permutation() {
        let contexts = vec![
            MaskContext::new(MaskKey::new(&[4])),
            MaskContext::new(MaskKey::new(&[0, 5, 9])),
        ];

        let mut rng = rand::rng();
        let mut ids = vec![9, 5, 0];
        for _ in 0..16 {
            ids.shuffle(&mut rng);
            assert_eq!(find_equivalent(&contexts, &MaskKey::new(&ids)), Some(1));
        }

        assert_eq!(find_equivalent(&contexts, &MaskKey::new(&[0, 5])), None);
    }
}
