//! Label identifiers and the live label set

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a segmentation label; 0 means "no label"
pub type LabelId = u32;

/// The label that means "nothing selected"
pub const NO_LABEL: LabelId = 0;

/// Mapping from label id to label metadata
///
/// Supplied from outside (the labeled image); the selection coordinator only
/// reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<LabelId, serde_json::Value>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label set with the given ids and empty metadata
    pub fn from_ids(ids: impl IntoIterator<Item = LabelId>) -> Self {
        Self(ids.into_iter().map(|id| (id, serde_json::Value::Null)).collect())
    }

    pub fn insert(&mut self, id: LabelId, info: serde_json::Value) {
        self.0.insert(id, info);
    }

    pub fn get(&self, id: LabelId) -> Option<&serde_json::Value> {
        self.0.get(&id)
    }

    pub fn contains(&self, id: LabelId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.0.keys().copied()
    }

    pub fn max(&self) -> Option<LabelId> {
        self.0.keys().next_back().copied()
    }

    pub fn min(&self) -> Option<LabelId> {
        self.0.keys().next().copied()
    }

    /// Nearest label below `label`, wrapping to the largest label
    ///
    /// None when the set is empty.
    pub fn prev_label(&self, label: LabelId) -> Option<LabelId> {
        self.0.range(..label).next_back().map(|(id, _)| *id).or_else(|| self.max())
    }

    /// Nearest label above `label`, wrapping to the smallest label
    ///
    /// None when the set is empty.
    pub fn next_label(&self, label: LabelId) -> Option<LabelId> {
        self.0
            .range(label.saturating_add(1)..)
            .next()
            .map(|(id, _)| *id)
            .filter(|id| *id > label)
            .or_else(|| self.min())
    }

    /// A label id one past every existing label
    ///
    /// When the largest id is `LabelId::MAX` this falls back to the lowest
    /// unused positive id.
    pub fn new_label(&self) -> LabelId {
        self.max()
            .unwrap_or(NO_LABEL)
            .checked_add(1)
            .unwrap_or_else(|| self.lowest_unused())
    }

    fn lowest_unused(&self) -> LabelId {
        let mut candidate: LabelId = 1;
        for id in self.ids().filter(|id| *id > NO_LABEL) {
            if id != candidate {
                break;
            }
            candidate = candidate.saturating_add(1);
        }
        candidate
    }
}

impl FromIterator<(LabelId, serde_json::Value)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (LabelId, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_next_label_cycles_and_wraps() {
        let labels = LabelSet::from_ids([1, 3, 5]);
        assert_eq!(labels.next_label(3), Some(5));
        assert_eq!(labels.next_label(5), Some(1));
        assert_eq!(labels.next_label(0), Some(1));
        assert_eq!(labels.next_label(4), Some(5));
    }

    #[test]
    fn test_prev_label_cycles_and_wraps() {
        let labels = LabelSet::from_ids([1, 3, 5]);
        assert_eq!(labels.prev_label(3), Some(1));
        assert_eq!(labels.prev_label(1), Some(5));
        assert_eq!(labels.prev_label(0), Some(5));
        assert_eq!(labels.prev_label(9), Some(5));
    }

    #[test]
    fn test_cycling_empty_set_is_none() {
        let labels = LabelSet::new();
        assert_eq!(labels.prev_label(3), None);
        assert_eq!(labels.next_label(3), None);
    }

    #[test]
    fn test_next_label_at_max_id() {
        let labels = LabelSet::from_ids([2, LabelId::MAX]);
        assert_eq!(labels.next_label(LabelId::MAX), Some(2));
    }

    #[test]
    fn test_new_label() {
        assert_eq!(LabelSet::from_ids([1, 2, 4]).new_label(), 5);
        assert_eq!(LabelSet::new().new_label(), 1);
    }

    #[test]
    fn test_new_label_after_max_id_reuses_lowest_gap() {
        assert_eq!(LabelSet::from_ids([3, LabelId::MAX]).new_label(), 1);
        assert_eq!(LabelSet::from_ids([1, 2, 5, LabelId::MAX]).new_label(), 3);
    }

    #[test]
    fn test_json_keys_are_label_ids() {
        let labels: LabelSet = serde_json::from_str(r#"{"1": {"frames": [0]}, "7": null}"#).unwrap();
        assert_eq!(labels.ids().collect::<Vec<_>>(), vec![1, 7]);
        assert_eq!(labels.get(1).unwrap()["frames"][0], 0);
    }

    proptest! {
        #[test]
        fn prop_cycled_label_is_member(ids in proptest::collection::btree_set(1u32..50, 1..10), start in 0u32..60) {
            let labels = LabelSet::from_ids(ids.iter().copied());
            let next = labels.next_label(start).unwrap();
            let prev = labels.prev_label(start).unwrap();
            prop_assert!(labels.contains(next));
            prop_assert!(labels.contains(prev));
        }

        #[test]
        fn prop_next_then_prev_returns_for_members(ids in proptest::collection::btree_set(1u32..50, 1..10)) {
            let labels = LabelSet::from_ids(ids.iter().copied());
            for id in ids {
                let next = labels.next_label(id).unwrap();
                prop_assert_eq!(labels.prev_label(next), Some(id));
            }
        }
    }
}
