//! Fixed-size, scene-indexed result storage for fan-out stages.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("scene index {index} is out of range for {len} scenes")]
    OutOfRange { index: usize, len: usize },

    #[error("scene index {index} already has a result")]
    Occupied { index: usize },
}

/// One slot per scene, filled at most once. Iteration is always in index
/// order regardless of the order results arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSlots<T> {
    slots: Vec<Option<T>>,
}

impl<T> SceneSlots<T> {
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn insert(&mut self, index: usize, value: T) -> Result<(), SlotError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, len })?;
        if slot.is_some() {
            return Err(SlotError::Occupied { index });
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Indices that have no result yet, ascending.
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// Filled slots as `(index, value)`, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Unwraps a full arena into its values, or returns the missing indices.
    pub fn into_complete(self) -> Result<Vec<T>, Vec<usize>> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(self.slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slots_are_empty() {
        let slots: SceneSlots<u8> = SceneSlots::new(3);
        assert_eq!(slots.len(), 3);
        assert!(!slots.is_complete());
        assert_eq!(slots.missing(), vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_order_inserts_iterate_in_index_order() {
        let mut slots = SceneSlots::new(3);
        slots.insert(2, "c").unwrap();
        slots.insert(0, "a").unwrap();
        slots.insert(1, "b").unwrap();

        let values: Vec<_> = slots.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        assert_eq!(slots.into_complete().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut slots = SceneSlots::new(2);
        assert_eq!(
            slots.insert(2, 1).unwrap_err(),
            SlotError::OutOfRange { index: 2, len: 2 }
        );
    }

    #[test]
    fn test_insert_twice_rejected() {
        let mut slots = SceneSlots::new(2);
        slots.insert(1, 10).unwrap();
        assert_eq!(
            slots.insert(1, 11).unwrap_err(),
            SlotError::Occupied { index: 1 }
        );
        assert_eq!(slots.get(1), Some(&10));
    }

    #[test]
    fn test_into_complete_reports_gaps() {
        let mut slots = SceneSlots::new(4);
        slots.insert(0, ()).unwrap();
        slots.insert(3, ()).unwrap();
        assert_eq!(slots.into_complete().unwrap_err(), vec![1, 2]);
    }

    #[test]
    fn test_zero_length_is_complete() {
        let slots: SceneSlots<u8> = SceneSlots::new(0);
        assert!(slots.is_complete());
        assert!(slots.is_empty());
    }
}
