//! Second-chance ring over stable frame identifiers.

use alloc::collections::VecDeque;

/// What the clock hand finds at a ring position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Probe {
    /// Recently used. The probe has cleared the accessed bit.
    Accessed,
    /// Not used since the last pass: take it.
    Idle,
    /// Not a candidate at all.
    Skip,
}

/// Keys in insertion order; the front is the clock hand.
pub(crate) struct ClockRing<K> {
    ring: VecDeque<K>,
}

impl<K: Copy + Eq> ClockRing<K> {
    pub(crate) const fn new() -> Self {
        Self {
            ring: VecDeque::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: K) {
        self.ring.push_back(key);
    }

    pub(crate) fn remove(&mut self, key: K) -> bool {
        self.ring
            .iter()
            .position(|k| *k == key)
            .and_then(|i| self.ring.remove(i))
            .is_some()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.ring.iter().copied()
    }

    /// Advance the hand until `probe` reports [`Probe::Idle`], for at most two
    /// full passes.
    ///
    /// Every key the hand passes over moves to the back, the chosen one
    /// included. The first pass clears the accessed bits it meets, so the
    /// second finds a victim unless every key is skipped.
    pub(crate) fn select(&mut self, mut probe: impl FnMut(K) -> Probe) -> Option<K> {
        let steps = self.ring.len() * 2;
        for _ in 0..steps {
            let key = self.ring.pop_front()?;
            self.ring.push_back(key);
            match probe(key) {
                Probe::Idle => return Some(key),
                Probe::Accessed | Probe::Skip => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn empty_ring_has_no_victim() {
        let mut ring = ClockRing::<u32>::new();
        assert_eq!(ring.select(|_| Probe::Idle), None);
    }

    #[test]
    fn first_idle_key_wins_and_moves_to_back() {
        let mut ring = ClockRing::new();
        for k in [1, 2, 3] {
            ring.insert(k);
        }
        let victim = ring.select(|k| if k == 2 { Probe::Idle } else { Probe::Accessed });
        assert_eq!(victim, Some(2));
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn second_pass_takes_the_first_cleared_key() {
        let mut ring = ClockRing::new();
        for k in 0..4 {
            ring.insert(k);
        }
        let mut accessed: BTreeSet<u32> = (0..4).collect();
        let mut probes = 0;
        let victim = ring.select(|k| {
            probes += 1;
            if accessed.remove(&k) {
                Probe::Accessed
            } else {
                Probe::Idle
            }
        });
        assert_eq!(victim, Some(0));
        assert_eq!(probes, 5);
        assert!(accessed.is_empty(), "every bit cleared before reuse");
    }

    #[test]
    fn gives_up_after_two_passes() {
        let mut ring = ClockRing::new();
        for k in 0..3 {
            ring.insert(k);
        }
        let mut probes = 0;
        assert_eq!(
            ring.select(|_| {
                probes += 1;
                Probe::Skip
            }),
            None
        );
        assert_eq!(probes, 6);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn remove_drops_only_the_key() {
        let mut ring = ClockRing::new();
        for k in [7, 8, 9] {
            ring.insert(k);
        }
        assert!(ring.remove(8));
        assert!(!ring.remove(8));
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![7, 9]);
    }
}
