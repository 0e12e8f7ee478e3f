/*! Reusable traversal flags.
 *
 * A marker is a slot in a small fixed pool paired with an epoch that grows every time a slot is
 * handed out. Blocks and instructions remember the last epoch written per slot, so resetting a
 * traversal never touches the nodes themselves: erasing the marker and handing out a fresh one
 * makes every old flag compare unequal.
 */

pub const MARKERS_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    slot: u8,
    epoch: u32,
}

impl Marker {
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    epochs: [u32; MARKERS_COUNT],
}

impl MarkerSet {
    /// Marks the owner and returns whether it was already marked.
    pub fn set_marker(&mut self, marker: Marker) -> bool {
        let was_marked = self.is_marked(marker);
        self.epochs[marker.slot()] = marker.epoch;
        was_marked
    }

    pub fn is_marked(&self, marker: Marker) -> bool {
        self.epochs[marker.slot()] == marker.epoch
    }

    pub fn reset_marker(&mut self, marker: Marker) {
        if self.is_marked(marker) {
            self.epochs[marker.slot()] = 0;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkerManager {
    current_epoch: u32,
    live: [bool; MARKERS_COUNT],
}

impl MarkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a marker in a free slot.
    ///
    /// Running out of slots means a traversal leaked its marker, which is a bug in the caller.
    /// Epochs never wrap: 0 is the unmarked stamp, and a reused epoch could match a stale one.
    pub fn new_marker(&mut self) -> Marker {
        let slot = self
            .live
            .iter()
            .position(|live| !live)
            .unwrap_or_else(|| panic!("marker pool exhausted: {} markers live", MARKERS_COUNT));
        self.current_epoch = self
            .current_epoch
            .checked_add(1)
            .unwrap_or_else(|| panic!("marker epochs exhausted after {} markers", u32::MAX));
        self.live[slot] = true;
        Marker {
            slot: slot as u8,
            epoch: self.current_epoch,
        }
    }

    pub fn erase_marker(&mut self, marker: Marker) {
        debug_assert!(self.live[marker.slot()], "erasing a marker that is not live");
        self.live[marker.slot()] = false;
    }

    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|live| **live).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_previous_state() {
        let mut manager = MarkerManager::new();
        let marker = manager.new_marker();
        let mut set = MarkerSet::default();

        assert!(!set.set_marker(marker));
        assert!(set.set_marker(marker));
        assert!(set.is_marked(marker));

        set.reset_marker(marker);
        assert!(!set.is_marked(marker));
    }

    #[test]
    fn test_reused_slot_is_stale() {
        let mut manager = MarkerManager::new();
        let first = manager.new_marker();
        let mut set = MarkerSet::default();
        set.set_marker(first);
        manager.erase_marker(first);

        let second = manager.new_marker();
        assert_eq!(first.slot(), second.slot());
        assert!(!set.is_marked(second));
    }

    #[test]
    fn test_markers_are_independent() {
        let mut manager = MarkerManager::new();
        let a = manager.new_marker();
        let b = manager.new_marker();
        let mut set = MarkerSet::default();
        set.set_marker(a);
        assert!(set.is_marked(a));
        assert!(!set.is_marked(b));
        assert_eq!(manager.live_count(), 2);
    }

    #[test]
    #[should_panic(expected = "marker epochs exhausted")]
    fn test_epoch_overflow_is_fatal() {
        let mut manager = MarkerManager {
            current_epoch: u32::MAX - 1,
            ..MarkerManager::default()
        };
        let last = manager.new_marker();
        assert_eq!(last.epoch(), u32::MAX);
        assert!(!MarkerSet::default().is_marked(last));
        manager.erase_marker(last);
        manager.new_marker();
    }

    #[test]
    #[should_panic(expected = "marker pool exhausted")]
    fn test_pool_exhaustion_is_fatal() {
        let mut manager = MarkerManager::new();
        for _ in 0..=MARKERS_COUNT {
            manager.new_marker();
        }
    }
}
