//! Reassembles a `DATA_FIRST` + `DATA`* segment chain back into a single
//! payload for a channel, mirroring the accumulate-until-total-reached
//! state machine used for fragmented dynamic-channel data.

use tracing::error;

/// Per-channel reassembly state. Empty (`total_size == 0`) when no
/// fragmented payload is in flight.
#[derive(Debug, Default)]
pub struct Reassembly {
    total_size: usize,
    data: Vec<u8>,
}

impl Reassembly {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a `DATA_FIRST` segment. Returns the payload immediately if it
    /// was not actually fragmented (first segment already carries the whole
    /// thing), otherwise buffers it and returns `None`.
    pub fn process_data_first(&mut self, total_size: usize, data: Vec<u8>) -> Option<Vec<u8>> {
        if !self.data.is_empty() {
            error!("DATA_FIRST received while a reassembly was already in progress; discarding it");
        }

        if total_size == data.len() {
            self.data.clear();
            self.total_size = 0;
            return Some(data);
        }

        self.total_size = total_size;
        self.data = data;
        None
    }

    /// Handles a `DATA` segment. Returns the completed payload once the
    /// accumulated length reaches the total announced by `DATA_FIRST`.
    pub fn process_data(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if self.total_size == 0 {
            // No fragmented payload in flight: an unfragmented DATA segment.
            return Some(data.to_vec());
        }

        self.data.extend_from_slice(data);

        match self.data.len().cmp(&self.total_size) {
            std::cmp::Ordering::Less => None,
            std::cmp::Ordering::Equal => {
                self.total_size = 0;
                Some(std::mem::take(&mut self.data))
            }
            std::cmp::Ordering::Greater => {
                error!(
                    accumulated = self.data.len(),
                    total = self.total_size,
                    "DATA segment overran the announced total length; discarding reassembly"
                );
                self.total_size = 0;
                self.data.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfragmented_data_first_completes_immediately() {
        let mut r = Reassembly::new();
        let out = r.process_data_first(3, vec![1, 2, 3]);
        assert_eq!(out, Some(vec![1, 2, 3]));
    }

    #[test]
    fn fragmented_payload_completes_after_enough_data_segments() {
        let mut r = Reassembly::new();
        assert_eq!(r.process_data_first(6, vec![1, 2, 3]), None);
        assert_eq!(r.process_data(&[4, 5]), None);
        assert_eq!(r.process_data(&[6]), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn unfragmented_data_without_a_first_segment_passes_through() {
        let mut r = Reassembly::new();
        assert_eq!(r.process_data(&[9, 9]), Some(vec![9, 9]));
    }

    #[test]
    fn overrunning_the_total_clears_state() {
        let mut r = Reassembly::new();
        r.process_data_first(2, vec![1]);
        assert_eq!(r.process_data(&[2, 3, 4]), None);

        // state was cleared; the next DATA is treated as unfragmented
        assert_eq!(r.process_data(&[5]), Some(vec![5]));
    }
}
