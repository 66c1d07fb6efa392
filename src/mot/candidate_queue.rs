use std::cmp::Ordering;

// Candidate pair (record, point) for the greedy matcher.
// Ordering is reversed so that std::collections::BinaryHeap pops the closest pair first;
// equal distances fall back to the lower track id, then the lower point index.
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate {
    pub distance: f32,
    pub track_id: u64,
    pub point_index: usize,
}

impl MatchCandidate {
    pub fn new(track_id: u64, point_index: usize, distance: f32) -> Self {
        MatchCandidate {
            distance,
            track_id,
            point_index,
        }
    }
}

impl PartialEq for MatchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MatchCandidate {}

impl PartialOrd for MatchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // self.distance < other.distance means self is "greater"
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.track_id.cmp(&self.track_id))
            .then_with(|| other.point_index.cmp(&self.point_index))
    }
}

#[cfg(test)]
mod tests {
    use super::MatchCandidate;
    use std::collections::BinaryHeap;

    #[test]
    fn test_min_heap() {
        let mut priority_queue: BinaryHeap<MatchCandidate> = BinaryHeap::new();
        priority_queue.push(MatchCandidate::new(4, 0, 4.0));
        priority_queue.push(MatchCandidate::new(2, 0, 2.0));
        priority_queue.push(MatchCandidate::new(3, 0, 3.0));
        priority_queue.push(MatchCandidate::new(1, 0, 1.0));

        assert_eq!(priority_queue.pop().unwrap().distance, 1.0);
        assert_eq!(priority_queue.pop().unwrap().distance, 2.0);
        assert_eq!(priority_queue.pop().unwrap().distance, 3.0);
        assert_eq!(priority_queue.pop().unwrap().distance, 4.0);
    }

    #[test]
    fn test_ties_are_deterministic() {
        let mut priority_queue: BinaryHeap<MatchCandidate> = BinaryHeap::new();
        priority_queue.push(MatchCandidate::new(9, 1, 5.0));
        priority_queue.push(MatchCandidate::new(3, 2, 5.0));
        priority_queue.push(MatchCandidate::new(3, 0, 5.0));

        let order: Vec<(u64, usize)> = std::iter::from_fn(|| priority_queue.pop())
            .map(|c| (c.track_id, c.point_index))
            .collect();
        assert_eq!(order, vec![(3, 0), (3, 2), (9, 1)]);
    }
}
