//! The IGVN worklist.
//!
//! A queue of node ids without duplicates. Membership is tracked in a [`BitSet`]
//! indexed by node id, so pushing a node that is already queued is a no-op. The
//! order in which nodes leave the queue is a [`WorklistOrder`].

use std::collections::VecDeque;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{compiler::config::WorklistOrder, ir::NodeId, utils::BitSet};

/// Pending nodes of an IGVN run.
pub struct Worklist {
    order: WorklistOrder,
    queue: VecDeque<NodeId>,
    members: BitSet,
    rng: Option<SmallRng>,
}

impl Worklist {
    /// Creates an empty worklist sized for `capacity` nodes.
    #[must_use]
    pub fn new(order: WorklistOrder, capacity: usize) -> Self {
        let rng = match order {
            WorklistOrder::Shuffled(seed) => Some(SmallRng::seed_from_u64(seed)),
            WorklistOrder::Fifo | WorklistOrder::Lifo => None,
        };
        Self {
            order,
            queue: VecDeque::with_capacity(capacity),
            members: BitSet::new(capacity),
            rng,
        }
    }

    /// Queues `id` unless it is already queued.
    ///
    /// Returns `true` if the node was added.
    pub fn push(&mut self, id: NodeId) -> bool {
        if id.index() >= self.members.len() {
            self.members.grow((id.index() + 1).max(self.members.len() * 2));
        }
        if !self.members.insert(id.index()) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    /// Takes the next node.
    pub fn pop(&mut self) -> Option<NodeId> {
        let id = match self.order {
            WorklistOrder::Fifo => self.queue.pop_front(),
            WorklistOrder::Lifo => self.queue.pop_back(),
            WorklistOrder::Shuffled(_) => {
                if self.queue.is_empty() {
                    None
                } else {
                    let len = self.queue.len();
                    let pick = self.rng.as_mut().map_or(0, |rng| rng.gen_range(0..len));
                    self.queue.swap_remove_back(pick)
                }
            }
        }?;
        self.members.remove(id.index());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    fn drain(list: &mut Worklist) -> Vec<NodeId> {
        std::iter::from_fn(|| list.pop()).collect()
    }

    #[test]
    fn test_fifo_and_lifo() {
        let mut fifo = Worklist::new(WorklistOrder::Fifo, 4);
        let mut lifo = Worklist::new(WorklistOrder::Lifo, 4);
        for id in ids(&[3, 1, 2]) {
            fifo.push(id);
            lifo.push(id);
        }
        assert_eq!(drain(&mut fifo), ids(&[3, 1, 2]));
        assert_eq!(drain(&mut lifo), ids(&[2, 1, 3]));
    }

    #[test]
    fn test_no_duplicates() {
        let mut list = Worklist::new(WorklistOrder::Fifo, 2);
        assert!(list.push(NodeId::new(1)));
        assert!(!list.push(NodeId::new(1)));
        assert_eq!(list.pop(), Some(NodeId::new(1)));
        assert_eq!(list.pop(), None);
        // Popped nodes can be queued again.
        assert!(list.push(NodeId::new(1)));
        assert_eq!(drain(&mut list), ids(&[1]));
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut list = Worklist::new(WorklistOrder::Lifo, 1);
        assert!(list.push(NodeId::new(100)));
        assert!(list.push(NodeId::new(5000)));
        assert!(!list.push(NodeId::new(100)));
        assert_eq!(drain(&mut list), ids(&[5000, 100]));
    }

    #[test]
    fn test_shuffled_is_seeded_permutation() {
        let run = |seed| {
            let mut list = Worklist::new(WorklistOrder::Shuffled(seed), 16);
            for id in ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]) {
                list.push(id);
            }
            drain(&mut list)
        };
        let a = run(1);
        assert_eq!(a, run(1));
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
    }
}
