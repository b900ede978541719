//! Deterministic word graphs.
//!
//! A word graph is a finite directed graph whose edges are labelled by
//! letters, with at most one edge per (node, letter) pair. The paths
//! from a distinguished node spell words; both Cayley graphs of an
//! enumerated semigroup and the Gilman graph of a confluent rewriting
//! system are word graphs, and counting or enumerating their paths
//! answers counting and normal-form queries.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;

use crate::words::{Letter, Word};

const NO_TARGET: u32 = u32::MAX;

/// The number of paths in a word graph, which is infinite as soon as a
/// cycle is reachable from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// Exactly this many paths.
    Finite(u64),
    /// A reachable cycle makes the number of paths unbounded.
    Infinite,
}

impl Count {
    /// The finite value, or `None` for [`Count::Infinite`].
    pub fn finite(self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(n),
            Self::Infinite => None,
        }
    }
}

/// A deterministic word graph with a fixed out-degree.
///
/// Stored as one flat table with a row per node and a column per letter;
/// missing edges are holes in the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordGraph {
    num_nodes: usize,
    out_degree: usize,
    targets: Vec<u32>,
}

impl WordGraph {
    /// Creates a word graph with `num_nodes` nodes, `out_degree` labels
    /// and no edges.
    pub fn new(num_nodes: usize, out_degree: usize) -> Self {
        Self {
            num_nodes,
            out_degree,
            targets: vec![NO_TARGET; num_nodes * out_degree],
        }
    }

    /// The number of nodes.
    pub fn number_of_nodes(&self) -> usize {
        self.num_nodes
    }

    /// The number of labels.
    pub fn out_degree(&self) -> usize {
        self.out_degree
    }

    /// The number of edges present.
    pub fn number_of_edges(&self) -> usize {
        self.targets.iter().filter(|&&t| t != NO_TARGET).count()
    }

    /// Appends `n` fresh nodes with no edges.
    pub fn add_nodes(&mut self, n: usize) {
        self.num_nodes += n;
        self.targets.resize(self.num_nodes * self.out_degree, NO_TARGET);
    }

    /// The target of the edge labelled `letter` leaving `node`, if present.
    pub fn target(&self, node: usize, letter: Letter) -> Option<usize> {
        let t = self.targets[node * self.out_degree + letter as usize];
        if t == NO_TARGET {
            None
        } else {
            Some(t as usize)
        }
    }

    /// Inserts (or overwrites) the edge `node --letter--> target`.
    pub fn set_target(&mut self, node: usize, letter: Letter, target: usize) {
        debug_assert!(node < self.num_nodes && target < self.num_nodes);
        debug_assert!((letter as usize) < self.out_degree);
        self.targets[node * self.out_degree + letter as usize] = target as u32;
    }

    /// Removes the edge labelled `letter` leaving `node`, if present.
    pub fn remove_target(&mut self, node: usize, letter: Letter) {
        self.targets[node * self.out_degree + letter as usize] = NO_TARGET;
    }

    /// Follows the path labelled `word` from `node`; `None` if some edge
    /// on the way is missing.
    pub fn follow_path(&self, node: usize, word: &[Letter]) -> Option<usize> {
        let mut current = node;
        for &a in word {
            current = self.target(current, a)?;
        }
        Some(current)
    }

    /// The set of nodes reachable from `source`, as a bit set over node
    /// indices (the source itself included).
    pub fn nodes_reachable_from(&self, source: usize) -> FixedBitSet {
        let mut seen = FixedBitSet::with_capacity(self.num_nodes);
        let mut queue = VecDeque::new();
        seen.insert(source);
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            for a in 0..self.out_degree {
                if let Some(t) = self.target(v, a as Letter) {
                    if !seen.contains(t) {
                        seen.insert(t);
                        queue.push_back(t);
                    }
                }
            }
        }
        seen
    }

    /// The number of paths (of any length, to any endpoint, the empty
    /// path included) starting at `source`.
    pub fn number_of_paths(&self, source: usize) -> Count {
        // DFS with colours: cycle detection and path counting in one pass
        const UNSEEN: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        let mut colour = vec![UNSEEN; self.num_nodes];
        let mut count = vec![0u64; self.num_nodes];
        // explicit stack; an entry reappears after its successors
        let mut stack = vec![(source, false)];
        while let Some((v, expanded)) = stack.pop() {
            if expanded {
                let mut total: u64 = 1;
                for a in 0..self.out_degree {
                    if let Some(t) = self.target(v, a as Letter) {
                        total = total.saturating_add(count[t]);
                    }
                }
                count[v] = total;
                colour[v] = DONE;
            } else {
                if colour[v] != UNSEEN {
                    continue;
                }
                colour[v] = ON_STACK;
                stack.push((v, true));
                for a in 0..self.out_degree {
                    if let Some(t) = self.target(v, a as Letter) {
                        match colour[t] {
                            UNSEEN => stack.push((t, false)),
                            ON_STACK => return Count::Infinite,
                            _ => {}
                        }
                    }
                }
            }
        }
        Count::Finite(count[source])
    }

    /// An iterator over the words labelling paths from `source`, in
    /// shortlex order, the empty word first.
    pub fn paths(&self, source: usize) -> Paths<'_> {
        let mut queue = VecDeque::new();
        queue.push_back((source, Word::new()));
        Paths {
            graph: self,
            queue,
            max_length: usize::MAX,
        }
    }

    /// Like [`paths`](Self::paths), but only words of length at most
    /// `max_length` are produced, making the iterator finite.
    pub fn paths_of_length_at_most(&self, source: usize, max_length: usize) -> Paths<'_> {
        let mut paths = self.paths(source);
        paths.max_length = max_length;
        paths
    }
}

/// Iterator over the words labelling the paths from a node, produced in
/// shortlex order. See [`WordGraph::paths`].
pub struct Paths<'a> {
    graph: &'a WordGraph,
    queue: VecDeque<(usize, Word)>,
    max_length: usize,
}

impl Iterator for Paths<'_> {
    type Item = Word;

    fn next(&mut self) -> Option<Word> {
        let (node, word) = self.queue.pop_front()?;
        if word.len() < self.max_length {
            for a in 0..self.graph.out_degree {
                if let Some(t) = self.graph.target(node, a as Letter) {
                    let mut next = word.clone();
                    next.push(a as Letter);
                    self.queue.push_back((t, next));
                }
            }
        }
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two nodes, edges 0 -a-> 1, 0 -b-> 0, 1 -a-> 1, as in the Gilman
    /// graph of the bicyclic monoid.
    fn bicyclic_like() -> WordGraph {
        let mut g = WordGraph::new(2, 2);
        g.set_target(0, 0, 1);
        g.set_target(0, 1, 0);
        g.set_target(1, 0, 1);
        g
    }

    #[test]
    fn acyclic_path_count() {
        let mut g = WordGraph::new(3, 2);
        g.set_target(0, 0, 1);
        g.set_target(0, 1, 2);
        g.set_target(1, 0, 2);
        // paths: eps, a, b, aa
        assert_eq!(g.number_of_paths(0), Count::Finite(4));
        assert_eq!(g.number_of_paths(2), Count::Finite(1));
    }

    #[test]
    fn cycle_means_infinite() {
        let g = bicyclic_like();
        assert_eq!(g.number_of_paths(0), Count::Infinite);
        // node 1 only reaches the self-loop
        assert_eq!(g.number_of_paths(1), Count::Infinite);
    }

    #[test]
    fn unreachable_cycle_is_ignored() {
        let mut g = WordGraph::new(3, 1);
        g.set_target(1, 0, 2);
        g.set_target(2, 0, 1);
        assert_eq!(g.number_of_paths(0), Count::Finite(1));
    }

    #[test]
    fn paths_in_shortlex_order() {
        let g = bicyclic_like();
        let words: Vec<_> = g.paths_of_length_at_most(0, 2).collect();
        let expect: Vec<Word> = vec![
            vec![],
            vec![0],
            vec![1],
            vec![0, 0],
            vec![1, 0],
            vec![1, 1],
        ];
        assert_eq!(words, expect);
    }

    #[test]
    fn follow_path_and_reachability() {
        let g = bicyclic_like();
        assert_eq!(g.follow_path(0, &[1, 1, 0]), Some(1));
        assert_eq!(g.follow_path(1, &[1]), None);
        let reach = g.nodes_reachable_from(1);
        assert!(reach.contains(1));
        assert!(!reach.contains(0));
    }
}
