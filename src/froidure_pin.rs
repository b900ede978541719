//! The Froidure-Pin enumeration engine.
//!
//! Given concrete generators with an associative product, the engine
//! systematically enumerates every distinct element of the semigroup
//! they generate, discovering the left and right Cayley graphs and a
//! confluent set of defining relations along the way.
//!
//! Elements are found in military (shortlex) order of their minimal
//! words over the generators. For each element `u` of the current
//! length and each generator `g`, the product `u * g` is looked up
//! through the Cayley action whenever the suffix of the candidate word
//! is already known to be reducible; only genuinely new words reach the
//! element product, which is what makes the enumeration fast in
//! practice. Enumeration is restartable and batched, so it cooperates
//! with the [`Runner`] stopping conditions even on very large (or
//! infinite) semigroups.

use std::collections::HashMap;

use fixedbitset::FixedBitSet;
use log::{debug, info};
use rayon::prelude::*;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::presentation::Presentation;
use crate::runner::{Runner, RunnerCore};
use crate::word_graph::WordGraph;
use crate::words::{Letter, Word};
use crate::Tril;

const UNDEFINED: usize = usize::MAX;

/// The default number of products computed between two checks of the
/// stopping conditions.
pub const DEFAULT_BATCH_SIZE: usize = 8_192;

/// The default estimated cost above which the idempotent sweep runs in
/// parallel.
pub const DEFAULT_CONCURRENCY_THRESHOLD: usize = 823_543;

/// A rule discovered during enumeration: generator `gen` applied on the
/// right of element `element` equals element `target`, i.e. the word
/// `word(element) * gen` rewrites to `word(target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub element: usize,
    pub gen: usize,
    pub target: usize,
}

/// The Froidure-Pin enumeration engine over an element type.
pub struct FroidurePin<T: Element> {
    core: RunnerCore,
    gens: Vec<T>,
    letter_to_pos: Vec<usize>,
    duplicate_gens: Vec<(usize, usize)>,
    elements: Vec<T>,
    index_of: HashMap<T, usize>,
    // word information, elements[i] = first[i] * suffix[i] = prefix[i] * final[i]
    first: Vec<usize>,
    last: Vec<usize>,
    prefix: Vec<usize>,
    suffix: Vec<usize>,
    length: Vec<usize>,
    enumerate_order: Vec<usize>,
    length_index: Vec<usize>,
    left: WordGraph,
    right: WordGraph,
    reduced: FixedBitSet,
    rules: Vec<Rule>,
    // identity detection
    id: Option<T>,
    pos_one: usize,
    // enumeration cursors
    installed: bool,
    pos: usize,
    left_pos: usize,
    wordlen: usize,
    tmp_product: Option<T>,
    batch_size: usize,
    concurrency_threshold: usize,
}

impl<T: Element> Default for FroidurePin<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> FroidurePin<T> {
    /// Creates an engine with no generators.
    pub fn new() -> Self {
        let mut core = RunnerCore::new();
        core.set_report_prefix("FroidurePin");
        Self {
            core,
            gens: Vec::new(),
            letter_to_pos: Vec::new(),
            duplicate_gens: Vec::new(),
            elements: Vec::new(),
            index_of: HashMap::new(),
            first: Vec::new(),
            last: Vec::new(),
            prefix: Vec::new(),
            suffix: Vec::new(),
            length: Vec::new(),
            enumerate_order: Vec::new(),
            length_index: Vec::new(),
            left: WordGraph::default(),
            right: WordGraph::default(),
            reduced: FixedBitSet::new(),
            rules: Vec::new(),
            id: None,
            pos_one: UNDEFINED,
            installed: false,
            pos: 0,
            left_pos: 0,
            wordlen: 1,
            tmp_product: None,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency_threshold: DEFAULT_CONCURRENCY_THRESHOLD,
        }
    }

    /// Creates an engine over the given generators.
    pub fn with_generators<I: IntoIterator<Item = T>>(gens: I) -> Result<Self> {
        let mut fp = Self::new();
        fp.add_generators(gens)?;
        Ok(fp)
    }

    /// Appends a generator.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] once enumeration has begun, and
    /// [`Error::IncompatibleDegree`] if the degree differs from that of
    /// the existing generators.
    pub fn add_generator(&mut self, x: T) -> Result<()> {
        if self.started() || self.installed {
            return Err(Error::AlreadyStarted("add a generator"));
        }
        if let Some(existing) = self.gens.first() {
            if existing.degree() != x.degree() {
                return Err(Error::IncompatibleDegree {
                    expected: existing.degree(),
                    found: x.degree(),
                });
            }
        }
        self.gens.push(x);
        Ok(())
    }

    /// Appends every generator of the iterator; see
    /// [`add_generator`](Self::add_generator).
    pub fn add_generators<I: IntoIterator<Item = T>>(&mut self, gens: I) -> Result<()> {
        for x in gens {
            self.add_generator(x)?;
        }
        Ok(())
    }

    /// Sets the number of products per stopping-condition check.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// Sets the estimated cost above which
    /// [`number_of_idempotents`](Self::number_of_idempotents) sweeps in
    /// parallel.
    pub fn set_concurrency_threshold(&mut self, threshold: usize) {
        self.concurrency_threshold = threshold;
    }

    /// The number of generators, duplicates included.
    pub fn number_of_generators(&self) -> usize {
        self.gens.len()
    }

    /// The `j`-th generator.
    pub fn generator(&self, j: usize) -> Result<&T> {
        self.gens.get(j).ok_or(Error::OutOfRange {
            index: j,
            bound: self.gens.len(),
        })
    }

    /// The common degree of the generators, or 0 if there are none.
    pub fn degree(&self) -> usize {
        self.gens.first().map_or(0, Element::degree)
    }

    /// The number of elements found so far, without enumerating further.
    pub fn current_size(&self) -> usize {
        self.elements.len()
    }

    /// The number of elements found so far whose minimal word has the
    /// given length, without enumerating further.
    ///
    /// Elements are discovered in military order, so the count is final
    /// for every length the enumeration has moved past.
    pub fn current_number_of_elements_of_length(&self, len: usize) -> usize {
        if len == 0 || len > self.length_index.len() {
            return 0;
        }
        let start = self.length_index[len - 1];
        match self.length_index.get(len) {
            Some(&end) => end - start,
            None => self.enumerate_order[start..]
                .iter()
                .filter(|&&i| self.length[i] == len)
                .count(),
        }
    }

    /// The number of elements; fully enumerates first.
    pub fn size(&mut self) -> usize {
        self.run();
        self.elements.len()
    }

    /// Returns whether `x` is an element; fully enumerates first.
    pub fn contains(&mut self, x: &T) -> bool {
        self.position(x).is_some()
    }

    /// The position of `x`, fully enumerating first; `None` if `x` is
    /// not an element.
    pub fn position(&mut self, x: &T) -> Option<usize> {
        // enumeration can stop early once the element appears
        while self.index_of.get(x).is_none() && !self.finished() && !self.dead() {
            self.step();
        }
        self.current_position(x)
    }

    /// The position of `x` among the elements found so far, without
    /// enumerating.
    pub fn current_position(&self, x: &T) -> Option<usize> {
        self.index_of.get(x).copied()
    }

    /// The element at position `i` of the current enumeration.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if fewer than `i + 1` elements have been
    /// found so far.
    pub fn at(&self, i: usize) -> Result<&T> {
        self.elements.get(i).ok_or(Error::OutOfRange {
            index: i,
            bound: self.elements.len(),
        })
    }

    /// Returns `true` if the semigroup is known to contain an identity
    /// element.
    pub fn is_monoid(&self) -> bool {
        self.pos_one != UNDEFINED
    }

    /// The position of the identity, if one has been found.
    pub fn position_of_one(&self) -> Option<usize> {
        if self.pos_one == UNDEFINED {
            None
        } else {
            Some(self.pos_one)
        }
    }

    /// Whether the semigroup is finite.
    ///
    /// Finiteness is only certain once enumeration has completed;
    /// before that the answer is [`Tril::Unknown`].
    pub fn is_finite(&self) -> Tril {
        if self.finished() {
            Tril::True
        } else {
            Tril::Unknown
        }
    }

    /// Evaluates the word `w` over the generators: `g_{w0} * g_{w1} * ...`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLetter`] if a letter of `w` is not a generator
    /// index, [`Error::InvalidRule`] if `w` is empty.
    pub fn word_to_element(&self, w: &[Letter]) -> Result<T> {
        if w.is_empty() {
            return Err(Error::InvalidRule(
                "cannot evaluate the empty word in a semigroup".into(),
            ));
        }
        for &a in w {
            if a as usize >= self.gens.len() {
                return Err(Error::InvalidLetter {
                    letter: a,
                    alphabet: (0..self.gens.len() as Letter).collect(),
                });
            }
        }
        let mut out = self.gens[w[0] as usize].clone();
        for &a in &w[1..] {
            let next = T::product(&out, &self.gens[a as usize], 0);
            out = next;
        }
        Ok(out)
    }

    /// A shortlex-least word over the generators evaluating to the
    /// element at position `i`, enumerating just far enough for that
    /// position to exist.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if the semigroup is exhausted before
    /// position `i` appears.
    pub fn minimal_factorisation(&mut self, i: usize) -> Result<Word> {
        while i >= self.elements.len() && !self.finished() && !self.dead() {
            self.step();
        }
        if i >= self.elements.len() {
            return Err(Error::OutOfRange {
                index: i,
                bound: self.elements.len(),
            });
        }
        Ok(self.minimal_factorisation_no_checks(i))
    }

    /// Equivalent to [`minimal_factorisation`](Self::minimal_factorisation):
    /// every stored element is indexed by its shortlex-least word.
    pub fn factorisation(&mut self, i: usize) -> Result<Word> {
        self.minimal_factorisation(i)
    }

    fn minimal_factorisation_no_checks(&self, i: usize) -> Word {
        let mut word = Word::new();
        let mut current = i;
        loop {
            word.push(self.first[current] as Letter);
            if self.suffix[current] == UNDEFINED {
                break;
            }
            current = self.suffix[current];
        }
        word
    }

    /// The position of `at(i) * at(j)`, computed by walking the shorter
    /// of the two factorisations through the Cayley graphs rather than
    /// multiplying elements. Fully enumerates first.
    pub fn product_by_reduction(&mut self, i: usize, j: usize) -> Result<usize> {
        self.run();
        let bound = self.elements.len();
        if i >= bound {
            return Err(Error::OutOfRange { index: i, bound });
        }
        if j >= bound {
            return Err(Error::OutOfRange { index: j, bound });
        }
        Ok(self.trace_product(i, j))
    }

    // requires complete Cayley graphs
    fn trace_product(&self, i: usize, j: usize) -> usize {
        if self.length[i] <= self.length[j] {
            let word = self.minimal_factorisation_no_checks(i);
            let mut current = j;
            for &a in word.iter().rev() {
                current = self.left.target(current, a).unwrap();
            }
            current
        } else {
            let word = self.minimal_factorisation_no_checks(j);
            let mut current = i;
            for &a in &word {
                current = self.right.target(current, a).unwrap();
            }
            current
        }
    }

    /// The number of idempotents, i.e. elements with `x * x == x`.
    ///
    /// Fully enumerates first. When the estimated total cost (the
    /// product complexity of the elements times their number) reaches
    /// the concurrency threshold, the sweep over the element table runs
    /// on the rayon thread pool (the tables are immutable by then).
    pub fn number_of_idempotents(&mut self) -> usize
    where
        T: Send + Sync,
    {
        self.run();
        let n = self.elements.len();
        let complexity = self.gens.first().map_or(1, Element::complexity).max(1);
        if n.saturating_mul(complexity) >= self.concurrency_threshold {
            info!(
                "{}: counting idempotents of {} elements in parallel on {} threads",
                self.core.report_prefix(),
                n,
                num_cpus::get()
            );
            (0..n)
                .into_par_iter()
                .filter(|&i| self.trace_product(i, i) == i)
                .count()
        } else {
            (0..n).filter(|&i| self.trace_product(i, i) == i).count()
        }
    }

    /// The left Cayley graph: one node per element, and the edge
    /// labelled `j` from `i` leads to the position of `g_j * at(i)`.
    /// Fully enumerates first.
    pub fn left_cayley_graph(&mut self) -> &WordGraph {
        self.run();
        &self.left
    }

    /// The right Cayley graph: one node per element, and the edge
    /// labelled `j` from `i` leads to the position of `at(i) * g_j`.
    /// Fully enumerates first.
    pub fn right_cayley_graph(&mut self) -> &WordGraph {
        self.run();
        &self.right
    }

    /// The left Cayley graph as discovered so far, without enumerating.
    /// Rows for unprocessed elements are incomplete.
    pub fn current_left_cayley_graph(&self) -> &WordGraph {
        &self.left
    }

    /// The right Cayley graph as discovered so far, without
    /// enumerating. Rows for unprocessed elements are incomplete.
    pub fn current_right_cayley_graph(&self) -> &WordGraph {
        &self.right
    }

    /// The rules discovered so far; their closure under the Cayley
    /// action is a confluent presentation of the semigroup.
    pub fn current_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The number of rules discovered so far.
    pub fn number_of_rules(&self) -> usize {
        self.rules.len()
    }

    /// Converts the fully enumerated semigroup into a presentation on
    /// one letter per generator, whose rules are the discovered
    /// relations (plus one rule per duplicate generator).
    pub fn as_presentation(&mut self) -> Presentation {
        self.run();
        let mut p = Presentation::new();
        p.set_alphabet_size(self.gens.len()).unwrap();
        for &(dup, orig) in &self.duplicate_gens {
            p.add_rule_no_checks(&[dup as Letter], &[orig as Letter]);
        }
        for rule in &self.rules {
            let mut lhs = self.minimal_factorisation_no_checks(rule.element);
            lhs.push(rule.gen as Letter);
            let rhs = self.minimal_factorisation_no_checks(rule.target);
            p.add_rule_no_checks(&lhs, &rhs);
        }
        p
    }

    fn install_generators(&mut self) {
        self.installed = true;
        if self.gens.is_empty() {
            return;
        }
        self.id = Some(self.gens[0].one());
        for i in 0..self.gens.len() {
            let g = self.gens[i].clone();
            if let Some(&k) = self.index_of.get(&g) {
                self.letter_to_pos.push(k);
                self.duplicate_gens.push((i, self.first[k]));
            } else {
                let n = self.elements.len();
                self.index_of.insert(g.clone(), n);
                self.elements.push(g);
                self.letter_to_pos.push(n);
                self.first.push(i);
                self.last.push(i);
                self.prefix.push(UNDEFINED);
                self.suffix.push(UNDEFINED);
                self.length.push(1);
                self.enumerate_order.push(n);
                if self.id.as_ref() == Some(&self.elements[n]) {
                    self.pos_one = n;
                }
            }
        }
        let ngens = self.gens.len();
        let n = self.elements.len();
        self.left = WordGraph::new(n, ngens);
        self.right = WordGraph::new(n, ngens);
        self.reduced = FixedBitSet::with_capacity(n * ngens);
        self.length_index.push(0);
    }

    fn grow_tables(&mut self) {
        let ngens = self.gens.len();
        let n = self.elements.len();
        if self.left.number_of_nodes() < n {
            self.left.add_nodes(n - self.left.number_of_nodes());
            self.right.add_nodes(n - self.right.number_of_nodes());
            self.reduced.grow(n * ngens);
        }
    }

    // u * g_j where the suffix product s * g_j is already reducible;
    // the result is found through the Cayley action alone
    fn product_by_cayley_action(&self, i: usize, j: usize) -> usize {
        let f = self.first[i];
        let s = self.suffix[i];
        let r = self.right.target(s, j as Letter).unwrap();
        if r == self.pos_one {
            self.letter_to_pos[f]
        } else if self.prefix[r] != UNDEFINED {
            let fp = self.left.target(self.prefix[r], f as Letter).unwrap();
            self.right.target(fp, self.last[r] as Letter).unwrap()
        } else {
            self.right
                .target(self.letter_to_pos[f], self.first[r] as Letter)
                .unwrap()
        }
    }

    // computes u * g_j with an element product and installs the result
    fn product_by_multiplication(&mut self, i: usize, j: usize) {
        let mut tmp = self
            .tmp_product
            .take()
            .unwrap_or_else(|| self.gens[0].one());
        tmp.product_inplace(&self.elements[i], &self.gens[j], 0);
        match self.index_of.get(&tmp) {
            Some(&k) => {
                self.rules.push(Rule {
                    element: i,
                    gen: j,
                    target: k,
                });
                self.right.set_target(i, j as Letter, k);
                self.tmp_product = Some(tmp);
            }
            None => {
                let n = self.elements.len();
                self.index_of.insert(tmp.clone(), n);
                self.elements.push(tmp);
                self.first.push(self.first[i]);
                self.last.push(j);
                self.prefix.push(i);
                let s = if self.length[i] == 1 {
                    self.letter_to_pos[j]
                } else {
                    self.right.target(self.suffix[i], j as Letter).unwrap()
                };
                self.suffix.push(s);
                self.length.push(self.length[i] + 1);
                self.enumerate_order.push(n);
                self.grow_tables();
                self.reduced.insert(i * self.gens.len() + j);
                self.right.set_target(i, j as Letter, n);
                if self.id.as_ref() == Some(&self.elements[n]) && self.pos_one == UNDEFINED {
                    self.pos_one = n;
                }
            }
        }
    }

    // right multiplication of element i by every generator
    fn process_right(&mut self, i: usize) {
        for j in 0..self.gens.len() {
            if self.length[i] > 1 && !self.reduced[self.suffix[i] * self.gens.len() + j] {
                let k = self.product_by_cayley_action(i, j);
                self.right.set_target(i, j as Letter, k);
            } else {
                self.product_by_multiplication(i, j);
            }
        }
    }

    // left multiplication of element i by every generator, from the
    // tables alone
    fn process_left(&mut self, i: usize) {
        for j in 0..self.gens.len() {
            let target = if self.length[i] == 1 {
                // g_j * g_f
                self.right
                    .target(self.letter_to_pos[j], self.first[i] as Letter)
                    .unwrap()
            } else {
                let p = self.prefix[i];
                let jp = self.left.target(p, j as Letter).unwrap();
                self.right.target(jp, self.last[i] as Letter).unwrap()
            };
            self.left.set_target(i, j as Letter, target);
        }
    }

    fn report_progress(&mut self) {
        if self.core.should_report() {
            info!(
                "{}: found {} elements, {} rules, so far (word length {}), time {:.2?}",
                self.core.report_prefix(),
                self.elements.len(),
                self.rules.len(),
                self.wordlen,
                self.core.start_time().map(|t| t.elapsed()).unwrap_or_default()
            );
        }
    }
}

impl<T: Element> Runner for FroidurePin<T> {
    fn core(&self) -> &RunnerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RunnerCore {
        &mut self.core
    }

    /// Processes at least [`batch_size`](Self::set_batch_size) products
    /// (or until the current enumeration is complete).
    fn step(&mut self) {
        if !self.installed {
            self.install_generators();
            debug!(
                "{}: installed {} generators ({} distinct)",
                self.core.report_prefix(),
                self.gens.len(),
                self.elements.len()
            );
        }
        let ngens = self.gens.len();
        if ngens == 0 {
            return;
        }
        let mut budget = self.batch_size;
        loop {
            while self.pos < self.elements.len()
                && self.length[self.enumerate_order[self.pos]] == self.wordlen
            {
                let i = self.enumerate_order[self.pos];
                self.process_right(i);
                self.pos += 1;
                if budget <= ngens {
                    self.report_progress();
                    return;
                }
                budget -= ngens;
            }
            // the stratum of the current length is complete: fill in
            // the left Cayley graph for it before moving on
            while self.left_pos < self.pos {
                let i = self.enumerate_order[self.left_pos];
                self.process_left(i);
                self.left_pos += 1;
            }
            if self.pos == self.elements.len() {
                self.report_progress();
                return;
            }
            self.wordlen += 1;
            self.length_index.push(self.pos);
            if self.core.dead() {
                return;
            }
        }
    }

    fn finished(&self) -> bool {
        self.installed && self.pos == self.elements.len() && self.left_pos == self.pos
    }
}
