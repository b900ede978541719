//! Congruences on finitely presented and concrete semigroups.
//!
//! A [`Congruence`] holds a congruence kind, a presentation of the
//! underlying semigroup, and the generating pairs to be identified. It
//! answers equality-of-classes queries by racing several runners on the
//! same problem: a Knuth-Bendix engine over the presentation plus the
//! pairs, and a [`PairOrbit`] enumerator that closes the pairs under
//! the generator action on an enumerated copy of the semigroup. The
//! first runner to finish decides the query; external coset-style
//! enumerators can be registered alongside under their own kind tag.

use std::collections::VecDeque;

use log::debug;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::froidure_pin::FroidurePin;
use crate::kb::KnuthBendix;
use crate::kbe::Kbe;
use crate::presentation::Presentation;
use crate::race::Race;
use crate::runner::{Runner, RunnerCore};
use crate::uf::UnionFind;
use crate::words::{Letter, Word};
use crate::{CongruenceKind, Tril};

/// The algorithm family a congruence runner belongs to, used to locate
/// a particular runner in the race without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    /// Knuth-Bendix completion on the presentation plus the pairs.
    KnuthBendix,
    /// Pair-orbit enumeration over an enumerated semigroup.
    PairOrbit,
    /// An external Todd-Coxeter style coset enumerator.
    ToddCoxeter,
    /// An external small-overlap checker.
    Kambites,
}

/// A runner that can decide membership of pairs in a congruence.
pub trait CongruenceRunner: Runner + Send {
    /// The algorithm family of this runner.
    fn runner_kind(&self) -> RunnerKind;

    /// Decides whether `(u, v)` lies in the congruence, running as far
    /// as necessary.
    fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool>;

    /// Reports a verdict from the work done so far, without running.
    fn currently_contains(&mut self, u: &[Letter], v: &[Letter]) -> Tril;

    /// The non-trivial classes of the congruence, where supported.
    fn non_trivial_classes(&mut self) -> Result<Vec<Vec<Word>>> {
        Err(Error::NotYetImplemented(
            "non-trivial classes for this runner kind",
        ))
    }
}

impl CongruenceRunner for KnuthBendix {
    fn runner_kind(&self) -> RunnerKind {
        RunnerKind::KnuthBendix
    }

    fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.equal_to(u, v)
    }

    fn currently_contains(&mut self, u: &[Letter], v: &[Letter]) -> Tril {
        match self.currently_equal(u, v) {
            Err(_) => Tril::Unknown,
            Ok(true) => Tril::True,
            Ok(false) => {
                if self.finished() {
                    Tril::False
                } else {
                    Tril::Unknown
                }
            }
        }
    }
}

/// Enumerates a congruence as the orbit of its generating pairs.
///
/// The underlying semigroup is enumerated (through Knuth-Bendix
/// completion of the presentation followed by a Froidure-Pin run over
/// its normal forms), a union-find over the element indices is seeded
/// with the generating pairs, and the pairs are closed under left
/// and/or right multiplication by the generators according to the
/// congruence kind. Finishes exactly when the underlying semigroup is
/// finite and the orbit closes.
pub struct PairOrbit {
    core: RunnerCore,
    kind: CongruenceKind,
    presentation: Presentation,
    pairs: Vec<(Word, Word)>,
    base: Option<KnuthBendix>,
    fp: Option<FroidurePin<Kbe>>,
    uf: UnionFind,
    queue: VecDeque<(usize, usize)>,
    orbit_initialised: bool,
    failed: bool,
}

/// Pairs processed per step of a [`PairOrbit`].
const PAIR_BATCH: usize = 1_024;

impl PairOrbit {
    /// Creates an orbit enumerator for the congruence of `kind` on the
    /// semigroup presented by `presentation`, generated by `pairs`.
    ///
    /// # Errors
    ///
    /// Any validation error of [`KnuthBendix::new`], and
    /// [`Error::InvalidLetter`] for a pair word outside the alphabet.
    pub fn new(
        kind: CongruenceKind,
        presentation: Presentation,
        pairs: Vec<(Word, Word)>,
    ) -> Result<Self> {
        for (u, v) in &pairs {
            presentation.validate_word(u)?;
            presentation.validate_word(v)?;
        }
        let mut core = RunnerCore::new();
        core.set_report_prefix("PairOrbit");
        Ok(Self {
            core,
            kind,
            presentation,
            pairs,
            base: None,
            fp: None,
            uf: UnionFind::new(0),
            queue: VecDeque::new(),
            orbit_initialised: false,
            failed: false,
        })
    }

    fn position_of_word(&self, w: &[Letter]) -> Result<usize> {
        let fp = self.fp.as_ref().expect("the orbit has been initialised");
        let indices: Word = w
            .iter()
            .map(|&a| match self.presentation.index(a) {
                Some(i) => Ok(i as Letter),
                None => Err(Error::InvalidLetter {
                    letter: a,
                    alphabet: self.presentation.alphabet().to_vec(),
                }),
            })
            .collect::<Result<_>>()?;
        let element = if indices.is_empty() {
            fp.generator(0)?.one()
        } else {
            fp.word_to_element(&indices)?
        };
        fp.current_position(&element).ok_or_else(|| {
            Error::InvalidRule("the word does not denote an element of the semigroup".into())
        })
    }

    /// Decides membership of `(u, v)`, running to completion.
    pub fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        self.run();
        if !self.finished() {
            return Err(Error::NotYetImplemented(
                "pair-orbit membership before the orbit closes",
            ));
        }
        let x = self.position_of_word(u)?;
        let y = self.position_of_word(v)?;
        Ok(self.uf.find(x) == self.uf.find(y))
    }

    /// Reports a verdict from the pairs united so far.
    pub fn currently_contains(&mut self, u: &[Letter], v: &[Letter]) -> Tril {
        if u == v {
            return Tril::True;
        }
        if !self.orbit_initialised {
            return Tril::Unknown;
        }
        let (x, y) = match (self.position_of_word(u), self.position_of_word(v)) {
            (Ok(x), Ok(y)) => (x, y),
            _ => return Tril::Unknown,
        };
        if self.uf.find(x) == self.uf.find(y) {
            Tril::True
        } else if self.finished() {
            Tril::False
        } else {
            Tril::Unknown
        }
    }

    /// The number of classes of the congruence, after the orbit closes.
    pub fn number_of_classes(&mut self) -> Result<usize> {
        self.run();
        if !self.finished() {
            return Err(Error::NotYetImplemented(
                "counting classes before the orbit closes",
            ));
        }
        Ok(self.uf.number_of_blocks())
    }

    /// The classes with more than one element, as words over the
    /// presentation's alphabet, each class in discovery order.
    pub fn non_trivial_classes(&mut self) -> Result<Vec<Vec<Word>>> {
        self.run();
        if !self.finished() {
            return Err(Error::NotYetImplemented(
                "non-trivial classes before the orbit closes",
            ));
        }
        let base = self.base.as_ref().expect("the orbit has been initialised");
        let fp = self.fp.as_ref().expect("the orbit has been initialised");
        let n = fp.current_size();
        let mut grouped: Vec<Vec<Word>> = vec![Vec::new(); n];
        for i in 0..n {
            let root = self.uf.find(i);
            grouped[root].push(base.element_to_word(fp.at(i)?));
        }
        Ok(grouped.into_iter().filter(|c| c.len() > 1).collect())
    }

    fn unite_and_enqueue(&mut self, x: usize, y: usize) {
        if self.uf.find(x) != self.uf.find(y) {
            self.uf.unite(x, y);
            self.queue.push_back((x, y));
        }
    }

    fn init_orbit(&mut self) -> Result<()> {
        let n = self.fp.as_ref().unwrap().current_size();
        self.uf = UnionFind::new(n);
        let pairs = self.pairs.clone();
        for (u, v) in &pairs {
            let x = self.position_of_word(u)?;
            let y = self.position_of_word(v)?;
            self.unite_and_enqueue(x, y);
        }
        self.orbit_initialised = true;
        debug!(
            "PairOrbit: seeded {} pairs over {} elements",
            self.queue.len(),
            n
        );
        Ok(())
    }
}

impl Runner for PairOrbit {
    fn core(&self) -> &RunnerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RunnerCore {
        &mut self.core
    }

    fn step(&mut self) {
        if self.failed {
            return;
        }
        // phase 1: complete the presentation
        if self.fp.is_none() {
            if self.base.is_none() {
                match KnuthBendix::new(CongruenceKind::TwoSided, self.presentation.clone()) {
                    Ok(kb) => self.base = Some(kb),
                    Err(_) => {
                        self.failed = true;
                        return;
                    }
                }
            }
            let base = self.base.as_mut().unwrap();
            base.step();
            if base.stalled() {
                self.failed = true;
            } else if base.finished() {
                match base.froidure_pin() {
                    Ok(fp) => self.fp = Some(fp),
                    Err(_) => self.failed = true,
                }
            }
            return;
        }
        // phase 2: enumerate the semigroup
        let fp = self.fp.as_mut().unwrap();
        if !fp.finished() {
            fp.step();
            return;
        }
        // phase 3: close the pair orbit
        if !self.orbit_initialised {
            if self.init_orbit().is_err() {
                self.failed = true;
            }
            return;
        }
        let ngens = self.presentation.alphabet().len();
        for _ in 0..PAIR_BATCH {
            let (x, y) = match self.queue.pop_front() {
                Some(pair) => pair,
                None => break,
            };
            for j in 0..ngens {
                if self.kind != CongruenceKind::Left {
                    let (xj, yj) = {
                        let right = self.fp.as_ref().unwrap().current_right_cayley_graph();
                        (
                            right.target(x, j as Letter).unwrap(),
                            right.target(y, j as Letter).unwrap(),
                        )
                    };
                    self.unite_and_enqueue(xj, yj);
                }
                if self.kind != CongruenceKind::Right {
                    let (jx, jy) = {
                        let left = self.fp.as_ref().unwrap().current_left_cayley_graph();
                        (
                            left.target(x, j as Letter).unwrap(),
                            left.target(y, j as Letter).unwrap(),
                        )
                    };
                    self.unite_and_enqueue(jx, jy);
                }
            }
            if self.core.dead() {
                return;
            }
        }
    }

    fn finished(&self) -> bool {
        self.orbit_initialised && self.queue.is_empty() && !self.failed
    }

    fn stalled(&self) -> bool {
        self.failed || self.base.as_ref().map_or(false, |kb| kb.stalled())
    }
}

impl CongruenceRunner for PairOrbit {
    fn runner_kind(&self) -> RunnerKind {
        RunnerKind::PairOrbit
    }

    fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        PairOrbit::contains(self, u, v)
    }

    fn currently_contains(&mut self, u: &[Letter], v: &[Letter]) -> Tril {
        PairOrbit::currently_contains(self, u, v)
    }

    fn non_trivial_classes(&mut self) -> Result<Vec<Vec<Word>>> {
        PairOrbit::non_trivial_classes(self)
    }
}

/// A congruence on a finitely presented semigroup, answered by racing
/// candidate algorithms.
pub struct Congruence {
    kind: CongruenceKind,
    presentation: Presentation,
    pairs: Vec<(Word, Word)>,
    race: Race<Box<dyn CongruenceRunner>>,
    initialised: bool,
}

impl Congruence {
    /// Creates a congruence of the given kind on the semigroup
    /// presented by `presentation`.
    ///
    /// # Errors
    ///
    /// Any error of [`Presentation::validate`].
    pub fn new(kind: CongruenceKind, presentation: Presentation) -> Result<Self> {
        presentation.validate()?;
        Ok(Self {
            kind,
            presentation,
            pairs: Vec::new(),
            race: Race::new(),
            initialised: false,
        })
    }

    /// Creates a congruence on a concrete, enumerated semigroup, via
    /// the confluent presentation its enumeration discovered. Words in
    /// queries are over one letter per generator of the semigroup.
    pub fn from_froidure_pin<T: Element>(
        kind: CongruenceKind,
        fp: &mut FroidurePin<T>,
    ) -> Result<Self> {
        Self::new(kind, fp.as_presentation())
    }

    /// The congruence kind.
    pub fn kind(&self) -> CongruenceKind {
        self.kind
    }

    /// Adds a generating pair to the congruence.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] once the race has been constructed, or
    /// [`Error::InvalidLetter`] for words outside the alphabet.
    pub fn add_generating_pair(&mut self, u: &[Letter], v: &[Letter]) -> Result<()> {
        if self.initialised {
            return Err(Error::AlreadyStarted("add a generating pair"));
        }
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        self.pairs.push((u.to_vec(), v.to_vec()));
        Ok(())
    }

    /// Registers an externally constructed runner (for example a coset
    /// enumerator) to race alongside the built-in ones.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] once the race has been constructed.
    pub fn add_runner(&mut self, runner: Box<dyn CongruenceRunner>) -> Result<()> {
        if self.initialised {
            return Err(Error::AlreadyStarted("add a runner"));
        }
        self.race.add_runner(runner);
        Ok(())
    }

    /// The index of the first runner of the given kind, if any.
    pub fn find_runner(&mut self, kind: RunnerKind) -> Result<Option<usize>> {
        self.ensure_runners()?;
        Ok(self.race.find_runner(|r| r.runner_kind() == kind))
    }

    fn ensure_runners(&mut self) -> Result<()> {
        if self.initialised {
            return Ok(());
        }
        self.initialised = true;
        let mut kb = KnuthBendix::new(self.kind, self.presentation.clone())?;
        for (u, v) in &self.pairs {
            kb.add_generating_pair(u, v)?;
        }
        self.race.add_runner(Box::new(kb));
        let orbit = PairOrbit::new(self.kind, self.presentation.clone(), self.pairs.clone())?;
        self.race.add_runner(Box::new(orbit));
        debug!(
            "Congruence: racing {} runners for {} generating pairs",
            self.race.number_of_runners(),
            self.pairs.len()
        );
        Ok(())
    }

    /// Decides whether `(u, v)` lies in the congruence, racing the
    /// runners to completion.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLetter`] for words outside the alphabet, and
    /// [`Error::NotYetImplemented`] if no runner finished (for example
    /// after a kill).
    pub fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        self.ensure_runners()?;
        self.race.run();
        match self.race.winner_mut() {
            Some(winner) => winner.contains(u, v),
            None => Err(Error::NotYetImplemented(
                "deciding a congruence no runner finished for",
            )),
        }
    }

    /// Polls every runner for a verdict on `(u, v)` reachable without
    /// further running; [`Tril::Unknown`] if none has one.
    pub fn currently_contains(&mut self, u: &[Letter], v: &[Letter]) -> Tril {
        if u == v {
            return Tril::True;
        }
        if self.ensure_runners().is_err() {
            return Tril::Unknown;
        }
        for runner in self.race.runners_mut() {
            match runner.currently_contains(u, v) {
                Tril::Unknown => continue,
                verdict => return verdict,
            }
        }
        Tril::Unknown
    }

    /// The non-trivial classes of the congruence, computed by the
    /// pair-orbit runner.
    ///
    /// # Errors
    ///
    /// [`Error::NotYetImplemented`] if the underlying semigroup cannot
    /// be enumerated.
    pub fn non_trivial_classes(&mut self) -> Result<Vec<Vec<Word>>> {
        self.ensure_runners()?;
        let index = self
            .race
            .find_runner(|r| r.runner_kind() == RunnerKind::PairOrbit)
            .ok_or(Error::NotYetImplemented(
                "non-trivial classes without a pair-orbit runner",
            ))?;
        let runner = &mut self.race.runners_mut()[index];
        runner.run();
        runner.non_trivial_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::of_strings;
    use crate::words::from_str;

    fn two_class_band() -> Presentation {
        // a and b idempotent, b absorbing: the semigroup {a, b}
        of_strings("ab", false, &[("aa", "a"), ("bb", "b"), ("ab", "b"), ("ba", "b")]).unwrap()
    }

    #[test]
    fn pair_orbit_closes_a_finite_congruence() {
        let p = two_class_band();
        let mut orbit = PairOrbit::new(
            CongruenceKind::TwoSided,
            p,
            vec![(from_str("a"), from_str("b"))],
        )
        .unwrap();
        assert!(orbit.contains(&from_str("a"), &from_str("b")).unwrap());
        assert_eq!(orbit.number_of_classes().unwrap(), 1);
        let classes = orbit.non_trivial_classes().unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].len(), 2);
    }

    #[test]
    fn trivial_congruence_separates() {
        let p = two_class_band();
        let mut orbit = PairOrbit::new(CongruenceKind::TwoSided, p, Vec::new()).unwrap();
        assert!(!orbit.contains(&from_str("a"), &from_str("b")).unwrap());
        assert_eq!(orbit.number_of_classes().unwrap(), 2);
        assert!(orbit.non_trivial_classes().unwrap().is_empty());
    }

    #[test]
    fn congruence_race_decides() {
        let mut cong = Congruence::new(CongruenceKind::TwoSided, two_class_band()).unwrap();
        cong.add_generating_pair(&from_str("a"), &from_str("b"))
            .unwrap();
        assert!(cong.contains(&from_str("ab"), &from_str("a")).unwrap());
        assert!(cong.contains(&from_str("aa"), &from_str("bb")).unwrap());
        // a winner exists and can be found by kind
        let kb = cong.find_runner(RunnerKind::KnuthBendix).unwrap();
        assert!(kb.is_some());
        assert_eq!(cong.find_runner(RunnerKind::ToddCoxeter).unwrap(), None);
    }

    #[test]
    fn currently_contains_does_not_run() {
        let mut cong = Congruence::new(CongruenceKind::TwoSided, two_class_band()).unwrap();
        cong.add_generating_pair(&from_str("a"), &from_str("b"))
            .unwrap();
        assert_eq!(
            cong.currently_contains(&from_str("a"), &from_str("a")),
            Tril::True
        );
        // no runner has done any work yet, so no determinate answer
        // is required; after deciding, the verdict must be True
        cong.contains(&from_str("a"), &from_str("b")).unwrap();
        assert_eq!(
            cong.currently_contains(&from_str("a"), &from_str("b")),
            Tril::True
        );
    }

    #[test]
    fn one_sided_congruences_differ() {
        // right congruence generated by (a, b) on the free band-ish
        // presentation: closing only on the right separates less than
        // the two-sided closure on asymmetric semigroups
        let p = of_strings(
            "ab",
            false,
            &[("aa", "a"), ("bb", "b"), ("aba", "a"), ("bab", "b")],
        )
        .unwrap();
        let mut right = PairOrbit::new(
            CongruenceKind::Right,
            p.clone(),
            vec![(from_str("a"), from_str("b"))],
        )
        .unwrap();
        let mut two = PairOrbit::new(
            CongruenceKind::TwoSided,
            p,
            vec![(from_str("a"), from_str("b"))],
        )
        .unwrap();
        let r = right.number_of_classes().unwrap();
        let t = two.number_of_classes().unwrap();
        assert!(r >= t);
    }
}
