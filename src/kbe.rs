//! Elements of a semigroup presented by a confluent rewriting system.
//!
//! A [`Kbe`] wraps the normal form of a class of a completed
//! Knuth-Bendix run; the product of two elements is concatenation
//! followed by reduction. This is what lets a completed [`KnuthBendix`]
//! engine act as the source of a [`FroidurePin`] enumeration of the
//! quotient semigroup: the two engines each consume the closed
//! structure the other produces.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::froidure_pin::FroidurePin;
use crate::kb::KnuthBendix;
use crate::runner::Runner;
use crate::words::Word;

type Bytes = Vec<u8>;

/// A frozen confluent rewriting system: the active rules of a finished
/// Knuth-Bendix run, detached from the engine so that elements can
/// share it immutably across threads.
#[derive(Debug)]
pub struct FrozenSystem {
    rules: Vec<(Bytes, Bytes)>,
}

impl FrozenSystem {
    fn rewrite(&self, w: &mut Bytes) {
        let mut out = Bytes::with_capacity(w.len());
        let mut rest = std::mem::take(w);
        rest.reverse();
        while let Some(a) = rest.pop() {
            out.push(a);
            if let Some((lhs, rhs)) = self.rules.iter().find(|(lhs, _)| out.ends_with(lhs)) {
                out.truncate(out.len() - lhs.len());
                rest.extend(rhs.iter().rev());
            }
        }
        *w = out;
    }
}

/// An element of the semigroup presented by a confluent rewriting
/// system, stored as its normal form.
#[derive(Debug, Clone)]
pub struct Kbe {
    system: Arc<FrozenSystem>,
    word: Bytes,
}

impl Kbe {
    fn new(system: Arc<FrozenSystem>, mut word: Bytes) -> Self {
        system.rewrite(&mut word);
        Self { system, word }
    }

    /// The normal form of this element, over the internal alphabet of
    /// the system it belongs to.
    pub(crate) fn internal_word(&self) -> &[u8] {
        &self.word
    }
}

// Elements of the same semigroup share their system, so only the
// normal form takes part in comparisons.
impl PartialEq for Kbe {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word
    }
}

impl Eq for Kbe {}

impl PartialOrd for Kbe {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Kbe {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // shortlex, compatible with the enumeration order
        (self.word.len(), &self.word).cmp(&(other.word.len(), &other.word))
    }
}

impl Hash for Kbe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.word.hash(state);
    }
}

impl Element for Kbe {
    fn product_inplace(&mut self, x: &Self, y: &Self, _thread_id: usize) {
        self.word.clear();
        self.word.extend_from_slice(&x.word);
        self.word.extend_from_slice(&y.word);
        let system = Arc::clone(&x.system);
        system.rewrite(&mut self.word);
        self.system = system;
    }

    fn degree(&self) -> usize {
        0
    }

    fn increase_degree(&mut self, _n: usize) {}

    fn one(&self) -> Self {
        Self {
            system: Arc::clone(&self.system),
            word: Bytes::new(),
        }
    }

    fn complexity(&self) -> usize {
        self.word.len() + 1
    }
}

impl KnuthBendix {
    /// Builds a Froidure-Pin enumeration of the semigroup presented by
    /// this engine, with one [`Kbe`] generator per alphabet letter.
    ///
    /// Runs the engine to completion first. The enumeration terminates
    /// exactly when the presented semigroup is finite; bound the run
    /// with the usual [`Runner`] operations otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::NotYetImplemented`] if completion cannot be reached.
    pub fn froidure_pin(&mut self) -> Result<FroidurePin<Kbe>> {
        self.run();
        if !self.finished() {
            return Err(Error::NotYetImplemented(
                "enumerating a system that did not reach confluence",
            ));
        }
        let system = Arc::new(FrozenSystem {
            rules: self.internal_active_rules(),
        });
        let n = self.internal_alphabet_size();
        FroidurePin::with_generators(
            (1..=n as u8).map(|a| Kbe::new(Arc::clone(&system), vec![a])),
        )
    }

    /// The word, over this engine's external alphabet, of an element
    /// produced by [`froidure_pin`](Self::froidure_pin).
    pub fn element_to_word(&self, x: &Kbe) -> Word {
        self.internal_to_external_word(x.internal_word())
    }
}
