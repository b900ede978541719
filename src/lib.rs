//! A library for computing with finitely generated semigroups, monoids
//! and congruences on them.
//!
//! Two enumeration engines form the core. Given concrete generators
//! with a product operation, [`FroidurePin`](froidure_pin::FroidurePin)
//! enumerates every distinct element together with the left and right
//! Cayley graphs and a confluent set of defining relations. Given a
//! [`Presentation`](presentation::Presentation),
//! [`KnuthBendix`](kb::KnuthBendix) attempts to complete the rules into
//! a confluent rewriting system, from which word equality, normal
//! forms and class counts follow. Each engine can consume the closed
//! structure the other produces: a completed Knuth-Bendix run yields
//! elements ([`Kbe`](kbe::Kbe)) that Froidure-Pin can enumerate, and a
//! completed enumeration yields a presentation Knuth-Bendix can load.
//!
//! Both engines may legitimately run forever on infinite inputs; the
//! [`Runner`](runner::Runner) trait bounds their execution by time or
//! by predicate with cooperative cancellation, and a
//! [`Race`](race::Race) runs several of them on the same problem in
//! parallel, adopting the first to finish. A
//! [`Congruence`](congruence::Congruence) wraps a presentation, its
//! generating pairs and a race of candidate algorithms behind simple
//! membership queries.

pub mod congruence;
pub mod element;
pub mod error;
pub mod froidure_pin;
pub mod kb;
pub mod kbe;
pub mod presentation;
pub mod race;
pub mod runner;
pub mod uf;
pub mod word_graph;
pub mod words;

pub use congruence::Congruence;
pub use error::{Error, Result};
pub use froidure_pin::FroidurePin;
pub use kb::KnuthBendix;
pub use presentation::Presentation;
pub use race::Race;
pub use runner::Runner;

/// The kind of a congruence: compatible with multiplication on the
/// left, on the right, or on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongruenceKind {
    /// Closed under multiplication on the left.
    Left,
    /// Closed under multiplication on the right.
    Right,
    /// Closed under multiplication on both sides.
    TwoSided,
}

/// A three-valued truth: some structural questions (finiteness, class
/// membership) can be undecided until more of an enumeration has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tril {
    /// Known to hold.
    True,
    /// Known not to hold.
    False,
    /// Not currently known either way.
    Unknown,
}
