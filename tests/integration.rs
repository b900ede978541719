//! Integration tests exercising the engines on well-known semigroups
//! and monoids, and the interplay between them.

use std::sync::Once;
use std::time::Duration;

use semigroups::congruence::PairOrbit;
use semigroups::element::Transformation;
use semigroups::kb::{self, KnuthBendix};
use semigroups::presentation::{helpers, of_strings};
use semigroups::runner::State;
use semigroups::word_graph::Count;
use semigroups::words::{from_str, Word};
use semigroups::{Congruence, CongruenceKind, FroidurePin, Runner, Tril};

static LOGGER: Once = Once::new();

fn init() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn words(strs: &[&str]) -> Vec<Word> {
    strs.iter().map(|s| from_str(s)).collect()
}

/// The bicyclic monoid `<a, b | ab = 1>`: one active rule after
/// completion, infinitely many classes, and the normal forms are the
/// words without the factor `ab`.
#[test]
fn bicyclic_monoid() {
    init();
    let p = of_strings("ab", true, &[("ab", "")]).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    kb.run();
    assert!(kb.finished());
    assert!(kb.confluent());
    assert_eq!(kb.number_of_active_rules(), 1);
    assert_eq!(kb.number_of_classes().unwrap(), Count::Infinite);
    assert_eq!(kb.is_finite(), Tril::False);
    assert_eq!(
        kb.normal_forms_of_length_at_most(3).unwrap(),
        words(&["", "a", "b", "aa", "ba", "bb", "aaa", "baa", "bba", "bbb"])
    );
}

/// The symmetric group S4 presented on `a = (1 2)`, `b = (1 2 3 4)`
/// and its inverse: 11 active rules and 24 classes.
#[test]
fn symmetric_group_s4() {
    init();
    let mut p = of_strings("abB", true, &[("bb", "B"), ("BaBa", "abab")]).unwrap();
    helpers::add_inverse_rules(&mut p, &from_str("aBb"), None).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    kb::by_overlap_length(&mut kb);
    assert!(kb.confluent());
    assert_eq!(kb.number_of_active_rules(), 11);
    assert_eq!(kb.number_of_classes().unwrap(), Count::Finite(24));
    assert_eq!(kb.is_finite(), Tril::True);
    // a completed system enumerates as a semigroup of the same size
    let mut s = kb.froidure_pin().unwrap();
    assert_eq!(s.size(), 24);
}

/// The free abelian group on two generators, via inverse pairs and one
/// commutation: 8 active rules, 41 normal forms of length at most 4.
#[test]
fn free_abelian_group_rank_2() {
    init();
    let mut p = of_strings("aAbB", true, &[("ba", "ab")]).unwrap();
    helpers::add_inverse_rules(&mut p, &from_str("AaBb"), None).unwrap();
    assert_eq!(p.number_of_rules(), 5);
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    kb.run();
    assert!(kb.confluent());
    assert_eq!(kb.number_of_active_rules(), 8);
    assert_eq!(kb.number_of_classes().unwrap(), Count::Infinite);
    let forms = kb.normal_forms_of_length_at_most(4).unwrap();
    assert_eq!(forms.len(), 41);
    let length_3: Vec<Word> = forms.iter().filter(|w| w.len() == 3).cloned().collect();
    assert_eq!(
        length_3,
        words(&[
            "aaa", "aab", "aaB", "abb", "aBB", "AAA", "AAb", "AAB", "Abb", "ABB", "bbb", "BBB",
        ])
    );
}

/// Froidure-Pin on five transformations of degree six: 7776 elements,
/// 537 idempotents, 2459 rules.
#[test]
fn froidure_pin_on_transformations() {
    init();
    let gens = vec![
        Transformation::new(vec![0, 1, 2, 3, 4, 5]),
        Transformation::new(vec![1, 0, 2, 3, 4, 5]),
        Transformation::new(vec![4, 0, 1, 2, 3, 5]),
        Transformation::new(vec![5, 1, 2, 3, 4, 5]),
        Transformation::new(vec![1, 1, 2, 3, 4, 5]),
    ];
    let mut s = FroidurePin::with_generators(gens).unwrap();
    assert_eq!(s.size(), 7776);
    assert!(s.is_monoid());
    assert_eq!(s.number_of_idempotents(), 537);
    assert_eq!(s.number_of_rules(), 2459);
    assert_eq!(s.is_finite(), Tril::True);
}

/// The parallel idempotent sweep agrees with the sequential one.
#[test]
fn parallel_idempotent_sweep() {
    init();
    let gens = vec![
        Transformation::new(vec![1, 2, 0]),
        Transformation::new(vec![1, 0, 2]),
        Transformation::new(vec![0, 0, 2]),
    ];
    let mut sequential = FroidurePin::with_generators(gens.clone()).unwrap();
    let mut parallel = FroidurePin::with_generators(gens).unwrap();
    // force the parallel path regardless of the semigroup size
    parallel.set_concurrency_threshold(0);
    assert_eq!(
        sequential.number_of_idempotents(),
        parallel.number_of_idempotents()
    );
}

/// Congruence with the identification `a = b` on a four generator
/// semigroup: exactly one non-trivial class, of size 5.
#[test]
fn non_trivial_classes_of_a_congruence() {
    init();
    let rules = [
        ("ab", "ba"),
        ("ac", "ca"),
        ("aa", "a"),
        ("ac", "a"),
        ("ca", "a"),
        ("bc", "cb"),
        ("bbb", "b"),
        ("bc", "b"),
        ("cb", "b"),
        ("ad", "a"),
        ("da", "a"),
        ("bd", "b"),
        ("db", "b"),
        ("cd", "c"),
        ("dc", "c"),
    ];
    let base = of_strings("abcd", false, &rules).unwrap();
    let mut kb_base = KnuthBendix::new(CongruenceKind::TwoSided, base.clone()).unwrap();

    let mut with_pair = base;
    with_pair.add_rule(&from_str("a"), &from_str("b")).unwrap();
    let mut kb_pair = KnuthBendix::new(CongruenceKind::TwoSided, with_pair).unwrap();

    assert!(kb_pair.equal_to(&from_str("a"), &from_str("b")).unwrap());
    assert!(kb_pair.equal_to(&from_str("a"), &from_str("bb")).unwrap());

    let classes = kb::non_trivial_classes(&mut kb_pair, &mut kb_base).unwrap();
    assert_eq!(classes, vec![words(&["b", "ab", "bb", "abb", "a"])]);
}

/// The same congruence through the racing front end.
#[test]
fn congruence_front_end() {
    init();
    let p = of_strings(
        "ab",
        false,
        &[("aa", "a"), ("bb", "b"), ("ab", "b"), ("ba", "b")],
    )
    .unwrap();
    let mut cong = Congruence::new(CongruenceKind::TwoSided, p).unwrap();
    cong.add_generating_pair(&from_str("a"), &from_str("b"))
        .unwrap();
    assert_eq!(
        cong.currently_contains(&from_str("a"), &from_str("a")),
        Tril::True
    );
    assert!(cong.contains(&from_str("a"), &from_str("b")).unwrap());
    assert!(cong.contains(&from_str("ab"), &from_str("ba")).unwrap());
    assert_eq!(
        cong.currently_contains(&from_str("b"), &from_str("ab")),
        Tril::True
    );
}

/// The pair-orbit enumerator and Knuth-Bendix agree on a finite
/// quotient.
#[test]
fn pair_orbit_agrees_with_knuth_bendix() {
    init();
    let p = of_strings(
        "ab",
        false,
        &[("aaa", "a"), ("bbb", "b"), ("ab", "ba"), ("ab", "aabb")],
    )
    .unwrap();
    let pairs = vec![(from_str("a"), from_str("b"))];
    let mut orbit = PairOrbit::new(CongruenceKind::TwoSided, p.clone(), pairs.clone()).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    kb.add_generating_pair(&pairs[0].0, &pairs[0].1).unwrap();
    for (u, v) in [("a", "bb"), ("ab", "b"), ("aab", "bb")] {
        let (u, v) = (from_str(u), from_str(v));
        assert_eq!(
            orbit.contains(&u, &v).unwrap(),
            kb.equal_to(&u, &v).unwrap(),
            "disagreement on ({:?}, {:?})",
            u,
            v
        );
    }
}

/// The free monoid on two letters has no relations: `run_for` returns
/// without finishing, and the structure is obviously infinite.
#[test]
fn free_monoid_is_infinite() {
    init();
    let p = of_strings("ab", true, &[]).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    assert!(kb.is_obviously_infinite());
    assert_eq!(kb.is_finite(), Tril::False);
    assert_eq!(kb.number_of_classes().unwrap(), Count::Infinite);
    kb.run_for(Duration::from_millis(5));
    // no relations means the rule list is empty and trivially
    // confluent, so the engine in fact finishes immediately
    assert!(kb.finished());
}

/// Enumeration of an infinite semigroup never finishes, but bounded
/// runs return and remain restartable.
#[test]
fn bounded_runs_are_restartable() {
    init();
    let p = of_strings("ab", true, &[("ab", "")]).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    // the bicyclic monoid is infinite, so the enumeration over its
    // normal forms cannot finish; bound it by time
    let mut s = kb.froidure_pin().unwrap();
    s.run_for(Duration::from_millis(20));
    assert!(!s.finished());
    assert_eq!(s.is_finite(), Tril::Unknown);
    let before = s.current_size();
    assert!(before > 0);
    s.run_for(Duration::from_millis(20));
    assert!(s.current_size() >= before);
    // killing from another thread stops the next run
    let handle = s.stop_handle();
    handle.kill();
    s.run();
    assert_eq!(s.current_state(), State::Dead);
}

/// Left and right congruence queries reverse consistently: on the
/// free monoid the left congruence generated by `(a, ab)` relates
/// `(a, abb)` but not `(a, ba)`.
#[test]
fn one_sided_congruence_queries() {
    init();
    let p = of_strings("ab", true, &[]).unwrap();
    let mut right = KnuthBendix::new(CongruenceKind::Right, p.clone()).unwrap();
    right
        .add_generating_pair(&from_str("a"), &from_str("ab"))
        .unwrap();
    // a ~ ab gives a ~ abb... on the right
    assert!(right.equal_to(&from_str("a"), &from_str("abb")).unwrap());
    assert!(!right.equal_to(&from_str("a"), &from_str("ba")).unwrap());

    let mut left = KnuthBendix::new(CongruenceKind::Left, p).unwrap();
    left.add_generating_pair(&from_str("a"), &from_str("ba"))
        .unwrap();
    assert!(left.equal_to(&from_str("a"), &from_str("bba")).unwrap());
    assert!(!left.equal_to(&from_str("a"), &from_str("ab")).unwrap());
}

/// An empty presentation has no elements as a semigroup and only the
/// empty word as a monoid.
#[test]
fn empty_presentations() {
    init();
    let p = of_strings("", false, &[]).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    assert_eq!(kb.number_of_classes().unwrap(), Count::Finite(0));
    let p = of_strings("", true, &[]).unwrap();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    assert_eq!(kb.number_of_classes().unwrap(), Count::Finite(1));
}

/// A single relation `a^n = a`: as a monoid the classes are
/// `1, a, a^2, ..., a^{n-1}`, so there are `n` of them; as a semigroup
/// one fewer.
#[test]
fn monogenic_semigroups() {
    init();
    for n in 2..7usize {
        let lhs: String = "a".repeat(n);
        let p = of_strings("a", true, &[(lhs.as_str(), "a")]).unwrap();
        let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
        assert_eq!(
            kb.number_of_classes().unwrap(),
            Count::Finite(n as u64),
            "a^{} = a",
            n
        );
        let forms = kb.normal_forms_of_length_at_most(n).unwrap();
        let expect: Vec<Word> = (0..n).map(|k| from_str(&"a".repeat(k))).collect();
        assert_eq!(forms, expect);

        let p = of_strings("a", false, &[(lhs.as_str(), "a")]).unwrap();
        let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
        assert_eq!(
            kb.number_of_classes().unwrap(),
            Count::Finite((n - 1) as u64)
        );
    }
}

/// The two engines close the same structure: the presentation
/// discovered by an enumeration presents a semigroup of the same size.
#[test]
fn enumeration_round_trips_through_a_presentation() {
    init();
    let gens = vec![
        Transformation::new(vec![1, 2, 0]),
        Transformation::new(vec![1, 0, 2]),
        Transformation::new(vec![0, 0, 2]),
    ];
    let mut s = FroidurePin::with_generators(gens).unwrap();
    let size = s.size() as u64;
    let p = s.as_presentation();
    let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
    assert_eq!(kb.number_of_classes().unwrap(), Count::Finite(size));
}
