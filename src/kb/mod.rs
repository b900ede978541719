//! The Knuth-Bendix completion engine.
//!
//! Given a presentation, the engine attempts to complete the rules into
//! a confluent terminating rewriting system under the shortlex
//! reduction ordering induced by the alphabet order. Completion
//! resolves critical pairs arising from overlaps of the left hand sides
//! of active rules; it may legitimately run forever, and cooperates
//! with the [`Runner`](crate::runner::Runner) stopping conditions.
//!
//! Once the system is confluent, word problems become rewriting:
//! [`normal_form`](KnuthBendix::normal_form) reduces a word to the
//! canonical representative of its class, and the
//! [`gilman_graph`](KnuthBendix::gilman_graph) turns the rule set into
//! a word graph whose paths are exactly the irreducible words, from
//! which classes are counted and normal forms enumerated.

mod rewriter;
mod rule;

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};

pub use rewriter::RewriterKind;

use rewriter::Rewriter;
use rule::{InternalLetter, InternalWord, RuleId, Rules};

use crate::error::{Error, Result};
use crate::presentation::{helpers, Presentation};
use crate::runner::{Runner, RunnerCore};
use crate::word_graph::{Count, WordGraph};
use crate::words::{Letter, Word};
use crate::{CongruenceKind, Tril};

/// The measure deciding which overlaps of two rules `AB -> P` and
/// `BC -> Q` are considered; overlaps whose measure exceeds
/// [`Settings::max_overlap`] are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// The length `|A| + |BC|` of the two distinct parts.
    Abc,
    /// The length `|AB| + |BC|` of the two left hand sides.
    AbBc,
    /// The maximum of `|AB|` and `|BC|`.
    MaxAbBc,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Abc
    }
}

/// The tuneable settings of a [`KnuthBendix`] engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Stop (without finishing) when this many rules are active.
    pub max_rules: usize,
    /// Skip overlaps whose [`OverlapPolicy`] measure exceeds this.
    pub max_overlap: usize,
    /// Check confluence after this many overlaps have been processed.
    pub check_confluence_interval: usize,
    /// The overlap measure.
    pub overlap_policy: OverlapPolicy,
    /// The rewriting strategy.
    pub rewriter: RewriterKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_rules: usize::MAX,
            max_overlap: usize::MAX,
            check_confluence_interval: 4_096,
            overlap_policy: OverlapPolicy::default(),
            rewriter: RewriterKind::default(),
        }
    }
}

/// Statistics of a completion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// The deepest the pending stack has been.
    pub max_stack_depth: usize,
    /// The longest word that has appeared on the pending stack.
    pub max_word_length: usize,
    /// The most rules that have been active at once.
    pub max_active_rules: usize,
}

/// The Knuth-Bendix completion engine.
pub struct KnuthBendix {
    core: RunnerCore,
    kind: CongruenceKind,
    presentation: Presentation,
    settings: Settings,
    stats: Stats,
    rewriter: Rewriter,
    internal_is_same_as_external: bool,
    generating_pairs: Vec<(Word, Word)>,
    octo: Option<Letter>,
    initialised: bool,
    pass_started: bool,
    overlap_count: usize,
    stalled: bool,
    gilman: Option<WordGraph>,
}

impl KnuthBendix {
    /// Creates an engine for the congruence of the given kind generated
    /// by the rules of `presentation`.
    ///
    /// For a left congruence every rule is reversed on loading, so that
    /// completion always works with right multiplication.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAlphabet`] if the alphabet does not fit the byte
    /// encoded internal alphabet, or any error of
    /// [`Presentation::validate`].
    pub fn new(kind: CongruenceKind, presentation: Presentation) -> Result<Self> {
        Self::with_settings(kind, presentation, Settings::default())
    }

    /// As [`new`](Self::new), with explicit settings.
    pub fn with_settings(
        kind: CongruenceKind,
        presentation: Presentation,
        settings: Settings,
    ) -> Result<Self> {
        presentation.validate()?;
        if presentation.alphabet().len() > u8::MAX as usize - 1 {
            return Err(Error::InvalidAlphabet(format!(
                "the alphabet has size {}, the byte encoded maximum is {}",
                presentation.alphabet().len(),
                u8::MAX as usize - 1
            )));
        }
        let mut core = RunnerCore::new();
        core.set_report_prefix("KnuthBendix");
        let mut kb = Self {
            core,
            kind,
            rewriter: Rewriter::new(settings.rewriter),
            settings,
            stats: Stats::default(),
            internal_is_same_as_external: presentation
                .alphabet()
                .iter()
                .enumerate()
                .all(|(i, &a)| a == i as Letter + 1),
            presentation,
            generating_pairs: Vec::new(),
            octo: None,
            initialised: false,
            pass_started: false,
            overlap_count: 0,
            stalled: false,
            gilman: None,
        };
        kb.load_presentation_rules();
        Ok(kb)
    }

    /// The congruence kind of this engine.
    pub fn kind(&self) -> CongruenceKind {
        self.kind
    }

    /// The presentation this engine was constructed from (including the
    /// padding letter and rules of any generating pairs, once the
    /// engine has started).
    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// The settings of this engine.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sets the bound on the number of active rules; see
    /// [`Settings::max_rules`]. Raising a bound restarts the overlap
    /// pass, so previously skipped overlaps are reconsidered.
    pub fn set_max_rules(&mut self, max_rules: usize) {
        self.settings.max_rules = max_rules;
        self.stalled = false;
        self.restart_pass();
    }

    /// Sets the bound on the overlap measure; see
    /// [`Settings::max_overlap`]. Raising a bound restarts the overlap
    /// pass, so previously skipped overlaps are reconsidered.
    pub fn set_max_overlap(&mut self, max_overlap: usize) {
        self.settings.max_overlap = max_overlap;
        self.stalled = false;
        self.restart_pass();
    }

    fn restart_pass(&mut self) {
        let head = self.rules().first_active();
        self.rewriter.rules_mut().set_cursor(0, head);
        self.pass_started = true;
    }

    /// Sets the confluence check cadence; see
    /// [`Settings::check_confluence_interval`].
    pub fn set_check_confluence_interval(&mut self, interval: usize) {
        self.settings.check_confluence_interval = interval;
    }

    /// Sets the overlap measure; see [`OverlapPolicy`].
    pub fn set_overlap_policy(&mut self, policy: OverlapPolicy) {
        self.settings.overlap_policy = policy;
    }

    /// The statistics gathered so far.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Adds a generating pair `(u, v)` of the congruence.
    ///
    /// For a one-sided congruence, a padding letter is prepended to the
    /// words of every generating pair on initialisation, preventing the
    /// rules derived from the pairs from collapsing the underlying
    /// semigroup.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] after the first run, or
    /// [`Error::InvalidLetter`] if the words do not fit the alphabet.
    pub fn add_generating_pair(&mut self, u: &[Letter], v: &[Letter]) -> Result<()> {
        if self.started() || self.initialised {
            return Err(Error::AlreadyStarted("add a generating pair"));
        }
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        self.generating_pairs.push((u.to_vec(), v.to_vec()));
        Ok(())
    }

    /// The number of active rules.
    pub fn number_of_active_rules(&self) -> usize {
        self.rules().number_of_active()
    }

    /// The number of inactive (recyclable) rules.
    pub fn number_of_inactive_rules(&self) -> usize {
        self.rules().number_of_inactive()
    }

    /// The number of rules ever defined, recycled ones included.
    pub fn total_rules(&self) -> u64 {
        self.rules().total_rules()
    }

    /// The length of the shortest active-rule left hand side.
    pub fn min_length_lhs_rule(&self) -> Option<usize> {
        self.rules().min_length_lhs_rule()
    }

    /// The length of the longest active-rule left hand side.
    pub fn max_active_word_length(&self) -> usize {
        self.rules().max_active_word_length()
    }

    /// The active rules, as pairs of words over the external alphabet,
    /// in their current order.
    pub fn active_rules(&self) -> Vec<(Word, Word)> {
        self.rules()
            .iter_active()
            .map(|id| {
                let rule = self.rules().get(id);
                (self.to_external(&rule.lhs), self.to_external(&rule.rhs))
            })
            .collect()
    }

    /// Whether the last confluence verdict is still valid.
    pub fn confluent_known(&self) -> bool {
        self.rules().confluence_known()
    }

    /// Whether the current rule set is confluent, checking now if no
    /// cached verdict is available.
    pub fn confluent(&mut self) -> bool {
        self.ensure_initialised();
        self.process_pending();
        if !self.rules().confluence_known() {
            self.check_confluence();
        }
        self.rules().confluent()
    }

    /// Returns `true` if `u` and `v` represent the same element of the
    /// presented structure, running the engine to completion if the
    /// current rules cannot already decide it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLetter`] if a word does not fit the alphabet.
    pub fn equal_to(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        if u == v {
            return Ok(true);
        }
        self.ensure_initialised();
        self.process_pending();
        let mut uu = self.query_to_internal(u);
        let mut vv = self.query_to_internal(v);
        self.rewriter.rewrite(&mut uu);
        self.rewriter.rewrite(&mut vv);
        if uu == vv {
            return Ok(true);
        }
        self.run();
        self.rewriter.rewrite(&mut uu);
        self.rewriter.rewrite(&mut vv);
        Ok(uu == vv)
    }

    /// Like [`equal_to`](Self::equal_to), but only consults the current
    /// rules and never runs the engine; `false` therefore means
    /// "not currently known to be equal".
    pub fn currently_equal(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        if u == v {
            return Ok(true);
        }
        self.ensure_initialised();
        self.process_pending();
        let mut uu = self.query_to_internal(u);
        let mut vv = self.query_to_internal(v);
        self.rewriter.rewrite(&mut uu);
        self.rewriter.rewrite(&mut vv);
        Ok(uu == vv)
    }

    /// The normal form of `w`: the engine is run to completion and `w`
    /// is reduced by the resulting rules.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLetter`] if the word does not fit the alphabet.
    pub fn normal_form(&mut self, w: &[Letter]) -> Result<Word> {
        self.presentation.validate_word(w)?;
        self.run();
        Ok(self.rewrite_query(w))
    }

    /// Reduces `w` by the current rules, without running the engine.
    pub fn current_normal_form(&mut self, w: &[Letter]) -> Result<Word> {
        self.presentation.validate_word(w)?;
        self.ensure_initialised();
        self.process_pending();
        Ok(self.rewrite_query(w))
    }

    /// Returns `true` if the presentation is obviously infinite: some
    /// letter occurs in no rule, or there are fewer rules than letters.
    pub fn is_obviously_infinite(&self) -> bool {
        let p = &self.presentation;
        if p.alphabet().is_empty() {
            return false;
        }
        if p.alphabet().len() > p.number_of_rules() {
            return true;
        }
        let mut occurs = vec![false; p.alphabet().len()];
        for word in &p.rules {
            for &a in word {
                occurs[p.index(a).unwrap()] = true;
            }
        }
        occurs.into_iter().any(|x| !x)
    }

    /// Whether the presented structure is finite; certain only via the
    /// obviously-infinite check or a completed run.
    pub fn is_finite(&mut self) -> Tril {
        if self.is_obviously_infinite() {
            return Tril::False;
        }
        if self.finished() {
            match self.number_of_classes() {
                Ok(Count::Finite(_)) => Tril::True,
                Ok(Count::Infinite) => Tril::False,
                Err(_) => Tril::Unknown,
            }
        } else {
            Tril::Unknown
        }
    }

    /// The Gilman graph of the completed system: a deterministic word
    /// graph, with the empty prefix as node 0, whose paths from node 0
    /// are labelled by exactly the irreducible words.
    ///
    /// Runs the engine to completion first (lifting any rule bound).
    ///
    /// # Errors
    ///
    /// [`Error::NotYetImplemented`] if completion cannot be reached,
    /// for example because the engine was killed.
    pub fn gilman_graph(&mut self) -> Result<&WordGraph> {
        self.ensure_gilman()?;
        Ok(self.gilman.as_ref().unwrap())
    }

    /// The number of classes of the congruence (the size of the
    /// presented structure for a two-sided congruence on a free
    /// object), possibly [`Count::Infinite`].
    pub fn number_of_classes(&mut self) -> Result<Count> {
        if self.is_obviously_infinite() {
            return Ok(Count::Infinite);
        }
        let modifier: i64 = if self.presentation.contains_empty_word() {
            0
        } else {
            -1
        };
        if self.presentation.alphabet().is_empty() {
            return Ok(Count::Finite((1 + modifier) as u64));
        }
        self.ensure_gilman()?;
        match self.gilman.as_ref().unwrap().number_of_paths(0) {
            Count::Infinite => Ok(Count::Infinite),
            Count::Finite(n) => Ok(Count::Finite((n as i64 + modifier) as u64)),
        }
    }

    /// The normal forms of length at most `max_length`, in shortlex
    /// order, over the external alphabet. The empty word appears only
    /// when the presentation contains it.
    pub fn normal_forms_of_length_at_most(&mut self, max_length: usize) -> Result<Vec<Word>> {
        self.ensure_gilman()?;
        let graph = self.gilman.as_ref().unwrap();
        let p = &self.presentation;
        let skip_empty = !p.contains_empty_word();
        Ok(graph
            .paths_of_length_at_most(0, max_length)
            .filter(|w| !(skip_empty && w.is_empty()))
            .map(|w| w.iter().map(|&i| p.letter(i as usize)).collect())
            .collect())
    }

    //
    // internal letter encoding
    //

    fn rules(&self) -> &Rules {
        self.rewriter.rules()
    }

    fn to_internal(&self, w: &[Letter]) -> InternalWord {
        if self.internal_is_same_as_external {
            w.iter().map(|&a| a as InternalLetter).collect()
        } else {
            w.iter()
                .map(|&a| self.presentation.index(a).unwrap() as InternalLetter + 1)
                .collect()
        }
    }

    fn to_external(&self, w: &[InternalLetter]) -> Word {
        if self.internal_is_same_as_external {
            w.iter().map(|&a| Letter::from(a)).collect()
        } else {
            w.iter()
                .map(|&a| self.presentation.letter(a as usize - 1))
                .collect()
        }
    }

    pub(crate) fn internal_active_rules(&self) -> Vec<(InternalWord, InternalWord)> {
        self.rules()
            .iter_active()
            .map(|id| {
                let rule = self.rules().get(id);
                (rule.lhs.clone(), rule.rhs.clone())
            })
            .collect()
    }

    pub(crate) fn internal_alphabet_size(&self) -> usize {
        self.presentation.alphabet().len()
    }

    pub(crate) fn internal_to_external_word(&self, w: &[InternalLetter]) -> Word {
        self.to_external(w)
    }

    fn has_octo(&self) -> bool {
        self.octo.is_some()
    }

    // reverse for a left congruence and prepend the padding letter,
    // producing the internal form of a query word
    fn query_to_internal(&self, w: &[Letter]) -> InternalWord {
        let mut word = w.to_vec();
        if self.kind == CongruenceKind::Left {
            word.reverse();
        }
        if let Some(octo) = self.octo {
            word.insert(0, octo);
        }
        self.to_internal(&word)
    }

    fn query_to_external(&self, w: &[InternalLetter]) -> Word {
        let mut word = self.to_external(w);
        if self.has_octo() {
            debug_assert_eq!(word.first(), self.octo.as_ref());
            word.remove(0);
        }
        if self.kind == CongruenceKind::Left {
            word.reverse();
        }
        word
    }

    fn rewrite_query(&mut self, w: &[Letter]) -> Word {
        let mut word = self.query_to_internal(w);
        self.rewriter.rewrite(&mut word);
        self.query_to_external(&word)
    }

    //
    // loading
    //

    fn load_presentation_rules(&mut self) {
        let pairs: Vec<(Word, Word)> = self
            .presentation
            .rule_pairs()
            .map(|(l, r)| (l.clone(), r.clone()))
            .collect();
        for (mut lhs, mut rhs) in pairs {
            if self.kind == CongruenceKind::Left {
                lhs.reverse();
                rhs.reverse();
            }
            let lhs = self.to_internal(&lhs);
            let rhs = self.to_internal(&rhs);
            self.rewriter.rules_mut().push_pending(lhs, rhs);
        }
    }

    fn ensure_initialised(&mut self) {
        if self.initialised {
            return;
        }
        self.initialised = true;
        if self.kind != CongruenceKind::TwoSided && !self.generating_pairs.is_empty() {
            // pad one-sided generating pairs with a fresh letter so
            // that the derived rules only apply at the start of a word
            let octo = helpers::first_unused_letter(&self.presentation);
            self.presentation.add_generator_with(octo).unwrap();
            self.octo = Some(octo);
            self.internal_is_same_as_external = self
                .presentation
                .alphabet()
                .iter()
                .enumerate()
                .all(|(i, &a)| a == i as Letter + 1);
        }
        let pairs = std::mem::take(&mut self.generating_pairs);
        for (u, v) in &pairs {
            let uu = self.query_to_internal(u);
            let vv = self.query_to_internal(v);
            let lhs = self.to_external(&uu);
            let rhs = self.to_external(&vv);
            self.presentation.add_rule_no_checks(&lhs, &rhs);
            self.rewriter.rules_mut().push_pending(uu, vv);
        }
        self.generating_pairs = pairs;
        debug!(
            "KnuthBendix: loaded {} rules over an alphabet of {}",
            self.presentation.number_of_rules(),
            self.presentation.alphabet().len()
        );
    }

    //
    // the completion loop
    //

    fn shortlex_less(a: &[InternalLetter], b: &[InternalLetter]) -> bool {
        (a.len(), a) < (b.len(), b)
    }

    fn process_pending(&mut self) {
        self.stats.max_stack_depth = self.stats.max_stack_depth.max(self.rules().pending_len());
        while let Some((mut a, mut b)) = self.rewriter.rules_mut().pop_pending() {
            if self.core.dead() {
                return;
            }
            self.rewriter.rewrite(&mut a);
            self.rewriter.rewrite(&mut b);
            if a == b {
                continue;
            }
            if Self::shortlex_less(&a, &b) {
                std::mem::swap(&mut a, &mut b);
            }
            self.stats.max_word_length = self.stats.max_word_length.max(a.len());
            let new_id = self.rewriter.rules_mut().activate(a, b);
            self.stats.max_active_rules = self
                .stats
                .max_active_rules
                .max(self.rules().number_of_active());
            self.reprocess_against(new_id);
        }
    }

    // deactivate every rule whose lhs contains the new lhs as a factor
    // (scheduling its re-reduction) and re-reduce right hand sides
    fn reprocess_against(&mut self, new_id: RuleId) {
        let ids: Vec<RuleId> = self
            .rules()
            .iter_active()
            .filter(|&id| id != new_id)
            .collect();
        for id in ids {
            if !self.rules().get(id).active {
                continue;
            }
            let new_lhs = &self.rules().get(new_id).lhs;
            let rule = self.rules().get(id);
            let in_lhs = contains_factor(&rule.lhs, new_lhs);
            let in_rhs = !in_lhs && contains_factor(&rule.rhs, new_lhs);
            if in_lhs {
                let (lhs, rhs) = (rule.lhs.clone(), rule.rhs.clone());
                let rules = self.rewriter.rules_mut();
                rules.deactivate(id);
                rules.push_pending(lhs, rhs);
            } else if in_rhs {
                let mut rhs = rule.rhs.clone();
                self.rewriter.rewrite(&mut rhs);
                self.rewriter.rules_mut().replace_rhs(id, rhs);
            }
        }
    }

    fn overlap_measure(&self, ab: usize, bc: usize, b: usize) -> usize {
        match self.settings.overlap_policy {
            OverlapPolicy::Abc => (ab - b) + bc,
            OverlapPolicy::AbBc => ab + bc,
            OverlapPolicy::MaxAbBc => ab.max(bc),
        }
    }

    // OVERLAP_2 from Sims p77: enqueue the critical pairs of the
    // overlaps of u.lhs as suffix with v.lhs as prefix
    fn overlap(&mut self, u: RuleId, v: RuleId) {
        let (ul, ur, vl, vr) = {
            let rules = self.rules();
            let ru = rules.get(u);
            let rv = rules.get(v);
            (ru.lhs.clone(), ru.rhs.clone(), rv.lhs.clone(), rv.rhs.clone())
        };
        let m = ul.len().min(vl.len());
        for b in 1..m {
            if self.overlap_measure(ul.len(), vl.len(), b) > self.settings.max_overlap {
                break;
            }
            if vl.starts_with(&ul[ul.len() - b..]) {
                // u = AB -> P, v = BC -> Q: the word ABC reduces both
                // to PC and to AQ
                let mut x = ul[..ul.len() - b].to_vec();
                x.extend_from_slice(&vr);
                let mut y = ur.clone();
                y.extend_from_slice(&vl[b..]);
                self.rewriter.rules_mut().push_pending(x, y);
            }
        }
    }

    fn check_confluence(&mut self) -> bool {
        if !self.rules().pending_is_empty() {
            return false;
        }
        if self.rules().confluence_known() {
            return self.rules().confluent();
        }
        let ids: Vec<RuleId> = self.rules().iter_active().collect();
        let mut confluent = true;
        'outer: for &i in &ids {
            if self.core.dead() {
                // abort without caching a verdict
                return false;
            }
            for &j in &ids {
                let (il, ir, jl, jr) = {
                    let rules = self.rules();
                    let ri = rules.get(i);
                    let rj = rules.get(j);
                    (ri.lhs.clone(), ri.rhs.clone(), rj.lhs.clone(), rj.rhs.clone())
                };
                let m = il.len().min(jl.len());
                for b in 1..m {
                    if !jl.starts_with(&il[il.len() - b..]) {
                        continue;
                    }
                    let mut x = ir.clone();
                    x.extend_from_slice(&jl[b..]);
                    let mut y = il[..il.len() - b].to_vec();
                    y.extend_from_slice(&jr);
                    self.rewriter.rewrite(&mut x);
                    self.rewriter.rewrite(&mut y);
                    if x != y {
                        confluent = false;
                        break 'outer;
                    }
                }
            }
        }
        self.rewriter.rules_mut().set_confluent(confluent);
        confluent
    }

    fn ensure_gilman(&mut self) -> Result<()> {
        if self.gilman.is_some() {
            return Ok(());
        }
        if self.presentation.alphabet().is_empty() {
            self.gilman = Some(WordGraph::new(1, 0));
            return Ok(());
        }
        // lift any rule bound so that we really run to completion
        self.set_max_rules(usize::MAX);
        self.run();
        if !self.finished() {
            return Err(Error::NotYetImplemented(
                "the Gilman graph of a system that did not reach confluence",
            ));
        }
        let alphabet_size = self.presentation.alphabet().len();
        let mut prefixes: HashMap<InternalWord, usize> = HashMap::new();
        prefixes.insert(InternalWord::new(), 0);
        for id in self.rules().iter_active().collect::<Vec<_>>() {
            let lhs = self.rules().get(id).lhs.clone();
            for end in 1..lhs.len() {
                let next = prefixes.len();
                prefixes.entry(lhs[..end].to_vec()).or_insert(next);
            }
        }
        let mut graph = WordGraph::new(prefixes.len(), alphabet_size);
        let entries: Vec<(InternalWord, usize)> =
            prefixes.iter().map(|(w, &i)| (w.clone(), i)).collect();
        for (prefix, node) in entries {
            for a in 0..alphabet_size {
                let mut s = prefix.clone();
                s.push(a as InternalLetter + 1);
                if let Some(&target) = prefixes.get(&s) {
                    graph.set_target(node, a as Letter, target);
                    continue;
                }
                let mut t = s.clone();
                self.rewriter.rewrite(&mut t);
                if t != s {
                    // the extension is reducible, so no irreducible
                    // word continues this way
                    continue;
                }
                // fall back to the longest proper suffix that is a
                // prefix of some lhs; the empty suffix always is
                while !s.is_empty() {
                    s.remove(0);
                    if let Some(&target) = prefixes.get(&s) {
                        graph.set_target(node, a as Letter, target);
                        break;
                    }
                }
            }
        }
        if self.has_octo() {
            graph = self.prune_octo(graph);
        }
        info!(
            "KnuthBendix: Gilman graph has {} nodes and {} edges",
            graph.number_of_nodes(),
            graph.number_of_edges()
        );
        self.gilman = Some(graph);
        Ok(())
    }

    // restrict the Gilman graph of a one-sided congruence to the words
    // starting with the padding letter, and forget that letter
    fn prune_octo(&self, graph: WordGraph) -> WordGraph {
        let octo = self.presentation.alphabet().len() - 1;
        let src = match graph.target(0, octo as Letter) {
            Some(src) => src,
            None => return WordGraph::new(1, octo),
        };
        let mut stripped = WordGraph::new(graph.number_of_nodes(), octo);
        for node in 0..graph.number_of_nodes() {
            for a in 0..octo {
                if let Some(t) = graph.target(node, a as Letter) {
                    stripped.set_target(node, a as Letter, t);
                }
            }
        }
        let reachable = stripped.nodes_reachable_from(src);
        let mut order: Vec<usize> = reachable.ones().collect();
        order.retain(|&v| v != src);
        order.insert(0, src);
        let index: HashMap<usize, usize> =
            order.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut out = WordGraph::new(order.len(), octo);
        for (i, &v) in order.iter().enumerate() {
            for a in 0..octo {
                if let Some(t) = stripped.target(v, a as Letter) {
                    if let Some(&j) = index.get(&t) {
                        out.set_target(i, a as Letter, j);
                    }
                }
            }
        }
        out
    }

    fn report_progress(&mut self) {
        if self.core.should_report() {
            info!(
                "{}: {} active rules | {} inactive rules | {} defined rules | time {:.2?}",
                self.core.report_prefix(),
                self.number_of_active_rules(),
                self.number_of_inactive_rules(),
                self.total_rules(),
                self.core
                    .start_time()
                    .map(|t| t.elapsed())
                    .unwrap_or_else(|| Duration::from_secs(0))
            );
        }
    }
}

fn contains_factor(haystack: &[InternalLetter], needle: &[InternalLetter]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Completes `kb` by iterative deepening on the overlap bound: the
/// engine is run with `max_overlap` 1, 2, 3, ... until the rule set is
/// confluent. On some presentations this processes the short (cheap)
/// overlaps first and completes where a free-running completion grows
/// the rule set much faster.
pub fn by_overlap_length(kb: &mut KnuthBendix) {
    let prev_max_overlap = kb.settings.max_overlap;
    let prev_interval = kb.settings.check_confluence_interval;
    kb.settings.check_confluence_interval = usize::MAX;
    let mut max_overlap = 1;
    loop {
        kb.set_max_overlap(max_overlap);
        kb.run();
        if kb.finished() || kb.dead() {
            break;
        }
        max_overlap += 1;
    }
    kb.settings.max_overlap = prev_max_overlap;
    kb.settings.check_confluence_interval = prev_interval;
}

/// The non-trivial classes of the congruence presented by `coarse`
/// relative to the congruence presented by `base`.
///
/// The engines must present congruences on the same alphabet, with
/// `coarse` defined by the rules of `base` plus some additional rules
/// or generating pairs. Each returned class lists the `base` normal
/// forms that `coarse` merges, the `coarse` normal form of the class
/// last; classes of size one are omitted.
///
/// The classes are computed from the two Gilman graphs: a `base` normal
/// form lies in a non-trivial class exactly when its path leaves the
/// subgraph shared with the `coarse` graph.
///
/// # Errors
///
/// [`Error::InvalidAlphabet`] if the alphabets differ, and
/// [`Error::NotYetImplemented`] if some non-trivial class is infinite
/// (which holds in particular whenever `base` presents an infinite
/// structure and `coarse` a finite one).
pub fn non_trivial_classes(
    coarse: &mut KnuthBendix,
    base: &mut KnuthBendix,
) -> Result<Vec<Vec<Word>>> {
    if base.number_of_classes()? == Count::Infinite
        && coarse.number_of_classes()? != Count::Infinite
    {
        return Err(Error::NotYetImplemented(
            "computing an infinite non-trivial class",
        ));
    }
    if base.presentation().alphabet() != coarse.presentation().alphabet() {
        return Err(Error::InvalidAlphabet(format!(
            "the presentations must share an alphabet, found {:?} and {:?}",
            base.presentation().alphabet(),
            coarse.presentation().alphabet()
        )));
    }
    let g2 = base.gilman_graph()?.clone();
    let g1 = coarse.gilman_graph()?.clone();
    if g2.number_of_nodes() < g1.number_of_nodes() {
        return Err(Error::NotYetImplemented(
            "the base Gilman graph is smaller than the coarse one",
        ));
    }

    const UNDEF: usize = usize::MAX;
    let degree = g2.out_degree();

    // match up the nodes of the two graphs along their shared edges
    let mut to_g1 = vec![UNDEF; g2.number_of_nodes()];
    let mut to_g2 = vec![UNDEF; g1.number_of_nodes()];
    to_g1[0] = 0;
    to_g2[0] = 0;
    let mut changed = true;
    while changed {
        changed = false;
        for v in 0..g2.number_of_nodes() {
            if to_g1[v] == UNDEF {
                continue;
            }
            for e in 0..degree {
                if let (Some(ve2), Some(ve1)) = (
                    g2.target(v, e as Letter),
                    g1.target(to_g1[v], e as Letter),
                ) {
                    if to_g1[ve2] == UNDEF {
                        to_g1[ve2] = ve1;
                        to_g2[ve1] = ve2;
                        changed = true;
                    }
                }
            }
        }
    }

    // depth first search for nodes that reach an edge of the base graph
    // absent from the coarse graph, and for infinite path families
    let n = g2.number_of_nodes();
    let mut can_reach = vec![false; n];
    let mut inf_paths = vec![false; n];
    let mut seen = vec![false; n];
    let mut stack = vec![(0usize, false)];
    while let Some((v, post)) = stack.pop() {
        if post {
            for e in 0..degree {
                if let Some(ve) = g2.target(v, e as Letter) {
                    can_reach[v] = can_reach[v] || can_reach[ve];
                    if can_reach[ve] {
                        inf_paths[v] = inf_paths[ve];
                    }
                    if can_reach[v] && inf_paths[v] {
                        return Err(Error::NotYetImplemented(
                            "computing an infinite non-trivial class",
                        ));
                    }
                }
            }
        } else {
            seen[v] = true;
            stack.push((v, true));
            if to_g1[v] == UNDEF {
                can_reach[v] = true;
            }
            for e in 0..degree {
                if let Some(ve2) = g2.target(v, e as Letter) {
                    if !can_reach[v] {
                        match g1.target(to_g1[v], e as Letter) {
                            Some(ve1) => can_reach[v] = ve2 != to_g2[ve1],
                            None => can_reach[v] = true,
                        }
                    }
                    if seen[ve2] {
                        inf_paths[v] = true;
                    } else {
                        stack.push((ve2, false));
                    }
                }
            }
        }
    }

    // the subgraph on the can-reach nodes holds every path through a
    // new edge, and is acyclic if no class is infinite
    let mut ad = WordGraph::new(n, degree);
    for v in 0..n {
        if !can_reach[v] {
            continue;
        }
        for e in 0..degree {
            if let Some(ve) = g2.target(v, e as Letter) {
                if can_reach[ve] {
                    ad.set_target(v, e as Letter, ve);
                }
            }
        }
    }
    if ad.number_of_paths(0) == Count::Infinite {
        return Err(Error::NotYetImplemented(
            "computing an infinite non-trivial class",
        ));
    }

    let alphabet: Vec<Letter> = base.presentation().alphabet().to_vec();
    let mut classes: HashMap<Word, Vec<Word>> = HashMap::new();
    for path in ad.paths(0) {
        // keep only the normal forms the coarse system rewrites away
        if g1.follow_path(0, &path).is_some() {
            continue;
        }
        let word: Word = path.iter().map(|&i| alphabet[i as usize]).collect();
        let representative = coarse.normal_form(&word)?;
        classes.entry(representative).or_default().push(word);
    }
    let mut result: Vec<Vec<Word>> = Vec::with_capacity(classes.len());
    for (representative, mut class) in classes {
        class.push(representative);
        result.push(class);
    }
    // deterministic order for the caller
    result.sort();
    Ok(result)
}

impl Runner for KnuthBendix {
    fn core(&self) -> &RunnerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RunnerCore {
        &mut self.core
    }

    /// Processes one rule of the active list against every earlier rule
    /// (and itself), draining the critical pairs this produces.
    fn step(&mut self) {
        if !self.initialised {
            self.ensure_initialised();
        }
        if !self.rules().pending_is_empty() {
            self.process_pending();
            self.report_progress();
            return;
        }
        if self.rules().number_of_active() >= self.settings.max_rules {
            info!(
                "KnuthBendix: too many rules, found {}, the maximum is {}",
                self.rules().number_of_active(),
                self.settings.max_rules
            );
            self.stalled = true;
            return;
        }
        let outer = match self.rules().cursor(0) {
            Some(id) => Some(id),
            None if !self.pass_started => {
                self.pass_started = true;
                self.rules().first_active()
            }
            None => None,
        };
        let outer = match outer {
            Some(id) => id,
            None => {
                // every overlap of the active list has been processed:
                // settle confluence, restarting the pass if new rules
                // appeared after their overlaps were taken
                if self.check_confluence() {
                    self.report_progress();
                    info!("KnuthBendix: finished with {} active rules", self.number_of_active_rules());
                } else if self.settings.max_overlap != usize::MAX {
                    // skipped overlaps cannot be recovered
                    self.stalled = true;
                } else if !self.core.dead() {
                    let head = self.rules().first_active();
                    self.rewriter.rules_mut().set_cursor(0, head);
                }
                return;
            }
        };
        let stamp1 = self.rules().get(outer).id;
        let next = self.rules().next_active(outer);
        self.rewriter.rules_mut().set_cursor(0, next);

        self.overlap(outer, outer);
        self.process_pending();
        self.overlap_count += 1;

        self.rewriter.rules_mut().set_cursor(1, Some(outer));
        loop {
            if self.core.dead() || !self.rules().is_current(outer, stamp1) {
                break;
            }
            let second = match self.rules().cursor(1) {
                Some(id) => id,
                None => break,
            };
            let inner = match self.rules().prev_active(second) {
                Some(id) => id,
                None => break,
            };
            self.rewriter.rules_mut().set_cursor(1, Some(inner));
            let stamp2 = self.rules().get(inner).id;
            self.overlap(outer, inner);
            self.process_pending();
            self.overlap_count += 1;
            if self.rules().is_current(outer, stamp1) && self.rules().is_current(inner, stamp2) {
                self.overlap(inner, outer);
                self.process_pending();
                self.overlap_count += 1;
            }
            if self.rules().number_of_active() >= self.settings.max_rules {
                self.stalled = true;
                return;
            }
        }
        if self.overlap_count > self.settings.check_confluence_interval {
            self.overlap_count = 0;
            self.check_confluence();
        }
        self.report_progress();
    }

    fn finished(&self) -> bool {
        self.initialised && self.rules().pending_is_empty() && self.rules().confluent()
    }

    fn stalled(&self) -> bool {
        self.stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::of_strings;
    use crate::words::from_str;

    fn bicyclic() -> KnuthBendix {
        let p = of_strings("ab", true, &[("ab", "")]).unwrap();
        KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap()
    }

    #[test]
    fn bicyclic_monoid() {
        let mut kb = bicyclic();
        assert!(kb.is_obviously_infinite());
        kb.run();
        assert!(kb.finished());
        assert!(kb.confluent());
        assert_eq!(kb.number_of_active_rules(), 1);
        assert_eq!(kb.number_of_classes().unwrap(), Count::Infinite);
        let forms = kb.normal_forms_of_length_at_most(3).unwrap();
        let expect: Vec<Word> = ["", "a", "b", "aa", "ba", "bb", "aaa", "baa", "bba", "bbb"]
            .iter()
            .map(|s| from_str(s))
            .collect();
        assert_eq!(forms, expect);
    }

    #[test]
    fn normal_form_is_idempotent() {
        let mut kb = bicyclic();
        for w in ["abab", "ba", "aabb", "babab"] {
            let w = from_str(w);
            let nf = kb.normal_form(&w).unwrap();
            assert_eq!(kb.normal_form(&nf).unwrap(), nf);
        }
    }

    #[test]
    fn equal_to_in_the_bicyclic_monoid() {
        let mut kb = bicyclic();
        assert!(kb.equal_to(&from_str("ab"), &from_str("")).unwrap());
        assert!(kb.equal_to(&from_str("aabb"), &from_str("ab")).unwrap());
        assert!(!kb.equal_to(&from_str("ba"), &from_str("")).unwrap());
        assert!(!kb.equal_to(&from_str("a"), &from_str("b")).unwrap());
    }

    #[test]
    fn rewriter_strategies_agree() {
        for kind in [RewriterKind::FromLeft, RewriterKind::Trie] {
            let p = of_strings("abc", false, &[("aa", "a"), ("bc", "cb"), ("cc", "b")]).unwrap();
            let mut settings = Settings::default();
            settings.rewriter = kind;
            let mut kb =
                KnuthBendix::with_settings(CongruenceKind::TwoSided, p, settings).unwrap();
            kb.run();
            assert!(kb.confluent());
            let nf = kb.normal_form(&from_str("abccba")).unwrap();
            assert_eq!(kb.normal_form(&nf).unwrap(), nf);
        }
    }

    #[test]
    fn max_rules_stalls_without_finishing() {
        // the symmetric group S4 needs 11 rules
        let p = of_strings(
            "abB",
            true,
            &[("aa", ""), ("bB", ""), ("Bb", ""), ("bb", "B"), ("BaBa", "abab")],
        )
        .unwrap();
        let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
        kb.set_max_rules(2);
        kb.run();
        assert!(!kb.finished());
        assert!(kb.stalled());
        // lifting the bound lets the run complete
        kb.set_max_rules(usize::MAX);
        kb.run();
        assert!(kb.finished());
        assert_eq!(kb.number_of_active_rules(), 11);
    }

    #[test]
    fn generating_pairs_refine_equality() {
        let p = of_strings("ab", false, &[("aaa", "a"), ("bbb", "b"), ("ab", "ba")]).unwrap();
        let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
        kb.add_generating_pair(&from_str("a"), &from_str("b")).unwrap();
        assert!(kb.equal_to(&from_str("a"), &from_str("b")).unwrap());
        assert!(kb
            .equal_to(&from_str("aa"), &from_str("bb"))
            .unwrap());
        assert!(matches!(
            kb.add_generating_pair(&from_str("a"), &from_str("b")),
            Err(Error::AlreadyStarted(_))
        ));
    }

    #[test]
    fn rule_order_does_not_change_the_confluent_system() {
        let rules = [("aa", "a"), ("bc", "cb"), ("cc", "b")];
        let mut reversed = rules;
        reversed.reverse();
        let mut systems = Vec::new();
        for rule_list in [&rules, &reversed] {
            let p = of_strings("abc", false, rule_list).unwrap();
            let mut kb = KnuthBendix::new(CongruenceKind::TwoSided, p).unwrap();
            kb.run();
            assert!(kb.confluent());
            let mut active = kb.active_rules();
            active.sort();
            systems.push(active);
        }
        assert_eq!(systems[0], systems[1]);
    }

    #[test]
    fn stats_track_active_rules() {
        let mut kb = bicyclic();
        kb.run();
        assert_eq!(kb.min_length_lhs_rule(), Some(2));
        assert_eq!(kb.max_active_word_length(), 2);
        assert!(kb.stats().max_active_rules >= 1);
        assert!(kb.total_rules() >= 1);
        assert_eq!(kb.number_of_active_rules(), 1);
        let rules = kb.active_rules();
        assert_eq!(rules[0].0, from_str("ab"));
        assert_eq!(rules[0].1, from_str(""));
    }
}
