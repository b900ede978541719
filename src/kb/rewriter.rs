//! Rewriting strategies.
//!
//! A rewriter owns the rule storage and reduces words with respect to
//! the active rules, always replacing the leftmost occurrence of any
//! left hand side first. Two strategies are provided: a linear scan of
//! the active rules per position ([`RewriteFromLeft`]), and a
//! multi-pattern automaton over all active left hand sides
//! ([`RewriteTrie`]), rebuilt lazily after each batch of rule changes.
//! Both use the same two-stack scheme, so a reduction is a single left
//! to right pass with backtracking only over replaced text.

use aho_corasick::automaton::{Automaton, StateID};
use aho_corasick::dfa::DFA;
use aho_corasick::Anchored;

use super::rule::{InternalWord, RuleId, Rules};

/// Selects the rewriting strategy of a Knuth-Bendix engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriterKind {
    /// Check the active rules one by one at each position.
    FromLeft,
    /// Index the active left hand sides in an Aho-Corasick automaton.
    Trie,
}

impl Default for RewriterKind {
    fn default() -> Self {
        Self::Trie
    }
}

#[derive(Debug, Default)]
pub(crate) struct RewriteFromLeft {
    rules: Rules,
}

#[derive(Debug, Default)]
pub(crate) struct RewriteTrie {
    rules: Rules,
    automaton: Option<DFA>,
    pattern_rules: Vec<RuleId>,
    dirty: bool,
}

impl RewriteFromLeft {
    fn rewrite(&self, w: &mut InternalWord) {
        let mut out = InternalWord::with_capacity(w.len());
        let mut rest: InternalWord = std::mem::take(w);
        rest.reverse();
        while let Some(a) = rest.pop() {
            out.push(a);
            let matched = self
                .rules
                .iter_active()
                .find(|&id| out.ends_with(&self.rules.get(id).lhs));
            if let Some(id) = matched {
                let rule = self.rules.get(id);
                out.truncate(out.len() - rule.lhs.len());
                rest.extend(rule.rhs.iter().rev());
            }
        }
        *w = out;
    }
}

impl RewriteTrie {
    fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        self.pattern_rules = self.rules.iter_active().collect();
        if self.pattern_rules.is_empty() {
            self.automaton = None;
        } else {
            let patterns: Vec<&[u8]> = self
                .pattern_rules
                .iter()
                .map(|&id| self.rules.get(id).lhs.as_slice())
                .collect();
            self.automaton =
                Some(DFA::new(&patterns).expect("failed to build the rule automaton"));
        }
        self.dirty = false;
    }

    fn rewrite_inner(&self, w: &mut InternalWord) {
        let dfa = match &self.automaton {
            None => return,
            Some(dfa) => dfa,
        };
        let start = dfa
            .start_state(Anchored::No)
            .expect("unanchored starts are always supported");
        let mut out = InternalWord::with_capacity(w.len());
        let mut states: Vec<StateID> = Vec::with_capacity(w.len() + 1);
        states.push(start);
        let mut rest: InternalWord = std::mem::take(w);
        rest.reverse();
        while let Some(a) = rest.pop() {
            let sid = dfa.next_state(Anchored::No, *states.last().unwrap(), a);
            out.push(a);
            states.push(sid);
            if dfa.is_match(sid) {
                let pattern = dfa.match_pattern(sid, 0).as_usize();
                let rule = self.rules.get(self.pattern_rules[pattern]);
                out.truncate(out.len() - rule.lhs.len());
                states.truncate(out.len() + 1);
                rest.extend(rule.rhs.iter().rev());
            }
        }
        *w = out;
    }
}

/// The rewriter of a Knuth-Bendix engine, dispatching on the selected
/// strategy.
#[derive(Debug)]
pub(crate) enum Rewriter {
    FromLeft(RewriteFromLeft),
    Trie(RewriteTrie),
}

impl Rewriter {
    pub(crate) fn new(kind: RewriterKind) -> Self {
        match kind {
            RewriterKind::FromLeft => Self::FromLeft(RewriteFromLeft::default()),
            RewriterKind::Trie => Self::Trie(RewriteTrie::default()),
        }
    }

    pub(crate) fn rules(&self) -> &Rules {
        match self {
            Self::FromLeft(r) => &r.rules,
            Self::Trie(r) => &r.rules,
        }
    }

    pub(crate) fn rules_mut(&mut self) -> &mut Rules {
        self.mark_changed();
        match self {
            Self::FromLeft(r) => &mut r.rules,
            Self::Trie(r) => &mut r.rules,
        }
    }

    /// Reduces `w` in place with respect to the active rules.
    pub(crate) fn rewrite(&mut self, w: &mut InternalWord) {
        match self {
            Self::FromLeft(r) => r.rewrite(w),
            Self::Trie(r) => {
                r.refresh();
                r.rewrite_inner(w);
            }
        }
    }

    fn mark_changed(&mut self) {
        if let Self::Trie(r) = self {
            r.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rules(kind: RewriterKind, rules: &[(&[u8], &[u8])]) -> Rewriter {
        let mut rewriter = Rewriter::new(kind);
        for (lhs, rhs) in rules {
            rewriter.rules_mut().activate(lhs.to_vec(), rhs.to_vec());
        }
        rewriter
    }

    fn check_rewrites(kind: RewriterKind) {
        // ab -> empty in the bicyclic monoid, letters a = 1, b = 2
        let mut r = with_rules(kind, &[(&[1, 2], &[])]);
        let mut w = vec![2, 1, 2, 1, 1, 2, 2];
        r.rewrite(&mut w);
        assert_eq!(w, vec![2]);
        let mut w = vec![1, 2];
        r.rewrite(&mut w);
        assert!(w.is_empty());

        // aa -> a, bb -> b, with a replacement that re-exposes a redex
        let mut r = with_rules(kind, &[(&[1, 1], &[1]), (&[2, 1], &[1, 2])]);
        let mut w = vec![2, 1, 1];
        r.rewrite(&mut w);
        assert_eq!(w, vec![1, 2]);
    }

    #[test]
    fn rewrite_from_left() {
        check_rewrites(RewriterKind::FromLeft);
    }

    #[test]
    fn rewrite_trie() {
        check_rewrites(RewriterKind::Trie);
    }

    #[test]
    fn rewriting_is_idempotent() {
        for kind in [RewriterKind::FromLeft, RewriterKind::Trie] {
            let mut r = with_rules(kind, &[(&[1, 2], &[2, 1]), (&[1, 1], &[])]);
            let mut w = vec![1, 2, 1, 2, 1, 1, 2];
            r.rewrite(&mut w);
            let mut again = w.clone();
            r.rewrite(&mut again);
            assert_eq!(w, again);
        }
    }

    #[test]
    fn trie_rebuilds_after_rule_changes() {
        let mut r = with_rules(RewriterKind::Trie, &[(&[1, 1], &[1])]);
        let mut w = vec![1, 1, 2];
        r.rewrite(&mut w);
        assert_eq!(w, vec![1, 2]);
        // deactivate the only rule; the automaton must notice
        let id = r.rules().first_active().unwrap();
        r.rules_mut().deactivate(id);
        let mut w = vec![1, 1, 2];
        r.rewrite(&mut w);
        assert_eq!(w, vec![1, 1, 2]);
    }
}
