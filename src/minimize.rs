use log::trace;
use rustc_hash::FxHashMap;

use crate::accepts::Accept;
use crate::nfa::Transition;
use crate::raw::{DfaStateInfo, RawDfa};

/// Minimizes a raw DFA by partition refinement.
///
/// Two states end up in the same equivalence class iff they have equal
/// accept values and, for every character, successors in the same class.
/// Rather than splitting per character as the textbook Hopcroft loop
/// does over a byte alphabet, classes are refined by regrouping on a
/// per-state signature of `(class, [(range, successor class)])`, which
/// handles the 2^16 alphabet through each state's sorted range list.
///
/// A virtual dead state participates in the partition so that states
/// from which no accept is reachable collapse into it and disappear from
/// the output, and so that "no transition" and "transition to a dead-
/// equivalent state" are recognized as the same behavior.
///
/// Start states carry a distinguishing tag per language, so start states
/// of different languages never merge (and never merge into the dead
/// class), preserving one start per input language.
pub struct Minimizer<'a, M> {
    dfa: &'a RawDfa<M>,
}

impl<'a, M: Accept> Minimizer<'a, M> {
    pub fn new(dfa: &'a RawDfa<M>) -> Minimizer<'a, M> {
        Minimizer { dfa }
    }

    pub fn run(self) -> RawDfa<M> {
        let state_count = self.dfa.states.len();
        let dead = state_count;

        let mut start_tags: Vec<Vec<u16>> = vec![vec![]; state_count + 1];
        for (language, &start) in self.dfa.starts.iter().enumerate() {
            start_tags[start].push(language as u16);
        }

        // Initial partition: group by (accept value, start-state role).
        let mut class: Vec<u32> = vec![0; state_count + 1];
        let mut count;
        {
            let mut groups: FxHashMap<(usize, &[u16]), u32> =
                FxHashMap::default();
            for id in 0..=state_count {
                let accept_index =
                    if id == dead { 0 } else { self.dfa.states[id].accept_index };
                let key = (accept_index, start_tags[id].as_slice());
                let next = groups.len() as u32;
                class[id] = *groups.entry(key).or_insert(next);
            }
            count = groups.len();
        }

        // Refine until no class splits.
        let mut rounds = 0;
        loop {
            rounds += 1;
            let dead_class = class[dead];
            let mut groups: FxHashMap<(u32, Vec<(u16, u16, u32)>), u32> =
                FxHashMap::default();
            let mut new_class = vec![0u32; state_count + 1];
            for id in 0..=state_count {
                let key = (class[id], self.signature(id, &class, dead_class));
                let next = groups.len() as u32;
                new_class[id] = *groups.entry(key).or_insert(next);
            }
            let new_count = groups.len();
            class = new_class;
            if new_count == count {
                break;
            }
            count = new_count;
        }
        trace!(
            "minimized {} states into {} classes in {} rounds",
            state_count,
            count,
            rounds,
        );

        self.build_output(&class, class[dead])
    }

    /// A state's behavior under the current partition: its transitions
    /// mapped through the class assignment, with dead-class runs dropped
    /// and contiguous same-class runs merged. Two states with equal
    /// current class and equal signature are indistinguishable this
    /// round.
    fn signature(
        &self,
        id: usize,
        class: &[u32],
        dead_class: u32,
    ) -> Vec<(u16, u16, u32)> {
        let mut sig: Vec<(u16, u16, u32)> = vec![];
        if id == self.dfa.states.len() {
            return sig;
        }
        for t in &self.dfa.states[id].transitions {
            let c = class[t.target];
            if c == dead_class {
                continue;
            }
            if let Some(last) = sig.last_mut() {
                if last.2 == c && t.first as u32 == last.1 as u32 + 1 {
                    last.1 = t.last;
                    continue;
                }
            }
            sig.push((t.first, t.last, c));
        }
        sig
    }

    /// Build the output DFA: one state per non-dead class, numbered in
    /// order of each class's smallest member so that start states keep
    /// their language order.
    fn build_output(&self, class: &[u32], dead_class: u32) -> RawDfa<M> {
        let state_count = self.dfa.states.len();
        let class_count = class.iter().map(|&c| c as usize + 1).max().unwrap_or(0);
        let mut out_of_class: Vec<u32> = vec![u32::max_value(); class_count];
        let mut reps: Vec<usize> = vec![];
        for id in 0..state_count {
            let c = class[id];
            if c == dead_class {
                continue;
            }
            if out_of_class[c as usize] == u32::max_value() {
                out_of_class[c as usize] = reps.len() as u32;
                reps.push(id);
            }
        }

        let mut accept_sets: Vec<Option<M>> = vec![None];
        let mut accept_indices: FxHashMap<&M, usize> = FxHashMap::default();
        let mut states = Vec::with_capacity(reps.len());
        for &rep in &reps {
            let info = &self.dfa.states[rep];
            let mut transitions: Vec<Transition> = vec![];
            for t in &info.transitions {
                let c = class[t.target];
                if c == dead_class {
                    continue;
                }
                let target = out_of_class[c as usize] as usize;
                if let Some(prev) = transitions.last_mut() {
                    if prev.target == target
                        && t.first as u32 == prev.last as u32 + 1
                    {
                        prev.last = t.last;
                        continue;
                    }
                }
                transitions.push(Transition { first: t.first, last: t.last, target });
            }
            let accept_index = match &self.dfa.accept_sets[info.accept_index] {
                None => 0,
                Some(m) => match accept_indices.get(m) {
                    Some(&index) => index,
                    None => {
                        let index = accept_sets.len();
                        accept_sets.push(Some(m.clone()));
                        accept_indices.insert(m, index);
                        index
                    }
                },
            };
            states.push(DfaStateInfo { transitions, accept_index });
        }

        let starts = self
            .dfa
            .starts
            .iter()
            .map(|&s| out_of_class[class[s] as usize] as usize)
            .collect();
        RawDfa { states, accept_sets, starts }
    }
}
