use std::collections::BTreeSet;

use log::trace;
use rustc_hash::FxHashMap;

use crate::accepts::Accept;
use crate::builder::AmbiguityResolver;
use crate::error::{Error, Result};
use crate::nfa::{Nfa, Transition};
use crate::raw::{DfaStateInfo, RawDfa};
use crate::sparse_set::SparseSet;

/// Converts a multi-start NFA into a raw DFA via subset construction.
pub struct Determinizer<'a, M> {
    /// The NFA we're converting into a DFA.
    nfa: &'a Nfa<M>,
    /// Collapses simultaneous accepts into one; `None` means ambiguity
    /// is a build failure.
    resolver: Option<&'a dyn AmbiguityResolver<M>>,
    /// The DFA states built so far. A state's transitions are filled in
    /// when it is popped off the work list.
    states: Vec<DfaStateInfo>,
    /// Each DFA state's defining set of NFA states: the epsilon closure
    /// restricted to significant members, sorted so that identical
    /// subsets deduplicate regardless of discovery order.
    sets: Vec<Vec<usize>>,
    /// Maps defining sets to existing DFA states.
    cache: FxHashMap<Vec<usize>, usize>,
    /// Distinct resolved accept values; index 0 is reserved for "none".
    accept_sets: Vec<Option<M>>,
    accept_indices: FxHashMap<M, usize>,
    /// Scratch for epsilon closure marking and traversal.
    seen: SparseSet,
    stack: Vec<usize>,
}

impl<'a, M: Accept> Determinizer<'a, M> {
    pub fn new(
        nfa: &'a Nfa<M>,
        resolver: Option<&'a dyn AmbiguityResolver<M>>,
    ) -> Determinizer<'a, M> {
        Determinizer {
            nfa,
            resolver,
            states: vec![],
            sets: vec![],
            cache: FxHashMap::default(),
            accept_sets: vec![None],
            accept_indices: FxHashMap::default(),
            seen: SparseSet::new(nfa.len()),
            stack: vec![],
        }
    }

    pub fn build(mut self, nfa_starts: &[usize]) -> Result<RawDfa<M>> {
        let mut starts = Vec::with_capacity(nfa_starts.len());
        for &start in nfa_starts {
            self.seen.clear();
            self.add_closure(start);
            let set = self.significant_set();
            starts.push(self.add_state(set)?);
        }

        let mut next = 0;
        while next < self.states.len() {
            self.compile_state(next)?;
            next += 1;
        }
        trace!(
            "determinized {} NFA states into {} DFA states",
            self.nfa.len(),
            self.states.len(),
        );

        Ok(RawDfa { states: self.states, accept_sets: self.accept_sets, starts })
    }

    /// Fill in the transitions of DFA state `id` from its defining set,
    /// allocating successor states as needed.
    fn compile_state(&mut self, id: usize) -> Result<()> {
        // Gather every NFA transition leaving the set. The sorted unique
        // {first, last+1} values partition the touched subrange of the
        // alphabet into maximal ranges on which the set of applicable
        // transitions is constant.
        let mut gathered: Vec<Transition> = vec![];
        for &nfa_id in &self.sets[id] {
            gathered.extend_from_slice(self.nfa.transitions(nfa_id));
        }
        if gathered.is_empty() {
            return Ok(());
        }
        let mut bounds: Vec<u32> = Vec::with_capacity(gathered.len() * 2);
        for t in &gathered {
            bounds.push(t.first as u32);
            bounds.push(t.last as u32 + 1);
        }
        bounds.sort_unstable();
        bounds.dedup();

        let mut transitions: Vec<Transition> = vec![];
        for window in bounds.windows(2) {
            let (lo, hi) = (window[0], window[1] - 1);
            self.seen.clear();
            let mut any = false;
            for t in &gathered {
                if t.first as u32 <= lo && t.last as u32 >= hi {
                    any = true;
                    self.add_closure(t.target);
                }
            }
            if !any {
                continue;
            }
            let set = self.significant_set();
            let target = self.add_state(set)?;
            // merge with the previous range when it's contiguous and
            // reaches the same state
            if let Some(prev) = transitions.last_mut() {
                if prev.target == target && lo == prev.last as u32 + 1 {
                    prev.last = hi as u16;
                    continue;
                }
            }
            transitions.push(Transition {
                first: lo as u16,
                last: hi as u16,
                target,
            });
        }
        self.states[id].transitions = transitions;
        Ok(())
    }

    /// Mark the epsilon closure of `seed` in `self.seen`.
    fn add_closure(&mut self, seed: usize) {
        if self.seen.insert(seed) {
            self.stack.push(seed);
        }
        while let Some(id) = self.stack.pop() {
            for &e in self.nfa.epsilons(id) {
                if self.seen.insert(e) {
                    self.stack.push(e);
                }
            }
        }
    }

    /// The marked closure restricted to significant states, in canonical
    /// (sorted) order.
    fn significant_set(&self) -> Vec<usize> {
        let mut set: Vec<usize> = self
            .seen
            .iter()
            .filter(|&id| self.nfa.has_transitions_or_accepts(id))
            .collect();
        set.sort_unstable();
        set
    }

    /// Look up or allocate the DFA state for a defining set.
    fn add_state(&mut self, set: Vec<usize>) -> Result<usize> {
        if let Some(&id) = self.cache.get(&set) {
            return Ok(id);
        }
        let accept_index = self.accept_index_of(&set)?;
        let id = self.states.len();
        self.states.push(DfaStateInfo { transitions: vec![], accept_index });
        self.cache.insert(set.clone(), id);
        self.sets.push(set);
        Ok(id)
    }

    /// Resolve the accept values of a defining set down to one table
    /// index: none, the single value, or whatever the resolver picks.
    fn accept_index_of(&mut self, set: &[usize]) -> Result<usize> {
        let mut accepts = BTreeSet::new();
        for &id in set {
            if let Some(m) = self.nfa.accept(id) {
                accepts.insert(m.clone());
            }
        }
        let resolved = match accepts.len() {
            0 => return Ok(0),
            1 => match accepts.into_iter().next() {
                Some(m) => m,
                None => return Ok(0),
            },
            _ => match self.resolver {
                Some(resolver) => resolver.resolve(&accepts)?,
                None => {
                    return Err(Error::ambiguous(
                        accepts.iter().map(|m| format!("{:?}", m)),
                    ));
                }
            },
        };
        if let Some(&index) = self.accept_indices.get(&resolved) {
            return Ok(index);
        }
        let index = self.accept_sets.len();
        self.accept_sets.push(Some(resolved.clone()));
        self.accept_indices.insert(resolved, index);
        Ok(index)
    }
}
