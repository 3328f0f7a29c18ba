use crate::nfa::Transition;

/// The intermediate DFA produced by the subset construction and consumed
/// by the minimizer and the packed-state conversion.
///
/// States reference one another by index (any state may transition to any
/// other, including itself), so the whole automaton lives in one vector.
#[derive(Clone, Debug)]
pub struct RawDfa<M> {
    pub states: Vec<DfaStateInfo>,
    /// Distinct accept values after ambiguity resolution. Index 0 is
    /// always `None`; every other entry is `Some`.
    pub accept_sets: Vec<Option<M>>,
    /// One start state per input language, in language order.
    pub starts: Vec<usize>,
}

/// One raw DFA state.
#[derive(Clone, Debug)]
pub struct DfaStateInfo {
    /// Ordered, pairwise disjoint transitions, ascending by `first`, with
    /// adjacent equal-target ranges merged.
    pub transitions: Vec<Transition>,
    /// Index into `RawDfa::accept_sets`; 0 means no accept.
    pub accept_index: usize,
}

impl<M> RawDfa<M> {
    pub fn accept_of(&self, state: usize) -> Option<&M> {
        self.accept_sets[self.states[state].accept_index].as_ref()
    }
}
