/// A single character-range transition.
///
/// A transition matches a character `c` when `first <= c <= last`. In an
/// NFA state's transition list, ranges may overlap freely; the subset
/// construction is responsible for making them disjoint.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Transition {
    pub first: u16,
    pub last: u16,
    pub target: usize,
}

/// A nondeterministic finite automaton under construction.
///
/// States are numbered densely from zero and are append only: once a
/// state exists it is never removed, and emitted pattern fragments only
/// ever add edges to states they created themselves. Each state carries
/// character-range transitions, epsilon transitions, and an optional
/// accept value.
#[derive(Clone, Debug)]
pub struct Nfa<M> {
    transitions: Vec<Vec<Transition>>,
    epsilons: Vec<Vec<usize>>,
    accepts: Vec<Option<M>>,
}

impl<M> Nfa<M> {
    pub fn new() -> Nfa<M> {
        Nfa { transitions: vec![], epsilons: vec![], accepts: vec![] }
    }

    /// The number of states added so far.
    pub fn len(&self) -> usize {
        self.accepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a new state with the given accept value and return its number.
    pub fn add_state(&mut self, accept: Option<M>) -> usize {
        let id = self.accepts.len();
        self.accepts.push(accept);
        self.transitions.push(vec![]);
        self.epsilons.push(vec![]);
        id
    }

    /// Add a transition from `from` to `to` on every character in
    /// `[first, last]`.
    pub fn add_transition(&mut self, from: usize, to: usize, first: u16, last: u16) {
        debug_assert!(first <= last);
        self.transitions[from].push(Transition { first, last, target: to });
    }

    /// Add an epsilon transition from `from` to `to`.
    pub fn add_epsilon(&mut self, from: usize, to: usize) {
        self.epsilons[from].push(to);
    }

    pub fn accept(&self, state: usize) -> Option<&M> {
        self.accepts[state].as_ref()
    }

    pub fn transitions(&self, state: usize) -> &[Transition] {
        &self.transitions[state]
    }

    pub fn epsilons(&self, state: usize) -> &[usize] {
        &self.epsilons[state]
    }

    /// True if the state does anything other than forward to other states
    /// via epsilons. States for which this is false are invisible to the
    /// subset construction's state-set fingerprints.
    pub(crate) fn has_transitions_or_accepts(&self, state: usize) -> bool {
        self.accepts[state].is_some() || !self.transitions[state].is_empty()
    }
}

impl<M> Default for Nfa<M> {
    fn default() -> Nfa<M> {
        Nfa::new()
    }
}
