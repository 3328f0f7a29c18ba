use std::fmt;

use crate::accepts::{
    push_u16, push_u32, read_u16, read_u32, take, Accept, AcceptBytes,
};
use crate::error::{Error, Result};
use crate::nfa::Transition;
use crate::raw::{DfaStateInfo, RawDfa};

/// Sentinel target meaning "no transition".
pub(crate) const NO_STATE: u32 = u32::max_value();
const NO_ACCEPT: u32 = u32::max_value();

const LABEL: &[u8] = b"dfalex-packed-dfa\x00";
const VERSION: u16 = 1;

/// A compiled, immutable DFA.
///
/// A `Dfa` holds every state of one build in a single vector; states
/// reference their successors by index, so the automaton forms an
/// arbitrary cyclic graph without any interior mutability. It is `Send`
/// and `Sync` (given `Send + Sync` accept values) and can be shared
/// freely across threads; scanning never mutates it.
///
/// Each state stores its transitions as an array-packed binary search
/// tree of boundary characters with a parallel successor array, so a
/// transition lookup costs at most `ceil(log2(k + 1))` comparisons where
/// `k` is the number of boundaries.
#[derive(Clone)]
pub struct Dfa<M> {
    states: Vec<PackedState>,
    accepts: Vec<M>,
    starts: Vec<u32>,
}

#[derive(Clone, Debug)]
struct PackedState {
    /// A complete binary search tree of boundary characters, packed
    /// heap-style: the root is at 0 and the children of `i` are at
    /// `2i + 1` and `2i + 2`. A character is a boundary exactly when its
    /// successor differs from the preceding character's successor.
    chars: Box<[u16]>,
    /// The leaves of the packed tree, `chars.len() + 1` entries.
    /// `targets[j]` is the successor for the `j`th leaf reached by the
    /// lookup walk, or `NO_STATE`.
    targets: Box<[u32]>,
    /// Index into `Dfa::accepts`, or `NO_ACCEPT`.
    accept: u32,
}

impl<M: Accept> Dfa<M> {
    /// Convert a raw (typically minimized) DFA into its packed runtime
    /// form.
    pub(crate) fn from_raw(raw: &RawDfa<M>) -> Dfa<M> {
        let mut accepts = Vec::new();
        let mut accept_map = Vec::with_capacity(raw.accept_sets.len());
        for entry in &raw.accept_sets {
            match entry {
                None => accept_map.push(NO_ACCEPT),
                Some(m) => {
                    accept_map.push(accepts.len() as u32);
                    accepts.push(m.clone());
                }
            }
        }
        let states = raw
            .states
            .iter()
            .map(|info| pack(info, accept_map[info.accept_index]))
            .collect();
        let starts = raw.starts.iter().map(|&s| s as u32).collect();
        Dfa { states, accepts, starts }
    }

    /// The number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The number of start states (one per input language).
    pub fn start_count(&self) -> usize {
        self.starts.len()
    }

    /// The start state for the given language index.
    ///
    /// Panics if `language >= start_count()`.
    pub fn start(&self, language: usize) -> DfaState<'_, M> {
        DfaState { dfa: self, id: self.starts[language] }
    }

    /// All start states, in language order.
    pub fn starts(&self) -> impl Iterator<Item = DfaState<'_, M>> + '_ {
        self.starts.iter().map(move |&id| DfaState { dfa: self, id })
    }

    fn state(&self, id: u32) -> DfaState<'_, M> {
        DfaState { dfa: self, id }
    }
}

impl<M: AcceptBytes> Dfa<M> {
    /// Serialize this DFA into a portable little-endian byte stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 16 * self.states.len());
        buf.extend_from_slice(LABEL);
        push_u16(&mut buf, 0xFEFF);
        push_u16(&mut buf, VERSION);
        push_u32(&mut buf, self.states.len() as u32);
        push_u32(&mut buf, self.starts.len() as u32);
        push_u32(&mut buf, self.accepts.len() as u32);
        for &start in &self.starts {
            push_u32(&mut buf, start);
        }
        for state in &self.states {
            push_u32(&mut buf, state.chars.len() as u32);
        }
        for accept in &self.accepts {
            accept.write_bytes(&mut buf);
        }
        for state in &self.states {
            push_u32(&mut buf, state.accept);
            for &c in state.chars.iter() {
                push_u16(&mut buf, c);
            }
            for &t in state.targets.iter() {
                push_u32(&mut buf, t);
            }
        }
        buf
    }

    /// Deserialize a DFA previously written by `to_bytes`.
    ///
    /// Every index in the stream is validated; a malformed stream
    /// produces a `Deserialize` error, never a panic or an out-of-bounds
    /// state reference.
    pub fn from_bytes(buf: &[u8]) -> Result<Dfa<M>> {
        let mut buf = buf;
        let label = take(&mut buf, LABEL.len(), "label")?;
        if label != LABEL {
            return Err(Error::deserialize("unrecognized label"));
        }
        if read_u16(&mut buf, "endian mark")? != 0xFEFF {
            return Err(Error::deserialize("endianness mark mismatch"));
        }
        if read_u16(&mut buf, "version")? != VERSION {
            return Err(Error::deserialize("unsupported version"));
        }
        let state_count = read_u32(&mut buf, "state count")? as usize;
        let start_count = read_u32(&mut buf, "start count")? as usize;
        let accept_count = read_u32(&mut buf, "accept count")? as usize;

        let mut starts = Vec::with_capacity(start_count.min(1024));
        for _ in 0..start_count {
            let start = read_u32(&mut buf, "start state")?;
            if start as usize >= state_count {
                return Err(Error::deserialize("start state out of range"));
            }
            starts.push(start);
        }
        let mut boundary_lens = Vec::with_capacity(state_count.min(1024));
        for _ in 0..state_count {
            boundary_lens.push(read_u32(&mut buf, "boundary length")? as usize);
        }
        let mut accepts = Vec::with_capacity(accept_count.min(1024));
        for _ in 0..accept_count {
            accepts.push(M::read_bytes(&mut buf)?);
        }

        // States are materialized into a vector and reconnected by
        // index; no second resolution pass is needed.
        let mut states = Vec::with_capacity(state_count.min(1024));
        for &len in &boundary_lens {
            let accept = read_u32(&mut buf, "accept index")?;
            if accept != NO_ACCEPT && accept as usize >= accept_count {
                return Err(Error::deserialize("accept index out of range"));
            }
            let mut chars = Vec::with_capacity(len);
            for _ in 0..len {
                chars.push(read_u16(&mut buf, "boundary character")?);
            }
            let mut targets = Vec::with_capacity(len + 1);
            for _ in 0..len + 1 {
                let target = read_u32(&mut buf, "transition target")?;
                if target != NO_STATE && target as usize >= state_count {
                    return Err(Error::deserialize("transition target out of range"));
                }
                targets.push(target);
            }
            states.push(PackedState {
                chars: chars.into_boxed_slice(),
                targets: targets.into_boxed_slice(),
                accept,
            });
        }
        if !buf.is_empty() {
            return Err(Error::deserialize("trailing bytes"));
        }
        Ok(Dfa { states, accepts, starts })
    }
}

/// A handle on one state of a compiled DFA.
///
/// This is a cheap `Copy` value; scanning hands these around by value.
pub struct DfaState<'a, M> {
    dfa: &'a Dfa<M>,
    id: u32,
}

impl<'a, M> Clone for DfaState<'a, M> {
    fn clone(&self) -> DfaState<'a, M> {
        *self
    }
}

impl<'a, M> Copy for DfaState<'a, M> {}

impl<'a, M> DfaState<'a, M> {
    /// The successor state on character `c`, or `None` if the DFA has no
    /// transition for `c` here.
    pub fn next(&self, c: u16) -> Option<DfaState<'a, M>> {
        let state = &self.dfa.states[self.id as usize];
        let len = state.chars.len();
        let mut i = 0;
        while i < len {
            i = 2 * i + if c < state.chars[i] { 1 } else { 2 };
        }
        let target = state.targets[i - len];
        if target == NO_STATE {
            None
        } else {
            Some(DfaState { dfa: self.dfa, id: target })
        }
    }

    /// The accept value of this state, if it is an accepting state.
    pub fn matched(&self) -> Option<&'a M> {
        let accept = self.dfa.states[self.id as usize].accept;
        if accept == NO_ACCEPT {
            None
        } else {
            Some(&self.dfa.accepts[accept as usize])
        }
    }

    /// This state's index in serialized order.
    pub fn state_number(&self) -> usize {
        self.id as usize
    }

    /// Call `visit` with `(first, last, target)` for each of this state's
    /// disjoint transition ranges, in ascending order.
    pub fn enumerate_transitions<F>(&self, visit: &mut F)
    where
        F: FnMut(u16, u16, DfaState<'a, M>),
    {
        let state = &self.dfa.states[self.id as usize];
        // the in-order traversal of the boundary tree is just the sorted
        // boundary list
        let mut bounds: Vec<u16> = state.chars.to_vec();
        bounds.sort_unstable();
        let mut slot = 0;
        self.walk_slots(0, &mut slot, &bounds, visit);
    }

    fn walk_slots<F>(
        &self,
        node: usize,
        slot: &mut usize,
        bounds: &[u16],
        visit: &mut F,
    ) where
        F: FnMut(u16, u16, DfaState<'a, M>),
    {
        let state = &self.dfa.states[self.id as usize];
        let len = state.chars.len();
        if node < len {
            self.walk_slots(2 * node + 1, slot, bounds, visit);
            self.walk_slots(2 * node + 2, slot, bounds, visit);
            return;
        }
        let j = *slot;
        *slot += 1;
        let first = if j == 0 { 0 } else { bounds[j - 1] };
        let last = if j == bounds.len() { 0xFFFF } else { bounds[j] - 1 };
        let target = state.targets[node - len];
        if target != NO_STATE {
            visit(first, last, DfaState { dfa: self.dfa, id: target });
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }
}

impl<'a, M: fmt::Debug> fmt::Debug for DfaState<'a, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DfaState").field("id", &self.id).finish()
    }
}

/// Pack one raw state: derive the boundary characters from its sorted
/// disjoint transitions, then transcribe them into a complete BST whose
/// in-order traversal reproduces the boundary list.
fn pack(info: &DfaStateInfo, accept: u32) -> PackedState {
    let trans = &info.transitions;
    if trans.is_empty() {
        return PackedState {
            chars: Box::default(),
            targets: vec![NO_STATE].into_boxed_slice(),
            accept,
        };
    }

    // A character c > 0 is a boundary iff the successor for c differs
    // from the successor for c - 1.
    let mut bounds: Vec<u16> = Vec::with_capacity(trans.len() * 2);
    let mut prev = trans[0];
    if prev.first != 0 {
        bounds.push(prev.first);
    }
    for &t in &trans[1..] {
        if t.first as u32 > prev.last as u32 + 1 {
            // a gap of dead characters between the transitions
            bounds.push(prev.last + 1);
            bounds.push(t.first);
        } else if t.target != prev.target {
            bounds.push(t.first);
        }
        prev = t;
    }
    if prev.last != 0xFFFF {
        bounds.push(prev.last + 1);
    }

    if bounds.is_empty() {
        // every character has the same outcome
        return PackedState {
            chars: Box::default(),
            targets: vec![prev.target as u32].into_boxed_slice(),
            accept,
        };
    }

    let len = bounds.len();
    let mut chars = vec![0u16; len].into_boxed_slice();
    let mut targets = vec![NO_STATE; len + 1].into_boxed_slice();
    let mut source = TranscriptionSource { bounds: &bounds, trans, pos: 0, cur: 0 };
    transcribe(&mut chars, &mut targets, 0, &mut source);
    PackedState { chars, targets, accept }
}

/// Fill the packed tree by in-order traversal: internal nodes consume
/// boundary characters in ascending order, and each leaf records the
/// successor for a representative character of its slot.
fn transcribe(
    chars: &mut [u16],
    targets: &mut [u32],
    node: usize,
    source: &mut TranscriptionSource,
) {
    if node < chars.len() {
        transcribe(chars, targets, 2 * node + 1, source);
        chars[node] = source.next_char();
        transcribe(chars, targets, 2 * node + 2, source);
    } else {
        targets[node - chars.len()] = source.current_target();
    }
}

/// Maintains a cursor in the boundary list during transcription.
struct TranscriptionSource<'a> {
    bounds: &'a [u16],
    trans: &'a [Transition],
    /// Cursor position, just before `bounds[pos]`.
    pos: usize,
    /// Transitions at indexes less than this are no longer relevant.
    cur: usize,
}

impl<'a> TranscriptionSource<'a> {
    fn next_char(&mut self) -> u16 {
        let c = self.bounds[self.pos];
        self.pos += 1;
        c
    }

    fn current_target(&mut self) -> u32 {
        // a representative character for the slot just before the cursor
        let c = if self.pos > 0 { self.bounds[self.pos - 1] } else { 0 };
        loop {
            if self.cur >= self.trans.len() {
                return NO_STATE;
            }
            let t = self.trans[self.cur];
            if t.last >= c {
                return if c >= t.first { t.target as u32 } else { NO_STATE };
            }
            self.cur += 1;
        }
    }
}

impl<M: Accept> fmt::Debug for Dfa<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (id, state) in self.states.iter().enumerate() {
            let mut status = String::from("  ");
            if self.starts.contains(&(id as u32)) {
                status.replace_range(0..1, ">");
            }
            if state.accept != NO_ACCEPT {
                status.replace_range(1..2, "*");
            }
            let mut ranges = vec![];
            self.state(id as u32).enumerate_transitions(&mut |first, last, target| {
                let line = if first == last {
                    format!("{} => {}", escape(first), target.state_number())
                } else {
                    format!(
                        "{}-{} => {}",
                        escape(first),
                        escape(last),
                        target.state_number(),
                    )
                };
                ranges.push(line);
            });
            match state.accept {
                NO_ACCEPT => {
                    writeln!(f, "{}{:04}: {}", status, id, ranges.join(", "))?
                }
                accept => writeln!(
                    f,
                    "{}{:04}: {} (accept {:?})",
                    status,
                    id,
                    ranges.join(", "),
                    self.accepts[accept as usize],
                )?,
            }
        }
        Ok(())
    }
}

/// Return the given code unit in readable escaped form.
fn escape(c: u16) -> String {
    if (0x20..0x7F).contains(&c) {
        match std::char::from_u32(c as u32) {
            Some(ch) => ch.to_string(),
            None => format!("\\u{:04X}", c),
        }
    } else {
        format!("\\u{:04X}", c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfa::Transition;

    fn info(transitions: Vec<(u16, u16, usize)>) -> DfaStateInfo {
        DfaStateInfo {
            transitions: transitions
                .into_iter()
                .map(|(first, last, target)| Transition { first, last, target })
                .collect(),
            accept_index: 0,
        }
    }

    /// The successor of `c` straight from a raw transition list.
    fn raw_next(info: &DfaStateInfo, c: u16) -> Option<usize> {
        info.transitions
            .iter()
            .find(|t| t.first <= c && c <= t.last)
            .map(|t| t.target)
    }

    /// The successor of `c` through the packed tree.
    fn packed_next(state: &PackedState, c: u16) -> Option<usize> {
        let len = state.chars.len();
        let mut i = 0;
        while i < len {
            i = 2 * i + if c < state.chars[i] { 1 } else { 2 };
        }
        match state.targets[i - len] {
            NO_STATE => None,
            t => Some(t as usize),
        }
    }

    fn check_equivalence(info: &DfaStateInfo) {
        let packed = pack(info, NO_ACCEPT);
        // probe every boundary, its neighbors, and the extremes
        let mut probes = vec![0u16, 1, 0xFFFE, 0xFFFF];
        for t in &info.transitions {
            for &c in &[t.first, t.last] {
                probes.push(c);
                probes.push(c.saturating_sub(1));
                probes.push(c.saturating_add(1));
            }
        }
        for c in probes {
            assert_eq!(
                raw_next(info, c),
                packed_next(&packed, c),
                "lookup mismatch for U+{:04X} in {:?}",
                c,
                info.transitions,
            );
        }
    }

    #[test]
    fn packed_tree_equivalence() {
        check_equivalence(&info(vec![]));
        check_equivalence(&info(vec![(0, 0xFFFF, 3)]));
        check_equivalence(&info(vec![(b'a' as u16, b'z' as u16, 1)]));
        check_equivalence(&info(vec![(0, b'a' as u16, 1)]));
        check_equivalence(&info(vec![(b'a' as u16, 0xFFFF, 1)]));
        check_equivalence(&info(vec![
            (b'0' as u16, b'9' as u16, 1),
            (b'A' as u16, b'Z' as u16, 2),
            (b'a' as u16, b'z' as u16, 3),
        ]));
        // adjacent ranges with different targets share a boundary
        check_equivalence(&info(vec![
            (b'a' as u16, b'm' as u16, 1),
            (b'n' as u16, b'z' as u16, 2),
        ]));
        check_equivalence(&info(vec![
            (0, 9, 1),
            (10, 10, 2),
            (11, 0xFFFF, 1),
        ]));
    }

    #[test]
    fn boundary_derivation() {
        // one interior range: boundaries at first and last+1
        let packed = pack(&info(vec![(b'a' as u16, b'z' as u16, 1)]), NO_ACCEPT);
        let mut bounds = packed.chars.to_vec();
        bounds.sort_unstable();
        assert_eq!(vec![b'a' as u16, b'z' as u16 + 1], bounds);

        // a range starting at 0 has no left boundary
        let packed = pack(&info(vec![(0, b'z' as u16, 1)]), NO_ACCEPT);
        let mut bounds = packed.chars.to_vec();
        bounds.sort_unstable();
        assert_eq!(vec![b'z' as u16 + 1], bounds);

        // full coverage by one target has no boundaries at all
        let packed = pack(&info(vec![(0, 0xFFFF, 1)]), NO_ACCEPT);
        assert!(packed.chars.is_empty());
        assert_eq!(&[1u32][..], &packed.targets[..]);
    }

    #[test]
    fn enumerate_transitions_roundtrip() {
        let raw = RawDfa::<u32> {
            states: vec![
                info(vec![
                    (b'0' as u16, b'9' as u16, 1),
                    (b'a' as u16, b'f' as u16, 0),
                ]),
                DfaStateInfo { transitions: vec![], accept_index: 1 },
            ],
            accept_sets: vec![None, Some(7)],
            starts: vec![0],
        };
        let dfa = Dfa::from_raw(&raw);
        let mut got = vec![];
        dfa.start(0).enumerate_transitions(&mut |first, last, target| {
            got.push((first, last, target.state_number()));
        });
        assert_eq!(
            vec![
                (b'0' as u16, b'9' as u16, 1),
                (b'a' as u16, b'f' as u16, 0),
            ],
            got,
        );
        assert_eq!(Some(&7), dfa.start(0).next(b'0' as u16).unwrap().matched());
    }

    #[test]
    fn serialization_roundtrip() {
        let raw = RawDfa::<String> {
            states: vec![
                info(vec![(b'a' as u16, b'z' as u16, 1)]),
                DfaStateInfo { transitions: vec![], accept_index: 1 },
            ],
            accept_sets: vec![None, Some("WORD".to_string())],
            starts: vec![0],
        };
        let dfa = Dfa::from_raw(&raw);
        let bytes = dfa.to_bytes();
        let loaded: Dfa<String> = Dfa::from_bytes(&bytes).unwrap();
        assert_eq!(dfa.len(), loaded.len());
        assert_eq!(dfa.start_count(), loaded.start_count());
        let state = loaded.start(0).next(b'q' as u16).unwrap();
        assert_eq!(Some(&"WORD".to_string()), state.matched());
        assert_eq!(None, loaded.start(0).next(b'!' as u16).map(|_| ()));
    }

    #[test]
    fn dfa_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<Dfa<u32>>();
        check::<Dfa<String>>();
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let raw = RawDfa::<u32> {
            states: vec![DfaStateInfo { transitions: vec![], accept_index: 1 }],
            accept_sets: vec![None, Some(3)],
            starts: vec![0],
        };
        let bytes = Dfa::from_raw(&raw).to_bytes();

        assert!(Dfa::<u32>::from_bytes(&[]).is_err());
        assert!(Dfa::<u32>::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        let mut wrong_label = bytes.clone();
        wrong_label[0] = b'x';
        assert!(Dfa::<u32>::from_bytes(&wrong_label).is_err());
        let mut wrong_version = bytes.clone();
        wrong_version[LABEL.len() + 2] = 0xEE;
        assert!(Dfa::<u32>::from_bytes(&wrong_version).is_err());
        let mut trailing = bytes;
        trailing.push(0);
        assert!(Dfa::<u32>::from_bytes(&trailing).is_err());
    }
}
