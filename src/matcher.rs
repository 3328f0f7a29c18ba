use crate::dfa::DfaState;

const NMM_SIZE: usize = 128;

/// Finds longest matches in a string of 16-bit code units.
///
/// A matcher holds the string being scanned and a cursor; each call to
/// [`find_next`](StringMatcher::find_next) scans forward from the cursor
/// for the next position at which some prefix is accepted, reporting the
/// *longest* accepting prefix there. The DFA states handed in must all
/// come from the same compiled DFA.
///
/// # The non-matching memo
///
/// Scanning for a match at every successive start position can revisit
/// the same `(position, state)` pair many times while crossing a long
/// non-matching region. Because the DFA is deterministic, reaching the
/// same state at the same absolute position always unfolds identically,
/// so a bounded memo of pairs known not to lead anywhere lets the scan
/// abort early. Entries are recorded at exponentially growing intervals
/// while no match has been seen, checked on every non-accepting step, and
/// merged into the live set when the scan ends.
pub struct StringMatcher<'s, 'd, M> {
    src: &'s [u16],
    current_match: Option<&'d M>,
    current_start: usize,
    current_end: usize,
    /// Live memo entries occupy `[nmm_start, NMM_SIZE)`, ordered by
    /// position; `[0, new_len)` is scratch for the scan in progress.
    nmm_start: usize,
    nmm_positions: [usize; NMM_SIZE],
    nmm_states: [u32; NMM_SIZE],
}

impl<'s, 'd, M> StringMatcher<'s, 'd, M> {
    pub fn new(src: &'s [u16]) -> StringMatcher<'s, 'd, M> {
        StringMatcher {
            src,
            current_match: None,
            current_start: 0,
            current_end: 0,
            nmm_start: NMM_SIZE,
            nmm_positions: [0; NMM_SIZE],
            nmm_states: [0; NMM_SIZE],
        }
    }

    /// The accept value of the most recent match, if any.
    pub fn current_match(&self) -> Option<&'d M> {
        self.current_match
    }

    /// The start position of the most recent match.
    pub fn current_match_start(&self) -> usize {
        self.current_start
    }

    /// The position one past the last character of the most recent match.
    pub fn current_match_end(&self) -> usize {
        self.current_end
    }

    /// Move the scan cursor, so the next `find_next` or `match_next`
    /// starts at `pos`.
    pub fn reposition(&mut self, pos: usize) {
        let pos = pos.min(self.src.len());
        self.current_match = None;
        self.current_start = pos;
        self.current_end = pos;
    }

    /// Find the next match at or after the cursor, advancing the cursor
    /// past it.
    pub fn find_next(&mut self, state: DfaState<'d, M>) -> Option<&'d M> {
        let mut pos = self.current_end;
        let mut found = self.match_at(state, pos);
        while found.is_none() && pos < self.src.len() {
            pos += 1;
            found = self.match_at(state, pos);
        }
        found
    }

    /// Match starting exactly at the cursor.
    pub fn match_next(&mut self, state: DfaState<'d, M>) -> Option<&'d M> {
        self.match_at(state, self.current_end)
    }

    /// Return the accept value of the longest accepting prefix of the
    /// source beginning at `start_pos` (which may be the start state's
    /// own accept for the empty prefix), and record its bounds.
    pub fn match_at(
        &mut self,
        start: DfaState<'d, M>,
        start_pos: usize,
    ) -> Option<&'d M> {
        self.current_start = start_pos;
        self.current_end = start_pos;
        self.current_match = start.matched();
        let lim = self.src.len();
        let mut state = start;
        let mut pos = start_pos;
        // scratch entries written this scan
        let mut new_len = 0;
        let mut write_next = start_pos + 2;

        'scan: while pos < lim {
            state = match state.next(self.src[pos]) {
                None => break,
                Some(next) => next,
            };
            pos += 1;
            if let Some(m) = state.matched() {
                self.current_match = Some(m);
                self.current_end = pos;
                new_len = 0;
                continue;
            }

            // Consult and advance the memo. Only worth the overhead in
            // non-accepting states, which is also the only place entries
            // can exist.
            while self.nmm_start < NMM_SIZE
                && self.nmm_positions[self.nmm_start] <= pos
            {
                if self.nmm_positions[self.nmm_start] == pos
                    && self.nmm_states[self.nmm_start] == state.id()
                {
                    // this exact configuration already failed
                    break 'scan;
                }
                self.nmm_start += 1;
            }
            if pos >= write_next && new_len < self.nmm_start {
                self.nmm_positions[new_len] = pos;
                self.nmm_states[new_len] = state.id();
                new_len += 1;
                write_next += (write_next + 4 - start_pos) >> 1;
            }
        }

        // Drop live entries positioned inside the window this scan
        // covered, then merge the scratch entries in front of the
        // remaining live ones.
        while self.nmm_start < NMM_SIZE
            && self.nmm_positions[self.nmm_start] < write_next
        {
            self.nmm_start += 1;
        }
        while new_len > 0 {
            new_len -= 1;
            self.nmm_start -= 1;
            self.nmm_positions[self.nmm_start] = self.nmm_positions[new_len];
            self.nmm_states[self.nmm_start] = self.nmm_states[new_len];
        }
        self.current_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DfaBuilder;
    use crate::dfa::Dfa;
    use crate::pattern::Pattern;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn build(patterns: Vec<(Pattern, u32)>) -> Dfa<u32> {
        let mut builder = DfaBuilder::new();
        let mut language = std::collections::BTreeSet::new();
        for (pattern, accept) in patterns {
            language.insert(accept);
            builder.add_pattern(pattern, accept);
        }
        builder.build(&language, None).unwrap()
    }

    #[test]
    fn longest_match_wins() {
        let dfa = build(vec![
            (Pattern::literal("a"), 1),
            (Pattern::literal("ab"), 2),
        ]);
        let src = units("abc");
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&2), matcher.match_at(dfa.start(0), 0));
        assert_eq!(0, matcher.current_match_start());
        assert_eq!(2, matcher.current_match_end());
        assert_eq!(None, matcher.match_at(dfa.start(0), 2));
    }

    #[test]
    fn find_next_walks_matches_in_order() {
        let dfa = build(vec![
            (Pattern::digits(), 1),
            (Pattern::repeat(Pattern::range(b'a' as u16, b'z' as u16).unwrap()), 2),
        ]);
        let src = units("foo123bar");
        let mut matcher = StringMatcher::new(&src);

        assert_eq!(Some(&2), matcher.find_next(dfa.start(0)));
        assert_eq!((0, 3), (matcher.current_match_start(), matcher.current_match_end()));
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        assert_eq!((3, 6), (matcher.current_match_start(), matcher.current_match_end()));
        assert_eq!(Some(&2), matcher.find_next(dfa.start(0)));
        assert_eq!((6, 9), (matcher.current_match_start(), matcher.current_match_end()));
        assert_eq!(None, matcher.find_next(dfa.start(0)));
    }

    #[test]
    fn match_end_is_the_real_end() {
        let dfa = build(vec![(Pattern::literal("abc"), 1)]);
        let src = units("zzabczz");
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        assert_eq!(2, matcher.current_match_start());
        assert_eq!(5, matcher.current_match_end());
    }

    #[test]
    fn start_state_accept_matches_empty_prefix() {
        let dfa = build(vec![(Pattern::maybe_repeat("a"), 1)]);
        let src = units("bbb");
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.match_at(dfa.start(0), 0));
        assert_eq!(0, matcher.current_match_start());
        assert_eq!(0, matcher.current_match_end());
    }

    #[test]
    fn reposition_restarts_scanning() {
        let dfa = build(vec![(Pattern::literal("ab"), 1)]);
        let src = units("ababab");
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        matcher.reposition(1);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        assert_eq!((2, 4), (matcher.current_match_start(), matcher.current_match_end()));
    }

    #[test]
    fn long_nonmatching_region() {
        // A pattern that requires a terminator the long middle run never
        // provides, so every start position in the run walks deep into
        // the digits and fails. The memo must not change the outcome.
        let dfa = build(vec![(
            Pattern::literal("a").then(Pattern::digits()).then("z"),
            1,
        )]);
        let mut text = String::from("a");
        text.push_str(&"7".repeat(4000));
        text.push_str(" a123z tail");
        let src = units(&text);
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        assert_eq!(4002, matcher.current_match_start());
        assert_eq!(4007, matcher.current_match_end());
        assert_eq!(None, matcher.find_next(dfa.start(0)));
    }

    #[test]
    fn memo_survives_many_probes() {
        // Lots of overlapping failed probes in sequence; results must be
        // exactly the matches a naive scanner would report.
        let dfa = build(vec![(Pattern::repeat("ab").then("!"), 1)]);
        let mut text = "ab".repeat(600);
        text.push_str("ab! ");
        text.push_str(&"ab".repeat(600));
        let src = units(&text);
        let mut matcher = StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
        assert_eq!(0, matcher.current_match_start());
        assert_eq!(1203, matcher.current_match_end());
        assert_eq!(None, matcher.find_next(dfa.start(0)));
    }
}
