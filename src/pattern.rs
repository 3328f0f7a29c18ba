use crate::accepts::{push_u16, push_u32};
use crate::error::{Error, Result};
use crate::nfa::Nfa;

/// A set of disjoint character ranges, used as a single-character pattern.
///
/// A `CharRange` matches exactly one character drawn from its ranges.
/// Construct one with [`CharRange::new`] for a contiguous range, or with
/// [`CharRange::builder`] for unions and complements of ranges.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CharRange {
    /// Sorted, pairwise disjoint, non-adjacent inclusive ranges.
    ranges: Vec<(u16, u16)>,
}

impl CharRange {
    /// A range matching every character `c` with `first <= c <= last`.
    ///
    /// Returns an error if `first > last`.
    pub fn new(first: u16, last: u16) -> Result<CharRange> {
        if first > last {
            return Err(Error::invalid_range(first, last));
        }
        Ok(CharRange::of(first, last))
    }

    pub(crate) fn of(first: u16, last: u16) -> CharRange {
        debug_assert!(first <= last);
        CharRange { ranges: vec![(first, last)] }
    }

    pub fn builder() -> CharRangeBuilder {
        CharRangeBuilder { ranges: vec![], inverted: false }
    }

    /// A range matching any single character appearing in `chars`.
    ///
    /// The string is interpreted as UTF-16 code units, so characters
    /// outside the basic multilingual plane contribute their surrogate
    /// units individually.
    pub fn any_of(chars: &str) -> CharRange {
        let mut builder = CharRange::builder();
        builder.add_chars(chars);
        builder.build()
    }

    /// A range matching any single character *not* appearing in `chars`.
    pub fn not_any_of(chars: &str) -> CharRange {
        let mut builder = CharRange::builder();
        builder.add_chars(chars);
        builder.invert();
        builder.build()
    }

    /// True if `c` is in the set.
    pub fn contains(&self, c: u16) -> bool {
        self.ranges
            .binary_search_by(|&(first, last)| {
                if c < first {
                    std::cmp::Ordering::Greater
                } else if c > last {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub(crate) fn ranges(&self) -> &[(u16, u16)] {
        &self.ranges
    }
}

/// Builds a [`CharRange`] from individual characters and ranges.
#[derive(Clone, Debug)]
pub struct CharRangeBuilder {
    ranges: Vec<(u16, u16)>,
    inverted: bool,
}

impl CharRangeBuilder {
    /// Add every character in `[first, last]` to the set.
    ///
    /// Returns an error if `first > last`.
    pub fn add_range(&mut self, first: u16, last: u16) -> Result<&mut CharRangeBuilder> {
        if first > last {
            return Err(Error::invalid_range(first, last));
        }
        self.ranges.push((first, last));
        Ok(self)
    }

    /// Add a single character to the set.
    pub fn add_char(&mut self, c: u16) -> &mut CharRangeBuilder {
        self.ranges.push((c, c));
        self
    }

    /// Add every UTF-16 code unit of `chars` to the set.
    pub fn add_chars(&mut self, chars: &str) -> &mut CharRangeBuilder {
        for c in chars.encode_utf16() {
            self.ranges.push((c, c));
        }
        self
    }

    /// Complement the set within `[0, 0xFFFF]` when `build` is called.
    pub fn invert(&mut self) -> &mut CharRangeBuilder {
        self.inverted = !self.inverted;
        self
    }

    /// Normalize the accumulated ranges into a `CharRange`.
    pub fn build(&self) -> CharRange {
        let mut ranges = self.ranges.clone();
        ranges.sort_unstable();
        let mut merged: Vec<(u16, u16)> = Vec::with_capacity(ranges.len());
        for (first, last) in ranges {
            if let Some(prev) = merged.last_mut() {
                if first as u32 <= prev.1 as u32 + 1 {
                    prev.1 = prev.1.max(last);
                    continue;
                }
            }
            merged.push((first, last));
        }
        if !self.inverted {
            return CharRange { ranges: merged };
        }
        let mut complement = Vec::with_capacity(merged.len() + 1);
        let mut next = 0u32;
        for (first, last) in merged {
            if (first as u32) > next {
                complement.push((next as u16, first - 1));
            }
            next = last as u32 + 1;
        }
        if next <= 0xFFFF {
            complement.push((next as u16, 0xFFFF));
        }
        CharRange { ranges: complement }
    }
}

/// A pattern describes a set of strings over 16-bit code units.
///
/// Patterns are built up from literals, character ranges and the usual
/// regular-expression operators, then handed to a
/// [`DfaBuilder`](crate::DfaBuilder) to compile into a DFA. A pattern is
/// immutable; combinators consume their operand and patterns are cheap to
/// clone when reuse is needed.
///
/// Anywhere a pattern is expected, a `&str` converts to a case-dependent
/// literal and a [`CharRange`] to a single-character pattern.
///
/// # Example
///
/// ```
/// use dfalex::Pattern;
///
/// // an optional sign followed by one or more digits
/// let number = Pattern::maybe(Pattern::any_char_in("+-"))
///     .then(Pattern::repeat(Pattern::range(b'0' as u16, b'9' as u16)?));
/// assert!(!number.matches_empty());
/// # Ok::<(), dfalex::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Pattern {
    node: Node,
}

#[derive(Clone, Debug)]
enum Node {
    Empty,
    Literal { units: Vec<u16>, fold_case: bool },
    Ranges(CharRange),
    Concat(Box<Pattern>, Box<Pattern>),
    Union(Vec<Pattern>),
    Repeat { pat: Box<Pattern>, at_least_one: bool },
    Optional(Box<Pattern>),
}

impl Pattern {
    /// The pattern matching only the empty string.
    pub fn empty() -> Pattern {
        Pattern { node: Node::Empty }
    }

    /// A pattern matching exactly `s`, case-dependent.
    pub fn literal(s: &str) -> Pattern {
        Pattern {
            node: Node::Literal { units: s.encode_utf16().collect(), fold_case: false },
        }
    }

    /// A pattern matching `s` with each character accepted in upper or
    /// lower case.
    pub fn literal_ignoring_case(s: &str) -> Pattern {
        Pattern {
            node: Node::Literal { units: s.encode_utf16().collect(), fold_case: true },
        }
    }

    /// A pattern matching every single character `c` with
    /// `first <= c <= last`. Returns an error if `first > last`.
    pub fn range(first: u16, last: u16) -> Result<Pattern> {
        Ok(Pattern::from(CharRange::new(first, last)?))
    }

    /// A pattern matching any single character in `chars`.
    pub fn any_char_in(chars: &str) -> Pattern {
        Pattern::from(CharRange::any_of(chars))
    }

    /// A pattern matching any single character not in `chars`.
    pub fn not_any_char_in(chars: &str) -> Pattern {
        Pattern::from(CharRange::not_any_of(chars))
    }

    /// A pattern matching any one of the given alternatives.
    pub fn any_of<I, P>(alternatives: I) -> Pattern
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        let choices: Vec<Pattern> =
            alternatives.into_iter().map(Into::into).collect();
        Pattern { node: Node::Union(choices) }
    }

    /// A pattern matching any one of the given strings, case-independent.
    pub fn any_of_ignoring_case<I, S>(strings: I) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let choices: Vec<Pattern> = strings
            .into_iter()
            .map(|s| Pattern::literal_ignoring_case(s.as_ref()))
            .collect();
        Pattern { node: Node::Union(choices) }
    }

    /// One or more occurrences of `pat`.
    pub fn repeat(pat: impl Into<Pattern>) -> Pattern {
        Pattern {
            node: Node::Repeat { pat: Box::new(pat.into()), at_least_one: true },
        }
    }

    /// One or more occurrences of `s`, case-independent.
    pub fn repeat_ignoring_case(s: &str) -> Pattern {
        Pattern::repeat(Pattern::literal_ignoring_case(s))
    }

    /// `pat` or the empty string.
    pub fn maybe(pat: impl Into<Pattern>) -> Pattern {
        Pattern { node: Node::Optional(Box::new(pat.into())) }
    }

    /// `s` (case-independent) or the empty string.
    pub fn maybe_ignoring_case(s: &str) -> Pattern {
        Pattern::maybe(Pattern::literal_ignoring_case(s))
    }

    /// Zero or more occurrences of `pat`.
    pub fn maybe_repeat(pat: impl Into<Pattern>) -> Pattern {
        Pattern {
            node: Node::Repeat { pat: Box::new(pat.into()), at_least_one: false },
        }
    }

    /// Zero or more occurrences of `s`, case-independent.
    pub fn maybe_repeat_ignoring_case(s: &str) -> Pattern {
        Pattern::maybe_repeat(Pattern::literal_ignoring_case(s))
    }

    /// This pattern followed by `pat`.
    pub fn then(self, pat: impl Into<Pattern>) -> Pattern {
        Pattern { node: Node::Concat(Box::new(self), Box::new(pat.into())) }
    }

    /// This pattern followed by `s`, case-independent.
    pub fn then_ignoring_case(self, s: &str) -> Pattern {
        self.then(Pattern::literal_ignoring_case(s))
    }

    /// This pattern followed by one or more occurrences of `pat`.
    pub fn then_repeat(self, pat: impl Into<Pattern>) -> Pattern {
        self.then(Pattern::repeat(pat))
    }

    /// This pattern followed by one or more occurrences of `s`,
    /// case-independent.
    pub fn then_repeat_ignoring_case(self, s: &str) -> Pattern {
        self.then(Pattern::repeat_ignoring_case(s))
    }

    /// This pattern, maybe followed by a match of `pat`.
    pub fn then_maybe(self, pat: impl Into<Pattern>) -> Pattern {
        self.then(Pattern::maybe(pat))
    }

    /// This pattern, maybe followed by `s`, case-independent.
    pub fn then_maybe_ignoring_case(self, s: &str) -> Pattern {
        self.then(Pattern::maybe_ignoring_case(s))
    }

    /// This pattern followed by zero or more occurrences of `pat`.
    pub fn then_maybe_repeat(self, pat: impl Into<Pattern>) -> Pattern {
        self.then(Pattern::maybe_repeat(pat))
    }

    /// This pattern followed by zero or more occurrences of `s`,
    /// case-independent.
    pub fn then_maybe_repeat_ignoring_case(self, s: &str) -> Pattern {
        self.then(Pattern::maybe_repeat_ignoring_case(s))
    }

    /// True if this pattern matches the empty string.
    pub fn matches_empty(&self) -> bool {
        match self.node {
            Node::Empty => true,
            Node::Literal { ref units, .. } => units.is_empty(),
            Node::Ranges(_) => false,
            Node::Concat(ref a, ref b) => a.matches_empty() && b.matches_empty(),
            Node::Union(ref choices) => choices.iter().any(Pattern::matches_empty),
            Node::Repeat { ref pat, at_least_one } => {
                !at_least_one || pat.matches_empty()
            }
            Node::Optional(_) => true,
        }
    }

    /// Add this pattern to an NFA.
    ///
    /// New states are created such that matching this pattern from the
    /// returned entry state reaches `target`. No new outgoing transitions
    /// are added to `target` or to any other pre-existing state. The
    /// returned state may be `target` itself when the pattern is the
    /// empty string.
    pub fn add_to_nfa<M>(&self, nfa: &mut Nfa<M>, target: usize) -> usize {
        match self.node {
            Node::Empty => target,
            Node::Literal { ref units, fold_case } => {
                let mut target = target;
                for &c in units.iter().rev() {
                    let newst = nfa.add_state(None);
                    nfa.add_transition(newst, target, c, c);
                    if fold_case {
                        let (lower, upper) = case_folds(c);
                        if let Some(l) = lower {
                            nfa.add_transition(newst, target, l, l);
                        }
                        if let Some(u) = upper {
                            nfa.add_transition(newst, target, u, u);
                        }
                    }
                    target = newst;
                }
                target
            }
            Node::Ranges(ref ranges) => {
                let state = nfa.add_state(None);
                for &(first, last) in ranges.ranges() {
                    nfa.add_transition(state, target, first, last);
                }
                state
            }
            Node::Concat(ref a, ref b) => {
                let mid = b.add_to_nfa(nfa, target);
                a.add_to_nfa(nfa, mid)
            }
            Node::Union(ref choices) => {
                let start = nfa.add_state(None);
                for pat in choices {
                    let entry = pat.add_to_nfa(nfa, target);
                    nfa.add_epsilon(start, entry);
                }
                start
            }
            Node::Repeat { ref pat, at_least_one } => {
                let rep = nfa.add_state(None);
                nfa.add_epsilon(rep, target);
                let start = pat.add_to_nfa(nfa, rep);
                nfa.add_epsilon(rep, start);
                if at_least_one || pat.matches_empty() {
                    return start;
                }
                let skip = nfa.add_state(None);
                nfa.add_epsilon(skip, target);
                nfa.add_epsilon(skip, start);
                skip
            }
            Node::Optional(ref pat) => {
                let start = pat.add_to_nfa(nfa, target);
                if pat.matches_empty() {
                    return start;
                }
                let skip = nfa.add_state(None);
                nfa.add_epsilon(skip, target);
                nfa.add_epsilon(skip, start);
                skip
            }
        }
    }

    /// Append a canonical structural encoding of this pattern, used by
    /// the build-cache digest. Structurally equal patterns always produce
    /// equal bytes.
    pub(crate) fn digest_into(&self, dst: &mut Vec<u8>) {
        match self.node {
            Node::Empty => dst.push(0),
            Node::Literal { ref units, fold_case } => {
                dst.push(1);
                dst.push(fold_case as u8);
                push_u32(dst, units.len() as u32);
                for &c in units {
                    push_u16(dst, c);
                }
            }
            Node::Ranges(ref ranges) => {
                dst.push(2);
                push_u32(dst, ranges.ranges().len() as u32);
                for &(first, last) in ranges.ranges() {
                    push_u16(dst, first);
                    push_u16(dst, last);
                }
            }
            Node::Concat(ref a, ref b) => {
                dst.push(3);
                a.digest_into(dst);
                b.digest_into(dst);
            }
            Node::Union(ref choices) => {
                dst.push(4);
                push_u32(dst, choices.len() as u32);
                for pat in choices {
                    pat.digest_into(dst);
                }
            }
            Node::Repeat { ref pat, at_least_one } => {
                dst.push(5);
                dst.push(at_least_one as u8);
                pat.digest_into(dst);
            }
            Node::Optional(ref pat) => {
                dst.push(6);
                pat.digest_into(dst);
            }
        }
    }
}

/// Ready-made patterns for common lexical shapes.
impl Pattern {
    /// One or more decimal digits.
    pub fn digits() -> Pattern {
        Pattern::repeat(CharRange::of(b'0' as u16, b'9' as u16))
    }

    /// One or more hexadecimal digits.
    pub fn hex_digits() -> Pattern {
        let mut builder = CharRange::builder();
        builder
            .add_char(b'0' as u16)
            .add_chars("123456789abcdefABCDEF");
        Pattern::repeat(builder.build())
    }

    /// An optional sign followed by one or more decimal digits.
    pub fn integer() -> Pattern {
        Pattern::maybe(Pattern::any_char_in("+-")).then(Pattern::digits())
    }

    /// An [`integer`](Pattern::integer), optionally followed by a decimal
    /// point and more digits.
    pub fn simple_decimal() -> Pattern {
        Pattern::integer().then_maybe(Pattern::literal(".").then(Pattern::digits()))
    }

    /// A decimal number that includes a decimal point and/or scientific
    /// exponent and does *not* match [`integer`](Pattern::integer). It
    /// can start with a decimal point.
    pub fn float_decimal() -> Pattern {
        let exponent = || Pattern::literal_ignoring_case("E").then(Pattern::integer());
        Pattern::any_of(vec![
            Pattern::integer()
                .then(".")
                .then_maybe(Pattern::digits())
                .then_maybe(exponent()),
            Pattern::literal(".").then(Pattern::digits()).then_maybe(exponent()),
            Pattern::integer().then(exponent()),
        ])
    }

    /// A [`float_decimal`](Pattern::float_decimal) or an
    /// [`integer`](Pattern::integer).
    pub fn decimal() -> Pattern {
        Pattern::any_of(vec![Pattern::float_decimal(), Pattern::integer()])
    }

    /// A C-style block comment.
    pub fn block_comment() -> Pattern {
        Pattern::literal("/*")
            .then_maybe_repeat(
                Pattern::maybe_repeat("*").then(CharRange::not_any_of("*")),
            )
            .then_repeat("*")
            .then("/")
    }

    /// A C++-style line comment, not including the newline.
    pub fn line_comment() -> Pattern {
        Pattern::literal("//").then_maybe_repeat(CharRange::not_any_of("\n"))
    }

    /// A double-quoted string with backslash escapes and no newlines.
    pub fn dq_string() -> Pattern {
        Pattern::literal("\"")
            .then_maybe_repeat(Pattern::any_of(vec![
                Pattern::from(CharRange::not_any_of("\"\\\n\r")),
                Pattern::literal("\\").then(CharRange::not_any_of("\r\n")),
            ]))
            .then("\"")
    }

    /// A single-quoted string with backslash escapes and no newlines.
    pub fn sq_string() -> Pattern {
        Pattern::literal("'")
            .then_maybe_repeat(Pattern::any_of(vec![
                Pattern::from(CharRange::not_any_of("'\\\n\r")),
                Pattern::literal("\\").then(CharRange::not_any_of("\r\n")),
            ]))
            .then("'")
    }

    /// A single- or double-quoted string.
    pub fn string_literal() -> Pattern {
        Pattern::any_of(vec![Pattern::sq_string(), Pattern::dq_string()])
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Pattern {
        Pattern::literal(s)
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Pattern {
        Pattern::literal(&s)
    }
}

impl From<CharRange> for Pattern {
    fn from(ranges: CharRange) -> Pattern {
        Pattern { node: Node::Ranges(ranges) }
    }
}

impl From<&Pattern> for Pattern {
    fn from(pat: &Pattern) -> Pattern {
        pat.clone()
    }
}

/// The distinct single-unit lower and upper case folds of `c`, if any.
///
/// Folds that expand to multiple characters or leave the 16-bit domain
/// are ignored, as are unpaired surrogate units.
fn case_folds(c: u16) -> (Option<u16>, Option<u16>) {
    let ch = match std::char::from_u32(c as u32) {
        Some(ch) => ch,
        None => return (None, None),
    };
    let lower = single_unit(ch.to_lowercase()).filter(|&l| l != c);
    let upper = single_unit(ch.to_uppercase()).filter(|&u| u != c);
    (lower, upper)
}

fn single_unit(mut chars: impl Iterator<Item = char>) -> Option<u16> {
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let v = c as u32;
    if v <= 0xFFFF {
        Some(v as u16)
    } else {
        None
    }
}
