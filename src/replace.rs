use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::accepts::Accept;
use crate::builder::{AmbiguityResolver, DfaBuilder};
use crate::cache::BuilderCache;
use crate::dfa::{Dfa, DfaState};
use crate::error::{Error, Result};
use crate::matcher::StringMatcher;
use crate::pattern::Pattern;

/// A copy-on-write destination for string replacements.
///
/// The buffer starts out tracking a shared prefix of the source by
/// length alone; it allocates an owned buffer only when a character is
/// appended that differs from the source at the current position. A
/// replacement pass in which every appended character happens to equal
/// the source therefore performs no buffer allocation at all.
pub struct ReplaceBuffer<'s> {
    src: &'s [u16],
    buf: Option<Vec<u16>>,
    /// When `buf` is `None`, the length of the source prefix written so
    /// far; otherwise unused.
    len: usize,
}

impl<'s> ReplaceBuffer<'s> {
    pub(crate) fn new(src: &'s [u16]) -> ReplaceBuffer<'s> {
        ReplaceBuffer { src, buf: None, len: 0 }
    }

    /// Append one code unit.
    pub fn push_unit(&mut self, c: u16) {
        if self.buf.is_none() {
            if self.len < self.src.len() && self.src[self.len] == c {
                self.len += 1;
                return;
            }
            self.allocate(1);
        }
        if let Some(buf) = &mut self.buf {
            buf.push(c);
        }
    }

    /// Append a slice of code units.
    pub fn push_units(&mut self, units: &[u16]) {
        if self.buf.is_none() {
            let mut i = 0;
            while i < units.len()
                && self.len < self.src.len()
                && self.src[self.len] == units[i]
            {
                i += 1;
                self.len += 1;
            }
            if i == units.len() {
                return;
            }
            self.allocate(units.len() - i);
            if let Some(buf) = &mut self.buf {
                buf.extend_from_slice(&units[i..]);
            }
            return;
        }
        if let Some(buf) = &mut self.buf {
            buf.extend_from_slice(units);
        }
    }

    /// Append a `&str`, encoded as UTF-16.
    pub fn push_str(&mut self, s: &str) {
        for c in s.encode_utf16() {
            self.push_unit(c);
        }
    }

    /// Append `src[start..end]` of the source this buffer was created
    /// over. When the buffer is still tracking the shared prefix and
    /// `start` lines up with it, this just extends the prefix.
    pub fn append_src(&mut self, start: usize, end: usize) {
        let end = end.min(self.src.len());
        if start >= end {
            return;
        }
        if self.buf.is_none() && start == self.len {
            self.len = end;
            return;
        }
        self.push_units(&self.src[start..end]);
    }

    /// The number of code units written so far.
    pub fn len(&self) -> usize {
        match &self.buf {
            Some(buf) => buf.len(),
            None => self.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_units(self) -> Cow<'s, [u16]> {
        match self.buf {
            Some(buf) => Cow::Owned(buf),
            None => Cow::Borrowed(&self.src[..self.len]),
        }
    }

    fn allocate(&mut self, additional: usize) {
        let capacity = (self.len + additional).max(self.src.len() + 16);
        let mut buf = Vec::with_capacity(capacity);
        buf.extend_from_slice(&self.src[..self.len]);
        self.buf = Some(buf);
    }
}

/// Finds pattern occurrences in strings and rewrites around them.
///
/// A searcher owns a compiled single-language DFA whose accept values
/// identify which pattern matched. Matches are found strictly left to
/// right; at one position the longest match wins.
pub struct StringSearcher<M> {
    dfa: Dfa<M>,
}

impl<M: Accept> StringSearcher<M> {
    /// Wrap a compiled DFA. The DFA's first start state drives the
    /// search.
    pub fn new(dfa: Dfa<M>) -> StringSearcher<M> {
        StringSearcher { dfa }
    }

    /// The start state used for searching.
    pub fn state(&self) -> DfaState<'_, M> {
        self.dfa.start(0)
    }

    pub fn dfa(&self) -> &Dfa<M> {
        &self.dfa
    }

    /// Rewrite `src`, invoking `replace` for every match.
    ///
    /// The callback receives the destination buffer, the matched accept
    /// value, the source, and the match bounds `[start, end)`. It may
    /// append anything to the destination and returns the position at
    /// which scanning resumes; returning `end` continues right after the
    /// match. The driver clamps the resume position to
    /// `max(returned, start + 1)` so every iteration makes progress.
    /// Source units the callback skips over without appending are not
    /// copied to the output.
    pub fn find_and_replace<F>(&self, src: &str, replace: F) -> String
    where
        F: FnMut(&mut ReplaceBuffer<'_>, &M, &[u16], usize, usize) -> usize,
    {
        let units: Vec<u16> = src.encode_utf16().collect();
        match self.find_and_replace_units(&units, replace) {
            // borrowed output of full length is the unchanged input
            Cow::Borrowed(out) if out.len() == units.len() => src.to_string(),
            out => String::from_utf16_lossy(&out),
        }
    }

    /// Rewrite a string of code units, invoking `replace` for every
    /// match. Returns a borrowed copy of the input when no match fires.
    pub fn find_and_replace_units<'a, F>(
        &self,
        src: &'a [u16],
        mut replace: F,
    ) -> Cow<'a, [u16]>
    where
        F: FnMut(&mut ReplaceBuffer<'_>, &M, &[u16], usize, usize) -> usize,
    {
        let mut dest = ReplaceBuffer::new(src);
        let mut matcher = StringMatcher::new(src);
        let mut pos = 0;
        while let Some(m) = matcher.find_next(self.dfa.start(0)) {
            let (start, end) =
                (matcher.current_match_start(), matcher.current_match_end());
            dest.append_src(pos, start);
            let returned = replace(&mut dest, m, src, start, end);
            let resume = returned.max(start + 1).min(src.len());
            pos = resume;
            matcher.reposition(resume);
            if resume >= src.len() {
                break;
            }
        }
        dest.append_src(pos, src.len());
        dest.into_units()
    }
}

/// A replacement callback: append whatever should stand in for the match
/// to `dest` and return the position at which scanning resumes.
///
/// Implemented by any
/// `Fn(&mut ReplaceBuffer, &[u16], usize, usize) -> usize` closure.
pub trait StringReplacement: Send + Sync {
    fn apply(
        &self,
        dest: &mut ReplaceBuffer<'_>,
        src: &[u16],
        start: usize,
        end: usize,
    ) -> usize;
}

impl<F> StringReplacement for F
where
    F: Fn(&mut ReplaceBuffer<'_>, &[u16], usize, usize) -> usize + Send + Sync,
{
    fn apply(
        &self,
        dest: &mut ReplaceBuffer<'_>,
        src: &[u16],
        start: usize,
        end: usize,
    ) -> usize {
        self(dest, src, start, end)
    }
}

/// Builds thread-safe search-and-replace functions.
///
/// Each added pattern is paired with a [`StringReplacement`]; building
/// produces a [`SearchAndReplace`] that rewrites whole strings. When
/// matches for several patterns start at the same position, the longest
/// wins, and a tie goes to the pattern added first.
///
/// # Example
///
/// ```
/// use dfalex::{Pattern, SearchAndReplaceBuilder};
///
/// let mut builder = SearchAndReplaceBuilder::new();
/// builder.add_replacement(
///     Pattern::repeat(Pattern::range(b'a' as u16, b'z' as u16)?),
///     |dest: &mut dfalex::ReplaceBuffer, _src: &[u16], _s: usize, e: usize| {
///         dest.push_str("X");
///         e
///     },
/// );
/// let replacer = builder.build()?;
/// assert_eq!(" X X ", replacer.apply(" foo bar "));
/// # Ok::<(), dfalex::Error>(())
/// ```
#[derive(Default)]
pub struct SearchAndReplaceBuilder {
    builder: DfaBuilder<u32>,
    replacements: Vec<Arc<dyn StringReplacement>>,
}

impl SearchAndReplaceBuilder {
    pub fn new() -> SearchAndReplaceBuilder {
        SearchAndReplaceBuilder {
            builder: DfaBuilder::new(),
            replacements: vec![],
        }
    }

    /// Forget all the patterns added so far.
    pub fn clear(&mut self) {
        self.builder.clear();
        self.replacements.clear();
    }

    /// Add a pattern and the replacement invoked for its matches.
    pub fn add_replacement(
        &mut self,
        pattern: impl Into<Pattern>,
        replacement: impl StringReplacement + 'static,
    ) -> &mut SearchAndReplaceBuilder {
        let accept = self.replacements.len() as u32;
        self.replacements.push(Arc::new(replacement));
        self.builder.add_pattern(pattern, accept);
        self
    }

    /// Build the search-and-replace function.
    pub fn build(&self) -> Result<SearchAndReplace> {
        self.build_with(|language, resolver| {
            self.builder.build(language, Some(resolver))
        })
    }

    /// Build, consulting (and populating) a [`BuilderCache`].
    pub fn build_cached(&self, cache: &dyn BuilderCache) -> Result<SearchAndReplace> {
        self.build_with(|language, resolver| {
            self.builder.build_cached(language, Some(resolver), cache)
        })
    }

    fn build_with<F>(&self, build: F) -> Result<SearchAndReplace>
    where
        F: FnOnce(&BTreeSet<u32>, &dyn AmbiguityResolver<u32>) -> Result<Dfa<u32>>,
    {
        let language: BTreeSet<u32> = (0..self.replacements.len() as u32).collect();
        let dfa = build(&language, &resolve_first_added)?;
        Ok(SearchAndReplace {
            searcher: StringSearcher::new(dfa),
            replacements: self.replacements.clone(),
        })
    }
}

/// Ties between simultaneously matching patterns go to the one added
/// first, i.e. the smallest replacement index.
fn resolve_first_added(candidates: &BTreeSet<u32>) -> Result<u32> {
    match candidates.iter().next() {
        Some(&accept) => Ok(accept),
        None => Err(Error::ambiguous(vec![])),
    }
}

/// A compiled, thread-safe search-and-replace function.
pub struct SearchAndReplace {
    searcher: StringSearcher<u32>,
    replacements: Vec<Arc<dyn StringReplacement>>,
}

impl SearchAndReplace {
    /// Find all pattern occurrences in `src` and replace them.
    pub fn apply(&self, src: &str) -> String {
        self.searcher.find_and_replace(src, |dest, &accept, src, start, end| {
            self.replacements[accept as usize].apply(dest, src, start, end)
        })
    }

    /// As [`apply`](SearchAndReplace::apply), over raw code units.
    pub fn apply_units<'a>(&self, src: &'a [u16]) -> Cow<'a, [u16]> {
        self.searcher.find_and_replace_units(
            src,
            |dest, &accept, src, start, end| {
                self.replacements[accept as usize].apply(dest, src, start, end)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn buffer_stays_borrowed_until_divergence() {
        let src = units("hello world");
        let mut dest = ReplaceBuffer::new(&src);
        dest.append_src(0, 5);
        dest.push_str(" worl");
        dest.push_unit(b'd' as u16);
        match dest.into_units() {
            Cow::Borrowed(out) => assert_eq!(&src[..], out),
            Cow::Owned(_) => panic!("identical output should stay borrowed"),
        }
    }

    #[test]
    fn buffer_allocates_on_divergence() {
        let src = units("abc");
        let mut dest = ReplaceBuffer::new(&src);
        dest.append_src(0, 1);
        dest.push_str("X");
        dest.append_src(2, 3);
        match dest.into_units() {
            Cow::Owned(out) => assert_eq!(units("aXc"), out),
            Cow::Borrowed(_) => panic!("divergent output must be owned"),
        }
    }

    #[test]
    fn replace_words() {
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            Pattern::repeat(Pattern::range(b'a' as u16, b'z' as u16).unwrap()),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("X");
                end
            },
        );
        let replacer = builder.build().unwrap();
        assert_eq!(" X X ", replacer.apply(" foo bar "));
        assert_eq!("X", replacer.apply("foo"));
    }

    #[test]
    fn passthrough_is_borrowed() {
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            Pattern::literal("needle"),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("thread");
                end
            },
        );
        let replacer = builder.build().unwrap();
        let src = units("haystack without the sewing implement");
        match replacer.apply_units(&src) {
            Cow::Borrowed(out) => assert_eq!(&src[..], out),
            Cow::Owned(_) => panic!("pass-through must not allocate"),
        }
        let text = "haystack without the sewing implement";
        assert_eq!(text, replacer.apply(text));
    }

    #[test]
    fn first_added_wins_ties() {
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            Pattern::literal("x"),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("first");
                end
            },
        );
        builder.add_replacement(
            Pattern::literal("x"),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("second");
                end
            },
        );
        let replacer = builder.build().unwrap();
        assert_eq!("first", replacer.apply("x"));
    }

    #[test]
    fn reposition_splits_word_pairs() {
        // replace "word word" pairs with "word, ", resuming at the
        // second word so it can pair with the one after it
        let alnum = {
            let mut b = crate::pattern::CharRange::builder();
            b.add_range(b'a' as u16, b'z' as u16).unwrap();
            b.add_range(b'0' as u16, b'9' as u16).unwrap();
            b.build()
        };
        let pair = Pattern::repeat(alnum.clone())
            .then_repeat(" ")
            .then(Pattern::repeat(alnum));
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            pair,
            |dest: &mut ReplaceBuffer<'_>, src: &[u16], start: usize, _: usize| {
                let mut e = start;
                while src[e] != b' ' as u16 {
                    e += 1;
                }
                dest.append_src(start, e);
                dest.push_str(", ");
                while src[e] == b' ' as u16 {
                    e += 1;
                }
                e
            },
        );
        let replacer = builder.build().unwrap();
        assert_eq!(
            " one, two, three, four, five ",
            replacer.apply(" one two  three   four five "),
        );
    }

    #[test]
    fn deleting_everything_yields_empty_output() {
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            Pattern::literal("ab"),
            |_: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| end,
        );
        let replacer = builder.build().unwrap();
        assert_eq!("", replacer.apply("ab"));
        assert_eq!("-", replacer.apply("ab-ab"));
    }

    #[test]
    fn longest_match_drives_replacement() {
        let mut builder = SearchAndReplaceBuilder::new();
        builder.add_replacement(
            Pattern::literal("ab"),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("<short>");
                end
            },
        );
        builder.add_replacement(
            Pattern::literal("abc"),
            |dest: &mut ReplaceBuffer<'_>, _: &[u16], _: usize, end: usize| {
                dest.push_str("<long>");
                end
            },
        );
        let replacer = builder.build().unwrap();
        assert_eq!("<long>!", replacer.apply("abc!"));
        assert_eq!("<short>x", replacer.apply("abx"));
    }
}
