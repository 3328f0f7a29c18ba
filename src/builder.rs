use std::collections::BTreeSet;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::accepts::{push_u32, Accept, AcceptBytes};
use crate::cache::{base32, BuilderCache};
use crate::determinize::Determinizer;
use crate::dfa::Dfa;
use crate::error::Result;
use crate::minimize::Minimizer;
use crate::nfa::Nfa;
use crate::pattern::Pattern;
use crate::raw::RawDfa;

/// Collapses a set of simultaneously matching accept values into one.
///
/// When patterns for multiple accept values match the same string, the
/// DFA state reached by that string has several candidate accepts; a
/// resolver picks the winner, or returns an error to make the build fail.
///
/// Any `Fn(&BTreeSet<M>) -> Result<M>` closure (or fn) is a resolver.
pub trait AmbiguityResolver<M>: Sync {
    fn resolve(&self, candidates: &BTreeSet<M>) -> Result<M>;

    /// A stable identity mixed into build-cache digests, so that builds
    /// differing only in their resolver get different cache keys. The
    /// default used for closures is the closure's type name, which is
    /// deterministic for a given compiled program.
    fn cache_identity(&self) -> String;
}

impl<M, F> AmbiguityResolver<M> for F
where
    F: Fn(&BTreeSet<M>) -> Result<M> + Sync,
{
    fn resolve(&self, candidates: &BTreeSet<M>) -> Result<M> {
        self(candidates)
    }

    fn cache_identity(&self) -> String {
        std::any::type_name::<F>().to_string()
    }
}

/// Builds DFAs that find patterns in strings.
///
/// Add patterns with [`add_pattern`](DfaBuilder::add_pattern), pairing
/// each with the accept value to produce when it matches; several
/// patterns may share an accept value. Then
/// [`build`](DfaBuilder::build) a DFA for a *language* (a subset of the
/// accept values), or [`build_many`](DfaBuilder::build_many) DFAs for
/// several languages at once. Languages built together are minimized
/// jointly and share every state they equivalently can.
///
/// Building is a relatively expensive operation; typical users build
/// once per pattern set and keep the resulting [`Dfa`], optionally
/// through a [`BuilderCache`] that persists built DFAs across runs.
///
/// # Example
///
/// ```
/// use std::collections::BTreeSet;
/// use dfalex::{DfaBuilder, Pattern, StringMatcher};
///
/// let mut builder = DfaBuilder::new();
/// builder.add_pattern(Pattern::digits(), "NUM");
/// builder.add_pattern(Pattern::literal("foo"), "ID");
/// let language: BTreeSet<&str> = ["NUM", "ID"].iter().copied().collect();
/// let dfa = builder.build(&language, None)?;
///
/// let src: Vec<u16> = "foo123".encode_utf16().collect();
/// let mut matcher = StringMatcher::new(&src);
/// assert_eq!(Some(&"ID"), matcher.find_next(dfa.start(0)));
/// assert_eq!(Some(&"NUM"), matcher.find_next(dfa.start(0)));
/// # Ok::<(), dfalex::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct DfaBuilder<M> {
    /// Pattern groups in accept-value insertion order. The order is
    /// load-bearing: it makes cache digests deterministic.
    groups: Vec<(M, Vec<Pattern>)>,
    indices: FxHashMap<M, usize>,
}

impl<M: Accept> DfaBuilder<M> {
    pub fn new() -> DfaBuilder<M> {
        DfaBuilder { groups: vec![], indices: FxHashMap::default() }
    }

    /// Register `pattern` to produce `accept` when it matches.
    pub fn add_pattern(&mut self, pattern: impl Into<Pattern>, accept: M) {
        let index = match self.indices.get(&accept) {
            Some(&index) => index,
            None => {
                let index = self.groups.len();
                self.groups.push((accept.clone(), vec![]));
                self.indices.insert(accept, index);
                index
            }
        };
        self.groups[index].1.push(pattern.into());
    }

    /// Forget every pattern added so far.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.indices.clear();
    }

    /// Build a DFA for a single language (a set of accept values
    /// selecting which patterns participate).
    ///
    /// With no `resolver`, a string matched by patterns with two
    /// different accept values makes the build fail with an ambiguity
    /// error.
    pub fn build(
        &self,
        language: &BTreeSet<M>,
        resolver: Option<&dyn AmbiguityResolver<M>>,
    ) -> Result<Dfa<M>> {
        self.build_many(std::slice::from_ref(language), resolver)
    }

    /// Build DFAs for several languages simultaneously.
    ///
    /// The result carries one start state per language, in order, and is
    /// globally minimized: states equivalent across languages exist only
    /// once.
    pub fn build_many(
        &self,
        languages: &[BTreeSet<M>],
        resolver: Option<&dyn AmbiguityResolver<M>>,
    ) -> Result<Dfa<M>> {
        let raw = self.build_raw(languages, resolver)?;
        Ok(Dfa::from_raw(&raw))
    }

    fn build_raw(
        &self,
        languages: &[BTreeSet<M>],
        resolver: Option<&dyn AmbiguityResolver<M>>,
    ) -> Result<RawDfa<M>> {
        let mut nfa = Nfa::new();
        let starts: Vec<usize> =
            languages.iter().map(|_| nfa.add_state(None)).collect();

        for (accept, patterns) in &self.groups {
            if patterns.is_empty() {
                continue;
            }
            // entry state for this group's patterns, created on first use
            let mut match_state = None;
            for (language_index, language) in languages.iter().enumerate() {
                if !language.contains(accept) {
                    continue;
                }
                let entry = match match_state {
                    Some(entry) => entry,
                    None => {
                        let accept_state = nfa.add_state(Some(accept.clone()));
                        let entry = if patterns.len() > 1 {
                            let union = nfa.add_state(None);
                            for pattern in patterns {
                                let e = pattern.add_to_nfa(&mut nfa, accept_state);
                                nfa.add_epsilon(union, e);
                            }
                            union
                        } else {
                            patterns[0].add_to_nfa(&mut nfa, accept_state)
                        };
                        match_state = Some(entry);
                        entry
                    }
                };
                nfa.add_epsilon(starts[language_index], entry);
            }
        }
        debug!(
            "building {} languages: {} NFA states",
            languages.len(),
            nfa.len(),
        );

        let raw = Determinizer::new(&nfa, resolver).build(&starts)?;
        debug!("determinized: {} raw DFA states", raw.states.len());
        let minimal = Minimizer::new(&raw).run();
        debug!("minimized: {} DFA states", minimal.states.len());
        Ok(minimal)
    }
}

impl<M: AcceptBytes> DfaBuilder<M> {
    /// Like [`build`](DfaBuilder::build), but consulting `cache` first.
    ///
    /// Cache failures (including a corrupt cached entry) are logged as
    /// warnings and degrade to an uncached build; they never fail the
    /// call.
    pub fn build_cached(
        &self,
        language: &BTreeSet<M>,
        resolver: Option<&dyn AmbiguityResolver<M>>,
        cache: &dyn BuilderCache,
    ) -> Result<Dfa<M>> {
        self.build_many_cached(std::slice::from_ref(language), resolver, cache)
    }

    /// Like [`build_many`](DfaBuilder::build_many), but consulting
    /// `cache` first.
    pub fn build_many_cached(
        &self,
        languages: &[BTreeSet<M>],
        resolver: Option<&dyn AmbiguityResolver<M>>,
        cache: &dyn BuilderCache,
    ) -> Result<Dfa<M>> {
        let key = self.cache_key(languages, resolver);
        match cache.get_cached_item(&key) {
            Ok(Some(bytes)) => match Dfa::from_bytes(&bytes) {
                Ok(dfa) => {
                    debug!("build cache hit for {}", key);
                    return Ok(dfa);
                }
                Err(err) => {
                    warn!("discarding corrupt cached DFA under {}: {}", key, err)
                }
            },
            Ok(None) => {}
            Err(err) => warn!("build cache read failed for {}: {}", key, err),
        }
        let dfa = self.build_many(languages, resolver)?;
        if let Err(err) = cache.maybe_cache_item(&key, &dfa.to_bytes()) {
            warn!("build cache write failed for {}: {}", key, err);
        }
        Ok(dfa)
    }

    /// The cache digest for a build of `languages` from the patterns
    /// added so far: a base-32 SHA-256 over the language count, then each
    /// participating pattern group in insertion order (its size, its
    /// language-membership bitmap, its patterns, its accept value), a
    /// terminator, and the resolver identity.
    pub(crate) fn cache_key(
        &self,
        languages: &[BTreeSet<M>],
        resolver: Option<&dyn AmbiguityResolver<M>>,
    ) -> String {
        let mut buf = vec![];
        push_u32(&mut buf, languages.len() as u32);
        for (accept, patterns) in &self.groups {
            if patterns.is_empty() {
                continue;
            }
            if !languages.iter().any(|l| l.contains(accept)) {
                continue;
            }
            push_u32(&mut buf, patterns.len() as u32);
            if languages.len() > 1 {
                // membership bitmap, 32 languages per word
                let mut bits: u32 = 0;
                for (i, language) in languages.iter().enumerate() {
                    if i > 0 && (i & 31) == 0 {
                        push_u32(&mut buf, bits);
                        bits = 0;
                    }
                    if language.contains(accept) {
                        bits |= 1 << (i & 31);
                    }
                }
                push_u32(&mut buf, bits);
            }
            for pattern in patterns {
                pattern.digest_into(&mut buf);
            }
            accept.write_bytes(&mut buf);
        }
        // zero-size group terminates the pattern list
        push_u32(&mut buf, 0);
        match resolver {
            Some(resolver) => {
                buf.extend_from_slice(resolver.cache_identity().as_bytes())
            }
            None => buf.extend_from_slice(b"none"),
        }

        let mut sha = Sha256::new();
        sha.update(&buf);
        let digest = sha.finalize();
        base32(digest.as_slice())
    }
}

impl<M: Accept> Default for DfaBuilder<M> {
    fn default() -> DfaBuilder<M> {
        DfaBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn language<M: Accept>(values: &[M]) -> BTreeSet<M> {
        values.iter().cloned().collect()
    }

    #[test]
    fn digest_is_deterministic() {
        let mut b1 = DfaBuilder::new();
        b1.add_pattern(Pattern::literal("a"), 1u32);
        b1.add_pattern(Pattern::literal("ab"), 2u32);
        let mut b2 = DfaBuilder::new();
        b2.add_pattern(Pattern::literal("a"), 1u32);
        b2.add_pattern(Pattern::literal("ab"), 2u32);
        let langs = [language(&[1, 2])];
        assert_eq!(b1.cache_key(&langs, None), b2.cache_key(&langs, None));
    }

    #[test]
    fn digest_depends_on_insertion_order() {
        let mut b1 = DfaBuilder::new();
        b1.add_pattern(Pattern::literal("a"), 1u32);
        b1.add_pattern(Pattern::literal("b"), 2u32);
        let mut b2 = DfaBuilder::new();
        b2.add_pattern(Pattern::literal("b"), 2u32);
        b2.add_pattern(Pattern::literal("a"), 1u32);
        let langs = [language(&[1, 2])];
        assert_ne!(b1.cache_key(&langs, None), b2.cache_key(&langs, None));
    }

    #[test]
    fn digest_ignores_excluded_groups() {
        let mut b1 = DfaBuilder::new();
        b1.add_pattern(Pattern::literal("a"), 1u32);
        let mut b2 = DfaBuilder::new();
        b2.add_pattern(Pattern::literal("a"), 1u32);
        b2.add_pattern(Pattern::literal("zzz"), 9u32);
        let langs = [language(&[1])];
        assert_eq!(b1.cache_key(&langs, None), b2.cache_key(&langs, None));
    }

    #[test]
    fn digest_separates_resolvers() {
        let mut builder = DfaBuilder::new();
        builder.add_pattern(Pattern::literal("a"), 1u32);
        let langs = [language(&[1])];
        fn smallest(candidates: &BTreeSet<u32>) -> Result<u32> {
            match candidates.iter().next() {
                Some(&m) => Ok(m),
                None => Err(crate::error::Error::ambiguous(vec![])),
            }
        }
        let with = builder.cache_key(&langs, Some(&smallest));
        let without = builder.cache_key(&langs, None);
        assert_ne!(with, without);
    }

    #[test]
    fn empty_language_list_builds_empty_dfa() {
        let mut builder = DfaBuilder::new();
        builder.add_pattern(Pattern::literal("a"), 1u32);
        let dfa = builder.build_many(&[], None).unwrap();
        assert_eq!(0, dfa.start_count());
    }

    #[test]
    fn shared_accept_values_union() {
        let mut builder = DfaBuilder::new();
        builder.add_pattern(Pattern::literal("cat"), 1u32);
        builder.add_pattern(Pattern::literal("dog"), 1u32);
        let dfa = builder.build(&language(&[1]), None).unwrap();
        let src: Vec<u16> = "dog".encode_utf16().collect();
        let mut matcher = crate::matcher::StringMatcher::new(&src);
        assert_eq!(Some(&1), matcher.find_next(dfa.start(0)));
    }
}
