/*!
A library for compiling sets of patterns into deterministic finite
automata (DFAs) and scanning strings with them.

Patterns are built with combinators rather than parsed from a regex
syntax, and operate on 16-bit code units (the units of a UTF-16 encoded
string). A [`DfaBuilder`] turns any number of patterns, each paired with
an *accept value*, into a single DFA that matches them all
simultaneously; the accept value of the matched pattern is what a scan
reports back. DFAs for several pattern subsets ("languages") can be
built in one shot and are minimized jointly so they share states.

Compilation runs pattern → NFA → subset-construction DFA → minimized
DFA → packed states, where each packed state stores its transitions as
an array-packed binary search tree over character boundaries. The
compiled [`Dfa`] is immutable and freely shareable across threads, and
can be serialized to a portable byte stream (see [`Dfa::to_bytes`]),
optionally through a [`BuilderCache`] keyed by a digest of the build
request.

On top of the DFA sit a longest-match scanner ([`StringMatcher`]) and a
search-and-replace driver ([`SearchAndReplaceBuilder`]) whose
destination buffer copies nothing until a replacement actually changes
the output.

# Example: a tiny lexer

```
use std::collections::BTreeSet;
use dfalex::{DfaBuilder, Pattern, StringMatcher};

let mut builder = DfaBuilder::new();
builder.add_pattern(Pattern::digits(), "NUM");
builder.add_pattern(Pattern::repeat(Pattern::range(b'a' as u16, b'z' as u16)?), "WORD");

let language: BTreeSet<&str> = ["NUM", "WORD"].iter().copied().collect();
let dfa = builder.build(&language, None)?;

let src: Vec<u16> = "abc123".encode_utf16().collect();
let mut matcher = StringMatcher::new(&src);
assert_eq!(Some(&"WORD"), matcher.find_next(dfa.start(0)));
assert_eq!(Some(&"NUM"), matcher.find_next(dfa.start(0)));
assert_eq!(None, matcher.find_next(dfa.start(0)));
# Ok::<(), dfalex::Error>(())
```
*/

// #![deny(missing_docs)]

pub use crate::accepts::{Accept, AcceptBytes};
pub use crate::builder::{AmbiguityResolver, DfaBuilder};
pub use crate::cache::{BuilderCache, CacheError, MemoryCache};
pub use crate::dfa::{Dfa, DfaState};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::matcher::StringMatcher;
pub use crate::nfa::{Nfa, Transition};
pub use crate::pattern::{CharRange, CharRangeBuilder, Pattern};
pub use crate::replace::{
    ReplaceBuffer, SearchAndReplace, SearchAndReplaceBuilder,
    StringReplacement, StringSearcher,
};

mod accepts;
mod builder;
mod cache;
mod determinize;
mod dfa;
mod error;
mod matcher;
mod minimize;
mod nfa;
mod pattern;
mod raw;
mod replace;
mod sparse_set;
