//! String interning for the runtime.
//!
//! All strings that exist at runtime (literals, global names, concatenation
//! results) live in a single `StringTable` owned by the VM. Two strings with
//! equal content always resolve to the same symbol, which is what makes
//! `Value::String` equality a plain symbol comparison.

use string_interner::backend::StringBackend;
use string_interner::symbol::SymbolU32;

use crate::runtime::DefaultBuildHasher;

/// Handle to an interned string. Only meaningful together with the
/// `StringTable` that produced it.
pub type StringSymbol = SymbolU32;

type Interner = string_interner::StringInterner<StringBackend<StringSymbol>, DefaultBuildHasher>;

pub struct StringTable {
    interner: Interner,
}

impl Default for StringTable {
    fn default() -> Self { Self::new() }
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            interner: Interner::with_hasher(DefaultBuildHasher::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    pub fn get(&self, string: &str) -> Option<StringSymbol> {
        self.interner.get(string)
    }

    pub fn intern(&mut self, string: &str) -> StringSymbol {
        self.interner.get_or_intern(string)
    }

    pub fn resolve(&self, symbol: StringSymbol) -> &str {
        self.interner.resolve(symbol).expect("invalid string symbol")
    }
}

impl<'s> Extend<&'s str> for StringTable {
    fn extend<T>(&mut self, iter: T) where T: IntoIterator<Item = &'s str> {
        for string in iter.into_iter() {
            self.intern(string);
        }
    }
}
