//! String interning for identifiers.
//!
//! A [`Symbol`] is a 4-byte handle to a string held in a process-wide
//! table. Two symbols compare equal iff the strings they were interned
//! from compare equal, and that comparison is an integer comparison
//! rather than a string comparison — the only comparison that happens on
//! every environment lookup and every `hasField` check in `refine-core`.

use crate::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

// The `u32` handle is only meaningful within the process that interned
// it, so a `Symbol` is serialized as the string it stands for and
// re-interned on the way back in.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Symbol::intern(&s))
    }
}

impl Symbol {
    /// Intern `s`, returning the symbol for it. Interning the same string
    /// twice returns the same symbol.
    pub fn intern(s: &str) -> Self {
        table().intern(s)
    }

    /// The interned string this symbol refers to.
    pub fn as_str(&self) -> &'static str {
        table().get(*self)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::intern(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::intern(&s)
    }
}

/// The process-wide string table. Strings are leaked to get a `'static`
/// lifetime: interned identifiers are never freed for the life of the
/// process, which is fine — the set of distinct names in a program is
/// bounded by the program's own size.
struct StringTable {
    index: FxHashMap<&'static str, Symbol>,
    strings: Vec<&'static str>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            strings: Vec::new(),
        }
    }

    fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.index.get(s) {
            return sym;
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(leaked);
        self.index.insert(leaked, sym);
        sym
    }

    fn get(&self, sym: Symbol) -> &'static str {
        self.strings[sym.0 as usize]
    }
}

fn table() -> std::sync::MutexGuard<'static, StringTable> {
    static TABLE: OnceLock<Mutex<StringTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| Mutex::new(StringTable::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_interns_to_same_symbol() {
        assert_eq!(Symbol::intern("hello"), Symbol::intern("hello"));
    }

    #[test]
    fn different_strings_intern_to_different_symbols() {
        assert_ne!(Symbol::intern("hello"), Symbol::intern("world"));
    }

    #[test]
    fn as_str_roundtrips() {
        let sym = Symbol::intern("round_trip_me");
        assert_eq!(sym.as_str(), "round_trip_me");
    }

    #[test]
    fn display_matches_as_str() {
        let sym = Symbol::intern("displayed");
        assert_eq!(format!("{sym}"), "displayed");
    }

    #[test]
    fn serializes_as_its_string() {
        let sym = Symbol::intern("wire_form");
        assert_eq!(serde_json::to_string(&sym).unwrap(), "\"wire_form\"");
    }

    #[test]
    fn deserialize_reinterns_to_the_same_symbol() {
        let sym = Symbol::intern("round_trip_json");
        let json = serde_json::to_string(&sym).unwrap();
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(sym, back);
    }

    #[quickcheck_macros::quickcheck]
    fn interning_is_idempotent(s: String) -> bool {
        Symbol::intern(&s) == Symbol::intern(&s)
    }
}
