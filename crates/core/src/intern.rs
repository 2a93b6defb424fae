//! Process-wide symbol interning
//!
//! Enum tags are interned once and live until the process exits, so the
//! boundary can hand out `(ptr, len)` pairs for them without tying their
//! validity to any handle. The table is append-only and initialized lazily.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, OnceLock};

static INTERNER: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();

fn interner() -> &'static Mutex<HashSet<&'static str>> {
    INTERNER.get_or_init(|| Mutex::new(HashSet::new()))
}

/// An interned string with `'static` lifetime
///
/// Equality is by content; two symbols interned from equal strings also share
/// the same pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(&'static str);

impl Symbol {
    /// Intern `name`, returning the shared copy
    pub fn intern(name: &str) -> Symbol {
        // A poisoned table is still consistent: entries are only ever inserted.
        let mut table = interner().lock().unwrap_or_else(|err| err.into_inner());
        if let Some(existing) = table.get(name) {
            return Symbol(existing);
        }
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        table.insert(leaked);
        Symbol(leaked)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_storage() {
        let a = Symbol::intern("Tag");
        let b = Symbol::intern(&String::from("Tag"));
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str().as_ptr(), b.as_str().as_ptr()));
    }

    #[test]
    fn test_intern_distinct() {
        assert_ne!(Symbol::intern("Foo"), Symbol::intern("Bar"));
    }

    #[test]
    fn test_interned_outlives_source() {
        let sym = {
            let owned = format!("{}{}", "Dyn", "amic");
            Symbol::intern(&owned)
        };
        assert_eq!(sym.as_str(), "Dynamic");
    }
}
