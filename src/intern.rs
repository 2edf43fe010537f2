//! Append-only string interning for a single compiled unit.
//!
//! A `StringId` newtype over a flat vector of owned strings plus a dedup
//! map, indexed by a 16-bit id — exactly what a single `CompiledUnit`
//! needs. Interners are built during compilation and then owned read-only
//! by the `CompiledUnit`.

use ahash::AHashMap;

/// Index into a [`StringPool`]. Bytecode operands store this as a raw `u16`;
/// the pool never grows past 65,536 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u16);

impl StringId {
    #[inline]
    pub fn from_index(index: u16) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFullError;

impl std::fmt::Display for PoolFullError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "string pool exhausted: more than 65536 distinct strings")
    }
}

impl std::error::Error for PoolFullError {}

/// An append-only table of unique strings built up during compilation.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
    index: AHashMap<String, StringId>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning its existing id if already present.
    pub fn intern(&mut self, text: &str) -> Result<StringId, PoolFullError> {
        if let Some(id) = self.index.get(text) {
            return Ok(*id);
        }
        let next = self.strings.len();
        if next > u16::MAX as usize {
            return Err(PoolFullError);
        }
        let id = StringId(next as u16);
        self.strings.push(text.to_owned());
        self.index.insert(text.to_owned(), id);
        Ok(id)
    }

    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index() as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = StringPool::new();
        let a = pool.intern("soma").unwrap();
        let b = pool.intern("soma").unwrap();
        let c = pool.intern("outro").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.get(a), "soma");
        assert_eq!(pool.len(), 2);
    }
}
