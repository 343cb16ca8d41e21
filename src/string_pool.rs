// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Append-only string interning pool.
//!
//! Keeps string-typed component fields columnar: a field never stores a
//! `String` directly, only a `u32` index into this pool (`spec.md` §4.2).

use rustc_hash::FxHashMap;

/// Append-only interning table. Index 0 is always the empty string.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    strings: Vec<String>,
    reverse: FxHashMap<String, u32>,
}

impl StringPool {
    pub fn new() -> Self {
        let mut pool = Self {
            strings: Vec::new(),
            reverse: FxHashMap::default(),
        };
        pool.strings.push(String::new());
        pool.reverse.insert(String::new(), 0);
        pool
    }

    /// Intern `s`, returning its existing index or appending a new one.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.reverse.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.reverse.insert(s.to_string(), idx);
        idx
    }

    /// Returns the empty string for an out-of-range index.
    pub fn get(&self, index: u32) -> &str {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Export all interned strings, skipping the reserved index 0.
    pub fn export(&self) -> Vec<String> {
        self.strings[1..].to_vec()
    }

    /// Merge `strings` into this pool, returning an `old_index -> new_index`
    /// remap table (1-based: `remap[i]` corresponds to `strings[i]`, i.e.
    /// old pool index `i + 1`).
    pub fn import(&mut self, strings: &[String]) -> Vec<u32> {
        strings.iter().map(|s| self.intern(s)).collect()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }

    /// Reset the pool to only the empty string. This invalidates every
    /// previously interned index without touching any component column —
    /// callers that do this on a populated world corrupt every string field
    /// in it. Test-only escape hatch (`spec.md` §9).
    pub fn clear(&mut self) {
        self.strings.clear();
        self.reverse.clear();
        self.strings.push(String::new());
        self.reverse.insert(String::new(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_index_zero() {
        let pool = StringPool::new();
        assert_eq!(pool.get(0), "");
    }

    #[test]
    fn intern_is_idempotent() {
        let mut pool = StringPool::new();
        let a = pool.intern("goblin");
        let b = pool.intern("goblin");
        assert_eq!(a, b);
        assert_eq!(pool.get(a), "goblin");
    }

    #[test]
    fn out_of_range_returns_empty() {
        let pool = StringPool::new();
        assert_eq!(pool.get(999), "");
    }

    #[test]
    fn export_skips_index_zero() {
        let mut pool = StringPool::new();
        pool.intern("a");
        pool.intern("b");
        assert_eq!(pool.export(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn import_merges_and_remaps() {
        let mut src = StringPool::new();
        src.intern("a");
        src.intern("b");
        let exported = src.export();

        let mut dst = StringPool::new();
        dst.intern("b"); // pre-existing, different index than src
        let remap = dst.import(&exported);
        assert_eq!(dst.get(remap[0]), "a");
        assert_eq!(dst.get(remap[1]), "b");
    }
}
