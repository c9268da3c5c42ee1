/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use lasso::{Key, Rodeo, Spur};

/// An append-only table of interned names with dense indices.
///
/// One instance on the runtime holds every method signature; method call
/// opcodes carry the index and dispatch straight into a class's method table
/// with it. Each module also owns one for its top-level variable names, kept
/// parallel to the variable value vector.
pub struct SymbolTable {
    rodeo: Rodeo,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            rodeo: Rodeo::default(),
        }
    }

    /// Returns the existing symbol for `name`, interning it first if needed.
    pub fn ensure(&mut self, name: &str) -> usize {
        self.rodeo.get_or_intern(name).into_usize()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.rodeo.get(name).map(|spur| spur.into_usize())
    }

    pub fn name(&self, symbol: usize) -> &str {
        let spur = Spur::try_from_usize(symbol).expect("symbol out of range");
        self.rodeo.resolve(&spur)
    }

    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
