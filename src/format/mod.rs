//! The on-disk sample file format.
//!
//! A sample file is a single little-endian buffer with four regions, located
//! by absolute offsets recorded in the [`raw::FileHeader`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ File header                                  │
//! ├──────────────────────────────────────────────┤
//! │ String table (NUL-terminated UTF-8 strings)  │
//! ├──────────────────────────────────────────────┤
//! │ Function headers × func_hdr_num              │
//! ├──────────────────────────────────────────────┤
//! │ Inline-callsite headers, in file order       │
//! ├──────────────────────────────────────────────┤
//! │ Profile data: inline stacks and per-line     │
//! │ frequency records referenced by the headers  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every string used elsewhere in the file is a byte offset into the string
//! table. Inline-callsite headers have the same shape as function headers and
//! are addressed relative to the end of the function-header table; the run of
//! inline-stack entries they point at is stored outermost-frame-first and is
//! reversed on load.

pub mod raw;

use crate::error::{Error, Result};

/// Upper bound on the depth of an inline stack.
pub const MAX_STACK: usize = 200;

/// The string-table region of a loaded sample file.
///
/// Strings are NUL-terminated and referenced by byte offset. Resolved strings
/// borrow from the loaded buffer for the lifetime of the index built over it.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'data> {
    data: &'data [u8],
}

impl<'data> StringTable<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self { data }
    }

    /// Resolves the NUL-terminated string at `offset`.
    pub fn get(&self, offset: u64) -> Result<&'data str> {
        let start = usize::try_from(offset).map_err(|_| Error::InvalidStringOffset(offset))?;
        if start >= self.data.len() {
            return Err(Error::InvalidStringOffset(offset));
        }
        let tail = &self.data[start..];
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnterminatedString(offset))?;
        std::str::from_utf8(&tail[..len]).map_err(|_| Error::InvalidStringData(offset))
    }
}
