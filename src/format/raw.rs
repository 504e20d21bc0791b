//! Raw on-disk record layouts.
//!
//! All records are fixed-size and little-endian. `decode` returns `None` when
//! the given slice cannot hold the record; callers translate that into the
//! appropriate diagnostic.

/// The fixed file header at offset 0.
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    /// Absolute offset of the string table.
    pub str_table_offset: u64,
    /// Size in bytes of the string table.
    pub str_table_size: u64,
    /// Absolute offset of the function-header table.
    pub func_hdr_offset: u64,
    /// Number of top-level function headers.
    pub func_hdr_num: u32,
    /// Uniform size of one (function or inline-callsite) header entry.
    pub func_hdr_ent_size: u32,
    /// Absolute offset of the profile-data region.
    pub profile_offset: u64,
    /// Size in bytes of the profile-data region.
    pub profile_size: u64,
}

impl FileHeader {
    /// Encoded size, including 16 reserved trailing bytes.
    pub const SIZE: usize = 64;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut r = Fields::new(data);
        Some(Self {
            str_table_offset: r.u64(),
            str_table_size: r.u64(),
            func_hdr_offset: r.u64(),
            func_hdr_num: r.u32(),
            func_hdr_ent_size: r.u32(),
            profile_offset: r.u64(),
            profile_size: r.u64(),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.str_table_offset.to_le_bytes());
        out.extend_from_slice(&self.str_table_size.to_le_bytes());
        out.extend_from_slice(&self.func_hdr_offset.to_le_bytes());
        out.extend_from_slice(&self.func_hdr_num.to_le_bytes());
        out.extend_from_slice(&self.func_hdr_ent_size.to_le_bytes());
        out.extend_from_slice(&self.profile_offset.to_le_bytes());
        out.extend_from_slice(&self.profile_size.to_le_bytes());
        out.extend_from_slice(&[0u8; 16]);
    }
}

/// A function header, or an inline-callsite header (same shape).
///
/// Top-level headers have `inline_depth == 0` and do not use
/// `inline_stack_offset`. Inline-callsite headers have a nonzero depth and
/// point at their stack run inside the profile-data region.
#[derive(Debug, Clone, Default)]
pub struct FuncHeader {
    /// String-table offset of the source file name.
    pub filename_offset: u64,
    /// String-table offset of the (assembler) function name.
    pub func_name_offset: u64,
    /// Offset of this function's profile block within the profile-data region.
    pub func_profile_offset: u64,
    /// Offset of the per-line frequency records within the profile block.
    pub func_freq_offset: u64,
    /// Offset of this function's first inline-callsite header, relative to the
    /// end of the function-header table.
    pub func_inline_hdr_offset: u64,
    /// Offset of the inline-stack run within the profile-data region.
    pub inline_stack_offset: u64,
    /// Number of per-line frequency records.
    pub num_freq_entries: u64,
    /// Number of inline-callsite headers owned by this function.
    pub num_inline_entries: u64,
    /// Total samples attributed to this function or callsite.
    pub total_samples: i64,
    /// Inline depth; 0 for top-level function headers.
    pub inline_depth: u64,
}

impl FuncHeader {
    /// Encoded size; also the default uniform header entry size.
    pub const SIZE: usize = 80;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut r = Fields::new(data);
        Some(Self {
            filename_offset: r.u64(),
            func_name_offset: r.u64(),
            func_profile_offset: r.u64(),
            func_freq_offset: r.u64(),
            func_inline_hdr_offset: r.u64(),
            inline_stack_offset: r.u64(),
            num_freq_entries: r.u64(),
            num_inline_entries: r.u64(),
            total_samples: r.i64(),
            inline_depth: r.u64(),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.filename_offset.to_le_bytes());
        out.extend_from_slice(&self.func_name_offset.to_le_bytes());
        out.extend_from_slice(&self.func_profile_offset.to_le_bytes());
        out.extend_from_slice(&self.func_freq_offset.to_le_bytes());
        out.extend_from_slice(&self.func_inline_hdr_offset.to_le_bytes());
        out.extend_from_slice(&self.inline_stack_offset.to_le_bytes());
        out.extend_from_slice(&self.num_freq_entries.to_le_bytes());
        out.extend_from_slice(&self.num_inline_entries.to_le_bytes());
        out.extend_from_slice(&self.total_samples.to_le_bytes());
        out.extend_from_slice(&self.inline_depth.to_le_bytes());
    }
}

/// A per-line frequency record: the sampled frequency at one source line and
/// the number of sampled instructions that contributed to it.
#[derive(Debug, Clone, Copy)]
pub struct FreqRecord {
    pub line_num: u32,
    pub num_instr: u32,
    pub freq: i64,
}

impl FreqRecord {
    pub const SIZE: usize = 16;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut r = Fields::new(data);
        Some(Self {
            line_num: r.u32(),
            num_instr: r.u32(),
            freq: r.i64(),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.line_num.to_le_bytes());
        out.extend_from_slice(&self.num_instr.to_le_bytes());
        out.extend_from_slice(&self.freq.to_le_bytes());
    }
}

/// One frame of an on-disk inline stack. Frames are stored outermost-first;
/// the reader reverses the run into lookup order.
#[derive(Debug, Clone, Copy)]
pub struct StackEntry {
    pub filename_offset: u32,
    pub line_num: u32,
}

impl StackEntry {
    pub const SIZE: usize = 8;

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut r = Fields::new(data);
        Some(Self {
            filename_offset: r.u32(),
            line_num: r.u32(),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.filename_offset.to_le_bytes());
        out.extend_from_slice(&self.line_num.to_le_bytes());
    }
}

/// Sequential little-endian field reader over a length-checked slice.
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(bytes)
    }

    fn u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(bytes)
    }

    fn i64(&mut self) -> i64 {
        self.u64() as i64
    }
}
