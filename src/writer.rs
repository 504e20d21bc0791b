//! Builds sample files in the on-disk format.
//!
//! This is the collector-side counterpart of the reader, and what the test
//! suite uses to produce fixtures. Samples are accumulated in memory and laid
//! out on [`SampleWriter::serialize`]: header, string table, function-header
//! table, inline-header table, then the profile-data region with each
//! function's inline stacks followed by its per-line records.

use std::io::Write;

use indexmap::IndexMap;

use crate::format::raw::{FileHeader, FreqRecord, FuncHeader, StackEntry};

/// Per-line samples of one function, with any inlined callsites.
#[derive(Debug, Clone)]
pub struct FunctionSamples {
    file: String,
    name: String,
    lines: Vec<FreqRecord>,
    callsites: Vec<CallsiteSamples>,
}

impl FunctionSamples {
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            lines: Vec::new(),
            callsites: Vec::new(),
        }
    }

    /// Records `freq` samples over `num_instr` sampled instructions at `line`.
    pub fn line(mut self, line: u32, freq: i64, num_instr: u32) -> Self {
        self.lines.push(FreqRecord {
            line_num: line,
            num_instr,
            freq,
        });
        self
    }

    /// Attaches an inlined callsite.
    pub fn callsite(mut self, callsite: CallsiteSamples) -> Self {
        self.callsites.push(callsite);
        self
    }
}

/// Samples of one inlined-function invocation.
///
/// `stack` is given in lookup order (innermost enclosing frame first, the
/// order the annotator's extractor produces); it is written to disk reversed.
#[derive(Debug, Clone)]
pub struct CallsiteSamples {
    file: String,
    name: String,
    stack: Vec<(String, u32)>,
    total_samples: i64,
    lines: Vec<FreqRecord>,
}

impl CallsiteSamples {
    pub fn new(
        file: impl Into<String>,
        name: impl Into<String>,
        stack: &[(&str, u32)],
        total_samples: i64,
    ) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            stack: stack.iter().map(|&(f, l)| (f.to_owned(), l)).collect(),
            total_samples,
            lines: Vec::new(),
        }
    }

    /// Records `freq` samples over `num_instr` sampled instructions at `line`
    /// within the inlined body.
    pub fn line(mut self, line: u32, freq: i64, num_instr: u32) -> Self {
        self.lines.push(FreqRecord {
            line_num: line,
            num_instr,
            freq,
        });
        self
    }
}

/// Accumulates functions and serializes them into a sample file buffer.
#[derive(Debug, Default)]
pub struct SampleWriter {
    strings: StringInterner,
    functions: Vec<FunctionSamples>,
}

impl SampleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: FunctionSamples) -> &mut Self {
        self.functions.push(function);
        self
    }

    /// Lays out all regions and writes the finished file to `out`.
    pub fn serialize<W: Write>(mut self, out: &mut W) -> std::io::Result<()> {
        // Intern every string first so the string-table size is known before
        // any offset is computed.
        let functions = std::mem::take(&mut self.functions);
        for function in &functions {
            self.strings.intern(&function.file);
            self.strings.intern(&function.name);
            for callsite in &function.callsites {
                self.strings.intern(&callsite.file);
                self.strings.intern(&callsite.name);
                for (file, _) in &callsite.stack {
                    self.strings.intern(file);
                }
            }
        }

        let ent_size = FuncHeader::SIZE as u64;
        let num_funcs = functions.len() as u64;
        let num_callsites: u64 = functions.iter().map(|f| f.callsites.len() as u64).sum();

        let str_table_offset = FileHeader::SIZE as u64;
        let str_table_size = self.strings.bytes.len() as u64;
        let func_hdr_offset = str_table_offset + str_table_size;
        let inline_hdr_offset = func_hdr_offset + num_funcs * ent_size;
        let profile_offset = inline_hdr_offset + num_callsites * ent_size;

        let mut func_hdrs = Vec::with_capacity(functions.len());
        let mut inline_hdrs = Vec::new();
        let mut profile = Vec::new();

        for function in &functions {
            // Profile block layout per function: the callsite stacks first,
            // then the function's own line records, then each callsite's line
            // records. That keeps `func_freq_offset` a real, nonzero delta
            // whenever the function has inlined callsites.
            let block_offset = profile.len() as u64;
            let first_inline = inline_hdrs.len() as u64;

            let mut stack_offsets = Vec::with_capacity(function.callsites.len());
            for callsite in &function.callsites {
                stack_offsets.push(profile.len() as u64);
                for (file, line) in callsite.stack.iter().rev() {
                    StackEntry {
                        filename_offset: self.strings.offset_of(file) as u32,
                        line_num: *line,
                    }
                    .encode_into(&mut profile);
                }
            }

            let freq_offset = profile.len() as u64 - block_offset;
            for record in &function.lines {
                record.encode_into(&mut profile);
            }

            for (callsite, stack_offset) in function.callsites.iter().zip(stack_offsets) {
                let records_offset = profile.len() as u64;
                for record in &callsite.lines {
                    record.encode_into(&mut profile);
                }
                inline_hdrs.push(FuncHeader {
                    filename_offset: self.strings.offset_of(&callsite.file),
                    func_name_offset: self.strings.offset_of(&callsite.name),
                    func_profile_offset: records_offset,
                    func_freq_offset: 0,
                    func_inline_hdr_offset: 0,
                    inline_stack_offset: stack_offset,
                    num_freq_entries: callsite.lines.len() as u64,
                    num_inline_entries: 0,
                    total_samples: callsite.total_samples,
                    inline_depth: callsite.stack.len() as u64,
                });
            }

            func_hdrs.push(FuncHeader {
                filename_offset: self.strings.offset_of(&function.file),
                func_name_offset: self.strings.offset_of(&function.name),
                func_profile_offset: block_offset,
                func_freq_offset: freq_offset,
                func_inline_hdr_offset: first_inline * ent_size,
                inline_stack_offset: 0,
                num_freq_entries: function.lines.len() as u64,
                num_inline_entries: function.callsites.len() as u64,
                total_samples: function.lines.iter().map(|r| r.freq).sum(),
                inline_depth: 0,
            });
        }

        let mut buf = Vec::with_capacity(
            FileHeader::SIZE + self.strings.bytes.len() + profile.len(),
        );
        FileHeader {
            str_table_offset,
            str_table_size,
            func_hdr_offset,
            func_hdr_num: functions.len() as u32,
            func_hdr_ent_size: FuncHeader::SIZE as u32,
            profile_offset,
            profile_size: profile.len() as u64,
        }
        .encode_into(&mut buf);
        buf.extend_from_slice(&self.strings.bytes);
        for hdr in &func_hdrs {
            hdr.encode_into(&mut buf);
        }
        for hdr in &inline_hdrs {
            hdr.encode_into(&mut buf);
        }
        buf.extend_from_slice(&profile);

        out.write_all(&buf)
    }
}

/// NUL-terminated string table under construction.
#[derive(Debug, Default)]
struct StringInterner {
    offsets: IndexMap<String, u64>,
    bytes: Vec<u8>,
}

impl StringInterner {
    fn intern(&mut self, s: &str) -> u64 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_owned(), offset);
        offset
    }

    /// Offset of an already-interned string.
    fn offset_of(&self, s: &str) -> u64 {
        self.offsets[s]
    }
}
