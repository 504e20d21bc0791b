//! Reads a sample file buffer into a [`SampleIndex`].
//!
//! The file is read in one piece by the caller; every on-disk "seek" becomes
//! a bounds-checked slice here. Damaged regions raise a diagnostic through
//! the [`ErrorSink`] and stop the affected function; entries loaded before
//! the damage stay valid, and reading continues with the next function where
//! possible.

use std::rc::Rc;

use crate::error::{Error, ErrorSink};
use crate::format::raw::{FileHeader, FreqRecord, FuncHeader, StackEntry};
use crate::format::{StringTable, MAX_STACK};
use crate::index::{SampleIndex, SourceFrame};

/// Parses `data` and builds the sample index.
///
/// Returns the index together with the number of per-line records inserted
/// (callsite-total entries are not counted). A count of 0 means the file had
/// no usable data and sample profiling should be disabled.
pub fn read_samples<'data, E>(data: &'data [u8], sink: &mut E) -> (SampleIndex<'data>, u64)
where
    E: ErrorSink<Error>,
{
    let mut index = SampleIndex::new();
    let mut num_samples = 0u64;

    let header = match FileHeader::decode(data) {
        Some(header) => header,
        None => {
            sink.raise_error(Error::FileHeader);
            return (index, 0);
        }
    };

    let strings = match region(data, header.str_table_offset, header.str_table_size) {
        Some(bytes) => StringTable::new(bytes),
        None => {
            sink.raise_error(Error::StringTable);
            return (index, 0);
        }
    };

    let ent_size = header.func_hdr_ent_size as u64;
    if ent_size < FuncHeader::SIZE as u64 {
        sink.raise_error(Error::FileHeader);
        return (index, 0);
    }

    for i in 0..header.func_hdr_num {
        let hdr_offset = header.func_hdr_offset + u64::from(i) * ent_size;
        let func_hdr = match slice_from(data, hdr_offset).and_then(FuncHeader::decode) {
            Some(hdr) => hdr,
            None => {
                // The header table itself is truncated; later entries use the
                // same stride and cannot be any better.
                sink.raise_error(Error::FunctionHeader(i));
                break;
            }
        };

        if read_function(data, &header, &strings, &func_hdr, i, &mut index, &mut num_samples, sink)
            && func_hdr.num_inline_entries > 0
        {
            num_samples =
                read_inline_function(data, &header, &strings, &func_hdr, &mut index, num_samples, sink);
        }
    }

    (index, num_samples)
}

/// Reads one top-level function's per-line records into the flat store.
/// Returns false when the function had to be abandoned.
fn read_function<'data, E>(
    data: &'data [u8],
    header: &FileHeader,
    strings: &StringTable<'data>,
    func_hdr: &FuncHeader,
    hdr_index: u32,
    index: &mut SampleIndex<'data>,
    num_samples: &mut u64,
    sink: &mut E,
) -> bool
where
    E: ErrorSink<Error>,
{
    let (file, func) = match resolve_names(strings, func_hdr, sink) {
        Some(names) => names,
        None => return false,
    };

    let records_offset =
        header.profile_offset + func_hdr.func_profile_offset + func_hdr.func_freq_offset;
    for j in 0..func_hdr.num_freq_entries {
        let offset = records_offset + j * FreqRecord::SIZE as u64;
        let record = match slice_from(data, offset).and_then(FreqRecord::decode) {
            Some(record) => record,
            None => {
                sink.raise_error(Error::FreqRecords(hdr_index));
                return false;
            }
        };
        if !check_freq(file, &record, sink) {
            continue;
        }
        if index.insert_flat(file, func, record.line_num, record.freq, record.num_instr, sink) {
            *num_samples += 1;
        }
    }
    true
}

/// Reads the inline-callsite headers of one function and fills the inline
/// store. Each callsite contributes its per-line entries plus one
/// callsite-total entry with `line == 0`, all sharing one stack.
///
/// Returns the running sample count; on damage the count accumulated so far
/// is returned and the remaining callsites of this function are skipped.
fn read_inline_function<'data, E>(
    data: &'data [u8],
    header: &FileHeader,
    strings: &StringTable<'data>,
    func_hdr: &FuncHeader,
    index: &mut SampleIndex<'data>,
    mut num_samples: u64,
    sink: &mut E,
) -> u64
where
    E: ErrorSink<Error>,
{
    let ent_size = u64::from(header.func_hdr_ent_size);
    let inline_table = header.func_hdr_offset + u64::from(header.func_hdr_num) * ent_size;

    for k in 0..func_hdr.num_inline_entries {
        let hdr_offset = inline_table + func_hdr.func_inline_hdr_offset + k * ent_size;
        let inline_hdr = match slice_from(data, hdr_offset).and_then(FuncHeader::decode) {
            Some(hdr) => hdr,
            None => {
                sink.raise_error(Error::InlineHeader);
                return num_samples;
            }
        };

        let num_lines = inline_hdr.num_freq_entries;
        if num_lines == 0 {
            continue;
        }

        let depth = inline_hdr.inline_depth as usize;
        assert!(
            depth > 0 && depth <= MAX_STACK,
            "inline stack depth {depth} out of bounds"
        );

        let (file, func) = match resolve_names(strings, &inline_hdr, sink) {
            Some(names) => names,
            None => return num_samples,
        };

        // The stack is stored outermost-frame-first; reverse it into the
        // order the inline-stack extractor emits.
        let stack_offset = header.profile_offset + inline_hdr.inline_stack_offset;
        let mut frames = vec![SourceFrame { file: "", line: 0 }; depth];
        for i in 0..depth {
            let offset = stack_offset + (i * StackEntry::SIZE) as u64;
            let entry = match slice_from(data, offset).and_then(StackEntry::decode) {
                Some(entry) => entry,
                None => {
                    sink.raise_error(Error::InlineStack);
                    return num_samples;
                }
            };
            let frame_file = match strings.get(u64::from(entry.filename_offset)) {
                Ok(name) => name,
                Err(err) => {
                    sink.raise_error(err);
                    return num_samples;
                }
            };
            frames[depth - i - 1] = SourceFrame {
                file: frame_file,
                line: entry.line_num,
            };
        }
        let stack: Rc<[SourceFrame<'data>]> = frames.into();

        let records_offset = header.profile_offset + inline_hdr.func_profile_offset;
        for j in 0..num_lines {
            let offset = records_offset + j * FreqRecord::SIZE as u64;
            let record = match slice_from(data, offset).and_then(FreqRecord::decode) {
                Some(record) => record,
                None => {
                    sink.raise_error(Error::InlineFreqRecord);
                    return num_samples;
                }
            };
            if !check_freq(file, &record, sink) {
                continue;
            }
            let inserted = index.insert_inline(
                Rc::clone(&stack),
                file,
                func,
                record.line_num,
                record.freq,
                record.num_instr,
                sink,
            );
            if inserted {
                num_samples += 1;
            }
        }

        // The callsite-total entry: line 0, freq equal to the total samples
        // of the inlined invocation. Not counted as a per-line sample.
        index.insert_inline(stack, file, func, 0, inline_hdr.total_samples, 0, sink);
    }

    num_samples
}

fn resolve_names<'data, E>(
    strings: &StringTable<'data>,
    hdr: &FuncHeader,
    sink: &mut E,
) -> Option<(&'data str, &'data str)>
where
    E: ErrorSink<Error>,
{
    let file = match strings.get(hdr.filename_offset) {
        Ok(name) => name,
        Err(err) => {
            sink.raise_error(err);
            return None;
        }
    };
    let func = match strings.get(hdr.func_name_offset) {
        Ok(name) => name,
        Err(err) => {
            sink.raise_error(err);
            return None;
        }
    };
    Some((file, func))
}

fn check_freq<E: ErrorSink<Error>>(file: &str, record: &FreqRecord, sink: &mut E) -> bool {
    if record.freq < 0 {
        sink.raise_error(Error::NegativeFrequency {
            file: file.to_owned(),
            line: record.line_num,
            freq: record.freq,
        });
        return false;
    }
    true
}

fn region(data: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    data.get(start..end)
}

fn slice_from(data: &[u8], offset: u64) -> Option<&[u8]> {
    data.get(usize::try_from(offset).ok()?..)
}
