//! Attributes sample counts to basic blocks.
//!
//! Per statement, the inline-stack extractor reconstructs how the statement
//! came to exist: the chain of call-site locations recorded on its enclosing
//! lexical scopes. Statements with a non-empty stack are looked up in the
//! inline store, the rest in the flat store; matched entries contribute their
//! sampled frequency and instruction count once per block, and the block
//! count is the per-instruction average of what was found.

use std::io::Write;

use crate::cfg::{Function, ProfileStatus, Statement};
use crate::flow;
use crate::format::MAX_STACK;
use crate::index::{SampleIndex, SourceFrame};

/// Capacity of the per-block dedup sets; a basic block spanning more source
/// lines than this violates the format's assumptions.
const MAX_BLOCK_LINES: usize = 500;

/// A function needs this many blocks before a single annotated block is
/// considered too weak a signal to adopt.
const MIN_SAMPLE_BB_COUNT: usize = 5;

/// What [`annotate_function`] did, for the session's profile summary.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationSummary {
    /// Real blocks that received a nonzero count.
    pub annotated_blocks: usize,
    /// Largest raw block count seen before smoothing.
    pub func_max_count: i64,
    /// Whether the smoothed profile was adopted.
    pub adopted: bool,
}

/// Reconstructs the inline stack of `stmt`: the `(file, line)` call-site
/// frames on its enclosing scopes, innermost first.
///
/// Scopes without a location, and scopes repeating the previously emitted
/// location, are skipped.
pub fn inline_stack<'f>(func: &'f Function, stmt: &'f Statement) -> Vec<SourceFrame<'f>> {
    let mut stack = Vec::new();
    let mut scope = match stmt.scope {
        Some(id) => func.scopes[id].parent,
        None => return stack,
    };
    let mut last: Option<(&str, u32)> = None;
    while let Some(id) = scope {
        let node = &func.scopes[id];
        if let Some(location) = &node.location {
            if location.line > 0 && last != Some((location.file.as_str(), location.line)) {
                last = Some((location.file.as_str(), location.line));
                stack.push(SourceFrame {
                    file: &location.file,
                    line: location.line,
                });
            }
        }
        scope = node.parent;
    }
    stack
}

/// Total execution count of the inlined invocation `stmt` belongs to.
///
/// The statement's own location is frame 0 of the probe and the lookup uses
/// line 0, which addresses the callsite-total entry the reader inserted.
/// Returns 0 when the statement has no location or no matching entry.
pub fn total_inlined_count(
    func: &Function,
    stmt: &Statement,
    callee: &str,
    index: &SampleIndex<'_>,
) -> i64 {
    let location = match &stmt.location {
        Some(location) => location,
        None => return 0,
    };
    if stmt.scope.is_none() {
        return 0;
    }
    let mut stack = vec![SourceFrame {
        file: &location.file,
        line: location.line,
    }];
    stack.extend(inline_stack(func, stmt));
    index
        .find_inline(&stack, &location.file, 0, callee)
        .map_or(0, |entry| entry.freq)
}

/// Computes the execution count of one basic block from the sample index.
///
/// Reads only; idempotent. Returns the per-instruction average of the
/// matched entries, or 0 when nothing was sampled.
pub fn annotate_block(
    func: &Function,
    block: usize,
    index: &SampleIndex<'_>,
    dump: &mut Option<&mut dyn Write>,
) -> i64 {
    let mut sum_freq: i64 = 0;
    let mut instr_sampled: u64 = 0;
    let mut max_freq: i64 = 0;
    let mut num_ir: u32 = 0;
    let mut seen_flat: Vec<u32> = Vec::new();
    let mut seen_inline: Vec<u32> = Vec::new();

    for stmt in &func.blocks[block].statements {
        // A zero line would alias the callsite-total key; treat it as
        // unknown, like a missing location.
        let location = match &stmt.location {
            Some(location) if location.line > 0 => location,
            _ => continue,
        };
        num_ir += 1;

        let stack = inline_stack(func, stmt);
        assert!(stack.len() < MAX_STACK, "inline stack too deep");

        let (freq, num_instr) = if !stack.is_empty() {
            let entry =
                match index.find_inline(&stack, &location.file, location.line, &func.asm_name) {
                    Some(entry) => entry,
                    None => continue,
                };
            if seen_inline.contains(&entry.id) {
                continue;
            }
            assert!(seen_inline.len() < MAX_BLOCK_LINES, "too many sampled lines in block");
            seen_inline.push(entry.id);
            (entry.freq, entry.num_instr)
        } else {
            let entry = match index.find_flat(&location.file, location.line, &func.asm_name) {
                Some(entry) => entry,
                None => continue,
            };
            if seen_flat.contains(&entry.id) {
                continue;
            }
            assert!(seen_flat.len() < MAX_BLOCK_LINES, "too many sampled lines in block");
            seen_flat.push(entry.id);
            (entry.freq, entry.num_instr)
        };

        // A record with no sampled instructions or no samples adds nothing to
        // either side of the average.
        if freq == 0 || num_instr == 0 {
            continue;
        }
        sum_freq += freq;
        instr_sampled += u64::from(num_instr);
        max_freq = max_freq.max(freq);

        if let Some(out) = dump.as_deref_mut() {
            let _ = writeln!(out, "BB{}: {} line_{} ({})", block, location.file, location.line, freq);
        }
    }

    let count = if instr_sampled > 0 {
        sum_freq / instr_sampled as i64
    } else {
        0
    };

    if let Some(out) = dump.as_deref_mut() {
        let _ = writeln!(
            out,
            "BB{}: average_count={}, maximal_count={}. num_ir={}, num_instr_sampled={}.",
            block, count, max_freq, num_ir, instr_sampled
        );
    }

    count
}

/// Annotates every real block of `func` and decides whether to adopt the
/// result.
///
/// Adopted profiles are smoothed to flow consistency and the function is
/// marked [`ProfileStatus::Read`]; otherwise every block count is reset to 0
/// and the pre-existing static estimate stands.
pub fn annotate_function(
    func: &mut Function,
    index: &SampleIndex<'_>,
    mut dump: Option<&mut dyn Write>,
) -> AnnotationSummary {
    if let Some(out) = dump.as_deref_mut() {
        let _ = writeln!(
            out,
            "\nAnnotate CFG for function {}() with sample profile.",
            func.name
        );
        let _ = writeln!(
            out,
            "n_basic_blocks={}, n_edges={}.",
            func.n_basic_blocks(),
            func.n_edges()
        );
    }

    let mut annotated_blocks = 0;
    let mut func_max_count: i64 = 0;
    for block in func.real_blocks() {
        let count = annotate_block(func, block, index, &mut dump);
        func.blocks[block].count = count;
        if count != 0 {
            annotated_blocks += 1;
            func_max_count = func_max_count.max(count);
        }
    }

    if let Some(out) = dump.as_deref_mut() {
        let _ = writeln!(
            out,
            "\n{} of {} BBs are sampled. func_max_count={}, sp_max_count={}.",
            annotated_blocks,
            func.n_basic_blocks(),
            func_max_count,
            index.max_count()
        );
    }

    let adopted = annotated_blocks > 1
        || (annotated_blocks == 1 && func.n_basic_blocks() < MIN_SAMPLE_BB_COUNT);
    if adopted {
        flow::smooth_cfg(func);
        func.profile_status = ProfileStatus::Read;
    } else {
        for block in func.real_blocks() {
            func.blocks[block].count = 0;
        }
    }

    AnnotationSummary {
        annotated_blocks,
        func_max_count,
        adopted,
    }
}
