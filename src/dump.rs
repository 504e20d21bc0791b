//! CFG profile dumping for overlap comparison.
//!
//! The record format, one section per function:
//!
//! ```text
//! ;;n_basic_blocks n_edges entry_count function_name
//! src dst pct_weight probability count
//! ...
//! ```
//!
//! `pct_weight` is each edge's share of the function's total edge frequency,
//! used as an overlap metric when comparing profiles.

use std::io::Write;

use crate::cfg::{Function, ENTRY_BLOCK, PROB_BASE};

/// Default file the session appends sample-profile records to.
pub const PROF_COMPARE_SAMPLE: &str = "prof.compare.sample";

/// Appends one function's CFG profile section to `out`.
pub fn write_cfg_profile<W: Write>(func: &Function, out: &mut W) -> std::io::Result<()> {
    writeln!(
        out,
        ";;{} {} {} {}",
        func.n_basic_blocks(),
        func.n_edges(),
        func.blocks[ENTRY_BLOCK].count,
        func.name
    )?;

    let sum_edge_freq: i64 = dumped_blocks(func)
        .flat_map(|b| func.blocks[b].succs.iter())
        .map(|&e| edge_freq(func, e))
        .sum();

    for block in dumped_blocks(func) {
        for &edge in &func.blocks[block].succs {
            let e = &func.edges[edge];
            if sum_edge_freq > 0 {
                let pct = edge_freq(func, edge) as f64 / sum_edge_freq as f64;
                writeln!(
                    out,
                    "{} {} {:.6} {} {}",
                    e.src, e.dst, pct, e.probability, e.count
                )?;
            } else {
                writeln!(out, "{} {} 0.0 {} {}", e.src, e.dst, e.probability, e.count)?;
            }
        }
    }
    Ok(())
}

/// Entry block plus all real blocks; the exit block has no outgoing edges.
fn dumped_blocks(func: &Function) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(ENTRY_BLOCK).chain(func.real_blocks())
}

fn edge_freq(func: &Function, edge: usize) -> i64 {
    let e = &func.edges[edge];
    func.blocks[e.src].frequency * i64::from(e.probability) / i64::from(PROB_BASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{Function, EXIT_BLOCK};

    #[test]
    fn section_header_and_edge_lines() {
        let mut func = Function::new("foo", "foo");
        let a = func.add_block();
        func.add_edge(ENTRY_BLOCK, a, PROB_BASE);
        func.add_edge(a, EXIT_BLOCK, PROB_BASE);
        func.blocks[ENTRY_BLOCK].count = 42;
        func.blocks[ENTRY_BLOCK].frequency = 10_000;
        func.blocks[a].frequency = 10_000;

        let mut out = Vec::new();
        write_cfg_profile(&func, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(";;1 2 42 foo"));
        assert_eq!(lines.next(), Some("0 2 0.500000 10000 0"));
        assert_eq!(lines.next(), Some("2 1 0.500000 10000 0"));
    }
}
