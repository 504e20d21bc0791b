//! Flow-consistency smoothing of annotated CFG counts.
//!
//! Raw per-block counts from sampling do not satisfy flow conservation: the
//! inflow and outflow of a block rarely match its count. Smoothing seeds edge
//! counts from the static branch probabilities, bridges the entry and exit
//! pseudo blocks, and then reconciles the graph with an iterative
//! minimum-cost-flow style relaxation: block counts only ever rise to meet
//! the larger of their inflow and outflow (sampling undercounts, never
//! overcounts), and incident edges are rescaled to carry exactly the block
//! count. On acyclic graphs the result is exactly flow-consistent; on cyclic
//! graphs the relaxation converges geometrically and is cut off after a
//! bounded number of rounds.

use crate::cfg::{Function, ENTRY_BLOCK, EXIT_BLOCK, PROB_BASE};

/// Runs the full smoothing pipeline on an annotated function.
pub fn smooth_cfg(func: &mut Function) {
    seed_counts(func);
    func.add_fake_exit_edges();
    smooth_flow(func);
    func.remove_fake_edges();
    sync_fixed_blocks(func);
    func.counts_to_freqs();
}

/// Seeds edge counts from block counts and static probabilities.
///
/// The seeding pass runs twice: each pass distributes every block's count
/// over its outgoing edges and re-sums the block count from them, so chains
/// of straight-line blocks settle before smoothing proper.
pub(crate) fn seed_counts(func: &mut Function) {
    for _ in 0..2 {
        for block in func.real_blocks() {
            let mut summed = 0;
            for i in 0..func.blocks[block].succs.len() {
                let edge = func.blocks[block].succs[i];
                let count = func.blocks[block].count * i64::from(func.edges[edge].probability)
                    / i64::from(PROB_BASE);
                func.edges[edge].count = count;
                summed += count;
            }
            func.blocks[block].count = summed;
        }
    }

    // Bridge the pseudo blocks: the entry mirrors its successors, the exit
    // collects its predecessors.
    func.blocks[ENTRY_BLOCK].count = 0;
    for i in 0..func.blocks[ENTRY_BLOCK].succs.len() {
        let edge = func.blocks[ENTRY_BLOCK].succs[i];
        let count = func.blocks[func.edges[edge].dst].count;
        func.edges[edge].count = count;
        func.blocks[ENTRY_BLOCK].count += count;
    }
    func.blocks[EXIT_BLOCK].count = func.inflow(EXIT_BLOCK);
}

/// Iterative flow reconciliation.
///
/// Per round and block, the block count rises to the larger of its current
/// count, its outflow, and its inflow from real predecessors; outgoing edges
/// are rescaled to carry exactly that count. Edges from the entry pseudo
/// block are residual: they absorb whatever the real predecessors do not
/// supply, which also undoes the deliberate overestimate of the seeding
/// step. Only when a block has no entry predecessor are its incoming edges
/// pulled up to the target, which propagates demand backwards through the
/// graph.
pub(crate) fn smooth_flow(func: &mut Function) {
    let rounds = 2 * func.blocks.len() + 4;
    for _ in 0..rounds {
        let mut changed = false;
        for block in func.real_blocks() {
            let preds = func.blocks[block].preds.clone();
            let (entry_in, real_in): (Vec<usize>, Vec<usize>) = preds
                .iter()
                .partition(|&&e| func.edges[e].src == ENTRY_BLOCK);
            let real_inflow: i64 = real_in.iter().map(|&e| func.edges[e].count).sum();

            let outflow = func.outflow(block);
            let want = func.blocks[block].count.max(outflow).max(real_inflow);
            if want == 0 {
                continue;
            }
            if func.blocks[block].count != want {
                func.blocks[block].count = want;
                changed = true;
            }

            let succs = func.blocks[block].succs.clone();
            changed |= rebalance(func, &succs, want);

            if entry_in.is_empty() {
                changed |= rebalance(func, &real_in, want);
            } else {
                changed |= rebalance(func, &entry_in, want - real_inflow);
            }
        }
        if !changed {
            break;
        }
    }
    sync_fixed_blocks(func);
}

/// Rescales a set of incident edges to carry exactly `want`.
///
/// Existing counts keep their proportions; when all are zero the static
/// probabilities decide, and failing that the flow is split evenly. The last
/// edge absorbs the integer-division remainder.
fn rebalance(func: &mut Function, edges: &[usize], want: i64) -> bool {
    if edges.is_empty() {
        return false;
    }
    let current: i64 = edges.iter().map(|&e| func.edges[e].count).sum();
    if current == want {
        return false;
    }

    let total_prob: i64 = edges.iter().map(|&e| i64::from(func.edges[e].probability)).sum();
    let mut assigned = 0;
    let mut changed = false;
    for (i, &edge) in edges.iter().enumerate() {
        let share = if i + 1 == edges.len() {
            want - assigned
        } else if current > 0 {
            func.edges[edge].count * want / current
        } else if total_prob > 0 {
            want * i64::from(func.edges[edge].probability) / total_prob
        } else {
            want / edges.len() as i64
        };
        assigned += share;
        if func.edges[edge].count != share {
            func.edges[edge].count = share;
            changed = true;
        }
    }
    changed
}

/// Recomputes the entry and exit pseudo-block counts from their edges.
fn sync_fixed_blocks(func: &mut Function) {
    func.blocks[ENTRY_BLOCK].count = func.outflow(ENTRY_BLOCK);
    func.blocks[EXIT_BLOCK].count = func.inflow(EXIT_BLOCK);
}
