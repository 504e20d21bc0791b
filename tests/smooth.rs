//! CFG smoothing: seeding, flow reconciliation, and the adoption criterion.

use sample_profile::annotate::annotate_function;
use sample_profile::cfg::{
    Function, Location, ProfileStatus, ENTRY_BLOCK, EXIT_BLOCK, PROB_BASE,
};
use sample_profile::{read_samples, Error, FunctionSamples, SampleIndex, SampleWriter};

fn build(writer: SampleWriter) -> Vec<u8> {
    let mut buf = Vec::new();
    writer.serialize(&mut buf).unwrap();
    buf
}

fn load(buf: &[u8]) -> SampleIndex<'_> {
    let (index, _) = read_samples(buf, &mut |e: Error| panic!("{e}"));
    index
}

/// A three-block diamond: `a` branches 50/50 to `b` and `c`; `b` falls
/// through to the join `c`.
fn diamond() -> (Function, usize, usize, usize) {
    let mut func = Function::new("foo", "foo");
    let a = func.add_block();
    let b = func.add_block();
    let c = func.add_block();
    func.add_edge(ENTRY_BLOCK, a, PROB_BASE);
    func.add_edge(a, b, PROB_BASE / 2);
    func.add_edge(a, c, PROB_BASE / 2);
    func.add_edge(b, c, PROB_BASE);
    func.add_edge(c, EXIT_BLOCK, PROB_BASE);
    func.probabilities_estimated = true;
    func.profile_status = ProfileStatus::Guessed;
    (func, a, b, c)
}

fn assert_flow_consistent(func: &Function) {
    for block in func.real_blocks() {
        assert_eq!(
            func.inflow(block),
            func.blocks[block].count,
            "inflow of bb{block}"
        );
        assert_eq!(
            func.outflow(block),
            func.blocks[block].count,
            "outflow of bb{block}"
        );
    }
}

#[test]
fn diamond_with_annotated_entry_is_smoothed_and_adopted() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(1, 200, 1));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, b, c) = diamond();
    func.add_statement(a, Some(Location::new("a.c", 1)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert!(summary.adopted);
    assert_eq!(func.profile_status, ProfileStatus::Read);

    assert_eq!(func.blocks[ENTRY_BLOCK].count, 200);
    assert_eq!(func.blocks[a].count, 200);
    // The two branch edges split the flow along the static probabilities.
    let branch_counts: Vec<i64> = func.blocks[a]
        .succs
        .iter()
        .map(|&e| func.edges[e].count)
        .collect();
    assert_eq!(branch_counts, vec![100, 100]);
    assert_eq!(func.blocks[b].count, 100);
    assert_eq!(func.blocks[c].count, 200);
    assert_eq!(func.blocks[EXIT_BLOCK].count, 200);
    assert_flow_consistent(&func);
}

#[test]
fn unannotated_diamond_is_rejected() {
    let buf = build(SampleWriter::new());
    let (index, _) = read_samples(&buf, &mut |e: Error| panic!("{e}"));

    let (mut func, a, b, c) = diamond();
    func.add_statement(a, Some(Location::new("a.c", 1)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert!(!summary.adopted);
    assert_eq!(summary.annotated_blocks, 0);
    for block in [a, b, c] {
        assert_eq!(func.blocks[block].count, 0);
    }
    // The static estimate stands.
    assert_eq!(func.profile_status, ProfileStatus::Guessed);
}

#[test]
fn one_annotated_block_needs_a_small_function() {
    // Five real blocks in a chain; only the first is sampled. One annotated
    // block out of five is too weak a signal, so the profile is discarded.
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(1, 80, 2));
    let buf = build(writer);
    let index = load(&buf);

    let mut func = Function::new("foo", "foo");
    let blocks: Vec<usize> = (0..5).map(|_| func.add_block()).collect();
    func.add_edge(ENTRY_BLOCK, blocks[0], PROB_BASE);
    for pair in blocks.windows(2) {
        func.add_edge(pair[0], pair[1], PROB_BASE);
    }
    func.add_edge(blocks[4], EXIT_BLOCK, PROB_BASE);
    func.probabilities_estimated = true;
    func.profile_status = ProfileStatus::Guessed;
    func.add_statement(blocks[0], Some(Location::new("a.c", 1)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert!(!summary.adopted);
    assert_eq!(summary.annotated_blocks, 1);
    for &block in &blocks {
        assert_eq!(func.blocks[block].count, 0);
    }
    assert_eq!(func.profile_status, ProfileStatus::Guessed);
}

#[test]
fn two_annotated_blocks_adopt_in_a_large_function() {
    let mut writer = SampleWriter::new();
    writer.add_function(
        FunctionSamples::new("a.c", "foo")
            .line(1, 90, 3)
            .line(5, 60, 2),
    );
    let buf = build(writer);
    let index = load(&buf);

    let mut func = Function::new("foo", "foo");
    let blocks: Vec<usize> = (0..5).map(|_| func.add_block()).collect();
    func.add_edge(ENTRY_BLOCK, blocks[0], PROB_BASE);
    for pair in blocks.windows(2) {
        func.add_edge(pair[0], pair[1], PROB_BASE);
    }
    func.add_edge(blocks[4], EXIT_BLOCK, PROB_BASE);
    func.probabilities_estimated = true;
    func.add_statement(blocks[0], Some(Location::new("a.c", 1)), None);
    func.add_statement(blocks[4], Some(Location::new("a.c", 5)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert!(summary.adopted);
    assert_eq!(summary.annotated_blocks, 2);
    assert_eq!(func.profile_status, ProfileStatus::Read);
    // 90/3 = 30 at the top and 60/2 = 30 at the bottom agree; the whole
    // chain carries 30.
    for &block in &blocks {
        assert_eq!(func.blocks[block].count, 30);
    }
    assert_flow_consistent(&func);
}

#[test]
fn smoothing_scales_frequencies() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(1, 200, 1));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, b, c) = diamond();
    func.add_statement(a, Some(Location::new("a.c", 1)), None);
    annotate_function(&mut func, &index, None);

    assert_eq!(func.blocks[a].frequency, 10_000);
    assert_eq!(func.blocks[b].frequency, 5_000);
    assert_eq!(func.blocks[c].frequency, 10_000);
}
