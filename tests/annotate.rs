//! Block annotation against loaded sample indexes: lookup routing, dedup,
//! inline-stack extraction, and the per-instruction averaging.

use sample_profile::annotate::{annotate_function, inline_stack, total_inlined_count};
use sample_profile::cfg::{
    Function, Location, ProfileStatus, Statement, ENTRY_BLOCK, EXIT_BLOCK, PROB_BASE,
};
use sample_profile::{
    read_samples, CallsiteSamples, Error, FunctionSamples, SampleIndex, SampleWriter, SourceFrame,
};

fn build(writer: SampleWriter) -> Vec<u8> {
    let mut buf = Vec::new();
    writer.serialize(&mut buf).unwrap();
    buf
}

fn load(buf: &[u8]) -> SampleIndex<'_> {
    let (index, _) = read_samples(buf, &mut |e: Error| panic!("{e}"));
    index
}

/// entry -> a -> b -> exit, all probabilities fixed.
fn two_block_function() -> (Function, usize, usize) {
    let mut func = Function::new("foo", "foo");
    let a = func.add_block();
    let b = func.add_block();
    func.add_edge(ENTRY_BLOCK, a, PROB_BASE);
    func.add_edge(a, b, PROB_BASE);
    func.add_edge(b, EXIT_BLOCK, PROB_BASE);
    func.probabilities_estimated = true;
    func.profile_status = ProfileStatus::Guessed;
    (func, a, b)
}

#[test]
fn single_flat_sample_averages_per_instruction() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.add_statement(a, Some(Location::new("a.c", 10)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 1);
    assert!(summary.adopted);
    assert_eq!(func.blocks[a].count, 100 / 4);
    assert_eq!(func.profile_status, ProfileStatus::Read);
}

#[test]
fn two_statements_on_one_line_credit_once() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.add_statement(a, Some(Location::new("a.c", 10)), None);
    func.add_statement(a, Some(Location::new("a.c", 10)), None);

    annotate_function(&mut func, &index, None);
    assert_eq!(func.blocks[a].count, 25);
}

#[test]
fn inline_stack_lookup_matches_stored_order() {
    let mut writer = SampleWriter::new();
    writer.add_function(
        FunctionSamples::new("a.c", "foo").callsite(
            CallsiteSamples::new("b.c", "foo", &[("a.c", 42), ("b.c", 7)], 500).line(7, 500, 5),
        ),
    );
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    let outer = func.add_scope(None, Some(Location::new("b.c", 7)));
    let mid = func.add_scope(Some(outer), Some(Location::new("a.c", 42)));
    let inner = func.add_scope(Some(mid), None);
    func.add_statement(a, Some(Location::new("b.c", 7)), Some(inner));

    annotate_function(&mut func, &index, None);
    assert_eq!(func.blocks[a].count, 500 / 5);
}

#[test]
fn lookup_keys_on_the_assembler_name() {
    // Samples recorded against another function at the same source line must
    // not be credited to this one.
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo_v1").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.asm_name = "foo_v2".into();
    func.add_statement(a, Some(Location::new("a.c", 10)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 0);
    assert_eq!(func.blocks[a].count, 0);
}

#[test]
fn empty_stack_routes_to_the_flat_store_only() {
    // The profile only has an inline entry at b.c:7; a statement with no
    // inline stack must consult the flat store and miss.
    let mut writer = SampleWriter::new();
    writer.add_function(
        FunctionSamples::new("a.c", "foo")
            .callsite(CallsiteSamples::new("b.c", "foo", &[("a.c", 42)], 500).line(7, 500, 5)),
    );
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.add_statement(a, Some(Location::new("b.c", 7)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 0);
    assert_eq!(func.blocks[a].count, 0);
}

#[test]
fn nonempty_stack_never_consults_the_flat_store() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    let scope = func.add_scope(None, Some(Location::new("caller.c", 3)));
    let inner = func.add_scope(Some(scope), None);
    func.add_statement(a, Some(Location::new("a.c", 10)), Some(inner));

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 0);
    assert_eq!(func.blocks[a].count, 0);
}

#[test]
fn statements_without_a_location_are_skipped() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.add_statement(a, None, None);

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 0);
    assert_eq!(func.blocks[a].count, 0);
}

#[test]
fn zero_instr_and_zero_freq_records_contribute_nothing() {
    let mut writer = SampleWriter::new();
    writer.add_function(
        FunctionSamples::new("a.c", "foo")
            .line(10, 100, 0)
            .line(11, 0, 4),
    );
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, _) = two_block_function();
    func.add_statement(a, Some(Location::new("a.c", 10)), None);
    func.add_statement(a, Some(Location::new("a.c", 11)), None);

    let summary = annotate_function(&mut func, &index, None);
    assert_eq!(summary.annotated_blocks, 0);
    assert_eq!(func.blocks[a].count, 0);
}

#[test]
fn annotation_is_idempotent() {
    let mut writer = SampleWriter::new();
    writer.add_function(FunctionSamples::new("a.c", "foo").line(10, 100, 4));
    let buf = build(writer);
    let index = load(&buf);

    let (mut func, a, b) = two_block_function();
    func.add_statement(a, Some(Location::new("a.c", 10)), None);

    annotate_function(&mut func, &index, None);
    let first = (func.blocks[a].count, func.blocks[b].count);
    annotate_function(&mut func, &index, None);
    assert_eq!((func.blocks[a].count, func.blocks[b].count), first);
}

#[test]
fn extractor_skips_unlocated_and_repeated_scopes() {
    let mut func = Function::new("foo", "foo");
    let a = func.add_block();
    let s0 = func.add_scope(None, Some(Location::new("c.c", 3)));
    let s1 = func.add_scope(Some(s0), None);
    let s2 = func.add_scope(Some(s1), Some(Location::new("a.c", 42)));
    let s3 = func.add_scope(Some(s2), Some(Location::new("a.c", 42)));
    let s4 = func.add_scope(Some(s3), None);
    func.add_statement(a, Some(Location::new("b.c", 7)), Some(s4));

    let stmt = &func.blocks[a].statements[0];
    let stack = inline_stack(&func, stmt);
    assert_eq!(
        stack,
        vec![
            SourceFrame { file: "a.c", line: 42 },
            SourceFrame { file: "c.c", line: 3 },
        ]
    );
}

#[test]
fn total_count_addresses_the_callsite_entry() {
    let mut writer = SampleWriter::new();
    writer.add_function(
        FunctionSamples::new("a.c", "foo").callsite(
            CallsiteSamples::new("b.c", "foo", &[("b.c", 7), ("a.c", 42)], 500).line(7, 500, 5),
        ),
    );
    let buf = build(writer);
    let index = load(&buf);

    let mut func = Function::new("foo", "foo");
    let outer = func.add_scope(None, Some(Location::new("a.c", 42)));
    let inner = func.add_scope(Some(outer), None);
    let stmt = Statement {
        location: Some(Location::new("b.c", 7)),
        scope: Some(inner),
    };
    assert_eq!(total_inlined_count(&func, &stmt, "foo", &index), 500);

    // No scope, no inlined invocation.
    let bare = Statement {
        location: Some(Location::new("b.c", 7)),
        scope: None,
    };
    assert_eq!(total_inlined_count(&func, &bare, "foo", &index), 0);
}
