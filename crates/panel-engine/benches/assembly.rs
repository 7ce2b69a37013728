//! Criterion benchmarks for brightness composition.
//!
//! Run: cargo bench -p panel-engine --bench assembly
//!
//! Results show:
//!   frame_batched_*: last-packet framing over N mixed descriptors
//!   assemble_*: assembly with capacity check and framing
//!   brightness_pass: full resolve → plan → patch → assemble for one level

#![allow(
    clippy::unwrap_used, // benchmark helpers use unwrap for brevity
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    missing_docs, // criterion_group! macro generates undocumented items
)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use panel_engine::assembler::{assemble, frame, Part, UnlockKeys};
use panel_engine::symbol::SymbolTable;
use panel_engine::{
    BrightnessMode, BrightnessPass, BrightnessResolver, CommandDescriptor, CommandFragment,
    EngineConfig, Framing, FragmentId, FragmentRegistry, PanelRuntimeState,
};
use panel_platform::{DataType, Descriptor, PropertyMap, TransmissionSpeed};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mixed(n: usize) -> Vec<Descriptor> {
    (0..n)
        .map(|i| match i % 3 {
            0 => Descriptor::write(DataType::DcsShortWrite, vec![0x29]),
            _ => Descriptor::write(DataType::GenericLongWrite, vec![0xB1, 0x00, 0x10]),
        })
        .collect()
}

fn fragment(n: usize) -> CommandFragment {
    CommandFragment::new(
        FragmentId::Gamma,
        TransmissionSpeed::HighSpeed,
        mixed(n).into_iter().map(CommandDescriptor::fixed).collect(),
    )
}

fn props() -> PropertyMap {
    let mut props = PropertyMap::new();
    props
        .set_text("panel,candela_map_table_revA", "0 0 127 100\n1 128 255 420")
        .set_text("panel,aid_map_table_revA", "0 0x10 0x00\n128 0x20 0x01")
        .set_text("panel,elvss_map_table_revA", "0 0x16\n200 0x1A")
        .set_text("panel,aid_tx_cmds_revA", "W B1 0xXX 0xXX\nUPDATE AID")
        .set_text("panel,elvss_tx_cmds_revA", "W B5 0xXX\nUPDATE ELVSS")
        .set_text("panel,acl_off_tx_cmds_revA", "W 55 00")
        .set_text(
            "panel,gamma_tx_cmds_revA",
            "W CA 0xXX 02 03\nIF VRR 120HS THEN 11\nELSE 33",
        );
    props
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_batched");
    for n in [8usize, 32, 128] {
        let descriptors = mixed(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &descriptors, |b, d| {
            b.iter_batched(
                || d.clone(),
                |mut d| frame(&mut d, Framing::Batched),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let fragments: Vec<CommandFragment> = (0..8).map(|_| fragment(8)).collect();
    let parts: Vec<Part<'_>> = fragments.iter().map(Part::whole).collect();
    let keys = UnlockKeys::default();
    c.bench_function("assemble_8x8", |b| {
        b.iter(|| assemble(&parts, &keys, 128, Framing::Batched).unwrap());
    });
}

fn bench_brightness_pass(c: &mut Criterion) {
    let config = EngineConfig {
        revision_count: 1,
        ..EngineConfig::default()
    };
    let props = props();
    let symbols = SymbolTable::common();
    let resolver = BrightnessResolver::load(&props, &config).unwrap();
    let mut registry = FragmentRegistry::load(&props, &config, &symbols).unwrap();
    let mut state = PanelRuntimeState::default();

    let mut level = 0u32;
    c.bench_function("brightness_pass", |b| {
        b.iter(|| {
            level = (level + 7) % 256;
            BrightnessPass::new(level)
                .resolve_mode(BrightnessMode::Normal, &mut state, &resolver, &config)
                .resolve_fragments(&registry, &state)
                .assemble(&mut registry, &state, &symbols, &config)
                .unwrap()
                .into_transaction()
        });
    });
}

criterion_group!(benches, bench_frame, bench_assemble, bench_brightness_pass);
criterion_main!(benches);
