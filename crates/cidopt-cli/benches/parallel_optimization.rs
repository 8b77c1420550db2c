use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A shape hierarchy with `variants` concrete classes
fn generate_classes(out: &mut String, variants: usize) {
    out.push_str("classes:\n");
    out.push_str("  - name: Shape\n    kind: abstract\n    methods:\n      - name: area\n");
    for v in 0..variants {
        writeln!(
            out,
            "  - name: Shape{v}\n    base: Shape\n    methods:\n      - name: area\n        function: Shape{v}.area"
        )
        .unwrap();
    }
}

/// One unit per module; each builds two shapes and dispatches on both,
/// so half of the call sites stay polymorphic
fn generate_program(unit_count: usize, calls_per_unit: usize, variants: usize) -> String {
    let mut out = String::new();
    generate_classes(&mut out, variants);

    out.push_str("functions:\n");
    for v in 0..variants {
        writeln!(out, "  - name: Shape{v}.area\n    owner: Shape{v}").unwrap();
    }
    for u in 0..unit_count {
        writeln!(out, "  - name: module{u}.main\n    params: [flag]\n    body:").unwrap();
        for c in 0..calls_per_unit {
            let first = (u + c) % variants;
            let second = (u + c + 1) % variants;
            writeln!(
                out,
                "      - kind: let\n        name: a{c}\n        init: {{ kind: new, class: Shape{first} }}"
            )
            .unwrap();
            writeln!(
                out,
                "      - kind: let\n        name: b{c}\n        init:\n          kind: conditional\n          cond: {{ kind: local, name: flag }}\n          then: {{ kind: local, name: a{c} }}\n          else: {{ kind: new, class: Shape{second} }}"
            )
            .unwrap();
            for local in ["a", "b"] {
                writeln!(
                    out,
                    "      - kind: expr\n        value:\n          kind: virtual_call\n          receiver: {{ kind: local, name: {local}{c} }}\n          method: area\n          declaring: Shape"
                )
                .unwrap();
            }
        }
    }

    out.push_str("units:\n");
    for u in 0..unit_count {
        let mut functions = vec![format!("module{u}.main")];
        if u == 0 {
            functions.extend((0..variants).map(|v| format!("Shape{v}.area")));
        }
        writeln!(out, "  - name: module{u}\n    functions: [{}]", functions.join(", ")).unwrap();
    }
    out
}

fn write_program(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("program.yaml");
    fs::write(&path, contents).expect("Failed to write program");
    path
}

/// Run the cidopt binary on a program description
fn optimize_program(program_path: &Path, level: &str) -> Result<(), String> {
    use std::process::Command;

    let binary_path = env!("CARGO_BIN_EXE_cidopt");
    let output = Command::new(binary_path)
        .arg(program_path)
        .args(["-O", level, "--format", "json"])
        .output()
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(format!(
            "Optimization failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

/// Units are devirtualized on the rayon pool
fn benchmark_unit_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("unit_parallelism");
    group.sample_size(10);

    for unit_count in [1, 4, 16, 64] {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = write_program(&dir, &generate_program(unit_count, 20, 8));

        group.bench_with_input(BenchmarkId::new("units", unit_count), &path, |b, path| {
            b.iter(|| optimize_program(path, "2").expect("Optimization failed"));
        });
    }

    group.finish();
}

fn benchmark_optimization_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization_levels");
    group.sample_size(10);

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_program(&dir, &generate_program(16, 20, 8));

    for level in ["1", "2", "3"] {
        group.bench_with_input(BenchmarkId::new("level", level), &path, |b, path| {
            b.iter(|| optimize_program(path, level).expect("Optimization failed"));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_unit_count, benchmark_optimization_levels);
criterion_main!(benches);
