use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// One rustdoc build. Each library is documented under the feature set it
/// ships with, so intra-doc links behind `cfg` are checked too.
struct Target {
    label: &'static str,
    package: &'static str,
    features: &'static [&'static str],
    no_default_features: bool,
}

const TARGETS: &[Target] = &[
    Target {
        label: "platform crate (no_std)",
        package: "panel-platform",
        features: &[],
        no_default_features: true,
    },
    Target {
        label: "platform crate (std + serde)",
        package: "panel-platform",
        features: &["std", "serde"],
        no_default_features: false,
    },
    Target {
        label: "engine",
        package: "panel-engine",
        features: &[],
        no_default_features: false,
    },
];

/// Broken intra-doc links and malformed doc blocks fail the build.
const DOC_LINTS: &str = "-D warnings";

/// `RUSTDOCFLAGS` with the doc lints added to whatever the caller set.
fn rustdoc_flags(existing: Option<&str>) -> String {
    match existing.map(str::trim) {
        Some(flags) if !flags.is_empty() => format!("{flags} {DOC_LINTS}"),
        _ => DOC_LINTS.to_string(),
    }
}

/// Arguments for one `cargo doc` run. Only the engine opens in a browser.
fn doc_args(target: &Target, open: bool) -> Vec<String> {
    let mut args: Vec<String> = ["doc", "--no-deps", "-p", target.package]
        .iter()
        .map(ToString::to_string)
        .collect();
    if target.no_default_features {
        args.push("--no-default-features".into());
    }
    if !target.features.is_empty() {
        args.push("--features".into());
        args.push(target.features.join(","));
    }
    if open && target.package == "panel-engine" {
        args.push("--open".into());
    }
    args
}

pub fn run(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Building documentation...".cyan().bold());
    println!();

    let total_start = Instant::now();
    let flags = rustdoc_flags(std::env::var("RUSTDOCFLAGS").ok().as_deref());

    for target in TARGETS {
        println!("{}", format!("  Documenting {}...", target.label).cyan());
        let start = Instant::now();

        let output = Command::new("cargo")
            .args(doc_args(target, open))
            .env("RUSTDOCFLAGS", &flags)
            .output()
            .with_context(|| format!("Failed to document {}", target.label))?;

        if !output.status.success() {
            eprintln!("{}", format!("  ✗ {} docs failed", target.label).red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            anyhow::bail!("{} documentation failed", target.label);
        }

        println!(
            "{}",
            format!(
                "  ✓ {} documented in {:.2}s",
                target.label,
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ Documentation built in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );

    if !open {
        println!();
        println!(
            "   {}",
            "Open target/doc/panel_engine/index.html in your browser".dimmed()
        );
        println!(
            "   {}",
            "Or run 'cargo run -p xtask -- doc --open'".dimmed()
        );
    }

    println!();

    Ok(())
}
