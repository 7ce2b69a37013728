//! `cargo xtask inspect`: load a panel from JSON fixtures and print what a
//! brightness change (or a single fragment) would put on the bus.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use panel_engine::{BrightnessMode, EngineConfig, FragmentId, Outcome, Panel};
use panel_platform::mocks::{MockBus, Transmission};
use panel_platform::{PropertyMap, Revision, TransmissionSpeed};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// JSON property file: `{"key": {"text": "..."} | {"bytes": [..]} | {"flag": true}}`
    #[arg(long)]
    props: PathBuf,
    /// JSON engine configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backlight level to resolve
    #[arg(long, default_value_t = 128)]
    level: u32,
    /// Requested brightness mode
    #[arg(long, value_enum, default_value_t = ModeArg::Normal)]
    mode: ModeArg,
    /// Hardware revision letter
    #[arg(long, default_value_t = 'A')]
    revision: char,
    /// Boost level; at the threshold a max-level request goes HBM
    #[arg(long, default_value_t = 0)]
    boost: u8,
    /// Send this fragment (kebab name, e.g. `gct-enter`) instead of a brightness change
    #[arg(long)]
    fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Normal,
    Hbm,
    Hmt,
    Aod,
}

impl From<ModeArg> for BrightnessMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => Self::Normal,
            ModeArg::Hbm => Self::Hbm,
            ModeArg::Hmt => Self::Hmt,
            ModeArg::Aod => Self::Aod,
        }
    }
}

pub fn run(args: &Args) -> Result<()> {
    let props = load_props(&args.props)?;
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let revision = Revision::from_letter(args.revision)
        .with_context(|| format!("Invalid revision `{}`", args.revision))?;

    let panel: Panel<MockBus> =
        Panel::load(props, config).map_err(|e| anyhow!("Failed to load panel: {e}"))?;
    let bus = MockBus::new();
    panel.attach_transport(bus.clone());
    panel.update_state(|state| {
        state.revision = revision;
        state.boost_level = args.boost;
    });

    let outcome = match &args.fragment {
        Some(name) => {
            let id = FragmentId::from_name(name)
                .with_context(|| format!("Unknown fragment `{name}`"))?;
            panel.send_fragment(id)
        }
        None => panel.compose_and_send_brightness(args.level, args.mode.into()),
    }
    .map_err(|e| anyhow!("Assembly failed: {e}"))?;

    println!();
    if args.fragment.is_none() {
        let state = panel.state();
        println!("{}", "Resolved brightness".cyan().bold());
        println!("  level       {}", state.bl_level);
        println!("  candela     {}", state.candela);
        println!("  cmd_index   {}", state.cmd_index);
        println!("  wrdisbv     0x{:04X}", state.wrdisbv);
        println!("  mode tag    {}", state.mode_tag());
        for (table, values) in &state.resolved {
            println!("  {:<11} {:?}", table.stem().trim_end_matches("_map_table"), values);
        }
        println!();
    }

    println!("{}", outcome_line(&outcome));
    for transmission in bus.transmissions() {
        print!("{}", render(&transmission));
    }
    println!();
    Ok(())
}

fn load_props(path: &Path) -> Result<PropertyMap> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    EngineConfig::from_json(&text).map_err(|e| anyhow!("{}: {e}", path.display()))
}

fn outcome_line(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Sent(bytes) => format!("✓ Sent {bytes} bytes").green().to_string(),
        Outcome::Skipped(cause) => format!("⚠ Skipped: {cause:?}").yellow().to_string(),
        Outcome::Dropped(err) => format!("✗ Dropped: {err}").red().to_string(),
    }
}

/// One line per descriptor: type, last flag, payload, waits.
fn render(transmission: &Transmission) -> String {
    let speed = match transmission.speed {
        TransmissionSpeed::LowPower => "LP",
        TransmissionSpeed::HighSpeed => "HS",
    };
    let mut out = String::new();
    for d in &transmission.descriptors {
        let _ = write!(out, "  [{speed}] {:02X}", d.data_type.as_u8());
        out.push_str(if d.last { " last" } else { "     " });
        for byte in &d.payload {
            let _ = write!(out, " {byte:02X}");
        }
        if d.data_type.is_read() {
            let _ = write!(out, "  rx {} @{}", d.rx_len, d.rx_offset);
        }
        if d.wait_ms > 0 {
            let _ = write!(out, "  wait {}ms", d.wait_ms);
        }
        if d.wait_frames > 0 {
            let _ = write!(out, "  wait {} frames", d.wait_frames);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_platform::{DataType, Descriptor};
    use std::io::Write;

    #[test]
    fn render_marks_last_and_waits() {
        let mut first = Descriptor::write(DataType::GenericLongWrite, vec![0xB1, 0x20]);
        first.wait_ms = 5;
        let mut second = Descriptor::write(DataType::DcsShortWrite, vec![0x29]);
        second.last = true;
        let text = render(&Transmission {
            descriptors: vec![first, second],
            speed: TransmissionSpeed::HighSpeed,
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["  [HS] 29      B1 20  wait 5ms", "  [HS] 05 last 29"]);
    }

    #[test]
    fn props_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"panel,gamma_tx_cmds_revA": {{"text": "W CA 01"}}, "panel,gamma_tx_cmds_revA_lp": {{"flag": true}}}}"#
        )
        .unwrap();
        let props = load_props(file.path()).unwrap();
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn unreadable_props_has_context() {
        let err = load_props(Path::new("/nonexistent/props.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
