//! Live panel operating state
//!
//! One [`PanelRuntimeState`] per panel instance. Flows outside the engine
//! (refresh-rate switches, temperature polling, AOD entry) update it; the
//! brightness resolver writes the values it resolves back into it; the
//! symbol callbacks read it when a command's payload is patched.

use std::collections::BTreeMap;
use std::string::String;
use std::vec::Vec;

use panel_platform::Revision;

use crate::brightness::CommandTable;

/// Link timing family a refresh rate runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SotMode {
    /// Normal-speed timing (`NS`).
    #[default]
    Normal,
    /// High-speed timing (`HS`).
    HighSpeed,
    /// Pseudo high-speed timing (`PHS`).
    PseudoHighSpeed,
}

/// Variable refresh rate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VrrState {
    /// Current refresh rate, Hz.
    pub refresh_rate: u32,
    /// Timing family.
    pub sot: SotMode,
    /// A refresh-rate switch is in progress.
    pub changing: bool,
    /// Low-frequency-drive limits are being updated.
    pub lfd_updating: bool,
}

impl Default for VrrState {
    fn default() -> Self {
        Self {
            refresh_rate: 60,
            sot: SotMode::Normal,
            changing: false,
            lfd_updating: false,
        }
    }
}

/// Low-frequency drive limits, in tenths of a hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LfdState {
    /// The panel supports low-frequency drive.
    pub supported: bool,
    /// Upper drive frequency ×10.
    pub max_tenths: u32,
    /// Lower drive frequency ×10.
    pub min_tenths: u32,
}

/// Image-retention compensation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrcMode {
    /// Moderate compensation (default).
    #[default]
    Moderato,
    /// Flat gamma.
    Flat,
    /// Flat gamma with zero offset.
    FlatZ,
}

/// A named panel resolution, e.g. `FHD` = 1080×2340.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedResolution {
    /// Name as written in command scripts.
    pub name: String,
    /// Horizontal active pixels.
    pub h_active: u32,
    /// Vertical active pixels.
    pub v_active: u32,
}

/// Power/link status checked before every send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    /// The panel is logically connected.
    pub attached: bool,
    /// The panel is powered.
    pub powered: bool,
    /// The panel stopped responding (reads are skipped).
    pub dead: bool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            attached: true,
            powered: true,
            dead: false,
        }
    }
}

/// Everything the resolver and symbol callbacks read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRuntimeState {
    // ── Brightness ──
    /// Requested backlight level.
    pub bl_level: u32,
    /// Resolved register command index.
    pub cmd_index: u32,
    /// Resolved luminance, candela.
    pub candela: u32,
    /// Brightness register value for normal/HBM.
    pub wrdisbv: u16,
    /// Brightness register value in low-power (AOD) mode.
    pub hlpm_wrdisbv: u16,
    /// Low-power mode luminance, nits.
    pub hlpm_candela: u32,
    /// Boost request level; HBM at max level needs this at the threshold.
    pub boost_level: u8,
    /// Table values resolved for the current level.
    pub resolved: BTreeMap<CommandTable, Vec<i64>>,

    // ── Modes ──
    /// Low-power (AOD) mode active.
    pub lpm: bool,
    /// Head-mounted mode active.
    pub hmt: bool,
    /// High-brightness mode active after the last send.
    pub hbm: bool,
    /// Head-mounted low-persistence enabled.
    pub hmt_low_persistence: bool,

    // ── ACL ──
    /// ACL requested.
    pub acl_on: bool,
    /// Thermal (SIOP) throttling requested.
    pub siop: bool,
    /// Gradual ACL setting: 0 off, 1 normal, 2 30%, 3 15%.
    pub gradual_acl: u8,

    // ── Timing ──
    /// Variable refresh rate.
    pub vrr: VrrState,
    /// Low-frequency drive.
    pub lfd: LfdState,
    /// Link clock, MHz.
    pub clock_mhz: u32,
    /// Link clock table index.
    pub clock_id: u32,
    /// Oscillator table index.
    pub osc_id: u32,
    /// Horizontal active pixels.
    pub h_active: u32,
    /// Vertical active pixels.
    pub v_active: u32,
    /// Resolution names scripts may refer to.
    pub resolutions: Vec<NamedResolution>,

    // ── Panel features ──
    /// Image-retention compensation mode.
    pub irc_mode: IrcMode,
    /// Display output is on.
    pub display_on: bool,
    /// First brightness change after display-on.
    pub first_high_level: bool,
    /// Dimming-curve (DIA) disabled.
    pub dia_off: bool,
    /// Night dimming active.
    pub night_dim: bool,
    /// Early tearing-effect signal enabled.
    pub early_te: bool,
    /// Fingerprint mask state changed and was applied.
    pub finger_mask_updated: bool,
    /// Analog offset compensation on.
    pub analog_offset_on: bool,
    /// Panel temperature, °C.
    pub temperature: i8,
    /// Hardware revision.
    pub revision: Revision,
    /// OTP bytes read at probe, keyed by `(register, offset)`.
    pub otp: BTreeMap<(u8, u16), u8>,

    /// Power/link status.
    pub link: LinkState,
}

impl Default for PanelRuntimeState {
    fn default() -> Self {
        Self {
            bl_level: 0,
            cmd_index: 0,
            candela: 0,
            wrdisbv: 0,
            hlpm_wrdisbv: 0,
            hlpm_candela: 0,
            boost_level: 0,
            resolved: BTreeMap::new(),
            lpm: false,
            hmt: false,
            hbm: false,
            hmt_low_persistence: true,
            acl_on: false,
            siop: false,
            gradual_acl: 1,
            vrr: VrrState::default(),
            lfd: LfdState::default(),
            clock_mhz: 0,
            clock_id: 0,
            osc_id: 0,
            h_active: 0,
            v_active: 0,
            resolutions: Vec::new(),
            irc_mode: IrcMode::default(),
            display_on: true,
            first_high_level: false,
            dia_off: false,
            night_dim: false,
            early_te: false,
            finger_mask_updated: false,
            analog_offset_on: false,
            temperature: 25,
            revision: Revision::A,
            otp: BTreeMap::new(),
            link: LinkState::default(),
        }
    }
}

impl PanelRuntimeState {
    /// Values resolved from `table` for the current level.
    pub fn table_values(&self, table: CommandTable) -> Option<&[i64]> {
        self.resolved.get(&table).map(Vec::as_slice)
    }

    /// ACL percentage currently in force.
    pub fn acl_percent(&self) -> u8 {
        match self.gradual_acl {
            2 => 30,
            _ if self.hbm => 8,
            3 => 15,
            _ => 8,
        }
    }

    /// Mode tag matched by `MODE` conditions.
    pub fn mode_tag(&self) -> &'static str {
        if self.lpm {
            "HLPM"
        } else if self.hmt {
            "HMT"
        } else if self.hbm {
            "HBM"
        } else {
            "NORMAL"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tag_priority() {
        let mut state = PanelRuntimeState::default();
        assert_eq!(state.mode_tag(), "NORMAL");
        state.hbm = true;
        assert_eq!(state.mode_tag(), "HBM");
        state.hmt = true;
        assert_eq!(state.mode_tag(), "HMT");
        state.lpm = true;
        assert_eq!(state.mode_tag(), "HLPM");
    }

    #[test]
    fn acl_percent_follows_gradual_setting() {
        let mut state = PanelRuntimeState::default();
        assert_eq!(state.acl_percent(), 8);
        state.gradual_acl = 3;
        assert_eq!(state.acl_percent(), 15);
        state.hbm = true;
        assert_eq!(state.acl_percent(), 8);
        state.gradual_acl = 2;
        assert_eq!(state.acl_percent(), 30);
    }
}
