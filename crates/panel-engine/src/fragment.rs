//! Command fragment registry
//!
//! A fragment is one logical feature adjustment ("set AID", "ACL on") for
//! one hardware revision: an ordered list of commands plus the link speed
//! it goes out at. Fragments are loaded once from the property store:
//!
//! ```text
//! <prefix><stem>_rev<X>              command set (binary DCS or text script)
//! <prefix><stem>_rev<X>_lp           flag: send in low-power mode (scripts)
//! <prefix><stem>_rev<X>_state        "dsi_hs_mode" selects high speed (binary)
//! <prefix><stem>_rev<X>_level1_key   flag: wrap in level-1 unlock
//! <prefix><stem>_rev<X>_level2_key   flag: wrap in level-2 unlock
//! ```
//!
//! Fragments live in one arena; each identifier maps every revision to an
//! arena slot. A revision with no command set shares the previous
//! revision's slot, so fallback never duplicates payload buffers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::vec::Vec;

use panel_platform::{DataType, Descriptor, PropertySource, Revision, TransmissionSpeed};

use crate::config::EngineConfig;
use crate::dcs;
use crate::error::EngineError;
use crate::interp::ConditionalOp;
use crate::script;
use crate::symbol::{SymbolTable, UpdateSymbol};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Known command-set identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FragmentId {
    // ── Register unlock wrappers ──
    /// Level-1 register unlock.
    Level1KeyEnable,
    /// Level-1 register lock.
    Level1KeyDisable,
    /// Level-2 register unlock.
    Level2KeyEnable,
    /// Level-2 register lock.
    Level2KeyDisable,

    // ── Power ──
    /// Display output on.
    DisplayOn,
    /// Display output off.
    DisplayOff,
    /// Enter low-power (AOD) mode.
    LpmOn,
    /// Leave low-power (AOD) mode.
    LpmOff,

    // ── Normal brightness ──
    /// Leave HBM before a normal-range update.
    HbmOff,
    /// AID (emission duty) for the current level.
    Aid,
    /// ACL enable.
    AclOn,
    /// ACL percentage.
    AclPercent,
    /// ACL disable.
    AclOff,
    /// ELVSS voltage.
    Elvss,
    /// Low-temperature ELVSS compensation, first stage.
    ElvssTemperature1,
    /// Low-temperature ELVSS compensation, second stage.
    ElvssTemperature2,
    /// VINT voltage.
    Vint,
    /// Gamma for the current level.
    Gamma,

    // ── HBM ──
    /// HBM gamma.
    HbmGamma,
    /// HBM ELVSS and the rest.
    HbmEtc,

    // ── Head-mounted ──
    /// HMT AID.
    HmtAid,
    /// HMT ELVSS.
    HmtElvss,
    /// HMT VINT.
    HmtVint,
    /// HMT gamma.
    HmtGamma,

    // ── AOD ──
    /// Low-power mode brightness.
    AodBrightness,

    // ── Gram checksum / self-mask ──
    /// Enter gram checksum test.
    GctEnter,
    /// Leave gram checksum test.
    GctExit,
    /// Read gram checksum.
    GctChecksum,
    /// Self-mask image upload.
    SelfMaskImage,

    // ── Reads ──
    /// DDI identification read.
    DdiId,
}

impl FragmentId {
    /// Every identifier, in load order.
    pub const ALL: [Self; 30] = [
        Self::Level1KeyEnable,
        Self::Level1KeyDisable,
        Self::Level2KeyEnable,
        Self::Level2KeyDisable,
        Self::DisplayOn,
        Self::DisplayOff,
        Self::LpmOn,
        Self::LpmOff,
        Self::HbmOff,
        Self::Aid,
        Self::AclOn,
        Self::AclPercent,
        Self::AclOff,
        Self::Elvss,
        Self::ElvssTemperature1,
        Self::ElvssTemperature2,
        Self::Vint,
        Self::Gamma,
        Self::HbmGamma,
        Self::HbmEtc,
        Self::HmtAid,
        Self::HmtElvss,
        Self::HmtVint,
        Self::HmtGamma,
        Self::AodBrightness,
        Self::GctEnter,
        Self::GctExit,
        Self::GctChecksum,
        Self::SelfMaskImage,
        Self::DdiId,
    ];

    /// Kebab-case name used in logs and tooling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Level1KeyEnable => "level1-key-enable",
            Self::Level1KeyDisable => "level1-key-disable",
            Self::Level2KeyEnable => "level2-key-enable",
            Self::Level2KeyDisable => "level2-key-disable",
            Self::DisplayOn => "display-on",
            Self::DisplayOff => "display-off",
            Self::LpmOn => "lpm-on",
            Self::LpmOff => "lpm-off",
            Self::HbmOff => "hbm-off",
            Self::Aid => "brightness-aid",
            Self::AclOn => "acl-on",
            Self::AclPercent => "acl-percent",
            Self::AclOff => "acl-off",
            Self::Elvss => "elvss",
            Self::ElvssTemperature1 => "elvss-temperature-1",
            Self::ElvssTemperature2 => "elvss-temperature-2",
            Self::Vint => "vint",
            Self::Gamma => "gamma",
            Self::HbmGamma => "hbm-gamma",
            Self::HbmEtc => "hbm-etc",
            Self::HmtAid => "hmt-aid",
            Self::HmtElvss => "hmt-elvss",
            Self::HmtVint => "hmt-vint",
            Self::HmtGamma => "hmt-gamma",
            Self::AodBrightness => "aod-brightness",
            Self::GctEnter => "gct-enter",
            Self::GctExit => "gct-exit",
            Self::GctChecksum => "gct-checksum",
            Self::SelfMaskImage => "self-mask-image",
            Self::DdiId => "ddi-id",
        }
    }

    /// Property stem, without prefix or revision suffix.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Level1KeyEnable => "level1_key_enable_tx_cmds",
            Self::Level1KeyDisable => "level1_key_disable_tx_cmds",
            Self::Level2KeyEnable => "level2_key_enable_tx_cmds",
            Self::Level2KeyDisable => "level2_key_disable_tx_cmds",
            Self::DisplayOn => "display_on_tx_cmds",
            Self::DisplayOff => "display_off_tx_cmds",
            Self::LpmOn => "lpm_on_tx_cmds",
            Self::LpmOff => "lpm_off_tx_cmds",
            Self::HbmOff => "hbm_off_tx_cmds",
            Self::Aid => "aid_tx_cmds",
            Self::AclOn => "acl_on_tx_cmds",
            Self::AclPercent => "acl_percent_tx_cmds",
            Self::AclOff => "acl_off_tx_cmds",
            Self::Elvss => "elvss_tx_cmds",
            Self::ElvssTemperature1 => "elvss_lowtemp_tx_cmds",
            Self::ElvssTemperature2 => "elvss_lowtemp2_tx_cmds",
            Self::Vint => "vint_tx_cmds",
            Self::Gamma => "gamma_tx_cmds",
            Self::HbmGamma => "hbm_gamma_tx_cmds",
            Self::HbmEtc => "hbm_etc_tx_cmds",
            Self::HmtAid => "hmt_aid_tx_cmds",
            Self::HmtElvss => "hmt_elvss_tx_cmds",
            Self::HmtVint => "hmt_vint_tx_cmds",
            Self::HmtGamma => "hmt_gamma_tx_cmds",
            Self::AodBrightness => "lpm_brightness_tx_cmds",
            Self::GctEnter => "gct_enter_tx_cmds",
            Self::GctExit => "gct_exit_tx_cmds",
            Self::GctChecksum => "gct_checksum_rx_cmds",
            Self::SelfMaskImage => "self_mask_img_tx_cmds",
            Self::DdiId => "ddi_id_rx_cmds",
        }
    }

    /// Look up an identifier by its kebab-case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// A command whose payload never changes after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDescriptor {
    /// Wire descriptor.
    pub descriptor: Descriptor,
    /// Block conditions gating the command.
    pub ops: Vec<ConditionalOp>,
}

/// A command with `0xXX` positions the interpreter may rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableDescriptor {
    /// Wire descriptor; its payload is the live buffer.
    pub descriptor: Descriptor,
    /// `true` at each rewritable payload position.
    pub updatable: Vec<bool>,
    /// Global-parameter offset set by a preceding `B0` write.
    pub gpara_offset: u16,
    /// Conditions, candidates and update hooks, evaluated in order.
    pub ops: Vec<ConditionalOp>,
}

/// One command within a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDescriptor {
    /// Payload fixed at load.
    Static(StaticDescriptor),
    /// Payload rewritten at send time.
    Mutable(MutableDescriptor),
}

impl CommandDescriptor {
    /// Static command with no conditions.
    pub fn fixed(descriptor: Descriptor) -> Self {
        Self::Static(StaticDescriptor {
            descriptor,
            ops: Vec::new(),
        })
    }

    /// Wire descriptor.
    pub fn descriptor(&self) -> &Descriptor {
        match self {
            Self::Static(s) => &s.descriptor,
            Self::Mutable(m) => &m.descriptor,
        }
    }

    /// Mutable access to the wire descriptor (waits, framing).
    pub fn descriptor_mut(&mut self) -> &mut Descriptor {
        match self {
            Self::Static(s) => &mut s.descriptor,
            Self::Mutable(m) => &mut m.descriptor,
        }
    }

    /// Attached ops.
    pub fn ops(&self) -> &[ConditionalOp] {
        match self {
            Self::Static(s) => &s.ops,
            Self::Mutable(m) => &m.ops,
        }
    }

    /// `true` for commands with rewritable positions.
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::Mutable(_))
    }
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// A named, revision-specific command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFragment {
    /// Identifier.
    pub id: FragmentId,
    /// Revision the commands were loaded for.
    pub revision: Revision,
    /// Link speed.
    pub speed: TransmissionSpeed,
    /// Commands in send order.
    pub commands: Vec<CommandDescriptor>,
    /// Wrap in level-1 unlock/lock.
    pub level1_key: bool,
    /// Wrap in level-2 unlock/lock.
    pub level2_key: bool,
}

impl CommandFragment {
    /// Fragment of static commands with no unlock wrapping.
    pub fn new(id: FragmentId, speed: TransmissionSpeed, commands: Vec<CommandDescriptor>) -> Self {
        Self {
            id,
            revision: Revision::A,
            speed,
            commands,
            level1_key: false,
            level2_key: false,
        }
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// `true` if the fragment has no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// `true` if any command is a read.
    pub fn has_read(&self) -> bool {
        self.commands.iter().any(|c| c.descriptor().data_type.is_read())
    }
}

/// Identifier × revision → fragment.
#[derive(Debug, Clone, Default)]
pub struct FragmentRegistry {
    arena: Vec<CommandFragment>,
    slots: BTreeMap<FragmentId, Vec<Option<usize>>>,
}

impl FragmentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every known identifier for every configured revision.
    pub fn load<P: PropertySource + ?Sized>(
        props: &P,
        config: &EngineConfig,
        symbols: &SymbolTable,
    ) -> Result<Self, EngineError> {
        let mut registry = Self::new();
        for id in FragmentId::ALL {
            for rev in config.revisions() {
                let key = config.revision_key(id.stem(), rev);
                match load_one(props, &key, id, rev, symbols)? {
                    Some(fragment) => {
                        registry.insert(rev, fragment);
                    }
                    None => registry.inherit(id, rev),
                }
            }
        }
        tracing::info!(
            fragments = registry.arena.len(),
            identifiers = registry.slots.values().filter(|s| s.iter().any(Option::is_some)).count(),
            "command sets loaded"
        );
        Ok(registry)
    }

    /// Store `fragment` for `rev`, replacing any previous entry.
    pub fn insert(&mut self, rev: Revision, fragment: CommandFragment) -> usize {
        let id = fragment.id;
        let index = self.arena.len();
        self.arena.push(fragment);
        let slots = self.slots.entry(id).or_default();
        if slots.len() <= rev.index() {
            slots.resize(rev.index().saturating_add(1), None);
        }
        if let Some(slot) = slots.get_mut(rev.index()) {
            *slot = Some(index);
        }
        index
    }

    /// Point `rev` at whatever the previous revision uses.
    fn inherit(&mut self, id: FragmentId, rev: Revision) {
        let slots = self.slots.entry(id).or_default();
        let previous = rev
            .previous()
            .and_then(|p| slots.get(p.index()).copied().flatten());
        if slots.len() <= rev.index() {
            slots.resize(rev.index().saturating_add(1), None);
        }
        if let Some(slot) = slots.get_mut(rev.index()) {
            *slot = previous;
        }
    }

    fn index_of(&self, id: FragmentId, rev: Revision) -> Option<usize> {
        let slots = self.slots.get(&id)?;
        // Revisions past the loaded range use the last loaded one.
        slots
            .get(rev.index())
            .or_else(|| slots.last())
            .copied()
            .flatten()
    }

    /// Fragment for `id` at `rev`; `None` means the feature is absent.
    pub fn select(&self, id: FragmentId, rev: Revision) -> Option<&CommandFragment> {
        self.arena.get(self.index_of(id, rev)?)
    }

    /// Mutable fragment for `id` at `rev`.
    pub fn select_mut(&mut self, id: FragmentId, rev: Revision) -> Option<&mut CommandFragment> {
        let index = self.index_of(id, rev)?;
        self.arena.get_mut(index)
    }

    /// `true` if `id` resolves for `rev`.
    pub fn contains(&self, id: FragmentId, rev: Revision) -> bool {
        self.index_of(id, rev).is_some()
    }

    /// Number of distinct fragments stored.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// `true` when nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// `(register, offset)` pairs that `UPDATE OTP` commands will read from
    /// [`PanelRuntimeState::otp`](crate::state::PanelRuntimeState::otp).
    pub fn otp_requirements(&self) -> BTreeSet<(u8, u16)> {
        let mut needed = BTreeSet::new();
        for fragment in &self.arena {
            for command in &fragment.commands {
                let CommandDescriptor::Mutable(m) = command else {
                    continue;
                };
                if !m.ops.contains(&ConditionalOp::Update(UpdateSymbol::Otp)) {
                    continue;
                }
                let Some(&addr) = m.descriptor.payload.first() else {
                    continue;
                };
                let positions = m.updatable.iter().enumerate().filter(|&(pos, &u)| u && pos > 0);
                for (pos, _) in positions {
                    let delta = u16::try_from(pos.saturating_sub(1)).unwrap_or(u16::MAX);
                    needed.insert((addr, m.gpara_offset.saturating_add(delta)));
                }
            }
        }
        needed
    }
}

fn load_one<P: PropertySource + ?Sized>(
    props: &P,
    key: &str,
    id: FragmentId,
    rev: Revision,
    symbols: &SymbolTable,
) -> Result<Option<CommandFragment>, EngineError> {
    let flag = |suffix: &str| props.flag(&format!("{key}_{suffix}"));

    let (commands, speed) = if let Some(text) = props.text(key) {
        let parsed = script::parse(key, text, symbols)?;
        let single_read = parsed.len() == 1
            && parsed
                .first()
                .is_some_and(|c| c.descriptor().data_type.is_read());
        let speed = if flag("lp") || single_read {
            TransmissionSpeed::LowPower
        } else {
            TransmissionSpeed::HighSpeed
        };
        (parsed, speed)
    } else if let Some(bytes) = props.bytes(key) {
        let speed = match props.text(&format!("{key}_state")) {
            Some("dsi_hs_mode") => TransmissionSpeed::HighSpeed,
            _ => TransmissionSpeed::LowPower,
        };
        (dcs::parse(key, bytes)?, speed)
    } else {
        return Ok(None);
    };

    tracing::debug!(key, fragment = id.name(), commands = commands.len(), "loaded command set");
    Ok(Some(CommandFragment {
        id,
        revision: rev,
        speed,
        commands,
        level1_key: flag("level1_key"),
        level2_key: flag("level2_key"),
    }))
}

/// Single short-write descriptor for building fragments in code.
pub fn short_write(payload: Vec<u8>) -> CommandDescriptor {
    let data_type = if payload.len() <= 1 {
        DataType::DcsShortWrite
    } else {
        DataType::GenericLongWrite
    };
    CommandDescriptor::fixed(Descriptor::write(data_type, payload))
}
