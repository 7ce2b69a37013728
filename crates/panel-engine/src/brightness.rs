//! Brightness resolver
//!
//! Maps a requested backlight level to register values for one operating
//! mode and hardware revision:
//!
//! 1. The mode's [`CandelaMap`] gives `(cmd_index, candela)`. A level the
//!    map does not cover resolves to the configured safe default.
//! 2. In HMT with low persistence off, the HMT candela is re-anchored on
//!    the normal map: the first normal row at or above it supplies the
//!    index, so perceived luminance stays put across the switch.
//! 3. Every loaded [`CommandMap`] is sampled at the level and the values
//!    are written into [`PanelRuntimeState::resolved`] for the update
//!    symbols (`UPDATE AID`, `UPDATE ELVSS`, …).

use std::collections::BTreeMap;
use std::vec::Vec;

use panel_platform::{PropertySource, Revision};

use crate::config::{EngineConfig, SafeDefault};
use crate::error::EngineError;
use crate::lookup::{CandelaEntry, CandelaMap, CommandMap};
use crate::state::PanelRuntimeState;
use crate::table::{load_revisions, Requirement};

/// Cells per binary command-map row: `[level, value]`.
const COMMAND_MAP_FIELDS: usize = 2;

/// Operating mode a brightness request resolves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BrightnessMode {
    /// Interpolated normal range.
    #[default]
    Normal,
    /// High-brightness boost.
    Hbm,
    /// Head-mounted display.
    Hmt,
    /// Always-on display (low-power mode).
    Aod,
}

impl BrightnessMode {
    /// Every mode.
    pub const ALL: [Self; 4] = [Self::Normal, Self::Hbm, Self::Hmt, Self::Aod];

    /// Candela-map property stem.
    pub fn candela_stem(self) -> &'static str {
        match self {
            Self::Normal => "candela_map_table",
            Self::Hbm => "hbm_candela_map_table",
            Self::Hmt => "hmt_candela_map_table",
            Self::Aod => "aod_candela_map_table",
        }
    }

    fn requirement(self) -> Requirement {
        match self {
            Self::Normal => Requirement::Required,
            Self::Hbm | Self::Hmt | Self::Aod => Requirement::Optional,
        }
    }
}

/// Per-level register tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandTable {
    /// AID (emission duty).
    Aid,
    /// ACL.
    Acl,
    /// VINT voltage.
    Vint,
    /// ELVSS voltage.
    Elvss,
    /// Low-temperature ELVSS compensation.
    ElvssTemperature,
    /// Brightness register.
    Wrdisbv,
    /// Low-power brightness register.
    HlpmWrdisbv,
    /// ACL offset.
    AclOffset,
    /// IRC offset.
    IrcOffset,
}

impl CommandTable {
    /// Every table.
    pub const ALL: [Self; 9] = [
        Self::Aid,
        Self::Acl,
        Self::Vint,
        Self::Elvss,
        Self::ElvssTemperature,
        Self::Wrdisbv,
        Self::HlpmWrdisbv,
        Self::AclOffset,
        Self::IrcOffset,
    ];

    /// Property stem.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Aid => "aid_map_table",
            Self::Acl => "acl_map_table",
            Self::Vint => "vint_map_table",
            Self::Elvss => "elvss_map_table",
            Self::ElvssTemperature => "elvss_temp_map_table",
            Self::Wrdisbv => "wrdisbv_map_table",
            Self::HlpmWrdisbv => "hlpm_wrdisbv_map_table",
            Self::AclOffset => "acl_offset_map_table",
            Self::IrcOffset => "irc_offset_map_table",
        }
    }
}

/// Candela and command maps for every mode and revision.
#[derive(Debug, Clone, Default)]
pub struct BrightnessResolver {
    candela: BTreeMap<BrightnessMode, Vec<CandelaMap>>,
    commands: BTreeMap<CommandTable, Vec<CommandMap>>,
    safe_default: SafeDefault,
}

/// Pick the entry for `rev`, or the last loaded revision past the range.
fn per_revision<T>(tables: &[T], rev: Revision) -> Option<&T> {
    tables.get(rev.index()).or_else(|| tables.last())
}

impl BrightnessResolver {
    /// Load every candela and command map.
    ///
    /// The normal candela map is required at revision A; the rest are
    /// optional and load empty when absent.
    pub fn load<P: PropertySource + ?Sized>(
        props: &P,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut resolver = Self {
            safe_default: config.safe_default,
            ..Self::default()
        };

        for mode in BrightnessMode::ALL {
            let stem = mode.candela_stem();
            let raws = load_revisions(props, config, stem, CandelaMap::FIELDS, mode.requirement())?;
            let maps = config
                .revisions()
                .zip(raws)
                .map(|(rev, raw)| CandelaMap::build(&config.revision_key(stem, rev), raw))
                .collect::<Result<Vec<_>, _>>()?;
            resolver.candela.insert(mode, maps);
        }

        for table in CommandTable::ALL {
            let stem = table.stem();
            let raws =
                load_revisions(props, config, stem, COMMAND_MAP_FIELDS, Requirement::Optional)?;
            let maps = config
                .revisions()
                .zip(raws)
                .map(|(rev, raw)| CommandMap::build(&config.revision_key(stem, rev), raw))
                .collect::<Result<Vec<_>, _>>()?;
            resolver.commands.insert(table, maps);
        }

        tracing::info!(
            revisions = config.revision_count,
            normal_rows = resolver
                .candela_map(BrightnessMode::Normal, Revision::A)
                .map_or(0, CandelaMap::len),
            "brightness tables loaded"
        );
        Ok(resolver)
    }

    /// Candela map for `mode` at `rev`. Absent optional modes resolve
    /// through the normal map.
    pub fn candela_map(&self, mode: BrightnessMode, rev: Revision) -> Option<&CandelaMap> {
        let own = self
            .candela
            .get(&mode)
            .and_then(|maps| per_revision(maps, rev))
            .filter(|map| !map.is_empty());
        own.or_else(|| {
            self.candela
                .get(&BrightnessMode::Normal)
                .and_then(|maps| per_revision(maps, rev))
                .filter(|map| !map.is_empty())
        })
    }

    /// Command map for `table` at `rev`, if one was loaded.
    pub fn command_map(&self, table: CommandTable, rev: Revision) -> Option<&CommandMap> {
        self.commands
            .get(&table)
            .and_then(|maps| per_revision(maps, rev))
            .filter(|map| !map.is_empty())
    }

    fn fallback(&self) -> CandelaEntry {
        CandelaEntry {
            index: usize::try_from(self.safe_default.cmd_index).unwrap_or(0),
            cmd_index: self.safe_default.cmd_index,
            candela: self.safe_default.candela,
        }
    }

    /// Resolve `level` in `mode` at `rev`. Levels outside the map resolve
    /// to the safe default.
    pub fn resolve(&self, level: u32, mode: BrightnessMode, rev: Revision) -> CandelaEntry {
        let entry = self
            .candela_map(mode, rev)
            .and_then(|map| map.lookup(level));
        entry.unwrap_or_else(|| {
            tracing::warn!(level, ?mode, "level outside candela map, using safe default");
            self.fallback()
        })
    }

    /// Resolve a row index chosen elsewhere instead of a level.
    pub fn resolve_index(
        &self,
        index: usize,
        mode: BrightnessMode,
        rev: Revision,
    ) -> Option<CandelaEntry> {
        self.candela_map(mode, rev)?.entry(index)
    }

    /// Normal-map row index whose candela first reaches `candela`.
    pub fn override_index(&self, candela: u32, rev: Revision) -> Option<usize> {
        self.candela_map(BrightnessMode::Normal, rev)?
            .nearest_at_or_above(candela)
            .map(|entry| entry.index)
    }

    /// Resolve `level` and write the results into `state`.
    pub fn apply(
        &self,
        state: &mut PanelRuntimeState,
        level: u32,
        mode: BrightnessMode,
    ) -> CandelaEntry {
        let rev = state.revision;
        let mut entry = self.resolve(level, mode, rev);

        if mode == BrightnessMode::Hmt && !state.hmt_low_persistence {
            let anchored = self
                .override_index(entry.candela, rev)
                .and_then(|index| self.resolve_index(index, BrightnessMode::Normal, rev));
            if let Some(anchored) = anchored {
                tracing::debug!(hmt_candela = entry.candela, index = anchored.index, "HMT override");
                entry = CandelaEntry {
                    candela: entry.candela,
                    ..anchored
                };
            }
        }

        state.resolved.clear();
        for table in CommandTable::ALL {
            if let Some(map) = self.command_map(table, rev) {
                state.resolved.insert(table, map.values(level));
            }
        }

        let register = |table: CommandTable| {
            state
                .table_values(table)
                .and_then(<[i64]>::first)
                .and_then(|&v| u16::try_from(v).ok())
                .unwrap_or_else(|| u16::try_from(level).unwrap_or(u16::MAX))
        };
        let wrdisbv = register(CommandTable::Wrdisbv);
        let hlpm_wrdisbv = register(CommandTable::HlpmWrdisbv);
        if mode == BrightnessMode::Aod {
            state.hlpm_wrdisbv = hlpm_wrdisbv;
            state.hlpm_candela = entry.candela;
        } else {
            state.wrdisbv = wrdisbv;
            state.bl_level = level;
            state.cmd_index = entry.cmd_index;
            state.candela = entry.candela;
        }

        tracing::info!(
            level,
            ?mode,
            cmd_index = entry.cmd_index,
            candela = entry.candela,
            "brightness resolved"
        );
        entry
    }
}
