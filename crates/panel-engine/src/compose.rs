//! Brightness composition
//!
//! One brightness change is a short pipeline, expressed as a typestate so
//! the stages cannot be reordered:
//!
//! ```text
//! Idle ──resolve_mode──▶ ModeResolved ──resolve_fragments──▶ FragmentsResolved ──assemble──▶ Assembled
//! ```
//!
//! Mode resolution promotes a max-level request to HBM when boost is on,
//! then resolves candela and register values into the runtime state.
//! Fragment resolution picks the ordered fragment plan for the mode and
//! drops identifiers the panel does not configure. Assembly runs the patch
//! interpreter over each planned fragment and frames the result.
//!
//! All of it runs with the transmission lock held, so payload rewrites are
//! never observed half-done.

use std::vec::Vec;

use panel_platform::Revision;

use crate::assembler::{assemble, Framing, Part, Transaction, UnlockKeys};
use crate::brightness::{BrightnessMode, BrightnessResolver};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fragment::{FragmentId, FragmentRegistry};
use crate::interp::{self, Decision};
use crate::lookup::CandelaEntry;
use crate::state::PanelRuntimeState;
use crate::symbol::SymbolTable;

/// Longest fragment plan a brightness mode produces.
pub const MAX_PLAN: usize = 16;

/// Ordered fragment identifiers for one send.
pub type Plan = heapless::Vec<FragmentId, MAX_PLAN>;

/// Nothing resolved yet.
#[derive(Debug)]
pub struct Idle;

/// Mode chosen and brightness values written to state.
#[derive(Debug)]
pub struct ModeResolved {
    mode: BrightnessMode,
    entry: CandelaEntry,
}

/// Fragment plan chosen.
#[derive(Debug)]
pub struct FragmentsResolved {
    mode: BrightnessMode,
    entry: CandelaEntry,
    plan: Plan,
}

/// Transaction built and ready to dispatch.
#[derive(Debug)]
pub struct Assembled {
    mode: BrightnessMode,
    entry: CandelaEntry,
    transaction: Transaction,
}

/// One brightness change in flight.
#[derive(Debug)]
pub struct BrightnessPass<S> {
    level: u32,
    stage: S,
}

impl BrightnessPass<Idle> {
    /// Start a pass for `level`.
    pub fn new(level: u32) -> Self {
        Self { level, stage: Idle }
    }

    /// Pick the operating mode and resolve brightness values into `state`.
    ///
    /// A request at the maximum level with boost at or above the
    /// threshold is served in HBM. Levels above the maximum are clamped.
    pub fn resolve_mode(
        self,
        requested: BrightnessMode,
        state: &mut PanelRuntimeState,
        resolver: &BrightnessResolver,
        config: &EngineConfig,
    ) -> BrightnessPass<ModeResolved> {
        let level = if self.level > config.max_level {
            tracing::warn!(level = self.level, max = config.max_level, "level clamped");
            config.max_level
        } else {
            self.level
        };
        let mode = match requested {
            BrightnessMode::Normal
                if level >= config.max_level && state.boost_level >= config.boost_threshold =>
            {
                BrightnessMode::Hbm
            }
            other => other,
        };
        let entry = resolver.apply(state, level, mode);
        BrightnessPass {
            level,
            stage: ModeResolved { mode, entry },
        }
    }
}

impl BrightnessPass<ModeResolved> {
    /// Mode the pass resolved to.
    pub fn mode(&self) -> BrightnessMode {
        self.stage.mode
    }

    /// Choose the fragments for the mode, in send order.
    pub fn resolve_fragments(
        self,
        registry: &FragmentRegistry,
        state: &PanelRuntimeState,
    ) -> BrightnessPass<FragmentsResolved> {
        let ModeResolved { mode, entry } = self.stage;
        let mut plan = Plan::new();
        for id in fragment_order(mode, state) {
            if !registry.contains(id, state.revision) {
                continue;
            }
            if plan.push(id).is_err() {
                tracing::error!(fragment = id.name(), "brightness plan full");
                break;
            }
        }
        tracing::debug!(?mode, fragments = plan.len(), "fragments resolved");
        BrightnessPass {
            level: self.level,
            stage: FragmentsResolved { mode, entry, plan },
        }
    }
}

/// Fragment order for `mode`, before filtering by what is configured.
pub fn fragment_order(mode: BrightnessMode, state: &PanelRuntimeState) -> Vec<FragmentId> {
    match mode {
        BrightnessMode::Normal => {
            let mut order = Vec::with_capacity(10);
            if state.hbm {
                order.push(FragmentId::HbmOff);
            }
            order.push(FragmentId::Aid);
            if state.acl_on || state.siop {
                order.extend([FragmentId::AclOn, FragmentId::AclPercent]);
            } else {
                order.push(FragmentId::AclOff);
            }
            order.extend([
                FragmentId::Elvss,
                FragmentId::ElvssTemperature1,
                FragmentId::ElvssTemperature2,
                FragmentId::Vint,
                FragmentId::Gamma,
            ]);
            order
        }
        // Already boosted: nothing to change.
        BrightnessMode::Hbm if state.hbm => Vec::new(),
        BrightnessMode::Hbm => vec![FragmentId::HbmGamma, FragmentId::HbmEtc],
        BrightnessMode::Hmt => vec![
            FragmentId::HmtAid,
            FragmentId::HmtElvss,
            FragmentId::HmtVint,
            FragmentId::HmtGamma,
        ],
        BrightnessMode::Aod => vec![FragmentId::AodBrightness],
    }
}

impl BrightnessPass<FragmentsResolved> {
    /// Planned fragments.
    pub fn plan(&self) -> &[FragmentId] {
        &self.stage.plan
    }

    /// Patch and assemble the planned fragments.
    pub fn assemble(
        self,
        registry: &mut FragmentRegistry,
        state: &PanelRuntimeState,
        symbols: &SymbolTable,
        config: &EngineConfig,
    ) -> Result<BrightnessPass<Assembled>, EngineError> {
        let FragmentsResolved { mode, entry, plan } = self.stage;
        let transaction = build_transaction(registry, state, symbols, config, &plan)?;
        Ok(BrightnessPass {
            level: self.level,
            stage: Assembled {
                mode,
                entry,
                transaction,
            },
        })
    }
}

impl BrightnessPass<Assembled> {
    /// Level after clamping.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Mode the transaction was built for.
    pub fn mode(&self) -> BrightnessMode {
        self.stage.mode
    }

    /// Resolved candela-map entry.
    pub fn entry(&self) -> CandelaEntry {
        self.stage.entry
    }

    /// Built transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.stage.transaction
    }

    /// Consume into the transaction.
    pub fn into_transaction(self) -> Transaction {
        self.stage.transaction
    }
}

/// Run the interpreter over `ids` and assemble what survives.
///
/// Reads are dropped while the panel is flagged dead.
pub fn build_transaction(
    registry: &mut FragmentRegistry,
    state: &PanelRuntimeState,
    symbols: &SymbolTable,
    config: &EngineConfig,
    ids: &[FragmentId],
) -> Result<Transaction, EngineError> {
    let rev: Revision = state.revision;
    let mut masks: Vec<Vec<bool>> = Vec::with_capacity(ids.len());
    for &id in ids {
        let Some(fragment) = registry.select_mut(id, rev) else {
            masks.push(Vec::new());
            continue;
        };
        let keep = fragment
            .commands
            .iter_mut()
            .map(|command| {
                if state.link.dead && command.descriptor().data_type.is_read() {
                    tracing::debug!(fragment = id.name(), "panel dead, read skipped");
                    return false;
                }
                interp::apply(command, state, symbols) == Decision::Send
            })
            .collect();
        masks.push(keep);
    }

    let registry: &FragmentRegistry = registry;
    let parts: Vec<Part<'_>> = ids
        .iter()
        .zip(masks)
        .filter_map(|(&id, keep)| {
            registry
                .select(id, rev)
                .map(|fragment| Part { fragment, keep })
        })
        .collect();
    let framing = if config.single_transmission {
        Framing::Batched
    } else {
        Framing::Individual
    };
    assemble(
        &parts,
        &UnlockKeys::select(registry, rev),
        config.max_packets,
        framing,
    )
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use panel_platform::PropertyMap;

    fn config() -> EngineConfig {
        EngineConfig {
            revision_count: 1,
            max_level: 255,
            ..EngineConfig::default()
        }
    }

    fn props() -> PropertyMap {
        let mut props = PropertyMap::new();
        props
            .set_text("panel,candela_map_table_revA", "0 0 127 100\n1 128 255 420")
            .set_text("panel,aid_map_table_revA", "0 0x10\n128 0x20")
            .set_text("panel,aid_tx_cmds_revA", "W B1 0xXX\nUPDATE AID")
            .set_text("panel,acl_off_tx_cmds_revA", "W 55 00")
            .set_text("panel,acl_on_tx_cmds_revA", "W 55 02")
            .set_text("panel,gamma_tx_cmds_revA", "W CA 01 02")
            .set_text("panel,hbm_gamma_tx_cmds_revA", "W CA FF FF")
            .set_text("panel,hbm_off_tx_cmds_revA", "W 53 20");
        props
    }

    struct Fixture {
        config: EngineConfig,
        resolver: BrightnessResolver,
        registry: FragmentRegistry,
        symbols: SymbolTable,
        state: PanelRuntimeState,
    }

    fn fixture() -> Fixture {
        let config = config();
        let props = props();
        let symbols = SymbolTable::common();
        Fixture {
            resolver: BrightnessResolver::load(&props, &config).expect("tables"),
            registry: FragmentRegistry::load(&props, &config, &symbols).expect("fragments"),
            symbols,
            state: PanelRuntimeState::default(),
            config,
        }
    }

    fn run(f: &mut Fixture, level: u32, mode: BrightnessMode) -> BrightnessPass<Assembled> {
        BrightnessPass::new(level)
            .resolve_mode(mode, &mut f.state, &f.resolver, &f.config)
            .resolve_fragments(&f.registry, &f.state)
            .assemble(&mut f.registry, &f.state, &f.symbols, &f.config)
            .expect("assembles")
    }

    #[test]
    fn normal_pass_patches_aid_and_orders_fragments() {
        let mut f = fixture();
        let pass = run(&mut f, 200, BrightnessMode::Normal);
        assert_eq!(pass.mode(), BrightnessMode::Normal);
        assert_eq!(
            pass.transaction().fragments(),
            [FragmentId::Aid, FragmentId::AclOff, FragmentId::Gamma]
        );
        let aid = pass.transaction().descriptors().first().expect("aid");
        assert_eq!(aid.payload, [0xB1, 0x20]);
        assert_eq!(pass.entry().candela, 420);
    }

    #[test]
    fn acl_request_selects_acl_on() {
        let mut f = fixture();
        f.state.acl_on = true;
        let pass = run(&mut f, 10, BrightnessMode::Normal);
        assert!(pass.transaction().fragments().contains(&FragmentId::AclOn));
        assert!(!pass.transaction().fragments().contains(&FragmentId::AclOff));
    }

    #[test]
    fn boost_at_max_level_goes_hbm() {
        let mut f = fixture();
        f.state.boost_level = 6;
        let pass = run(&mut f, 255, BrightnessMode::Normal);
        assert_eq!(pass.mode(), BrightnessMode::Hbm);
        assert_eq!(pass.transaction().fragments(), [FragmentId::HbmGamma]);

        f.state.boost_level = 5;
        assert_eq!(run(&mut f, 255, BrightnessMode::Normal).mode(), BrightnessMode::Normal);
    }

    #[test]
    fn hbm_already_active_sends_nothing() {
        let mut f = fixture();
        f.state.hbm = true;
        let pass = run(&mut f, 255, BrightnessMode::Hbm);
        assert!(pass.transaction().is_empty());
        assert_eq!(pass.transaction().fragment_count(), 0);
    }

    #[test]
    fn leaving_hbm_sends_hbm_off_first() {
        let mut f = fixture();
        f.state.hbm = true;
        let pass = run(&mut f, 10, BrightnessMode::Normal);
        assert_eq!(pass.transaction().fragments().first(), Some(&FragmentId::HbmOff));
    }

    #[test]
    fn level_above_max_is_clamped() {
        let mut f = fixture();
        let pass = run(&mut f, 4000, BrightnessMode::Normal);
        assert_eq!(pass.level(), 255);
    }

    #[test]
    fn unconfigured_mode_plan_is_empty() {
        let mut f = fixture();
        let pass = run(&mut f, 10, BrightnessMode::Hmt);
        assert!(pass.transaction().is_empty());
    }
}
