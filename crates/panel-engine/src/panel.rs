//! Panel facade
//!
//! [`Panel`] owns everything loaded for one display: the brightness tables,
//! the fragment registry, the symbol table and the dispatcher that
//! serialises sends. Higher-level flows (power sequencing, brightness
//! changes, image upload) talk to the panel only through this type.
//!
//! ```
//! use panel_engine::{BrightnessMode, EngineConfig, Outcome, Panel};
//! use panel_platform::mocks::MockBus;
//! use panel_platform::PropertyMap;
//!
//! let mut props = PropertyMap::new();
//! props
//!     .set_text("panel,candela_map_table_revA", "0 0 255 420")
//!     .set_text("panel,gamma_tx_cmds_revA", "W CA 01 02");
//!
//! let panel: Panel<MockBus> = Panel::load(props, EngineConfig::default()).unwrap();
//! let bus = MockBus::new();
//! panel.attach_transport(bus.clone());
//!
//! let outcome = panel.compose_and_send_brightness(128, BrightnessMode::Normal).unwrap();
//! assert!(matches!(outcome, Outcome::Sent(_)));
//! assert_eq!(bus.sent_count(), 1);
//! ```

use std::cell::Cell;
use std::collections::BTreeSet;

use panel_platform::{BusTransport, PropertyMap, PropertySource};

use crate::brightness::{BrightnessMode, BrightnessResolver};
use crate::compose::{build_transaction, BrightnessPass};
use crate::config::EngineConfig;
use crate::dispatch::{Channel, Dispatcher, ExclusiveGuard, Outcome, PanelChannel, SkipCause};
use crate::error::{EngineError, TableError};
use crate::fragment::{CommandFragment, FragmentId, FragmentRegistry};
use crate::lookup::CandelaMap;
use crate::state::PanelRuntimeState;
use crate::symbol::SymbolTable;
use crate::table::{self, RawTable};

/// One loaded panel.
#[derive(Debug)]
pub struct Panel<B, P = PropertyMap> {
    config: EngineConfig,
    props: P,
    symbols: SymbolTable,
    resolver: BrightnessResolver,
    dispatcher: Dispatcher<PanelChannel<B>>,
}

impl<B: BusTransport, P: PropertySource> Panel<B, P> {
    /// Load tables and command sets from `props` with the common symbols.
    pub fn load(props: P, config: EngineConfig) -> Result<Self, EngineError> {
        Self::load_with_symbols(props, config, SymbolTable::common())
    }

    /// Load with a caller-supplied symbol table.
    ///
    /// Scripts are validated against `symbols`, so every callback a model
    /// needs must be registered before this call.
    pub fn load_with_symbols(
        props: P,
        config: EngineConfig,
        symbols: SymbolTable,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let resolver = BrightnessResolver::load(&props, &config)?;
        let registry = FragmentRegistry::load(&props, &config, &symbols)?;

        let otp = registry.otp_requirements();
        if !otp.is_empty() {
            tracing::info!(bytes = otp.len(), "command sets need OTP values");
        }

        let channel = PanelChannel::new(registry, PanelRuntimeState::default());
        let dispatcher = Dispatcher::new(channel, &config);
        Ok(Self {
            config,
            props,
            symbols,
            resolver,
            dispatcher,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loaded brightness tables.
    pub fn resolver(&self) -> &BrightnessResolver {
        &self.resolver
    }

    /// Register the bus once the display backend is up. Returns the
    /// transport it replaced.
    pub fn attach_transport(&self, bus: B) -> Option<B> {
        self.dispatcher.with(|channel| channel.bus.replace(bus))
    }

    /// Unregister the bus.
    pub fn detach_transport(&self) -> Option<B> {
        self.dispatcher.with(|channel| channel.bus.take())
    }

    /// Mark the panel logically connected or disconnected.
    pub fn set_attached(&self, attached: bool) {
        self.update_state(|state| state.link.attached = attached);
    }

    /// Mark the panel powered or powered down.
    pub fn set_powered(&self, powered: bool) {
        self.update_state(|state| state.link.powered = powered);
    }

    /// Mutate the live state under the transmission lock.
    pub fn update_state<R>(&self, f: impl FnOnce(&mut PanelRuntimeState) -> R) -> R {
        self.dispatcher.with(|channel| f(&mut channel.state))
    }

    /// Snapshot of the live state.
    pub fn state(&self) -> PanelRuntimeState {
        self.dispatcher.with(|channel| channel.state.clone())
    }

    /// OTP `(register, offset)` pairs the loaded scripts read.
    pub fn otp_requirements(&self) -> BTreeSet<(u8, u16)> {
        self.dispatcher.with(|channel| channel.registry.otp_requirements())
    }

    /// Resolve `level` in `mode`, build the brightness transaction and send
    /// it.
    ///
    /// Configuration faults (packet overflow) come back as `Err` and nothing
    /// is sent. Hardware absence and link failures come back as
    /// [`Outcome::Skipped`] and [`Outcome::Dropped`]. The HBM flag follows
    /// the mode of the last transaction that reached the bus.
    pub fn compose_and_send_brightness(
        &self,
        level: u32,
        mode: BrightnessMode,
    ) -> Result<Outcome, EngineError> {
        let sent_mode = Cell::new(mode);
        let outcome = self.dispatcher.dispatch_with(
            &[],
            |channel| {
                let PanelChannel {
                    registry, state, ..
                } = channel;
                let pass = BrightnessPass::new(level)
                    .resolve_mode(mode, state, &self.resolver, &self.config)
                    .resolve_fragments(registry, state)
                    .assemble(registry, state, &self.symbols, &self.config)?;
                sent_mode.set(pass.mode());
                tracing::info!(
                    level = pass.level(),
                    mode = ?pass.mode(),
                    candela = pass.entry().candela,
                    cmd_index = pass.entry().cmd_index,
                    descriptors = pass.transaction().len(),
                    "brightness composed"
                );
                Ok(pass.into_transaction())
            },
            |channel, outcome| {
                if outcome.is_sent() {
                    channel.state.hbm = sent_mode.get() == BrightnessMode::Hbm;
                }
            },
        )?;
        Ok(outcome)
    }

    /// Copy of the fragment `id` resolves to for the current revision.
    pub fn select_fragment(&self, id: FragmentId) -> Option<CommandFragment> {
        self.dispatcher
            .with(|channel| channel.registry.select(id, channel.state.revision).cloned())
    }

    /// Parse the table under `key` (prefix included), with four fields per
    /// row for binary data.
    pub fn parse_table(&self, key: &str) -> Result<RawTable, TableError> {
        self.parse_table_with(key, CandelaMap::FIELDS)
    }

    /// Parse the table under `key`, with `fields` cells per row for binary
    /// data.
    pub fn parse_table_with(&self, key: &str, fields: usize) -> Result<RawTable, TableError> {
        table::parse(&self.props, key, fields)
    }

    /// Send one fragment with its unlock wrappers.
    ///
    /// An identifier the panel does not configure is a no-op,
    /// [`SkipCause::NotConfigured`].
    pub fn send_fragment(&self, id: FragmentId) -> Result<Outcome, EngineError> {
        self.dispatcher.with_admitted(&[id], |channel| self.send_on(channel, id))
    }

    /// Look up, build and transmit `id` in one critical section, so the
    /// revision cannot change between the lookup and the send.
    fn send_on(
        &self,
        channel: &mut PanelChannel<B>,
        id: FragmentId,
    ) -> Result<Outcome, EngineError> {
        if !channel.registry.contains(id, channel.state.revision) {
            tracing::debug!(fragment = id.name(), "fragment not configured");
            return Ok(Outcome::Skipped(SkipCause::NotConfigured(id)));
        }
        let transaction = build_transaction(
            &mut channel.registry,
            &channel.state,
            &self.symbols,
            &self.config,
            &[id],
        )?;
        Ok(channel.transmit(&transaction))
    }

    /// Hold off every other sender until the session drops, except those
    /// sending only fragments in `permits`.
    pub fn enter_exclusive(&self, permits: &[FragmentId]) -> ExclusiveSession<'_, B, P> {
        ExclusiveSession {
            panel: self,
            guard: self.dispatcher.enter_exclusive(permits),
        }
    }

    /// `true` while an exclusive session is open.
    pub fn is_exclusive(&self) -> bool {
        self.dispatcher.is_exclusive()
    }
}

/// Exclusive access to a panel, for image upload and checksum checks.
#[derive(Debug)]
#[must_use = "exclusive mode ends when the session drops"]
pub struct ExclusiveSession<'a, B: BusTransport, P> {
    panel: &'a Panel<B, P>,
    guard: ExclusiveGuard<'a, PanelChannel<B>>,
}

impl<B: BusTransport, P: PropertySource> ExclusiveSession<'_, B, P> {
    /// Send one fragment as the exclusive holder.
    pub fn send_fragment(&self, id: FragmentId) -> Result<Outcome, EngineError> {
        self.guard.with(|channel| self.panel.send_on(channel, id))
    }

    /// Mutate the live state without leaving exclusive mode.
    pub fn update_state<R>(&self, f: impl FnOnce(&mut PanelRuntimeState) -> R) -> R {
        self.guard.with(|channel| f(&mut channel.state))
    }
}
