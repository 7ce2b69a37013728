//! Live-state symbols
//!
//! Command scripts name state in two places: `IF <SYMBOL> <value>`
//! conditions and `UPDATE <SYMBOL>` rewrites. Both vocabularies are closed
//! enums; a [`SymbolTable`] maps each symbol to the function that evaluates
//! it. Scripts are resolved against the table at load time, so a symbol
//! that is unknown or has no registered function fails loading instead of
//! silently never matching.
//!
//! Names and values compare case-insensitively and exactly.

use std::collections::BTreeMap;
use std::string::ToString;

use crate::brightness::CommandTable;
use crate::error::SymbolError;
use crate::state::{IrcMode, PanelRuntimeState, SotMode};

// ---------------------------------------------------------------------------
// Symbol vocabularies
// ---------------------------------------------------------------------------

/// Symbols usable in `IF` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchSymbol {
    /// Refresh rate with optional timing suffix: `120HS`, `60NS`, `PHS`, `CHANGING`, `UPDATE`.
    Vrr,
    /// Low-frequency drive upper bound, Hz (`10.5`).
    LfdMax,
    /// Low-frequency drive lower bound, Hz.
    LfdMin,
    /// Link clock, MHz.
    Clock,
    /// Link clock table index.
    ClockId,
    /// Oscillator table index.
    OscId,
    /// Named resolution.
    Resolution,
    /// Image-retention compensation mode.
    Irc,
    /// `HLPM`, `HMT`, `HBM` or `NORMAL`.
    Mode,
    /// ACL percentage (`8%`) or `ON`/`OFF`.
    Acl,
    /// Low-power mode luminance, `60nit`.
    Brightness,
    /// `ON` when display output is on.
    DisplayOn,
    /// Smooth dimming `ON`/`OFF`.
    SmoothDim,
    /// Dimming curve `ON`/`OFF`.
    Dia,
    /// Night dimming `ON`/`OFF`.
    NightDim,
    /// Early TE `ON`/`OFF`.
    EarlyTe,
    /// `UPDATED` once the fingerprint mask changed.
    FingerMask,
    /// Revision range, `AtoC`, or a single letter.
    Revision,
    /// Analog offset compensation active.
    AnalogOffset,
}

impl MatchSymbol {
    /// Every condition symbol.
    pub const ALL: [Self; 19] = [
        Self::Vrr,
        Self::LfdMax,
        Self::LfdMin,
        Self::Clock,
        Self::ClockId,
        Self::OscId,
        Self::Resolution,
        Self::Irc,
        Self::Mode,
        Self::Acl,
        Self::Brightness,
        Self::DisplayOn,
        Self::SmoothDim,
        Self::Dia,
        Self::NightDim,
        Self::EarlyTe,
        Self::FingerMask,
        Self::Revision,
        Self::AnalogOffset,
    ];

    /// Script spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vrr => "VRR",
            Self::LfdMax => "LFDMAX",
            Self::LfdMin => "LFDMIN",
            Self::Clock => "CLOCK",
            Self::ClockId => "CLOCK_ID",
            Self::OscId => "OSC_ID",
            Self::Resolution => "RESOLUTION",
            Self::Irc => "IRC",
            Self::Mode => "MODE",
            Self::Acl => "ACL",
            Self::Brightness => "BRIGHTNESS",
            Self::DisplayOn => "DISPLAY_ON",
            Self::SmoothDim => "SMOOTH_DIM",
            Self::Dia => "DIA",
            Self::NightDim => "NIGHT_DIM",
            Self::EarlyTe => "EARLY_TE",
            Self::FingerMask => "FINGER_MASK",
            Self::Revision => "REVISION",
            Self::AnalogOffset => "ANALOG_OFFSET",
        }
    }

    /// Parse a script spelling. `REV` is accepted for `REVISION`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("REV") {
            return Some(Self::Revision);
        }
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

/// Symbols usable in `UPDATE` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateSymbol {
    /// Brightness register, two bytes big-endian.
    Brightness,
    /// Low-power brightness register, two bytes big-endian.
    HlpmBrightness,
    /// Temperature, sign in bit 7.
    Tset,
    /// Stored OTP bytes.
    Otp,
    /// ACL offset for the current level.
    AclOffset,
    /// IRC offset for the current level.
    IrcOffset,
    /// AID values for the current level.
    Aid,
    /// ELVSS values for the current level.
    Elvss,
    /// VINT values for the current level.
    Vint,
    /// ACL values for the current level.
    Acl,
}

impl UpdateSymbol {
    /// Every update symbol.
    pub const ALL: [Self; 10] = [
        Self::Brightness,
        Self::HlpmBrightness,
        Self::Tset,
        Self::Otp,
        Self::AclOffset,
        Self::IrcOffset,
        Self::Aid,
        Self::Elvss,
        Self::Vint,
        Self::Acl,
    ];

    /// Script spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "BRIGHTNESS",
            Self::HlpmBrightness => "HLPMBRIGHTNESS",
            Self::Tset => "TSET",
            Self::Otp => "OTP",
            Self::AclOffset => "ACL_OFFSET",
            Self::IrcOffset => "IRC_OFFSET",
            Self::Aid => "AID",
            Self::Elvss => "ELVSS",
            Self::Vint => "VINT",
            Self::Acl => "ACL",
        }
    }

    /// Parse a script spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// The payload an update function rewrites.
#[derive(Debug)]
pub struct UpdateTarget<'a> {
    /// Live payload; byte 0 is the register address.
    pub buffer: &'a mut [u8],
    /// `true` at each `0xXX` position.
    pub updatable: &'a [bool],
    /// Global-parameter offset preceding this command.
    pub gpara_offset: u16,
}

impl UpdateTarget<'_> {
    /// Indices of rewritable positions, in order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.updatable
            .iter()
            .enumerate()
            .filter(|&(_, &u)| u)
            .map(|(i, _)| i)
    }

    fn write(&mut self, index: usize, value: u8) {
        if let Some(byte) = self.buffer.get_mut(index) {
            *byte = value;
        }
    }
}

/// Condition evaluator: does the live state match `value`?
pub type MatchFn = fn(&PanelRuntimeState, &str) -> Result<bool, SymbolError>;

/// Payload rewriter.
pub type UpdateFn = fn(&PanelRuntimeState, &mut UpdateTarget<'_>) -> Result<(), SymbolError>;

/// Symbol → function registry.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    matchers: BTreeMap<MatchSymbol, MatchFn>,
    updaters: BTreeMap<UpdateSymbol, UpdateFn>,
}

impl SymbolTable {
    /// Table with no registrations.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the common evaluator for every symbol.
    pub fn common() -> Self {
        let mut table = Self::empty();
        table.register_match(MatchSymbol::Vrr, match_vrr);
        table.register_match(MatchSymbol::LfdMax, match_lfd_max);
        table.register_match(MatchSymbol::LfdMin, match_lfd_min);
        table.register_match(MatchSymbol::Clock, match_clock);
        table.register_match(MatchSymbol::ClockId, match_clock_id);
        table.register_match(MatchSymbol::OscId, match_osc_id);
        table.register_match(MatchSymbol::Resolution, match_resolution);
        table.register_match(MatchSymbol::Irc, match_irc);
        table.register_match(MatchSymbol::Mode, match_mode);
        table.register_match(MatchSymbol::Acl, match_acl);
        table.register_match(MatchSymbol::Brightness, match_hlpm_brightness);
        table.register_match(MatchSymbol::DisplayOn, match_display_on);
        table.register_match(MatchSymbol::SmoothDim, match_smooth_dim);
        table.register_match(MatchSymbol::Dia, match_dia);
        table.register_match(MatchSymbol::NightDim, match_night_dim);
        table.register_match(MatchSymbol::EarlyTe, match_early_te);
        table.register_match(MatchSymbol::FingerMask, match_finger_mask);
        table.register_match(MatchSymbol::Revision, match_revision);
        table.register_match(MatchSymbol::AnalogOffset, match_analog_offset);

        table.register_update(UpdateSymbol::Brightness, update_brightness);
        table.register_update(UpdateSymbol::HlpmBrightness, update_hlpm_brightness);
        table.register_update(UpdateSymbol::Tset, update_tset);
        table.register_update(UpdateSymbol::Otp, update_otp);
        table.register_update(UpdateSymbol::AclOffset, update_acl_offset);
        table.register_update(UpdateSymbol::IrcOffset, update_irc_offset);
        table.register_update(UpdateSymbol::Aid, update_aid);
        table.register_update(UpdateSymbol::Elvss, update_elvss);
        table.register_update(UpdateSymbol::Vint, update_vint);
        table.register_update(UpdateSymbol::Acl, update_acl);
        table
    }

    /// Register or replace a condition evaluator. Returns the replaced one.
    pub fn register_match(&mut self, symbol: MatchSymbol, f: MatchFn) -> Option<MatchFn> {
        self.matchers.insert(symbol, f)
    }

    /// Register or replace an update function. Returns the replaced one.
    pub fn register_update(&mut self, symbol: UpdateSymbol, f: UpdateFn) -> Option<UpdateFn> {
        self.updaters.insert(symbol, f)
    }

    /// Resolve a condition name to a registered symbol.
    pub fn resolve_match(&self, name: &str) -> Option<MatchSymbol> {
        MatchSymbol::from_name(name).filter(|s| self.matchers.contains_key(s))
    }

    /// Resolve an update name to a registered symbol.
    pub fn resolve_update(&self, name: &str) -> Option<UpdateSymbol> {
        UpdateSymbol::from_name(name).filter(|s| self.updaters.contains_key(s))
    }

    /// Evaluate a condition.
    pub fn evaluate(
        &self,
        symbol: MatchSymbol,
        state: &PanelRuntimeState,
        value: &str,
    ) -> Result<bool, SymbolError> {
        let f = self
            .matchers
            .get(&symbol)
            .ok_or(SymbolError::Unavailable { symbol: symbol.name() })?;
        f(state, value)
    }

    /// Run an update.
    pub fn update(
        &self,
        symbol: UpdateSymbol,
        state: &PanelRuntimeState,
        target: &mut UpdateTarget<'_>,
    ) -> Result<(), SymbolError> {
        let f = self
            .updaters
            .get(&symbol)
            .ok_or(SymbolError::Unavailable { symbol: symbol.name() })?;
        f(state, target)
    }
}

// ---------------------------------------------------------------------------
// Condition evaluators
// ---------------------------------------------------------------------------

fn invalid(symbol: MatchSymbol, value: &str) -> SymbolError {
    SymbolError::InvalidValue {
        symbol: symbol.name(),
        value: value.to_string(),
    }
}

/// `ON` → `Some(true)`, `OFF` → `Some(false)`.
fn on_off(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("ON") {
        Some(true)
    } else if value.eq_ignore_ascii_case("OFF") {
        Some(false)
    } else {
        None
    }
}

/// Split leading decimal digits from a suffix.
fn split_number(value: &str) -> (Option<u32>, &str) {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, rest) = value.split_at(end);
    (digits.parse().ok(), rest)
}

fn match_vrr(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let (rate, suffix) = split_number(value);
    if let Some(rate) = rate.filter(|&r| r > 0) {
        if rate != state.vrr.refresh_rate {
            return Ok(false);
        }
    }
    if suffix.is_empty() {
        return Ok(true);
    }
    let sot = state.vrr.sot;
    let matched = if suffix.eq_ignore_ascii_case("NS") {
        sot == SotMode::Normal
    } else if suffix.eq_ignore_ascii_case("HS") {
        sot == SotMode::HighSpeed
    } else if suffix.eq_ignore_ascii_case("PHS") {
        sot == SotMode::PseudoHighSpeed
    } else if suffix.eq_ignore_ascii_case("CHANGING") {
        state.vrr.changing
    } else if suffix.eq_ignore_ascii_case("UPDATE") {
        state.vrr.changing || state.vrr.lfd_updating
    } else {
        return Err(invalid(MatchSymbol::Vrr, value));
    };
    Ok(matched)
}

/// `10.5` → `105`.
fn lfd_tenths(symbol: MatchSymbol, value: &str) -> Result<u32, SymbolError> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, "0"));
    let whole: u32 = whole.parse().map_err(|_| invalid(symbol, value))?;
    let frac: u32 = frac
        .get(..1)
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| invalid(symbol, value))?;
    whole
        .checked_mul(10)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| invalid(symbol, value))
}

fn match_lfd_max(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    if !state.lfd.supported {
        tracing::debug!("LFD not supported");
        return Ok(false);
    }
    Ok(lfd_tenths(MatchSymbol::LfdMax, value)? == state.lfd.max_tenths)
}

fn match_lfd_min(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    if !state.lfd.supported {
        tracing::debug!("LFD not supported");
        return Ok(false);
    }
    Ok(lfd_tenths(MatchSymbol::LfdMin, value)? == state.lfd.min_tenths)
}

fn parse_u32(symbol: MatchSymbol, value: &str) -> Result<u32, SymbolError> {
    value.parse().map_err(|_| invalid(symbol, value))
}

fn match_clock(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    Ok(parse_u32(MatchSymbol::Clock, value)? == state.clock_mhz)
}

fn match_clock_id(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    Ok(parse_u32(MatchSymbol::ClockId, value)? == state.clock_id)
}

fn match_osc_id(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    Ok(parse_u32(MatchSymbol::OscId, value)? == state.osc_id)
}

fn match_resolution(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    Ok(state.resolutions.iter().any(|r| {
        r.name.eq_ignore_ascii_case(value)
            && r.h_active == state.h_active
            && r.v_active == state.v_active
    }))
}

fn match_irc(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let wanted = if value.eq_ignore_ascii_case("MODERATO") {
        IrcMode::Moderato
    } else if value.eq_ignore_ascii_case("FLAT") {
        IrcMode::Flat
    } else if value.eq_ignore_ascii_case("FLAT_Z") {
        IrcMode::FlatZ
    } else {
        return Err(invalid(MatchSymbol::Irc, value));
    };
    Ok(state.irc_mode == wanted)
}

fn match_mode(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    if ["HLPM", "HMT", "HBM", "NORMAL"]
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(value))
    {
        Ok(state.mode_tag().eq_ignore_ascii_case(value))
    } else {
        Err(invalid(MatchSymbol::Mode, value))
    }
}

fn match_acl(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    if let (Some(percent), "%") = split_number(value) {
        return Ok(percent == u32::from(state.acl_percent()));
    }
    on_off(value)
        .map(|on| on == state.acl_on)
        .ok_or_else(|| invalid(MatchSymbol::Acl, value))
}

fn match_hlpm_brightness(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    match split_number(value) {
        (Some(nit), unit) if unit.eq_ignore_ascii_case("nit") => Ok(nit == state.hlpm_candela),
        _ => Err(invalid(MatchSymbol::Brightness, value)),
    }
}

fn match_display_on(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    Ok(value.eq_ignore_ascii_case("ON") == state.display_on)
}

fn match_smooth_dim(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let wants_dim_off = !on_off(value).ok_or_else(|| invalid(MatchSymbol::SmoothDim, value))?;
    let dim_off = !state.display_on || state.first_high_level;
    Ok(wants_dim_off == dim_off)
}

fn match_dia(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let wants_off = !on_off(value).ok_or_else(|| invalid(MatchSymbol::Dia, value))?;
    Ok(wants_off == state.dia_off)
}

fn match_night_dim(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let on = on_off(value).ok_or_else(|| invalid(MatchSymbol::NightDim, value))?;
    Ok(on == state.night_dim)
}

fn match_early_te(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let on = on_off(value).ok_or_else(|| invalid(MatchSymbol::EarlyTe, value))?;
    Ok(on == state.early_te)
}

fn match_finger_mask(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    if value.eq_ignore_ascii_case("UPDATED") {
        Ok(state.finger_mask_updated)
    } else {
        Err(invalid(MatchSymbol::FingerMask, value))
    }
}

fn match_revision(state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
    let letter = |c: Option<char>| {
        c.and_then(panel_platform::Revision::from_letter)
            .ok_or_else(|| invalid(MatchSymbol::Revision, value))
    };
    let mut chars = value.chars();
    let (from, to) = match value.len() {
        1 => {
            let rev = letter(chars.next())?;
            (rev, rev)
        }
        4 if value.get(1..3).is_some_and(|to| to.eq_ignore_ascii_case("to")) => {
            (letter(chars.next())?, letter(chars.nth(2))?)
        }
        _ => return Err(invalid(MatchSymbol::Revision, value)),
    };
    Ok(from <= state.revision && state.revision <= to)
}

fn match_analog_offset(state: &PanelRuntimeState, _value: &str) -> Result<bool, SymbolError> {
    Ok(state.analog_offset_on)
}

// ---------------------------------------------------------------------------
// Update functions
// ---------------------------------------------------------------------------

/// Write `value` big-endian at the first two-byte `0xXX` window.
fn write_be16(
    symbol: UpdateSymbol,
    target: &mut UpdateTarget<'_>,
    value: u16,
) -> Result<(), SymbolError> {
    let first = target.positions().next();
    let room = first.filter(|&i| i.saturating_add(1) < target.buffer.len());
    let Some(index) = room else {
        return Err(SymbolError::NoRoom {
            symbol: symbol.name(),
            needed: 2,
        });
    };
    let [hi, lo] = value.to_be_bytes();
    target.write(index, hi);
    target.write(index.saturating_add(1), lo);
    Ok(())
}

fn update_brightness(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    tracing::debug!(wrdisbv = state.wrdisbv, "update brightness");
    write_be16(UpdateSymbol::Brightness, target, state.wrdisbv)
}

fn update_hlpm_brightness(
    state: &PanelRuntimeState,
    target: &mut UpdateTarget<'_>,
) -> Result<(), SymbolError> {
    tracing::debug!(wrdisbv = state.hlpm_wrdisbv, "update hlpm brightness");
    write_be16(UpdateSymbol::HlpmBrightness, target, state.hlpm_wrdisbv)
}

fn update_tset(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    let t = state.temperature;
    let byte = if t > 0 {
        t.unsigned_abs()
    } else {
        0x80 | t.unsigned_abs()
    };
    let index = target.positions().next().ok_or(SymbolError::NoRoom {
        symbol: UpdateSymbol::Tset.name(),
        needed: 1,
    })?;
    target.write(index, byte);
    Ok(())
}

fn update_otp(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    let addr = target.buffer.first().copied().ok_or(SymbolError::NoRoom {
        symbol: UpdateSymbol::Otp.name(),
        needed: 1,
    })?;
    let positions: std::vec::Vec<usize> = target.positions().filter(|&i| i > 0).collect();
    for index in positions {
        let delta = u16::try_from(index.saturating_sub(1)).unwrap_or(u16::MAX);
        let offset = target.gpara_offset.saturating_add(delta);
        let value = state
            .otp
            .get(&(addr, offset))
            .copied()
            .ok_or(SymbolError::Unavailable {
                symbol: UpdateSymbol::Otp.name(),
            })?;
        target.write(index, value);
    }
    Ok(())
}

/// Successive `0xXX` positions take successive values of `table`.
fn write_table(
    symbol: UpdateSymbol,
    table: CommandTable,
    state: &PanelRuntimeState,
    target: &mut UpdateTarget<'_>,
) -> Result<(), SymbolError> {
    let values = state
        .table_values(table)
        .ok_or(SymbolError::Unavailable { symbol: symbol.name() })?;
    let positions: std::vec::Vec<usize> = target.positions().collect();
    for (index, &value) in positions.into_iter().zip(values) {
        let byte = u8::try_from(value).map_err(|_| SymbolError::InvalidValue {
            symbol: symbol.name(),
            value: value.to_string(),
        })?;
        target.write(index, byte);
    }
    Ok(())
}

/// First `0xXX` position takes the table's first value; absent table is a no-op.
fn write_offset(
    symbol: UpdateSymbol,
    table: CommandTable,
    state: &PanelRuntimeState,
    target: &mut UpdateTarget<'_>,
) -> Result<(), SymbolError> {
    let Some(&value) = state.table_values(table).and_then(<[i64]>::first) else {
        return Ok(());
    };
    let byte = u8::try_from(value).map_err(|_| SymbolError::InvalidValue {
        symbol: symbol.name(),
        value: value.to_string(),
    })?;
    let first = target.positions().next();
    if let Some(index) = first {
        target.write(index, byte);
    }
    Ok(())
}

fn update_acl_offset(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_offset(UpdateSymbol::AclOffset, CommandTable::AclOffset, state, target)
}

fn update_irc_offset(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_offset(UpdateSymbol::IrcOffset, CommandTable::IrcOffset, state, target)
}

fn update_aid(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_table(UpdateSymbol::Aid, CommandTable::Aid, state, target)
}

fn update_elvss(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_table(UpdateSymbol::Elvss, CommandTable::Elvss, state, target)
}

fn update_vint(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_table(UpdateSymbol::Vint, CommandTable::Vint, state, target)
}

fn update_acl(state: &PanelRuntimeState, target: &mut UpdateTarget<'_>) -> Result<(), SymbolError> {
    write_table(UpdateSymbol::Acl, CommandTable::Acl, state, target)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::state::NamedResolution;
    use panel_platform::Revision;

    fn eval(symbol: MatchSymbol, state: &PanelRuntimeState, value: &str) -> Result<bool, SymbolError> {
        SymbolTable::common().evaluate(symbol, state, value)
    }

    #[test]
    fn names_are_case_insensitive() {
        let table = SymbolTable::common();
        assert_eq!(table.resolve_match("vrr"), Some(MatchSymbol::Vrr));
        assert_eq!(table.resolve_match("Rev"), Some(MatchSymbol::Revision));
        assert_eq!(table.resolve_update("tset"), Some(UpdateSymbol::Tset));
        assert_eq!(table.resolve_match("WARP"), None);
        assert_eq!(SymbolTable::empty().resolve_match("VRR"), None);
    }

    #[test]
    fn vrr_rate_and_suffix() {
        let mut state = PanelRuntimeState::default();
        state.vrr.refresh_rate = 120;
        state.vrr.sot = SotMode::HighSpeed;
        assert_eq!(eval(MatchSymbol::Vrr, &state, "120HS"), Ok(true));
        assert_eq!(eval(MatchSymbol::Vrr, &state, "120"), Ok(true));
        assert_eq!(eval(MatchSymbol::Vrr, &state, "60HS"), Ok(false));
        assert_eq!(eval(MatchSymbol::Vrr, &state, "120NS"), Ok(false));
        assert_eq!(eval(MatchSymbol::Vrr, &state, "CHANGING"), Ok(false));
        assert!(eval(MatchSymbol::Vrr, &state, "120XS").is_err());
        // Exact suffixes only: a truncated suffix is not a prefix match.
        assert!(eval(MatchSymbol::Vrr, &state, "120H").is_err());
    }

    #[test]
    fn lfd_compares_tenths() {
        let mut state = PanelRuntimeState::default();
        assert_eq!(eval(MatchSymbol::LfdMax, &state, "10.5"), Ok(false));
        state.lfd = crate::state::LfdState {
            supported: true,
            max_tenths: 105,
            min_tenths: 10,
        };
        assert_eq!(eval(MatchSymbol::LfdMax, &state, "10.5"), Ok(true));
        assert_eq!(eval(MatchSymbol::LfdMin, &state, "1"), Ok(true));
        assert!(eval(MatchSymbol::LfdMin, &state, "x").is_err());
    }

    #[test]
    fn mode_matches_tag() {
        let mut state = PanelRuntimeState::default();
        assert_eq!(eval(MatchSymbol::Mode, &state, "normal"), Ok(true));
        state.hbm = true;
        assert_eq!(eval(MatchSymbol::Mode, &state, "HBM"), Ok(true));
        assert_eq!(eval(MatchSymbol::Mode, &state, "NORMAL"), Ok(false));
        assert!(eval(MatchSymbol::Mode, &state, "TURBO").is_err());
    }

    #[test]
    fn acl_percent_or_switch() {
        let mut state = PanelRuntimeState::default();
        state.gradual_acl = 2;
        state.acl_on = true;
        assert_eq!(eval(MatchSymbol::Acl, &state, "30%"), Ok(true));
        assert_eq!(eval(MatchSymbol::Acl, &state, "8%"), Ok(false));
        assert_eq!(eval(MatchSymbol::Acl, &state, "ON"), Ok(true));
        assert_eq!(eval(MatchSymbol::Acl, &state, "off"), Ok(false));
    }

    #[test]
    fn smooth_dim_off_before_display_on() {
        let mut state = PanelRuntimeState::default();
        assert_eq!(eval(MatchSymbol::SmoothDim, &state, "ON"), Ok(true));
        state.display_on = false;
        assert_eq!(eval(MatchSymbol::SmoothDim, &state, "OFF"), Ok(true));
        assert_eq!(eval(MatchSymbol::SmoothDim, &state, "ON"), Ok(false));
    }

    #[test]
    fn revision_ranges() {
        let mut state = PanelRuntimeState::default();
        state.revision = Revision::new(1);
        assert_eq!(eval(MatchSymbol::Revision, &state, "AtoC"), Ok(true));
        assert_eq!(eval(MatchSymbol::Revision, &state, "CtoZ"), Ok(false));
        assert_eq!(eval(MatchSymbol::Revision, &state, "B"), Ok(true));
        assert!(eval(MatchSymbol::Revision, &state, "A-C").is_err());
    }

    #[test]
    fn resolution_needs_matching_dimensions() {
        let mut state = PanelRuntimeState::default();
        state.resolutions.push(NamedResolution {
            name: "FHD".into(),
            h_active: 1080,
            v_active: 2340,
        });
        assert_eq!(eval(MatchSymbol::Resolution, &state, "FHD"), Ok(false));
        state.h_active = 1080;
        state.v_active = 2340;
        assert_eq!(eval(MatchSymbol::Resolution, &state, "fhd"), Ok(true));
    }

    #[test]
    fn hlpm_brightness_needs_nit_unit() {
        let mut state = PanelRuntimeState::default();
        state.hlpm_candela = 60;
        assert_eq!(eval(MatchSymbol::Brightness, &state, "60nit"), Ok(true));
        assert_eq!(eval(MatchSymbol::Brightness, &state, "30nit"), Ok(false));
        assert!(eval(MatchSymbol::Brightness, &state, "60").is_err());
    }

    #[test]
    fn brightness_writes_two_bytes_at_first_placeholder() {
        let mut state = PanelRuntimeState::default();
        state.wrdisbv = 0x03FF;
        let mut buffer = [0x51, 0x00, 0x00];
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, true],
            gpara_offset: 0,
        };
        SymbolTable::common()
            .update(UpdateSymbol::Brightness, &state, &mut target)
            .expect("room for two bytes");
        assert_eq!(buffer, [0x51, 0x03, 0xFF]);
    }

    #[test]
    fn brightness_without_room_fails() {
        let state = PanelRuntimeState::default();
        let mut buffer = [0x51, 0x00];
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true],
            gpara_offset: 0,
        };
        assert!(matches!(
            SymbolTable::common().update(UpdateSymbol::Brightness, &state, &mut target),
            Err(SymbolError::NoRoom { needed: 2, .. })
        ));
    }

    #[test]
    fn tset_encodes_sign_in_bit_seven() {
        let table = SymbolTable::common();
        let mut state = PanelRuntimeState::default();
        for (t, expected) in [(25i8, 25u8), (0, 0x80), (-10, 0x8A)] {
            state.temperature = t;
            let mut buffer = [0xB5, 0x00];
            let mut target = UpdateTarget {
                buffer: &mut buffer,
                updatable: &[false, true],
                gpara_offset: 0,
            };
            table
                .update(UpdateSymbol::Tset, &state, &mut target)
                .expect("tset");
            assert_eq!(buffer[1], expected, "temperature {t}");
        }
    }

    #[test]
    fn otp_reads_by_gpara_offset() {
        let mut state = PanelRuntimeState::default();
        state.otp.insert((0xB5, 0x10), 0xAA);
        state.otp.insert((0xB5, 0x11), 0xBB);
        let mut buffer = [0xB5, 0x00, 0x00];
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, true],
            gpara_offset: 0x10,
        };
        SymbolTable::common()
            .update(UpdateSymbol::Otp, &state, &mut target)
            .expect("otp present");
        assert_eq!(buffer, [0xB5, 0xAA, 0xBB]);
    }

    #[test]
    fn table_update_fills_successive_positions() {
        let mut state = PanelRuntimeState::default();
        state.resolved.insert(CommandTable::Aid, vec![0x12, 0x34]);
        let mut buffer = [0xB1, 0x00, 0x7F, 0x00];
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, false, true],
            gpara_offset: 0,
        };
        SymbolTable::common()
            .update(UpdateSymbol::Aid, &state, &mut target)
            .expect("aid values");
        assert_eq!(buffer, [0xB1, 0x12, 0x7F, 0x34]);
    }

    #[test]
    fn acl_offset_patches_first_placeholder() {
        let table = SymbolTable::common();
        let mut state = PanelRuntimeState::default();
        let mut buffer = [0x55, 0x00, 0x00];
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, true],
            gpara_offset: 0,
        };
        // No offset table resolved: nothing written.
        table
            .update(UpdateSymbol::AclOffset, &state, &mut target)
            .expect("absent table is a no-op");
        assert_eq!(buffer, [0x55, 0x00, 0x00]);

        state.resolved.insert(CommandTable::AclOffset, vec![0x2C, 0x99]);
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, true],
            gpara_offset: 0,
        };
        table
            .update(UpdateSymbol::AclOffset, &state, &mut target)
            .expect("offset written");
        assert_eq!(buffer, [0x55, 0x2C, 0x00]);

        state.resolved.insert(CommandTable::IrcOffset, vec![300]);
        let mut target = UpdateTarget {
            buffer: &mut buffer,
            updatable: &[false, true, true],
            gpara_offset: 0,
        };
        assert!(matches!(
            table.update(UpdateSymbol::IrcOffset, &state, &mut target),
            Err(SymbolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn registration_replaces_callback() {
        fn always(_: &PanelRuntimeState, _: &str) -> Result<bool, SymbolError> {
            Ok(true)
        }
        let mut table = SymbolTable::common();
        assert!(table.register_match(MatchSymbol::Mode, always).is_some());
        assert_eq!(
            table.evaluate(MatchSymbol::Mode, &PanelRuntimeState::default(), "anything"),
            Ok(true)
        );
    }
}
