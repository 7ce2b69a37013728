//! Conditional patch interpreter
//!
//! Each command may carry a flat list of [`ConditionalOp`]s built by the
//! script parser. Just before a send, [`apply`] walks that list against the
//! live [`PanelRuntimeState`] and either rewrites the payload in place or
//! decides the command must not go out this time.
//!
//! Scanning rules, in list order:
//!
//! - `IfBlock` false: the command is skipped. True: keep scanning.
//! - `If` true: the candidate becomes the payload and scanning stops.
//! - `Else`: reached only when no earlier `If` matched; its candidate
//!   becomes the payload and scanning stops.
//! - `Update`: the symbol's update function patches the `0xXX` positions
//!   and scanning stops.
//!
//! If the list runs out with no match the payload keeps whatever it held
//! after the previous send.

use std::string::String;
use std::vec::Vec;

use crate::error::SymbolError;
use crate::fragment::CommandDescriptor;
use crate::state::PanelRuntimeState;
use crate::symbol::{MatchSymbol, SymbolTable, UpdateSymbol, UpdateTarget};

/// How the conditions of one group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    /// Every condition must match.
    #[default]
    And,
    /// Any condition may match.
    Or,
}

/// `<SYMBOL> <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Symbol to evaluate.
    pub symbol: MatchSymbol,
    /// Comparison value as written.
    pub value: String,
}

/// Conditions gating one candidate or block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionGroup {
    /// Combination mode.
    pub combine: Combine,
    /// Conditions in script order.
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Group holding one condition.
    pub fn single(symbol: MatchSymbol, value: impl Into<String>) -> Self {
        Self {
            combine: Combine::And,
            conditions: vec![Condition {
                symbol,
                value: value.into(),
            }],
        }
    }

    /// Evaluate against `state`. An empty group matches.
    ///
    /// Evaluation stops at the first condition that decides the group: a
    /// mismatch under AND, a match under OR. Conditions after that point are
    /// never evaluated, so an invalid value there cannot fail the group.
    pub fn evaluate(
        &self,
        state: &PanelRuntimeState,
        symbols: &SymbolTable,
    ) -> Result<bool, SymbolError> {
        if self.conditions.is_empty() {
            return Ok(true);
        }
        let decisive = match self.combine {
            Combine::And => false,
            Combine::Or => true,
        };
        for c in &self.conditions {
            if symbols.evaluate(c.symbol, state, &c.value)? == decisive {
                return Ok(decisive);
            }
        }
        Ok(!decisive)
    }
}

/// One interpreter instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalOp {
    /// Replace the payload with `candidate` when `group` matches.
    If {
        /// Gating conditions.
        group: ConditionGroup,
        /// Full payload to send on match.
        candidate: Vec<u8>,
    },
    /// Replace the payload when no earlier `If` matched.
    Else {
        /// Full payload to send.
        candidate: Vec<u8>,
    },
    /// Gate the whole command.
    IfBlock(ConditionGroup),
    /// Patch `0xXX` positions from live state.
    Update(UpdateSymbol),
}

/// Why a command was held back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An enclosing block condition did not match.
    BlockCondition,
    /// A symbol could not be evaluated or written.
    Symbol(SymbolError),
}

/// Interpreter verdict for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send the (possibly rewritten) payload.
    Send,
    /// Leave the command out of this transaction.
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ScanningIf,
    InTrueBranch,
    InFalseBranch,
    Done,
}

/// Evaluate `command`'s ops and patch its payload.
pub fn apply(
    command: &mut CommandDescriptor,
    state: &PanelRuntimeState,
    symbols: &SymbolTable,
) -> Decision {
    match run(command, state, symbols) {
        Ok(decision) => decision,
        Err(err) => {
            tracing::warn!(
                addr = command.descriptor().payload.first().copied().unwrap_or(0),
                %err,
                "symbol failed, command skipped"
            );
            Decision::Skip(SkipReason::Symbol(err))
        }
    }
}

fn run(
    command: &mut CommandDescriptor,
    state: &PanelRuntimeState,
    symbols: &SymbolTable,
) -> Result<Decision, SymbolError> {
    let m = match command {
        CommandDescriptor::Mutable(m) => m,
        // Static commands only carry block conditions.
        CommandDescriptor::Static(s) => {
            for op in &s.ops {
                if let ConditionalOp::IfBlock(group) = op {
                    if !group.evaluate(state, symbols)? {
                        return Ok(Decision::Skip(SkipReason::BlockCondition));
                    }
                }
            }
            return Ok(Decision::Send);
        }
    };

    let mut phase = Phase::ScanningIf;
    let mut chosen: Option<&[u8]> = None;
    let mut update = None;
    for op in &m.ops {
        match op {
            ConditionalOp::IfBlock(group) => {
                if !group.evaluate(state, symbols)? {
                    return Ok(Decision::Skip(SkipReason::BlockCondition));
                }
            }
            ConditionalOp::If { group, candidate } => {
                if group.evaluate(state, symbols)? {
                    chosen = Some(candidate);
                    phase = Phase::InTrueBranch;
                }
            }
            ConditionalOp::Else { candidate } => {
                chosen = Some(candidate);
                phase = Phase::InFalseBranch;
            }
            ConditionalOp::Update(symbol) => {
                update = Some(*symbol);
                phase = Phase::Done;
            }
        }
        if phase != Phase::ScanningIf {
            break;
        }
    }

    match phase {
        Phase::InTrueBranch | Phase::InFalseBranch => {
            if let Some(candidate) = chosen {
                m.descriptor.payload.clear();
                m.descriptor.payload.extend_from_slice(candidate);
            }
        }
        Phase::Done => {
            if let Some(symbol) = update {
                let mut target = UpdateTarget {
                    buffer: &mut m.descriptor.payload,
                    updatable: &m.updatable,
                    gpara_offset: m.gpara_offset,
                };
                symbols.update(symbol, state, &mut target)?;
            }
        }
        Phase::ScanningIf => {
            if m.ops.iter().any(|op| matches!(op, ConditionalOp::If { .. })) {
                tracing::debug!(
                    addr = m.descriptor.payload.first().copied().unwrap_or(0),
                    "no condition matched, payload unchanged"
                );
            }
        }
    }
    Ok(Decision::Send)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fragment::{MutableDescriptor, StaticDescriptor};
    use panel_platform::{DataType, Descriptor};

    fn mutable(payload: &[u8], updatable: &[bool], ops: Vec<ConditionalOp>) -> CommandDescriptor {
        CommandDescriptor::Mutable(MutableDescriptor {
            descriptor: Descriptor::write(DataType::GenericLongWrite, payload.to_vec()),
            updatable: updatable.to_vec(),
            gpara_offset: 0,
            ops,
        })
    }

    fn payload(command: &CommandDescriptor) -> &[u8] {
        &command.descriptor().payload
    }

    fn group(combine: Combine, conditions: &[(MatchSymbol, &str)]) -> ConditionGroup {
        ConditionGroup {
            combine,
            conditions: conditions
                .iter()
                .map(|&(symbol, value)| Condition {
                    symbol,
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn decided_group_ignores_later_invalid_values() {
        let symbols = SymbolTable::common();
        let state = PanelRuntimeState::default();
        let bogus = (MatchSymbol::Mode, "BOGUS");

        let or = group(Combine::Or, &[(MatchSymbol::Mode, "NORMAL"), bogus]);
        assert_eq!(or.evaluate(&state, &symbols), Ok(true));
        let and = group(Combine::And, &[(MatchSymbol::Mode, "HBM"), bogus]);
        assert_eq!(and.evaluate(&state, &symbols), Ok(false));
    }

    #[test]
    fn undecided_group_surfaces_invalid_value() {
        let symbols = SymbolTable::common();
        let state = PanelRuntimeState::default();
        let bogus = (MatchSymbol::Mode, "BOGUS");

        let or = group(Combine::Or, &[(MatchSymbol::Mode, "HBM"), bogus]);
        assert!(or.evaluate(&state, &symbols).is_err());
        let and = group(Combine::And, &[(MatchSymbol::Mode, "NORMAL"), bogus]);
        assert!(and.evaluate(&state, &symbols).is_err());
        let leading = group(Combine::Or, &[bogus, (MatchSymbol::Mode, "NORMAL")]);
        assert!(leading.evaluate(&state, &symbols).is_err());
        assert_eq!(group(Combine::Or, &[]).evaluate(&state, &symbols), Ok(true));
    }

    #[test]
    fn or_match_before_invalid_value_rewrites_payload() {
        let mut command = mutable(
            &[0xB1, 0x00],
            &[false, true],
            vec![ConditionalOp::If {
                group: group(
                    Combine::Or,
                    &[(MatchSymbol::Mode, "NORMAL"), (MatchSymbol::Mode, "BOGUS")],
                ),
                candidate: vec![0xB1, 0xCC],
            }],
        );
        let state = PanelRuntimeState::default();
        assert_eq!(apply(&mut command, &state, &SymbolTable::common()), Decision::Send);
        assert_eq!(payload(&command), [0xB1, 0xCC]);
    }

    #[test]
    fn else_taken_when_mode_does_not_match() {
        let mut command = mutable(
            &[0xB1, 0x00],
            &[false, true],
            vec![
                ConditionalOp::If {
                    group: ConditionGroup::single(MatchSymbol::Mode, "HBM"),
                    candidate: vec![0xB1, 0xAA],
                },
                ConditionalOp::Else {
                    candidate: vec![0xB1, 0xBB],
                },
            ],
        );
        let state = PanelRuntimeState::default();
        assert_eq!(state.mode_tag(), "NORMAL");
        assert_eq!(apply(&mut command, &state, &SymbolTable::common()), Decision::Send);
        assert_eq!(payload(&command), [0xB1, 0xBB]);
    }

    #[test]
    fn first_matching_if_wins() {
        let ops = vec![
            ConditionalOp::If {
                group: ConditionGroup::single(MatchSymbol::Vrr, "60"),
                candidate: vec![0xB1, 0x01],
            },
            ConditionalOp::If {
                group: ConditionGroup::single(MatchSymbol::Vrr, "60NS"),
                candidate: vec![0xB1, 0x02],
            },
        ];
        let mut command = mutable(&[0xB1, 0x00], &[false, true], ops);
        apply(&mut command, &PanelRuntimeState::default(), &SymbolTable::common());
        assert_eq!(payload(&command), [0xB1, 0x01]);
    }

    #[test]
    fn no_match_keeps_previous_payload() {
        let mut command = mutable(
            &[0xB1, 0x42],
            &[false, true],
            vec![ConditionalOp::If {
                group: ConditionGroup::single(MatchSymbol::Mode, "HMT"),
                candidate: vec![0xB1, 0x00],
            }],
        );
        let decision = apply(&mut command, &PanelRuntimeState::default(), &SymbolTable::common());
        assert_eq!(decision, Decision::Send);
        assert_eq!(payload(&command), [0xB1, 0x42]);
    }

    #[test]
    fn or_group_matches_any() {
        let group = ConditionGroup {
            combine: Combine::Or,
            conditions: vec![
                Condition {
                    symbol: MatchSymbol::Mode,
                    value: "HBM".into(),
                },
                Condition {
                    symbol: MatchSymbol::DisplayOn,
                    value: "ON".into(),
                },
            ],
        };
        let state = PanelRuntimeState::default();
        assert_eq!(group.evaluate(&state, &SymbolTable::common()), Ok(true));
        let and = ConditionGroup {
            combine: Combine::And,
            ..group
        };
        assert_eq!(and.evaluate(&state, &SymbolTable::common()), Ok(false));
    }

    #[test]
    fn false_block_skips_static_command() {
        let mut command = CommandDescriptor::Static(StaticDescriptor {
            descriptor: Descriptor::write(DataType::DcsShortWrite, vec![0x28]),
            ops: vec![ConditionalOp::IfBlock(ConditionGroup::single(MatchSymbol::Mode, "HLPM"))],
        });
        assert_eq!(
            apply(&mut command, &PanelRuntimeState::default(), &SymbolTable::common()),
            Decision::Skip(SkipReason::BlockCondition)
        );
        assert_eq!(payload(&command), [0x28]);
    }

    #[test]
    fn update_patches_positions() {
        let mut state = PanelRuntimeState::default();
        state.wrdisbv = 0x0123;
        let mut command = mutable(
            &[0x51, 0x00, 0x00],
            &[false, true, true],
            vec![ConditionalOp::Update(UpdateSymbol::Brightness)],
        );
        assert_eq!(apply(&mut command, &state, &SymbolTable::common()), Decision::Send);
        assert_eq!(payload(&command), [0x51, 0x01, 0x23]);
    }

    #[test]
    fn symbol_error_skips_command() {
        let mut command = mutable(
            &[0xB1, 0x00],
            &[false, true],
            vec![ConditionalOp::If {
                group: ConditionGroup::single(MatchSymbol::Mode, "TURBO"),
                candidate: vec![0xB1, 0x01],
            }],
        );
        let decision = apply(&mut command, &PanelRuntimeState::default(), &SymbolTable::common());
        assert!(matches!(
            decision,
            Decision::Skip(SkipReason::Symbol(SymbolError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn missing_otp_skips_command() {
        let mut command = mutable(
            &[0xB5, 0x00],
            &[false, true],
            vec![ConditionalOp::Update(UpdateSymbol::Otp)],
        );
        assert!(matches!(
            apply(&mut command, &PanelRuntimeState::default(), &SymbolTable::common()),
            Decision::Skip(SkipReason::Symbol(SymbolError::Unavailable { .. }))
        ));
    }
}
