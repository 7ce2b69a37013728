//! Text command scripts
//!
//! The human-editable form of a command set. One command or directive per
//! line:
//!
//! ```text
//! W F0 5A 5A                          // write; type from length
//! WT 39 B1 0xXX 0xXX                  // write with explicit type
//! UPDATE AID                          // patch 0xXX from live state
//! W B5 0xXX
//! IF MODE HBM THEN 0x13               // candidate for the 0xXX bytes
//! ELSE 0x03
//! delay 17 ms                         // after the previous command
//! IF VRR 120HS AND MODE NORMAL APPLY  // gate every command until END
//! W F7 0F
//! END
//! R DA 1                              // DCS read of one byte
//! ```
//!
//! `W` picks DCS short write for a single byte and generic long write
//! otherwise. A line starting with `0x` continues the previous line.
//! A write to `B0` records a global-parameter offset (`B0 <offset> [addr]`)
//! that the next read, or the next write's `UPDATE OTP`, starts from.
//!
//! Symbols are resolved against a [`SymbolTable`] here, so an unknown name
//! fails loading.

use std::string::{String, ToString};
use std::vec::Vec;

use panel_platform::{DataType, Descriptor};

use crate::error::ScriptError;
use crate::fragment::{CommandDescriptor, MutableDescriptor, StaticDescriptor};
use crate::interp::{Combine, Condition, ConditionGroup, ConditionalOp};
use crate::symbol::SymbolTable;
use crate::table::strip_comments;

/// Global-parameter register.
const GPARA_REGISTER: u8 = 0xB0;

/// One payload token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Fixed(u8),
    Updatable,
}

/// Pending `B0` offset.
#[derive(Debug, Clone, Copy)]
struct Gpara {
    offset: u16,
    addr: Option<u8>,
}

struct Parser<'a> {
    key: &'a str,
    symbols: &'a SymbolTable,
    commands: Vec<CommandDescriptor>,
    blocks: Vec<ConditionGroup>,
    gpara: Option<Gpara>,
    line: usize,
}

/// Parse `text` into commands.
pub fn parse(
    key: &str,
    text: &str,
    symbols: &SymbolTable,
) -> Result<Vec<CommandDescriptor>, ScriptError> {
    let mut parser = Parser {
        key,
        symbols,
        commands: Vec::new(),
        blocks: Vec::new(),
        gpara: None,
        line: 0,
    };
    for (line, content) in logical_lines(&strip_comments(text)) {
        parser.line = line;
        parser.statement(&content)?;
    }
    if !parser.blocks.is_empty() {
        return Err(parser.syntax("IF block without END"));
    }
    Ok(parser.commands)
}

/// Join `0x` continuation lines onto the line they continue. Yields
/// `(one-based line number, text)`.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (number, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let continues = trimmed
            .get(..2)
            .is_some_and(|p| p.eq_ignore_ascii_case("0x"));
        match lines.last_mut() {
            Some((_, previous)) if continues => {
                previous.push(' ');
                previous.push_str(trimmed);
            }
            _ => lines.push((number.saturating_add(1), trimmed.to_string())),
        }
    }
    lines
}

fn parse_hex(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).ok()
}

fn parse_cell(token: &str) -> Option<Cell> {
    if token.eq_ignore_ascii_case("0xXX") {
        Some(Cell::Updatable)
    } else {
        parse_hex(token).map(Cell::Fixed)
    }
}

impl Parser<'_> {
    fn syntax(&self, reason: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            key: self.key.into(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn statement(&mut self, content: &str) -> Result<(), ScriptError> {
        let tokens: Vec<&str> = content.split_whitespace().collect();
        let Some((&keyword, args)) = tokens.split_first() else {
            return Ok(());
        };
        match keyword.to_ascii_uppercase().as_str() {
            "W" => self.write(None, args),
            "WT" => {
                let (&ty, bytes) = args
                    .split_first()
                    .ok_or_else(|| self.syntax("WT needs a data type"))?;
                let data_type = self.data_type(ty)?;
                self.write(Some(data_type), bytes)
            }
            "R" => self.read(DataType::DcsRead, args),
            "RT" => {
                let (&ty, rest) = args
                    .split_first()
                    .ok_or_else(|| self.syntax("RT needs a data type"))?;
                let data_type = self.data_type(ty)?;
                self.read(data_type, rest)
            }
            "DELAY" => self.delay(args),
            "IF" => self.condition(args),
            "ELSE" => {
                let candidate = self.candidate(args)?;
                self.last_mutable("ELSE")?
                    .ops
                    .push(ConditionalOp::Else { candidate });
                Ok(())
            }
            "UPDATE" => self.update(args),
            "END" => self
                .blocks
                .pop()
                .map(drop)
                .ok_or_else(|| self.syntax("END without IF block")),
            other => Err(self.syntax(format!("unknown directive `{other}`"))),
        }
    }

    fn data_type(&self, token: &str) -> Result<DataType, ScriptError> {
        let raw = parse_hex(token).ok_or_else(|| self.syntax(format!("bad data type `{token}`")))?;
        DataType::from_u8(raw).ok_or_else(|| ScriptError::UnknownDataType {
            key: self.key.into(),
            data_type: raw,
        })
    }

    fn block_ops(&self) -> Vec<ConditionalOp> {
        self.blocks
            .iter()
            .cloned()
            .map(ConditionalOp::IfBlock)
            .collect()
    }

    fn write(&mut self, data_type: Option<DataType>, args: &[&str]) -> Result<(), ScriptError> {
        let cells = args
            .iter()
            .map(|t| parse_cell(t).ok_or_else(|| self.syntax(format!("bad byte `{t}`"))))
            .collect::<Result<Vec<Cell>, _>>()?;
        if cells.is_empty() {
            return Err(self.syntax("write without payload"));
        }
        let data_type = data_type.unwrap_or(if cells.len() == 1 {
            DataType::DcsShortWrite
        } else {
            DataType::GenericLongWrite
        });

        let payload: Vec<u8> = cells
            .iter()
            .map(|c| match c {
                Cell::Fixed(b) => *b,
                Cell::Updatable => 0,
            })
            .collect();
        let updatable: Vec<bool> = cells.iter().map(|c| *c == Cell::Updatable).collect();

        let gpara = self.take_gpara(payload.first().copied());
        let next_gpara = match payload.as_slice() {
            [GPARA_REGISTER, offset, addr] => Some(Gpara {
                offset: u16::from(*offset),
                addr: Some(*addr),
            }),
            [GPARA_REGISTER, offset] => Some(Gpara {
                offset: u16::from(*offset),
                addr: None,
            }),
            _ => None,
        };

        let descriptor = Descriptor::write(data_type, payload);
        let ops = self.block_ops();
        let command = if updatable.contains(&true) {
            CommandDescriptor::Mutable(MutableDescriptor {
                descriptor,
                updatable,
                gpara_offset: gpara.unwrap_or(0),
                ops,
            })
        } else {
            CommandDescriptor::Static(StaticDescriptor { descriptor, ops })
        };
        self.commands.push(command);
        if next_gpara.is_some() {
            self.gpara = next_gpara;
        }
        Ok(())
    }

    /// Consume the pending offset if it applies to `addr`.
    fn take_gpara(&mut self, addr: Option<u8>) -> Option<u16> {
        let pending = self.gpara.take()?;
        match pending.addr {
            Some(wanted) if Some(wanted) != addr => None,
            _ => Some(pending.offset),
        }
    }

    fn read(&mut self, data_type: DataType, args: &[&str]) -> Result<(), ScriptError> {
        let &[addr, len] = args else {
            return Err(self.syntax("read needs an address and a length"));
        };
        let addr = parse_hex(addr).ok_or_else(|| self.syntax(format!("bad address `{addr}`")))?;
        let len = parse_hex(len).ok_or_else(|| self.syntax(format!("bad length `{len}`")))?;
        let mut descriptor = Descriptor::read(data_type, addr, len);
        descriptor.rx_offset = self.take_gpara(Some(addr)).unwrap_or(0);
        let ops = self.block_ops();
        self.commands
            .push(CommandDescriptor::Static(StaticDescriptor { descriptor, ops }));
        Ok(())
    }

    fn delay(&mut self, args: &[&str]) -> Result<(), ScriptError> {
        let joined = args.concat();
        let split = joined
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(joined.len());
        let (amount, unit) = joined.split_at(split);
        let amount: u32 = amount
            .parse()
            .map_err(|_| self.syntax(format!("bad delay `{joined}`")))?;
        let frames = if unit.eq_ignore_ascii_case("ms") {
            false
        } else if unit.eq_ignore_ascii_case("frame") || unit.eq_ignore_ascii_case("frames") {
            true
        } else {
            return Err(self.syntax(format!("bad delay unit `{unit}`")));
        };
        let line = self.line;
        let key = self.key;
        let previous = self.commands.last_mut().ok_or_else(|| ScriptError::Syntax {
            key: key.into(),
            line,
            reason: String::from("delay without a previous command"),
        })?;
        let descriptor = previous.descriptor_mut();
        if frames {
            descriptor.wait_frames = amount;
        } else {
            descriptor.wait_ms = amount;
        }
        Ok(())
    }

    /// `IF <sym> <val> [AND|OR <sym> <val>]… (THEN <bytes> | [THEN] APPLY)`
    fn condition(&mut self, args: &[&str]) -> Result<(), ScriptError> {
        let mut group = ConditionGroup::default();
        let mut rest = args;
        loop {
            let [name, value, tail @ ..] = rest else {
                return Err(self.syntax("IF needs a symbol and a value"));
            };
            let symbol = self
                .symbols
                .resolve_match(name)
                .ok_or_else(|| ScriptError::UnknownSymbol {
                    key: self.key.into(),
                    line: self.line,
                    name: (*name).to_string(),
                })?;
            group.conditions.push(Condition {
                symbol,
                value: (*value).to_string(),
            });
            let Some((&joiner, after)) = tail.split_first() else {
                return Err(self.syntax("IF without THEN or APPLY"));
            };
            match joiner.to_ascii_uppercase().as_str() {
                "AND" => rest = after,
                "OR" => {
                    group.combine = Combine::Or;
                    rest = after;
                }
                "APPLY" if after.is_empty() => {
                    self.blocks.push(group);
                    return Ok(());
                }
                "THEN" => {
                    if let [apply] = after {
                        if apply.eq_ignore_ascii_case("APPLY") {
                            self.blocks.push(group);
                            return Ok(());
                        }
                    }
                    let candidate = self.candidate(after)?;
                    self.last_mutable("IF")?
                        .ops
                        .push(ConditionalOp::If { group, candidate });
                    return Ok(());
                }
                other => return Err(self.syntax(format!("unexpected `{other}` in IF"))),
            }
        }
    }

    /// Previous command's payload with the `0xXX` positions filled by `args`.
    fn candidate(&self, args: &[&str]) -> Result<Vec<u8>, ScriptError> {
        let bytes = args
            .iter()
            .map(|t| parse_hex(t).ok_or_else(|| self.syntax(format!("bad byte `{t}`"))))
            .collect::<Result<Vec<u8>, _>>()?;
        if bytes.is_empty() {
            return Err(self.syntax("candidate without bytes"));
        }
        let Some(CommandDescriptor::Mutable(base)) = self.commands.last() else {
            return Err(self.syntax("candidate needs a preceding write with 0xXX bytes"));
        };
        let slots = base.updatable.iter().filter(|&&u| u).count();
        if bytes.len() > slots {
            let reason = format!("{} candidate bytes for {} 0xXX positions", bytes.len(), slots);
            return Err(self.syntax(reason));
        }
        let mut candidate = base.descriptor.payload.clone();
        let positions = base
            .updatable
            .iter()
            .enumerate()
            .filter(|&(_, &u)| u)
            .map(|(i, _)| i);
        for (index, byte) in positions.zip(bytes) {
            if let Some(slot) = candidate.get_mut(index) {
                *slot = byte;
            }
        }
        Ok(candidate)
    }

    fn update(&mut self, args: &[&str]) -> Result<(), ScriptError> {
        let &[name] = args else {
            return Err(self.syntax("UPDATE needs one symbol"));
        };
        let symbol = self
            .symbols
            .resolve_update(name)
            .ok_or_else(|| ScriptError::UnknownSymbol {
                key: self.key.into(),
                line: self.line,
                name: name.to_string(),
            })?;
        self.last_mutable("UPDATE")?
            .ops
            .push(ConditionalOp::Update(symbol));
        Ok(())
    }

    fn last_mutable(&mut self, what: &str) -> Result<&mut MutableDescriptor, ScriptError> {
        let reason = format!("{what} needs a preceding write with 0xXX bytes");
        let (key, line) = (self.key, self.line);
        match self.commands.last_mut() {
            Some(CommandDescriptor::Mutable(m)) => Ok(m),
            _ => Err(ScriptError::Syntax {
                key: key.into(),
                line,
                reason,
            }),
        }
    }
}
