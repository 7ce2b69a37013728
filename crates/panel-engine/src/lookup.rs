//! Lookup table model
//!
//! Direct-index arrays built once from a [`RawTable`]:
//!
//! - [`CandelaMap`]: backlight level → row index → `(cmd_index, candela)`.
//!   Rows are `[cmd_index, from, till, candela]`; each row is stamped over
//!   its inclusive level range.
//! - [`CommandMap`]: backlight level → N register values. Rows are
//!   `[level, v1, …, vn]`; levels between rows carry the previous row.
//!
//! Both are sized by the highest level they cover, so lookup is a single
//! bounds-checked index.

use std::vec::Vec;

use crate::error::TableError;
use crate::table::RawTable;

/// Highest level a table may stamp. Guards against a typo allocating a
/// multi-gigabyte bin array.
pub const MAX_TABLE_LEVEL: u32 = 0xFFFF;

fn level_cell(key: &str, value: i64) -> Result<u32, TableError> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v <= MAX_TABLE_LEVEL)
        .ok_or_else(|| TableError::Shape {
            key: key.into(),
            reason: "level outside 0..=65535",
        })
}

fn value_cell(key: &str, value: i64) -> Result<u32, TableError> {
    u32::try_from(value).map_err(|_| TableError::Shape {
        key: key.into(),
        reason: "negative or oversized cell",
    })
}

fn bin_len(max_level: u32) -> usize {
    usize::try_from(max_level).map_or(0, |l| l.saturating_add(1))
}

fn level_index(level: u32) -> Option<usize> {
    usize::try_from(level).ok()
}

// ---------------------------------------------------------------------------
// CandelaMap
// ---------------------------------------------------------------------------

/// One resolved candela-map row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandelaEntry {
    /// Row index within the map.
    pub index: usize,
    /// Register command index.
    pub cmd_index: u32,
    /// Luminance in candela.
    pub candela: u32,
}

/// Level → `(cmd_index, candela)` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandelaMap {
    bin_to_index: Vec<usize>,
    index_to_cmd_index: Vec<u32>,
    index_to_candela: Vec<u32>,
    min_level: u32,
    max_level: u32,
}

impl CandelaMap {
    /// Columns per row: `[cmd_index, from, till, candela]`.
    pub const FIELDS: usize = 4;

    /// Build from a parsed table.
    ///
    /// A row whose `from` exceeds `till` still stamps `from`. Where ranges
    /// overlap, the later row wins. Levels no row covers resolve to row 0.
    pub fn build(key: &str, raw: RawTable) -> Result<Self, TableError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        if raw.col_count() != Self::FIELDS {
            return Err(TableError::Shape {
                key: key.into(),
                reason: "candela map rows need 4 columns",
            });
        }

        let mut ranges = Vec::with_capacity(raw.row_count());
        let mut map = Self::default();
        for row in raw.rows() {
            let &[cmd_index, from, till, candela] = row else {
                continue;
            };
            let from = level_cell(key, from)?;
            let till = level_cell(key, till)?.max(from);
            map.index_to_cmd_index.push(value_cell(key, cmd_index)?);
            map.index_to_candela.push(value_cell(key, candela)?);
            ranges.push((from, till));
        }

        let top = ranges.iter().map(|&(_, till)| till).max().unwrap_or(0);
        map.bin_to_index = vec![0; bin_len(top)];
        for (index, &(from, till)) in ranges.iter().enumerate() {
            for level in from..=till {
                if let Some(bin) = level_index(level).and_then(|l| map.bin_to_index.get_mut(l)) {
                    *bin = index;
                }
            }
        }

        map.min_level = ranges.first().map_or(0, |&(from, _)| from);
        map.max_level = ranges.last().map_or(0, |&(_, till)| till);
        tracing::debug!(
            key,
            rows = ranges.len(),
            min = map.min_level,
            max = map.max_level,
            "built candela map"
        );
        Ok(map)
    }

    /// Resolve `level`. `None` past the highest stamped level or on an
    /// empty map.
    pub fn lookup(&self, level: u32) -> Option<CandelaEntry> {
        let index = *self.bin_to_index.get(level_index(level)?)?;
        self.entry(index)
    }

    /// Row `index` as an entry.
    pub fn entry(&self, index: usize) -> Option<CandelaEntry> {
        Some(CandelaEntry {
            index,
            cmd_index: *self.index_to_cmd_index.get(index)?,
            candela: *self.index_to_candela.get(index)?,
        })
    }

    /// First row whose candela is at or above `candela`, scanning from
    /// row 0; the last row if none is.
    pub fn nearest_at_or_above(&self, candela: u32) -> Option<CandelaEntry> {
        let index = self
            .index_to_candela
            .iter()
            .position(|&cd| cd >= candela)
            .or_else(|| self.len().checked_sub(1))?;
        self.entry(index)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index_to_candela.len()
    }

    /// `true` when built from an absent optional table.
    pub fn is_empty(&self) -> bool {
        self.index_to_candela.is_empty()
    }

    /// First row's `from`.
    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    /// Last row's `till`.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Number of level bins (highest stamped level + 1).
    pub fn bin_count(&self) -> usize {
        self.bin_to_index.len()
    }
}

// ---------------------------------------------------------------------------
// CommandMap
// ---------------------------------------------------------------------------

/// Level → register values map, one array per value column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMap {
    level_to_value: Vec<Vec<i64>>,
}

impl CommandMap {
    /// Build from a parsed `[level, v1, …, vn]` table.
    pub fn build(key: &str, raw: RawTable) -> Result<Self, TableError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let value_cols = raw.col_count().saturating_sub(1);
        if value_cols == 0 {
            return Err(TableError::Shape {
                key: key.into(),
                reason: "command map rows need a level and at least one value",
            });
        }

        let mut rows: Vec<(u32, &[i64])> = Vec::with_capacity(raw.row_count());
        for row in raw.rows() {
            if let Some((&level, values)) = row.split_first() {
                rows.push((level_cell(key, level)?, values));
            }
        }

        let top = rows.iter().map(|&(level, _)| level).max().unwrap_or(0);
        let len = bin_len(top);
        let mut stamped: Vec<Option<&[i64]>> = vec![None; len];
        for &(level, values) in &rows {
            if let Some(slot) = level_index(level).and_then(|l| stamped.get_mut(l)) {
                *slot = Some(values);
            }
        }

        let mut level_to_value = vec![Vec::with_capacity(len); value_cols];
        let mut carried: &[i64] = rows.first().map(|&(_, v)| v).unwrap_or_default();
        for slot in stamped {
            if let Some(values) = slot {
                carried = values;
            }
            for (column, &value) in level_to_value.iter_mut().zip(carried) {
                column.push(value);
            }
        }

        tracing::debug!(key, rows = rows.len(), columns = value_cols, "built command map");
        Ok(Self { level_to_value })
    }

    /// Value column `col` at `level`. Levels past the table clamp to the
    /// highest level.
    pub fn value(&self, level: u32, col: usize) -> Option<i64> {
        let column = self.level_to_value.get(col)?;
        let last = column.len().checked_sub(1)?;
        let index = level_index(level).map_or(last, |l| l.min(last));
        column.get(index).copied()
    }

    /// All value columns at `level`, in column order.
    pub fn values(&self, level: u32) -> Vec<i64> {
        (0..self.column_count())
            .filter_map(|col| self.value(level, col))
            .collect()
    }

    /// Number of value columns (table width minus the level column).
    pub fn column_count(&self) -> usize {
        self.level_to_value.len()
    }

    /// `true` when built from an absent optional table.
    pub fn is_empty(&self) -> bool {
        self.level_to_value.is_empty()
    }
}
