//! Table parser
//!
//! Turns a block of numeric text, or a flat array of big-endian 32-bit
//! cells, into a row-major [`RawTable`] of inferred width.
//!
//! # Text form
//!
//! ```text
//! // cmd  from  till  candela
//! 0       0     9     500
//! 1      10    19     520
//! 2      20    29     0x21C
//! ```
//!
//! The first non-empty line fixes the column count; every later row must
//! match it. Tokens starting with `0x` are hexadecimal. Parentheses and
//! commas separate tokens like whitespace does, so `(0, -80)` reads as two
//! cells. `//` and `/* */` comments are dropped, and `$NAME` / `${NAME}`
//! placeholders expand to the text of property `NAME` before splitting.
//!
//! # Revision fallback
//!
//! [`load_revisions`] reads `<stem>_rev<A..>` for each configured revision.
//! A missing revision copies the previous revision's table; revision A of a
//! required table must be present.

use std::string::String;
use std::vec::Vec;

use panel_platform::PropertySource;

use crate::config::EngineConfig;
use crate::error::TableError;

/// Placeholder expansion depth before a reference is treated as a cycle.
const MAX_SUBSTITUTION_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// RawTable
// ---------------------------------------------------------------------------

/// Row-major integer matrix.
///
/// Tables produced by [`parse_text`] and [`parse_binary`] have at least one
/// row. [`RawTable::empty`] stands in for an optional table that is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    cols: usize,
    cells: Vec<i64>,
}

impl RawTable {
    /// Build a table from row-major cells. Returns `None` if `cells` does
    /// not divide into whole rows of `cols`.
    pub fn from_cells(cols: usize, cells: Vec<i64>) -> Option<Self> {
        if cols == 0 || cells.len().checked_rem(cols)? != 0 {
            return None;
        }
        Some(Self { cols, cells })
    }

    /// Zero-row table of `cols` columns.
    pub fn empty(cols: usize) -> Self {
        Self {
            cols,
            cells: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.cells.len().checked_div(self.cols).unwrap_or(0)
    }

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.cols
    }

    /// `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    /// Row `index`, if present.
    pub fn row(&self, index: usize) -> Option<&[i64]> {
        self.rows().nth(index)
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[i64]> + '_ {
        // chunks_exact needs a non-zero size; an empty table has no rows anyway.
        self.cells.chunks_exact(self.cols.max(1))
    }

    /// Render back to the text form, one row per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in self.rows() {
            let line: Vec<String> = row.iter().map(i64::to_string).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a text table. Placeholders resolve against `props`.
pub fn parse_text<P: PropertySource + ?Sized>(
    key: &str,
    text: &str,
    props: &P,
) -> Result<RawTable, TableError> {
    let expanded = substitute(key, text, props, 0)?;
    let stripped = strip_comments(&expanded);

    let mut cols: Option<usize> = None;
    let mut cells: Vec<i64> = Vec::new();

    for (index, line) in stripped.lines().enumerate() {
        let line_no = index.saturating_add(1);
        let tokens: Vec<&str> = line.split(is_delimiter).filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            continue;
        }

        let expected = *cols.get_or_insert(tokens.len());
        if tokens.len() != expected {
            return Err(TableError::ColumnMismatch {
                key: key.into(),
                line: line_no,
                expected,
                found: tokens.len(),
            });
        }

        cells
            .try_reserve(tokens.len())
            .map_err(|_| TableError::AllocationFailure { key: key.into() })?;
        for token in tokens {
            let value = parse_token(token).ok_or_else(|| TableError::BadToken {
                key: key.into(),
                line: line_no,
                token: token.into(),
            })?;
            cells.push(value);
        }
    }

    match cols {
        Some(cols) => {
            let rows = cells.len().checked_div(cols).unwrap_or(0);
            tracing::debug!(key, rows, cols, "parsed text table");
            Ok(RawTable { cols, cells })
        }
        None => Err(TableError::NoData { key: key.into() }),
    }
}

/// Parse a binary table of big-endian `i32` cells, `fields` per row.
pub fn parse_binary(key: &str, bytes: &[u8], fields: usize) -> Result<RawTable, TableError> {
    let row_bytes = fields.saturating_mul(4);
    if bytes.is_empty() {
        return Err(TableError::NoData { key: key.into() });
    }
    if row_bytes == 0 || bytes.len().checked_rem(row_bytes) != Some(0) {
        return Err(TableError::Misaligned {
            key: key.into(),
            len: bytes.len(),
            row_bytes,
        });
    }

    let mut cells = Vec::new();
    cells
        .try_reserve_exact(bytes.len().checked_div(4).unwrap_or(0))
        .map_err(|_| TableError::AllocationFailure { key: key.into() })?;
    cells.extend(
        bytes
            .chunks_exact(4)
            .map(|c| i64::from(i32::from_be_bytes(c.try_into().unwrap_or([0; 4])))),
    );

    tracing::debug!(
        key,
        rows = cells.len().checked_div(fields).unwrap_or(0),
        cols = fields,
        "parsed binary table"
    );
    Ok(RawTable {
        cols: fields,
        cells,
    })
}

/// Parse whichever form `key` holds: text first, then binary with `fields`
/// cells per row.
pub fn parse<P: PropertySource + ?Sized>(
    props: &P,
    key: &str,
    fields: usize,
) -> Result<RawTable, TableError> {
    if let Some(text) = props.text(key) {
        parse_text(key, text, props)
    } else if let Some(bytes) = props.bytes(key) {
        parse_binary(key, bytes, fields)
    } else {
        Err(TableError::NoData { key: key.into() })
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',')
}

fn parse_token(token: &str) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}

/// Expand `$NAME` and `${NAME}` from `props` text values.
fn substitute<P: PropertySource + ?Sized>(
    key: &str,
    text: &str,
    props: &P,
    depth: usize,
) -> Result<String, TableError> {
    if !text.contains('$') {
        return Ok(text.into());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        let tail = tail.get(1..).unwrap_or_default();

        let (name, after) = if let Some(braced) = tail.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| TableError::Substitution {
                key: key.into(),
                name: braced.into(),
            })?;
            let (name, after) = braced.split_at(end);
            (name, after.get(1..).unwrap_or_default())
        } else {
            let end = tail
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
                .unwrap_or(tail.len());
            tail.split_at(end)
        };

        let fail = || TableError::Substitution {
            key: key.into(),
            name: name.into(),
        };
        if name.is_empty() || depth >= MAX_SUBSTITUTION_DEPTH {
            return Err(fail());
        }
        let value = props.text(name).ok_or_else(fail)?;
        out.push_str(&substitute(key, value, props, depth.saturating_add(1))?);
        rest = after;
    }
    out.push_str(rest);
    Ok(out)
}

/// Drop `//` line comments and `/* */` block comments, keeping newlines so
/// line numbers in errors still match the source.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let line = rest.find("//");
        let block = rest.find("/*");
        let (pos, is_block) = match (line, block) {
            (None, None) => break,
            (Some(l), Some(b)) if b < l => (b, true),
            (Some(l), _) => (l, false),
            (None, Some(b)) => (b, true),
        };
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);

        if is_block {
            let body = tail.get(2..).unwrap_or_default();
            match body.find("*/") {
                Some(end) => {
                    let (comment, after) = body.split_at(end);
                    out.extend(comment.chars().filter(|&c| c == '\n'));
                    rest = after.get(2..).unwrap_or_default();
                }
                None => {
                    out.extend(body.chars().filter(|&c| c == '\n'));
                    rest = "";
                }
            }
        } else {
            rest = tail.find('\n').map_or("", |n| tail.split_at(n).1);
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Revision loading
// ---------------------------------------------------------------------------

/// Whether a table must exist at revision A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing revision A is a load error.
    Required,
    /// Missing revision A yields an empty table.
    Optional,
}

/// Load `<prefix><stem>_rev<X>` for every configured revision.
///
/// The returned vector has one entry per revision. A missing revision is a
/// structural copy of the previous one.
pub fn load_revisions<P: PropertySource + ?Sized>(
    props: &P,
    config: &EngineConfig,
    stem: &str,
    fields: usize,
    requirement: Requirement,
) -> Result<Vec<RawTable>, TableError> {
    let mut tables: Vec<RawTable> = Vec::with_capacity(usize::from(config.revision_count));

    for rev in config.revisions() {
        let key = config.revision_key(stem, rev);
        let table = match parse(props, &key, fields) {
            Ok(table) => table,
            Err(TableError::NoData { .. }) => match tables.last() {
                Some(previous) => {
                    tracing::debug!(key = key.as_str(), "absent, copying previous revision");
                    previous.clone()
                }
                None if requirement == Requirement::Required => {
                    tracing::error!(key = key.as_str(), "required table missing");
                    return Err(TableError::NoData { key });
                }
                None => {
                    tracing::warn!(key = key.as_str(), "optional table missing, using empty table");
                    RawTable::empty(fields)
                }
            },
            Err(err) => {
                tracing::error!(key = key.as_str(), "table rejected");
                return Err(err);
            }
        };
        tables.push(table);
    }

    Ok(tables)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use panel_platform::PropertyMap;

    fn no_props() -> PropertyMap {
        PropertyMap::new()
    }

    #[test]
    fn three_row_table_infers_four_columns() {
        let t = parse_text("k", "0 0 9 500\n1 10 19 520\n2 20 29 540", &no_props())
            .expect("valid table");
        assert_eq!((t.row_count(), t.col_count()), (3, 4));
        assert_eq!(t.row(1), Some(&[1, 10, 19, 520][..]));
    }

    #[test]
    fn blank_lines_padding_and_hex() {
        let text = "\n\t 0x1F  (-80),\n\n  0X0a 7 \n";
        let t = parse_text("k", text, &no_props()).expect("valid table");
        assert_eq!(t.cells(), &[31, -80, 10, 7]);
    }

    #[test]
    fn column_mismatch_reports_line() {
        let err = parse_text("k", "1 2 3\n\n4 5", &no_props()).expect_err("mismatch");
        assert_eq!(
            err,
            TableError::ColumnMismatch {
                key: "k".into(),
                line: 3,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn bad_token_rejected() {
        let err = parse_text("k", "1 two", &no_props()).expect_err("bad token");
        assert!(matches!(err, TableError::BadToken { ref token, .. } if token == "two"));
    }

    #[test]
    fn comments_are_dropped() {
        let text = "// header\n1 2 /* inline */ 3\n/* multi\nline */\n4 5 6 // tail";
        let t = parse_text("k", text, &no_props()).expect("valid table");
        assert_eq!(t.cells(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn placeholders_expand_recursively() {
        let mut props = PropertyMap::new();
        props.set_text("ROW", "1 ${CELL} 3").set_text("CELL", "2");
        let t = parse_text("k", "$ROW\n4 5 6", &props).expect("valid table");
        assert_eq!(t.cells(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn placeholder_cycle_is_an_error() {
        let mut props = PropertyMap::new();
        props.set_text("A", "$B").set_text("B", "$A");
        assert!(matches!(
            parse_text("k", "$A", &props),
            Err(TableError::Substitution { .. })
        ));
    }

    #[test]
    fn empty_text_is_no_data() {
        assert!(matches!(
            parse_text("k", "  \n // nothing\n", &no_props()),
            Err(TableError::NoData { .. })
        ));
    }

    #[test]
    fn binary_rows_are_big_endian() {
        let bytes = [0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFE];
        let t = parse_binary("k", &bytes, 2).expect("valid");
        assert_eq!(t.cells(), &[1, -2]);
        assert_eq!(t.row_count(), 1);
    }

    #[test]
    fn binary_misaligned() {
        assert!(matches!(
            parse_binary("k", &[0; 12], 2),
            Err(TableError::Misaligned { len: 12, row_bytes: 8, .. })
        ));
    }

    #[test]
    fn missing_revision_copies_previous() {
        let mut props = PropertyMap::new();
        props.set_text("panel,candela_map_table_revA", "0 0 9 500");
        let config = EngineConfig {
            revision_count: 3,
            ..EngineConfig::default()
        };
        let tables =
            load_revisions(&props, &config, "candela_map_table", 4, Requirement::Required)
                .expect("loads");
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[1], tables[0]);
        assert_eq!(tables[2], tables[0]);
    }

    #[test]
    fn required_revision_a_missing_fails() {
        let err = load_revisions(
            &no_props(),
            &EngineConfig::default(),
            "candela_map_table",
            4,
            Requirement::Required,
        )
        .expect_err("required");
        assert_eq!(
            err,
            TableError::NoData {
                key: "panel,candela_map_table_revA".into()
            }
        );
    }

    #[test]
    fn optional_revision_a_missing_is_empty() {
        let tables = load_revisions(
            &no_props(),
            &EngineConfig::default(),
            "aid_map_table",
            2,
            Requirement::Optional,
        )
        .expect("optional");
        assert!(tables.iter().all(RawTable::is_empty));
    }
}
