use crate::model::{Amount, TransactionColumn};
use crate::Result;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifies a row of the transaction table.
///
/// On the wire this is always text (`"3"`), because it is used as a JSON object key, but an
/// integer is accepted as well.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowId(u64);

impl RowId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for RowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for RowId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowIdVisitor;

        impl Visitor<'_> for RowIdVisitor {
            type Value = RowId;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer row id, possibly as a string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<RowId, E> {
                Ok(RowId(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<RowId, E> {
                u64::try_from(v)
                    .map(RowId)
                    .map_err(|_| E::custom(format!("negative row id {v}")))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<RowId, E> {
                RowId::from_str(v).map_err(|e| E::custom(format!("bad row id '{v}': {e}")))
            }
        }

        deserializer.deserialize_any(RowIdVisitor)
    }
}

/// A single value in the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Number(Decimal),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// The numeric value, if this cell holds one.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Number(d) => Some(*d),
            Cell::Text(_) => None,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Text(String::new())
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(d) => Display::fmt(d, f),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<Decimal> for Cell {
    fn from(value: Decimal) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::text(value)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            // The decimal text goes out verbatim as a JSON number.
            Cell::Number(d) => serde_json::Number::from_str(&d.to_string())
                .map_err(S::Error::custom)?
                .serialize(serializer),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(Cell::default()),
            serde_json::Value::Bool(b) => Ok(Cell::Text(b.to_string())),
            serde_json::Value::String(s) => Ok(Cell::Text(s)),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map(Cell::Number)
                    .map_err(|e| D::Error::custom(format!("bad number '{text}': {e}")))
            }
            other => Err(D::Error::custom(format!(
                "expected a scalar table cell, found {other}"
            ))),
        }
    }
}

/// The in-memory transaction table: named columns, and rows keyed by `RowId`.
///
/// Serialized as a mapping from column name to a mapping from row id to cell value. Column order
/// survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: BTreeMap<RowId, Vec<Cell>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new<S, I>(columns: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self {
            columns: columns.into_iter().map(|s| s.into()).collect(),
            rows: BTreeMap::new(),
        }
    }

    /// Creates an empty table with the standard transaction columns.
    pub fn transactions() -> Self {
        Self::new(TransactionColumn::ALL.iter().map(|c| c.to_string()))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn get(&self, id: RowId) -> Option<&[Cell]> {
        self.rows.get(&id).map(|cells| cells.as_slice())
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &[Cell])> {
        self.rows.iter().map(|(id, cells)| (*id, cells.as_slice()))
    }

    pub fn cell(&self, id: RowId, column: &str) -> Option<&Cell> {
        let ix = self.column_index(column)?;
        self.rows.get(&id)?.get(ix)
    }

    /// Appends a row after the current highest id and returns its id.
    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<RowId> {
        let id = self
            .rows
            .keys()
            .next_back()
            .map(|id| id.next())
            .unwrap_or_default();
        self.insert(id, cells)?;
        Ok(id)
    }

    /// Inserts or replaces the row at `id`.
    pub fn insert(&mut self, id: RowId, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.columns.len() {
            bail!(
                "Row {id} has {} cells but the table has {} columns",
                cells.len(),
                self.columns.len()
            );
        }
        self.rows.insert(id, cells);
        Ok(())
    }

    pub fn set_cell(&mut self, id: RowId, column: &str, value: Cell) -> Result<()> {
        let ix = self
            .column_index(column)
            .with_context(|| format!("No column named '{column}'"))?;
        let row = self
            .rows
            .get_mut(&id)
            .with_context(|| format!("No row with id {id}"))?;
        row[ix] = value;
        Ok(())
    }

    pub fn remove(&mut self, id: RowId) -> Option<Vec<Cell>> {
        self.rows.remove(&id)
    }

    /// Appends every row of `other` after the rows of `self`, assigning fresh ids. Columns are
    /// matched by name; columns that only `other` has are added, and missing cells are empty.
    pub fn append(&mut self, other: &Table) {
        for column in &other.columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for cells in self.rows.values_mut() {
                    cells.push(Cell::default());
                }
            }
        }
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        let mut next = self
            .rows
            .keys()
            .next_back()
            .map(|id| id.next())
            .unwrap_or_default();
        for cells in other.rows.values() {
            let row = mapping
                .iter()
                .map(|ix| ix.and_then(|ix| cells.get(ix)).cloned().unwrap_or_default())
                .collect();
            self.rows.insert(next, row);
            next = next.next();
        }
    }

    /// The amounts of every expense, i.e. every negative `Amount`. Text amounts are parsed
    /// leniently and skipped if they do not parse.
    pub fn expenses(&self) -> Vec<Decimal> {
        self.amounts()
            .filter(|(_, amount)| amount.is_negative())
            .map(|(_, amount)| amount.value())
            .collect()
    }

    /// Total spending per category, as positive magnitudes.
    pub fn expenses_by_category(&self) -> BTreeMap<String, Amount> {
        let category = self.column_index(&TransactionColumn::Category.to_string());
        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for (id, amount) in self.amounts().filter(|(_, a)| a.is_negative()) {
            let name = category
                .and_then(|ix| self.rows.get(&id).and_then(|cells| cells.get(ix)))
                .map(|c| c.to_string())
                .unwrap_or_default();
            *totals.entry(name).or_default() += amount.value();
        }
        totals
            .into_iter()
            .map(|(name, total)| (name, Amount::new(total).magnitude()))
            .collect()
    }

    /// The earliest and latest `Date` in the table. Dates that do not parse are skipped.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let ix = self.column_index(&TransactionColumn::Date.to_string())?;
        let mut dates = self
            .rows
            .values()
            .filter_map(|cells| parse_date(&cells.get(ix)?.to_string()));
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    fn amounts(&self) -> impl Iterator<Item = (RowId, Amount)> + '_ {
        let ix = self.column_index(&TransactionColumn::Amount.to_string());
        self.rows.iter().filter_map(move |(id, cells)| {
            let amount = match cells.get(ix?)? {
                Cell::Number(d) => Amount::new(*d),
                Cell::Text(s) => Amount::from_str(s).ok()?,
            };
            Some((*id, amount))
        })
    }

    /// Writes the table as CSV: one header line, then one line per row in id order.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)
            .context("Unable to write CSV header")?;
        for cells in self.rows.values() {
            wtr.write_record(cells.iter().map(|c| c.to_string()))
                .context("Unable to write CSV row")?;
        }
        wtr.flush().context("Unable to flush CSV output")?;
        Ok(())
    }
}

/// Statements write dates either as `2024-03-01` or as `03/01/2024`.
fn parse_date(s: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

impl Display for Table {
    /// Renders an aligned text grid, with the row id as the first column.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = std::iter::once(2)
            .chain(self.columns.iter().map(|c| c.chars().count()))
            .collect();
        for (id, cells) in &self.rows {
            widths[0] = widths[0].max(id.to_string().len());
            for (ix, cell) in cells.iter().enumerate() {
                widths[ix + 1] = widths[ix + 1].max(cell.to_string().chars().count());
            }
        }
        write!(f, "{:<w$}", "ID", w = widths[0])?;
        for (ix, column) in self.columns.iter().enumerate() {
            write!(f, "  {:<w$}", column, w = widths[ix + 1])?;
        }
        writeln!(f)?;
        for (id, cells) in &self.rows {
            write!(f, "{:<w$}", id.to_string(), w = widths[0])?;
            for (ix, cell) in cells.iter().enumerate() {
                write!(f, "  {:<w$}", cell.to_string(), w = widths[ix + 1])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One column of a table, serialized as `{row id: cell}`.
struct ColumnRef<'a> {
    table: &'a Table,
    ix: usize,
}

impl Serialize for ColumnRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.rows.len()))?;
        for (id, cells) in &self.table.rows {
            map.serialize_entry(id, &cells[self.ix])?;
        }
        map.end()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (ix, name) in self.columns.iter().enumerate() {
            map.serialize_entry(name, &ColumnRef { table: self, ix })?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = Table;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of column name to a mapping of row id to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Table, A::Error> {
                let mut columns: Vec<(String, BTreeMap<RowId, Cell>)> = Vec::new();
                while let Some((name, values)) = map.next_entry::<String, BTreeMap<RowId, Cell>>()? {
                    if columns.iter().any(|(existing, _)| *existing == name) {
                        return Err(A::Error::custom(format!("duplicate column '{name}'")));
                    }
                    columns.push((name, values));
                }

                // A column that lacks a row id that another column has gets an empty cell there.
                let ids: BTreeSet<RowId> = columns
                    .iter()
                    .flat_map(|(_, values)| values.keys().copied())
                    .collect();
                let mut rows = BTreeMap::new();
                for id in ids {
                    let cells = columns
                        .iter_mut()
                        .map(|(_, values)| values.remove(&id).unwrap_or_default())
                        .collect();
                    rows.insert(id, cells);
                }
                Ok(Table {
                    columns: columns.into_iter().map(|(name, _)| name).collect(),
                    rows,
                })
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
