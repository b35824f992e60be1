//! Reads bank statement CSV files into a `Table`.

use crate::model::{Amount, Cell, Table, TransactionColumn};
use crate::{utils, Result};
use anyhow::{bail, Context};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Reads the statement at `path`. See [`parse_csv`].
pub async fn import_csv(path: &Path) -> Result<Table> {
    let text = utils::read(path).await?;
    let table = parse_csv(&text).with_context(|| format!("Unable to import {}", path.display()))?;
    debug!("Imported {} transactions from {}", table.len(), path.display());
    Ok(table)
}

/// Parses statement CSV text. The header row must name every `TransactionColumn`, in any order.
/// Other columns are kept as text. Amounts may be written with a dollar sign and thousands
/// separators. Rows are numbered from 0 in file order.
pub fn parse_csv(text: &str) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .context("Unable to read the CSV header row")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let missing: Vec<String> = TransactionColumn::ALL
        .iter()
        .map(|c| c.to_string())
        .filter(|c| !headers.contains(c))
        .collect();
    if !missing.is_empty() {
        bail!("The statement is missing the column(s): {}", missing.join(", "));
    }

    let amount = TransactionColumn::Amount.to_string();
    let mut table = Table::new(headers.clone());
    for (ix, record) in rdr.records().enumerate() {
        // Line 1 is the header.
        let line = ix + 2;
        let record = record.with_context(|| format!("Unable to read line {line}"))?;
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| {
                if *header == amount {
                    Amount::from_str(value)
                        .map(|a| Cell::Number(a.value()))
                        .with_context(|| format!("Invalid amount '{value}' on line {line}"))
                } else {
                    Ok(Cell::text(value))
                }
            })
            .collect::<Result<Vec<Cell>>>()?;
        table.push_row(cells)?;
    }
    Ok(table)
}
