//! Binds each user-initiated table operation to one round trip with a worker.

use crate::error::ProtocolError;
use crate::model::{Amount, Cell, RowId, Table, TransactionColumn};
use crate::protocol::{
    Channel, Mailbox, Operation, Request, ScalarChannel, Statistic, StructuredChannel,
};
use crate::{Config, Result};
use anyhow::Context;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Performs table operations by delegating them to workers.
///
/// Every delegated operation blocks until the worker answers. Edits and consolidation replace the
/// caller's table with the worker's copy wholesale, so anything changed locally in the meantime is
/// lost.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    edit: StructuredChannel,
    consolidate: StructuredChannel,
    statistic: ScalarChannel,
    dump: Mailbox,
}

impl Dispatcher {
    /// Creates a `Dispatcher` whose channels use the paths and timing in `config`.
    pub fn new(config: &Config) -> Self {
        let mode = config.mode();
        let timing = config.timing();
        Self {
            edit: StructuredChannel::new(Mailbox::new(config.edit_path(), mode), timing),
            consolidate: StructuredChannel::new(
                Mailbox::new(config.consolidate_path(), mode),
                timing,
            ),
            statistic: ScalarChannel::new(Mailbox::new(config.statistic_path(), mode), timing),
            dump: Mailbox::new(config.dump_path(), mode),
        }
    }

    /// Asks the edit worker to set one cell and returns the table it sends back.
    ///
    /// A value for a numeric column that does not parse as a number is logged and sent as text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::NotFound` if `id` is not in `table`; nothing is sent.
    /// - Filesystem errors on the mailbox, or `ProtocolError::Timeout` if a deadline is set.
    pub async fn edit_field(
        &self,
        table: &Table,
        id: RowId,
        column: TransactionColumn,
        raw_value: &str,
    ) -> Result<Table> {
        if !table.contains(id) {
            return Err(ProtocolError::NotFound(id).into());
        }
        let request = Request {
            operation: Operation::Edit {
                id,
                column,
                value: convert_value(column, raw_value),
            },
            data: table.clone(),
        };
        let updated = round_trip(&self.edit, &request).await?;
        info!("Edited {column} of transaction {id}");
        Ok(updated)
    }

    /// Asks the consolidation worker to rename every category in the comma-separated
    /// `categories` list to `new_category`. Neither argument is checked here.
    pub async fn consolidate_categories(
        &self,
        table: &Table,
        categories: &str,
        new_category: &str,
    ) -> Result<Table> {
        let request = Request {
            operation: Operation::Consolidate {
                categories: categories.to_string(),
                new_category: new_category.to_string(),
            },
            data: table.clone(),
        };
        let updated = round_trip(&self.consolidate, &request).await?;
        info!("Consolidated '{categories}' into '{new_category}'");
        Ok(updated)
    }

    /// Dumps `table` as CSV for the statistics worker, then requests `which` and returns the
    /// worker's answer as it was written.
    pub async fn compute_statistic(&self, table: &Table, which: Statistic) -> Result<String> {
        let mut dump = Vec::new();
        table.write_csv(&mut dump)?;
        self.dump
            .put(dump)
            .await
            .with_context(|| format!("Unable to dump transactions for the {which} statistic"))?;
        round_trip(&self.statistic, &which).await
    }

    /// Requests every statistic, one full round trip after another.
    pub async fn compute_statistics(&self, table: &Table) -> Result<Vec<(Statistic, String)>> {
        let mut answers = Vec::with_capacity(Statistic::ALL.len());
        for which in Statistic::ALL {
            answers.push((which, self.compute_statistic(table, which).await?));
        }
        Ok(answers)
    }
}

/// The result of [`delete_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// The row was removed; these were its cells.
    Deleted(Vec<Cell>),
    /// The caller declined to confirm.
    Cancelled,
}

/// Removes a row locally, without involving any worker. `confirm` is shown the row and must
/// return `true` for the row to be removed.
///
/// # Errors
///
/// `ProtocolError::NotFound` if `id` is not in `table`, which is left unchanged.
pub fn delete_transaction<F>(table: &mut Table, id: RowId, confirm: F) -> Result<Deletion>
where
    F: FnOnce(RowId, &[Cell]) -> bool,
{
    let Some(cells) = table.get(id) else {
        return Err(ProtocolError::NotFound(id).into());
    };
    if !confirm(id, cells) {
        debug!("Deletion of transaction {id} cancelled");
        return Ok(Deletion::Cancelled);
    }
    let removed = table
        .remove(id)
        .with_context(|| format!("Transaction {id} vanished during deletion"))?;
    info!("Deleted transaction {id}");
    Ok(Deletion::Deleted(removed))
}

/// Numeric columns are sent as numbers. If the text is not a number, the text is sent instead.
fn convert_value(column: TransactionColumn, raw_value: &str) -> Cell {
    if !column.is_numeric() {
        return Cell::text(raw_value);
    }
    if raw_value.trim().is_empty() {
        warn!("An empty value cannot be converted to a number for {column}, sending it as text");
        return Cell::text(raw_value);
    }
    match Amount::from_str(raw_value) {
        Ok(amount) => Cell::Number(amount.value()),
        Err(e) => {
            warn!("Unable to convert '{raw_value}' to a number for {column} ({e}), sending it as text");
            Cell::text(raw_value)
        }
    }
}

async fn round_trip<C: Channel>(channel: &C, request: &C::Request) -> Result<C::Response> {
    let path = channel.mailbox().path();
    debug!("Delegating a request via {}", path.display());
    let response = channel.send_and_await(request).await?;
    debug!("Round trip via {} complete", path.display());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{sample_table, worker, TestEnv};
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_convert_value() {
        assert_eq!(
            convert_value(TransactionColumn::Amount, "-42.10"),
            Cell::Number(dec("-42.10"))
        );
        assert_eq!(
            convert_value(TransactionColumn::Amount, "$1,000"),
            Cell::Number(dec("1000"))
        );
        assert_eq!(
            convert_value(TransactionColumn::Amount, "ten"),
            Cell::text("ten")
        );
        assert_eq!(
            convert_value(TransactionColumn::Amount, ""),
            Cell::text("")
        );
        assert_eq!(
            convert_value(TransactionColumn::Description, "42"),
            Cell::text("42")
        );
    }

    #[tokio::test]
    async fn test_edit_field_changes_only_one_cell() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        let worker = worker::serve_once(env.config().edit_path());

        let table = sample_table();
        let updated = dispatcher
            .edit_field(&table, RowId::new(1), TransactionColumn::Amount, "-42.10")
            .await
            .unwrap();
        let seen = worker.await.unwrap();

        assert_eq!(
            seen,
            Operation::Edit {
                id: RowId::new(1),
                column: TransactionColumn::Amount,
                value: Cell::Number(dec("-42.10")),
            }
        );
        let mut expected = table.clone();
        expected
            .set_cell(RowId::new(1), "Amount", Cell::Number(dec("-42.10")))
            .unwrap();
        assert_eq!(updated, expected);
        assert_eq!(
            updated.cell(RowId::new(1), "Amount").unwrap().to_string(),
            "-42.10"
        );
    }

    #[tokio::test]
    async fn test_edit_field_non_numeric_amount_is_sent_as_text() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        let worker = worker::serve_once(env.config().edit_path());

        let updated = dispatcher
            .edit_field(
                &sample_table(),
                RowId::new(0),
                TransactionColumn::Amount,
                "twelve",
            )
            .await
            .unwrap();
        let seen = worker.await.unwrap();

        assert_eq!(
            seen,
            Operation::Edit {
                id: RowId::new(0),
                column: TransactionColumn::Amount,
                value: Cell::text("twelve"),
            }
        );
        assert_eq!(
            updated.cell(RowId::new(0), "Amount").unwrap(),
            &Cell::text("twelve")
        );
    }

    #[tokio::test]
    async fn test_edit_field_missing_row_sends_nothing() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        let err = dispatcher
            .edit_field(&sample_table(), RowId::new(99), TransactionColumn::Date, "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::NotFound(_))
        ));
        assert!(!env.config().edit_path().exists());
    }

    #[tokio::test]
    async fn test_consolidate_categories() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        let worker = worker::serve_once(env.config().consolidate_path());

        let updated = dispatcher
            .consolidate_categories(&sample_table(), "Food, Fun", "Spending")
            .await
            .unwrap();
        let seen = worker.await.unwrap();

        assert_eq!(
            seen,
            Operation::Consolidate {
                categories: String::from("Food, Fun"),
                new_category: String::from("Spending"),
            }
        );
        let categories: Vec<String> = updated
            .rows()
            .map(|(id, _)| updated.cell(id, "Category").unwrap().to_string())
            .collect();
        assert_eq!(categories, vec!["Spending", "Spending", "Income"]);
    }

    #[tokio::test]
    async fn test_response_replaces_table_wholesale() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        // A worker that ignores the request and answers with an empty table.
        let worker = worker::respond_once(env.config().edit_path(), Table::transactions());

        let updated = dispatcher
            .edit_field(&sample_table(), RowId::new(0), TransactionColumn::Date, "2024-01-01")
            .await
            .unwrap();
        worker.await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn test_compute_statistics_in_sequence() {
        let env = TestEnv::new().await;
        let dispatcher = Dispatcher::new(env.config());
        let worker = worker::statistics(
            env.config().statistic_path(),
            env.config().dump_path(),
            Statistic::ALL.len(),
        );

        let mut table = Table::new(["Amount"]);
        for amount in ["-10", "-50", "20"] {
            table.push_row(vec![Cell::Number(dec(amount))]).unwrap();
        }
        let answers = dispatcher.compute_statistics(&table).await.unwrap();
        let opcodes = worker.await.unwrap();

        assert_eq!(opcodes, vec![1, 2, 3]);
        assert_eq!(
            answers,
            vec![
                (Statistic::Highest, String::from("-50")),
                (Statistic::Lowest, String::from("-10")),
                (Statistic::Average, String::from("-30")),
            ]
        );
    }

    #[test]
    fn test_delete_transaction() {
        let mut table = sample_table();
        let mut shown = None;
        let outcome = delete_transaction(&mut table, RowId::new(1), |id, cells| {
            shown = Some((id, cells.len()));
            true
        })
        .unwrap();
        assert!(matches!(outcome, Deletion::Deleted(_)));
        assert_eq!(shown, Some((RowId::new(1), 6)));
        assert!(!table.contains(RowId::new(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_delete_transaction_cancelled() {
        let mut table = sample_table();
        let outcome = delete_transaction(&mut table, RowId::new(0), |_, _| false).unwrap();
        assert_eq!(outcome, Deletion::Cancelled);
        assert_eq!(table, sample_table());
    }

    #[test]
    fn test_delete_transaction_missing_row() {
        let mut table = sample_table();
        let before = serde_json::to_vec(&table).unwrap();
        let err = delete_transaction(&mut table, RowId::new(42), |_, _| {
            panic!("confirmation must not be requested for a missing row")
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Transaction 42 does not exist");
        assert_eq!(serde_json::to_vec(&table).unwrap(), before);
    }
}
