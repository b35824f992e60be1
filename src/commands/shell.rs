//! The interactive menu.
//!
//! Each line read from the input is one menu command. Operations that fail print their error and
//! the menu carries on; only errors writing to the output end the session.

use crate::commands::summary::ExpenseSummary;
use crate::commands::stats::StatisticAnswer;
use crate::commands::{upload_all, Out};
use crate::dispatch::{delete_transaction, Deletion, Dispatcher};
use crate::error::ProtocolError;
use crate::import::import_csv;
use crate::model::{RowId, Table, TransactionColumn};
use crate::uploads::Uploads;
use crate::{Config, Result};
use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::debug;

const WELCOME: &str = "
===================================================================
|  Welcome to Translyzer!                                         |
|                                                                 |
|  Translyzer is a bank statement analysis application.           |
|                                                                 |
|  Upload all your bank statements. Translyzer combines them,     |
|  presents them in one place and calculates your expenses.       |
|                                                                 |
|  Getting started:                                               |
|                                                                 |
|  Upload your bank statements (CSV files)                        |
|    - upload PATH, once per statement. undo drops the last one.  |
|                                                                 |
|  View Transactions                                              |
|    - view, then edit, consolidate or delete to correct details. |
|                                                                 |
|  Generate an Expense Summary                                    |
|    - summary for totals by category, stats for the highest,     |
|      lowest and average expense.                                |
|                                                                 |
|  [Type help for all commands, X to Exit the Program]            |
|                                                                 |
===================================================================
";

const HELP: &str = "\
Commands:
  upload PATH                 add a bank statement CSV file
  undo                        drop the most recent upload
  redo                        drop the most recent upload
  view                        show the combined transactions
  edit ID COLUMN VALUE        change one field of a transaction
  consolidate CAT1,CAT2 NEW   rename several categories to NEW
  delete ID                   remove a transaction (asks first)
  stats                       highest, lowest and average expense
  summary                     total expenses and expenses per category
  help                        show this list
  x                           exit
Uploading, undo and redo rebuild the table from the uploads, so earlier edits are lost.";

/// What is left when the menu exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEnd {
    uploads: usize,
    transactions: usize,
}

impl SessionEnd {
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn transactions(&self) -> usize {
        self.transactions
    }
}

/// Uploads `files`, prints the welcome page to `output` and runs the menu until `x` or the end
/// of `input`.
///
/// # Errors
/// - Any of `files` cannot be imported.
/// - Reading `input` or writing `output` fails.
pub async fn shell<R, W>(
    config: &Config,
    files: &[PathBuf],
    input: R,
    output: W,
) -> Result<Out<SessionEnd>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let uploads = upload_all(files).await?;
    let mut session = Session {
        dispatcher: Dispatcher::new(config),
        table: uploads.combined(),
        uploads,
        lines: input.lines(),
        output,
    };
    session.run().await?;
    let end = SessionEnd {
        uploads: session.uploads.len(),
        transactions: session.table.len(),
    };
    Ok(Out::new("Exiting the program...", end))
}

/// One parsed menu line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Upload(PathBuf),
    Undo,
    Redo,
    View,
    Edit {
        id: RowId,
        column: TransactionColumn,
        value: String,
    },
    Consolidate {
        categories: String,
        new_category: String,
    },
    Delete(RowId),
    Stats,
    Summary,
    Help,
    Exit,
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let action = match word.to_ascii_lowercase().as_str() {
            "x" => Action::Exit,
            "help" => Action::Help,
            "view" => Action::View,
            "undo" => Action::Undo,
            "redo" => Action::Redo,
            "stats" => Action::Stats,
            "summary" => Action::Summary,
            "upload" if !rest.is_empty() => Action::Upload(PathBuf::from(rest)),
            "upload" => bail!("Usage: upload PATH"),
            "delete" => Action::Delete(parse_id(rest).context("Usage: delete ID")?),
            "edit" => parse_edit(rest).context("Usage: edit ID COLUMN VALUE")?,
            "consolidate" => match rest.split_once(char::is_whitespace) {
                Some((categories, new_category)) if !new_category.trim().is_empty() => {
                    Action::Consolidate {
                        categories: categories.to_string(),
                        new_category: new_category.trim().to_string(),
                    }
                }
                _ => bail!("Usage: consolidate CAT1,CAT2 NEW"),
            },
            other => bail!("Unknown command '{other}', type help for the list of commands"),
        };
        Ok(action)
    }
}

fn parse_id(s: &str) -> Result<RowId> {
    RowId::from_str(s.trim()).map_err(|_| anyhow!("'{}' is not a transaction ID", s.trim()))
}

/// `ID COLUMN VALUE`, where COLUMN may contain spaces (`Account Name`) and is matched without
/// regard to case. VALUE is the rest of the line and may be empty.
fn parse_edit(rest: &str) -> Result<Action> {
    let (id, rest) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("Missing the column"))?;
    let id = parse_id(id)?;
    let rest = rest.trim_start();
    for column in TransactionColumn::ALL {
        let name = column.to_string();
        let Some(head) = rest.get(..name.len()) else {
            continue;
        };
        let tail = &rest[name.len()..];
        if head.eq_ignore_ascii_case(&name) && (tail.is_empty() || tail.starts_with(' ')) {
            return Ok(Action::Edit {
                id,
                column,
                value: tail.trim().to_string(),
            });
        }
    }
    let column = rest.split_whitespace().next().unwrap_or_default();
    // Gives the usual "Invalid transaction column name" message.
    TransactionColumn::from_header(column)?;
    bail!("Unable to read the column in '{rest}'")
}

struct Session<R, W> {
    dispatcher: Dispatcher,
    uploads: Uploads,
    table: Table,
    lines: Lines<R>,
    output: W,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    async fn run(&mut self) -> Result<()> {
        write!(self.output, "{WELCOME}")?;
        loop {
            let Some(line) = self.prompt("> ").await? else {
                debug!("End of input, leaving the menu");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let action = match Action::from_str(&line) {
                Ok(action) => action,
                Err(e) => {
                    writeln!(self.output, "{e:#}")?;
                    continue;
                }
            };
            debug!("Menu action {action:?}");
            if action == Action::Exit {
                writeln!(self.output, "Exiting the program...")?;
                break;
            }
            if let Err(e) = self.perform(action).await {
                writeln!(self.output, "Error: {e:#}")?;
            }
        }
        self.output.flush()?;
        Ok(())
    }

    async fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        self.lines
            .next_line()
            .await
            .context("Unable to read from the input")
    }

    async fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Upload(path) => {
                let table = import_csv(&path).await?;
                let count = table.len();
                self.uploads.append(path.clone(), table);
                self.table = self.uploads.combined();
                writeln!(
                    self.output,
                    "Uploaded {count} transactions from {}",
                    path.display()
                )?;
            }
            Action::Undo | Action::Redo => {
                let discarded = if action == Action::Undo {
                    self.uploads.undo()
                } else {
                    self.uploads.redo()
                };
                match discarded {
                    Some(upload) => {
                        self.table = self.uploads.combined();
                        writeln!(
                            self.output,
                            "Removed the upload of {}",
                            upload.path().display()
                        )?;
                    }
                    None => writeln!(self.output, "There are no uploads to remove")?,
                }
            }
            Action::View => write!(self.output, "{}", self.table)?,
            Action::Edit { id, column, value } => {
                self.table = self
                    .dispatcher
                    .edit_field(&self.table, id, column, &value)
                    .await?;
                write!(self.output, "{}", self.table)?;
            }
            Action::Consolidate {
                categories,
                new_category,
            } => {
                self.table = self
                    .dispatcher
                    .consolidate_categories(&self.table, &categories, &new_category)
                    .await?;
                write!(self.output, "{}", self.table)?;
            }
            Action::Delete(id) => self.delete(id).await?,
            Action::Stats => {
                for (statistic, answer) in self.dispatcher.compute_statistics(&self.table).await? {
                    writeln!(self.output, "{}", StatisticAnswer::new(statistic, answer))?;
                }
            }
            Action::Summary => write!(self.output, "{}", ExpenseSummary::new(&self.table))?,
            Action::Help => writeln!(self.output, "{HELP}")?,
            Action::Exit => {}
        }
        Ok(())
    }

    async fn delete(&mut self, id: RowId) -> Result<()> {
        let Some(cells) = self.table.get(id) else {
            return Err(ProtocolError::NotFound(id).into());
        };
        let mut shown = Table::new(self.table.columns().iter().cloned());
        shown.insert(id, cells.to_vec())?;
        write!(self.output, "{shown}")?;
        let answer = self
            .prompt("Delete this transaction? (y/n) ")
            .await?
            .unwrap_or_default();
        let confirmed = answer.trim().eq_ignore_ascii_case("y");
        match delete_transaction(&mut self.table, id, |_, _| confirmed)? {
            Deletion::Deleted(_) => writeln!(self.output, "Deleted transaction {id}")?,
            Deletion::Cancelled => writeln!(self.output, "Transaction {id} was not deleted")?,
        }
        Ok(())
    }
}
