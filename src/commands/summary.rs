use crate::commands::{upload_all, Out};
use crate::model::{Amount, Table};
use crate::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Total spending, and spending per category, shown as positive amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseSummary {
    /// The first and last transaction dates.
    period: Option<(NaiveDate, NaiveDate)>,
    count: usize,
    total: Amount,
    by_category: BTreeMap<String, Amount>,
}

impl ExpenseSummary {
    pub fn new(table: &Table) -> Self {
        let expenses = table.expenses();
        let total = Amount::new(expenses.iter().sum()).magnitude();
        Self {
            period: table.date_range(),
            count: expenses.len(),
            total,
            by_category: table.expenses_by_category(),
        }
    }

    pub fn period(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.period
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn by_category(&self) -> &BTreeMap<String, Amount> {
        &self.by_category
    }
}

impl Display for ExpenseSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some((first, last)) = self.period {
            writeln!(f, "Transactions from {first} to {last}")?;
        }
        writeln!(f, "Total expenses: {} ({} transactions)", self.total, self.count)?;
        let width = self
            .by_category
            .keys()
            .map(|k| k.chars().count())
            .max()
            .unwrap_or_default();
        for (category, amount) in &self.by_category {
            let name = if category.is_empty() {
                "(uncategorized)"
            } else {
                category
            };
            writeln!(f, "  {name:<width$}  {:>12}", amount.to_string())?;
        }
        Ok(())
    }
}

/// Imports `files`, combines them and summarizes the expenses. No worker is involved.
pub async fn summary(files: &[PathBuf]) -> Result<Out<ExpenseSummary>> {
    let uploads = upload_all(files).await?;
    let summary = ExpenseSummary::new(&uploads.combined());
    Ok(Out::new(format!("\n{summary}"), summary))
}
