use crate::commands::{upload_all, Out};
use crate::dispatch::Dispatcher;
use crate::model::Amount;
use crate::protocol::Statistic;
use crate::{Config, Result};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// One statistic as answered by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticAnswer {
    statistic: Statistic,
    /// The worker's line, unvalidated.
    answer: String,
}

impl StatisticAnswer {
    pub fn new(statistic: Statistic, answer: impl Into<String>) -> Self {
        Self {
            statistic,
            answer: answer.into(),
        }
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }
}

impl Display for StatisticAnswer {
    /// Expenses are shown as positive amounts. Answers that are not amounts are shown as is.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self.statistic {
            Statistic::Highest => "Highest expense",
            Statistic::Lowest => "Lowest expense",
            Statistic::Average => "Average expense",
        };
        match Amount::from_str(&self.answer) {
            Ok(amount) if !self.answer.trim().is_empty() => {
                write!(f, "{label}: {}", amount.magnitude())
            }
            _ => write!(f, "{label}: {}", self.answer),
        }
    }
}

/// Imports and combines `files`, then asks the statistics worker for each statistic in turn.
pub async fn stats(config: &Config, files: &[PathBuf]) -> Result<Out<Vec<StatisticAnswer>>> {
    let table = upload_all(files).await?.combined();
    let dispatcher = Dispatcher::new(config);
    let answers: Vec<StatisticAnswer> = dispatcher
        .compute_statistics(&table)
        .await?
        .into_iter()
        .map(|(statistic, answer)| StatisticAnswer::new(statistic, answer))
        .collect();
    let message = answers
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Out::new(message, answers))
}
