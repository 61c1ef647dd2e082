//! Experiment definition and lifecycle state.
//!
//! An experiment splits traffic into a control and a test group for a
//! bounded date range. A promoted experiment is concluded: its winning
//! variant is applied to all traffic without further assignment.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ExperimentId;

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    /// Not running; assignment is refused
    Disabled,
    /// Actively splitting traffic
    Enabled,
    /// Concluded; the winning variant is served to everyone
    Promoted,
}

impl ExperimentState {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Promoted => "promoted",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Self::Disabled),
            "enabled" => Some(Self::Enabled),
            "promoted" => Some(Self::Promoted),
            _ => None,
        }
    }
}

/// An A/B experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique identifier
    pub id: ExperimentId,

    /// Unique human-readable name
    pub name: String,

    /// Current lifecycle state
    pub state: ExperimentState,

    /// First date the experiment collects data (None if not scheduled)
    pub start_date: Option<NaiveDate>,

    /// Last date the experiment collects data (None if open-ended)
    pub end_date: Option<NaiveDate>,

    /// When the experiment was created
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a new disabled experiment with no scheduled dates.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ExperimentId::new(),
            name: name.into(),
            state: ExperimentState::Disabled,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    /// Whether `date` falls inside the experiment's data-collection range.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        match self.start_date {
            Some(start) => start <= date && self.end_date.is_none_or(|end| date <= end),
            None => false,
        }
    }

    /// The date range for which reports are meaningful:
    /// `[start_date, min(end_date, yesterday)]`.
    ///
    /// Returns `None` when no start date is set or the range is empty.
    #[must_use]
    pub fn report_window(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.start_date?;
        let yesterday = today.pred_opt()?;
        let end = match self.end_date {
            Some(end) => end.min(yesterday),
            None => yesterday,
        };
        (start <= end).then_some((start, end))
    }
}
