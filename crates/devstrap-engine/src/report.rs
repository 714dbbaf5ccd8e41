use devstrap_core::StepError;

use crate::StepOutcome;

#[derive(Debug)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
}

/// Ordered outcomes of one run. Failures are derived from the records rather
/// than collected on the side.
#[derive(Debug, Default)]
pub struct RunReport {
    records: Vec<StepRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, outcome: StepOutcome) -> &StepRecord {
        self.records.push(StepRecord {
            name: name.into(),
            outcome,
        });
        let last = self.records.len() - 1;
        &self.records[last]
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn outcome_of(&self, name: &str) -> Option<&StepOutcome> {
        self.records
            .iter()
            .find(|record| record.name == name)
            .map(|record| &record.outcome)
    }

    pub fn failures(&self) -> Vec<(&str, &StepError)> {
        self.records
            .iter()
            .filter_map(|record| match &record.outcome {
                StepOutcome::Failed(err) => Some((record.name.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|record| record.outcome.is_failure())
    }

    pub fn count(&self, matches: impl Fn(&StepOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|record| matches(&record.outcome))
            .count()
    }
}
