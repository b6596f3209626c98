//! Local reconciliation of a model verdict against the rubric.
//!
//! The model reports its own percentage and selection flag. Neither is trusted:
//! both are recomputed here from `puntaje_total`, and every disagreement with the
//! reply or with the rubric is recorded instead of rejected.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::evaluation::domain::EvaluationResult;
use crate::report::ScoreTier;
use crate::rubric::{Rubric, MAX_CRITERION_SCORE, MIN_CRITERION_SCORE};

/// Percentage of the maximum score that must be exceeded to be selected.
pub const SELECTION_THRESHOLD_PCT: f64 = 75.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub total_score: i64,
    pub max_score: u32,
    /// `100 * total_score / max_score`.
    pub percentage: f64,
    /// `percentage > 75`.
    pub selected: bool,
    pub tier: ScoreTier,
    /// Sum of the per-criterion scores in the reply.
    pub scored_total: i64,
    pub reported_percentage: f64,
    pub reported_selected: bool,
    /// Rubric criteria with no evaluation in the reply.
    pub missing_criteria: Vec<String>,
    /// Evaluations whose name matches no rubric criterion.
    pub unknown_criteria: Vec<String>,
    pub duplicate_criteria: Vec<String>,
    /// Criteria scored outside 1–5.
    pub out_of_range: Vec<String>,
}

impl Assessment {
    pub fn new(result: &EvaluationResult, rubric: &Rubric) -> Self {
        let max_score = rubric.max_score();
        let percentage = percentage_of(result.total_score, max_score);

        let mut seen = HashSet::new();
        let mut unknown_criteria = Vec::new();
        let mut duplicate_criteria = Vec::new();
        let mut out_of_range = Vec::new();

        for evaluation in &result.evaluations {
            let name = evaluation.criterion_name.as_str();
            if !rubric.contains(name) {
                unknown_criteria.push(name.to_string());
            }
            if !seen.insert(name) {
                duplicate_criteria.push(name.to_string());
            }
            let in_range = (MIN_CRITERION_SCORE as i64..=MAX_CRITERION_SCORE as i64)
                .contains(&evaluation.score);
            if !in_range {
                out_of_range.push(name.to_string());
            }
        }

        let missing_criteria = rubric
            .all()
            .iter()
            .filter(|c| !seen.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        Self {
            total_score: result.total_score,
            max_score,
            percentage,
            selected: is_selected(percentage),
            tier: ScoreTier::for_percentage(percentage),
            scored_total: result.evaluations.iter().map(|e| e.score).sum(),
            reported_percentage: result.percentage,
            reported_selected: result.selected,
            missing_criteria,
            unknown_criteria,
            duplicate_criteria,
            out_of_range,
        }
    }

    /// Human-readable description of every inconsistency found.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.missing_criteria.is_empty() {
            warnings.push(format!(
                "criteria not evaluated: {}",
                self.missing_criteria.join(", ")
            ));
        }
        if !self.unknown_criteria.is_empty() {
            warnings.push(format!(
                "unknown criteria in reply: {}",
                self.unknown_criteria.join(", ")
            ));
        }
        if !self.duplicate_criteria.is_empty() {
            warnings.push(format!(
                "criteria evaluated more than once: {}",
                self.duplicate_criteria.join(", ")
            ));
        }
        if !self.out_of_range.is_empty() {
            warnings.push(format!(
                "scores outside {MIN_CRITERION_SCORE}-{MAX_CRITERION_SCORE}: {}",
                self.out_of_range.join(", ")
            ));
        }
        if self.scored_total != self.total_score {
            warnings.push(format!(
                "puntaje_total {} differs from the sum of scores {}",
                self.total_score, self.scored_total
            ));
        }
        if (self.reported_percentage - self.percentage).abs() > 0.05 {
            warnings.push(format!(
                "reported porcentaje {:.1} differs from computed {:.1}",
                self.reported_percentage, self.percentage
            ));
        }
        if self.reported_selected != self.selected {
            warnings.push(format!(
                "reported seleccionada={} overridden by computed {}",
                self.reported_selected, self.selected
            ));
        }

        warnings
    }

    pub fn is_consistent(&self) -> bool {
        self.warnings().is_empty()
    }

    /// Emits one `warn!` per inconsistency.
    pub fn log_warnings(&self, company: &str) {
        for warning in self.warnings() {
            warn!(company = %company, "Evaluation inconsistency: {warning}");
        }
    }
}

pub fn percentage_of(total_score: i64, max_score: u32) -> f64 {
    if max_score == 0 {
        return 0.0;
    }
    total_score as f64 * 100.0 / max_score as f64
}

pub fn is_selected(percentage: f64) -> bool {
    percentage > SELECTION_THRESHOLD_PCT
}
