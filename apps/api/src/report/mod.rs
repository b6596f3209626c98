//! Report rendering: presentation of an evaluation for humans and downloads.
//!
//! Classification thresholds:
//! - aggregate: ≥75% success, ≥60% warning, otherwise danger
//! - per criterion: score ≥4 high, ≥3 medium, otherwise low

use serde::Serialize;

use crate::evaluation::assessment::Assessment;
use crate::evaluation::domain::{CompanySummary, EvaluationResult};
use crate::rubric::{Rubric, MAX_CRITERION_SCORE};

/// Visual classification of the aggregate percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Success,
    Warning,
    Danger,
}

impl ScoreTier {
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage >= 75.0 {
            ScoreTier::Success
        } else if percentage >= 60.0 {
            ScoreTier::Warning
        } else {
            ScoreTier::Danger
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ScoreTier::Success => "✅",
            ScoreTier::Warning => "⚠️",
            ScoreTier::Danger => "❌",
        }
    }
}

/// Badge shown next to each criterion score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBadge {
    High,
    Medium,
    Low,
}

impl ScoreBadge {
    pub fn for_score(score: i64) -> Self {
        if score >= 4 {
            ScoreBadge::High
        } else if score >= 3 {
            ScoreBadge::Medium
        } else {
            ScoreBadge::Low
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ScoreBadge::High => "🔥",
            ScoreBadge::Medium | ScoreBadge::Low => "⚠️",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CriterionView {
    pub criterion: String,
    /// `None` when the model named a criterion the rubric does not know.
    pub description: Option<String>,
    pub score: i64,
    pub max_score: u32,
    pub badge: ScoreBadge,
    pub justification: String,
    pub recommendation: String,
}

/// Everything a client needs to draw the results page.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub summary: CompanySummary,
    pub total_score: i64,
    pub max_score: u32,
    pub percentage: f64,
    pub tier: ScoreTier,
    pub selected: bool,
    pub decision: &'static str,
    pub criteria: Vec<CriterionView>,
    pub warnings: Vec<String>,
}

impl ReportView {
    pub fn new(result: &EvaluationResult, rubric: &Rubric) -> Self {
        let assessment = Assessment::new(result, rubric);

        let criteria = result
            .evaluations
            .iter()
            .map(|e| CriterionView {
                criterion: e.criterion_name.clone(),
                description: rubric.get(&e.criterion_name).map(|c| c.description.clone()),
                score: e.score,
                max_score: MAX_CRITERION_SCORE,
                badge: ScoreBadge::for_score(e.score),
                justification: e.justification.clone(),
                recommendation: e.recommendation.clone(),
            })
            .collect();

        Self {
            summary: result.company_summary.clone(),
            total_score: assessment.total_score,
            max_score: assessment.max_score,
            percentage: assessment.percentage,
            tier: assessment.tier,
            selected: assessment.selected,
            decision: decision_label(assessment.selected),
            criteria,
            warnings: assessment.warnings(),
        }
    }
}

fn decision_label(selected: bool) -> &'static str {
    if selected {
        "SELECCIONADA"
    } else {
        "NO SELECCIONADA"
    }
}

/// Markdown rendering of the report, in the same Spanish wording as the form.
pub fn render_markdown(result: &EvaluationResult, rubric: &Rubric) -> String {
    let view = ReportView::new(result, rubric);
    let mut out = String::new();

    out.push_str("# Resumen de la Empresa\n\n");
    out.push_str(&format!("- 🏢 **Nombre:** {}\n", view.summary.name));
    out.push_str(&format!("- 🌎 **Origen:** {}\n", view.summary.origin_country));
    out.push_str(&format!(
        "- 💡 **Propuesta de Valor:** _{}_\n\n",
        view.summary.value_proposition
    ));

    out.push_str("# Evaluación por Criterios\n\n");
    out.push_str(&format!(
        "| Puntaje Total | Porcentaje | Decisión Final |\n|---|---|---|\n| {}/{} | {} {:.1}% | {} {} |\n\n",
        view.total_score,
        view.max_score,
        view.tier.icon(),
        view.percentage,
        if view.selected { "✅" } else { "❌" },
        view.decision,
    ));

    for c in &view.criteria {
        out.push_str(&format!(
            "## {} — {} {}/{}\n\n",
            c.criterion,
            c.badge.emoji(),
            c.score,
            c.max_score
        ));
        if let Some(description) = &c.description {
            out.push_str(&format!("**Descripción del criterio:** {description}\n\n"));
        }
        out.push_str(&format!("### Justificación\n\n{}\n\n", c.justification));
        out.push_str(&format!(
            "### 💡 Recomendaciones para mejorar\n\n{}\n\n",
            c.recommendation
        ));
    }

    if !view.warnings.is_empty() {
        out.push_str("# Advertencias\n\n");
        for warning in &view.warnings {
            out.push_str(&format!("- {warning}\n"));
        }
    }

    out
}

/// Indented JSON for download. Non-ASCII text is written as UTF-8, not escaped.
pub fn export_json(result: &EvaluationResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}

/// `evaluacion_<company>.json`, whitespace replaced by underscores.
///
/// Path separators and quotes are replaced too so the name is safe in a
/// `Content-Disposition` header.
pub fn export_filename(result: &EvaluationResult) -> String {
    let name: String = result
        .company_summary
        .name
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | '"' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("evaluacion_{name}.json")
}
