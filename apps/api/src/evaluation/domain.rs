//! Evaluation data model.
//!
//! Field names on the wire are Spanish and fixed; they are shared with the
//! prompt template, the exported JSON file and every rendering client.

use serde::{de, Deserialize, Deserializer, Serialize};

/// Top-level keys every reply must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "resumen",
    "evaluaciones",
    "puntaje_total",
    "porcentaje",
    "seleccionada",
];

/// Free text submitted by the applicant. Lives only for one request.
#[derive(Debug, Clone)]
pub struct ApplicationInput {
    pub raw_text: String,
}

impl ApplicationInput {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.raw_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "origen")]
    pub origin_country: String,
    #[serde(rename = "propuesta_valor")]
    pub value_proposition: String,
}

/// Score and commentary for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    /// Expected to match a `Criterion::name` exactly.
    #[serde(rename = "criterio")]
    pub criterion_name: String,
    /// 1–5 when the model follows instructions. Kept signed so out-of-range replies still parse.
    #[serde(rename = "puntaje", deserialize_with = "integral")]
    pub score: i64,
    #[serde(rename = "justificacion")]
    pub justification: String,
    #[serde(rename = "recomendacion")]
    pub recommendation: String,
}

/// The model's full verdict as returned, before any local reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "resumen")]
    pub company_summary: CompanySummary,
    #[serde(rename = "evaluaciones")]
    pub evaluations: Vec<CriterionEvaluation>,
    #[serde(rename = "puntaje_total", deserialize_with = "integral")]
    pub total_score: i64,
    #[serde(rename = "porcentaje")]
    pub percentage: f64,
    /// Informational. The local decision comes from `Assessment`.
    #[serde(rename = "seleccionada")]
    pub selected: bool,
}

/// Accepts `4` as well as `4.0`. Fractional values are rejected.
fn integral<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    // 2^53: beyond this an f64 no longer holds every integer exactly.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT => Ok(f as i64),
        _ => Err(de::Error::custom(format!("expected an integer, got {number}"))),
    }
}
