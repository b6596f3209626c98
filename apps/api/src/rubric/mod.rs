//! Rubric store: the fixed table of evaluation criteria.
//!
//! The table is data, not code: the built-in version lives in
//! `config/criteria.json` and an alternative file can be supplied at startup
//! through `CRITERIA_PATH`. Once loaded it is shared read-only behind `Arc`.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Highest score a single criterion can receive.
pub const MAX_CRITERION_SCORE: u32 = 5;
/// Lowest score a single criterion can receive.
pub const MIN_CRITERION_SCORE: u32 = 1;

const BUILTIN_CRITERIA: &str = include_str!("../../config/criteria.json");

/// One evaluation dimension with its 1–5 scoring rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Unique key. The model must echo it verbatim in `criterio`.
    pub name: String,
    pub description: String,
    /// Informal description of each score level, one per line.
    pub rubric: String,
    /// What kind of evidence supports a high score.
    pub evidence_hint: String,
}

/// Ordered, non-empty set of criteria with unique names.
#[derive(Debug, Clone, PartialEq)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    /// The ten criteria of the LatAm-to-Brazil soft-landing call.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CRITERIA).context("built-in criteria table is invalid")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read criteria file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid criteria file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let criteria: Vec<Criterion> =
            serde_json::from_str(text).context("criteria must be a JSON array of objects")?;
        Self::new(criteria)
    }

    pub fn new(criteria: Vec<Criterion>) -> Result<Self> {
        if criteria.is_empty() {
            bail!("criteria table is empty");
        }

        let mut seen = HashSet::new();
        for criterion in &criteria {
            if criterion.name.trim().is_empty() {
                bail!("criterion with blank name");
            }
            if !seen.insert(criterion.name.as_str()) {
                bail!("duplicate criterion name: {}", criterion.name);
            }
        }

        Ok(Self { criteria })
    }

    pub fn all(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Maximum attainable `puntaje_total`.
    pub fn max_score(&self) -> u32 {
        self.criteria.len() as u32 * MAX_CRITERION_SCORE
    }

    /// Compact JSON encoding for embedding in a prompt. Order-stable, UTF-8 unescaped.
    pub fn serialize(&self) -> String {
        // A Vec of plain string structs cannot fail to serialize.
        serde_json::to_string(&self.criteria).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn criterion(name: &str) -> Criterion {
        Criterion {
            name: name.to_string(),
            description: format!("{name} description"),
            rubric: "1 - bajo\n5 - alto".to_string(),
            evidence_hint: "documentos".to_string(),
        }
    }

    #[test]
    fn test_builtin_has_ten_criteria_in_order() {
        let rubric = Rubric::builtin().unwrap();
        assert_eq!(rubric.len(), 10);
        assert_eq!(rubric.max_score(), 50);
        assert_eq!(rubric.all()[0].name, "Origen de la empresa");
        assert_eq!(rubric.all()[1].name, "Sector de actividad");
        assert_eq!(rubric.all()[9].name, "Ventaja competitiva");
    }

    #[test]
    fn test_builtin_rubrics_describe_five_levels() {
        let rubric = Rubric::builtin().unwrap();
        for c in rubric.all() {
            assert_eq!(c.rubric.lines().count(), 5, "{} rubric", c.name);
            assert!(!c.description.is_empty());
            assert!(!c.evidence_hint.is_empty());
        }
    }

    #[test]
    fn test_get_is_exact_match() {
        let rubric = Rubric::builtin().unwrap();
        assert!(rubric.get("Viabilidad técnica").is_some());
        assert!(rubric.get("viabilidad técnica").is_none());
        assert!(rubric.get("Viabilidad tecnica").is_none());
    }

    #[test]
    fn test_serialize_is_stable_and_keeps_accents() {
        let rubric = Rubric::builtin().unwrap();
        let first = rubric.serialize();
        assert_eq!(first, rubric.serialize());
        assert!(first.contains("Solución de base tecnológica"));
        assert!(!first.contains("\\u00"));

        let parsed: Vec<Criterion> = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed, rubric.all());
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(Rubric::new(vec![]).is_err());
        assert!(Rubric::from_json("[]").is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = Rubric::new(vec![criterion("A"), criterion("B"), criterion("A")]).unwrap_err();
        assert!(err.to_string().contains("duplicate criterion name: A"));
    }

    #[test]
    fn test_rejects_blank_name() {
        assert!(Rubric::new(vec![criterion("  ")]).is_err());
    }

    #[test]
    fn test_from_path_loads_alternative_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let table = serde_json::to_string(&vec![criterion("Equipo"), criterion("Tracción")]).unwrap();
        file.write_all(table.as_bytes()).unwrap();

        let rubric = Rubric::from_path(file.path()).unwrap();
        assert_eq!(rubric.len(), 2);
        assert_eq!(rubric.max_score(), 10);
        assert!(rubric.contains("Tracción"));
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let err = Rubric::from_path(Path::new("/nonexistent/criteria.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read criteria file"));
    }
}
