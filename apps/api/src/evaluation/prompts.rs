// LLM prompt templates for the evaluation module.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// System prompt for application evaluation.
pub const EVALUATION_SYSTEM: &str = JSON_ONLY_SYSTEM;

/// Evaluation prompt template.
/// Replace: {criteria_json}, {application_text}
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"Actúa como un evaluador experto para un programa de selección de empresas latinoamericanas que buscan expandirse a Brasil.

Tu tarea es evaluar la siguiente postulación según los {criteria_count} criterios establecidos.

CRITERIOS DE EVALUACIÓN (JSON):
{criteria_json}

INSTRUCCIONES:
1. Evalúa cada criterio en una escala del 1 al 5 según su rúbrica.
2. Para cada criterio, proporciona:
   - Una justificación detallada del puntaje asignado
   - Recomendaciones específicas para que la empresa pueda mejorar en ese criterio
3. Extrae un resumen conciso de la empresa con: nombre, país de origen y propuesta de valor principal.
4. Calcula el puntaje total (máximo {max_score}), el porcentaje del puntaje máximo posible y determina si la empresa es seleccionada (porcentaje > 75%).
5. El campo "criterio" debe repetir EXACTAMENTE el "name" de cada criterio. Incluye una entrada por criterio, sin repetir.

Devuelve tu evaluación como UN ÚNICO objeto JSON con esta estructura exacta:
{
  "resumen": {
    "nombre": "Nombre de la empresa",
    "origen": "País de origen",
    "propuesta_valor": "Breve descripción de la propuesta de valor"
  },
  "evaluaciones": [
    {
      "criterio": "Nombre del criterio",
      "puntaje": 4,
      "justificacion": "Justificación del puntaje asignado",
      "recomendacion": "Recomendación para mejorar el puntaje"
    }
  ],
  "puntaje_total": 40,
  "porcentaje": 80.0,
  "seleccionada": true
}

RESPUESTAS DEL FORMULARIO:
{application_text}"#;

/// Fills the evaluation template. Deterministic; performs no validation of the text.
///
/// The application text is substituted last so placeholder-looking text inside it
/// is never expanded.
pub fn build_prompt(
    application_text: &str,
    criteria_json: &str,
    criteria_count: usize,
    max_score: u32,
) -> String {
    EVALUATION_PROMPT_TEMPLATE
        .replace("{criteria_count}", &criteria_count.to_string())
        .replace("{max_score}", &max_score.to_string())
        .replace("{criteria_json}", criteria_json)
        .replace("{application_text}", application_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::domain::REQUIRED_FIELDS;
    use crate::rubric::Rubric;

    fn prompt_for(text: &str) -> String {
        let rubric = Rubric::builtin().unwrap();
        build_prompt(text, &rubric.serialize(), rubric.len(), rubric.max_score())
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(prompt_for("Somos Acme"), prompt_for("Somos Acme"));
    }

    #[test]
    fn test_prompt_embeds_application_and_rubric() {
        let prompt = prompt_for("Nuestra empresa, Acme, opera en Lima desde 2019.");
        assert!(prompt.contains("Nuestra empresa, Acme, opera en Lima desde 2019."));
        assert!(prompt.contains("Origen de la empresa"));
        assert!(prompt.contains("Ventaja competitiva"));
        assert!(prompt.contains("los 10 criterios"));
        assert!(prompt.contains("máximo 50"));
        assert!(prompt.contains("75%"));
    }

    #[test]
    fn test_prompt_names_every_wire_field() {
        let prompt = prompt_for("x");
        for field in REQUIRED_FIELDS {
            assert!(prompt.contains(&format!("\"{field}\"")), "missing {field}");
        }
        let nested = [
            "nombre",
            "origen",
            "propuesta_valor",
            "criterio",
            "puntaje",
            "justificacion",
            "recomendacion",
        ];
        for field in nested {
            assert!(prompt.contains(&format!("\"{field}\"")), "missing {field}");
        }
    }

    #[test]
    fn test_placeholders_inside_application_text_are_not_expanded() {
        let prompt = prompt_for("texto con {criteria_json} literal");
        assert!(prompt.contains("texto con {criteria_json} literal"));
        assert!(!prompt.contains("{application_text}"));
    }

    #[test]
    fn test_empty_text_still_builds() {
        let prompt = prompt_for("");
        assert!(prompt.ends_with("RESPUESTAS DEL FORMULARIO:\n"));
    }
}
