//! Evaluation flow. One user action sends one completion request.
//!
//! Flow: validate input → build prompt → complete → extract → store in session.
//!
//! The caller owns the `SessionContext` and passes it in; nothing here touches
//! shared state. On any failure the session keeps its previous result.

use tracing::{info, warn};

use crate::errors::AppError;
use crate::evaluation::assessment::Assessment;
use crate::evaluation::domain::{ApplicationInput, EvaluationResult};
use crate::evaluation::extractor::extract;
use crate::evaluation::prompts::{build_prompt, EVALUATION_SYSTEM};
use crate::llm_client::CompletionClient;
use crate::rubric::Rubric;
use crate::session::SessionContext;

/// Runs one evaluation for `session`.
///
/// Rejects a blank credential or blank application text with `MissingInput`
/// before any request is sent. No retries on any failure.
pub async fn evaluate(
    session: &mut SessionContext,
    input: &ApplicationInput,
    credential: Option<&str>,
    llm: &dyn CompletionClient,
    rubric: &Rubric,
) -> Result<EvaluationResult, AppError> {
    let credential = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            AppError::MissingInput(
                "An API key for the completion endpoint is required".to_string(),
            )
        })?;

    if input.is_blank() {
        return Err(AppError::MissingInput(
            "application_text cannot be empty".to_string(),
        ));
    }

    info!(
        session = %session.id,
        chars = input.raw_text.chars().count(),
        "Evaluating application"
    );

    session.processing = true;
    let outcome = request_evaluation(input, credential, llm, rubric).await;
    session.processing = false;

    match outcome {
        Ok(result) => {
            let assessment = Assessment::new(&result, rubric);
            if !assessment.is_consistent() {
                assessment.log_warnings(&result.company_summary.name);
            }
            info!(
                session = %session.id,
                company = %result.company_summary.name,
                total = assessment.total_score,
                max = assessment.max_score,
                percentage = assessment.percentage,
                selected = assessment.selected,
                "Evaluation completed"
            );
            session.store_result(result.clone());
            Ok(result)
        }
        Err(e) => {
            warn!(session = %session.id, code = e.code(), "Evaluation failed: {e}");
            Err(e)
        }
    }
}

async fn request_evaluation(
    input: &ApplicationInput,
    credential: &str,
    llm: &dyn CompletionClient,
    rubric: &Rubric,
) -> Result<EvaluationResult, AppError> {
    let prompt = build_prompt(
        &input.raw_text,
        &rubric.serialize(),
        rubric.len(),
        rubric.max_score(),
    );

    let reply = llm.complete(credential, EVALUATION_SYSTEM, &prompt).await?;

    extract(&reply)
}
