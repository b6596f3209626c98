// Application evaluation: prompt assembly, the completion call, reply extraction
// and local reconciliation. All LLM calls go through llm_client.

pub mod assessment;
pub mod domain;
pub mod extractor;
pub mod handlers;
pub mod prompts;
pub mod service;
