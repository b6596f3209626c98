// Shared prompt fragments used by every LLM call.
// Feature-specific templates live next to the code that fills them.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "Eres un asistente preciso y estructurado. \
    Debes responder ÚNICAMENTE con un objeto JSON válido. \
    No incluyas texto fuera del objeto JSON. \
    No uses bloques de código markdown. \
    No incluyas explicaciones ni disculpas.";
