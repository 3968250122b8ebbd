use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

// Portal credentials show up in adapter diagnostics (login forms, request
// dumps); scrub key/value shapes plus bearer headers before anything is
// buffered or persisted.
static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(senha|password|passwd|token|secret|api[_-]?key|authorization)\b\s*[=:]\s*\S+",
    )
    .expect("credential pattern")
});

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").expect("bearer pattern"));

// Formatted CPF/CNPJ document numbers count as PII in log output.
static CPF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}\.\d{3}\.\d{3}-\d{2}\b").expect("cpf pattern"));

static CNPJ_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}\b").expect("cnpj pattern"));

/// Scrubs credential material and document numbers from a log message.
///
/// Returns the input unchanged (borrowed) when nothing matches.
pub fn sanitize_message(message: &str) -> Cow<'_, str> {
    if !CREDENTIAL_RE.is_match(message)
        && !BEARER_RE.is_match(message)
        && !CPF_RE.is_match(message)
        && !CNPJ_RE.is_match(message)
    {
        return Cow::Borrowed(message);
    }

    // Bearer first: the credential pattern would otherwise consume the
    // "Bearer" word and leave the token itself behind.
    let out = BEARER_RE.replace_all(message, "bearer [redacted]");
    let out = CREDENTIAL_RE.replace_all(&out, "$1=[redacted]");
    let out = CPF_RE.replace_all(&out, "[cpf-redacted]");
    let out = CNPJ_RE.replace_all(&out, "[cnpj-redacted]");
    Cow::Owned(out.into_owned())
}
