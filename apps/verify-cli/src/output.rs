//! Terminal rendering of catalog entries, diffs and errors

use shared_types::{Verification, VerificationId};
use verify_client::ApiError;
use verify_core::{
    Comparisons, ConfigError, DiffKind, DiffToken, DocumentError, FileError, RenderError,
    SubmitError,
};

pub fn print_catalog(entries: &[&Verification], selected: Option<&VerificationId>) {
    if entries.is_empty() {
        println!("(no verifications)");
        return;
    }
    for entry in entries {
        let marker = if Some(&entry.id) == selected { '*' } else { ' ' };
        println!(
            "{} {:>6}  {:<24}  {:<9}  {}",
            marker,
            entry.id.as_str(),
            entry.name,
            format!("{:?}", entry.status).to_lowercase(),
            entry.created_at
        );
    }
}

pub fn print_verification(verification: &Verification) {
    println!("{} ({})", verification.name, verification.id);
    println!(
        "  status: {}",
        format!("{:?}", verification.status).to_lowercase()
    );
    if !verification.created_at.is_empty() {
        println!("  created: {}", verification.created_at);
    }
    for kind in shared_types::ArtifactKind::ALL {
        let Some(info) = verification
            .artifact_info(kind)
            .filter(|info| info.exists)
        else {
            continue;
        };
        let name = info.filename.as_deref().unwrap_or(kind.default_file_name());
        match &info.ocr_scope {
            Some(scope) => println!("  {}: {} (scope {})", kind, name, scope),
            None => println!("  {}: {}", kind, name),
        }
    }
}

pub fn print_comparisons(comparisons: &Comparisons) {
    if !comparisons.invalid_titles.is_empty() {
        println!("Unmatched titles: {}", comparisons.invalid_titles.join("、"));
    }
    for field in &comparisons.fields {
        let marker = if field.has_differences() { '!' } else { ' ' };
        println!("{} {}: {}", marker, field.field, render_diff(&field.tokens));
    }
}

pub fn print_diff(tokens: &[DiffToken]) {
    println!("{}", render_diff(tokens));
}

/// Inline diff: `[+...]` only in the document, `[-...]` only in the OCR text
pub fn render_diff(tokens: &[DiffToken]) -> String {
    tokens
        .iter()
        .map(|token| match token.kind {
            DiffKind::Equal => token.text.clone(),
            DiffKind::Added => format!("[+{}]", token.text),
            DiffKind::Removed => format!("[-{}]", token.text),
        })
        .collect()
}

/// Localized message for the first known error in the chain
pub fn error_message(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SubmitError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<FileError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<DocumentError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<RenderError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<ApiError>() {
            return e.user_message();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.to_string();
        }
    }
    format!("{:#}", err)
}
