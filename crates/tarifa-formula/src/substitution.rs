//! Textual variable substitution
//!
//! Replaces every identifier found in the context with a literal. Matching is
//! by whole word, so `Valor` never touches `ValorPeaje`, and string literals
//! are copied through untouched.

use crate::scan::{is_word_char, skip_quoted, skip_word};
use tarifa_types::{FormulaContext, FormulaValue};

/// Substitute context variables into `formula`. Identifiers that are not in
/// the context are left in place.
pub fn substitute_variables(formula: &str, context: &FormulaContext) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' || ch == '\'' {
            let end = skip_quoted(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
        } else if is_word_char(ch) {
            let end = skip_word(&chars, i);
            let word: String = chars[i..end].iter().collect();
            match context.get(&word) {
                // Digits start numbers, never identifiers
                Some(value) if !ch.is_ascii_digit() => out.push_str(&literal(value)),
                _ => out.push_str(&word),
            }
            i = end;
        } else {
            out.push(ch);
            i += 1;
        }
    }

    out
}

/// Render a value as a formula literal
pub fn literal(value: &FormulaValue) -> String {
    match value {
        FormulaValue::Text(text) => {
            let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        }
        other => {
            let number = other.as_number().unwrap_or(0.0);
            if number < 0.0 { format!("({number})") } else { format!("{number}") }
        }
    }
}
