//! Domain function rewriting
//!
//! Tariff formulas are authored with spreadsheet-style helpers (`SI`,
//! `REDONDEAR`, `TARIFAESCALONADA`, ...). Before parsing, each helper call is
//! rewritten into operators and built-ins the evaluator understands. The
//! rewrites run in a fixed order and are pure text transformations; only the
//! calendar helpers read the context or the clock.

use crate::error::{EvalResult, EvaluationError};
use crate::scan::{is_word_char, matching_paren, skip_quoted, skip_word, split_top_level};
use chrono::{DateTime, Datelike, Utc, Weekday};
use tarifa_types::{FormulaContext, keys};

type Rewrite<'a> = &'a dyn Fn(&[String]) -> EvalResult<String>;

/// Rewrite every helper call in `formula`, reading calendar facts from the
/// context and falling back to the current time
pub fn preprocess(formula: &str, context: &FormulaContext) -> EvalResult<String> {
    preprocess_at(formula, context, Utc::now())
}

/// Same as [`preprocess`] with an explicit clock
pub fn preprocess_at(
    formula: &str,
    context: &FormulaContext,
    now: DateTime<Utc>,
) -> EvalResult<String> {
    let mut text = normalize_decimal_commas(formula);

    text = rewrite_calls(&text, "SI", &rewrite_si)?;
    text = rewrite_calls(&text, "REDONDEAR", &rewrite_redondear)?;
    text = rewrite_calls(&text, "PROMEDIO", &rewrite_promedio)?;

    let weekday = weekday_number(context, now);
    let month = month_number(context, now);
    let weekend = weekend_flag(context, now);

    text = rewrite_calls(&text, "DIASEMANA", &|args| constant("DIASEMANA", args, weekday))?;
    text = rewrite_calls(&text, "MES", &|args| constant("MES", args, month))?;
    text = rewrite_calls(&text, "TRIMESTRE", &|args| constant("TRIMESTRE", args, quarter(month)))?;
    text = rewrite_calls(&text, "ESFINDESEMANA", &|args| {
        constant("ESFINDESEMANA", args, u32::from(weekend))
    })?;

    rewrite_calls(&text, "TARIFAESCALONADA", &rewrite_tarifa_escalonada)
}

/// Replace a decimal comma between two digits with a point, outside string
/// literals
pub fn normalize_decimal_commas(formula: &str) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => {
                let end = skip_quoted(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
                continue;
            }
            ',' if i > 0
                && chars[i - 1].is_ascii_digit()
                && chars.get(i + 1).is_some_and(char::is_ascii_digit) =>
            {
                out.push('.');
            }
            ch => out.push(ch),
        }
        i += 1;
    }
    out
}

/// Rewrite every call to `name` (case-insensitive, whole word). Arguments
/// are rewritten first so nested calls of the same helper expand inside out.
fn rewrite_calls(input: &str, name: &str, rewrite: Rewrite<'_>) -> EvalResult<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' || ch == '\'' {
            let end = skip_quoted(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if !is_word_char(ch) {
            out.push(ch);
            i += 1;
            continue;
        }

        let word_end = skip_word(&chars, i);
        let word: String = chars[i..word_end].iter().collect();
        if !word.eq_ignore_ascii_case(name) {
            out.push_str(&word);
            i = word_end;
            continue;
        }

        let mut open = word_end;
        while open < chars.len() && chars[open].is_whitespace() {
            open += 1;
        }
        if chars.get(open) != Some(&'(') {
            out.push_str(&word);
            i = word_end;
            continue;
        }

        let close = matching_paren(&chars, open).ok_or_else(|| {
            EvaluationError::syntax(open, format!("unbalanced parentheses in call to {name}"))
        })?;

        let inner = &chars[open + 1..close];
        let args = if inner.iter().all(|c| c.is_whitespace()) {
            Vec::new()
        } else {
            split_top_level(inner, ';')
                .iter()
                .map(|arg| rewrite_calls(arg.trim(), name, rewrite))
                .collect::<EvalResult<Vec<_>>>()?
        };

        out.push_str(&rewrite(&args)?);
        i = close + 1;
    }

    Ok(out)
}

fn expect_args(function: &str, args: &[String], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max { format!("{min}") } else { format!("{min} to {max}") };
        return Err(EvaluationError::arguments(
            function,
            format!("expects {expected} arguments, got {}", args.len()),
        ));
    }
    if args.iter().any(|arg| arg.is_empty()) {
        return Err(EvaluationError::arguments(function, "empty argument"));
    }
    Ok(())
}

fn rewrite_si(args: &[String]) -> EvalResult<String> {
    expect_args("SI", args, 3, 3)?;
    Ok(format!("(({}) ? ({}) : ({}))", args[0], args[1], args[2]))
}

fn rewrite_redondear(args: &[String]) -> EvalResult<String> {
    expect_args("REDONDEAR", args, 1, 2)?;
    let decimals = args.get(1).map_or("0", String::as_str);
    Ok(format!("(round(({}) * 10 ^ ({decimals})) / 10 ^ ({decimals}))", args[0]))
}

fn rewrite_promedio(args: &[String]) -> EvalResult<String> {
    expect_args("PROMEDIO", args, 1, usize::MAX)?;
    let sum = args.iter().map(|arg| format!("({arg})")).collect::<Vec<_>>().join(" + ");
    Ok(format!("(({sum}) / ({}))", args.len()))
}

fn constant(function: &str, args: &[String], value: u32) -> EvalResult<String> {
    expect_args(function, args, 0, 0)?;
    Ok(value.to_string())
}

fn rewrite_tarifa_escalonada(args: &[String]) -> EvalResult<String> {
    const NAME: &str = "TARIFAESCALONADA";
    expect_args(NAME, args, 2, usize::MAX)?;

    let value = &args[0];
    let mut tiers = Vec::with_capacity(args.len() - 1);
    for pair in &args[1..] {
        let chars: Vec<char> = pair.chars().collect();
        let parts = split_top_level(&chars, ':');
        let [threshold, rate] = parts.as_slice() else {
            return Err(EvaluationError::arguments(
                NAME,
                format!("tier '{pair}' must have the form threshold:rate"),
            ));
        };
        let threshold: f64 = threshold.trim().parse().map_err(|_| {
            EvaluationError::arguments(NAME, format!("tier threshold '{}' is not a number", threshold.trim()))
        })?;
        let rate = rate.trim();
        if rate.is_empty() {
            return Err(EvaluationError::arguments(NAME, format!("tier '{pair}' has no rate")));
        }
        tiers.push((threshold, rate.to_string()));
    }

    // Stable: the first of several equal thresholds wins
    tiers.sort_by(|a, b| a.0.total_cmp(&b.0));

    let Some((_, top_rate)) = tiers.last() else {
        return Err(EvaluationError::arguments(NAME, "at least one tier is required"));
    };
    // Flat lookup call, so nesting does not grow with the number of tiers
    let mut expr = format!("tiered(({value})");
    for (threshold, rate) in &tiers[..tiers.len() - 1] {
        expr.push_str(&format!("; {threshold}; ({rate})"));
    }
    expr.push_str(&format!("; ({top_rate}))"));
    Ok(expr)
}

fn weekday_number(context: &FormulaContext, now: DateTime<Utc>) -> u32 {
    if context.contains(keys::DIA_SEMANA) {
        return context.number(keys::DIA_SEMANA) as u32;
    }
    now.weekday().num_days_from_sunday()
}

fn month_number(context: &FormulaContext, now: DateTime<Utc>) -> u32 {
    if context.contains(keys::MES) {
        return context.number(keys::MES) as u32;
    }
    now.month()
}

fn weekend_flag(context: &FormulaContext, now: DateTime<Utc>) -> bool {
    if context.contains(keys::ES_FIN_DE_SEMANA) {
        return context.flag(keys::ES_FIN_DE_SEMANA);
    }
    matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

fn quarter(month: u32) -> u32 {
    month.saturating_sub(1) / 3 + 1
}
