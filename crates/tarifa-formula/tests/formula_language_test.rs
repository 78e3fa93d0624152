use proptest::prelude::*;
use tarifa_formula::{EvaluationError, FormulaEvaluator};
use tarifa_types::FormulaContext;

fn evaluate(formula: &str, context: &FormulaContext) -> f64 {
    FormulaEvaluator::default().evaluate(formula, context).unwrap()
}

#[test]
fn standard_arithmetic() {
    let empty = FormulaContext::new();
    assert_eq!(evaluate("2+3*4", &empty), 14.0);
    assert_eq!(evaluate("10 / 4 - 1", &empty), 1.5);
    assert_eq!(evaluate("2 ^ 10", &empty), 1024.0);
    assert_eq!(evaluate("-2 ^ 2", &empty), -4.0);
    assert_eq!(evaluate("max(1; 7; 3) + min(4; 2)", &empty), 9.0);
}

#[test]
fn whole_word_variables() {
    let context = FormulaContext::new().with("Valor", 1000.0).with("ValorPeaje", 7.0);
    assert_eq!(evaluate("ValorPeaje*2", &context), 14.0);
}

#[test]
fn si_selects_branch_on_truthiness() {
    let evaluator = FormulaEvaluator::default();
    for (cond, expected) in [(1.0, 10.0), (-3.0, 10.0), (0.5, 10.0), (0.0, 20.0)] {
        let context = FormulaContext::new().with("Cond", cond);
        assert_eq!(evaluator.evaluate("SI(Cond; 10; 20)", &context).unwrap(), expected);
    }
}

#[test]
fn redondear_rounds_half_away_from_zero() {
    let empty = FormulaContext::new();
    assert!((evaluate("REDONDEAR(1.005;2)", &empty) - 1.01).abs() < 1e-9);
    assert!((evaluate("REDONDEAR(-1,005;2)", &empty) + 1.01).abs() < 1e-9);
    assert!((evaluate("REDONDEAR(2.5)", &empty) - 3.0).abs() < 1e-9);
}

#[test]
fn tiered_rate_picks_smallest_threshold_at_or_above() {
    let empty = FormulaContext::new();
    assert_eq!(evaluate("TARIFAESCALONADA(150; 100:10; 200:20; 300:30)", &empty), 20.0);
    assert_eq!(evaluate("TARIFAESCALONADA(250; 100:10; 200:20; 300:30)", &empty), 30.0);
    assert_eq!(evaluate("TARIFAESCALONADA(100; 100:10; 200:20; 300:30)", &empty), 10.0);
    assert_eq!(evaluate("TARIFAESCALONADA(900; 100:10; 200:20; 300:30)", &empty), 30.0);
    // Unsorted and duplicated thresholds
    assert_eq!(evaluate("TARIFAESCALONADA(150; 300:30; 200:20; 200:25; 100:10)", &empty), 20.0);
}

#[test]
fn tiered_rate_scales_to_many_tiers() {
    let tiers: Vec<String> = (1..=40).map(|i| format!("{}:{}", i * 10, i)).collect();
    let formula = |value: u32| format!("TARIFAESCALONADA({value}; {})", tiers.join("; "));
    let empty = FormulaContext::new();

    assert_eq!(evaluate(&formula(235), &empty), 24.0);
    assert_eq!(evaluate(&formula(10), &empty), 1.0);
    assert_eq!(evaluate(&formula(5000), &empty), 40.0);
}

#[test]
fn promedio_and_nested_helpers() {
    let context = FormulaContext::new().with("Palets", 12.0).with("Valor", 100.0);
    assert_eq!(evaluate("PROMEDIO(2; 4; 6)", &context), 4.0);
    assert_eq!(
        evaluate("SI(Palets > 10; REDONDEAR(Valor * 0,955; 1); Valor) * Palets", &context),
        95.5 * 12.0
    );
}

#[test]
fn calendar_helpers_read_context() {
    let context = FormulaContext::new().with("DiaSemana", 0.0).with("Mes", 12.0);
    assert_eq!(evaluate("DIASEMANA() * 100 + MES() * 10 + TRIMESTRE()", &context), 124.0);
}

#[test]
fn failures_are_typed_and_never_defaulted() {
    let evaluator = FormulaEvaluator::default();
    let empty = FormulaContext::new();

    assert!(matches!(
        evaluator.evaluate("Valor * 2", &empty),
        Err(EvaluationError::UnknownIdentifier { .. })
    ));
    assert!(matches!(evaluator.evaluate("(1 + 2", &empty), Err(EvaluationError::Syntax { .. })));
    assert!(matches!(evaluator.evaluate("1 / 0", &empty), Err(EvaluationError::NonFinite { .. })));
}

#[test]
fn fallback_returns_primary_error_when_both_fail() {
    let evaluator = FormulaEvaluator::default();
    let err = evaluator.evaluate_with_fallback("Falta + 1", &FormulaContext::new()).unwrap_err();
    assert_eq!(err, EvaluationError::UnknownIdentifier { name: "Falta".into() });

    let ok = evaluator
        .evaluate_with_fallback("Valor + 1", &FormulaContext::new().with("Valor", 1.0))
        .unwrap();
    assert_eq!(ok.value, 2.0);
    assert!(!ok.used_fallback);
}

#[test]
fn restricted_evaluator_uses_same_substitution() {
    let evaluator = FormulaEvaluator::default();
    let context = FormulaContext::new().with("Valor", 1000.0).with("Peaje", 200.0).with("Palets", 5.0);
    let prepared = evaluator.prepare("SI(Palets > 0; Valor * Palets; 0) + Peaje", &context).unwrap();

    assert_eq!(evaluator.evaluate_restricted(&prepared, &context).unwrap(), 5200.0);
    assert!(matches!(
        evaluator.evaluate_restricted("max(Valor; 1)", &context),
        Err(EvaluationError::Forbidden { .. })
    ));
}

proptest! {
    #[test]
    fn primary_and_restricted_agree_on_arithmetic(
        a in -1000i32..1000,
        b in -1000i32..1000,
        c in 1i32..1000,
    ) {
        let evaluator = FormulaEvaluator::default();
        let context = FormulaContext::new()
            .with("A", f64::from(a))
            .with("B", f64::from(b))
            .with("C", f64::from(c));
        let formula = "(A + B) * C - A / C";

        let expected = (f64::from(a) + f64::from(b)) * f64::from(c) - f64::from(a) / f64::from(c);
        let primary = evaluator.evaluate(formula, &context).unwrap();
        let restricted = evaluator.evaluate_restricted(formula, &context).unwrap();

        prop_assert!((primary - expected).abs() < 1e-9);
        prop_assert!((restricted - expected).abs() < 1e-9);
    }

    #[test]
    fn substitution_never_matches_inside_longer_names(value in 0.0f64..1e6) {
        let context = FormulaContext::new().with("Valor", -1.0).with("ValorPeaje", value);
        let result = FormulaEvaluator::default().evaluate("ValorPeaje", &context).unwrap();
        prop_assert_eq!(result, value);
    }
}
