use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tarifa_formula::FormulaEvaluator;
use tarifa_types::FormulaContext;

fn pricing_context() -> FormulaContext {
    FormulaContext::new()
        .with("Valor", 1000.0)
        .with("Peaje", 200.0)
        .with("Palets", 5.0)
        .with("Distancia", 420.5)
        .with("Peso", 1800.0)
        .with("EsFestivo", false)
}

fn formula_evaluation_benchmark(c: &mut Criterion) {
    let evaluator = FormulaEvaluator::default();
    let context = pricing_context();

    c.bench_function("simple_pallet_formula", |b| {
        b.iter(|| evaluator.evaluate(black_box("Valor * Palets + Peaje"), &context))
    });

    c.bench_function("helper_heavy_formula", |b| {
        let formula = "SI(EsFestivo; 1,25; 1) * REDONDEAR(Valor * Palets * \
                       TARIFAESCALONADA(Peso; 500:1; 1000:0,95; 2000:0,9; 5000:0,85); 2) + Peaje";
        b.iter(|| evaluator.evaluate(black_box(formula), &context))
    });

    c.bench_function("restricted_fallback", |b| {
        let prepared = evaluator
            .prepare("SI(Palets > 3; Valor * Palets; Valor * 3) + Peaje", &context)
            .unwrap_or_default();
        b.iter(|| evaluator.evaluate_restricted(black_box(&prepared), &context))
    });
}

criterion_group!(benches, formula_evaluation_benchmark);
criterion_main!(benches);
