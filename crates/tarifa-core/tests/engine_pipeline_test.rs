use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tarifa_core::{
    CalculationRequest, Dataset, EngineConfig, ExtraCharge, InMemoryRepository, Rule, TariffEngine,
    TariffError,
};
use tarifa_types::FormulaValue;

const DATASET: &str = r#"{
    "clients": [
        { "id": "C1", "name": "Frigoríficos del Norte", "clientType": "VIP", "category": "A", "discount": 5 }
    ],
    "sites": [
        { "id": "MAD", "name": "Madrid", "coordinates": { "lat": 40.4168, "lng": -3.7038 } },
        { "id": "BCN", "name": "Barcelona", "coordinates": { "lat": 41.3874, "lng": 2.1686 } },
        { "id": "VLC", "name": "Valencia" }
    ],
    "routes": [
        {
            "id": "R1", "clientId": "C1", "originId": "MAD", "destinationId": "BCN",
            "tariffs": [
                { "tramoType": "TRMC", "calculationMethod": "Palet", "rate": 1000, "toll": 200, "validFrom": "2024-01-01" },
                { "tramoType": "TRMC", "calculationMethod": "Palet", "rate": 800, "toll": 100, "validFrom": "2023-01-01", "validTo": "2023-12-31" },
                { "tramoType": "TRMP", "calculationMethod": "Palet", "toll": 100, "validFrom": "2024-01-01" },
                { "tramoType": "TRMD", "rate": 900, "toll": 100, "validFrom": "2024-01-01" }
            ]
        }
    ],
    "methods": [
        { "code": "PALET", "name": "Por palet", "formula": "Valor * Palets + Peaje", "requiresPallets": true, "allowsCustomFormulas": true },
        { "code": "FIJO", "name": "Precio fijo", "formula": "Valor + Peaje" },
        { "code": "KILOMETRO", "name": "Por kilometro", "formula": "Valor * Distancia + Peaje", "requiresDistance": true }
    ],
    "vehicleLimits": [
        { "unitType": "SEMI", "maxCapacity": 33, "maxWeight": 24000 }
    ]
}"#;

fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap()
}

fn repository() -> Arc<InMemoryRepository> {
    let dataset: Dataset = serde_json::from_str(DATASET).unwrap();
    Arc::new(InMemoryRepository::from_dataset(dataset))
}

fn engine_with(repository: &Arc<InMemoryRepository>, config: EngineConfig) -> TariffEngine {
    TariffEngine::new(repository.clone(), config)
}

fn request(pallets: f64) -> CalculationRequest {
    let mut request = CalculationRequest::new("C1", "MAD", "BCN", "TRMC");
    request.date = Some(wednesday());
    request.pallets = Some(pallets);
    request.unit_type = Some("SEMI".into());
    request
}

fn rule(json: &str) -> Rule {
    serde_json::from_str(json).unwrap()
}

/// Fixed-price request for 1000 with no toll
fn fixed_thousand() -> CalculationRequest {
    let mut request = request(0.0);
    request.method_override = Some("FIJO".into());
    request.variables.insert("Valor".into(), FormulaValue::Number(1000.0));
    request.variables.insert("Peaje".into(), FormulaValue::Number(0.0));
    request
}

#[tokio::test]
async fn pallet_method_splits_tariff_and_toll() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let result = engine.calculate(&request(5.0)).await.unwrap();

    assert_eq!(result.tariff_base, 5000.0);
    assert_eq!(result.toll, 200.0);
    assert_eq!(result.total, 5200.0);
    assert_eq!(result.method_used, "PALET");
    assert_eq!(result.formula_used, "Valor * Palets + Peaje");
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert!(!result.cache_hit);
}

#[tokio::test]
async fn rules_apply_in_priority_order_with_deltas() {
    let repository = repository();
    repository.add_rule(rule(
        r#"{ "id": "r2", "code": "DESC50", "name": "Descuento fijo", "priority": 5,
             "modifier": { "kind": "fixed", "value": -50 } }"#,
    ));
    repository.add_rule(rule(
        r#"{ "id": "r1", "code": "REC10", "name": "Recargo 10%", "priority": 10,
             "modifier": { "kind": "percentage", "value": 10, "applyTo": "total" } }"#,
    ));
    let engine = engine_with(&repository, EngineConfig::default());

    let result = engine.calculate(&fixed_thousand()).await.unwrap();

    let deltas: Vec<_> = result.applied_rules.iter().map(|r| (r.code.as_str(), r.delta)).collect();
    assert_eq!(deltas, vec![("REC10", 100.0), ("DESC50", -50.0)]);
    assert_eq!(result.total, 1050.0);
    assert_eq!(result.method_used, "FIJO");
    assert_eq!(result.tariff_base + result.toll + result.extras, result.total);
}

#[tokio::test]
async fn excluding_rule_stops_later_rules() {
    let repository = repository();
    repository.add_rule(rule(
        r#"{ "id": "a", "code": "TOPE", "name": "Tarifa plana", "priority": 10, "excludesOthers": true,
             "modifier": { "kind": "fixed", "value": -100 } }"#,
    ));
    repository.add_rule(rule(
        r#"{ "id": "b", "code": "EXTRA", "name": "Recargo", "priority": 1,
             "modifier": { "kind": "fixed", "value": 500 } }"#,
    ));
    let engine = engine_with(&repository, EngineConfig::default());

    let result = engine.calculate(&fixed_thousand()).await.unwrap();

    assert_eq!(result.applied_rules.len(), 1);
    assert_eq!(result.applied_rules[0].code, "TOPE");
    assert_eq!(result.total, 900.0);
}

#[tokio::test]
async fn rule_conditions_see_holidays_and_scope() {
    let repository = repository();
    repository.add_rule(rule(
        r#"{ "id": "f", "code": "FESTIVO", "name": "Recargo festivo", "priority": 1,
             "conditions": [ { "field": "EsFestivo", "operator": "equals", "value": true } ],
             "modifier": { "kind": "percentage", "value": 20 } }"#,
    ));
    repository.add_rule(rule(
        r#"{ "id": "o", "code": "OTRO", "name": "Otro cliente", "priority": 1, "clientIds": ["C9"],
             "modifier": { "kind": "fixed", "value": 1 } }"#,
    ));

    let plain = engine_with(&repository, EngineConfig::default());
    assert_eq!(plain.calculate(&request(5.0)).await.unwrap().total, 5200.0);

    let config = EngineConfig { holidays: vec![wednesday().date_naive()], ..EngineConfig::default() };
    let holiday = engine_with(&repository, config);
    let result = holiday.calculate(&request(5.0)).await.unwrap();
    assert_eq!(result.total, 6240.0);
    assert_eq!(result.applied_rules.len(), 1);
    assert_eq!(result.applied_rules[0].delta, 1040.0);
}

#[tokio::test]
async fn cached_result_is_served_on_second_call() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());
    let mut request = request(5.0);
    request.use_cache = true;

    let first = engine.calculate(&request).await.unwrap();
    let second = engine.calculate(&request).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.total, second.total);

    let stats = engine.audit().stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn highest_priority_valid_custom_formula_wins() {
    let repository = repository();
    for (id, priority, from, to, formula) in [
        ("cf-low", 1, "2024-01-01", None, "Valor * Palets + Peaje + 1"),
        ("cf-high", 5, "2024-01-01", None, "Valor * Palets * 0.9 + Peaje"),
        ("cf-expired", 9, "2023-01-01", Some("2023-12-31"), "1"),
        ("cf-future", 9, "2025-01-01", None, "2"),
    ] {
        let to = to.map(|t| format!(r#""{t}""#)).unwrap_or_else(|| "null".into());
        let json = format!(
            r#"{{ "id": "{id}", "clientId": "C1", "methodCode": "PALET", "formula": "{formula}",
                  "validFrom": "{from}", "validTo": {to}, "priority": {priority},
                  "createdAt": "2024-01-01T00:00:00Z" }}"#
        );
        repository.add_custom_formula(serde_json::from_str(&json).unwrap());
    }
    let engine = engine_with(&repository, EngineConfig::default());

    let result = engine.calculate(&request(5.0)).await.unwrap();

    assert_eq!(result.custom_formula_id.as_deref(), Some("cf-high"));
    assert_eq!(result.tariff_base, 4500.0);
    assert_eq!(result.total, 4700.0);
    assert_eq!(repository.custom_formula_usage("cf-high"), Some(1));
    assert_eq!(repository.custom_formula_usage("cf-low"), Some(0));
}

#[tokio::test]
async fn missing_references_fail_and_are_audited() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut unknown_client = request(5.0);
    unknown_client.client_id = "NOPE".into();
    let err = engine.calculate(&unknown_client).await.unwrap_err();
    assert!(matches!(err, TariffError::ReferenceNotFound { entity: "Client", .. }));

    let mut no_route = request(5.0);
    no_route.destination_id = "VLC".into();
    let err = engine.calculate(&no_route).await.unwrap_err();
    assert!(matches!(err, TariffError::NoApplicableRoute { .. }));

    let stats = engine.audit().stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.failures, 2);
}

#[tokio::test]
async fn great_circle_distance_when_route_has_none() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut request = request(0.0);
    request.method_override = Some("Kilometro".into());
    request.variables.insert("Valor".into(), FormulaValue::Number(1.0));

    let result = engine.calculate(&request).await.unwrap();
    assert_eq!(result.method_used, "KILOMETRO");
    // Madrid to Barcelona is about 505 km; toll still comes from the route tariff
    assert!((result.tariff_base - 505.0).abs() < 10.0, "{}", result.tariff_base);
    assert_eq!(result.toll, 200.0);
}

#[tokio::test]
async fn negative_tariff_is_rejected() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut request = fixed_thousand();
    request.variables.insert("Valor".into(), FormulaValue::Number(-10.0));

    let err = engine.calculate(&request).await.unwrap_err();
    assert!(matches!(err, TariffError::Validation { .. }));
}

#[tokio::test]
async fn extras_breakdown_and_warnings() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut request = request(5.0);
    request.extras = vec![ExtraCharge { concept: "Carga lateral".into(), amount: 50.0 }];
    request.include_breakdown = true;

    let result = engine.calculate(&request).await.unwrap();
    assert_eq!(result.extras, 50.0);
    assert_eq!(result.total, 5250.0);

    let breakdown = result.breakdown.unwrap();
    let labels: Vec<_> = breakdown.steps.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Base tariff", "Toll", "Extra: Carga lateral", "Total"]);
    assert_eq!(
        breakdown.variables.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Palets", "Peaje", "Valor"]
    );

    let no_pallets = engine.calculate(&request_without_pallets()).await.unwrap();
    assert_eq!(no_pallets.total, 200.0);
    assert!(no_pallets.warnings.iter().any(|w| w.contains("pallet")));
}

fn request_without_pallets() -> CalculationRequest {
    let mut request = request(0.0);
    request.pallets = None;
    request
}

#[tokio::test]
async fn batch_keeps_input_order() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut bad = request(1.0);
    bad.client_id = "NOPE".into();
    let results = engine.calculate_many(&[request(1.0), bad, request(3.0)]).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().map(|r| r.total).ok(), Some(1200.0));
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().map(|r| r.total).ok(), Some(3200.0));
}

#[tokio::test]
async fn unconfigured_override_falls_back_to_route_method() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut request = request(5.0);
    request.method_override = Some("TELEPORT".into());

    let result = engine.calculate(&request).await.unwrap();
    assert_eq!(result.method_used, "PALET");
    assert_eq!(result.total, 5200.0);
}

#[tokio::test]
async fn tariff_missing_rate_or_method_is_invalid() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut no_rate = request(5.0);
    no_rate.tramo_type = "TRMP".into();
    let err = engine.calculate(&no_rate).await.unwrap_err();
    assert!(matches!(err, TariffError::InvalidFormulaData { .. }), "{err:?}");

    let mut no_method = request(5.0);
    no_method.tramo_type = "TRMD".into();
    let err = engine.calculate(&no_method).await.unwrap_err();
    assert!(matches!(err, TariffError::InvalidFormulaData { .. }), "{err:?}");

    // An explicit Valor stands in for the missing rate
    no_rate.variables.insert("Valor".into(), FormulaValue::Number(10.0));
    assert_eq!(engine.calculate(&no_rate).await.unwrap().total, 150.0);

    assert_eq!(engine.audit().stats().failures, 2);
}

#[tokio::test]
async fn cache_keeps_requests_with_different_inputs_apart() {
    let repository = repository();
    let engine = engine_with(&repository, EngineConfig::default());

    let mut plain = request(5.0);
    plain.use_cache = true;
    let mut adjusted = plain.clone();
    adjusted.variables.insert("Valor".into(), FormulaValue::Number(1.0));
    adjusted.extras = vec![ExtraCharge { concept: "Espera".into(), amount: 50.0 }];

    let first = engine.calculate(&plain).await.unwrap();
    let second = engine.calculate(&adjusted).await.unwrap();
    let third = engine.calculate(&adjusted).await.unwrap();

    assert_eq!(first.total, 5200.0);
    assert!(!second.cache_hit);
    assert_eq!(second.total, 255.0);
    assert!(third.cache_hit);
    assert_eq!(third.total, 255.0);
}

#[tokio::test]
async fn formula_with_unknown_variable_fails_evaluation() {
    let repository = repository();
    repository.add_custom_formula(
        serde_json::from_str(
            r#"{ "id": "cf-bad", "clientId": "C1", "methodCode": "PALET", "formula": "Valor * Desconocido",
                 "validFrom": "2024-01-01", "createdAt": "2024-01-01T00:00:00Z" }"#,
        )
        .unwrap(),
    );
    let engine = engine_with(&repository, EngineConfig::default());

    let err = engine.calculate(&request(5.0)).await.unwrap_err();
    assert!(matches!(err, TariffError::Evaluation { ref formula, .. } if formula == "Valor * Desconocido"));
    assert_eq!(err.category(), "evaluation");

    let failures = engine.audit().query(&tarifa_core::AuditFilter { has_errors: Some(true), ..Default::default() });
    assert_eq!(failures.len(), 1);
    assert!(failures[0].errors[0].contains("Desconocido"));
    assert_eq!(engine.audit().stats().failures, 1);
}

#[tokio::test]
async fn many_tier_formula_prices_without_hitting_depth_limits() {
    let repository = repository();
    let tiers: Vec<String> = (1..=40).map(|i| format!("{}: {}", i, 2000 - i * 10)).collect();
    let formula = format!("TARIFAESCALONADA(Palets; {}) * Palets + Peaje", tiers.join("; "));
    let json = serde_json::json!({
        "id": "cf-tiers", "clientId": "C1", "methodCode": "PALET", "formula": formula,
        "validFrom": "2024-01-01", "createdAt": "2024-01-01T00:00:00Z"
    });
    repository.add_custom_formula(serde_json::from_value(json).unwrap());
    let engine = engine_with(&repository, EngineConfig::default());

    let result = engine.calculate(&request(25.0)).await.unwrap();
    assert_eq!(result.custom_formula_id.as_deref(), Some("cf-tiers"));
    assert_eq!(result.tariff_base, 1750.0 * 25.0);
    assert_eq!(result.total, 1750.0 * 25.0 + 200.0);
}
