use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tarifa_core::{CalculationRequest, InMemoryRepository, TariffEngine};
use tarifa_formula::FormulaEvaluator;
use tarifa_types::{FormulaContext, FormulaValue};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

/// Logistics tariff calculator
#[derive(Parser)]
#[command(name = "tarifa", version, about = "Price transport legs with formulas and rules")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price one request, or a JSON array of requests, against a dataset
    Calculate {
        /// Dataset with clients, sites, routes, methods, formulas and rules
        #[arg(short, long)]
        data: PathBuf,

        /// Calculation request file
        #[arg(short, long)]
        request: PathBuf,

        /// Print the audit statistics after the run
        #[arg(long)]
        stats: bool,
    },

    /// Evaluate a formula against explicit variables
    Evaluate {
        #[arg(short, long)]
        formula: String,

        /// Variable binding, `Name=value`
        #[arg(short, long = "var", value_parser = parse_binding)]
        vars: Vec<(String, FormulaValue)>,
    },

    /// Report unknown functions and missing variables in a formula
    Validate {
        #[arg(short, long)]
        formula: String,

        #[arg(short, long = "var", value_parser = parse_binding)]
        vars: Vec<(String, FormulaValue)>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tarifa_core=info,tarifa_cli=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Calculate { data, request, stats } => {
            let repository = Arc::new(InMemoryRepository::from_json_file(&data)?);
            let engine = TariffEngine::new(repository, config);
            calculate(&engine, &request).await?;
            if stats {
                eprintln!("{}", serde_json::to_string_pretty(&engine.audit().stats())?);
            }
        }
        Command::Evaluate { formula, vars } => {
            let evaluator = FormulaEvaluator::new(config.evaluator_limits());
            let context: FormulaContext = vars.into_iter().collect();
            let evaluation = evaluator.evaluate_with_fallback(&formula, &context)?;
            info!(prepared = %evaluation.prepared, fallback = evaluation.used_fallback, "Formula evaluated");
            println!("{}", evaluation.value);
        }
        Command::Validate { formula, vars } => {
            let evaluator = FormulaEvaluator::new(config.evaluator_limits());
            let context: FormulaContext = vars.into_iter().collect();
            let problems = evaluator.validate(&formula, &context);
            if problems.is_empty() {
                println!("ok");
            } else {
                for problem in &problems {
                    println!("{problem}");
                }
                bail!("formula has {} problem(s)", problems.len());
            }
        }
    }

    Ok(())
}

async fn calculate(engine: &TariffEngine, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading request {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;

    if json.is_array() {
        let requests: Vec<CalculationRequest> = serde_json::from_value(json)?;
        let results = engine.calculate_many(&requests).await;
        let output: Vec<serde_json::Value> = results
            .into_iter()
            .map(|result| match result {
                Ok(result) => serde_json::to_value(result).unwrap_or_default(),
                Err(e) => serde_json::json!({ "error": e.to_string(), "category": e.category() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let request: CalculationRequest = serde_json::from_value(json)?;
        let result = engine.calculate(&request).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

/// `Name=value`; numbers and `true`/`false` are typed, anything else is text
fn parse_binding(raw: &str) -> Result<(String, FormulaValue), String> {
    let (name, value) = raw.split_once('=').ok_or_else(|| format!("expected Name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = value.trim();
    let value = if let Ok(n) = value.parse::<f64>() {
        FormulaValue::Number(n)
    } else if let Ok(b) = value.parse::<bool>() {
        FormulaValue::Boolean(b)
    } else {
        FormulaValue::Text(value.to_string())
    };
    Ok((name.to_string(), value))
}
