//! The `lorafactory schema` command: inspect model schemas, validate and
//! translate parameter sets.

use clap::{Args, Subcommand};
use lorafactory_core::schema::ParameterDescriptor;
use lorafactory_core::{
    cost_multiplier, validate_parameters, Config, ModelSchema, ParamMap, ParameterTranslator,
    SchemaStore,
};
use serde_json::{json, Value};

/// Arguments for the `schema` command.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

/// Options shared by `validate` and `map`.
#[derive(Args, Debug)]
pub struct ParamArgs {
    /// Model id, e.g. fal-ai/flux/dev
    pub model: String,

    /// Provider the parameters are shaped for
    #[arg(long, default_value = "fal")]
    pub provider: String,

    /// Generic parameter as key=value (repeatable)
    #[arg(short, long = "param", value_parser = super::parse_param)]
    pub params: Vec<(String, Value)>,
}

impl ParamArgs {
    fn generic(&self) -> ParamMap {
        self.params.iter().cloned().collect()
    }
}

/// Subcommands for schema management.
#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Show a model's parameters
    Show {
        /// Model id
        model: String,

        /// Print the schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Translate parameters and check them against the model schema
    Validate(ParamArgs),

    /// Print the provider-shaped parameters and their cost factor
    Map(ParamArgs),

    /// Remove cached schemas
    ClearCache,
}

/// Execute the schema command.
pub async fn execute(args: SchemaArgs, config: Config) -> anyhow::Result<()> {
    let store = SchemaStore::from_config(&config);
    let translator = ParameterTranslator::new();

    match args.command {
        SchemaCommand::Show { model, json } => {
            let schema = store.fetch_schema(&model).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                print_schema(&schema);
            }
        }

        SchemaCommand::Validate(params) => {
            let schema = store.fetch_schema(&params.model).await;
            let mut values = translator.map_parameters(
                &params.model,
                &params.provider,
                &params.generic(),
                &ParamMap::new(),
            );
            // Prompts travel on the request; only check the rest.
            values
                .entry("prompt".to_string())
                .or_insert(json!("validation sample"));

            let report = validate_parameters(&schema, &values);
            if report.valid {
                println!("Valid for {} ({} schema)", schema.model_id, schema.source);
                return Ok(());
            }
            for issue in &report.errors {
                eprintln!("  {}: {}", issue.field, issue.message);
            }
            anyhow::bail!(
                "{} parameter error(s) for {}",
                report.errors.len(),
                schema.model_id
            );
        }

        SchemaCommand::Map(params) => {
            let mapped = translator.map_parameters(
                &params.model,
                &params.provider,
                &params.generic(),
                &ParamMap::new(),
            );
            let output = json!({
                "model": params.model,
                "provider": params.provider,
                "parameters": mapped,
                "cost_multiplier": cost_multiplier(&mapped),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        SchemaCommand::ClearCache => {
            let removed = store.clear_cache()?;
            tracing::info!("Removed {removed} cached schema(s)");
            println!("Removed {removed} cached schema(s)");
        }
    }

    Ok(())
}

fn print_schema(schema: &ModelSchema) {
    println!("{} ({} schema)", schema.model_id, schema.source);
    println!();
    for param in &schema.parameters {
        println!("  {}", describe(param));
    }
}

/// One display line for a parameter.
fn describe(param: &ParameterDescriptor) -> String {
    let kind = serde_json::to_value(param.kind)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    let mut line = format!("{:<24} {:<8}", param.name, kind);
    if param.required {
        line.push_str(" required");
    }
    if let Some(default) = &param.default {
        line.push_str(&format!(" default={default}"));
    }
    let c = &param.constraints;
    match (c.minimum, c.maximum) {
        (Some(min), Some(max)) => line.push_str(&format!(" range={min}..{max}")),
        (Some(min), None) => line.push_str(&format!(" min={min}")),
        (None, Some(max)) => line.push_str(&format!(" max={max}")),
        (None, None) => {}
    }
    if !c.values.is_empty() {
        let values: Vec<String> = c.values.iter().map(Value::to_string).collect();
        line.push_str(&format!(" one of [{}]", values.join(", ")));
    }
    line
}
