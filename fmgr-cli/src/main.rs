mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use fmgr_core::differ::{create_plan, has_drift};
use fmgr_core::effect::Effect;
use fmgr_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use fmgr_core::plan::Plan;
use fmgr_core::position::DRIFT_ATTRIBUTE;
use fmgr_core::provider::Provider;
use fmgr_core::resource::{Resource, ResourceId, State};
use fmgr_core::schema::ResourceSchema;
use fmgr_provider::resources::configs;
use fmgr_provider::{FmgClient, FortiManagerProvider, MemoryTransport};

use config::DesiredFile;

#[derive(Parser)]
#[command(name = "fmgr")]
#[command(about = "Keep FortiManager ordered lists in the order you declared", long_about = None)]
struct Cli {
    /// Show debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported resource types and their attributes
    Resources,
    /// Validate the desired-state file
    Validate {
        /// Path to desired-state JSON file
        #[arg(default_value = "fmgr.json")]
        file: PathBuf,
    },
    /// Read current order and show which moves are needed
    Plan {
        #[arg(default_value = "fmgr.json")]
        file: PathBuf,

        /// Snapshot of FortiManager collections to operate on
        #[arg(long, default_value = "fmgr.snapshot.json")]
        snapshot: PathBuf,
    },
    /// Issue the moves needed to reach the declared order
    Apply {
        #[arg(default_value = "fmgr.json")]
        file: PathBuf,

        #[arg(long, default_value = "fmgr.snapshot.json")]
        snapshot: PathBuf,

        /// Show what would be done without issuing any move
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Resources => run_resources(),
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file, snapshot } => run_plan(&file, &snapshot).await,
        Commands::Apply {
            file,
            snapshot,
            dry_run,
        } => run_apply(&file, &snapshot, dry_run).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    configs()
        .iter()
        .map(|config| (config.type_name.to_string(), config.schema()))
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    for error in errors {
                        all_errors.push(format!("{}: {}", resource.id, error));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn run_resources() -> Result<(), String> {
    for schema in get_schemas_sorted() {
        println!("{}", schema.resource_type.cyan().bold());
        if let Some(desc) = &schema.description {
            println!("  {}", desc);
        }
        for attr in schema.attributes.values() {
            let flag = if attr.required {
                "required".yellow()
            } else if attr.computed {
                "computed".dimmed()
            } else {
                "optional".normal()
            };
            println!("    {} ({}, {})", attr.name, attr.attr_type, flag);
        }
        println!();
    }
    Ok(())
}

fn get_schemas_sorted() -> Vec<ResourceSchema> {
    let mut schemas: Vec<_> = get_schemas().into_values().collect();
    schemas.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));
    schemas
}

fn load_resources(file: &Path) -> Result<(DesiredFile, Vec<Resource>), String> {
    let desired = DesiredFile::load(file)?;
    let resources = desired.to_resources();
    log::debug!("loaded {} resources from {}", resources.len(), file.display());
    validate_resources(&resources)?;
    Ok((desired, resources))
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (_, resources) = load_resources(file)?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

fn build_provider(
    desired: &DesiredFile,
    snapshot: &Path,
) -> Result<FortiManagerProvider<MemoryTransport>, String> {
    let transport = MemoryTransport::load(snapshot).map_err(|e| e.to_string())?;
    let config = desired.provider.clone().with_env_overrides();
    Ok(FortiManagerProvider::new(FmgClient::new(transport), config))
}

/// Refresh every desired resource against the current collections
async fn read_current_states<P: Provider>(
    provider: &P,
    resources: &[Resource],
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current_states = HashMap::new();
    for resource in resources {
        let prior = State::existing(resource.id.clone(), resource.attributes.clone());
        let state = provider
            .read(&prior)
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        current_states.insert(resource.id.clone(), state);
    }
    Ok(current_states)
}

async fn build_plan(
    provider: &FortiManagerProvider<MemoryTransport>,
    resources: &[Resource],
) -> Result<(Plan, HashMap<ResourceId, State>), String> {
    let current_states = read_current_states(provider, resources).await?;
    let plan = create_plan(resources, &current_states, &get_schemas());
    Ok((plan, current_states))
}

async fn run_plan(file: &Path, snapshot: &Path) -> Result<(), String> {
    let (desired, resources) = load_resources(file)?;
    let provider = build_provider(&desired, snapshot)?;

    let (plan, current_states) = build_plan(&provider, &resources).await?;
    print_plan(&plan, &current_states);
    Ok(())
}

async fn run_apply(file: &Path, snapshot: &Path, dry_run: bool) -> Result<(), String> {
    let (desired, resources) = load_resources(file)?;
    let provider = build_provider(&desired, snapshot)?;

    let (plan, current_states) = build_plan(&provider, &resources).await?;
    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan, &current_states);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        dry_run,
        continue_on_error: true,
    });
    let result = interpreter.apply(&plan).await;

    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Skipped { reason }) => {
                println!("  {} {} ({})", "-".dimmed(), format_effect(effect), reason);
            }
            Ok(outcome) => {
                let drift = outcome
                    .state()
                    .and_then(|s| s.get_str(DRIFT_ATTRIBUTE))
                    .filter(|d| !d.is_empty());
                match drift {
                    Some(d) => println!(
                        "  {} {} (still drifted: {})",
                        "!".yellow(),
                        format_effect(effect),
                        d
                    ),
                    None => println!("  {} {}", "✓".green(), format_effect(effect)),
                }
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        }
    }

    if !dry_run {
        interpreter
            .provider()
            .client()
            .transport()
            .save(snapshot)
            .await
            .map_err(|e| e.to_string())?;
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

fn print_plan(plan: &Plan, current_states: &HashMap<ResourceId, State>) {
    if plan.is_empty() {
        println!("{}", "No changes. Every list is in the declared order.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Create(_) => "+".green().bold(),
            Effect::Update { .. } => "~".yellow().bold(),
            Effect::Delete { .. } => "-".red().bold(),
        };
        println!("  {} {}", symbol, effect.resource_id());

        let reason = current_states
            .get(effect.resource_id())
            .filter(|s| has_drift(s))
            .and_then(|s| s.get_str(DRIFT_ATTRIBUTE));
        if let Some(reason) = reason {
            println!("      {}", reason.dimmed());
        }
    }

    println!();
    println!("{}", plan.summary());
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Delete { state } => format!("Delete {}", state.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmgr_provider::MemoryCollection;
    use serde_json::json;

    const POLICY_URL: &str = "/pm/config/adom/root/pkg/default/firewall/policy";

    fn desired_json() -> &'static str {
        r#"{
            "resources": [{
                "type": "packages_firewall_policy_move",
                "name": "dns_first",
                "attributes": {"pkg": "default", "policy": "3", "target": "1", "option": "before"}
            }]
        }"#
    }

    async fn write_snapshot(path: &Path, order: &[u64]) {
        let transport = MemoryTransport::new();
        transport
            .insert_collection(
                POLICY_URL,
                MemoryCollection::new(
                    "policyid",
                    order.iter().map(|id| json!({ "policyid": id })).collect(),
                ),
            )
            .await;
        transport.save(path).await.unwrap();
    }

    #[test]
    fn validate_reports_unknown_types_and_bad_values() {
        let resources = vec![
            Resource::new("firewall_address", "a"),
            Resource::new("packages_firewall_policy_move", "b")
                .with_string("pkg", "default")
                .with_string("policy", "1")
                .with_string("target", "2")
                .with_string("option", "sideways"),
        ];
        let err = validate_resources(&resources).unwrap_err();
        assert!(err.contains("firewall_address.a: unknown resource type"));
        assert!(err.contains("packages_firewall_policy_move.b: Invalid enum variant 'sideways'"));
    }

    #[test]
    fn schemas_are_sorted() {
        let names: Vec<_> = get_schemas_sorted()
            .into_iter()
            .map(|s| s.resource_type)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn plan_then_apply_reorders_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fmgr.json");
        let snapshot = dir.path().join("fmgr.snapshot.json");
        std::fs::write(&file, desired_json()).unwrap();
        write_snapshot(&snapshot, &[1, 2, 3]).await;

        let (desired, resources) = load_resources(&file).unwrap();
        let provider = build_provider(&desired, &snapshot).unwrap();
        let (plan, current) = build_plan(&provider, &resources).await.unwrap();
        assert_eq!(plan.summary().update, 1);
        let id = ResourceId::new("packages_firewall_policy_move", "dns_first");
        assert_eq!(
            current[&id].get_str(DRIFT_ATTRIBUTE),
            Some("policyid(3) is 2 behind target(1)")
        );

        run_apply(&file, &snapshot, false).await.unwrap();

        let transport = MemoryTransport::load(&snapshot).unwrap();
        let collection = transport.collection(POLICY_URL).await.unwrap();
        assert_eq!(collection.keys(), vec!["3", "1", "2"]);

        let provider = build_provider(&desired, &snapshot).unwrap();
        let (plan, _) = build_plan(&provider, &resources).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn dry_run_leaves_snapshot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fmgr.json");
        let snapshot = dir.path().join("fmgr.snapshot.json");
        std::fs::write(&file, desired_json()).unwrap();
        write_snapshot(&snapshot, &[1, 2, 3]).await;

        run_apply(&file, &snapshot, true).await.unwrap();

        let transport = MemoryTransport::load(&snapshot).unwrap();
        let collection = transport.collection(POLICY_URL).await.unwrap();
        assert_eq!(collection.keys(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn missing_collection_plans_create() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fmgr.json");
        let snapshot = dir.path().join("fmgr.snapshot.json");
        std::fs::write(&file, desired_json()).unwrap();
        std::fs::write(&snapshot, "{}").unwrap();

        let (desired, resources) = load_resources(&file).unwrap();
        let provider = build_provider(&desired, &snapshot).unwrap();
        let (plan, _) = build_plan(&provider, &resources).await.unwrap();
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
    }
}
