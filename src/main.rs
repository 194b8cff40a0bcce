use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockops::agents::{AgentRegistry, FacilityAgent, FinancialAgent, SupplyChainAgent};
use blockops::config::AppConfig;
use blockops::coordination::{Coordinator, ScenarioContext, ScenarioSpec, Urgency};
use blockops::error::Result;
use blockops::ledger::{Ledger, SmartContractValidator};

#[derive(Parser)]
#[command(name = "blockops", about = "Hospital operations coordination demo")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, default_value = "blockops.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one coordination scenario with the built-in agents
    Coordinate {
        #[arg(long, default_value = "PPE Masks N95")]
        item: String,
        #[arg(long, default_value_t = 1000)]
        required_quantity: u64,
        #[arg(long, default_value = "2.00")]
        price_per_unit: Decimal,
        #[arg(long, default_value = "2000")]
        budget_remaining: Decimal,
        #[arg(long, default_value_t = 800)]
        storage_available: u64,
    },
    /// Print the committed chain
    Chain,
    /// Validate chain integrity and print the report
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let ledger = Arc::new(Ledger::new(
        config.ledger.clone(),
        SmartContractValidator::new(config.validator.clone()),
    )?);

    match cli.command {
        Command::Coordinate {
            item,
            required_quantity,
            price_per_unit,
            budget_remaining,
            storage_available,
        } => {
            let registry = Arc::new(AgentRegistry::new());
            registry.register(Arc::new(SupplyChainAgent::new("SC-001")));
            registry.register(Arc::new(FinancialAgent::new("FIN-001")));
            registry.register(Arc::new(FacilityAgent::new("FAC-001")));

            let coordinator = Coordinator::new(config.coordination, registry, ledger.clone());

            let spec = ScenarioSpec {
                initiator: "SC-001".to_string(),
                participants: vec![
                    "SC-001".to_string(),
                    "FIN-001".to_string(),
                    "FAC-001".to_string(),
                ],
                intent: format!("Order {required_quantity} units of {item}"),
                context: ScenarioContext {
                    item,
                    current_stock: 200,
                    required_quantity,
                    price_per_unit,
                    budget_remaining,
                    storage_available,
                    urgency: Urgency::Medium,
                    supplier: Some("MedSupply Corp".to_string()),
                },
            };

            let session = coordinator.coordinate(spec).await;
            println!("{}", serde_json::to_string_pretty(&session)?);

            let stats = ledger.stats().await;
            info!(
                state = %session.state,
                blocks = stats.total_blocks,
                chain_valid = stats.chain_valid,
                "scenario finished"
            );
        }
        Command::Chain => {
            let blocks = ledger.blocks(0, usize::MAX).await;
            println!("{}", serde_json::to_string_pretty(&blocks)?);
        }
        Command::Validate => {
            let report = ledger.validate_chain().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
