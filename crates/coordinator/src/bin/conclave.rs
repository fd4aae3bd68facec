//! Run one coordination session from the command line.
//!
//! Usage:
//!   conclave "Design and build a responsive navbar"
//!   conclave --config conclave.toml 设计并实现一个响应式导航栏组件
//!
//! Logging is controlled by `RUST_LOG`.

use conclave_coordinator::{AgentSession, CoordinatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    println!("Conclave team coordinator");
    println!();
    println!("Usage: conclave [OPTIONS] <OBJECTIVE>...");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>   Path to a TOML config file");
    println!("  -h, --help            Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,conclave=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut words: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let Some(path) = args.get(i + 1) else {
                    anyhow::bail!("--config needs a file path");
                };
                config_path = Some(path.clone());
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            word => words.push(word.to_string()),
        }
        i += 1;
    }

    let objective = words.join(" ");
    if objective.trim().is_empty() {
        print_help();
        anyhow::bail!("no objective given");
    }

    let config = match config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading configuration");
            CoordinatorConfig::from_file(&path)?
        }
        None => CoordinatorConfig::default(),
    };

    let session = AgentSession::new(config)?;
    let progress = session.submit_task(&objective).await?;

    if let Some(plan) = session.coordinator().current_plan() {
        println!("Objective: {}", plan.objective);
        for (n, step) in plan.steps.iter().enumerate() {
            println!(
                "  {}. [{}] {} ({})",
                n + 1,
                step.status,
                step.description,
                step.assigned_to
            );
        }
    }
    println!("Progress: {}", progress);
    println!();
    println!("Transcript:");
    for message in session.transcript() {
        println!(
            "  {} {} -> {} ({}): {}",
            message.timestamp.format("%H:%M:%S%.3f"),
            message.sender_id,
            message.recipient_id.as_deref().unwrap_or("*"),
            message.message_type,
            message.content_string()
        );
    }

    session.dispose();
    Ok(())
}
