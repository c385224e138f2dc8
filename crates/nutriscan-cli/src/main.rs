use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use nutriscan_client::{HttpOrchestratorClient, OrchestratorBackend};
use nutriscan_core::ChatSession;
use nutriscan_schema::{
    AnalysisPreferences, ChatMessage, ChatRole, CompatibilityReport, ScanOutcome,
};
use nutriscan_store::DataStore;

#[derive(Parser)]
#[command(
    name = "nutriscan",
    version,
    about = "Food label scanner and health objective assistant"
)]
struct Cli {
    #[arg(
        long,
        default_value = "~/.nutriscan",
        help = "Data directory for persisted state"
    )]
    data_dir: PathBuf,

    #[arg(
        long,
        default_value = "http://localhost:5002",
        help = "Base URL of the orchestration backend"
    )]
    api_base: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Interactive chat with the health assistant")]
    Chat,
    #[command(subcommand, about = "Manage health objectives")]
    Objective(ObjectiveCommands),
    #[command(about = "Scan a food label photo against your objectives")]
    Scan {
        #[arg(help = "Path to the label image")]
        image: PathBuf,
    },
    #[command(about = "Analyze a label photo against a declared health profile")]
    Analyze {
        #[arg(help = "Path to the label image")]
        image: PathBuf,
        #[arg(long, default_value = "none", help = "Diet type (e.g. vegan, keto)")]
        diet_type: String,
        #[arg(long = "allergy", help = "Declared allergy (repeatable)")]
        allergies: Vec<String>,
        #[arg(long = "condition", help = "Free-text health condition (repeatable)")]
        conditions: Vec<String>,
    },
    #[command(about = "Show tracked health metrics")]
    Profile,
    #[command(about = "Show recent scan history")]
    History,
    #[command(about = "Clear all persisted data")]
    Reset {
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ObjectiveCommands {
    #[command(about = "Start the objective definition flow")]
    Add {
        #[arg(help = "Initial goal statement")]
        text: Option<String>,
    },
    #[command(about = "List objectives (most recent is active)")]
    List,
    #[command(about = "Delete an objective by index")]
    Delete {
        #[arg(help = "Index from 'objective list'")]
        index: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    cli.data_dir = expand_home(cli.data_dir);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = DataStore::new(&cli.data_dir);
    let backend: Arc<dyn OrchestratorBackend> =
        Arc::new(HttpOrchestratorClient::new(&cli.api_base));

    match cli.command {
        Commands::Chat => {
            let mut session = ChatSession::load(store, backend.clone()).await?;
            if let Err(error) = backend.health().await {
                tracing::warn!(%error, "backend health check failed; messages may not go through");
            }
            println!("nutriscan chat. Type 'quit' to exit.");
            println!("---");
            for message in session.conversation() {
                render_message(message);
            }
            chat_loop(&mut session).await?;
        }
        Commands::Objective(cmd) => {
            let mut session = ChatSession::load(store, backend).await?;
            run_objective_command(&mut session, cmd).await?;
        }
        Commands::Scan { image } => {
            let mut session = ChatSession::load(store, backend).await?;
            let payload = read_image_base64(&image)?;
            let report = session.scan_food(&payload).await?;
            match report.scan {
                Some(scan) => print_scan(&scan),
                None => {
                    // no verdict: surface whatever the assistant said instead
                    print_latest_assistant(&session);
                }
            }
        }
        Commands::Analyze {
            image,
            diet_type,
            allergies,
            conditions,
        } => {
            let payload = read_image_base64(&image)?;
            let preferences = AnalysisPreferences {
                diet_type,
                allergies,
                health_conditions: conditions,
            };
            let analysis = backend.analyze_label(&payload, &preferences).await?;
            print_list("Identified ingredients", &analysis.identified_ingredients);
            print_list("Health benefits", &analysis.health_benefits);
            print_list("Health risks", &analysis.health_risks);
            print_compatibility("Diet & allergy compatibility", &analysis.diet_compatibility);
            print_compatibility("Impact on health conditions", &analysis.health_impact);
        }
        Commands::Profile => {
            let session = ChatSession::load(store, backend).await?;
            if session.profile().is_empty() {
                println!("No metrics tracked yet.");
            }
            for (name, record) in session.profile().iter() {
                let value = if record.value.is_empty() {
                    "(no value)"
                } else {
                    record.value.as_str()
                };
                println!("{name}: {value}");
                println!("    objectives: {}", record.objective_ids.join(", "));
            }
        }
        Commands::History => {
            let session = ChatSession::load(store, backend).await?;
            if session.history().is_empty() {
                println!("No scanned items yet.");
            }
            for entry in session.history() {
                let verdict = if entry.is_allowed {
                    "allowed"
                } else {
                    "not recommended"
                };
                let local = entry.timestamp.with_timezone(&chrono::Local);
                println!(
                    "[{verdict}] {} - {}",
                    entry.food_item,
                    local.format("%Y-%m-%d %H:%M")
                );
                println!("    {}", entry.reason);
            }
        }
        Commands::Reset { yes } => {
            if !yes && !confirm_reset()? {
                println!("Aborted.");
                return Ok(());
            }
            let mut session = ChatSession::load(store, backend).await?;
            session.reset().await?;
            println!("All data cleared.");
        }
    }

    Ok(())
}

async fn run_objective_command(
    session: &mut ChatSession,
    cmd: ObjectiveCommands,
) -> Result<()> {
    match cmd {
        ObjectiveCommands::Add { text } => {
            if let Some(text) = &text {
                if text.trim().is_empty() {
                    bail!("objective text must not be empty");
                }
            }
            session.start_objective_definition().await?;
            print_latest_assistant(session);
            if let Some(text) = text {
                println!("you> {text}");
                let report = session.submit_message(&text).await?;
                if let Some(objective) = &report.objective_added {
                    println!("[objective added] {objective}");
                }
                print_latest_assistant(session);
            }
            chat_loop(session).await?;
        }
        ObjectiveCommands::List => {
            if session.objectives().is_empty() {
                println!("No objectives defined yet.");
            }
            let last = session.objectives().len().saturating_sub(1);
            for (index, objective) in session.objectives().iter().enumerate() {
                let marker = if index == last { " (active)" } else { "" };
                println!("{index}: {objective}{marker}");
            }
        }
        ObjectiveCommands::Delete { index } => {
            let removed = session.delete_objective(index).await?;
            println!("Deleted objective: {removed}");
        }
    }
    Ok(())
}

/// Read stdin lines into the session until the user quits.
async fn chat_loop(session: &mut ChatSession) -> Result<()> {
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let report = session.submit_message(input).await?;
        if report.skipped {
            continue;
        }
        if let Some(objective) = &report.objective_added {
            println!("[objective added] {objective}");
        }
        if let Some(scan) = &report.scan {
            print_scan(scan);
        }
        print_latest_assistant(session);
    }
    Ok(())
}

fn render_message(message: &ChatMessage) {
    match message.role {
        ChatRole::User => println!("you> {}", message.content),
        ChatRole::Assistant => println!("assistant> {}", message.content),
        // flow markers are never shown
        ChatRole::System => {}
    }
}

fn print_latest_assistant(session: &ChatSession) {
    if let Some(message) = session
        .conversation()
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
    {
        println!("assistant> {}", message.content);
    }
}

fn print_scan(scan: &ScanOutcome) {
    let verdict = if scan.is_allowed {
        "Good choice!"
    } else {
        "Not recommended"
    };
    println!("{verdict}");
    if !scan.food_item.is_empty() {
        println!("Food item: {}", scan.food_item);
    }
    println!("Reason: {}", scan.reason);
}

fn print_list(title: &str, items: &[String]) {
    println!("{title}:");
    if items.is_empty() {
        println!("    (none)");
    }
    for item in items {
        println!("    - {item}");
    }
}

fn print_compatibility(title: &str, report: &CompatibilityReport) {
    println!("{title} [{:?}]:", report.status);
    for detail in &report.details {
        println!("    - {detail}");
    }
}

fn read_image_base64(path: &PathBuf) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn confirm_reset() -> Result<bool> {
    print!(
        "This will clear all your objectives, health profile, and conversation history. Continue? [y/N] "
    );
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

fn expand_home(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match std::env::var_os("HOME") {
        Some(home) => {
            let rest = path.strip_prefix("~").unwrap_or(&path).to_path_buf();
            PathBuf::from(home).join(rest)
        }
        None => path,
    }
}
