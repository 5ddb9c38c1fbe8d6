use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use refinecore::{
    ApprovalDecision, ExecutionStatus, LogLevel, NodeSpec, TaskType, Workflow,
};
use refineruntime::{compile, Engine, MemoryLedger, MemoryStore, RunReport, StepRegistry, Storage};
use refinetasks::AnnotatingAssistant;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "refine")]
#[command(about = "Credit-metered code transformation workflows", long_about = None)]
struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file against a code file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Path to the code artifact to transform
        #[arg(short, long)]
        code: PathBuf,

        /// Credit balance to run with
        #[arg(long, default_value_t = 50)]
        credits: u32,
    },

    /// Compile a workflow file and report the plan or its violations
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available task types
    Tasks,

    /// Write an example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run { file, code, credits } => run_workflow(file, code, credits).await?,
        Commands::Validate { file } => validate_workflow(file)?,
        Commands::Tasks => list_tasks(),
        Commands::Init { output } => create_example_workflow(output)?,
    }

    Ok(())
}

fn load_workflow(file: &PathBuf) -> Result<Workflow> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow file {}", file.display()))?;
    serde_json::from_str(&json).context("parsing workflow JSON")
}

async fn run_workflow(file: PathBuf, code_path: PathBuf, credits: u32) -> Result<()> {
    let workflow = load_workflow(&file)?;
    let starting_code = std::fs::read_to_string(&code_path)
        .with_context(|| format!("reading code file {}", code_path.display()))?;

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let mut registry = StepRegistry::new();
    refinetasks::register_all(&mut registry, Arc::new(AnnotatingAssistant));

    let user_id = Uuid::new_v4();
    let component_id = Uuid::new_v4();
    ledger.grant(user_id, credits).await;

    let engine = Engine::new(store.clone(), ledger.clone(), Arc::new(registry));

    println!("🚀 Running '{}' with {} credits", workflow.name, credits);
    let mut report = engine
        .start_run(workflow, component_id, user_id, starting_code.as_str())
        .await?;

    while report.status == ExecutionStatus::WaitingForApproval {
        report = handle_approval(&engine, &store, report).await?;
    }

    print_phases(&store, report.execution_id).await?;
    println!(
        "\nRun {}: {} phase(s), {} credit(s) consumed",
        status_label(report.status),
        report.phases_run,
        report.credits_consumed,
    );

    if report.status == ExecutionStatus::Completed {
        if let Some(component) = store.component(component_id).await? {
            if let Some(code) = component.code.as_str() {
                println!("\n── resulting code ──\n{code}");
            }
        }
    }

    Ok(())
}

/// Show the frozen pair and ask for the decision on stdin
async fn handle_approval(
    engine: &Engine,
    store: &Arc<MemoryStore>,
    report: RunReport,
) -> Result<RunReport> {
    use refinecore::{approval_slots, PhaseStatus};

    let phases = store.phases(report.execution_id).await?;
    if let Some(gate) = phases
        .iter()
        .find(|p| p.status == PhaseStatus::WaitingForApproval)
    {
        if let Some(pending) = gate
            .temp
            .get(approval_slots::PENDING_CODE)
            .and_then(|v| v.as_str())
        {
            println!("\n── pending change ──\n{pending}\n────────────────────");
        }
    }

    print!("Approve this change? [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let decision = if line.trim().eq_ignore_ascii_case("y") {
        ApprovalDecision::Approved
    } else {
        ApprovalDecision::Rejected
    };

    Ok(engine.resume(report.execution_id, decision).await?)
}

async fn print_phases(store: &Arc<MemoryStore>, execution_id: refinecore::ExecutionId) -> Result<()> {
    println!("\n{:<4} {:<24} {:<20} {:>7}", "#", "step", "status", "credits");
    for phase in store.phases(execution_id).await? {
        println!(
            "{:<4} {:<24} {:<20} {:>7}",
            phase.number + 1,
            phase.node.label(),
            format!("{:?}", phase.status),
            phase.credits_cost,
        );
        for log in store.logs(phase.id).await? {
            let mark = match log.level {
                LogLevel::Error => "✗",
                LogLevel::Warn => "!",
                LogLevel::Info => "·",
            };
            println!("       {mark} {}", log.message);
        }
    }
    Ok(())
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Running => "still running",
        ExecutionStatus::WaitingForApproval => "waiting for approval",
    }
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    let workflow = load_workflow(&file)?;

    match compile(&workflow.nodes, &workflow.edges) {
        Ok(plan) => {
            println!("✅ '{}' compiles to {} phase(s):", workflow.name, plan.phases.len());
            for (i, phase) in plan.phases.iter().enumerate() {
                let names: Vec<String> = phase.nodes.iter().map(|n| n.label()).collect();
                println!("  phase {}: [{}]", i + 1, names.join(", "));
            }
        }
        Err(err) => {
            println!("❌ '{}' is invalid: {err}", workflow.name);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn list_tasks() {
    println!("{:<20} {:>7}  {:<6}  ports", "task", "credits", "entry");
    for task_type in TaskType::ALL {
        let d = task_type.descriptor();
        let inputs: Vec<&str> = d.inputs.iter().map(|i| i.name).collect();
        let outputs: Vec<&str> = d.outputs.iter().map(|o| o.name).collect();
        println!(
            "{:<20} {:>7}  {:<6}  in: [{}] out: [{}]",
            task_type.tag(),
            d.credits,
            if d.entry_point { "yes" } else { "" },
            inputs.join(", "),
            outputs.join(", "),
        );
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("optimize-and-test");
    workflow.description = Some("Optimize code, gate on approval, add tests, save".to_string());

    let context = workflow.add_node(
        NodeSpec::new(TaskType::SetContext)
            .with_name("Set context")
            .with_input("Code", "fn add(a: i32, b: i32) -> i32 { a + b }")
            .with_position(0.0, 0.0),
    );
    let optimize = workflow.add_node(
        NodeSpec::new(TaskType::OptimizeCode)
            .with_name("Optimize")
            .with_position(240.0, 0.0),
    );
    let approval = workflow.add_node(
        NodeSpec::new(TaskType::RequestApproval)
            .with_name("Human approval")
            .with_position(480.0, 0.0),
    );
    let tests = workflow.add_node(
        NodeSpec::new(TaskType::AddUnitTests)
            .with_name("Unit tests")
            .with_position(720.0, 0.0),
    );
    let save = workflow.add_node(
        NodeSpec::new(TaskType::SaveResults)
            .with_name("Save")
            .with_position(960.0, 0.0),
    );

    workflow.connect(context, "Code", optimize, "Code");
    workflow.connect(optimize, "Code", approval, "Code");
    workflow.connect(approval, "Code", tests, "Code");
    workflow.connect(tests, "Tests", save, "Results");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;
    println!("📝 Wrote example workflow to {}", output.display());
    println!("   Try: refine validate {}", output.display());
    Ok(())
}
