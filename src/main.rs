//! Loopwright - iterative loop controller with progress analysis
//!
//! Command-line surface over [`loopwright::LoopController`]. Each invocation
//! loads the loop from the project's snapshot, performs one operation and
//! exits.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use loopwright::collab::{
    prepare_iteration, CommandToolRunner, GitCli, TemplateCatalog, ToolRunner, VersionControl,
};
use loopwright::controller::render_history;
use loopwright::state::parse_max_iterations;
use loopwright::{
    IterationMetadata, IterationOutcome, LoopController, LoopError, LoopOptions, LoopwrightConfig,
};

#[derive(Parser)]
#[command(name = "loopwright")]
#[command(version)]
#[command(about = "Iterative loop controller with durable history and progress analysis", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines on stderr as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new loop
    Start {
        /// Task prompt (the task description when --template is used)
        prompt: Option<String>,

        /// Maximum iterations, 0 for unbounded
        #[arg(short, long, value_name = "N")]
        max_iterations: Option<String>,

        /// Exact text that completes the loop when wrapped in <promise> tags
        #[arg(short, long, value_name = "TEXT")]
        completion_promise: Option<String>,

        /// Record working tree changes for each iteration
        #[arg(long)]
        git: bool,

        /// Commit after every iteration (implies --git)
        #[arg(long)]
        auto_commit: bool,

        /// Build the prompt from a built-in template
        #[arg(short, long, value_name = "NAME")]
        template: Option<String>,

        /// Replace an already active loop
        #[arg(short, long)]
        force: bool,
    },

    /// Report the result of the current iteration
    Iterate {
        /// Iteration output (read from stdin when omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Error seen during the iteration (repeatable)
        #[arg(short, long = "error", value_name = "ERROR")]
        errors: Vec<String>,

        /// File modified during the iteration (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<String>,

        /// Command run during the iteration (repeatable)
        #[arg(long = "command", value_name = "CMD")]
        commands: Vec<String>,

        /// Tool preset to run before recording the iteration
        #[arg(long, value_name = "NAME")]
        preset: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel the active loop
    Cancel,

    /// Show the active loop
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the active loop's iterations
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the durable history log across all loops
    Log {
        /// Show only the last N records
        #[arg(short, long, value_name = "N")]
        tail: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List built-in loop templates
    Templates,

    /// List tool presets
    Presets,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration and state file locations
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "loopwright=debug,info"
    } else {
        "loopwright=info,warn"
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &project_path).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(command: Commands, project: &Path) -> loopwright::Result<()> {
    let config = LoopwrightConfig::load(project)?;

    match command {
        Commands::Start {
            prompt,
            max_iterations,
            completion_promise,
            git,
            auto_commit,
            template,
            force,
        } => {
            let catalog = TemplateCatalog::new();
            let mut options = match (&template, prompt) {
                (Some(name), Some(task)) => catalog.render(name, &task)?,
                (Some(_), None) => {
                    return Err(LoopError::invalid("task", "a template needs a task description"))
                }
                (None, Some(prompt)) => LoopOptions::new(prompt),
                (None, None) => return Err(LoopError::invalid("prompt", "is required")),
            };
            if let Some(raw) = max_iterations {
                options.max_iterations = parse_max_iterations(&raw)?;
            }
            if let Some(promise) = completion_promise {
                options.completion_promise = Some(promise);
            }
            options = options.git_enabled(git || auto_commit).auto_commit(auto_commit);

            let mut controller = LoopController::open(project, &config);
            if let Some(active) = controller.state() {
                if !force {
                    return Err(LoopError::Other(anyhow::anyhow!(
                        "a loop is already active at iteration {}; cancel it or use --force",
                        active.iteration
                    )));
                }
            }

            let state = controller.start_loop(options)?;
            println!(
                "{} Loop started at iteration {}",
                "OK".green().bold(),
                state.iteration
            );
            if let Some(promise) = &state.completion_promise {
                println!(
                    "   Finish by replying with {}",
                    format!("<promise>{promise}</promise>").cyan()
                );
            }
            if let Some(preset) = template
                .as_deref()
                .and_then(|name| catalog.get(name))
                .and_then(|t| t.tool_preset)
            {
                println!(
                    "   Run checks each iteration with {}",
                    format!("loopwright iterate --preset {preset}").cyan()
                );
            }
            println!("\n{}", state.prompt);
        }

        Commands::Iterate {
            output,
            errors,
            files,
            commands,
            preset,
            json,
        } => {
            let output = match output {
                Some(output) => output,
                None => {
                    let mut buffer = String::new();
                    tokio::io::stdin().read_to_string(&mut buffer).await?;
                    buffer
                }
            };

            let mut metadata = IterationMetadata::new();
            if !errors.is_empty() {
                metadata = metadata.with_errors(errors);
            }
            if !files.is_empty() {
                metadata = metadata.with_files_modified(files);
            }
            if !commands.is_empty() {
                metadata = metadata.with_commands_run(commands);
            }

            let mut controller = LoopController::open(project, &config);
            if let Some(state) = controller.state() {
                let git = (state.git_enabled && GitCli::is_available()).then(|| {
                    GitCli::new(project).with_commit_prefix(config.git.commit_prefix.clone())
                });
                let tools = preset
                    .as_ref()
                    .map(|_| CommandToolRunner::from_config(project, &config.tools));
                metadata = prepare_iteration(
                    state,
                    metadata,
                    &output,
                    git.as_ref().map(|g| g as &dyn VersionControl),
                    tools.as_ref().map(|t| t as &dyn ToolRunner),
                    preset.as_deref(),
                )
                .await?;
            }

            let outcome = controller.process_iteration(&output, metadata);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }

        Commands::Cancel => {
            let mut controller = LoopController::open(project, &config);
            if controller.cancel_loop() {
                println!("{} Loop cancelled", "OK".green().bold());
            } else {
                println!("{} No active loop", "Note:".yellow());
            }
        }

        Commands::Status { json } => {
            let controller = LoopController::open(project, &config);
            if json {
                let document = serde_json::json!({
                    "active": controller.is_loop_active(),
                    "state": controller.state(),
                    "progress": controller.progress(),
                });
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print!("{}", controller.status());
            }
        }

        Commands::History { json } => {
            let controller = LoopController::open(project, &config);
            if json {
                println!("{}", serde_json::to_string_pretty(controller.history())?);
            } else {
                print!("{}", controller.history_report());
            }
        }

        Commands::Log { tail, json } => {
            let controller = LoopController::open(project, &config);
            let records = controller.read_log()?;
            let skip = tail.map_or(0, |n| records.len().saturating_sub(n));
            let records = &records[skip..];
            if json {
                println!("{}", serde_json::to_string_pretty(records)?);
            } else {
                print!("{}", render_history(records));
            }
        }

        Commands::Templates => {
            let catalog = TemplateCatalog::new();
            println!("{}", "Templates:".cyan());
            for template in catalog.iter() {
                println!(
                    "   {:<10} {} (max {} iterations, promise: {}, preset: {})",
                    template.name.bold(),
                    template.description,
                    template.max_iterations,
                    template.completion_promise,
                    template.tool_preset.unwrap_or("none")
                );
            }
        }

        Commands::Presets => {
            let runner = CommandToolRunner::from_config(project, &config.tools);
            println!("{}", "Tool presets:".cyan());
            for (name, specs) in runner.presets() {
                println!("   {}", name.bold());
                for spec in specs {
                    println!("      {:<6} {}", spec.name, spec.command);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Path => {
                println!(
                    "project config: {}",
                    LoopwrightConfig::project_config_path(project).display()
                );
                if let Some(user) = LoopwrightConfig::user_config_path() {
                    println!("user config:    {}", user.display());
                }
                println!(
                    "snapshot:       {}",
                    config.storage.snapshot_path(project).display()
                );
                println!(
                    "history log:    {}",
                    config.storage.history_path(project).display()
                );
            }
        },
    }

    Ok(())
}

fn print_outcome(outcome: &IterationOutcome) {
    match outcome {
        IterationOutcome::NoActiveLoop => {
            println!("{} No active loop", "Note:".yellow());
        }
        IterationOutcome::Completed {
            iteration, reason, ..
        } => {
            println!(
                "{} Loop complete after iteration {}: {}",
                "OK".green().bold(),
                iteration,
                reason
            );
        }
        IterationOutcome::Continue {
            iteration,
            next_prompt,
            progress,
        } => {
            println!("{} Iteration {}", "Next:".cyan().bold(), iteration);
            if progress.stagnation_detected {
                println!(
                    "{} {}",
                    "Warning:".yellow().bold(),
                    progress
                        .stagnation_reason
                        .as_deref()
                        .unwrap_or("stagnation detected")
                );
                for action in &progress.suggested_actions {
                    println!("   → {action}");
                }
            }
            if let Some(remaining) = progress.estimated_iterations_remaining {
                println!("   ~{remaining} iterations remaining (estimate)");
            }
            println!("\n{next_prompt}");
        }
    }
}
