//! mimirform CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mimirform::cli::{
    Cli, Commands, GetCommands, MessageKind, OutputFormatter, StateCommands,
};
use mimirform::client::MimirClient;
use mimirform::config::{
    ConfigParser, ConfigValidator, Manifest, ResourceAddress, find_config_file,
};
use mimirform::error::{MimirError, ReconcileError, Result};
use mimirform::format::format_promql_expr;
use mimirform::reconciler::Reconciler;
use mimirform::resources::{DataSources, ProviderContext, Provisioner};
use mimirform::state::{LocalStateStore, StateStore};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(config, yes, continue_on_error, &formatter).await,
        Commands::Refresh => cmd_refresh(config, &formatter).await,
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::Import { address, id } => cmd_import(config, &address, &id, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
        Commands::Get { command } => cmd_get(config, command, &formatter).await,
        Commands::FmtExpr { expr } => cmd_fmt_expr(&expr),
    }
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

/// Asks for confirmation on stderr; true when the answer is `expected`.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new mimirform project in: {}", path.display());

    let config_path = path.join("mimirform.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Manifest already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/mimirform.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".mimirform/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# mimirform")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.mimirform/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set MIMIR_URI and MIMIR_ORG_ID");
    eprintln!("  2. Declare rule groups and Alertmanager config in mimirform.yaml");
    eprintln!("  3. Run 'mimirform validate' to check the manifest");
    eprintln!("  4. Run 'mimirform plan' to preview changes");
    eprintln!("  5. Run 'mimirform apply' to push them to Mimir");

    Ok(())
}

/// Validate the manifest without touching the network.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config_file, manifest) = read_manifest(config_path)?;
    info!("Validating manifest: {}", config_file.display());

    let result = ConfigValidator::new().collect(&manifest);
    emit(&formatter.format_validation(&result, show_warnings))?;

    if result.is_valid() {
        Ok(())
    } else {
        Err(MimirError::internal(format!(
            "{} validation error(s)",
            result.error_count()
        )))
    }
}

/// Show what apply would do.
async fn cmd_plan(
    config_path: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(config_path)?;
    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(project.manifest.resources.desired(), &project.store, &provisioner);

    let run = reconciler.plan().await?;
    emit(&formatter.format_plan(&run, detailed))
}

/// Apply the manifest.
async fn cmd_apply(
    config_path: Option<&Path>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(config_path)?;
    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(project.manifest.resources.desired(), &project.store, &provisioner)
        .with_continue_on_error(continue_on_error);

    if !auto_approve {
        let run = reconciler.plan().await?;
        if run.plan.is_empty() {
            emit(&formatter.format_plan(&run, false))?;
            return Ok(());
        }
        eprintln!("{}", formatter.format_plan(&run, false));
        if !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
    }

    let result = reconciler.apply().await?;
    emit(&formatter.format_reconciliation(&result, "Apply"))?;

    if result.success {
        Ok(())
    } else {
        Err(MimirError::Reconcile(ReconcileError::Aborted {
            reason: format!("{} action(s) failed", result.errors.len()),
        }))
    }
}

/// Re-read recorded resources and save the result.
async fn cmd_refresh(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let project = Project::load(config_path)?;
    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(project.manifest.resources.desired(), &project.store, &provisioner);

    let report = reconciler.refresh_state().await?;
    emit(&formatter.format_refresh(&report))
}

/// Check for drift without changing anything.
async fn cmd_drift(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let project = Project::load(config_path)?;
    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(project.manifest.resources.desired(), &project.store, &provisioner);

    let report = reconciler.check_drift().await?;
    emit(&formatter.format_drift(&report))
}

/// Delete every managed resource.
async fn cmd_destroy(
    config_path: Option<&Path>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(config_path)?;
    let state = project.store.load_or_default().await?;

    if state.is_empty() {
        emit(&formatter.message(MessageKind::Success, "No managed resources to destroy."))?;
        return Ok(());
    }

    eprintln!("The following resources will be destroyed:");
    for address in state.addresses() {
        eprintln!("  - {address}");
    }

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destroy cancelled.");
        return Ok(());
    }

    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(Vec::new(), &project.store, &provisioner);
    let result = reconciler.destroy().await?;
    emit(&formatter.format_reconciliation(&result, "Destroy"))?;

    if result.success {
        Ok(())
    } else {
        Err(MimirError::Reconcile(ReconcileError::Aborted {
            reason: format!("{} delete(s) failed", result.errors.len()),
        }))
    }
}

/// Adopt an existing remote object.
async fn cmd_import(
    config_path: Option<&Path>,
    address: &str,
    id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let address: ResourceAddress = address.parse()?;
    let project = Project::load(config_path)?;
    let provisioner = Provisioner::new(&project.ctx);
    let reconciler = Reconciler::new(project.manifest.resources.desired(), &project.store, &provisioner);

    let imported = reconciler.import(&address, id).await?;
    emit(&formatter.message(
        MessageKind::Success,
        &format!("Imported {} as {}", imported.id, imported.address),
    ))
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config_file, manifest) = read_manifest(config_path)?;
    let store = state_store(&config_file, &manifest);

    match command {
        StateCommands::Show => match store.load().await? {
            Some(state) => emit(&formatter.format_state(&state)),
            None => emit(&formatter.message(MessageKind::Warning, "No state found.")),
        },
        StateCommands::List => {
            let state = store.load_or_default().await?;
            emit(&formatter.format_state_list(&state))
        }
        StateCommands::Rm { address } => {
            let project = Project::from_parts(config_file, manifest, store)?;
            let provisioner = Provisioner::new(&project.ctx);
            let reconciler = Reconciler::new(Vec::new(), &project.store, &provisioner);
            let removed = reconciler.forget(&address).await?;
            emit(&formatter.message(
                MessageKind::Success,
                &format!("Removed {} ({}) from state", removed.address, removed.id),
            ))
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                emit(&formatter.message(MessageKind::Success, "State forcefully unlocked."))
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                emit(&formatter.message(MessageKind::Success, "State unlocked."))
            } else {
                match store.get_lock_info().await? {
                    Some(lock) => emit(&formatter.message(
                        MessageKind::Warning,
                        &format!("{lock}; pass --lock-id {} or --force", lock.lock_id),
                    )),
                    None => emit(&formatter.message(MessageKind::Success, "State is not locked.")),
                }
            }
        }
    }
}

/// Read-only lookups.
async fn cmd_get(
    config_path: Option<&Path>,
    command: GetCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(config_path)?;
    let data = DataSources::new(project.ctx);

    match command {
        GetCommands::RuleGroup {
            namespace,
            name,
            org_id,
        } => {
            let group = data.rule_group(org_id.as_deref(), &namespace, &name).await?;
            emit(&formatter.format_object(&group))
        }
        GetCommands::AlertmanagerConfig { org_id } => {
            let config = data.alertmanager_config(org_id.as_deref()).await?;
            emit(&formatter.format_object(&config))
        }
        GetCommands::Stats => {
            let stats = data.distributor_stats().await?;
            emit(&formatter.format_stats(&stats))
        }
    }
}

/// Pretty-print a PromQL expression.
fn cmd_fmt_expr(expr: &str) -> Result<()> {
    let formatted = format_promql_expr("expr", expr)?;
    emit(&formatted)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A loaded manifest with its client context and state store.
struct Project {
    manifest: Manifest,
    ctx: ProviderContext,
    store: LocalStateStore,
}

impl Project {
    /// Loads, validates and wires up everything a remote command needs.
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let (config_file, manifest) = read_manifest(config_path)?;
        ConfigValidator::new().validate(&manifest)?;
        let store = state_store(&config_file, &manifest);
        Self::from_parts(config_file, manifest, store)
    }

    fn from_parts(config_file: PathBuf, manifest: Manifest, store: LocalStateStore) -> Result<Self> {
        let client = MimirClient::new(manifest.provider.client_config()?)?;
        let ctx = ProviderContext::new(client, manifest.provider.format_options())
            .with_read_delay(manifest.provider.read_delay()?);
        debug!(
            "Using manifest {} with {} state at {}",
            config_file.display(),
            store.backend_type(),
            store.state_path().display()
        );
        Ok(Self {
            manifest,
            ctx,
            store,
        })
    }
}

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

/// Loads `.env` and the manifest, with environment defaults applied.
fn read_manifest(config_path: Option<&Path>) -> Result<(PathBuf, Manifest)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(manifest_dir(&config_file));
    parser.load_dotenv()?;
    let manifest = parser.load_with_env(&config_file)?;
    Ok((config_file, manifest))
}

fn manifest_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn state_store(config_file: &Path, manifest: &Manifest) -> LocalStateStore {
    LocalStateStore::new(manifest.state.resolve(&manifest_dir(config_file)))
}
