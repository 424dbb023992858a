//! tenant-sync CLI entrypoint.
//!
//! This is the main entrypoint for the tenant-sync command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tenant_sync::cli::{Cli, Commands, KindArg, OutputFormatter};
use tenant_sync::config::{
    ConfigParser, ConfigValidator, DesiredStateLoader, TenantConfig, find_config_file,
};
use tenant_sync::error::{Result, SyncError};
use tenant_sync::planner::Executor;
use tenant_sync::reconciler::{ApplyOptions, Reconciler};
use tenant_sync::remote::{HttpResourceApi, ResourceApi, StateFetcher};
use tenant_sync::resource::ResourceKind;
use tenant_sync::state::{LocalRunStore, RunRecord, STATE_DIR};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when operations failed or drift was found.
const EXIT_CHANGES: u8 = 2;

/// Starter tenant file written by `init`.
const TENANT_TEMPLATE: &str = r#"# tenant-sync tenant file
#
# Every declared section is authoritative: resources of that kind that are
# not listed here are deleted on apply. Remove a section to leave that kind
# unmanaged.

tenant:
  domain: example.eu.auth0.com
  concurrency: 4
  # operation_timeout_secs: 30

guardrails:
  max_delete_ratio: 0.5
  allow_empty_desired: false

apps:
  - name: web
    app_type: spa
    callbacks:
      - "https://example.com/callback"

roles:
  - name: admin
    description: "Administrators"
"#;

/// Starter environment file written by `init`.
const ENV_TEMPLATE: &str = "# Management API token\nTENANT_SYNC_TOKEN=\n";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr so that command output on stdout stays parseable.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { strict } => {
            cmd_validate(config_path, strict, &formatter).map(|()| ExitCode::SUCCESS)
        }
        Commands::Plan {
            kind,
            detailed,
            check,
        } => cmd_plan(config_path, kind, detailed, check, &formatter).await,
        Commands::Apply {
            kind,
            yes,
            concurrency,
            fail_on_conflict,
            strict,
        } => {
            let args = ApplyArgs {
                kind,
                yes,
                concurrency,
                fail_on_conflict,
                strict,
            };
            cmd_apply(config_path, args, &formatter).await
        }
        Commands::List { kind } => cmd_list(config_path, kind, &formatter)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::History { limit } => cmd_history(config_path, limit, &formatter)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Unlock => cmd_unlock(config_path, &formatter)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

/// Write a starter tenant file.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing tenant directory: {}", path.display());

    let config_path = path.join("tenant.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Tenant file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, TENANT_TEMPLATE)?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, ENV_TEMPLATE)?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let has_env = existing.lines().any(|l| l.trim() == ".env");
        let has_state = existing.lines().any(|l| l.trim() == state_entry);
        if !has_env || !has_state {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# tenant-sync")?;
            if !has_env {
                writeln!(file, ".env")?;
            }
            if !has_state {
                writeln!(file, "{state_entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nTenant directory initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set TENANT_SYNC_TOKEN");
    eprintln!("  2. Edit tenant.yaml with your applications and roles");
    eprintln!("  3. Run 'tenant-sync validate' to check the file");
    eprintln!("  4. Run 'tenant-sync plan' to preview changes");
    eprintln!("  5. Run 'tenant-sync apply' to converge the tenant");

    Ok(())
}

/// Validate the tenant file.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    strict: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating tenant file: {}", config_file.display());

    let config = parse_config(&config_file)?;
    let result = ConfigValidator::new()
        .with_strict(strict)
        .validate(&config)?;

    println!("{}", formatter.format_validation(&config, &result));
    Ok(())
}

/// Show the reconciliation plan, or only drift with `--check`.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    kind: Option<KindArg>,
    detailed: bool,
    check: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (_config_file, config) = load_config(config_path, false)?;
    let kinds = select_kinds(&config, kind);
    if kinds.is_empty() {
        eprintln!("{}", formatter.warning("No resource sections declared; nothing to plan."));
        return Ok(ExitCode::SUCCESS);
    }

    let api = create_client(&config)?;
    let reconciler = Reconciler::new(DesiredStateLoader::from_config(Arc::clone(&config)), api)
        .with_guardrails(config.guardrails.clone());

    let mut drift_found = false;
    for kind in kinds {
        if check {
            if let Some(drift) = reconciler.check_drift(kind).await? {
                drift_found |= drift.has_drift;
                println!("{}", formatter.format_drift(&drift));
            }
            continue;
        }

        let Some(plan) = reconciler.plan(kind).await? else {
            continue;
        };
        println!("{}", formatter.format_plan(&plan, detailed));

        let violations = plan.guardrail_violations(&config.guardrails);
        if !violations.is_empty() {
            eprintln!("{}", formatter.format_violations(&violations));
        }
    }

    Ok(exit_code(!drift_found))
}

/// Arguments of the `apply` command.
#[derive(Debug, Clone, Copy)]
struct ApplyArgs {
    kind: Option<KindArg>,
    yes: bool,
    concurrency: Option<u16>,
    fail_on_conflict: bool,
    strict: bool,
}

/// Apply the reconciliation plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    args: ApplyArgs,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config_file, config) = load_config(config_path, args.strict)?;
    let kinds = select_kinds(&config, args.kind);
    if kinds.is_empty() {
        eprintln!("{}", formatter.warning("No resource sections declared; nothing to apply."));
        return Ok(ExitCode::SUCCESS);
    }

    let api = create_client(&config)?;
    let store = LocalRunStore::for_config(&config_file);
    let lock = store.acquire_lock("", "apply").await?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received: finishing in-flight operations");
                cancel.cancel();
            }
        }
    });

    let concurrency = args
        .concurrency
        .map_or(config.tenant.concurrency, usize::from);
    let executor = Executor::new(Arc::clone(&api))
        .with_concurrency(concurrency)
        .with_operation_timeout(config.tenant.operation_timeout_secs.map(Duration::from_secs))
        .with_cancellation(cancel.clone());

    let loader = DesiredStateLoader::from_config(Arc::clone(&config)).with_strict(args.strict);
    let reconciler = Reconciler::new(loader, api)
        .with_executor(executor)
        .with_guardrails(config.guardrails.clone());

    let result = apply_kinds(&reconciler, &store, &config, &kinds, args, &cancel, formatter).await;

    watcher.abort();
    store.release_lock(&lock.lock_id).await?;

    Ok(exit_code(result?))
}

/// Maps whether a run converged to the process exit status.
fn exit_code(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_CHANGES)
    }
}

/// How one kind ended during `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KindOutcome {
    /// The tenant file has no section for the kind.
    Unmanaged,
    /// The plan was empty.
    InSync,
    /// The user declined the plan; drift remains.
    Declined,
    /// The plan was executed.
    Applied {
        /// Every operation was issued and succeeded.
        complete: bool,
    },
}

impl KindOutcome {
    /// Returns true if the kind ended converged.
    const fn converged(self) -> bool {
        match self {
            Self::Unmanaged | Self::InSync => true,
            Self::Declined => false,
            Self::Applied { complete } => complete,
        }
    }
}

/// Plans, confirms and executes each kind in turn.
///
/// Returns false if any operation failed, was not issued, or a plan was
/// declined.
async fn apply_kinds(
    reconciler: &Reconciler,
    store: &LocalRunStore,
    config: &TenantConfig,
    kinds: &[ResourceKind],
    args: ApplyArgs,
    cancel: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let mut clean = true;

    for &kind in kinds {
        if cancel.is_cancelled() {
            warn!("Run cancelled, {kind} resources not reconciled");
            clean = false;
            break;
        }

        let Some(plan) = reconciler.plan(kind).await? else {
            clean &= KindOutcome::Unmanaged.converged();
            continue;
        };
        println!("{}", formatter.format_plan(&plan, false));

        if plan.is_empty() {
            debug!("Nothing to apply for {kind}");
            clean &= KindOutcome::InSync.converged();
            continue;
        }

        let violations = plan.guardrail_violations(&config.guardrails);
        if !violations.is_empty() {
            eprintln!("{}", formatter.format_violations(&violations));
        }

        let confirmed = args.yes || confirm(&format!("Apply these {kind} changes?"))?;
        if !confirmed {
            eprintln!("Skipped {kind} changes.");
            clean &= KindOutcome::Declined.converged();
            continue;
        }

        let options = ApplyOptions {
            confirmed,
            fail_on_conflict: args.fail_on_conflict,
        };
        reconciler.check(&plan, options)?;

        let report = reconciler.execute(&plan).await;
        println!("{}", formatter.format_report(&report));

        clean &= KindOutcome::Applied {
            complete: !report.has_failures() && report.is_complete(),
        }
        .converged();

        if let Err(e) = store.record_run(RunRecord::from_report(&plan, &report)).await {
            warn!("Failed to record run history: {e}");
        }
    }

    Ok(clean)
}

/// List existing remote resources.
async fn cmd_list(
    config_path: Option<&PathBuf>,
    kind: KindArg,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config_file, config) = load_config(config_path, false)?;
    let kind = ResourceKind::from(kind);

    let fetcher = StateFetcher::new(create_client(&config)?);
    let resources = fetcher.fetch(kind).await?;

    println!("{}", formatter.format_resources(kind, &resources));
    Ok(())
}

/// Show recent runs.
async fn cmd_history(
    config_path: Option<&PathBuf>,
    limit: usize,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let history = LocalRunStore::for_config(&config_file).load_history().await?;

    println!("{}", formatter.format_history(&history.recent(limit)));
    Ok(())
}

/// Force-release the run lock.
async fn cmd_unlock(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let store = LocalRunStore::for_config(&config_file);

    match store.force_unlock().await? {
        Some(lock) => println!(
            "{}",
            formatter.success(&format!(
                "Released lock held by {} since {}",
                lock.holder,
                lock.acquired_at.to_rfc3339()
            ))
        ),
        None => println!("{}", formatter.success("No lock held.")),
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the tenant file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` next to the tenant file, then parses it with overrides.
fn parse_config(config_file: &Path) -> Result<TenantConfig> {
    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;
    parser.load_with_env(config_file)
}

/// Resolves, parses and validates the tenant file.
fn load_config(
    config_path: Option<&PathBuf>,
    strict: bool,
) -> Result<(PathBuf, Arc<TenantConfig>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading tenant file from: {}", config_file.display());

    let config = parse_config(&config_file)?;
    let result = ConfigValidator::new()
        .with_strict(strict)
        .validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok((config_file, Arc::new(config)))
}

/// Kinds to reconcile: the requested one, or every declared section.
fn select_kinds(config: &TenantConfig, kind: Option<KindArg>) -> Vec<ResourceKind> {
    match kind {
        Some(kind) => vec![ResourceKind::from(kind)],
        None => config.declared_kinds(),
    }
}

/// Creates the management API client.
fn create_client(config: &TenantConfig) -> Result<Arc<dyn ResourceApi>> {
    let token = ConfigParser::get_api_token()?;
    let client = HttpResourceApi::new(&config.tenant.domain, &token)
        .map_err(|e| SyncError::internal(format!("Failed to create API client: {e}")))?;
    Ok(Arc::new(client))
}

/// Asks a yes/no question on stderr.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declined_plan_is_not_converged() {
        assert!(!KindOutcome::Declined.converged());
    }

    #[test]
    fn test_kind_outcomes() {
        assert!(KindOutcome::Unmanaged.converged());
        assert!(KindOutcome::InSync.converged());
        assert!(KindOutcome::Applied { complete: true }.converged());
        assert!(!KindOutcome::Applied { complete: false }.converged());
    }

    #[test]
    fn test_apply_with_declined_kind_is_not_clean() {
        let clean = [KindOutcome::Applied { complete: true }, KindOutcome::Declined]
            .into_iter()
            .all(KindOutcome::converged);
        assert!(!clean);
    }
}
