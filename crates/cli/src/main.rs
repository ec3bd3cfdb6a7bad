//! skybridge command-line interface
//!
//! Subcommands: `orchestrate` (two-phase update/deploy), `pd-snapshot`
//! (Partner Directory remote -> local), `pd-deploy` (local -> remote). Every
//! flag falls back to the ambient config file, then to its default.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use skybridge_adapters::config::resolve_option;
use skybridge_adapters::{
    AmbientConfig, AuthMethod, HttpTransport, PartnerDirectoryClient, ServiceCredentials,
    TenantArtifactDeployer, TenantArtifactSyncer, TenantPackageSyncer,
};
use skybridge_core::{DomainError, Result};
use skybridge_engine::{
    ConfigLoader, LoaderAuth, OperationMode, Orchestrator, OrchestratorOptions,
    PartnerDirectorySync, PdRepository, RunOutcome, SyncOptions,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skybridge", version, about = "Continuous delivery for hosted integration tenants")]
struct Cli {
    /// Path to the ambient config file (default: $SKYBRIDGE_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Tenant host (overrides config file and environment).
    #[arg(long, global = true)]
    tenant_host: Option<String>,

    /// Tenant basic-auth user.
    #[arg(long, global = true)]
    tenant_user: Option<String>,

    /// Tenant basic-auth password.
    #[arg(long, global = true)]
    tenant_password: Option<String>,

    /// Tenant bearer token (wins over basic auth).
    #[arg(long, global = true)]
    tenant_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update packages and artifacts on the tenant, then deploy them.
    Orchestrate {
        /// Directory containing package sources.
        #[arg(long, short = 'd')]
        packages_dir: Option<String>,

        /// Deployment config: file, folder, or URL.
        #[arg(long, short = 'c')]
        deploy_config: Option<String>,

        /// Prefix applied to package and artifact IDs.
        #[arg(long, short = 'p')]
        deployment_prefix: Option<String>,

        /// Comma-separated package IDs to include.
        #[arg(long)]
        package_filter: Option<String>,

        /// Comma-separated artifact IDs to include.
        #[arg(long)]
        artifact_filter: Option<String>,

        /// Filename pattern for folder sources.
        #[arg(long)]
        config_pattern: Option<String>,

        /// Merge multiple configs into a single deployment.
        #[arg(long)]
        merge_configs: bool,

        /// Keep the temporary work directory after the run.
        #[arg(long)]
        keep_temp: bool,

        /// Only update artifacts, don't deploy.
        #[arg(long, conflicts_with = "deploy_only")]
        update_only: bool,

        /// Only deploy artifacts, don't update.
        #[arg(long)]
        deploy_only: bool,

        /// Status checks per deployment before giving up.
        #[arg(long)]
        deploy_retries: Option<u32>,

        /// Seconds between deployment status checks.
        #[arg(long)]
        deploy_delay: Option<u64>,

        /// Concurrent deployments per package.
        #[arg(long)]
        parallel_deployments: Option<usize>,
    },

    /// Download Partner Directory parameters into the local layout.
    PdSnapshot {
        /// Root of the local partner-directory layout.
        #[arg(long)]
        resources_path: Option<String>,

        /// Overwrite existing local values (false = add only).
        #[arg(long)]
        replace: Option<bool>,

        /// Comma-separated partner IDs to include.
        #[arg(long)]
        pids: Option<String>,
    },

    /// Upload local Partner Directory parameters to the tenant.
    PdDeploy {
        #[arg(long)]
        resources_path: Option<String>,

        /// Update existing remote values (false = create only).
        #[arg(long)]
        replace: Option<bool>,

        /// Delete remote parameters absent locally (local is source of truth).
        #[arg(long)]
        full_sync: bool,

        /// Report intended changes without mutating the tenant.
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        pids: Option<String>,

        /// Use the batch protocol for mutations.
        #[arg(long)]
        batch: bool,
    },
}

fn parse_filter(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn explicit_credentials(cli: &Cli) -> Option<ServiceCredentials> {
    let host = cli.tenant_host.clone()?;
    let auth = if let Some(token) = &cli.tenant_token {
        AuthMethod::Bearer {
            token: token.clone(),
        }
    } else if let (Some(user), Some(password)) = (&cli.tenant_user, &cli.tenant_password) {
        AuthMethod::Basic {
            username: user.clone(),
            password: password.clone(),
        }
    } else {
        AuthMethod::None
    };
    Some(ServiceCredentials { host, auth })
}

fn loader_auth(credentials: &ServiceCredentials) -> Option<LoaderAuth> {
    match &credentials.auth {
        AuthMethod::Bearer { token } => Some(LoaderAuth::Bearer(token.clone())),
        AuthMethod::Basic { username, password } => Some(LoaderAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        }),
        AuthMethod::None => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let ambient = match load_ambient(&cli) {
        Ok(ambient) => ambient,
        Err(e) => {
            error!("Fatal: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = match &cli.command {
        Command::Orchestrate { .. } => run_orchestrate(&cli, &ambient).await,
        Command::PdSnapshot { .. } => run_pd_snapshot(&cli, &ambient).await,
        Command::PdDeploy { .. } => run_pd_deploy(&cli, &ambient).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::from(2)
        }
    }
}

fn load_ambient(cli: &Cli) -> Result<AmbientConfig> {
    match &cli.config {
        Some(path) => AmbientConfig::from_file(path),
        None => AmbientConfig::from_env(),
    }
}

fn transport_for(cli: &Cli, ambient: &AmbientConfig) -> Result<(HttpTransport, ServiceCredentials)> {
    let credentials = ServiceCredentials::resolve(explicit_credentials(cli), ambient)?;
    let transport = HttpTransport::new(&credentials)
        .map_err(|e| DomainError::Remote(e.to_string()))?;
    Ok((transport, credentials))
}

/// Returns true when the run completed without failures.
async fn run_orchestrate(cli: &Cli, ambient: &AmbientConfig) -> Result<bool> {
    let Command::Orchestrate {
        packages_dir,
        deploy_config,
        deployment_prefix,
        package_filter,
        artifact_filter,
        config_pattern,
        merge_configs,
        keep_temp,
        update_only,
        deploy_only,
        deploy_retries,
        deploy_delay,
        parallel_deployments,
    } = &cli.command
    else {
        unreachable!("dispatched on the wrong subcommand");
    };

    let section = &ambient.orchestrator;

    let mode = if *update_only {
        OperationMode::UpdateOnly
    } else if *deploy_only {
        OperationMode::DeployOnly
    } else if let Some(mode) = &section.mode {
        mode.parse()?
    } else {
        OperationMode::UpdateAndDeploy
    };

    let deploy_config = resolve_option(
        deploy_config.clone(),
        section.deploy_config.clone(),
        String::new(),
    );
    if deploy_config.is_empty() {
        return Err(DomainError::InvalidInput(
            "a deployment config is required: pass --deploy-config or set orchestrator.deployConfig"
                .to_string(),
        ));
    }

    let packages_dir = resolve_option(
        packages_dir.clone(),
        section.packages_dir.clone(),
        ".".to_string(),
    );
    let deployment_prefix = resolve_option(
        deployment_prefix.clone(),
        section.deployment_prefix.clone(),
        String::new(),
    );
    let package_filter = parse_filter(Some(resolve_option(
        package_filter.clone(),
        section.package_filter.clone(),
        String::new(),
    )));
    let artifact_filter = parse_filter(Some(resolve_option(
        artifact_filter.clone(),
        section.artifact_filter.clone(),
        String::new(),
    )));
    let config_pattern = resolve_option(
        config_pattern.clone(),
        section.config_pattern.clone(),
        "*.y*ml".to_string(),
    );
    let merge = *merge_configs || section.merge_configs.unwrap_or(false);
    let keep_temp = *keep_temp || section.keep_temp.unwrap_or(false);
    let retries = resolve_option(*deploy_retries, section.deploy_retries, 5);
    let delay = resolve_option(*deploy_delay, section.deploy_delay_seconds, 15);
    let parallel = resolve_option(*parallel_deployments, section.parallel_deployments, 3);

    let (transport, credentials) = transport_for(cli, ambient)?;

    let loader = ConfigLoader {
        file_pattern: config_pattern,
        auth: loader_auth(&credentials),
    };
    let source = ConfigLoader::detect_source(&deploy_config)?;
    info!("Loading config from {} ({:?})", deploy_config, source);
    let configs = loader.load(&source).await?;
    info!("Loaded {} config file(s)", configs.len());

    let orchestrator = Orchestrator::new(
        Arc::new(TenantPackageSyncer::new(transport.clone())),
        Arc::new(TenantArtifactSyncer::new(transport.clone())),
        Arc::new(TenantArtifactDeployer::new(
            transport,
            retries,
            Duration::from_secs(delay),
        )),
        OrchestratorOptions {
            mode,
            packages_dir: PathBuf::from(packages_dir),
            deployment_prefix,
            package_filter,
            artifact_filter,
            keep_temp,
            merge_configs: merge,
            parallel_deployments: parallel,
        },
    );

    let (_stats, outcome) = orchestrator.run(configs).await?;
    Ok(outcome == RunOutcome::Clean)
}

async fn run_pd_snapshot(cli: &Cli, ambient: &AmbientConfig) -> Result<bool> {
    let Command::PdSnapshot {
        resources_path,
        replace,
        pids,
    } = &cli.command
    else {
        unreachable!("dispatched on the wrong subcommand");
    };

    let section = &ambient.pd_snapshot;

    let resources_path = resolve_option(
        resources_path.clone(),
        section.resources_path.clone(),
        "./partner-directory".to_string(),
    );
    let replace = resolve_option(*replace, section.replace, true);
    let pids = if pids.is_some() {
        parse_filter(pids.clone())
    } else {
        section.pids.clone().unwrap_or_default()
    };

    let (transport, _) = transport_for(cli, ambient)?;
    let api = PartnerDirectoryClient::new(transport);
    let repo = PdRepository::new(resources_path);
    let sync = PartnerDirectorySync::new(&api, &repo);

    let options = SyncOptions {
        replace,
        pids,
        ..Default::default()
    };
    sync.snapshot(&options).await?;

    info!("Partner Directory snapshot completed successfully");
    Ok(true)
}

async fn run_pd_deploy(cli: &Cli, ambient: &AmbientConfig) -> Result<bool> {
    let Command::PdDeploy {
        resources_path,
        replace,
        full_sync,
        dry_run,
        pids,
        batch,
    } = &cli.command
    else {
        unreachable!("dispatched on the wrong subcommand");
    };

    let section = &ambient.pd_deploy;

    let resources_path = resolve_option(
        resources_path.clone(),
        section.resources_path.clone(),
        "./partner-directory".to_string(),
    );
    let replace = resolve_option(*replace, section.replace, true);
    let full_sync = *full_sync || section.full_sync.unwrap_or(false);
    let dry_run = *dry_run || section.dry_run.unwrap_or(false);
    let pids = if pids.is_some() {
        parse_filter(pids.clone())
    } else {
        section.pids.clone().unwrap_or_default()
    };

    let (transport, _) = transport_for(cli, ambient)?;
    let api = PartnerDirectoryClient::new(transport);
    let repo = PdRepository::new(resources_path);
    let sync = PartnerDirectorySync::new(&api, &repo);

    let options = SyncOptions {
        replace,
        full_sync,
        dry_run,
        pids,
    };

    let summary = if *batch {
        sync.batch_deploy(&options, 0).await?
    } else {
        sync.deploy(&options).await?
    };

    if dry_run {
        info!("Dry run completed - no changes were made");
    } else {
        info!("Partner Directory deploy completed");
    }

    Ok(!summary.has_errors())
}
