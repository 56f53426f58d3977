// src/lib.rs

pub mod analysis;
pub mod cli;
pub mod config;
pub mod distro;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod steps;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};

use crate::cli::{CliArgs, Command, DistroCommand};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::distro::{DistributionManager, DistributionTarFile, DockerfileDistribution};
use crate::driver::DriverSession;
use crate::fs::RealFileSystem;
use crate::pipeline::{PipelineError, StatusMonitor, StepReport};
use crate::plan::RunPlan;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run { dry_run } => run_analysis(&args.config, dry_run).await,
        Command::Check => check(&args.config).await,
        Command::Settings { out } => write_settings(&args.config, &out),
        Command::Distro(cmd) => distro(cmd).await,
    }
}

fn load(config_path: &Path) -> Result<ConfigFile> {
    load_and_validate(config_path).with_context(|| format!("loading run file {config_path:?}"))
}

fn plan_now(cfg: &ConfigFile) -> RunPlan {
    RunPlan::from_config(cfg, chrono::Local::now().naive_local())
}

/// Check the environment, then run every step, logging reports as they
/// arrive and the status side-channel while the analysis runs.
async fn run_analysis(config_path: &Path, dry_run: bool) -> Result<()> {
    let cfg = load(config_path)?;
    let plan = plan_now(&cfg);

    if dry_run {
        print_dry_run(&cfg, &plan);
        return Ok(());
    }

    let session = cfg
        .driver
        .open()
        .await
        .context("opening execution environment")?;
    let outcome = run_in_session(&session, plan).await;
    close_session(session).await;
    outcome
}

async fn run_in_session(session: &DriverSession, plan: RunPlan) -> Result<()> {
    let driver = session.driver();
    driver
        .self_check()
        .await
        .context("execution environment is not usable")?;

    // Separate driver so polling does not overwrite the steps' last result.
    let status = StatusMonitor::new(session.driver()).spawn();

    info!(steps = ?plan.step_names(), outpath = %plan.settings.outpath, "starting pipeline");
    let mut running = plan.into_pipeline(driver, Arc::new(RealFileSystem)).spawn();
    while let Some(report) = running.next_report().await {
        log_report(&report);
    }
    let outcome = running.finish().await;
    status.stop().await;

    match outcome {
        Ok(summary) => {
            info!(return_code = ?summary.return_code, steps = summary.reports.len(), "pipeline finished");
            Ok(())
        }
        Err(PipelineError::StepFailed { step, failure, output }) => {
            if let Some(output) = output {
                for line in output.iter() {
                    error!(%step, "{}", line.pretty());
                }
            }
            Err(anyhow::Error::new(failure).context(format!("step '{step}' failed")))
        }
        Err(e) => Err(e.into()),
    }
}

async fn close_session(session: DriverSession) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "could not clean up execution environment");
    }
}

fn log_report(report: &StepReport) {
    if report.success() {
        info!(
            index = report.index,
            step = %report.step,
            state = ?report.state,
            return_code = report.return_code,
            "step finished"
        );
    } else {
        warn!(
            index = report.index,
            step = %report.step,
            state = ?report.state,
            return_code = report.return_code,
            "step failed"
        );
    }
}

async fn check(config_path: &Path) -> Result<()> {
    let cfg = load(config_path)?;
    let session = cfg
        .driver
        .open()
        .await
        .context("opening execution environment")?;
    let driver = session.driver();
    let checked = driver
        .self_check()
        .await
        .with_context(|| format!("{} driver check failed", driver.name()));
    close_session(session).await;
    checked?;
    println!("{} driver ready", driver.name());
    Ok(())
}

fn write_settings(config_path: &Path, out: &Path) -> Result<()> {
    let cfg = load(config_path)?;
    let plan = plan_now(&cfg);
    plan.settings
        .write_to(&RealFileSystem, out)
        .with_context(|| format!("writing settings to {out:?}"))?;
    println!("{}", out.display());
    Ok(())
}

fn default_location(name: &str, location: Option<PathBuf>) -> PathBuf {
    location.unwrap_or_else(|| PathBuf::from(".").join(name))
}

async fn distro(cmd: DistroCommand) -> Result<()> {
    let manager = DistributionManager::new();
    match cmd {
        DistroCommand::List => {
            let list = manager.list().await?;
            println!("  {:<24} {:<12} VERSION", "NAME", "STATE");
            for d in list {
                let marker = if d.is_default { '*' } else { ' ' };
                let version = d.version.map(|v| v.to_string()).unwrap_or_default();
                println!("{marker} {:<24} {:<12} {version}", d.name, d.state);
            }
        }
        DistroCommand::Import {
            name,
            tar,
            location,
            force,
            vm_version,
        } => {
            let location = default_location(&name, location);
            let registered = DistributionTarFile::new(&name, &tar, &location)
                .with_version(vm_version)
                .build(force)
                .await?;
            println!("registered distribution '{}'", registered.name());
        }
        DistroCommand::Export { name, path } => {
            let registered = manager
                .get(&name)
                .await?
                .ok_or_else(|| anyhow!("distribution '{name}' is not registered"))?;
            registered.export(&path).await?;
            println!("{}", path.display());
        }
        DistroCommand::Unregister { name } => {
            let registered = manager
                .get(&name)
                .await?
                .ok_or_else(|| anyhow!("distribution '{name}' is not registered"))?;
            registered.unregister().await?;
            println!("unregistered distribution '{name}'");
        }
        DistroCommand::Build {
            dockerfile,
            name,
            context,
            location,
            build_args,
            tar_only,
            force,
            vm_version,
        } => {
            let location = default_location(&name, location);
            let mut build = DockerfileDistribution::new(dockerfile, &name, location)
                .with_version(Some(vm_version))
                .with_manager(manager);
            if let Some(context) = context {
                build = build.with_context(context);
            }
            for (key, value) in build_args {
                build = build.with_build_arg(key, value);
            }

            if tar_only {
                let tar = build.build_tar_file(None).await?;
                println!("{}", tar.display());
            } else {
                let registered = build.build(force).await?;
                println!("registered distribution '{}'", registered.name());
            }
        }
    }
    Ok(())
}

/// Print the planned steps and the settings file without running anything.
fn print_dry_run(cfg: &ConfigFile, plan: &RunPlan) {
    println!("ngspipe dry-run");
    println!("  driver = {:?}", cfg.driver.kind);
    println!("  working_dir = {}", plan.working_dir);
    println!("  data_dir = {}", plan.data_dir);
    println!();

    println!("steps ({}):", plan.step_names().len());
    for name in plan.step_names() {
        println!("  - {name}");
    }
    println!();

    print!("{}", plan.settings.render());
}
