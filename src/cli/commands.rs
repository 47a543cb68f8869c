// CLI Command Implementations
// One-shot operations against the configured registry and ingress fleet

use super::{error, info, success, warning, Commands};
use colored::*;
use domain_cert_manager::bootstrap;
use domain_cert_manager::config::ManagerConfig;
use domain_cert_manager::policy::RenewalDecision;
use domain_cert_manager::scheduler::{ProjectOutcome, ProjectPlan, SweepReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Execute a one-shot CLI command
pub async fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Sweep { config } => sweep_command(config).await,
        Commands::Renew { project, config } => renew_command(project, config).await,
        Commands::Plan { project, config } => plan_command(project, config).await,
        Commands::Validate { file } => validate_command(file),
        Commands::Start { .. } => anyhow::bail!("start is handled by the daemon entry point"),
    }
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")?,
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn load(config_path: &str) -> anyhow::Result<ManagerConfig> {
    info(&format!("Loading configuration from {}", config_path.bright_white()));
    ManagerConfig::load(config_path)
}

async fn sweep_command(config_path: String) -> anyhow::Result<()> {
    let config = load(&config_path)?;
    let executor = bootstrap::build_executor(&config)?;

    let progress = spinner("Sweeping all projects...")?;
    let result = executor.run_sweep().await;
    progress.finish_and_clear();

    let report = result?;
    print_report(&report);

    if report.failed.is_empty() {
        success(&format!("Sweep finished in {} ms", report.elapsed_ms));
        Ok(())
    } else {
        anyhow::bail!("{} of {} projects failed", report.failed.len(), report.total())
    }
}

fn print_report(report: &SweepReport) {
    println!();
    for project in &report.renewed {
        println!("  {} {}", "renewed".green().bold(), project);
    }
    for project in &report.skipped {
        println!("  {} {}", "skipped".dimmed(), project);
    }
    for failure in &report.failed {
        println!("  {}  {}: {}", "failed".red().bold(), failure.project_id, failure.error);
    }
    println!();
}

async fn renew_command(project: String, config_path: String) -> anyhow::Result<()> {
    let config = load(&config_path)?;
    let executor = bootstrap::build_executor(&config)?;

    let progress = spinner(&format!("Running certificate update for {}...", project))?;
    let result = executor.run_for_project(&project).await;
    progress.finish_and_clear();

    match result {
        Ok(ProjectOutcome::Renewed { domains, hosts }) => {
            success(&format!("Certificate for {} renewed", project.bright_white()));
            println!("  {} {}", "Domains:".bright_white(), domains.join(", "));
            println!("  {} {}", "Hosts:".bright_white(), hosts.join(", "));
            Ok(())
        }
        Ok(ProjectOutcome::Skipped { decision }) => {
            info(&format!("Nothing to do for {}: {}", project.bright_white(), decision));
            Ok(())
        }
        Err(e) => {
            error(&format!("Certificate update for {} failed", project));
            Err(e.into())
        }
    }
}

async fn plan_command(project: Option<String>, config_path: String) -> anyhow::Result<()> {
    let config = load(&config_path)?;
    let executor = bootstrap::build_executor(&config)?;

    let progress = spinner("Resolving CNAME records...")?;
    let plans = match project {
        Some(project_id) => vec![(project_id.clone(), executor.plan(&project_id).await)],
        None => executor.plan_all().await?,
    };
    progress.finish_and_clear();

    println!();
    for (project_id, plan) in &plans {
        match plan {
            Ok(plan) => print_plan(plan),
            Err(e) => println!("  {} {}: {}", "error".red().bold(), project_id, e),
        }
    }
    println!();

    let required = plans
        .iter()
        .filter(|(_, plan)| matches!(plan, Ok(p) if p.decision.is_required()))
        .count();
    info(&format!("{} of {} projects need a certificate", required, plans.len()));
    Ok(())
}

fn print_plan(plan: &ProjectPlan) {
    let marker = match plan.decision {
        RenewalDecision::NoValidDomains | RenewalDecision::UpToDate { .. } => "keep".dimmed(),
        _ => "issue".yellow().bold(),
    };
    println!("  {} {} ({})", marker, plan.project_id.bright_white(), plan.decision);

    for name in &plan.registered {
        if plan.valid_domains.contains(name) {
            println!("      {} {}", "✓".green(), name);
        } else {
            println!("      {} {}", "✗".red(), name.dimmed());
        }
    }
}

fn validate_command(file: String) -> anyhow::Result<()> {
    info(&format!("Validating configuration file: {}", file.bright_white()));

    let config = ManagerConfig::from_file(&file)?;
    if let Err(e) = config.validate() {
        error(&format!("Configuration is invalid: {}", e));
        return Err(e);
    }

    success("Configuration is valid");
    println!();
    println!("  {} {}", "Ingress hosts:".bright_white(), config.ingress.hosts.join(", "));
    println!("  {} {}", "CNAME target:".bright_white(), config.ingress.cname_target);
    println!("  {} {:?}", "Transport:".bright_white(), config.transport.kind);
    println!("  {} {}", "ACME directory:".bright_white(), config.acme.directory_url()?);
    println!(
        "  {} {} days before expiry",
        "Renewal threshold:".bright_white(),
        config.renewal.threshold_days
    );
    if config.scheduler.enabled {
        println!(
            "  {} every {} minutes",
            "Sweep ticker:".bright_white(),
            config.scheduler.interval_minutes
        );
    } else {
        warning("Sweep ticker disabled; sweeps run only on demand");
    }

    Ok(())
}
