//! CLI command implementations. Thin frontends over the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Select};

use rigup::events::Severity;
use rigup::export::{ExportFilter, ExportFormat, LogExporter};
use rigup::graph::OperationGraph;
use rigup::plan::{load_plan, OperationKind};
use rigup::recovery::{AutoDecider, FailureReport, RecoveryAction, RecoveryDecider};
use rigup::runner::CommandRunner;
use rigup::session::{SessionConfig, SetupSession};
use rigup::ui::SetupUi;

pub struct RunArgs {
    pub plan: PathBuf,
    pub max_parallel: usize,
    pub yes: bool,
    pub console_capacity: usize,
    pub working_dir: Option<PathBuf>,
    pub export: Option<String>,
    pub out: Option<PathBuf>,
    pub min_severity: Option<String>,
}

/// Interactive recovery prompt.
struct PromptDecider;

impl RecoveryDecider for PromptDecider {
    fn decide(&mut self, report: &FailureReport) -> RecoveryAction {
        eprintln!(
            "\n{} {} failed: {}",
            style("!").red().bold(),
            style(&report.operation_name).bold(),
            report.error.message
        );
        if !report.error.recoverable {
            eprintln!("  This failure is not recoverable.");
        }

        let items: Vec<String> = report.options.iter().map(ToString::to_string).collect();
        match Select::with_theme(&ColorfulTheme::default())
            .with_prompt("How do you want to proceed?")
            .items(&items)
            .default(0)
            .interact()
        {
            Ok(index) => report.options[index],
            // no usable terminal: safest answer is to stop the run
            Err(_) => RecoveryAction::CancelAll,
        }
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let plan = load_plan(&args.plan)?;

    let config = SessionConfig {
        max_parallel: args.max_parallel.max(1),
        console_capacity: args.console_capacity,
        working_dir: args.working_dir,
        ..SessionConfig::default()
    };

    let mut session = SetupSession::new(plan, Arc::new(CommandRunner), config)?;

    let ui = SetupUi::new(session.aggregator());
    session.aggregator_mut().subscribe(Box::new(ui));

    // ctrl-c cancels the whole run cooperatively
    let token = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut interactive = PromptDecider;
    let mut auto = AutoDecider::default();
    let decider: &mut dyn RecoveryDecider = if args.yes { &mut auto } else { &mut interactive };

    let summary = session.run(decider).await?;

    println!(
        "\n{} succeeded, {} failed, {} skipped, {} cancelled in {:.1}s",
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        style(summary.skipped).yellow(),
        style(summary.cancelled).yellow(),
        summary.duration.as_secs_f64()
    );

    if let Some(format) = args.export {
        let format: ExportFormat = format.parse()?;
        let filter = ExportFilter {
            kinds: None,
            min_severity: args.min_severity.as_deref().map(parse_severity).transpose()?,
        };
        let exporter = LogExporter::new(session.aggregator());
        let content = exporter.export(format, &filter)?;

        let out = args.out.unwrap_or_else(|| default_out_path(format));
        std::fs::write(&out, content)
            .with_context(|| format!("Failed to write export to {}", out.display()))?;
        println!("Log exported to {}", out.display());
    }

    if summary.all_succeeded() {
        Ok(())
    } else {
        anyhow::bail!("setup did not complete successfully");
    }
}

pub fn validate(plan_path: &Path) -> Result<()> {
    let plan = load_plan(plan_path)?;
    let graph = OperationGraph::build(plan.operations)?;

    println!(
        "{} plan is valid: {} operations",
        style("ok").green().bold(),
        graph.len()
    );
    for op in graph.operations_in_topo_order() {
        let deps = if op.depends_on.is_empty() {
            String::new()
        } else {
            format!(" (after {})", op.depends_on.join(", "))
        };
        println!("  {} [{}]{}", op.id, op.kind, deps);
    }
    Ok(())
}

pub fn kinds() -> Result<()> {
    for kind in OperationKind::ALL {
        println!("{}", kind);
    }
    Ok(())
}

fn parse_severity(s: &str) -> Result<Severity> {
    match s.to_ascii_lowercase().as_str() {
        "info" => Ok(Severity::Info),
        "warning" | "warn" => Ok(Severity::Warning),
        "error" => Ok(Severity::Error),
        other => anyhow::bail!("unknown severity '{}'", other),
    }
}

fn default_out_path(format: ExportFormat) -> PathBuf {
    let ext = match format {
        ExportFormat::PlainText => "log",
        ExportFormat::Json => "json",
        ExportFormat::Csv => "csv",
        ExportFormat::Html => "html",
    };
    PathBuf::from(format!("setup-log.{}", ext))
}
