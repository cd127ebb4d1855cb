use clap::{Parser, Subcommand};
use serde_json::Value;

use ecoreport::template::{validate, ReportTemplate};
use ecoreport::{
    Caller, Period, ProjectProgressReport, RecordBundle, ReportEngine, ReportRequest, Timeframe,
    Variables,
};

#[derive(Parser)]
#[command(name = "ecoreport", about = "Environmental project reporting and analytics")]
struct Cli {
    /// Database path (default: ~/.ecoreport/ecoreport.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON bundle of records into the store
    Import {
        /// Path to a JSON file with users, projects, progress_updates,
        /// milestones, alerts and transactions arrays
        file: String,
    },
    /// Generate and inspect project progress reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
    /// Platform dashboard metrics and charts
    Analytics {
        /// Timeframe: 7d, 30d, 90d, 1y
        #[arg(long, default_value = "30d")]
        timeframe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare a project's progress across consecutive periods
    Compare {
        /// Project id
        project: String,
        /// Most recent period (e.g. 2025-Q1, 2025-03, 30d)
        #[arg(long, default_value = "30d")]
        period: String,
        /// Number of consecutive periods to measure
        #[arg(long, default_value = "2")]
        count: usize,
        /// User id to act as
        #[arg(long)]
        as_user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage report templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store status
    Status,
}

#[derive(Subcommand)]
enum ReportAction {
    /// Compose and store a report for one project
    Generate {
        /// Project id
        project: String,
        /// Period (e.g. 2025, 2025-H1, 2025-Q1, 2025-03, 2025-W05, 30d)
        #[arg(long, default_value = "30d")]
        period: String,
        /// Template id
        #[arg(long)]
        template: Option<String>,
        /// Template variable as key=value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// User id to act as
        #[arg(long)]
        as_user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored report
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List stored reports
    List {
        /// Filter by project id
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List templates visible to a user
    List {
        #[arg(long)]
        as_user: String,
    },
    /// Show a template as JSON
    Show { id: String },
    /// Check a template file without storing it
    Validate { file: String },
    /// Store a new template from a JSON file
    Create {
        file: String,
        #[arg(long)]
        as_user: String,
    },
    /// Copy a template into an editable one owned by the user
    Clone {
        id: String,
        /// Name for the copy
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        as_user: String,
    },
    /// Delete a template
    Delete {
        id: String,
        #[arg(long)]
        as_user: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

/// Parse repeated `key=value` flags. Values stay strings; typed template
/// variables are coerced when they are resolved.
fn parse_vars(vars: &[String]) -> anyhow::Result<Variables> {
    let mut out = Variables::new();
    for var in vars {
        let (key, value) = var
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --var '{var}', expected KEY=VALUE"))?;
        out.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(out)
}

fn read_template(path: &str) -> anyhow::Result<ReportTemplate> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let engine = match &cli.db {
        Some(path) => ReportEngine::open_at(path).await?,
        None => ReportEngine::open().await?,
    };

    match cli.command {
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let bundle: RecordBundle = serde_json::from_str(&text)?;
            let n = engine.import(bundle).await?;
            println!("Imported {n} records from {file}.");
        }
        Commands::Report { action } => {
            handle_report(&engine, action).await?;
        }
        Commands::Analytics { timeframe, json } => {
            let timeframe = Timeframe::parse(&timeframe)?;
            let snapshot = engine.analytics(timeframe, chrono::Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("Analytics ({})", snapshot.timeframe);
                for m in &snapshot.metrics {
                    println!(
                        "  {:<18} {:>12.1} {:<8} ({:?} {:.1}%)",
                        m.name, m.value, m.unit, m.change_type, m.change
                    );
                }
                println!("\n{} charts available with --json", snapshot.charts.len());
            }
        }
        Commands::Compare {
            project,
            period,
            count,
            as_user,
            json,
        } => {
            let caller = engine.caller(&as_user).await?;
            let periods: Vec<_> = Period::parse(&period)?
                .trailing(count.max(2))
                .iter()
                .map(Period::report_period)
                .collect();
            let comparison = engine.compare_periods(&caller, &project, &periods).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                for t in &comparison.trends {
                    println!(
                        "  {:<18} {:?} {:.1}% ({:.1} -> {:.1})",
                        t.metric, t.direction, t.change_percent, t.prior_delta, t.latest_delta
                    );
                }
                for insight in &comparison.insights {
                    println!("* {insight}");
                }
                for advisory in &comparison.advisories {
                    println!("! {advisory}");
                }
            }
        }
        Commands::Template { action } => {
            handle_template(&engine, action).await?;
        }
        Commands::Config { action } => {
            handle_config(&engine, action).await?;
        }
        Commands::Status => {
            println!("Store Status");
            for (table, n) in engine.status().await? {
                println!("  {table:<18} {n}");
            }
            let settings = engine.settings().await?;
            println!("  Report TTL:        {} days", settings.report_ttl_days);
            println!(
                "  Default template:  {}",
                settings.default_template.as_deref().unwrap_or("none")
            );
        }
    }

    Ok(())
}

async fn handle_report(engine: &ReportEngine, action: ReportAction) -> anyhow::Result<()> {
    match action {
        ReportAction::Generate {
            project,
            period,
            template,
            vars,
            as_user,
            json,
        } => {
            let caller = engine.caller(&as_user).await?;
            let mut request = ReportRequest::new(project, Period::parse(&period)?.report_period());
            request.template_id = template;
            request.variables = parse_vars(&vars)?;
            let report = engine.generate_report(&caller, request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        ReportAction::Show { id, json } => {
            let stored = engine.report(&id, chrono::Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stored)?);
            } else {
                print_report(&stored.report);
                if stored.is_stale {
                    let expired = stored.report.expires_at.format("%Y-%m-%d %H:%M");
                    println!("\n(stale: expired {expired}; regenerate it for current data)");
                }
            }
        }
        ReportAction::List { project } => {
            let rows = engine.list_reports(project.as_deref()).await?;
            if rows.is_empty() {
                println!("No reports found.");
            } else {
                for row in &rows {
                    println!(
                        "{}  {}  {}  generated {}  template {}",
                        row.id,
                        row.project_id,
                        row.status,
                        row.generated_at,
                        row.template_id.as_deref().unwrap_or("-")
                    );
                }
                println!("\n{} reports", rows.len());
            }
        }
    }
    Ok(())
}

fn print_report(report: &ProjectProgressReport) {
    let s = &report.summary;
    println!("{}", report.title);
    println!("  Id:        {}", report.id);
    println!("  Progress:  {:.0}%", s.overall_progress);
    println!("  Updates:   {}", s.updates_in_period);
    println!("  Milestones {}/{} complete", s.milestones_completed, s.milestones_total);
    println!(
        "  Timeline:  {} (current phase: {})",
        report.timeline.health.as_str(),
        report.timeline.current_phase
    );
    println!("\nImpact this period");
    for (name, value) in report.metrics.period.entries() {
        println!("  {name:<18} {value:>10.1}");
    }
    if !s.highlights.is_empty() {
        println!("\nHighlights");
        for h in &s.highlights {
            println!("  - {h}");
        }
    }
    if !report.challenges.is_empty() {
        println!("\nChallenges");
        for c in &report.challenges {
            let state = if c.is_resolved { "resolved" } else { "open" };
            println!("  - [{state}] {}", c.title);
        }
    }
    if !report.recommendations.is_empty() {
        println!("\nRecommendations");
        for r in &report.recommendations {
            println!("  - {r}");
        }
    }
    if !report.next_period_plan.is_empty() {
        println!("\nNext period");
        for p in &report.next_period_plan {
            println!("  - {p}");
        }
    }
    for section in &report.sections {
        if let Some(body) = &section.body {
            println!("\n{}\n  {body}", section.title);
        }
    }
    for advisory in &report.advisories {
        println!("! {advisory}");
    }
}

async fn handle_template(engine: &ReportEngine, action: TemplateAction) -> anyhow::Result<()> {
    let registry = engine.templates();
    match action {
        TemplateAction::List { as_user } => {
            let caller = engine.caller(&as_user).await?;
            for t in registry.list(&caller).await? {
                let kind = if t.is_system() { "system" } else { "custom" };
                println!("{}  {} [{kind}] v{}", t.id, t.name, t.metadata.version);
            }
        }
        TemplateAction::Show { id } => {
            let template = registry.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        TemplateAction::Validate { file } => {
            let result = validate(&read_template(&file)?);
            if result.is_valid {
                println!("Template is valid.");
            } else {
                for e in &result.errors {
                    println!("  - {e}");
                }
                anyhow::bail!("template has {} error(s)", result.errors.len());
            }
        }
        TemplateAction::Create { file, as_user } => {
            let caller = engine.caller(&as_user).await?;
            let template = registry.create(&caller, read_template(&file)?).await?;
            println!("Created: {} ({})", template.name, template.id);
        }
        TemplateAction::Clone { id, name, as_user } => {
            let caller: Caller = engine.caller(&as_user).await?;
            let template = registry.clone_template(&caller, &id, name).await?;
            println!("Created: {} ({})", template.name, template.id);
        }
        TemplateAction::Delete { id, as_user } => {
            let caller = engine.caller(&as_user).await?;
            registry.delete(&caller, &id).await?;
            println!("Deleted: {id}");
        }
    }
    Ok(())
}

async fn handle_config(engine: &ReportEngine, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match engine.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            engine.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = engine.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
