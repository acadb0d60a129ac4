use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use hreg_events::files::{self, EventFile};
use hreg_events::{EngineConfig, Event, EventFileName, EventSystem, LoadReport};
use hreg_trust::{RegisterEndpoint, RegisterVendor, TrustStore, VendorClaim};
use hreg_types::EventType;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Replay(args) => cmd_replay(args, cli.format),
        Command::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn cmd_replay(args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.dir {
        config.data_dir = Some(dir);
    }
    if args.require_signatures {
        config.require_signatures = true;
    }
    let Some(data_dir) = config.data_dir.clone() else {
        anyhow::bail!("no event directory: pass --dir or set data_dir in the config file");
    };

    let store = Arc::new(match args.domain {
        Some(domain) => TrustStore::with_domain(domain),
        None => TrustStore::new(),
    });
    let mut system = EventSystem::new(config);
    hreg_trust::install(&mut system, &store);

    let report = system
        .load_and_apply_events()
        .with_context(|| format!("replaying {}", data_dir.display()))?;
    let stats = system.stats();

    if format == OutputFormat::Json {
        let deferred: Vec<_> = system
            .deferred()
            .map(|d| {
                json!({
                    "ref": d.event.reference().to_string(),
                    "type": d.event.event_type().to_string(),
                    "attempts": d.attempts,
                    "reason": d.reason.to_string(),
                })
            })
            .collect();
        let dead: Vec<_> = system
            .dead_letters()
            .iter()
            .map(|d| {
                json!({
                    "ref": d.event.reference().to_string(),
                    "type": d.event.event_type().to_string(),
                    "attempts": d.attempts,
                    "reason": d.reason,
                })
            })
            .collect();
        let out = json!({
            "report": report,
            "stats": stats,
            "trustedRoots": store.root_subjects(),
            "deferred": deferred,
            "deadLetters": dead,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_report(&data_dir, &report);
    let roots = store.root_subjects();
    println!("  Trusted roots: {}", roots.len().to_string().bold());
    for subject in &roots {
        println!("    {}", subject.cyan());
    }
    for deferred in system.deferred() {
        println!(
            "  {} {} {} ({} attempts): {}",
            "deferred".yellow(),
            deferred.event.reference().short_hex().dimmed(),
            deferred.event.event_type(),
            deferred.attempts,
            deferred.reason
        );
    }
    for dead in system.dead_letters() {
        println!(
            "  {} {} {} ({} attempts): {}",
            "dead".red(),
            dead.event.reference().short_hex().dimmed(),
            dead.event.event_type(),
            dead.attempts,
            dead.reason
        );
    }
    if stats.deferred == 0 && stats.dead_letters == 0 {
        println!("{} All events applied.", "✓".green().bold());
    }
    Ok(())
}

fn print_report(dir: &Path, report: &LoadReport) {
    println!("Replayed {}", dir.display().to_string().bold());
    println!("  Files read: {}", report.files_read.to_string().bold());
    if report.skipped > 0 {
        println!("  Skipped: {}", report.skipped.to_string().dimmed());
    }
    println!("  Committed: {}", report.committed.to_string().green());
    if report.already_committed > 0 {
        println!("  Already committed: {}", report.already_committed);
    }
    if report.failed > 0 {
        println!("  Handler failures: {}", report.failed.to_string().yellow());
    }
    println!("  Deferred: {}", report.deferred.to_string().yellow());
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", args.file.display()))?;
    let event = match EventFileName::parse(file_name)? {
        Some(name) => files::read_event(&EventFile {
            path: args.file.clone(),
            name,
        })?,
        None => {
            let bytes = std::fs::read(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            Event::parse(&bytes).with_context(|| format!("parsing {}", args.file.display()))?
        }
    };

    let summary = payload_summary(&event);
    if format == OutputFormat::Json {
        let out = json!({
            "ref": event.reference().to_string(),
            "version": event.version(),
            "type": event.event_type().to_string(),
            "issuedAt": event.issued_at().map(|t| t.to_rfc3339()),
            "prev": event.prev().map(|r| r.to_string()),
            "signed": event.is_signed(),
            "payload": event.payload(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Event {}", event.reference().to_string().yellow().bold());
    println!("  Type: {}", event.event_type().to_string().cyan());
    println!("  Version: {}", event.version());
    match event.issued_at() {
        Some(at) => println!("  Issued: {}", at.to_rfc3339()),
        None => println!("  Issued: {}", "unknown".dimmed()),
    }
    match event.prev() {
        Some(prev) => println!("  Prev: {}", prev.to_string().dimmed()),
        None => println!("  Prev: {}", "none (chain head)".dimmed()),
    }
    if event.is_signed() {
        println!("  Signed: {}", "yes".green());
    } else {
        println!("  Signed: {}", "no".yellow());
    }
    if let Some(summary) = summary {
        println!("  {summary}");
    }
    Ok(())
}

/// One-line description of registry payloads; `None` for other types or
/// when the payload does not decode.
fn payload_summary(event: &Event) -> Option<String> {
    let event_type = event.event_type();
    if *event_type == EventType::register_vendor() {
        let p = RegisterVendor::from_event(event).ok()?;
        Some(format!(
            "Vendor {} ({}), {} certificate(s)",
            p.identifier,
            p.name,
            p.certificates.len()
        ))
    } else if *event_type == EventType::vendor_claim() {
        let p = VendorClaim::from_event(event).ok()?;
        Some(format!("Vendor {} claims {}", p.identifier, p.organization_id))
    } else if *event_type == EventType::register_endpoint() {
        let p = RegisterEndpoint::from_event(event).ok()?;
        Some(format!("Endpoint {} of {} at {}", p.identifier, p.vendor_id, p.url))
    } else {
        None
    }
}
