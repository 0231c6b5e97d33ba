//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the engine end to end: load or seed an outline, mutate it,
//!   print the visible projection.
//! - Optionally persist to a SQLite file so repeated runs resume state.

use clap::Parser;
use log::info;
use outline_core::{
    init_logging, open_db, Caret, EngineConfig, LogLevel, MutationEngine, NodeId,
    SqliteNodeRepository,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "outline_cli", about = "Smoke run of the outline tree engine")]
struct Cli {
    /// SQLite file to load from and persist to; in-memory demo when absent
    #[arg(long)]
    db: Option<PathBuf>,
    /// Absolute directory for rolling log files; logging is off when absent
    #[arg(long)]
    log_dir: Option<String>,
    /// Print visible rows as JSON instead of an indented outline
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &cli.log_dir {
        init_logging(LogLevel::default_for_build().as_str(), log_dir)?;
    }
    println!("outline_core version={}", outline_core::core_version());

    let Some(db_path) = &cli.db else {
        let mut engine = MutationEngine::new(EngineConfig::default());
        seed_demo(&mut engine)?;
        return print_outline(&engine, cli.json);
    };

    let conn = open_db(db_path)?;
    let mut repo = SqliteNodeRepository::try_new(&conn)?;
    let mut engine = MutationEngine::from_nodes(EngineConfig::default(), repo.load_all()?)?;
    let fresh = engine.len() == 1 && engine.nodes().all(|node| node.content.is_empty());
    if fresh {
        seed_demo(&mut engine)?;
    }
    let report = engine.flush_all_persistence(&mut repo);
    info!(
        "event=cli_persist module=cli status=ok sent={} failed={} remaining={}",
        report.sent, report.failed, report.remaining
    );
    println!(
        "persisted sent={} failed={} stored={}",
        report.sent,
        report.failed,
        repo.count_active()?
    );
    print_outline(&engine, cli.json)
}

/// Builds a small outline through the same commands an editor would issue.
fn seed_demo(engine: &mut MutationEngine) -> Result<(), Box<dyn Error>> {
    let first = engine.document_order()[0];
    engine.set_content(first, "Weekend plans")?;
    engine.set_focus(first, Caret::End)?;

    let groceries = append(engine, None, "Groceries")?;
    let milk = append(engine, Some(groceries), "Milk and bread")?;
    engine.set_checkbox(milk, true)?;
    let split = engine.split_at_cursor(milk, 4)?;
    let bread = split.created.first().copied().ok_or("split created no node")?;
    engine.set_content(bread, "Bread")?;
    engine.toggle_complete(milk)?;

    let chores = append(engine, None, "Chores")?;
    let laundry = append(engine, None, "Laundry")?;
    engine.indent(laundry)?;
    engine.set_collapsed(chores, true)?;
    Ok(())
}

fn append(
    engine: &mut MutationEngine,
    parent: Option<NodeId>,
    content: &str,
) -> Result<NodeId, Box<dyn Error>> {
    Ok(engine.append_node(parent, content)?)
}

fn print_outline(engine: &MutationEngine, json: bool) -> Result<(), Box<dyn Error>> {
    let projection = engine.projection();
    if json {
        println!("{}", serde_json::to_string_pretty(projection.rows())?);
        return Ok(());
    }
    for row in projection.rows() {
        let node = engine.node(row.id)?;
        let marker = match (node.is_checkbox, node.completed) {
            (true, true) => "[x]",
            (true, false) => "[ ]",
            (false, _) if row.collapsed && row.has_children => "+",
            (false, _) => "-",
        };
        println!("{}{} {}", "  ".repeat(row.depth), marker, node.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn flags_are_optional() {
        let cli = Cli::try_parse_from(["outline_cli"]).unwrap();
        assert!(cli.db.is_none());
        assert!(cli.log_dir.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn long_flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "outline_cli",
            "--db",
            "outline.db",
            "--log-dir",
            "/tmp/outline-logs",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("outline.db")));
        assert_eq!(cli.log_dir.as_deref(), Some("/tmp/outline-logs"));
        assert!(cli.json);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["outline_cli", "--verbose"]).is_err());
    }
}
