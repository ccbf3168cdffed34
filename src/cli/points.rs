//! Point maintenance commands: inspect and reset mechanic totals.

use anyhow::Result;
use clap::Args;
use std::io::{self, Write};

use crate::db::Database;
use crate::types::Mechanic;

/// Arguments for the reset-points command.
#[derive(Args, Debug)]
pub struct ResetPointsArgs {
    /// Reset without prompting for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

fn print_table<W: Write>(out: &mut W, mechanics: &[Mechanic]) -> io::Result<()> {
    if mechanics.is_empty() {
        writeln!(out, "No mechanics registered.")?;
        return Ok(());
    }
    writeln!(out, "{:<24} {:>10} {:>6}", "MECHANIC", "POINTS", "TASKS")?;
    for m in mechanics {
        writeln!(out, "{:<24} {:>10.2} {:>6}", m.name, m.total_points, m.total_tasks)?;
    }
    Ok(())
}

/// Print current point totals, highest first.
pub fn run_points(db: &Database) -> Result<()> {
    let mechanics = db.list_mechanics()?;
    print_table(&mut io::stdout().lock(), &mechanics)?;
    Ok(())
}

/// Zero every mechanic's points and task count.
pub fn run_reset_points(db: &Database, args: &ResetPointsArgs) -> Result<()> {
    println!("Current totals:");
    run_points(db)?;
    println!();

    if !args.yes {
        print!("Reset all mechanic points to zero? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    let before = db.reset_points()?;
    println!("Reset points for {} mechanic(s).", before.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_mechanic() {
        let db = Database::open_in_memory().unwrap();
        db.create_mechanic(Some("Alice".to_string())).unwrap();
        db.create_mechanic(Some("Bob".to_string())).unwrap();

        let mut out = Vec::new();
        print_table(&mut out, &db.list_mechanics().unwrap()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("MECHANIC"));
        assert!(text.contains("Alice"));
        assert!(text.contains("Bob"));
    }

    #[test]
    fn empty_table_says_so() {
        let mut out = Vec::new();
        print_table(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No mechanics registered.\n");
    }

    #[test]
    fn reset_with_yes_zeroes_totals() {
        let db = Database::open_in_memory().unwrap();
        db.create_mechanic(Some("Alice".to_string())).unwrap();

        run_reset_points(&db, &ResetPointsArgs { yes: true }).unwrap();
        let alice = db.get_mechanic("Alice").unwrap().unwrap();
        assert_eq!(alice.total_points, 0.0);
        assert_eq!(alice.total_tasks, 0);
    }
}
