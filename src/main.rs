use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use allowance_tracker::{init_tracing, AllowanceTracker, Command, OrphanPolicy, TrackerConfig};

const DEFAULT_CONFIG_PATH: &str = "allowance_tracker.json";

const USAGE: &str = "usage: allowance-tracker [--config <file>] <command>

commands:
  credit <person> <amount>   add to a balance
  debit <person> <amount>    subtract from a balance
  balance <person>           show one balance
  list                       show every tracked balance
  roster <p1,p2,...>         replace the tracked roster (saved to the config file)
  orphans                    show balances kept for people no longer tracked";

fn main() -> Result<()> {
    init_tracing();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_config_flag(&mut args)?;

    let mut config = TrackerConfig::load(&config_path)?;
    let tracker = AllowanceTracker::open(&config)
        .with_context(|| format!("Failed to open ledger {}", config.db_path.display()))?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["credit", person, amount] => {
            let balance = tracker.dispatch(&Command::Credit {
                person_id: person.to_string(),
                amount: parse_amount(amount)?,
            })?;
            println!("✓ {}: {:.2} {}", person, balance, config.unit_of_measurement);
        }
        ["debit", person, amount] => {
            let balance = tracker.dispatch(&Command::Debit {
                person_id: person.to_string(),
                amount: parse_amount(amount)?,
            })?;
            println!("✓ {}: {:.2} {}", person, balance, config.unit_of_measurement);
        }
        ["balance", person] => {
            let balance = tracker.get_balance(person)?;
            println!("{}: {:.2} {}", person, balance, config.unit_of_measurement);
        }
        ["list"] => {
            let roster = tracker.roster();
            if roster.is_empty() {
                println!("No one is tracked yet. Run: allowance-tracker roster <names>");
            }
            for person in roster {
                let Some(account) = tracker.store().get_account(&person)? else {
                    continue;
                };
                let flag = if account.is_overdrawn() { "  ⚠️ overdrawn" } else { "" };
                println!(
                    "{:<20} {:>10.2} {}{}",
                    person, account.balance, config.unit_of_measurement, flag
                );
            }
        }
        ["roster", people] => {
            let roster: Vec<String> = people
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            check_roster(&roster, tracker.registry().orphan_policy())?;

            let change = tracker.set_roster(&roster)?;
            config.roster = tracker.roster();
            config.save(&config_path)?;

            println!("✓ Added: {:?}", change.added);
            println!("✓ Removed: {:?}", change.removed);
            println!("✓ Ledger: {}", tracker.store().path().display());
        }
        ["orphans"] => {
            for person in tracker.orphans()? {
                let balance = tracker.get_balance(&person)?;
                println!("{:<20} {:>10.2} {}", person, balance, config.unit_of_measurement);
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn take_config_flag(args: &mut Vec<String>) -> Result<PathBuf> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => {
            if i + 1 >= args.len() {
                bail!("--config requires a path");
            }
            let path = args.remove(i + 1);
            args.remove(i);
            Ok(PathBuf::from(path))
        }
        None => Ok(PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

fn parse_amount(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("'{}' is not a number", raw))
}

/// An empty saved roster means "recover from the ledger" on the next start, so
/// under `Retain` it would bring back everyone just removed.
fn check_roster(roster: &[String], policy: OrphanPolicy) -> Result<()> {
    if roster.is_empty() && policy == OrphanPolicy::Retain {
        bail!(
            "refusing an empty roster: retained balances would be tracked again on next start \
             (set \"orphan_policy\": \"purge\" to clear the ledger instead)"
        );
    }
    Ok(())
}
