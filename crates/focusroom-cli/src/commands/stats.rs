use clap::Subcommand;
use focusroom_core::{Database, Identity};

use super::print_json;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats (UTC day)
    Today,
    /// All-time stats
    All,
    /// Most recently completed phases, newest first
    Recent {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: StatsAction, identity: Identity) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Today => print_json(&db.stats_today(&identity)?)?,
        StatsAction::All => print_json(&db.stats_all(&identity)?)?,
        StatsAction::Recent { limit } => {
            for record in db.recent_phases(&identity, limit)? {
                print_json(&record)?;
            }
        }
    }
    Ok(())
}
