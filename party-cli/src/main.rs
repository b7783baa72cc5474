use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use party_core::{
    Application, ApplicationFilter, ApplicationStatus, Party, PartyFilter, PartyId, PartyStatus,
    UserId,
};
use party_server::repository::{RecordStore, SqliteRepository};
use std::path::PathBuf;

/// Inspect the party finder's record store
#[derive(Parser, Debug)]
#[command(name = "party-cli")]
#[command(about = "Inspect parties and applications in the party finder database", long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, default_value = "party-finder.db", global = true)]
    db: PathBuf,

    /// Print records as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List parties, oldest first
    Parties {
        /// Only parties created by this user
        #[arg(long)]
        creator: Option<String>,

        /// Only parties with this status
        #[arg(long, value_parser = ["open", "closed", "deleted"])]
        status: Option<String>,
    },
    /// Show one party in full
    Show {
        /// Party id
        id: String,
    },
    /// List applications, oldest first
    Applications {
        /// Only applications to this party
        #[arg(long)]
        party: Option<String>,

        /// Only applications with this status
        #[arg(long, value_parser = ["pending", "approved", "rejected"])]
        status: Option<String>,
    },
}

fn party_line(party: &Party) -> String {
    format!(
        "{}  {:<8} {:>2}/{:<2} {}  (creator {}, {})",
        party.id,
        party.status,
        party.member_count(),
        party.max_members,
        party.title,
        party.creator,
        party.created_at.format("%Y-%m-%d %H:%M UTC")
    )
}

fn application_line(application: &Application) -> String {
    format!(
        "{}  {:<8} party {}  {} ({})",
        application.id,
        application.status,
        application.party_id,
        application.applicant_display_name,
        application.applicant
    )
}

fn party_details(party: &Party) -> String {
    let mut lines = vec![party_line(party)];
    if let Some(description) = &party.description {
        lines.push(format!("  description: {}", description));
    }
    lines.push(format!("  context: {}", party.context_id));
    if let Some(message_id) = &party.origin_message_id {
        lines.push(format!("  listing message: {}", message_id));
    }
    let members: Vec<&str> = party.members.iter().map(UserId::as_str).collect();
    lines.push(format!("  members: {}", members.join(", ")));
    for requirement in &party.requirements {
        lines.push(format!(
            "  requirement: {}{}",
            requirement.name,
            requirement
                .description
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        ));
    }
    lines.push(format!("  version: {}", party.version));
    lines.join("\n")
}

async fn run(cli: Cli, records: &dyn RecordStore) -> Result<String> {
    match cli.command {
        Commands::Parties { creator, status } => {
            let mut filter = PartyFilter::default();
            if let Some(creator) = creator {
                filter = filter.created_by(UserId::from(creator));
            }
            if let Some(status) = status {
                let status = PartyStatus::parse(&status)
                    .ok_or_else(|| anyhow!("Unknown party status: {}", status))?;
                filter = filter.with_status(status);
            }
            let parties = records
                .find_parties(&filter)
                .await
                .context("Failed to list parties")?;
            if cli.json {
                return Ok(serde_json::to_string_pretty(&parties)?);
            }
            Ok(parties.iter().map(party_line).collect::<Vec<_>>().join("\n"))
        }

        Commands::Show { id } => {
            let party = records
                .get_party(&PartyId::from(id.as_str()))
                .await
                .context("Failed to load party")?
                .ok_or_else(|| anyhow!("No party with id {}", id))?;
            if cli.json {
                return Ok(serde_json::to_string_pretty(&party)?);
            }
            Ok(party_details(&party))
        }

        Commands::Applications { party, status } => {
            let mut filter = ApplicationFilter::default();
            if let Some(party) = party {
                filter = filter.for_party(PartyId::from(party));
            }
            if let Some(status) = status {
                let status = ApplicationStatus::parse(&status)
                    .ok_or_else(|| anyhow!("Unknown application status: {}", status))?;
                filter = filter.with_status(status);
            }
            let applications = records
                .find_applications(&filter)
                .await
                .context("Failed to list applications")?;
            if cli.json {
                return Ok(serde_json::to_string_pretty(&applications)?);
            }
            Ok(applications
                .iter()
                .map(application_line)
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.db.exists() {
        return Err(anyhow!("Database not found: {}", cli.db.display()));
    }
    let records = SqliteRepository::new(&cli.db)
        .with_context(|| format!("Failed to open {}", cli.db.display()))?;

    let output = run(cli, &records).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
