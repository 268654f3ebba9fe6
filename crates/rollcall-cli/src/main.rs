mod config;
mod engine;
mod session;
mod source;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::engine::spawn_engine;
use crate::session::{RemoveOutcome, Session};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from face images (one face crop per image)
    Enroll {
        /// Name of the person to enroll
        name: String,
        /// Image files; the first `required_samples` faces found are used
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize faces in a sequence of frames and mark attendance
    Watch {
        /// Frame image files, processed in order
        #[arg(required = true)]
        frames: Vec<PathBuf>,
        /// Print one JSON report per frame instead of the status line
        #[arg(long)]
        json: bool,
    },
    /// Remove an enrolled person and their attendance history
    Remove {
        name: String,
    },
    /// List enrolled people
    List,
    /// Show recorded attendance
    Attendance {
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let session = Session::open(&config).context("opening data directory")?;
    let engine = spawn_engine(session)?;

    match cli.command {
        Commands::Enroll { name, images } => {
            engine.begin_enrollment(&name).await?;
            let mut enrolled = false;
            for path in &images {
                let (frame, faces) = source::load_frame(path)?;
                let report = engine.process_frame(frame, faces, now()).await?;
                println!("{}: {}", path.display(), report.status);
                if report.enrolled.is_some() {
                    enrolled = true;
                    break;
                }
            }
            if !enrolled {
                if let Some((name, captured)) = engine.cancel_enrollment().await? {
                    bail!(
                        "enrollment of {name} incomplete: {captured}/{} samples captured",
                        config.required_samples
                    );
                }
            }
        }
        Commands::Watch { frames, json } => {
            for path in &frames {
                let (frame, faces) = source::load_frame(path)?;
                let report = engine.process_frame(frame, faces, now()).await?;
                if json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    println!("{}: {}", path.display(), report.status);
                }
            }
        }
        Commands::Remove { name } => match engine.remove(&name).await? {
            RemoveOutcome::Removed { purged_records } => {
                println!("Removed {name} ({purged_records} attendance records purged)");
            }
            RemoveOutcome::NotFound => bail!("{name} is not enrolled"),
        },
        Commands::List => {
            let roster = engine.roster().await?;
            if roster.is_empty() {
                println!("No one enrolled");
            }
            for (name, samples) in roster {
                println!("{name}\t{samples} samples");
            }
        }
        Commands::Attendance { json } => {
            let records = engine.attendance().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in records {
                    println!("{}\t{}\t{}", r.name, r.date, r.time);
                }
            }
        }
        Commands::Config => {}
    }

    Ok(())
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
