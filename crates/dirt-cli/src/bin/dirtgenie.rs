use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dirt_cli::{load_trip, save_revision, save_trip};
use dirt_core::load_or_create_profile;
use dirt_planner::{Credentials, PipelineConfig, PlanningContext, StitchMode, TourPipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan multi-day bikepacking tours", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a new tour and write it to a trip directory
    Plan {
        /// Start location, e.g. "Portland, OR"
        start: String,

        /// End location; use the start again for a loop
        end: String,

        /// Number of nights on the road
        nights: u32,

        /// Rider profile (created with defaults if missing)
        #[arg(long, default_value = "user-profile.yml")]
        profile: PathBuf,

        /// Departure date (YYYY-MM-DD)
        #[arg(long)]
        departure_date: Option<NaiveDate>,

        /// Something to seek out along the way; repeatable
        #[arg(long = "desire")]
        desires: Vec<String>,

        /// Directory that receives the trip folder
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Directions request mode: batched or per-leg
        #[arg(long)]
        stitch_mode: Option<StitchMode>,
    },

    /// Revise a saved trip with feedback
    Revise {
        /// Trip directory written by `plan`
        dir: PathBuf,

        /// What to change
        #[arg(long)]
        feedback: String,
    },
}

fn pipeline(stitch_mode: Option<StitchMode>) -> Result<TourPipeline> {
    let mut config = PipelineConfig::from_env();
    if let Some(mode) = stitch_mode {
        config.stitch_mode = mode;
    }
    let credentials = Credentials::from_env();
    let context = PlanningContext::from_credentials(config, credentials)
        .context("set OPENAI_API_KEY and GOOGLE_MAPS_API_KEY")?;
    Ok(TourPipeline::new(context))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dirtgenie=info".parse()?)
                .add_directive("dirt_planner=info".parse()?)
                .add_directive("dirt_maps=info".parse()?),
        )
        .init();

    match Cli::parse().command {
        Command::Plan {
            start,
            end,
            nights,
            profile,
            departure_date,
            desires,
            output_dir,
            stitch_mode,
        } => {
            let (mut preferences, created) = load_or_create_profile(&profile)
                .with_context(|| format!("failed to load profile {}", profile.display()))?;
            if created {
                tracing::info!(path = %profile.display(), "created default profile");
            }
            if departure_date.is_some() {
                preferences.departure_date = departure_date;
            }
            preferences.desires.extend(desires);

            let pipeline = pipeline(stitch_mode)?;
            let tour = match pipeline.plan(&start, &end, nights, preferences).await {
                Ok(tour) => tour,
                Err(err) => bail!("planning failed ({:?}): {}", err.kind(), err),
            };
            let dir = save_trip(&output_dir, &tour)?;

            println!(
                "Planned {} nights from {} to {}: {:.1} km over {} legs",
                tour.request.nights,
                tour.request.start,
                tour.request.end,
                tour.total_distance_km,
                tour.route.legs.len()
            );
            println!("Trip saved to {}", dir.display());
        }
        Command::Revise { dir, feedback } => {
            if feedback.trim().is_empty() {
                bail!("feedback must not be empty");
            }
            let trip = load_trip(&dir)?;
            let pipeline = pipeline(None)?;
            let mut engine = pipeline.revision_engine(trip.tour.clone());
            if let Err(err) = engine.revise(&feedback, None).await {
                bail!("revision failed ({:?}): {}", err.kind(), err);
            }
            let revised = engine.into_tour();
            let path = save_revision(&trip, &revised)?;

            if revised.route == trip.tour.route {
                println!("Revised plan saved to {}", path.display());
            } else {
                println!(
                    "Route re-planned: {:.1} km over {} legs",
                    revised.total_distance_km,
                    revised.route.legs.len()
                );
                println!("Revised trip saved to {}", trip.dir.display());
            }
        }
    }

    Ok(())
}
