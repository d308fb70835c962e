use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dispatch_cli::commands::dispatch::NearestTarget;
use dispatch_cli::commands::{self, AppContext};
use dispatch_cli::logging::{init_logging, LoggingConfig};
use dispatch_cli::output::{Output, OutputFormat};
use dispatch_lib::{
    Error as LibError, ErrorKind, GeoPoint, IncidentPriority, IncidentStatus, NewIncident,
    StatusFilter, VehicleStatus,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Emergency dispatch engine over a local SQLite store")]
struct Cli {
    /// Database file. Defaults to dispatch.db in the platform data directory.
    #[arg(long, env = "DISPATCH_DB", global = true)]
    db: Option<PathBuf>,

    /// Skip the routing service and estimate routes as straight lines.
    #[arg(long, global = true)]
    offline: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and report its location.
    Init,
    /// Load the Lagos demo fleet into empty tables.
    Seed,
    /// Manage response vehicles.
    #[command(subcommand)]
    Vehicle(VehicleCommand),
    /// Manage incidents.
    #[command(subcommand)]
    Incident(IncidentCommand),
    /// Assign the nearest available vehicle to a pending incident.
    Dispatch {
        /// Incident id.
        incident_id: String,
    },
    /// Find the nearest vehicle to a point or a point of interest.
    Nearest {
        #[arg(long, allow_negative_numbers = true, requires = "lat", conflicts_with = "poi")]
        lon: Option<f64>,
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,
        /// Point of interest id, e.g. a hospital.
        #[arg(long)]
        poi: Option<String>,
        /// `any` or a comma separated list of statuses.
        #[arg(long, default_value = "available")]
        status: StatusFilter,
    },
    /// Manage points of interest.
    #[command(subcommand)]
    Poi(PoiCommand),
    /// Distance and travel time between two points.
    Route {
        #[arg(long, allow_negative_numbers = true)]
        from_lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        from_lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        to_lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        to_lat: f64,
    },
}

#[derive(Subcommand, Debug)]
enum VehicleCommand {
    /// Register a vehicle.
    Add {
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value = "available")]
        status: VehicleStatus,
    },
    /// Report a new position.
    Move {
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Set the status (available or busy).
    Status { id: String, status: VehicleStatus },
    /// List vehicles, most recently updated first.
    List {
        #[arg(long)]
        status: Option<VehicleStatus>,
    },
}

#[derive(Subcommand, Debug)]
enum IncidentCommand {
    /// Open a pending incident.
    Create {
        #[arg(long)]
        address: String,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value = "medium")]
        priority: IncidentPriority,
        #[arg(long)]
        note: Option<String>,
    },
    /// Move an incident to a new status.
    Status { id: String, status: IncidentStatus },
    /// List incidents, newest first.
    List {
        #[arg(long)]
        status: Option<IncidentStatus>,
    },
    /// Show one incident.
    Show { id: String },
}

#[derive(Subcommand, Debug)]
enum PoiCommand {
    /// List points of interest.
    List,
}

fn main() -> ExitCode {
    init_logging(&LoggingConfig::from_env());
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(commands::default_db_path);
    let coordinator = commands::open_coordinator(&db_path, cli.offline)?;
    let ctx = AppContext {
        coordinator,
        output: Output::new(cli.format),
    };

    let outcome = execute(&ctx, cli.command, &db_path);
    ctx.coordinator.shutdown();
    outcome
}

fn execute(ctx: &AppContext, command: Command, db_path: &Path) -> Result<()> {
    match command {
        Command::Init => commands::seed::handle_init(ctx, db_path),
        Command::Seed => commands::seed::handle_seed(ctx),
        Command::Vehicle(cmd) => match cmd {
            VehicleCommand::Add {
                id,
                lon,
                lat,
                status,
            } => commands::vehicle::handle_add(ctx, &id, GeoPoint::new(lon, lat)?, status),
            VehicleCommand::Move { id, lon, lat } => {
                commands::vehicle::handle_move(ctx, &id, GeoPoint::new(lon, lat)?)
            }
            VehicleCommand::Status { id, status } => {
                commands::vehicle::handle_status(ctx, &id, status)
            }
            VehicleCommand::List { status } => commands::vehicle::handle_list(ctx, status),
        },
        Command::Incident(cmd) => match cmd {
            IncidentCommand::Create {
                address,
                lon,
                lat,
                priority,
                note,
            } => {
                let mut new =
                    NewIncident::new(address, GeoPoint::new(lon, lat)?).with_priority(priority);
                if let Some(note) = note {
                    new = new.with_note(note);
                }
                commands::incident::handle_create(ctx, new)
            }
            IncidentCommand::Status { id, status } => {
                commands::incident::handle_status(ctx, &id, status)
            }
            IncidentCommand::List { status } => commands::incident::handle_list(ctx, status),
            IncidentCommand::Show { id } => commands::incident::handle_show(ctx, &id),
        },
        Command::Dispatch { incident_id } => {
            commands::dispatch::handle_dispatch(ctx, &incident_id)
        }
        Command::Nearest {
            lon,
            lat,
            poi,
            status,
        } => {
            let target = match (lon, lat, poi) {
                (Some(lon), Some(lat), None) => NearestTarget::Point(GeoPoint::new(lon, lat)?),
                (None, None, Some(poi)) => NearestTarget::PointOfInterest(poi),
                _ => anyhow::bail!("nearest needs either --lon and --lat, or --poi"),
            };
            commands::dispatch::handle_nearest(ctx, &target, status)
                .context("nearest vehicle lookup failed")
        }
        Command::Poi(PoiCommand::List) => commands::poi::handle_list(ctx),
        Command::Route {
            from_lon,
            from_lat,
            to_lon,
            to_lat,
        } => commands::route::handle_route(
            ctx,
            GeoPoint::new(from_lon, from_lat)?,
            GeoPoint::new(to_lon, to_lat)?,
        ),
    }
}

/// Map engine error kinds to distinct exit codes; anything else is 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<LibError>())
        .map(LibError::kind);
    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::InvalidState) => 4,
        Some(ErrorKind::NoCapacity) => 5,
        Some(ErrorKind::DependencyUnavailable) => 6,
        Some(ErrorKind::Internal) | None => 1,
    }
}
