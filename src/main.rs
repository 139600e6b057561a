// Travel Tagger - command line client
//
// Drives the same library operations as the server against a local
// database. `pin move` goes through the optimistic reorder view, so it
// exercises both persistence strategies end to end.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use travel_tagger::config::DEFAULT_DB_PATH;
use travel_tagger::map::{draft_from_click, fit_viewport, markers, LatLng, PlaceSelection};
use travel_tagger::pins::{create_pin, delete_pin, fetch_pins};
use travel_tagger::trips::{create_trip, list_trips};
use travel_tagger::{
    accept_invitation, create_invitation, ensure_user_exists, open_database, share_link, Config,
    NewTrip, NewUser, PersistStrategy, PinListView, PinRepository, ReorderOutcome,
    Resync,
};

#[derive(Parser)]
#[command(name = "travel-tagger", about = "Trips, pins and collaborators from the terminal", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, global = true, env = "TAGGER_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Register a user (idempotent)
    User(UserArgs),
    /// Trip commands
    #[command(subcommand)]
    Trip(TripCmd),
    /// Pin commands
    #[command(subcommand)]
    Pin(PinCmd),
    /// Invitation commands
    #[command(subcommand)]
    Invite(InviteCmd),
    /// Print map markers and the fitted viewport for a trip
    Markers(TripRef),
}

#[derive(Args)]
struct UserArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct TripRef {
    /// Acting user id
    #[arg(long)]
    user: String,
    #[arg(long)]
    trip: String,
}

#[derive(Subcommand)]
enum TripCmd {
    /// Create a trip
    Create {
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: String,
        /// YYYY-MM-DD
        #[arg(long)]
        start: Option<NaiveDate>,
        /// YYYY-MM-DD
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// List owned and shared trips
    List {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum PinCmd {
    /// Append a pin to a trip
    Add {
        #[command(flatten)]
        at: TripRef,
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Place id from a map search; the pin is saved as that place
        #[arg(long)]
        place_id: Option<String>,
    },
    /// List pins in order
    List(TripRef),
    /// Move a pin to a new 1-based position
    Move {
        #[command(flatten)]
        at: TripRef,
        #[arg(long)]
        pin: String,
        #[arg(long)]
        to: usize,
        #[arg(long, value_enum, default_value_t = StrategyArg::Atomic)]
        strategy: StrategyArg,
    },
    /// Delete a pin
    Delete {
        #[arg(long)]
        user: String,
        #[arg(long)]
        pin: String,
    },
}

#[derive(Subcommand)]
enum InviteCmd {
    /// Issue an invitation link
    Create(TripRef),
    /// Accept an invitation token
    Accept {
        #[arg(long)]
        user: String,
        #[arg(long)]
        token: String,
        /// Needed when the user has no record yet
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Atomic,
    PerRow,
}

impl From<StrategyArg> for PersistStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Atomic => PersistStrategy::Atomic,
            StrategyArg::PerRow => PersistStrategy::PerRow,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let conn = open_database(&cli.db)
        .with_context(|| format!("failed to open database at {}", cli.db.display()))?;

    match cli.command {
        Commands::Init => {
            println!("✓ Database ready at {}", cli.db.display());
        }
        Commands::User(args) => {
            let new_user = NewUser {
                name: args.name,
                ..NewUser::new(args.id, args.email)
            };
            let status = ensure_user_exists(&conn, &new_user)?;
            println!("✓ User {}: {:?}", new_user.id, status);
        }
        Commands::Trip(cmd) => run_trip(&conn, cmd, cli.json)?,
        Commands::Pin(cmd) => run_pin(&conn, cmd, cli.json)?,
        Commands::Invite(cmd) => run_invite(&conn, cmd)?,
        Commands::Markers(at) => {
            let pins = fetch_pins(&conn, &at.user, &at.trip)?;
            let output = serde_json::json!({
                "markers": markers(&pins),
                "viewport": fit_viewport(&pins),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn run_trip(conn: &Connection, cmd: TripCmd, json: bool) -> Result<()> {
    match cmd {
        TripCmd::Create {
            user,
            name,
            start,
            end,
        } => {
            let trip = create_trip(
                conn,
                &user,
                &NewTrip {
                    name,
                    start_date: start,
                    end_date: end,
                },
            )?;
            println!("✓ Created trip {} ({})", trip.name, trip.id);
        }
        TripCmd::List { user } => {
            let trips = list_trips(conn, &user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trips)?);
                return Ok(());
            }
            if trips.is_empty() {
                println!("No trips yet.");
            }
            for trip in trips {
                println!("{}  {}  [{}]", trip.id, trip.name, trip.date_range_label());
            }
        }
    }
    Ok(())
}

fn run_pin(conn: &Connection, cmd: PinCmd, json: bool) -> Result<()> {
    match cmd {
        PinCmd::Add {
            at,
            name,
            lat,
            lng,
            category,
            notes,
            place_id,
        } => {
            let position = LatLng { lat, lng };
            let mut draft = match place_id {
                Some(place_id) => PlaceSelection {
                    name,
                    place_id: Some(place_id),
                    position,
                }
                .into_draft(),
                None => {
                    let mut draft = draft_from_click(position);
                    draft.pin.nickname = name;
                    draft
                }
            };
            draft.pin.category = category;
            draft.pin.notes = notes;

            let pin = create_pin(conn, &at.user, &at.trip, &draft.pin)?;
            println!("✓ Pin #{} {} ({})", pin.position_label(), pin.nickname, pin.id);
            if let Some(zoom) = draft.zoom {
                println!("  map: {:.4}, {:.4} at zoom {}", draft.center.lat, draft.center.lng, zoom);
            }
        }
        PinCmd::List(at) => {
            let pins = fetch_pins(conn, &at.user, &at.trip)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pins)?);
                return Ok(());
            }
            for pin in pins {
                let visited = if pin.visited_flag { "✓" } else { " " };
                println!(
                    "{:>3}. [{}] {}  {}",
                    pin.position_label(),
                    visited,
                    pin.nickname,
                    pin.category.as_deref().unwrap_or("-")
                );
            }
        }
        PinCmd::Move {
            at,
            pin,
            to,
            strategy,
        } => {
            let Some(target_index) = to.checked_sub(1) else {
                bail!("positions start at 1");
            };
            let repo = PinRepository::new(conn, at.user.as_str());
            let mut view = PinListView::load(&repo, at.trip.as_str(), strategy.into())?;
            let source_index = view
                .pins()
                .iter()
                .position(|p| p.id == pin)
                .with_context(|| format!("pin {} is not in trip {}", pin, at.trip))?;

            match view.reorder(&repo, &pin, source_index, target_index) {
                ReorderOutcome::Committed { writes } => {
                    println!("✓ Moved to position {} ({} write(s))", to, writes);
                }
                ReorderOutcome::Ignored(issue) => {
                    println!("Nothing to do: {}", issue);
                }
                ReorderOutcome::Reverted { cause, resync } => {
                    if let Resync::FetchFailed(e) = resync {
                        eprintln!("✗ could not reload pins: {}", e);
                        if view.can_retry() {
                            eprintln!("  run `pin list` to retry");
                        }
                    }
                    bail!("{} ({})", view.error().unwrap_or("reorder failed"), cause);
                }
            }
        }
        PinCmd::Delete { user, pin } => {
            delete_pin(conn, &user, &pin)?;
            println!("✓ Deleted pin {}", pin);
        }
    }
    Ok(())
}

fn run_invite(conn: &Connection, cmd: InviteCmd) -> Result<()> {
    match cmd {
        InviteCmd::Create(at) => {
            let config = Config::from_env()?;
            let ticket = create_invitation(conn, &at.user, &at.trip, config.invite_ttl())?;
            println!("✓ Invitation for {}", ticket.trip_name);
            println!("  {}", share_link(&config.site_url, &ticket.token));
            println!("  expires {}", ticket.expires_at.to_rfc3339());
        }
        InviteCmd::Accept { user, token, email } => {
            let trip = accept_invitation(conn, &token, &user, email.as_deref(), Utc::now())?;
            println!("✓ Joined {} ({})", trip.name, trip.id);
        }
    }
    Ok(())
}
