use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use ulid::Ulid;

use studiodesk::admin::StudioAdmin;
use studiodesk::backend::MemoryBackend;
use studiodesk::calendar::{Calendar, SharedBackend};
use studiodesk::catalog::{Catalog, StudioFilter};
use studiodesk::config::Config;
use studiodesk::model::*;
use studiodesk::notify::{Level, Notice, NotifyHub};

#[derive(Parser)]
#[command(name = "studiodesk", version, about = "Book creative studios without double-booking")]
struct Cli {
    /// Act as this user. Without it the session is signed out.
    #[arg(long, global = true)]
    user: Option<Ulid>,
    /// Give the user the admin role.
    #[arg(long, global = true)]
    admin: bool,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List studios with their current status
    Studios {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<StudioCategory>,
        /// Instant (unix ms) to compute status at; defaults to now.
        #[arg(long)]
        at: Option<Ms>,
    },
    /// Create a studio (admin)
    StudioAdd {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        image_url: String,
        #[arg(long, default_value_t = 0)]
        price: u32,
        #[arg(long, default_value_t = 1)]
        capacity: u32,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "photography")]
        category: StudioCategory,
    },
    /// Delete a studio and its bookings (admin)
    StudioRm { id: StudioId },
    /// Show a studio's bookings
    Bookings { studio: StudioId },
    /// Show your own bookings
    Mine,
    /// Free time in a studio between two instants
    Free { studio: StudioId, from: Ms, to: Ms },
    /// Book a studio
    Book {
        studio: StudioId,
        start: Ms,
        end: Ms,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Reschedule one of your bookings
    Move {
        studio: StudioId,
        booking: Ulid,
        start: Ms,
        end: Ms,
    },
    /// Cancel one of your bookings
    Cancel { studio: StudioId, booking: Ulid },
}

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

fn emit<T: Serialize>(json: bool, value: &T, plain: impl FnOnce(&T)) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain(value);
    }
    Ok(())
}

fn print_booking(b: &Booking) {
    println!(
        "{}  [{}, {})  {}  owner={}",
        b.id,
        b.span.start,
        b.span.end,
        b.display_title(),
        b.owner_id.map_or("-".to_string(), |u| u.to_string())
    );
}

fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    while let Ok(n) = rx.try_recv() {
        let tag = match n.level {
            Level::Success => "ok",
            Level::Error => "error",
        };
        eprintln!("[{tag}] {}: {}", n.title, n.description);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    std::fs::create_dir_all(&config.data_dir)?;
    let root = MemoryBackend::open(&config.wal_path(), config.backend_options())?;
    info!("data: {}", config.wal_path().display());

    let client = match cli.user {
        Some(id) if cli.admin => root.signed_in(User::admin(id)),
        Some(id) => root.signed_in(User::member(id)),
        None => root.anonymous(),
    };
    let backend: SharedBackend = Arc::new(client);
    let session = Session::resolve(backend.as_ref()).await?;
    let notify = Arc::new(NotifyHub::new(config.notice_capacity));
    let mut notices = notify.subscribe();

    let result = run(cli.command, cli.json, &config, backend, session, notify).await;
    print_notices(&mut notices);
    result
}

async fn run(
    command: Command,
    json: bool,
    config: &Config,
    backend: SharedBackend,
    session: Session,
    notify: Arc<NotifyHub>,
) -> Result<(), Box<dyn std::error::Error>> {
    let open_calendar = |studio: StudioId| {
        let backend = backend.clone();
        let notify = notify.clone();
        async move {
            Calendar::open(backend, session, studio, notify)
                .await
                .map(|c| c.with_operating_hours(config.hours))
        }
    };

    match command {
        Command::Studios { search, category, at } => {
            let catalog = Catalog::new(backend.clone(), config.hours);
            let filter = StudioFilter { search, category };
            let statuses = catalog.statuses(at.unwrap_or_else(now_ms)).await?;
            let rows: Vec<_> = statuses
                .into_iter()
                .filter(|(s, _)| filter.matches(s))
                .map(|(s, status)| (s, status.label()))
                .collect();
            emit(json, &rows, |rows| {
                for (s, status) in rows {
                    println!(
                        "{}  {}  {}  {}  {}",
                        s.id,
                        s.name,
                        s.category.label(),
                        s.price_label(),
                        status
                    );
                }
            })?;
        }
        Command::StudioAdd {
            name,
            description,
            image_url,
            price,
            capacity,
            location,
            category,
        } => {
            let admin = StudioAdmin::new(backend.clone(), &session, notify.clone())?;
            let studio = admin
                .create(StudioDraft {
                    name,
                    description,
                    image_url,
                    price_per_hour: price,
                    capacity,
                    location,
                    category,
                })
                .await?;
            emit(json, &studio, |s| println!("{}", s.id))?;
        }
        Command::StudioRm { id } => {
            let admin = StudioAdmin::new(backend.clone(), &session, notify.clone())?;
            admin.delete(id).await?;
        }
        Command::Bookings { studio } => {
            let calendar = open_calendar(studio).await?;
            emit(json, &calendar.events().await, |events| {
                events.iter().for_each(print_booking)
            })?;
        }
        Command::Mine => {
            let catalog = Catalog::new(backend.clone(), config.hours);
            let mine = catalog.my_bookings(&session).await?;
            let rows: Vec<_> = mine
                .into_iter()
                .map(|own| (own.studio.map(|s| s.name), own.booking))
                .collect();
            emit(json, &rows, |rows| {
                for (studio, b) in rows {
                    print!("{}  ", studio.as_deref().unwrap_or("(deleted studio)"));
                    print_booking(b);
                }
            })?;
        }
        Command::Free { studio, from, to } => {
            if from > to {
                return Err(format!("{from} is after {to}").into());
            }
            let calendar = open_calendar(studio).await?;
            let free = calendar.free_slots(Span::new(from, to)).await?;
            emit(json, &free, |free| {
                for s in free {
                    println!("[{}, {})", s.start, s.end);
                }
            })?;
        }
        Command::Book {
            studio,
            start,
            end,
            title,
            description,
        } => {
            if start > end {
                return Err(format!("{start} is after {end}").into());
            }
            let calendar = open_calendar(studio).await?;
            let span = Span::new(start, end);
            let booking = calendar.book(span, title, description).await?;
            let price = calendar.quote(&span);
            emit(json, &booking, |b| {
                print_booking(b);
                println!("total: ${price}");
            })?;
        }
        Command::Move {
            studio,
            booking,
            start,
            end,
        } => {
            if start > end {
                return Err(format!("{start} is after {end}").into());
            }
            let calendar = open_calendar(studio).await?;
            let moved = calendar
                .move_booking(BookingId::Confirmed(booking), Span::new(start, end))
                .await?;
            emit(json, &moved, print_booking)?;
        }
        Command::Cancel { studio, booking } => {
            let calendar = open_calendar(studio).await?;
            calendar.delete(BookingId::Confirmed(booking)).await?;
        }
    }
    Ok(())
}
