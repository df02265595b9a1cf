use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use logbook_core::config::keys;
use logbook_core::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rowlog")]
#[command(about = "Rowing club logbook", long_about = None)]
struct Cli {
    /// Directory holding the logbook data
    #[arg(default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an overview of the club (default)
    Summary,

    /// List boats
    Boats {
        /// Only boats at the boathouse
        #[arg(long, conflicts_with = "out")]
        in_house: bool,

        /// Only boats currently out
        #[arg(long)]
        out: bool,
    },

    /// List groups
    Groups,

    /// List members
    Members {
        /// Sort by surname instead of forename
        #[arg(long)]
        by_surname: bool,

        /// Cluster members by group
        #[arg(long)]
        by_group: bool,
    },

    /// List outings of a day
    Outings {
        /// Day to list (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show outing statistics for this year and last year
    Stats {
        /// Sort members by surname instead of forename
        #[arg(long)]
        by_surname: bool,
    },

    /// Add a boat
    AddBoat {
        name: String,

        /// Boat type, e.g. "4x+"
        #[arg(long = "type")]
        boat_type: Option<String>,

        /// The boat is not at the boathouse
        #[arg(long)]
        out: bool,
    },

    /// Add a group
    AddGroup {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Display colour as #RRGGBB
        #[arg(long, default_value = "#808080")]
        colour: String,

        /// New members join this group unless told otherwise
        #[arg(long)]
        default: bool,
    },

    /// Add a member
    AddMember {
        surname: String,

        #[arg(long)]
        forename: Option<String>,

        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        born: NaiveDate,

        /// Group id, defaults to the default group
        #[arg(long)]
        group: Option<GroupId>,
    },

    /// Record an outing
    AddOuting {
        /// Boat name
        #[arg(long)]
        boat: String,

        /// Rower ids, stroke first (up to eight)
        #[arg(long = "rower", required = true)]
        rowers: Vec<MemberId>,

        /// Cox id
        #[arg(long)]
        cox: Option<MemberId>,

        /// Day of the outing (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Departure time (HH:MM)
        #[arg(long = "time-out", value_parser = parse_time)]
        time_out: NaiveTime,

        /// Return time (HH:MM); omit while the crew is on the water
        #[arg(long = "time-in", value_parser = parse_time)]
        time_in: Option<NaiveTime>,

        /// Distance in kilometres
        #[arg(long, default_value_t = 0)]
        distance: u32,

        #[arg(long)]
        destination: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Add an administrator account
    AddAdmin {
        username: String,

        #[arg(long)]
        password: String,

        /// Full name
        #[arg(long, default_value = "")]
        name: String,

        /// Grant root rights
        #[arg(long)]
        root: bool,

        #[arg(long)]
        comment: Option<String>,
    },

    /// List administrator accounts
    Admins,

    /// Export the outings of a year to CSV
    Export {
        /// Calendar year, defaults to the current one
        #[arg(long)]
        year: Option<i32>,

        /// Target file, defaults to outings-<year>.csv in the data directory
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Rewrite the outing journal with one record per outing
    Compact,
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("invalid time '{}': {}", s, e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.data_dir.is_dir() {
        eprintln!(
            "Error: data directory '{}' does not exist or is not a directory",
            cli.data_dir.display()
        );
        return ExitCode::from(2);
    }

    // Data directory settings override the per-user defaults
    let store = ConfigStore::new(&cli.data_dir, ConfigStore::user_default_dir());
    let config = match store.main() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_with_level(&config.get_or(keys::LOG_LEVEL, "warn"));

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            tracing::error!("Fatal storage error: {:?}", e);
            eprintln!("The logbook data could not be accessed. Please inform the club administrator.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    let mut db = FileDatabase::open(&cli.data_dir)?;
    let today = Local::now().date_naive();

    match cli.command.unwrap_or(Commands::Summary) {
        Commands::Summary => cmd_summary(&db, today),
        Commands::Boats { in_house, out } => cmd_boats(&db, in_house, out),
        Commands::Groups => cmd_groups(&db),
        Commands::Members {
            by_surname,
            by_group,
        } => cmd_members(&db, config, sort_mode(by_surname, by_group)),
        Commands::Outings { date } => cmd_outings(&db, config, date.unwrap_or(today)),
        Commands::Stats { by_surname } => cmd_stats(&db, config, sort_mode(by_surname, false)),
        Commands::AddBoat {
            name,
            boat_type,
            out,
        } => {
            db.add_boat(&name, boat_type.as_deref(), !out)?;
            println!("✓ Added boat '{}'", name);
            Ok(())
        }
        Commands::AddGroup {
            name,
            description,
            colour,
            default,
        } => {
            let colour: Colour = colour.parse()?;
            let id = db.add_group(&name, description.as_deref(), colour, default)?;
            println!("✓ Added group '{}' (id {})", name, id);
            Ok(())
        }
        Commands::AddMember {
            surname,
            forename,
            born,
            group,
        } => {
            let group_id = match group {
                Some(id) => id,
                None => {
                    db.get_default_group()?
                        .ok_or_else(|| {
                            Error::IllegalArgument(
                                "no default group; pass --group or flag a group as default".into(),
                            )
                        })?
                        .id
                }
            };
            let id = db.add_member(&surname, forename.as_deref(), born, group_id)?;
            if let Some(member) = db.get_member(id)? {
                println!("✓ Added member {} ({}) to '{}'", member.name_with(config), id, member.group.name);
            }
            Ok(())
        }
        Commands::AddOuting {
            boat,
            rowers,
            cox,
            date,
            time_out,
            time_in,
            distance,
            destination,
            comment,
        } => {
            if rowers.len() > MAX_ROWERS {
                eprintln!(
                    "Warning: only the first {} rowers are recorded",
                    MAX_ROWERS
                );
            }
            let id = db.add_outing(OutingDraft {
                date: date.unwrap_or(today),
                rowers,
                cox,
                time_out,
                time_in,
                comment,
                destination,
                boat_name: boat.clone(),
                distance,
            })?;
            println!("✓ Outing {} recorded for '{}'", id, boat);
            Ok(())
        }
        Commands::AddAdmin {
            username,
            password,
            name,
            root,
            comment,
        } => {
            db.add_admin(&username, &password, &name, root, comment.as_deref())?;
            println!("✓ Added admin '{}'", username);
            Ok(())
        }
        Commands::Admins => cmd_admins(&db),
        Commands::Export { year, out } => {
            let year = year.unwrap_or_else(|| today.year());
            let out = out.unwrap_or_else(|| cli.data_dir.join(format!("outings-{}.csv", year)));
            cmd_export(&db, year, &out)
        }
        Commands::Compact => {
            let count = db.compact()?;
            println!("✓ Journal compacted to {} outings", count);
            Ok(())
        }
    }
}

fn sort_mode(by_surname: bool, by_group: bool) -> SortMode {
    let mut mode = if by_surname {
        SortMode::ALPHABETICAL_SURNAME
    } else {
        SortMode::ALPHABETICAL_FORENAME
    };
    if by_group {
        mode = mode | SortMode::GROUP;
    }
    mode
}

fn cmd_summary(db: &FileDatabase, today: NaiveDate) -> Result<()> {
    let boats = db.get_boats()?;
    let in_house = boats.iter().filter(|b| b.in_house).count();
    let outings = db.get_outings(today)?;
    let on_water = outings.iter().filter(|o| o.in_progress()).count();

    println!("Logbook at {}", db.dir().display());
    println!("  Members: {}", db.get_members()?.len());
    println!("  Groups:  {}", db.get_groups()?.len());
    println!("  Boats:   {} ({} in house)", boats.len(), in_house);
    println!("  Outings today: {} ({} on the water)", outings.len(), on_water);
    match db.get_default_group()? {
        Some(group) => println!("  Default group: {}", group.name),
        None => println!("  Default group: none"),
    }
    Ok(())
}

fn cmd_boats(db: &FileDatabase, in_house: bool, out: bool) -> Result<()> {
    let boats = if in_house || out {
        db.get_boats_in_house(in_house)?
    } else {
        db.get_boats()?
    };

    if boats.is_empty() {
        println!("No boats found.");
        return Ok(());
    }
    for boat in boats {
        println!(
            "  {:<20} {:<8} {}",
            boat.name,
            boat.boat_type.as_deref().unwrap_or("-"),
            if boat.in_house { "in house" } else { "out" }
        );
    }
    Ok(())
}

fn cmd_groups(db: &FileDatabase) -> Result<()> {
    let groups = db.get_groups()?;
    if groups.is_empty() {
        println!("No groups found.");
        return Ok(());
    }
    for group in groups {
        println!(
            "  {:>4}  {:<16} {} {}{}",
            group.id,
            group.name,
            group.colour,
            group.description.as_deref().unwrap_or(""),
            if group.is_default { " (default)" } else { "" }
        );
    }
    Ok(())
}

fn cmd_members(db: &FileDatabase, config: &Config, sorting: SortMode) -> Result<()> {
    let members = db.get_members_sorted(sorting)?;
    if members.is_empty() {
        println!("No members found.");
        return Ok(());
    }
    for member in members {
        println!(
            "  {:>4}  {:<30} {:<12} {}",
            member.id,
            member.name_with(config),
            member.date_of_birth,
            member.group.name
        );
    }
    Ok(())
}

fn cmd_outings(db: &FileDatabase, config: &Config, date: NaiveDate) -> Result<()> {
    let outings = db.get_outings(date)?;
    if outings.is_empty() {
        println!("No outings on {}.", date);
        return Ok(());
    }

    println!("Outings on {}:", date);
    for outing in outings {
        let crew = outing
            .rowers
            .iter()
            .map(|id| member_name(db, config, *id))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let returned = match outing.time_in {
            Some(t) => t.format("%H:%M").to_string(),
            None => "on the water".to_string(),
        };
        println!(
            "  {} - {}  {:<16} {} km  [{}]",
            outing.time_out.format("%H:%M"),
            returned,
            outing.boat_name,
            outing.distance,
            crew
        );
        if let Some(cox) = outing.cox {
            println!("      cox: {}", member_name(db, config, cox)?);
        }
        if let Some(ref destination) = outing.destination {
            println!("      to: {}", destination);
        }
        if let Some(ref comment) = outing.comment {
            println!("      note: {}", comment);
        }
    }
    Ok(())
}

fn member_name(db: &FileDatabase, config: &Config, id: MemberId) -> Result<String> {
    Ok(db
        .get_member(id)?
        .map(|m| m.name_with(config))
        .unwrap_or_else(|| format!("#{}", id)))
}

fn print_statistic(label: &str, stat: &Statistic) {
    println!(
        "  {:<30} {:>4} outings {:>6} km   (last year {:>4} / {:>6} km)",
        label, stat.this_year_outings, stat.this_year_km, stat.last_year_outings, stat.last_year_km
    );
}

fn cmd_stats(db: &FileDatabase, config: &Config, sorting: SortMode) -> Result<()> {
    println!("Boats:");
    for s in db.get_boats_statistics()? {
        print_statistic(&s.boat.name, &s.statistic);
    }
    println!("Groups:");
    for s in db.get_groups_statistics()? {
        print_statistic(&s.group.name, &s.statistic);
    }
    println!("Members:");
    for s in db.get_members_statistics_sorted(sorting)? {
        print_statistic(&s.member.name_with(config), &s.statistic);
    }
    Ok(())
}

fn cmd_admins(db: &FileDatabase) -> Result<()> {
    let admins = db.get_admins()?;
    if admins.is_empty() {
        println!("No admins found.");
        return Ok(());
    }
    for admin in admins {
        println!(
            "  {:<16} {:<24} {}",
            admin.username,
            admin.name,
            if admin.is_root { "root" } else { "" }
        );
    }
    Ok(())
}

fn cmd_export(db: &FileDatabase, year: i32, out: &Path) -> Result<()> {
    let outings = db.memory().outings_in_year(year);
    if outings.is_empty() {
        println!("No outings in {} - nothing to export.", year);
        return Ok(());
    }

    let count = export_outings_csv(&outings, out)?;
    println!("✓ Exported {} outings to CSV", count);
    println!("  CSV: {}", out.display());
    Ok(())
}
