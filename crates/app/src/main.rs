use std::fmt;

use chrono::NaiveDate;
use services::{AppServices, Clock, LogProgressInput, SetStatusInput};
use shelf_core::model::{BookId, ReadingStatus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    InvalidBookId { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDate { flag: &'static str, raw: String },
    InvalidStatus { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing required argument: {name}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidBookId { raw } => write!(f, "invalid book id: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDate { flag, raw } => {
                write!(f, "invalid {flag} value (expected YYYY-MM-DD): {raw}")
            }
            ArgsError::InvalidStatus { raw } => write!(
                f,
                "invalid status: {raw} (expected to-read, read-next, reading, read, or dnf)"
            ),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_date(flag: &'static str, raw: &str) -> Result<NaiveDate, ArgsError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ArgsError::InvalidDate {
        flag,
        raw: raw.to_string(),
    })
}

fn parse_number(flag: &'static str, raw: &str) -> Result<u32, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidNumber {
        flag,
        raw: raw.to_string(),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  shelf add <title> [--pages <n>] [--db <sqlite_url>]");
    eprintln!("  shelf status <book-id> <status> [--rating <1-5>] [--review <text>]");
    eprintln!("                                  [--started <date>] [--completed <date>]");
    eprintln!("  shelf log <book-id> [--page <n> | --percent <n>] [--date <date>] [--notes <text>]");
    eprintln!("  shelf pages <book-id> <new-total>");
    eprintln!("  shelf show <book-id>");
    eprintln!("  shelf list");
    eprintln!();
    eprintln!("Statuses: to-read, read-next, reading, read, dnf");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:shelf.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SHELF_DB_URL, SHELF_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Add,
    Status,
    Log,
    Pages,
    Show,
    List,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "add" => Some(Self::Add),
            "status" => Some(Self::Status),
            "log" => Some(Self::Log),
            "pages" => Some(Self::Pages),
            "show" => Some(Self::Show),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CommonArgs {
    db_url: String,
}

impl CommonArgs {
    fn from_env() -> Self {
        let db_url = std::env::var("SHELF_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://shelf.sqlite3".into(), normalize_sqlite_url);
        Self { db_url }
    }

    fn consume_flag(
        &mut self,
        arg: &str,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<bool, ArgsError> {
        if arg == "--db" {
            let value = require_value(args, "--db")?;
            if value.trim().is_empty() {
                return Err(ArgsError::InvalidDbUrl { raw: value });
            }
            self.db_url = normalize_sqlite_url(value);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Debug)]
struct AddArgs {
    title: String,
    pages: Option<u32>,
}

#[derive(Debug)]
struct StatusArgs {
    book_id: BookId,
    input: SetStatusInput,
}

#[derive(Debug)]
struct LogArgs {
    book_id: BookId,
    input: LogProgressInput,
}

#[derive(Debug)]
struct PagesArgs {
    book_id: BookId,
    new_total: u32,
}

fn parse_book_id(raw: &str) -> Result<BookId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidBookId {
        raw: raw.to_string(),
    })
}

fn parse_add(
    common: &mut CommonArgs,
    args: &mut impl Iterator<Item = String>,
) -> Result<AddArgs, ArgsError> {
    let mut title: Option<String> = None;
    let mut pages = None;

    while let Some(arg) = args.next() {
        if common.consume_flag(&arg, args)? {
            continue;
        }
        match arg.as_str() {
            "--pages" => {
                let value = require_value(args, "--pages")?;
                pages = Some(parse_number("--pages", &value)?);
            }
            _ if !arg.starts_with("--") && title.is_none() => title = Some(arg),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(AddArgs {
        title: title.ok_or(ArgsError::MissingArg { name: "title" })?,
        pages,
    })
}

fn parse_status(
    common: &mut CommonArgs,
    args: &mut impl Iterator<Item = String>,
) -> Result<StatusArgs, ArgsError> {
    let mut book_id = None;
    let mut status = None;
    let mut rating = None;
    let mut review = None;
    let mut started_date = None;
    let mut completed_date = None;

    while let Some(arg) = args.next() {
        if common.consume_flag(&arg, args)? {
            continue;
        }
        match arg.as_str() {
            "--rating" => {
                let value = require_value(args, "--rating")?;
                let parsed = parse_number("--rating", &value)?;
                rating = Some(u8::try_from(parsed).map_err(|_| ArgsError::InvalidNumber {
                    flag: "--rating",
                    raw: value,
                })?);
            }
            "--review" => review = Some(require_value(args, "--review")?),
            "--started" => {
                let value = require_value(args, "--started")?;
                started_date = Some(parse_date("--started", &value)?);
            }
            "--completed" => {
                let value = require_value(args, "--completed")?;
                completed_date = Some(parse_date("--completed", &value)?);
            }
            _ if !arg.starts_with("--") && book_id.is_none() => {
                book_id = Some(parse_book_id(&arg)?);
            }
            _ if !arg.starts_with("--") && status.is_none() => {
                status =
                    Some(ReadingStatus::parse(&arg).map_err(|_| ArgsError::InvalidStatus {
                        raw: arg.clone(),
                    })?);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    let mut input =
        SetStatusInput::new(status.ok_or(ArgsError::MissingArg { name: "status" })?);
    input.rating = rating;
    input.review = review;
    input.started_date = started_date;
    input.completed_date = completed_date;

    Ok(StatusArgs {
        book_id: book_id.ok_or(ArgsError::MissingArg { name: "book-id" })?,
        input,
    })
}

fn parse_log(
    common: &mut CommonArgs,
    args: &mut impl Iterator<Item = String>,
) -> Result<LogArgs, ArgsError> {
    let mut book_id = None;
    let mut input = LogProgressInput::default();

    while let Some(arg) = args.next() {
        if common.consume_flag(&arg, args)? {
            continue;
        }
        match arg.as_str() {
            "--page" => {
                let value = require_value(args, "--page")?;
                input.current_page = Some(parse_number("--page", &value)?);
            }
            "--percent" => {
                let value = require_value(args, "--percent")?;
                input.current_percentage = Some(parse_number("--percent", &value)?);
            }
            "--date" => {
                let value = require_value(args, "--date")?;
                input.progress_date = Some(parse_date("--date", &value)?);
            }
            "--notes" => input.notes = Some(require_value(args, "--notes")?),
            _ if !arg.starts_with("--") && book_id.is_none() => {
                book_id = Some(parse_book_id(&arg)?);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(LogArgs {
        book_id: book_id.ok_or(ArgsError::MissingArg { name: "book-id" })?,
        input,
    })
}

fn parse_pages(
    common: &mut CommonArgs,
    args: &mut impl Iterator<Item = String>,
) -> Result<PagesArgs, ArgsError> {
    let mut book_id = None;
    let mut new_total = None;

    while let Some(arg) = args.next() {
        if common.consume_flag(&arg, args)? {
            continue;
        }
        match arg.as_str() {
            _ if !arg.starts_with("--") && book_id.is_none() => {
                book_id = Some(parse_book_id(&arg)?);
            }
            _ if !arg.starts_with("--") && new_total.is_none() => {
                new_total = Some(parse_number("new-total", &arg)?);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(PagesArgs {
        book_id: book_id.ok_or(ArgsError::MissingArg { name: "book-id" })?,
        new_total: new_total.ok_or(ArgsError::MissingArg { name: "new-total" })?,
    })
}

fn parse_single_book_id(
    common: &mut CommonArgs,
    args: &mut impl Iterator<Item = String>,
) -> Result<BookId, ArgsError> {
    let mut book_id = None;
    while let Some(arg) = args.next() {
        if common.consume_flag(&arg, args)? {
            continue;
        }
        if !arg.starts_with("--") && book_id.is_none() {
            book_id = Some(parse_book_id(&arg)?);
        } else {
            return Err(ArgsError::UnknownArg(arg));
        }
    }
    book_id.ok_or(ArgsError::MissingArg { name: "book-id" })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_session(session: &shelf_core::model::ReadingSession) {
    let dates = [
        ("started", session.started_date()),
        ("completed", session.completed_date()),
        ("dnf", session.dnf_date()),
    ]
    .into_iter()
    .filter_map(|(label, date)| date.map(|d| format!("{label} {d}")))
    .collect::<Vec<_>>()
    .join(", ");

    println!(
        "  session {} [{}]{}{}",
        session.session_number(),
        session.status(),
        if session.is_active() { " (active)" } else { "" },
        if dates.is_empty() {
            String::new()
        } else {
            format!(" - {dates}")
        }
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let filter = std::env::var("SHELF_LOG").unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut common = CommonArgs::from_env();
    let mut iter = argv.into_iter();

    // Parse fully before opening the database so a typo never creates files.
    enum Parsed {
        Add(AddArgs),
        Status(StatusArgs),
        Log(LogArgs),
        Pages(PagesArgs),
        Show(BookId),
        List,
    }

    let parsed = match cmd {
        Command::Add => Parsed::Add(parse_add(&mut common, &mut iter)?),
        Command::Status => Parsed::Status(parse_status(&mut common, &mut iter)?),
        Command::Log => Parsed::Log(parse_log(&mut common, &mut iter)?),
        Command::Pages => Parsed::Pages(parse_pages(&mut common, &mut iter)?),
        Command::Show => Parsed::Show(parse_single_book_id(&mut common, &mut iter)?),
        Command::List => {
            while let Some(arg) = iter.next() {
                if !common.consume_flag(&arg, &mut iter)? {
                    return Err(ArgsError::UnknownArg(arg).into());
                }
            }
            Parsed::List
        }
    };

    prepare_sqlite_file(&common.db_url)?;
    let services = AppServices::new_sqlite(&common.db_url, Clock::default_clock()).await?;

    match parsed {
        Parsed::Add(args) => {
            let book = services
                .books()
                .add_book(&args.title, args.pages, None)
                .await?;
            println!(
                "added book {} \"{}\"{}",
                book.id(),
                book.title(),
                book.total_pages()
                    .map_or(String::new(), |t| format!(" ({t} pages)"))
            );
        }
        Parsed::Status(args) => {
            let outcome = services.status().set_status(args.book_id, args.input).await?;
            if let Some(archived) = outcome.archived {
                println!(
                    "archived session {} with its progress history",
                    archived.session_number
                );
            }
            print_session(&outcome.session);
        }
        Parsed::Log(args) => {
            let outcome = services.progress().log_progress(args.book_id, args.input).await?;
            println!(
                "logged page {} ({}%) on {}, {} pages read",
                outcome.entry.current_page,
                outcome.entry.current_percentage,
                outcome.entry.progress_date,
                outcome.entry.pages_read
            );
            if outcome.completion_reached {
                println!("finished! session marked as read");
            }
        }
        Parsed::Pages(args) => {
            let book = services
                .page_counts()
                .change_total_pages(args.book_id, args.new_total)
                .await?;
            println!(
                "book {} now has {} pages; progress history recomputed",
                book.id(),
                args.new_total
            );
        }
        Parsed::Show(book_id) => {
            let overview = services.books().overview(book_id).await?;
            println!(
                "{} \"{}\"{}{}",
                overview.book.id(),
                overview.book.title(),
                overview
                    .book
                    .total_pages()
                    .map_or(String::new(), |t| format!(" - {t} pages")),
                overview
                    .book
                    .rating()
                    .map_or(String::new(), |r| format!(" - rated {r}/5"))
            );
            for session in services.books().sessions_for_book(book_id).await? {
                print_session(&session);
            }
            if let Some(entry) = overview.latest_entry {
                println!(
                    "  last progress: page {} ({}%) on {}",
                    entry.current_page, entry.current_percentage, entry.progress_date
                );
            }
        }
        Parsed::List => {
            for book in services.books().list_books(128).await? {
                println!(
                    "{}  \"{}\"{}",
                    book.id(),
                    book.title(),
                    book.total_pages()
                        .map_or(String::new(), |t| format!(" ({t} pages)"))
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
