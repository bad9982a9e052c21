use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tagr::db::schema::{create_junction_table, create_tag_table, quote_ident};
use tagr::utils::open_database;
use tagr::{
    Database, EntityRef, GatherRequest, Record, RelatedSelection, SortDirection, TagError,
    TagFilter, TagService, TaggingConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tagr - many-to-many tagging for SQLite tables
#[derive(Parser)]
#[command(name = "tagr")]
#[command(about = "Tag rows of any SQLite table and find them again by tag")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Create the tag table
    Init,
    /// Make a table taggable by creating its junction table
    Link(LinkCommand),
    /// Replace the tags of a row
    Set(SetCommand),
    /// Show the tags of a row
    Show(ShowCommand),
    /// Find rows linked to any of the given tags
    Find(FindCommand),
    /// Find rows sharing a tag with the given row
    Related(RelatedCommand),
    /// Delete tags nothing links to
    Sweep,
    /// List stored tags
    Tags(TagsCommand),
    /// Rename a tag, merging into an existing one
    Rename(RenameCommand),
}

#[derive(Args)]
struct LinkCommand {
    /// Table to make taggable
    #[arg(value_name = "RELATED")]
    related: String,
}

#[derive(Args)]
struct SetCommand {
    #[arg(value_name = "RELATED")]
    related: String,

    #[arg(value_name = "ID")]
    id: i64,

    /// Comma-separated tags; an empty string removes all tags
    #[arg(value_name = "TAGS")]
    tags: String,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ShowCommand {
    #[arg(value_name = "RELATED")]
    related: String,

    #[arg(value_name = "ID")]
    id: i64,

    /// Print tags as JSON
    #[arg(long)]
    json: bool,
}

/// Options shared by `find` and `related`
#[derive(Args)]
struct GatherArgs {
    /// Maximum number of rows (0 for no limit)
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,

    /// Sort descending
    #[arg(long, conflicts_with = "random")]
    desc: bool,

    /// Shuffle instead of sorting
    #[arg(long)]
    random: bool,

    /// Restrict to these related tables
    #[arg(long = "type", value_name = "RELATED", value_delimiter = ',')]
    types: Vec<String>,

    /// Sort a related table by a column, e.g. `posts=title`
    #[arg(long, value_name = "RELATED=COLUMN", value_parser = parse_order, conflicts_with = "types")]
    order: Vec<(String, String)>,

    /// Print rows as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct FindCommand {
    /// Comma-separated tags; rows matching any of them are returned
    #[arg(value_name = "TAGS")]
    tags: String,

    #[command(flatten)]
    gather: GatherArgs,
}

#[derive(Args)]
struct RelatedCommand {
    #[arg(value_name = "RELATED")]
    related: String,

    #[arg(value_name = "ID")]
    id: i64,

    #[command(flatten)]
    gather: GatherArgs,
}

#[derive(Args)]
struct TagsCommand {
    /// Include the number of linked rows
    #[arg(long)]
    counts: bool,

    /// Print tags as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RenameCommand {
    #[arg(value_name = "OLD")]
    old: String,

    #[arg(value_name = "NEW")]
    new: String,
}

/// Errors caused by command-line input rather than by the store.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0} does not exist")]
    MissingRow(EntityRef),

    #[error("table '{0}' does not exist")]
    MissingTable(String),
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so stdout stays clean for `--json`.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tagr=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are configuration mistakes and references to tables, rows or
/// tags that do not exist. Internal errors include database failures and I/O errors.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.is::<TagError>() || cause.is::<CliError>())
}

fn run(cli: &Cli) -> Result<()> {
    let config = TaggingConfig::from_env()?;
    let db = open_database(&config)?;
    execute(&cli.command, &config, db)
}

/// Executes a command against a provided database.
///
/// Separated from `run` to allow testing with in-memory databases.
fn execute(command: &Commands, config: &TaggingConfig, db: Database) -> Result<()> {
    create_tag_table(db.connection(), &config.tag_table, &config.tag_column)
        .context("Failed to create tag table")?;

    match command {
        Commands::Init => {
            println!("Tag table '{}' is ready", config.tag_table);
            Ok(())
        }
        Commands::Link(cmd) => {
            require_table(&db, &cmd.related)?;
            let junction = create_junction_table(
                db.connection(),
                &config.tag_table,
                &config.tag_column,
                &cmd.related,
            )?;
            println!("Table '{}' is taggable through '{junction}'", cmd.related);
            Ok(())
        }
        Commands::Set(cmd) => handle_set(cmd, &service(config, db)?),
        Commands::Show(cmd) => handle_show(cmd, &service(config, db)?),
        Commands::Find(cmd) => {
            let request = GatherRequest {
                tags: TagFilter::from(cmd.tags.as_str()),
                ..gather_request(&cmd.gather)
            };
            let records: Vec<Record> = service(config, db)?.gather(&request)?;
            print_records(&records, cmd.gather.json)
        }
        Commands::Related(cmd) => {
            let service = service(config, db)?;
            let entity = EntityRef::new(&cmd.related, cmd.id);
            require_row(&service, &entity)?;

            let records: Vec<Record> =
                service.related_to(&entity, &gather_request(&cmd.gather))?;
            print_records(&records, cmd.gather.json)
        }
        Commands::Sweep => {
            let deleted = service(config, db)?.sweep(None)?;
            if deleted.is_empty() {
                println!("No orphaned tags");
            } else {
                println!("Deleted {} tag(s): {}", deleted.len(), deleted.join(", "));
            }
            Ok(())
        }
        Commands::Tags(cmd) => handle_tags(cmd, &service(config, db)?),
        Commands::Rename(cmd) => {
            service(config, db)?.rename_tag(None, &cmd.old, &cmd.new)?;
            println!("Renamed '{}' to '{}'", cmd.old.trim(), cmd.new.trim());
            Ok(())
        }
    }
}

/// Opens a service with the configured tag type registered.
fn service(config: &TaggingConfig, db: Database) -> Result<TagService> {
    let mut service = TagService::new(db);
    service.configure(config.to_spec())?;
    Ok(service)
}

fn handle_set(cmd: &SetCommand, service: &TagService) -> Result<()> {
    let entity = EntityRef::new(&cmd.related, cmd.id);
    require_row(service, &entity)?;

    let tags: Vec<&str> = cmd.tags.split(',').collect();
    let outcome = service.reconcile(&entity, &tags)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let current = service.tags_for(&entity)?;
    if current.is_empty() {
        println!("{entity} has no tags");
    } else {
        println!("{entity} tagged: {}", current.join(", "));
    }
    if !outcome.created.is_empty() {
        println!("Created: {}", outcome.created.join(", "));
    }
    if !outcome.deleted.is_empty() {
        println!("Deleted: {}", outcome.deleted.join(", "));
    }
    Ok(())
}

fn handle_show(cmd: &ShowCommand, service: &TagService) -> Result<()> {
    let entity = EntityRef::new(&cmd.related, cmd.id);
    require_row(service, &entity)?;
    let tags = service.tags_for(&entity)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else if tags.is_empty() {
        println!("{entity} has no tags");
    } else {
        println!("{}", tags.join(", "));
    }
    Ok(())
}

fn handle_tags(cmd: &TagsCommand, service: &TagService) -> Result<()> {
    if cmd.counts {
        let counts = service.tag_counts(None)?;
        if cmd.json {
            let map: serde_json::Map<String, serde_json::Value> = counts
                .into_iter()
                .map(|(tag, count)| (tag, count.into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        } else {
            for (tag, count) in counts {
                println!("{tag}\t{count}");
            }
        }
        return Ok(());
    }

    let tags = service.all_tags(None)?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("{tag}");
        }
    }
    Ok(())
}

fn gather_request(args: &GatherArgs) -> GatherRequest {
    let related = if !args.order.is_empty() {
        RelatedSelection::Orderings(args.order.clone())
    } else if !args.types.is_empty() {
        RelatedSelection::Types(args.types.clone())
    } else {
        RelatedSelection::All
    };

    GatherRequest {
        limit: args.limit,
        related,
        direction: args.desc.then_some(SortDirection::Descending),
        random: args.random,
        ..Default::default()
    }
}

fn print_records(records: &[Record], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else if records.is_empty() {
        println!("No matching rows");
    } else {
        for record in records {
            println!("{record}");
        }
    }
    Ok(())
}

fn require_table(db: &Database, table: &str) -> Result<()> {
    let exists: bool = db.connection().query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(CliError::MissingTable(table.to_string()).into())
    }
}

/// Fails unless `entity` names a taggable table and an existing row of it.
fn require_row(service: &TagService, entity: &EntityRef) -> Result<()> {
    let relation = service.registry().resolve(None)?.relation(entity.kind())?;
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        quote_ident(&relation.related),
        quote_ident(&relation.related_key)
    );

    let exists: bool = service
        .database()
        .connection()
        .query_row(&sql, [entity.id()], |row| row.get(0))?;
    if exists {
        Ok(())
    } else {
        Err(CliError::MissingRow(entity.clone()).into())
    }
}

/// Parses a `related=column` sort override.
fn parse_order(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((related, column)) if !related.trim().is_empty() && !column.trim().is_empty() => {
            Ok((related.trim().to_string(), column.trim().to_string()))
        }
        _ => Err(format!("expected RELATED=COLUMN, got '{input}'")),
    }
}
