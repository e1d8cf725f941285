use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam::channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use local_catalog::database::{
    Catalog, FavoriteQuery, IndexBinding, LoadMode, LocalEntry, TableName,
};
use local_catalog::ingest::scanner::{self, ScanOptions};
use local_catalog::utils::config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file (falls back to LOCAL_CATALOG_DB, then .env)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory tree into its own dataset table
    Index(IndexArgs),
    /// Bring the schema up to date and print what changed
    Migrate,
    /// List dataset tables with their labels
    Indexes,
    /// Show a dataset's label and entry count
    Info {
        #[arg(short, long)]
        table: String,
    },
    /// Page through a dataset in insertion order
    Files {
        #[arg(short, long)]
        table: String,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Page through dataset entries whose path contains a substring
    Search {
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        query: String,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    #[command(subcommand)]
    Tag(TagCommand),
    #[command(subcommand)]
    Favorite(FavoriteCommand),
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Dataset name; the table becomes local_index_<name>
    #[arg(short, long)]
    name: String,
    #[arg(long)]
    display: String,
    #[arg(long, default_value = "")]
    desc: String,
    #[arg(short, long)]
    path: PathBuf,
    /// Clear the dataset before loading instead of appending
    #[arg(long)]
    replace: bool,
    /// Leave out dot-files and dot-directories
    #[arg(long)]
    skip_hidden: bool,
    #[arg(long)]
    follow_links: bool,
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    Add { name: String },
    Search { query: String },
    List,
}

#[derive(Subcommand, Debug)]
enum FavoriteCommand {
    /// Save a directory as a favorite and attach tags to it
    Save {
        #[arg(short, long)]
        path: String,
        #[arg(long)]
        original: String,
        #[arg(long)]
        favorite: String,
        #[arg(long, default_value = "")]
        desc: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Drop tags not listed in --tags
        #[arg(long)]
        replace_tags: bool,
    },
    List {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
        /// Only favorites carrying every one of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    Delete {
        #[arg(short, long)]
        path: String,
    },
}

#[derive(Serialize)]
struct IndexOutcome {
    table: String,
    count: usize,
}

#[derive(Serialize)]
struct IndexInfo {
    binding: IndexBinding,
    count: i64,
}

#[derive(Serialize)]
struct Deleted {
    deleted: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = config::load_settings(cli.db_path)?;
    info!("DB: {:?}", settings.db_path);

    let mut catalog = match Catalog::open(&settings.db_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Refusing to start against an unusable schema: {}", e);
            return Err(e).context("Failed to open catalog");
        }
    };

    match cli.command {
        Command::Index(args) => run_index(&mut catalog, args),
        Command::Migrate => print_json(&catalog.migrate()?),
        Command::Indexes => print_json(&catalog.list_indexes()?),
        Command::Info { table } => {
            let binding = catalog
                .get_binding(&table)?
                .unwrap_or_else(|| IndexBinding::unbound(&table));
            let count = catalog.count_entries(&table)?;
            print_json(&IndexInfo { binding, count })
        }
        Command::Files { table, offset, limit } => {
            print_json(&catalog.list_entries(&table, offset, limit)?)
        }
        Command::Search { table, query, offset, limit } => {
            print_json(&catalog.search_entries(&table, &query, offset, limit)?)
        }
        Command::Tag(command) => run_tag(&catalog, command),
        Command::Favorite(command) => run_favorite(&mut catalog, command),
    }
}

fn run_index(catalog: &mut Catalog, args: IndexArgs) -> Result<()> {
    let table = TableName::for_dataset(&args.name)?;
    catalog.ensure_dataset_table(table.as_str())?;

    info!("Indexing {:?} into {}", args.path, table);

    let (scan_tx, scan_rx) = bounded::<LocalEntry>(1024);
    let root = args.path.clone();
    let options = ScanOptions {
        skip_hidden: args.skip_hidden,
        follow_links: args.follow_links,
    };
    let scanner_handle = thread::spawn(move || {
        info!("Scanner started");
        let result = scanner::scan_directory(&root, &options, scan_tx);
        info!("Scanner finished");
        result
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {pos} entries scanned")
            .context("Invalid progress template")?,
    );
    let mut entries = Vec::new();
    for entry in scan_rx {
        entries.push(entry);
        spinner.inc(1);
    }
    spinner.finish_and_clear();

    scanner_handle
        .join()
        .map_err(|_| anyhow!("Scanner thread panicked"))?
        .context("Scan failed")?;

    let mode = if args.replace {
        LoadMode::Replace
    } else {
        LoadMode::Append
    };
    let count = catalog
        .load_entries_with(table.as_str(), &entries, mode)
        .context("Failed to save entries")?;
    catalog
        .upsert_binding(table.as_str(), &args.display, &args.desc)
        .context("Failed to bind index")?;

    print_json(&IndexOutcome {
        table: table.to_string(),
        count,
    })
}

fn run_tag(catalog: &Catalog, command: TagCommand) -> Result<()> {
    match command {
        TagCommand::Add { name } => {
            catalog.upsert_tag(&name)?;
            print_json(&catalog.search_tags(name.trim())?)
        }
        TagCommand::Search { query } => print_json(&catalog.search_tags(&query)?),
        TagCommand::List => print_json(&catalog.list_all_tags()?),
    }
}

fn run_favorite(catalog: &mut Catalog, command: FavoriteCommand) -> Result<()> {
    match command {
        FavoriteCommand::Save {
            path,
            original,
            favorite,
            desc,
            tags,
            replace_tags,
        } => {
            catalog
                .upsert_favorite(&path, &original, &favorite, &desc)
                .context("Failed to save favorite")?;
            let tagged = if replace_tags {
                catalog.replace_directory_tags(&path, &tags)
            } else {
                catalog.set_directory_tags(&path, &tags)
            };
            tagged.context("Failed to set tags")?;
            print_json(&catalog.get_favorite(&path)?)
        }
        FavoriteCommand::List {
            query,
            page,
            page_size,
            tags,
        } => {
            let query = FavoriteQuery {
                query,
                page,
                page_size,
                tags,
            };
            print_json(&catalog.list_favorites(&query)?)
        }
        FavoriteCommand::Delete { path } => print_json(&Deleted {
            deleted: catalog.delete_favorite(&path)?,
        }),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
