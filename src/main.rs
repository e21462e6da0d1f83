use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use log::*;
use serde_json::Value;
use simplelog::*;

use reql_query_lib::query::{Options, Query};
use reql_query_lib::store::MemoryStore;
use reql_query_lib::term::translate;
use reql_query_lib::term::tree::{self, Traversal};

#[derive(Parser, Debug)]
#[command(name = "reql_query", version, about = "Evaluate ReQL term trees against JSON fixtures")]
struct Cli {
    /// Fixture root laid out as <DIRECTORY>/<db>/<table>.json
    #[arg(short, long, value_name = "DIRECTORY")]
    data: Option<PathBuf>,

    /// Database every query runs against
    #[arg(long, value_name = "NAME", default_value = reql_query_lib::query::DEFAULT_DATABASE)]
    db: String,

    /// Honour the database named by DB terms instead of pinning it
    #[arg(long)]
    requested_db: bool,

    /// Print the composed query instead of running it
    #[arg(long)]
    explain: bool,

    /// Print the term tree in the given order instead of running it
    #[arg(long, value_enum, value_name = "ORDER")]
    tree: Option<Order>,

    /// Print the term tree as nested arrays instead of running it
    #[arg(long, conflicts_with = "tree")]
    nested: bool,

    /// Read the query from a file
    #[arg(short, long, value_name = "PATH", conflicts_with = "query")]
    file: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,

    /// JSON term, e.g. '[39,[[15,["bills"]],{"credit":true}]]'
    #[arg(value_name = "QUERY", required_unless_present = "file")]
    query: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Postorder,
    Preorder,
    Inorder,
    Levelorder,
}

impl From<Order> for Traversal {
    fn from(order: Order) -> Self {
        match order {
            Order::Postorder => Traversal::Postorder,
            Order::Preorder => Traversal::Preorder,
            Order::Inorder => Traversal::Inorder,
            Order::Levelorder => Traversal::Levelorder,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(error) = TermLogger::init(log_level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("logger: {}", error);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let source = match (&cli.file, &cli.query) {
        (Some(path), _) => fs::read_to_string(path).map_err(|error| format!("{}: {}", path.display(), error))?,
        (None, Some(query)) => query.clone(),
        (None, None) => return Err("no query given".to_string()),
    };
    let term: Value = serde_json::from_str(&source).map_err(|error| format!("query is not JSON: {}", error))?;
    debug!("term: {}", term);

    if let Some(order) = cli.tree {
        tree::parse(&term).traverse(order.into(), |value| match value.as_u64().and_then(translate) {
            Some(name) => println!("{}", name),
            None => println!("{}", value),
        });
        return Ok(());
    }

    if cli.nested {
        println!("{}", tree::parse(&term).nested());
        return Ok(());
    }

    let options = Options {
        database: cli.db.clone(),
        pin_database: !cli.requested_db,
    };
    let query = Query::new(term, options);

    if cli.explain {
        let handle = query.build().map_err(|error| error.to_string())?;
        println!("{}", handle);
        return Ok(());
    }

    let mut now = Instant::now();
    let store = match &cli.data {
        Some(path) => MemoryStore::from_dir(path).map_err(|error| format!("{}: {}", path.display(), error))?,
        None => MemoryStore::new(),
    };
    let load_ms = now.elapsed().as_millis();

    now = Instant::now();
    let result = query.run(&store).map_err(|error| error.to_string())?;
    let query_ms = now.elapsed().as_millis();

    let serialized = serde_json::to_string_pretty(&result).map_err(|error| error.to_string())?;
    println!("{}", serialized);

    info!("load spent: {}ms", load_ms);
    info!("query spent: {}ms", query_ms);
    Ok(())
}
