//! Klinika admin command line
//!
//! Lists, creates, edits and deletes records of every clinic resource
//! through the REST API, with the same validation the admin screens apply.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use clap::{Parser, Subcommand, ValueEnum};
use klinika_client::{
    ApiService, ClientError, DEFAULT_BASE_URL, DeleteOutcome, PageResource, ResourceApi,
    ResourcePage, all_definitions,
};
use klinika_core::{
    config::LoggingConfig,
    context_error,
    context_error::{ContextError, Result},
    init_logging,
    types::{
        Block, HelpCenter, HelpCenterCategory, Reservation, ServiceDesk, Specialization, User,
    },
};
use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

/// Command line interface for the Klinika admin client
#[derive(Parser)]
#[command(
    name = "klinika-admin",
    version = env!("CARGO_PKG_VERSION"),
    about = "Manage Klinika clinic records from the terminal"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "KLINIKA_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Answer yes to delete confirmations
    #[arg(short, long)]
    yes: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

/// Resources the API serves
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResourceKind {
    HelpCenter,
    HelpCenterCategory,
    Specialization,
    Block,
    ServiceDesk,
    User,
    Reservation,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// List resources with their columns and form fields
    Resources,

    /// Show one page of records
    List {
        /// Resource to list
        resource: ResourceKind,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Rows per page
        #[arg(long, default_value_t = 10)]
        page_size: u32,

        /// Case-insensitive search term
        #[arg(short, long, default_value = "")]
        search: String,

        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one record
    Get {
        /// Resource to read
        resource: ResourceKind,

        /// Record id
        id: String,
    },

    /// Create a record from field=value pairs
    Create {
        /// Resource to create
        resource: ResourceKind,

        /// Form inputs
        #[arg(value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },

    /// Edit a record; omitted fields keep their current value
    Update {
        /// Resource to edit
        resource: ResourceKind,

        /// Record id
        id: String,

        /// Form inputs to change
        #[arg(value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },

    /// Delete one record
    Delete {
        /// Resource to delete from
        resource: ResourceKind,

        /// Record id
        id: String,
    },

    /// Delete several records at once, all or none
    BulkDelete {
        /// Resource to delete from
        resource: ResourceKind,

        /// Record ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

impl Commands {
    const fn resource(&self) -> Option<ResourceKind> {
        match self {
            Self::Resources => None,
            Self::List { resource, .. }
            | Self::Get { resource, .. }
            | Self::Create { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. }
            | Self::BulkDelete { resource, .. } => Some(*resource),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up KLINIKA_API_URL from a local .env when present
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        ..LoggingConfig::default()
    })?;

    let Some(kind) = cli.command.resource() else {
        print_resources();
        return Ok(());
    };

    match kind {
        ResourceKind::HelpCenter => run::<HelpCenter>(&cli).await,
        ResourceKind::HelpCenterCategory => run::<HelpCenterCategory>(&cli).await,
        ResourceKind::Specialization => run::<Specialization>(&cli).await,
        ResourceKind::Block => run::<Block>(&cli).await,
        ResourceKind::ServiceDesk => run::<ServiceDesk>(&cli).await,
        ResourceKind::User => run::<User>(&cli).await,
        ResourceKind::Reservation => run::<Reservation>(&cli).await,
    }
}

fn print_resources() {
    for definition in all_definitions() {
        println!("{} ({})", definition.resource, definition.title);
        println!("  columns: {}", definition.data_fields.join(", "));
        let fields: Vec<String> = definition
            .fields
            .iter()
            .map(|field| {
                if field.required {
                    field.identifier.clone()
                } else {
                    format!("[{}]", field.identifier)
                }
            })
            .collect();
        println!("  fields:  {}", fields.join(", "));
    }
}

async fn run<R: PageResource>(cli: &Cli) -> Result<()> {
    let api = ApiService::<R>::with_timeout(
        cli.base_url.as_str(),
        R::definition().endpoints(),
        Duration::from_secs(cli.timeout),
    )
    .map_err(|e| ContextError::with_context(e, "Failed to build API client"))?;
    let api = Arc::new(api);
    let page_size = match &cli.command {
        Commands::List { page_size, .. } => *page_size,
        _ => 10,
    };
    let mut page = ResourcePage::<R, _>::new(Arc::clone(&api), page_size);
    let confirm = |prompt: &str| cli.yes || ask(prompt);

    match &cli.command {
        Commands::Resources => Ok(()),
        Commands::List {
            page: number,
            search,
            json,
            ..
        } => {
            let table = page.table_mut();
            table.set_search(search.as_str()).await.map_err(report)?;
            if *number > 1 {
                table.set_page(*number).await.map_err(report)?;
            }
            if *json {
                print_json(table.records())?;
            } else {
                print_table(&page);
            }
            Ok(())
        }
        Commands::Get { id, .. } => {
            let record = api.get(parse_id::<R>(id)?).await.map_err(report)?;
            print_json(&record)
        }
        Commands::Create { fields, .. } => {
            let inputs = parse_inputs(fields)?;
            if let Err(e) = page.open_create().await {
                warn!("Select choices unavailable: {}", e);
            }
            if let Some(form) = page.create_form() {
                for (field, value) in inputs {
                    form.set(field, value);
                }
            }
            let record = page.submit_create().await.map_err(report)?;
            print_json(&record)
        }
        Commands::Update { id, fields, .. } => {
            let id = parse_id::<R>(id)?;
            let inputs = parse_inputs(fields)?;
            if let Err(e) = page.open_edit(id).await {
                warn!("Select choices unavailable: {}", e);
            }
            if let Some(form) = page.edit_form() {
                for (field, value) in inputs {
                    form.set(field, value);
                }
            }
            let record = page.submit_edit().await.map_err(report)?;
            print_json(&record)
        }
        Commands::Delete { id, .. } => {
            let outcome = page
                .delete(parse_id::<R>(id)?, &confirm)
                .await
                .map_err(report)?;
            print_outcome(outcome);
            Ok(())
        }
        Commands::BulkDelete { ids, .. } => {
            for id in ids {
                page.table_mut().toggle_row(parse_id::<R>(id)?);
            }
            let outcome = page.delete_selected(&confirm).await.map_err(report)?;
            print_outcome(outcome);
            Ok(())
        }
    }
}

fn parse_id<R: PageResource>(raw: &str) -> Result<R::Id> {
    raw.trim()
        .parse()
        .map_err(|_| context_error!("Invalid {} id '{}'", R::NAME, raw))
}

fn parse_inputs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(field, value)| (field.trim().to_string(), value.to_string()))
                .ok_or_else(|| context_error!("Expected FIELD=VALUE, got '{}'", pair))
        })
        .collect()
}

fn report(err: ClientError) -> ContextError {
    if let ClientError::Validation { errors } = &err {
        for (field, message) in errors {
            eprintln!("  {field}: {message}");
        }
    }
    ContextError::new(err.display_message())
}

fn ask(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ContextError::with_context(e, "Failed to render JSON"))?;
    println!("{text}");
    Ok(())
}

fn print_table<R: PageResource, A: ResourceApi<R> + ?Sized>(page: &ResourcePage<R, A>) {
    let definition = page.definition();
    let table = page.table();
    let rows = table.rows();

    let mut widths: Vec<usize> = definition.headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(&row.cells) {
            *width = (*width).max(cell.chars().count().min(40));
        }
    }

    let line = |id: &str, cells: &[String]| {
        let mut out = format!("{id:>36}");
        for (cell, width) in cells.iter().zip(&widths) {
            let shown: String = cell.chars().take(40).collect();
            out.push_str(&format!("  {shown:<width$}"));
        }
        out
    };

    let headers: Vec<String> = definition.headers.iter().map(ToString::to_string).collect();
    println!("{}", line("id", &headers));
    for row in &rows {
        println!("{}", line(&row.id.to_string(), &row.cells));
    }
    println!(
        "page {} of {} ({} shown)",
        table.page(),
        table.total_pages(),
        rows.len()
    );
}

fn print_outcome(outcome: DeleteOutcome) {
    match outcome {
        DeleteOutcome::Deleted(count) => println!("Deleted {count} record(s)"),
        DeleteOutcome::Cancelled => println!("Cancelled"),
    }
}
