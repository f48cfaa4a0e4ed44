//! tablesyncd — the tablesync daemon.
//!
//! Single binary with two halves of the same contract:
//! - `serve` runs the users API over a generated fixture
//! - `browse` drives the client engine (URL store, query orchestrator,
//!   debounced search) against a running server and prints one page
//!
//! # Usage
//!
//! ```text
//! tablesyncd serve --port 3000 --rows 500
//! tablesyncd browse --query "status=active" --sort name --sort name --page 2
//! tablesyncd browse --search ada --export csv --output users.csv
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tablesync_api::{User, build_router, generate_users};
use tablesync_core::{FilterValue, QueryParams, SyncConfig};
use tablesync_export::{ExportColumn, ExportFormat};
use tablesync_query::{HttpFetcher, QuerySnapshot, ServerTable, ServerTableOptions, TableQuery};
use tablesync_state::{History, Location, Navigator};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tablesyncd", about = "URL-driven server table daemon")]
struct Cli {
    /// Path to a tablesync.toml; built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `GET /api/users` over a generated fixture.
    Serve {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Number of fixture rows.
        #[arg(long)]
        rows: Option<usize>,
    },

    /// Load one page through the client engine and print it.
    Browse {
        /// Address of a running `tablesyncd serve`.
        #[arg(long, default_value = "127.0.0.1:3000")]
        server: String,

        /// Starting URL query, e.g. `page=2&status=active`.
        #[arg(long, default_value = "")]
        query: String,

        /// Type this into the search box.
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        /// Page size; returns to the first page.
        #[arg(long)]
        limit: Option<u32>,

        /// Filter as `key=value`. Repeatable; an empty value clears the key.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Toggle sorting on a column. Repeat to cycle asc, desc, off.
        #[arg(long = "sort")]
        sort: Vec<String>,

        /// Export the page instead of printing it.
        #[arg(long, value_enum)]
        export: Option<ExportArg>,

        /// Write the export here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportArg {
    Csv,
    Json,
    Tsv,
}

impl From<ExportArg> for ExportFormat {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Csv => ExportFormat::Csv,
            ExportArg::Json => ExportFormat::Json,
            ExportArg::Tsv => ExportFormat::Tsv,
        }
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,tablesyncd=debug,tablesync=debug")
                }),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port, rows } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(rows) = rows {
                config.server.rows = rows;
            }
            run_serve(&config).await
        }
        Command::Browse {
            server,
            query,
            search,
            page,
            limit,
            filters,
            sort,
            export,
            output,
        } => {
            let request = BrowseRequest {
                server,
                query,
                search,
                page,
                limit,
                filters,
                sort,
                print: export.is_none(),
            };
            let snapshot = run_browse(&config, request).await?;
            match export {
                Some(format) => write_export(snapshot.rows(), format.into(), output.as_deref()),
                None => Ok(()),
            }
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SyncConfig> {
    match path {
        Some(path) => {
            let config = SyncConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(SyncConfig::default()),
    }
}

// ── serve ──────────────────────────────────────────────────────────

async fn run_serve(config: &SyncConfig) -> anyhow::Result<()> {
    info!(rows = config.server.rows, "tablesync server starting");

    let router = build_router(generate_users(config.server.rows));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tablesync server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── browse ─────────────────────────────────────────────────────────

struct BrowseRequest {
    server: String,
    query: String,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
    filters: Vec<(String, String)>,
    sort: Vec<String>,
    /// Print the page as a table once it settles.
    print: bool,
}

async fn run_browse(
    config: &SyncConfig,
    request: BrowseRequest,
) -> anyhow::Result<QuerySnapshot<User>> {
    let options = ServerTableOptions::from_config(config)?;
    let debounce = options.debounce;

    let start = Location::new("/users", QueryParams::parse(&request.query));
    let history = Arc::new(History::new(start));
    let fetcher = HttpFetcher::<User>::new(request.server.clone(), "/api/users")
        .with_timeout(config.query.fetch_timeout());
    let query = TableQuery::new(fetcher, options.query.clone());
    let table = ServerTable::spawn(history.clone(), query, options);

    for (key, value) in &request.filters {
        table.set_filter(key, FilterValue::parse(value))?;
    }
    for column in &request.sort {
        table.toggle_sort(column);
    }
    if let Some(limit) = request.limit {
        table.change_limit(limit);
    }
    if let Some(page) = request.page {
        table.change_page(page);
    }
    if let Some(text) = &request.search {
        table.type_search(text.as_str());
        tokio::time::sleep(debounce + Duration::from_millis(50)).await;
    }

    let snapshot = table.settled().await;
    info!(
        href = %history.current().href(),
        history = history.len(),
        cache = ?table.query().cache_stats(),
        "browse settled"
    );

    if let Some(error) = &snapshot.error {
        table.shutdown().await;
        anyhow::bail!("failed to load {}: {error}", request.server);
    }

    if request.print {
        print_page(&table, &snapshot);
    }
    table.shutdown().await;
    Ok(snapshot)
}

fn print_page(table: &ServerTable<User, Arc<History>>, snapshot: &QuerySnapshot<User>) {
    let rows = snapshot.rows();
    if rows.is_empty() {
        println!("No results.");
    } else {
        println!(
            "{:<10} {:<24} {:<40} {:<10} {:<9} {}",
            "ID", "NAME", "EMAIL", "ROLE", "STATUS", "DEPARTMENT"
        );
        for user in rows {
            println!(
                "{:<10} {:<24} {:<40} {:<10} {:<9} {}",
                user.id,
                user.name,
                user.email,
                user.role.as_str(),
                user.status.as_str(),
                user.department
            );
        }
    }

    let window = table.page_window();
    println!();
    println!(
        "Showing {} to {} of {} results",
        window.start_record, window.end_record, window.total
    );
    println!("Page {} of {}", window.page, window.display_total_pages());
}

fn user_columns() -> Vec<ExportColumn> {
    vec![
        ExportColumn::new("id", "ID"),
        ExportColumn::new("name", "Name"),
        ExportColumn::new("email", "Email"),
        ExportColumn::new("role", "Role"),
        ExportColumn::new("status", "Status"),
        ExportColumn::new("department", "Department"),
        ExportColumn::new("createdAt", "Created At"),
    ]
}

fn write_export(rows: &[User], format: ExportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let text = format.render(rows, &user_columns())?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), format = format.extension(), rows = rows.len(), "export written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
