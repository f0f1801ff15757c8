use clap::{Parser, Subcommand, ValueHint};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use tabledesk::server::{init_tracing, serve};
use tabledesk::{AppConfig, Error, ListParams, OrmStruct, Table, to_exit_code};

#[derive(Parser)]
#[command(
    name = "tabledesk",
    version,
    about = "Browse and edit SQL tables over HTTP",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tabledesk --config tabledesk.toml serve
  $ tabledesk tables
  $ tabledesk columns users
  $ tabledesk rows users --page 2 --per-page 20 --search ada

CONFIG
  database_url = "sqlite://app.db?mode=rwc"
  database_type = "sqlite"        # optional: postgres | mysql | sqlite
  bind = "127.0.0.1:8080""#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        short,
        default_value = "tabledesk.toml",
        help = "Config file (.toml, .yaml or .yml)",
        value_hint = ValueHint::FilePath
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Listen address, overrides the config file")]
        bind: Option<SocketAddr>,
        #[arg(long, help = "Reject upsert and delete requests")]
        read_only: bool,
    },
    #[command(about = "List the tables of the database")]
    Tables,
    #[command(about = "Show the introspected columns of a table")]
    Columns {
        #[arg(help = "Table name")]
        table: String,
    },
    #[command(about = "Print one page of rows as JSON")]
    Rows {
        #[arg(help = "Table name")]
        table: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        per_page: Option<u64>,
        #[arg(long, help = "Match rows containing this text in any column")]
        search: Option<String>,
    },
    #[command(about = "Validate the config and connect once")]
    Check,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let exit_code = match run(Cli::parse()).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("{}", json!({ "error": { "kind": format!("{:?}", err.kind()), "message": err.to_string() } }));
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Render {
        what: "json output",
        message: e.to_string(),
    })?;
    println!("{text}");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Error> {
    let mut config = AppConfig::load(&cli.config)?;
    match cli.command {
        Command::Serve { bind, read_only } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            config.read_only |= read_only;
            serve(config).await
        }
        Command::Tables => {
            let orm = OrmStruct::connect(&config).await?;
            let tables = orm.tables().await?;
            print_json(&json!({ "tables": tables }))
        }
        Command::Columns { table } => {
            let orm = OrmStruct::connect(&config).await?;
            let table = Table::open(&orm, &table).await?;
            print_json(table.schema())
        }
        Command::Rows {
            table,
            page,
            per_page,
            search,
        } => {
            let orm = OrmStruct::connect(&config).await?;
            let table = Table::open(&orm, &table).await?;
            let per_page = per_page
                .unwrap_or(u64::from(config.page_size))
                .clamp(1, u64::from(config.max_page_size));
            let rows = table
                .list(&ListParams {
                    page,
                    per_page,
                    search,
                    ..ListParams::default()
                })
                .await?;
            print_json(&rows)
        }
        Command::Check => {
            let kind = config.database_kind()?;
            let orm = OrmStruct::connect(&config).await?;
            let tables = orm.tables().await?;
            orm.close().await;
            print_json(&json!({ "ok": true, "database_type": kind, "tables": tables.len() }))
        }
    }
}
