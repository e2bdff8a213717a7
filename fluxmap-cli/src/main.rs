//! CLI for the fluxmap InfluxDB client.
//!
//! Provides commands for managing databases and retention policies, running
//! queries, and writing single points.

use std::fmt::Write as _;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use fluxmap::retention::format_duration;
use fluxmap::{Client, ClientConfig, FieldValue, HttpTransport, Point, QueryResponse};
use serde_json::{Map, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// fluxmap — InfluxDB 1.x client CLI.
#[derive(Parser)]
#[command(name = "fluxmap", version, about)]
struct Cli {
    /// Server URL.
    #[arg(long, env = "INFLUX_URL", default_value = "http://localhost:8086", global = true)]
    url: String,

    /// Basic-auth username.
    #[arg(long, env = "INFLUX_USERNAME", global = true)]
    username: Option<String>,

    /// Basic-auth password.
    #[arg(long, env = "INFLUX_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value = "30", global = true)]
    timeout: u64,

    /// Retries on connection errors and server errors.
    #[arg(long, default_value = "3", global = true)]
    retries: u32,

    /// Log debug output to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Check that the server is reachable and print its version.
    Ping,

    /// List databases.
    Databases,

    /// Create a database.
    CreateDatabase {
        /// Database name.
        name: String,
    },

    /// Drop a database.
    DropDatabase {
        /// Database name.
        name: String,
    },

    /// List the retention policies of a database.
    RetentionPolicies {
        /// Database name.
        database: String,
    },

    /// Run an InfluxQL query.
    Query {
        /// Database to query.
        database: String,

        /// InfluxQL statement.
        statement: String,

        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Write one point.
    Write {
        /// Target database.
        database: String,

        /// Measurement name.
        #[arg(long)]
        measurement: String,

        /// Tag as `key=value`; repeatable.
        #[arg(long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,

        /// Field as `key=value`; repeatable. `10i` is an integer,
        /// `true`/`false` a boolean, other numbers floats, anything else text.
        #[arg(long = "field", value_parser = parse_key_value, required = true)]
        fields: Vec<(String, String)>,

        /// Retention policy to write into.
        #[arg(long)]
        rp: Option<String>,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Aligned columns.
    Table,
    /// Comma-separated values.
    Csv,
    /// JSON array of series.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::new(&cli.url)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_max_retries(cli.retries);
    if let Some(username) = cli.username {
        config = config.with_credentials(username, cli.password.unwrap_or_default());
    }
    debug!(url = %config.url, timeout = cli.timeout, retries = cli.retries, "connecting");
    let mut client = Client::connect(config)?;

    match cli.command {
        Commands::Ping => cmd_ping(&client),
        Commands::Databases => cmd_databases(&client),
        Commands::CreateDatabase { name } => {
            client.create_database(&name)?;
            println!("Created database '{name}'");
            Ok(())
        }
        Commands::DropDatabase { name } => {
            client.drop_database(&name)?;
            println!("Dropped database '{name}'");
            Ok(())
        }
        Commands::RetentionPolicies { database } => cmd_retention_policies(&client, &database),
        Commands::Query {
            database,
            statement,
            format,
        } => cmd_query(&client, &database, &statement, &format),
        Commands::Write {
            database,
            measurement,
            tags,
            fields,
            rp,
        } => cmd_write(&client, &database, &measurement, tags, fields, rp.as_deref()),
    }
}

/// Implements `fluxmap ping`.
fn cmd_ping(client: &Client<HttpTransport>) -> Result<(), Box<dyn std::error::Error>> {
    let server = client.server();
    println!("InfluxDB {} {} at {}", server.build, server.version, client.transport().config().url);
    Ok(())
}

/// Implements `fluxmap databases`.
fn cmd_databases(client: &Client<HttpTransport>) -> Result<(), Box<dyn std::error::Error>> {
    for name in client.databases()? {
        println!("{name}");
    }
    Ok(())
}

/// Implements `fluxmap retention-policies <database>`.
fn cmd_retention_policies(client: &Client<HttpTransport>, database: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<Vec<String>> = client
        .retention_policies(database)?
        .into_iter()
        .map(|rp| {
            vec![
                rp.name,
                format_duration(rp.duration),
                rp.shard_group_duration.map(format_duration).unwrap_or_default(),
                rp.replication.to_string(),
                rp.is_default.to_string(),
            ]
        })
        .collect();

    let header = ["name", "duration", "shard_duration", "replication", "default"].map(String::from);
    print!("{}", render_table(&header, &rows));
    Ok(())
}

/// Implements `fluxmap query <database> <statement>`.
fn cmd_query(
    client: &Client<HttpTransport>,
    database: &str,
    statement: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.query_raw(database, statement)?;
    match format {
        OutputFormat::Table => print!("{}", render_response_table(&response)),
        OutputFormat::Csv => print!("{}", render_response_csv(&response)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response_json(&response))?);
        }
    }
    Ok(())
}

/// Implements `fluxmap write <database>`.
fn cmd_write(
    client: &Client<HttpTransport>,
    database: &str,
    measurement: &str,
    tags: Vec<(String, String)>,
    fields: Vec<(String, String)>,
    rp: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Point::builder(measurement);
    for (key, value) in tags {
        builder = builder.tag(key, value);
    }
    for (key, value) in fields {
        builder = builder.field(key, parse_field_value(&value));
    }
    let point = builder.build()?;

    client.write_point(database, &point, rp)?;
    println!("Wrote 1 point to '{database}'");
    Ok(())
}

/// Parses a `key=value` argument.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

/// Infers a field value from its command-line text.
fn parse_field_value(s: &str) -> FieldValue {
    if let Some(Ok(v)) = s.strip_suffix('i').map(str::parse::<i64>) {
        return FieldValue::Integer(v);
    }
    match s {
        "true" => FieldValue::Boolean(true),
        "false" => FieldValue::Boolean(false),
        _ => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => FieldValue::Float(v),
            _ => FieldValue::Text(s.to_string()),
        },
    }
}

/// Text of a cell for table and CSV output.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(String::len).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(header);
    line(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>());
    for row in rows {
        line(row);
    }
    out
}

fn render_response_table(response: &QueryResponse) -> String {
    let mut out = String::new();
    for result in &response.results {
        for series in &result.series {
            let _ = write!(out, "name: {}", series.name);
            for (key, value) in &series.tags {
                let _ = write!(out, " {key}={value}");
            }
            out.push('\n');

            let rows: Vec<Vec<String>> = series
                .values
                .iter()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();
            out.push_str(&render_table(&series.columns, &rows));
            out.push('\n');
        }
    }
    out
}

fn render_response_csv(response: &QueryResponse) -> String {
    let mut out = String::new();
    for result in &response.results {
        for series in &result.series {
            let tag_keys: Vec<&String> = series.tags.keys().collect();

            let mut header = vec![csv_field("name")];
            header.extend(tag_keys.iter().map(|k| csv_field(k)));
            header.extend(series.columns.iter().map(|c| csv_field(c)));
            let _ = writeln!(out, "{}", header.join(","));

            for row in &series.values {
                let mut cells = vec![csv_field(&series.name)];
                cells.extend(tag_keys.iter().map(|k| csv_field(&series.tags[*k])));
                cells.extend(row.iter().map(|v| csv_field(&cell_text(v))));
                let _ = writeln!(out, "{}", cells.join(","));
            }
        }
    }
    out
}

/// Quotes a CSV field when it contains a delimiter, quote or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One JSON object per series, rows keyed by column name.
fn response_json(response: &QueryResponse) -> Value {
    let series: Vec<Value> = response
        .results
        .iter()
        .flat_map(|result| &result.series)
        .map(|series| {
            let rows: Vec<Value> = series
                .values
                .iter()
                .map(|row| {
                    let object: Map<String, Value> = series
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    Value::Object(object)
                })
                .collect();
            serde_json::json!({
                "name": series.name,
                "tags": series.tags,
                "rows": rows,
            })
        })
        .collect();
    Value::Array(series)
}
