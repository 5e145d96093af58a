//! Hookline CLI
//!
//! The `hookline` command runs queries and change sets through the Hookline
//! pipelines against a JSON dataset held in memory.
//!
//! ## Commands
//!
//! - `sets`: list the entity sets in the dataset
//! - `query`: compose a query over an entity set and print the rows
//! - `submit`: validate and apply a change set, optionally writing the dataset back

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hookline_core::conventions::{ConventionBasedChangeSetAuthorizer, ConventionBasedQueryFilter};
use hookline_core::fakes::{InMemoryQueryExecutor, InMemorySubmitExecutor};
use hookline_core::obs::operation_span;
use hookline_core::{
    ApiConfiguration, ApiContext, ApiSettings, ChangeSet, ChangeSetEntryValidator, DomainModel,
    DomainModelMapper, ElementType, EntityAction, Expression, ModelMapper, QueryExecutor,
    QueryExpressionFilter, QueryRequest, SubmitExecutor,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument, Level};

#[derive(Parser)]
#[command(name = "hookline")]
#[command(version = hookline_core::VERSION)]
#[command(about = "Run queries and change sets through the Hookline pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Dataset file: a JSON object mapping entity set names to row arrays
    #[arg(long, global = true, env = "HOOKLINE_DATA", default_value = "hookline.json")]
    data: PathBuf,

    /// Pipeline settings (TOML)
    #[arg(long, global = true, env = "HOOKLINE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Restrict an entity set for every query, e.g. `Products:Active=true`
    #[arg(long = "scope", global = true)]
    scopes: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entity sets and their row counts
    Sets,

    /// Query an entity set
    Query(QueryArgs),

    /// Submit a change set (JSON file)
    Submit {
        /// Change set file
        change_set: PathBuf,

        /// Deny an action on an entity set, e.g. `remove:Products`
        #[arg(long = "deny")]
        deny: Vec<String>,

        /// Write the updated dataset back to the data file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Entity set name
    entity_set: String,

    /// Keep rows where FIELD equals VALUE (repeatable; VALUE parsed as JSON when possible)
    #[arg(short = 'w', long = "where")]
    conditions: Vec<String>,

    /// Order by a field
    #[arg(long)]
    order_by: Option<String>,

    /// Order descending
    #[arg(long, requires = "order_by")]
    desc: bool,

    /// Skip rows
    #[arg(long)]
    skip: Option<u64>,

    /// Take at most this many rows
    #[arg(long)]
    take: Option<u64>,

    /// Project a single field
    #[arg(long)]
    select: Option<String>,

    /// Finish with a scalar operator: single, single-or-default, first, first-or-default, count, any
    #[arg(long)]
    scalar: Option<String>,

    /// Ask for the total row count before paging
    #[arg(long)]
    total_count: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hookline_core::telemetry::init_tracing(cli.json, level);

    let settings = load_settings(cli.settings.as_deref())?;
    let store = Arc::new(load_dataset(&cli.data)?);
    let cancel = CancellationToken::new();

    let output = match cli.command {
        Commands::Sets => cmd_sets(&store),
        Commands::Query(args) => cmd_query(&store, settings, &cli.scopes, &args, &cancel).await?,
        Commands::Submit {
            change_set,
            deny,
            write,
        } => {
            let output =
                cmd_submit(&store, settings, &cli.scopes, &change_set, &deny, &cancel).await?;
            if write {
                save_dataset(&store, &cli.data)?;
            }
            output
        }
    };

    hookline_core::metrics::METRICS.flush();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<ApiSettings> {
    let Some(path) = path else {
        return Ok(ApiSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    ApiSettings::from_toml_str(&raw).with_context(|| format!("Invalid settings {}", path.display()))
}

fn load_dataset(path: &Path) -> Result<InMemoryQueryExecutor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let dataset: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Dataset {} is not valid JSON", path.display()))?;
    InMemoryQueryExecutor::from_json(dataset)
        .with_context(|| format!("Dataset {} must map set names to row arrays", path.display()))
}

fn save_dataset(store: &InMemoryQueryExecutor, path: &Path) -> Result<()> {
    let dataset: BTreeMap<String, Vec<Value>> = store
        .set_names()
        .into_iter()
        .map(|name| {
            let rows = store.rows(&name);
            (name, rows)
        })
        .collect();
    let raw = serde_json::to_string_pretty(&dataset)?;
    std::fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "dataset written");
    Ok(())
}

/// Build a committed configuration over `store`. Every set in the dataset is
/// exposed as an entity set of JSON rows.
fn build_context(
    store: &Arc<InMemoryQueryExecutor>,
    settings: ApiSettings,
    scopes: &[String],
    deny: &[String],
) -> Result<ApiContext> {
    let model = store
        .set_names()
        .into_iter()
        .fold(DomainModel::new(), |model, name| {
            model.with_entity_set(name, ElementType::Json)
        });

    let mut filter = ConventionBasedQueryFilter::new();
    for scope in scopes {
        let (entity_set, field, value) = parse_scope(scope)?;
        filter = filter.on_filter(&entity_set, move |_, source| {
            source.filter(field_equals(&field, value.clone()))
        });
    }

    let mut authorizer = ConventionBasedChangeSetAuthorizer::new();
    for rule in deny {
        let (action, entity_set) = parse_rule(rule)?;
        authorizer = match action {
            EntityAction::Insert => authorizer.can_insert(&entity_set, |_, _| false),
            EntityAction::Update => authorizer.can_update(&entity_set, |_, _| false),
            EntityAction::Remove => authorizer.can_remove(&entity_set, |_, _| false),
        };
    }

    let mut config = ApiConfiguration::with_settings(settings);
    config
        .add_hook_point::<dyn ModelMapper>(Arc::new(DomainModelMapper::new(Arc::new(model))))?
        .add_hook_point::<dyn QueryExecutor>(Arc::clone(store) as Arc<dyn QueryExecutor>)?
        .add_hook_point::<dyn SubmitExecutor>(Arc::new(InMemorySubmitExecutor::new(Arc::clone(
            store,
        ))))?
        .add_hook_point::<dyn QueryExpressionFilter>(Arc::new(filter))?
        .add_hook_point::<dyn ChangeSetEntryValidator>(Arc::new(authorizer))?;
    Ok(ApiContext::new(config.into_shared()))
}

fn cmd_sets(store: &InMemoryQueryExecutor) -> Value {
    let sets: BTreeMap<String, usize> = store
        .set_names()
        .into_iter()
        .map(|name| {
            let count = store.rows(&name).len();
            (name, count)
        })
        .collect();
    json!(sets)
}

async fn cmd_query(
    store: &Arc<InMemoryQueryExecutor>,
    settings: ApiSettings,
    scopes: &[String],
    args: &QueryArgs,
    cancel: &CancellationToken,
) -> Result<Value> {
    let ctx = build_context(store, settings, scopes, &[])?;
    let span = operation_span(ctx.id(), "query");

    let mut source = ctx
        .source(&args.entity_set, Vec::new())
        .with_context(|| format!("Unknown entity set '{}'", args.entity_set))?;
    for condition in &args.conditions {
        let (field, value) = parse_assignment(condition)?;
        source = source.filter(field_equals(&field, value));
    }
    if let Some(field) = &args.order_by {
        let key = Expression::lambda("row", Expression::param("row").member(field.as_str()));
        source = if args.desc {
            source.order_by_descending(key)
        } else {
            source.order_by(key)
        };
    }
    if let Some(skip) = args.skip {
        source = source.skip(skip);
    }
    if let Some(take) = args.take {
        source = source.take(take);
    }
    if let Some(field) = &args.select {
        source = source.select(
            Expression::lambda("row", Expression::param("row").member(field.as_str())),
            ElementType::Json,
        );
    }

    let request: QueryRequest = match args.scalar.as_deref() {
        None => ctx.request(source).with_include_total_count(args.total_count),
        Some("single") => source.single(),
        Some("single-or-default") => source.single_or_default(),
        Some("first") => source.first(),
        Some("first-or-default") => source.first_or_default(),
        Some("count") => source.count(),
        Some("any") => source.any(),
        Some(other) => bail!("Unknown scalar operator '{other}'"),
    };

    let result = ctx
        .query(request, cancel)
        .instrument(span)
        .await
        .context("Query failed")?;
    Ok(if args.scalar.is_some() {
        result.single_value().cloned().unwrap_or(Value::Null)
    } else {
        serde_json::to_value(&result)?
    })
}

async fn cmd_submit(
    store: &Arc<InMemoryQueryExecutor>,
    settings: ApiSettings,
    scopes: &[String],
    path: &Path,
    deny: &[String],
    cancel: &CancellationToken,
) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read change set {}", path.display()))?;
    let change_set: ChangeSet = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid change set {}", path.display()))?;

    let mut ctx = build_context(store, settings, scopes, deny)?;
    let span = operation_span(ctx.id(), "submit");
    let result = ctx
        .submit(Some(change_set), cancel)
        .instrument(span)
        .await
        .context("Submit failed")?;
    Ok(serde_json::to_value(&result)?)
}

/// `row => (row.<field> == <value>)`
fn field_equals(field: &str, value: Value) -> Expression {
    Expression::lambda("row", Expression::param("row").member(field).eq(value))
}

/// Parse `FIELD=VALUE`; VALUE is JSON when it parses, a string otherwise.
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected FIELD=VALUE, got '{raw}'"))?;
    if field.is_empty() {
        bail!("Missing field name in '{raw}'");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

/// Parse `SET:FIELD=VALUE`.
fn parse_scope(raw: &str) -> Result<(String, String, Value)> {
    let (entity_set, assignment) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected SET:FIELD=VALUE, got '{raw}'"))?;
    let (field, value) = parse_assignment(assignment)?;
    Ok((entity_set.to_string(), field, value))
}

/// Parse `ACTION:SET` where ACTION is insert, update or remove.
fn parse_rule(raw: &str) -> Result<(EntityAction, String)> {
    let (action, entity_set) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected ACTION:SET, got '{raw}'"))?;
    let action = match action {
        "insert" => EntityAction::Insert,
        "update" => EntityAction::Update,
        "remove" => EntityAction::Remove,
        other => bail!("Unknown action '{other}'"),
    };
    Ok((action, entity_set.to_string()))
}
