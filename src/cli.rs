//! The `qpg` command surface. Each `cmd_*` function owns one subcommand's
//! worth of work and returns an `ExitCode`; `run` is the only place that
//! actually calls `std::process::exit`.

use crate::contexts::{add_context, list_contexts, parse_context_target, remove_context};
use crate::context_generate::generate_context_for_object;
use crate::daemon::{read_pid_file, stop_server, write_pid_file};
use crate::dsn::redact_dsn;
use crate::embeddings::load_embedder;
use crate::error::ExitCode;
use crate::get::get_object;
use crate::ingest::update_source_index;
use crate::mcp::transport_http::serve_http;
use crate::mcp::transport_stdio::serve_stdio;
use crate::mcp::McpState;
use crate::paths::{ensure_dirs, get_paths};
use crate::pg::connect::{connect_pg, SessionGuards};
use crate::pg::introspect::{apply_filters, introspect_schema};
use crate::privilege::check_privileges;
use crate::query::rerank::ProcessHookRunner;
use crate::query::{deep_search, run_query, QueryOptions};
use crate::settings::resolve_openai_settings;
use crate::sources::{add_source, delete_source, get_source, list_sources, mark_source_error, mark_source_indexed, rename_source};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "qpg", version, about = "Local embedded PostgreSQL schema-knowledge engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose (debug-level) logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Suppress all but error-level logging.
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize local directories and the SQLite store.
    Init,
    /// Print resolved configuration (paths, OpenAI settings, with secrets redacted).
    Config,
    /// Manage registered Postgres sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Manage context notes.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Check the connected role's privileges against the read-only contract.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Re-introspect and re-index one or all registered sources.
    Update {
        /// Limit to a single source; otherwise every registered source is updated.
        source: Option<String>,
        /// Include functions/procedures in the introspected bundle.
        #[arg(long)]
        include_functions: bool,
    },
    /// Show source and index status.
    Status,
    /// Remove a source and everything indexed under it.
    Cleanup { source: String },
    /// Rebuild the FTS index from the already-ingested local store.
    Repair,
    /// Lexical + vector hybrid search.
    Search {
        query: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Wider-recall search that always uses the vector path when available.
    Vsearch {
        query: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Fetch full detail for a single object.
    Get { source: String, key: String },
    /// Print one object's raw definition.
    Schema { source: String, key: String },
    /// Run the MCP tool server.
    Mcp {
        #[arg(long)]
        stdio: bool,
        #[arg(long, default_value = "127.0.0.1:8931")]
        addr: String,
        #[command(subcommand)]
        action: Option<McpAction>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SourceAction {
    Add {
        name: String,
        dsn: String,
        #[arg(long = "include-schema")]
        include_schemas: Vec<String>,
        #[arg(long = "skip-pattern")]
        skip_patterns: Vec<String>,
    },
    List,
    Rm {
        name: String,
    },
    Rename {
        old_name: String,
        new_name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ContextAction {
    Add { source: String, target: String, body: String },
    List,
    Rm { key: String },
    Generate { source: String, key: String },
}

#[derive(Debug, Subcommand)]
pub enum AuthAction {
    Check { source: String },
}

#[derive(Debug, Subcommand)]
pub enum McpAction {
    Stop,
}

pub async fn run(cli: Cli) -> ExitCode {
    let result = dispatch(&cli).await;
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "command failed");
            eprintln!("error: {err}");
            ExitCode::classify(&err)
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitCode> {
    let paths = get_paths();
    ensure_dirs(&paths)?;

    match &cli.command {
        Command::Init => cmd_init().await,
        Command::Config => cmd_config().await,
        Command::Source { action } => cmd_source(action).await,
        Command::Context { action } => cmd_context(action).await,
        Command::Auth { action } => cmd_auth(action).await,
        Command::Update { source, include_functions } => cmd_update(source.as_deref(), *include_functions).await,
        Command::Status => cmd_status().await,
        Command::Cleanup { source } => cmd_cleanup(source).await,
        Command::Repair => cmd_repair().await,
        Command::Search { query, source, schema, kind, limit, min_score } => {
            cmd_search(query, source, schema.as_deref(), kind.as_deref(), *limit, *min_score, false).await
        }
        Command::Vsearch { query, source, schema, kind, limit, min_score } => {
            cmd_search(query, source, schema.as_deref(), kind.as_deref(), *limit, *min_score, true).await
        }
        Command::Get { source, key } => cmd_get(source, key).await,
        Command::Schema { source, key } => cmd_schema(source, key).await,
        Command::Mcp { stdio, addr, action } => cmd_mcp(*stdio, addr, action.as_ref()).await,
    }
}

async fn cmd_init() -> Result<ExitCode> {
    let paths = get_paths();
    let (_, vec_loaded) = crate::store::open(&paths.index_db).await?;
    println!("initialized local store at {}", paths.index_db.display());
    println!("sqlite-vec extension: {}", if vec_loaded { "loaded" } else { "unavailable, using JSON-blob fallback" });
    Ok(ExitCode::Success)
}

async fn cmd_config() -> Result<ExitCode> {
    let paths = get_paths();
    let settings = resolve_openai_settings(None, None, None);
    println!("cache_dir:  {}", paths.cache_dir.display());
    println!("state_dir:  {}", paths.state_dir.display());
    println!("index_db:   {}", paths.index_db.display());
    println!("models_dir: {}", paths.models_dir.display());
    println!("openai_base_url: {}", settings.base_url);
    println!("openai_model:    {}", settings.model);
    println!("openai_api_key:  {}", if settings.api_key.is_empty() { "(not set)".to_string() } else { crate::dsn::redact_secret(&settings.api_key, 4, 2) });
    Ok(ExitCode::Success)
}

async fn cmd_source(action: &SourceAction) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;

    match action {
        SourceAction::Add { name, dsn, include_schemas, skip_patterns } => {
            let source = add_source(&pool, name, dsn, include_schemas, skip_patterns).await?;
            println!("added source '{}' ({})", source.name, redact_dsn(&source.dsn));
            Ok(ExitCode::Success)
        }
        SourceAction::List => {
            let sources = list_sources(&pool).await?;
            for source in sources {
                println!(
                    "{:<20} {:<50} last_indexed={}",
                    source.name,
                    redact_dsn(&source.dsn),
                    source.last_indexed_at.as_deref().unwrap_or("never")
                );
            }
            Ok(ExitCode::Success)
        }
        SourceAction::Rm { name } => {
            delete_source(&pool, name).await?;
            println!("removed source '{name}'");
            Ok(ExitCode::Success)
        }
        SourceAction::Rename { old_name, new_name } => {
            rename_source(&pool, old_name, new_name).await?;
            println!("renamed source '{old_name}' to '{new_name}'");
            Ok(ExitCode::Success)
        }
    }
}

async fn cmd_context(action: &ContextAction) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;

    match action {
        ContextAction::Add { source, target, body } => {
            let uri = if target.starts_with("qpg://") { target.clone() } else { format!("qpg://{source}/{target}") };
            parse_context_target(&uri)?;
            let record = add_context(&pool, source, &uri, body).await?;
            println!("added context #{} for {}", record.id, record.target_uri);
            Ok(ExitCode::Success)
        }
        ContextAction::List => {
            for context in list_contexts(&pool).await? {
                println!("#{:<5} {:<40} {}", context.id, context.target_uri, context.body);
            }
            Ok(ExitCode::Success)
        }
        ContextAction::Rm { key } => {
            let removed = remove_context(&pool, key).await?;
            println!("removed {removed} context(s)");
            Ok(ExitCode::Success)
        }
        ContextAction::Generate { source, key } => {
            let object = get_object(&pool, source, key).await?;
            let settings = resolve_openai_settings(None, None, None);
            match generate_context_for_object(&pool, &settings, &object).await {
                Ok(decision) if decision.generate => {
                    if let Some(text) = &decision.context {
                        let uri = format!("qpg://{source}#{}", object.object_id);
                        add_context(&pool, source, &uri, text).await?;
                        println!("generated context for {}: {text}", object.fqname);
                    }
                    Ok(ExitCode::Success)
                }
                Ok(_) => {
                    println!("model declined to generate context for {}", object.fqname);
                    Ok(ExitCode::Success)
                }
                Err(e) => {
                    println!("skipped {}: {e}", object.fqname);
                    Ok(ExitCode::Success)
                }
            }
        }
    }
}

async fn cmd_auth(action: &AuthAction) -> Result<ExitCode> {
    let AuthAction::Check { source } = action;
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;
    let record = get_source(&pool, source).await?;

    let pg_pool = connect_pg(&record.dsn, &SessionGuards::default()).await?;
    let role: (String,) = sqlx::query_as("SELECT current_user").fetch_one(&pg_pool).await?;
    let report = check_privileges(&pg_pool, &role.0).await?;
    println!("{}", report.format_report());

    Ok(if report.is_clean() { ExitCode::Success } else { ExitCode::PrivilegeFailed })
}

async fn cmd_update(source_filter: Option<&str>, include_functions: bool) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, vec_loaded) = crate::store::open(&paths.index_db).await?;
    let embedder = load_embedder(&paths.models_dir);

    let sources = match source_filter {
        Some(name) => vec![get_source(&pool, name).await?],
        None => list_sources(&pool).await?,
    };

    for source in &sources {
        match update_one_source(&pool, source, include_functions, vec_loaded, embedder.as_deref()).await {
            Ok(stats) => {
                mark_source_indexed(&pool, source.id).await?;
                println!(
                    "{}: {} objects, {} columns, {} constraints, {} indexes, {} deps, {} vectors",
                    source.name, stats.objects, stats.columns, stats.constraints, stats.indexes, stats.dependencies, stats.vectors
                );
            }
            Err(e) => {
                mark_source_error(&pool, source.id, &e.to_string()).await?;
                eprintln!("{}: update failed: {e}", source.name);
            }
        }
    }

    Ok(ExitCode::Success)
}

async fn update_one_source(
    pool: &sqlx::SqlitePool,
    source: &crate::sources::SourceRecord,
    include_functions: bool,
    vec_loaded: bool,
    embedder: Option<&dyn crate::contracts::Embedder>,
) -> Result<crate::ingest::UpdateStats> {
    let pg_pool = connect_pg(&source.dsn, &SessionGuards::default()).await?;
    let bundle = introspect_schema(&pg_pool, include_functions).await;
    for warning in &bundle.warnings {
        tracing::warn!(source = %source.name, %warning, "introspection warning");
    }
    let filtered = apply_filters(bundle, &source.include_schemas, &source.skip_patterns);
    let stats = update_source_index(pool, source.id, &source.name, &filtered, vec_loaded, embedder).await?;
    Ok(stats)
}

async fn cmd_status() -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, vec_loaded) = crate::store::open(&paths.index_db).await?;
    println!("index_db: {} (sqlite-vec: {})", paths.index_db.display(), vec_loaded);
    for source in list_sources(&pool).await? {
        let status = source.last_error.as_deref().unwrap_or("ok");
        println!(
            "{:<20} last_indexed={:<25} status={}",
            source.name,
            source.last_indexed_at.as_deref().unwrap_or("never"),
            status
        );
    }
    Ok(ExitCode::Success)
}

async fn cmd_cleanup(source: &str) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;
    delete_source(&pool, source).await?;
    println!("cleaned up source '{source}'");
    Ok(ExitCode::Success)
}

async fn cmd_repair() -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;
    let mut conn = pool.acquire().await?;
    crate::index::fts::rebuild_fts(&mut conn, None).await?;
    println!("rebuilt lexical index from local store");
    Ok(ExitCode::Success)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_search(
    query: &str,
    source: &str,
    schema: Option<&str>,
    kind: Option<&str>,
    limit: usize,
    min_score: Option<f64>,
    deep: bool,
) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, vec_loaded) = crate::store::open(&paths.index_db).await?;
    let embedder = load_embedder(&paths.models_dir);
    let hook = ProcessHookRunner;

    let opts = QueryOptions { text: query, limit, source: Some(source), schema, kind, min_score };
    let rows = if deep {
        deep_search(&pool, embedder.as_deref(), &hook, vec_loaded, &opts).await?
    } else {
        run_query(&pool, embedder.as_deref(), &hook, vec_loaded, &opts).await?
    };

    for row in &rows {
        println!("{:.3}  {:<12} {}  {}", row.score, row.kind, row.name_snippet, row.context_snippet);
    }
    Ok(ExitCode::Success)
}

async fn cmd_get(source: &str, key: &str) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;
    let object = get_object(&pool, source, key).await?;
    println!("{}", serde_json::to_string_pretty(&object)?);
    Ok(ExitCode::Success)
}

async fn cmd_schema(source: &str, key: &str) -> Result<ExitCode> {
    let paths = get_paths();
    let (pool, _) = crate::store::open(&paths.index_db).await?;
    let object = get_object(&pool, source, key).await?;
    println!("{}", object.definition);
    Ok(ExitCode::Success)
}

async fn cmd_mcp(stdio: bool, addr: &str, action: Option<&McpAction>) -> Result<ExitCode> {
    let paths = get_paths();

    if let Some(McpAction::Stop) = action {
        return Ok(if stop_server(&paths.mcp_pid_file)? { ExitCode::Success } else { ExitCode::UserError });
    }

    let (pool, vec_loaded) = crate::store::open(&paths.index_db).await?;
    let embedder = load_embedder(&paths.models_dir).map(Arc::from);
    let state = McpState { pool, embedder, hook: Arc::new(ProcessHookRunner), vec_loaded };

    if stdio {
        serve_stdio(&state).await?;
        return Ok(ExitCode::Success);
    }

    if let Some(existing) = read_pid_file(&paths.mcp_pid_file)? {
        tracing::info!(pid = existing, "replacing previous mcp server pid file");
    }
    write_pid_file(&paths.mcp_pid_file)?;

    let socket_addr: SocketAddr = addr.parse()?;
    let result = serve_http(Arc::new(state), socket_addr).await;
    let _ = crate::daemon::remove_pid_file(&paths.mcp_pid_file);
    result?;
    Ok(ExitCode::Success)
}
