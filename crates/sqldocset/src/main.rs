use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use sqldocset_core::anchor::make_anchor;
use sqldocset_core::catalogue::{Catalogue, missing_entries};
use sqldocset_core::config::load_config;
use sqldocset_core::dump::{UNVERSIONED, diff_dumps, dump_index, read_dump, write_dump};
use sqldocset_core::entry::EntryType;
use sqldocset_core::expand::expand;
use sqldocset_core::index::{EntryCriteria, IndexStore};
use sqldocset_core::pipeline::{BuildOptions, build_docset};
use sqldocset_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime,
    resolve_paths,
};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "sqldocset",
    version,
    about = "Build an offline, searchable docset from a mirrored SQL reference"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the runtime layout and default config
    Init(InitArgs),
    /// Rewrite the mirrored pages and rebuild the search index
    Build(BuildArgs),
    /// Check the built index against the expected-entries catalogue
    Validate,
    /// Show row counts of the built index
    Stats(StatsArgs),
    /// Write a sorted dump of the built index
    Dump(DumpArgs),
    /// Compare two index dumps (or a dump against the built index)
    Diff(DiffArgs),
    /// Print every phrase a bracket/pipe title denotes
    Expand(ExpandArgs),
    /// Print the anchor identifier for an entry
    Anchor(AnchorArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[arg(long, help = "Do not check the expected-entries catalogue")]
    skip_validation: bool,
    #[arg(long, help = "Print the build report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct StatsArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct DumpArgs {
    #[arg(long, value_name = "VERSION", default_value = UNVERSIONED)]
    version: String,
}

#[derive(Debug, Args)]
struct DiffArgs {
    #[arg(value_name = "OLD_DUMP")]
    old: PathBuf,
    #[arg(value_name = "NEW_DUMP")]
    new: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExpandArgs {
    #[arg(value_name = "SYNTAX")]
    syntax: String,
}

#[derive(Debug, Args)]
struct AnchorArgs {
    #[arg(value_name = "TYPE")]
    entry_type: EntryType,
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(long, value_name = "PATH", help = "Document path to build the index path against")]
    document: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Build(args)) => run_build(&runtime, args),
        Some(Commands::Validate) => run_validate(&runtime),
        Some(Commands::Stats(args)) => run_stats(&runtime, args),
        Some(Commands::Dump(args)) => run_dump(&runtime, args),
        Some(Commands::Diff(args)) => run_diff(&runtime, args),
        Some(Commands::Expand(ExpandArgs { syntax })) => run_expand(&syntax),
        Some(Commands::Anchor(args)) => run_anchor(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized sqldocset runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("docs_dir: {}", normalize_path(&paths.docs_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_build(runtime: &RuntimeOptions, args: BuildArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let catalogue = Catalogue::resolve(&config, &paths.project_root)?;
    let report = build_docset(
        &paths,
        &config,
        &catalogue,
        &BuildOptions {
            skip_validation: args.skip_validation,
        },
    )?;

    let store = open_built_index(&paths)?;
    let dump = write_dump(&paths, &store, report.version())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("docset build");
    println!("docset: {}", config.docset.name);
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("documents: {}", report.documents);
    println!("simplified: {}", report.simplified);
    println!("rewritten_links: {}", report.rewritten_links);
    println!("inserted_rows: {}", report.inserted);
    for (entry_type, count) in &report.counts_by_type {
        println!("rows.{entry_type}: {count}");
    }
    println!("version: {}", report.version());
    match report.validated {
        Some(checked) => println!("validated_entries: {checked}"),
        None => println!("validated_entries: <skipped>"),
    }
    println!("wrote_stylesheet: {}", format_flag(report.wrote_stylesheet));
    println!("db_path: {}", normalize_path(&report.db_path));
    println!("dump_path: {}", normalize_path(&dump.path));
    println!("dump_fingerprint: {}", dump.fingerprint);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_validate(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let catalogue = Catalogue::resolve(&config, &paths.project_root)?;
    let store = open_built_index(&paths)?;
    let missing = missing_entries(&store, &catalogue)?;

    println!("catalogue validation");
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("expected_entries: {}", catalogue.len());
    println!("missing.count: {}", missing.len());
    for (entry_type, name) in &missing {
        println!("missing.entry: {entry_type} {name}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    if !missing.is_empty() {
        bail!("{} expected entries are missing from the index", missing.len());
    }
    Ok(())
}

fn run_stats(runtime: &RuntimeOptions, args: StatsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    let store = open_built_index(&paths)?;
    let counts = store.counts_by_type()?;
    let total = store.count(&EntryCriteria::default())?;

    if args.json {
        let value = serde_json::json!({
            "db_path": normalize_path(&paths.db_path),
            "db_size_bytes": status.db_size_bytes,
            "rows": total,
            "rows_by_type": counts,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("index stats");
    println!("db_path: {}", normalize_path(&paths.db_path));
    if let Some(size) = status.db_size_bytes {
        println!("db_size_bytes: {size}");
    }
    println!("rows: {total}");
    for entry_type in EntryType::ALL {
        let count = counts.get(entry_type.as_str()).copied().unwrap_or(0);
        println!("rows.{entry_type}: {count}");
    }
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_dump(runtime: &RuntimeOptions, args: DumpArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let store = open_built_index(&paths)?;
    let report = write_dump(&paths, &store, &args.version)?;

    println!("index dump");
    println!("dump_path: {}", normalize_path(&report.path));
    println!("rows: {}", report.rows);
    println!("fingerprint: {}", report.fingerprint);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_diff(runtime: &RuntimeOptions, args: DiffArgs) -> Result<()> {
    let old = read_dump(&args.old)?;
    let new = match &args.new {
        Some(path) => read_dump(path)?,
        None => {
            let paths = resolve_runtime_paths(runtime)?;
            dump_index(&open_built_index(&paths)?)?
        }
    };
    let diff = diff_dumps(&old, &new);

    println!("index diff");
    println!("added: {}", diff.added.len());
    println!("removed: {}", diff.removed.len());
    if !diff.is_empty() {
        println!();
        print!("{}", diff.unified);
    }
    Ok(())
}

fn run_expand(syntax: &str) -> Result<()> {
    for phrase in expand(syntax) {
        println!("{phrase}");
    }
    Ok(())
}

fn run_anchor(args: AnchorArgs) -> Result<()> {
    let document = args.document.as_deref().unwrap_or("");
    let anchor = make_anchor(args.entry_type, &args.name, document);
    println!("anchor: {}", anchor.id);
    if !document.is_empty() {
        println!("path: {}", anchor.path);
    }
    Ok(())
}

fn open_built_index(paths: &ResolvedPaths) -> Result<IndexStore> {
    match IndexStore::open_existing(&paths.db_path)? {
        Some(store) => Ok(store),
        None => bail!(
            "index.storage: <not built> at {} (run `sqldocset build`)",
            normalize_path(&paths.db_path)
        ),
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    let paths = resolve_paths(&context, &overrides)?;
    debug!(
        project_root = %normalize_path(&paths.project_root),
        root_source = paths.root_source.as_str(),
        "resolved runtime paths"
    );
    Ok(paths)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
