use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use flux_core::{
    Capsule, PipelineConfig, Supervisor, export_json, extract_hints, tokenize, verify_lineage,
};
use flux_store::SessionStore;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser)]
#[command(name = "flux", about = "Capsule signal pipeline CLI")]
struct Cli {
    /// Session name (one journal per session)
    #[arg(long, global = true)]
    session: Option<String>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline step over the given text and store the result
    Process {
        /// Input text; multiple arguments are joined with spaces
        #[arg(required = true)]
        text: Vec<String>,

        /// Seed the jitter source for a reproducible step
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a stored capsule
    Show {
        /// Capsule id or unique prefix
        id: String,
    },

    /// Print a capsule's ancestry, oldest first
    Lineage {
        /// Capsule id or unique prefix
        id: String,
    },

    /// Show session statistics
    Stats,

    /// Export the session journal to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import a journal JSON file into the session
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Merge two stored capsules into a new one
    Merge {
        /// First capsule id or prefix
        a: String,
        /// Second capsule id or prefix
        b: String,
    },
}

fn open_store(cli: &Cli) -> Result<SessionStore> {
    let base_dir = std::env::var("FLUX_DATA_DIR").ok().map(PathBuf::from);
    SessionStore::open(cli.session.as_deref(), base_dir.as_deref())
        .context("failed to open session store")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Process { text, seed } => cmd_process(&cli, text, *seed),
        Commands::Show { id } => cmd_show(&cli, id),
        Commands::Lineage { id } => cmd_lineage(&cli, id),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Merge { a, b } => cmd_merge(&cli, a, b),
    }
}

fn short(capsule: &Capsule) -> String {
    capsule.id().to_string()[..8].to_string()
}

fn load_supervisor(store: &SessionStore) -> Result<Supervisor> {
    let config: PipelineConfig = store.config().clone();
    let snapshot = store
        .store()
        .load_snapshot()
        .context("failed to load pipeline snapshot")?;
    Ok(match snapshot {
        Some(snap) => Supervisor::restore(config, &snap),
        None => Supervisor::new(config),
    })
}

fn load_by_prefix(store: &SessionStore, prefix: &str) -> Result<Capsule> {
    let id = store
        .store()
        .resolve_id(prefix)
        .with_context(|| format!("unknown capsule '{prefix}'"))?;
    store
        .store()
        .load_capsule(id)
        .context("failed to load capsule")?
        .with_context(|| format!("capsule {id} vanished"))
}

fn cmd_process(cli: &Cli, text: &[String], seed: Option<u64>) -> Result<()> {
    let tokens = tokenize(&text.join(" "));
    if tokens.is_empty() {
        bail!("no tokens in input");
    }

    let store = open_store(cli)?;
    let mut supervisor = load_supervisor(&store)?;
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };

    let hints = extract_hints(&tokens);
    let outcome = supervisor.step(&tokens, Some(&hints), &mut rng);
    let snapshot = supervisor.snapshot();

    store
        .store()
        .append_all(&[outcome.raw, outcome.capsule.clone()], Some(&snapshot))
        .context("failed to store capsules")?;

    if cli.verbose {
        let scores: Vec<String> = outcome
            .scores
            .iter()
            .map(|(agent, score)| format!("{agent}={score:.3}"))
            .collect();
        eprintln!(
            "--- state={}, agent={}, scores: {} ---",
            outcome.state,
            outcome.agent.map_or("none", |a| a.name()),
            scores.join(", ")
        );
    }

    let json = export_json(&outcome.capsule).context("failed to serialize capsule")?;
    println!("{json}");
    Ok(())
}

fn cmd_show(cli: &Cli, id: &str) -> Result<()> {
    let store = open_store(cli)?;
    let capsule = load_by_prefix(&store, id)?;
    let json = export_json(&capsule).context("failed to serialize capsule")?;
    println!("{json}");
    Ok(())
}

fn cmd_lineage(cli: &Cli, id: &str) -> Result<()> {
    let store = open_store(cli)?;
    let tip = load_by_prefix(&store, id)?;
    let chain = store
        .store()
        .lineage(tip.id())
        .context("failed to walk lineage")?;

    for (i, capsule) in chain.iter().enumerate() {
        let agent = capsule
            .metadata
            .get("agent")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        println!(
            "{i:>3}  {}  {:<11}  {:<8}  curvature={:.4}  entropy={:.4}",
            short(capsule),
            capsule.state.as_str(),
            agent,
            capsule.curvature,
            capsule.entropy
        );
    }

    let violations = verify_lineage(&chain);
    for (i, violation) in &violations {
        println!("warning: at {i}: {violation}");
    }
    println!(
        "{} capsules, {} continuity warnings",
        chain.len(),
        violations.len()
    );
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let journal = store.store();
    let count = journal.count().context("failed to count capsules")?;
    let snapshot = journal
        .load_snapshot()
        .context("failed to load pipeline snapshot")?;

    println!("session:    {}", store.name());
    println!("capsules:   {count}");
    match &snapshot {
        Some(snap) => {
            let engine = &snap.orchestrator.engine;
            println!("state:      {}", engine.state);
            println!("curvature:  {:.4}", engine.curvature);
            println!("entropy:    {:.4}", engine.entropy);
            let live = flux_core::FeatureEngine::restore(store.config().history_window, engine);
            println!("coherence:  {:.4}", live.temporal_coherence());
            println!("diverged:   {}", live.is_diverged());
            println!("bias:       {:.4}", snap.bias_vector.tanh());
        }
        None => println!("state:      {}", flux_core::State::default()),
    }

    let by_state = journal
        .count_by_state()
        .context("failed to count states")?;
    if !by_state.is_empty() {
        let parts: Vec<String> = by_state.iter().map(|(s, n)| format!("{s}={n}")).collect();
        println!("by_state:   {}", parts.join(", "));
    }
    let by_agent = journal
        .count_by_agent()
        .context("failed to count agents")?;
    if !by_agent.is_empty() {
        let parts: Vec<String> = by_agent.iter().map(|(a, n)| format!("{a}={n}")).collect();
        println!("by_agent:   {}", parts.join(", "));
    }
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    store
        .store()
        .export_json_file(path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let summary = store
        .store()
        .import_json_file(path)
        .context("failed to import JSON")?;
    println!(
        "imported from {}. inserted={}, skipped={}, snapshot={}",
        path.display(),
        summary.inserted,
        summary.skipped,
        summary.snapshot
    );
    Ok(())
}

fn cmd_merge(cli: &Cli, a: &str, b: &str) -> Result<()> {
    let store = open_store(cli)?;
    let left = load_by_prefix(&store, a)?;
    let right = load_by_prefix(&store, b)?;
    let merged = left.merge(&right);
    store
        .store()
        .append_capsule(&merged)
        .context("failed to store merged capsule")?;
    let json = export_json(&merged).context("failed to serialize capsule")?;
    println!("{json}");
    Ok(())
}
