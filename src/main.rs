//! guesswork CLI
//!
//! Think of something from the catalog; the engine asks until it knows.
//!
//! Run with: cargo run -- --load catalog.json, then cargo run -- --play

use anyhow::{bail, Context, Result};
use guesswork::{
    run_simulation, Answer, Catalog, CatalogProvider, EngineConfig, Gate, SessionEngine, SessionState,
    SimulationConfig, SqliteStore, Turn,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let mut args: Vec<String> = std::env::args().collect();
    let db_path = take_option(&mut args, "--db")?.map(PathBuf::from);
    let config_path = take_option(&mut args, "--config")?.map(PathBuf::from);

    let data_dir = get_data_dir()?;
    let config = load_config(config_path.as_deref(), &data_dir)?;
    let store = open_store(db_path, &data_dir)?;

    let command = args.get(1).map(|s| s.as_str()).unwrap_or("--play");
    match command {
        "--load" => {
            let path = args.get(2).context("Usage: --load <catalog.json>")?;
            run_load(&store, Path::new(path))
        }
        "--play" => {
            let gate: Gate = args.get(2).map(|s| s.parse::<Gate>()).transpose()?.unwrap_or_default();
            run_play(&store, &config, gate)
        }
        "--simulate" => run_simulate(&store, &config, &args[2..]),
        "--stats" => run_stats(&store),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

fn print_usage() {
    println!("guesswork - adaptive guessing engine");
    println!();
    println!("Usage:");
    println!("  guesswork --load <catalog.json>          Replace the catalog");
    println!("  guesswork --play [include|exclude|either] Play a session (default)");
    println!("  guesswork --simulate <runs> [seed] [--json]  Self-play statistics");
    println!("  guesswork --stats                        Catalog and session counts");
    println!();
    println!("Options:");
    println!("  --db <path>         SQLite file (default: data dir/guesswork.db)");
    println!("  --config <file>     Engine configuration TOML");
}

/// Remove `--name <value>` or `--name=<value>` from `args`
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let prefix = format!("{}=", name);
    if let Some(pos) = args.iter().position(|a| a.starts_with(&prefix)) {
        let value = args.remove(pos)[prefix.len()..].to_string();
        return Ok(Some(value));
    }
    if let Some(pos) = args.iter().position(|a| a == name) {
        if pos + 1 >= args.len() {
            bail!("Usage: {} <value>", name);
        }
        let value = args.remove(pos + 1);
        args.remove(pos);
        return Ok(Some(value));
    }
    Ok(None)
}

fn get_data_dir() -> Result<PathBuf> {
    // XDG data dir on Linux, ~/Library/Application Support on macOS
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

    Ok(base.join("guesswork"))
}

/// Explicit `--config`, else `engine.toml` in the data dir, else defaults
fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let fallback = data_dir.join("engine.toml");
            if !fallback.exists() {
                return Ok(EngineConfig::default());
            }
            fallback
        }
    };

    let config = EngineConfig::load(&path).with_context(|| format!("Failed to load config from {:?}", path))?;
    tracing::info!("Configuration loaded from {:?}", path);
    Ok(config)
}

fn open_store(db_path: Option<PathBuf>, data_dir: &Path) -> Result<SqliteStore> {
    let path = match db_path {
        Some(p) => p,
        None => {
            std::fs::create_dir_all(data_dir)?;
            data_dir.join("guesswork.db")
        }
    };
    let store = SqliteStore::open(&path).with_context(|| format!("Failed to open database at {:?}", path))?;
    tracing::info!("Database initialized at {:?}", path);
    Ok(store)
}

fn run_load(store: &SqliteStore, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let catalog = Catalog::from_json(&content).with_context(|| format!("Invalid catalog in {:?}", path))?;
    store.replace_catalog(&catalog)?;

    println!(
        "Loaded {} items, {} tags, {} summaries from {:?}",
        catalog.items.len(),
        catalog.tags.len(),
        catalog.summaries.len(),
        path
    );
    Ok(())
}

// ============================================================================
// Interactive play
// ============================================================================

fn run_play(store: &SqliteStore, config: &EngineConfig, gate: Gate) -> Result<()> {
    let engine = SessionEngine::new(store, store, config);
    let titles = TitleLookup::new(store)?;

    println!("Think of something from the catalog ({} candidates).", titles.len());
    print_play_help();

    let mut turn = engine.start(gate)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print_turn(&turn, &titles);
        if turn.state.is_terminal() {
            break;
        }

        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if line.starts_with('/') {
            if let Some(next) = handle_command(&engine, &turn, line, &titles)? {
                turn = next;
            }
            continue;
        }

        let answer: Answer = match line.parse() {
            Ok(a) => a,
            Err(e) => {
                println!("{}. Try /help", e);
                continue;
            }
        };
        match engine.answer(&turn.session_id, answer) {
            Ok(next) => turn = next,
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

fn print_play_help() {
    println!("Answers: y (yes)  py (probably)  ? (don't know)  pn (probably not)  n (no)");
    println!("Commands:");
    println!("  /back <q>   Go back to question q");
    println!("  /why        Show the current leaders");
    println!("  /help       Show this help");
    println!("  quit        Exit");
    println!();
}

fn handle_command(
    engine: &SessionEngine<'_, SqliteStore, SqliteStore>,
    turn: &Turn,
    line: &str,
    titles: &TitleLookup,
) -> Result<Option<Turn>> {
    let parts: Vec<&str> = line.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/back" => {
            let q: u32 = match arg.parse() {
                Ok(q) => q,
                Err(_) => {
                    println!("Usage: /back <question number>");
                    return Ok(None);
                }
            };
            match engine.rollback_to_question(&turn.session_id, q) {
                Ok(rollback) => {
                    if rollback.rolled_back_to != rollback.requested {
                        println!("(no snapshot at {}, went back to {})", rollback.requested, rollback.rolled_back_to);
                    }
                    return Ok(Some(rollback.turn));
                }
                Err(e) => println!("Cannot go back: {}", e),
            }
        }
        "/why" => {
            if let Some(metrics) = &turn.metrics {
                println!(
                    "confidence {:.1}%  effective candidates {:.2}  entropy {:.2} bits",
                    metrics.confidence * 100.0,
                    metrics.effective_candidates,
                    metrics.entropy_bits
                );
            }
            for (i, leader) in turn.leaders.iter().enumerate() {
                println!("   {}. {:40} {:.1}%", i + 1, titles.get(leader.id), leader.probability * 100.0);
            }
        }
        "/help" => print_play_help(),
        _ => println!("Unknown command: {}. Try /help", cmd),
    }

    Ok(None)
}

fn print_turn(turn: &Turn, titles: &TitleLookup) {
    match &turn.state {
        SessionState::Quiz { q_index, question } => println!("Q{}. {}", q_index, question),
        SessionState::Confirm { q_index, question } => println!("Q{}. (checking) {}", q_index, question),
        SessionState::Reveal { q_index, item_id, forced } => {
            let lead = if *forced { "My best guess" } else { "I think it is" };
            println!("Q{}. {}: {}. Right?", q_index, lead, titles.get(*item_id));
        }
        SessionState::Success { item_id } => {
            println!("\nGot it: {} in {} questions.", titles.get(*item_id), turn.question_count);
        }
        SessionState::FailList { candidates } => {
            println!("\nYou win. Was it one of these?");
            for candidate in candidates {
                println!("   - {} ({:.1}%)", titles.get(candidate.id), candidate.probability * 100.0);
            }
        }
        SessionState::Created => {}
    }
}

/// Item titles for display, read once per session
struct TitleLookup {
    titles: std::collections::HashMap<u64, String>,
}

impl TitleLookup {
    fn new(store: &SqliteStore) -> Result<Self> {
        let titles = store
            .list_candidates(Gate::Either)?
            .into_iter()
            .map(|item| (item.id, item.title))
            .collect();
        Ok(Self { titles })
    }

    fn len(&self) -> usize {
        self.titles.len()
    }

    fn get(&self, id: u64) -> String {
        self.titles.get(&id).cloned().unwrap_or_else(|| format!("#{}", id))
    }
}

// ============================================================================
// Simulation / Stats
// ============================================================================

fn run_simulate(store: &SqliteStore, config: &EngineConfig, args: &[String]) -> Result<()> {
    let json_output = args.iter().any(|a| a == "--json");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let num_runs: u32 = match positional.first() {
        Some(s) => s.parse().with_context(|| format!("Invalid run count: {}", s))?,
        None => 1000,
    };
    let seed: Option<u64> = positional
        .get(1)
        .map(|s| s.parse().with_context(|| format!("Invalid seed: {}", s)))
        .transpose()?;

    let catalog = store.catalog()?;
    if catalog.items.is_empty() {
        bail!("Catalog is empty. Load one with --load <catalog.json>");
    }

    println!("Running {} simulated games...", num_runs);
    let sim_config = SimulationConfig { num_runs, seed, ..Default::default() };
    let results = run_simulation(&catalog, config, &sim_config)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ SIMULATION RESULTS                                          │");
    println!("└─────────────────────────────────────────────────────────────┘\n");
    println!("Games played:       {}", results.num_runs);
    println!("Solved:             {} ({:.1}%)", results.successes, results.success_rate * 100.0);
    println!(
        "Questions:          {:.2} mean, 95% CI [{:.2}, {:.2}], max {}",
        results.mean_questions, results.confidence_interval_95.0, results.confidence_interval_95.1, results.max_questions
    );
    println!("Missed reveals:     {:.2} per game", results.mean_reveal_misses);
    println!("Forced reveals:     {}", results.forced_reveals);
    println!("Unsolved:           {}", results.fail_lists);

    Ok(())
}

fn run_stats(store: &SqliteStore) -> Result<()> {
    let catalog = store.catalog()?;
    let sessions = store.session_stats()?;

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ GUESSWORK STATISTICS                                        │");
    println!("└─────────────────────────────────────────────────────────────┘\n");

    println!("Items: {}", catalog.items.len());
    println!("Tags: {}", catalog.tags.len());
    println!("Summaries: {}", catalog.summaries.len());
    println!("Sessions: {}", sessions.total);
    for (state, count) in &sessions.by_state {
        println!("   {:10} {}", state, count);
    }

    let mut items = catalog.items;
    items.sort_by(|a, b| b.popularity().cmp(&a.popularity()).then(a.id.cmp(&b.id)));

    println!("\nMOST POPULAR:");
    for item in items.iter().take(5) {
        println!("   {:40} {} (+{} from play)", item.title, item.popularity(), item.play_bonus);
    }

    Ok(())
}
