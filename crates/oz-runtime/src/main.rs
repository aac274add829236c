//! The `openzone` binary: CLI parsing, per-user config load/save, log file
//! setup and the main thread of the two-thread tick pipeline (§4.F, §5,
//! §6). Grounded on `naive-runtime::main`'s shape (`tracing_subscriber`
//! init, then dispatch on parsed args) but adapted away from that crate's
//! subcommand/`winit` event loop to the specification's flat short-flag
//! CLI and headless tick loop — this substrate has no renderer of its own
//! (§1 Non-goals name no rendering requirement; rendering/audio consuming
//! crates sit outside this workspace).

mod cli;
mod config;
mod logging;

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use oz_core::library::ClassLibrary;
use oz_core::model::Terrain;
use oz_core::world::{World, WorldCaps};
use oz_sim::lua_api::ScriptEngine;
use oz_sim::Pipeline;

use cli::{CliArgs, RunMode};

const BENCHMARK_SEED: u64 = 42;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let run_mode = args.run_mode()?;

    let dir = config::config_dir()?;
    let _log_guard = logging::init(&dir, args.verbose)?;

    let mut config = config::load(&dir)?;
    if let Some(lingua) = &args.lingua {
        config.lingua = lingua.clone();
    }

    let result = run(&args, &run_mode, &dir, &config);

    // §6: config is written back at end of session regardless of how the
    // session itself went, so a crashed run still persists the language
    // override above.
    if let Err(e) = config::save(&dir, &config) {
        tracing::warn!(error = %e, "failed to write config back on exit");
    }

    if let Err(e) = &result {
        tracing::error!(error = %e, "openzone exited with an error");
        std::process::exit(1);
    }
    Ok(())
}

fn run(args: &CliArgs, mode: &RunMode, dir: &Path, config: &config::Config) -> anyhow::Result<()> {
    if let RunMode::EditLayout(path) = mode {
        return edit_layout(path);
    }

    let prefix = args.prefix.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
    let mut library = ClassLibrary::new();

    if let RunMode::Mission(name) = mode {
        load_mission_classes(&mut library, &prefix, name);
    }

    let seed = match args.benchmark_secs {
        Some(_) => BENCHMARK_SEED,
        None => config.seed.resolve(),
    };

    let terrain = Terrain::flat(-1000.0);
    let caps = WorldCaps::default();

    let world = if matches!(mode, RunMode::Autoload) {
        load_last_save(dir, &library, terrain.clone(), caps).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "autoload failed, starting a fresh session instead");
            World::new(seed, caps, terrain)
        })
    } else {
        World::new(seed, caps, terrain)
    };

    let library = Arc::new(library);
    let mut pipeline = Pipeline::spawn(world, library.clone(), 256);

    let script = match mode {
        RunMode::Mission(name) => load_mission_script(&pipeline, library, &prefix, name)?,
        _ => None,
    };
    if let Some(engine) = &script {
        engine.call_create();
    }

    if let Some(secs) = args.benchmark_secs {
        run_benchmark(&mut pipeline, secs, script.as_ref());
    } else {
        run_session(&mut pipeline, script.as_ref());
    }

    let save_path = dir.join("saves").join("last.sav");
    std::fs::create_dir_all(save_path.parent().unwrap())?;
    let mut file = std::fs::File::create(&save_path)?;
    pipeline.shutdown(&mut file)?;
    tracing::info!(path = %save_path.display(), "session saved");
    Ok(())
}

fn load_mission_classes(library: &mut ClassLibrary, prefix: &Path, mission: &str) {
    let mission_dir = prefix.join("missions").join(mission);
    let objects = mission_dir.join("objects.yaml");
    if objects.exists() {
        if let Err(e) = library.load_object_classes_yaml(&objects) {
            tracing::warn!(error = %e, "failed to load mission object classes");
        }
    }
    let entities = mission_dir.join("entities.yaml");
    if entities.exists() {
        if let Err(e) = library.load_entity_classes_yaml(&entities) {
            tracing::warn!(error = %e, "failed to load mission entity classes");
        }
    }
}

/// Load `<mission>/script.lua` and wire it to `onCreate`/`onUpdate` (§6).
/// Missions without a `script.lua` simply run without a [`ScriptEngine`] —
/// scripting is opt-in per mission, not a hard requirement.
fn load_mission_script(
    pipeline: &Pipeline,
    library: Arc<ClassLibrary>,
    prefix: &Path,
    mission: &str,
) -> anyhow::Result<Option<ScriptEngine>> {
    let script_path = prefix.join("missions").join(mission).join("script.lua");
    if !script_path.exists() {
        return Ok(None);
    }
    let source = std::fs::read_to_string(&script_path)?;
    let mut engine = ScriptEngine::new(pipeline.handle(), library)?;
    engine.load_mission_script(mission, &source)?;
    tracing::info!(path = %script_path.display(), "mission script loaded");
    Ok(Some(engine))
}

fn load_last_save(
    dir: &Path,
    library: &ClassLibrary,
    terrain: Terrain,
    caps: WorldCaps,
) -> anyhow::Result<World> {
    let path = dir.join("saves").join("last.sav");
    let mut file = std::fs::File::open(&path)?;
    let world = oz_sim::restore(&mut file, library, terrain, caps)?;
    tracing::info!(path = %path.display(), "autoloaded last save");
    Ok(world)
}

/// `-e <layout>`: create the layout file if it is missing, then exit. A
/// full layout editor needs an interactive renderer, which this headless
/// substrate does not own (§1 Non-goals' scope boundary for this crate
/// set); this is the literal "create if missing" behaviour §6 asks for.
fn edit_layout(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, "")?;
        tracing::info!(path = %path.display(), "created new layout file");
    } else {
        tracing::info!(path = %path.display(), "layout file already exists");
    }
    Ok(())
}

/// `-t <seconds>`: tick the pipeline at full speed (no frame pacing sleep
/// matters here beyond what `Pipeline::tick` already does) for the given
/// wall-clock duration with the fixed seed 42, then report ticks run.
fn run_benchmark(pipeline: &mut Pipeline, seconds: u64, script: Option<&ScriptEngine>) {
    let deadline = Instant::now() + std::time::Duration::from_secs(seconds);
    let mut ticks: u64 = 0;
    while Instant::now() < deadline {
        let events = pipeline.tick(|_world| {});
        if let Some(engine) = script {
            engine.call_update(oz_core::geom::TICK);
            engine.dispatch_events(&events);
        }
        ticks += 1;
    }
    tracing::info!(
        ticks,
        dropped_ms = pipeline.dropped_time().as_millis() as u64,
        "benchmark finished"
    );
}

/// Normal / autoload / mission session: tick at the paced rate until a
/// console command (typed on stdin) says to stop, or stdin is closed
/// (e.g. running under a supervisor with no attached terminal).
fn run_session(pipeline: &mut Pipeline, script: Option<&ScriptEngine>) {
    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = stop.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("quit") => {
                    reader_stop.store(true, Ordering::Release);
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        reader_stop.store(true, Ordering::Release);
    });

    while !stop.load(Ordering::Acquire) {
        let events = pipeline.tick(|_world| {});
        if let Some(engine) = script {
            engine.call_update(oz_core::geom::TICK);
            engine.dispatch_events(&events);
        }
    }
}
