//! `openzone` flag set (§6), `clap::Parser` derive style matching
//! `naive-client::cli`, adapted from that crate's long-flag subcommands to
//! the specification's flat short flags.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "openzone", about = "Deterministic real-time simulation substrate")]
pub struct CliArgs {
    /// `-v`: verbose log (debug level, both console and the rotating log
    /// file under the user config dir).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// `-l`: autoload the last save found in the user config dir.
    #[arg(short = 'l', long = "autoload")]
    pub autoload: bool,

    /// `-i <mission>`: start the named mission fresh.
    #[arg(short = 'i', long = "init", value_name = "MISSION")]
    pub mission: Option<String>,

    /// `-e <layout>`: edit a layout file, creating it if missing.
    #[arg(short = 'e', long = "edit", value_name = "LAYOUT")]
    pub layout: Option<PathBuf>,

    /// `-t <seconds>`: run a fixed-seed-42 benchmark for N seconds instead
    /// of a normal session.
    #[arg(short = 't', long = "time", value_name = "SECONDS")]
    pub benchmark_secs: Option<u64>,

    /// `-L <lang>`: language subdirectory name under `lingua/`.
    #[arg(short = 'L', long = "lingua", value_name = "LANG")]
    pub lingua: Option<String>,

    /// `-p <prefix>`: install prefix assets (missions, `lingua/`) are
    /// resolved under.
    #[arg(short = 'p', long = "prefix", value_name = "PREFIX")]
    pub prefix: Option<PathBuf>,
}

/// The one mutually-exclusive session mode selected by `-l` / `-i` / `-e`,
/// resolved from the raw flag bag since `clap`'s derive alone can't express
/// "at most one of these three, and each takes a different shape of
/// argument" as cleanly as a manual check.
#[derive(Debug)]
pub enum RunMode {
    Autoload,
    Mission(String),
    EditLayout(PathBuf),
    /// None of `-l`/`-i`/`-e` given: start a fresh, empty session.
    Fresh,
}

impl CliArgs {
    /// Resolve the run mode, rejecting more than one of `-l`/`-i`/`-e`.
    pub fn run_mode(&self) -> anyhow::Result<RunMode> {
        let chosen = [self.autoload, self.mission.is_some(), self.layout.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if chosen > 1 {
            anyhow::bail!("-l, -i and -e are mutually exclusive");
        }
        if self.autoload {
            Ok(RunMode::Autoload)
        } else if let Some(mission) = &self.mission {
            Ok(RunMode::Mission(mission.clone()))
        } else if let Some(layout) = &self.layout {
            Ok(RunMode::EditLayout(layout.clone()))
        } else {
            Ok(RunMode::Fresh)
        }
    }
}
