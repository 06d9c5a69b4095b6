use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use buildstamp::config::{self, BuildConfig};
use buildstamp::pipeline::{self, Target};
use buildstamp::{Result, cache};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to an optional build configuration TOML
    #[arg(long, default_value = "buildstamp.toml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the server binary
    Server,
    /// Build the agent binary
    Agent,
    /// Delete generated certificates, caches and staged artifacts
    Clean,
}

fn main() {
    init_logging();
    // An operator interrupt during the prompts is a clean exit, not a crash.
    ctrlc::set_handler(|| process::exit(0)).ok();
    let args = parse_args();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            e.print().ok();
            process::exit(code);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

fn run(args: Args) -> Result<()> {
    let cfg = config::load(&args.config)?;
    match args.cmd {
        Command::Clean => pipeline::clean(&cfg),
        Command::Server => {
            let endpoint = resolve_endpoint(&cfg)?;
            let artifact = pipeline::run_build(&cfg, Target::Server, &endpoint, None)?;
            println!("{}", artifact.display());
            Ok(())
        }
        Command::Agent => {
            let endpoint = resolve_endpoint(&cfg)?;
            let indicator = resolve_indicator(&cfg)?;
            let artifact = pipeline::run_build(&cfg, Target::Agent, &endpoint, Some(&indicator))?;
            println!("{}", artifact.display());
            Ok(())
        }
    }
}

fn resolve_endpoint(cfg: &BuildConfig) -> Result<String> {
    let path = cfg.endpoint_cache_file();
    if let Some(cached) = cache::load(&path)
        && yes_no(&format!("Use cached endpoint address {cached}? [y/N] "))?
    {
        return Ok(cached);
    }
    let value = prompt("Endpoint address: ")?;
    cache::store(&path, &value)?;
    Ok(value)
}

fn resolve_indicator(cfg: &BuildConfig) -> Result<String> {
    let path = cfg.indicator_cache_file();
    if let Some(cached) = cache::load(&path)
        && yes_no(&format!("Use cached liveness indicator {cached}? [y/N] "))?
    {
        return Ok(cached);
    }
    let value = prompt("Liveness indicator: ")?;
    cache::store(&path, &value)?;
    Ok(value)
}

// Answers are taken as-is beyond trimming; a blank value stays blank.
fn prompt(msg: &str) -> Result<String> {
    print!("{msg}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn yes_no(msg: &str) -> Result<bool> {
    let answer = prompt(msg)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "yea" | "yeah"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        for answer in ["y", "Y", "yes", "YES", "yea", "yeah", " yes "] {
            assert!(is_affirmative(answer), "expected yes for {answer:?}");
        }
        for answer in ["", "n", "no", "nope", "yess", "ja"] {
            assert!(!is_affirmative(answer), "expected no for {answer:?}");
        }
    }
}
