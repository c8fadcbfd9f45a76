use anyhow::{anyhow, bail, Context};
use libprep::{
    about,
    error::{ErrorCode, ProtocolError, ProtocolResult},
    hardware::OperatorConsole,
    simulator::Simulator,
    transfer::{validate_volume, TransferPlan},
    DeckLayout, ProtocolConfig, ProtocolContext, StagePipeline,
};
use rustyline::{error::ReadlineError, DefaultEditor};
use serde::Serialize;
use std::{env, path::Path};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "libprep.json";

fn usage() {
    eprintln!(
        "Usage:\n  \
  libprep_cli --version\n  \
  libprep_cli capabilities\n  \
  libprep_cli plan-transfer VOLUME\n  \
  libprep_cli [--config PATH] simulate [--yes]\n  \
  libprep_cli init-config PATH\n\n  \
  Logging follows RUST_LOG (default: info)"
    );
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn parse_global_config_arg(args: &[String]) -> (Option<String>, usize) {
    if args.len() >= 3 && args[1] == "--config" {
        return (Some(args[2].clone()), 3);
    }
    (None, 1)
}

fn load_config(path: Option<&str>) -> anyhow::Result<ProtocolConfig> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    if Path::new(path).exists() {
        Ok(ProtocolConfig::load_from_path(path)?)
    } else {
        tracing::info!(path, "no config file, using defaults");
        Ok(ProtocolConfig::default())
    }
}

/// Operator console on the controlling terminal. Messages go to stderr so
/// stdout stays valid JSON.
struct TerminalConsole {
    editor: DefaultEditor,
    assume_yes: bool,
}

impl TerminalConsole {
    fn new(assume_yes: bool) -> anyhow::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
            assume_yes,
        })
    }

    fn read_line(&mut self, prompt: &str) -> ProtocolResult<String> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                note_history(self.editor.add_history_entry(line.as_str()));
                Ok(line)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                "Operator aborted the run",
            )),
            Err(e) => Err(ProtocolError::new(
                ErrorCode::Io,
                format!("Could not read from console: {e}"),
            )),
        }
    }
}

/// Whether a console line made it into the editor history.
fn note_history(result: rustyline::Result<bool>) -> bool {
    match result {
        Ok(added) => added,
        Err(e) => {
            tracing::debug!(error = %e, "console line not added to history");
            false
        }
    }
}

impl OperatorConsole for TerminalConsole {
    fn announce(&mut self, message: &str) {
        eprintln!("{message}");
    }

    fn acknowledge(&mut self, message: &str) -> ProtocolResult<()> {
        eprintln!("{message}");
        if self.assume_yes {
            return Ok(());
        }
        self.read_line("press enter to continue> ").map(|_| ())
    }

    fn prompt(&mut self, message: &str) -> ProtocolResult<String> {
        eprintln!("{message}");
        self.read_line("> ")
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        bail!("Missing command");
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (config_path, cmd_idx) = parse_global_config_arg(&args);
    if args.len() <= cmd_idx {
        usage();
        bail!("Missing command");
    }
    let command = &args[cmd_idx];

    match command.as_str() {
        "capabilities" => print_json(&about::capabilities()),
        "plan-transfer" => {
            let raw = args.get(cmd_idx + 1).ok_or_else(|| {
                usage();
                anyhow!("Missing volume for plan-transfer")
            })?;
            let volume: f64 = raw
                .parse()
                .with_context(|| format!("Invalid volume '{raw}'"))?;
            validate_volume(volume)?;
            print_json(&TransferPlan::for_volume(volume)?)
        }
        "init-config" => {
            let path = args.get(cmd_idx + 1).ok_or_else(|| {
                usage();
                anyhow!("Missing path for init-config")
            })?;
            ProtocolConfig::default().save_to_path(path)?;
            eprintln!("Wrote default configuration to {path}");
            Ok(())
        }
        "simulate" => {
            let assume_yes = args[cmd_idx + 1..].iter().any(|a| a == "--yes");
            let config = load_config(config_path.as_deref())?;
            let sim = Simulator::default();
            let console = TerminalConsole::new(assume_yes)?;
            let mut ctx = ProtocolContext::new(
                sim.robot(),
                Box::new(console),
                &config,
                DeckLayout::default(),
            )?;
            let pipeline = StagePipeline::new(config)?;
            let mut report = pipeline.run(&mut ctx)?;
            report.motions = Some(sim.motion_count());
            print_json(&report)
        }
        other => {
            usage();
            bail!("Unknown command '{other}'")
        }
    }
}
