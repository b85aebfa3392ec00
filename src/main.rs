use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use lapc::{CompletionSpec, Fault, Session, SessionConfig, Status};

/// Lapc is an assembler and hardware simulator toolchain for the LAPC-1 sound driver dialect.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a driver source file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a driver source file and run it against the simulated card
    Run {
        /// Driver source file to run
        name: PathBuf,
        /// Wall-clock milliseconds between steps (0 = unthrottled)
        #[arg(short, long, default_value_t = 0)]
        cadence_ms: u64,
        /// Give up after this many scheduler ticks
        #[arg(long, default_value_t = 10_000)]
        max_ticks: u64,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a driver source file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Place a watch on a driver source file to receive constant assembler updates
    Watch {
        /// File to watch
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    lapc::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(lapc::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                cadence_ms,
                max_ticks,
                minimal,
            } => run(&name, cadence_ms, max_ticks, minimal),
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                check(&name)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Watch { name } => watch(&name),
        }
    } else if let Some(path) = args.path {
        run(&path, 0, 10_000, false)
    } else {
        println!("\n~ lapc v{VERSION} ~");
        println!("{}", LOGO.truecolor(120, 220, 232).bold());
        println!("{SHORT_INFO}");
        Ok(())
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Split a source file into per-block line lists on `;; block NAME` marker
/// lines. The markers are comments as far as the dialect grammar goes, so
/// existing puzzle content assembles untouched; a file with no markers is a
/// single block with entry label MAIN.
fn split_blocks(src: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut entries: Vec<String> = Vec::new();
    let mut blocks: Vec<Vec<String>> = Vec::new();
    for line in src.lines() {
        if let Some(name) = block_marker(line) {
            entries.push(name);
            blocks.push(Vec::new());
            continue;
        }
        if blocks.is_empty() {
            entries.push("MAIN".to_string());
            blocks.push(Vec::new());
        }
        blocks.last_mut().unwrap().push(line.to_string());
    }
    if blocks.is_empty() {
        entries.push("MAIN".to_string());
        blocks.push(Vec::new());
    }
    (entries, blocks)
}

fn block_marker(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(";;")?;
    let name = rest.trim().strip_prefix("block")?.trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_ascii_uppercase())
}

fn load_session(name: &Path, cadence_ms: u64, stream_seed: Option<u64>) -> Result<Session> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let (entry_labels, blocks) = split_blocks(&src);
    let mut session = Session::new(SessionConfig {
        entry_labels,
        completion: CompletionSpec::lapc1(),
        cadence: Duration::from_millis(cadence_ms),
        stream_seed,
    });
    session.load_source(blocks);
    Ok(session)
}

fn run(name: &Path, cadence_ms: u64, max_ticks: u64, minimal: bool) -> Result<()> {
    file_message(MsgColor::Green, "Assembling", name);
    let mut session = load_session(name, cadence_ms, lapc::env::stream_seed())?;

    session.request_run();
    if session.status() == Status::Running {
        message(MsgColor::Green, "Running", "driver against simulated card");
    }

    let mut ticks = 0u64;
    loop {
        match session.status() {
            Status::Success => break,
            Status::Error => {
                let report = session
                    .fault_diagnostic()
                    .expect("error state always records a fault");
                return Err(report);
            }
            _ => {}
        }
        if ticks >= max_ticks {
            bail!("driver made no progress within {max_ticks} ticks; still looping?");
        }
        session.tick();
        ticks += 1;
        if cadence_ms > 0 {
            sleep(Duration::from_millis(1));
        }
    }

    message(MsgColor::Green, "Success", "driver reported in");
    print_registers(&session, minimal);
    if !minimal {
        println!(
            "{:>12} {} cycles over {} ticks",
            "Stats".cyan(),
            session.cpu().cycles,
            ticks
        );
    }
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn print_registers(session: &Session, minimal: bool) {
    for (port, value) in session.device().snapshot() {
        if minimal {
            println!("{} {:02X}", port.name(), value);
        } else {
            println!(
                "{:>12} {:<13} = ${:02X}",
                "Register".cyan(),
                port.name(),
                value
            );
        }
    }
}

fn check(name: &Path) -> Result<()> {
    let mut session = load_session(name, 0, None)?;
    if let Err(fault) = session.assemble() {
        let (block, _) = fault.location();
        let src = session.source().block_text(block);
        return Err(lapc::fault_report(&Fault::Assembly(fault), &src));
    }
    Ok(())
}

fn watch(name: &Path) -> Result<()> {
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Vim breaks if watching a single file
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let name = name.to_path_buf();

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(MsgColor::Green, "Watching", &name);
    message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

    let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            // Watch remove for vim changes
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(MsgColor::Green, "Watching", &name);
                message(MsgColor::Green, "Re-checking", "file change detected");
                message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

                sleep(Duration::from_millis(50));

                match check(&name) {
                    Ok(_) => message(MsgColor::Green, "Success", "no errors found!"),
                    Err(e) => println!("\n{:?}", e),
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

const LOGO: &str = r#"
 ██      █████  ██████   ██████     ██
 ██     ██   ██ ██   ██ ██        ███
 ██     ███████ ██████  ██   ██     ██
 ███████ ██   ██ ██      ██████     ██"#;

const SHORT_INFO: &str = r"
Welcome to lapc, the driver toolchain for the LAPC-1 sound card simulator.
Feed it a driver source file to assemble and run, or use `-h` for the full
usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
