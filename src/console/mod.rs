//! Interactive prompt shared by every agent binary.

pub mod formatter;

use std::io::{self, Write};
use std::process::ExitCode;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::agent::Agent;
use crate::error::Result;

/// An agent that can be driven from the prompt.
#[allow(async_fn_in_trait)]
pub trait Interactive {
    type Command;

    /// Heading printed when the prompt opens.
    fn banner(&self) -> &'static str;

    /// Command list shown under the banner and after an unknown command.
    fn usage(&self) -> &'static str;

    /// `None` for anything that is not a known command.
    fn parse_command(line: &str) -> Option<Self::Command>;

    /// Line printed before a slow command runs.
    fn progress(_command: &Self::Command) -> Option<&'static str> {
        None
    }

    async fn execute(&mut self, command: Self::Command) -> Result<String>;
}

/// Split `verb rest` at the first space. A verb that needs an argument but
/// has none yields `None` so it reads as an unknown command.
pub fn split_command(line: &str) -> (&str, Option<&str>) {
    match line.split_once(' ') {
        Some((verb, rest)) => {
            let rest = rest.trim();
            (verb, (!rest.is_empty()).then_some(rest))
        }
        None => (line, None),
    }
}

/// Read commands from `input` until `quit`, end of input or Ctrl-C.
pub async fn run<A, R, W>(agent: &mut A, input: R, out: &mut W) -> io::Result<()>
where
    A: Interactive,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    run_until(agent, input, out, tokio::signal::ctrl_c()).await
}

/// Like [`run`], stopping as soon as `interrupt` completes, whether the
/// prompt is waiting for input or a command is still running.
pub async fn run_until<A, R, W, S>(
    agent: &mut A,
    input: R,
    out: &mut W,
    interrupt: S,
) -> io::Result<()>
where
    A: Interactive,
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future,
{
    tokio::pin!(interrupt);

    writeln!(out, "\n{}", agent.banner())?;
    writeln!(out, "Commands: {}", agent.usage())?;

    let mut lines = input.lines();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut interrupt => None,
        };
        let Some(line) = line else {
            writeln!(out, "\nGoodbye!")?;
            break;
        };

        let command = line.trim();
        match command {
            "" => continue,
            "quit" => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            "help" => {
                writeln!(out, "Commands: {}", agent.usage())?;
                continue;
            }
            _ => {}
        }

        let Some(parsed) = A::parse_command(command) else {
            writeln!(out, "Unknown command. Available: {}", agent.usage())?;
            continue;
        };

        if let Some(progress) = A::progress(&parsed) {
            writeln!(out, "\n{progress}")?;
            out.flush()?;
        }

        debug!(command, "Executing console command");
        let outcome = tokio::select! {
            outcome = agent.execute(parsed) => Some(outcome),
            _ = &mut interrupt => None,
        };
        match outcome {
            Some(Ok(output)) => writeln!(out, "\n{output}")?,
            Some(Err(e)) => writeln!(out, "Error: {e}")?,
            None => {
                writeln!(out, "\nGoodbye!")?;
                break;
            }
        }
    }

    Ok(())
}

/// Check the connection, then hand stdin/stdout to the prompt loop.
pub async fn start<A>(agent: &mut A, service: &str) -> ExitCode
where
    A: Agent + Interactive,
{
    println!("\n🔍 Testing connections...");
    if !agent.test_connection().await {
        println!("Failed to connect to {service}");
        return ExitCode::FAILURE;
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    match run(agent, stdin, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Console error: {e}");
            ExitCode::FAILURE
        }
    }
}
