//! Interactive control: one command per stdin line while `dlm get` runs.
//! Protocol: "pause <url>", "resume <url>", "cancel <url>", "limit <n>", "status".

use dlm_core::Scheduler;
use std::io::{self, BufRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Pause(String),
    Resume(String),
    Cancel(String),
    Limit(usize),
    Status,
}

/// Parse one control line. `None` for blank lines, `Err` with a hint for anything unknown.
pub fn parse_command(line: &str) -> Option<Result<ControlCommand, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((v, a)) => (v, a.trim()),
        None => (line, ""),
    };
    let needs_url = |make: fn(String) -> ControlCommand| {
        if arg.is_empty() {
            Err(format!("{} needs a URL", verb))
        } else {
            Ok(make(arg.to_string()))
        }
    };
    let parsed = match verb {
        "pause" => needs_url(ControlCommand::Pause),
        "resume" => needs_url(ControlCommand::Resume),
        "cancel" => needs_url(ControlCommand::Cancel),
        "limit" => arg
            .parse::<usize>()
            .map(ControlCommand::Limit)
            .map_err(|_| format!("limit needs a number, got `{}`", arg)),
        "status" if arg.is_empty() => Ok(ControlCommand::Status),
        _ => Err(format!("unknown command `{}`", line)),
    };
    Some(parsed)
}

fn apply(scheduler: &Scheduler, cmd: ControlCommand) {
    tracing::debug!("control command: {:?}", cmd);
    match cmd {
        ControlCommand::Pause(url) => scheduler.pause(&url),
        ControlCommand::Resume(url) => scheduler.resume(&url),
        ControlCommand::Cancel(url) => scheduler.cancel(&url),
        ControlCommand::Limit(n) => scheduler.set_concurrency_limit(n),
        ControlCommand::Status => eprintln!(
            "running {} / limit {}, queued {}, registered {}",
            scheduler.running_count(),
            scheduler.concurrency_limit(),
            scheduler.queued_count(),
            scheduler.len()
        ),
    }
}

/// Reads stdin on a detached thread and applies each command to `scheduler`.
/// The thread ends at EOF or when the process exits.
pub fn spawn_stdin_control(scheduler: Scheduler) -> io::Result<()> {
    std::thread::Builder::new()
        .name("dlm-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::debug!("stdin read: {}", e);
                        break;
                    }
                };
                match parse_command(&line) {
                    Some(Ok(cmd)) => apply(&scheduler, cmd),
                    Some(Err(hint)) => eprintln!("{}", hint),
                    None => {}
                }
            }
        })?;
    Ok(())
}
