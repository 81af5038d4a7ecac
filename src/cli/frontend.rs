//! Terminal frontend
//!
//! Prints `*** action module *** [n/total]` progress lines, an optional
//! progress bar, and the interactive recovery menu. Menu input is read by a
//! background thread so the prompt can notice a Ctrl-C while it waits.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;
use indicatif::ProgressBar;

use crate::cli::output::{create_build_bar, status};
use crate::config::defaults::PROMPT_POLL_INTERVAL_MS;
use crate::core::config::Config;
use crate::core::frontend::{Frontend, RecoveryChoice, RecoveryDecision, RecoveryRequest};
use crate::core::phase::ModuleOutcome;

/// What the user picked from the menu
#[derive(Debug, Clone, PartialEq, Eq)]
enum MenuEntry {
    Decision(RecoveryChoice),
    Shell,
}

/// Frontend writing to the terminal
pub struct TerminalFrontend {
    total: usize,
    index: usize,
    quiet: bool,
    bar: Option<ProgressBar>,
    interrupted: Arc<AtomicBool>,
    input: Option<Receiver<String>>,
}

impl std::fmt::Debug for TerminalFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalFrontend")
            .field("total", &self.total)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl TerminalFrontend {
    /// Frontend for a run of `total` modules
    pub fn new(total: usize, config: &Config, interrupted: Arc<AtomicBool>) -> Self {
        let bar = (config.progress_bar && !config.quiet_mode && is_stdout_terminal())
            .then(|| create_build_bar(total as u64));
        Self {
            total,
            index: 0,
            quiet: config.quiet_mode,
            bar,
            interrupted,
            input: None,
        }
    }

    /// Read menu answers from `input` instead of stdin
    #[must_use]
    pub fn with_input(mut self, input: Receiver<String>) -> Self {
        self.input = Some(input);
        self
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }

    fn counter(&self) -> String {
        format!("[{}/{}]", self.index, self.total)
    }

    fn input(&mut self) -> &Receiver<String> {
        self.input.get_or_insert_with(spawn_stdin_reader)
    }

    /// Next input line; `None` on interrupt or closed input
    fn read_line(&mut self) -> Option<String> {
        let poll = Duration::from_millis(PROMPT_POLL_INTERVAL_MS);
        loop {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                println!();
                return None;
            }
            match self.input().recv_timeout(poll) {
                Ok(line) => return Some(line.trim().to_string()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn prompt(&mut self, request: &RecoveryRequest) -> RecoveryDecision {
        let entries = menu_entries(request);
        loop {
            println!();
            for (i, entry) in entries.iter().enumerate() {
                println!("  [{}] {}", i + 1, entry_label(entry, request));
            }
            print!("choice: ");
            let _ = std::io::stdout().flush();

            let Some(answer) = self.read_line() else {
                return RecoveryDecision::Fail;
            };
            let Some(entry) = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| entries.get(n))
            else {
                println!("{} Invalid choice", status::WARNING.yellow());
                continue;
            };

            match entry {
                MenuEntry::Shell => {
                    if let Some(dir) = &request.builddir {
                        open_shell(dir);
                    }
                }
                MenuEntry::Decision(choice) => {
                    if choice.needs_confirmation {
                        print!("Type 'yes' to confirm the action: ");
                        let _ = std::io::stdout().flush();
                        match self.read_line() {
                            Some(answer) if answer.eq_ignore_ascii_case("yes") => {}
                            Some(_) => continue,
                            None => return RecoveryDecision::Fail,
                        }
                    }
                    return choice.decision.clone();
                }
            }
        }
    }
}

impl Frontend for TerminalFrontend {
    fn message(&mut self, msg: &str, _module: Option<&str>) {
        let line = format!("*** {msg} *** {}", self.counter());
        self.println(&line.bold().to_string());
    }

    fn set_action(&mut self, action: &str, module: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{action} {module}"));
        }
        if !self.quiet {
            let line = format!("*** {action} {module} *** {}", self.counter());
            self.println(&line.bold().to_string());
        }
    }

    fn start_module(&mut self, module: &str) {
        self.index += 1;
        if let Some(bar) = &self.bar {
            bar.set_message(module.to_string());
        }
    }

    fn end_module(&mut self, module: &str, outcome: &ModuleOutcome) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        if *outcome == ModuleOutcome::Failed {
            let line = format!("{} {module} failed", status::ERROR);
            self.println(&line.red().to_string());
        }
    }

    fn handle_error(&mut self, request: &RecoveryRequest) -> RecoveryDecision {
        match self.bar.clone() {
            Some(bar) => bar.suspend(|| self.prompt(request)),
            None => self.prompt(request),
        }
    }

    fn end_build(&mut self, failures: &[String]) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if failures.is_empty() {
            let line = format!("*** success *** {}", self.counter());
            println!("{}", line.green().bold());
        } else {
            println!(
                "{}",
                "*** the following modules were not built ***".red().bold()
            );
            println!("{}", failures.join(" "));
        }
    }
}

fn menu_entries(request: &RecoveryRequest) -> Vec<MenuEntry> {
    let mut entries: Vec<MenuEntry> = Vec::new();
    for choice in &request.choices {
        entries.push(MenuEntry::Decision(choice.clone()));
        if choice.decision == RecoveryDecision::Fail && request.builddir.is_some() {
            entries.push(MenuEntry::Shell);
        }
    }
    entries
}

fn entry_label(entry: &MenuEntry, request: &RecoveryRequest) -> String {
    match entry {
        MenuEntry::Shell => "Start shell".to_string(),
        MenuEntry::Decision(choice) => match &choice.decision {
            RecoveryDecision::Rerun => format!("Rerun phase {}", request.phase),
            RecoveryDecision::Continue => match request.next_phase {
                Some(next) => format!("Ignore error and continue to {next}"),
                None => choice.decision.to_string(),
            },
            other => other.to_string(),
        },
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn open_shell(dir: &Path) {
    let shell = if cfg!(windows) {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd".to_string())
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    };
    println!("exit shell to continue with build");
    if let Err(e) = std::process::Command::new(&shell).current_dir(dir).status() {
        println!("{} Could not start {shell}: {e}", status::ERROR);
    }
}

fn is_stdout_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}
