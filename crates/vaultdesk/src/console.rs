//! Console stand-ins for the desktop UI.
//!
//! [`ConsolePresenter`] prints each directory the primary would show, and
//! [`spawn_command_reader`] turns a `quit` line on stdin into the explicit
//! quit trigger.

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use vaultdesk_core::{Presenter, ShutdownCoordinator};

/// Prints presented directories to stdout, one per line.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    presented: AtomicUsize,
}

impl ConsolePresenter {
    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::Relaxed)
    }
}

impl Presenter for ConsolePresenter {
    fn present_directory(&self, path: &Path) {
        self.presented.fetch_add(1, Ordering::Relaxed);
        info!("Bringing window to front for {}", path.display());
        // Intentional stdout: the "window" of the console front end.
        println!("OPEN {}", path.display());
    }
}

/// Commands accepted on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => Some(ConsoleCommand::Quit),
            _ => None,
        }
    }
}

/// Read commands from stdin on a plain thread.
///
/// The thread is detached; a pending read never delays process exit.
/// End of input stops the reader without quitting.
pub fn spawn_command_reader(coordinator: ShutdownCoordinator) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("vaultdesk-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read console input: {}", e);
                        break;
                    }
                };
                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Quit) => {
                        coordinator.quit();
                        break;
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown command: {:?} (type 'quit' to exit)", line.trim()),
                }
            }
            debug!("Console reader finished");
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quit_variants() {
        assert_eq!(ConsoleCommand::parse("quit"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("  QUIT \n"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("open"), None);
        assert_eq!(ConsoleCommand::parse(""), None);
    }

    #[test]
    fn test_presenter_counts() {
        let presenter = ConsolePresenter::default();
        presenter.present_directory(Path::new("/tmp/vault"));
        presenter.present_directory(Path::new("/tmp/other"));
        assert_eq!(presenter.presented(), 2);
    }
}
