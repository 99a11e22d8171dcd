use std::io::{self, Stdout};

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};

use crate::error::AppError;

fn terminal_error(context: &str, source: io::Error) -> AppError {
    AppError::IoContext {
        context: format!("terminal error: {context}"),
        source,
    }
}

fn restore(use_alt: bool) {
    let _ = disable_raw_mode();
    if use_alt {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

pub struct TuiTerminal {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    use_alt: bool,
}

impl TuiTerminal {
    pub fn new(use_alt: bool) -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| terminal_error("enable raw mode", e))?;
        if use_alt {
            if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
                restore(false);
                return Err(terminal_error("enter alternate screen", e));
            }
        }
        let terminal = match Terminal::new(CrosstermBackend::new(io::stdout())) {
            Ok(terminal) => terminal,
            Err(e) => {
                restore(use_alt);
                return Err(terminal_error("create terminal", e));
            }
        };
        Ok(Self { terminal, use_alt })
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame<'_>)) -> Result<(), AppError> {
        self.terminal
            .draw(render)
            .map(|_| ())
            .map_err(|e| terminal_error("draw", e))
    }
}

impl Drop for TuiTerminal {
    fn drop(&mut self) {
        restore(self.use_alt);
        let _ = self.terminal.show_cursor();
    }
}

/// Restores the terminal before the default panic output is printed.
/// Dropping the guard puts the default hook back.
pub struct PanicRestoreHookGuard;

impl PanicRestoreHookGuard {
    pub fn install(use_alt: bool) -> Self {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore(use_alt);
            previous(info);
        }));
        Self
    }
}

impl Drop for PanicRestoreHookGuard {
    fn drop(&mut self) {
        let _ = std::panic::take_hook();
    }
}
