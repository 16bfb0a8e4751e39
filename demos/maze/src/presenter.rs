//! Terminal view of the maze.

use crate::maze::Maze;
use std::io::Write;
use tandem_core::Presenter;

const CLEAR: &str = "\x1b[2J\x1b[H";

/// Redraws the whole board on stdout after every update.
pub struct TerminalPresenter {
    title: String,
}

impl TerminalPresenter {
    pub fn new(title: String) -> Self {
        Self { title }
    }
}

impl Presenter<Maze> for TerminalPresenter {
    fn render(&mut self, state: &Maze) {
        let mut out = std::io::stdout().lock();
        let drawn = write!(
            out,
            "{CLEAR}{}\n\n{}\nw/a/s/d or 4/1/2/3 to move, 0 to stay, 9 to quit\n",
            self.title,
            state.render_text()
        )
        .and_then(|()| out.flush());
        if let Err(e) = drawn {
            tracing::warn!("Could not draw the board: {}", e);
        }
    }

    fn close(&mut self) {
        println!("{} left the maze", self.title);
    }
}
