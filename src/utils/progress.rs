use std::io::{self, IsTerminal, Write};

/// Single-line progress bar for the steps of one epoch phase.
///
/// Draws to stderr only when stderr is a terminal, so logs and test output
/// stay clean.
pub struct ProgressBar {
    total: usize,
    current: usize,
    prefix: String,
    message: String,
    width: usize,
    visible: bool,
}

impl ProgressBar {
    #[must_use]
    pub fn new(total: usize, prefix: impl Into<String>) -> Self {
        Self {
            total,
            current: 0,
            prefix: prefix.into(),
            message: String::new(),
            width: 30,
            visible: io::stderr().is_terminal(),
        }
    }

    /// Text shown after the counter, e.g. running losses.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn inc(&mut self) {
        self.current = (self.current + 1).min(self.total);
        self.render();
    }

    pub fn position(&self) -> usize {
        self.current
    }

    pub fn finish(&self) {
        if self.visible {
            eprintln!();
            let _ = io::stderr().flush();
        }
    }

    fn render(&self) {
        if !self.visible {
            return;
        }
        let filled = (self.current * self.width)
            .checked_div(self.total)
            .unwrap_or(0)
            .min(self.width);
        let bar: String = "█".repeat(filled) + &"░".repeat(self.width - filled);
        eprint!(
            "\r{} [{}] {}/{} {}",
            self.prefix, bar, self.current, self.total, self.message
        );
        let _ = io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_saturates_at_total() {
        let mut bar = ProgressBar::new(2, "epoch 1/1");
        bar.set_message("d=0.69");
        for _ in 0..5 {
            bar.inc();
        }
        assert_eq!(bar.position(), 2);
    }
}
