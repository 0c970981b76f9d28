//! Terminal passphrase acquisition, out of scope per spec.md §1: this module only
//! defines the seam ([`crate::store::PassphraseSource`]) and a minimal default that
//! reads a line from stdin with echo left as the terminal driver leaves it.
//!
//! A production binary wanting real echo suppression would shell out to `termios`;
//! that mechanics is explicitly excluded from this crate's scope.

use std::io::{self, BufRead, Write};

use crate::store::PassphraseSource;

pub struct TerminalPassphrase;

impl PassphraseSource for TerminalPassphrase {
    fn prompt_new(&mut self) -> io::Result<String> {
        let first = self.read_line("Enter a new passphrase: ")?;
        let second = self.read_line("Confirm passphrase: ")?;
        if first != second {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "passphrases did not match"));
        }
        Ok(first)
    }

    fn prompt_existing(&mut self) -> io::Result<String> {
        self.read_line("Enter passphrase: ")
    }
}

impl TerminalPassphrase {
    fn read_line(&self, prompt: &str) -> io::Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}
