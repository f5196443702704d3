//! Labeled status lines on stderr.
//!
//! Colored and bold when stderr is a terminal, plain otherwise, so CI logs
//! stay readable. All helpers swallow write errors: losing a status line
//! must never fail a run.

use std::io::{self, Write};

use console::{Color, Term, style};

fn stderr_is_tty() -> bool {
    Term::stderr().is_term()
}

pub fn is_stderr_tty() -> bool {
    stderr_is_tty()
}

fn write_labeled(w: &mut dyn Write, label: &str, color: Color, msg: &str, is_tty: bool) {
    let rendered = if is_tty {
        style(label).bold().fg(color).to_string()
    } else {
        label.to_string()
    };
    let _ = if msg.is_empty() {
        writeln!(w, "{rendered}")
    } else {
        writeln!(w, "{rendered} {msg}")
    };
}

/// A step being started.
pub fn action(label: &str, msg: &str) {
    write_labeled(&mut io::stderr(), label, Color::Cyan, msg, stderr_is_tty());
}

/// A step that completed.
pub fn success(label: &str, msg: &str) {
    write_labeled(&mut io::stderr(), label, Color::Green, msg, stderr_is_tty());
}

/// A step that failed.
pub fn fail(label: &str, msg: &str) {
    write_labeled(&mut io::stderr(), label, Color::Red, msg, stderr_is_tty());
}

/// A warning that does not stop the run.
pub fn note(msg: &str) {
    write_labeled(&mut io::stderr(), "Note", Color::Yellow, msg, stderr_is_tty());
}

/// Indented supporting detail under the previous line.
pub fn detail(msg: &str) {
    let line = if stderr_is_tty() {
        style(format!("  {msg}")).dim().to_string()
    } else {
        format!("  {msg}")
    };
    let _ = writeln!(io::stderr(), "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_has_no_escape_codes() {
        let mut buf = Vec::new();
        write_labeled(&mut buf, "Release", Color::Cyan, "building arm64", false);
        assert_eq!(String::from_utf8(buf).unwrap(), "Release building arm64\n");
    }

    #[test]
    fn empty_message_prints_bare_label() {
        let mut buf = Vec::new();
        write_labeled(&mut buf, "Done", Color::Green, "", false);
        assert_eq!(String::from_utf8(buf).unwrap(), "Done\n");
    }
}
