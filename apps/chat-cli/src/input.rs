//! Line-oriented input: slash commands for credentials, everything else is chat.

use std::{
    io::{self, BufRead},
    thread,
};

use tokio::sync::mpsc;
use tracing::debug;

const LINE_BUFFER: usize = 16;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/connect <name> <token>`
    Connect { display_name: String, token: String },
    /// Plain text to send. May be blank; the runtime ignores blank lines.
    Message(String),
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// A slash command that could not be understood.
    Invalid(String),
}

pub const HELP: &str = "commands: /connect <name> <token>, /quit, /help (start a line with // to send a literal '/')";

/// Read stdin on a plain thread and forward each line.
///
/// A blocking read must not hold up runtime shutdown, so the thread is never
/// joined; it ends with the process. The channel closes on EOF or after a
/// read error has been forwarded.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    thread::Builder::new()
        .name("stdin-reader".to_owned())
        .spawn(move || forward_lines(io::stdin().lock(), &tx))?;
    Ok(rx)
}

fn forward_lines(reader: impl BufRead, tx: &mpsc::Sender<io::Result<String>>) {
    for line in reader.lines() {
        let failed = line.is_err();
        if tx.blocking_send(line).is_err() {
            debug!("input consumer gone; stopping stdin reader");
            return;
        }
        if failed {
            return;
        }
    }
}

pub fn parse_line(line: &str) -> Input {
    let trimmed = line.trim();
    if let Some(literal) = trimmed.strip_prefix("//") {
        return Input::Message(format!("/{literal}"));
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(trimmed.to_owned());
    };

    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("connect") => match (parts.next(), parts.next(), parts.next()) {
            (Some(display_name), Some(token), None) => Input::Connect {
                display_name: display_name.to_owned(),
                token: token.to_owned(),
            },
            _ => Input::Invalid("usage: /connect <name> <token>".to_owned()),
        },
        Some("quit") | Some("exit") => Input::Quit,
        Some("help") => Input::Help,
        Some(other) => Input::Invalid(format!("unknown command '/{other}'")),
        None => Input::Invalid("empty command".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_line("  hello there "), Input::Message("hello there".into()));
        assert_eq!(parse_line(""), Input::Message(String::new()));
    }

    #[test]
    fn parses_connect_command() {
        assert_eq!(
            parse_line("/connect alice 12345678"),
            Input::Connect {
                display_name: "alice".into(),
                token: "12345678".into(),
            }
        );
        assert!(matches!(parse_line("/connect alice"), Input::Invalid(_)));
        assert!(matches!(parse_line("/connect a b c"), Input::Invalid(_)));
    }

    #[test]
    fn parses_control_commands() {
        assert_eq!(parse_line("/quit"), Input::Quit);
        assert_eq!(parse_line("/exit"), Input::Quit);
        assert_eq!(parse_line("/help"), Input::Help);
        assert!(matches!(parse_line("/dance"), Input::Invalid(_)));
        assert!(matches!(parse_line("/"), Input::Invalid(_)));
    }

    #[test]
    fn forwards_lines_until_eof() {
        let (tx, mut rx) = mpsc::channel(4);
        forward_lines(io::Cursor::new("/connect alice 12345678\nhi\n"), &tx);
        drop(tx);

        let lines: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|line| line.expect("cursor reads cannot fail"))
            .collect();
        assert_eq!(lines, vec!["/connect alice 12345678", "hi"]);
    }

    #[test]
    fn double_slash_sends_literal() {
        assert_eq!(parse_line("//shrug"), Input::Message("/shrug".into()));
    }
}
