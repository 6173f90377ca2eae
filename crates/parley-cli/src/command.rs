//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is message text for
//! the active channel.

use thiserror::Error;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send text to the active channel.
    Say(String),
    /// Open (or switch to) a private channel.
    Private(String),
    /// Switch back to the main channel.
    Main,
    /// Close a private channel.
    Close(String),
    /// Change the local display name.
    Rename(String),
    /// Refresh and print the presence list.
    Who,
    /// Print unread counters per channel.
    Channels,
    /// Print the command list.
    Help,
    /// Leave the session and exit.
    Quit,
}

/// Input that could not be turned into a [`Command`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Known command with missing arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Unrecognized command name
    #[error("unknown command /{0}, try /help")]
    Unknown(String),
}

/// Command summary printed by `/help`.
pub const HELP: &str = "\
/dm <user>     open a private chat
/main          switch to the main channel
/close <user>  close a private chat
/name <name>   change your display name
/who           list online users
/channels      list channels with unread counts
/quit          disconnect and exit";

/// Parse one input line.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "dm" | "msg" => Command::Private(required(arg, "/dm <user>")?),
        "main" => Command::Main,
        "close" => Command::Close(required(arg, "/close <user>")?),
        "name" | "nick" => Command::Rename(required(arg, "/name <name>")?),
        "who" => Command::Who,
        "channels" => Command::Channels,
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn required(arg: &str, usage: &'static str) -> Result<String, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(arg.to_string())
}
