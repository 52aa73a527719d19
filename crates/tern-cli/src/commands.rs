//! Slash commands for interactive mode

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attach a local file to the next message
    Attach(String),
    /// Remove a pending attachment by id prefix or name
    Detach(String),
    /// List pending attachments
    Files,
    /// Stop the current response
    Stop,
    /// Retry the last failed response
    Retry,
    /// Start a new conversation
    New,
    Help,
    Quit,
    /// Command with a missing argument
    Usage(&'static str),
    Unknown(String),
}

/// Parse a slash command. Returns None for plain messages.
pub fn parse(input: &str) -> Option<Command> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let (command, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();

    Some(match command.to_lowercase().as_str() {
        "attach" | "a" if args.is_empty() => Command::Usage("/attach PATH"),
        "attach" | "a" => Command::Attach(args.to_string()),
        "detach" | "d" if args.is_empty() => Command::Usage("/detach ID"),
        "detach" | "d" => Command::Detach(args.to_string()),
        "files" | "f" => Command::Files,
        "stop" => Command::Stop,
        "retry" | "r" => Command::Retry,
        "new" | "clear" => Command::New,
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

pub fn help_message() -> &'static str {
    r#"Available commands:
  /attach, /a PATH     Attach a file to the next message
  /detach, /d ID       Remove a pending attachment (id prefix or file name)
  /files, /f           List pending attachments
  /stop                Stop the current response
  /retry, /r           Retry the last failed response
  /new, /clear         Start a new conversation
  /help, /h, /?        Show this help message
  /quit, /exit, /q     Exit tern

Anything else is sent as a message together with the pending attachments."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse("  what is /usr?"), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("/stop"), Some(Command::Stop));
        assert_eq!(parse("/RETRY"), Some(Command::Retry));
        assert_eq!(parse("/new"), Some(Command::New));
        assert_eq!(parse("/q"), Some(Command::Quit));
        assert_eq!(
            parse("/attach  ./docs/report final.pdf "),
            Some(Command::Attach("./docs/report final.pdf".into()))
        );
        assert_eq!(parse("/d chart.png"), Some(Command::Detach("chart.png".into())));
    }

    #[test]
    fn test_missing_argument() {
        assert_eq!(parse("/attach"), Some(Command::Usage("/attach PATH")));
        assert_eq!(parse("/detach "), Some(Command::Usage("/detach ID")));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse("/model x"), Some(Command::Unknown("model".into())));
    }
}
