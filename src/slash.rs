use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a line with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// List saved conversations
    List,
    /// Open a saved conversation
    Open,
    /// Show or change the model
    Model,
    /// Show, set or clear the system instruction
    System,
    /// Store the API key
    Key,
    /// Attach an image to the next message
    Image,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation",
            SlashCommand::List => "list saved conversations",
            SlashCommand::Open => "open a conversation by number or id",
            SlashCommand::Model => "show the model, or switch with /model <name>",
            SlashCommand::System => "show the system instruction, set it with /system <text>, or /system clear",
            SlashCommand::Key => "save your API key with /key <value>",
            SlashCommand::Image => "attach an image to the next message (/image <path>, /image clear)",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input.
///
/// The argument is the rest of the line with surrounding whitespace removed,
/// so instructions keep their inner spacing.
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let body = input.trim_start().strip_prefix('/')?;
    let (head, rest) = match body.find(char::is_whitespace) {
        Some(split) => (&body[..split], body[split..].trim()),
        None => (body, ""),
    };

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "n" | "clear" => Some(SlashCommand::New),
            "ls" | "history" => Some(SlashCommand::List),
            "o" | "load" => Some(SlashCommand::Open),
            "models" => Some(SlashCommand::Model),
            "sys" => Some(SlashCommand::System),
            "img" => Some(SlashCommand::Image),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }

    help.push_str("\nAliases: /q for /bye, /n for /new, /ls for /list, /o for /open, /img for /image");
    help.push_str("\nAnything not starting with '/' is sent to the model.");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse_slash_command("hello there").is_none());
        assert!(parse_slash_command("").is_none());
    }

    #[test]
    fn parses_command_with_argument() {
        let parsed = parse_slash_command("/model gemini-1.5-pro").unwrap();
        assert_eq!(parsed.command, SlashCommand::Model);
        assert_eq!(parsed.argument(), Some("gemini-1.5-pro"));
    }

    #[test]
    fn argument_keeps_inner_spacing() {
        let parsed = parse_slash_command("/system  Be  terse.\tAlways. ").unwrap();
        assert_eq!(parsed.command, SlashCommand::System);
        assert_eq!(parsed.argument(), Some("Be  terse.\tAlways."));
    }

    #[test]
    fn resolves_aliases_and_case() {
        assert_eq!(parse_slash_command("/q").unwrap().command, SlashCommand::Bye);
        assert_eq!(parse_slash_command("/LIST").unwrap().command, SlashCommand::List);
        assert_eq!(parse_slash_command("/img cat.png").unwrap().command, SlashCommand::Image);
        assert!(parse_slash_command("/unknown").is_none());
    }

    #[test]
    fn help_mentions_every_command() {
        let help = get_help_text();
        for command in SlashCommand::iter() {
            assert!(help.contains(&format!("/{}", command.command())));
        }
    }
}
