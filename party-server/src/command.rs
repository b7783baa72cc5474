/// Command parsing for `!party` chat messages
use std::fmt;

use party_core::{ApplicationId, PartyId, UserId};

pub const COMMAND_PREFIX: &str = "!party";

/// A parsed `!party` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyCommand {
    /// Start a draft: `create <max> <title> [| <description>]`
    Create {
        max_members: u32,
        title: String,
        description: Option<String>,
    },
    /// `req add <name> [| <description>]`
    AddRequirement {
        name: String,
        description: Option<String>,
    },
    /// `req pop`
    RemoveRequirement,
    /// Show the caller's current draft
    ShowDraft,
    Publish,
    /// Throw the draft away
    Cancel,
    Join(PartyId),
    /// `apply <party> <Name>: <answer> | <Name>: <answer> ...`
    Apply {
        party: PartyId,
        responses: Vec<(String, String)>,
    },
    /// Requirements an applicant must answer
    Form(PartyId),
    Approve(ApplicationId),
    Reject(ApplicationId),
    Leave(PartyId),
    Close(PartyId),
    Delete(PartyId),
    Kick {
        party: PartyId,
        target: UserId,
    },
    Message {
        party: PartyId,
        body: String,
    },
    /// The surface reports where it posted the party card
    Posted {
        party: PartyId,
        message_id: String,
    },
    Mine,
    Pending,
    Show(PartyId),
}

/// Result of parsing a chat message for party commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// The message is not addressed to the bot
    NoMention,
    /// The bot was addressed but the command word is unknown
    UnrecognizedCommand { attempted: String },
    /// The command word is known but its arguments don't fit
    Malformed {
        command: &'static str,
        usage: &'static str,
    },
    Command(PartyCommand),
}

impl fmt::Display for PartyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyCommand::Create {
                max_members,
                title,
                description,
            } => {
                write!(f, "create {} {}", max_members, title)?;
                if let Some(description) = description {
                    write!(f, " | {}", description)?;
                }
                Ok(())
            }
            PartyCommand::AddRequirement { name, description } => {
                write!(f, "req add {}", name)?;
                if let Some(description) = description {
                    write!(f, " | {}", description)?;
                }
                Ok(())
            }
            PartyCommand::RemoveRequirement => write!(f, "req pop"),
            PartyCommand::ShowDraft => write!(f, "draft"),
            PartyCommand::Publish => write!(f, "publish"),
            PartyCommand::Cancel => write!(f, "cancel"),
            PartyCommand::Join(party) => write!(f, "join {}", party),
            PartyCommand::Apply { party, responses } => {
                write!(f, "apply {}", party)?;
                for (i, (name, answer)) in responses.iter().enumerate() {
                    let sep = if i == 0 { " " } else { " | " };
                    write!(f, "{}{}: {}", sep, name, answer)?;
                }
                Ok(())
            }
            PartyCommand::Form(party) => write!(f, "form {}", party),
            PartyCommand::Approve(app) => write!(f, "approve {}", app),
            PartyCommand::Reject(app) => write!(f, "reject {}", app),
            PartyCommand::Leave(party) => write!(f, "leave {}", party),
            PartyCommand::Close(party) => write!(f, "close {}", party),
            PartyCommand::Delete(party) => write!(f, "delete {}", party),
            PartyCommand::Kick { party, target } => write!(f, "kick {} {}", party, target),
            PartyCommand::Message { party, body } => write!(f, "message {} {}", party, body),
            PartyCommand::Posted { party, message_id } => {
                write!(f, "posted {} {}", party, message_id)
            }
            PartyCommand::Mine => write!(f, "mine"),
            PartyCommand::Pending => write!(f, "pending"),
            PartyCommand::Show(party) => write!(f, "show {}", party),
        }
    }
}

/// Split off the first whitespace-delimited word.
fn next_word(s: &str) -> (&str, &str) {
    match s.split_once(|c: char| c.is_whitespace()) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

/// `text [| more]` into the text and an optional non-empty remainder.
fn split_description(s: &str) -> (String, Option<String>) {
    match s.split_once('|') {
        Some((head, tail)) => {
            let tail = tail.trim();
            (
                head.trim().to_string(),
                (!tail.is_empty()).then(|| tail.to_string()),
            )
        }
        None => (s.trim().to_string(), None),
    }
}

fn parse_responses(s: &str) -> Option<Vec<(String, String)>> {
    if s.trim().is_empty() {
        return Some(vec![]);
    }
    s.split('|')
        .map(|pair| {
            let (name, answer) = pair.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), answer.trim().to_string()))
        })
        .collect()
}

fn malformed(command: &'static str, usage: &'static str) -> ParseResult {
    ParseResult::Malformed { command, usage }
}

/// Parse the arguments after a known command word.
fn parse_arguments(word: &str, args: &str) -> Option<ParseResult> {
    let lower = word.to_ascii_lowercase();
    let (first, rest) = next_word(args);

    let single_party = |constructor: fn(PartyId) -> PartyCommand,
                        command: &'static str,
                        usage: &'static str| {
        if first.is_empty() || !rest.is_empty() {
            malformed(command, usage)
        } else {
            ParseResult::Command(constructor(PartyId::from(first)))
        }
    };

    let result = match lower.as_str() {
        "create" => {
            const USAGE: &str = "!party create <max members> <title> [| <description>]";
            let Ok(max_members) = first.parse::<u32>() else {
                return Some(malformed("create", USAGE));
            };
            let (title, description) = split_description(rest);
            if title.is_empty() {
                return Some(malformed("create", USAGE));
            }
            ParseResult::Command(PartyCommand::Create {
                max_members,
                title,
                description,
            })
        }
        "req" => {
            const USAGE: &str = "!party req add <name> [| <description>] or !party req pop";
            if first.eq_ignore_ascii_case("pop") && rest.is_empty() {
                ParseResult::Command(PartyCommand::RemoveRequirement)
            } else if first.eq_ignore_ascii_case("add") {
                let (name, description) = split_description(rest);
                if name.is_empty() {
                    return Some(malformed("req", USAGE));
                }
                ParseResult::Command(PartyCommand::AddRequirement { name, description })
            } else {
                malformed("req", USAGE)
            }
        }
        "draft" => ParseResult::Command(PartyCommand::ShowDraft),
        "publish" => ParseResult::Command(PartyCommand::Publish),
        "cancel" => ParseResult::Command(PartyCommand::Cancel),
        "mine" => ParseResult::Command(PartyCommand::Mine),
        "pending" => ParseResult::Command(PartyCommand::Pending),
        "join" => single_party(PartyCommand::Join, "join", "!party join <party id>"),
        "form" => single_party(PartyCommand::Form, "form", "!party form <party id>"),
        "leave" => single_party(PartyCommand::Leave, "leave", "!party leave <party id>"),
        "close" => single_party(PartyCommand::Close, "close", "!party close <party id>"),
        "delete" => single_party(PartyCommand::Delete, "delete", "!party delete <party id>"),
        "show" => single_party(PartyCommand::Show, "show", "!party show <party id>"),
        "approve" | "reject" => {
            let command = if lower == "approve" { "approve" } else { "reject" };
            if first.is_empty() || !rest.is_empty() {
                return Some(malformed(command, "!party approve|reject <application id>"));
            }
            let id = ApplicationId::from(first);
            ParseResult::Command(if command == "approve" {
                PartyCommand::Approve(id)
            } else {
                PartyCommand::Reject(id)
            })
        }
        "apply" => {
            const USAGE: &str = "!party apply <party id> <Requirement>: <answer> | ...";
            if first.is_empty() {
                return Some(malformed("apply", USAGE));
            }
            match parse_responses(rest) {
                Some(responses) => ParseResult::Command(PartyCommand::Apply {
                    party: PartyId::from(first),
                    responses,
                }),
                None => malformed("apply", USAGE),
            }
        }
        "kick" => {
            let (target, extra) = next_word(rest);
            if first.is_empty() || target.is_empty() || !extra.is_empty() {
                return Some(malformed("kick", "!party kick <party id> <user id>"));
            }
            ParseResult::Command(PartyCommand::Kick {
                party: PartyId::from(first),
                target: UserId::from(target),
            })
        }
        "message" => {
            if first.is_empty() || rest.trim().is_empty() {
                return Some(malformed("message", "!party message <party id> <text>"));
            }
            ParseResult::Command(PartyCommand::Message {
                party: PartyId::from(first),
                body: rest.trim().to_string(),
            })
        }
        "posted" => {
            let (message_id, extra) = next_word(rest);
            if first.is_empty() || message_id.is_empty() || !extra.is_empty() {
                return Some(malformed("posted", "!party posted <party id> <message id>"));
            }
            ParseResult::Command(PartyCommand::Posted {
                party: PartyId::from(first),
                message_id: message_id.to_string(),
            })
        }
        _ => return None,
    };
    Some(result)
}

/// Parse a chat message for a `!party` command.
///
/// The command must start a line. Only the first such line is considered,
/// even if it is unrecognized, so a message never runs two commands.
/// Command words are case-insensitive; arguments keep their case.
pub fn parse_message(body: &str) -> ParseResult {
    for line in body.lines() {
        let trimmed = line.trim();

        // get() rather than slicing so multi-byte text can't panic
        let Some(prefix) = trimmed.get(..COMMAND_PREFIX.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(COMMAND_PREFIX) {
            continue;
        }

        let rest = &trimmed[COMMAND_PREFIX.len()..];
        if rest.is_empty() {
            return ParseResult::UnrecognizedCommand {
                attempted: String::new(),
            };
        }
        // "!partyjoin" is not a command
        if !rest.starts_with(|c: char| c.is_whitespace()) {
            continue;
        }

        let (word, args) = next_word(rest.trim());
        return parse_arguments(word, args).unwrap_or_else(|| ParseResult::UnrecognizedCommand {
            attempted: word.to_string(),
        });
    }

    ParseResult::NoMention
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(body: &str) -> PartyCommand {
        match parse_message(body) {
            ParseResult::Command(command) => command,
            other => panic!("expected a command from {:?}, got {:?}", body, other),
        }
    }

    #[test]
    fn test_parse_create() {
        assert_eq!(
            command("!party create 4 Ranked night | Chill games, mics on"),
            PartyCommand::Create {
                max_members: 4,
                title: "Ranked night".to_string(),
                description: Some("Chill games, mics on".to_string()),
            }
        );
        assert_eq!(
            command("!party create 2 Duo queue"),
            PartyCommand::Create {
                max_members: 2,
                title: "Duo queue".to_string(),
                description: None,
            }
        );
    }

    #[test]
    fn test_create_needs_number_and_title() {
        assert!(matches!(
            parse_message("!party create four Ranked"),
            ParseResult::Malformed { command: "create", .. }
        ));
        assert!(matches!(
            parse_message("!party create 4"),
            ParseResult::Malformed { command: "create", .. }
        ));
        assert!(matches!(
            parse_message("!party create -1 Ranked"),
            ParseResult::Malformed { command: "create", .. }
        ));
    }

    #[test]
    fn test_parse_requirements() {
        assert_eq!(
            command("!party req add Rank | Diamond+"),
            PartyCommand::AddRequirement {
                name: "Rank".to_string(),
                description: Some("Diamond+".to_string()),
            }
        );
        assert_eq!(
            command("!party req add Timezone |"),
            PartyCommand::AddRequirement {
                name: "Timezone".to_string(),
                description: None,
            }
        );
        assert_eq!(command("!party REQ POP"), PartyCommand::RemoveRequirement);
        assert!(matches!(
            parse_message("!party req add"),
            ParseResult::Malformed { command: "req", .. }
        ));
        assert!(matches!(
            parse_message("!party req shuffle"),
            ParseResult::Malformed { command: "req", .. }
        ));
    }

    #[test]
    fn test_parse_apply() {
        assert_eq!(
            command("!party apply p1 Rank: Gold | Timezone: UTC+1"),
            PartyCommand::Apply {
                party: PartyId::from("p1"),
                responses: vec![
                    ("Rank".to_string(), "Gold".to_string()),
                    ("Timezone".to_string(), "UTC+1".to_string()),
                ],
            }
        );
        // Answers may contain colons
        assert_eq!(
            command("!party apply p1 Availability: 20:00-23:00"),
            PartyCommand::Apply {
                party: PartyId::from("p1"),
                responses: vec![("Availability".to_string(), "20:00-23:00".to_string())],
            }
        );
        assert!(matches!(
            parse_message("!party apply p1 just some text"),
            ParseResult::Malformed { command: "apply", .. }
        ));
    }

    #[test]
    fn test_parse_id_commands() {
        assert_eq!(command("!party join p1"), PartyCommand::Join(PartyId::from("p1")));
        assert_eq!(command("!party show p1"), PartyCommand::Show(PartyId::from("p1")));
        assert_eq!(command("!party leave p1"), PartyCommand::Leave(PartyId::from("p1")));
        assert_eq!(
            command("!party approve app-1"),
            PartyCommand::Approve(ApplicationId::from("app-1"))
        );
        assert_eq!(
            command("!party reject app-1"),
            PartyCommand::Reject(ApplicationId::from("app-1"))
        );
        assert_eq!(
            command("!party kick p1 u2"),
            PartyCommand::Kick {
                party: PartyId::from("p1"),
                target: UserId::from("u2"),
            }
        );
        assert!(matches!(
            parse_message("!party join"),
            ParseResult::Malformed { command: "join", .. }
        ));
        assert!(matches!(
            parse_message("!party join p1 p2"),
            ParseResult::Malformed { command: "join", .. }
        ));
    }

    #[test]
    fn test_parse_message_keeps_body() {
        assert_eq!(
            command("!party message p1 Lobby opens in 5, bring snacks"),
            PartyCommand::Message {
                party: PartyId::from("p1"),
                body: "Lobby opens in 5, bring snacks".to_string(),
            }
        );
        assert!(matches!(
            parse_message("!party message p1"),
            ParseResult::Malformed { command: "message", .. }
        ));
    }

    #[test]
    fn test_no_mention() {
        assert_eq!(parse_message("anyone up for ranked?"), ParseResult::NoMention);
        assert_eq!(parse_message(""), ParseResult::NoMention);
        assert_eq!(parse_message("see !party join p1"), ParseResult::NoMention);
        assert_eq!(parse_message("!partyjoin p1"), ParseResult::NoMention);
        // Non-ASCII text shorter than the prefix must not panic
        assert_eq!(parse_message("日本"), ParseResult::NoMention);
    }

    #[test]
    fn test_unrecognized_command() {
        assert_eq!(
            parse_message("!party dance"),
            ParseResult::UnrecognizedCommand {
                attempted: "dance".to_string()
            }
        );
        assert_eq!(
            parse_message("!party"),
            ParseResult::UnrecognizedCommand {
                attempted: String::new()
            }
        );
    }

    #[test]
    fn test_first_command_line_wins() {
        assert_eq!(
            command("hey all\n  !Party publish  \n!party cancel"),
            PartyCommand::Publish
        );
        assert_eq!(
            parse_message("!party dance\n!party publish"),
            ParseResult::UnrecognizedCommand {
                attempted: "dance".to_string()
            }
        );
    }

    #[test]
    fn test_display_parses_back() {
        let commands = [
            "create 4 Ranked night | Chill",
            "req add Rank | Diamond+",
            "req pop",
            "apply p1 Rank: Gold | Timezone: EST",
            "kick p1 u2",
            "message p1 see you there",
            "posted p1 msg-9",
            "pending",
        ];
        for text in commands {
            let parsed = command(&format!("{} {}", COMMAND_PREFIX, text));
            assert_eq!(parsed.to_string(), text);
        }
    }
}
