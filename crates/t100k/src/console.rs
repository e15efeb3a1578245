//! Line commands of the interactive console

use t100k_core::{CoreError, OutputItem};

pub const HELP: &str = "\
Commands:
  <controllerId> <universeId> <channel> <colorHex>   set one pixel, e.g. `0 3 10 #FF0000`
  help                                                show this text
  quit | exit                                         stop output and leave";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set(OutputItem),
    Help,
    Quit,
    Empty,
}

pub fn parse(line: &str) -> Result<Command, CoreError> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => Ok(Command::Empty),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => line.parse().map(Command::Set),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use t100k_core::Color;

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse("0 3 10 #FF0000").unwrap(),
            Command::Set(OutputItem::new(0, 3, 10, Color::new(0xFF, 0, 0)))
        );
        assert_eq!(
            parse("  12   7 1023 00ff00 \n").unwrap(),
            Command::Set(OutputItem::new(12, 7, 1023, Color::new(0, 0xFF, 0)))
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse("").unwrap(), Command::Empty);
        assert_eq!(parse("   \t").unwrap(), Command::Empty);
        assert_eq!(parse("help").unwrap(), Command::Help);
        assert_eq!(parse("QUIT").unwrap(), Command::Quit);
        assert_eq!(parse("exit\n").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("0 3 10").is_err());
        assert!(parse("0 3 10 #FF00").is_err());
        assert!(parse("300 0 0 #000000").is_err());
        assert!(parse("hello").is_err());
    }
}
