//! Console command parsing

use poker_core::{CardValue, Estimate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a card, pick one of 0 1 2 3 5 8 13 21 34 55 89 ?")]
    BadCard(String),
}

/// What `finalize` should record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalEstimate {
    /// Use the revealed consensus value, if there is one
    Consensus,
    /// Complete the story without an estimate
    Nothing,
    Given(Estimate),
}

/// One line of console input
///
/// Story indices are 1-based, as listed by `show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Story {
        title: String,
        description: Option<String>,
    },
    Select(usize),
    Start(Option<usize>),
    Vote(CardValue),
    Reveal,
    Reset,
    Finalize(FinalEstimate),
    TimerOn(Option<u32>),
    TimerOff,
    TimerStart,
    Show,
    Link,
    Help,
    Quit,
}

/// Parse a console line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "story" | "add" => parse_story(rest)?,
        "select" => Command::Select(index(rest, "select <n>")?),
        "start" => {
            if rest.is_empty() {
                Command::Start(None)
            } else {
                Command::Start(Some(index(rest, "start [n]")?))
            }
        }
        "vote" => {
            if rest.is_empty() {
                return Err(ParseError::Usage("vote <card>"));
            }
            Command::Vote(rest.parse().map_err(|_| ParseError::BadCard(rest.to_string()))?)
        }
        "reveal" => Command::Reveal,
        "reset" => Command::Reset,
        "finalize" | "done" => Command::Finalize(match rest {
            "" => FinalEstimate::Consensus,
            "-" => FinalEstimate::Nothing,
            text => Estimate::parse_opt(text).map_or(FinalEstimate::Nothing, FinalEstimate::Given),
        }),
        "timer" => parse_timer(rest)?,
        "show" | "ls" => Command::Show,
        "link" | "invite" => Command::Link,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_story(rest: &str) -> Result<Command, ParseError> {
    let (title, description) = match rest.split_once('|') {
        Some((title, description)) => (title.trim(), Some(description.trim())),
        None => (rest, None),
    };
    if title.is_empty() {
        return Err(ParseError::Usage("story <title> [| description]"));
    }
    Ok(Command::Story {
        title: title.to_string(),
        description: description
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

fn parse_timer(rest: &str) -> Result<Command, ParseError> {
    const USAGE: &str = "timer on [secs] | timer off | timer start";

    let mut words = rest.split_whitespace();
    let command = match words.next() {
        Some("on") => match words.next() {
            Some(secs) => Command::TimerOn(Some(secs.parse().map_err(|_| ParseError::Usage(USAGE))?)),
            None => Command::TimerOn(None),
        },
        Some("off") => Command::TimerOff,
        Some("start") => Command::TimerStart,
        _ => return Err(ParseError::Usage(USAGE)),
    };
    if words.next().is_some() {
        return Err(ParseError::Usage(USAGE));
    }
    Ok(command)
}

fn index(s: &str, usage: &'static str) -> Result<usize, ParseError> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::Usage(usage)),
    }
}
