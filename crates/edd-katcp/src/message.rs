//! KATCP v5 message model and line codec.
//!
//! A message is one line of text: a sigil (`?` request, `!` reply,
//! `#` inform), a name, an optional message id in square brackets, and
//! space-separated arguments. Arguments escape whitespace and control
//! characters with backslash sequences; the empty argument is `\@`.
//!
//! ```text
//! ?configure[7] {"band":\_"L"}
//! !configure[7] ok
//! #interface-changed
//! ```

use std::fmt;

use crate::error::Error;

// ── MessageKind ──────────────────────────────────────────────────────

/// The three KATCP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Reply,
    Inform,
}

impl MessageKind {
    fn sigil(self) -> char {
        match self {
            Self::Request => '?',
            Self::Reply => '!',
            Self::Inform => '#',
        }
    }

    fn from_sigil(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Request),
            '!' => Some(Self::Reply),
            '#' => Some(Self::Inform),
            _ => None,
        }
    }
}

// ── Message ──────────────────────────────────────────────────────────

/// A single KATCP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub name: String,
    /// Message id used to match replies and informs to their request.
    pub mid: Option<u32>,
    pub arguments: Vec<String>,
}

impl Message {
    pub fn new<I, S>(kind: MessageKind, name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            name: name.into(),
            mid: None,
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn request<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MessageKind::Request, name, arguments)
    }

    pub fn reply<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MessageKind::Reply, name, arguments)
    }

    pub fn inform<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MessageKind::Inform, name, arguments)
    }

    /// Attach a message id.
    pub fn with_mid(mut self, mid: u32) -> Self {
        self.mid = Some(mid);
        self
    }

    /// `true` for a reply whose first argument is `ok`.
    pub fn reply_ok(&self) -> bool {
        self.kind == MessageKind::Reply && self.arguments.first().is_some_and(|a| a == "ok")
    }

    /// Parse one line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut tokens = line.split([' ', '\t']).filter(|t| !t.is_empty());

        let head = tokens
            .next()
            .ok_or_else(|| Error::parse("empty message"))?;

        let mut chars = head.chars();
        let kind = chars
            .next()
            .and_then(MessageKind::from_sigil)
            .ok_or_else(|| Error::parse(format!("bad message type in '{head}'")))?;

        let rest = chars.as_str();
        let (name, mid) = match rest.split_once('[') {
            Some((name, tail)) => {
                let digits = tail
                    .strip_suffix(']')
                    .ok_or_else(|| Error::parse(format!("unterminated message id in '{head}'")))?;
                let mid = digits
                    .parse::<u32>()
                    .map_err(|_| Error::parse(format!("invalid message id '{digits}'")))?;
                (name, Some(mid))
            }
            None => (rest, None),
        };

        if !valid_name(name) {
            return Err(Error::parse(format!("invalid message name '{name}'")));
        }

        let arguments = tokens.map(unescape).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind,
            name: name.to_string(),
            mid,
            arguments,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.name)?;
        if let Some(mid) = self.mid {
            write!(f, "[{mid}]")?;
        }
        for arg in &self.arguments {
            write!(f, " {}", escape(arg))?;
        }
        Ok(())
    }
}

// ── Names ────────────────────────────────────────────────────────────

/// KATCP names start with a letter and continue with letters, digits
/// and dashes. Underscores are accepted as well, since many servers
/// still emit them.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Map a request name to its wire form (`capture_start` → `capture-start`).
pub fn wire_name(name: &str) -> String {
    name.replace('_', "-")
}

// ── Argument escaping ────────────────────────────────────────────────

/// Escape an argument for the wire.
pub fn escape(arg: &str) -> String {
    if arg.is_empty() {
        return "\\@".into();
    }
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\_"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1b' => out.push_str("\\e"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape`].
pub fn unescape(token: &str) -> Result<String, Error> {
    if token == "\\@" {
        return Ok(String::new());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next() {
            Some('\\') => '\\',
            Some('_') => ' ',
            Some('0') => '\0',
            Some('n') => '\n',
            Some('r') => '\r',
            Some('e') => '\x1b',
            Some('t') => '\t',
            Some(other) => return Err(Error::parse(format!("unknown escape '\\{other}'"))),
            None => return Err(Error::parse("trailing backslash")),
        };
        out.push(decoded);
    }
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_request_with_mid() {
        let msg = Message::parse("?configure[7] foo bar").unwrap();
        assert_eq!(msg.kind, MessageKind::Request);
        assert_eq!(msg.name, "configure");
        assert_eq!(msg.mid, Some(7));
        assert_eq!(msg.arguments, vec!["foo", "bar"]);
    }

    #[test]
    fn parse_fail_reply() {
        let msg = Message::parse("!capture-start fail device\\_busy").unwrap();
        assert_eq!(msg.kind, MessageKind::Reply);
        assert_eq!(msg.mid, None);
        assert!(!msg.reply_ok());
        assert_eq!(msg.arguments[1], "device busy");
    }

    #[test]
    fn parse_collapses_repeated_whitespace() {
        let msg = Message::parse("#version-connect  katcp-protocol\t5.0-MI").unwrap();
        assert_eq!(msg.kind, MessageKind::Inform);
        assert_eq!(msg.arguments, vec!["katcp-protocol", "5.0-MI"]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Message::parse("").is_err());
        assert!(Message::parse("configure ok").is_err());
        assert!(Message::parse("!reply[abc] ok").is_err());
        assert!(Message::parse("!reply[3 ok").is_err());
        assert!(Message::parse("?1bad").is_err());
        assert!(Message::parse("!x ok bad\\q").is_err());
    }

    #[test]
    fn display_escapes_arguments() {
        let msg = Message::request("configure", ["{\"band\": \"L\"}", ""]).with_mid(3);
        assert_eq!(msg.to_string(), "?configure[3] {\"band\":\\_\"L\"} \\@");
    }

    #[test]
    fn escaped_arguments_survive_the_wire() {
        let original = Message::reply("help", ["ok", "line\nbreak\ttab\\slash \x1b\r\0"]);
        let parsed = Message::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn reply_ok_requires_reply_kind() {
        assert!(Message::reply("x", ["ok"]).reply_ok());
        assert!(!Message::inform("x", ["ok"]).reply_ok());
        assert!(!Message::reply("x", Vec::<String>::new()).reply_ok());
    }

    #[test]
    fn wire_name_uses_dashes() {
        assert_eq!(wire_name("capture_start"), "capture-start");
        assert_eq!(wire_name("configure"), "configure");
    }
}
