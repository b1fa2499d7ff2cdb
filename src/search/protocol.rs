//! Sonic Channel Protocol
//!
//! Line-oriented text protocol spoken by the Sonic search backend. Every command
//! is a single `\n`-terminated line; replies are single lines as well.
//!
//! Only the commands the catalog needs are modelled here:
//! `START`, `PUSH`, `QUERY`, `SUGGEST`, `COUNT`, `FLUSHO`, `PING` and `QUIT`.

use super::client::Namespace;
use crate::error::IndexError;

/// Command size announced by servers that omit `buffer(..)` in their `STARTED` reply.
pub const DEFAULT_BUFFER_SIZE: usize = 20_000;

pub const QUIT: &str = "QUIT";
pub const PING: &str = "PING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Search,
    Ingest,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Search => "search",
            ChannelMode::Ingest => "ingest",
        }
    }
}

/// A parsed server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Connected(String),
    Started { buffer: usize },
    Ok,
    Pong,
    Pending(String),
    Result(u64),
    Event {
        kind: String,
        marker: String,
        items: Vec<String>,
    },
    Ended(String),
    Err(String),
}

pub fn parse_reply(line: &str) -> Result<Reply, IndexError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));

    let reply = match head {
        "CONNECTED" => Reply::Connected(rest.to_string()),
        "STARTED" => Reply::Started {
            buffer: parse_buffer_size(rest).unwrap_or(DEFAULT_BUFFER_SIZE),
        },
        "OK" => Reply::Ok,
        "PONG" => Reply::Pong,
        "PENDING" => Reply::Pending(rest.trim().to_string()),
        "RESULT" => Reply::Result(rest.trim().parse().map_err(|_| {
            IndexError::Unavailable(format!("malformed RESULT reply: {}", line))
        })?),
        "EVENT" => {
            let mut parts = rest.split_whitespace();
            let (Some(kind), Some(marker)) = (parts.next(), parts.next()) else {
                return Err(IndexError::Unavailable(format!(
                    "malformed EVENT reply: {}",
                    line
                )));
            };
            Reply::Event {
                kind: kind.to_string(),
                marker: marker.to_string(),
                items: parts.map(str::to_string).collect(),
            }
        }
        "ENDED" => Reply::Ended(rest.to_string()),
        "ERR" => Reply::Err(rest.to_string()),
        _ => {
            return Err(IndexError::Unavailable(format!(
                "unrecognized reply: {}",
                line
            )));
        }
    };
    Ok(reply)
}

fn parse_buffer_size(started: &str) -> Option<usize> {
    started
        .split_whitespace()
        .find_map(|part| part.strip_prefix("buffer(")?.strip_suffix(')'))
        .and_then(|n| n.parse().ok())
}

/// Collapses whitespace, drops backslashes and escapes quotes so the text fits in a quoted argument.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in sanitize(text).split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        push_escaped(&mut out, word);
    }
    out
}

/// Splits text into pieces whose escaped form is at most `max_bytes` long.
///
/// Breaks on whitespace where possible and inside a word only when the word alone
/// is too long. Pieces are returned unescaped.
pub fn split_text(text: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(4);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_cost = 0usize;

    for word in sanitize(text).split_whitespace() {
        for piece in split_word(word, max_bytes) {
            let cost = escaped_len(&piece);
            let separator = usize::from(!current.is_empty());
            if current_cost + separator + cost > max_bytes {
                chunks.push(std::mem::take(&mut current));
                current_cost = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_cost += 1;
            }
            current.push_str(&piece);
            current_cost += cost;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_word(word: &str, max_bytes: usize) -> Vec<String> {
    if escaped_len(word) <= max_bytes {
        return vec![word.to_string()];
    }
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut cost = 0;
    for c in word.chars() {
        let c_cost = escaped_char_len(c);
        if cost + c_cost > max_bytes {
            pieces.push(std::mem::take(&mut piece));
            cost = 0;
        }
        piece.push(c);
        cost += c_cost;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

fn sanitize(text: &str) -> String {
    text.replace('\\', " ")
}

fn escaped_char_len(c: char) -> usize {
    if c == '"' { 2 } else { c.len_utf8() }
}

fn escaped_len(text: &str) -> usize {
    text.chars().map(escaped_char_len).sum()
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Object ids travel unquoted, so each must be exactly one printable token.
pub fn check_object(object: &str) -> Result<(), IndexError> {
    if object.is_empty()
        || object
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"')
    {
        return Err(IndexError::Rejected(format!(
            "object id {:?} is not a single token",
            object
        )));
    }
    Ok(())
}

fn lang_suffix(ns: &Namespace) -> String {
    match &ns.locale {
        Some(locale) => format!(" LANG({})", locale),
        None => String::new(),
    }
}

pub fn start_command(mode: ChannelMode, password: &str) -> String {
    format!("START {} {}", mode.as_str(), password)
}

/// `chunk` must come from [`split_text`]; it is escaped here.
pub fn push_command(ns: &Namespace, object: &str, chunk: &str) -> String {
    format!(
        "PUSH {} {} {} \"{}\"{}",
        ns.collection,
        ns.bucket,
        object,
        escape_text(chunk),
        lang_suffix(ns)
    )
}

pub fn query_command(ns: &Namespace, text: &str, limit: usize, offset: usize) -> String {
    format!(
        "QUERY {} {} \"{}\" LIMIT({}) OFFSET({}){}",
        ns.collection,
        ns.bucket,
        escape_text(text),
        limit,
        offset,
        lang_suffix(ns)
    )
}

pub fn suggest_command(ns: &Namespace, prefix: &str, limit: usize) -> String {
    format!(
        "SUGGEST {} {} \"{}\" LIMIT({})",
        ns.collection,
        ns.bucket,
        escape_text(prefix),
        limit
    )
}

pub fn count_command(ns: &Namespace, object: &str) -> String {
    format!("COUNT {} {} {}", ns.collection, ns.bucket, object)
}

pub fn flush_object_command(ns: &Namespace, object: &str) -> String {
    format!("FLUSHO {} {} {}", ns.collection, ns.bucket, object)
}

/// Bytes left for text in a PUSH for this object once the command frame is accounted for.
pub fn push_text_budget(ns: &Namespace, object: &str, buffer: usize) -> usize {
    // +1 for the line terminator
    buffer.saturating_sub(push_command(ns, object, "").len() + 1)
}
