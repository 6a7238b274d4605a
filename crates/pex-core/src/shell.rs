//! Restricted shell grammar: literal words piped left to right.
//!
//! Quoting and escaping follow POSIX `sh`. Anything that would need a real
//! shell (redirects, expansions, lists, subshells, control flow) is rejected
//! with a message naming the construct.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use tracing::debug;

/// Reserved words rejected in command position.
const KEYWORDS: &[&str] = &["if", "for", "while", "until", "case"];

/// One command of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Argument vector; the first element is the program name.
    pub argv: Vec<String>,
    /// The input text this command was parsed from.
    pub raw: String,
}

impl Command {
    /// Returns true for the placeholder command that has no words yet.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    pub fn name(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Argument-vector equality. Raw text (spacing, quoting style) is ignored.
    pub fn same_argv(&self, other: &Command) -> bool {
        self.argv == other.argv
    }
}

/// Rejected pipeline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn at(offset: usize, message: &str) -> Self {
        Self::new(format!("1:{}: {message}", offset + 1))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses `text` into commands and the byte offsets of the `|` separating them.
///
/// A trailing unescaped `|` yields one extra empty command (whose raw text is
/// the trailing blanks) and that pipe's offset, so callers can show a
/// placeholder for the command being typed.
///
/// # Errors
/// Returns a [`ParseError`] for syntax errors and unsupported constructs.
pub fn parse(text: &str) -> Result<(Vec<Command>, Vec<usize>), ParseError> {
    debug!(raw_input = text, "shell::parse");

    let trimmed = text.trim_end_matches(char::is_whitespace);
    let trailing_pipe = (trimmed.ends_with('|')
        && !trimmed.ends_with("||")
        && !is_escaped(trimmed, trimmed.len() - 1))
    .then(|| trimmed.len() - 1);

    let body = trailing_pipe.map_or(text, |pipe| &text[..pipe]);
    let (mut commands, mut pipes) = Parser::new(body).run()?;

    if let Some(pipe) = trailing_pipe {
        if commands.is_empty() {
            return Err(ParseError::at(pipe, "missing statement before |"));
        }
        commands.push(Command {
            argv: Vec::new(),
            raw: text[trimmed.len()..].to_string(),
        });
        pipes.push(pipe);
    }

    Ok((commands, pipes))
}

/// Returns true if the byte at `pos` is preceded by an odd run of backslashes.
fn is_escaped(text: &str, pos: usize) -> bool {
    let run = text.as_bytes()[..pos]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count();
    run % 2 == 1
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A word being accumulated.
struct Word {
    text: String,
    start: usize,
    quoted: bool,
}

struct Parser<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
    commands: Vec<Command>,
    pipes: Vec<usize>,
    argv: Vec<String>,
    word: Option<Word>,
    /// Byte range of the current command's words.
    cmd_start: usize,
    cmd_end: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
            commands: Vec::new(),
            pipes: Vec::new(),
            argv: Vec::new(),
            word: None,
            cmd_start: 0,
            cmd_end: 0,
        }
    }

    fn run(mut self) -> Result<(Vec<Command>, Vec<usize>), ParseError> {
        while let Some((i, c)) = self.chars.next() {
            match c {
                ' ' | '\t' | '\n' => self.finish_word(i)?,
                '\'' => self.single_quoted(i)?,
                '"' => self.double_quoted(i)?,
                '\\' => match self.chars.next() {
                    Some((_, '\n')) => {}
                    Some((_, escaped)) => {
                        self.word_at(i).quoted = true;
                        self.push(escaped);
                    }
                    None => self.push_at(i, '\\'),
                },
                '|' => self.pipe(i)?,
                '&' => {
                    let message = if self.peek_is('&') {
                        "&& is not supported"
                    } else {
                        "background commands are not supported"
                    };
                    return Err(ParseError::new(message));
                }
                ';' => return Err(ParseError::new("command lists are not supported")),
                '<' | '>' => return Err(ParseError::new("redirects are not supported")),
                '$' => return Err(ParseError::new("parameter expansion is not supported")),
                '`' => return Err(ParseError::new("command substitution is not supported")),
                '(' | ')' => return Err(ParseError::new("subshells are not supported")),
                '#' if self.word.is_none() => {
                    return Err(ParseError::new("comments are not supported"));
                }
                '=' if self.is_assignment() => {
                    return Err(ParseError::new("variables are not supported"));
                }
                _ => self.push_at(i, c),
            }
        }

        self.finish_word(self.text.len())?;
        if self.argv.is_empty() {
            if let Some(&last) = self.pipes.last() {
                return Err(ParseError::at(last, "| must be followed by a statement"));
            }
        } else {
            self.finish_command();
        }
        Ok((self.commands, self.pipes))
    }

    fn peek_is(&mut self, expected: char) -> bool {
        self.chars.peek().is_some_and(|&(_, c)| c == expected)
    }

    fn word_at(&mut self, start: usize) -> &mut Word {
        self.word.get_or_insert_with(|| Word {
            text: String::new(),
            start,
            quoted: false,
        })
    }

    fn push_at(&mut self, start: usize, c: char) {
        self.word_at(start).text.push(c);
    }

    fn push(&mut self, c: char) {
        if let Some(word) = self.word.as_mut() {
            word.text.push(c);
        }
    }

    /// An unquoted `NAME=` prefix on the first word of a command.
    fn is_assignment(&self) -> bool {
        self.argv.is_empty()
            && self
                .word
                .as_ref()
                .is_some_and(|w| !w.quoted && is_name(&w.text))
    }

    fn single_quoted(&mut self, open: usize) -> Result<(), ParseError> {
        self.word_at(open).quoted = true;
        loop {
            match self.chars.next() {
                Some((_, '\'')) => return Ok(()),
                Some((_, c)) => self.push(c),
                None => return Err(ParseError::at(open, "reached EOF without closing quote '")),
            }
        }
    }

    fn double_quoted(&mut self, open: usize) -> Result<(), ParseError> {
        self.word_at(open).quoted = true;
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(()),
                Some((_, '\\')) => match self.chars.peek().map(|&(_, c)| c) {
                    Some(c @ ('\\' | '"' | '$' | '`')) => {
                        self.chars.next();
                        self.push(c);
                    }
                    Some('\n') => {
                        self.chars.next();
                    }
                    _ => self.push('\\'),
                },
                Some((_, '$')) => {
                    return Err(ParseError::new("parameter expansion is not supported"));
                }
                Some((_, '`')) => {
                    return Err(ParseError::new("command substitution is not supported"));
                }
                Some((_, c)) => self.push(c),
                None => return Err(ParseError::at(open, "reached EOF without closing quote \"")),
            }
        }
    }

    fn pipe(&mut self, at: usize) -> Result<(), ParseError> {
        if self.peek_is('|') {
            return Err(ParseError::new("|| is not supported"));
        }
        if self.peek_is('&') {
            return Err(ParseError::new("|& is not supported"));
        }
        self.finish_word(at)?;
        if self.argv.is_empty() {
            return Err(match self.pipes.last() {
                Some(&prev) => ParseError::at(prev, "| must be followed by a statement"),
                None => ParseError::at(at, "| must follow a statement"),
            });
        }
        self.finish_command();
        self.pipes.push(at);
        Ok(())
    }

    fn finish_word(&mut self, end: usize) -> Result<(), ParseError> {
        let Some(word) = self.word.take() else {
            return Ok(());
        };
        if self.argv.is_empty() {
            if !word.quoted && KEYWORDS.contains(&word.text.as_str()) {
                return Err(ParseError::new(format!(
                    "{} clauses are not supported",
                    word.text
                )));
            }
            if !word.quoted && word.text == "!" {
                return Err(ParseError::new("negated commands are not supported"));
            }
            self.cmd_start = word.start;
        }
        self.cmd_end = end;
        self.argv.push(word.text);
        Ok(())
    }

    fn finish_command(&mut self) {
        self.commands.push(Command {
            argv: std::mem::take(&mut self.argv),
            raw: self.text[self.cmd_start..self.cmd_end].to_string(),
        });
    }
}
