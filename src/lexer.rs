//! Lexical analysis for the command line.
//!
//! The lexer knows about quoting and nothing else: it splits text on separators that
//! appear outside of quotes and turns one command's text into words and redirection
//! operators. It never fails; an unterminated quote simply runs to the end of the input.

/// Represents a token resulting from lexical analysis of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word with its quote delimiters removed.
    Word(Word),
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// Appending output redirection symbol, `>>`.
    RedirectAppend,
}

/// A word as it will be handed to a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Text of the word with quotes stripped.
    pub text: String,
    /// Byte length of the leading part of `text` that was not inside quotes.
    ///
    /// Used by the parser to tell `NAME=value` apart from `"NAME=value"`.
    pub unquoted_prefix: usize,
}

impl Word {
    fn new() -> Self {
        Word {
            text: String::new(),
            unquoted_prefix: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Unquoted,
    Single,
    Double,
}

impl QuoteState {
    /// Advance the state over `ch`. Returns `true` if `ch` was a quote delimiter.
    fn step(&mut self, ch: char) -> bool {
        match (*self, ch) {
            (QuoteState::Unquoted, '\'') => *self = QuoteState::Single,
            (QuoteState::Unquoted, '"') => *self = QuoteState::Double,
            (QuoteState::Single, '\'') | (QuoteState::Double, '"') => *self = QuoteState::Unquoted,
            _ => return false,
        }
        true
    }
}

/// Split `text` on every occurrence of `separator` that is not inside quotes.
///
/// Every piece is trimmed of surrounding whitespace. Splitting an empty string yields
/// a single empty piece, so callers always get at least one element.
pub fn split_unquoted(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut state = QuoteState::Unquoted;
    let mut start = 0;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if state == QuoteState::Unquoted && rest.starts_with(separator) {
            pieces.push(text[start..i].trim().to_string());
            i += separator.len();
            start = i;
            continue;
        }
        let Some(ch) = rest.chars().next() else { break };
        state.step(ch);
        i += ch.len_utf8();
    }
    pieces.push(text[start..].trim().to_string());
    pieces
}

/// Detect a trailing background marker.
///
/// Returns the text without the marker and whether the marker was present. A `&`
/// only counts when it is the last non-whitespace character and not inside quotes.
pub fn strip_background(text: &str) -> (String, bool) {
    let trimmed = text.trim_end();
    if !trimmed.ends_with('&') {
        return (trimmed.trim_start().to_string(), false);
    }

    let mut state = QuoteState::Unquoted;
    for ch in trimmed.chars() {
        state.step(ch);
    }
    if state != QuoteState::Unquoted {
        // The `&` is part of an unterminated quote.
        return (trimmed.trim_start().to_string(), false);
    }

    let without = &trimmed[..trimmed.len() - 1];
    (without.trim().to_string(), true)
}

struct CommandLexer<'a> {
    input: std::iter::Peekable<std::str::Chars<'a>>,
    state: QuoteState,
    current: Option<Word>,
    current_quoted: bool,
    out: Vec<Token>,
}

impl<'a> CommandLexer<'a> {
    fn new(text: &'a str) -> Self {
        CommandLexer {
            input: text.chars().peekable(),
            state: QuoteState::Unquoted,
            current: None,
            current_quoted: false,
            out: Vec::new(),
        }
    }

    fn make_tokens(mut self) -> Vec<Token> {
        while let Some(ch) = self.input.next() {
            match self.state {
                QuoteState::Unquoted => self.handle_unquoted(ch),
                QuoteState::Single | QuoteState::Double => self.handle_quoted(ch),
            }
        }
        self.finish_word();
        self.out
    }

    fn handle_unquoted(&mut self, ch: char) {
        match ch {
            c if c.is_whitespace() => self.finish_word(),
            '<' => {
                self.finish_word();
                self.out.push(Token::RedirectIn);
            }
            '>' => {
                self.finish_word();
                if self.input.peek() == Some(&'>') {
                    self.input.next();
                    self.out.push(Token::RedirectAppend);
                } else {
                    self.out.push(Token::RedirectOut);
                }
            }
            '\'' | '"' => {
                self.current.get_or_insert_with(Word::new);
                self.current_quoted = true;
                self.state.step(ch);
            }
            c => {
                let word = self.current.get_or_insert_with(Word::new);
                word.text.push(c);
                if !self.current_quoted {
                    word.unquoted_prefix = word.text.len();
                }
            }
        }
    }

    fn handle_quoted(&mut self, ch: char) {
        if self.state.step(ch) {
            return;
        }
        self.current.get_or_insert_with(Word::new).text.push(ch);
    }

    fn finish_word(&mut self) {
        if let Some(word) = self.current.take() {
            self.out.push(Token::Word(word));
        }
        self.current_quoted = false;
    }
}

/// Tokenize the text of a single command into words and redirection operators.
///
/// Quoted substrings are kept together with their quotes removed; quoted and unquoted
/// fragments that touch form a single word. `<`, `>` and `>>` outside quotes are
/// operators even without surrounding whitespace (`>out.txt`).
pub fn split_into_tokens(text: &str) -> Vec<Token> {
    CommandLexer::new(text).make_tokens()
}
