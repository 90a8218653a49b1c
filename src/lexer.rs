use std::fmt;
use std::io::BufRead;
use std::vec;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, trace, warn};

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(num) => write!(f, "number {}", num),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

lazy_static! {
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap();
}

/// convert the digits-and-dots text of a number literal, keeping the longest
/// valid decimal prefix the way `strtod` does (`1.2.3` is 1.2, `.` is 0)
fn parse_number(text: &str) -> f64 {
    let prefix = match NUMBER_PREFIX_RE.find(text) {
        Some(m) => m.as_str(),
        None => "",
    };
    if prefix.len() != text.len() {
        warn!("malformed number literal {:?}, reading it as {:?}", text, prefix);
    }
    prefix.parse().unwrap_or(0.0)
}

/// Scans one token at a time from a character stream.
///
/// Once the stream runs dry the lexer keeps answering [`Token::Eof`], even if
/// the underlying iterator would hand out more characters later.
pub struct Lexer<I> {
    chars: I,
    last_char: Option<char>,
    line: usize,
    token_line: usize,
}

pub type SourceLexer = Lexer<vec::IntoIter<char>>;

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(chars: I) -> Self {
        Self {
            chars,
            // a pending blank so the first call pulls the first real character
            last_char: Some(' '),
            line: 1,
            token_line: 1,
        }
    }

    /// line the most recently returned token started on
    pub fn token_line(&self) -> usize {
        self.token_line
    }

    fn bump(&mut self) {
        match self.last_char {
            None => return,
            Some('\n') => self.line += 1,
            Some(_) => (),
        }
        self.last_char = self.chars.next();
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.last_char {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.bump();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.last_char {
            if c == '\n' || c == '\r' {
                break;
            }
            self.bump();
        }
    }

    fn lex_word(&mut self, first: char) -> Token {
        let mut word = String::new();
        word.push(first);
        self.bump();
        while let Some(c) = self.last_char {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            word.push(c);
            self.bump();
        }

        match word.as_str() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            _ => Token::Ident(word),
        }
    }

    fn lex_number(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        self.bump();
        while let Some(c) = self.last_char {
            if !(c.is_ascii_digit() || c == '.') {
                break;
            }
            text.push(c);
            self.bump();
        }

        Token::Number(parse_number(&text))
    }

    pub fn next_token(&mut self) -> Token {
        let token = loop {
            self.skip_whitespace();
            self.token_line = self.line;

            let c = match self.last_char {
                Some(c) => c,
                None => break Token::Eof,
            };

            if c.is_ascii_alphabetic() {
                break self.lex_word(c);
            } else if c.is_ascii_digit() || c == '.' {
                break self.lex_number(c);
            } else if c == '#' {
                self.skip_comment();
            } else {
                self.bump();
                break Token::Char(c);
            }
        };

        trace!(line = self.token_line, "lexed {}", token);
        token
    }
}

impl SourceLexer {
    pub fn from_source(source: &str) -> Self {
        Lexer::new(source.chars().collect::<Vec<_>>().into_iter())
    }
}

impl<R: BufRead> Lexer<ReaderChars<R>> {
    pub fn from_reader(reader: R) -> Self {
        Lexer::new(ReaderChars::new(reader))
    }
}

/// Characters of a buffered reader, pulled a line at a time so an interactive
/// prompt can be shown before the read blocks.
pub struct ReaderChars<R> {
    reader: R,
    line: String,
    pending: vec::IntoIter<char>,
    done: bool,
}

impl<R: BufRead> ReaderChars<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            pending: Vec::new().into_iter(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for ReaderChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.pending.next() {
                return Some(c);
            }
            if self.done {
                return None;
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => self.pending = self.line.chars().collect::<Vec<_>>().into_iter(),
                Err(e) => {
                    error!("failed to read input: {}", e);
                    self.done = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex_all(input: &str) -> Vec<Token> {
        let mut lexer = SourceLexer::from_source(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            if token == Token::Eof {
                return tokens;
            }
            tokens.push(token);
        }
    }

    #[test]
    fn lex_works() {
        let tokenized = vec![
            Token::Def,
            Token::Ident("add".to_string()),
            Token::Char('('),
            Token::Ident("x".to_string()),
            Token::Ident("y2".to_string()),
            Token::Char(')'),
            Token::Ident("x".to_string()),
            Token::Char('+'),
            Token::Number(1.5),
            Token::Char(';'),
        ];
        assert_eq!(lex_all("def add(x y2)\n  x+1.5;"), tokenized);
    }

    #[test]
    fn keywords_need_whole_word() {
        assert_eq!(
            lex_all("extern externs define"),
            vec![
                Token::Extern,
                Token::Ident("externs".to_string()),
                Token::Ident("define".to_string()),
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            lex_all("# somebody \na # trailing\r\nb"),
            vec![Token::Ident("a".to_string()), Token::Ident("b".to_string())]
        );
        assert_eq!(lex_all("1 # no newline"), vec![Token::Number(1.0)]);
    }

    #[test]
    fn malformed_numbers_keep_valid_prefix() {
        assert_eq!(
            lex_all("1.2.3 . 4."),
            vec![Token::Number(1.2), Token::Number(0.0), Token::Number(4.0)]
        );
    }

    #[test]
    fn other_characters_are_single_tokens() {
        assert_eq!(
            lex_all("(<,>)\t_"),
            vec![
                Token::Char('('),
                Token::Char('<'),
                Token::Char(','),
                Token::Char('>'),
                Token::Char(')'),
                Token::Char('_'),
            ]
        );
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = SourceLexer::from_source("x");
        assert_eq!(lexer.next_token(), Token::Ident("x".to_string()));
        for _ in 0..3 {
            assert_eq!(lexer.next_token(), Token::Eof);
        }
    }

    #[test]
    fn tracks_token_lines() {
        let mut lexer = SourceLexer::from_source("a\n\n  b # c\nd");
        lexer.next_token();
        assert_eq!(lexer.token_line(), 1);
        lexer.next_token();
        assert_eq!(lexer.token_line(), 3);
        lexer.next_token();
        assert_eq!(lexer.token_line(), 4);
    }

    #[test]
    fn reads_from_buffered_reader() {
        let mut lexer = Lexer::from_reader("foo(1)\n;".as_bytes());
        assert_eq!(lexer.next_token(), Token::Ident("foo".to_string()));
        assert_eq!(lexer.next_token(), Token::Char('('));
        assert_eq!(lexer.next_token(), Token::Number(1.0));
        assert_eq!(lexer.next_token(), Token::Char(')'));
        assert_eq!(lexer.next_token(), Token::Char(';'));
        assert_eq!(lexer.token_line(), 2);
        assert_eq!(lexer.next_token(), Token::Eof);
    }
}
