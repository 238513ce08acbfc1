//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,
    #[display(":=")]
    Assign,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("|")]
    Pipe,
    #[display("^")]
    Caret,
    #[display("&")]
    Amp,
    #[display("~")]
    Tilde,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("==")]
    EqEq,
    #[display("!=")]
    Ne,
    #[display("$return")]
    KwReturn,
    #[display("$if")]
    KwIf,
    #[display("$else")]
    KwElse,
    #[display("$while")]
    KwWhile,
    #[display("$for")]
    KwFor,
    #[display("$in")]
    KwIn,
    #[display("$range")]
    KwRange,
    #[display("$def")]
    KwDef,
    #[display("$and")]
    KwAnd,
    #[display("$or")]
    KwOr,
    #[display("$break")]
    KwBreak,
    #[display("$continue")]
    KwContinue,
}

#[derive(Debug, thiserror::Error)]
#[error("lexer error: unexpected character {ch:?} at {pos}")]
pub struct LexError {
    pos: usize,
    ch: char,
}

/// Fixed set of keywords, checked against an already-lexed identifier.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("return", TokenKind::KwReturn),
    ("if", TokenKind::KwIf),
    ("else", TokenKind::KwElse),
    ("while", TokenKind::KwWhile),
    ("for", TokenKind::KwFor),
    ("in", TokenKind::KwIn),
    ("range", TokenKind::KwRange),
    ("def", TokenKind::KwDef),
    ("and", TokenKind::KwAnd),
    ("or", TokenKind::KwOr),
    ("break", TokenKind::KwBreak),
    ("continue", TokenKind::KwContinue),
];

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    whitespace: Regex,
    // Tried in order; longer operators (`:=`, `<=`, `==`, ...) come before
    // their single-character prefixes so matching doesn't need backtracking.
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;
        let matchers = vec![
            (r"\A:=", Assign),
            (r"\A<=", Le),
            (r"\A>=", Ge),
            (r"\A==", EqEq),
            (r"\A!=", Ne),
            (r"\A<<", Shl),
            (r"\A>>", Shr),
            (r"\A;", Semi),
            (r"\A,", Comma),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Star),
            (r"\A/", Slash),
            (r"\A%", Percent),
            (r"\A\|", Pipe),
            (r"\A\^", Caret),
            (r"\A&", Amp),
            (r"\A~", Tilde),
            (r"\A<", Lt),
            (r"\A>", Gt),
            (r"\A[0-9]+", Num),
            (r"\A[A-Za-z_][A-Za-z0-9_]*", Id),
        ]
        .into_iter()
        .map(|(pattern, kind)| (Regex::new(pattern).unwrap(), kind))
        .collect();

        Lexer {
            input,
            pos: 0,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://.*))*").unwrap(),
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.pos += m.end()
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }

        let rest = &self.input[self.pos..];
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let text = &rest[..m.end()];
                let kind = if *kind == TokenKind::Id {
                    KEYWORDS
                        .iter()
                        .find(|(kw, _)| *kw == text)
                        .map(|(_, kind)| *kind)
                        .unwrap_or(TokenKind::Id)
                } else {
                    *kind
                };
                self.pos += m.end();
                return Ok(Some(Token { kind, text }));
            }
        }

        let ch = rest.chars().next().unwrap();
        Err(LexError { pos: self.pos, ch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = vec![];
        while let Some(tok) = lexer.next().unwrap() {
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_assignment() {
        assert_eq!(
            kinds("x := 1 + 2;"),
            vec![
                TokenKind::Id,
                TokenKind::Assign,
                TokenKind::Num,
                TokenKind::Plus,
                TokenKind::Num,
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn keywords_take_priority_over_identifiers() {
        assert_eq!(kinds("if"), vec![TokenKind::KwIf]);
        assert_eq!(kinds("iffy"), vec![TokenKind::Id]);
    }

    #[test]
    fn multi_char_operators_do_not_split() {
        assert_eq!(
            kinds("a <= b"),
            vec![TokenKind::Id, TokenKind::Le, TokenKind::Id]
        );
        assert_eq!(
            kinds("a < b"),
            vec![TokenKind::Id, TokenKind::Lt, TokenKind::Id]
        );
    }

    #[test]
    fn skips_comments_and_whitespace() {
        assert_eq!(kinds("  // hi\n  x"), vec![TokenKind::Id]);
    }

    #[test]
    fn reports_unexpected_character() {
        let mut lexer = Lexer::new("@");
        assert!(lexer.next().is_err());
    }
}
