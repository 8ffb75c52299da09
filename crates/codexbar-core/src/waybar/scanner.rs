//! Lexical scanner for Waybar's JSON-with-comments configuration dialect.
//!
//! This is not a parser. It only classifies characters so that callers can
//! find structural punctuation (`{ } [ ] : ,`) while skipping over string
//! literals (with backslash escapes) and `//` / `/* */` comments.

/// Scanner state while walking the document character by character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside strings and comments
    Code,
    /// Inside a string literal
    Str,
    /// Directly after a backslash inside a string literal
    Escape,
    /// Saw a `/` in code; next char decides between comment and plain text
    Slash,
    /// Inside a `// ...` comment
    LineComment,
    /// Inside a `/* ... */` comment
    BlockComment,
    /// Saw `*` inside a block comment
    BlockCommentStar,
}

/// Kind of a significant token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A complete string literal, quotes included
    Str,
    /// One of `{ } [ ] : ,`
    Punct(char),
    /// Any other run of code characters (numbers, `true`, `null`, ...)
    Word,
}

/// A significant token with its byte range in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Raw text of a string token without the surrounding quotes (escapes are kept)
    pub fn str_contents<'a>(&self, src: &'a str) -> Option<&'a str> {
        match self.kind {
            TokenKind::Str => src.get(self.start + 1..self.end - 1),
            _ => None,
        }
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }
}

/// Result of scanning a whole document
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    pub tokens: Vec<Token>,
    /// False if the input ended inside a string or block comment
    pub terminated: bool,
}

/// Where a keyed array sits in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLookup {
    /// No `"key": [` in the document
    Missing,
    /// The opener was found but no matching `]` before end of input
    Unclosed { open: usize },
    /// Balanced array
    Found(ArraySpan),
}

/// Byte positions of a balanced array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySpan {
    /// Index of `[`
    pub open: usize,
    /// Index of the matching `]`
    pub close: usize,
    /// End of the last token before `]`, `None` for an empty array
    pub last_value_end: Option<usize>,
}

impl ArraySpan {
    /// Text between the brackets
    pub fn body<'a>(&self, src: &'a str) -> &'a str {
        &src[self.open + 1..self.close]
    }
}

/// Split `src` into significant tokens, dropping whitespace and comments
pub fn tokenize(src: &str) -> Tokens {
    let mut tokens: Vec<Token> = Vec::new();
    let mut state = State::Code;
    let mut str_start = 0;

    for (i, c) in src.char_indices() {
        state = match state {
            State::Code => code_char(&mut tokens, &mut str_start, i, c),
            State::Slash => match c {
                '/' => State::LineComment,
                '*' => State::BlockComment,
                _ => {
                    // Lone slash is ordinary text
                    push_word(&mut tokens, i - 1, i);
                    code_char(&mut tokens, &mut str_start, i, c)
                }
            },
            State::Str => match c {
                '\\' => State::Escape,
                '"' => {
                    tokens.push(Token {
                        kind: TokenKind::Str,
                        start: str_start,
                        end: i + 1,
                    });
                    State::Code
                }
                _ => State::Str,
            },
            State::Escape => State::Str,
            State::LineComment => {
                if c == '\n' {
                    State::Code
                } else {
                    State::LineComment
                }
            }
            State::BlockComment => {
                if c == '*' {
                    State::BlockCommentStar
                } else {
                    State::BlockComment
                }
            }
            State::BlockCommentStar => match c {
                '/' => State::Code,
                '*' => State::BlockCommentStar,
                _ => State::BlockComment,
            },
        };
    }

    if state == State::Slash {
        push_word(&mut tokens, src.len() - 1, src.len());
    }

    Tokens {
        tokens,
        terminated: matches!(state, State::Code | State::Slash | State::LineComment),
    }
}

fn code_char(tokens: &mut Vec<Token>, str_start: &mut usize, i: usize, c: char) -> State {
    match c {
        '"' => {
            *str_start = i;
            State::Str
        }
        '/' => State::Slash,
        '{' | '}' | '[' | ']' | ':' | ',' => {
            tokens.push(Token {
                kind: TokenKind::Punct(c),
                start: i,
                end: i + 1,
            });
            State::Code
        }
        c if c.is_whitespace() => State::Code,
        c => {
            push_word(tokens, i, i + c.len_utf8());
            State::Code
        }
    }
}

/// Append a word char, extending the previous word token if adjacent
fn push_word(tokens: &mut Vec<Token>, start: usize, end: usize) {
    if let Some(last) = tokens.last_mut() {
        if last.kind == TokenKind::Word && last.end == start {
            last.end = end;
            return;
        }
    }
    tokens.push(Token {
        kind: TokenKind::Word,
        start,
        end,
    });
}

/// Index into `tokens` of the last `}` in the document
pub fn last_closing_brace(tokens: &Tokens) -> Option<usize> {
    tokens.tokens.iter().rposition(|t| t.is_punct('}'))
}

/// Locate the array value of `"key"`, matching brackets while skipping strings
/// and comments
pub fn find_keyed_array(src: &str, key: &str) -> ArrayLookup {
    let scanned = tokenize(src);
    let toks = &scanned.tokens;

    for i in 0..toks.len() {
        if toks[i].str_contents(src) != Some(key) {
            continue;
        }
        let opener = match (toks.get(i + 1), toks.get(i + 2)) {
            (Some(colon), Some(open)) if colon.is_punct(':') && open.is_punct('[') => i + 2,
            _ => continue,
        };

        let mut depth = 0usize;
        for j in opener..toks.len() {
            match toks[j].kind {
                TokenKind::Punct('[') => depth += 1,
                TokenKind::Punct(']') => {
                    depth -= 1;
                    if depth == 0 {
                        let last_value_end = (j - 1 > opener).then(|| toks[j - 1].end);
                        return ArrayLookup::Found(ArraySpan {
                            open: toks[opener].start,
                            close: toks[j].start,
                            last_value_end,
                        });
                    }
                }
                _ => {}
            }
        }
        return ArrayLookup::Unclosed {
            open: toks[opener].start,
        };
    }

    ArrayLookup::Missing
}
