use crate::error::ParseError;

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier or keyword. Never contains a dot.
    Ident(String),
    /// An unsigned integer literal, with the text as written (`0x1F`, `017`, `42`).
    Int { value: u64, text: String },
    /// A floating-point literal, with the text as written.
    Float { value: f64, text: String },
    /// A string literal, escapes already processed.
    Str(Vec<u8>),
    /// Any single punctuation character: `{ } [ ] ( ) < > ; , = . : - +`
    Symbol(char),
    /// End of input
    Eof,
}

impl Token {
    pub fn is_symbol(&self, c: char) -> bool {
        matches!(self, Token::Symbol(s) if *s == c)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s == word)
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Int { text, .. } | Token::Float { text, .. } => format!("'{}'", text),
            Token::Str(_) => "string literal".to_string(),
            Token::Symbol(c) => format!("'{}'", c),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token with its source location and the comment written directly before it.
#[derive(Debug, Clone)]
pub struct Located {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    pub comment: Option<String>,
}

/// Tokenizer for `.proto` schema text.
#[derive(Clone)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.line, self.column, message)
    }

    /// Skip whitespace and comments, returning the comment block that ends right before the
    /// next token. A blank line detaches a comment from what follows.
    fn skip_whitespace_and_comments(&mut self) -> Result<Option<String>, ParseError> {
        let mut comment: Option<String> = None;
        let mut newlines = 0;
        loop {
            match self.peek_byte() {
                Some(b'\n') => {
                    self.advance();
                    newlines += 1;
                    if newlines > 1 {
                        comment = None;
                    }
                }
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.advance();
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                    let start = self.pos;
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                    let text = String::from_utf8_lossy(&self.input[start..self.pos]);
                    let line = text.strip_prefix(' ').unwrap_or(&text);
                    let block = comment.get_or_insert_with(String::new);
                    block.push_str(line);
                    block.push('\n');
                    newlines = 0;
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    let start = self.pos;
                    loop {
                        match self.peek_byte() {
                            None => return Err(self.error("unterminated block comment")),
                            Some(b'*') if self.peek_byte_at(1) == Some(b'/') => break,
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                    let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                    self.advance();
                    self.advance();
                    comment = Some(text.trim().to_string());
                    newlines = 0;
                }
                _ => break,
            }
        }
        Ok(comment)
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);

        if self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_hexdigit()) {
                self.advance();
            }
            let text = self.text_from(start);
            let value = u64::from_str_radix(&text[2..], 16).map_err(|_| {
                ParseError::syntax(line, column, format!("invalid hex integer '{}'", text))
            })?;
            return Ok(Token::Int { value, text });
        }

        let mut is_float = false;
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_byte() == Some(b'.') {
            is_float = true;
            self.advance();
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if !matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                return Err(self.error("expected exponent digits"));
            }
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_byte(), Some(b) if b.is_ascii_alphabetic() || b == b'_') {
            return Err(self.error("need space between number and identifier"));
        }

        let text = self.text_from(start);
        if is_float {
            let value = text.parse::<f64>().map_err(|_| {
                ParseError::syntax(line, column, format!("invalid float '{}'", text))
            })?;
            return Ok(Token::Float { value, text });
        }
        let value = if text.len() > 1 && text.starts_with('0') {
            u64::from_str_radix(&text[1..], 8)
        } else {
            text.parse::<u64>()
        }
        .map_err(|_| ParseError::syntax(line, column, format!("integer out of range '{}'", text)))?;
        Ok(Token::Int { value, text })
    }

    fn text_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_string(&mut self, quote: u8) -> Result<Vec<u8>, ParseError> {
        self.advance();
        let mut out = Vec::new();
        loop {
            let b = match self.advance() {
                None | Some(b'\n') => return Err(self.error("unterminated string literal")),
                Some(b) => b,
            };
            if b == quote {
                return Ok(out);
            }
            if b != b'\\' {
                out.push(b);
                continue;
            }
            let esc = self
                .advance()
                .ok_or_else(|| self.error("unterminated string literal"))?;
            match esc {
                b'a' => out.push(0x07),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0c),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'v' => out.push(0x0b),
                b'\\' | b'\'' | b'"' | b'?' => out.push(esc),
                b'0'..=b'7' => {
                    let mut v = (esc - b'0') as u32;
                    for _ in 0..2 {
                        match self.peek_byte() {
                            Some(d @ b'0'..=b'7') => {
                                self.advance();
                                v = v * 8 + (d - b'0') as u32;
                            }
                            _ => break,
                        }
                    }
                    out.push(v as u8);
                }
                b'x' | b'X' => {
                    let mut v = 0u32;
                    let mut digits = 0;
                    while digits < 2 {
                        match self.peek_byte() {
                            Some(d) if d.is_ascii_hexdigit() => {
                                self.advance();
                                v = v * 16 + (d as char).to_digit(16).unwrap_or(0);
                                digits += 1;
                            }
                            _ => break,
                        }
                    }
                    if digits == 0 {
                        return Err(self.error("expected hex digits for escape sequence"));
                    }
                    out.push(v as u8);
                }
                b'u' | b'U' => {
                    let len = if esc == b'u' { 4 } else { 8 };
                    let mut v = 0u32;
                    for _ in 0..len {
                        let d = self
                            .advance()
                            .and_then(|d| (d as char).to_digit(16))
                            .ok_or_else(|| self.error("expected hex digits for unicode escape"))?;
                        v = v * 16 + d;
                    }
                    let c = char::from_u32(v)
                        .ok_or_else(|| self.error(format!("invalid unicode escape {:x}", v)))?;
                    let mut utf8 = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
                other => {
                    return Err(self.error(format!("invalid escape sequence '\\{}'", other as char)))
                }
            }
        }
    }

    /// Read the next token.
    pub fn next_token(&mut self) -> Result<Located, ParseError> {
        let comment = self.skip_whitespace_and_comments()?;
        let (line, column) = (self.line, self.column);
        let located = |token| Located {
            token,
            line,
            column,
            comment: comment.clone(),
        };

        let token = match self.peek_byte() {
            None => Token::Eof,
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => Token::Ident(self.read_ident()),
            Some(b) if b.is_ascii_digit() => self.read_number()?,
            Some(b'.') if matches!(self.peek_byte_at(1), Some(d) if d.is_ascii_digit()) => {
                self.read_number()?
            }
            Some(q @ b'"') | Some(q @ b'\'') => Token::Str(self.read_string(q)?),
            Some(b) if b"{}[]()<>;,=.:-+/".contains(&b) => {
                self.advance();
                Token::Symbol(b as char)
            }
            Some(b) => {
                return Err(self.error(format!("unexpected character '{}'", b as char)));
            }
        };
        Ok(located(token))
    }

    /// Peek at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Located, ParseError> {
        let saved = (self.pos, self.line, self.column);
        let tok = self.next_token();
        (self.pos, self.line, self.column) = saved;
        tok
    }

    /// With the opening `{` already consumed, return the raw text up to the matching `}` and
    /// consume that brace. Nested braces and string literals are honored.
    pub fn read_braced_text(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let mut depth = 1;
        loop {
            match self.peek_byte() {
                None => return Err(self.error("unterminated aggregate value")),
                Some(b'{') => {
                    self.advance();
                    depth += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        let text = self.text_from(start);
                        self.advance();
                        return Ok(text.trim().to_string());
                    }
                    self.advance();
                }
                Some(q @ b'"') | Some(q @ b'\'') => {
                    self.read_string(q)?;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}
