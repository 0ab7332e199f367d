//! Protobuf text format.
//!
//! Used for aggregate option values (`option (foo) = { a: 1 b: "x" };`) and for descriptor
//! input given as text. Only parsing is provided, plus the C-style escaping used when bytes
//! are rendered as text.

use crate::descriptor::{FieldDescriptorProto, Type};
use crate::error::ParseError;
use crate::options::{coerce_literal, Literal};
use crate::parser::lexer::{Lexer, Located, Token};
use crate::pool::TypeLookup;
use crate::value::{DynamicMessage, Value};

/// Parse `text` as the fields of a message of type `type_name`.
pub fn parse_message(text: &str, type_name: &str, types: &dyn TypeLookup) -> Result<DynamicMessage, ParseError> {
    let mut msg = DynamicMessage::new(type_name);
    merge_message(text, &mut msg, types)?;
    Ok(msg)
}

/// Parse `text` and merge its fields into `msg`.
pub fn merge_message(text: &str, msg: &mut DynamicMessage, types: &dyn TypeLookup) -> Result<(), ParseError> {
    let mut parser = TextParser {
        lexer: Lexer::new(text),
        types,
    };
    parser.parse_fields(msg, None)
}

struct TextParser<'a> {
    lexer: Lexer<'a>,
    types: &'a dyn TypeLookup,
}

fn error_at(tok: &Located, message: impl Into<String>) -> ParseError {
    ParseError::syntax(tok.line, tok.column, message)
}

impl<'a> TextParser<'a> {
    fn next(&mut self) -> Result<Located, ParseError> {
        self.lexer.next_token()
    }

    fn peek(&mut self) -> Result<Located, ParseError> {
        self.lexer.peek_token()
    }

    fn eat_symbol(&mut self, c: char) -> Result<bool, ParseError> {
        if self.peek()?.token.is_symbol(c) {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        let tok = self.next()?;
        if tok.token.is_symbol(c) {
            Ok(())
        } else {
            Err(error_at(&tok, format!("expected '{}', found {}", c, tok.token.describe())))
        }
    }

    fn parse_fields(&mut self, msg: &mut DynamicMessage, close: Option<char>) -> Result<(), ParseError> {
        loop {
            let tok = self.peek()?;
            match (&tok.token, close) {
                (Token::Eof, None) => return Ok(()),
                (Token::Eof, Some(c)) => {
                    return Err(error_at(&tok, format!("expected '{}', found end of input", c)))
                }
                (Token::Symbol(c), Some(end)) if *c == end => {
                    self.next()?;
                    return Ok(());
                }
                _ => self.parse_field(msg)?,
            }
        }
    }

    /// `foo.bar.Baz`, with an optional leading dot.
    fn parse_dotted(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        if self.eat_symbol('.')? {
            name.push('.');
        }
        loop {
            let tok = self.next()?;
            match &tok.token {
                Token::Ident(part) => name.push_str(part),
                other => return Err(error_at(&tok, format!("expected identifier, found {}", other.describe()))),
            }
            if !self.eat_symbol('.')? {
                return Ok(name);
            }
            name.push('.');
        }
    }

    fn parse_field(&mut self, msg: &mut DynamicMessage) -> Result<(), ParseError> {
        let tok = self.peek()?;
        let field = match &tok.token {
            Token::Symbol('[') => {
                self.next()?;
                let name = self.parse_dotted()?;
                self.expect_symbol(']')?;
                let full_name = name.trim_start_matches('.');
                let ext = self
                    .types
                    .find_extension(full_name)
                    .ok_or_else(|| error_at(&tok, format!("unknown extension \"{}\"", full_name)))?;
                if ext.extendee_unqualified() != msg.type_name() {
                    return Err(error_at(
                        &tok,
                        format!("extension \"{}\" does not extend \"{}\"", full_name, msg.type_name()),
                    ));
                }
                ext.clone()
            }
            Token::Ident(name) => {
                self.next()?;
                let message_type = self
                    .types
                    .find_message(msg.type_name())
                    .ok_or_else(|| error_at(&tok, format!("unknown message type \"{}\"", msg.type_name())))?;
                message_type
                    .field_by_name(name)
                    .or_else(|| message_type.field_by_group_name(name))
                    .cloned()
                    .ok_or_else(|| {
                        error_at(
                            &tok,
                            format!("message type \"{}\" has no field named \"{}\"", msg.type_name(), name),
                        )
                    })?
            }
            other => {
                return Err(error_at(&tok, format!("expected field name, found {}", other.describe())))
            }
        };

        let ty = field
            .r#type
            .ok_or_else(|| error_at(&tok, format!("field \"{}\" has no resolved type", field.name())))?;
        if ty.is_message() {
            self.eat_symbol(':')?;
        } else {
            self.expect_symbol(':')?;
        }

        if self.eat_symbol('[')? {
            if !self.eat_symbol(']')? {
                loop {
                    let value = self.parse_value(&field)?;
                    store(msg, &field, value);
                    if !self.eat_symbol(',')? {
                        break;
                    }
                }
                self.expect_symbol(']')?;
            }
        } else {
            let value = self.parse_value(&field)?;
            store(msg, &field, value);
        }

        if !self.eat_symbol(';')? {
            self.eat_symbol(',')?;
        }
        Ok(())
    }

    fn parse_value(&mut self, field: &FieldDescriptorProto) -> Result<Value, ParseError> {
        if field.r#type.map_or(false, |t| t.is_message()) {
            let open = self.next()?;
            let close = match open.token {
                Token::Symbol('{') => '}',
                Token::Symbol('<') => '>',
                ref other => {
                    return Err(error_at(&open, format!("expected '{{' or '<', found {}", other.describe())))
                }
            };
            let mut sub = DynamicMessage::new(field.type_name_unqualified());
            self.parse_fields(&mut sub, Some(close))?;
            return Ok(Value::Message(sub));
        }

        let tok = self.next()?;
        let literal = match &tok.token {
            Token::Symbol('-') => {
                let num = self.next()?;
                match num.token {
                    Token::Int { value, .. } => Literal::Int {
                        negative: true,
                        magnitude: value,
                    },
                    Token::Float { value, .. } => Literal::Float(-value),
                    Token::Ident(ref word) if is_float_word(word) => {
                        Literal::Float(-float_word(word))
                    }
                    ref other => {
                        return Err(error_at(&num, format!("expected number after '-', found {}", other.describe())))
                    }
                }
            }
            Token::Int { value, .. } => Literal::Int {
                negative: false,
                magnitude: *value,
            },
            Token::Float { value, .. } => Literal::Float(*value),
            Token::Ident(word) => Literal::Ident(word.clone()),
            Token::Str(bytes) => {
                let mut all = bytes.clone();
                while let Token::Str(more) = self.peek()?.token {
                    self.next()?;
                    all.extend_from_slice(&more);
                }
                Literal::String(all)
            }
            other => return Err(error_at(&tok, format!("expected value, found {}", other.describe()))),
        };
        let literal = if field.r#type == Some(Type::Bool) { loose_bool(literal) } else { literal };
        coerce_literal(&literal, field, self.types).map_err(|message| {
            error_at(&tok, format!("field \"{}\": {}", field.name(), message))
        })
    }
}

/// Text format also spells booleans as `t`, `f`, `True`, `False`, `1` and `0`.
fn loose_bool(literal: Literal) -> Literal {
    let word = match &literal {
        Literal::Ident(w) if w == "True" || w == "t" => "true",
        Literal::Ident(w) if w == "False" || w == "f" => "false",
        Literal::Int {
            negative: false,
            magnitude: 1,
        } => "true",
        Literal::Int {
            negative: false,
            magnitude: 0,
        } => "false",
        _ => return literal,
    };
    Literal::Ident(word.to_string())
}

fn is_float_word(word: &str) -> bool {
    matches!(word.to_ascii_lowercase().as_str(), "inf" | "infinity" | "nan")
}

fn float_word(word: &str) -> f64 {
    if word.eq_ignore_ascii_case("nan") {
        f64::NAN
    } else {
        f64::INFINITY
    }
}

fn store(msg: &mut DynamicMessage, field: &FieldDescriptorProto, value: Value) {
    let (number, ty) = match field.r#type {
        Some(ty) => (field.number() as u32, ty),
        None => return,
    };
    if field.is_repeated() {
        let packed = field.packed_option().unwrap_or(false) && ty.is_packable();
        msg.push(number, ty, packed, value);
    } else {
        msg.set(number, ty, value);
    }
}

/// Escape bytes the way protoc renders `bytes` defaults: printable ASCII as is, the usual
/// C escapes, and three-digit octal for everything else.
pub fn c_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}
