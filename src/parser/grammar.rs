use crate::descriptor::{Label, NamePart, MAX_FIELD_NUMBER};
use crate::diagnostics::Span;
use crate::error::ParseError;
use super::ast::*;
use super::lexer::{Lexer, Located, Token};

/// Parse `.proto` schema text into a parse tree.
pub fn parse_file(input: &str) -> Result<ProtoFile, ParseError> {
    let mut parser = Parser {
        lexer: Lexer::new(input),
        syntax: Syntax::Proto2,
    };
    parser.parse_file()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    syntax: Syntax,
}

fn span_of(tok: &Located) -> Span {
    Span::new(tok.line, tok.column)
}

fn unexpected(tok: &Located, expected: &str) -> ParseError {
    ParseError::syntax(
        tok.line,
        tok.column,
        format!("expected {}, found {}", expected, tok.token.describe()),
    )
}

impl<'a> Parser<'a> {
    fn parse_file(&mut self) -> Result<ProtoFile, ParseError> {
        let mut file = ProtoFile::default();

        let first = self.lexer.peek_token()?;
        if first.token.is_ident("syntax") {
            self.lexer.next_token()?;
            self.expect_symbol('=')?;
            let tok = self.lexer.next_token()?;
            let value = match &tok.token {
                Token::Str(s) => String::from_utf8_lossy(s).into_owned(),
                _ => return Err(unexpected(&tok, "syntax string")),
            };
            self.syntax = match value.as_str() {
                "proto2" => Syntax::Proto2,
                "proto3" => Syntax::Proto3,
                other => {
                    return Err(ParseError::syntax(
                        tok.line,
                        tok.column,
                        format!("unrecognized syntax identifier \"{}\"", other),
                    ))
                }
            };
            self.expect_symbol(';')?;
            file.syntax = self.syntax;
            file.explicit_syntax = true;
        }

        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Eof => break,
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Ident(kw) => match kw.as_str() {
                    "package" => {
                        self.lexer.next_token()?;
                        if file.package.is_some() {
                            return Err(ParseError::syntax(
                                tok.line,
                                tok.column,
                                "multiple package definitions",
                            ));
                        }
                        let name = self.parse_full_ident(false)?;
                        self.expect_symbol(';')?;
                        file.package = Some(Package {
                            name,
                            span: span_of(&tok),
                        });
                    }
                    "import" => {
                        self.lexer.next_token()?;
                        let kind = if self.eat_ident("public")? {
                            ImportKind::Public
                        } else if self.eat_ident("weak")? {
                            ImportKind::Weak
                        } else {
                            ImportKind::Default
                        };
                        let path = self.expect_string()?;
                        self.expect_symbol(';')?;
                        file.imports.push(Import {
                            path: String::from_utf8_lossy(&path).into_owned(),
                            kind,
                            span: span_of(&tok),
                        });
                    }
                    "option" => file.options.push(self.parse_option_statement()?),
                    "message" => file.items.push(TopItem::Message(self.parse_message()?)),
                    "enum" => file.items.push(TopItem::Enum(self.parse_enum()?)),
                    "service" => file.items.push(TopItem::Service(self.parse_service()?)),
                    "extend" => file.items.push(TopItem::Extend(self.parse_extend()?)),
                    "syntax" => {
                        return Err(ParseError::syntax(
                            tok.line,
                            tok.column,
                            "syntax statement must be the first statement in the file",
                        ))
                    }
                    _ => return Err(unexpected(&tok, "top-level statement")),
                },
                _ => return Err(unexpected(&tok, "top-level statement")),
            }
        }

        Ok(file)
    }

    fn parse_message(&mut self) -> Result<Message, ParseError> {
        let kw = self.lexer.next_token()?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let items = self.parse_message_body()?;
        Ok(Message {
            name,
            items,
            span: span_of(&kw),
            comment: kw.comment,
        })
    }

    /// Parse message members up to and including the closing `}`.
    fn parse_message_body(&mut self) -> Result<Vec<MessageItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Symbol('}') => {
                    self.lexer.next_token()?;
                    return Ok(items);
                }
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Eof => return Err(unexpected(&tok, "'}'")),
                Token::Ident(kw) => {
                    let item = match kw.as_str() {
                        "message" if self.is_declaration()? => MessageItem::Message(self.parse_message()?),
                        "enum" if self.is_declaration()? => MessageItem::Enum(self.parse_enum()?),
                        "extend" if self.is_declaration()? => MessageItem::Extend(self.parse_extend()?),
                        "oneof" if self.is_declaration()? => MessageItem::Oneof(self.parse_oneof()?),
                        "option" => MessageItem::Option(self.parse_option_statement()?),
                        "extensions" => MessageItem::Extensions(self.parse_extensions()?),
                        "reserved" => MessageItem::Reserved(self.parse_reserved(MAX_FIELD_NUMBER)?),
                        "map" if self.second_is_symbol('<')? => MessageItem::Map(self.parse_map()?),
                        _ => match self.parse_field_or_group(true)? {
                            FieldOrGroup::Field(f) => MessageItem::Field(f),
                            FieldOrGroup::Group(g) => MessageItem::Group(g),
                        },
                    };
                    items.push(item);
                }
                Token::Symbol('.') => match self.parse_field_or_group(true)? {
                    FieldOrGroup::Field(f) => items.push(MessageItem::Field(f)),
                    FieldOrGroup::Group(g) => items.push(MessageItem::Group(g)),
                },
                _ => return Err(unexpected(&tok, "message member")),
            }
        }
    }

    /// `message Foo {` (or `extend a.b.C {`) rather than a field whose type is named `message`.
    fn is_declaration(&mut self) -> Result<bool, ParseError> {
        let mut lookahead = Parser {
            lexer: self.lexer.clone(),
            syntax: self.syntax,
        };
        lookahead.lexer.next_token()?;
        if lookahead.parse_full_ident(true).is_err() {
            return Ok(false);
        }
        Ok(lookahead.lexer.next_token()?.token.is_symbol('{'))
    }

    fn second_is_symbol(&mut self, c: char) -> Result<bool, ParseError> {
        let mut lookahead = self.lexer.clone();
        lookahead.next_token()?;
        Ok(lookahead.next_token()?.token.is_symbol(c))
    }

    fn parse_label(&mut self) -> Result<Option<Label>, ParseError> {
        let tok = self.lexer.peek_token()?;
        if let Token::Ident(word) = &tok.token {
            if let Some(label) = Label::from_keyword(word) {
                self.lexer.next_token()?;
                return Ok(Some(label));
            }
        }
        Ok(None)
    }

    fn parse_field_or_group(&mut self, allow_label: bool) -> Result<FieldOrGroup, ParseError> {
        let start = self.lexer.peek_token()?;
        let label = if allow_label { self.parse_label()? } else { None };

        if label.is_none() && allow_label && self.syntax == Syntax::Proto2 {
            let tok = self.lexer.peek_token()?;
            return Err(unexpected(&tok, "'required', 'optional', or 'repeated'"));
        }
        if label == Some(Label::Required) && self.syntax == Syntax::Proto3 {
            return Err(ParseError::syntax(
                start.line,
                start.column,
                "required fields are not allowed in proto3",
            ));
        }

        if self.lexer.peek_token()?.token.is_ident("group") {
            return Ok(FieldOrGroup::Group(self.parse_group(label, &start)?));
        }

        let type_name = self.parse_full_ident(true)?;
        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let number = self.parse_field_number()?;
        let options = self.parse_field_options()?;
        self.expect_symbol(';')?;
        Ok(FieldOrGroup::Field(Field {
            label,
            type_name,
            name,
            number,
            options,
            span: span_of(&start),
            comment: start.comment.clone(),
        }))
    }

    fn parse_group(&mut self, label: Option<Label>, start: &Located) -> Result<Group, ParseError> {
        if self.syntax == Syntax::Proto3 {
            return Err(ParseError::syntax(
                start.line,
                start.column,
                "groups are not supported in proto3",
            ));
        }
        self.lexer.next_token()?;
        let name_tok = self.lexer.peek_token()?;
        let name = self.expect_ident()?;
        if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(ParseError::syntax(
                name_tok.line,
                name_tok.column,
                "group names must start with a capital letter",
            ));
        }
        self.expect_symbol('=')?;
        let number = self.parse_field_number()?;
        let options = self.parse_field_options()?;
        self.expect_symbol('{')?;
        let items = self.parse_message_body()?;
        Ok(Group {
            label,
            name,
            number,
            options,
            items,
            span: span_of(start),
            comment: start.comment.clone(),
        })
    }

    fn parse_map(&mut self) -> Result<MapField, ParseError> {
        let start = self.lexer.next_token()?;
        self.expect_symbol('<')?;
        let key_tok = self.lexer.peek_token()?;
        let key_type = self.expect_ident()?;
        if !is_valid_map_key(&key_type) {
            return Err(ParseError::syntax(
                key_tok.line,
                key_tok.column,
                format!("'{}' is not a valid map key type", key_type),
            ));
        }
        self.expect_symbol(',')?;
        let value_type = self.parse_full_ident(true)?;
        self.expect_symbol('>')?;
        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let number = self.parse_field_number()?;
        let options = self.parse_field_options()?;
        self.expect_symbol(';')?;
        Ok(MapField {
            key_type,
            value_type,
            name,
            number,
            options,
            span: span_of(&start),
            comment: start.comment,
        })
    }

    fn parse_oneof(&mut self) -> Result<Oneof, ParseError> {
        let start = self.lexer.next_token()?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let mut items = Vec::new();
        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Symbol('}') => {
                    self.lexer.next_token()?;
                    break;
                }
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Ident(kw) if kw == "option" => {
                    items.push(OneofItem::Option(self.parse_option_statement()?))
                }
                Token::Ident(kw) if Label::from_keyword(kw).is_some() => {
                    return Err(ParseError::syntax(
                        tok.line,
                        tok.column,
                        "fields in oneofs must not have labels",
                    ))
                }
                Token::Ident(_) | Token::Symbol('.') => match self.parse_field_or_group(false)? {
                    FieldOrGroup::Field(f) => items.push(OneofItem::Field(f)),
                    FieldOrGroup::Group(g) => items.push(OneofItem::Group(g)),
                },
                _ => return Err(unexpected(&tok, "oneof member")),
            }
        }
        Ok(Oneof {
            name,
            items,
            span: span_of(&start),
        })
    }

    fn parse_extend(&mut self) -> Result<Extend, ParseError> {
        let start = self.lexer.next_token()?;
        let extendee = self.parse_full_ident(true)?;
        self.expect_symbol('{')?;
        let mut items = Vec::new();
        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Symbol('}') => {
                    self.lexer.next_token()?;
                    break;
                }
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Ident(_) | Token::Symbol('.') => match self.parse_field_or_group(true)? {
                    FieldOrGroup::Field(f) => items.push(ExtendItem::Field(f)),
                    FieldOrGroup::Group(g) => items.push(ExtendItem::Group(g)),
                },
                _ => return Err(unexpected(&tok, "extension field")),
            }
        }
        Ok(Extend {
            extendee,
            items,
            span: span_of(&start),
        })
    }

    fn parse_extensions(&mut self) -> Result<Extensions, ParseError> {
        let start = self.lexer.next_token()?;
        let ranges = self.parse_ranges(MAX_FIELD_NUMBER, false)?;
        let options = self.parse_field_options()?;
        self.expect_symbol(';')?;
        Ok(Extensions {
            ranges,
            options,
            span: span_of(&start),
        })
    }

    /// `reserved` in a message (`max` = highest field number) or an enum (`max` = `i32::MAX`).
    fn parse_reserved(&mut self, max: i32) -> Result<Reserved, ParseError> {
        let start = self.lexer.next_token()?;
        let mut reserved = Reserved {
            ranges: Vec::new(),
            names: Vec::new(),
            span: span_of(&start),
        };
        if let Token::Str(_) = self.lexer.peek_token()?.token {
            loop {
                let name = self.expect_string()?;
                reserved.names.push(String::from_utf8_lossy(&name).into_owned());
                if !self.eat_symbol(',')? {
                    break;
                }
            }
        } else {
            reserved.ranges = self.parse_ranges(max, max == i32::MAX)?;
        }
        self.expect_symbol(';')?;
        Ok(reserved)
    }

    fn parse_ranges(&mut self, max: i32, allow_negative: bool) -> Result<Vec<(i32, i32)>, ParseError> {
        let mut ranges = Vec::new();
        loop {
            let start = self.parse_range_bound(max, allow_negative, false)?;
            let end = if self.eat_ident("to")? {
                self.parse_range_bound(max, allow_negative, true)?
            } else {
                start
            };
            ranges.push((start, end));
            if !self.eat_symbol(',')? {
                return Ok(ranges);
            }
        }
    }

    fn parse_range_bound(&mut self, max: i32, allow_negative: bool, allow_max: bool) -> Result<i32, ParseError> {
        let tok = self.lexer.peek_token()?;
        if allow_max && tok.token.is_ident("max") {
            self.lexer.next_token()?;
            return Ok(max);
        }
        if allow_negative {
            self.parse_int32()
        } else {
            let value = self.expect_int()?;
            i32::try_from(value).map_err(|_| {
                ParseError::syntax(tok.line, tok.column, format!("integer out of range: {}", value))
            })
        }
    }

    fn parse_enum(&mut self) -> Result<Enum, ParseError> {
        let kw = self.lexer.next_token()?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let mut items = Vec::new();
        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Symbol('}') => {
                    self.lexer.next_token()?;
                    break;
                }
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Ident(kw) if kw == "option" && !self.second_is_symbol('=')? => {
                    items.push(EnumItem::Option(self.parse_option_statement()?))
                }
                Token::Ident(kw) if kw == "reserved" && !self.second_is_symbol('=')? => {
                    items.push(EnumItem::Reserved(self.parse_reserved(i32::MAX)?))
                }
                Token::Ident(_) => {
                    let value_tok = self.lexer.next_token()?;
                    let name = match value_tok.token {
                        Token::Ident(ref n) => n.clone(),
                        _ => return Err(unexpected(&value_tok, "enum value name")),
                    };
                    self.expect_symbol('=')?;
                    let number = self.parse_int32()?;
                    let options = self.parse_field_options()?;
                    self.expect_symbol(';')?;
                    items.push(EnumItem::Value(EnumValue {
                        name,
                        number,
                        options,
                        span: span_of(&value_tok),
                        comment: value_tok.comment,
                    }));
                }
                _ => return Err(unexpected(&tok, "enum value")),
            }
        }
        Ok(Enum {
            name,
            items,
            span: span_of(&kw),
            comment: kw.comment,
        })
    }

    fn parse_service(&mut self) -> Result<Service, ParseError> {
        let kw = self.lexer.next_token()?;
        let name = self.expect_ident()?;
        self.expect_symbol('{')?;
        let mut items = Vec::new();
        loop {
            let tok = self.lexer.peek_token()?;
            match &tok.token {
                Token::Symbol('}') => {
                    self.lexer.next_token()?;
                    break;
                }
                Token::Symbol(';') => {
                    self.lexer.next_token()?;
                }
                Token::Ident(kw) if kw == "option" => {
                    items.push(ServiceItem::Option(self.parse_option_statement()?))
                }
                Token::Ident(kw) if kw == "rpc" => items.push(ServiceItem::Rpc(self.parse_rpc()?)),
                _ => return Err(unexpected(&tok, "'rpc' or 'option'")),
            }
        }
        Ok(Service {
            name,
            items,
            span: span_of(&kw),
            comment: kw.comment,
        })
    }

    fn parse_rpc(&mut self) -> Result<Rpc, ParseError> {
        let kw = self.lexer.next_token()?;
        let name = self.expect_ident()?;
        let (client_streaming, input_type) = self.parse_rpc_type()?;
        self.expect_keyword("returns")?;
        let (server_streaming, output_type) = self.parse_rpc_type()?;

        let mut options = Vec::new();
        if self.eat_symbol('{')? {
            loop {
                let tok = self.lexer.peek_token()?;
                match &tok.token {
                    Token::Symbol('}') => {
                        self.lexer.next_token()?;
                        break;
                    }
                    Token::Symbol(';') => {
                        self.lexer.next_token()?;
                    }
                    Token::Ident(kw) if kw == "option" => options.push(self.parse_option_statement()?),
                    _ => return Err(unexpected(&tok, "'option' or '}'")),
                }
            }
            self.eat_symbol(';')?;
        } else {
            self.expect_symbol(';')?;
        }

        Ok(Rpc {
            name,
            input_type,
            client_streaming,
            output_type,
            server_streaming,
            options,
            span: span_of(&kw),
            comment: kw.comment,
        })
    }

    fn parse_rpc_type(&mut self) -> Result<(bool, String), ParseError> {
        self.expect_symbol('(')?;
        let streaming = {
            let tok = self.lexer.peek_token()?;
            if tok.token.is_ident("stream") && !self.second_is_symbol(')')? {
                self.lexer.next_token()?;
                true
            } else {
                false
            }
        };
        let type_name = self.parse_full_ident(true)?;
        self.expect_symbol(')')?;
        Ok((streaming, type_name))
    }

    /// `option name = value;`
    fn parse_option_statement(&mut self) -> Result<OptionDecl, ParseError> {
        self.lexer.next_token()?;
        let decl = self.parse_option_assignment()?;
        self.expect_symbol(';')?;
        Ok(decl)
    }

    fn parse_option_assignment(&mut self) -> Result<OptionDecl, ParseError> {
        let start = self.lexer.peek_token()?;
        let name = self.parse_option_name()?;
        self.expect_symbol('=')?;
        let value = self.parse_constant()?;
        Ok(OptionDecl {
            name,
            value,
            span: span_of(&start),
        })
    }

    /// `[a = 1, (b.c).d = "x"]`, or nothing.
    fn parse_field_options(&mut self) -> Result<Vec<OptionDecl>, ParseError> {
        let mut options = Vec::new();
        if !self.eat_symbol('[')? {
            return Ok(options);
        }
        loop {
            options.push(self.parse_option_assignment()?);
            if !self.eat_symbol(',')? {
                break;
            }
        }
        self.expect_symbol(']')?;
        Ok(options)
    }

    fn parse_option_name(&mut self) -> Result<Vec<NamePart>, ParseError> {
        let mut parts = Vec::new();
        loop {
            if self.eat_symbol('(')? {
                let name = self.parse_full_ident(true)?;
                self.expect_symbol(')')?;
                parts.push(NamePart {
                    name_part: name,
                    is_extension: true,
                });
            } else {
                parts.push(NamePart {
                    name_part: self.expect_ident()?,
                    is_extension: false,
                });
            }
            if !self.eat_symbol('.')? {
                return Ok(parts);
            }
        }
    }

    fn parse_constant(&mut self) -> Result<Constant, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Symbol('{') => Ok(Constant::Aggregate(self.lexer.read_braced_text()?)),
            Token::Symbol(sign @ '-') | Token::Symbol(sign @ '+') => {
                let negative = sign == '-';
                let next = self.lexer.next_token()?;
                let prefix = if negative { "-" } else { "" };
                match next.token {
                    Token::Int { value, text } => Ok(Constant::Int {
                        negative,
                        magnitude: value,
                        text: format!("{}{}", prefix, text),
                    }),
                    Token::Float { value, text } => Ok(Constant::Float {
                        value: if negative { -value } else { value },
                        text: format!("{}{}", prefix, text),
                    }),
                    Token::Ident(ref word) if word == "inf" || word == "nan" => {
                        let value = if word == "inf" { f64::INFINITY } else { f64::NAN };
                        Ok(Constant::Float {
                            value: if negative { -value } else { value },
                            text: format!("{}{}", prefix, word),
                        })
                    }
                    _ => Err(unexpected(&next, "number after sign")),
                }
            }
            Token::Int { value, text } => Ok(Constant::Int {
                negative: false,
                magnitude: value,
                text,
            }),
            Token::Float { value, text } => Ok(Constant::Float { value, text }),
            Token::Ident(word) => {
                let mut name = word;
                while self.lexer.peek_token()?.token.is_symbol('.') {
                    self.lexer.next_token()?;
                    name.push('.');
                    name.push_str(&self.expect_ident()?);
                }
                Ok(Constant::Ident(name))
            }
            Token::Str(mut bytes) => {
                // adjacent literals concatenate
                while let Token::Str(more) = self.lexer.peek_token()?.token {
                    self.lexer.next_token()?;
                    bytes.extend_from_slice(&more);
                }
                Ok(Constant::String(bytes))
            }
            _ => Err(unexpected(&tok, "constant")),
        }
    }

    /// `foo.bar.Baz`, optionally with a leading `.` when `allow_leading_dot` is set.
    fn parse_full_ident(&mut self, allow_leading_dot: bool) -> Result<String, ParseError> {
        let mut name = String::new();
        if allow_leading_dot && self.eat_symbol('.')? {
            name.push('.');
        }
        name.push_str(&self.expect_ident()?);
        while self.lexer.peek_token()?.token.is_symbol('.') {
            self.lexer.next_token()?;
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_field_number(&mut self) -> Result<i32, ParseError> {
        let tok = self.lexer.peek_token()?;
        let value = self.expect_int()?;
        if value == 0 || value > MAX_FIELD_NUMBER as u64 {
            return Err(ParseError::syntax(
                tok.line,
                tok.column,
                format!("field number {} out of range 1 to {}", value, MAX_FIELD_NUMBER),
            ));
        }
        Ok(value as i32)
    }

    fn parse_int32(&mut self) -> Result<i32, ParseError> {
        let tok = self.lexer.peek_token()?;
        let negative = self.eat_symbol('-')?;
        let magnitude = self.expect_int()? as i128;
        let value = if negative { -magnitude } else { magnitude };
        i32::try_from(value).map_err(|_| {
            ParseError::syntax(tok.line, tok.column, format!("integer out of range: {}", value))
        })
    }

    // Helper functions

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Ident(n) => Ok(n),
            _ => Err(unexpected(&tok, "identifier")),
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        let tok = self.lexer.next_token()?;
        if tok.token.is_ident(word) {
            Ok(())
        } else {
            Err(unexpected(&tok, &format!("'{}'", word)))
        }
    }

    fn expect_int(&mut self) -> Result<u64, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Int { value, .. } => Ok(value),
            _ => Err(unexpected(&tok, "integer")),
        }
    }

    fn expect_string(&mut self) -> Result<Vec<u8>, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Str(mut bytes) => {
                while let Token::Str(more) = self.lexer.peek_token()?.token {
                    self.lexer.next_token()?;
                    bytes.extend_from_slice(&more);
                }
                Ok(bytes)
            }
            _ => Err(unexpected(&tok, "string")),
        }
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        let tok = self.lexer.next_token()?;
        if tok.token.is_symbol(c) {
            Ok(())
        } else {
            Err(unexpected(&tok, &format!("'{}'", c)))
        }
    }

    fn eat_symbol(&mut self, c: char) -> Result<bool, ParseError> {
        if self.lexer.peek_token()?.token.is_symbol(c) {
            self.lexer.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_ident(&mut self, word: &str) -> Result<bool, ParseError> {
        if self.lexer.peek_token()?.token.is_ident(word) {
            self.lexer.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

enum FieldOrGroup {
    Field(Field),
    Group(Group),
}

fn is_valid_map_key(type_name: &str) -> bool {
    matches!(
        type_name,
        "int32"
            | "int64"
            | "uint32"
            | "uint64"
            | "sint32"
            | "sint64"
            | "fixed32"
            | "fixed64"
            | "sfixed32"
            | "sfixed64"
            | "bool"
            | "string"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(file: &ProtoFile, index: usize) -> &Message {
        match &file.items[index] {
            TopItem::Message(m) => m,
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_message() {
        let file = parse_file(
            r#"
            syntax = "proto3";
            package demo.v1;
            import public "other.proto";
            message Person {
                string name = 1;
                repeated int32 ids = 2 [packed = false];
            }
            "#,
        )
        .unwrap();
        assert_eq!(file.syntax, Syntax::Proto3);
        assert_eq!(file.package.as_ref().unwrap().name, "demo.v1");
        assert_eq!(file.imports[0].kind, ImportKind::Public);
        let m = message(&file, 0);
        assert_eq!(m.name, "Person");
        match &m.items[1] {
            MessageItem::Field(f) => {
                assert_eq!(f.label, Some(Label::Repeated));
                assert_eq!(f.type_name, "int32");
                assert_eq!(f.number, 2);
                assert_eq!(f.options[0].simple_name(), Some("packed"));
            }
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_proto2_requires_labels() {
        let err = parse_file("message M { int32 x = 1; }").unwrap_err();
        assert!(err.to_string().contains("'required', 'optional', or 'repeated'"));
    }

    #[test]
    fn test_parse_group_and_map() {
        let file = parse_file(
            r#"
            message M {
                optional group Result = 1 { required string url = 2; }
                map<string, .pkg.Value> values = 3;
            }
            "#,
        )
        .unwrap();
        let m = message(&file, 0);
        match &m.items[0] {
            MessageItem::Group(g) => {
                assert_eq!(g.name, "Result");
                assert_eq!(g.items.len(), 1);
            }
            other => panic!("expected group, got {:?}", other),
        }
        match &m.items[1] {
            MessageItem::Map(map) => {
                assert_eq!(map.key_type, "string");
                assert_eq!(map.value_type, ".pkg.Value");
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_extensions_and_reserved() {
        let file = parse_file(
            r#"
            message M {
                extensions 100 to 199, 1000 to max;
                reserved 2, 15, 9 to 11;
                reserved "foo", "bar";
            }
            "#,
        )
        .unwrap();
        let m = message(&file, 0);
        match &m.items[0] {
            MessageItem::Extensions(e) => {
                assert_eq!(e.ranges, vec![(100, 199), (1000, MAX_FIELD_NUMBER)]);
            }
            other => panic!("expected extensions, got {:?}", other),
        }
        match &m.items[1] {
            MessageItem::Reserved(r) => assert_eq!(r.ranges, vec![(2, 2), (15, 15), (9, 11)]),
            other => panic!("expected reserved, got {:?}", other),
        }
        match &m.items[2] {
            MessageItem::Reserved(r) => assert_eq!(r.names, vec!["foo", "bar"]),
            other => panic!("expected reserved, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_option_values() {
        let file = parse_file(
            r#"
            option (my.opt).inner = -0x10;
            option java_package = "com." "example";
            option (f) = -inf;
            option (agg) = { a: 1 b: "}" };
            "#,
        )
        .unwrap();
        assert_eq!(file.options.len(), 4);
        assert!(file.options[0].name[0].is_extension);
        assert_eq!(file.options[0].name[0].name_part, "my.opt");
        assert_eq!(
            file.options[0].value,
            Constant::Int {
                negative: true,
                magnitude: 16,
                text: "-0x10".into()
            }
        );
        assert_eq!(file.options[1].value, Constant::String(b"com.example".to_vec()));
        assert!(matches!(&file.options[2].value, Constant::Float { value, .. } if *value == f64::NEG_INFINITY));
        assert_eq!(file.options[3].value, Constant::Aggregate("a: 1 b: \"}\"".into()));
    }

    #[test]
    fn test_parse_service() {
        let file = parse_file(
            r#"
            syntax = "proto3";
            service Greeter {
                rpc Hello (stream Req) returns (.pkg.Resp);
                rpc Bye (Req) returns (stream Resp) { option deprecated = true; }
            }
            "#,
        )
        .unwrap();
        match &file.items[0] {
            TopItem::Service(s) => {
                assert_eq!(s.items.len(), 2);
                match &s.items[0] {
                    ServiceItem::Rpc(rpc) => {
                        assert!(rpc.client_streaming);
                        assert!(!rpc.server_streaming);
                        assert_eq!(rpc.output_type, ".pkg.Resp");
                    }
                    other => panic!("expected rpc, got {:?}", other),
                }
                match &s.items[1] {
                    ServiceItem::Rpc(rpc) => assert_eq!(rpc.options.len(), 1),
                    other => panic!("expected rpc, got {:?}", other),
                }
            }
            other => panic!("expected service, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_enum_with_negative_value() {
        let file = parse_file("syntax = \"proto3\"; enum E { A = 0; B = -1 [deprecated = true]; reserved 5 to max; }")
            .unwrap();
        match &file.items[0] {
            TopItem::Enum(e) => {
                assert!(matches!(&e.items[1], EnumItem::Value(v) if v.number == -1 && v.options.len() == 1));
                assert!(matches!(&e.items[2], EnumItem::Reserved(r) if r.ranges == vec![(5, i32::MAX)]));
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_oneof_and_nested_extend() {
        let file = parse_file(
            r#"
            syntax = "proto3";
            message M {
                oneof choice { string a = 1; M b = 2; }
                extend google.protobuf.MessageOptions { optional int32 tag = 5000; }
            }
            "#,
        )
        .unwrap();
        let m = message(&file, 0);
        assert!(matches!(&m.items[0], MessageItem::Oneof(o) if o.items.len() == 2));
        assert!(matches!(&m.items[1], MessageItem::Extend(e) if e.extendee == "google.protobuf.MessageOptions"));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_file("syntax = \"proto3\";\nmessage M {\n  string = 1;\n}").unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 3),
        }
    }
}
