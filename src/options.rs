//! Option interpretation.
//!
//! Every options message leaves the semantic builder holding raw assignments. The resolver
//! walks each assignment's name through the options type (plain segments are fields,
//! parenthesized segments are extensions looked up from the declaring scope), coerces the
//! literal to the target field's type and stores it. Once an options message has used an
//! extension it is written to bytes and read back so that extension values land either in
//! typed extension storage or in the unknown-field bytes.

use crate::codec::{decode_message, DecodeContext, Encode};
use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorListener, ValidationCause};
use crate::error::BuildError;
use crate::pool::{Pool, TypeLookup};
use crate::registry::ExtensionRegistry;
use crate::text_format;
use crate::value::{DynamicMessage, Value};

/// A scalar option value before it is given a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Ident(String),
    Int { negative: bool, magnitude: u64 },
    Float(f64),
    String(Vec<u8>),
}

impl Literal {
    /// The scalar held by a raw assignment. `None` for aggregates or empty assignments.
    pub fn from_raw(raw: &UninterpretedOption) -> Option<Literal> {
        if let Some(word) = &raw.identifier_value {
            return Some(Literal::Ident(word.clone()));
        }
        if let Some(v) = raw.positive_int_value {
            return Some(Literal::Int {
                negative: false,
                magnitude: v,
            });
        }
        if let Some(v) = raw.negative_int_value {
            return Some(Literal::Int {
                negative: v < 0,
                magnitude: v.unsigned_abs(),
            });
        }
        if let Some(v) = raw.double_value {
            return Some(Literal::Float(v));
        }
        raw.string_value.as_ref().map(|s| Literal::String(s.clone()))
    }
}

fn signed(literal: &Literal, min: i64, max: i64) -> Result<i64, String> {
    match *literal {
        Literal::Int {
            negative: false,
            magnitude,
        } if magnitude <= max as u64 => Ok(magnitude as i64),
        Literal::Int {
            negative: true,
            magnitude,
        } if magnitude <= min.unsigned_abs() => Ok((magnitude as i64).wrapping_neg()),
        Literal::Int { .. } => Err(format!("value out of range [{}, {}]", min, max)),
        _ => Err("value must be an integer".to_string()),
    }
}

fn unsigned(literal: &Literal, max: u64) -> Result<u64, String> {
    match *literal {
        Literal::Int {
            negative: false,
            magnitude,
        } if magnitude <= max => Ok(magnitude),
        Literal::Int { negative: true, .. } => Err("value must be non-negative".to_string()),
        Literal::Int { .. } => Err(format!("value out of range [0, {}]", max)),
        _ => Err("value must be an unsigned integer".to_string()),
    }
}

fn float(literal: &Literal) -> Result<f64, String> {
    match literal {
        Literal::Float(v) => Ok(*v),
        Literal::Int {
            negative,
            magnitude,
        } => {
            let v = *magnitude as f64;
            Ok(if *negative { -v } else { v })
        }
        Literal::Ident(word) => match word.to_ascii_lowercase().as_str() {
            "inf" | "infinity" => Ok(f64::INFINITY),
            "nan" => Ok(f64::NAN),
            _ => Err(format!("'{}' is not a number", word)),
        },
        Literal::String(_) => Err("value must be a number".to_string()),
    }
}

/// Give `literal` the type of `field`. Enum value names are looked up through `types`.
pub fn coerce_literal(
    literal: &Literal,
    field: &FieldDescriptorProto,
    types: &dyn TypeLookup,
) -> Result<Value, String> {
    let ty = field
        .r#type
        .ok_or_else(|| format!("field '{}' has no resolved type", field.name()))?;
    let value = match ty {
        Type::Int32 | Type::Sint32 | Type::Sfixed32 => {
            Value::I32(signed(literal, i32::MIN as i64, i32::MAX as i64)? as i32)
        }
        Type::Int64 | Type::Sint64 | Type::Sfixed64 => Value::I64(signed(literal, i64::MIN, i64::MAX)?),
        Type::Uint32 | Type::Fixed32 => Value::U32(unsigned(literal, u32::MAX as u64)? as u32),
        Type::Uint64 | Type::Fixed64 => Value::U64(unsigned(literal, u64::MAX)?),
        Type::Double => Value::F64(float(literal)?),
        Type::Float => Value::F32(float(literal)? as f32),
        Type::Bool => match literal {
            Literal::Ident(word) if word == "true" => Value::Bool(true),
            Literal::Ident(word) if word == "false" => Value::Bool(false),
            _ => return Err("value must be 'true' or 'false'".to_string()),
        },
        Type::String => match literal {
            Literal::String(bytes) => Value::String(
                String::from_utf8(bytes.clone()).map_err(|_| "string is not valid UTF-8".to_string())?,
            ),
            _ => return Err("value must be a quoted string".to_string()),
        },
        Type::Bytes => match literal {
            Literal::String(bytes) => Value::Bytes(bytes.clone()),
            _ => return Err("value must be a quoted string".to_string()),
        },
        Type::Enum => {
            let enum_name = field.type_name_unqualified();
            match literal {
                Literal::Ident(word) => {
                    let enum_type = types
                        .find_enum(enum_name)
                        .ok_or_else(|| format!("unknown enum type '{}'", enum_name))?;
                    let value = enum_type
                        .value_by_name(word)
                        .ok_or_else(|| format!("enum '{}' has no value named '{}'", enum_name, word))?;
                    Value::Enum(value.number.unwrap_or(0))
                }
                Literal::Int { .. } => Value::Enum(signed(literal, i32::MIN as i64, i32::MAX as i64)? as i32),
                _ => return Err(format!("value must be an identifier of enum '{}'", enum_name)),
            }
        }
        Type::Message | Type::Group => {
            return Err("message values must be written as an aggregate '{ ... }'".to_string())
        }
    };
    Ok(value)
}

/// One resolved segment of an option name.
struct Segment {
    field: FieldDescriptorProto,
    is_extension: bool,
}

/// Interprets raw option assignments against the options types visible through a [`Pool`].
pub struct OptionResolver<'a> {
    pool: &'a Pool<'a>,
    registry: &'a ExtensionRegistry,
    as_extensions: bool,
    file: &'a str,
}

impl<'a> OptionResolver<'a> {
    /// `registry` is consulted when reserializing; with `as_extensions` off, extension values
    /// are left as unknown bytes instead.
    pub fn new(pool: &'a Pool<'a>, registry: &'a ExtensionRegistry, as_extensions: bool, file: &'a str) -> Self {
        OptionResolver {
            pool,
            registry,
            as_extensions,
            file,
        }
    }

    /// Interpret every raw assignment of `options`. `scope` is the full name of the scope
    /// the owning element was declared in; extension names are resolved from there.
    ///
    /// Unknown option names are reported and dropped. Values that do not fit their field are
    /// structural errors. Returns whether anything was stored.
    pub fn resolve_all_options(
        &self,
        options: &mut Options,
        scope: &str,
        listener: &mut dyn ErrorListener,
    ) -> Result<bool, BuildError> {
        if options.uninterpreted_option.is_empty() {
            return Ok(false);
        }
        let type_name = options.kind.type_name();
        let options_type = self
            .pool
            .find_message(type_name)
            .ok_or_else(|| BuildError::UnknownOptionsType(type_name.to_string()))?;

        let raw = std::mem::take(&mut options.uninterpreted_option);
        let mut stored = false;
        let mut used_extension = false;
        for option in &raw {
            let segments = match self.resolve_name(option, options_type, type_name, scope) {
                Ok(segments) => segments,
                Err(message) => {
                    listener.validation_error(
                        Diagnostic::validation(ValidationCause::UnresolvedOptionName, message)
                            .at(option.span)
                            .in_file(self.file),
                    );
                    continue;
                }
            };
            let value = self.option_value(option, &segments)?;
            used_extension |= segments.iter().any(|s| s.is_extension);
            store(&mut options.message, &segments, value);
            stored = true;
            tracing::trace!(option = %option.name_text(), scope, "interpreted option");
        }

        if used_extension {
            self.reserialize(options)?;
        }
        Ok(stored)
    }

    fn resolve_name(
        &self,
        option: &UninterpretedOption,
        options_type: &DescriptorProto,
        type_name: &str,
        scope: &str,
    ) -> Result<Vec<Segment>, String> {
        let mut current = options_type;
        let mut current_name = type_name.to_string();
        let mut segments = Vec::with_capacity(option.name.len());
        for (i, part) in option.name.iter().enumerate() {
            let field = if part.is_extension {
                let (full, ext) = self
                    .pool
                    .resolve_extension(&part.name_part, scope)
                    .ok_or_else(|| format!("option \"({})\" unknown", part.name_part))?;
                if ext.extendee_unqualified() != current_name {
                    return Err(format!(
                        "option \"({})\": \"{}\" does not extend \"{}\"",
                        part.name_part, full, current_name
                    ));
                }
                ext.clone()
            } else {
                current.field_by_name(&part.name_part).cloned().ok_or_else(|| {
                    format!("option \"{}\" unknown in \"{}\"", part.name_part, current_name)
                })?
            };

            if i + 1 < option.name.len() {
                let is_message = field.r#type.map_or(false, |t| t.is_message());
                if !is_message || field.is_repeated() {
                    return Err(format!(
                        "option \"{}\" is an atomic type, not a message",
                        option.name_text()
                    ));
                }
                current_name = field.type_name_unqualified().to_string();
                current = self
                    .pool
                    .find_message(&current_name)
                    .ok_or_else(|| format!("unknown message type \"{}\"", current_name))?;
            }
            segments.push(Segment {
                field,
                is_extension: part.is_extension,
            });
        }
        Ok(segments)
    }

    fn option_value(&self, option: &UninterpretedOption, segments: &[Segment]) -> Result<Value, BuildError> {
        let field = match segments.last() {
            Some(segment) => &segment.field,
            None => {
                return Err(BuildError::OptionValue {
                    option: option.name_text(),
                    message: "empty option name".to_string(),
                })
            }
        };
        let is_message = field.r#type.map_or(false, |t| t.is_message());

        if let Some(text) = &option.aggregate_value {
            if !is_message {
                return Err(BuildError::OptionValue {
                    option: option.name_text(),
                    message: "aggregate value given for a non-message field".to_string(),
                });
            }
            let msg = text_format::parse_message(text, field.type_name_unqualified(), self.pool).map_err(|e| {
                BuildError::Aggregate {
                    option: option.name_text(),
                    message: e.to_string(),
                }
            })?;
            return Ok(Value::Message(msg));
        }

        let literal = Literal::from_raw(option).ok_or_else(|| BuildError::OptionValue {
            option: option.name_text(),
            message: "no value given".to_string(),
        })?;
        coerce_literal(&literal, field, self.pool).map_err(|message| BuildError::OptionValue {
            option: option.name_text(),
            message,
        })
    }

    /// Round-trip the options message through the wire format so extension values are
    /// decoded the way a reader of the finished descriptor would see them.
    fn reserialize(&self, options: &mut Options) -> Result<(), BuildError> {
        let bytes = options
            .message
            .encode_to_vec()
            .map_err(|e| BuildError::Reserialize(e.to_string()))?;
        let mut ctx = DecodeContext::new(self.pool);
        if self.as_extensions {
            ctx = ctx.with_extensions(self.registry);
        }
        options.message = decode_message(options.kind.type_name(), &bytes, &ctx)
            .map_err(|e| BuildError::Reserialize(e.to_string()))?;
        tracing::debug!(
            options = options.kind.type_name(),
            bytes = bytes.len(),
            as_extensions = self.as_extensions,
            "reserialized options"
        );
        Ok(())
    }
}

fn store(message: &mut DynamicMessage, segments: &[Segment], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut target = message;
    for segment in parents {
        let ty = segment.field.r#type.unwrap_or(Type::Message);
        target = target.message_mut(
            segment.field.number() as u32,
            ty,
            segment.field.type_name_unqualified(),
        );
    }
    let ty = match last.field.r#type {
        Some(ty) => ty,
        None => return,
    };
    let number = last.field.number() as u32;
    if last.field.is_repeated() {
        let packed = last.field.packed_option().unwrap_or(false) && ty.is_packable();
        target.push(number, ty, packed, value);
    } else {
        target.set(number, ty, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;
    use crate::meta::meta_schema;
    use crate::pool::SymbolIndex;
    use crate::registry::ExtensionRegistry;

    fn ext(name: &str, number: i32, ty: Type, type_name: Option<&str>, extendee: &str) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.into()),
            number: Some(number),
            label: Some(Label::Optional),
            r#type: Some(ty),
            type_name: type_name.map(|t| format!(".{}", t)),
            extendee: Some(format!(".{}", extendee)),
            ..Default::default()
        }
    }

    fn raw(parts: &[(&str, bool)]) -> UninterpretedOption {
        UninterpretedOption {
            name: parts
                .iter()
                .map(|(n, e)| NamePart {
                    name_part: n.to_string(),
                    is_extension: *e,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn custom_file() -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("custom.proto".into()),
            package: Some("acme".into()),
            dependency: vec![META_SCHEMA_FILE.into()],
            message_type: vec![DescriptorProto {
                name: Some("Rule".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("limit".into()),
                    number: Some(1),
                    label: Some(Label::Optional),
                    r#type: Some(Type::Int32),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            extension: vec![
                ext("label", 50001, Type::String, None, "google.protobuf.FileOptions"),
                ext("rule", 50002, Type::Message, Some("acme.Rule"), "google.protobuf.FileOptions"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_option() {
        let file = custom_file();
        let index = SymbolIndex::build(&file);
        let deps = vec![meta_schema().clone()];
        let pool = Pool::new(&file, &index, &deps);
        let registry = ExtensionRegistry::new();
        let resolver = OptionResolver::new(&pool, &registry, true, "custom.proto");

        let mut options = Options::new(OptionsKind::File);
        let mut opt = raw(&[("java_package", false)]);
        opt.string_value = Some(b"com.acme".to_vec());
        options.uninterpreted_option.push(opt);
        let mut listener = DiagnosticCollector::new();
        assert!(resolver.resolve_all_options(&mut options, "acme", &mut listener).unwrap());
        assert!(listener.is_empty());
        assert!(options.uninterpreted_option.is_empty());
        assert_eq!(options.message.get_by_number(1), Some(&Value::String("com.acme".into())));
    }

    #[test]
    fn test_extension_option_as_extension_or_unknown() {
        let file = custom_file();
        let index = SymbolIndex::build(&file);
        let deps = vec![meta_schema().clone()];
        let pool = Pool::new(&file, &index, &deps);
        let mut registry = ExtensionRegistry::new();
        registry.add_file(&file);

        for as_extensions in [true, false] {
            let resolver = OptionResolver::new(&pool, &registry, as_extensions, "custom.proto");
            let mut options = Options::new(OptionsKind::File);
            let mut opt = raw(&[("rule", true), ("limit", false)]);
            opt.positive_int_value = Some(7);
            options.uninterpreted_option.push(opt);
            let mut listener = DiagnosticCollector::new();
            resolver.resolve_all_options(&mut options, "acme", &mut listener).unwrap();

            if as_extensions {
                let rule = options.message.get_by_number(50002).and_then(Value::as_message).unwrap();
                assert_eq!(rule.type_name(), "acme.Rule");
                assert_eq!(rule.get_by_number(1), Some(&Value::I32(7)));
                assert!(options.message.unknown().is_empty());
            } else {
                assert!(!options.message.has(50002));
                assert!(!options.message.unknown().is_empty());
            }
        }
    }

    #[test]
    fn test_unknown_option_is_reported() {
        let file = custom_file();
        let index = SymbolIndex::build(&file);
        let deps = vec![meta_schema().clone()];
        let pool = Pool::new(&file, &index, &deps);
        let registry = ExtensionRegistry::new();
        let resolver = OptionResolver::new(&pool, &registry, true, "custom.proto");

        let mut options = Options::new(OptionsKind::File);
        let mut opt = raw(&[("nope", true)]);
        opt.identifier_value = Some("x".into());
        options.uninterpreted_option.push(opt);
        let mut listener = DiagnosticCollector::new();
        assert!(!resolver.resolve_all_options(&mut options, "acme", &mut listener).unwrap());
        assert_eq!(listener.count(ValidationCause::UnresolvedOptionName), 1);
    }

    #[test]
    fn test_value_type_mismatch_is_structural() {
        let file = custom_file();
        let index = SymbolIndex::build(&file);
        let deps = vec![meta_schema().clone()];
        let pool = Pool::new(&file, &index, &deps);
        let registry = ExtensionRegistry::new();
        let resolver = OptionResolver::new(&pool, &registry, true, "custom.proto");

        let mut options = Options::new(OptionsKind::File);
        let mut opt = raw(&[("label", true)]);
        opt.positive_int_value = Some(3);
        options.uninterpreted_option.push(opt);
        let mut listener = DiagnosticCollector::new();
        let err = resolver.resolve_all_options(&mut options, "acme", &mut listener).unwrap_err();
        assert!(matches!(err, BuildError::OptionValue { .. }));
    }

    #[test]
    fn test_bool_option_requires_true_or_false() {
        let file = custom_file();
        let index = SymbolIndex::build(&file);
        let deps = vec![meta_schema().clone()];
        let pool = Pool::new(&file, &index, &deps);
        let registry = ExtensionRegistry::new();
        let resolver = OptionResolver::new(&pool, &registry, true, "custom.proto");

        let assign = |word: Option<&str>, int: Option<u64>| {
            let mut options = Options::new(OptionsKind::File);
            let mut opt = raw(&[("java_multiple_files", false)]);
            opt.identifier_value = word.map(String::from);
            opt.positive_int_value = int;
            options.uninterpreted_option.push(opt);
            let mut listener = DiagnosticCollector::new();
            resolver
                .resolve_all_options(&mut options, "acme", &mut listener)
                .map(|_| options.message.get_by_number(10).cloned())
        };

        assert_eq!(assign(Some("true"), None).unwrap(), Some(Value::Bool(true)));
        assert_eq!(assign(Some("false"), None).unwrap(), Some(Value::Bool(false)));
        for word in ["True", "t", "False", "f"] {
            let err = assign(Some(word), None).unwrap_err();
            assert!(matches!(err, BuildError::OptionValue { .. }), "{}", word);
        }
        assert!(matches!(assign(None, Some(1)), Err(BuildError::OptionValue { .. })));
    }

    #[test]
    fn test_coerce_ranges() {
        struct NoTypes;
        impl TypeLookup for NoTypes {
            fn find_message(&self, _: &str) -> Option<&DescriptorProto> {
                None
            }
            fn find_enum(&self, _: &str) -> Option<&EnumDescriptorProto> {
                None
            }
        }
        let field = |ty| FieldDescriptorProto {
            name: Some("f".into()),
            r#type: Some(ty),
            ..Default::default()
        };
        let neg = |m| Literal::Int {
            negative: true,
            magnitude: m,
        };
        assert_eq!(coerce_literal(&neg(2147483648), &field(Type::Int32), &NoTypes), Ok(Value::I32(i32::MIN)));
        assert!(coerce_literal(&neg(2147483649), &field(Type::Int32), &NoTypes).is_err());
        assert!(coerce_literal(&neg(1), &field(Type::Uint64), &NoTypes).is_err());
        assert_eq!(
            coerce_literal(&Literal::Ident("inf".into()), &field(Type::Float), &NoTypes),
            Ok(Value::F32(f32::INFINITY))
        );
        assert!(coerce_literal(&Literal::Ident("x".into()), &field(Type::Enum), &NoTypes).is_err());
    }
}
