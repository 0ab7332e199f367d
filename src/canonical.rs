//! Canonical form of a finished descriptor.
//!
//! A canonical descriptor has every type, extendee and method reference written as a fully
//! qualified `.name`, and every options message interpreted: no raw assignments left, known
//! fields typed, custom options stored either as typed extensions or as unknown bytes.
//! Canonicalizing a canonical descriptor changes nothing.

use std::sync::Arc;

use crate::config::BuildOptions;
use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorListener, ValidationCause};
use crate::error::BuildError;
use crate::options::OptionResolver;
use crate::pool::{FileDescriptor, Pool, SymbolIndex};
use crate::registry::{registry_for, ExtensionRegistry};
use crate::symbols::SymbolKind;

/// Brings descriptors built against a fixed set of dependencies into canonical form.
pub struct Canonicalizer<'a> {
    dependencies: &'a [Arc<FileDescriptor>],
    options: &'a BuildOptions,
    fallback: Option<&'a FileDescriptor>,
}

impl<'a> Canonicalizer<'a> {
    /// Names the dependencies do not define are also looked up in the meta-schema.
    pub fn new(dependencies: &'a [Arc<FileDescriptor>], options: &'a BuildOptions) -> Self {
        Canonicalizer {
            dependencies,
            options,
            fallback: Some(crate::meta::meta_schema().as_ref()),
        }
    }

    /// No implicit meta-schema. Used to build the meta-schema itself.
    pub fn standalone(dependencies: &'a [Arc<FileDescriptor>], options: &'a BuildOptions) -> Self {
        Canonicalizer {
            dependencies,
            options,
            fallback: None,
        }
    }

    fn pool<'p>(&'p self, proto: &'p FileDescriptorProto, index: &'p SymbolIndex) -> Pool<'p> {
        let pool = Pool::new(proto, index, self.dependencies);
        match self.fallback {
            Some(meta) if proto.name() != meta.name() => pool.with_fallback(meta),
            _ => pool,
        }
    }

    /// Rewrite `proto` into canonical form. Names that cannot be qualified and option
    /// names that cannot be resolved are reported; bad option values are errors.
    pub fn canonicalize(
        &self,
        mut proto: FileDescriptorProto,
        listener: &mut dyn ErrorListener,
    ) -> Result<FileDescriptorProto, BuildError> {
        self.qualify_names(&mut proto, listener);
        self.interpret_options(&mut proto, listener)?;
        if self.options.protoc_compatible {
            for (_, field) in proto.fields_mut() {
                if let (Some(text), Some(ty)) = (field.default_value.as_mut(), field.r#type) {
                    *text = protoc_default(text, ty);
                }
            }
        }
        tracing::debug!(file = proto.name(), "canonicalized descriptor");
        Ok(proto)
    }

    fn qualify_names(&self, proto: &mut FileDescriptorProto, listener: &mut dyn ErrorListener) {
        if !needs_qualifying(proto) {
            return;
        }
        let snapshot = proto.clone();
        let index = SymbolIndex::build(&snapshot);
        let pool = self.pool(&snapshot, &index);
        let file = snapshot.name();
        let mut report = |name: &str, what: &str, scope: &str| {
            listener.validation_error(
                Diagnostic::validation(
                    ValidationCause::UnresolvedTypeName,
                    format!("{} \"{}\" is not defined (referenced from \"{}\")", what, name, scope),
                )
                .in_file(file),
            );
        };

        for (scope, field) in proto.fields_mut() {
            if let Some(name) = field.type_name.clone().filter(|n| !n.starts_with('.')) {
                match pool.resolve(&name, &scope) {
                    Some((full, kind)) if kind.is_type() => {
                        field.type_name = Some(format!(".{}", full));
                        if field.r#type != Some(Type::Group) {
                            field.r#type = Some(if kind == SymbolKind::Enum {
                                Type::Enum
                            } else {
                                Type::Message
                            });
                        }
                    }
                    _ => report(&name, "type", &scope),
                }
            }
            if let Some(name) = field.extendee.clone().filter(|n| !n.starts_with('.')) {
                match pool.resolve(&name, &scope) {
                    Some((full, SymbolKind::Message)) => field.extendee = Some(format!(".{}", full)),
                    _ => report(&name, "extendee", &scope),
                }
            }
        }
        for (scope, method) in proto.methods_mut() {
            for slot in [&mut method.input_type, &mut method.output_type] {
                if let Some(name) = slot.clone().filter(|n| !n.starts_with('.')) {
                    match pool.resolve(&name, &scope) {
                        Some((full, SymbolKind::Message)) => *slot = Some(format!(".{}", full)),
                        _ => report(&name, "message type", &scope),
                    }
                }
            }
        }
    }

    fn interpret_options(
        &self,
        proto: &mut FileDescriptorProto,
        listener: &mut dyn ErrorListener,
    ) -> Result<(), BuildError> {
        if !has_raw_options(proto) {
            return Ok(());
        }
        let snapshot = proto.clone();
        let index = SymbolIndex::build(&snapshot);
        let pool = self.pool(&snapshot, &index);
        let owned;
        let registry: &ExtensionRegistry = match &self.options.registry {
            Some(registry) => registry,
            None => {
                owned = registry_for(&snapshot, self.dependencies).0;
                &owned
            }
        };
        let resolver = OptionResolver::new(
            &pool,
            registry,
            self.options.custom_options_as_extensions,
            snapshot.name(),
        );
        for (scope, options) in proto.options_mut() {
            resolver.resolve_all_options(options, &scope, listener)?;
        }
        Ok(())
    }
}

/// Canonicalize against `dependencies` with the meta-schema as fallback.
pub fn canonicalize(
    proto: FileDescriptorProto,
    dependencies: &[Arc<FileDescriptor>],
    options: &BuildOptions,
    listener: &mut dyn ErrorListener,
) -> Result<FileDescriptorProto, BuildError> {
    Canonicalizer::new(dependencies, options).canonicalize(proto, listener)
}

fn needs_qualifying(proto: &FileDescriptorProto) -> bool {
    let relative = |name: &Option<String>| name.as_deref().map_or(false, |n| !n.starts_with('.'));
    let mut fields: Vec<&FieldDescriptorProto> = proto.extension.iter().collect();
    let mut messages: Vec<&DescriptorProto> = proto.message_type.iter().collect();
    while let Some(msg) = messages.pop() {
        fields.extend(msg.field.iter().chain(&msg.extension));
        messages.extend(&msg.nested_type);
    }
    fields.iter().any(|f| relative(&f.type_name) || relative(&f.extendee))
        || proto
            .service
            .iter()
            .flat_map(|s| &s.method)
            .any(|m| relative(&m.input_type) || relative(&m.output_type))
}

fn has_raw_options(proto: &FileDescriptorProto) -> bool {
    has_leftover_options(proto, false)
}

fn has_leftover_options(proto: &FileDescriptorProto, unknown_bytes: bool) -> bool {
    let mut scratch = proto.clone();
    let leftover = scratch
        .options_mut()
        .into_iter()
        .any(|(_, o)| !o.uninterpreted_option.is_empty() || (unknown_bytes && !o.message.unknown().is_empty()));
    leftover
}

/// Whether `proto` is already in canonical form: every reference qualified and no raw
/// option assignments left. Leftover unknown option bytes count against it only when custom
/// options are meant to be stored as extensions.
pub fn is_canonical(proto: &FileDescriptorProto, options: &BuildOptions) -> bool {
    !needs_qualifying(proto) && !has_leftover_options(proto, options.custom_options_as_extensions)
}

/// Render a default value the way protoc writes it into descriptors: integers in decimal,
/// floating-point in the shortest of `%.15g`/`%.17g` (`%.6g`/`%.9g` for `float`) that reads
/// back exactly. Text that does not parse is returned unchanged.
pub fn protoc_default(text: &str, ty: Type) -> String {
    match ty {
        Type::Double | Type::Float => {
            let lower = text.to_ascii_lowercase();
            if matches!(lower.as_str(), "inf" | "-inf" | "nan" | "-nan") {
                return lower;
            }
            let value = match parse_float_text(text) {
                Some(v) => v,
                None => return text.to_string(),
            };
            if ty == Type::Double {
                simple_dtoa(value)
            } else {
                simple_ftoa(value as f32)
            }
        }
        Type::Int32
        | Type::Int64
        | Type::Uint32
        | Type::Uint64
        | Type::Sint32
        | Type::Sint64
        | Type::Fixed32
        | Type::Fixed64
        | Type::Sfixed32
        | Type::Sfixed64 => parse_int_text(text).map_or_else(|| text.to_string(), |v| v.to_string()),
        _ => text.to_string(),
    }
}

fn parse_int_text(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Hex and octal integer literals read as integers; everything else as a float, so the sign
/// of `-0` survives a second pass.
fn parse_float_text(text: &str) -> Option<f64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let radix_literal = digits.starts_with("0x")
        || digits.starts_with("0X")
        || (digits.len() > 1 && digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()));
    if radix_literal {
        if let Some(v) = parse_int_text(text) {
            return Some(if text.starts_with('-') && v == 0 { -0.0 } else { v as f64 });
        }
    }
    text.parse::<f64>().ok()
}

fn simple_dtoa(value: f64) -> String {
    let short = format_g(value, 15);
    if short.parse::<f64>().ok() == Some(value) {
        short
    } else {
        format_g(value, 17)
    }
}

fn simple_ftoa(value: f32) -> String {
    let short = format_g(value as f64, 6);
    if short.parse::<f32>().ok() == Some(value) {
        short
    } else {
        format_g(value as f64, 9)
    }
}

/// C's `%.{precision}g`.
fn format_g(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return if value.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".into()
        } else if value > 0.0 {
            "inf".into()
        } else {
            "-inf".into()
        };
    }
    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protoc_default_numbers() {
        assert_eq!(protoc_default("0x10", Type::Int32), "16");
        assert_eq!(protoc_default("-010", Type::Int64), "-8");
        assert_eq!(protoc_default("1.50", Type::Double), "1.5");
        assert_eq!(protoc_default("0.1", Type::Double), "0.1");
        assert_eq!(protoc_default("1e20", Type::Double), "1e+20");
        assert_eq!(protoc_default("0.1", Type::Float), "0.1");
        assert_eq!(protoc_default("0.00001", Type::Double), "1e-05");
        assert_eq!(protoc_default("-0.0", Type::Float), "-0");
        assert_eq!(protoc_default("-0", Type::Float), "-0");
        assert_eq!(protoc_default("010", Type::Double), "8");
        assert_eq!(protoc_default("-inf", Type::Double), "-inf");
        assert_eq!(protoc_default("abc", Type::String), "abc");
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(123456.0, 6), "123456");
        assert_eq!(format_g(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_g(0.0001, 6), "0.0001");
    }

    #[test]
    fn test_is_canonical() {
        let mut proto = FileDescriptorProto {
            name: Some("a.proto".into()),
            message_type: vec![DescriptorProto {
                name: Some("M".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("f".into()),
                    type_name: Some("M".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let options = BuildOptions::default();
        assert!(!is_canonical(&proto, &options));
        proto.message_type[0].field[0].type_name = Some(".M".into());
        assert!(is_canonical(&proto, &options));

        let mut field_options = Options::new(OptionsKind::Field);
        field_options.message.append_unknown(&[0x80, 0xa4, 0x18, 0x01]);
        proto.message_type[0].field[0].options = Some(field_options);
        assert!(!is_canonical(&proto, &options));
        assert!(is_canonical(&proto, &options.clone().custom_options_as_extensions(false)));
    }
}
