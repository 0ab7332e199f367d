//! The stack of descriptor builders currently open while walking one file.
//!
//! Every frame either owns a builder or delegates element-adds to an ancestor. `extend` and
//! `oneof` blocks are delegating frames: the fields written inside them physically belong to
//! the enclosing message (or file), but the block still has its own nesting level and
//! structural path.

use std::collections::HashMap;

use crate::descriptor::*;
use crate::error::BuildError;

/// A partially-filled descriptor element, owned by the frame that opened it.
#[derive(Debug, Clone, PartialEq)]
pub enum Builder {
    File(FileDescriptorProto),
    Message(DescriptorProto),
    Field(FieldDescriptorProto),
    Enum(EnumDescriptorProto),
    EnumValue(EnumValueDescriptorProto),
    Service(ServiceDescriptorProto),
    Method(MethodDescriptorProto),
    Oneof(OneofDescriptorProto),
    ExtensionRange(ExtensionRange),
    Option(UninterpretedOption),
}

impl Builder {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Builder::File(_) => "file",
            Builder::Message(_) => "message",
            Builder::Field(_) => "field",
            Builder::Enum(_) => "enum",
            Builder::EnumValue(_) => "enum value",
            Builder::Service(_) => "service",
            Builder::Method(_) => "method",
            Builder::Oneof(_) => "oneof",
            Builder::ExtensionRange(_) => "extension range",
            Builder::Option(_) => "option",
        }
    }

    pub fn options_kind(&self) -> Option<OptionsKind> {
        Some(match self {
            Builder::File(_) => OptionsKind::File,
            Builder::Message(_) => OptionsKind::Message,
            Builder::Field(_) => OptionsKind::Field,
            Builder::Enum(_) => OptionsKind::Enum,
            Builder::EnumValue(_) => OptionsKind::EnumValue,
            Builder::Service(_) => OptionsKind::Service,
            Builder::Method(_) => OptionsKind::Method,
            Builder::Oneof(_) => OptionsKind::Oneof,
            Builder::ExtensionRange(_) => OptionsKind::ExtensionRange,
            Builder::Option(_) => return None,
        })
    }

    /// Options storage of this element.
    fn options_slot(&mut self) -> Option<(&mut Option<Options>, OptionsKind)> {
        let kind = self.options_kind()?;
        let slot = match self {
            Builder::File(f) => &mut f.options,
            Builder::Message(m) => &mut m.options,
            Builder::Field(f) => &mut f.options,
            Builder::Enum(e) => &mut e.options,
            Builder::EnumValue(v) => &mut v.options,
            Builder::Service(s) => &mut s.options,
            Builder::Method(m) => &mut m.options,
            Builder::Oneof(o) => &mut o.options,
            Builder::ExtensionRange(r) => &mut r.options,
            Builder::Option(_) => return None,
        };
        Some((slot, kind))
    }
}

/// Field number of the options message inside each kind of element.
fn options_tag(kind: OptionsKind) -> u32 {
    match kind {
        OptionsKind::File => tags::FILE_OPTIONS,
        OptionsKind::Message => tags::MESSAGE_OPTIONS,
        OptionsKind::Field => tags::FIELD_OPTIONS,
        OptionsKind::Oneof => tags::ONEOF_OPTIONS,
        OptionsKind::Enum => tags::ENUM_OPTIONS,
        OptionsKind::EnumValue => tags::ENUM_VALUE_OPTIONS,
        OptionsKind::Service => tags::SERVICE_OPTIONS,
        OptionsKind::Method => tags::METHOD_OPTIONS,
        OptionsKind::ExtensionRange => tags::RANGE_OPTIONS,
    }
}

/// What a delegating frame stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Delegation {
    /// `extend Foo { ... }`: fields become extensions of `extendee` (as written).
    Extend { extendee: String },
    /// `oneof x { ... }`: fields join the oneof declared at `index`.
    Oneof { index: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameTarget {
    Owns(Builder),
    Delegates { ancestor: usize, delegation: Delegation },
}

/// One open scope.
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub target: FrameTarget,
    pub parent: Option<usize>,
    /// Field number → number of elements added under it so far.
    counters: HashMap<u32, i32>,
    /// Structural path of this element from the file root.
    path: Vec<i32>,
}

impl ScopeFrame {
    fn new(target: FrameTarget, parent: Option<usize>, path: Vec<i32>) -> Self {
        ScopeFrame {
            target,
            parent,
            counters: HashMap::new(),
            path,
        }
    }

    fn next_index(&mut self, tag: u32) -> i32 {
        let counter = self.counters.entry(tag).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn path(&self) -> &[i32] {
        &self.path
    }
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new(file: FileDescriptorProto) -> Self {
        ScopeStack {
            frames: vec![ScopeFrame::new(
                FrameTarget::Owns(Builder::File(file)),
                None,
                Vec::new(),
            )],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&self) -> usize {
        self.frames.len() - 1
    }

    /// Structural path of the innermost open element.
    pub fn path(&self) -> &[i32] {
        &self.frames[self.top()].path
    }

    /// Index of the frame that receives element-adds made at frame `index`.
    fn owner_index(&self, index: usize) -> usize {
        match &self.frames[index].target {
            FrameTarget::Delegates { ancestor, .. } => *ancestor,
            FrameTarget::Owns(_) => index,
        }
    }

    fn delegation(&self) -> Option<&Delegation> {
        match &self.frames[self.top()].target {
            FrameTarget::Delegates { delegation, .. } => Some(delegation),
            FrameTarget::Owns(_) => None,
        }
    }

    fn scope_name(&self) -> &'static str {
        match &self.frames[self.top()].target {
            FrameTarget::Owns(b) => b.kind_name(),
            FrameTarget::Delegates {
                delegation: Delegation::Extend { .. },
                ..
            } => "extend",
            FrameTarget::Delegates {
                delegation: Delegation::Oneof { .. },
                ..
            } => "oneof",
        }
    }

    /// The builder element-adds currently go to.
    pub fn owner(&self) -> &Builder {
        match &self.frames[self.owner_index(self.top())].target {
            FrameTarget::Owns(b) => b,
            FrameTarget::Delegates { .. } => unreachable!("delegates always point at an owning frame"),
        }
    }

    pub fn owner_mut(&mut self) -> &mut Builder {
        let index = self.owner_index(self.top());
        match &mut self.frames[index].target {
            FrameTarget::Owns(b) => b,
            FrameTarget::Delegates { .. } => unreachable!("delegates always point at an owning frame"),
        }
    }

    /// The builder of the innermost frame, or `None` inside an `extend`/`oneof` block.
    pub fn current_mut(&mut self) -> Option<&mut Builder> {
        let top = self.top();
        match &mut self.frames[top].target {
            FrameTarget::Owns(b) => Some(b),
            FrameTarget::Delegates { .. } => None,
        }
    }

    /// Field number under which `child` is stored in the current owner, if it may be added here.
    fn child_tag(&self, child: &Builder) -> Option<u32> {
        let delegation = self.delegation();
        let extend = matches!(delegation, Some(Delegation::Extend { .. }));
        let plain = delegation.is_none();
        match (self.owner(), child) {
            (Builder::File(_), Builder::Message(_)) => Some(tags::FILE_MESSAGE_TYPE),
            (Builder::File(_), Builder::Enum(_)) if plain => Some(tags::FILE_ENUM_TYPE),
            (Builder::File(_), Builder::Service(_)) if plain => Some(tags::FILE_SERVICE),
            (Builder::File(_), Builder::Field(_)) if extend => Some(tags::FILE_EXTENSION),
            (Builder::Message(_), Builder::Field(_)) if extend => Some(tags::MESSAGE_EXTENSION),
            (Builder::Message(_), Builder::Field(_)) => Some(tags::MESSAGE_FIELD),
            (Builder::Message(_), Builder::Message(_)) => Some(tags::MESSAGE_NESTED_TYPE),
            (Builder::Message(_), Builder::Enum(_)) if plain => Some(tags::MESSAGE_ENUM_TYPE),
            (Builder::Message(_), Builder::ExtensionRange(_)) if plain => {
                Some(tags::MESSAGE_EXTENSION_RANGE)
            }
            (Builder::Enum(_), Builder::EnumValue(_)) => Some(tags::ENUM_VALUE),
            (Builder::Service(_), Builder::Method(_)) => Some(tags::SERVICE_METHOD),
            _ => None,
        }
    }

    fn invalid(&self, child: &Builder) -> BuildError {
        BuildError::InvalidScope {
            operation: child.kind_name(),
            scope: self.scope_name(),
        }
    }

    /// Open `builder` as a child of the current scope, returning its structural path.
    pub fn open(&mut self, builder: Builder) -> Result<&[i32], BuildError> {
        let top = self.top();
        let path = match &builder {
            Builder::Option(_) => {
                let kind = match &self.frames[top].target {
                    FrameTarget::Owns(b) => match b {
                        Builder::Option(_) => None,
                        other => other.options_kind(),
                    },
                    FrameTarget::Delegates {
                        delegation: Delegation::Oneof { .. },
                        ..
                    } => Some(OptionsKind::Oneof),
                    FrameTarget::Delegates { .. } => None,
                };
                let kind = kind.ok_or_else(|| self.invalid(&builder))?;
                let frame = &mut self.frames[top];
                let index = frame.next_index(tags::UNINTERPRETED_OPTION);
                let mut path = frame.path.clone();
                path.extend([options_tag(kind) as i32, tags::UNINTERPRETED_OPTION as i32, index]);
                path
            }
            Builder::File(_) | Builder::Oneof(_) => return Err(self.invalid(&builder)),
            child => {
                let tag = self.child_tag(child).ok_or_else(|| self.invalid(child))?;
                let owner = self.owner_index(top);
                let frame = &mut self.frames[owner];
                let index = frame.next_index(tag);
                let mut path = frame.path.clone();
                path.extend([tag as i32, index]);
                path
            }
        };
        self.frames
            .push(ScopeFrame::new(FrameTarget::Owns(builder), Some(top), path));
        Ok(self.path())
    }

    /// Open an `extend` block. Fields opened inside it become extensions of the owner.
    pub fn open_extend(&mut self, extendee: impl Into<String>) -> Result<&[i32], BuildError> {
        let top = self.top();
        let owner = self.owner_index(top);
        let tag = match &self.frames[owner].target {
            FrameTarget::Owns(Builder::File(_)) if owner == top => tags::FILE_EXTENSION,
            FrameTarget::Owns(Builder::Message(_)) if owner == top => tags::MESSAGE_EXTENSION,
            _ => {
                return Err(BuildError::InvalidScope {
                    operation: "extend",
                    scope: self.scope_name(),
                })
            }
        };
        let mut path = self.frames[owner].path.clone();
        path.push(tag as i32);
        self.frames.push(ScopeFrame::new(
            FrameTarget::Delegates {
                ancestor: owner,
                delegation: Delegation::Extend {
                    extendee: extendee.into(),
                },
            },
            Some(top),
            path,
        ));
        Ok(self.path())
    }

    /// Add `oneof` to the current message and open a block whose fields join it.
    /// Returns the oneof's index within the message.
    pub fn open_oneof(&mut self, oneof: OneofDescriptorProto) -> Result<i32, BuildError> {
        let top = self.top();
        let index = match &mut self.frames[top].target {
            FrameTarget::Owns(Builder::Message(m)) => {
                m.oneof_decl.push(oneof);
                m.oneof_decl.len() as i32 - 1
            }
            _ => {
                return Err(BuildError::InvalidScope {
                    operation: "oneof",
                    scope: self.scope_name(),
                })
            }
        };
        let frame = &mut self.frames[top];
        frame.next_index(tags::MESSAGE_ONEOF_DECL);
        let mut path = frame.path.clone();
        path.extend([tags::MESSAGE_ONEOF_DECL as i32, index]);
        self.frames.push(ScopeFrame::new(
            FrameTarget::Delegates {
                ancestor: top,
                delegation: Delegation::Oneof { index },
            },
            Some(top),
            path,
        ));
        Ok(index)
    }

    /// Close the innermost frame and hand its builder to the owning parent.
    pub fn close(&mut self) -> Result<(), BuildError> {
        if self.frames.len() <= 1 {
            return Err(BuildError::PopRoot);
        }
        let frame = self.frames.pop().ok_or(BuildError::PopRoot)?;
        let builder = match frame.target {
            FrameTarget::Delegates { .. } => return Ok(()),
            FrameTarget::Owns(b) => b,
        };
        let parent = self.top();
        let owner = self.owner_index(parent);
        let delegation = self.delegation().cloned();

        if let Builder::Option(raw) = builder {
            let (slot, kind) = match (&mut self.frames[owner].target, delegation) {
                (FrameTarget::Owns(Builder::Message(m)), Some(Delegation::Oneof { index })) => {
                    let oneof = m
                        .oneof_decl
                        .get_mut(index as usize)
                        .ok_or(BuildError::InvalidScope {
                            operation: "option",
                            scope: "oneof",
                        })?;
                    (&mut oneof.options, OptionsKind::Oneof)
                }
                (FrameTarget::Owns(b), None) => b.options_slot().ok_or(BuildError::InvalidScope {
                    operation: "option",
                    scope: "option",
                })?,
                _ => {
                    return Err(BuildError::InvalidScope {
                        operation: "option",
                        scope: "extend",
                    })
                }
            };
            slot.get_or_insert_with(|| Options::new(kind))
                .uninterpreted_option
                .push(raw);
            return Ok(());
        }

        match &mut self.frames[owner].target {
            FrameTarget::Owns(target) => attach(target, builder, delegation),
            FrameTarget::Delegates { .. } => unreachable!("delegates always point at an owning frame"),
        }
    }

    /// Record one option assignment on the innermost element.
    pub fn add_option(&mut self, raw: UninterpretedOption) -> Result<(), BuildError> {
        self.open(Builder::Option(raw))?;
        self.close()
    }

    /// Take the finished file. Every frame but the root must have been closed.
    pub fn finish(mut self) -> Result<FileDescriptorProto, BuildError> {
        if self.frames.len() != 1 {
            return Err(BuildError::InvalidScope {
                operation: "finish",
                scope: self.scope_name(),
            });
        }
        match self.frames.pop().map(|f| f.target) {
            Some(FrameTarget::Owns(Builder::File(file))) => Ok(file),
            _ => Err(BuildError::PopRoot),
        }
    }
}

fn attach(target: &mut Builder, child: Builder, delegation: Option<Delegation>) -> Result<(), BuildError> {
    match (target, child) {
        (Builder::File(f), Builder::Message(m)) => f.message_type.push(m),
        (Builder::File(f), Builder::Enum(e)) => f.enum_type.push(e),
        (Builder::File(f), Builder::Service(s)) => f.service.push(s),
        (Builder::File(f), Builder::Field(mut field)) => {
            if let Some(Delegation::Extend { extendee }) = delegation {
                field.extendee = Some(extendee);
            }
            f.extension.push(field);
        }
        (Builder::Message(m), Builder::Field(mut field)) => match delegation {
            Some(Delegation::Extend { extendee }) => {
                field.extendee = Some(extendee);
                m.extension.push(field);
            }
            Some(Delegation::Oneof { index }) => {
                field.oneof_index = Some(index);
                m.field.push(field);
            }
            None => m.field.push(field),
        },
        (Builder::Message(m), Builder::Message(nested)) => m.nested_type.push(nested),
        (Builder::Message(m), Builder::Enum(e)) => m.enum_type.push(e),
        (Builder::Message(m), Builder::ExtensionRange(r)) => m.extension_range.push(r),
        (Builder::Enum(e), Builder::EnumValue(v)) => e.value.push(v),
        (Builder::Service(s), Builder::Method(m)) => s.method.push(m),
        (target, child) => {
            return Err(BuildError::InvalidScope {
                operation: child.kind_name(),
                scope: target.kind_name(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_message(name: &str) -> Builder {
        Builder::Message(DescriptorProto {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    fn named_field(name: &str, number: i32) -> Builder {
        Builder::Field(FieldDescriptorProto {
            name: Some(name.into()),
            number: Some(number),
            ..Default::default()
        })
    }

    #[test]
    fn test_method_outside_service_rejected() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        scopes.open(named_message("M")).unwrap();
        let err = scopes.open(Builder::Method(Default::default())).unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidScope {
                operation: "method",
                scope: "message"
            }
        );
    }

    #[test]
    fn test_close_root_fails() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        assert_eq!(scopes.close(), Err(BuildError::PopRoot));
    }

    #[test]
    fn test_paths_and_attachment() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        assert_eq!(scopes.open(named_message("A")).unwrap(), &[4, 0]);
        scopes.close().unwrap();
        assert_eq!(scopes.open(named_message("B")).unwrap(), &[4, 1]);
        assert_eq!(scopes.open(named_field("x", 1)).unwrap(), &[4, 1, 2, 0]);
        scopes.close().unwrap();
        assert_eq!(scopes.open(named_message("Inner")).unwrap(), &[4, 1, 3, 0]);
        scopes.close().unwrap();
        scopes.close().unwrap();

        let file = scopes.finish().unwrap();
        assert_eq!(file.message_type.len(), 2);
        assert_eq!(file.message_type[1].field[0].name(), "x");
        assert_eq!(file.message_type[1].nested_type[0].name(), "Inner");
    }

    #[test]
    fn test_oneof_delegates_to_message() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        scopes.open(named_message("M")).unwrap();
        scopes.open(named_field("plain", 1)).unwrap();
        scopes.close().unwrap();
        let index = scopes
            .open_oneof(OneofDescriptorProto {
                name: Some("choice".into()),
                options: None,
            })
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(scopes.path(), &[4, 0, 8, 0]);
        assert_eq!(scopes.open(named_field("a", 2)).unwrap(), &[4, 0, 2, 1]);
        scopes.close().unwrap();
        scopes.add_option(UninterpretedOption::default()).unwrap();
        scopes.close().unwrap();
        scopes.close().unwrap();

        let file = scopes.finish().unwrap();
        let m = &file.message_type[0];
        assert_eq!(m.field[1].oneof_index, Some(0));
        assert_eq!(m.field[0].oneof_index, None);
        assert_eq!(
            m.oneof_decl[0].options.as_ref().unwrap().uninterpreted_option.len(),
            1
        );
    }

    #[test]
    fn test_extend_fields_become_extensions() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        assert_eq!(scopes.open_extend("Foo").unwrap(), &[7]);
        assert_eq!(scopes.open(named_field("bar", 100)).unwrap(), &[7, 0]);
        scopes.close().unwrap();
        let err = scopes.add_option(UninterpretedOption::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidScope { scope: "extend", .. }));
        scopes.close().unwrap();

        let file = scopes.finish().unwrap();
        assert_eq!(file.extension[0].extendee.as_deref(), Some("Foo"));
        assert!(file.message_type.is_empty());
    }

    #[test]
    fn test_options_attach_to_innermost_element() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        scopes.add_option(UninterpretedOption::default()).unwrap();
        scopes.open(named_message("M")).unwrap();
        scopes.open(named_field("f", 1)).unwrap();
        scopes.add_option(UninterpretedOption::default()).unwrap();
        scopes.close().unwrap();
        scopes.close().unwrap();
        let file = scopes.finish().unwrap();
        assert_eq!(file.options.as_ref().unwrap().kind, OptionsKind::File);
        let field_opts = file.message_type[0].field[0].options.as_ref().unwrap();
        assert_eq!(field_opts.kind, OptionsKind::Field);
        assert_eq!(field_opts.uninterpreted_option.len(), 1);
    }

    #[test]
    fn test_finish_with_open_frames_fails() {
        let mut scopes = ScopeStack::new(FileDescriptorProto::default());
        scopes.open(named_message("M")).unwrap();
        assert!(scopes.finish().is_err());
    }
}
