//! Error-reporting boundary.
//!
//! Syntax errors, local semantic errors, resolution errors and orchestration errors are all
//! delivered through an [`ErrorListener`] so that a caller can collect every problem of a
//! build in one pass. Only structural failures travel as `Err` values.

use std::fmt;

/// Structured cause attached to every validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationCause {
    DuplicateName,
    DuplicateNumber,
    InvalidExtensionRange,
    OverlappingExtensionRange,
    FieldInExtensionRange,
    ReservedNumber,
    ReservedName,
    DuplicateOptionName,
    UnresolvedTypeName,
    UnresolvedOptionName,
    DuplicateExtensionNumber,
    CircularDependency,
    MissingDependency,
    UnbuiltDependency,
    ReservedSpaceViolation,
}

impl ValidationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCause::DuplicateName => "duplicate name",
            ValidationCause::DuplicateNumber => "duplicate number",
            ValidationCause::InvalidExtensionRange => "invalid extension range",
            ValidationCause::OverlappingExtensionRange => "overlapping extension range",
            ValidationCause::FieldInExtensionRange => "field in extension range",
            ValidationCause::ReservedNumber => "reserved number",
            ValidationCause::ReservedName => "reserved name",
            ValidationCause::DuplicateOptionName => "duplicate option name",
            ValidationCause::UnresolvedTypeName => "unresolved type name",
            ValidationCause::UnresolvedOptionName => "unresolved option name",
            ValidationCause::DuplicateExtensionNumber => "duplicate extension number",
            ValidationCause::CircularDependency => "circular dependency",
            ValidationCause::MissingDependency => "missing dependency",
            ValidationCause::UnbuiltDependency => "unbuilt dependency",
            ValidationCause::ReservedSpaceViolation => "reserved space violation",
        }
    }
}

impl fmt::Display for ValidationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line/column position in schema source (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
    /// `None` for syntax errors.
    pub cause: Option<ValidationCause>,
}

impl Diagnostic {
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            file: None,
            line: Some(line),
            column: Some(column),
            message: message.into(),
            cause: None,
        }
    }

    pub fn validation(cause: ValidationCause, message: impl Into<String>) -> Self {
        Diagnostic {
            file: None,
            line: None,
            column: None,
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn at(mut self, span: Option<Span>) -> Self {
        if let Some(span) = span {
            self.line = Some(span.line);
            self.column = Some(span.column);
        }
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, "{}:{}:", line, column)?;
        }
        if self.file.is_some() || self.line.is_some() {
            f.write_str(" ")?;
        }
        match self.cause {
            Some(cause) => write!(f, "{} ({})", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

/// Receives diagnostics as they are produced.
pub trait ErrorListener {
    fn syntax_error(&mut self, diagnostic: Diagnostic);
    fn validation_error(&mut self, diagnostic: Diagnostic);
}

impl<L: ErrorListener + ?Sized> ErrorListener for &mut L {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        (**self).syntax_error(diagnostic)
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        (**self).validation_error(diagnostic)
    }
}

impl<L: ErrorListener + ?Sized> ErrorListener for Box<L> {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        (**self).syntax_error(diagnostic)
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        (**self).validation_error(diagnostic)
    }
}

/// Stores every diagnostic it receives.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    pub syntax: Vec<Diagnostic>,
    pub validation: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.syntax.is_empty() && self.validation.is_empty()
    }

    /// Number of validation diagnostics carrying `cause`.
    pub fn count(&self, cause: ValidationCause) -> usize {
        self.validation
            .iter()
            .filter(|d| d.cause == Some(cause))
            .count()
    }

    pub fn causes(&self) -> Vec<ValidationCause> {
        self.validation.iter().filter_map(|d| d.cause).collect()
    }
}

impl ErrorListener for DiagnosticCollector {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        self.syntax.push(diagnostic);
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        self.validation.push(diagnostic);
    }
}

/// Forwards each diagnostic to every delegate in order.
#[derive(Default)]
pub struct FanOutListener<'a> {
    delegates: Vec<Box<dyn ErrorListener + 'a>>,
}

impl<'a> FanOutListener<'a> {
    pub fn new() -> Self {
        FanOutListener {
            delegates: Vec::new(),
        }
    }

    pub fn with(mut self, delegate: impl ErrorListener + 'a) -> Self {
        self.delegates.push(Box::new(delegate));
        self
    }

    pub fn push(&mut self, delegate: impl ErrorListener + 'a) {
        self.delegates.push(Box::new(delegate));
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl ErrorListener for FanOutListener<'_> {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        for delegate in &mut self.delegates {
            delegate.syntax_error(diagnostic.clone());
        }
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        for delegate in &mut self.delegates {
            delegate.validation_error(diagnostic.clone());
        }
    }
}

/// Binds a listener to one file name; diagnostics without a file get this one.
pub struct FileListener<'a> {
    file: String,
    inner: &'a mut dyn ErrorListener,
}

impl<'a> FileListener<'a> {
    pub fn new(file: impl Into<String>, inner: &'a mut dyn ErrorListener) -> Self {
        FileListener {
            file: file.into(),
            inner,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    fn contextualize(&self, mut diagnostic: Diagnostic) -> Diagnostic {
        if diagnostic.file.is_none() {
            diagnostic.file = Some(self.file.clone());
        }
        diagnostic
    }
}

impl ErrorListener for FileListener<'_> {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        let diagnostic = self.contextualize(diagnostic);
        self.inner.syntax_error(diagnostic);
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        let diagnostic = self.contextualize(diagnostic);
        self.inner.validation_error(diagnostic);
    }
}

/// Logs every diagnostic through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl ErrorListener for TracingListener {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(target: "protosema::syntax", "{}", diagnostic);
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(target: "protosema::validation", "{}", diagnostic);
    }
}

/// Optional collaborator receiving source positions keyed by structural path
/// (field-number/index pairs from the file root, as in `SourceCodeInfo`).
pub trait LocationSink {
    fn span(&mut self, path: &[i32], span: Span);

    fn comment(&mut self, _path: &[i32], _text: &str) {}
}

/// A [`LocationSink`] that records everything, mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordedLocations {
    pub spans: Vec<(Vec<i32>, Span)>,
    pub comments: Vec<(Vec<i32>, String)>,
}

impl RecordedLocations {
    pub fn span_of(&self, path: &[i32]) -> Option<Span> {
        self.spans
            .iter()
            .find(|(p, _)| p.as_slice() == path)
            .map(|(_, s)| *s)
    }
}

impl LocationSink for RecordedLocations {
    fn span(&mut self, path: &[i32], span: Span) {
        self.spans.push((path.to_vec(), span));
    }

    fn comment(&mut self, path: &[i32], text: &str) {
        self.comments.push((path.to_vec(), text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_reaches_every_delegate() {
        let mut a = DiagnosticCollector::new();
        let mut b = DiagnosticCollector::new();
        {
            let mut fan = FanOutListener::new().with(&mut a).with(&mut b);
            assert_eq!(fan.len(), 2);
            fan.validation_error(Diagnostic::validation(
                ValidationCause::DuplicateName,
                "x",
            ));
            fan.syntax_error(Diagnostic::syntax(1, 2, "bad"));
        }
        assert_eq!(a.validation.len(), 1);
        assert_eq!(b.validation.len(), 1);
        assert_eq!(a.syntax.len(), 1);
        assert_eq!(b.syntax[0].column, Some(2));
    }

    #[test]
    fn test_file_listener_fills_in_file_name() {
        let mut sink = DiagnosticCollector::new();
        {
            let mut bound = FileListener::new("a.proto", &mut sink);
            bound.validation_error(Diagnostic::validation(ValidationCause::DuplicateNumber, "n"));
            bound.validation_error(
                Diagnostic::validation(ValidationCause::DuplicateNumber, "n").in_file("b.proto"),
            );
        }
        assert_eq!(sink.validation[0].file.as_deref(), Some("a.proto"));
        assert_eq!(sink.validation[1].file.as_deref(), Some("b.proto"));
        assert_eq!(sink.count(ValidationCause::DuplicateNumber), 2);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::validation(ValidationCause::MissingDependency, "x.proto not found")
            .in_file("a.proto")
            .at(Some(Span::new(3, 7)));
        assert_eq!(
            d.to_string(),
            "a.proto:3:7: x.proto not found (missing dependency)"
        );
    }
}
