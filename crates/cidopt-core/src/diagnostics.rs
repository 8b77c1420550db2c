use std::fmt;
use std::sync::Mutex;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// What a diagnostic is about: a class, a call site, or nothing in particular
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Program,
    Class(String),
    CallSite { unit: String, site: u32 },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Program => write!(f, "program"),
            Subject::Class(name) => write!(f, "class {}", name),
            Subject::CallSite { unit, site } => write!(f, "{}:site{}", unit, site),
        }
    }
}

/// A diagnostic message with subject and severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub subject: Subject,
    pub message: String,
}

impl Diagnostic {
    pub fn error(subject: Subject, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            subject,
            message: message.into(),
        }
    }

    pub fn warning(subject: Subject, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            subject,
            message: message.into(),
        }
    }

    pub fn info(subject: Subject, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            subject,
            message: message.into(),
        }
    }
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error(&self, subject: Subject, message: &str) {
        self.report(Diagnostic::error(subject, message));
    }

    fn warning(&self, subject: Subject, message: &str) {
        self.report(Diagnostic::warning(subject, message));
    }

    fn info(&self, subject: Subject, message: &str) {
        self.report(Diagnostic::info(subject, message));
    }

    fn has_errors(&self) -> bool;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

fn count_level(diagnostics: &Mutex<Vec<Diagnostic>>, level: DiagnosticLevel) -> usize {
    diagnostics
        .lock()
        .unwrap()
        .iter()
        .filter(|d| d.level == level)
        .count()
}

/// Console-based diagnostic handler that prints to stderr
pub struct ConsoleDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
    pretty: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(pretty: bool) -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            pretty,
        }
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        let level_str = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        };

        if self.pretty {
            eprintln!(
                "\x1b[1m{}\x1b[0m at {}: {}",
                level_str, diagnostic.subject, diagnostic.message
            );
        } else {
            eprintln!(
                "{} at {}: {}",
                level_str, diagnostic.subject, diagnostic.message
            );
        }

        self.diagnostics.lock().unwrap().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}

/// Collecting diagnostic handler for testing
/// Collects all diagnostics without printing
#[derive(Default)]
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        count_level(&self.diagnostics, DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}
