//! Mock implementations for testing

use cidopt_core::diagnostics::{Diagnostic, DiagnosticHandler, DiagnosticLevel, Subject};
use cidopt_core::lattice::{PrimeSupplier, TrialDivision};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock diagnostic handler that collects diagnostics
#[derive(Debug, Default)]
pub struct MockDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MockDiagnosticHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages reported about `subject`, in report order
    pub fn messages_for(&self, subject: &Subject) -> Vec<String> {
        self.diagnostics
            .lock()
            .unwrap()
            .iter()
            .filter(|d| &d.subject == subject)
            .map(|d| d.message.clone())
            .collect()
    }
}

impl DiagnosticHandler for MockDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }

    fn error_count(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}

/// Prime supplier that counts how often the encoder asks for a prime
#[derive(Debug, Default)]
pub struct CountingPrimeSupplier {
    calls: AtomicUsize,
}

impl CountingPrimeSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PrimeSupplier for CountingPrimeSupplier {
    fn next_prime(&self, n: u64) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        TrialDivision.next_prime(n)
    }
}
