//! Batch-window configuration consumed, not owned, by the dispatcher.

use crate::types::ReportType;
use std::collections::HashMap;

/// Nominal window size used when neither the host configuration nor the
/// handler overrides it.
pub const DEFAULT_WINDOW: usize = 100;

/// Per-report-type batch window configuration.
///
/// Resolution order for one execution: explicit per-report-type override
/// here, then the handler's own preference, then [`DEFAULT_WINDOW`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    default_window: usize,
    overrides: HashMap<ReportType, usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_window: DEFAULT_WINDOW,
            overrides: HashMap::new(),
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window sizes below 1 are clamped to 1.
    pub fn with_default_window(mut self, window: usize) -> Self {
        self.default_window = window.max(1);
        self
    }

    pub fn with_window(mut self, report_type: ReportType, window: usize) -> Self {
        self.overrides.insert(report_type, window.max(1));
        self
    }

    pub fn default_window(&self) -> usize {
        self.default_window
    }

    /// Host-configured override for one report type, if any.
    pub fn override_for(&self, report_type: &ReportType) -> Option<usize> {
        self.overrides.get(report_type).copied()
    }
}
