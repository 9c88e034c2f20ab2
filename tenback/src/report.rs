//! End-of-run summary: per-tenant outcomes, totals, elapsed time.

use std::time::Duration;

use crate::archive::TenantSummary;

/// Upload outcome for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// archive built and uploaded
    Ok,
    /// archive built, upload exhausted all retries
    Failed,
    /// tenant backup raised an error before upload
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "[OK]",
            Self::Failed => "[FAIL]",
            Self::Error => "[ERR]",
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// One tenant's row in the run summary.
#[derive(Debug)]
pub struct TenantResult {
    pub tenant: String,
    pub owner_id: String,
    pub outcome: Outcome,
    pub records: usize,
    pub files: u64,
}

impl TenantResult {
    pub fn from_summary(summary: &TenantSummary, outcome: Outcome) -> Self {
        TenantResult {
            tenant: summary.tenant.clone(),
            owner_id: summary.owner_id.clone(),
            outcome,
            records: summary.total_records(),
            files: summary.files_count,
        }
    }
}

/// Aggregate state of one orchestrator invocation. Append-only: stages add
/// results and errors, nothing is retried across stages.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<TenantResult>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn total_records(&self) -> usize {
        self.results.iter().map(|r| r.records).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.results.iter().map(|r| r.files).sum()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Renders the tabular report printed at the end of a run.
    pub fn render(&self, elapsed: Duration) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push_str("\nBACKUP SUMMARY:\n");
        out.push_str(&"-".repeat(60));
        out.push('\n');
        for result in &self.results {
            out.push_str(&format!(
                "  {:6} {:30} {:5} records  {:3} files\n",
                result.outcome.as_str(),
                result.tenant,
                result.records,
                result.files,
            ));
        }
        out.push_str(&"-".repeat(60));
        out.push_str(&format!(
            "\nDuration: {} | Errors: {}\n",
            format_elapsed(elapsed),
            self.errors.len()
        ));
        out.push_str(&"=".repeat(60));
        out
    }

    /// Body text for the aggregate webhook notification.
    pub fn notification_body(&self, run_date: &str, elapsed: Duration) -> String {
        if self.has_errors() {
            let error_list: String = self
                .errors
                .iter()
                .map(|e| format!("- {e}\n"))
                .collect();
            format!(
                "Date: {run_date}\nDuration: {}\nTenants: {}\n\nErrors:\n{error_list}",
                format_elapsed(elapsed),
                self.results.len(),
            )
        } else {
            format!(
                "Date: {run_date}\nDuration: {}\nTenants: {}\nTotal Records: {}\nTotal Files: {}",
                format_elapsed(elapsed),
                self.results.len(),
                self.total_records(),
                self.total_files(),
            )
        }
    }
}

/// `{m}m {s}s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
