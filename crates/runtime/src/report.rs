//! At-exit run report.
//!
//! Dumps machine KPIs when a run finishes, controlled by the `OPAL_REPORT`
//! environment variable:
//! - unset or `0` → no report, zero cost
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr

use serde::Serialize;

use crate::vm::Vm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

/// Parse the `OPAL_REPORT` environment variable.
pub fn format_from_env() -> Option<ReportFormat> {
    match std::env::var("OPAL_REPORT").ok()?.as_str() {
        "" | "0" => None,
        "1" => Some(ReportFormat::Human),
        "json" => Some(ReportFormat::Json),
        other => {
            eprintln!("Warning: OPAL_REPORT='{}' not recognized, ignoring", other);
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub instructions: u64,
    pub allocations: u64,
    pub collections: u64,
    pub objects_freed: u64,
    pub peak_objects: usize,
    pub elapsed_ms: f64,
}

impl RunReport {
    fn gather(vm: &Vm) -> RunReport {
        RunReport {
            instructions: vm.stats.instructions,
            allocations: vm.stats.allocations,
            collections: vm.stats.collections,
            objects_freed: vm.stats.objects_freed,
            peak_objects: vm.stats.peak_objects,
            elapsed_ms: vm.start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

/// Emit the report if `OPAL_REPORT` asks for one.
pub fn emit_if_configured(vm: &Vm) {
    let Some(format) = format_from_env() else { return };
    let report = RunReport::gather(vm);
    match format {
        ReportFormat::Human => {
            eprintln!("--- opal run report ---");
            eprintln!("instructions:  {}", report.instructions);
            eprintln!("allocations:   {}", report.allocations);
            eprintln!("collections:   {}", report.collections);
            eprintln!("objects freed: {}", report.objects_freed);
            eprintln!("peak objects:  {}", report.peak_objects);
            eprintln!("elapsed:       {:.3} ms", report.elapsed_ms);
        }
        ReportFormat::Json => {
            if let Ok(json) = serde_json::to_string(&report) {
                eprintln!("{}", json);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_format_from_env() {
        // Env vars are process-global; keep these cases in one serial test
        unsafe {
            std::env::remove_var("OPAL_REPORT");
        }
        assert_eq!(format_from_env(), None);

        unsafe {
            std::env::set_var("OPAL_REPORT", "1");
        }
        assert_eq!(format_from_env(), Some(ReportFormat::Human));

        unsafe {
            std::env::set_var("OPAL_REPORT", "json");
        }
        assert_eq!(format_from_env(), Some(ReportFormat::Json));

        unsafe {
            std::env::set_var("OPAL_REPORT", "0");
        }
        assert_eq!(format_from_env(), None);

        unsafe {
            std::env::remove_var("OPAL_REPORT");
        }
    }

    #[test]
    #[serial]
    fn test_report_serializes() {
        let report = RunReport {
            instructions: 10,
            allocations: 3,
            collections: 1,
            objects_freed: 2,
            peak_objects: 3,
            elapsed_ms: 0.5,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"instructions\":10"));
        assert!(json.contains("\"collections\":1"));
    }
}
