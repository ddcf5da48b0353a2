//! Shared event and status types for archgen pipelines.
//!
//! Two logging channels live here:
//!
//! - [`PipelineLog`] events, serialized as JSON lines on stderr so a supervising
//!   process (or a test harness) can follow a run phase by phase and unit by unit.
//! - Console macros that print coloured, human-readable progress to stdout.
//!
//! [`JobStatus`] is the lifecycle shared between the job driver and pollers.

use serde::{Deserialize, Serialize};

/// Prefix that marks a structured event line on stderr
pub const EVENT_PREFIX: &str = "__ARCHGEN_EVENT__:";

/// Lifecycle of a background generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Initializing,
    InProgress,
    Complete,
    Error,
}

impl JobStatus {
    /// `Complete` and `Error` are terminal; nothing moves a job out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::InProgress => "in-progress",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initializing" => Some(JobStatus::Initializing),
            "in-progress" => Some(JobStatus::InProgress),
            "complete" => Some(JobStatus::Complete),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured logging events emitted by pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineLog {
    /// Phase started
    PhaseStarted {
        phase: usize,
        name: String,
        total_phases: usize,
    },
    /// Phase completed
    PhaseCompleted { phase: usize, name: String },
    /// Phase failed
    PhaseFailed {
        phase: usize,
        name: String,
        error: String,
    },
    /// A unit (role vision, file, chapter) started
    UnitStarted {
        phase: usize,
        unit_id: String,
        description: String,
        total_units: Option<usize>,
    },
    /// Unit progress update
    UnitProgress { unit_id: String, message: String },
    /// Unit completed
    UnitCompleted {
        unit_id: String,
        result: Option<String>,
    },
    /// Unit failed
    UnitFailed { unit_id: String, error: String },
    /// A model call failed transiently and will be retried
    CallRetried {
        call: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// A long-form unit requested another continuation round
    ContinuationRound {
        unit_id: String,
        round: u32,
        remaining_sections: Vec<String>,
    },
    /// State file written (intermediate phase outputs)
    StateFileCreated {
        phase: usize,
        file_path: String,
        description: String,
    },
}

impl PipelineLog {
    /// Render the event as a single prefixed line
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self)
            .ok()
            .map(|json| format!("{}{}", EVENT_PREFIX, json))
    }

    /// Parse a line previously produced by [`PipelineLog::to_line`]
    pub fn from_line(line: &str) -> Option<Self> {
        let json = line.trim().strip_prefix(EVENT_PREFIX)?;
        serde_json::from_str(json).ok()
    }

    /// Emit this event to stderr
    pub fn emit(&self) {
        if let Some(line) = self.to_line() {
            use std::io::Write;
            eprintln!("{}", line);
            // Flush so interleaved concurrent vision calls keep whole lines
            let _ = std::io::stderr().flush();
        }
    }
}

#[macro_export]
macro_rules! log_phase_start {
    ($phase:expr, $name:expr, $total:expr) => {
        $crate::PipelineLog::PhaseStarted {
            phase: $phase,
            name: $name.to_string(),
            total_phases: $total,
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_complete {
    ($phase:expr, $name:expr) => {
        $crate::PipelineLog::PhaseCompleted {
            phase: $phase,
            name: $name.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_failed {
    ($phase:expr, $name:expr, $error:expr) => {
        $crate::PipelineLog::PhaseFailed {
            phase: $phase,
            name: $name.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_unit_start {
    ($phase:expr, $unit_id:expr, $desc:expr) => {
        $crate::PipelineLog::UnitStarted {
            phase: $phase,
            unit_id: $unit_id.to_string(),
            description: $desc.to_string(),
            total_units: None,
        }
        .emit();
    };
    ($phase:expr, $unit_id:expr, $desc:expr, $total:expr) => {
        $crate::PipelineLog::UnitStarted {
            phase: $phase,
            unit_id: $unit_id.to_string(),
            description: $desc.to_string(),
            total_units: Some($total),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_unit_progress {
    ($unit_id:expr, $msg:expr) => {
        $crate::PipelineLog::UnitProgress {
            unit_id: $unit_id.to_string(),
            message: $msg.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_unit_complete {
    ($unit_id:expr) => {
        $crate::PipelineLog::UnitCompleted {
            unit_id: $unit_id.to_string(),
            result: None,
        }
        .emit();
    };
    ($unit_id:expr, $result:expr) => {
        $crate::PipelineLog::UnitCompleted {
            unit_id: $unit_id.to_string(),
            result: Some($result.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_unit_failed {
    ($unit_id:expr, $error:expr) => {
        $crate::PipelineLog::UnitFailed {
            unit_id: $unit_id.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_call_retry {
    ($call:expr, $attempt:expr, $delay_ms:expr, $error:expr) => {
        $crate::PipelineLog::CallRetried {
            call: $call.to_string(),
            attempt: $attempt,
            delay_ms: $delay_ms,
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_continuation_round {
    ($unit_id:expr, $round:expr, $remaining:expr) => {
        $crate::PipelineLog::ContinuationRound {
            unit_id: $unit_id.to_string(),
            round: $round,
            remaining_sections: $remaining.to_vec(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_state_file {
    ($phase:expr, $path:expr, $desc:expr) => {
        $crate::PipelineLog::StateFileCreated {
            phase: $phase,
            file_path: $path.to_string(),
            description: $desc.to_string(),
        }
        .emit();
    };
}

// ============================================================================
// Console Logging Macros
// ============================================================================
// Coloured console output for people watching a CLI run, complementing the
// structured PipelineLog events above.
// ============================================================================

/// Logs the start of a pipeline phase with a header and description.
///
/// # Example
/// ```
/// use archgen_sdk::log_phase_start_console;
/// log_phase_start_console!(1, "Specialist Visions", "One vision per expert role");
/// ```
///
/// Outputs:
/// ```text
/// ═══ PHASE 1: Specialist Visions ═══
/// One vision per expert role
/// ```
#[macro_export]
macro_rules! log_phase_start_console {
    ($phase:expr, $title:expr, $description:expr) => {
        println!("\x1b[1;36m═══ PHASE {}: {} ═══\x1b[0m", $phase, $title);
        println!("\x1b[36m{}\x1b[0m", $description);
    };
}

/// Logs the completion of a pipeline phase.
#[macro_export]
macro_rules! log_phase_complete_console {
    ($phase:expr) => {
        println!("\x1b[32m✓ Phase {} complete\x1b[0m", $phase);
    };
}

/// Logs the start of parallel execution.
///
/// # Example
/// ```
/// use archgen_sdk::log_parallel_start;
/// log_parallel_start!(4, "specialist calls");
/// ```
#[macro_export]
macro_rules! log_parallel_start {
    ($num_items:expr, $item_type:expr) => {
        println!(
            "\x1b[36m→ Running {} {} (concurrency limited)\x1b[0m",
            $num_items, $item_type
        );
    };
}

/// Logs progress of an operation.
///
/// # Example
/// ```
/// use archgen_sdk::log_progress;
/// log_progress!(3, 5, "files");
/// ```
///
/// Outputs:
/// ```text
/// Progress: 3/5 files
/// ```
#[macro_export]
macro_rules! log_progress {
    ($current:expr, $total:expr, $item_type:expr) => {
        println!(
            "\x1b[36mProgress: {}/{} {}\x1b[0m",
            $current, $total, $item_type
        );
    };
}

/// Logs the number of items found.
#[macro_export]
macro_rules! log_found {
    ($count:expr, $item_type:expr) => {
        println!("\x1b[36mFound {} {}\x1b[0m", $count, $item_type);
    };
}

/// Logs an informational message.
///
/// # Example
/// ```
/// use archgen_sdk::log_info;
/// log_info!("Loading requirements...");
/// let n = 3;
/// log_info!("Selected {} roles", n);
/// ```
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// Outputs:
/// ```text
/// ⚠ Warning: chapter 3 force-completed
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs that a file has been saved.
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        println!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}
