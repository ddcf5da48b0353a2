//! Data types for the generation pipeline.
//!
//! This module defines the structures that flow between the three phases:
//!
//! 1. **Specialist Visions** - one vision and proposed file tree per expert role
//! 2. **Integrated Architecture** - canonical file tree plus dependency graph
//! 3. **Generated Units** - file implementations or long-form chapters
//! 4. **Jobs** - progress records for long-running background runs
//!
//! Field names are camelCase on the wire because the same shapes are requested
//! from, and parsed out of, model responses.

use archgen_sdk::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::roles::RoleSpec;

// ============================================================================
// Requirements
// ============================================================================

/// Ordered free-text requirements; the immutable input of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet {
    items: Vec<String>,
}

impl RequirementSet {
    /// Build a set, dropping blank entries and trimming the rest
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }

    /// Numbered list used inside prompts
    pub fn as_numbered_list(&self) -> String {
        self.items
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Planned Structure Types
// ============================================================================

/// A planned file (no content yet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub purpose: String,
}

/// Recursive folder tree of planned files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub purpose: String,

    #[serde(default)]
    pub files: Vec<FileDescriptor>,

    #[serde(default)]
    pub subfolders: Vec<FolderNode>,
}

impl FolderNode {
    /// Every leaf file as `(path, name)`, with paths relative to this folder.
    ///
    /// The folder's own name is not part of the path; files directly in it have
    /// a bare file name as their path.
    pub fn file_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        self.collect_entries("", &mut entries);
        entries
    }

    fn collect_entries(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for file in &self.files {
            out.push((join_path(prefix, &file.name), file.name.clone()));
        }
        for sub in &self.subfolders {
            sub.collect_entries(&join_path(prefix, &sub.name), out);
        }
    }

    /// Total number of planned files in the tree
    pub fn file_count(&self) -> usize {
        self.files.len() + self.subfolders.iter().map(|f| f.file_count()).sum::<usize>()
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

// ============================================================================
// Phase 1: Specialist Visions
// ============================================================================

/// One expert role's vision and proposed partial tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistVision {
    pub role: String,
    pub expertise: String,
    pub vision_text: String,
    pub proposed_tree: FolderNode,
}

/// A role whose vision call failed; kept alongside the successes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: String,
    pub error: String,
}

/// Output of phase 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level1Output {
    pub requirements: RequirementSet,

    /// Selected roles, integrator last
    pub roles: Vec<RoleSpec>,

    pub visions: Vec<SpecialistVision>,

    #[serde(default)]
    pub failures: Vec<RoleFailure>,
}

// ============================================================================
// Phase 2: Integrated Architecture
// ============================================================================

/// Dependency graph node for one planned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,

    pub path: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub purpose: String,

    /// File type / language hint (rust, typescript, config, ...)
    #[serde(rename = "type", default)]
    pub file_type: String,

    /// Paths this file depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Transpose of `dependencies`; recomputed after validation
    #[serde(default)]
    pub dependents: Vec<String>,

    /// Topological position, 1-based
    #[serde(default)]
    pub implementation_order: u32,
}

/// Merged architecture produced once by the integration phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedArchitecture {
    pub integrated_vision: String,

    #[serde(default)]
    pub resolution_notes: Vec<String>,

    pub root_folder: FolderNode,

    pub dependency_graph: Vec<FileNode>,
}

/// What the graph validation had to fix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRepair {
    /// Implementation order was recomputed from the dependency edges
    pub reordered: bool,

    /// Node paths rewritten to the tree-relative form
    pub normalized_paths: usize,

    /// Node names taken from the canonical tree
    pub renamed_nodes: usize,

    /// Duplicate dependency entries removed
    pub deduplicated_edges: usize,
}

impl GraphRepair {
    pub fn is_clean(&self) -> bool {
        *self == GraphRepair::default()
    }
}

/// Output of phase 2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level2Output {
    pub architecture: IntegratedArchitecture,

    #[serde(default)]
    pub repair: GraphRepair,
}

// ============================================================================
// Phase 3: Generated Units
// ============================================================================

/// Kind of schedulable output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    File,
    Chapter,
}

/// A file implementation or a chapter; immutable once `complete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedUnit {
    pub path: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub purpose: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    pub content: String,

    /// Language for files, "markdown" for chapters
    #[serde(default)]
    pub language: String,

    pub kind: UnitKind,

    pub complete: bool,

    /// Force-completed by the continuation bound
    #[serde(default)]
    pub possibly_incomplete: bool,
}

/// Completed-dependency material handed to a unit's generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyContext {
    pub name: String,
    pub path: String,
    pub purpose: String,
    pub content: String,
}

/// Output of phase 3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level3Output {
    pub units: Vec<GeneratedUnit>,
}

// ============================================================================
// Long-form Types
// ============================================================================

/// Accumulator for a long-form unit that is still being written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationState {
    pub unit_id: String,
    pub accumulated_content: String,
    pub remaining_sections: Vec<String>,
}

/// One planned chapter of the integration book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub sections: Vec<String>,

    /// Ids of chapters this one builds on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Outline of the integration book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOutline {
    pub title: String,
    pub chapters: Vec<ChapterPlan>,
}

// ============================================================================
// Job Types
// ============================================================================

/// What a background job generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Files,
    Book,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Files => "files",
            JobKind::Book => "book",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "files" => Some(JobKind::Files),
            "book" => Some(JobKind::Book),
            _ => None,
        }
    }
}

/// Progress record of a long-running generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: Uuid,

    pub kind: JobKind,

    pub status: JobStatus,

    pub total_units: usize,

    pub completed_units: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_unit_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<GeneratedUnit>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// A fresh job in the `initializing` state
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Initializing,
            total_units: 0,
            completed_units: 0,
            current_unit_label: None,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction of units done, 0.0 when the total is not known yet
    pub fn progress(&self) -> f64 {
        if self.total_units == 0 {
            0.0
        } else {
            self.completed_units as f64 / self.total_units as f64
        }
    }
}
