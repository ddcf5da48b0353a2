//! Expert role selection.
//!
//! Roles come from a versioned [`RoleTable`]: base roles are always present,
//! conditional roles join when any of their keywords appears in the
//! requirement text, and the integrator is appended last.

use serde::{Deserialize, Serialize};

use crate::pipeline::types::RequirementSet;

/// An expert perspective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub expertise: String,

    /// Reserved for the integration phase; gets no vision call
    #[serde(default)]
    pub integrator: bool,
}

impl RoleSpec {
    pub fn new(name: &str, expertise: &str) -> Self {
        Self {
            name: name.to_string(),
            expertise: expertise.to_string(),
            integrator: false,
        }
    }
}

/// A role added when any keyword matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRole {
    pub role: RoleSpec,
    pub keywords: Vec<String>,
}

impl ConditionalRole {
    fn new(name: &str, expertise: &str, keywords: &[&str]) -> Self {
        Self {
            role: RoleSpec::new(name, expertise),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Whether any keyword occurs in `text` (already lowercased)
    pub fn matches(&self, text: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| contains_at_word_start(text, &k.to_lowercase()))
    }
}

/// Versioned keyword table driving role selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTable {
    pub version: u32,
    pub base_roles: Vec<RoleSpec>,
    #[serde(default)]
    pub conditional_roles: Vec<ConditionalRole>,
    pub integrator: RoleSpec,
}

impl Default for RoleTable {
    fn default() -> Self {
        Self {
            version: 1,
            base_roles: vec![
                RoleSpec::new(
                    "Software Architect",
                    "System decomposition, module boundaries, technology choices and cross-cutting concerns",
                ),
                RoleSpec::new(
                    "Backend Engineer",
                    "Server-side logic, APIs, domain models, validation and error handling",
                ),
                RoleSpec::new(
                    "Frontend Engineer",
                    "User interface structure, state management, routing and client-side data flow",
                ),
            ],
            conditional_roles: vec![
                ConditionalRole::new(
                    "Data Architect",
                    "Data modelling, storage engines, schemas, migrations and caching",
                    &[
                        "database",
                        "storage",
                        "persist",
                        "sql",
                        "nosql",
                        "schema",
                        "data model",
                        "cache",
                        "repository",
                    ],
                ),
                ConditionalRole::new(
                    "Security Engineer",
                    "Authentication, authorization, secrets handling and threat mitigation",
                    &[
                        "security",
                        "auth",
                        "login",
                        "password",
                        "account",
                        "permission",
                        "encrypt",
                        "token",
                        "oauth",
                        "credential",
                    ],
                ),
                ConditionalRole::new(
                    "DevOps Engineer",
                    "Build pipelines, containerisation, deployment and observability",
                    &[
                        "deploy",
                        "docker",
                        "kubernetes",
                        "container",
                        "ci/cd",
                        "pipeline",
                        "cloud",
                        "infrastructure",
                        "monitoring",
                    ],
                ),
                ConditionalRole::new(
                    "Mobile Engineer",
                    "Native and cross-platform mobile clients, offline sync and device APIs",
                    &["mobile", "ios", "android", "react native", "flutter"],
                ),
                ConditionalRole::new(
                    "Machine Learning Engineer",
                    "Model training and serving, feature pipelines and evaluation",
                    &[
                        "machine learning",
                        "ml model",
                        "prediction",
                        "recommendation",
                        "classifier",
                        "llm",
                        "embedding",
                    ],
                ),
            ],
            integrator: RoleSpec {
                name: "Integration Architect".to_string(),
                expertise: "Merging specialist proposals into one coherent architecture and dependency graph"
                    .to_string(),
                integrator: true,
            },
        }
    }
}

impl RoleTable {
    /// Roles for these requirements: base, triggered conditionals, integrator.
    ///
    /// Pure and order-preserving; the same requirements always give the same list.
    pub fn select_roles(&self, requirements: &RequirementSet) -> Vec<RoleSpec> {
        let text = requirements
            .iter()
            .map(|r| r.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        let mut roles: Vec<RoleSpec> = Vec::new();
        let mut push = |role: &RoleSpec| {
            if !roles.iter().any(|r| r.name == role.name) {
                roles.push(RoleSpec {
                    integrator: false,
                    ..role.clone()
                });
            }
        };

        for role in &self.base_roles {
            push(role);
        }
        for conditional in &self.conditional_roles {
            if conditional.matches(&text) {
                push(&conditional.role);
            }
        }

        roles.retain(|r| r.name != self.integrator.name);
        roles.push(RoleSpec {
            integrator: true,
            ..self.integrator.clone()
        });
        roles
    }
}

/// Case-sensitive search for `needle` starting at a word boundary
fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}
