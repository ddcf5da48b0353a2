//! Role selection against the keyword table

use archgen::config::PipelineConfig;
use archgen::pipeline::types::RequirementSet;
use archgen::pipeline::RoleTable;

use super::common::*;

fn names(table: &RoleTable, reqs: &[&str]) -> Vec<String> {
    table
        .select_roles(&RequirementSet::new(reqs.iter().copied()))
        .into_iter()
        .map(|r| r.name)
        .collect()
}

#[test]
fn test_task_tracker_with_accounts() {
    let roles = names(&RoleTable::default(), &[TRACKER_REQUIREMENT]);
    assert_eq!(
        roles,
        vec![
            "Software Architect",
            "Backend Engineer",
            "Frontend Engineer",
            "Security Engineer",
            "Integration Architect",
        ]
    );
}

#[test]
fn test_selection_is_deterministic() {
    let table = RoleTable::default();
    let reqs = [
        "Deploy to Kubernetes",
        "Recommendation engine for tasks",
        "Android client",
    ];
    let first = names(&table, &reqs);
    assert_eq!(first, names(&table, &reqs));
    assert_eq!(first.len(), 7);
    assert_eq!(first.last().map(String::as_str), Some("Integration Architect"));
}

#[test]
fn test_each_conditional_role_appears_once() {
    let roles = names(
        &RoleTable::default(),
        &["Store data in a database", "Cache the schema", "SQL storage"],
    );
    assert_eq!(roles.iter().filter(|r| *r == "Data Architect").count(), 1);
}

#[test]
fn test_role_table_from_config_yaml() {
    let yaml = r#"
role_table:
  version: 2
  base_roles:
    - name: Generalist
      expertise: Everything
  conditional_roles:
    - role:
        name: Game Designer
        expertise: Mechanics and balance
      keywords: [game, level design]
  integrator:
    name: Lead
    expertise: Final say
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.role_table.version, 2);

    let roles = config
        .role_table
        .select_roles(&RequirementSet::new(["A puzzle game with level design tools"]));
    let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Generalist", "Game Designer", "Lead"]);
    assert!(roles[2].integrator);
}
