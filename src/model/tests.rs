//! Tests for model helpers

use super::*;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    project: String,
    number: u32,
    title: String,
}

impl ToolModel for Ticket {
    const TABLE: &'static str = "_tool_test_tickets";
    const TYPE_NAME: &'static str = "Ticket";

    fn primary_key(&self) -> Vec<String> {
        vec![self.project.clone(), self.number.to_string()]
    }
}

#[derive(Debug, Serialize)]
struct Issue {
    title: String,
}

impl DomainModel for Issue {
    const TABLE: &'static str = "issues";
}

#[derive(Debug, Serialize)]
struct IssueLink {
    issue_id: String,
    other_id: String,
}

impl DomainModel for IssueLink {
    const TABLE: &'static str = "issue_links";

    fn key(&self) -> Option<Vec<String>> {
        Some(vec![self.issue_id.clone(), self.other_id.clone()])
    }
}

fn ticket() -> Ticket {
    Ticket {
        project: "core".to_string(),
        number: 12,
        title: "crash".to_string(),
    }
}

#[test]
fn test_domain_id_format() {
    let id = domain_id("azuredevops", "Build", 1, &["12".to_string()]);
    assert_eq!(id, "azuredevops:Build:1:12");

    let composite = domain_id("test", "Ticket", 7, &ticket().primary_key());
    assert_eq!(composite, "test:Ticket:7:core:12");
}

#[test]
fn test_domain_id_keeps_nested_ids_verbatim() {
    let parent = domain_id("azuredevops", "Build", 1, &["12".to_string()]);
    let id = domain_id("azuredevops", "Job", 1, &[parent, "abc".to_string()]);
    assert_eq!(id, "azuredevops:Job:1:azuredevops:Build:1:12:abc");

    // separators inside parts are not escaped; arity disambiguates
    assert_eq!(
        domain_id("p", "T", 1, &["a:b".to_string()]),
        domain_id("p", "T", 1, &["a".to_string(), "b".to_string()])
    );
}

#[test]
fn test_domain_id_is_deterministic() {
    let a = domain_id("p", "T", 3, &ticket().primary_key());
    let b = domain_id("p", "T", 3, &ticket().primary_key());
    assert_eq!(a, b);
}

#[test]
fn test_natural_key_is_json_array() {
    assert_eq!(natural_key(&ticket().primary_key()), r#"["core","12"]"#);
}

#[test]
fn test_tool_row_round_trip() {
    let origin = RawOrigin {
        raw_data_params: Some("{}".to_string()),
        raw_data_table: Some("_raw_test_tickets".to_string()),
        raw_data_id: Some(4),
    };
    let row = ToolRow::from_model(&ticket(), 7, origin.clone()).unwrap();
    assert_eq!(row.natural_key, vec!["core".to_string(), "12".to_string()]);
    assert_eq!(row.origin, origin);
    assert_eq!(row.decode::<Ticket>().unwrap(), ticket());
}

#[test]
fn test_tool_row_decode_mismatch() {
    let row = ToolRow {
        connection_id: 1,
        natural_key: vec![],
        data: json!({"unexpected": true}),
        origin: RawOrigin::default(),
    };
    assert!(row.decode::<Ticket>().is_err());
}

#[test]
fn test_domain_record_keys() {
    let plain = DomainRecord::new(&Issue {
        title: "x".to_string(),
    })
    .unwrap();
    assert_eq!(plain.table, "issues");
    assert!(plain.key.is_none());

    let link = DomainRecord::new(&IssueLink {
        issue_id: "a".to_string(),
        other_id: "b".to_string(),
    })
    .unwrap();
    assert_eq!(link.key, Some(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn test_domain_row_injects_id() {
    let record = DomainRecord::new(&Issue {
        title: "x".to_string(),
    })
    .unwrap();
    let row = DomainRow::from_record(record, "test:Ticket:1:9".to_string(), RawOrigin::default());
    assert_eq!(row.data, json!({"title": "x", "id": "test:Ticket:1:9"}));
}

#[test]
fn test_raw_record_json() {
    let raw = RawRecord {
        id: 1,
        params: "{}".to_string(),
        data: br#"{"id": 5}"#.to_vec(),
        url: None,
        input: None,
        created_at: Utc::now(),
    };
    assert_eq!(raw.json().unwrap(), json!({"id": 5}));

    let origin = RawOrigin::from_raw("_raw_t", &raw);
    assert_eq!(origin.raw_data_id, Some(1));
    assert_eq!(origin.raw_data_table.as_deref(), Some("_raw_t"));

    let broken = RawRecord {
        data: b"{".to_vec(),
        ..raw
    };
    assert!(broken.json().is_err());
}
