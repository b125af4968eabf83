//! Tests for the stream adapters

use super::*;
use crate::context::{Connection, Context, Scope};
use crate::error::Result;
use crate::model::{DomainModel, DomainRecord, RawOrigin, ToolModel, ToolRow};
use crate::state::State;
use crate::storage::Storage;
use crate::types::{DomainType, JsonValue};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Repo {
    id: u64,
    name: String,
}

impl ToolModel for Repo {
    const TABLE: &'static str = "_tool_demo_repos";
    const TYPE_NAME: &'static str = "Repo";

    fn primary_key(&self) -> Vec<String> {
        vec![self.id.to_string()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Star {
    repo_id: u64,
    user: String,
}

impl ToolModel for Star {
    const TABLE: &'static str = "_tool_demo_stars";
    const TYPE_NAME: &'static str = "Star";

    fn primary_key(&self) -> Vec<String> {
        vec![self.repo_id.to_string(), self.user.clone()]
    }
}

#[derive(Serialize)]
struct DomainRepo {
    name: String,
}

impl DomainModel for DomainRepo {
    const TABLE: &'static str = "repos";
}

#[derive(Serialize)]
struct RepoLink {
    repo: String,
    other: String,
}

impl DomainModel for RepoLink {
    const TABLE: &'static str = "repo_links";

    fn key(&self) -> Option<Vec<String>> {
        Some(vec![self.repo.clone(), self.other.clone()])
    }
}

struct Repos;

#[async_trait]
impl Stream for Repos {
    type Tool = Repo;

    fn name(&self) -> &str {
        "repos"
    }

    fn domain_types(&self) -> Vec<DomainType> {
        vec![DomainType::Code]
    }

    fn collect<'a>(&'a self, _state: State, _ctx: &'a Context) -> CollectStream<'a> {
        stream::iter(vec![Ok((
            RawItem::from(json!({"id": 1, "name": "a"})),
            State::new(),
        ))])
        .boxed()
    }

    fn extract(&self, raw: JsonValue) -> Result<Option<Repo>> {
        if raw.get("archived").is_some() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(raw)?))
    }

    async fn convert(&self, tool: &Repo, _ctx: &Context) -> Result<Vec<DomainRecord>> {
        Ok(vec![
            DomainRecord::new(&DomainRepo {
                name: tool.name.clone(),
            })?,
            DomainRecord::new(&RepoLink {
                repo: tool.id.to_string(),
                other: "x".to_string(),
            })?,
        ])
    }

    fn should_run_on(&self, scope: &Scope) -> bool {
        scope.id != "skip-me"
    }
}

struct Stars;

#[async_trait]
impl Substream for Stars {
    type Tool = Star;
    type Parent = Repo;

    fn name(&self) -> &str {
        "stars"
    }

    fn parent_stream(&self) -> &str {
        "repos"
    }

    fn collect<'a>(&'a self, state: State, _ctx: &'a Context, parent: Repo) -> CollectStream<'a> {
        let items = vec![
            Ok((
                RawItem::from(json!({"repo_id": parent.id, "user": "u1"})),
                state.clone(),
            )),
            Ok((
                RawItem::from(json!({"repo_id": parent.id, "user": "u2"}))
                    .with_input(json!({"custom": true})),
                state,
            )),
        ];
        stream::iter(items).boxed()
    }

    fn extract(&self, raw: JsonValue) -> Result<Option<Star>> {
        Ok(Some(serde_json::from_value(raw)?))
    }

    async fn convert(&self, _tool: &Star, _ctx: &Context) -> Result<Vec<DomainRecord>> {
        Ok(Vec::new())
    }
}

fn context() -> Context {
    Context::new(
        Storage::open_in_memory().unwrap(),
        Connection::new(3),
        Scope::new("demo"),
    )
}

#[test]
fn test_stream_adapter_metadata() {
    let adapter = StreamAdapter::new("demo", Repos);
    assert_eq!(adapter.plugin(), "demo");
    assert_eq!(adapter.name(), "repos");
    assert_eq!(adapter.raw_table(), "_raw_demo_repos");
    assert_eq!(adapter.tool_table(), "_tool_demo_repos");
    assert_eq!(adapter.tool_type_name(), "Repo");
    assert_eq!(adapter.parent_stream(), None);
    assert_eq!(adapter.domain_types(), vec![DomainType::Code]);
    assert!(adapter.should_run_on(&Scope::new("demo")));
    assert!(!adapter.should_run_on(&Scope::new("skip-me")));
}

#[test]
fn test_substream_adapter_metadata() {
    let adapter = SubstreamAdapter::new("demo", Stars);
    assert_eq!(adapter.raw_table(), "_raw_demo_stars");
    assert_eq!(adapter.parent_stream(), Some("repos"));
    assert_eq!(adapter.parent_table(), Some("_tool_demo_repos"));
}

#[test]
fn test_extract_attaches_lineage() {
    let adapter = StreamAdapter::new("demo", Repos);
    let origin = RawOrigin {
        raw_data_params: Some("{}".to_string()),
        raw_data_table: Some("_raw_demo_repos".to_string()),
        raw_data_id: Some(7),
    };

    let row = adapter
        .extract(json!({"id": 1, "name": "a"}), 3, origin.clone())
        .unwrap()
        .unwrap();
    assert_eq!(row.connection_id, 3);
    assert_eq!(row.natural_key, vec!["1".to_string()]);
    assert_eq!(row.origin, origin);

    let dropped = adapter
        .extract(json!({"id": 2, "name": "b", "archived": true}), 3, origin)
        .unwrap();
    assert!(dropped.is_none());
}

#[test]
fn test_extract_error_names_stream() {
    let adapter = StreamAdapter::new("demo", Repos);
    let err = adapter
        .extract(json!({"id": "nope"}), 3, RawOrigin::default())
        .unwrap_err();
    assert!(err.to_string().contains("repos"));
}

#[tokio::test]
async fn test_convert_derives_ids() {
    let adapter = StreamAdapter::new("demo", Repos);
    let row = ToolRow::from_model(
        &Repo {
            id: 1,
            name: "a".to_string(),
        },
        3,
        RawOrigin {
            raw_data_id: Some(9),
            ..RawOrigin::default()
        },
    )
    .unwrap();

    let rows = adapter.convert(&row, &context()).await.unwrap();
    assert_eq!(rows.len(), 2);

    let (table, repo) = &rows[0];
    assert_eq!(*table, "repos");
    assert_eq!(repo.id, "demo:Repo:3:1");
    assert_eq!(repo.data["name"], "a");
    assert_eq!(repo.origin.raw_data_id, Some(9));

    let (table, link) = &rows[1];
    assert_eq!(*table, "repo_links");
    assert_eq!(link.id, "1:x");
}

#[tokio::test]
async fn test_substream_collects_per_parent() {
    let adapter = SubstreamAdapter::new("demo", Stars);
    let ctx = context();
    let parent = ToolRow::from_model(
        &Repo {
            id: 5,
            name: "p".to_string(),
        },
        3,
        RawOrigin::default(),
    )
    .unwrap();
    let parent_data = parent.data.clone();

    let items: Vec<_> = adapter
        .collect_for_parent(State::new(), &ctx, parent)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].0.data["repo_id"], 5);
    assert_eq!(items[0].0.input, Some(parent_data));
    assert_eq!(items[1].0.input, Some(json!({"custom": true})));
}

#[tokio::test]
async fn test_collect_without_parent_fails() {
    let ctx = context();
    let substream = SubstreamAdapter::new("demo", Stars);
    let result: Result<Vec<_>> = substream.collect(State::new(), &ctx).try_collect().await;
    assert!(result.is_err());

    let stream = StreamAdapter::new("demo", Repos);
    let row = ToolRow::from_model(
        &Repo {
            id: 1,
            name: "a".to_string(),
        },
        3,
        RawOrigin::default(),
    )
    .unwrap();
    let result: Result<Vec<_>> = stream
        .collect_for_parent(State::new(), &ctx, row)
        .try_collect()
        .await;
    assert!(result.is_err());
}
