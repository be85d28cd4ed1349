/// End-to-end tests across the builder, both backends and the store
///
/// The central property: the same plan compiled to Cypher and interpreted
/// in memory must expose the same observable semantics.

use dualgraph::{
    export_to_json, import_from_json, Cardinality, Command, CommandResponse, Condition,
    Direction, ExportOptions, HopRange, MemoryEngine, QueryAst, QueryOutput, ResultType,
    SetOperator, TraversalSpec,
};
use serde_json::json;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Schema scenario: edge `authored` from user to post; U1 authors P1 and P2.
async fn seeded_engine() -> MemoryEngine {
    let engine = MemoryEngine::with_empty_store();
    for command in [
        Command::CreateNode {
            id: "U1".into(),
            label: "user".into(),
            params: json!({"name": "Ada"}),
        },
        Command::CreateNode {
            id: "P1".into(),
            label: "post".into(),
            params: json!({"title": "intro"}),
        },
        Command::CreateNode {
            id: "P2".into(),
            label: "post".into(),
            params: json!({"title": "followup"}),
        },
        Command::CreateEdge {
            id: "E1".into(),
            edge_type: "authored".into(),
            from_id: "U1".into(),
            to_id: "P1".into(),
            params: json!({}),
        },
        Command::CreateEdge {
            id: "E2".into(),
            edge_type: "authored".into(),
            from_id: "U1".into(),
            to_id: "P2".into(),
            params: json!({}),
        },
    ] {
        engine.dispatch(command).await.unwrap();
    }
    engine
}

#[tokio::test]
async fn test_same_plan_serves_both_backends() {
    init_tracing();
    let engine = seeded_engine().await;

    let plan = QueryAst::new()
        .match_by_id("U1")
        .traverse(TraversalSpec::out("authored").with_label("post"))
        .unwrap();

    // in-memory backend: posts in insertion order
    match engine.execute(&plan).await.unwrap() {
        QueryOutput::Nodes { nodes } => {
            let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            assert_eq!(ids, vec!["P1", "P2"]);
        }
        other => panic!("expected nodes, got {other:?}"),
    }

    // compiled backend: same plan, id-anchored lookup plus one traversal
    let compiled = plan.compile().unwrap();
    assert_eq!(
        compiled.cypher,
        "MATCH (n0 {id: $p0})\nMATCH (n0)-[e0:authored]->(n1:post)\nRETURN n1"
    );
    assert_eq!(compiled.params.get("p0"), Some(&json!("U1")));
    assert_eq!(compiled.result_type, ResultType::Collection);
    assert_eq!(compiled.meta.match_count, 2);
}

#[tokio::test]
async fn test_connected_to_agrees_across_backends() {
    let engine = seeded_engine().await;

    let plan = QueryAst::new()
        .match_node("user")
        .filter(Condition::connected_to("authored", Direction::Out, "P2"))
        .unwrap();

    match engine.execute(&plan).await.unwrap() {
        QueryOutput::Nodes { nodes } => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].id, "U1");
        }
        other => panic!("expected nodes, got {other:?}"),
    }

    let compiled = plan.compile().unwrap();
    // promoted to an id-anchored MATCH, never an existential WHERE pattern
    assert!(!compiled.cypher.contains("->({id:"));
    assert!(compiled
        .cypher
        .contains("MATCH (n0)-[:authored]->(ct0 {id: $p0})"));
}

#[tokio::test]
async fn test_optional_traversal_keeps_source() {
    let engine = seeded_engine().await;

    // no avatar edges exist: the optional hop yields a null target
    let plan = QueryAst::new()
        .match_by_id("U1")
        .traverse(TraversalSpec::out("avatar").with_cardinality(Cardinality::Optional))
        .unwrap();

    match engine.execute(&plan).await.unwrap() {
        QueryOutput::Node { node } => assert!(node.is_none()),
        other => panic!("expected single node slot, got {other:?}"),
    }

    let compiled = plan.compile().unwrap();
    assert!(compiled.cypher.contains("OPTIONAL MATCH"));
    assert_eq!(compiled.result_type, ResultType::Single);
}

#[tokio::test]
async fn test_transaction_laws_through_engine_store() {
    let engine = seeded_engine().await;
    let store = engine.store();

    let before = store.read().export();

    store.write().begin_transaction().unwrap();
    engine
        .dispatch(Command::UpdateNode {
            id: "P1".into(),
            params: json!({"title": "rewritten"}),
        })
        .await
        .unwrap();
    engine
        .dispatch(Command::DeleteNode {
            id: "P2".into(),
            detach: true,
        })
        .await
        .unwrap();
    store.write().rollback().unwrap();

    assert_eq!(store.read().export(), before);

    store.write().begin_transaction().unwrap();
    engine
        .dispatch(Command::UpdateNode {
            id: "P1".into(),
            params: json!({"title": "rewritten"}),
        })
        .await
        .unwrap();
    store.write().commit().unwrap();

    let node = store.read().get_node("P1").unwrap();
    assert_eq!(node.get_property("title"), Some(&json!("rewritten")));
}

#[tokio::test]
async fn test_snapshot_file_round_trip_preserves_query_results() {
    let engine = seeded_engine().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");

    {
        let store = engine.store();
        let store = store.read();
        export_to_json(&store, &path, &ExportOptions::default()).unwrap();
    }

    let restored = MemoryEngine::with_empty_store();
    {
        let store = restored.store();
        let mut store = store.write();
        import_from_json(&mut store, &path).unwrap();
    }

    let plan = QueryAst::new()
        .match_by_id("U1")
        .traverse(TraversalSpec::out("authored").with_label("post"))
        .unwrap();

    let original = engine.execute(&plan).await.unwrap();
    let reloaded = restored.execute(&plan).await.unwrap();
    assert_eq!(original, reloaded);
}

#[tokio::test]
async fn test_plan_reuse_as_fragment() {
    let engine = seeded_engine().await;

    // a shared fragment extended two different ways stays independent
    let fragment = QueryAst::new().match_node("post");
    let by_title = fragment
        .filter(Condition::eq("title", json!("intro")))
        .unwrap();
    let counted = fragment.project_count();

    match engine.execute(&by_title).await.unwrap() {
        QueryOutput::Nodes { nodes } => assert_eq!(nodes.len(), 1),
        other => panic!("expected nodes, got {other:?}"),
    }
    assert_eq!(
        engine.execute(&counted).await.unwrap(),
        QueryOutput::Count { count: 2 }
    );

    // the fragment itself still compiles to its original text
    assert_eq!(fragment.compile().unwrap().cypher, "MATCH (n0:post)\nRETURN n0");
}

#[tokio::test]
async fn test_union_and_intersect_results() {
    let engine = MemoryEngine::with_empty_store();
    for (id, role, active) in [
        ("u1", "admin", true),
        ("u2", "editor", true),
        ("u3", "admin", false),
    ] {
        engine
            .dispatch(Command::CreateNode {
                id: id.into(),
                label: "user".into(),
                params: json!({"role": role, "active": active}),
            })
            .await
            .unwrap();
    }

    let admins = QueryAst::new()
        .match_node("user")
        .filter(Condition::eq("role", json!("admin")))
        .unwrap();
    let active = QueryAst::new()
        .match_node("user")
        .filter(Condition::eq("active", json!(true)))
        .unwrap();

    let union_plan = QueryAst::new()
        .branch(SetOperator::Union, vec![admins.clone(), active.clone()], true)
        .unwrap();
    match engine.execute(&union_plan).await.unwrap() {
        QueryOutput::Nodes { nodes } => assert_eq!(nodes.len(), 3),
        other => panic!("expected nodes, got {other:?}"),
    }
    let compiled = union_plan.compile().unwrap();
    assert!(compiled.cypher.contains("UNION"));

    let intersect_plan = QueryAst::new()
        .branch(SetOperator::Intersect, vec![admins, active], true)
        .unwrap();
    match engine.execute(&intersect_plan).await.unwrap() {
        QueryOutput::Nodes { nodes } => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].id, "u1");
        }
        other => panic!("expected nodes, got {other:?}"),
    }
    let compiled = intersect_plan.compile().unwrap();
    assert!(compiled.cypher.contains("WITH"));
}

#[tokio::test]
async fn test_reachability_bounds() {
    let engine = MemoryEngine::with_empty_store();
    {
        let store = engine.store();
        let mut store = store.write();
        for id in ["a", "b", "c", "d"] {
            store.create_node(id, "stop", json!({})).unwrap();
        }
        store.create_edge("e1", "next", "a", "b", json!({})).unwrap();
        store.create_edge("e2", "next", "b", "c", json!({})).unwrap();
        store.create_edge("e3", "next", "c", "d", json!({})).unwrap();
    }

    let plan = QueryAst::new()
        .match_by_id("a")
        .reachable(vec!["next".into()], Direction::Out, HopRange::new(1, 2))
        .unwrap();

    match engine.execute(&plan).await.unwrap() {
        QueryOutput::Nodes { nodes } => {
            let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            assert_eq!(ids, vec!["b", "c"]);
        }
        other => panic!("expected nodes, got {other:?}"),
    }

    let compiled = plan.compile().unwrap();
    assert!(compiled.cypher.contains("*1..2"));
    assert!(compiled.cypher.contains("RETURN DISTINCT"));
    assert!(compiled.meta.has_variable_length_path);
}

#[tokio::test]
async fn test_store_summary_reflects_mutations() {
    let engine = seeded_engine().await;
    let store = engine.store();

    let summary = store.read().summary();
    assert_eq!(summary.node_count, 3);
    assert_eq!(summary.edge_count, 2);
    assert_eq!(summary.labels, vec!["post", "user"]);
    assert_eq!(summary.edge_types, vec!["authored"]);

    engine
        .dispatch(Command::DeleteNode {
            id: "P2".into(),
            detach: true,
        })
        .await
        .unwrap();
    let summary = store.read().summary();
    assert_eq!(summary.node_count, 2);
    assert_eq!(summary.edge_count, 1);
}

#[tokio::test]
async fn test_snapshot_debug_surface() {
    let plan = QueryAst::new()
        .match_node("user")
        .user_alias("u")
        .unwrap()
        .traverse(TraversalSpec::out("authored").with_label("post"))
        .unwrap();

    let snapshot = plan.snapshot();
    assert_eq!(snapshot.steps.len(), 3);
    assert_eq!(snapshot.current_alias.as_deref(), Some("n1"));
    assert_eq!(snapshot.current_label.as_deref(), Some("post"));
    assert!(snapshot.aliases.contains_key("n0"));
    assert!(snapshot.aliases.contains_key("e0"));

    // the snapshot serializes for debug logging
    let text = serde_json::to_string(&snapshot).unwrap();
    assert!(text.contains("\"user_aliases\""));
}

#[tokio::test]
async fn test_edge_exists_command() {
    let engine = seeded_engine().await;

    let response = engine
        .dispatch(Command::Query(dualgraph::QueryOp::EdgeExists {
            from_id: "U1".into(),
            to_id: "P1".into(),
            edge_type: Some("authored".into()),
        }))
        .await
        .unwrap();
    assert_eq!(response, CommandResponse::Bool { value: true });

    let response = engine
        .dispatch(Command::Query(dualgraph::QueryOp::EdgeExists {
            from_id: "P1".into(),
            to_id: "U1".into(),
            edge_type: Some("authored".into()),
        }))
        .await
        .unwrap();
    assert_eq!(response, CommandResponse::Bool { value: false });
}
