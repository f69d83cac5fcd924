use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use composer_config::ComposerConfig;
use composer_document::{Document, DocumentTree, Node, NodeKind};
use composer_engine::{
    Blocker, ChatTransport, CollectingObserver, Composer, ComposerEvent, EngineResult,
    SubmitOutcome, TracingObserver, apply_outcomes, build_user_inline_children_from_text,
    evaluate_submission, execute_planned, plan_ready_preprocessors, requirements_for,
    run_all_ready_preprocessors, selection, to_plain_text_replacing_variables,
};
use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::{
    Block, InMemoryTemplateStore, PreProcessorCall, TemplateDefinition, TemplateSelectionInstance,
    ToolFallback, ToolStatus, Variable, VariableSource, VariableType, effective_value,
};
use composer_tools::{ToolError, ToolMetadata, ToolRegistry};
use serde_json::{Value, json};
use tokio::sync::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("composer_engine=debug")
        .with_test_writer()
        .try_init();
}

fn key(slug: &str) -> TemplateKey {
    TemplateKey::new("bundle", slug, "1.0.0").unwrap()
}

fn insert(doc: &mut Document, path: usize, slug: &str, def: TemplateDefinition) -> SelectionId {
    let instance = TemplateSelectionInstance::new(key(slug), def);
    selection::insert_selection(doc, &[path], instance).unwrap()
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ChatTransport for Outbox {
    async fn send(&self, text: &str) -> EngineResult<()> {
        self.sent.lock().await.push(text.to_owned());
        Ok(())
    }
}

#[test]
fn scenario_a_required_topic() {
    let def = TemplateDefinition::new("Topic")
        .with_variable(Variable::new("topic", VariableType::String).required());
    let mut instance = TemplateSelectionInstance::new(key("topic"), def);

    let req = requirements_for(&instance, ToolFallback::BySaveAs);
    assert_eq!(req.required_count, 1);
    assert_eq!(req.required_variables, vec!["topic".to_owned()]);

    instance.set_variable("topic", Some(json!("cats")));
    assert_eq!(requirements_for(&instance, ToolFallback::BySaveAs).required_count, 0);
}

#[test]
fn scenario_b_static_date_yields_to_user() {
    let var = Variable::new("date", VariableType::Date).with_static("2024-01-01");
    let mut user = BTreeMap::new();
    assert_eq!(effective_value(&var, &user, None), Some(json!("2024-01-01")));

    user.insert("date".to_owned(), json!("2024-02-02"));
    assert_eq!(effective_value(&var, &user, None), Some(json!("2024-02-02")));
}

#[test]
fn user_value_beats_static_default_and_tool() {
    let var = Variable::new("x", VariableType::String)
        .with_static("static")
        .with_default("default");
    let user = BTreeMap::from([("x".to_owned(), json!("mine"))]);
    assert_eq!(effective_value(&var, &user, None), Some(json!("mine")));
}

#[tokio::test]
async fn scenario_c_pending_tool_then_run() {
    init_tracing();
    let def = TemplateDefinition::new("Summary")
        .with_block(Block::new("b1", "Summary: {{summary}}"))
        .with_variable(
            Variable::new("summary", VariableType::String)
                .with_source(VariableSource::Tool)
                .required(),
        )
        .with_pre_processor(
            PreProcessorCall::new("p1", "summarize", "summary").with_path_expr("$.text"),
        );
    let tools = ToolRegistry::new();
    tools
        .register_tool(ToolMetadata::new("summarize", "1").unwrap(), |_args: Value| async move {
            Ok(json!({ "text": "short version" }))
        })
        .unwrap();

    let mut doc = Document::new();
    let id = insert(&mut doc, 0, "summary", def);
    let config = ComposerConfig::default();

    let report = evaluate_submission(&doc, &config);
    assert!(!report.is_allowed());
    assert_eq!(report.required_count, 0);
    assert_eq!(report.pending_tool_count, 1);
    assert!(matches!(
        report.first_blocker,
        Some(Blocker::PendingTool { ref pre_processor_id, ref save_as, .. })
            if pre_processor_id == "p1" && save_as == "summary"
    ));

    selection::mark_tool_ready(&mut doc, id, "p1").unwrap();
    let run = run_all_ready_preprocessors(&mut doc, &tools, &config, &TracingObserver).await;
    assert!(run.ok);

    let instance = selection::instance_mut(&mut doc, id).unwrap();
    assert_eq!(instance.tool_state("p1").unwrap().status, ToolStatus::Done);
    assert_eq!(instance.variable("summary"), Some(&json!("short version")));
    assert!(evaluate_submission(&doc, &config).is_allowed());
    assert_eq!(
        to_plain_text_replacing_variables(&doc, ToolFallback::BySaveAs, "\n"),
        "Summary: short version"
    );
}

#[test]
fn scenario_d_unknown_tokens_stay_literal() {
    let def = TemplateDefinition::new("Hello")
        .with_variable(Variable::new("name", VariableType::String));
    let instance = TemplateSelectionInstance::new(key("hello"), def);
    let text = "Hello {{name}}, see {{unknown}}";

    let children = build_user_inline_children_from_text(&instance, text);
    let markers: Vec<_> = children.iter().filter_map(Node::as_variable).collect();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].name, "name");
    assert_eq!(markers[0].selection_id, instance.selection_id());
    assert!(children.contains(&Node::text(", see {{unknown}}")));

    let mut nodes = vec![Node::selection(instance)];
    nodes.extend(children);
    let doc = Document::from_nodes(vec![Node::paragraph(nodes)]);
    assert_eq!(to_plain_text_replacing_variables(&doc, ToolFallback::BySaveAs, "\n"), text);
}

#[test]
fn instances_of_one_template_are_isolated() {
    let def = TemplateDefinition::new("Topic")
        .with_variable(Variable::new("topic", VariableType::String).required());
    let mut doc = Document::new();
    let first = insert(&mut doc, 0, "topic", def.clone());
    let second = insert(&mut doc, 1, "topic", def);

    selection::commit_variable(&mut doc, first, "topic", "cats").unwrap();

    assert!(selection::instance_mut(&mut doc, second).unwrap().variables().is_empty());
    let report = evaluate_submission(&doc, &ComposerConfig::default());
    assert_eq!(report.required_count, 1);
    assert_eq!(report.blocking_selections(), vec![second]);
}

#[tokio::test]
async fn runner_aggregates_errors_without_short_circuit() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let tools = ToolRegistry::new();
    for (id, fails) in [("first", false), ("second", true), ("third", false)] {
        let calls = calls.clone();
        tools
            .register_tool(ToolMetadata::new(id, "1").unwrap(), move |_args: Value| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if fails {
                        Err(ToolError::execution("backend down"))
                    } else {
                        Ok(json!(format!("{id} done")))
                    }
                }
            })
            .unwrap();
    }

    let def = TemplateDefinition::new("Three")
        .with_pre_processor(PreProcessorCall::new("p1", "first", "a"))
        .with_pre_processor(PreProcessorCall::new("p2", "second", "b"))
        .with_pre_processor(PreProcessorCall::new("p3", "third", "c"));
    let mut doc = Document::new();
    let id = insert(&mut doc, 0, "three", def);
    for pre in ["p1", "p2", "p3"] {
        selection::mark_tool_ready(&mut doc, id, pre).unwrap();
    }

    let observer = CollectingObserver::new();
    let config = ComposerConfig::default();
    let report = run_all_ready_preprocessors(&mut doc, &tools, &config, observer.as_ref()).await;

    assert!(!report.ok);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].pre_processor_id, "p2");
    assert_eq!(report.completed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let instance = selection::instance_mut(&mut doc, id).unwrap();
    assert_eq!(instance.tool_state("p1").unwrap().status, ToolStatus::Done);
    assert_eq!(instance.tool_state("p2").unwrap().status, ToolStatus::Ready);
    assert_eq!(instance.tool_state("p3").unwrap().status, ToolStatus::Done);
    assert_eq!(instance.variable("a"), Some(&json!("first done")));
    assert_eq!(instance.variable("c"), Some(&json!("third done")));
    assert!(instance.variable("b").is_none());
}

#[tokio::test]
async fn concurrent_runs_keep_planning_order() {
    let tools = ToolRegistry::new();
    tools
        .register_tool(ToolMetadata::new("echo", "1").unwrap(), |args: Value| async move {
            Ok(args["n"].clone())
        })
        .unwrap();
    let mut def = TemplateDefinition::new("Many");
    for n in 0..6 {
        let call = PreProcessorCall::new(format!("p{n}"), "echo", format!("v{n}")).with_arg("n", n);
        def = def.with_pre_processor(call);
    }
    let mut doc = Document::new();
    let id = insert(&mut doc, 0, "many", def);
    for n in 0..6 {
        selection::mark_tool_ready(&mut doc, id, &format!("p{n}")).unwrap();
    }
    let mut config = ComposerConfig::default();
    config.runner.max_concurrent_calls = 4;

    let report = run_all_ready_preprocessors(&mut doc, &tools, &config, &TracingObserver).await;

    assert!(report.ok);
    assert_eq!(report.completed, 6);
    let instance = selection::instance_mut(&mut doc, id).unwrap();
    for n in 0..6 {
        assert_eq!(instance.variable(&format!("v{n}")), Some(&json!(n)));
    }
}

#[tokio::test]
async fn failed_submission_focuses_the_failure_and_retries_later() {
    init_tracing();
    let flaky = Arc::new(AtomicUsize::new(0));
    let attempts = flaky.clone();
    let tools = ToolRegistry::new();
    tools
        .register_tool(ToolMetadata::new("lookup", "1").unwrap(), move |_args: Value| {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ToolError::execution("timeout upstream"))
                } else {
                    Ok(json!({ "items": [{ "title": "Rust" }] }))
                }
            }
        })
        .unwrap();

    let store = InMemoryTemplateStore::new();
    store
        .insert(
            key("lookup"),
            TemplateDefinition::new("Lookup")
                .with_block(Block::new("b1", "Top hit: {{hit}}"))
                .with_variable(
                    Variable::new("hit", VariableType::String).with_source(VariableSource::Tool),
                )
                .with_pre_processor(
                    PreProcessorCall::new("p1", "lookup", "hit").with_path_expr("items[0].title"),
                ),
        )
        .await
        .unwrap();

    let observer = CollectingObserver::new();
    let composer = Composer::new(Arc::new(store), Arc::new(tools)).with_observer(observer.clone());
    let outbox = Outbox::default();
    let mut doc = Document::new();
    let id = composer.insert_template(&mut doc, &key("lookup"), &[0]).await.unwrap();

    let blocked = composer.submit(&mut doc, &outbox).await.unwrap();
    assert!(matches!(blocked, SubmitOutcome::Blocked(_)));

    composer.mark_tool_ready(&mut doc, id, "p1").unwrap();
    let failed = composer.submit(&mut doc, &outbox).await.unwrap();
    let SubmitOutcome::ToolsFailed(run) = failed else {
        panic!("expected tool failure, got {failed:?}");
    };
    assert_eq!(run.errors[0].save_as, "hit");
    assert_eq!(doc.cursor().unwrap().path, vec![0, 2]);
    let events = observer.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        ComposerEvent::ToolRunFailed { failures } if failures.len() == 1
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ComposerEvent::FocusMoved { variable: Some(v), .. } if v == "hit"
    )));

    let sent = composer.submit(&mut doc, &outbox).await.unwrap();
    assert_eq!(sent, SubmitOutcome::Sent("Top hit: Rust".into()));
    assert_eq!(outbox.sent.lock().await.len(), 1);
    assert!(doc.nodes_of_kind(NodeKind::Selection).is_empty());
}

#[tokio::test]
async fn removed_selections_do_not_receive_results() {
    let tools = ToolRegistry::new();
    tools
        .register_tool(ToolMetadata::new("slow", "1").unwrap(), |_args: Value| async move {
            Ok(json!("value"))
        })
        .unwrap();
    let def = TemplateDefinition::new("Slow")
        .with_pre_processor(PreProcessorCall::new("p1", "slow", "out"));
    let mut doc = Document::new();
    let id = insert(&mut doc, 0, "slow", def.clone());
    selection::mark_tool_ready(&mut doc, id, "p1").unwrap();

    let config = ComposerConfig::default();
    let planned = plan_ready_preprocessors(&doc, config.resolution.tool_fallback);
    let outcomes = execute_planned(planned, &tools, &config.runner).await;

    selection::remove_selection(&mut doc, id).unwrap();
    let replacement = insert(&mut doc, 0, "slow", def);

    let report = apply_outcomes(&mut doc, outcomes, &config.runner, &TracingObserver);
    assert_eq!(report.dropped, 1);
    let instance = selection::instance_mut(&mut doc, replacement).unwrap();
    assert!(instance.variable("out").is_none());
    assert_eq!(instance.tool_state("p1").unwrap().status, ToolStatus::Pending);
}
