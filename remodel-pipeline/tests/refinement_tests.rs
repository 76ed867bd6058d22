//! Refinement loop scenarios against a scripted completion service and an
//! in-memory sandbox.

use proptest::prelude::*;
use remodel_core::{
    LlmError, NamespaceContext, RefinementConfig, RefinementError, RemodelError, SandboxError,
    SourceNamespace,
};
use remodel_pipeline::{
    CompletionOutcome, RefinementListener, RefinementPhase, RefinementPipeline, ValidationStage,
};
use remodel_sandbox::NamespaceRegistry;
use remodel_test_utils::assertions::{
    assert_no_proposal, assert_prepare_failure, assert_schema_extraction, assert_translated,
};
use remodel_test_utils::fixtures::{
    fast_config, payload, payload_with_queries, raw_query, rewrite_response, sandbox_config,
    schema_response, schema_response_tables, ORDERS_QUERY,
};
use remodel_test_utils::{RawDdl, RecordingEngine, ScriptedCompletionProvider, ScriptedReply};
use std::sync::{Arc, Mutex};

fn pipeline(
    provider: &Arc<ScriptedCompletionProvider>,
    engine: &Arc<RecordingEngine>,
    config: RefinementConfig,
) -> RefinementPipeline {
    RefinementPipeline::new(provider.clone(), engine.clone(), config, &sandbox_config()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_single_query() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_e2e"),
        rewrite_response("remodel_e2e"),
    ]));
    let engine = Arc::new(RecordingEngine::new());

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("e2e", &payload())
        .await
        .unwrap();

    assert_eq!(outcome.artifact.tables, schema_response_tables("remodel_e2e"));
    assert_eq!(outcome.artifact.migrations.len(), 1);
    // Output keeps sandbox-qualified names; only execution is translated.
    assert!(outcome.artifact.migrations[0]
        .as_str()
        .contains("FROM cat.src.orders"));
    assert_eq!(outcome.artifact.queries.len(), 1);
    assert_eq!(outcome.artifact.queries[0].id, "q1");
    assert_eq!(outcome.artifact.queries[0].text, rewrite_response("remodel_e2e"));
    assert_eq!(outcome.artifact.queries[0].weight, 50);

    assert!(outcome.report.is_complete());
    assert_eq!(outcome.report.completion_calls, 2);
    assert_eq!(outcome.report.ddl_iterations_used, 1);
    assert_eq!(provider.call_count(), 2);
    assert_translated(&engine.statements(), "cat");
}

#[tokio::test]
async fn test_blank_then_valid_resets_history_once() {
    let provider = Arc::new(ScriptedCompletionProvider::new(vec![
        ScriptedReply::blank(),
        ScriptedReply::text(schema_response("remodel_blank")),
    ]));
    let engine = Arc::new(RecordingEngine::new());

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("blank", &payload_with_queries(vec![]))
        .await
        .unwrap();

    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.completion_calls, 2);
    assert_eq!(outcome.report.history_resets, 1);
    assert_eq!(provider.call_count(), 2);

    // Both requests start from the pristine system + request pair.
    let requests = provider.requests();
    assert_eq!(requests[0].len(), 2);
    assert_eq!(requests[1], requests[0]);
}

#[tokio::test]
async fn test_impossible_query_is_absent_without_error() {
    let provider = Arc::new(
        ScriptedCompletionProvider::from_texts([schema_response("remodel_imp")])
            .with_fallback(ScriptedReply::text("  IMPOSSIBLE\n")),
    );
    let engine = Arc::new(RecordingEngine::new());
    let payload = payload_with_queries(vec![
        raw_query("q1", ORDERS_QUERY, 10, 5),
        raw_query("q2", "SELECT count(*) FROM cat.src.orders", 1, 1),
    ]);

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("imp", &payload)
        .await
        .unwrap();

    assert!(outcome.artifact.queries.is_empty());
    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.impossible_query_ids, vec!["q1", "q2"]);
    assert!(outcome.report.dropped_query_ids.is_empty());
    // One call per query: the signal ends the query immediately.
    assert_eq!(outcome.report.completion_calls, 3);
}

#[tokio::test]
async fn test_table_failure_is_fed_back_and_skips_migrations() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_fb"),
        schema_response("remodel_fb"),
        "IMPOSSIBLE".to_string(),
    ]));
    let engine = Arc::new(
        RecordingEngine::new().fail_times("CREATE TABLE sandbox.remodel_fb", "line 1:1: boom", 1),
    );

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("fb", &payload())
        .await
        .unwrap();

    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.ddl_iterations_used, 2);
    assert_eq!(outcome.report.validation_failures, 1);

    let second = &provider.requests()[1];
    assert_eq!(second.len(), 4);
    assert!(second[3].content.contains("line 1:1: boom"));
    assert!(second[3]
        .content
        .contains("CREATE TABLE sandbox.remodel_fb.orders_by_customer"));

    // The migration only ran after the tables validated, in round two.
    let migrations = engine
        .statements()
        .iter()
        .filter(|s| s.starts_with("INSERT INTO"))
        .count();
    assert_eq!(migrations, 1);
}

#[tokio::test]
async fn test_query_rewrite_retried_after_failure() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_qr"),
        "SELECT nope FROM sandbox.remodel_qr.orders_by_customer".to_string(),
        rewrite_response("remodel_qr"),
    ]));
    let engine = Arc::new(RecordingEngine::new().fail_when("nope", "Column 'nope' cannot be resolved"));

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("qr", &payload())
        .await
        .unwrap();

    assert_eq!(outcome.artifact.queries.len(), 1);
    assert_eq!(outcome.artifact.queries[0].text, rewrite_response("remodel_qr"));
    assert_eq!(outcome.report.validation_failures, 1);

    let third = &provider.requests()[2];
    assert!(third.last().unwrap().content.contains("cannot be resolved"));
}

#[tokio::test]
async fn test_query_budget_exhaustion_drops_query() {
    let provider = Arc::new(
        ScriptedCompletionProvider::from_texts([schema_response("remodel_dq")])
            .with_fallback(ScriptedReply::text("SELECT broken")),
    );
    let engine = Arc::new(RecordingEngine::new().fail_when("broken", "syntax error"));

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("dq", &payload())
        .await
        .unwrap();

    assert!(outcome.artifact.queries.is_empty());
    assert_eq!(outcome.report.dropped_query_ids, vec!["q1"]);
    assert_eq!(outcome.report.completion_calls, 1 + 3);
    assert!(!outcome.report.is_complete());
}

#[tokio::test]
async fn test_schema_budget_exhaustion_keeps_last_proposal() {
    let provider = Arc::new(
        ScriptedCompletionProvider::from_texts(Vec::<String>::new())
            .with_fallback(ScriptedReply::text(schema_response("remodel_ex"))),
    );
    let engine = Arc::new(
        RecordingEngine::new().fail_when("INSERT INTO sandbox.remodel_ex", "Insert type mismatch"),
    );
    let config = RefinementConfig {
        ddl_iteration_limit: 2,
        query_iteration_limit: 1,
        ..fast_config()
    };

    let outcome = pipeline(&provider, &engine, config)
        .run("ex", &payload())
        .await
        .unwrap();

    assert!(!outcome.report.schema_validated);
    assert_eq!(outcome.report.ddl_iterations_used, 2);
    assert_eq!(outcome.artifact.tables, schema_response_tables("remodel_ex"));
    assert_eq!(outcome.artifact.migrations.len(), 1);
}

#[tokio::test]
async fn test_no_proposal_when_schema_never_parsed() {
    let provider = Arc::new(
        ScriptedCompletionProvider::from_texts(Vec::<String>::new())
            .with_fallback(ScriptedReply::blank()),
    );
    let engine = Arc::new(RecordingEngine::new());

    let result = pipeline(&provider, &engine, fast_config())
        .run("none", &payload())
        .await;

    assert_no_proposal(&result);
    assert_eq!(provider.call_count(), 5);
}

#[tokio::test]
async fn test_empty_ddl_section_is_fed_back() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        "DDLS:\nMIGRATIONS:\n#END#".to_string(),
        schema_response("remodel_em"),
        "IMPOSSIBLE".to_string(),
    ]));
    let engine = Arc::new(RecordingEngine::new());

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("em", &payload())
        .await
        .unwrap();

    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.ddl_iterations_used, 2);
    assert!(provider.requests()[1][3].content.contains("CREATE TABLE"));
}

#[tokio::test]
async fn test_prepare_failure_is_fatal() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([schema_response("remodel_pf")]));
    let engine = Arc::new(RecordingEngine::new().fail_when("sandbox.src.orders", "Catalog 'x' not found"));

    let result = pipeline(&provider, &engine, fast_config())
        .run("pf", &payload())
        .await;

    assert_prepare_failure(&result);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_unqualified_first_ddl_is_fatal() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts(Vec::<String>::new()));
    let engine = Arc::new(RecordingEngine::new());
    let mut payload = payload();
    payload.ddl = vec![RawDdl {
        statement: "CREATE TABLE orders (id INT)".to_string(),
    }];

    let result = pipeline(&provider, &engine, fast_config())
        .run("uq", &payload)
        .await;

    assert_schema_extraction(&result);
    assert_eq!(engine.statement_count(), 0);
}

#[tokio::test]
async fn test_engine_outage_is_fatal() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([schema_response("remodel_out")]));
    let engine = Arc::new(RecordingEngine::new());
    engine.set_unavailable(true);

    let result = pipeline(&provider, &engine, fast_config())
        .run("out", &payload())
        .await;

    assert!(matches!(
        result,
        Err(RemodelError::Sandbox(SandboxError::Engine { .. }))
    ));
}

#[tokio::test]
async fn test_completion_errors_spend_iterations() {
    let provider = Arc::new(ScriptedCompletionProvider::new(vec![
        ScriptedReply::Error(LlmError::RateLimited {
            provider: "scripted".to_string(),
            retry_after_ms: 1,
        }),
        ScriptedReply::Error(LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 502,
            message: "bad gateway".to_string(),
        }),
        ScriptedReply::text(schema_response("remodel_err")),
        ScriptedReply::text("IMPOSSIBLE"),
    ]));
    let engine = Arc::new(RecordingEngine::new());

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("err", &payload())
        .await
        .unwrap();

    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.ddl_iterations_used, 3);
    assert_eq!(outcome.report.completion_calls, 4);
}

#[tokio::test]
async fn test_failed_proposal_reset_spends_iteration() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_rs"),
        schema_response("remodel_rs"),
        "IMPOSSIBLE".to_string(),
    ]));
    let engine = Arc::new(RecordingEngine::new().fail_times(
        "DROP SCHEMA IF EXISTS sandbox.remodel_rs",
        "Schema is in use by a running query",
        1,
    ));

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("rs", &payload())
        .await
        .unwrap();

    assert!(outcome.report.schema_validated);
    assert_eq!(outcome.report.ddl_iterations_used, 2);
    assert_eq!(outcome.report.validation_failures, 0);
    // Nothing was fed back; the second call repeats the original request.
    assert_eq!(provider.requests()[1].len(), 2);
}

#[tokio::test]
async fn test_duplicate_query_ids_are_not_merged() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_dup"),
        rewrite_response("remodel_dup"),
        "IMPOSSIBLE".to_string(),
    ]));
    let engine = Arc::new(RecordingEngine::new());
    let queries = vec![
        raw_query("q1", "SELECT count(*) FROM cat.src.orders", 1, 1),
        raw_query("q1", ORDERS_QUERY, 10, 5),
    ];

    let outcome = pipeline(&provider, &engine, fast_config())
        .run("dup", &payload_with_queries(queries))
        .await
        .unwrap();

    // Both entries are refined on their own, heaviest first.
    assert_eq!(outcome.report.queries_requested, 2);
    assert!(provider.requests()[1][1].content.ends_with(&format!("{}\n", ORDERS_QUERY)));
    // The output keeps the shared id on the rewrite and in the report, so a
    // caller mapping by id cannot tell the two apart.
    assert_eq!(outcome.artifact.queries.len(), 1);
    assert_eq!(outcome.artifact.queries[0].id, "q1");
    assert_eq!(outcome.artifact.queries[0].weight, 50);
    assert_eq!(outcome.report.impossible_query_ids, vec!["q1".to_string()]);
    assert!(!outcome.report.is_complete());
}

#[tokio::test]
async fn test_leased_namespace_is_busy() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([schema_response("remodel_busy")]));
    let engine = Arc::new(RecordingEngine::new());
    let registry = NamespaceRegistry::new();
    let held = registry
        .acquire(&NamespaceContext::new(
            SourceNamespace {
                catalog: "cat".to_string(),
                schema: "other".to_string(),
            },
            "sandbox",
            "remodel_busy",
        ))
        .unwrap();

    let pipeline = pipeline(&provider, &engine, fast_config()).with_registry(registry.clone());
    let result = pipeline.run("busy", &payload()).await;
    assert!(matches!(
        result,
        Err(RemodelError::Sandbox(SandboxError::NamespaceBusy { .. }))
    ));
    assert_eq!(engine.statement_count(), 0);

    drop(held);
    // Finished runs release their namespaces as well.
    assert_eq!(registry.active_leases(), 0);
}

#[derive(Default)]
struct Recorder {
    phases: Mutex<Vec<RefinementPhase>>,
    completions: Mutex<Vec<(RefinementPhase, CompletionOutcome)>>,
    failures: Mutex<Vec<ValidationStage>>,
}

impl RefinementListener for Recorder {
    fn on_phase(&self, phase: RefinementPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_completion(&self, phase: RefinementPhase, outcome: CompletionOutcome) {
        self.completions.lock().unwrap().push((phase, outcome));
    }

    fn on_validation_failure(&self, stage: ValidationStage) {
        self.failures.lock().unwrap().push(stage);
    }
}

#[tokio::test]
async fn test_listener_sees_state_machine() {
    let provider = Arc::new(ScriptedCompletionProvider::from_texts([
        schema_response("remodel_ls"),
        schema_response("remodel_ls"),
        "IMPOSSIBLE".to_string(),
    ]));
    let engine = Arc::new(
        RecordingEngine::new().fail_times("INSERT INTO sandbox.remodel_ls", "mismatch", 1),
    );
    let recorder = Arc::new(Recorder::default());

    pipeline(&provider, &engine, fast_config())
        .with_listener(recorder.clone())
        .run("ls", &payload())
        .await
        .unwrap();

    assert_eq!(
        *recorder.phases.lock().unwrap(),
        vec![
            RefinementPhase::Preparing,
            RefinementPhase::DdlMigrationRefinement,
            RefinementPhase::QueryRefinement,
            RefinementPhase::Done,
        ]
    );
    assert_eq!(
        *recorder.completions.lock().unwrap(),
        vec![
            (RefinementPhase::DdlMigrationRefinement, CompletionOutcome::Rejected),
            (RefinementPhase::DdlMigrationRefinement, CompletionOutcome::Accepted),
            (RefinementPhase::QueryRefinement, CompletionOutcome::Impossible),
        ]
    );
    assert_eq!(*recorder.failures.lock().unwrap(), vec![ValidationStage::Migration]);
}

#[tokio::test]
async fn test_cancellation_between_iterations() {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let provider = Arc::new(ScriptedCompletionProvider::from_texts(Vec::<String>::new()));
    let engine = Arc::new(RecordingEngine::new());
    let pipeline = pipeline(&provider, &engine, fast_config()).with_shutdown(rx);
    tx.send(true).unwrap();

    let result = pipeline.run("cx", &payload()).await;
    assert_eq!(
        result.unwrap_err(),
        RemodelError::Refinement(RefinementError::Cancelled)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Every reply is rejected, so every budget is spent to the last call.
    #[test]
    fn prop_completion_calls_bounded(
        ddl_limit in 1u32..5,
        query_limit in 1u32..4,
        query_count in 0usize..5,
    ) {
        let provider = Arc::new(
            ScriptedCompletionProvider::from_texts(Vec::<String>::new())
                .with_fallback(ScriptedReply::text(schema_response("remodel_lb"))),
        );
        let engine = Arc::new(
            RecordingEngine::new().fail_when("INSERT INTO sandbox.remodel_lb", "rejected"),
        );
        let config = RefinementConfig {
            ddl_iteration_limit: ddl_limit,
            query_iteration_limit: query_limit,
            ..fast_config()
        };
        let bound = config.completion_call_bound(query_count);
        let queries = (0..query_count)
            .map(|i| raw_query(&format!("q{}", i), ORDERS_QUERY, 1, i as u64))
            .collect();
        let pipeline = pipeline(&provider, &engine, config);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let outcome = runtime
            .block_on(pipeline.run("lb", &payload_with_queries(queries)))
            .unwrap();

        prop_assert_eq!(outcome.report.completion_calls, bound);
        prop_assert_eq!(provider.call_count() as u64, bound);
        prop_assert!(!outcome.report.schema_validated);
        prop_assert_eq!(outcome.report.dropped_query_ids.len(), query_count);
    }
}
