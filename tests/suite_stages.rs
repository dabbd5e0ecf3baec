//! Suite workflow against the fake job service and ledger node.

use alloy::consensus::Transaction;
use serde_json::{json, Value};

use chain_attest::artifacts::{keys, keys::stage, ArtifactKey, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
use chain_attest::blockchain::FeeOverrides;
use chain_attest::pipeline::{CallMethod, RegisterSuiteArgs};
use chain_attest::tasks::JobKind;
use chain_attest::Pipeline;

mod common;
use common::*;

fn suite_fields() -> Value {
    json!({
        "suiteHash": hash32(0x11),
        "suiteURI": "ipfs://QmSuite",
        "docsURI": "ipfs://QmDocs",
        "certificateURI": "ipfs://QmCert",
        "category": "finance",
        "fileFormat": "csv",
        "deadline": FUTURE_DEADLINE,
        "totalExpected": 10,
    })
}

fn prepared_suite_base(suite_id: &str) -> ArtifactKey {
    keys::suite_stage(suite_id, stage::PREPARE_SUITE).unwrap()
}

fn seed_prepared_suite(store: &MemoryArtifactStore, suite_id: &str, value: Value) {
    seed_stage(
        store,
        &prepared_suite_base(suite_id),
        json!({ "suite_id": suite_id }),
        prepared(stage::PREPARE_SUITE, value),
    );
}

#[tokio::test]
async fn test_prepare_suite_persists_latest_pair() {
    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Succeed(suite_fields()));
    let pipeline = pipeline(jobs, FakeNode::default(), seeded_store());

    let out = pipeline
        .prepare_suite(json!({ "suite_id": "s1", "dataset_id": "c1" }))
        .await
        .unwrap();

    assert!(out.is_ok());
    assert_eq!(out.get("suite_hash"), Some(&json!(hash32(0x11))));
    assert_eq!(pipeline.jobs().submissions(JobKind::PrepareSuite), 1);

    let store = pipeline.store();
    let response = read_response(store, &prepared_suite_base("s1")).unwrap();
    assert_eq!(response["outcome"]["outcome"], "succeeded");
    assert_eq!(response["outcome"]["value"]["suiteURI"], "ipfs://QmSuite");

    let dataset_base = keys::dataset_stage("s1", "c1", stage::PREPARE_SUITE).unwrap();
    assert!(read_response(store, &dataset_base).is_some());

    let logs = read(store, &ArtifactKey::new(keys::LOGS).unwrap()).unwrap();
    assert_eq!(logs.as_array().map(Vec::len), Some(1));
    assert_eq!(logs[0]["action"], "s1/prepare_suite_artifacts");
}

#[tokio::test]
async fn test_prepare_suite_without_dataset_warns() {
    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Succeed(suite_fields()));
    let pipeline = pipeline(jobs, FakeNode::default(), seeded_store());

    let out = pipeline.prepare_suite(json!({ "suite_id": "s2" })).await.unwrap();

    assert!(out.is_ok());
    assert_eq!(out.get("warnings").and_then(Value::as_array).map(Vec::len), Some(1));
    assert!(read_response(pipeline.store(), &prepared_suite_base("s2")).is_some());
}

#[tokio::test]
async fn test_failed_prepare_job_is_recorded() {
    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Fail("suite not found".into()));
    let pipeline = pipeline(jobs, FakeNode::default(), seeded_store());

    let out = pipeline
        .prepare_suite(json!({ "suite_id": "s1", "dataset_id": "c1" }))
        .await
        .unwrap();

    assert!(!out.is_ok());
    let error = out.error().unwrap();
    assert_eq!(error.code, "REMOTE_JOB_FAILURE");
    assert!(error.message.contains("suite not found"));
    let response = read_response(pipeline.store(), &prepared_suite_base("s1")).unwrap();
    assert_eq!(response["ok"], false);
}

#[tokio::test]
async fn test_failed_prepare_job_raises_in_strict_mode() {
    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Fail("boom".into()));
    let pipeline = strict(pipeline(jobs, FakeNode::default(), seeded_store()));

    let err = pipeline
        .prepare_suite(json!({ "suite_id": "s1", "dataset_id": "c1" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "REMOTE_JOB_FAILURE");
    assert!(read_response(pipeline.store(), &prepared_suite_base("s1")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_prepare_timeout_is_a_warning() {
    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Hang);
    let pipeline = pipeline(jobs, FakeNode::default(), seeded_store());

    let out = pipeline
        .prepare_suite(json!({ "suite_id": "s1", "dataset_id": "c1" }))
        .await
        .unwrap();

    assert!(out.is_ok());
    assert_eq!(out.get("timed_out"), Some(&json!(true)));
    assert_eq!(out.get("outcome").unwrap()["outcome"], "pending");

    // A pending prepare cannot feed the submit stage.
    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_ARTIFACT");
}

#[tokio::test]
async fn test_register_suite_resumes_from_store() {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    let node = FakeNode::default().with_logs(vec![request_created_log(7, &hash32(0x11))]);
    let pipeline = pipeline(FakeJobs::default(), node, store);

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.01))
        .await
        .unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    assert_eq!(pipeline.jobs().submissions(JobKind::PrepareSuite), 0);
    assert_eq!(pipeline.jobs().submissions(JobKind::IngestTx), 1);
    assert_eq!(pipeline.node().estimates(), 1);
    assert_eq!(pipeline.node().broadcasts(), 1);
    assert_eq!(out.get("method"), Some(&json!("plain")));
    assert_eq!(out.get("request_id"), Some(&json!({ "value": 7, "strategy": "event" })));

    let input = pipeline.node().estimated_input().unwrap();
    assert_eq!(
        input[..4],
        selector("createDatasetRequest(bytes32,string,string,string,string,string,uint256,uint256)")
    );

    let base = keys::suite_stage("s1", stage::REGISTER_SUITE).unwrap();
    let request = pipeline.store().read_json(&keys::request(&base).unwrap()).unwrap().unwrap();
    assert_eq!(request["call_args"]["deadline"], json!(FUTURE_DEADLINE));
    assert_eq!(request["prepare_response_key"], "blockchain/expectations/suites/s1/prepare_suite_artifacts/response");
    let response = read_response(pipeline.store(), &base).unwrap();
    assert_eq!(response["request_id"]["value"], 7);
}

#[tokio::test]
async fn test_register_suite_resumes_in_a_fresh_process() {
    let store = temp_store("resume-suite");
    seed_registry(&store);
    let root = store.root().to_path_buf();

    let jobs = FakeJobs::default().script(JobKind::PrepareSuite, Script::Succeed(suite_fields()));
    let first = Pipeline::new(jobs, FakeNode::default(), store, test_config());
    let prepared = first
        .prepare_suite(json!({ "suite_id": "s1", "dataset_id": "c1" }))
        .await
        .unwrap();
    assert!(prepared.is_ok());
    drop(first);

    let reopened = FsArtifactStore::open(&root).unwrap();
    let second = Pipeline::new(FakeJobs::default(), FakeNode::default(), reopened, test_config())
        .with_wallet(test_wallet());
    let out = second
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    assert_eq!(second.jobs().submissions(JobKind::PrepareSuite), 0);
    assert_eq!(second.node().broadcasts(), 1);
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_register_suite_picks_sig_path() {
    let mut fields = suite_fields();
    fields["nonce"] = json!(3);
    fields["expiresAt"] = json!(FUTURE_DEADLINE);
    fields["signature"] = json!(raw_signature(1));

    let store = seeded_store();
    seed_prepared_suite(&store, "s1", fields);
    let pipeline = pipeline(FakeJobs::default(), FakeNode::default(), store);

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    assert_eq!(out.get("method"), Some(&json!("sig")));
    let input = pipeline.node().estimated_input().unwrap();
    assert_eq!(
        input[..4],
        selector(
            "createDatasetRequestWithSig(bytes32,string,string,string,string,string,uint256,uint256,uint256,uint256,bytes)"
        )
    );
    // The recovery byte 1 is sent as 28.
    assert!(input.windows(65).any(|w| w[..64] == [0xab; 64] && w[64] == 28));
}

#[tokio::test]
async fn test_forced_plain_method_ignores_signature() {
    let mut fields = suite_fields();
    fields["nonce"] = json!(3);
    fields["expiresAt"] = json!(FUTURE_DEADLINE);
    fields["signature"] = json!(raw_signature(27));

    let store = seeded_store();
    seed_prepared_suite(&store, "s1", fields);
    let pipeline = pipeline(FakeJobs::default(), FakeNode::default(), store);

    let args = RegisterSuiteArgs {
        method: Some(CallMethod::Plain),
        ..RegisterSuiteArgs::new("s1", 0.0)
    };
    let out = pipeline.register_suite(args).await.unwrap();

    assert_eq!(out.get("method"), Some(&json!("plain")));
}

#[tokio::test]
async fn test_past_deadline_skips_gas_estimate() {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    let node = FakeNode::default().with_chain_now(FUTURE_DEADLINE + 1);
    let pipeline = strict(pipeline(FakeJobs::default(), node, store));

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(!out.is_ok());
    let error = out.error().unwrap();
    assert_eq!(error.code, "DEADLINE_PAST");
    assert_eq!(error.details.as_ref().unwrap()["stage"], "precheck");
    assert_eq!(pipeline.node().estimates(), 0);
    assert_eq!(pipeline.node().broadcasts(), 0);

    let base = keys::suite_stage("s1", stage::REGISTER_SUITE).unwrap();
    let response = read_response(pipeline.store(), &base).unwrap();
    assert_eq!(response["error"]["code"], "DEADLINE_PAST");
}

#[tokio::test]
async fn test_nonce_used_revert_carries_hint() {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    let node = FakeNode::default().reverting("execution reverted: nonce used");
    let pipeline = pipeline(FakeJobs::default(), node, store);

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(!out.is_ok());
    let error = out.error().unwrap();
    assert_eq!(error.code, "EVM_REVERT");
    assert_eq!(error.message, "nonce used");
    assert!(error.hint.as_deref().unwrap().contains("prepare_suite_artifacts"));
    assert_eq!(error.details.as_ref().unwrap()["stage"], "estimate_gas");
    assert_eq!(pipeline.node().broadcasts(), 0);
    assert_eq!(pipeline.jobs().submissions(JobKind::IngestTx), 0);
}

#[tokio::test]
async fn test_revert_raises_in_strict_mode() {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    let node = FakeNode::default().reverting("execution reverted: nonce used");
    let pipeline = strict(pipeline(FakeJobs::default(), node, store));

    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EVM_REVERT");
    assert!(err.hint().is_some());
    let base = keys::suite_stage("s1", stage::REGISTER_SUITE).unwrap();
    assert!(read_response(pipeline.store(), &base).is_none());
}

#[tokio::test]
async fn test_missing_prepare_artifact_names_key() {
    let pipeline = pipeline(FakeJobs::default(), FakeNode::default(), seeded_store());

    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s404", 0.0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "MISSING_ARTIFACT");
    assert!(err
        .to_string()
        .contains("blockchain/expectations/suites/s404/prepare_suite_artifacts/response"));
    assert_eq!(pipeline.node().estimates(), 0);
}

#[tokio::test]
async fn test_missing_fields_are_listed() {
    let mut fields = suite_fields();
    let obj = fields.as_object_mut().unwrap();
    obj.remove("suiteURI");
    obj.remove("deadline");

    let store = seeded_store();
    seed_prepared_suite(&store, "s1", fields);
    let pipeline = pipeline(FakeJobs::default(), FakeNode::default(), store);

    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "MISSING_ARTIFACT");
    let message = err.to_string();
    assert!(message.contains("suiteURI") && message.contains("deadline"), "{}", message);
}

#[tokio::test]
async fn test_register_without_wallet_is_rejected() {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    let pipeline = Pipeline::new(FakeJobs::default(), FakeNode::default(), store, test_config());

    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
}

fn ready_store() -> MemoryArtifactStore {
    let store = seeded_store();
    seed_prepared_suite(&store, "s1", suite_fields());
    store
}

fn register_suite_response(pipeline: &TestPipeline) -> Option<Value> {
    read_response(pipeline.store(), &keys::suite_stage("s1", stage::REGISTER_SUITE).unwrap())
}

#[tokio::test]
async fn test_gas_limit_has_headroom_and_legacy_price() {
    let mut config = test_config();
    config.ledger.gas_limit_multiplier = 1.5;
    config.ledger.gas_price_multiplier = 1.5;
    let node = FakeNode::default().with_gas_price(2_000_000_000);
    let pipeline = Pipeline::new(FakeJobs::default(), node, ready_store(), config).with_wallet(test_wallet());

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    assert_eq!(out.get("gas_estimate"), Some(&json!(100_000)));
    let tx = pipeline.node().last_broadcast().unwrap();
    assert_eq!(tx.gas_limit(), 150_000);
    assert_eq!(tx.gas_price(), Some(3_000_000_000));
    assert_eq!(tx.chain_id(), Some(11_155_111));
}

#[tokio::test]
async fn test_fee_caps_switch_to_dynamic_fees() {
    let pipeline = pipeline(FakeJobs::default(), FakeNode::default(), ready_store());
    let args = RegisterSuiteArgs {
        fees: FeeOverrides {
            max_fee_gwei: Some(40.0),
            max_priority_fee_gwei: Some(2.0),
        },
        ..RegisterSuiteArgs::new("s1", 0.0)
    };

    let out = pipeline.register_suite(args).await.unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    let tx = pipeline.node().last_broadcast().unwrap();
    assert!(tx.is_dynamic_fee());
    assert_eq!(tx.max_fee_per_gas(), 40_000_000_000);
    assert_eq!(tx.max_priority_fee_per_gas(), Some(2_000_000_000));
}

#[tokio::test]
async fn test_gas_price_above_cap_is_refused() {
    let node = FakeNode::default().with_gas_price(600_000_000_000);
    let pipeline = pipeline(FakeJobs::default(), node, ready_store());

    let err = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CHAIN_ERROR");
    assert!(err.to_string().contains("600 gwei exceeds maximum 500 gwei"), "{}", err);
    assert_eq!(pipeline.node().broadcasts(), 0);
    assert_eq!(err.tx_hash(), None);
}

#[tokio::test(start_paused = true)]
async fn test_transient_receipt_errors_are_retried() {
    let node = FakeNode::default()
        .with_logs(vec![request_created_log(7, &hash32(0x11))])
        .failing_receipt_polls(2);
    let pipeline = pipeline(FakeJobs::default(), node, ready_store());

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(out.is_ok(), "{}", out.to_json());
    assert_eq!(pipeline.node().broadcasts(), 1);
    assert_eq!(pipeline.node().receipt_polls(), 3);
    assert_eq!(out.get("request_id"), Some(&json!({ "value": 7, "strategy": "event" })));
    assert_eq!(pipeline.jobs().submissions(JobKind::IngestTx), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_node_after_broadcast_keeps_tx_hash() {
    let node = FakeNode::default().failing_receipt_polls(u32::MAX);
    let pipeline = pipeline(FakeJobs::default(), node, ready_store());

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(!out.is_ok());
    assert_eq!(pipeline.node().broadcasts(), 1);
    let error = out.error().unwrap();
    assert_eq!(error.code, "CHAIN_ERROR");
    assert!(error.message.contains("not confirmed"), "{}", error.message);
    assert_eq!(error.details.as_ref().unwrap()["stage"], "receipt");

    let tx_hash = out.get("tx_hash").cloned().unwrap();
    assert!(tx_hash.as_str().unwrap().starts_with("0x"));
    let response = register_suite_response(&pipeline).unwrap();
    assert_eq!(response["ok"], false);
    assert_eq!(response["tx_hash"], tx_hash);
    assert_eq!(pipeline.jobs().submissions(JobKind::IngestTx), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmined_transaction_times_out_and_is_recorded() {
    let node = FakeNode::default().mining(Mining::Never);
    let pipeline = pipeline(FakeJobs::default(), node, ready_store());

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(!out.is_ok());
    assert_eq!(out.error().unwrap().code, "CHAIN_ERROR");
    assert!(pipeline.node().receipt_polls() > 1);
    let response = register_suite_response(&pipeline).unwrap();
    assert!(response["tx_hash"].is_string());
    assert_eq!(response["error"]["details"]["stage"], "receipt");
}

#[tokio::test]
async fn test_reverted_receipt_is_recorded_at_receipt_stage() {
    let node = FakeNode::default().mining(Mining::Reverted);
    let pipeline = pipeline(FakeJobs::default(), node, ready_store());

    let out = pipeline
        .register_suite(RegisterSuiteArgs::new("s1", 0.0))
        .await
        .unwrap();

    assert!(!out.is_ok());
    let error = out.error().unwrap();
    assert_eq!(error.code, "EVM_REVERT");
    assert_eq!(error.details.as_ref().unwrap()["stage"], "receipt");
    assert_eq!(pipeline.node().broadcasts(), 1);
    assert_eq!(pipeline.node().receipt_polls(), 1);
    let response = register_suite_response(&pipeline).unwrap();
    assert_eq!(response["tx_hash"], out.get("tx_hash").cloned().unwrap());
}
