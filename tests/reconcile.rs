//! End-to-end runs of the reconciler against a mock Mimir.

use std::time::Duration;

use mimirform::client::{ClientConfig, MimirClient};
use mimirform::config::{ConfigHasher, ConfigParser, ConfigValidator, Manifest};
use mimirform::format::FormatOptions;
use mimirform::reconciler::Reconciler;
use mimirform::resources::{ProviderContext, Provisioner};
use mimirform::rules::{RuleGroup, RuleGroups};
use mimirform::state::{LocalStateStore, Operation, StateStore};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST: &str = r#"
provider:
  uri: http://mimir.invalid
  org_id: tenant-1
resources:
  mimir_rules:
    infra:
      namespace: infra
      content: |
        groups:
          - name: cpu-alerts
            rules:
              - alert: HighCPUUsage
                expr: cpu_usage > 80
                for: 5m
          - name: cpu-recordings
            rules:
              - record: instance:cpu:rate5m
                expr: rate(cpu_seconds_total[5m])
"#;

const ALERTS_BODY: &str =
    "name: cpu-alerts\nrules:\n- alert: HighCPUUsage\n  expr: cpu_usage > 80\n  for: 5m\n";
const RECORDINGS_BODY: &str =
    "name: cpu-recordings\nrules:\n- record: instance:cpu:rate5m\n  expr: rate(cpu_seconds_total[5m])\n";

fn manifest() -> Manifest {
    ConfigParser::new().parse_yaml(MANIFEST, None).expect("parse")
}

fn context(server: &MockServer) -> ProviderContext {
    let client = MimirClient::new(ClientConfig::new(server.uri(), "tenant-1")).expect("client");
    ProviderContext::new(client, FormatOptions::default()).with_read_delay(Duration::ZERO)
}

async fn mount_group(server: &MockServer, name: &str, body: &str) {
    Mock::given(method("POST"))
        .and(path("/config/v1/rules/infra"))
        .and(body_string_contains(format!("name: {name}\n")))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/config/v1/rules/infra/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn expected_hash() -> String {
    let groups: Vec<RuleGroup> = [ALERTS_BODY, RECORDINGS_BODY]
        .iter()
        .map(|body| {
            serde_yaml::from_str::<RuleGroup>(body)
                .expect("group")
                .normalized(FormatOptions::default())
                .expect("normalized")
        })
        .collect();
    ConfigHasher::new()
        .hash_yaml(&RuleGroups { groups })
        .expect("hash")
}

#[tokio::test]
async fn test_rules_apply_converges_then_destroys() {
    let server = MockServer::start().await;
    mount_group(&server, "cpu-alerts", ALERTS_BODY).await;
    mount_group(&server, "cpu-recordings", RECORDINGS_BODY).await;
    for name in ["cpu-alerts", "cpu-recordings"] {
        Mock::given(method("DELETE"))
            .and(path(format!("/config/v1/rules/infra/{name}")))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalStateStore::new(dir.path().join("state.json"));
    let ctx = context(&server);
    let provisioner = Provisioner::new(&ctx);
    let manifest = manifest();
    ConfigValidator::new().validate(&manifest).expect("valid");

    let reconciler = Reconciler::new(manifest.resources.desired(), &store, &provisioner);

    let first = reconciler.apply().await.expect("apply");
    assert!(first.success, "{first}");
    assert_eq!(first.created, 1);

    let state = store.load().await.expect("load").expect("state");
    let recorded = state.get("mimir_rules.infra").expect("recorded");
    assert_eq!(recorded.id, "infra");
    assert_eq!(recorded.attributes["groups_count"], 2);
    assert_eq!(recorded.attributes["total_rules"], 2);
    assert_eq!(
        recorded.attributes["rule_names"],
        serde_json::json!(["HighCPUUsage", "instance:cpu:rate5m"])
    );
    assert_eq!(recorded.attributes["content_hash"], expected_hash().as_str());

    let second = reconciler.apply().await.expect("second apply");
    assert!(second.success);
    assert_eq!(second.created + second.updated + second.replaced + second.deleted, 0);
    assert_eq!(second.unchanged, 1);

    let drift = reconciler.check_drift().await.expect("drift");
    assert!(drift.is_converged(), "{drift}");

    let destroyed = reconciler.destroy().await.expect("destroy");
    assert!(destroyed.success);
    assert_eq!(destroyed.deleted, 1);

    let state = store.load().await.expect("load").expect("state");
    assert!(state.is_empty());
    let operations: Vec<Operation> = state.history.iter().map(|h| h.operation).collect();
    assert_eq!(operations.last(), Some(&Operation::Destroy));
    assert!(!store.is_locked().await.expect("lock check"));
}

#[tokio::test]
async fn test_group_deleted_remotely_is_recreated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config/v1/rules/infra/cpu-alerts"))
        .respond_with(ResponseTemplate::new(404).set_body_string("group does not exist"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/config/v1/rules/infra/cpu-recordings"))
        .respond_with(ResponseTemplate::new(404).set_body_string("group does not exist"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalStateStore::new(dir.path().join("state.json"));
    let ctx = context(&server);
    let provisioner = Provisioner::new(&ctx);
    let manifest = manifest();
    let desired = manifest.resources.desired();

    // Record the namespace as if a previous apply had created it.
    let (address, resource) = &desired[0];
    let mut state = store.load_or_default().await.expect("state");
    state.set(mimirform::state::ResourceState::new(
        address.to_string(),
        address.kind,
        "infra",
        resource.spec_hash().expect("hash"),
        serde_json::json!({
            "namespace": "infra",
            "managed_groups": ["cpu-alerts", "cpu-recordings"],
            "groups_count": 2,
            "total_rules": 2,
            "rule_names": ["HighCPUUsage", "instance:cpu:rate5m"],
            "groups": [],
            "content_hash": "",
        }),
    ));
    store.save(&state).await.expect("save");

    let reconciler = Reconciler::new(desired.clone(), &store, &provisioner);
    let run = reconciler.plan().await.expect("plan");
    assert_eq!(run.refresh.vanished, vec![String::from("mimir_rules.infra")]);
    assert_eq!(run.diff.creates(), 1);
    assert_eq!(run.plan.action_count(), 1);
}
