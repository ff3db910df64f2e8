use std::{
    collections::HashSet,
    fs,
    sync::Arc,
    thread,
    time::{Duration, SystemTime},
};

use go_defer::defer;
use rusty_rabbitmq::{
    errors::RvError,
    logical::{Operation, Request, Response},
    modules::rabbitmq::{
        broker::{BrokerCall, MockBroker},
        RabbitMqBackend,
    },
    test_utils::{new_test_backend_in, new_test_backend_with, test_dir},
};
use serde_json::{json, Map, Value};

fn test_read_api(backend: &RabbitMqBackend, path: &str, is_ok: bool) -> Option<Response> {
    let mut req = Request::new(path);
    req.operation = Operation::Read;
    let resp = backend.handle_request(&mut req);
    assert_eq!(resp.is_ok(), is_ok, "read {path}: {resp:?}");
    resp.unwrap_or(None)
}

fn test_write_api(backend: &RabbitMqBackend, path: &str, is_ok: bool, data: Option<Map<String, Value>>) {
    let mut req = Request::new(path);
    req.operation = Operation::Write;
    req.body = data;

    let ret = backend.handle_request(&mut req);
    assert_eq!(ret.is_ok(), is_ok, "write {path}: {ret:?}");
}

fn test_delete_api(backend: &RabbitMqBackend, path: &str) -> Result<Option<Response>, RvError> {
    let mut req = Request::new(path);
    req.operation = Operation::Delete;
    backend.handle_request(&mut req)
}

fn test_revoke_api(backend: &RabbitMqBackend, lease_id: &str) -> Result<Option<Response>, RvError> {
    let mut req = Request::new_revoke_request(&format!("leases/{lease_id}"));
    backend.handle_request(&mut req)
}

fn test_renew_api(backend: &RabbitMqBackend, lease_id: &str, increment: Value) -> Result<Option<Response>, RvError> {
    let mut req = Request::new_renew_request(&format!("leases/{lease_id}"), json!({ "increment": increment }).as_object().cloned());
    backend.handle_request(&mut req)
}

fn test_issue_api(backend: &RabbitMqBackend, role: &str) -> (String, String, String) {
    let resp = test_read_api(backend, &format!("creds/{role}"), true).unwrap();
    let data = resp.data.unwrap();
    let secret = resp.secret.unwrap();
    (
        data["username"].as_str().unwrap().to_string(),
        data["password"].as_str().unwrap().to_string(),
        secret.lease_id,
    )
}

fn test_role_data() -> Option<Map<String, Value>> {
    json!({
        "tags": "tags",
        "vhosts": r#"{"vhost": {"configure": "test", "write": "test2", "read": "test3"}}"#,
        "vhost_topics": r#"{"vhost": {"exchange-one": {"write": "test2", "read": "test3"}}}"#,
    })
    .as_object()
    .cloned()
}

#[test]
fn test_rabbitmq_role_crud() {
    let dir = test_dir("role_crud");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (_broker, backend) = new_test_backend_in(&dir);

    test_write_api(&backend, "role/testrole", true, test_role_data());

    let resp = test_read_api(&backend, "role/testrole", true).unwrap();
    let expected = json!({
        "name": "testrole",
        "tags": "tags",
        "vhosts": {"vhost": {"configure": "test", "write": "test2", "read": "test3"}},
        "vhost_topics": {"vhost": {"exchange-one": {"write": "test2", "read": "test3"}}},
    });
    assert_eq!(Value::Object(resp.data.unwrap()), expected);

    // the plural path serves the same role
    let resp = test_read_api(&backend, "roles/testrole", true).unwrap();
    assert_eq!(Value::Object(resp.data.unwrap()), expected);

    assert!(test_read_api(&backend, "roles/missing", true).is_none());

    assert!(test_delete_api(&backend, "roles/testrole").is_ok());
    assert!(test_read_api(&backend, "roles/testrole", true).is_none());
    assert_eq!(test_delete_api(&backend, "roles/testrole").unwrap_err(), RvError::ErrNotFound);
}

#[test]
fn test_rabbitmq_role_unknown_field() {
    let dir = test_dir("role_unknown_field");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (_broker, backend) = new_test_backend_in(&dir);

    let data = json!({"tags": "a", "vhost": "{}"}).as_object().cloned();
    let err = backend.write("roles/app", data).unwrap_err();
    assert_eq!(err, RvError::ErrRequestFieldUnknown(String::new()));
    assert!(test_read_api(&backend, "roles/app", true).is_none());
}

#[test]
fn test_rabbitmq_issue_missing_role() {
    let dir = test_dir("issue_missing_role");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (broker, backend) = new_test_backend_in(&dir);

    assert_eq!(backend.read("creds/ghost").unwrap_err(), RvError::ErrRoleNotFound);
    assert!(broker.usernames().unwrap().is_empty());
}

#[test]
fn test_rabbitmq_issue_and_revoke_twice() {
    let dir = test_dir("issue_and_revoke");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/testrole", true, test_role_data());

    let (username, password, lease_id) = test_issue_api(&backend, "testrole");
    let user = broker.user(&username).unwrap().unwrap();
    assert_eq!(user.password, password);
    assert_eq!(user.permissions["vhost"], ("test".to_string(), "test2".to_string(), "test3".to_string()));
    assert_eq!(
        user.topic_permissions[&("vhost".to_string(), "exchange-one".to_string())],
        ("test2".to_string(), "test3".to_string())
    );

    assert!(test_revoke_api(&backend, &lease_id).is_ok());
    assert!(test_revoke_api(&backend, &lease_id).is_ok());
    assert_eq!(broker.call_count(BrokerCall::DeleteUser).unwrap(), 1);
    assert!(broker.user(&username).unwrap().is_none());
    assert!(test_read_api(&backend, &format!("leases/{lease_id}"), true).is_none());
}

#[test]
fn test_rabbitmq_renew() {
    let dir = test_dir("renew");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (_broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/app", true, None);
    test_write_api(&backend, "config/lease", true, json!({"ttl": "1m", "max_ttl": "10m"}).as_object().cloned());

    let (_username, _password, lease_id) = test_issue_api(&backend, "app");

    let resp = test_renew_api(&backend, &lease_id, json!(300)).unwrap().unwrap();
    assert_eq!(resp.secret.unwrap().max_ttl, Duration::from_secs(600));

    assert_eq!(test_renew_api(&backend, &lease_id, json!("11m")).unwrap_err(), RvError::ErrLeaseTtlExceedsMax);
    assert!(test_renew_api(&backend, &lease_id, json!(0)).is_ok());
}

#[test]
fn test_rabbitmq_sweep_with_broker_outage() {
    let dir = test_dir("sweep_outage");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/app", true, None);

    let (first_user, _, first) = test_issue_api(&backend, "app");
    let (second_user, _, second) = test_issue_api(&backend, "app");

    // both leases are past expiry two hours from now; the first revoke hits an outage
    let later = SystemTime::now() + Duration::from_secs(2 * 60 * 60);
    assert!(broker.fail_user(&first_user, true).is_ok());

    let report = backend.sweep_at(later);
    assert_eq!(report.revoked, vec![second.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, first);
    assert!(report.failed[0].1.is_retryable());
    assert!(broker.user(&second_user).unwrap().is_none());
    assert!(broker.user(&first_user).unwrap().is_some());

    assert!(broker.fail_user(&first_user, false).is_ok());
    let report = backend.sweep_at(later);
    assert!(report.is_clean());
    assert_eq!(report.revoked, vec![first]);
    assert!(broker.usernames().unwrap().is_empty());
}

#[test]
fn test_rabbitmq_issue_rollback() {
    let dir = test_dir("issue_rollback");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/testrole", true, test_role_data());

    for call in [BrokerCall::SetPermissions, BrokerCall::SetTopicPermissions] {
        assert!(broker.fail_call(call, true).is_ok());
        assert!(backend.read("creds/testrole").unwrap_err().is_retryable());
        assert!(broker.fail_call(call, false).is_ok());
    }

    assert!(broker.usernames().unwrap().is_empty());
    assert_eq!(broker.deleted_users().unwrap().len(), 2);
    let resp = backend.list("leases/").unwrap().unwrap();
    assert_eq!(resp.data.unwrap()["keys"], json!([]));
}

#[test]
fn test_rabbitmq_concurrent_issue() {
    let dir = test_dir("concurrent_issue");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/app", true, test_role_data());

    let backend = Arc::new(backend);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || (0..5).map(|_| test_issue_api(&backend, "app")).collect::<Vec<_>>())
        })
        .collect();

    let mut usernames = HashSet::new();
    for handle in handles {
        for (username, _, _) in handle.join().unwrap() {
            assert!(usernames.insert(username));
        }
    }

    assert_eq!(usernames.len(), 20);
    assert_eq!(broker.usernames().unwrap().len(), 20);
    assert_eq!(backend.leases.list_active().unwrap().len(), 20);
}

#[test]
fn test_rabbitmq_delete_role_in_use() {
    let dir = test_dir("delete_role_in_use");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );
    let (_broker, backend) = new_test_backend_in(&dir);
    test_write_api(&backend, "roles/app", true, None);

    let (_, _, lease_id) = test_issue_api(&backend, "app");
    assert_eq!(test_delete_api(&backend, "roles/app").unwrap_err(), RvError::ErrRoleInUse);

    assert!(test_revoke_api(&backend, &lease_id).is_ok());
    assert!(test_delete_api(&backend, "roles/app").is_ok());
}

#[test]
fn test_rabbitmq_leases_survive_restart() {
    let dir = test_dir("restart");
    defer! (
        assert!(fs::remove_dir_all(&dir).is_ok());
    );

    let broker = Arc::new(MockBroker::new());

    let lease_id = {
        let backend = new_test_backend_with(&dir, Arc::clone(&broker));
        test_write_api(&backend, "roles/app", true, None);
        test_issue_api(&backend, "app").2
    };

    let backend = new_test_backend_with(&dir, Arc::clone(&broker));
    let resp = backend.list("leases").unwrap().unwrap();
    assert_eq!(resp.data.unwrap()["keys"], json!([lease_id.clone()]));

    let report = backend.sweep_at(SystemTime::now() + Duration::from_secs(2 * 60 * 60));
    assert_eq!(report.revoked, vec![lease_id]);
    assert!(broker.usernames().unwrap().is_empty());
}
