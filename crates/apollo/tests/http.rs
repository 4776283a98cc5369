//! End-to-end passes over HTTP against a mock config service.

use apollo_sync::{ApolloClient, AppConfig, HttpTransport, SyncEngine, apollo_cached_config};
use std::sync::Arc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

async fn mock_config_service() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .and(query_param("appId", "SampleApp"))
        .and(query_param("cluster", "dev&test"))
        .and(query_param(
            "notifications",
            r#"[{"namespaceName":"application","notificationId":-1},{"namespaceName":"app.yml","notificationId":-1}]"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"namespaceName":"application","notificationId":3},{"namespaceName":"app.yml","notificationId":4}]"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/configs/SampleApp/dev%26test/application"))
        .and(query_param("releaseKey", ""))
        .and(query_param("ip", "10.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"appId":"SampleApp","cluster":"dev&test","namespaceName":"application","releaseKey":"rk-app","configurations":{"timeout":"100"}}"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/configs/SampleApp/dev%26test/app.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"appId":"SampleApp","cluster":"dev&test","namespaceName":"app.yml","releaseKey":"rk-yml","configurations":{"content":"server:\n  port: 8080\n"}}"#,
        ))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_http_pass() {
    let server = mock_config_service().await;
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::new("SampleApp", server.uri())
        .with_cluster("dev&test")
        .with_namespaces("application,app.yml")
        .with_backup_path(dir.path());

    let transport = HttpTransport::new(&config.ip).unwrap();
    let engine = SyncEngine::new(Arc::new(transport)).with_client_ip("10.0.0.1");

    let mut configs = engine.sync(&config).await;
    configs.sort_by(|l, r| l.namespace_name.cmp(&r.namespace_name));

    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].namespace_name, "app.yml");
    assert_eq!(configs[0].get("server.port"), Some("8080"));
    assert_eq!(configs[1].namespace_name, "application");
    assert_eq!(configs[1].get("timeout"), Some("100"));
    assert_eq!(config.notifications().get("app.yml"), Some(4));
}

#[tokio::test]
async fn test_process_wide_instance() {
    let server = mock_config_service().await;
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::new("SampleApp", server.uri())
        .with_cluster("dev&test")
        .with_namespaces("application,app.yml")
        .with_backup_path(dir.path());

    assert_eq!(apollo_cached_config!("app.yml", "server.port", 0u16), 0);

    // Without a client ip override the application fetch does not match the `ip`
    // matcher, so only the yml namespace loads.
    let client = ApolloClient::get_instance(config).await.unwrap();

    assert!(ApolloClient::is_initialized());
    assert_eq!(apollo_cached_config!("app.yml", "server.port", 0u16), 8080);
    assert_eq!(apollo_cached_config!("app.yml", "missing", 7u16), 7);

    client.stop_listening().await.unwrap();
}
