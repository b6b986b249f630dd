use serde_json::json;
use tuya_ir_ac::{CloudGateway, Error, Gateway, Region};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LEARNING_CODES: &str = "/v2.0/infrareds/ir-1/remotes/remote-1/learning-codes";

fn gateway(server: &MockServer) -> CloudGateway {
    CloudGateway::builder(Region::CentralEurope, "client-id", "secret", "ir-1", "remote-1")
        .base_url(server.uri())
        .build()
        .unwrap()
}

fn token_mock(expire_time: u64) -> Mock {
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .and(query_param("grant_type", "1"))
        .and(header("client_id", "client-id"))
        .and(header("sign_method", "HMAC-SHA256"))
        .and(header_exists("sign"))
        .and(header_exists("t"))
        .and(header_exists("nonce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "access_token": "tok-1", "expire_time": expire_time, "uid": "u" }
        })))
}

#[tokio::test]
async fn setup_fetches_token_and_send_posts_learning_code() {
    let server = MockServer::start().await;
    token_mock(7200).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(LEARNING_CODES))
        .and(header("access_token", "tok-1"))
        .and(header_exists("sign"))
        .and(body_json(json!({ "code": "CODE-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = gateway(&server);
    gateway.setup().await.expect("setup should succeed");
    gateway.send("CODE-1").await.expect("send should succeed");
}

#[tokio::test]
async fn expired_token_is_refreshed_before_send() {
    let server = MockServer::start().await;
    token_mock(0).expect(2).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(LEARNING_CODES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = gateway(&server);
    gateway.setup().await.unwrap();
    gateway.send("CODE-1").await.unwrap();
}

#[tokio::test]
async fn rejected_token_request_fails_setup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 1004,
            "msg": "sign invalid"
        })))
        .mount(&server)
        .await;

    let mut gateway = gateway(&server);
    let err = gateway.setup().await.unwrap_err();
    assert!(
        matches!(&err, Error::Setup(msg) if msg.contains("1004")),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn send_before_setup_is_not_set_up() {
    let server = MockServer::start().await;
    let mut gateway = gateway(&server);
    let err = gateway.send("CODE-1").await.unwrap_err();
    assert!(matches!(err, Error::NotSetUp));
}

#[tokio::test]
async fn rejected_command_is_a_transmission_error() {
    let server = MockServer::start().await;
    token_mock(7200).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(LEARNING_CODES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 2008,
            "msg": "command or value not support"
        })))
        .mount(&server)
        .await;

    let mut gateway = gateway(&server);
    gateway.setup().await.unwrap();
    let err = gateway.send("CODE-9").await.unwrap_err();
    match err {
        Error::Transmission {
            command_id, reason, ..
        } => {
            assert_eq!(command_id, "CODE-9");
            assert!(reason.contains("2008"), "reason was {reason}");
        }
        other => panic!("expected transmission error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_a_transmission_error() {
    let server = MockServer::start().await;
    token_mock(7200).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(LEARNING_CODES))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut gateway = gateway(&server);
    gateway.setup().await.unwrap();
    let err = gateway.send("CODE-1").await.unwrap_err();
    assert!(matches!(err, Error::Transmission { .. }));
}
