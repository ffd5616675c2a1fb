mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{TEST_API_KEY, setup_test_app};

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn extract_request(body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/v1/extract").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_reports_pool_stats() {
    let app = setup_test_app(Some(TEST_API_KEY));

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["pool"]["max_size"], 3);
    assert_eq!(json["pool"]["live"], 0);
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app(Some(TEST_API_KEY));

    let response = app
        .router
        .oneshot(extract_request(serde_json::json!({"url": "https://a.test/"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
    assert_eq!(app.primary.call_count(), 0);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app(Some(TEST_API_KEY));

    let response = app
        .router
        .oneshot(
            Request::get("/v1/metrics")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn extract_falls_through_tiers() {
    let app = setup_test_app(Some(TEST_API_KEY));

    let response = app
        .router
        .oneshot(extract_request(
            serde_json::json!({"url": "https://news.test/a", "urls": ["https://news.test/b"]}),
            Some(TEST_API_KEY),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["succeeded"], 2);
    assert_eq!(json["failed"], 0);

    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["url"], "https://news.test/a");
    assert_eq!(results[1]["url"], "https://news.test/b");
    for result in results {
        assert_eq!(result["method"], "readability");
        assert_eq!(result["tier_errors"][0]["method"], "chromium-render");
        assert_eq!(result["tier_errors"][0]["error"]["code"], "NAVIGATION_TIMEOUT");
    }
    assert_eq!(app.primary.call_count(), 2);
    assert_eq!(app.article.call_count(), 2);
}

#[tokio::test]
async fn extract_without_api_key_is_open() {
    let app = setup_test_app(None);

    let response = app
        .router
        .oneshot(extract_request(serde_json::json!({"url": "https://a.test/"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn extract_rejects_bad_input() {
    let cases = [
        (serde_json::json!({}), StatusCode::BAD_REQUEST, "validation_error"),
        (
            serde_json::json!({"url": "ftp://files.test/x"}),
            StatusCode::BAD_REQUEST,
            "validation_error",
        ),
        (
            serde_json::json!({"urls": ["https://a.test/1", "https://a.test/2",
                                        "https://a.test/3", "https://a.test/4"]}),
            StatusCode::PAYLOAD_TOO_LARGE,
            "too_many_urls",
        ),
    ];

    for (body, status, error) in cases {
        let app = setup_test_app(Some(TEST_API_KEY));
        let response = app
            .router
            .oneshot(extract_request(body, Some(TEST_API_KEY)))
            .await
            .unwrap();

        assert_eq!(response.status(), status);
        assert_eq!(json_body(response).await["error"], error);
        assert_eq!(app.primary.call_count(), 0);
    }
}

#[tokio::test]
async fn metrics_and_recommendation_follow_extractions() {
    let app = setup_test_app(Some(TEST_API_KEY));
    let router = app.router;

    let response = router
        .clone()
        .oneshot(extract_request(
            serde_json::json!({"url": "https://news.test/a"}),
            Some(TEST_API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(
            Request::get("/v1/metrics")
                .header("authorization", format!("Bearer {TEST_API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let metrics = json_body(response).await;
    assert_eq!(metrics["total_requests"], 2);
    assert_eq!(metrics["success_count"], 1);
    assert_eq!(metrics["failure_count"], 1);

    let response = router
        .oneshot(
            Request::get("/v1/metrics/recommendation?domain=NEWS.test")
                .header("authorization", format!("Bearer {TEST_API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["domain"], "news.test");
    assert_eq!(json["strategy"], "readability");
}
