use bizops_client::http_client::ReqwestBizClient;
use bizops_insights::services::fetch_with_fallback;
use bizops_insights::DateRange;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn empty_snake_case_result_retries_with_camel_case() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reports/run"))
        .and(body_partial_json(json!({
            "source": "sales",
            "groupBy": ["product.id", "product.sku", "product.name"],
            "metrics": ["sum_qty", "sum_total"],
            "from": "2025-01-01",
            "to": "2025-01-31"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"columns": [], "rows": []})))
        .expect(1)
        .mount(&server)
        .await;

    let camel = json!({
        "columns": ["productId", "productSku", "productName", "sumQty", "sumTotal"],
        "rows": [[1, "A", "Apple", 3, 15]]
    });
    Mock::given(method("POST"))
        .and(path("/reports/run"))
        .and(body_partial_json(json!({
            "groupBy": ["productId", "productSku", "productName"],
            "metrics": ["sumQty", "sumTotal"],
            "from": "2025-01-01",
            "to": "2025-01-31"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&camel))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestBizClient::new(&server.uri(), None);
    let range = DateRange::new(Some("2025-01-01".into()), Some("2025-01-31".into()));
    let table = fetch_with_fallback(&client, &range, None).await.expect("fetch");

    assert_eq!(table.columns, vec!["productId", "productSku", "productName", "sumQty", "sumTotal"]);
    assert_eq!(table.rows, vec![json!([1, "A", "Apple", 3, 15])]);
}

#[tokio::test]
async fn non_empty_snake_case_result_is_used_directly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports/run"))
        .and(body_partial_json(json!({"groupBy": ["product.id", "product.sku", "product.name"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["product.id", "sum_qty"],
            "rows": [[1, 2]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestBizClient::new(&server.uri(), None);
    let table = fetch_with_fallback(&client, &DateRange::default(), Some(50))
        .await
        .expect("fetch");
    assert_eq!(table.len(), 1);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["limit"], json!(50));
    assert!(body.get("from").is_none());
}

#[tokio::test]
async fn both_attempts_empty_returns_empty_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
        .expect(2)
        .mount(&server)
        .await;

    let client = ReqwestBizClient::new(&server.uri(), None);
    let table = fetch_with_fallback(&client, &DateRange::default(), None)
        .await
        .expect("fetch");
    assert!(table.is_empty());
}

#[tokio::test]
async fn upstream_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports/run"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = ReqwestBizClient::new(&server.uri(), None);
    let err = fetch_with_fallback(&client, &DateRange::default(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("502"), "{err}");
}
