use permsweep::graph::users::{lookup_names, LookupStatus, PersonName};
use permsweep::graph::{GraphClient, RetryPolicy};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user(upn: &str, display: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("id-{}", upn),
        "displayName": display,
        "userPrincipalName": upn,
        "mail": upn
    })
}

#[tokio::test]
async fn test_lookup_classifies_each_name() {
    let server = MockServer::start().await;
    let client = GraphClient::new(reqwest::Client::new(), "graph-token".into())
        .with_base_url(&format!("{}/v1.0", server.uri()))
        .with_retry_policy(RetryPolicy {
            max_retries: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        });

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "givenName eq 'Sean' and surname eq 'O''Brien'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [user("sean.obrien@contoso.com", "Sean O'Brien")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "givenName eq 'Paul' and surname eq 'Gray'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                user("paul.gray@contoso.com", "Paul Gray"),
                user("paul.gray2@contoso.com", "Paul Gray (Contractor)")
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "givenName eq 'Robin' and surname eq 'LeClerc'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "givenName eq 'Broken' and surname eq 'Request'"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": "BadRequest", "message": "Invalid filter clause" }
        })))
        .mount(&server)
        .await;

    let names = vec![
        PersonName::new("Sean", "O'Brien"),
        PersonName::new("Paul", "Gray"),
        PersonName::new("Robin", "LeClerc"),
        PersonName::new("Broken", "Request"),
    ];
    let results = lookup_names(&client, &names).await;

    let statuses: Vec<LookupStatus> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            LookupStatus::Found,
            LookupStatus::Multiple,
            LookupStatus::NotFound,
            LookupStatus::NotFound
        ]
    );
    assert_eq!(
        results[0].users[0].user_principal_name.as_deref(),
        Some("sean.obrien@contoso.com")
    );
    assert!(results[2].error.is_none());
    assert!(results[3].error.as_deref().unwrap().contains("Invalid filter clause"));
}
