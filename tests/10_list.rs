mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{unique, TestApp, TestUser};

async fn create_source_types(app: &TestApp, user: &TestUser, names: &[&str]) -> Result<Vec<Value>> {
    let records: Vec<Value> = names.iter().map(|n| json!({ "nameInternal": n })).collect();
    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "sourceType": records } })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    Ok(body["data"]["sourceType"].as_array().cloned().unwrap_or_default())
}

#[tokio::test]
async fn filter_eq_returns_single_match_with_default_paging() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source_type", &["view", "create"]).await?;

    let raster = format!("raster type {}", unique("t"));
    let vector = format!("vector type {}", unique("t"));
    create_source_types(&app, &user, &[raster.as_str(), vector.as_str()]).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial/filtered/sourceType",
            Some(&user.token),
            Some(json!({ "filter": { "nameInternal": { "eq": raster } } })),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["offset"], 0);
    let records = body["data"]["sourceType"].as_array().expect("sourceType array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["data"]["nameInternal"], raster.as_str());
    Ok(())
}

#[tokio::test]
async fn empty_body_lists_with_defaults() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source_type", &["view"]).await?;

    let (status, body) = app
        .request(Method::POST, "/rest/spatial/filtered/sourceType", Some(&user.token), None)
        .await?;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["offset"], 0);
    assert!(body["data"]["sourceType"].is_array());
    Ok(())
}

#[tokio::test]
async fn like_filter_orders_and_pages() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source_type", &["view", "create"]).await?;

    let prefix = unique("paged");
    let names: Vec<String> = ["a", "b", "c"].iter().map(|s| format!("{}-{}", prefix, s)).collect();
    create_source_types(&app, &user, &names.iter().map(String::as_str).collect::<Vec<_>>()).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial/filtered/sourceType",
            Some(&user.token),
            Some(json!({
                "filter": { "nameInternal": { "like": format!("{}%", prefix) } },
                "order": [["nameInternal", "descending"]],
                "limit": 2,
                "offset": 1,
            })),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["offset"], 1);
    let got: Vec<&str> = body["data"]["sourceType"]
        .as_array()
        .expect("sourceType array")
        .iter()
        .filter_map(|r| r["data"]["nameInternal"].as_str())
        .collect();
    assert_eq!(got, vec![names[1].as_str(), names[0].as_str()]);
    Ok(())
}

#[tokio::test]
async fn multi_type_total_is_largest_type_count() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source_type", &["view", "create"]).await?;
    app.grant(&user, "spatial_source", &["view", "create"]).await?;

    let name = unique("shared");
    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": {
                "sourceType": [{ "nameInternal": name }],
                "source": [{ "nameInternal": name }, { "nameInternal": name }],
            }})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial/filtered/source,sourceType",
            Some(&user.token),
            Some(json!({ "filter": { "nameInternal": { "eq": name } } })),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 2);
    assert_eq!(body["data"]["source"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"]["sourceType"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn guest_without_grants_sees_nothing() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source_type", &["view", "create"]).await?;
    let name = unique("hidden");
    create_source_types(&app, &user, &[name.as_str()]).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial/filtered/sourceType",
            None,
            Some(json!({ "filter": { "nameInternal": { "eq": name } } })),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 0);
    assert_eq!(body["data"]["sourceType"], json!([]));
    Ok(())
}

#[tokio::test]
async fn unknown_type_and_column_are_rejected() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };

    let (status, body) = app
        .request(Method::POST, "/rest/spatial/filtered/nope", None, None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["success"], false);

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial/filtered/sourceType",
            None,
            Some(json!({ "filter": { "notAColumn": { "eq": 1 } } })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    Ok(())
}

#[tokio::test]
async fn in_and_notin_match_real_rows() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source", &["view", "create"]).await?;

    let name = unique("membership");
    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [
                { "nameInternal": name, "nameExternal": "alpha" },
                { "nameInternal": name, "nameExternal": "beta" },
                { "nameInternal": name, "nameExternal": null },
            ] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let externals = |body: &Value| -> Vec<Value> {
        let mut names: Vec<Value> = body["data"]["source"]
            .as_array()
            .map(|records| records.iter().map(|r| r["data"]["nameExternal"].clone()).collect())
            .unwrap_or_default();
        names.sort_by_key(|v| v.to_string());
        names
    };

    let cases = [
        (json!({ "in": ["alpha"] }), vec![json!("alpha")]),
        (json!({ "in": ["alpha", null] }), vec![json!("alpha")]),
        (json!({ "in": [] }), vec![]),
        // A NULL column is not in any list.
        (json!({ "notin": ["alpha"] }), vec![json!("beta"), Value::Null]),
        (json!({ "notin": [] }), vec![json!("alpha"), json!("beta"), Value::Null]),
    ];
    for (operator, expected) in cases {
        let (status, body) = app
            .request(
                Method::POST,
                "/rest/spatial/filtered/source",
                Some(&user.token),
                Some(json!({ "filter": { "nameInternal": name, "nameExternal": operator } })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let mut expected = expected;
        expected.sort_by_key(|v| v.to_string());
        assert_eq!(externals(&body), expected, "filter {}", operator);
        assert_eq!(body["total"], expected.len());
    }
    Ok(())
}

#[tokio::test]
async fn mistyped_filter_values_are_bad_requests() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };

    let cases = [
        ("/rest/spatial/filtered/source", json!({ "sourceTypeKey": "not-a-uuid" })),
        ("/rest/user/filtered/user", json!({ "isActive": "maybe" })),
        ("/rest/user/filtered/user", json!({ "isActive": { "in": ["maybe"] } })),
        ("/rest/user/filtered/user", json!({ "createdAt": { "eq": 5 } })),
    ];
    for (uri, filter) in cases {
        let (status, body) = app
            .request(Method::POST, uri, None, Some(json!({ "filter": filter })))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}: {}", uri, filter, body);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
    Ok(())
}
