mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{unique, TestApp, TestUser};

async fn put_source(app: &TestApp, user: &TestUser, key: Uuid, data: Value) -> Result<Value> {
    let (status, body) = app
        .request(
            Method::PUT,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{ "key": key, "data": data }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    Ok(body["data"]["source"][0].clone())
}

async fn side_rows(app: &TestApp, key: Uuid) -> Result<(i64, i64)> {
    let wms = app.count_rows("spatial_source_wms", "source_key", key).await?;
    let wmts = app.count_rows("spatial_source_wmts", "source_key", key).await?;
    Ok((wms, wmts))
}

async fn source_editor(app: &TestApp) -> Result<TestUser> {
    let user = app.create_user().await?;
    app.grant(&user, "spatial_source", &["view", "create", "update", "delete"]).await?;
    Ok(user)
}

#[tokio::test]
async fn create_writes_side_row_with_defaults() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = source_editor(&app).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{
                "nameInternal": unique("wms"),
                "type": "wms",
                "url": "https://example.org/wms",
                "layers": "roads",
                // Belongs to raster; silently dropped for a wms source.
                "bandCount": 3,
            }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let record = &body["data"]["source"][0];
    let key = Uuid::parse_str(record["key"].as_str().unwrap_or_default())?;
    assert_eq!(record["data"]["type"], "wms");
    assert_eq!(record["data"]["url"], "https://example.org/wms");
    assert_eq!(record["data"]["format"], "image/png");
    assert_eq!(record["data"]["version"], "1.3.0");
    assert!(record["data"].get("bandCount").is_none());
    assert_eq!(side_rows(&app, key).await?, (1, 0));
    assert_eq!(app.count_rows("spatial_source_rasters", "source_key", key).await?, 0);
    Ok(())
}

#[tokio::test]
async fn switching_type_moves_the_side_row() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = source_editor(&app).await?;
    let key = Uuid::new_v4();

    // PUT with an unknown key creates.
    put_source(
        &app,
        &user,
        key,
        json!({ "nameInternal": unique("switch"), "type": "wms", "url": "https://example.org/wms" }),
    )
    .await?;
    assert_eq!(side_rows(&app, key).await?, (1, 0));

    let record = put_source(
        &app,
        &user,
        key,
        json!({ "type": "wmts", "url": "https://example.org/wmts", "layer": "base" }),
    )
    .await?;
    assert_eq!(side_rows(&app, key).await?, (0, 1));
    assert_eq!(record["data"]["type"], "wmts");
    assert_eq!(record["data"]["url"], "https://example.org/wmts");
    assert_eq!(record["data"]["layer"], "base");
    assert!(record["data"].get("version").is_none());

    // Same type: only supplied side columns change.
    let record = put_source(&app, &user, key, json!({ "layer": "satellite" })).await?;
    assert_eq!(side_rows(&app, key).await?, (0, 1));
    assert_eq!(record["data"]["url"], "https://example.org/wmts");
    assert_eq!(record["data"]["layer"], "satellite");

    let record = put_source(&app, &user, key, json!({ "type": null })).await?;
    assert_eq!(side_rows(&app, key).await?, (0, 0));
    assert_eq!(record["data"]["type"], Value::Null);
    assert!(record["data"].get("url").is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_variant_is_a_validation_error() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = source_editor(&app).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{ "nameInternal": unique("bad"), "type": "tiles" }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(body["fieldErrors"]["source[0].type"].is_string(), "{}", body);
    Ok(())
}

#[tokio::test]
async fn delete_removes_side_rows() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = source_editor(&app).await?;
    let key = Uuid::new_v4();

    put_source(
        &app,
        &user,
        key,
        json!({ "nameInternal": unique("gone"), "type": "wmts", "url": "https://example.org/wmts" }),
    )
    .await?;
    assert_eq!(side_rows(&app, key).await?, (0, 1));

    let (status, _) = app
        .request(
            Method::DELETE,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{ "key": key }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.count_rows("spatial_sources", "key", key).await?, 0);
    assert_eq!(side_rows(&app, key).await?, (0, 0));
    Ok(())
}

#[tokio::test]
async fn missing_side_fields_are_validation_errors() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };
    let user = source_editor(&app).await?;

    let (status, body) = app
        .request(
            Method::POST,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{ "nameInternal": unique("no-url"), "type": "wms" }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["fieldErrors"]["source[0].url"], "This field is required");
    assert!(!body.to_string().contains("spatial_source_wms"), "{}", body);

    let key = Uuid::new_v4();
    put_source(
        &app,
        &user,
        key,
        json!({ "nameInternal": unique("keeps-wms"), "type": "wms", "url": "https://example.org/wms" }),
    )
    .await?;

    let (status, body) = app
        .request(
            Method::PUT,
            "/rest/spatial",
            Some(&user.token),
            Some(json!({ "data": { "source": [{ "key": key, "data": { "type": "wmts" } }] } })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["fieldErrors"]["source[0].url"], "This field is required");
    assert_eq!(side_rows(&app, key).await?, (1, 0));
    Ok(())
}
