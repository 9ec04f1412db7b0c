mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};

#[tokio::test]
async fn health_reports_database() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };

    let (status, body) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn root_lists_plan_groups() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };

    let (status, body) = app.request(Method::GET, "/", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    let groups: Vec<&str> = body["data"]["groups"]
        .as_array()
        .expect("groups array")
        .iter()
        .filter_map(|g| g.as_str())
        .collect();
    assert!(groups.contains(&"spatial"), "{}", body);
    Ok(())
}

#[tokio::test]
async fn plan_describes_variants() -> Result<()> {
    let Some(app) = common::setup().await? else { return Ok(()) };

    let (status, body) = app.request(Method::GET, "/rest/spatial/plan", None, None).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);

    let (status, body) = app.request(Method::GET, "/rest/nope/plan", None, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    Ok(())
}
