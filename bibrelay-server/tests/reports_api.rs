use anyhow::Result;
use axum_test::TestServer;
use serde_json::Value;

#[path = "support/mod.rs"]
mod support;
use support::{build_test_app, message_body};

async fn seeded_server() -> Result<(TestServer, support::TestApp)> {
    let app = build_test_app();
    let server = TestServer::new(app.router.clone())
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    server
        .post("/WinlinkMessage")
        .json(&message_body(
            "AAAAAAAAAAAA",
            &[
                (115, "OUT", "1723", 19, "WR", false),
                (42, "IN", "1730", 19, "WR", false),
            ],
        ))
        .await
        .assert_status_ok();
    server
        .post("/WinlinkMessage")
        .json(&message_body(
            "BBBBBBBBBBBB",
            &[
                (115, "IN", "1801", 19, "FH", false),
                (7, "DROP", "1805", 19, "FH", true),
            ],
        ))
        .await
        .assert_status_ok();
    Ok((server, app))
}

#[tokio::test]
async fn aid_station_report_filters_by_location() -> Result<()> {
    let (server, _app) = seeded_server().await?;
    let rows: Vec<Value> = server.get("/Report/AidStation/FH").await.json();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["Location"] == "FH"));
    Ok(())
}

#[tokio::test]
async fn bib_report_tracks_one_runner() -> Result<()> {
    let (server, _app) = seeded_server().await?;
    let rows: Vec<Value> = server.get("/Report/Bib/115").await.json();
    let actions: Vec<_> = rows.iter().map(|row| row["Action"].clone()).collect();
    assert_eq!(actions, ["OUT", "IN"]);
    Ok(())
}

#[tokio::test]
async fn dropped_and_all_reports() -> Result<()> {
    let (server, _app) = seeded_server().await?;
    let dropped: Vec<Value> = server.get("/Report/Dropped").await.json();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["BibNumber"], 7);

    let all: Vec<Value> = server.get("/Report/All").await.json();
    assert_eq!(all.len(), 4);
    Ok(())
}

#[tokio::test]
async fn statistics_summarize_the_store() -> Result<()> {
    let (server, _app) = seeded_server().await?;
    let stats: Value = server.get("/Statistics").await.json();
    assert_eq!(stats["messages"], 2);
    assert_eq!(stats["records"], 4);
    assert_eq!(stats["warnings"], 1);
    assert_eq!(stats["distinct_bibs"], 3);
    assert_eq!(stats["per_location"]["WR"], 2);
    Ok(())
}

#[tokio::test]
async fn service_info_reports_backend_and_size() -> Result<()> {
    let (server, _app) = seeded_server().await?;
    let info: Value = server.get("/ServiceInfo").await.json();
    assert_eq!(info["name"], "bibrelay-server");
    assert_eq!(info["backend"], "memory");
    assert_eq!(info["messages"], 2);
    assert_eq!(info["persisted"], 2);
    Ok(())
}
