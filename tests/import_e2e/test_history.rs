//! E2E tests: reconciled upload history and verified deletes.

use actix_web::test;
use chrono::{TimeZone, Utc};

use super::test_helpers::*;
use transport_crm_import::db::UploadRepository;
use transport_crm_import::services::ObjectStore;

#[actix_rt::test]
async fn test_history_reconciles_both_stores() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let orphan_path = format!("{}/uploads/1700000000000_old roster.xlsx", org);
    backends
        .store
        .inner
        .insert_at(
            &orphan_path,
            b"stale".to_vec(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
        .unwrap();

    let (status, body) = list_uploads(&app, &org, "").await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["pagination"]["total"], 2);

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries[0]["kind"], "persisted");
    assert_eq!(entries[0]["exists_in_storage"], true);
    assert_eq!(entries[0]["record"]["id"], staged["upload_id"]);
    assert_eq!(entries[0]["record"]["status"], "ready_for_review");

    let orphans: Vec<_> = entries
        .iter()
        .filter(|e| e["kind"] == "storage_only")
        .collect();
    assert_eq!(orphans.len(), 1, "each orphan appears exactly once");
    assert_eq!(orphans[0]["record"]["status"], "unlinked");
    assert_eq!(orphans[0]["record"]["original_filename"], "old roster.xlsx");
    assert_eq!(orphans[0]["blob"]["path"], orphan_path);
    assert!(orphans[0]["record"]["notes"].as_str().is_some());
}

#[actix_rt::test]
async fn test_missing_blob_is_flagged() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    backends
        .store
        .delete(staged["file_path"].as_str().unwrap())
        .await
        .unwrap();

    let (_, body) = list_uploads(&app, &org, "").await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "persisted");
    assert_eq!(entries[0]["exists_in_storage"], false);
}

#[actix_rt::test]
async fn test_history_paginates_newest_first() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    for i in 0..5 {
        let ts = Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap();
        backends
            .store
            .inner
            .insert_at(
                &format!("{}/uploads/{}_batch{}.csv", org, ts.timestamp_millis(), i),
                b"x".to_vec(),
                ts,
            )
            .unwrap();
    }

    let (status, body) = list_uploads(&app, &org, "page=2&limit=2").await;
    assert_eq!(status, 200);
    assert_eq!(body["pagination"]["total"], 5);
    assert_eq!(body["pagination"]["total_pages"], 3);

    let names: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["record"]["original_filename"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["batch2.csv", "batch1.csv"]);
}

#[actix_rt::test]
async fn test_history_is_cached_until_refresh() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let (_, body) = list_uploads(&app, &org, "").await;
    assert_eq!(body["pagination"]["total"], 0);

    backends
        .store
        .inner
        .insert_at(&format!("{}/uploads/5_late.csv", org), b"x".to_vec(), Utc::now())
        .unwrap();

    let (_, cached) = send(&app, &org, test::TestRequest::get().uri("/api/v1/uploads")).await;
    assert_eq!(cached["pagination"]["total"], 0);

    let (_, fresh) = list_uploads(&app, &org, "").await;
    assert_eq!(fresh["pagination"]["total"], 1);
}

#[actix_rt::test]
async fn test_delete_removes_blob_and_record() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let upload_id = staged["upload_id"].as_str().unwrap();

    // Warm the cache so the delete must invalidate it.
    let (_, before) = send(&app, &org, test::TestRequest::get().uri("/api/v1/uploads")).await;
    assert_eq!(before["pagination"]["total"], 1);

    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/{}", upload_id));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["staging_rows_deleted"], 3);

    let (_, after) = send(&app, &org, test::TestRequest::get().uri("/api/v1/uploads")).await;
    assert_eq!(after["pagination"]["total"], 0, "no orphan of either kind survives");
    assert!(backends.store.inner.is_empty());
    assert!(
        backends
            .repo
            .get_upload(&org, upload_id.parse().unwrap())
            .await
            .unwrap()
            .is_none()
    );

    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/{}", upload_id));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_delete_is_tenant_scoped() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/uploads/{}", staged["upload_id"].as_str().unwrap()));
    let (status, _) = send(&app, &unique_org("intruder"), req).await;

    assert_eq!(status, 404);
    assert_eq!(backends.store.inner.len(), 1);
}

#[actix_rt::test]
async fn test_delete_unlinked_file() {
    let org = unique_org("history");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let orphan = format!("{}/uploads/1700000000000_orphan.csv", org);
    backends
        .store
        .inner
        .insert_at(&orphan, b"x".to_vec(), Utc::now())
        .unwrap();

    // A linked file must be deleted through its upload.
    let req = test::TestRequest::delete().uri(&format!(
        "/api/v1/uploads/unlinked?path={}",
        staged["file_path"].as_str().unwrap()
    ));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 409, "{}", body);

    // Other tenants' prefixes are off limits.
    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/unlinked?path={}", orphan));
    let (status, _) = send(&app, &unique_org("intruder"), req).await;
    assert_eq!(status, 400);

    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/unlinked?path={}", orphan));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 204);
    assert!(!backends.store.exists(&orphan).await.unwrap());

    let (_, body) = list_uploads(&app, &org, "").await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["entries"][0]["kind"], "persisted");
}
