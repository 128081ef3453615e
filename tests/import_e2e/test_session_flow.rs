//! E2E tests: the select → preview → staging happy path.

use actix_web::test;
use serde_json::json;

use super::test_helpers::*;
use transport_crm_import::db::UploadRepository;
use transport_crm_import::models::UploadStatus;
use transport_crm_import::services::ObjectStore;

#[actix_rt::test]
async fn test_select_file_returns_preview() {
    let org = unique_org("flow");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let session_id = create_session(&app, &org).await;
    let (status, body) = select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        None,
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["step"], "preview");
    assert_eq!(body["is_processing"], false);
    assert_eq!(body["file"]["filename"], "drivers.csv");
    assert_eq!(body["file"]["mime_type"], "text/csv");
    assert_eq!(body["selected_sheet"], "Sheet1");
    assert!(body["source"].is_null());

    let sheet = &body["sheets"][0];
    assert_eq!(sheet["header_row_index"], 1);
    assert_eq!(sheet["total_rows"], 3);
    assert_eq!(
        sheet["preview_rows"].as_array().unwrap().len(),
        2,
        "preview is capped at the configured row count"
    );
    assert_eq!(sheet["preview_rows"][0]["Full Name"], "Jane Doe");
    assert_eq!(sheet["column_mapping"], json!([]));

    // Choosing a source fills in the column mapping.
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/imports/sessions/{}/selection", session_id))
        .set_json(json!({ "source": "drivers" }));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["source"], "drivers");

    let mapping = body["sheets"][0]["column_mapping"].as_array().unwrap();
    let full_name = mapping
        .iter()
        .find(|b| b["field"] == "full_name")
        .expect("full_name should be bound");
    assert_eq!(full_name["source_column"], "Full Name");
    assert_eq!(full_name["match_kind"], "exact");
}

#[actix_rt::test]
async fn test_confirm_stages_rows_and_hands_off() {
    let org = unique_org("flow");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let session_id = create_session(&app, &org).await;
    let (status, _) = select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        Some("drivers"),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = confirm(&app, &org, &session_id).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["staged_rows"], 3);
    assert_eq!(body["error_rows"], 1);

    let upload_id = body["upload_id"].as_str().unwrap().parse().unwrap();
    let file_path = body["file_path"].as_str().unwrap();
    assert!(file_path.starts_with(&format!("{}/uploads/", org)));
    assert!(file_path.ends_with("_drivers.csv"));

    // Blob and metadata row both exist.
    assert!(backends.store.exists(file_path).await.unwrap());
    let upload = backends
        .repo
        .get_upload(&org, upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upload.status, UploadStatus::ReadyForReview);
    assert_eq!(upload.uploaded_by.as_deref(), Some("dispatcher-1"));
    assert!(upload.processed_at.is_some());

    // Staging rows keep order, raw data and validation results.
    let rows = backends.repo.inner.staging_records(upload_id).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].row_index, 0);
    assert_eq!(rows[0].record_type, "driver");
    assert_eq!(rows[0].mapped["full_name"], "Jane Doe");
    assert_eq!(rows[0].metadata["dob"], "1980-01-02");
    assert_eq!(rows[0].raw_data["DOB"], "01/02/1980");
    assert!(rows[0].validation_errors.is_none());
    assert_eq!(
        rows[2].validation_errors.as_ref().unwrap().missing,
        vec!["full_name".to_string()]
    );

    // The session is discarded after hand-off.
    let (status, _) = get_session(&app, &org, &session_id).await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_cancel_resets_session() {
    let org = unique_org("flow");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let session_id = create_session(&app, &org).await;
    select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        Some("drivers"),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/imports/sessions/{}/cancel", session_id));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["step"], "select");
    assert!(body["file"].is_null());
    assert!(body["source"].is_null());
    assert_eq!(body["sheets"], json!([]));

    // A new file can be selected after cancelling.
    let (status, _) = select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(backends.store.inner.is_empty(), "nothing is stored before confirm");
}

#[actix_rt::test]
async fn test_discarded_session_is_gone() {
    let org = unique_org("flow");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let session_id = create_session(&app, &org).await;
    let req = test::TestRequest::delete().uri(&format!("/api/v1/imports/sessions/{}", session_id));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 204);

    let (status, body) = get_session(&app, &org, &session_id).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}
