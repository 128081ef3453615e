//! E2E tests: failed stage phases are compensated and failed deletes are
//! reported.

use actix_web::test;

use super::test_helpers::*;
use transport_crm_import::db::UploadRepository;
use transport_crm_import::models::UploadStatus;

async fn previewed_session<S>(app: &S, org: &str) -> String
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let session_id = create_session(app, org).await;
    let (status, body) = select_file(
        app,
        org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        Some("drivers"),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    session_id
}

#[actix_rt::test]
async fn test_failed_staging_insert_rolls_back() {
    let org = unique_org("failures");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = previewed_session(&app, &org).await;

    backends.repo.fail(RepoOp::InsertStaging);
    let (status, body) = confirm(&app, &org, &session_id).await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "PERSISTENCE_ERROR");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("staging insert failed"), "{}", message);
    assert!(message.contains("all changes were rolled back"), "{}", message);

    // Nothing is left behind in either store.
    assert!(backends.store.inner.is_empty());
    assert!(
        backends
            .repo
            .list_recent_uploads(&org, 10)
            .await
            .unwrap()
            .is_empty()
    );

    // The session stays in preview with the error visible.
    let (_, snapshot) = get_session(&app, &org, &session_id).await;
    assert_eq!(snapshot["step"], "preview");
    assert_eq!(snapshot["is_processing"], false);
    assert!(snapshot["error"].as_str().unwrap().contains("staging insert"));

    // Retrying after the fault clears succeeds.
    backends.repo.heal();
    let (status, body) = confirm(&app, &org, &session_id).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["staged_rows"], 3);
}

#[actix_rt::test]
async fn test_failed_status_update_rolls_back() {
    let org = unique_org("failures");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = previewed_session(&app, &org).await;

    backends.repo.fail(RepoOp::UpdateStatus);
    let (status, body) = confirm(&app, &org, &session_id).await;

    assert_eq!(status, 500);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("status update failed")
    );
    assert!(backends.store.inner.is_empty());

    let (_, history) = list_uploads(&app, &org, "").await;
    assert_eq!(history["pagination"]["total"], 0);
}

#[actix_rt::test]
async fn test_incomplete_rollback_is_reported() {
    let org = unique_org("failures");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = previewed_session(&app, &org).await;

    backends.repo.fail(RepoOp::InsertStaging);
    backends.repo.fail(RepoOp::DeleteUpload);
    let (status, body) = confirm(&app, &org, &session_id).await;

    assert_eq!(status, 500);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("rollback incomplete"), "{}", message);
    assert!(message.contains("marked error"), "{}", message);

    // The leftover row is visible in history as an error without a file.
    let (_, history) = list_uploads(&app, &org, "").await;
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "persisted");
    assert_eq!(entries[0]["record"]["status"], "error");
    assert_eq!(entries[0]["exists_in_storage"], false);
    assert!(
        entries[0]["record"]["notes"]
            .as_str()
            .unwrap()
            .contains("staging insert")
    );
}

#[actix_rt::test]
async fn test_failed_record_delete_is_reported() {
    let org = unique_org("failures");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let upload_id = staged["upload_id"].as_str().unwrap();

    backends.repo.fail(RepoOp::DeleteUpload);
    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/{}", upload_id));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 500);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("upload record delete failed")
    );

    // The file went first, so the row now reports it missing.
    let (_, history) = list_uploads(&app, &org, "").await;
    assert_eq!(history["entries"][0]["exists_in_storage"], false);

    // A retry finishes the job even though the file is already gone.
    backends.repo.heal();
    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/{}", upload_id));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 200);

    let (_, history) = list_uploads(&app, &org, "").await;
    assert_eq!(history["pagination"]["total"], 0);
}

#[actix_rt::test]
async fn test_delete_verification_catches_survivors() {
    let org = unique_org("failures");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let staged = stage_roster(&app, &org).await;
    let upload_id = staged["upload_id"].as_str().unwrap();

    backends.repo.drop_deletes_silently();
    let req = test::TestRequest::delete().uri(&format!("/api/v1/uploads/{}", upload_id));
    let (status, body) = send(&app, &org, req).await;

    assert_eq!(status, 500);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("delete verification failed"), "{}", message);
    assert!(message.contains(upload_id), "{}", message);

    let survivor = backends
        .repo
        .get_upload(&org, upload_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(survivor.status, UploadStatus::ReadyForReview);
}
