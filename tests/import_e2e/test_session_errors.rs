//! E2E tests: rejected session transitions and input errors.

use actix_web::test;
use serde_json::json;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_missing_tenant_header_is_unauthorized() {
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/imports/sessions")
        .to_request();
    let (status, body) = into_parts(test::call_service(&app, req).await).await;

    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[actix_rt::test]
async fn test_health_needs_no_tenant() {
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let req = test::TestRequest::get().uri("/api/v1/ready").to_request();
    let (status, body) = into_parts(test::call_service(&app, req).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");
}

#[actix_rt::test]
async fn test_sessions_are_tenant_scoped() {
    let org = unique_org("errors");
    let other = unique_org("intruder");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;

    let session_id = create_session(&app, &org).await;
    let (status, _) = get_session(&app, &other, &session_id).await;
    assert_eq!(status, 404);

    let (status, body) = get_session(&app, &org, "not-a-uuid").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[actix_rt::test]
async fn test_unsupported_file_stays_in_select() {
    let org = unique_org("errors");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = create_session(&app, &org).await;

    let (status, body) =
        select_file(&app, &org, &session_id, "notes.pdf", b"%PDF-1.4", None).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"], "PARSE_ERROR");
    assert!(body["message"].as_str().unwrap().contains(".pdf"));

    let (_, snapshot) = get_session(&app, &org, &session_id).await;
    assert_eq!(snapshot["step"], "select");
    assert!(snapshot["error"].as_str().unwrap().contains("unsupported"));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/imports/sessions/{}/error", session_id));
    let (status, body) = send(&app, &org, req).await;
    assert_eq!(status, 200);
    assert!(body["error"].is_null());
}

#[actix_rt::test]
async fn test_header_only_file_has_no_data() {
    let org = unique_org("errors");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = create_session(&app, &org).await;

    let (status, body) = select_file(
        &app,
        &org,
        &session_id,
        "empty.csv",
        b"Full Name,Email\n",
        None,
    )
    .await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "no data found");
}

#[actix_rt::test]
async fn test_oversized_file_is_rejected() {
    let org = unique_org("errors");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = create_session(&app, &org).await;

    let mut big = String::from("Full Name,Email\n");
    while big.len() <= TEST_MAX_UPLOAD_SIZE {
        big.push_str("Jane Doe,jane@example.com\n");
    }

    let (status, body) =
        select_file(&app, &org, &session_id, "big.csv", big.as_bytes(), None).await;
    assert_eq!(status, 413);
    assert_eq!(body["error"], "PAYLOAD_TOO_LARGE");

    let (_, snapshot) = get_session(&app, &org, &session_id).await;
    assert_eq!(snapshot["step"], "select");
}

#[actix_rt::test]
async fn test_out_of_order_transitions_are_rejected() {
    let org = unique_org("errors");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = create_session(&app, &org).await;

    // Confirm and selection need a previewed file.
    let (status, body) = confirm(&app, &org, &session_id).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "INVALID_STATE");

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/imports/sessions/{}/selection", session_id))
        .set_json(json!({ "source": "trips" }));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 409);

    select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        None,
    )
    .await;

    // One file per session.
    let (status, body) = select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        None,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "INVALID_STATE");

    // No source chosen yet.
    let (status, body) = confirm(&app, &org, &session_id).await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("import source"));

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/imports/sessions/{}/selection", session_id))
        .set_json(json!({ "sheet": "Missing" }));
    let (status, _) = send(&app, &org, req).await;
    assert_eq!(status, 400);

    assert!(backends.store.inner.is_empty());
}

#[actix_rt::test]
async fn test_unknown_source_field_is_rejected() {
    let org = unique_org("errors");
    let backends = TestBackends::new();
    let app = create_test_app(&backends).await;
    let session_id = create_session(&app, &org).await;

    let (status, body) = select_file(
        &app,
        &org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        Some("vehicles"),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("vehicles"));
}
