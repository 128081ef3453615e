//! E2E tests: the single-operation guard on sessions.

use std::sync::Arc;

use tokio::sync::Notify;

use super::test_helpers::*;

/// A second confirm while the first is still uploading is rejected
/// without disturbing the first.
#[actix_rt::test]
async fn test_concurrent_confirm_is_rejected() {
    let org = unique_org("concurrency");
    let gate = Arc::new(Notify::new());
    let backends = TestBackends::gated(gate.clone());
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

    let first = confirm(&app, &org, &session_id);
    let second = async {
        // Wait until the first confirm holds the session.
        let mut busy = false;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            let (_, snapshot) = get_session(&app, &org, &session_id).await;
            if snapshot["is_processing"] == true {
                busy = true;
                break;
            }
        }
        assert!(busy, "first confirm never started");

        let rejected = confirm(&app, &org, &session_id).await;

        let cancel = actix_web::test::TestRequest::post()
            .uri(&format!("/api/v1/imports/sessions/{}/cancel", session_id));
        let cancel_rejected = send(&app, &org, cancel).await;

        gate.notify_one();
        (rejected, cancel_rejected)
    };

    let ((first_status, first_body), ((second_status, second_body), (cancel_status, _))) =
        tokio::join!(first, second);

    assert_eq!(second_status, 409);
    assert_eq!(second_body["error"], "OPERATION_IN_PROGRESS");
    assert_eq!(cancel_status, 409);

    assert_eq!(first_status, 200, "{}", first_body);
    assert_eq!(first_body["staged_rows"], 3);
    assert_eq!(backends.store.inner.len(), 1, "exactly one upload was stored");
}
