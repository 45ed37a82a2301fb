//! API integration tests for single report operations

mod common;

use axum::body::Body;
use hyper::{Request, StatusCode};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use common::{delete, get, setup, with_json};
use timed::filter::ReportFilter;

#[tokio::test]
async fn test_health_endpoint() {
    let t = setup().await;

    let (status, body) = t
        .send(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_missing_or_unknown_user_is_forbidden() {
    let t = setup().await;

    let (status, _) = t
        .send(
            Request::builder()
                .uri("/reports")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .send(
            Request::builder()
                .uri("/reports")
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_empty_total_time() {
    let t = setup().await;
    let alice = t.user("alice").await;

    let (status, body) = t.send_json(get("/reports", &alice)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["meta"]["total_time"], "00:00:00");
}

#[tokio::test]
async fn test_list_filters() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;
    t.report(&alice).await;
    t.report(&alice).await;
    t.report(&bob).await;

    // empty id list means no id filter
    let (status, body) = t.send_json(get("/reports?id=", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["meta"]["total_time"], "03:00:00");

    let uri = format!("/reports?user={}", bob.id);
    let (_, body) = t.send_json(get(&uri, &alice)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["username"], "bob");

    let (status, _) = t.send_json(get("/reports?date=yesterday", &alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_id_list_without_ids_is_no_filter() {
    let t = setup().await;
    let alice = t.user("alice").await;
    t.report(&alice).await;

    for uri in ["/reports?id=,", "/reports?id=%20,%20"] {
        let (status, body) = t.send_json(get(uri, &alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["meta"]["total_time"], "01:00:00");
    }
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let report = t.report(&alice).await;
    let uri = format!("/reports/{}", report.id);

    let (status, _) = t
        .send_json(with_json("PATCH", &uri, &alice, json!({ "duration": "abc" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send_json(with_json(
            "POST",
            "/reports",
            &alice,
            json!({ "task": "nope", "date": "2017-02-01", "duration": "01:00:00" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send_json(with_json(
            "POST",
            "/reports/bulk?editable=1",
            &alice,
            json!({ "not_billable": "maybe" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_duration_is_bad_request() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let report = t.report(&alice).await;
    let uri = format!("/reports/{}", report.id);

    for duration in ["3000000000000:00:00", "1388888888888:00:00", "24:15:00"] {
        let (status, _) = t
            .send_json(with_json("PATCH", &uri, &alice, json!({ "duration": duration })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = t
        .send_json(with_json(
            "POST",
            "/reports",
            &alice,
            json!({ "task": t.task.id, "date": "2017-02-01", "duration": "3000000000000:00:00" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // the longest allowed report still adds up
    let (status, _) = t
        .send_json(with_json("PATCH", &uri, &alice, json!({ "duration": "24:00:00" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let mut second = t.report(&alice).await;
    second.duration = chrono::Duration::hours(24);
    t.save(&second).await;

    let (status, body) = t.send_json(get("/reports", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total_time"], "48:00:00");
}

#[tokio::test]
async fn test_create_report_rounds_duration() {
    let t = setup().await;
    let alice = t.user("alice").await;

    let (status, body) = t
        .send_json(with_json(
            "POST",
            "/reports",
            &alice,
            json!({
                "task": t.task.id,
                "date": "2017-02-01",
                "duration": "01:08:00",
                "comment": "first"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["duration"], "01:15:00");
    assert_eq!(body["user_id"], alice.id.to_string());
    assert_eq!(body["task_name"], "Development");
}

#[tokio::test]
async fn test_create_report_for_other_user() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;

    let payload = json!({
        "task": t.task.id,
        "date": "2017-02-01",
        "duration": "01:00:00",
        "user": alice.id
    });

    let (status, _) = t
        .send_json(with_json("POST", "/reports", &bob, payload.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.store().add_supervisor(alice.id, bob.id).await.unwrap();
    let (status, body) = t
        .send_json(with_json("POST", "/reports", &bob, payload))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], alice.id.to_string());
}

#[tokio::test]
async fn test_get_unknown_report() {
    let t = setup().await;
    let alice = t.user("alice").await;

    let uri = format!("/reports/{}", Uuid::new_v4());
    let (status, _) = t.send_json(get(&uri, &alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_only_by_owner() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    let admin = t.superuser("admin").await;
    t.store().add_reviewer(t.project.id, rev.id).await.unwrap();
    let report = t.report(&alice).await;
    let uri = format!("/reports/{}", report.id);

    for other in [&rev, &admin] {
        let (status, _) = t.send(delete(&uri, other)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, _) = t.send(delete(&uri, &alice)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.send(get(&uri, &alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reviewer_cannot_change_date() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    t.store().add_reviewer(t.project.id, rev.id).await.unwrap();
    let report = t.report(&alice).await;

    let uri = format!("/reports/{}", report.id);
    let (status, _) = t
        .send_json(with_json("PATCH", &uri, &rev, json!({ "date": "2017-02-04" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send_json(with_json("PATCH", &uri, &rev, json!({ "duration": "02:00:00" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_cannot_change_verified_report() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    let admin = t.superuser("admin").await;
    let mut report = t.report(&alice).await;
    report.verified_by = Some(rev.id);
    t.save(&report).await;

    let uri = format!("/reports/{}", report.id);
    let (status, _) = t
        .send_json(with_json("PATCH", &uri, &alice, json!({ "comment": "late fix" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .send_json(with_json("PATCH", &uri, &admin, json!({ "verified_by": null })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["verified_by"].is_null());
}

#[tokio::test]
async fn test_reviewer_verifies_report() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    t.store().add_reviewer(t.project.id, rev.id).await.unwrap();
    let report = t.report(&alice).await;

    let uri = format!("/reports/{}", report.id);
    let (status, _) = t
        .send_json(with_json(
            "PATCH",
            &uri,
            &rev,
            json!({ "verified_by": alice.id }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .send_json(with_json("PATCH", &uri, &rev, json!({ "verified": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified_by"], rev.id.to_string());
    assert_eq!(body["verified_by_username"], "rev");

    // verification alone is not reported to the owner
    assert!(t.outbox.messages().is_empty());
}

#[tokio::test]
async fn test_review_and_verified_together() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    t.store().add_reviewer(t.project.id, rev.id).await.unwrap();
    let report = t.report(&alice).await;

    let uri = format!("/reports/{}", report.id);
    let (status, _) = t
        .send_json(with_json(
            "PATCH",
            &uri,
            &rev,
            json!({ "verified": true, "review": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reviewer_change_notifies_owner() {
    let t = setup().await;
    let alice = t.user("alice").await;
    let rev = t.user("rev").await;
    t.store().add_reviewer(t.project.id, rev.id).await.unwrap();
    let report = t.report(&alice).await;

    let uri = format!("/reports/{}", report.id);
    let (status, body) = t
        .send_json(with_json(
            "PATCH",
            &uri,
            &rev,
            json!({ "comment": "checked", "not_billable": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comment"], "checked");

    let messages = t.outbox.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, vec!["alice@example.com".to_string()]);
    assert_eq!(messages[0].subject, "[Timed] Your reports have been changed");
    assert!(messages[0].body.contains("rev changed 1 of your reports"));
    assert!(messages[0].body.contains("comment:  -> checked"));
    assert!(messages[0].body.contains("not_billable: false -> true"));
}

#[test]
fn test_filter_parsing_is_shared() {
    let mut params = BTreeMap::new();
    params.insert("editable".to_string(), "1".to_string());
    params.insert("ordering".to_string(), "-date".to_string());

    let filter = tokio_test::assert_ok!(ReportFilter::from_query(&params));
    assert_eq!(filter.editable, Some(true));
    assert_eq!(filter.canonical(), "editable=1");
}
