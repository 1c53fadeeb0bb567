//! End-to-end tests of the chat, attachment and notification endpoints
//! against a scratch SQLite database and upload directory.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use portal_api::auth::{AppStateInner, create_token};
use portal_api::uploads::{MatchRule, UploadSettings};
use portal_db::Database;

const BOUNDARY: &str = "portal-test-boundary";
const SECRET: &str = "test-secret";

struct Harness {
    _dir: TempDir,
    upload_root: std::path::PathBuf,
    app: Router,
    state: Arc<AppStateInner>,
}

struct User {
    id: i64,
    token: String,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_root = dir.path().join("uploads");
        let db = Database::open(&dir.path().join("portal.db")).unwrap();
        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: SECRET.into(),
            uploads: UploadSettings {
                root: upload_root.clone(),
                match_rule: MatchRule::Strict,
            },
        });
        Self {
            _dir: dir,
            upload_root,
            app: portal_api::router(state.clone()),
            state,
        }
    }

    /// Makes every message insert fail inside SQLite.
    fn reject_message_inserts(&self) {
        self.state
            .db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_messages BEFORE INSERT ON messages
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn user(&self, username: &str, role: &str) -> User {
        let id = self
            .state
            .db
            .create_user(username, &username.to_uppercase(), role, "unused")
            .unwrap();
        User {
            id,
            token: create_token(SECRET, id, username, role).unwrap(),
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>, header::HeaderMap) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body, headers)
    }

    async fn chat(&self, who: &User, fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::AUTHORIZATION, format!("Bearer {}", who.token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        let (status, body, _) = self.send(req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get(&self, who: &User, uri: &str) -> (StatusCode, Vec<u8>, header::HeaderMap) {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", who.token))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn post_json(&self, who: &User, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", who.token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body, _) = self.send(req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn unread(&self, who: &User) -> i64 {
        let (status, body) = self.chat(who, &[("action", "get_unread_count")], None).await;
        assert_eq!(status, StatusCode::OK);
        body["count"].as_i64().unwrap()
    }

    async fn messages(&self, who: &User, peer: &User, last_id: i64) -> Vec<Value> {
        let peer_id = peer.id.to_string();
        let last = last_id.to_string();
        let (status, body) = self
            .chat(
                who,
                &[("action", "get_messages"), ("user_id", &peer_id), ("last_message_id", &last)],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["messages"].as_array().unwrap().clone()
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, mime, data)) = file {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}

#[tokio::test]
async fn hello_from_a_to_b() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    let (status, body) = h
        .chat(&a, &[("action", "send_message"), ("receiver_id", &b_id), ("message", "hello")], None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    assert_eq!(h.unread(&b).await, 1);
    assert_eq!(h.unread(&a).await, 0);

    let messages = h.messages(&b, &a, 0).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "hello");
    assert_eq!(messages[0]["sender_id"], a.id);
    assert_eq!(messages[0]["receiver_id"], b.id);

    assert_eq!(h.unread(&b).await, 0);
    assert_eq!(h.unread(&a).await, 0);

    // catching up with the newest id yields nothing new
    let newest = messages[0]["id"].as_i64().unwrap();
    assert!(h.messages(&b, &a, newest).await.is_empty());
}

#[tokio::test]
async fn sender_fetch_does_not_mark_read() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    for body in ["one", "two"] {
        h.chat(&a, &[("action", "send_message"), ("receiver_id", &b_id), ("message", body)], None)
            .await;
    }

    let seen_by_sender = h.messages(&a, &b, 0).await;
    assert_eq!(seen_by_sender.len(), 2);
    assert_eq!(h.unread(&b).await, 2);

    h.messages(&b, &a, 0).await;
    assert_eq!(h.unread(&b).await, 0);
}

#[tokio::test]
async fn send_validation_errors_are_structured() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    let (status, body) = h
        .chat(&a, &[("action", "send_message"), ("receiver_id", "0"), ("message", "hi")], None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "error": "Invalid receiver" }));

    let (status, body) = h
        .chat(&a, &[("action", "send_message"), ("receiver_id", "4242"), ("message", "anyone?")], None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "error": "Invalid receiver" }));

    let (status, body) = h
        .chat(
            &a,
            &[("action", "upload_file"), ("receiver_id", "4242")],
            Some(("minutes.pdf", "application/pdf", b"%PDF-1.4 minutes")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid receiver");
    assert_eq!(count_files(&h.upload_root), 0);

    let (status, body) = h
        .chat(&a, &[("action", "send_message"), ("receiver_id", &b_id), ("message", "   ")], None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message cannot be empty");

    let (status, body) = h.chat(&a, &[("action", "drop_tables")], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid action");

    assert!(h.messages(&b, &a, 0).await.is_empty());
}

#[tokio::test]
async fn storage_failures_are_distinguishable_from_empty_results() {
    let h = Harness::new();
    let a = h.user("alice", "user");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();
    h.reject_message_inserts();

    let (status, body) = h
        .chat(&a, &[("action", "send_message"), ("receiver_id", &b_id), ("message", "anyone?")], None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "success": false, "error": "Database error" }));

    // bob is a plain user with no shared history, so alice sees nobody
    let (status, body) = h.chat(&a, &[("action", "get_contacts")], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "contacts": [] }));
}

#[tokio::test]
async fn oversized_attachment_is_rejected_without_side_effects() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    let twelve_mb = vec![b'%'; 12 * 1024 * 1024];
    let (status, body) = h
        .chat(
            &a,
            &[("action", "upload_file"), ("receiver_id", &b_id)],
            Some(("annual-report.pdf", "application/pdf", &twelve_mb)),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large (max 10MB)");

    assert_eq!(count_files(&h.upload_root), 0);
    assert!(h.messages(&b, &a, 0).await.is_empty());
}

#[tokio::test]
async fn disallowed_attachment_type_is_rejected() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    let (status, body) = h
        .chat(
            &a,
            &[("action", "upload_file"), ("receiver_id", &b_id)],
            Some(("setup.exe", "application/x-msdownload", b"MZ")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed");

    let (_, body) = h
        .chat(&a, &[("action", "upload_file"), ("receiver_id", &b_id)], None)
        .await;
    assert_eq!(body["error"], "No file uploaded");
    assert_eq!(count_files(&h.upload_root), 0);
}

#[tokio::test]
async fn failed_insert_rolls_back_the_written_file() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();
    h.reject_message_inserts();

    let (status, body) = h
        .chat(
            &a,
            &[("action", "upload_file"), ("receiver_id", &b_id)],
            Some(("minutes.pdf", "application/pdf", b"%PDF-1.4 minutes")),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");

    assert_eq!(count_files(&h.upload_root), 0);
}

#[tokio::test]
async fn attachments_are_stored_under_generated_names_and_served_to_parties() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let c = h.user("carol", "user");
    let b_id = b.id.to_string();

    let pdf = b"%PDF-1.4 shift roster".to_vec();
    let (status, _) = h
        .chat(
            &a,
            &[("action", "upload_file"), ("receiver_id", &b_id), ("message", "  roster  ")],
            Some(("Shift Roster.pdf", "application/pdf", &pdf)),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count_files(&h.upload_root.join("chat").join(a.id.to_string())), 1);

    let messages = h.messages(&b, &a, 0).await;
    let stored = messages[0]["file_path"].as_str().unwrap().to_string();
    assert_ne!(stored, "Shift Roster.pdf");
    assert!(stored.ends_with(".pdf"));
    assert_eq!(messages[0]["file_name"], "Shift Roster.pdf");
    assert_eq!(messages[0]["file_type"], "application/pdf");
    assert_eq!(messages[0]["file_size"], pdf.len() as i64);
    assert_eq!(messages[0]["message"], "roster");

    let (status, body, headers) = h.get(&b, &format!("/chat?download=1&file={}", stored)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, pdf);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Shift Roster.pdf\""
    );

    // not a party to the message
    let (status, _, _) = h.get(&c, &format!("/chat?download=1&file={}", stored)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // a PDF requested as an image falls back to the placeholder
    let (status, body, headers) = h.get(&b, &format!("/chat?image=1&file={}", stored)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/svg+xml");
    assert_eq!(body, portal_api::files::PLACEHOLDER_SVG.as_bytes());
}

#[tokio::test]
async fn images_are_served_inline_and_missing_files_fall_back() {
    let h = Harness::new();
    let a = h.user("alice", "admin");
    let b = h.user("bob", "user");
    let b_id = b.id.to_string();

    let png = b"\x89PNG\r\n\x1a\nfake".to_vec();
    h.chat(
        &a,
        &[("action", "upload_file"), ("receiver_id", &b_id)],
        Some(("badge.png", "image/png", &png)),
    )
    .await;
    let stored = h.messages(&b, &a, 0).await[0]["file_path"].as_str().unwrap().to_string();

    let (status, body, headers) = h.get(&b, &format!("/chat?image=1&file={}", stored)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, png);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");

    let (status, _, headers) = h.get(&b, "/chat?image=1&file=1700000000_0000000000000000.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/svg+xml");

    let (status, _, _) = h.get(&b, "/chat?download=1&file=../../portal.db").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contact_visibility_is_asymmetric() {
    let h = Harness::new();
    let admin = h.user("admin", "admin");
    let regular = h.user("regular", "user");
    let other = h.user("other", "user");
    let talker = h.user("talker", "user");
    let regular_id = regular.id.to_string();

    h.chat(
        &talker,
        &[("action", "send_message"), ("receiver_id", &regular_id), ("message", "hey")],
        None,
    )
    .await;

    let (_, body) = h.chat(&regular, &[("action", "get_contacts")], None).await;
    let ids: Vec<i64> = body["contacts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![talker.id, admin.id]);
    assert_eq!(body["contacts"][0]["unread_count"], 1);

    let (_, body) = h.chat(&admin, &[("action", "get_contacts")], None).await;
    let ids: Vec<i64> = body["contacts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&other.id));

    let (_, body) = h
        .chat(&admin, &[("action", "get_contacts"), ("search", "TALK")], None)
        .await;
    assert_eq!(body["contacts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn requests_without_a_token_are_refused() {
    let h = Harness::new();
    let req = Request::builder()
        .uri("/notifications?action=check")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notifications_check_and_dismiss() {
    let h = Harness::new();
    let admin = h.user("admin", "admin");
    let volunteer = h.user("vol", "user");

    let (status, body) = h
        .post_json(
            &volunteer,
            "/notifications?action=create",
            json!({ "category": "announcement", "title": "x", "message": "y" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let mut ids = Vec::new();
    for title in ["Blood drive", "CPR class"] {
        let (status, body) = h
            .post_json(
                &admin,
                "/notifications?action=create",
                json!({ "category": "event", "title": title, "message": "Sign up", "url": "/events" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_i64().unwrap());
    }

    let (status, body, _) = h.get(&volunteer, "/notifications?action=check").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["count"], 2);

    let (status, body) = h
        .post_json(&volunteer, "/notifications?action=mark_read", json!({ "notification_id": ids[0] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    // idempotent
    let (status, _) = h
        .post_json(&volunteer, "/notifications?action=mark_read", json!({ "notification_id": ids[0] }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body, _) = h.get(&volunteer, "/notifications?action=check").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["notifications"][0]["id"], ids[1]);

    let (status, _) = h
        .post_json(&volunteer, "/notifications?action=mark_all_read", json!({ "type": "all" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body, _) = h.get(&volunteer, "/notifications?action=check").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["count"], 0);

    // the admin's own view is unaffected
    let (_, body, _) = h.get(&admin, "/notifications?action=check").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn receipts_use_the_five_megabyte_policy() {
    let h = Harness::new();
    let donor = h.user("donor", "user");

    let req = |body: Vec<u8>| {
        Request::builder()
            .method("POST")
            .uri("/uploads/receipt")
            .header(header::AUTHORIZATION, format!("Bearer {}", donor.token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    };

    let six_mb = vec![0u8; 6 * 1024 * 1024];
    let (status, body, _) = h
        .send(req(multipart_body(&[], Some(("receipt.jpg", "image/jpeg", &six_mb)))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "File too large (max 5MB)");

    let (status, body, _) = h
        .send(req(multipart_body(&[], Some(("receipt.jpg", "image/jpeg", b"jpeg")))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let stored = body["file"].as_str().unwrap();
    assert!(h.upload_root.join("receipts").join(stored).is_file());
}

#[tokio::test]
async fn login_issues_a_usable_token() {
    let h = Harness::new();
    let hash = portal_api::auth::hash_password("correct horse").unwrap();
    h.state.db.create_user("coord", "Coordinator", "staff", &hash).unwrap();

    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": "coord", "password": password }).to_string(),
            ))
            .unwrap()
    };

    let (status, body, _) = h.send(login("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);

    let (status, body, _) = h.send(login("correct horse")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["role"], "staff");

    let coord = User {
        id: body["user_id"].as_i64().unwrap(),
        token: body["token"].as_str().unwrap().to_string(),
    };
    let (status, _, _) = h.get(&coord, "/notifications?action=check").await;
    assert_eq!(status, StatusCode::OK);
}
