//! End-to-end REST tests against a live in-memory gateway.

#![allow(clippy::panic, clippy::indexing_slicing)]

mod common;

use arena_gateway::service::HmacPaymentVerifier;
use common::TestServer;
use reqwest::Method;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::start().await;
    let (status, body) = server.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn auth_is_enforced() {
    let server = TestServer::start().await;
    let (status, body) = server.send(Method::GET, "/api/v1/wallet", None, None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], 5001);

    let (status, _) = server
        .send(Method::GET, "/api/v1/wallet", Some("garbage"), None)
        .await;
    assert_eq!(status, 401);

    let (_, token) = server.player("ace", 0).await;
    let (status, body) = server
        .send(Method::GET, "/api/v1/admin/accounts", Some(&token), None)
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], 5002);
}

#[tokio::test]
async fn join_charges_once_and_refuses_the_rest() {
    let server = TestServer::start().await;
    let match_id = server.open_match(20, 2).await;
    let join = format!("/api/v1/matches/{match_id}/join");

    let (_, rich) = server.player("rich", 30).await;
    let (_, poor) = server.player("poor", 5).await;
    let (_, late) = server.player("late", 100).await;
    let (_, last) = server.player("last", 100).await;

    let (status, body) = server
        .send(Method::POST, &join, Some(&rich), Some(json!({ "display_name": "R1CH" })))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["balance"], 10);
    assert_eq!(body["participant_count"], 1);

    let (status, body) = server.send(Method::POST, &join, Some(&rich), None).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], 4003);

    let (status, body) = server.send(Method::POST, &join, Some(&poor), None).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], 4001);
    assert_eq!(server.balance(&poor).await, 5);

    let (status, _) = server.send(Method::POST, &join, Some(&late), None).await;
    assert_eq!(status, 200);
    let (status, body) = server.send(Method::POST, &join, Some(&last), None).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], 4002);
    assert_eq!(server.balance(&last).await, 100);

    let (status, body) = server
        .send(Method::GET, &format!("/api/v1/matches/{match_id}"), None, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["participant_count"], 2);
    assert_eq!(body["participants"][0]["display_name"], "R1CH");
    assert_eq!(body["room"]["room_id"], "Hidden");

    let (status, body) = server
        .send(Method::GET, "/api/v1/matches/my", Some(&rich), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn cancelling_refunds_every_participant_once() {
    let server = TestServer::start().await;
    let match_id = server.open_match(15, 4).await;
    let join = format!("/api/v1/matches/{match_id}/join");
    let mut tokens = Vec::new();
    for name in ["a", "b", "c"] {
        let (_, token) = server.player(name, 15).await;
        let (status, _) = server.send(Method::POST, &join, Some(&token), None).await;
        assert_eq!(status, 200);
        tokens.push(token);
    }

    let status_path = format!("/api/v1/admin/matches/{match_id}/status");
    for _ in 0..2 {
        let (status, body) = server
            .send(
                Method::PUT,
                &status_path,
                Some(&server.admin_token),
                Some(json!({ "status": "cancelled" })),
            )
            .await;
        assert_eq!(status, 200, "{body}");
        assert_eq!(body["status"], "cancelled");
    }
    for token in &tokens {
        assert_eq!(server.balance(token).await, 15);
    }

    let (status, body) = server
        .send(Method::GET, "/api/v1/wallet/transactions", Some(&tokens[0]), None)
        .await;
    assert_eq!(status, 200);
    let Some(entries) = body["data"].as_array() else {
        panic!("history missing: {body}");
    };
    let refunds = entries.iter().filter(|e| e["kind"] == "refund").count();
    assert_eq!(refunds, 1);

    let (status, body) = server.send(Method::POST, &join, Some(&tokens[0]), None).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], 4004);
}

#[tokio::test]
async fn lifecycle_rules_are_enforced() {
    let server = TestServer::start().await;
    let match_id = server.open_match(10, 4).await;
    let status_path = format!("/api/v1/admin/matches/{match_id}/status");
    let admin = Some(server.admin_token.as_str());

    let (status, _) = server
        .send(Method::PUT, &status_path, admin, Some(json!({ "status": "live" })))
        .await;
    assert_eq!(status, 200);
    let (status, _) = server
        .send(Method::PUT, &status_path, admin, Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, 200);
    let (status, body) = server
        .send(Method::PUT, &status_path, admin, Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], 2004);
}

#[tokio::test]
async fn delete_and_remove_refund_participants() {
    let server = TestServer::start().await;
    let match_id = server.open_match(25, 4).await;
    let join = format!("/api/v1/matches/{match_id}/join");
    let (kicked_id, kicked) = server.player("kicked", 25).await;
    let (_, stays) = server.player("stays", 25).await;
    for token in [&kicked, &stays] {
        let (status, _) = server.send(Method::POST, &join, Some(token), None).await;
        assert_eq!(status, 200);
    }

    let admin = Some(server.admin_token.as_str());
    let (status, body) = server
        .send(
            Method::DELETE,
            &format!("/api/v1/admin/matches/{match_id}/participants/{kicked_id}"),
            admin,
            None,
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(server.balance(&kicked).await, 25);
    assert_eq!(server.balance(&stays).await, 0);

    let (status, body) = server
        .send(Method::DELETE, &format!("/api/v1/admin/matches/{match_id}"), admin, None)
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["refunded"], 1);
    assert_eq!(server.balance(&stays).await, 25);

    let (status, _) = server
        .send(Method::GET, &format!("/api/v1/matches/{match_id}"), None, None)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn gateway_deposit_is_credited_once() {
    let server = TestServer::start().await;
    let (_, token) = server.player("payer", 0).await;

    let (status, order) = server
        .send(
            Method::POST,
            "/api/v1/wallet/deposits/orders",
            Some(&token),
            Some(json!({ "amount": 200 })),
        )
        .await;
    assert_eq!(status, 201, "{order}");
    let Some(order_ref) = order["order_ref"].as_str() else {
        panic!("order_ref missing: {order}");
    };

    let verifier = HmacPaymentVerifier::new(server.config.payment_key_secret.as_bytes());
    let verify = json!({
        "order_ref": order_ref,
        "payment_ref": "pay_123",
        "signature": verifier.sign(order_ref, "pay_123"),
        "amount": 200,
    });
    let (status, body) = server
        .send(Method::POST, "/api/v1/wallet/deposits/verify", Some(&token), Some(verify.clone()))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["credited"], true);
    assert_eq!(body["balance"], 200);

    let (status, body) = server
        .send(Method::POST, "/api/v1/wallet/deposits/verify", Some(&token), Some(verify))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["credited"], false);
    assert_eq!(server.balance(&token).await, 200);

    let (status, body) = server
        .send(
            Method::POST,
            "/api/v1/wallet/deposits/verify",
            Some(&token),
            Some(json!({
                "order_ref": order_ref,
                "payment_ref": "pay_123",
                "signature": "00",
                "amount": 200,
            })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1002);
}

#[tokio::test]
async fn manual_deposit_review_and_withdrawal() {
    let server = TestServer::start().await;
    let (account_id, token) = server.player("upi", 0).await;

    let (status, entry) = server
        .send(
            Method::POST,
            "/api/v1/wallet/deposits",
            Some(&token),
            Some(json!({ "amount": 500, "external_ref": "UPI-778899" })),
        )
        .await;
    assert_eq!(status, 201, "{entry}");
    let (status, body) = server
        .send(
            Method::POST,
            "/api/v1/wallet/deposits",
            Some(&token),
            Some(json!({ "amount": 500, "external_ref": "UPI-778899" })),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], 4005);

    let admin = Some(server.admin_token.as_str());
    let (status, pending) = server
        .send(Method::GET, "/api/v1/admin/deposits/pending", admin, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

    let Some(entry_id) = entry["id"].as_str() else {
        panic!("entry id missing: {entry}");
    };
    let review = format!("/api/v1/admin/deposits/{entry_id}/review");
    let (status, body) = server
        .send(Method::POST, &review, admin, Some(json!({ "decision": "approve" })))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], "completed");
    let (status, body) = server
        .send(Method::POST, &review, admin, Some(json!({ "decision": "approve" })))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], 2005);
    assert_eq!(server.balance(&token).await, 500);

    let (status, body) = server
        .send(
            Method::POST,
            "/api/v1/wallet/withdrawals",
            Some(&token),
            Some(json!({ "amount": 300, "destination": "ace@upi" })),
        )
        .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["balance"], 200);

    let (status, body) = server
        .send(
            Method::PUT,
            &format!("/api/v1/admin/accounts/{account_id}/wallet"),
            admin,
            Some(json!({ "mode": "set", "amount": 42 })),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["balance"], 42);
}

#[tokio::test]
async fn concurrent_joins_never_overfill() {
    let server = TestServer::start().await;
    let match_id = server.open_match(10, 3).await;
    let join = format!("/api/v1/matches/{match_id}/join");

    let mut tokens = Vec::new();
    for i in 0..12 {
        let (_, token) = server.player(&format!("p{i}"), 10).await;
        tokens.push(token);
    }
    let attempts = tokens.iter().map(|token| {
        let url = server.url(&join);
        let client = server.client.clone();
        let token = token.clone();
        async move {
            client
                .post(url)
                .bearer_auth(token)
                .send()
                .await
                .map(|r| r.status().as_u16())
                .unwrap_or(0)
        }
    });
    let statuses = futures_util::future::join_all(attempts).await;
    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 3);
    assert_eq!(statuses.iter().filter(|s| **s == 422).count(), 9);

    let mut total = 0;
    for token in &tokens {
        total += server.balance(token).await;
    }
    assert_eq!(total, 12 * 10 - 3 * 10);

    let (status, report) = server
        .send(Method::POST, "/api/v1/admin/reconcile", Some(&server.admin_token), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["released"], 0);
}
