//! Shared harness: an in-memory gateway on an ephemeral port.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;

use arena_gateway::api;
use arena_gateway::app_state::AppState;
use arena_gateway::config::GatewayConfig;
use arena_gateway::domain::{AccountId, Actor, Role};
use arena_gateway::persistence::MemoryLedgerStore;
use arena_gateway::service::SharedSecretIdentity;
use arena_gateway::ws::handler::ws_handler;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub admin_token: String,
    pub config: GatewayConfig,
}

impl TestServer {
    pub async fn start() -> Self {
        let config = GatewayConfig {
            reconcile_interval_secs: 0,
            ..GatewayConfig::default()
        };
        let state = AppState::build(Arc::new(MemoryLedgerStore::new()), config.clone());
        let app = Router::new()
            .merge(api::build_router())
            .route("/ws", get(ws_handler))
            .with_state(state);

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let admin_token = SharedSecretIdentity::new(config.identity_secret.as_bytes()).issue(
            &Actor {
                account_id: AccountId::new(),
                role: Role::Admin,
            },
        );
        Self {
            addr,
            client: reqwest::Client::new(),
            admin_token,
            config,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={token}", self.addr)
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let Ok(resp) = req.send().await else {
            panic!("request to {path} failed");
        };
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Creates a player account and returns `(account_id, token)`.
    pub async fn player(&self, name: &str, balance: u64) -> (String, String) {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/api/v1/admin/accounts",
                Some(&self.admin_token),
                Some(json!({ "display_name": name, "initial_balance": balance })),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        let (Some(id), Some(token)) = (body["account"]["id"].as_str(), body["token"].as_str())
        else {
            panic!("account response missing fields: {body}");
        };
        (id.to_string(), token.to_string())
    }

    /// Creates an upcoming match and returns its id.
    pub async fn open_match(&self, entry_fee: u64, capacity: u32) -> String {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/api/v1/admin/matches",
                Some(&self.admin_token),
                Some(json!({
                    "title": "Erangel Squad",
                    "map": "Erangel",
                    "mode": "squad",
                    "entry_fee": entry_fee,
                    "prize_pool": 500,
                    "capacity": capacity,
                    "scheduled_time": "2099-01-01T18:00:00Z",
                })),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        let Some(id) = body["id"].as_str() else {
            panic!("match response missing id: {body}");
        };
        id.to_string()
    }

    pub async fn balance(&self, token: &str) -> u64 {
        let (status, body) = self
            .send(reqwest::Method::GET, "/api/v1/wallet", Some(token), None)
            .await;
        assert_eq!(status, 200, "{body}");
        let Some(balance) = body["balance"].as_u64() else {
            panic!("wallet response missing balance: {body}");
        };
        balance
    }
}
