use std::{convert::Infallible, sync::Arc};

use warp::{Filter, Rejection, Reply};

use crate::error::{handle_rejection, reject, AppError};
use crate::state::AppState;

pub mod admin;
pub mod payments;
pub mod users;

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// The one admin capability check. Every privileged route goes through this
/// filter; there are no per-route secret variants.
fn require_admin(
    state: Arc<AppState>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-admin-key")
        .and(with_state(state))
        .and_then(|key: Option<String>, state: Arc<AppState>| async move {
            match key {
                Some(k) if k == state.config.admin_secret => Ok(()),
                _ => Err(reject(AppError::Unauthorized)),
            }
        })
        .untuple_one()
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path::end()
        .and(warp::get())
        .map(|| "✅ Pratique backend running");

    let register = warp::path!("user" / "register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(users::register);

    let update_balance = warp::path!("user" / "update-balance")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(users::update_balance);

    let get_user = warp::path!("user" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(users::get_user);

    let leaderboard = warp::path!("leaderboard")
        .and(warp::get())
        .and(warp::query::<users::LeaderboardQuery>())
        .and(with_state(state.clone()))
        .and_then(users::leaderboard);

    let manual_start = warp::path!("manual-trc20" / "start")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(payments::manual_start);

    let manual_confirm = warp::path!("manual-trc20" / "confirm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(payments::manual_confirm);

    let invoice = warp::path!("payments" / "nowpayments" / "invoice")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(payments::nowpayments_invoice);

    let ipn = warp::path!("payments" / "nowpayments" / "ipn")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(payments::nowpayments_ipn);

    let admin_payments = warp::path!("admin" / "payments")
        .and(warp::get())
        .and(require_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(admin::list_payments);

    let admin_approve = warp::path!("admin" / "payments" / "approve")
        .and(warp::post())
        .and(require_admin(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::approve_payment);

    let admin_reject = warp::path!("admin" / "payments" / "reject")
        .and(warp::post())
        .and(require_admin(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::reject_payment);

    let admin_users = warp::path!("admin" / "users")
        .and(warp::get())
        .and(require_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(admin::list_users);

    let admin_activate = warp::path!("admin" / "activate")
        .and(warp::post())
        .and(require_admin(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::activate_user);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["Content-Type", "x-admin-key"]);

    health
        .or(register)
        .or(update_balance)
        .or(get_user)
        .or(leaderboard)
        .or(manual_start)
        .or(manual_confirm)
        .or(invoice)
        .or(ipn)
        .or(admin_payments)
        .or(admin_approve)
        .or(admin_reject)
        .or(admin_users)
        .or(admin_activate)
        .recover(handle_rejection)
        .with(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::memory_pool;

    async fn test_state() -> Arc<AppState> {
        let pool = memory_pool().await;
        let config = AppConfig {
            port: 0,
            database_url: String::new(),
            admin_secret: "sekrit".to_string(),
            trc20_wallet: "TTestWallet123".to_string(),
            telegram_token: None,
            nowpayments_api_key: None,
            max_offline_secs: 7200,
        };
        Arc::new(AppState::new(pool, config))
    }

    #[tokio::test]
    async fn health_responds() {
        let api = routes(test_state().await);
        let res = warp::test::request().path("/").reply(&api).await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn register_then_fetch_user() {
        let api = routes(test_state().await);

        let res = warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42", "username": "ayse" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);

        let res = warp::test::request().path("/user/42").reply(&api).await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["telegramId"], "42");
        assert_eq!(body["inviteCode"], "INV-42");
        assert_eq!(body["robotLevel"], 0);
    }

    #[tokio::test]
    async fn register_without_telegram_id_is_400() {
        let api = routes(test_state().await);

        for id in ["", "   "] {
            let res = warp::test::request()
                .method("POST")
                .path("/user/register")
                .json(&serde_json::json!({ "telegramId": id }))
                .reply(&api)
                .await;
            assert_eq!(res.status(), 400, "telegramId {:?}", id);
        }
    }

    #[tokio::test]
    async fn ipn_for_unknown_order_is_404() {
        let api = routes(test_state().await);

        let res = warp::test::request()
            .method("POST")
            .path("/payments/nowpayments/ipn")
            .json(&serde_json::json!({
                "payment_status": "finished",
                "order_id": "PRTQ-ghost-1-000000",
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let api = routes(test_state().await);
        let res = warp::test::request().path("/user/missing").reply(&api).await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn update_balance_reconciles_with_max() {
        let api = routes(test_state().await);

        warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42" }))
            .reply(&api)
            .await;

        let res = warp::test::request()
            .method("POST")
            .path("/user/update-balance")
            .json(&serde_json::json!({ "telegramId": "42", "balance": 500.0 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["balance"], 500.0);

        // A stale lower report never wins.
        let res = warp::test::request()
            .method("POST")
            .path("/user/update-balance")
            .json(&serde_json::json!({ "telegramId": "42", "balance": 100.0 }))
            .reply(&api)
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["balance"], 500.0);
    }

    #[tokio::test]
    async fn negative_balance_is_rejected() {
        let api = routes(test_state().await);

        warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42" }))
            .reply(&api)
            .await;

        let res = warp::test::request()
            .method("POST")
            .path("/user/update-balance")
            .json(&serde_json::json!({ "telegramId": "42", "balance": -5.0 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn admin_routes_require_the_key() {
        let api = routes(test_state().await);

        let res = warp::test::request().path("/admin/users").reply(&api).await;
        assert_eq!(res.status(), 401);

        let res = warp::test::request()
            .path("/admin/users")
            .header("x-admin-key", "wrong")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 401);

        let res = warp::test::request()
            .path("/admin/users")
            .header("x-admin-key", "sekrit")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn manual_payment_approval_raises_robot_level() {
        let api = routes(test_state().await);

        warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42" }))
            .reply(&api)
            .await;

        let res = warp::test::request()
            .method("POST")
            .path("/manual-trc20/start")
            .json(&serde_json::json!({ "userId": "42", "level": 2 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["amountUSD"], 100.0);
        assert_eq!(body["wallet"], "TTestWallet123");
        let payment_id = body["paymentId"].as_i64().unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/manual-trc20/confirm")
            .json(&serde_json::json!({ "paymentId": payment_id, "txHash": "deadbeef" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);

        let res = warp::test::request()
            .method("POST")
            .path("/admin/payments/approve")
            .header("x-admin-key", "sekrit")
            .json(&serde_json::json!({ "paymentId": payment_id }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);

        let res = warp::test::request().path("/user/42").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["robotLevel"], 2);
    }

    #[tokio::test]
    async fn invalid_purchase_level_is_400() {
        let api = routes(test_state().await);

        warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42" }))
            .reply(&api)
            .await;

        for level in [0, 6, -1] {
            let res = warp::test::request()
                .method("POST")
                .path("/manual-trc20/start")
                .json(&serde_json::json!({ "userId": "42", "level": level }))
                .reply(&api)
                .await;
            assert_eq!(res.status(), 400, "level {}", level);
        }
    }

    #[tokio::test]
    async fn leaderboard_returns_descending_balances() {
        let api = routes(test_state().await);

        for (id, balance) in [("1", 50.0), ("2", 300.0), ("3", 120.0)] {
            warp::test::request()
                .method("POST")
                .path("/user/register")
                .json(&serde_json::json!({ "telegramId": id }))
                .reply(&api)
                .await;
            warp::test::request()
                .method("POST")
                .path("/user/update-balance")
                .json(&serde_json::json!({ "telegramId": id, "balance": balance }))
                .reply(&api)
                .await;
        }

        let res = warp::test::request()
            .path("/leaderboard?limit=2")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["telegramId"], "2");
        assert_eq!(entries[1]["telegramId"], "3");
    }

    #[tokio::test]
    async fn debug_activation_is_admin_gated() {
        let api = routes(test_state().await);

        warp::test::request()
            .method("POST")
            .path("/user/register")
            .json(&serde_json::json!({ "telegramId": "42" }))
            .reply(&api)
            .await;

        let res = warp::test::request()
            .method("POST")
            .path("/admin/activate")
            .json(&serde_json::json!({ "telegramId": "42", "level": 3 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 401);

        let res = warp::test::request()
            .method("POST")
            .path("/admin/activate")
            .header("x-admin-key", "sekrit")
            .json(&serde_json::json!({ "telegramId": "42", "level": 3 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["robotLevel"], 3);
    }
}
