//! Telegram bot: long-polls `getUpdates` and handles `/start <refCode>`
//! registration, the same get-or-create path the mini-app uses.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::db::users::{self, NewProfile};
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Deserialize)]
struct UpdatesResponse {
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct TelegramUser {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

pub async fn run_bot(state: Arc<AppState>, token: String) {
    let api = format!("https://api.telegram.org/bot{}", token);
    let mut offset: i64 = 0;

    tracing::info!("telegram bot polling started");
    loop {
        match poll_once(&state, &api, offset).await {
            Ok(next_offset) => offset = next_offset,
            Err(e) => {
                tracing::error!("telegram poll error: {:?}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn poll_once(state: &Arc<AppState>, api: &str, offset: i64) -> AppResult<i64> {
    let response = state
        .http
        .get(format!("{}/getUpdates", api))
        .query(&[("timeout", "30"), ("offset", &offset.to_string())])
        .send()
        .await?
        .json::<UpdatesResponse>()
        .await?;

    let mut next_offset = offset;
    for update in response.result {
        next_offset = next_offset.max(update.update_id + 1);

        if let Some(message) = update.message {
            if let Err(e) = handle_message(state, api, message).await {
                tracing::error!("telegram message error: {:?}", e);
            }
        }
    }
    Ok(next_offset)
}

async fn handle_message(state: &Arc<AppState>, api: &str, message: Message) -> AppResult<()> {
    let text = match &message.text {
        Some(t) => t.as_str(),
        None => return Ok(()),
    };
    let from = match &message.from {
        Some(f) => f,
        None => return Ok(()),
    };

    let Some(rest) = text.strip_prefix("/start") else {
        return Ok(());
    };
    let ref_code = rest.trim();

    let telegram_id = from.id.to_string();
    let existing = users::get(&state.pool, &telegram_id).await?.is_some();

    let profile = NewProfile {
        username: from.username.clone(),
        first_name: from.first_name.clone(),
        photo_url: None,
        invited_by: (!ref_code.is_empty()).then(|| ref_code.to_string()),
    };

    users::get_or_create(
        &state.pool,
        &telegram_id,
        &profile,
        state.now(),
        state.config.max_offline_secs,
    )
    .await?;

    let reply = if existing {
        "✅ Zaten kayıtlısın!".to_string()
    } else {
        format!(
            "👋 Hoş geldin {}!",
            from.first_name.as_deref().unwrap_or("kullanıcı")
        )
    };
    send_message(state, api, message.chat.id, &reply).await
}

async fn send_message(state: &Arc<AppState>, api: &str, chat_id: i64, text: &str) -> AppResult<()> {
    state
        .http
        .post(format!("{}/sendMessage", api))
        .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
        .send()
        .await?;
    Ok(())
}
