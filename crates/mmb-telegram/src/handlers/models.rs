use std::sync::Arc;

use teloxide::prelude::*;

use mmb_nim::resolve_model;

use crate::handlers::resolve_user;
use crate::keyboards::{self, CURRENT_MODEL_MARK};
use crate::router::{AppState, DialogMode};

pub async fn handle_models(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
) -> ResponseResult<()> {
    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    let current = user.last_model().await;
    bot.send_message(msg.chat.id, "Выберите модель")
        .reply_markup(keyboards::keyboard_models(current.as_deref()))
        .await?;
    state.modes.set(msg.chat.id.0, DialogMode::ChoosingModel).await;
    Ok(())
}

pub async fn handle_model_choice(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
    text: &str,
) -> ResponseResult<()> {
    let label = text.trim_start_matches(CURRENT_MODEL_MARK);

    if resolve_model(label).is_none() {
        bot.send_message(
            msg.chat.id,
            "Выберите модель используя отображённые телеграм-кнопки",
        )
        .await?;
        return Ok(());
    }

    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    if user.last_model().await.as_deref() != Some(label) {
        user.set_last_model(label).await;
        if let Err(e) = user.save().await {
            tracing::error!(user_id, error = %e, "failed to persist model choice");
        }
    }

    state.modes.clear(msg.chat.id.0).await;
    bot.send_message(
        msg.chat.id,
        format!("Установлена модель по умолчанию: {label}"),
    )
    .reply_markup(keyboards::keyboard_default())
    .await?;
    Ok(())
}
