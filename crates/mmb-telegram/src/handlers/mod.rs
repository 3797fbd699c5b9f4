//! Telegram update handlers.
//!
//! Each handler resolves the user through the directory (first touch creates
//! the row), renders a reply, and leaves persistence to explicit `save()`
//! calls on the profile.

use std::sync::Arc;

use teloxide::prelude::*;

use mmb_core::store::UserProfile;

use crate::keyboards;
use crate::router::{AppState, DialogMode};

mod chat;
mod models;
mod profile;
mod start;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;

    let Some(text) = msg.text().map(|s| s.to_string()) else {
        bot.send_message(msg.chat.id, "Я понимаю только текстовые сообщения.")
            .await?;
        return Ok(());
    };

    match text.as_str() {
        t if t.starts_with("/start") => start::handle_start(bot, msg, state, user_id).await,
        "/help" | keyboards::BTN_HELP => start::handle_help(bot, msg).await,
        "/profile" | keyboards::BTN_PROFILE => {
            profile::handle_profile(bot, msg, state, user_id).await
        }
        "/models" | keyboards::BTN_MODELS => models::handle_models(bot, msg, state, user_id).await,
        keyboards::BTN_NEW_CHAT => chat::handle_chat_start(bot, msg, state, user_id).await,
        keyboards::BTN_END_CHAT => chat::handle_chat_exit(bot, msg, state).await,
        _ => match state.modes.get(msg.chat.id.0).await {
            Some(DialogMode::ChoosingModel) => {
                models::handle_model_choice(bot, msg, state, user_id, &text).await
            }
            Some(DialogMode::InChat) => {
                chat::handle_chat_message(bot, msg, state, user_id, &text).await
            }
            None => {
                bot.send_message(msg.chat.id, "Используйте кнопки клавиатуры ниже 👇")
                    .reply_markup(keyboards::keyboard_default())
                    .await?;
                Ok(())
            }
        },
    }
}

/// Loads the profile, reporting storage failures to the user instead of
/// crashing the dispatcher.
pub(crate) async fn resolve_user(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    user_id: i64,
) -> ResponseResult<Option<Arc<UserProfile>>> {
    match state.users.get_or_create(user_id).await {
        Ok(user) => Ok(Some(user)),
        Err(e) => {
            tracing::error!(user_id, error = %e, "failed to load user profile");
            bot.send_message(msg.chat.id, "⚠️ Внутренняя ошибка, попробуйте позже.")
                .await?;
            Ok(None)
        }
    }
}
