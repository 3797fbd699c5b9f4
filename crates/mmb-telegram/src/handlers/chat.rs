use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use mmb_nim::{resolve_model, ChatMessage};

use crate::handlers::resolve_user;
use crate::keyboards;
use crate::router::{AppState, DialogMode};

pub async fn handle_chat_start(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
) -> ResponseResult<()> {
    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    let model = user
        .last_model()
        .await
        .unwrap_or_else(|| state.cfg.default_model.clone());
    let intro = build_chat_intro(&model, user.is_premium().await);

    bot.send_message(msg.chat.id, intro)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::keyboard_chat())
        .await?;
    state.modes.set(msg.chat.id.0, DialogMode::InChat).await;
    Ok(())
}

pub async fn handle_chat_exit(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    state.modes.clear(msg.chat.id.0).await;
    bot.send_message(msg.chat.id, "☑️Вы завершили чат")
        .reply_markup(keyboards::keyboard_default())
        .await?;
    Ok(())
}

pub async fn handle_chat_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
    text: &str,
) -> ResponseResult<()> {
    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    // Quota exhaustion is not an error: the user gets a message, not a crash.
    if !user.can_make_request().await {
        bot.send_message(
            msg.chat.id,
            "⏳ Лимит запросов исчерпан. Попробуйте позже или перейдите на premium.",
        )
        .reply_markup(keyboards::keyboard_chat())
        .await?;
        return Ok(());
    }

    let label = user
        .last_model()
        .await
        .unwrap_or_else(|| state.cfg.default_model.clone());
    let Some(model_id) = resolve_model(&label) else {
        bot.send_message(
            msg.chat.id,
            "Выбранная модель больше недоступна, выберите другую через «🤖Модели».",
        )
        .await?;
        return Ok(());
    };

    let messages = [
        ChatMessage::system(state.cfg.system_prompt.clone()),
        ChatMessage::user(text),
    ];

    match state.nim.chat_completion(model_id, &messages).await {
        Ok(answer) => {
            bot.send_message(msg.chat.id, answer)
                .reply_markup(keyboards::keyboard_chat())
                .await?;
        }
        Err(e) => {
            tracing::error!(user_id, model = model_id, error = %e, "chat completion failed");
            bot.send_message(
                msg.chat.id,
                "⚠️ Модель не ответила, попробуйте ещё раз.",
            )
            .reply_markup(keyboards::keyboard_chat())
            .await?;
        }
    }
    Ok(())
}

fn build_chat_intro(model: &str, is_premium: bool) -> String {
    let plan = if is_premium { "Premium" } else { "Free" };
    let rate = if is_premium { "unlimited" } else { "1.6s/шт" };

    format!(
        "<b>💬 Вы начали новый чат</b>\n\n\
         <b>🤖 Модель:</b> <code>{model}</code>\n\
         <b>📦 Ваш план:</b> <code>{plan}</code>\n\
         <b>⏱ Частота запросов:</b> <code>{rate}</code>\n\n\
         Чтобы писать сообщения — используйте клавиатуру телефона.\n\n\
         Чтобы закончить чат — нажмите <b>«❌Завершить чат»</b>."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_intro_for_free_plan() {
        let text = build_chat_intro("LLaMA-8b", false);
        assert!(text.contains("LLaMA-8b"));
        assert!(text.contains("Free"));
        assert!(text.contains("1.6s/шт"));
    }

    #[test]
    fn chat_intro_for_premium_plan() {
        let text = build_chat_intro("Kimi-2.5", true);
        assert!(text.contains("Premium"));
        assert!(text.contains("unlimited"));
    }
}
