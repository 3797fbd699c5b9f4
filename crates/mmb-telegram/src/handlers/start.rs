use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use crate::handlers::resolve_user;
use crate::keyboards;
use crate::router::AppState;

const HELP_TEXT: &str = "\
<b>🛟 Правила и помощь</b>

Бот даёт доступ к нескольким LLM-моделям через один чат.

• <b>💬Новый чат</b> — начать диалог с выбранной моделью
• <b>🤖Модели</b> — выбрать модель по умолчанию
• <b>👤Профиль</b> — баланс, план и лимиты

На бесплатном плане действует лимит запросов; premium снимает ограничения \
частоты. Не отправляйте в чат персональные данные.";

pub async fn handle_start(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
) -> ResponseResult<()> {
    // First touch: creates the stored row if this user is new.
    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    let model = user
        .last_model()
        .await
        .unwrap_or_else(|| state.cfg.default_model.clone());

    let greeting = format!(
        "<b>👋 Добро пожаловать!</b>\n\n\
         Это чат-бот с доступом к нескольким LLM-моделям.\n\
         <b>🤖 Текущая модель:</b> <code>{model}</code>\n\n\
         Нажмите <b>«💬Новый чат»</b>, чтобы начать."
    );

    bot.send_message(msg.chat.id, greeting)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::keyboard_default())
        .await?;
    Ok(())
}

pub async fn handle_help(bot: Bot, msg: Message) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, HELP_TEXT)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::keyboard_default())
        .await?;
    Ok(())
}
