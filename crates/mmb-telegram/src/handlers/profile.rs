use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use mmb_core::store::ProfileSnapshot;

use crate::handlers::resolve_user;
use crate::router::AppState;

pub async fn handle_profile(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user_id: i64,
) -> ResponseResult<()> {
    let Some(user) = resolve_user(&bot, &msg, &state, user_id).await? else {
        return Ok(());
    };

    let text = build_profile_text(&user.snapshot().await, &state.cfg.default_model);
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

fn build_profile_text(snap: &ProfileSnapshot, default_model: &str) -> String {
    let plan = if snap.is_premium { "Premium" } else { "Free" };
    let premium_since = snap
        .premium_since
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "—".to_string());
    let model = snap.last_model.as_deref().unwrap_or(default_model);

    format!(
        "<b>👤 Ваш профиль</b>\n\n\
         <b>🆔 ID:</b> <code>{id}</code>\n\
         <b>💰 Баланс:</b> <code>{balance} ⭐</code>\n\n\
         <b>📦 Оплачено запросов:</b> <code>{paid}</code>\n\n\
         <b>💎 План:</b> <code>{plan}</code>\n\
         <b>📅 Премиум с:</b> <code>{premium_since}</code>\n\
         <b>⏳ Осталось запросов:</b> <code>{remaining}</code>\n\n\
         <b>🤖 Выбранная модель:</b> <code>{model}</code>\n\n\
         ━━━━━━━━━━━━━━━\n\
         <i>Спасибо, что пользуетесь нашим ботом ✨</i>",
        id = snap.id,
        balance = snap.balance,
        paid = snap.paid_requests,
        remaining = snap.remaining_requests,
    )
}
