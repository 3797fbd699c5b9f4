use teloxide::types::{KeyboardButton, KeyboardMarkup};

use mmb_nim::MODELS;

pub const BTN_NEW_CHAT: &str = "💬Новый чат";
pub const BTN_END_CHAT: &str = "❌Завершить чат";
pub const BTN_PROFILE: &str = "👤Профиль";
pub const BTN_MODELS: &str = "🤖Модели";
pub const BTN_HELP: &str = "🛟Правила и помощь";

/// Marks the currently selected model on the model keyboard.
pub const CURRENT_MODEL_MARK: &str = "🔶";

pub fn keyboard_default() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_NEW_CHAT)],
        vec![
            KeyboardButton::new(BTN_PROFILE),
            KeyboardButton::new(BTN_MODELS),
        ],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard(true)
}

pub fn keyboard_chat() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(BTN_END_CHAT)]]).resize_keyboard(true)
}

/// One model per row; the user's current model is prefixed with a mark.
pub fn keyboard_models(current: Option<&str>) -> KeyboardMarkup {
    let rows = MODELS
        .iter()
        .map(|m| {
            let label = if Some(m.label) == current {
                format!("{CURRENT_MODEL_MARK}{}", m.label)
            } else {
                m.label.to_string()
            };
            vec![KeyboardButton::new(label)]
        })
        .collect::<Vec<_>>();
    KeyboardMarkup::new(rows).resize_keyboard(true)
}
