use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::Mutex;

use mmb_core::{config::Config, store::UserDirectory};
use mmb_nim::NimClient;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub users: Arc<UserDirectory>,
    pub nim: Arc<NimClient>,
    pub modes: Arc<ChatModes>,
}

/// Where a chat currently is in the conversation flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogMode {
    ChoosingModel,
    InChat,
}

/// In-memory per-chat dialogue state (the FSM of the conversation flow).
#[derive(Default)]
pub struct ChatModes {
    inner: Mutex<HashMap<i64, DialogMode>>,
}

impl ChatModes {
    pub async fn get(&self, chat_id: i64) -> Option<DialogMode> {
        self.inner.lock().await.get(&chat_id).copied()
    }

    pub async fn set(&self, chat_id: i64, mode: DialogMode) {
        self.inner.lock().await.insert(chat_id, mode);
    }

    pub async fn clear(&self, chat_id: i64) {
        self.inner.lock().await.remove(&chat_id);
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    users: Arc<UserDirectory>,
    nim: Arc<NimClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = %me.username(), "bot started");
    }

    let state = Arc::new(AppState {
        cfg,
        users,
        nim,
        modes: Arc::new(ChatModes::default()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
