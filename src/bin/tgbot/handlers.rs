use std::sync::Arc;

use restaurant_bot::{
    bot::{text, Action, Controller, Reply},
    session::{SessionKey, Sessions},
};
use teloxide::{
    dispatching::UpdateHandler,
    prelude::*,
    types::{BotCommand, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, UserId},
    utils::command::BotCommands,
    ApiError, RequestError,
};

type HandlerResult = anyhow::Result<()>;

macro_rules! send {
    ([$bot:expr, $chat:expr], $text:expr) => {
        if let Err(e) = $bot.send_message($chat, $text).await {
            tracing::error!("fail to send message: {e}")
        }
    };
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Restoran boti buyruqlari:")]
enum Commands {
    #[command(description = "Botni boshlash")]
    Start,
    #[command(description = "Botni to'xtatish")]
    Stop,
    #[command(description = "Yordam xabarini ko'rish")]
    Help,
    #[command(description = "Admin panelini ochish")]
    Admin,
    #[command(description = "Restoranni nomi bo'yicha qidirish")]
    Search(String),
}

impl From<Commands> for Action {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Start => Action::Start,
            Commands::Stop => Action::Stop,
            Commands::Help => Action::Help,
            Commands::Admin => Action::Admin,
            Commands::Search(pattern) => Action::Search(pattern),
        }
    }
}

/// The command list shown in the client's menu.
pub(super) fn bot_commands() -> Vec<BotCommand> {
    Commands::bot_commands()
}

pub(super) fn handler_schema() -> UpdateHandler<anyhow::Error> {
    let command_handler = teloxide::filter_command::<Commands, _>().endpoint(command_handler);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::endpoint(text_handler));

    let callback_handler = Update::filter_callback_query().endpoint(callback_handler);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}

/// Where a reply goes: a fresh message, or the message whose button was pressed.
#[derive(Clone, Copy)]
enum Target {
    Send(ChatId),
    Edit(ChatId, MessageId),
}

impl Target {
    fn chat(self) -> ChatId {
        match self {
            Self::Send(chat) | Self::Edit(chat, _) => chat,
        }
    }
}

/// Everything one update needs to run through the controller.
struct Turn {
    bot: Bot,
    sessions: Arc<Sessions>,
    controller: Arc<Controller>,
    user: UserId,
    target: Target,
}

async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Commands,
    sessions: Arc<Sessions>,
    controller: Arc<Controller>,
) -> HandlerResult {
    let Some(user) = msg.from() else { return Ok(()) };
    let turn = Turn {
        user: user.id,
        target: Target::Send(msg.chat.id),
        bot,
        sessions,
        controller,
    };
    turn.run(cmd.into()).await
}

async fn text_handler(
    bot: Bot,
    msg: Message,
    sessions: Arc<Sessions>,
    controller: Arc<Controller>,
) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else { return Ok(()) };
    // unknown commands
    if text.starts_with('/') {
        return Ok(());
    }

    let turn = Turn {
        user: user.id,
        target: Target::Send(msg.chat.id),
        bot,
        sessions,
        controller,
    };
    turn.run(Action::Text(text.to_string())).await
}

async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    sessions: Arc<Sessions>,
    controller: Arc<Controller>,
) -> HandlerResult {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        tracing::error!("fail to answer callback query: {e}")
    }

    let (Some(data), Some(msg)) = (q.data, q.message) else { return Ok(()) };
    let turn = Turn {
        user: q.from.id,
        target: Target::Edit(msg.chat.id, msg.id),
        bot,
        sessions,
        controller,
    };
    turn.run(Action::Button(data)).await
}

impl Turn {
    /// Failures never reach the dispatcher: they are logged and the user is
    /// asked to try again, with their session left where it was.
    async fn run(self, action: Action) -> HandlerResult {
        if let Err(e) = self.step(action).await {
            tracing::error!("fail to handle update from user {}: {e:#}", self.user.0);
            send!([self.bot, self.target.chat()], text::RETRY);
        }
        Ok(())
    }

    fn key(&self) -> SessionKey {
        SessionKey::new(self.target.chat().0, self.user.0)
    }

    async fn step(&self, action: Action) -> anyhow::Result<()> {
        let key = self.key();
        let state = self.sessions.get(key);
        let controller = self.controller.clone();
        let outcome =
            tokio::task::spawn_blocking(move || controller.handle(key.user, &state, action))
                .await?;

        self.sessions
            .commit(key, outcome, |reply| self.render(reply))
            .await
    }

    async fn render(&self, reply: Reply) -> anyhow::Result<()> {
        let markup = keyboard(&reply);
        match self.target {
            Target::Send(chat) => {
                let mut req = self.bot.send_message(chat, reply.text);
                if let Some(markup) = markup {
                    req = req.reply_markup(markup);
                }
                if reply.markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                req.await?;
            }
            Target::Edit(chat, message) => {
                let mut req = self.bot.edit_message_text(chat, message, reply.text);
                if let Some(markup) = markup {
                    req = req.reply_markup(markup);
                }
                if reply.markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                match req.await {
                    // same menu pressed twice
                    Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

fn keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if reply.keyboard.is_empty() {
        return None;
    }
    let btn = InlineKeyboardButton::callback;
    let rows = reply.keyboard.iter().map(|row| {
        row.iter()
            .map(|b| btn(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    });
    Some(InlineKeyboardMarkup::new(rows))
}
