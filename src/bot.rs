//! The conversation: which menu a user is looking at and what each button or
//! reply does to the catalogue.
//!
//! Nothing here talks to Telegram. [`Controller::handle`] takes the user's
//! current [`ChatState`] and one [`Action`] and returns the next state plus
//! the [`Reply`] to render.

use std::sync::Arc;

use teloxide::utils::markdown::{bold, escape};

use crate::{
    config::AdminSet,
    data::{Rating, Restaurant},
    db::CatalogueStore,
};

/// Callback data tags carried by inline buttons.
pub mod tag {
    pub const ADD_RESTAURANT: &str = "add_restaurant";
    pub const EDIT_RESTAURANT: &str = "edit_restaurant";
    pub const DELETE_RESTAURANT: &str = "delete_restaurant";
    pub const CONFIRM_DELETE: &str = "confirm_delete";
    pub const VIEW_RESTAURANTS: &str = "view_restaurants";
    pub const VIEW_RESTAURANT: &str = "view_restaurant";
    pub const RECOMMEND_RESTAURANTS: &str = "recommend_restaurants";
    pub const RATE: &str = "rate";
    pub const CANCEL: &str = "cancel";
}

/// Telegram rejects callback data longer than this many bytes.
pub const MAX_CALLBACK_DATA: usize = 64;

/// Longest restaurant name, in bytes, that still fits every `<tag>:<name>` button.
pub const MAX_NAME_BYTES: usize = MAX_CALLBACK_DATA - tag::VIEW_RESTAURANT.len() - 1;

/// User facing texts that more than one screen shares.
pub mod text {
    pub const WELCOME: &str =
        "Assalomu alaykum! Restoran botiga xush kelibsiz!\nQuyidagi amallardan birini tanlang:";
    pub const ADMIN_PANEL: &str = "Admin paneli:\nQuyidagi amallardan birini tanlang:";
    pub const MAIN_MENU: &str = "Asosiy menyuga qaytish:\nQuyidagi amallardan birini tanlang:";
    pub const CHOOSE: &str = "Quyidagi amallardan birini tanlang:";
    pub const STOPPED: &str = "Bot to'xtatildi. Qayta boshlash uchun /start ni bosing.";
    pub const NOT_FOUND: &str = "Bunday restoran topilmadi.";
    pub const EMPTY: &str = "Hech qanday restoran topilmadi.";
    pub const NOTHING_RATED: &str = "Hech qanday baholangan restoran topilmadi.";
    pub const NOT_ADMIN: &str = "Sizda admin huquqlari yo'q!";
    pub const DENY_ADD: &str = "Sizda restoran qo'shish huquqi yo'q!";
    pub const DENY_EDIT: &str = "Sizda restoran tahrirlash huquqi yo'q!";
    pub const DENY_DELETE: &str = "Sizda restoran o'chirish huquqi yo'q!";
    pub const ASK_NAME: &str = "Restoran nomini kiriting:";
    pub const NAME_TOO_LONG: &str =
        "Restoran nomi juda uzun (eng ko'pi 48 bayt). Qisqaroq nom kiriting:";
    pub const ASK_LOCATION: &str = "Endi restoran joylashuvini (manzilini) kiriting:";
    pub const SEARCH_USAGE: &str = "Foydalanish: /search <nom>";
    pub const RETRY: &str = "Xatolik yuz berdi. Iltimos qaytadan urinib ko'ring.";
    pub const BACK: &str = "🔙 Orqaga qaytish";
}

/// Where a user is in the conversation. The restaurant being added, edited or
/// rated travels inside the variant and is gone once the user is back at the
/// menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatState {
    /// Before `/start` and after `/stop`.
    #[default]
    Stopped,
    SelectingAction,
    AddingName,
    AddingLocation {
        name: String,
    },
    EditingLocation {
        name: String,
    },
    WaitingForRating {
        name: String,
    },
}

/// One thing the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Help,
    Admin,
    Search(String),
    /// Raw callback data of a pressed button.
    Button(String),
    /// A plain text message.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

fn btn(label: impl Into<String>, data: impl Into<String>) -> Button {
    Button {
        label: label.into(),
        data: data.into(),
    }
}

fn back(data: &str) -> Vec<Button> {
    vec![btn(text::BACK, data)]
}

/// What to show the user: a text and rows of buttons under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
    /// Render `text` as Telegram MarkdownV2. Such texts are already escaped.
    pub markdown: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }

    fn markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    /// Every callback data this reply offers, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &str> {
        self.keyboard.iter().flatten().map(|b| b.data.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub state: ChatState,
    /// `None` when the action is ignored.
    pub reply: Option<Reply>,
}

impl Outcome {
    fn new(state: ChatState, reply: Reply) -> Self {
        Self {
            state,
            reply: Some(reply),
        }
    }

    fn menu(reply: Reply) -> Self {
        Self::new(ChatState::SelectingAction, reply)
    }

    fn ignore(state: &ChatState) -> Self {
        Self {
            state: state.clone(),
            reply: None,
        }
    }
}

/// A parsed button press: `<tag>` or `<tag>:<argument>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callback<'a> {
    Add,
    EditList,
    Edit(&'a str),
    DeleteList,
    Delete(&'a str),
    ViewList,
    View(&'a str),
    Recommend,
    Rate(&'a str),
    Cancel,
}

impl<'a> Callback<'a> {
    fn parse(data: &'a str) -> Option<Self> {
        let cb = match data.split_once(':') {
            None => match data {
                tag::ADD_RESTAURANT => Self::Add,
                tag::EDIT_RESTAURANT => Self::EditList,
                tag::DELETE_RESTAURANT => Self::DeleteList,
                tag::VIEW_RESTAURANTS => Self::ViewList,
                tag::RECOMMEND_RESTAURANTS => Self::Recommend,
                tag::CANCEL => Self::Cancel,
                _ => return None,
            },
            Some((kind, arg)) => match kind {
                tag::EDIT_RESTAURANT => Self::Edit(arg),
                tag::CONFIRM_DELETE => Self::Delete(arg),
                tag::VIEW_RESTAURANT => Self::View(arg),
                tag::RATE => Self::Rate(arg),
                _ => return None,
            },
        };
        Some(cb)
    }
}

#[derive(Clone, Copy)]
enum ListKind {
    View,
    Edit,
    Delete,
}

pub struct Controller {
    store: Arc<dyn CatalogueStore>,
    admins: AdminSet,
}

impl Controller {
    pub fn new(store: Arc<dyn CatalogueStore>, admins: AdminSet) -> Self {
        Self { store, admins }
    }

    pub fn is_admin(&self, user: u64) -> bool {
        self.admins.contains(user)
    }

    pub fn handle(&self, user: u64, state: &ChatState, action: Action) -> Outcome {
        match action {
            Action::Start => Outcome::menu(self.main_menu(user, text::WELCOME)),
            Action::Stop => Outcome::new(ChatState::Stopped, Reply::new(text::STOPPED)),
            Action::Help => Outcome::new(state.clone(), self.help(user)),
            Action::Admin => {
                if self.is_admin(user) {
                    Outcome::menu(self.main_menu(user, text::ADMIN_PANEL))
                } else {
                    self.deny(user, text::NOT_ADMIN)
                }
            }
            Action::Search(pattern) => Outcome::menu(self.search(&pattern)),
            _ if *state == ChatState::Stopped => Outcome::ignore(state),
            Action::Button(data) => self.on_button(user, state, &data),
            Action::Text(reply) => self.on_text(user, state, &reply),
        }
    }

    fn on_button(&self, user: u64, state: &ChatState, data: &str) -> Outcome {
        let Some(callback) = Callback::parse(data) else {
            tracing::debug!("unknown callback data {data:?} from {user}");
            return self.reprompt(user, state);
        };

        match callback {
            Callback::Add => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_ADD);
                }
                Outcome::new(ChatState::AddingName, ask_name())
            }
            Callback::EditList => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_EDIT);
                }
                Outcome::menu(self.list(ListKind::Edit))
            }
            Callback::Edit(name) => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_EDIT);
                }
                if !self.store.load().contains(name) {
                    return Outcome::menu(self.not_found(user));
                }
                let name = name.to_string();
                let reply = ask_new_location(&name);
                Outcome::new(ChatState::EditingLocation { name }, reply)
            }
            Callback::DeleteList => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_DELETE);
                }
                Outcome::menu(self.list(ListKind::Delete))
            }
            Callback::Delete(name) => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_DELETE);
                }
                Outcome::menu(self.delete(user, name))
            }
            Callback::ViewList => Outcome::menu(self.list(ListKind::View)),
            Callback::View(name) => Outcome::menu(self.details(user, name)),
            Callback::Recommend => Outcome::menu(self.recommend()),
            Callback::Cancel => Outcome::menu(self.main_menu(user, text::MAIN_MENU)),
            Callback::Rate(arg) => match (state, arg.parse::<Rating>()) {
                (ChatState::WaitingForRating { name }, Ok(rating)) => {
                    Outcome::menu(self.rate(user, name, rating))
                }
                _ => {
                    if !self.store.load().contains(arg) {
                        return Outcome::menu(self.not_found(user));
                    }
                    let name = arg.to_string();
                    let reply = ask_rating(&name);
                    Outcome::new(ChatState::WaitingForRating { name }, reply)
                }
            },
        }
    }

    fn on_text(&self, user: u64, state: &ChatState, reply: &str) -> Outcome {
        let reply = reply.trim();
        match state {
            ChatState::AddingName => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_ADD);
                }
                if reply.is_empty() {
                    return self.reprompt(user, state);
                }
                if reply.len() > MAX_NAME_BYTES {
                    let hint = Reply::new(text::NAME_TOO_LONG).keyboard(vec![back(tag::CANCEL)]);
                    return Outcome::new(ChatState::AddingName, hint);
                }
                Outcome::new(
                    ChatState::AddingLocation {
                        name: reply.to_string(),
                    },
                    ask_location(),
                )
            }
            ChatState::AddingLocation { name } => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_ADD);
                }
                if reply.is_empty() {
                    return self.reprompt(user, state);
                }
                Outcome::menu(self.add(user, name, reply))
            }
            ChatState::EditingLocation { name } => {
                if !self.is_admin(user) {
                    return self.deny(user, text::DENY_EDIT);
                }
                if reply.is_empty() {
                    return self.reprompt(user, state);
                }
                Outcome::menu(self.edit(user, name, reply))
            }
            _ => self.reprompt(user, state),
        }
    }

    /// Shows the screen the user is already on again.
    fn reprompt(&self, user: u64, state: &ChatState) -> Outcome {
        let reply = match state {
            ChatState::Stopped => return Outcome::ignore(state),
            ChatState::SelectingAction => self.main_menu(user, text::CHOOSE),
            ChatState::AddingName => ask_name(),
            ChatState::AddingLocation { .. } => ask_location(),
            ChatState::EditingLocation { name } => ask_new_location(name),
            ChatState::WaitingForRating { name } => ask_rating(name),
        };
        Outcome::new(state.clone(), reply)
    }

    fn deny(&self, user: u64, message: &str) -> Outcome {
        tracing::warn!("user {user} is not allowed to do that: {message}");
        Outcome::menu(Reply::new(message).keyboard(vec![back(tag::CANCEL)]))
    }

    fn not_found(&self, user: u64) -> Reply {
        self.main_menu(user, text::NOT_FOUND)
    }

    fn main_menu(&self, user: u64, message: &str) -> Reply {
        let mut keyboard = vec![
            vec![btn("📋 Restoranlarni ko'rish", tag::VIEW_RESTAURANTS)],
            vec![btn("⭐ Tavsiya etilgan restoranlar", tag::RECOMMEND_RESTAURANTS)],
        ];
        if self.is_admin(user) {
            keyboard.push(vec![btn("🍽️ Restoran qo'shish", tag::ADD_RESTAURANT)]);
            keyboard.push(vec![btn("✏️ Restoranni tahrirlash", tag::EDIT_RESTAURANT)]);
            keyboard.push(vec![btn("🗑️ Restoranni o'chirish", tag::DELETE_RESTAURANT)]);
        }
        Reply::new(message).keyboard(keyboard)
    }

    fn help(&self, user: u64) -> Reply {
        let mut help = String::from(
            "📖 Yordam:\n\n\
             Bu bot restoranlarni boshqarish va tavsiya qilish uchun ishlatiladi.\n\
             /start - Botni boshlash\n\
             /stop - Botni to'xtatish\n\
             /help - Ushbu yordam xabarini ko'rish\n\
             /search <nom> - Restoranni nomi bo'yicha qidirish\n",
        );
        if self.is_admin(user) {
            help.push_str("/admin - Admin panelini ochish\n");
        }
        Reply::new(help)
    }

    fn list(&self, kind: ListKind) -> Reply {
        let catalogue = self.store.load();
        let (prompt, icon, cb_tag) = match kind {
            ListKind::View => ("Restoranlarni tanlang:", "🍽️", tag::VIEW_RESTAURANT),
            ListKind::Edit => ("Tahrirlash uchun restoran tanlang:", "✏️", tag::EDIT_RESTAURANT),
            ListKind::Delete => (
                "O'chirmoqchi bo'lgan restoranni tanlang:",
                "❌",
                tag::CONFIRM_DELETE,
            ),
        };

        let mut keyboard = catalogue
            .names()
            .map(|name| vec![btn(format!("{icon} {name}"), format!("{cb_tag}:{name}"))])
            .collect::<Vec<_>>();
        keyboard.push(back(tag::CANCEL));

        let message = if catalogue.is_empty() { text::EMPTY } else { prompt };
        Reply::new(message).keyboard(keyboard)
    }

    fn details(&self, user: u64, name: &str) -> Reply {
        let catalogue = self.store.load();
        let Some(rest) = catalogue.get(name) else {
            return Reply::new(text::NOT_FOUND).keyboard(vec![back(tag::VIEW_RESTAURANTS)]);
        };

        let rating = match rest.rating {
            Some(rating) => format!("{rating} ⭐"),
            None => "Baholanmagan".to_string(),
        };
        let info = format!(
            "🍽️ {}\n📍 Manzil: {}\n⭐ Baho: {}\n",
            bold(&escape(name)),
            escape(&rest.location),
            escape(&rating)
        );

        let mut keyboard = vec![vec![btn("⭐ Baholash", format!("{}:{name}", tag::RATE))]];
        if self.is_admin(user) {
            keyboard.push(vec![btn(
                "❌ O'chirish",
                format!("{}:{name}", tag::CONFIRM_DELETE),
            )]);
        }
        keyboard.push(back(tag::VIEW_RESTAURANTS));
        Reply::new(info).keyboard(keyboard).markdown()
    }

    fn recommend(&self) -> Reply {
        let catalogue = self.store.load();
        let keyboard = vec![back(tag::CANCEL)];
        if catalogue.is_empty() {
            return Reply::new(text::EMPTY).keyboard(keyboard);
        }

        let rated = catalogue.recommended();
        if rated.is_empty() {
            return Reply::new(text::NOTHING_RATED).keyboard(keyboard);
        }

        let list = rated
            .into_iter()
            .fold(String::from("⭐ Tavsiya etilgan restoranlar:\n\n"), |sum, (name, rest, rating)| {
                format!(
                    "{sum}🏆 {} \\- {rating}⭐\n📍 Manzil: {}\n\n",
                    bold(&escape(name)),
                    escape(&rest.location)
                )
            });
        Reply::new(list).keyboard(keyboard).markdown()
    }

    fn search(&self, pattern: &str) -> Reply {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Reply::new(text::SEARCH_USAGE).keyboard(vec![back(tag::CANCEL)]);
        }

        let catalogue = self.store.load();
        let mut keyboard = catalogue
            .search(pattern)
            .into_iter()
            .map(|name| {
                vec![btn(
                    format!("🍽️ {name}"),
                    format!("{}:{name}", tag::VIEW_RESTAURANT),
                )]
            })
            .collect::<Vec<_>>();
        let message = if keyboard.is_empty() {
            text::EMPTY
        } else {
            "Qidiruv natijalari:"
        };
        keyboard.push(back(tag::CANCEL));
        Reply::new(message).keyboard(keyboard)
    }

    fn add(&self, user: u64, name: &str, location: &str) -> Reply {
        let mut catalogue = self.store.load();
        catalogue.insert(name, Restaurant::new(location));
        self.store.save(&catalogue);
        tracing::info!("user {user} added restaurant {name:?}");

        self.main_menu(
            user,
            &format!("Restoran muvaffaqiyatli qo'shildi!\n\n📝 Nomi: {name}\n📍 Manzil: {location}"),
        )
    }

    fn edit(&self, user: u64, name: &str, location: &str) -> Reply {
        let mut catalogue = self.store.load();
        if !catalogue.set_location(name, location) {
            return self.not_found(user);
        }
        self.store.save(&catalogue);
        tracing::info!("user {user} moved restaurant {name:?} to {location:?}");

        self.main_menu(
            user,
            &format!(
                "Restoran muvaffaqiyatli tahrirlandi!\n\n📝 Nomi: {name}\n📍 Yangi manzil: {location}"
            ),
        )
    }

    fn delete(&self, user: u64, name: &str) -> Reply {
        let mut catalogue = self.store.load();
        if catalogue.remove(name).is_none() {
            return self.not_found(user);
        }
        self.store.save(&catalogue);
        tracing::info!("user {user} deleted restaurant {name:?}");

        self.main_menu(user, &format!("'{name}' restoran muvaffaqiyatli o'chirildi!"))
    }

    fn rate(&self, user: u64, name: &str, rating: Rating) -> Reply {
        let mut catalogue = self.store.load();
        if !catalogue.rate(name, rating) {
            return self.not_found(user);
        }
        self.store.save(&catalogue);
        tracing::info!("user {user} rated restaurant {name:?} with {rating}");

        self.main_menu(user, &format!("'{name}' restoran {rating}⭐ bilan baholandi!"))
    }
}

fn ask_name() -> Reply {
    Reply::new(text::ASK_NAME).keyboard(vec![back(tag::CANCEL)])
}

fn ask_location() -> Reply {
    Reply::new(text::ASK_LOCATION).keyboard(vec![back(tag::CANCEL)])
}

fn ask_new_location(name: &str) -> Reply {
    Reply::new(format!("'{name}' restorani uchun yangi joylashuvni kiriting:"))
        .keyboard(vec![back(tag::CANCEL)])
}

fn ask_rating(name: &str) -> Reply {
    let stars = Rating::all()
        .map(|r| btn(format!("{r}⭐"), format!("{}:{r}", tag::RATE)))
        .collect();
    Reply::new(format!("'{name}' restorani uchun 1 dan 5 gacha baho bering:"))
        .keyboard(vec![stars, back(tag::CANCEL)])
}
