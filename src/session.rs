use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, MutexGuard},
};

use crate::bot::{ChatState, Outcome, Reply};

/// One user inside one chat. In a group every member has their own
/// conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat: i64,
    pub user: u64,
}

impl SessionKey {
    pub fn new(chat: i64, user: u64) -> Self {
        Self { chat, user }
    }
}

/// Conversation state of every active user. Users who never started, or who
/// stopped, have no entry and read as [`ChatState::Stopped`]. Nothing here is
/// persisted.
#[derive(Debug, Default)]
pub struct Sessions(Mutex<HashMap<SessionKey, ChatState>>);

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, ChatState>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: SessionKey) -> ChatState {
        self.lock().get(&key).cloned().unwrap_or_default()
    }

    pub fn set(&self, key: SessionKey, state: ChatState) {
        let mut sessions = self.lock();
        match state {
            ChatState::Stopped => {
                sessions.remove(&key);
            }
            state => {
                sessions.insert(key, state);
            }
        }
    }

    /// Hands the reply to `deliver` and stores the new state only if that
    /// worked. On failure the session stays where it was.
    pub async fn commit<F, Fut, E>(
        &self,
        key: SessionKey,
        outcome: Outcome,
        deliver: F,
    ) -> Result<(), E>
    where
        F: FnOnce(Reply) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        if let Some(reply) = outcome.reply {
            deliver(reply).await?;
        }
        self.set(key, outcome.state);
        Ok(())
    }

    /// How many users are mid-conversation.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        bot::{tag, text, Action, Controller},
        config::AdminSet,
        db::{CatalogueStore, MemoryStore},
    };

    const GROUP: i64 = -100200300;
    const ALICE: u64 = 11;
    const BOB: u64 = 22;
    const GUEST: u64 = 33;

    /// Runs one action for `user` in `chat` and keeps the resulting state.
    fn act(bot: &Controller, sessions: &Sessions, key: SessionKey, action: Action) -> String {
        let outcome = bot.handle(key.user, &sessions.get(key), action);
        sessions.set(key, outcome.state);
        outcome.reply.map(|r| r.text).unwrap_or_default()
    }

    #[test]
    fn test_unknown_user_is_stopped() {
        let sessions = Sessions::new();
        assert_eq!(sessions.get(SessionKey::new(1, 2)), ChatState::Stopped);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_stop_removes_entry() {
        let sessions = Sessions::new();
        let key = SessionKey::new(1, 2);
        sessions.set(key, ChatState::AddingName);
        assert_eq!(sessions.len(), 1);
        sessions.set(key, ChatState::Stopped);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_group_members_do_not_share_state() {
        let store = Arc::new(MemoryStore::default());
        let admins: AdminSet = [ALICE, BOB].into_iter().collect();
        let bot = Controller::new(store.clone(), admins);
        let sessions = Sessions::new();
        let (alice, bob, guest) = (
            SessionKey::new(GROUP, ALICE),
            SessionKey::new(GROUP, BOB),
            SessionKey::new(GROUP, GUEST),
        );

        act(&bot, &sessions, alice, Action::Start);
        act(&bot, &sessions, alice, Action::Button(tag::ADD_RESTAURANT.into()));
        act(&bot, &sessions, alice, Action::Text("Cafe X".into()));

        // another admin and a guest talk in between
        act(&bot, &sessions, bob, Action::Start);
        let reply = act(&bot, &sessions, bob, Action::Text("hello".into()));
        assert_eq!(reply, text::CHOOSE);
        act(&bot, &sessions, guest, Action::Start);
        act(&bot, &sessions, guest, Action::Text("salom".into()));

        assert_eq!(
            sessions.get(alice),
            ChatState::AddingLocation {
                name: "Cafe X".into()
            }
        );
        assert_eq!(store.saves(), 0);

        act(&bot, &sessions, alice, Action::Text("Main St".into()));
        let catalogue = store.load();
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.get("Cafe X").unwrap().location, "Main St");
        assert_eq!(sessions.get(alice), ChatState::SelectingAction);
        assert_eq!(sessions.get(bob), ChatState::SelectingAction);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_state() {
        let store = Arc::new(MemoryStore::default());
        let bot = Controller::new(store, [ALICE].into_iter().collect());
        let sessions = Sessions::new();
        let key = SessionKey::new(GROUP, ALICE);
        sessions.set(key, ChatState::SelectingAction);

        let add = Action::Button(tag::ADD_RESTAURANT.into());
        let outcome = bot.handle(ALICE, &sessions.get(key), add);
        let failed = sessions
            .commit(key, outcome.clone(), |_| async { Err("network down") })
            .await;
        assert!(failed.is_err());
        assert_eq!(sessions.get(key), ChatState::SelectingAction);

        let delivered = sessions
            .commit(key, outcome, |_| async { Ok::<_, &str>(()) })
            .await;
        assert!(delivered.is_ok());
        assert_eq!(sessions.get(key), ChatState::AddingName);
    }

    #[tokio::test]
    async fn test_ignored_action_still_commits() {
        let sessions = Sessions::new();
        let key = SessionKey::new(GROUP, BOB);
        sessions.set(key, ChatState::AddingName);
        let outcome = Outcome {
            state: ChatState::Stopped,
            reply: None,
        };
        let res = sessions
            .commit(key, outcome, |_| async { Err::<(), _>("unreachable") })
            .await;
        assert!(res.is_ok());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_same_user_in_two_chats() {
        let sessions = Sessions::new();
        let private = SessionKey::new(ALICE as i64, ALICE);
        let group = SessionKey::new(GROUP, ALICE);
        sessions.set(private, ChatState::AddingName);
        assert_eq!(sessions.get(group), ChatState::Stopped);
    }
}
