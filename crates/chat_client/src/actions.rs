//! Fire-and-forget backend calls made on behalf of the user.
//!
//! Each call runs on its own task, never on the consumer tick, and reports
//! back through the inbound queue: one notice, plus a refreshed friends or
//! chats list where the backend state changed.

use std::future::Future;

use crate::api::ApiClient;
use crate::chats::{Chat, NewChat};
use crate::connection::{spawn_chats_load, spawn_friends_load, ConnectionManager};
use crate::error::Result;
use crate::messages::Inbound;
use crate::notice::Notice;

/// What to fetch again after a successful call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reload {
    Friends,
    Chats,
}

impl ConnectionManager {
    /// Re-fetch the friends list. False without a token.
    pub fn refresh_friends(&self) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        spawn_friends_load(&self.api, &token, &self.inbound);
        true
    }

    /// Re-fetch the chat list. False without a token.
    pub fn refresh_chats(&self) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        spawn_chats_load(&self.api, &token, &self.inbound);
        true
    }

    pub fn add_friend(&self, username: &str) -> bool {
        let username = username.to_string();
        self.spawn_call("Request sent!", "Error sending request", Reload::Friends, move |api, token| async move {
            api.add_friend(&token, &username).await
        })
    }

    pub fn accept_friend(&self, username: &str) -> bool {
        let username = username.to_string();
        self.spawn_call("Accepted!", "Error accepting request", Reload::Friends, move |api, token| async move {
            api.accept_friend(&token, &username).await
        })
    }

    pub fn delete_friend(&self, username: &str) -> bool {
        let username = username.to_string();
        self.spawn_call("Friend deleted", "Error deleting friend", Reload::Friends, move |api, token| async move {
            api.delete_friend(&token, &username).await
        })
    }

    pub fn delete_chat(&self, chat_id: &str) -> bool {
        let chat_id = chat_id.to_string();
        let removed = chat_id.clone();
        let inbound = self.inbound.clone();
        self.spawn_call("Chat deleted", "Error deleting chat", Reload::Chats, move |api, token| async move {
            api.delete_chat(&token, &chat_id).await?;
            inbound.push(Inbound::ChatRemoved(removed));
            Ok(())
        })
    }

    pub fn add_group_member(&self, chat_id: &str, username: &str) -> bool {
        let (chat_id, username) = (chat_id.to_string(), username.to_string());
        let success = format!("Added {username} to group");
        self.spawn_call(success, "Error adding member", Reload::Chats, move |api, token| async move {
            api.add_group_member(&token, &chat_id, &username).await
        })
    }

    pub fn remove_group_member(&self, chat_id: &str, username: &str) -> bool {
        let (chat_id, username) = (chat_id.to_string(), username.to_string());
        let success = format!("Removed {username} from group");
        self.spawn_call(success, "Error removing member", Reload::Chats, move |api, token| async move {
            api.remove_group_member(&token, &chat_id, &username).await
        })
    }

    pub fn rename_group(&self, chat_id: &str, new_name: &str) -> bool {
        let (chat_id, new_name) = (chat_id.to_string(), new_name.to_string());
        let success = format!("Group renamed to {new_name}");
        self.spawn_call(success, "Error renaming group", Reload::Chats, move |api, token| async move {
            api.rename_group(&token, &chat_id, &new_name).await
        })
    }

    pub fn delete_group(&self, chat_id: &str) -> bool {
        let chat_id = chat_id.to_string();
        let removed = chat_id.clone();
        let inbound = self.inbound.clone();
        self.spawn_call("Group deleted", "Error deleting group", Reload::Chats, move |api, token| async move {
            api.delete_group(&token, &chat_id).await?;
            inbound.push(Inbound::ChatRemoved(removed));
            Ok(())
        })
    }

    pub fn transfer_admin(&self, chat_id: &str, new_admin: &str) -> bool {
        let (chat_id, new_admin) = (chat_id.to_string(), new_admin.to_string());
        let success = format!("Transferred admin to {new_admin}");
        self.spawn_call(success, "Error transferring admin", Reload::Chats, move |api, token| async move {
            api.transfer_admin(&token, &chat_id, &new_admin).await
        })
    }

    /// Create a chat. The catalog learns it through `Inbound::ChatCreated`
    /// before the full reload arrives.
    pub fn create_chat(&self, chat: NewChat, me: &str) -> bool {
        let inbound = self.inbound.clone();
        let me = me.to_string();
        self.spawn_call("Chat created", "Error creating chat", Reload::Chats, move |api, token| async move {
            let chat_id = api.create_chat(&token, &chat).await?;
            let admin = chat.name.as_ref().map(|_| me.clone());
            let mut participants = chat.participants;
            if !participants.contains(&me) {
                participants.push(me);
            }
            inbound.push(Inbound::ChatCreated(Chat {
                chat_id,
                kind: chat.kind,
                participants,
                admin,
                name: chat.name,
                last_message_time: None,
                unread_count: 0,
            }));
            Ok(())
        })
    }

    /// Register a new account. Needs no token.
    pub fn register(&self, username: &str, password: &str, email: &str) {
        let api = self.api.clone();
        let inbound = self.inbound.clone();
        let (username, password, email) = (username.to_string(), password.to_string(), email.to_string());
        tokio::spawn(async move {
            let notice = match api.register(&username, &password, &email).await {
                Ok(()) => Notice::Info(format!("Account created! Welcome {username}")),
                Err(crate::error::ChatError::UsernameTaken) => Notice::Failure("Username taken".into()),
                Err(e) if e.is_transient() => Notice::Failure("Cannot reach server".into()),
                Err(e) => {
                    tracing::warn!(error = %e, "registration failed");
                    Notice::Failure("Registration failed".into())
                }
            };
            inbound.push(Inbound::Notice(notice));
        });
    }

    fn spawn_call<F, Fut>(
        &self,
        success: impl Into<String>,
        failure: &'static str,
        reload: Reload,
        call: F,
    ) -> bool
    where
        F: FnOnce(ApiClient, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(token) = self.token() else {
            return false;
        };
        let api = self.api.clone();
        let inbound = self.inbound.clone();
        let success = success.into();
        tokio::spawn(async move {
            match call(api.clone(), token.clone()).await {
                Ok(()) => {
                    inbound.push(Inbound::Notice(Notice::Info(success)));
                    match reload {
                        Reload::Friends => spawn_friends_load(&api, &token, &inbound),
                        Reload::Chats => spawn_chats_load(&api, &token, &inbound),
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "backend call failed");
                    inbound.push(Inbound::Notice(Notice::Failure("Connection error".into())));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "backend call rejected");
                    inbound.push(Inbound::Notice(Notice::Failure(failure.into())));
                }
            }
        });
        true
    }
}
