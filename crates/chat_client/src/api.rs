//! Backend REST client: login, registration, friends and chats.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::chats::{Chat, FriendsList, NewChat};
use crate::error::{ChatError, Result};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ChatsResponse {
    #[serde(default)]
    chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
struct CreatedChat {
    chat_id: String,
}

/// HTTP client bound to one backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Every request made through this client gives up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Response(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /api/auth/login`. Returns the session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ChatError::AuthRejected {
                status: resp.status().as_u16(),
            });
        }
        let body: LoginResponse = resp.json().await?;
        Ok(body.token)
    }

    /// `POST /api/auth/register`.
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": password, "email": email }))
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(ChatError::UsernameTaken),
            status => Err(ChatError::Rejected {
                status: status.as_u16(),
            }),
        }
    }

    pub async fn friends(&self, token: &str) -> Result<FriendsList> {
        let resp = self
            .http
            .get(self.url("/api/friends"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(expect_ok(resp)?.json().await?)
    }

    pub async fn add_friend(&self, token: &str, username: &str) -> Result<()> {
        self.post_ok(token, "/api/friends/add", json!({ "username": username }))
            .await
    }

    pub async fn accept_friend(&self, token: &str, username: &str) -> Result<()> {
        self.post_ok(token, "/api/friends/accept", json!({ "username": username }))
            .await
    }

    pub async fn delete_friend(&self, token: &str, username: &str) -> Result<()> {
        self.post_ok(token, "/api/friends/delete", json!({ "username": username }))
            .await
    }

    pub async fn chats(&self, token: &str) -> Result<Vec<Chat>> {
        let resp = self
            .http
            .get(self.url("/api/chats"))
            .bearer_auth(token)
            .send()
            .await?;
        let body: ChatsResponse = expect_ok(resp)?.json().await?;
        Ok(body.chats)
    }

    /// `POST /api/chats/create`. Returns the new chat id.
    pub async fn create_chat(&self, token: &str, chat: &NewChat) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/api/chats/create"))
            .bearer_auth(token)
            .json(chat)
            .send()
            .await?;
        let body: CreatedChat = expect_ok(resp)?.json().await?;
        Ok(body.chat_id)
    }

    pub async fn delete_chat(&self, token: &str, chat_id: &str) -> Result<()> {
        self.delete_ok(token, &format!("/api/chats/delete/{chat_id}"))
            .await
    }

    pub async fn add_group_member(&self, token: &str, chat_id: &str, username: &str) -> Result<()> {
        self.post_ok(
            token,
            "/api/chats/group/add-member",
            json!({ "chat_id": chat_id, "username": username }),
        )
        .await
    }

    pub async fn remove_group_member(&self, token: &str, chat_id: &str, username: &str) -> Result<()> {
        self.post_ok(
            token,
            "/api/chats/group/remove-member",
            json!({ "chat_id": chat_id, "username": username }),
        )
        .await
    }

    pub async fn rename_group(&self, token: &str, chat_id: &str, new_name: &str) -> Result<()> {
        self.post_ok(
            token,
            "/api/chats/group/rename",
            json!({ "chat_id": chat_id, "new_name": new_name }),
        )
        .await
    }

    pub async fn delete_group(&self, token: &str, chat_id: &str) -> Result<()> {
        self.delete_ok(token, &format!("/api/chats/group/delete/{chat_id}"))
            .await
    }

    pub async fn transfer_admin(&self, token: &str, chat_id: &str, new_admin: &str) -> Result<()> {
        self.post_ok(
            token,
            "/api/chats/group/transfer-admin",
            json!({ "chat_id": chat_id, "new_admin": new_admin }),
        )
        .await
    }

    async fn post_ok(&self, token: &str, path: &str, body: serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        expect_ok(resp).map(|_| ())
    }

    async fn delete_ok(&self, token: &str, path: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        expect_ok(resp).map(|_| ())
    }
}

fn expect_ok(resp: Response) -> Result<Response> {
    if resp.status() == StatusCode::OK {
        Ok(resp)
    } else {
        Err(ChatError::Rejected {
            status: resp.status().as_u16(),
        })
    }
}
