use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// Everything the backend rejects or the transport drops ends up as one of
/// these, so callers can tell authorization failures apart from the rest.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("api: unauthorized")]
    Unauthorized,
    #[error("api: forbidden")]
    Forbidden,
    #[error("api: error {status}: {body}")]
    Status { status: u16, body: String },
}

pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

// encodeURIComponent-ish set for a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%')
    .add(b'&')
    .add(b'+');

impl Client {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api: client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            token_provider,
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn list_posts(&self) -> Result<Vec<Post>> {
        self.get_json("api/posts")
    }

    pub fn create_post(&self, post: &NewPost) -> Result<()> {
        self.request(Method::POST, "api/posts/create", Some(serde_json::to_value(post)?))?;
        Ok(())
    }

    pub fn delete_post(&self, post_id: i64) -> Result<()> {
        self.request(Method::DELETE, &format!("api/posts/{}", post_id), None)?;
        Ok(())
    }

    pub fn like_post(&self, post_id: i64) -> Result<()> {
        self.request(
            Method::POST,
            &format!("api/posts/{}/like", post_id),
            Some(json!({})),
        )?;
        Ok(())
    }

    pub fn unlike_post(&self, post_id: i64) -> Result<()> {
        self.request(
            Method::POST,
            &format!("api/posts/{}/unlike", post_id),
            Some(json!({})),
        )?;
        Ok(())
    }

    pub fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.get_json(&format!("api/comments/post/{}", post_id))
    }

    pub fn comment_count(&self, post_id: i64) -> Result<i64> {
        self.get_json(&format!("api/comments/post/{}/count", post_id))
    }

    pub fn create_comment(&self, comment: &NewComment) -> Result<()> {
        self.request(
            Method::POST,
            "api/comments",
            Some(serde_json::to_value(comment)?),
        )?;
        Ok(())
    }

    pub fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.request(Method::DELETE, &format!("api/comments/{}", comment_id), None)?;
        Ok(())
    }

    pub fn like_comment(&self, comment_id: i64) -> Result<()> {
        self.request(
            Method::POST,
            &format!("api/comments/{}/like", comment_id),
            Some(json!({})),
        )?;
        Ok(())
    }

    pub fn unlike_comment(&self, comment_id: i64) -> Result<()> {
        self.request(
            Method::POST,
            &format!("api/comments/{}/unlike", comment_id),
            Some(json!({})),
        )?;
        Ok(())
    }

    pub fn lookup_user(&self, identifier: &str) -> Result<UserProfile> {
        let encoded = utf8_percent_encode(identifier, SEGMENT).to_string();
        self.get_json(&format!("api/user/{}", encoded))
    }

    fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resp = self.request(Method::GET, path, None)?;
        resp.json()
            .with_context(|| format!("api: decode response for {}", path))
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Response> {
        let token = self.token_provider.bearer_token()?;
        let url = self.base_url.join(path)?;

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json");
            req = req.json(&body);
        }

        let resp = req.send().with_context(|| format!("api: request {}", path))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                401 => bail!(ApiError::Unauthorized),
                403 => bail!(ApiError::Forbidden),
                _ => bail!(ApiError::Status {
                    status: status.as_u16(),
                    body,
                }),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Body for post creation. Identity and timestamps are server-assigned;
/// the backend defaults `likesCount` but the original client sent 0.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub user_id: Option<i64>,
    pub content: String,
    pub image: Option<String>,
    pub likes_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub content: String,
    pub likes_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}
