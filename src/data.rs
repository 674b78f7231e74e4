use anyhow::{Context, Result};
use std::sync::Arc;

use crate::api;

pub trait FeedService: Send + Sync {
    fn list_posts(&self) -> Result<Vec<api::Post>>;
    fn create_post(&self, post: &api::NewPost) -> Result<()>;
    fn delete_post(&self, post_id: i64) -> Result<()>;
    fn like_post(&self, post_id: i64) -> Result<()>;
    fn unlike_post(&self, post_id: i64) -> Result<()>;
}

pub trait CommentService: Send + Sync {
    fn list_comments(&self, post_id: i64) -> Result<Vec<api::Comment>>;
    fn comment_count(&self, post_id: i64) -> Result<i64>;
    fn create_comment(&self, comment: &api::NewComment) -> Result<()>;
    fn delete_comment(&self, comment_id: i64) -> Result<()>;
    fn like_comment(&self, comment_id: i64) -> Result<()>;
    fn unlike_comment(&self, comment_id: i64) -> Result<()>;
}

pub trait UserService: Send + Sync {
    fn lookup_user(&self, identifier: &str) -> Result<api::UserProfile>;
}

pub struct RestFeedService {
    client: Arc<api::Client>,
}

impl RestFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for RestFeedService {
    fn list_posts(&self) -> Result<Vec<api::Post>> {
        self.client.list_posts().context("fetch posts")
    }

    fn create_post(&self, post: &api::NewPost) -> Result<()> {
        self.client.create_post(post).context("create post")
    }

    fn delete_post(&self, post_id: i64) -> Result<()> {
        self.client.delete_post(post_id).context("delete post")
    }

    fn like_post(&self, post_id: i64) -> Result<()> {
        self.client.like_post(post_id).context("like post")
    }

    fn unlike_post(&self, post_id: i64) -> Result<()> {
        self.client.unlike_post(post_id).context("unlike post")
    }
}

pub struct RestCommentService {
    client: Arc<api::Client>,
}

impl RestCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RestCommentService {
    fn list_comments(&self, post_id: i64) -> Result<Vec<api::Comment>> {
        self.client.list_comments(post_id).context("fetch comments")
    }

    fn comment_count(&self, post_id: i64) -> Result<i64> {
        self.client
            .comment_count(post_id)
            .context("fetch comment count")
    }

    fn create_comment(&self, comment: &api::NewComment) -> Result<()> {
        self.client.create_comment(comment).context("create comment")
    }

    fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.client
            .delete_comment(comment_id)
            .context("delete comment")
    }

    fn like_comment(&self, comment_id: i64) -> Result<()> {
        self.client.like_comment(comment_id).context("like comment")
    }

    fn unlike_comment(&self, comment_id: i64) -> Result<()> {
        self.client
            .unlike_comment(comment_id)
            .context("unlike comment")
    }
}

pub struct RestUserService {
    client: Arc<api::Client>,
}

impl RestUserService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UserService for RestUserService {
    fn lookup_user(&self, identifier: &str) -> Result<api::UserProfile> {
        self.client.lookup_user(identifier).context("lookup user")
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn list_posts(&self) -> Result<Vec<api::Post>> {
        Ok(vec![api::Post {
            post_id: 1,
            user_id: 1,
            content: "Welcome to Flock. This sample post is served locally.".into(),
            image: None,
            likes_count: 0,
            created_at: None,
            updated_at: None,
        }])
    }

    fn create_post(&self, _post: &api::NewPost) -> Result<()> {
        Ok(())
    }

    fn delete_post(&self, _post_id: i64) -> Result<()> {
        Ok(())
    }

    fn like_post(&self, _post_id: i64) -> Result<()> {
        Ok(())
    }

    fn unlike_post(&self, _post_id: i64) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn list_comments(&self, post_id: i64) -> Result<Vec<api::Comment>> {
        Ok(vec![api::Comment {
            comment_id: 1,
            post_id,
            user_id: 1,
            content: "Comments are unavailable in this mock response.".into(),
            likes_count: 0,
            created_at: None,
        }])
    }

    fn comment_count(&self, _post_id: i64) -> Result<i64> {
        Ok(1)
    }

    fn create_comment(&self, _comment: &api::NewComment) -> Result<()> {
        Ok(())
    }

    fn delete_comment(&self, _comment_id: i64) -> Result<()> {
        Ok(())
    }

    fn like_comment(&self, _comment_id: i64) -> Result<()> {
        Ok(())
    }

    fn unlike_comment(&self, _comment_id: i64) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockUserService;

impl UserService for MockUserService {
    fn lookup_user(&self, identifier: &str) -> Result<api::UserProfile> {
        Ok(api::UserProfile {
            user_id: 1,
            username: identifier.to_string(),
            email: String::new(),
        })
    }
}
