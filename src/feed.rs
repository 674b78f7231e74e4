use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use crate::api;
use crate::confirm::{Gate, PendingAction};
use crate::data::{CommentService, FeedService, UserService};
use crate::identity::Claims;

/// Image selected for the compose form. Encoded to a `data:` URL at
/// submission time, which is the transport form the backend stores.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageAttachment {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Empty,
    Loading,
    Loaded,
}

/// Outcome of a gateway call, reported back from a worker thread. Refetch
/// snapshots carry the sequence number allocated when the gesture fired;
/// anything older than the last applied snapshot for its entity class is
/// dropped on arrival.
enum GatewayResponse {
    Posts {
        seq: u64,
        result: Result<Vec<api::Post>>,
    },
    Comments {
        seq: u64,
        post_id: i64,
        result: Result<Vec<api::Comment>>,
    },
    CommentCount {
        seq: u64,
        post_id: i64,
        result: Result<i64>,
    },
    PostCreated {
        result: Result<()>,
    },
    CommentCreated {
        post_id: i64,
        result: Result<()>,
    },
    PostDeleted {
        post_id: i64,
        result: Result<()>,
    },
    CommentDeleted {
        comment_id: i64,
        result: Result<()>,
    },
    PostLikeToggled {
        post_id: i64,
        result: Result<()>,
    },
    CommentLikeToggled {
        comment_id: i64,
        result: Result<()>,
    },
    UserResolved {
        result: Result<api::UserProfile>,
    },
}

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub comment_service: Arc<dyn CommentService>,
    pub user_service: Arc<dyn UserService>,
    pub claims: Option<Claims>,
}

/// In-memory view of the feed: posts, per-post comment threads, like flags,
/// panel visibility, and drafts. The backend owns every persisted field;
/// this model mirrors it through optimistic local updates followed by
/// authoritative refetches.
pub struct FeedModel {
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    user_service: Arc<dyn UserService>,
    claims: Option<Claims>,
    current_user_id: Option<i64>,
    phase: FeedPhase,
    posts: Vec<api::Post>,
    comments: HashMap<i64, Vec<api::Comment>>,
    comment_counts: HashMap<i64, i64>,
    liked_posts: HashMap<i64, bool>,
    liked_comments: HashMap<i64, bool>,
    open_panels: HashMap<i64, bool>,
    drafts: HashMap<i64, String>,
    compose_content: String,
    compose_image: Option<ImageAttachment>,
    gate: Gate,
    response_tx: Sender<GatewayResponse>,
    response_rx: Receiver<GatewayResponse>,
    next_seq: u64,
    applied_feed_seq: u64,
    applied_comments_seq: HashMap<i64, u64>,
    applied_count_seq: HashMap<i64, u64>,
    pending_comments: HashMap<i64, u64>,
    closed: bool,
}

impl FeedModel {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let current_user_id = options.claims.as_ref().and_then(|claims| claims.user_id);
        Self {
            feed_service: options.feed_service,
            comment_service: options.comment_service,
            user_service: options.user_service,
            claims: options.claims,
            current_user_id,
            phase: FeedPhase::Empty,
            posts: Vec::new(),
            comments: HashMap::new(),
            comment_counts: HashMap::new(),
            liked_posts: HashMap::new(),
            liked_comments: HashMap::new(),
            open_panels: HashMap::new(),
            drafts: HashMap::new(),
            compose_content: String::new(),
            compose_image: None,
            gate: Gate::new(),
            response_tx,
            response_rx,
            next_seq: 0,
            applied_feed_seq: 0,
            applied_comments_seq: HashMap::new(),
            applied_count_seq: HashMap::new(),
            pending_comments: HashMap::new(),
            closed: false,
        }
    }

    /// Mount-time work: resolve the acting user from the token claims and
    /// pull the initial feed.
    pub fn mount(&mut self) {
        self.resolve_user();
        self.load_feed();
    }

    // ---- gestures ----------------------------------------------------

    /// Fetch all posts. The server returns creation order; the snapshot is
    /// reversed on apply so the newest post displays first. Applying a feed
    /// snapshot fans out one comment-count fetch per post.
    pub fn load_feed(&mut self) {
        let seq = self.alloc_seq();
        if self.phase == FeedPhase::Empty {
            self.phase = FeedPhase::Loading;
        }
        let feed = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = feed.list_posts();
            let _ = tx.send(GatewayResponse::Posts { seq, result });
        });
    }

    /// Look up the acting user's numeric id from the identity claim. The
    /// claim itself is unverified; the resolved id only drives which delete
    /// affordances show and which id goes into request bodies.
    pub fn resolve_user(&mut self) {
        let Some(identifier) = self
            .claims
            .as_ref()
            .and_then(|claims| claims.lookup_identifier())
            .map(str::to_string)
        else {
            return;
        };
        let users = self.user_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = users.lookup_user(&identifier);
            let _ = tx.send(GatewayResponse::UserResolved { result });
        });
    }

    pub fn set_compose_content(&mut self, content: impl Into<String>) {
        self.compose_content = content.into();
    }

    pub fn attach_image(&mut self, image: Option<ImageAttachment>) {
        self.compose_image = image;
    }

    /// Submit the compose form. Whitespace-only content is rejected locally
    /// with no network call. There is no optimistic insert: the post's id
    /// and timestamps are server-assigned, so the model waits for the
    /// authoritative list.
    pub fn create_post(&mut self) {
        if self.compose_content.trim().is_empty() {
            return;
        }
        let body = api::NewPost {
            user_id: self.current_user_id,
            content: self.compose_content.clone(),
            image: self.compose_image.as_ref().map(ImageAttachment::to_data_url),
            likes_count: 0,
        };
        let seq = self.alloc_seq();
        let feed = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = feed.create_post(&body);
            let created = result.is_ok();
            let _ = tx.send(GatewayResponse::PostCreated { result });
            if created {
                let result = feed.list_posts();
                let _ = tx.send(GatewayResponse::Posts { seq, result });
            }
        });
    }

    /// Optimistic like toggle: the flag flips before the request is issued
    /// and is never rolled back on failure. The authoritative count comes
    /// from the follow-up feed refetch.
    pub fn toggle_like(&mut self, post_id: i64) {
        let flag = self.liked_posts.entry(post_id).or_insert(false);
        *flag = !*flag;
        let liked = *flag;
        let seq = self.alloc_seq();
        let feed = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = if liked {
                feed.like_post(post_id)
            } else {
                feed.unlike_post(post_id)
            };
            let toggled = result.is_ok();
            let _ = tx.send(GatewayResponse::PostLikeToggled { post_id, result });
            if toggled {
                let result = feed.list_posts();
                let _ = tx.send(GatewayResponse::Posts { seq, result });
            }
        });
    }

    pub fn toggle_comment_like(&mut self, comment_id: i64, post_id: i64) {
        let flag = self.liked_comments.entry(comment_id).or_insert(false);
        *flag = !*flag;
        let liked = *flag;
        let seq = self.alloc_seq();
        let comments = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = if liked {
                comments.like_comment(comment_id)
            } else {
                comments.unlike_comment(comment_id)
            };
            let toggled = result.is_ok();
            let _ = tx.send(GatewayResponse::CommentLikeToggled { comment_id, result });
            if toggled {
                let result = comments.list_comments(post_id);
                let _ = tx.send(GatewayResponse::Comments {
                    seq,
                    post_id,
                    result,
                });
            }
        });
    }

    /// Flip the comment panel. Expanding fetches the thread only when no
    /// list is cached and no fetch is already in flight; collapsing and
    /// re-expanding never refetches.
    pub fn toggle_comment_panel(&mut self, post_id: i64) {
        let showing = self.open_panels.get(&post_id).copied().unwrap_or(false);
        self.open_panels.insert(post_id, !showing);
        if !showing
            && !self.comments.contains_key(&post_id)
            && !self.pending_comments.contains_key(&post_id)
        {
            self.fetch_comments(post_id);
        }
    }

    pub fn set_draft(&mut self, post_id: i64, text: impl Into<String>) {
        self.drafts.insert(post_id, text.into());
    }

    /// Submit the draft for a post. Whitespace-only drafts are a local
    /// no-op. On confirmed creation the draft clears and the thread and
    /// count for the post are refetched.
    pub fn submit_comment(&mut self, post_id: i64) {
        let draft = self.drafts.get(&post_id).cloned().unwrap_or_default();
        let trimmed = draft.trim();
        if trimmed.is_empty() {
            return;
        }
        let body = api::NewComment {
            post_id,
            user_id: self.current_user_id,
            content: trimmed.to_string(),
            likes_count: 0,
        };
        let comments_seq = self.alloc_seq();
        let count_seq = self.alloc_seq();
        let comments = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = comments.create_comment(&body);
            let created = result.is_ok();
            let _ = tx.send(GatewayResponse::CommentCreated { post_id, result });
            if created {
                let result = comments.list_comments(post_id);
                let _ = tx.send(GatewayResponse::Comments {
                    seq: comments_seq,
                    post_id,
                    result,
                });
                let result = comments.comment_count(post_id);
                let _ = tx.send(GatewayResponse::CommentCount {
                    seq: count_seq,
                    post_id,
                    result,
                });
            }
        });
    }

    // ---- confirmation gate --------------------------------------------

    pub fn request_delete_post(&mut self, post_id: i64) {
        self.gate.request(PendingAction::DeletePost { post_id });
    }

    pub fn request_delete_comment(&mut self, comment_id: i64, post_id: i64) {
        self.gate
            .request(PendingAction::DeleteComment { comment_id, post_id });
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.gate.pending()
    }

    /// Execute whichever destructive action is pending. Deletes are only
    /// reachable through here; a confirm with nothing pending is a no-op.
    pub fn confirm(&mut self) {
        match self.gate.take() {
            Some(PendingAction::DeletePost { post_id }) => self.execute_delete_post(post_id),
            Some(PendingAction::DeleteComment {
                comment_id,
                post_id,
            }) => self.execute_delete_comment(comment_id, post_id),
            None => {}
        }
    }

    pub fn cancel(&mut self) {
        self.gate.cancel();
    }

    fn execute_delete_post(&mut self, post_id: i64) {
        let seq = self.alloc_seq();
        let feed = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = feed.delete_post(post_id);
            let deleted = result.is_ok();
            let _ = tx.send(GatewayResponse::PostDeleted { post_id, result });
            if deleted {
                let result = feed.list_posts();
                let _ = tx.send(GatewayResponse::Posts { seq, result });
            }
        });
    }

    fn execute_delete_comment(&mut self, comment_id: i64, post_id: i64) {
        let comments_seq = self.alloc_seq();
        let count_seq = self.alloc_seq();
        let comments = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = comments.delete_comment(comment_id);
            let deleted = result.is_ok();
            let _ = tx.send(GatewayResponse::CommentDeleted { comment_id, result });
            if deleted {
                let result = comments.list_comments(post_id);
                let _ = tx.send(GatewayResponse::Comments {
                    seq: comments_seq,
                    post_id,
                    result,
                });
                let result = comments.comment_count(post_id);
                let _ = tx.send(GatewayResponse::CommentCount {
                    seq: count_seq,
                    post_id,
                    result,
                });
            }
        });
    }

    // ---- response handling ---------------------------------------------

    /// Drain every response currently queued. Returns how many were handled.
    pub fn process_responses(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_response(message);
            handled += 1;
        }
        handled
    }

    /// Block for at most `timeout` waiting for one response and handle it.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        let rx = self.response_rx.clone();
        match rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_response(message);
                true
            }
            Err(_) => false,
        }
    }

    /// Handle responses until the channel stays quiet for `idle`. Suits a
    /// one-shot driver that wants the model settled before rendering.
    pub fn pump(&mut self, idle: Duration) {
        let rx = self.response_rx.clone();
        while let Ok(message) = rx.recv_timeout(idle) {
            self.handle_response(message);
        }
    }

    /// After close, every late response is discarded. Worker threads may
    /// still be in flight; their results land in a slot nobody reads.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn handle_response(&mut self, message: GatewayResponse) {
        if self.closed {
            return;
        }
        match message {
            GatewayResponse::Posts { seq, result } => match result {
                Ok(mut posts) => {
                    if seq <= self.applied_feed_seq {
                        debug!("discarding stale feed snapshot (seq {})", seq);
                        return;
                    }
                    self.applied_feed_seq = seq;
                    posts.reverse();
                    self.posts = posts;
                    self.phase = FeedPhase::Loaded;
                    self.fetch_comment_counts();
                }
                Err(err) => {
                    warn!("feed refresh failed: {:#}", err);
                    self.phase = if self.posts.is_empty() {
                        FeedPhase::Empty
                    } else {
                        FeedPhase::Loaded
                    };
                }
            },
            GatewayResponse::Comments {
                seq,
                post_id,
                result,
            } => {
                if self.pending_comments.get(&post_id) == Some(&seq) {
                    self.pending_comments.remove(&post_id);
                }
                match result {
                    Ok(list) => {
                        let applied = self
                            .applied_comments_seq
                            .get(&post_id)
                            .copied()
                            .unwrap_or(0);
                        if seq <= applied {
                            debug!(
                                "discarding stale comment snapshot for post {} (seq {})",
                                post_id, seq
                            );
                            return;
                        }
                        self.applied_comments_seq.insert(post_id, seq);
                        self.comments.insert(post_id, list);
                    }
                    Err(err) => warn!("comment refresh for post {} failed: {:#}", post_id, err),
                }
            }
            GatewayResponse::CommentCount {
                seq,
                post_id,
                result,
            } => match result {
                Ok(count) => {
                    let applied = self.applied_count_seq.get(&post_id).copied().unwrap_or(0);
                    if seq <= applied {
                        return;
                    }
                    self.applied_count_seq.insert(post_id, seq);
                    self.comment_counts.insert(post_id, count);
                }
                Err(err) => warn!("comment count for post {} failed: {:#}", post_id, err),
            },
            GatewayResponse::PostCreated { result } => match result {
                Ok(()) => {
                    self.compose_content.clear();
                    self.compose_image = None;
                }
                Err(err) => warn!("post creation failed: {:#}", err),
            },
            GatewayResponse::CommentCreated { post_id, result } => match result {
                Ok(()) => {
                    self.drafts.remove(&post_id);
                }
                Err(err) => warn!("comment creation on post {} failed: {:#}", post_id, err),
            },
            GatewayResponse::PostDeleted { post_id, result } => {
                if let Err(err) = result {
                    warn!("deleting post {} failed: {:#}", post_id, err);
                }
            }
            GatewayResponse::CommentDeleted { comment_id, result } => {
                if let Err(err) = result {
                    warn!("deleting comment {} failed: {:#}", comment_id, err);
                }
            }
            GatewayResponse::PostLikeToggled { post_id, result } => {
                // The optimistic flag stays where the user put it.
                if let Err(err) = result {
                    warn!("like toggle on post {} failed: {:#}", post_id, err);
                }
            }
            GatewayResponse::CommentLikeToggled { comment_id, result } => {
                if let Err(err) = result {
                    warn!("like toggle on comment {} failed: {:#}", comment_id, err);
                }
            }
            GatewayResponse::UserResolved { result } => match result {
                Ok(profile) => {
                    if profile.user_id > 0 {
                        self.current_user_id = Some(profile.user_id);
                    }
                }
                Err(err) => warn!("user lookup failed: {:#}", err),
            },
        }
    }

    fn fetch_comments(&mut self, post_id: i64) {
        let seq = self.alloc_seq();
        self.pending_comments.insert(post_id, seq);
        let comments = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = comments.list_comments(post_id);
            let _ = tx.send(GatewayResponse::Comments {
                seq,
                post_id,
                result,
            });
        });
    }

    /// One independent count fetch per loaded post. Each runs on its own
    /// worker so a single failure cannot disturb the other counts.
    fn fetch_comment_counts(&mut self) {
        let ids: Vec<i64> = self.posts.iter().map(|post| post.post_id).collect();
        for post_id in ids {
            let seq = self.alloc_seq();
            let comments = self.comment_service.clone();
            let tx = self.response_tx.clone();
            thread::spawn(move || {
                let result = comments.comment_count(post_id);
                let _ = tx.send(GatewayResponse::CommentCount {
                    seq,
                    post_id,
                    result,
                });
            });
        }
    }

    fn alloc_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    // ---- read accessors --------------------------------------------------

    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    pub fn posts(&self) -> &[api::Post] {
        &self.posts
    }

    /// Cached comment thread for a post. `None` means never fetched, which
    /// displays the same as an empty thread but matters for refetch logic.
    pub fn comments(&self, post_id: i64) -> Option<&[api::Comment]> {
        self.comments.get(&post_id).map(Vec::as_slice)
    }

    pub fn comment_count(&self, post_id: i64) -> i64 {
        self.comment_counts.get(&post_id).copied().unwrap_or(0)
    }

    pub fn is_liked(&self, post_id: i64) -> bool {
        self.liked_posts.get(&post_id).copied().unwrap_or(false)
    }

    pub fn is_comment_liked(&self, comment_id: i64) -> bool {
        self.liked_comments.get(&comment_id).copied().unwrap_or(false)
    }

    pub fn is_panel_open(&self, post_id: i64) -> bool {
        self.open_panels.get(&post_id).copied().unwrap_or(false)
    }

    pub fn draft(&self, post_id: i64) -> &str {
        self.drafts.get(&post_id).map(String::as_str).unwrap_or("")
    }

    pub fn compose_content(&self) -> &str {
        &self.compose_content
    }

    pub fn compose_image(&self) -> Option<&ImageAttachment> {
        self.compose_image.as_ref()
    }

    pub fn current_user_id(&self) -> Option<i64> {
        self.current_user_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.claims.as_ref().and_then(Claims::display_name)
    }

    /// Delete affordance contract: visible iff the post belongs to the
    /// resolved acting user.
    pub fn can_delete_post(&self, post: &api::Post) -> bool {
        self.current_user_id == Some(post.user_id)
    }

    pub fn can_delete_comment(&self, comment: &api::Comment) -> bool {
        self.current_user_id == Some(comment.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    const IDLE: Duration = Duration::from_millis(500);

    fn post(post_id: i64, user_id: i64) -> api::Post {
        api::Post {
            post_id,
            user_id,
            content: format!("post {}", post_id),
            image: None,
            likes_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    fn comment(comment_id: i64, post_id: i64, user_id: i64) -> api::Comment {
        api::Comment {
            comment_id,
            post_id,
            user_id,
            content: format!("comment {}", comment_id),
            likes_count: 0,
            created_at: None,
        }
    }

    /// Gateway double that records every call and serves canned state.
    #[derive(Default)]
    struct RecordingGateway {
        posts: Mutex<Vec<api::Post>>,
        comments: Mutex<HashMap<i64, Vec<api::Comment>>>,
        counts: Mutex<HashMap<i64, i64>>,
        failing_counts: Mutex<HashSet<i64>>,
        created_posts: Mutex<Vec<api::NewPost>>,
        calls: Mutex<Vec<String>>,
        user_id: Mutex<Option<i64>>,
    }

    impl RecordingGateway {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn call_count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }
    }

    impl data::FeedService for RecordingGateway {
        fn list_posts(&self) -> Result<Vec<api::Post>> {
            self.record("list_posts");
            Ok(self.posts.lock().clone())
        }

        fn create_post(&self, post: &api::NewPost) -> Result<()> {
            self.record("create_post");
            self.created_posts.lock().push(post.clone());
            Ok(())
        }

        fn delete_post(&self, post_id: i64) -> Result<()> {
            self.record(format!("delete_post:{}", post_id));
            self.posts.lock().retain(|post| post.post_id != post_id);
            Ok(())
        }

        fn like_post(&self, post_id: i64) -> Result<()> {
            self.record(format!("like_post:{}", post_id));
            if let Some(post) = self
                .posts
                .lock()
                .iter_mut()
                .find(|post| post.post_id == post_id)
            {
                post.likes_count += 1;
            }
            Ok(())
        }

        fn unlike_post(&self, post_id: i64) -> Result<()> {
            self.record(format!("unlike_post:{}", post_id));
            if let Some(post) = self
                .posts
                .lock()
                .iter_mut()
                .find(|post| post.post_id == post_id)
            {
                post.likes_count -= 1;
            }
            Ok(())
        }
    }

    impl data::CommentService for RecordingGateway {
        fn list_comments(&self, post_id: i64) -> Result<Vec<api::Comment>> {
            self.record(format!("list_comments:{}", post_id));
            Ok(self.comments.lock().get(&post_id).cloned().unwrap_or_default())
        }

        fn comment_count(&self, post_id: i64) -> Result<i64> {
            self.record(format!("comment_count:{}", post_id));
            if self.failing_counts.lock().contains(&post_id) {
                anyhow::bail!("count unavailable for post {}", post_id);
            }
            Ok(self.counts.lock().get(&post_id).copied().unwrap_or(0))
        }

        fn create_comment(&self, new: &api::NewComment) -> Result<()> {
            self.record(format!("create_comment:{}", new.post_id));
            let mut comments = self.comments.lock();
            let thread = comments.entry(new.post_id).or_default();
            let comment_id = thread.len() as i64 + 100;
            thread.push(comment(comment_id, new.post_id, new.user_id.unwrap_or(0)));
            *self.counts.lock().entry(new.post_id).or_insert(0) += 1;
            Ok(())
        }

        fn delete_comment(&self, comment_id: i64) -> Result<()> {
            self.record(format!("delete_comment:{}", comment_id));
            for thread in self.comments.lock().values_mut() {
                thread.retain(|comment| comment.comment_id != comment_id);
            }
            Ok(())
        }

        fn like_comment(&self, comment_id: i64) -> Result<()> {
            self.record(format!("like_comment:{}", comment_id));
            Ok(())
        }

        fn unlike_comment(&self, comment_id: i64) -> Result<()> {
            self.record(format!("unlike_comment:{}", comment_id));
            Ok(())
        }
    }

    impl data::UserService for RecordingGateway {
        fn lookup_user(&self, identifier: &str) -> Result<api::UserProfile> {
            self.record(format!("lookup_user:{}", identifier));
            Ok(api::UserProfile {
                user_id: self.user_id.lock().unwrap_or(0),
                username: identifier.to_string(),
                email: String::new(),
            })
        }
    }

    fn model_with(gateway: &Arc<RecordingGateway>, claims: Option<Claims>) -> FeedModel {
        FeedModel::new(Options {
            feed_service: gateway.clone(),
            comment_service: gateway.clone(),
            user_service: gateway.clone(),
            claims,
        })
    }

    #[test]
    fn feed_displays_newest_first() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(1, 1), post(2, 1)];
        let mut model = model_with(&gateway, None);

        model.load_feed();
        model.pump(IDLE);

        let ids: Vec<i64> = model.posts().iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(model.phase(), FeedPhase::Loaded);
    }

    #[test]
    fn whitespace_post_issues_no_network_calls() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        model.set_compose_content("   \n\t ");
        model.create_post();

        assert!(gateway.calls.lock().is_empty());
        assert_eq!(model.compose_content(), "   \n\t ");
    }

    #[test]
    fn create_post_clears_compose_and_encodes_image() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        model.set_compose_content("hello feed");
        model.attach_image(Some(ImageAttachment {
            bytes: vec![1, 2, 3],
            mime: "image/png".into(),
        }));
        model.create_post();
        model.pump(IDLE);

        assert_eq!(model.compose_content(), "");
        assert!(model.compose_image().is_none());
        let created = gateway.created_posts.lock();
        assert_eq!(created.len(), 1);
        let image = created[0].image.as_deref().unwrap();
        assert!(image.starts_with("data:image/png;base64,"));
        assert_eq!(gateway.call_count("list_posts"), 1);
    }

    #[test]
    fn double_toggle_matches_click_parity() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(7, 1)];
        let mut model = model_with(&gateway, None);

        model.toggle_like(7);
        model.toggle_like(7);
        assert!(!model.is_liked(7));

        model.toggle_like(7);
        assert!(model.is_liked(7));

        model.pump(IDLE);
        assert!(model.is_liked(7));
    }

    #[test]
    fn successful_like_refetches_authoritative_count() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(7, 1)];
        let mut model = model_with(&gateway, None);

        model.load_feed();
        model.pump(IDLE);
        assert_eq!(model.posts()[0].likes_count, 0);

        model.toggle_like(7);
        model.pump(IDLE);
        assert!(model.is_liked(7));
        assert_eq!(model.posts()[0].likes_count, 1);

        model.toggle_like(7);
        model.pump(IDLE);
        assert!(!model.is_liked(7));
        assert_eq!(model.posts()[0].likes_count, 0);
    }

    #[test]
    fn cancelled_delete_never_reaches_the_gateway() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(3, 1)];
        let mut model = model_with(&gateway, None);

        model.request_delete_post(3);
        assert!(model.pending_action().is_some());
        model.cancel();
        model.pump(IDLE);

        assert_eq!(gateway.call_count("delete_post"), 0);
    }

    #[test]
    fn confirmed_delete_executes_once_and_refetches() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(3, 1), post(4, 1)];
        let mut model = model_with(&gateway, None);

        model.load_feed();
        model.pump(IDLE);

        model.request_delete_post(3);
        model.confirm();
        model.confirm(); // empty gate, no-op
        model.pump(IDLE);

        assert_eq!(gateway.call_count("delete_post:3"), 1);
        let ids: Vec<i64> = model.posts().iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn confirmed_comment_delete_refetches_thread_and_count() {
        let gateway = Arc::new(RecordingGateway::default());
        gateway
            .comments
            .lock()
            .insert(5, vec![comment(50, 5, 1), comment(51, 5, 2)]);
        gateway.counts.lock().insert(5, 2);
        let mut model = model_with(&gateway, None);

        model.toggle_comment_panel(5);
        model.pump(IDLE);
        assert_eq!(model.comments(5).unwrap().len(), 2);

        gateway.counts.lock().insert(5, 1);
        model.request_delete_comment(50, 5);
        model.confirm();
        model.pump(IDLE);

        assert_eq!(gateway.call_count("delete_comment:50"), 1);
        assert_eq!(model.comments(5).unwrap().len(), 1);
        assert_eq!(model.comment_count(5), 1);
    }

    #[test]
    fn empty_comment_submission_is_local_only() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        model.submit_comment(3);
        model.set_draft(3, "   ");
        model.submit_comment(3);

        assert!(gateway.calls.lock().is_empty());
        assert_eq!(model.draft(3), "   ");
    }

    #[test]
    fn comment_submission_clears_draft_and_refetches() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        model.set_draft(3, "  nice post  ");
        model.submit_comment(3);
        model.pump(IDLE);

        assert_eq!(model.draft(3), "");
        assert_eq!(gateway.call_count("create_comment:3"), 1);
        assert_eq!(model.comments(3).unwrap().len(), 1);
        assert_eq!(model.comment_count(3), 1);
    }

    #[test]
    fn panel_toggle_fetches_at_most_once() {
        let gateway = Arc::new(RecordingGateway::default());
        gateway.comments.lock().insert(7, vec![comment(70, 7, 1)]);
        let mut model = model_with(&gateway, None);

        model.toggle_comment_panel(7); // expand, fetch
        model.toggle_comment_panel(7); // collapse, still in flight
        model.toggle_comment_panel(7); // expand again, no second fetch
        model.pump(IDLE);

        assert_eq!(gateway.call_count("list_comments:7"), 1);
        assert!(model.is_panel_open(7));
        assert_eq!(model.comments(7).unwrap().len(), 1);

        model.toggle_comment_panel(7);
        model.toggle_comment_panel(7); // cached now, still one fetch total
        model.pump(IDLE);
        assert_eq!(gateway.call_count("list_comments:7"), 1);
    }

    #[test]
    fn stale_feed_snapshot_is_discarded() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        let older = model.alloc_seq();
        let newer = model.alloc_seq();
        model.handle_response(GatewayResponse::Posts {
            seq: newer,
            result: Ok(vec![post(5, 1)]),
        });
        model.handle_response(GatewayResponse::Posts {
            seq: older,
            result: Ok(vec![post(9, 1)]),
        });

        let ids: Vec<i64> = model.posts().iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn stale_comment_snapshot_is_discarded_per_post() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        let older = model.alloc_seq();
        let newer = model.alloc_seq();
        model.handle_response(GatewayResponse::Comments {
            seq: newer,
            post_id: 4,
            result: Ok(vec![comment(40, 4, 1), comment(41, 4, 1)]),
        });
        model.handle_response(GatewayResponse::Comments {
            seq: older,
            post_id: 4,
            result: Ok(vec![comment(40, 4, 1)]),
        });

        assert_eq!(model.comments(4).unwrap().len(), 2);
    }

    #[test]
    fn failed_refresh_keeps_prior_state() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        let seq = model.alloc_seq();
        model.handle_response(GatewayResponse::Posts {
            seq,
            result: Ok(vec![post(1, 1)]),
        });
        let seq = model.alloc_seq();
        model.handle_response(GatewayResponse::Posts {
            seq,
            result: Err(anyhow::anyhow!("backend down")),
        });

        assert_eq!(model.posts().len(), 1);
        assert_eq!(model.phase(), FeedPhase::Loaded);
    }

    #[test]
    fn one_failing_count_leaves_the_others_intact() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(1, 1), post(2, 1), post(3, 1)];
        gateway.counts.lock().insert(1, 4);
        gateway.counts.lock().insert(3, 6);
        gateway.failing_counts.lock().insert(2);
        let mut model = model_with(&gateway, None);

        model.load_feed();
        model.pump(IDLE);

        assert_eq!(model.comment_count(1), 4);
        assert_eq!(model.comment_count(2), 0);
        assert_eq!(model.comment_count(3), 6);
    }

    #[test]
    fn closed_model_discards_late_responses() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.posts.lock() = vec![post(1, 1)];
        let mut model = model_with(&gateway, None);

        model.load_feed();
        model.close();
        model.pump(IDLE);

        assert!(model.posts().is_empty());
    }

    #[test]
    fn resolved_user_controls_delete_affordance() {
        let gateway = Arc::new(RecordingGateway::default());
        *gateway.user_id.lock() = Some(42);
        let claims = Claims {
            sub: Some("alice".into()),
            username: Some("alice01".into()),
            user_id: None,
        };
        let mut model = model_with(&gateway, Some(claims));

        assert!(!model.can_delete_post(&post(1, 42)));
        model.resolve_user();
        model.pump(IDLE);

        assert_eq!(model.current_user_id(), Some(42));
        assert!(model.can_delete_post(&post(1, 42)));
        assert!(!model.can_delete_post(&post(2, 41)));
        assert!(model.can_delete_comment(&comment(9, 1, 42)));
        assert_eq!(gateway.call_count("lookup_user:alice01"), 1);
        assert_eq!(model.display_name(), Some("alice"));
    }

    #[test]
    fn anonymous_model_skips_user_lookup() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut model = model_with(&gateway, None);

        model.resolve_user();
        model.pump(IDLE);

        assert_eq!(gateway.call_count("lookup_user"), 0);
        assert!(!model.can_delete_post(&post(1, 0)));
    }
}
