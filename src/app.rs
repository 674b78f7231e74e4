use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use crate::api;
use crate::config;
use crate::data::{self, CommentService, FeedService, UserService};
use crate::feed;
use crate::session;

// How long the one-shot driver lets the response channel stay quiet before
// it considers the model settled.
const SETTLE_IDLE: Duration = Duration::from_millis(750);

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let session = Arc::new(if cfg.session.token.trim().is_empty() {
        session::Session::new()
    } else {
        session::Session::with_token(cfg.session.token.clone())
    });
    let claims = session.claims();

    let feed_service: Arc<dyn FeedService>;
    let comment_service: Arc<dyn CommentService>;
    let user_service: Arc<dyn UserService>;

    if session.token().is_some() {
        let client = Arc::new(
            api::Client::new(
                session.clone(),
                api::ClientConfig {
                    user_agent: cfg.backend.user_agent.clone(),
                    base_url: Some(cfg.backend.base_url.clone()),
                    timeout: Some(cfg.backend.request_timeout),
                    http_client: None,
                },
            )
            .context("build api client")?,
        );
        feed_service = Arc::new(data::RestFeedService::new(client.clone()));
        comment_service = Arc::new(data::RestCommentService::new(client.clone()));
        user_service = Arc::new(data::RestUserService::new(client));
        info!("using backend at {}", cfg.backend.base_url);
    } else {
        feed_service = Arc::new(data::MockFeedService);
        comment_service = Arc::new(data::MockCommentService);
        user_service = Arc::new(data::MockUserService);
        info!("no session token configured, serving mock content");
    }

    let mut model = feed::FeedModel::new(feed::Options {
        feed_service,
        comment_service,
        user_service,
        claims,
    });
    model.mount();
    model.pump(SETTLE_IDLE);

    render_feed(&model);
    model.close();
    Ok(())
}

fn render_feed(model: &feed::FeedModel) {
    match model.display_name() {
        Some(name) => println!("Welcome {}!", name),
        None => println!("Welcome!"),
    }
    println!();

    if model.posts().is_empty() {
        println!("No posts yet.");
        return;
    }

    for post in model.posts() {
        println!("User {}", post.user_id);
        println!("  {}", post.content);
        if post.image.is_some() {
            println!("  [image attachment]");
        }
        let liked = if model.is_liked(post.post_id) { "*" } else { " " };
        println!(
            "  {}{} likes | {} comments",
            liked,
            post.likes_count,
            model.comment_count(post.post_id)
        );
        println!();
    }
}
