use url::Url;

use crate::app::{AppContext, GatorError, Result};
use crate::domain::{Feed, FeedFollow, User};
use crate::poller::Poller;
use crate::store::Store;

pub fn register(ctx: &mut AppContext, name: &str) -> Result<()> {
    let user = User::new(name.to_string());
    ctx.store.create_user(&user)?;
    println!("User {} was created.", user.name);

    login(ctx, name)
}

pub fn login(ctx: &mut AppContext, name: &str) -> Result<()> {
    if ctx.store.get_user_by_name(name)?.is_none() {
        return Err(GatorError::UserNotFound(name.to_string()));
    }

    ctx.config.set_user(name)?;
    println!("User {} set.", name);
    Ok(())
}

pub fn list_users(ctx: &AppContext) -> Result<()> {
    let users = ctx.store.get_all_users()?;
    let current = ctx.config.current_user_name.as_deref();

    if users.is_empty() {
        println!("No users");
        return Ok(());
    }

    for user in users {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }

    Ok(())
}

pub fn reset(ctx: &AppContext) -> Result<()> {
    let deleted = ctx.store.reset()?;
    println!("Deleted {} users and everything they owned", deleted);
    Ok(())
}

/// The logged-in user, required by feed and follow commands.
pub fn current_user(ctx: &AppContext) -> Result<User> {
    let name = ctx
        .config
        .current_user_name
        .as_deref()
        .ok_or(GatorError::NotLoggedIn)?;

    ctx.store
        .get_user_by_name(name)?
        .ok_or_else(|| GatorError::UserNotFound(name.to_string()))
}

pub fn add_feed(ctx: &AppContext, name: &str, url: &str) -> Result<Feed> {
    let user = current_user(ctx)?;

    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GatorError::UnsupportedScheme(url.to_string()));
    }

    let feed = Feed::new(name.to_string(), url.to_string(), user.id);
    ctx.store.add_feed(&feed)?;
    ctx.store.follow(&FeedFollow::new(user.id, feed.id))?;

    println!("Added feed: {}", feed.display_title());
    println!("  {}", feed.url);
    Ok(feed)
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let owner = ctx
            .store
            .get_user(feed.user_id)?
            .map(|u| u.name)
            .unwrap_or_else(|| "(unknown)".to_string());
        println!("{} (added by {})\n  {}", feed.display_title(), owner, feed.url);
    }

    Ok(())
}

pub fn follow(ctx: &AppContext, url: &str) -> Result<()> {
    let user = current_user(ctx)?;
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| GatorError::FeedNotFound(url.to_string()))?;

    ctx.store.follow(&FeedFollow::new(user.id, feed.id))?;
    println!("{} now follows {}", user.name, feed.display_title());
    Ok(())
}

pub fn unfollow(ctx: &AppContext, url: &str) -> Result<()> {
    let user = current_user(ctx)?;
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| GatorError::FeedNotFound(url.to_string()))?;

    if ctx.store.unfollow(user.id, feed.id)? {
        println!("{} unfollowed {}", user.name, feed.display_title());
    } else {
        println!("{} was not following {}", user.name, feed.display_title());
    }
    Ok(())
}

pub fn list_following(ctx: &AppContext) -> Result<()> {
    let user = current_user(ctx)?;
    let feeds = ctx.store.get_followed_feeds(user.id)?;

    if feeds.is_empty() {
        println!("Not following any feeds");
        return Ok(());
    }

    for feed in feeds {
        println!("* {}", feed.display_title());
    }

    Ok(())
}

pub fn browse(ctx: &AppContext, limit: usize) -> Result<()> {
    let user = current_user(ctx)?;
    let posts = ctx.store.get_posts_for_user(user.id, limit)?;

    if posts.is_empty() {
        println!("No posts");
        return Ok(());
    }

    for post in posts {
        println!("---------------------------------------------------");
        println!("{}", post.display_title());
        if let Some(published) = post.published_at.as_deref() {
            println!("{}", published);
        }
        if let Some(description) = post.description.as_deref().filter(|d| !d.is_empty()) {
            println!("{}", description);
        }
        println!("{}", post.url);
    }
    println!("---------------------------------------------------");

    Ok(())
}

/// Run the polling loop until a fatal error.
pub async fn poll(ctx: &AppContext, interval: Option<&str>) -> Result<()> {
    let interval = interval.or(ctx.config.poll.interval.as_deref());
    let mut poller = Poller::from_interval(ctx.ingestor()?, interval)?;
    poller.run().await
}
