use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::stream::{Comment, Post, Profiles};
use crate::subscription::{IgnoreKind, Subscription};

pub const DEFAULT_MAX_COMMENTS: usize = 50;

/// Comments picked for display under one post.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentSelection<'a> {
    /// 1-based position in the post's full comment list, with the comment.
    pub shown: Vec<(usize, &'a Comment)>,
    /// Eligible comments left out because of the per-post cap.
    pub hidden: usize,
}

impl CommentSelection<'_> {
    pub fn is_truncated(&self) -> bool {
        self.hidden > 0
    }
}

pub fn post_is_eligible(post: &Post, sub: &Subscription, profiles: &Profiles) -> bool {
    if post.updated < sub.last_update {
        return false;
    }
    if let Some(app) = post.attribution.as_deref() {
        if sub.ignoring(IgnoreKind::App, app) {
            return false;
        }
    }
    !sub.ignoring(IgnoreKind::Friend, profiles.display_name(&post.author))
}

/// Eligible posts, oldest update first. Ties keep feed order.
pub fn select_posts(posts: Vec<Post>, sub: &Subscription, profiles: &Profiles) -> Vec<Post> {
    let mut selected = posts
        .into_iter()
        .filter(|post| post_is_eligible(post, sub, profiles))
        .collect::<Vec<_>>();
    selected.sort_by_key(|post| post.updated);
    selected
}

/// Comments at or after `since`, with their 1-based positions.
pub fn recent_comments(post: &Post, since: DateTime<Utc>) -> Vec<(usize, &Comment)> {
    post.comments
        .iter()
        .enumerate()
        .filter(|(_, comment)| comment.created >= since)
        .map(|(idx, comment)| (idx + 1, comment))
        .collect()
}

/// Recent comment authors the profile cache cannot name yet, first sighting order.
pub fn unknown_authors(post: &Post, since: DateTime<Utc>, profiles: &Profiles) -> Vec<String> {
    let mut seen = HashSet::new();
    recent_comments(post, since)
        .into_iter()
        .map(|(_, comment)| comment.author.as_str())
        .filter(|author| !author.is_empty() && !profiles.contains(author))
        .filter(|author| seen.insert(*author))
        .map(str::to_string)
        .collect()
}

pub fn select_comments<'a>(
    post: &'a Post,
    sub: &Subscription,
    profiles: &Profiles,
    max_comments: usize,
) -> CommentSelection<'a> {
    let eligible = recent_comments(post, sub.last_update)
        .into_iter()
        .filter(|(_, comment)| {
            !sub.ignoring(IgnoreKind::Friend, profiles.display_name(&comment.author))
        })
        .collect::<Vec<_>>();
    let hidden = eligible.len().saturating_sub(max_comments);
    let shown = eligible.into_iter().take(max_comments).collect();
    CommentSelection { shown, hidden }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn watermark() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 3, 4, 12, 0, 0).unwrap()
    }

    fn subscription() -> Subscription {
        let mut sub = Subscription::new("mmb", "1", "k", "s", "secret", watermark());
        sub.last_update = watermark();
        sub
    }

    fn post(id: &str, author: &str, updated: DateTime<Utc>) -> Post {
        Post {
            id: id.into(),
            author: author.into(),
            created: updated,
            updated,
            message: String::new(),
            text: format!("post {id}"),
            attribution: None,
            permalink: format!("http://fb/{id}"),
            comment_count: 0,
            comments: Vec::new(),
        }
    }

    fn comment(author: &str, created: DateTime<Utc>) -> Comment {
        Comment {
            author: author.into(),
            created,
            text: "hi".into(),
        }
    }

    fn profiles() -> Profiles {
        let mut profiles = Profiles::new();
        profiles.merge("10", "Alice", None);
        profiles.merge("20", "Bob", None);
        profiles
    }

    #[test]
    fn watermark_is_inclusive_and_output_is_oldest_first() {
        let t = watermark();
        let posts = vec![
            post("later", "10", t + Duration::seconds(1)),
            post("before", "10", t - Duration::seconds(1)),
            post("exact", "10", t),
        ];
        let selected = select_posts(posts, &subscription(), &profiles());
        let ids = selected.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["exact", "later"]);
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let t = watermark();
        let posts = vec![
            post("a", "10", t + Duration::seconds(5)),
            post("b", "20", t + Duration::seconds(2)),
            post("c", "10", t - Duration::seconds(2)),
        ];
        let sub = subscription();
        let once = select_posts(posts, &sub, &profiles());
        let twice = select_posts(once.clone(), &sub, &profiles());
        assert_eq!(once, twice);
    }

    #[test]
    fn ignored_friends_match_any_case() {
        let t = watermark();
        let mut sub = subscription();
        sub.ignored_friends.add("Bob");
        let mut profiles = profiles();
        profiles.merge("30", "BOB", None);
        profiles.merge("20", "bob", None);
        let posts = vec![post("a", "20", t), post("b", "30", t), post("c", "10", t)];
        let selected = select_posts(posts, &sub, &profiles);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "c");
    }

    #[test]
    fn ignored_apps_match_attribution() {
        let t = watermark();
        let mut sub = subscription();
        sub.ignored_apps.add("farmville");
        let mut game = post("game", "10", t);
        game.attribution = Some("FarmVille".into());
        let mut mobile = post("mobile", "10", t);
        mobile.attribution = Some("Mobile Web".into());
        let selected = select_posts(vec![game, mobile], &sub, &profiles());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "mobile");
    }

    #[test]
    fn comments_are_capped_with_a_remainder() {
        let t = watermark();
        let mut big = post("big", "10", t);
        big.comments = (0..60)
            .map(|i| comment("10", t + Duration::seconds(i)))
            .collect();
        big.comment_count = 60;
        let sub = subscription();
        let profiles = profiles();
        let selection = select_comments(&big, &sub, &profiles, 50);
        assert_eq!(selection.shown.len(), 50);
        assert_eq!(selection.hidden, 10);
        assert!(selection.is_truncated());
        assert_eq!(selection.shown[0].0, 1);
        assert_eq!(selection.shown[49].0, 50);
    }

    #[test]
    fn old_and_ignored_comments_are_skipped_but_positions_kept() {
        let t = watermark();
        let mut p = post("p", "10", t);
        p.comments = vec![
            comment("10", t - Duration::seconds(10)),
            comment("20", t),
            comment("10", t + Duration::seconds(1)),
        ];
        p.comment_count = 3;
        let mut sub = subscription();
        sub.ignored_friends.add("bob");
        let profiles = profiles();
        let selection = select_comments(&p, &sub, &profiles, 50);
        let positions = selection.shown.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        assert_eq!(positions, vec![3]);
        assert!(!selection.is_truncated());
    }

    #[test]
    fn unknown_authors_are_deduplicated() {
        let t = watermark();
        let mut p = post("p", "10", t);
        p.comments = vec![
            comment("99", t),
            comment("10", t),
            comment("99", t + Duration::seconds(1)),
            comment("77", t - Duration::seconds(1)),
        ];
        assert_eq!(unknown_authors(&p, t, &profiles()), vec!["99".to_string()]);
    }
}
