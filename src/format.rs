use std::fmt::Display;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::stream::{Comment, Post, Profiles};
use crate::text::collapse_whitespace;

pub const DEFAULT_NETWORK: &str = "Facebook";

/// Short human time relative to `now`: time of day for today, weekday and
/// date within the year, full date otherwise.
pub fn when<Tz>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let pattern = if at.date_naive() == now.date_naive() {
        "%l:%M%P"
    } else if at.year() == now.year() {
        "%a %b %e %l:%M%P"
    } else {
        "%a %b %e %Y %l:%M%P"
    };
    collapse_whitespace(&at.format(pattern).to_string())
}

/// Renders lines for one subscription, in the time zone of `now`.
pub struct LineFormatter<Tz: TimeZone> {
    prefix: String,
    now: DateTime<Tz>,
}

impl<Tz> LineFormatter<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(nick: &str, network: &str, now: DateTime<Tz>) -> Self {
        Self {
            prefix: format!("{nick} {network}:"),
            now,
        }
    }

    fn when(&self, at: &DateTime<Utc>) -> String {
        when(&at.with_timezone(&self.now.timezone()), &self.now)
    }

    pub fn post(&self, post: &Post, profiles: &Profiles) -> String {
        let app = post
            .attribution
            .as_deref()
            .map(|app| format!(" ({app})"))
            .unwrap_or_default();
        let body = format!(
            "{} ({}){}: {}",
            profiles.display_name(&post.author),
            self.when(&post.created),
            app,
            post.text
        );
        format!("{} {}", self.prefix, collapse_whitespace(&body))
    }

    pub fn comment(
        &self,
        position: usize,
        total: usize,
        comment: &Comment,
        profiles: &Profiles,
    ) -> String {
        let body = format!(
            "{} ({}): {}",
            profiles.display_name(&comment.author),
            self.when(&comment.created),
            comment.text
        );
        format!(
            "{}   \\-({}/{})-> {}",
            self.prefix,
            position,
            total,
            collapse_whitespace(&body)
        )
    }

    pub fn overflow(&self, hidden: usize, permalink: &str) -> String {
        format!(
            "{}   \\-> {} more comments, see the rest at {}",
            self.prefix, hidden, permalink
        )
    }
}
