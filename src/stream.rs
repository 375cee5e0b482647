use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::text::{collapse_whitespace, join_words, strip_html, strip_tracking};

pub const DEFAULT_NOOP_LINK: &str = "http://www.facebook.com/";

/// Application ids the stream reports without an attribution label.
const KNOWN_APPS: &[(&str, &str)] = &[
    ("2254487659", "Facebook for BlackBerry"),
    ("2305272732", "Photos"),
    ("2309869772", "Links"),
    ("2915120374", "Mobile Web"),
    ("6628568379", "Facebook for iPhone"),
    ("10732101402", "Ping.fm"),
    ("1394457661837", "Facebook Text Message"),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStream {
    #[serde(default, deserialize_with = "lenient")]
    pub profiles: Vec<RawProfile>,
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
}

/// Entry of a `Users.getInfo` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(default, deserialize_with = "flexible_id")]
    pub uid: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPost {
    #[serde(default, deserialize_with = "flexible_id")]
    pub post_id: String,
    #[serde(default, deserialize_with = "flexible_id")]
    pub actor_id: String,
    #[serde(default, deserialize_with = "flexible_int")]
    pub created_time: i64,
    #[serde(default, deserialize_with = "flexible_int")]
    pub updated_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub attachment: RawAttachment,
    #[serde(default, deserialize_with = "lenient")]
    pub attribution: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub app_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub permalink: String,
    #[serde(default, deserialize_with = "lenient")]
    pub comments: RawComments,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttachment {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub caption: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub href: String,
    #[serde(default, deserialize_with = "lenient")]
    pub media: Vec<RawMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMedia {
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient")]
    pub alt: String,
    #[serde(default, deserialize_with = "lenient")]
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComments {
    #[serde(default, deserialize_with = "flexible_int")]
    pub count: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub comment_list: Vec<RawComment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComment {
    #[serde(default, deserialize_with = "flexible_id")]
    pub fromid: String,
    #[serde(default, deserialize_with = "flexible_int")]
    pub time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub message: String,
    /// Message followed by the flattened attachment, ready for display.
    pub text: String,
    pub attribution: Option<String>,
    pub permalink: String,
    pub comment_count: usize,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: String,
    pub created: DateTime<Utc>,
    pub text: String,
}

impl Post {
    pub fn from_raw(raw: RawPost, noop_link: &str) -> Self {
        let attachment = format_attachment(&raw.attachment, noop_link);
        let text = join_words([raw.message.as_str(), attachment.as_str()]);
        let attribution = raw
            .attribution
            .as_deref()
            .map(strip_html)
            .filter(|label| !label.is_empty())
            .or_else(|| app_name(&raw.app_id));
        let comments = raw
            .comments
            .comment_list
            .into_iter()
            .map(Comment::from)
            .collect::<Vec<_>>();

        Post {
            id: raw.post_id,
            author: raw.actor_id,
            created: timestamp(raw.created_time),
            updated: timestamp(raw.updated_time),
            message: raw.message,
            text,
            attribution,
            permalink: raw.permalink,
            comment_count: usize::try_from(raw.comments.count).unwrap_or(0),
            comments,
        }
    }

    pub fn all_comments_loaded(&self) -> bool {
        self.comment_count == self.comments.len()
    }

    /// Swaps in a complete comment list; the total becomes whatever was fetched.
    pub fn replace_comments(&mut self, comments: Vec<Comment>) {
        self.comment_count = comments.len();
        self.comments = comments;
    }
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Comment {
            author: raw.fromid,
            created: timestamp(raw.time),
            text: collapse_whitespace(&raw.text),
        }
    }
}

pub fn parse_posts(posts: Vec<RawPost>, noop_link: &str) -> Vec<Post> {
    posts
        .into_iter()
        .map(|raw| Post::from_raw(raw, noop_link))
        .collect()
}

pub fn format_attachment(attachment: &RawAttachment, noop_link: &str) -> String {
    let href = strip_tracking(attachment.href.trim());
    let mut pieces = vec![
        strip_html(&attachment.name),
        strip_html(&attachment.caption),
        strip_html(&attachment.description),
    ];
    if !href.is_empty() && href != noop_link {
        pieces.push(href.clone());
    }

    for media in &attachment.media {
        let media_href = strip_tracking(media.href.trim());
        if media_href == href {
            continue;
        }
        let kind = media.kind.trim();
        if !kind.is_empty() {
            pieces.push(format!("{kind}:"));
        }
        pieces.push(strip_html(&media.alt));
        if media_href != noop_link {
            pieces.push(media_href);
        }
    }

    join_words(pieces)
}

fn app_name(app_id: &str) -> Option<String> {
    let app_id = app_id.trim();
    if app_id.is_empty() || app_id == "0" {
        return None;
    }
    Some(
        KNOWN_APPS
            .iter()
            .find(|(id, _)| *id == app_id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("app {app_id}")),
    )
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub kind: Option<String>,
}

/// Profile id to display name cache, filled as the stream mentions people.
#[derive(Debug, Clone, Default)]
pub struct Profiles {
    entries: HashMap<String, Profile>,
}

impl Profiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, id: &str, name: &str, kind: Option<String>) {
        if id.is_empty() {
            return;
        }
        let kind = kind
            .filter(|k| !k.is_empty())
            .or_else(|| self.entries.get(id).and_then(|p| p.kind.clone()));
        self.entries.insert(
            id.to_string(),
            Profile {
                name: name.to_string(),
                kind,
            },
        );
    }

    pub fn merge_profiles<I>(&mut self, profiles: I)
    where
        I: IntoIterator<Item = RawProfile>,
    {
        for profile in profiles {
            self.merge(&profile.id, &profile.name, profile.kind);
        }
    }

    pub fn merge_users<I>(&mut self, users: I)
    where
        I: IntoIterator<Item = RawUser>,
    {
        for user in users {
            self.merge(&user.uid, &user.name, None);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Display name for `id`, or the id itself when nobody has resolved it.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.entries
            .get(id)
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

pub(crate) fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

pub(crate) fn flexible_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_stream(value: Value) -> RawStream {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_post_with_attachment_and_comments() {
        let stream = raw_stream(json!({
            "profiles": [{"id": 7, "name": "Alice", "type": "user"}],
            "posts": [{
                "post_id": "7_1",
                "actor_id": 7,
                "created_time": 1000,
                "updated_time": "1200",
                "message": "look at this",
                "permalink": "http://fb/p/1",
                "attachment": {
                    "name": "A <b>page</b>",
                    "caption": "example.com",
                    "description": "Tom &amp; Jerry",
                    "href": "http://x/l.php?u=http%3A%2F%2Fexample.com%2Fa"
                },
                "comments": {
                    "count": "2",
                    "comment_list": [
                        {"fromid": 8, "time": 1100, "text": "nice\n  one"}
                    ]
                }
            }]
        }));
        let posts = parse_posts(stream.posts, DEFAULT_NOOP_LINK);
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "7_1");
        assert_eq!(post.author, "7");
        assert_eq!(post.updated.timestamp(), 1200);
        assert_eq!(
            post.text,
            "look at this A page example.com Tom & Jerry http://example.com/a"
        );
        assert_eq!(post.comment_count, 2);
        assert!(!post.all_comments_loaded());
        assert_eq!(post.comments[0].author, "8");
        assert_eq!(post.comments[0].text, "nice one");
    }

    #[test]
    fn missing_and_malformed_fields_default_to_empty() {
        let stream = raw_stream(json!({
            "posts": [{
                "post_id": "1",
                "actor_id": "1",
                "message": null,
                "attachment": [],
                "comments": "nope"
            }]
        }));
        let posts = parse_posts(stream.posts, DEFAULT_NOOP_LINK);
        let post = &posts[0];
        assert_eq!(post.text, "");
        assert_eq!(post.comment_count, 0);
        assert!(post.comments.is_empty());
        assert!(post.all_comments_loaded());
        assert_eq!(post.attribution, None);
    }

    #[test]
    fn noop_link_is_dropped() {
        let attachment = RawAttachment {
            name: "Status".into(),
            href: DEFAULT_NOOP_LINK.into(),
            ..Default::default()
        };
        assert_eq!(format_attachment(&attachment, DEFAULT_NOOP_LINK), "Status");
    }

    #[test]
    fn media_shown_only_when_link_differs() {
        let attachment = RawAttachment {
            name: "Album".into(),
            href: "http://fb/album".into(),
            media: vec![
                RawMedia {
                    kind: "photo".into(),
                    alt: "cover".into(),
                    href: "http://fb/album".into(),
                },
                RawMedia {
                    kind: "photo".into(),
                    alt: "beach".into(),
                    href: "http://x/l.php?u=http%3A%2F%2Ffb%2Fphoto%2F2".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            format_attachment(&attachment, DEFAULT_NOOP_LINK),
            "Album http://fb/album photo: beach http://fb/photo/2"
        );
    }

    #[test]
    fn attribution_prefers_label_then_known_app() {
        let labelled = Post::from_raw(
            RawPost {
                attribution: Some("via <a href=\"x\">Twitter</a>".into()),
                app_id: "2915120374".into(),
                ..Default::default()
            },
            DEFAULT_NOOP_LINK,
        );
        assert_eq!(labelled.attribution.as_deref(), Some("via Twitter"));

        let known = Post::from_raw(
            RawPost {
                app_id: "2915120374".into(),
                ..Default::default()
            },
            DEFAULT_NOOP_LINK,
        );
        assert_eq!(known.attribution.as_deref(), Some("Mobile Web"));

        let unknown = Post::from_raw(
            RawPost {
                app_id: "99".into(),
                ..Default::default()
            },
            DEFAULT_NOOP_LINK,
        );
        assert_eq!(unknown.attribution.as_deref(), Some("app 99"));
    }

    #[test]
    fn replacing_comments_marks_post_complete() {
        let mut post = Post::from_raw(
            RawPost {
                comments: RawComments {
                    count: 5,
                    comment_list: vec![RawComment::default()],
                },
                ..Default::default()
            },
            DEFAULT_NOOP_LINK,
        );
        assert!(!post.all_comments_loaded());
        post.replace_comments(vec![
            Comment::from(RawComment::default()),
            Comment::from(RawComment::default()),
            Comment::from(RawComment::default()),
        ]);
        assert!(post.all_comments_loaded());
        assert_eq!(post.comment_count, 3);
    }

    #[test]
    fn profile_merge_keeps_known_type() {
        let mut profiles = Profiles::new();
        profiles.merge("1", "Alice", Some("user".into()));
        profiles.merge_users(vec![RawUser {
            uid: "1".into(),
            name: "Alice B".into(),
        }]);
        let profile = profiles.get("1").unwrap();
        assert_eq!(profile.name, "Alice B");
        assert_eq!(profile.kind.as_deref(), Some("user"));
        assert_eq!(profiles.display_name("1"), "Alice B");
        assert_eq!(profiles.display_name("2"), "2");
    }
}
