use std::collections::HashMap;

use chrono::{DateTime, Utc};
use db::models::{
    activity::{Activity, ActivityToken},
    comment::CommentWithReplies,
    priority::Priority,
    status::Status,
    user::User,
};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

/// One element of the merged feed, tagged so the renderer can dispatch.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimelineItem {
    Activity(Activity),
    Comment(CommentWithReplies),
}

impl TimelineItem {
    fn created_at(&self) -> DateTime<Utc> {
        match self {
            TimelineItem::Activity(activity) => activity.created_at,
            TimelineItem::Comment(comment) => comment.created_at,
        }
    }

    // Tie-break at equal timestamps: activities before comments.
    fn kind_rank(&self) -> u8 {
        match self {
            TimelineItem::Activity(_) => 0,
            TimelineItem::Comment(_) => 1,
        }
    }
}

/// A feed entry. The id is synthetic and stable only for the lifetime
/// of one response; it is never persisted.
#[derive(Debug, Clone, Serialize, TS)]
pub struct TimelineEntry {
    pub id: Uuid,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub item: TimelineItem,
}

/// Merges a task's activities and top-level comments into one feed
/// ordered ascending by creation time. Replies stay nested under their
/// parent comment. The sort is stable, so within a kind the original
/// order is preserved.
pub fn merge_timeline(
    activities: Vec<Activity>,
    comments: Vec<CommentWithReplies>,
) -> Vec<TimelineEntry> {
    let mut items: Vec<TimelineItem> = activities
        .into_iter()
        .map(TimelineItem::Activity)
        .chain(comments.into_iter().map(TimelineItem::Comment))
        .collect();

    items.sort_by_key(|item| (item.created_at(), item.kind_rank()));

    items
        .into_iter()
        .map(|item| TimelineEntry {
            id: Uuid::new_v4(),
            created_at: item.created_at(),
            item,
        })
        .collect()
}

/// Lookup tables for resolving reference tokens, loaded once per render.
#[derive(Debug, Default)]
pub struct RenderLookups {
    pub users: HashMap<Uuid, User>,
    pub statuses: HashMap<Uuid, Status>,
    pub priorities: HashMap<Uuid, Priority>,
}

/// Substitutes each typed token with its display text. A reference whose
/// id is missing from its table renders as a placeholder instead of
/// failing.
pub fn render_activity(tokens: &[ActivityToken], lookups: &RenderLookups) -> Vec<String> {
    tokens
        .iter()
        .map(|token| match token {
            ActivityToken::Text { text } => text.clone(),
            ActivityToken::User { id } => lookups
                .users
                .get(id)
                .map(|user| user.username.clone())
                .unwrap_or_else(|| "Unknown user".to_string()),
            ActivityToken::Users { ids } => ids
                .iter()
                .map(|id| {
                    lookups
                        .users
                        .get(id)
                        .map(|user| user.username.clone())
                        .unwrap_or_else(|| "Unknown user".to_string())
                })
                .collect::<Vec<_>>()
                .join(", "),
            ActivityToken::Date { value } => value.format("%Y-%m-%d").to_string(),
            ActivityToken::Status { id } => lookups
                .statuses
                .get(id)
                .map(|status| status.label.clone())
                .unwrap_or_else(|| "Unknown status".to_string()),
            ActivityToken::Priority { id } => lookups
                .priorities
                .get(id)
                .map(|priority| priority.label.clone())
                .unwrap_or_else(|| "Unknown priority".to_string()),
            ActivityToken::Attachment { name } => name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use db::models::comment::Comment;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn activity(created_at: DateTime<Utc>) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            content: vec![ActivityToken::text("did something")],
            created_at,
        }
    }

    fn comment(created_at: DateTime<Utc>) -> CommentWithReplies {
        CommentWithReplies {
            comment: Comment {
                id: Uuid::new_v4(),
                task_id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                parent_id: None,
                body: "hello".to_string(),
                created_at,
                updated_at: created_at,
            },
            replies: Vec::new(),
        }
    }

    #[test]
    fn merge_orders_ascending_by_timestamp() {
        let merged = merge_timeline(
            vec![activity(at(3)), activity(at(1))],
            vec![comment(at(2))],
        );

        let times: Vec<DateTime<Utc>> = merged.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![at(1), at(2), at(3)]);
        assert!(matches!(merged[0].item, TimelineItem::Activity(_)));
        assert!(matches!(merged[1].item, TimelineItem::Comment(_)));
        assert!(matches!(merged[2].item, TimelineItem::Activity(_)));
    }

    #[test]
    fn equal_timestamps_put_activities_first() {
        let t = at(5);
        let merged = merge_timeline(vec![activity(t)], vec![comment(t)]);
        assert!(matches!(merged[0].item, TimelineItem::Activity(_)));
        assert!(matches!(merged[1].item, TimelineItem::Comment(_)));
    }

    #[test]
    fn merged_entries_get_fresh_ids() {
        let merged = merge_timeline(vec![activity(at(1))], vec![comment(at(2))]);
        assert_ne!(merged[0].id, merged[1].id);
    }

    #[test]
    fn renderer_falls_back_on_missing_lookups() {
        let now = Utc::now();
        let known_user = User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut lookups = RenderLookups::default();
        lookups.users.insert(known_user.id, known_user.clone());

        let tokens = vec![
            ActivityToken::text("assigned"),
            ActivityToken::Users {
                ids: vec![known_user.id, Uuid::new_v4()],
            },
            ActivityToken::Status { id: Uuid::new_v4() },
            ActivityToken::Date {
                value: (now - Duration::days(1)).date_naive(),
            },
        ];

        let fragments = render_activity(&tokens, &lookups);
        assert_eq!(fragments[0], "assigned");
        assert_eq!(fragments[1], "ada, Unknown user");
        assert_eq!(fragments[2], "Unknown status");
    }
}
