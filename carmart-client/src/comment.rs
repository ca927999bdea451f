use std::collections::HashMap;

use crate::api::{Comment, CommentEvent, CommentId};

/// A top-level comment along with its replies
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentWithReplies {
    #[serde(flatten)]
    pub comment: Comment,

    /// Chronological order, only ever populated for top-level comments
    pub replies: Vec<CommentWithReplies>,
}

impl CommentWithReplies {
    pub fn leaf(comment: Comment) -> CommentWithReplies {
        CommentWithReplies {
            comment,
            replies: Vec::new(),
        }
    }
}

/// Groups a flat list of comments into top-level comments carrying their replies.
///
/// `comments` is expected newest-first, and top-level comments keep that order.
/// Replies whose parent is not a top-level comment of `comments` are dropped.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentWithReplies> {
    let mut top = Vec::new();
    let mut replies: HashMap<CommentId, Vec<CommentWithReplies>> = HashMap::new();
    for c in comments {
        match c.parent_id {
            None => top.push(c),
            Some(parent) => replies
                .entry(parent)
                .or_insert_with(Vec::new)
                .push(CommentWithReplies::leaf(c)),
        }
    }

    let res = top
        .into_iter()
        .map(|comment| {
            let mut replies = replies.remove(&comment.id).unwrap_or_default();
            replies.sort_by_key(|r| r.comment.created_at);
            CommentWithReplies { comment, replies }
        })
        .collect();

    let dropped = replies.values().map(Vec::len).sum::<usize>();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped replies without a top-level parent");
    }
    res
}

/// The comments of one listing, patched in place as mutations come in
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentThread {
    pub comments: Vec<CommentWithReplies>,
}

impl CommentThread {
    pub fn new(comments: Vec<Comment>) -> CommentThread {
        CommentThread {
            comments: build_tree(comments),
        }
    }

    /// Number of comments, replies included
    pub fn len(&self) -> usize {
        self.comments.iter().map(|c| 1 + c.replies.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn find(&self, id: CommentId) -> Option<&Comment> {
        self.comments
            .iter()
            .flat_map(|c| std::iter::once(c).chain(c.replies.iter()))
            .map(|c| &c.comment)
            .find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        for c in self.comments.iter_mut() {
            if c.comment.id == id {
                return Some(&mut c.comment);
            }
            if let Some(r) = c.replies.iter_mut().find(|r| r.comment.id == id) {
                return Some(&mut r.comment);
            }
        }
        None
    }

    /// Returns false if the comment was dropped for lack of a top-level parent
    pub fn insert(&mut self, c: Comment) -> bool {
        if self.find(c.id).is_some() {
            // already known, eg. the feed echoing back our own submission
            return self.update(c);
        }
        match c.parent_id {
            None => {
                let idx = self
                    .comments
                    .partition_point(|o| o.comment.created_at >= c.created_at);
                self.comments.insert(idx, CommentWithReplies::leaf(c));
                true
            }
            Some(parent) => match self.comments.iter_mut().find(|o| o.comment.id == parent) {
                None => {
                    tracing::debug!(id = ?c.id, ?parent, "dropping reply without a top-level parent");
                    false
                }
                Some(p) => {
                    let idx = p
                        .replies
                        .partition_point(|r| r.comment.created_at <= c.created_at);
                    p.replies.insert(idx, CommentWithReplies::leaf(c));
                    true
                }
            },
        }
    }

    /// Only the content of a comment can change
    pub fn update(&mut self, c: Comment) -> bool {
        match self.find_mut(c.id) {
            Some(existing) => {
                existing.content = c.content;
                true
            }
            None => false,
        }
    }

    /// Removing a top-level comment also removes its replies
    pub fn remove(&mut self, id: CommentId) -> bool {
        if let Some(idx) = self.comments.iter().position(|c| c.comment.id == id) {
            self.comments.remove(idx);
            return true;
        }
        for c in self.comments.iter_mut() {
            if let Some(idx) = c.replies.iter().position(|r| r.comment.id == id) {
                c.replies.remove(idx);
                return true;
            }
        }
        false
    }

    pub fn apply(&mut self, e: CommentEvent) -> bool {
        match e {
            CommentEvent::Created(c) => self.insert(c),
            CommentEvent::Updated(c) => self.update(c),
            CommentEvent::Deleted { comment_id, .. } => self.remove(comment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::api::{ListingId, Time, UserId, UserSnapshot};

    fn date(s: &str) -> Time {
        let d = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
    }

    fn comment(id: i64, parent_id: Option<i64>, created_at: Time) -> Comment {
        Comment {
            id: CommentId(id),
            car_id: ListingId(1),
            user_id: UserId::stub(),
            parent_id: parent_id.map(CommentId),
            content: format!("comment {id}"),
            created_at,
            user: UserSnapshot {
                id: UserId::stub(),
                full_name: Some(String::from("Test User")),
                email: None,
                phone_number: None,
            },
        }
    }

    fn ids(tree: &[CommentWithReplies]) -> Vec<(i64, Vec<i64>)> {
        tree.iter()
            .map(|c| {
                (
                    c.comment.id.0,
                    c.replies.iter().map(|r| r.comment.id.0).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn empty_input() {
        assert_eq!(build_tree(vec![]), vec![]);
    }

    #[test]
    fn single_comment() {
        let tree = build_tree(vec![comment(1, None, date("2024-01-01"))]);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn replies_are_sorted_ascending() {
        let tree = build_tree(vec![
            comment(1, None, date("2024-01-02")),
            comment(2, Some(1), date("2024-01-03")),
            comment(3, Some(1), date("2024-01-01")),
        ]);
        assert_eq!(ids(&tree), vec![(1, vec![3, 2])]);
    }

    #[test]
    fn top_level_order_is_kept() {
        // the builder does not re-sort top-level comments
        let tree = build_tree(vec![
            comment(1, None, date("2024-01-01")),
            comment(2, None, date("2024-01-05")),
            comment(3, Some(2), date("2024-01-06")),
        ]);
        assert_eq!(ids(&tree), vec![(1, vec![]), (2, vec![3])]);
    }

    #[test]
    fn orphans_are_dropped() {
        assert_eq!(build_tree(vec![comment(5, Some(99), date("2024-01-01"))]), vec![]);

        // a reply to a reply has no top-level parent either
        let tree = build_tree(vec![
            comment(1, None, date("2024-01-01")),
            comment(2, Some(1), date("2024-01-02")),
            comment(3, Some(2), date("2024-01-03")),
        ]);
        assert_eq!(ids(&tree), vec![(1, vec![2])]);
    }

    #[test]
    fn tree_serializes_flat_fields() {
        let tree = build_tree(vec![
            comment(1, None, date("2024-01-01")),
            comment(2, Some(1), date("2024-01-02")),
        ]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["user"]["full_name"], "Test User");
        assert_eq!(json[0]["replies"][0]["parent_id"], 1);
        assert_eq!(json[0]["replies"][0]["replies"], serde_json::json!([]));
        let back: Vec<CommentWithReplies> = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    /// Builds a well-formed comment list out of fuzzer input: every reply points
    /// to a top-level comment defined earlier in the list
    fn well_formed(shape: &[(bool, u8, u16)]) -> Vec<Comment> {
        let base = date("2024-01-01");
        let mut top_ids = Vec::new();
        let mut res = Vec::new();
        for (i, (is_reply, parent_sel, minutes)) in shape.iter().enumerate() {
            let id = i as i64;
            let created_at = base + Duration::minutes(i64::from(*minutes));
            if *is_reply && !top_ids.is_empty() {
                let parent = top_ids[usize::from(*parent_sel) % top_ids.len()];
                res.push(comment(id, Some(parent), created_at));
            } else {
                top_ids.push(id);
                res.push(comment(id, None, created_at));
            }
        }
        res
    }

    #[test]
    fn tree_properties() {
        bolero::check!()
            .with_type::<Vec<(bool, u8, u16)>>()
            .cloned()
            .for_each(|shape| {
                let comments = well_formed(&shape);
                let num_top = comments.iter().filter(|c| c.parent_id.is_none()).count();
                let num_replies = comments.len() - num_top;

                let tree = build_tree(comments.clone());
                assert_eq!(tree.len(), num_top);
                assert_eq!(tree.iter().map(|c| c.replies.len()).sum::<usize>(), num_replies);
                for c in &tree {
                    for w in c.replies.windows(2) {
                        assert!(w[0].comment.created_at <= w[1].comment.created_at);
                    }
                    for r in &c.replies {
                        assert_eq!(r.comment.parent_id, Some(c.comment.id));
                        assert!(r.replies.is_empty());
                    }
                }

                // running twice gives the same result
                assert_eq!(build_tree(comments), tree);
            });
    }

    #[test]
    fn thread_patching() {
        let mut thread = CommentThread::new(vec![
            comment(2, None, date("2024-01-02")),
            comment(1, None, date("2024-01-01")),
            comment(3, Some(1), date("2024-01-03")),
        ]);
        assert_eq!(thread.len(), 3);

        // new top-level comments go first
        assert!(thread.insert(comment(4, None, date("2024-01-04"))));
        // replies keep chronological order
        assert!(thread.insert(comment(5, Some(1), date("2024-01-02"))));
        // replies to replies are dropped
        assert!(!thread.insert(comment(6, Some(3), date("2024-01-05"))));
        assert_eq!(
            ids(&thread.comments),
            vec![(4, vec![]), (2, vec![]), (1, vec![5, 3])]
        );

        let mut edited = comment(5, Some(1), date("2024-01-02"));
        edited.content = String::from("edited");
        assert!(thread.apply(CommentEvent::Updated(edited)));
        assert_eq!(thread.find(CommentId(5)).unwrap().content, "edited");

        // inserting a known comment only refreshes its content
        assert!(thread.insert(comment(5, Some(1), date("2024-01-02"))));
        assert_eq!(thread.len(), 5);

        assert!(thread.apply(CommentEvent::Deleted {
            car_id: ListingId(1),
            comment_id: CommentId(1),
        }));
        assert_eq!(ids(&thread.comments), vec![(4, vec![]), (2, vec![])]);
        assert!(!thread.remove(CommentId(3)));
        assert!(!thread.update(comment(42, None, date("2024-01-01"))));
    }
}
