//! Relationship between a viewer and a profile: friendship, pending requests,
//! mutual friends, likes, story visibility and blocks.
//!
//! Every multi-row change (both friendship edges, like edge plus counter,
//! bidirectional story hides) goes through a single storage transaction.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::account::Language;
use crate::error::{logged, SocialError, SocialResult};
use crate::events::prune_expired_events;
use crate::logging;
use crate::storage::{
    EventRow, FriendRequestRow, LikeCategoryRow, LikeRow, NotificationRow, Storage, UserRow,
};

/// How many mutual friends are shown before collapsing into "+N more".
pub const MUTUAL_FRIENDS_PREVIEW: usize = 4;
/// Image used when a user has no photos.
pub const PLACEHOLDER_PHOTO: &str = "https://via.placeholder.com/150";
/// Large placeholder for the profile gallery.
pub const PLACEHOLDER_PROFILE_PHOTO: &str = "https://via.placeholder.com/400";

const ANONYMOUS_USER: &str = "anonymous user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub is_friend: bool,
    pub has_pending_outgoing_request: bool,
}

/// Display projection of a user in friend lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendCard {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub photo: String,
}

impl FriendCard {
    pub fn from_user(user: &UserRow) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: display_name(user),
            photo: first_photo(user).to_string(),
        }
    }
}

fn display_name(user: &UserRow) -> String {
    format!("{} {}", user.first_name, user.last_name)
        .trim()
        .to_string()
}

fn first_photo(user: &UserRow) -> &str {
    user.photo_urls
        .first()
        .map(String::as_str)
        .unwrap_or(PLACEHOLDER_PHOTO)
}

/// The collapsed mutual-friends strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutualFriendsPreview {
    pub shown: Vec<FriendCard>,
    pub total: usize,
    /// `total - 4` when more than four.
    pub more: Option<usize>,
}

impl MutualFriendsPreview {
    pub fn from_friends(friends: &[FriendCard]) -> Self {
        let total = friends.len();
        Self {
            shown: friends.iter().take(MUTUAL_FRIENDS_PREVIEW).cloned().collect(),
            total,
            more: (total > MUTUAL_FRIENDS_PREVIEW).then(|| total - MUTUAL_FRIENDS_PREVIEW),
        }
    }

    /// Suffix shown after the avatars, if any.
    pub fn label(&self) -> Option<String> {
        self.more.map(|n| format!("+{n} more"))
    }
}

/// Where a friend toggle was pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewContext {
    #[default]
    Full,
    /// The cut-down view shown for private profiles to non-friends.
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendToggle {
    RequestSent,
    RequestCancelled,
    Unfriended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub like_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoryVisibility {
    /// The viewer does not see the target's stories.
    pub hide_their_stories: bool,
    /// The target does not see the viewer's stories.
    pub hide_my_stories: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullProfile {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub photos: Vec<String>,
    pub hobbies: Vec<String>,
    pub interests: Vec<String>,
    pub relationship_status: String,
    pub friend_count: u32,
    pub like_count: u32,
    pub is_liked: bool,
    pub stories: StoryVisibility,
    pub relationship: Relationship,
    pub mutual_friends: MutualFriendsPreview,
    pub events: Vec<EventRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestrictedProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub photo: String,
    pub friend_count: u32,
    pub relationship: Relationship,
    pub mutual_friends: MutualFriendsPreview,
}

/// What a viewer gets to see of a profile.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ProfileView {
    Full(FullProfile),
    Restricted(RestrictedProfile),
}

fn require_user(storage: &Storage, id: &str) -> SocialResult<UserRow> {
    storage
        .get_user(id)?
        .ok_or_else(|| SocialError::NotFound(format!("user {id}")))
}

fn reject_self(viewer_id: &str, target_id: &str, what: &str) -> SocialResult<()> {
    if viewer_id == target_id {
        return Err(SocialError::Validation(format!("cannot {what} yourself")));
    }
    Ok(())
}

pub fn resolve_relationship(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
) -> SocialResult<Relationship> {
    Ok(Relationship {
        is_friend: storage.has_friend_edge(viewer_id, target_id)?,
        has_pending_outgoing_request: storage
            .find_friend_request(viewer_id, target_id)?
            .is_some(),
    })
}

/// Friends both users have, resolved to cards. Order follows the target's
/// friend list as stored and is not meaningful.
pub fn compute_mutual_friends(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
) -> SocialResult<Vec<FriendCard>> {
    let viewer_friends: HashSet<String> = storage.list_friend_ids(viewer_id)?.into_iter().collect();
    let mut cards = Vec::new();
    for id in storage.list_friend_ids(target_id)? {
        if !viewer_friends.contains(&id) {
            continue;
        }
        match storage.get_user(&id)? {
            Some(user) => cards.push(FriendCard::from_user(&user)),
            None => crate::slog!(
                "mutual-friends: skipping missing user {}",
                logging::user_id(&id)
            ),
        }
    }
    Ok(cards)
}

/// Case-insensitive username filter for the friends dialog.
pub fn filter_friends(friends: &[FriendCard], query: &str) -> Vec<FriendCard> {
    let query = query.trim().to_lowercase();
    friends
        .iter()
        .filter(|f| f.username.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// The single friend button: send, cancel, or unfriend depending on state.
pub fn toggle_friend_request(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
    context: ViewContext,
    now: i64,
) -> SocialResult<FriendToggle> {
    reject_self(viewer_id, target_id, "befriend")?;
    require_user(storage, target_id)?;

    if storage.has_friend_edge(viewer_id, target_id)? {
        if context == ViewContext::Restricted {
            return Err(SocialError::Forbidden(
                "friends cannot be removed from a private profile view".to_string(),
            ));
        }
        logged("unfriend", storage.delete_friendship(viewer_id, target_id))?;
        crate::slog!(
            "friends: {} unfriended {}",
            logging::user_id(viewer_id),
            logging::user_id(target_id)
        );
        return Ok(FriendToggle::Unfriended);
    }

    if storage.find_friend_request(viewer_id, target_id)?.is_some() {
        logged(
            "friend-request: cancel failed",
            storage.delete_friend_request(viewer_id, target_id),
        )?;
        crate::slog!(
            "friend-request: {} cancelled request to {}",
            logging::user_id(viewer_id),
            logging::user_id(target_id)
        );
        return Ok(FriendToggle::RequestCancelled);
    }

    let sender = storage.get_user(viewer_id)?;
    let request = FriendRequestRow {
        id: 0,
        from_id: viewer_id.to_string(),
        to_id: target_id.to_string(),
        from_name: sender
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
        from_image: sender
            .as_ref()
            .map(|u| first_photo(u).to_string())
            .unwrap_or_else(|| PLACEHOLDER_PHOTO.to_string()),
        status: "pending".to_string(),
        created_at: now,
    };
    logged(
        "friend-request: send failed",
        storage.insert_friend_request(&request),
    )?;
    crate::slog!(
        "friend-request: {} -> {}",
        logging::user_id(viewer_id),
        logging::user_id(target_id)
    );
    Ok(FriendToggle::RequestSent)
}

/// Accept `from_id`'s request: the request is consumed and both edges are
/// written together.
pub fn accept_friend_request(
    storage: &Storage,
    recipient_id: &str,
    from_id: &str,
    now: i64,
) -> SocialResult<()> {
    let accepted = logged(
        "friend-request: accept failed",
        storage.accept_friend_request(from_id, recipient_id, now),
    )?;
    if !accepted {
        return Err(SocialError::NotFound(format!(
            "friend request from {from_id}"
        )));
    }
    crate::slog!(
        "friend-request: {} accepted {}",
        logging::user_id(recipient_id),
        logging::user_id(from_id)
    );
    Ok(())
}

pub fn decline_friend_request(
    storage: &Storage,
    recipient_id: &str,
    from_id: &str,
) -> SocialResult<()> {
    let removed = logged(
        "friend-request: decline failed",
        storage.delete_friend_request(from_id, recipient_id),
    )?;
    if !removed {
        return Err(SocialError::NotFound(format!(
            "friend request from {from_id}"
        )));
    }
    Ok(())
}

pub fn list_incoming_requests(
    storage: &Storage,
    recipient_id: &str,
) -> SocialResult<Vec<FriendRequestRow>> {
    Ok(storage.list_incoming_friend_requests(recipient_id)?)
}

/// Like or unlike a profile. The counter moves in the same transaction as
/// the like edge and never drops below zero.
pub fn toggle_like(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
    now: i64,
) -> SocialResult<LikeToggle> {
    reject_self(viewer_id, target_id, "like")?;
    let target = require_user(storage, target_id)?;

    if storage.has_like(viewer_id, target_id)? {
        let like_count = logged("like: remove failed", storage.delete_like(viewer_id, target_id))?;
        crate::slog!(
            "like: {} unliked {} (count {})",
            logging::user_id(viewer_id),
            logging::user_id(target_id),
            like_count
        );
        return Ok(LikeToggle {
            liked: false,
            like_count,
        });
    }

    let liker = storage.get_user(viewer_id)?;
    let username = liker
        .as_ref()
        .map(|u| u.username.clone())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());
    let liker_image = liker
        .as_ref()
        .map(|u| first_photo(u).to_string())
        .unwrap_or_else(|| PLACEHOLDER_PHOTO.to_string());

    let like = LikeRow {
        liker_id: viewer_id.to_string(),
        target_id: target_id.to_string(),
        username: username.clone(),
        user_image: liker_image.clone(),
        created_at: now,
    };
    let mirror = LikeCategoryRow {
        owner_id: viewer_id.to_string(),
        target_id: target_id.to_string(),
        image: first_photo(&target).to_string(),
        created_at: now,
    };
    let notification = NotificationRow {
        id: 0,
        user_id: target_id.to_string(),
        kind: "like".to_string(),
        from_id: viewer_id.to_string(),
        from_name: username.clone(),
        from_image: liker_image,
        message: format!("{username} liked your profile"),
        created_at: now,
    };
    let like_count = logged(
        "like: add failed",
        storage.insert_like(&like, &mirror, &notification),
    )?;
    crate::slog!(
        "like: {} liked {} (count {})",
        logging::user_id(viewer_id),
        logging::user_id(target_id),
        like_count
    );
    Ok(LikeToggle {
        liked: true,
        like_count,
    })
}

pub fn story_visibility(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
) -> SocialResult<StoryVisibility> {
    Ok(StoryVisibility {
        hide_their_stories: storage.is_story_hidden(viewer_id, target_id)?,
        hide_my_stories: storage.is_hiding_stories_from(viewer_id, target_id)?,
    })
}

/// Flip "hide their stories from me". Returns the new state.
pub fn toggle_hide_their_stories(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
) -> SocialResult<bool> {
    reject_self(viewer_id, target_id, "hide stories from")?;
    let hidden = !storage.is_story_hidden(viewer_id, target_id)?;
    logged(
        "stories: update failed",
        storage.set_hidden_story(viewer_id, target_id, hidden),
    )?;
    Ok(hidden)
}

/// Flip "hide my stories from them". Both users' documents change together.
/// Returns the new state.
pub fn toggle_hide_my_stories(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
) -> SocialResult<bool> {
    reject_self(viewer_id, target_id, "hide stories from")?;
    require_user(storage, target_id)?;
    let hidden = !storage.is_hiding_stories_from(viewer_id, target_id)?;
    logged(
        "stories: update failed",
        storage.set_hide_my_stories(viewer_id, target_id, hidden),
    )?;
    Ok(hidden)
}

pub fn block_user(storage: &Storage, viewer_id: &str, target_id: &str, now: i64) -> SocialResult<()> {
    reject_self(viewer_id, target_id, "block")?;
    logged("block failed", storage.insert_block(viewer_id, target_id, now))?;
    crate::slog!(
        "block: {} blocked {}",
        logging::user_id(viewer_id),
        logging::user_id(target_id)
    );
    Ok(())
}

pub fn is_blocked(storage: &Storage, viewer_id: &str, target_id: &str) -> SocialResult<bool> {
    Ok(storage.is_blocked(viewer_id, target_id)?)
}

/// Build the profile page for `viewer_id`. Private profiles are cut down to
/// the restricted view unless the viewer is a friend.
pub fn view_profile(
    storage: &Storage,
    viewer_id: &str,
    target_id: &str,
    now_local: NaiveDateTime,
    language: Language,
) -> SocialResult<ProfileView> {
    let target = require_user(storage, target_id)?;
    let relationship = resolve_relationship(storage, viewer_id, target_id)?;
    let mutual = compute_mutual_friends(storage, viewer_id, target_id)?;
    let mutual_friends = MutualFriendsPreview::from_friends(&mutual);
    let friend_count = storage.count_friends(target_id)?;

    if target.is_private && !relationship.is_friend && viewer_id != target_id {
        return Ok(ProfileView::Restricted(RestrictedProfile {
            id: target.id.clone(),
            username: target.username.clone(),
            display_name: display_name(&target),
            photo: first_photo(&target).to_string(),
            friend_count,
            relationship,
            mutual_friends,
        }));
    }

    let photos = if target.photo_urls.is_empty() {
        vec![PLACEHOLDER_PROFILE_PHOTO.to_string()]
    } else {
        target.photo_urls.clone()
    };
    let non_empty = |values: [&String; 2]| -> Vec<String> {
        values
            .into_iter()
            .filter(|v| !v.is_empty())
            .cloned()
            .collect()
    };

    Ok(ProfileView::Full(FullProfile {
        hobbies: non_empty([&target.first_hobby, &target.second_hobby]),
        interests: non_empty([&target.first_interest, &target.second_interest]),
        is_liked: storage.has_like(viewer_id, target_id)?,
        stories: story_visibility(storage, viewer_id, target_id)?,
        events: prune_expired_events(storage, target_id, now_local, language)?,
        id: target.id,
        username: target.username,
        first_name: target.first_name,
        last_name: target.last_name,
        photos,
        relationship_status: target.relationship_status,
        friend_count,
        like_count: target.like_count,
        relationship,
        mutual_friends,
    }))
}
