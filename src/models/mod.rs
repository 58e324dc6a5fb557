use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub mod db_operations;
pub mod roles;

pub use roles::{has_capability, Capability, Role};

/// One of the two content channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ar,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }

    /// Text direction for templates.
    pub fn dir(self) -> &'static str {
        match self {
            Locale::En => "ltr",
            Locale::Ar => "rtl",
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ar" => Ok(Locale::Ar),
            other => Err(format!("unsupported locale '{}'", other)),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Military,
    Political,
    Economic,
    Security,
    Humanitarian,
    Diplomatic,
    Analysis,
    General,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Military,
        Category::Political,
        Category::Economic,
        Category::Security,
        Category::Humanitarian,
        Category::Diplomatic,
        Category::Analysis,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Military => "military",
            Category::Political => "political",
            Category::Economic => "economic",
            Category::Security => "security",
            Category::Humanitarian => "humanitarian",
            Category::Diplomatic => "diplomatic",
            Category::Analysis => "analysis",
            Category::General => "general",
        }
    }

    pub fn arabic_label(self) -> &'static str {
        match self {
            Category::Military => "عسكري",
            Category::Political => "سياسي",
            Category::Economic => "اقتصادي",
            Category::Security => "أمني",
            Category::Humanitarian => "إنساني",
            Category::Diplomatic => "دبلوماسي",
            Category::Analysis => "تحليل",
            Category::General => "عام",
        }
    }

    /// Lenient parse of an English or Arabic label. Unknown labels yield `None`.
    pub fn parse_label(label: &str) -> Option<Category> {
        let trimmed = label.trim().trim_matches(|c: char| c == '#' || c == '*' || c == '_');
        let lower = trimmed.to_lowercase();
        Category::ALL.iter().copied().find(|c| {
            lower.starts_with(c.as_str()) || trimmed.contains(c.arabic_label())
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    /// Allowed explicit status changes. Staying in the same status is not a transition.
    pub fn can_transition_to(self, next: ArticleStatus) -> bool {
        use ArticleStatus::*;
        matches!(
            (self, next),
            (Draft, Published)
                | (Draft, Archived)
                | (Published, Draft)
                | (Published, Archived)
                | (Archived, Draft)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
            ArticleStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(ArticleStatus::Draft),
            "published" => Ok(ArticleStatus::Published),
            "archived" => Ok(ArticleStatus::Archived),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub views: u64,
    pub likes: u64,
    pub dislikes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    /// Logical article shared by the English and Arabic rows.
    pub group_id: String,
    pub locale: Locale,
    pub title: String,
    pub excerpt: String,
    pub raw_content: String,
    pub content: String,
    pub category: Category,
    pub countries: BTreeSet<String>,
    pub organizations: BTreeSet<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub status: ArticleStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub engagement: Engagement,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Date used for listing order and the time-window filter.
    pub fn display_date(&self) -> DateTime<Utc> {
        self.published_at
            .or(self.scheduled_at)
            .unwrap_or(self.created_at)
    }

    pub fn has_video(&self) -> bool {
        self.video_url.as_deref().map_or(false, |url| !url.trim().is_empty())
    }

    /// Published and not scheduled for a later time.
    pub fn is_public(&self, now: DateTime<Utc>) -> bool {
        self.status == ArticleStatus::Published
            && self.scheduled_at.map_or(true, |at| at <= now)
    }

    pub fn lists_country(&self, country: &str) -> bool {
        let wanted = country.trim().to_lowercase();
        self.countries.iter().any(|c| c.to_lowercase() == wanted)
    }
}

/// Editable article fields coming from the admin form or the raw post import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleDraft {
    pub group_id: Option<String>,
    pub locale: Option<Locale>,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub raw_content: String,
    pub category: Option<Category>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update sent by the editor's autosave.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleAutosave {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub raw_content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationTier {
    Essential,
    Recommended,
    Optional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReview {
    pub id: String,
    pub group_id: String,
    pub locale: Locale,
    pub title: String,
    pub author: String,
    pub rating: Option<u8>,
    pub recommendation: RecommendationTier,
    pub key_points: Vec<String>,
    pub cover_url: Option<String>,
    pub telegram_link: Option<String>,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookReviewDraft {
    pub group_id: Option<String>,
    pub locale: Locale,
    pub title: String,
    pub author: String,
    pub rating: Option<u8>,
    pub recommendation: RecommendationTier,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub cover_url: Option<String>,
    pub telegram_link: Option<String>,
    pub status: Option<ArticleStatus>,
}

/// Who wrote a comment: a registered user or a guest bound to a client-side session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CommentAuthor {
    User { user_id: i64, display_name: String },
    Guest { name: String, session_id: String },
}

/// The identity making a request, used for comment and vote ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    User { user_id: i64, role: Role },
    Guest { session_id: String },
}

impl Requester {
    /// Stable key for one-vote-per-voter bookkeeping.
    pub fn voter_key(&self) -> String {
        match self {
            Requester::User { user_id, .. } => format!("user:{}", user_id),
            Requester::Guest { session_id } => format!("guest:{}", session_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    pub parent_id: Option<String>,
    pub author: CommentAuthor,
    pub content: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_owned_by(&self, requester: &Requester) -> bool {
        match (&self.author, requester) {
            (CommentAuthor::User { user_id, .. }, Requester::User { user_id: other, .. }) => {
                user_id == other
            }
            (CommentAuthor::Guest { session_id, .. }, Requester::Guest { session_id: other }) => {
                !session_id.is_empty() && session_id == other
            }
            _ => false,
        }
    }
}

/// A top-level comment with its one level of replies.
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub display_name: String,
    pub is_active: bool,
    pub last_login_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteValue {
    Like,
    Dislike,
}

impl VoteValue {
    pub fn from_i8(value: i8) -> Option<VoteValue> {
        match value {
            1 => Some(VoteValue::Like),
            -1 => Some(VoteValue::Dislike),
            _ => None,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }
}

/// Change to apply to an article's like/dislike counters after a vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteDelta {
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        assert!(ArticleStatus::Draft.can_transition_to(ArticleStatus::Published));
        assert!(ArticleStatus::Published.can_transition_to(ArticleStatus::Archived));
        assert!(!ArticleStatus::Archived.can_transition_to(ArticleStatus::Published));
        assert!(!ArticleStatus::Draft.can_transition_to(ArticleStatus::Draft));
    }

    #[test]
    fn category_labels_parse_in_both_languages() {
        assert_eq!(Category::parse_label("Military"), Some(Category::Military));
        assert_eq!(Category::parse_label("عسكري"), Some(Category::Military));
        assert_eq!(Category::parse_label("#Economic"), Some(Category::Economic));
        assert_eq!(Category::parse_label("sports"), None);
    }

    #[test]
    fn guest_ownership_requires_matching_session() {
        let now = Utc::now();
        let comment = Comment {
            id: "c1".into(),
            article_id: "a1".into(),
            parent_id: None,
            author: CommentAuthor::Guest { name: "Sam".into(), session_id: "s-1".into() },
            content: "hi".into(),
            edited: false,
            created_at: now,
            updated_at: now,
        };
        assert!(comment.is_owned_by(&Requester::Guest { session_id: "s-1".into() }));
        assert!(!comment.is_owned_by(&Requester::Guest { session_id: "s-2".into() }));
        assert!(!comment.is_owned_by(&Requester::User { user_id: 1, role: Role::Admin }));
    }

    #[test]
    fn voter_keys_separate_users_and_guests() {
        let user = Requester::User { user_id: 7, role: Role::Viewer };
        let guest = Requester::Guest { session_id: "7".into() };
        assert_ne!(user.voter_key(), guest.voter_key());
    }
}
