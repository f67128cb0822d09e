use super::*;
use serde_json::json;

// =============================================================================
// Provider
// =============================================================================

#[test]
fn provider_parses_known_tags() {
    assert_eq!(Provider::from("local"), Provider::Local);
    assert_eq!(Provider::from("google"), Provider::Google);
    assert_eq!(Provider::from("GitHub"), Provider::GitHub);
}

#[test]
fn provider_unrecognized_is_unknown() {
    assert_eq!(Provider::from("facebook"), Provider::Unknown);
    assert_eq!(Provider::from(""), Provider::Unknown);
}

#[test]
fn provider_serde_lowercase() {
    assert_eq!(serde_json::to_value(Provider::GitHub).unwrap(), json!("github"));
    let p: Provider = serde_json::from_value(json!("twitter")).unwrap();
    assert_eq!(p, Provider::Unknown);
}

#[test]
fn provider_only_google_and_github_are_oauth() {
    assert!(Provider::Google.is_oauth());
    assert!(Provider::GitHub.is_oauth());
    assert!(!Provider::Local.is_oauth());
    assert!(!Provider::Unknown.is_oauth());
}

// =============================================================================
// User
// =============================================================================

#[test]
fn user_accepts_mongo_style_id() {
    let user: User = serde_json::from_value(json!({ "_id": "abc", "username": "u" })).unwrap();
    assert_eq!(user.id, "abc");
    assert_eq!(user.username.as_deref(), Some("u"));
}

#[test]
fn user_accepts_numeric_id() {
    let user: User = serde_json::from_value(json!({ "id": 42 })).unwrap();
    assert_eq!(user.id, "42");
}

#[test]
fn user_accepts_both_id_keys() {
    let user: User = serde_json::from_value(json!({ "_id": "abc", "id": "abc", "username": "u" })).unwrap();
    assert_eq!(user.id, "abc");
    assert!(user.extra.is_empty());

    let user: User = serde_json::from_value(json!({ "_id": "mongo", "id": "  " })).unwrap();
    assert_eq!(user.id, "mongo");
}

#[test]
fn user_without_id_is_rejected() {
    let result: Result<User, _> = serde_json::from_value(json!({ "username": "u" }));
    assert!(result.is_err());
}

#[test]
fn user_with_blank_id_is_rejected() {
    let result: Result<User, _> = serde_json::from_value(json!({ "id": "  " }));
    assert!(result.is_err());
}

#[test]
fn user_keeps_unknown_fields() {
    let raw = json!({ "id": "1", "username": "u", "avatar": "http://img", "email": "u@x.io" });
    let user: User = serde_json::from_value(raw).unwrap();
    assert_eq!(user.extra.get("avatar"), Some(&json!("http://img")));

    let back = serde_json::to_value(&user).unwrap();
    assert_eq!(back["email"], json!("u@x.io"));
    assert_eq!(back["id"], json!("1"));
    assert!(back.get("provider").is_none());
}

#[test]
fn user_display_name_prefers_username() {
    let mut user = User::new("7");
    assert_eq!(user.display_name(), "7");
    user.name = Some("Seven".into());
    assert_eq!(user.display_name(), "Seven");
    user.username = Some("seven".into());
    assert_eq!(user.display_name(), "seven");
}

// =============================================================================
// Requests
// =============================================================================

#[test]
fn login_request_debug_redacts_password() {
    let req = LoginRequest { username: "u".into(), password: "hunter2".into() };
    let dbg = format!("{req:?}");
    assert!(dbg.contains("u"));
    assert!(!dbg.contains("hunter2"));
}

#[test]
fn register_request_serializes_all_fields() {
    let req = RegisterRequest { name: "N".into(), username: "u".into(), password: "p".into() };
    assert_eq!(serde_json::to_value(&req).unwrap(), json!({ "name": "N", "username": "u", "password": "p" }));
}

#[test]
fn register_response_tolerates_empty_object() {
    let resp: RegisterResponse = serde_json::from_value(json!({})).unwrap();
    assert!(resp.message.is_none());
}

// =============================================================================
// Posts
// =============================================================================

#[test]
fn post_author_may_be_id_or_profile() {
    let by_id: Post =
        serde_json::from_value(json!({ "_id": "p1", "title": "t", "content": "c", "author": "u1" })).unwrap();
    let by_profile: Post = serde_json::from_value(json!({
        "_id": "p2", "title": "t", "content": "c",
        "author": { "_id": "u1", "username": "alice" },
        "createdAt": "2024-01-02T00:00:00Z"
    }))
    .unwrap();

    let author = User::new("u1");
    assert!(by_id.is_authored_by(&author));
    assert!(by_profile.is_authored_by(&author));
    assert!(!by_profile.is_authored_by(&User::new("u2")));
    assert_eq!(by_profile.created_at.as_deref(), Some("2024-01-02T00:00:00Z"));
}

#[test]
fn post_without_author_has_no_owner() {
    let post: Post = serde_json::from_value(json!({ "id": "p", "title": "t", "content": "c" })).unwrap();
    assert!(!post.is_authored_by(&User::new("u1")));
}

#[test]
fn draft_requires_title_and_content() {
    let draft = PostDraft { title: " ".into(), content: "body".into(), image: None };
    assert_eq!(draft.validate(), Err(DraftError::MissingTitle));

    let draft = PostDraft { title: "t".into(), content: "\n".into(), image: None };
    assert_eq!(draft.validate(), Err(DraftError::MissingContent));
}

#[test]
fn draft_drops_blank_image() {
    let draft = PostDraft { title: "t".into(), content: "c".into(), image: Some("  ".into()) };
    let valid = draft.validate().unwrap();
    assert!(valid.image.is_none());
    assert!(serde_json::to_value(&valid).unwrap().get("image").is_none());
}
