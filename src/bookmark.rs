use async_trait::async_trait;
use thiserror::Error;

use crate::api::ApiError;
use crate::feed::RefreshKey;
use crate::models::Post;
use crate::session::Session;

#[async_trait]
pub trait BookmarkApi: Send + Sync {
    async fn set_bookmark(&self, post_id: &str, bookmarked: bool) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("log in to bookmark postings")]
    LoginRequired,
    #[error("could not update bookmark for post {post_id}: {source}")]
    RolledBack {
        post_id: String,
        #[source]
        source: ApiError,
    },
}

impl BookmarkError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            BookmarkError::RolledBack { source: ApiError::Unauthorized, .. }
        )
    }
}

/// Flips `post.is_bookmarked` right away, then asks the server to do the
/// same. On failure the flag is restored. The refresh key is bumped in both
/// cases so the feed re-reads server truth.
pub async fn toggle_bookmark(
    api: &dyn BookmarkApi,
    session: &Session,
    post: &mut Post,
    refresh: &RefreshKey,
) -> Result<bool, BookmarkError> {
    if !session.is_authenticated() {
        return Err(BookmarkError::LoginRequired);
    }

    let previous = post.is_bookmarked;
    post.is_bookmarked = !previous;

    match api.set_bookmark(&post.id, post.is_bookmarked).await {
        Ok(()) => {
            refresh.bump();
            Ok(post.is_bookmarked)
        }
        Err(source) => {
            tracing::warn!(post_id = %post.id, "bookmark update failed, rolling back: {source}");
            post.is_bookmarked = previous;
            refresh.bump();
            Err(BookmarkError::RolledBack {
                post_id: post.id.clone(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmploymentEndDate;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeApi {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BookmarkApi for FakeApi {
        async fn set_bookmark(&self, _post_id: &str, _bookmarked: bool) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Status { status: 500, code: None, message: "nope".into() })
            } else {
                Ok(())
            }
        }
    }

    fn post() -> Post {
        Post {
            id: "42".to_string(),
            company_name: "Waffle".to_string(),
            employment_end_date: EmploymentEndDate::Always,
            position_title: "Designer".to_string(),
            position_type: "DESIGN".to_string(),
            domain: "CONTENTS".to_string(),
            slogan: String::new(),
            head_count: 1,
            is_bookmarked: false,
        }
    }

    fn logged_in() -> Session {
        let session = Session::new(Arc::new(MemoryStore::new()));
        session.store("jwt").unwrap();
        session
    }

    #[tokio::test]
    async fn test_success_keeps_optimistic_flag_and_refreshes() {
        let api = FakeApi { fail: false, calls: AtomicUsize::new(0) };
        let refresh = RefreshKey::new();
        let mut post = post();

        let now = toggle_bookmark(&api, &logged_in(), &mut post, &refresh).await.unwrap();
        assert!(now);
        assert!(post.is_bookmarked);
        assert_eq!(refresh.current(), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_refreshes() {
        let api = FakeApi { fail: true, calls: AtomicUsize::new(0) };
        let refresh = RefreshKey::new();
        let mut post = post();

        let err = toggle_bookmark(&api, &logged_in(), &mut post, &refresh)
            .await
            .unwrap_err();
        assert!(matches!(err, BookmarkError::RolledBack { .. }));
        assert!(!err.is_auth_expired());
        assert!(!post.is_bookmarked);
        assert_eq!(refresh.current(), 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logged_out_user_is_asked_to_log_in() {
        let api = FakeApi { fail: false, calls: AtomicUsize::new(0) };
        let refresh = RefreshKey::new();
        let mut post = post();
        let session = Session::new(Arc::new(MemoryStore::new()));

        let err = toggle_bookmark(&api, &session, &mut post, &refresh)
            .await
            .unwrap_err();
        assert!(matches!(err, BookmarkError::LoginRequired));
        assert!(!post.is_bookmarked);
        assert_eq!(refresh.current(), 0);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
