//! Friends' activity feed
//!
//! Feed items are computed per request from the friend graph and the
//! external activity stores; nothing is persisted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use serde_json::json;

use super::{FriendService, validate_id};
use crate::config::FeedConfig;
use crate::data::{Database, FeedItem, FriendSummary};
use crate::error::AppError;
use crate::metrics::{FEED_CHECK_FAILURES_TOTAL, FEED_ITEMS_TOTAL};

/// Half-open day `[start, end)` in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// The calendar day containing `now` at the given offset
    pub fn today(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local_midnight = now
            .with_timezone(&offset)
            .date_naive()
            .and_time(NaiveTime::MIN);
        let utc_midnight =
            local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
        let start = Utc.from_utc_datetime(&utc_midnight);

        Self {
            start,
            end: start + Duration::hours(24),
        }
    }
}

/// Read side of the nutrition and activity stores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn daily_water_ml(&self, user_id: &str, window: DayWindow) -> Result<f64, AppError>;
    async fn daily_steps(&self, user_id: &str, window: DayWindow) -> Result<i64, AppError>;
}

#[async_trait]
impl ActivityStore for Database {
    async fn daily_water_ml(&self, user_id: &str, window: DayWindow) -> Result<f64, AppError> {
        self.total_water_ml(user_id, window.start, window.end).await
    }

    async fn daily_steps(&self, user_id: &str, window: DayWindow) -> Result<i64, AppError> {
        self.total_steps(user_id, window.start, window.end).await
    }
}

/// One goal rule evaluated for each friend
#[async_trait]
pub trait ActivityCheck: Send + Sync {
    fn activity_type(&self) -> &'static str;

    async fn evaluate(
        &self,
        friend: &FriendSummary,
        window: DayWindow,
    ) -> Result<Option<FeedItem>, AppError>;
}

/// Emits `water_goal` once a friend's daily water reaches the goal
pub struct HydrationGoalCheck {
    store: Arc<dyn ActivityStore>,
    goal_ml: f64,
}

impl HydrationGoalCheck {
    pub fn new(store: Arc<dyn ActivityStore>, goal_ml: f64) -> Self {
        Self { store, goal_ml }
    }
}

#[async_trait]
impl ActivityCheck for HydrationGoalCheck {
    fn activity_type(&self) -> &'static str {
        "water_goal"
    }

    async fn evaluate(
        &self,
        friend: &FriendSummary,
        window: DayWindow,
    ) -> Result<Option<FeedItem>, AppError> {
        let total = self.store.daily_water_ml(&friend.friend_id, window).await?;
        if total < self.goal_ml {
            return Ok(None);
        }

        Ok(Some(FeedItem {
            user_id: friend.friend_id.clone(),
            user_name: friend.display_name(),
            activity_type: self.activity_type().to_string(),
            activity_data: json!({
                "total_water_ml": total,
                "goal_ml": self.goal_ml,
                "goal_met": true,
            }),
            created_at: Utc::now(),
        }))
    }
}

/// Emits `step_goal` once a friend's daily steps reach the goal
pub struct StepGoalCheck {
    store: Arc<dyn ActivityStore>,
    goal_steps: i64,
}

impl StepGoalCheck {
    pub fn new(store: Arc<dyn ActivityStore>, goal_steps: i64) -> Self {
        Self { store, goal_steps }
    }
}

#[async_trait]
impl ActivityCheck for StepGoalCheck {
    fn activity_type(&self) -> &'static str {
        "step_goal"
    }

    async fn evaluate(
        &self,
        friend: &FriendSummary,
        window: DayWindow,
    ) -> Result<Option<FeedItem>, AppError> {
        let steps = self.store.daily_steps(&friend.friend_id, window).await?;
        if steps < self.goal_steps {
            return Ok(None);
        }

        Ok(Some(FeedItem {
            user_id: friend.friend_id.clone(),
            user_name: friend.display_name(),
            activity_type: self.activity_type().to_string(),
            activity_data: json!({
                "total_steps": steps,
                "goal_steps": self.goal_steps,
                "goal_met": true,
            }),
            created_at: Utc::now(),
        }))
    }
}

pub struct FeedAggregator {
    friends: Arc<FriendService>,
    checks: Vec<Box<dyn ActivityCheck>>,
    default_offset: FixedOffset,
}

impl FeedAggregator {
    pub fn new(
        friends: Arc<FriendService>,
        checks: Vec<Box<dyn ActivityCheck>>,
        default_offset: FixedOffset,
    ) -> Self {
        Self {
            friends,
            checks,
            default_offset,
        }
    }

    /// Hydration check always, step check when enabled
    pub fn from_config(
        config: &FeedConfig,
        friends: Arc<FriendService>,
        store: Arc<dyn ActivityStore>,
    ) -> Result<Self, AppError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!(
                "feed.utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;

        let mut checks: Vec<Box<dyn ActivityCheck>> = vec![Box::new(HydrationGoalCheck::new(
            store.clone(),
            config.water_goal_ml,
        ))];
        if config.step_check_enabled {
            checks.push(Box::new(StepGoalCheck::new(store, config.step_goal)));
        }

        Ok(Self::new(friends, checks, offset))
    }

    /// Feed for `user_id` over today's window at `offset`
    ///
    /// A friend whose lookup fails is logged and left out.
    pub async fn friends_activity_feed(
        &self,
        user_id: &str,
        offset: Option<FixedOffset>,
    ) -> Result<Vec<FeedItem>, AppError> {
        validate_id("user_id", user_id)?;

        let friends = self.friends.get_friends(user_id).await?;
        let window = DayWindow::today(Utc::now(), offset.unwrap_or(self.default_offset));

        let per_friend = join_all(
            friends
                .iter()
                .map(|friend| self.items_for_friend(friend, window)),
        )
        .await;

        let items: Vec<FeedItem> = per_friend.into_iter().flatten().collect();
        tracing::debug!(user_id, friends = friends.len(), items = items.len(), "Feed built");

        Ok(items)
    }

    async fn items_for_friend(&self, friend: &FriendSummary, window: DayWindow) -> Vec<FeedItem> {
        let mut items = Vec::new();

        for check in &self.checks {
            match check.evaluate(friend, window).await {
                Ok(Some(item)) => {
                    FEED_ITEMS_TOTAL
                        .with_label_values(&[check.activity_type()])
                        .inc();
                    items.push(item);
                }
                Ok(None) => {}
                Err(error) => {
                    FEED_CHECK_FAILURES_TOTAL
                        .with_label_values(&[check.activity_type()])
                        .inc();
                    tracing::warn!(
                        friend_id = %friend.friend_id,
                        activity_type = check.activity_type(),
                        error = %error,
                        "Activity lookup failed; friend skipped"
                    );
                    return Vec::new();
                }
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FriendAction, User};
    use anyhow::anyhow;
    use mockall::predicate::eq;

    async fn friends_of_alice(others: &[&str]) -> Arc<FriendService> {
        let db = Arc::new(Database::connect_in_memory().await.unwrap());
        let now = Utc::now();
        for id in std::iter::once(&"alice").chain(others) {
            db.upsert_user(&User {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                first_name: id.to_string(),
                last_name: "Doe".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        }

        let service = Arc::new(FriendService::new(db));
        for other in others {
            let request = service.create_friend_request("alice", other).await.unwrap();
            service
                .respond_to_friend_request(&request.id, other, FriendAction::Accept)
                .await
                .unwrap();
        }
        service
    }

    fn hydration_only(friends: Arc<FriendService>, store: MockActivityStore) -> FeedAggregator {
        let store: Arc<dyn ActivityStore> = Arc::new(store);
        FeedAggregator::new(
            friends,
            vec![Box::new(HydrationGoalCheck::new(store, 2000.0))],
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    #[test]
    fn day_window_follows_the_offset() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 22, 30, 0).unwrap();

        let utc = DayWindow::today(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc.start, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(utc.end - utc.start, Duration::hours(24));

        // 22:30 UTC is already 01:30 on July 2nd at +03:00
        let east = DayWindow::today(now, FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(east.start, Utc.with_ymd_and_hms(2025, 7, 1, 21, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn friend_over_goal_appears_in_feed() {
        let friends = friends_of_alice(&["bob"]).await;
        let mut store = MockActivityStore::new();
        store
            .expect_daily_water_ml()
            .with(eq("bob"), mockall::predicate::always())
            .returning(|_, _| Ok(2500.0));

        let feed = hydration_only(friends, store)
            .friends_activity_feed("alice", None)
            .await
            .unwrap();

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].user_id, "bob");
        assert_eq!(feed[0].user_name, "bob Doe");
        assert_eq!(feed[0].activity_type, "water_goal");
        assert_eq!(feed[0].activity_data["goal_met"], true);
    }

    #[tokio::test]
    async fn friend_under_goal_is_left_out() {
        let friends = friends_of_alice(&["bob"]).await;
        let mut store = MockActivityStore::new();
        store.expect_daily_water_ml().returning(|_, _| Ok(1500.0));

        let feed = hydration_only(friends, store)
            .friends_activity_feed("alice", None)
            .await
            .unwrap();

        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn one_failing_friend_does_not_fail_the_feed() {
        let friends = friends_of_alice(&["bob", "carol"]).await;
        let mut store = MockActivityStore::new();
        store
            .expect_daily_water_ml()
            .returning(|user_id, _| match user_id {
                "bob" => Err(AppError::Internal(anyhow!("nutrition store unavailable"))),
                _ => Ok(3000.0),
            });

        let feed = hydration_only(friends, store)
            .friends_activity_feed("alice", None)
            .await
            .unwrap();

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].user_id, "carol");
    }

    #[tokio::test]
    async fn step_check_runs_when_registered() {
        let friends = friends_of_alice(&["bob"]).await;
        let mut store = MockActivityStore::new();
        store.expect_daily_water_ml().returning(|_, _| Ok(0.0));
        store.expect_daily_steps().returning(|_, _| Ok(12_000));

        let config = FeedConfig {
            step_check_enabled: true,
            ..crate::config::tests::valid_config().feed
        };
        let aggregator = FeedAggregator::from_config(&config, friends, Arc::new(store)).unwrap();

        let feed = aggregator.friends_activity_feed("alice", None).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].activity_type, "step_goal");
        assert_eq!(feed[0].activity_data["total_steps"], 12_000);
    }

    #[tokio::test]
    async fn user_without_friends_gets_empty_feed() {
        let friends = friends_of_alice(&[]).await;
        let feed = hydration_only(friends, MockActivityStore::new())
            .friends_activity_feed("alice", None)
            .await
            .unwrap();
        assert!(feed.is_empty());
    }
}
