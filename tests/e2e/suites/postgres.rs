//! PostgreSQL 后端测试套件
//!
//! 验证锁名编码与整数对接口作用于同一个锁空间。

use db_locker::test_utils::unique_key;
use db_locker::{ErrorKind, LockContext, PostgresLocker, ReleaseOutcome};
use std::time::Duration;

use crate::TestEnvironment;
use crate::setup::postgres_lock_is_free;

const SHORT_TIMEOUT: Duration = Duration::from_millis(300);

#[cfg(test)]
mod postgres_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_visible_on_server() {
        let pool = TestEnvironment::new().postgres_pool().await.unwrap();
        let locker = PostgresLocker::new(pool.clone());
        let key = unique_key("pg-visible");
        let advisory = locker.encode(&key).unwrap();

        assert!(postgres_lock_is_free(&pool, advisory).await.unwrap());

        let lock = locker
            .get(&LockContext::background(), &key)
            .await
            .unwrap();
        assert_eq!(*lock.key(), advisory);
        assert!(!postgres_lock_is_free(&pool, advisory).await.unwrap());

        assert_eq!(lock.release().await, ReleaseOutcome::Released);
        assert!(postgres_lock_is_free(&pool, advisory).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_named_and_raw_key_share_lock_space() {
        let pool = TestEnvironment::new().postgres_pool().await.unwrap();
        let locker = PostgresLocker::new(pool);
        let key = unique_key("pg-raw");
        let advisory = locker.encode(&key).unwrap();

        let held = locker
            .get_by_raw_key(&LockContext::background(), advisory.a, advisory.b)
            .await
            .unwrap();

        let ctx = LockContext::background().with_timeout(SHORT_TIMEOUT);
        let err = locker.get(&ctx, &key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);

        // 两个分量交换后是另一把锁
        let ctx = LockContext::background().with_timeout(SHORT_TIMEOUT);
        let swapped = locker
            .get_by_raw_key(&ctx, advisory.b, advisory.a)
            .await
            .unwrap();

        swapped.release().await;
        held.release().await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_empty_key_rejected() {
        let pool = TestEnvironment::new().postgres_pool().await.unwrap();
        let locker = PostgresLocker::new(pool);

        let err = locker
            .get(&LockContext::background(), "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }
}
