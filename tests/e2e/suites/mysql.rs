//! MySQL 后端测试套件
//!
//! 验证锁名约束，以及锁状态在服务端的可见性。

use db_locker::test_utils::unique_key;
use db_locker::{ErrorKind, LockContext, MySqlLocker, ReleaseOutcome};
use std::time::Duration;

use crate::TestEnvironment;
use crate::setup::mysql_lock_is_free;

#[cfg(test)]
mod mysql_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_visible_on_server() {
        let pool = TestEnvironment::new().mysql_pool().await.unwrap();
        let locker = MySqlLocker::new(pool.clone());
        let key = unique_key("mysql-visible");

        assert!(mysql_lock_is_free(&pool, &key).await.unwrap());

        let lock = locker
            .get(&LockContext::background(), &key)
            .await
            .unwrap();
        assert!(!mysql_lock_is_free(&pool, &key).await.unwrap());

        assert_eq!(lock.release().await, ReleaseOutcome::Released);
        assert!(mysql_lock_is_free(&pool, &key).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_multibyte_key_within_limit() {
        let pool = TestEnvironment::new().mysql_pool().await.unwrap();
        let locker = MySqlLocker::new(pool);

        // 64 个字符、192 个字节，按字符计数仍在上限内
        let key = "锁".repeat(64);
        let ctx = LockContext::background().with_timeout(Duration::from_secs(5));
        let lock = locker.get(&ctx, &key).await.unwrap();
        assert_eq!(lock.release().await, ReleaseOutcome::Released);
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_overlong_key_rejected() {
        let pool = TestEnvironment::new().mysql_pool().await.unwrap();
        let locker = MySqlLocker::new(pool);

        let err = locker
            .get(&LockContext::background(), &"k".repeat(65))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert!(!err.is_retryable());
    }
}
