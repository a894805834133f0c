//! 一致性测试套件
//!
//! 与内存后端相同的一组检查，分别在两种数据库上运行。

use db_locker::test_utils;

use crate::TestEnvironment;

#[cfg(test)]
mod mysql_conformance_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_not_acquired() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        test_utils::check_lock_not_acquired(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_already_acquired() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        test_utils::check_lock_already_acquired(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_already_released() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        test_utils::check_lock_already_released(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_acquire_by_different_keys() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        test_utils::check_different_keys(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_idempotent_release() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        test_utils::check_idempotent_release(&locker).await;
    }
}

#[cfg(test)]
mod postgres_conformance_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_not_acquired() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        test_utils::check_lock_not_acquired(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_already_acquired() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        test_utils::check_lock_already_acquired(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_lock_already_released() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        test_utils::check_lock_already_released(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_acquire_by_different_keys() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        test_utils::check_different_keys(&locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_idempotent_release() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        test_utils::check_idempotent_release(&locker).await;
    }
}
