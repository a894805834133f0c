//! 取消与超时测试套件
//!
//! 等待中的获取被取消后应及时返回，服务端的等待随之中止，
//! 不会在持有者释放后悄悄拿到锁。

use db_locker::test_utils::unique_key;
use db_locker::{ErrorKind, LockContext, Locker};
use std::time::{Duration, Instant};

use crate::TestEnvironment;

/// 取消后 `get` 的最长返回时间
const CANCEL_LATENCY: Duration = Duration::from_secs(1);

async fn check_cancel_while_waiting(locker: Locker) {
    let key = unique_key("cancel-waiting");
    let held = locker
        .get(&LockContext::background(), &key)
        .await
        .unwrap();

    let (ctx, cancel) = LockContext::cancellable();
    let waiter = {
        let locker = locker.clone();
        let key = key.clone();
        tokio::spawn(async move { locker.get(&ctx, &key).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    cancel.cancel();
    let err = waiter.await.unwrap().err().expect("取消后不应获得锁");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(started.elapsed() < CANCEL_LATENCY, "{:?}", started.elapsed());

    held.release().await;

    // 被取消的等待已在服务端中止，锁空闲
    let ctx = LockContext::background().with_timeout(Duration::from_secs(2));
    let lock = locker.get(&ctx, &key).await.expect("取消的等待者不应持有锁");
    lock.release().await;
}

async fn check_deadline_while_waiting(locker: Locker) {
    let key = unique_key("deadline-waiting");
    let held = locker
        .get(&LockContext::background(), &key)
        .await
        .unwrap();

    let started = Instant::now();
    let ctx = LockContext::background().with_timeout(Duration::from_millis(300));
    let err = locker.get(&ctx, &key).await.err().expect("应超时");
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_millis(300) + CANCEL_LATENCY);

    held.release().await;
}

/// 调用方直接丢弃 `get` 的 future（外部超时、select 的另一分支先完成）
///
/// 等待中的连接不能带着排队的获取调用回到池中。`other` 使用独立的连接池，
/// 同一会话上的重入不会掩盖残留的持有者。
async fn check_dropped_get_future(locker: Locker, other: Locker) {
    let key = unique_key("dropped-get");
    let held = locker
        .get(&LockContext::background(), &key)
        .await
        .unwrap();

    let dropped = tokio::time::timeout(
        Duration::from_millis(200),
        locker.get(&LockContext::background(), &key),
    )
    .await;
    assert!(dropped.is_err(), "持有者未释放前不应获得锁");

    held.release().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let ctx = LockContext::background().with_timeout(Duration::from_secs(2));
    let lock = other
        .get(&ctx, &key)
        .await
        .expect("被丢弃的等待者不应在持有者释放后拿到锁");
    lock.release().await;
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_mysql_cancel_while_waiting() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        check_cancel_while_waiting(locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_postgres_cancel_while_waiting() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        check_cancel_while_waiting(locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_mysql_deadline_while_waiting() {
        let locker = TestEnvironment::new().mysql_locker().await.unwrap();
        check_deadline_while_waiting(locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_postgres_deadline_while_waiting() {
        let locker = TestEnvironment::new().postgres_locker().await.unwrap();
        check_deadline_while_waiting(locker).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_mysql_dropped_get_future() {
        let env = TestEnvironment::new();
        let locker = env.mysql_locker().await.unwrap();
        let other = env.mysql_locker().await.unwrap();
        check_dropped_get_future(locker, other).await;
    }

    #[tokio::test]
    #[ignore = "需要数据库"]
    async fn test_postgres_dropped_get_future() {
        let env = TestEnvironment::new();
        let locker = env.postgres_locker().await.unwrap();
        let other = env.postgres_locker().await.unwrap();
        check_dropped_get_future(locker, other).await;
    }
}
