//! 测试工具模块
//!
//! - `MemoryPool`：在内存中模拟会话级 advisory lock 的后端，支持故障注入，
//!   用于在没有数据库的情况下测试获取/释放流程
//! - `RecordingLogger`：记录所有上报的异常
//! - `ConformanceTarget` 与 `check_*`：各后端共用的一致性测试

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::context::{CancelHandle, LockContext};
use crate::error::{LockError, Result};
use crate::lock::{ReleaseOutcome, SessionLock};
use crate::locker::{Lock, Locker};
use crate::logger::Logger;
use crate::session::{AdvisorySession, SessionLocker, SessionPool};

// ==================== 测试数据辅助 ====================

/// 生成进程内唯一、跨进程大概率唯一的锁名
///
/// 长度不超过 MySQL `GET_LOCK` 的 64 字符限制。
pub fn unique_key(prefix: &str) -> String {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!(
        "{prefix}-{}-{nanos:x}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

// ==================== 内存后端 ====================

/// 内存后端的调用统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub leased: usize,
    pub closed: usize,
    /// 未关闭就被 drop、带着锁回到空闲列表的会话
    pub returned: usize,
    pub unlocks: usize,
    pub aborts: usize,
}

#[derive(Default)]
struct Faults {
    fail_lease: bool,
    reject_lock: Option<String>,
    report_not_held: bool,
    stall_unlock: bool,
    cancel_on_grant: Option<CancelHandle>,
}

struct Shared<K> {
    /// 锁名 -> 持有者会话 id
    table: Mutex<HashMap<K, i64>>,
    changed: Notify,
    next_id: AtomicI64,
    /// 已归还、可被再次租出的会话 id
    idle: Mutex<Vec<i64>>,
    faults: Mutex<Faults>,
    leased: AtomicUsize,
    closed: AtomicUsize,
    returned: AtomicUsize,
    unlocks: AtomicUsize,
    aborts: AtomicUsize,
}

/// 内存中的 advisory lock 后端
///
/// 与真实后端一样，锁归属于会话，会话关闭时释放它持有的全部锁。
/// 与连接池一样，未关闭就被 drop 的会话回到空闲列表并保留它的锁，
/// 除非租出时标记了 `close_on_drop`。
pub struct MemoryPool<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for MemoryPool<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> fmt::Debug for MemoryPool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<K> Default for MemoryPool<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MemoryPool<K> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(HashMap::new()),
                changed: Notify::new(),
                next_id: AtomicI64::new(1),
                idle: Mutex::new(Vec::new()),
                faults: Mutex::new(Faults::default()),
                leased: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
                unlocks: AtomicUsize::new(0),
                aborts: AtomicUsize::new(0),
            }),
        }
    }

    /// 之后的 `lease` 全部失败
    pub fn fail_lease(&self, fail: bool) {
        self.shared.faults.lock().fail_lease = fail;
    }

    /// 之后的 `lock` 返回约定之外的结果
    pub fn reject_lock(&self, detail: impl Into<String>) {
        self.shared.faults.lock().reject_lock = Some(detail.into());
    }

    /// 之后的 `unlock` 报告锁未被持有
    pub fn report_not_held(&self, enabled: bool) {
        self.shared.faults.lock().report_not_held = enabled;
    }

    /// 之后的 `unlock` 永远不返回，模拟释放途中卡住的查询
    pub fn stall_unlock(&self, enabled: bool) {
        self.shared.faults.lock().stall_unlock = enabled;
    }

    /// 下一次授予锁时立即取消 `handle` 对应的上下文，模拟授予与取消同时发生
    pub fn cancel_on_grant(&self, handle: CancelHandle) {
        self.shared.faults.lock().cancel_on_grant = Some(handle);
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            leased: self.shared.leased.load(Ordering::SeqCst),
            closed: self.shared.closed.load(Ordering::SeqCst),
            returned: self.shared.returned.load(Ordering::SeqCst),
            unlocks: self.shared.unlocks.load(Ordering::SeqCst),
            aborts: self.shared.aborts.load(Ordering::SeqCst),
        }
    }

    /// 租出后既未关闭也未归还的会话数
    pub fn open_sessions(&self) -> usize {
        let stats = self.stats();
        stats.leased - stats.closed - stats.returned
    }

    /// 租出一个会话，优先复用空闲列表中的会话
    fn checkout(&self) -> MemorySession<K>
    where
        K: Eq + Hash,
    {
        let id = self
            .shared
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared.leased.fetch_add(1, Ordering::SeqCst);
        MemorySession {
            id,
            shared: Arc::clone(&self.shared),
            close_on_drop: false,
            closed: false,
        }
    }

    /// 等待所有会话关闭，超时返回 false
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.open_sessions() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl<K: Eq + Hash> MemoryPool<K> {
    pub fn is_locked(&self, key: &K) -> bool {
        self.shared.table.lock().contains_key(key)
    }
}

/// 内存后端的会话
pub struct MemorySession<K: Eq + Hash> {
    id: i64,
    shared: Arc<Shared<K>>,
    close_on_drop: bool,
    closed: bool,
}

impl<K: Eq + Hash> MemorySession<K> {
    /// drop 时断开会话而不是归还
    pub fn close_on_drop(&mut self) {
        self.close_on_drop = true;
    }
}

impl<K: Eq + Hash> Drop for MemorySession<K> {
    fn drop(&mut self) {
        if !self.closed && !self.close_on_drop {
            self.shared.idle.lock().push(self.id);
            self.shared.returned.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.shared
            .table
            .lock()
            .retain(|_, holder| *holder != self.id);
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        self.shared.changed.notify_waiters();
    }
}

#[async_trait]
impl<K> AdvisorySession for MemorySession<K>
where
    K: Clone + fmt::Debug + Eq + Hash + Send + Sync + 'static,
{
    type Key = K;

    fn backend_id(&self) -> i64 {
        self.id
    }

    async fn lock(&mut self, key: &K) -> Result<()> {
        if let Some(detail) = self.shared.faults.lock().reject_lock.clone() {
            return Err(LockError::protocol("memory_lock", detail));
        }

        loop {
            // 先登记唤醒，再检查锁表，避免错过释放通知
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            {
                let mut table = self.shared.table.lock();
                match table.get(key) {
                    Some(holder) if *holder != self.id => {}
                    _ => {
                        table.insert(key.clone(), self.id);
                        break;
                    }
                }
            }
            changed.await;
        }

        if let Some(handle) = self.shared.faults.lock().cancel_on_grant.take() {
            handle.cancel();
        }
        Ok(())
    }

    async fn unlock(&mut self, key: &K) -> Result<bool> {
        self.shared.unlocks.fetch_add(1, Ordering::SeqCst);
        let (report_not_held, stall) = {
            let faults = self.shared.faults.lock();
            (faults.report_not_held, faults.stall_unlock)
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let released = {
            let mut table = self.shared.table.lock();
            match table.get(key) {
                Some(holder) if *holder == self.id => {
                    table.remove(key);
                    true
                }
                _ => false,
            }
        };
        if released {
            self.shared.changed.notify_waiters();
        }
        Ok(released && !report_not_held)
    }

    async fn close(mut self) -> std::result::Result<(), sqlx::Error> {
        self.closed = true;
        Ok(())
    }

    fn discard(mut self) {
        self.closed = true;
    }
}

#[async_trait]
impl<K> SessionPool for MemoryPool<K>
where
    K: Clone + fmt::Debug + Eq + Hash + Send + Sync + 'static,
{
    type Session = MemorySession<K>;

    const BACKEND: &'static str = "memory";

    async fn lease(
        &self,
        _logger: &dyn Logger,
    ) -> std::result::Result<MemorySession<K>, sqlx::Error> {
        if self.shared.faults.lock().fail_lease {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut session = self.checkout();
        session.close_on_drop();
        Ok(session)
    }

    async fn abort(&self, _backend_id: i64) -> std::result::Result<(), sqlx::Error> {
        self.shared.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ==================== 日志记录 ====================

/// 记录所有消息的 logger
#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Logger for RecordingLogger {
    fn println(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

// ==================== 一致性 ====================

/// 一致性测试的被测对象
#[async_trait]
pub trait ConformanceTarget: Clone + Send + Sync + 'static {
    type Guard: Send + Sync + 'static;

    async fn get(&self, ctx: &LockContext, key: &str) -> Result<Self::Guard>;

    async fn release(&self, guard: &Self::Guard) -> ReleaseOutcome;
}

#[async_trait]
impl ConformanceTarget for Locker {
    type Guard = Lock;

    async fn get(&self, ctx: &LockContext, key: &str) -> Result<Lock> {
        Locker::get(self, ctx, key).await
    }

    async fn release(&self, guard: &Lock) -> ReleaseOutcome {
        guard.release().await
    }
}

#[async_trait]
impl ConformanceTarget for SessionLocker<MemoryPool<String>> {
    type Guard = SessionLock<MemorySession<String>>;

    async fn get(&self, ctx: &LockContext, key: &str) -> Result<Self::Guard> {
        self.acquire(ctx, key.to_string()).await
    }

    async fn release(&self, guard: &Self::Guard) -> ReleaseOutcome {
        guard.release().await
    }
}

/// 并发获取的统计结果
#[derive(Debug, Default)]
pub struct ContentionReport {
    pub acquired: usize,
    pub timed_out: usize,
    pub unexpected: Vec<String>,
}

impl ContentionReport {
    pub fn assert_counts(&self, acquired: usize, timed_out: usize) {
        assert!(self.unexpected.is_empty(), "非预期错误: {:?}", self.unexpected);
        assert_eq!(self.acquired, acquired, "acquired 数量不符: {self:?}");
        assert_eq!(self.timed_out, timed_out, "timed_out 数量不符: {self:?}");
    }
}

/// 一致性测试的并发数
pub const CONFORMANCE_THREADS: usize = 10;

/// 一致性测试中每次获取的超时
pub const CONFORMANCE_TIMEOUT: Duration = Duration::from_millis(500);

/// 每个 key 各发起一次带超时的并发获取，统计结果后释放所有已获取的锁
pub async fn contend<T: ConformanceTarget>(
    target: &T,
    keys: Vec<String>,
    timeout: Duration,
) -> ContentionReport {
    let tasks: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let target = target.clone();
            tokio::spawn(async move {
                let ctx = LockContext::background().with_timeout(timeout);
                target.get(&ctx, &key).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await);
    }

    let mut report = ContentionReport::default();
    for result in results {
        match result {
            Ok(Ok(guard)) => {
                report.acquired += 1;
                target.release(&guard).await;
            }
            Ok(Err(err)) if err.is_timeout() => report.timed_out += 1,
            Ok(Err(err)) => report.unexpected.push(err.to_string()),
            Err(join_err) => report.unexpected.push(join_err.to_string()),
        }
    }
    report
}

/// 无人持有时，同一个 key 的 N 个并发获取只有一个成功
pub async fn check_lock_not_acquired<T: ConformanceTarget>(target: &T) {
    let key = unique_key("not-acquired");
    let report = contend(
        target,
        vec![key; CONFORMANCE_THREADS],
        CONFORMANCE_TIMEOUT,
    )
    .await;
    report.assert_counts(1, CONFORMANCE_THREADS - 1);
}

/// 已被持有时，N 个并发获取全部超时
pub async fn check_lock_already_acquired<T: ConformanceTarget>(target: &T) {
    let key = unique_key("already-acquired");
    let ctx = LockContext::background().with_timeout(CONFORMANCE_TIMEOUT);
    let held = target.get(&ctx, &key).await.expect("首次获取应成功");

    let report = contend(
        target,
        vec![key; CONFORMANCE_THREADS],
        CONFORMANCE_TIMEOUT,
    )
    .await;
    target.release(&held).await;
    report.assert_counts(0, CONFORMANCE_THREADS);
}

/// 获取后释放，再发起 N 个并发获取，只有一个成功
pub async fn check_lock_already_released<T: ConformanceTarget>(target: &T) {
    let key = unique_key("already-released");
    let ctx = LockContext::background().with_timeout(CONFORMANCE_TIMEOUT);
    let held = target.get(&ctx, &key).await.expect("首次获取应成功");
    assert_eq!(target.release(&held).await, ReleaseOutcome::Released);

    let report = contend(
        target,
        vec![key; CONFORMANCE_THREADS],
        CONFORMANCE_TIMEOUT,
    )
    .await;
    report.assert_counts(1, CONFORMANCE_THREADS - 1);
}

/// N 个不同的 key 并发获取全部成功
pub async fn check_different_keys<T: ConformanceTarget>(target: &T) {
    let keys = (0..CONFORMANCE_THREADS)
        .map(|_| unique_key("different-keys"))
        .collect();
    let report = contend(target, keys, CONFORMANCE_TIMEOUT).await;
    report.assert_counts(CONFORMANCE_THREADS, 0);
}

/// 顺序与并发地重复释放，只有一次生效
pub async fn check_idempotent_release<T: ConformanceTarget>(target: &T) {
    let ctx = LockContext::background().with_timeout(CONFORMANCE_TIMEOUT);

    let guard = target.get(&ctx, &unique_key("release-twice")).await.expect("获取应成功");
    assert_eq!(target.release(&guard).await, ReleaseOutcome::Released);
    assert_eq!(target.release(&guard).await, ReleaseOutcome::AlreadyReleased);

    let guard = Arc::new(
        target
            .get(&ctx, &unique_key("release-concurrently"))
            .await
            .expect("获取应成功"),
    );
    let tasks: Vec<_> = (0..CONFORMANCE_THREADS)
        .map(|_| {
            let target = target.clone();
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { target.release(&guard).await })
        })
        .collect();

    let mut released = 0;
    for task in tasks {
        match task.await.expect("释放任务不应 panic") {
            ReleaseOutcome::Released => released += 1,
            ReleaseOutcome::AlreadyReleased => {}
            other => panic!("非预期的释放结果: {other:?}"),
        }
    }
    assert_eq!(released, 1);
}
