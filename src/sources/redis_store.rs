//! Redis-backed collaborators
//!
//! `RedisCache` answers the cache-service calls with `PING` and `INFO`.
//! `RedisQueue` reads a BullMQ-style job queue:
//!
//! ```text
//! {prefix}:{queue}:wait       list   waiting job ids
//! {prefix}:{queue}:paused     list   waiting job ids while the queue is paused
//! {prefix}:{queue}:active     list
//! {prefix}:{queue}:completed  zset   scored by finish time
//! {prefix}:{queue}:failed     zset
//! {prefix}:{queue}:delayed    zset
//! {prefix}:{queue}:meta       hash   `paused` field present while paused
//! {prefix}:{queue}:{id}       hash   job fields (name, progress, processedOn, ...)
//! ```

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument, trace};

use super::{CacheService, JobInfo, JobQueue, JobState, WorkerInfo};
use crate::QueueStats;

/// Opens a reconnecting connection to `url`
pub async fn connect(url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(url).context("invalid redis url")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("failed to connect to redis")?;
    debug!("connected to redis");
    Ok(manager)
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn ping(&self) -> anyhow::Result<String> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("PING failed")?;
        Ok(pong)
    }

    async fn memory_info(&self) -> anyhow::Result<String> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .context("INFO memory failed")?;
        Ok(info)
    }

    async fn stats_info(&self) -> anyhow::Result<String> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO")
            .query_async(&mut conn)
            .await
            .context("INFO failed")?;
        Ok(info)
    }
}

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    prefix: String,
    /// `{prefix}:{queue}`
    base: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, prefix: &str, queue: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            base: format!("{prefix}:{queue}"),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.base)
    }

    async fn job_ids(&self, state: JobState, limit: usize) -> anyhow::Result<Vec<String>> {
        let Some(stop) = range_stop(limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let ids: Vec<String> = match state {
            JobState::Waiting => conn.lrange(self.key("wait"), 0, stop).await?,
            JobState::Active => conn.lrange(self.key("active"), 0, stop).await?,
            JobState::Completed => conn.zrevrange(self.key("completed"), 0, stop).await?,
            JobState::Failed => conn.zrevrange(self.key("failed"), 0, stop).await?,
            JobState::Delayed => conn.zrange(self.key("delayed"), 0, stop).await?,
            JobState::Unknown => Vec::new(),
        };
        Ok(ids)
    }

    async fn job_hash(&self, id: &str) -> anyhow::Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.key(id))
            .await
            .with_context(|| format!("failed to read job {id}"))?;
        Ok(fields)
    }

    async fn job_state(&self, id: &str) -> anyhow::Result<JobState> {
        let mut conn = self.conn.clone();

        for (suffix, state) in [
            ("completed", JobState::Completed),
            ("failed", JobState::Failed),
            ("delayed", JobState::Delayed),
        ] {
            let score: Option<f64> = conn.zscore(self.key(suffix), id).await?;
            if score.is_some() {
                return Ok(state);
            }
        }

        for (suffix, state) in [("active", JobState::Active), ("wait", JobState::Waiting), ("paused", JobState::Waiting)] {
            let position: Option<i64> = redis::cmd("LPOS")
                .arg(self.key(suffix))
                .arg(id)
                .query_async(&mut conn)
                .await?;
            if position.is_some() {
                return Ok(state);
            }
        }

        Ok(JobState::Unknown)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    #[instrument(skip(self), fields(queue = %self.base))]
    async fn stats(&self) -> anyhow::Result<QueueStats> {
        let mut conn = self.conn.clone();
        let waiting: u64 = conn.llen(self.key("wait")).await?;
        let paused: u64 = conn.llen(self.key("paused")).await?;
        let active: u64 = conn.llen(self.key("active")).await?;
        let completed: u64 = conn.zcard(self.key("completed")).await?;
        let failed: u64 = conn.zcard(self.key("failed")).await?;
        let delayed: u64 = conn.zcard(self.key("delayed")).await?;

        let stats = QueueStats {
            waiting: waiting + paused,
            active,
            completed,
            failed,
            delayed,
        };
        trace!("queue stats: {stats:?}");
        Ok(stats)
    }

    async fn is_paused(&self) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let paused: bool = conn.hexists(self.key("meta"), "paused").await?;
        Ok(paused)
    }

    async fn workers(&self) -> anyhow::Result<Vec<WorkerInfo>> {
        let mut conn = self.conn.clone();
        let list: String = redis::cmd("CLIENT")
            .arg("LIST")
            .query_async(&mut conn)
            .await
            .context("CLIENT LIST failed")?;
        Ok(parse_client_list(&list, &self.prefix))
    }

    async fn recent_jobs(&self, states: &[JobState], limit: usize) -> anyhow::Result<Vec<JobInfo>> {
        let mut jobs = Vec::new();
        for state in states {
            for id in self.job_ids(*state, limit).await? {
                let fields = self.job_hash(&id).await?;
                if !fields.is_empty() {
                    jobs.push(job_from_hash(&id, *state, &fields));
                }
            }
        }
        Ok(jobs)
    }

    async fn job(&self, id: &str) -> anyhow::Result<Option<JobInfo>> {
        let fields = self.job_hash(id).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let state = self.job_state(id).await?;
        Ok(Some(job_from_hash(id, state, &fields)))
    }
}

/// Picks worker connections out of `CLIENT LIST` output
///
/// Workers name their connection `{prefix}:<queue>:w:<worker>`.
pub fn parse_client_list(list: &str, prefix: &str) -> Vec<WorkerInfo> {
    let name_prefix = format!("{prefix}:");

    list.lines()
        .filter_map(|line| {
            let fields: HashMap<&str, &str> = line
                .split_whitespace()
                .filter_map(|pair| pair.split_once('='))
                .collect();
            let name = fields.get("name")?;
            if !name.starts_with(&name_prefix) || !name.contains(":w:") {
                return None;
            }
            Some(WorkerInfo {
                id: fields.get("id").map(|id| id.to_string()).unwrap_or_default(),
                name: name.rsplit(":w:").next().map(str::to_string),
                addr: fields.get("addr").map(|addr| addr.to_string()),
            })
        })
        .collect()
}

/// Builds a [`JobInfo`] from the fields of a job hash
pub fn job_from_hash(id: &str, state: JobState, fields: &HashMap<String, String>) -> JobInfo {
    let timestamp = |key: &str| -> Option<DateTime<Utc>> {
        fields
            .get(key)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    };

    let progress = fields
        .get("progress")
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone())))
        .unwrap_or(serde_json::Value::Null);

    JobInfo {
        id: id.to_string(),
        name: fields.get("name").cloned().unwrap_or_default(),
        state,
        progress,
        created_at: timestamp("timestamp"),
        processed_at: timestamp("processedOn"),
        finished_at: timestamp("finishedOn"),
        failed_reason: fields.get("failedReason").filter(|r| !r.is_empty()).cloned(),
        attempts: fields
            .get("attemptsMade")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0),
    }
}

/// Inclusive `LRANGE`/`ZRANGE` stop index for the first `limit` entries.
/// `None` for a zero limit, since a stop of `-1` would select everything.
fn range_stop(limit: usize) -> Option<isize> {
    let limit = isize::try_from(limit).unwrap_or(isize::MAX);
    (limit > 0).then(|| limit - 1)
}
