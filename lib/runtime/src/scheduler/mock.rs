// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory scheduler and health probe for tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::{HealthProbe, JobId, JobStatus, Scheduler, SchedulerError};

/// Answers status queries from a script of raw `sacct` states.
///
/// Each query consumes one entry; the last entry repeats forever.
#[derive(Debug)]
pub struct ScriptedScheduler {
    statuses: Mutex<VecDeque<String>>,
    node: Option<String>,
    /// `node` queries that fail before the node is reported
    node_misses: AtomicU32,
    start_time: Option<String>,
    reject: Option<String>,
    next_id: AtomicU32,
    submitted: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<JobId>>,
}

impl ScriptedScheduler {
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedScheduler {
            statuses: Mutex::new(statuses.into_iter().map(Into::into).collect()),
            node: None,
            node_misses: AtomicU32::new(0),
            start_time: None,
            reject: None,
            next_id: AtomicU32::new(12345),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Report the node only after `misses` queries, like squeue lagging behind sacct
    pub fn with_node_after(mut self, misses: u32, node: impl Into<String>) -> Self {
        self.node_misses = AtomicU32::new(misses);
        self.with_node(node)
    }

    pub fn with_start_time(mut self, start: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self
    }

    /// Refuse every submission with this message
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.reject = Some(message.into());
        self
    }

    pub fn submitted_scripts(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled_jobs(&self) -> Vec<JobId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for ScriptedScheduler {
    async fn submit(&self, script: &str) -> Result<JobId, SchedulerError> {
        if let Some(message) = &self.reject {
            return Err(SchedulerError::Rejected(message.clone()));
        }
        self.submitted.lock().unwrap().push(script.to_string());
        self.next_id
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .parse()
    }

    async fn status(&self, _job: &JobId) -> Result<JobStatus, SchedulerError> {
        let mut statuses = self.statuses.lock().unwrap();
        let raw = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(match raw {
            Some(raw) if !raw.is_empty() => JobStatus::new(raw),
            _ => JobStatus::unknown(),
        })
    }

    async fn start_time(&self, _job: &JobId) -> Result<Option<String>, SchedulerError> {
        Ok(self.start_time.clone())
    }

    async fn node(&self, job: &JobId) -> Result<String, SchedulerError> {
        let missed = self
            .node_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if missed.is_ok() {
            return Err(SchedulerError::NoNode(job.clone()));
        }
        self.node
            .clone()
            .ok_or_else(|| SchedulerError::NoNode(job.clone()))
    }

    async fn cancel(&self, job: &JobId) -> Result<(), SchedulerError> {
        self.cancelled.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Reports unhealthy until it has been asked `healthy_after` times
#[derive(Debug, Default)]
pub struct StaticProbe {
    healthy_after: u32,
    calls: AtomicU32,
}

impl StaticProbe {
    pub fn healthy() -> Self {
        Self::healthy_after(1)
    }

    pub fn never_healthy() -> Self {
        Self::healthy_after(u32::MAX)
    }

    pub fn healthy_after(calls: u32) -> Self {
        StaticProbe {
            healthy_after: calls,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn is_healthy(&self, _node: &str, _port: u16) -> bool {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        n >= self.healthy_after
    }
}
