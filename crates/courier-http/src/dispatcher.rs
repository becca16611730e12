//! Rate-limited request dispatcher
//!
//! Requests are queued per bucket and drained by one task per non-empty queue, so calls
//! sharing a bucket go out strictly in submission order, even across routes. A route
//! starts in a bucket of its own; once a response names its server bucket, the route's
//! pending requests move to that bucket's queue, merged by submission order. Before
//! every call the bucket and the global bucket are consulted; when either is exhausted
//! the drain task sleeps until the later reset. Quota state is refreshed from every
//! response.

use crate::error::{HttpError, HttpResult, TransportError};
use crate::ratelimit::{Bucket, BucketKey, BucketSnapshot, RateLimitHeaders, Reservation, RetryAfter};
use crate::request::{HttpResponse, Request};
use crate::route::{Route, RouteKey};
use crate::transport::HttpTransport;
use courier_common::{Backoff, BackoffConfig, HttpConfig};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound for a single call
    pub request_timeout: Duration,
    /// Retries for network failures and 5xx responses
    pub max_retries: u32,
    /// Retries after 429 responses
    pub max_rate_limit_retries: u32,
    /// Process-wide ceiling per second, `None` to rely on server lockouts only
    pub global_requests_per_second: Option<u32>,
    pub retry_backoff: BackoffConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_retries: 3,
            max_rate_limit_retries: 5,
            global_requests_per_second: Some(50),
            retry_backoff: BackoffConfig::new(Duration::from_millis(500), Duration::from_secs(10)),
        }
    }
}

impl From<&HttpConfig> for DispatcherConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            max_rate_limit_retries: config.max_rate_limit_retries,
            global_requests_per_second: config.global_requests_per_second,
            retry_backoff: config.retry_backoff,
        }
    }
}

type Reply = oneshot::Sender<HttpResult<HttpResponse>>;

/// Retry counters; they travel with the job when it changes queues
#[derive(Debug, Default, Clone, Copy)]
struct Attempts {
    failures: u32,
    rate_limited: u32,
    missing_delays: u32,
}

struct Job {
    /// Submission order
    id: u64,
    request: Request,
    reply: Reply,
    attempts: Attempts,
}

impl Job {
    fn route(&self) -> RouteKey {
        self.request.route().key()
    }
}

#[derive(Default)]
struct QueueState {
    /// Ascending by id
    jobs: VecDeque<Job>,
    draining: bool,
}

/// FIFO queue of one bucket
#[derive(Default)]
struct BucketQueue {
    state: Mutex<QueueState>,
}

impl BucketQueue {
    /// Push a job; returns true when the caller must start a drain task
    fn push(&self, job: Job) -> bool {
        self.admit(vec![job])
    }

    /// Merge jobs by submission order; returns true when the caller must start a drain task
    fn admit(&self, jobs: Vec<Job>) -> bool {
        let mut state = self.state.lock();
        for job in jobs {
            let at = state.jobs.partition_point(|queued| queued.id < job.id);
            state.jobs.insert(at, job);
        }
        !state.jobs.is_empty() && !std::mem::replace(&mut state.draining, true)
    }

    /// Next live job, or `None` after marking the queue idle
    fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock();
        while let Some(job) = state.jobs.pop_front() {
            if !job.reply.is_closed() {
                return Some(job);
            }
            tracing::trace!(job_id = job.id, "Skipping cancelled request");
        }
        state.draining = false;
        None
    }

    /// Take every queued job of one route, oldest first
    fn take_route(&self, route: &RouteKey) -> Vec<Job> {
        let mut state = self.state.lock();
        let (taken, kept): (VecDeque<Job>, VecDeque<Job>) = std::mem::take(&mut state.jobs)
            .into_iter()
            .partition(|job| job.route() == *route);
        state.jobs = kept;
        taken.into()
    }

    fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|job| job.id != id);
        state.jobs.len() != before
    }

    fn count_route(&self, route: &RouteKey) -> usize {
        self.state
            .lock()
            .jobs
            .iter()
            .filter(|job| !job.reply.is_closed() && job.route() == *route)
            .count()
    }
}

/// Completion of a submitted request
///
/// Dropping it before completion cancels the request: a queued request never reaches
/// the transport; an in-flight request still completes on the wire but its result is
/// discarded.
#[must_use = "dropping the future cancels the request"]
pub struct ResponseFuture {
    rx: oneshot::Receiver<HttpResult<HttpResponse>>,
    /// Queue the request joined; a request moved to another bucket since is skipped
    /// by that queue's drain task instead
    queue: Weak<BucketQueue>,
    id: u64,
    done: bool,
}

impl ResponseFuture {
    /// Cancel explicitly; same as dropping
    pub fn cancel(self) {}
}

impl Future for ResponseFuture {
    type Output = HttpResult<HttpResponse>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.done = true;
                Poll::Ready(result.unwrap_or(Err(HttpError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(queue) = self.queue.upgrade() {
            if queue.remove(self.id) {
                tracing::debug!(job_id = self.id, "Queued request cancelled");
            }
        }
    }
}

/// Calls taken from both buckets for one dispatch
struct Permit {
    bucket: Arc<Bucket>,
    reserved: Reservation,
    global: Reservation,
}

struct Inner<T> {
    transport: T,
    config: DispatcherConfig,
    next_id: AtomicU64,
    queues: DashMap<BucketKey, Arc<BucketQueue>>,
    /// Server-assigned bucket of each route, re-keyed whenever a response says so
    route_buckets: DashMap<RouteKey, BucketKey>,
    buckets: DashMap<BucketKey, Arc<Bucket>>,
    global: Bucket,
}

/// Schedules outbound calls against per-bucket and global quotas
pub struct RequestDispatcher<T: HttpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: HttpTransport> Clone for RequestDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: HttpTransport> RequestDispatcher<T> {
    pub fn new(transport: T, config: DispatcherConfig) -> Self {
        let global = match config.global_requests_per_second {
            Some(limit) => Bucket::with_window(BucketKey::global(), limit, Duration::from_secs(1)),
            None => Bucket::new(BucketKey::global()),
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                next_id: AtomicU64::new(1),
                queues: DashMap::new(),
                route_buckets: DashMap::new(),
                buckets: DashMap::new(),
                global,
            }),
        }
    }

    /// Queue a request
    ///
    /// The request joins its bucket's queue immediately, so submission order is the
    /// order of `submit` calls. Must be called within a tokio runtime.
    pub fn submit(&self, request: Request) -> ResponseFuture {
        let (reply, rx) = oneshot::channel();
        let route = request.route().key();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let key = self.inner.bucket_key(&route);
        let queue = self.inner.queue(&key);

        tracing::trace!(route = %route, bucket = %key, job_id = id, "Request queued");

        let job = Job {
            id,
            request,
            reply,
            attempts: Attempts::default(),
        };
        if queue.push(job) {
            self.inner.spawn_drain(key, Arc::clone(&queue));
        }

        ResponseFuture {
            rx,
            queue: Arc::downgrade(&queue),
            id,
            done: false,
        }
    }

    /// Number of requests waiting (not yet dispatched) for this route
    pub fn queued(&self, route: &Route) -> usize {
        let route = route.key();
        let key = self.inner.bucket_key(&route);
        self.inner
            .queues
            .get(&key)
            .map_or(0, |queue| queue.count_route(&route))
    }

    /// Current quota of the bucket governing this route
    pub fn bucket_snapshot(&self, route: &Route) -> Option<BucketSnapshot> {
        let key = self.inner.bucket_key(&route.key());
        let bucket = self.inner.buckets.get(&key).map(|b| Arc::clone(&b))?;
        Some(bucket.snapshot(Instant::now()))
    }

    /// Current state of the global bucket
    pub fn global_snapshot(&self) -> BucketSnapshot {
        self.inner.global.snapshot(Instant::now())
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }
}

impl<T: HttpTransport> Inner<T> {
    fn bucket_key(&self, route: &RouteKey) -> BucketKey {
        self.route_buckets
            .get(route)
            .map_or_else(|| BucketKey::for_route(route), |key| key.clone())
    }

    fn bucket(&self, key: &BucketKey) -> Arc<Bucket> {
        let entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Bucket::new(key.clone())));
        Arc::clone(&entry)
    }

    fn queue(&self, key: &BucketKey) -> Arc<BucketQueue> {
        let entry = self.queues.entry(key.clone()).or_default();
        Arc::clone(&entry)
    }

    fn spawn_drain(self: &Arc<Self>, key: BucketKey, queue: Arc<BucketQueue>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain(key, queue).await });
    }

    async fn drain(self: Arc<Self>, key: BucketKey, queue: Arc<BucketQueue>) {
        while let Some(job) = queue.next_job() {
            if let Some(job) = self.process(&key, job).await {
                self.relocate(&key, &queue, job);
            }
        }
        tracing::trace!(bucket = %key, "Bucket queue drained");
    }

    /// Move a re-keyed route's jobs, `job` first, to the queue of its new bucket
    fn relocate(self: &Arc<Self>, from: &BucketKey, queue: &BucketQueue, job: Job) {
        let route = job.route();
        let to = self.bucket_key(&route);

        let mut jobs = vec![job];
        jobs.extend(queue.take_route(&route));

        tracing::debug!(
            route = %route,
            from = %from,
            to = %to,
            jobs = jobs.len(),
            "Moving queued requests to server bucket"
        );

        let target = self.queue(&to);
        if target.admit(jobs) {
            self.spawn_drain(to, target);
        }
    }

    /// Wait until both buckets allow a call, then reserve it
    ///
    /// Returns `None` if the caller cancelled while waiting.
    async fn acquire(&self, key: &BucketKey, route: &RouteKey, reply: &mut Reply) -> Option<Permit> {
        let bucket = self.bucket(key);

        loop {
            if reply.is_closed() {
                return None;
            }

            let now = Instant::now();

            if let Some(until) = bucket.ready_at(now).max(self.global.ready_at(now)) {
                tracing::debug!(
                    route = %route,
                    bucket = %bucket.key(),
                    wait_ms = until.saturating_duration_since(now).as_millis() as u64,
                    "Waiting for rate limit reset"
                );
                tokio::select! {
                    () = tokio::time::sleep_until(until) => {}
                    () = reply.closed() => return None,
                }
                continue;
            }

            let Ok(global) = self.global.try_reserve(now) else {
                continue;
            };
            let Ok(reserved) = bucket.try_reserve(now) else {
                self.global.refund(global);
                continue;
            };

            return Some(Permit {
                bucket,
                reserved,
                global,
            });
        }
    }

    /// Refresh quota from a response; returns the bucket now governing the route
    fn apply_quota(
        &self,
        route: &RouteKey,
        request: &Request,
        current: &Arc<Bucket>,
        headers: &RateLimitHeaders,
    ) -> Arc<Bucket> {
        let bucket = match &headers.bucket {
            Some(id) => {
                let key = BucketKey::from_server(id, request.route().major_parameter());
                let previous = self.route_buckets.insert(route.clone(), key.clone());
                if previous.as_ref() != Some(&key) {
                    tracing::debug!(
                        route = %route,
                        from = previous.as_ref().map(BucketKey::as_str),
                        to = %key,
                        "Route re-keyed to server bucket"
                    );
                }
                self.bucket(&key)
            }
            None => Arc::clone(current),
        };

        bucket.update(headers, Instant::now());
        bucket
    }

    /// Run one job to completion
    ///
    /// Hands the job back when its route now belongs to a different bucket than the
    /// queue it was taken from.
    async fn process(&self, queue_key: &BucketKey, mut job: Job) -> Option<Job> {
        let route = job.route();
        let backoff = Backoff::new(self.config.retry_backoff);

        let result = loop {
            if self.bucket_key(&route) != *queue_key {
                return Some(job);
            }

            let Some(permit) = self.acquire(queue_key, &route, &mut job.reply).await else {
                tracing::debug!(route = %route, job_id = job.id, "Request cancelled before dispatch");
                return None;
            };

            tracing::trace!(route = %route, job_id = job.id, bucket = %permit.bucket.key(), "Dispatching request");

            let outcome = match tokio::time::timeout(
                self.config.request_timeout,
                self.transport.execute(&job.request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            };

            let attempts = &mut job.attempts;
            let response = match outcome {
                Ok(response) => response,
                Err(error) => {
                    attempts.failures += 1;
                    if attempts.failures > self.config.max_retries {
                        break Err(HttpError::Network {
                            source: error,
                            attempts: attempts.failures,
                        });
                    }

                    let delay = backoff.delay_for(attempts.failures - 1);
                    tracing::warn!(
                        route = %route,
                        error = %error,
                        attempt = attempts.failures,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    if !sleep_unless_cancelled(delay, &mut job.reply).await {
                        return None;
                    }
                    continue;
                }
            };

            let headers = RateLimitHeaders::parse(&response);

            if response.status == 429 {
                // Not a normal decrement: give back what the reservation took, to the
                // buckets it was taken from and only while their windows last
                if !headers.has_quota() {
                    permit.bucket.refund(permit.reserved);
                }
                self.global.refund(permit.global);
            }

            let bucket = self.apply_quota(&route, &job.request, &permit.bucket, &headers);

            if response.status == 429 {
                attempts.rate_limited += 1;
                let retry = RetryAfter::parse(&response, &headers);
                let delay = if let Some(delay) = retry.delay {
                    attempts.missing_delays = 0;
                    delay
                } else {
                    attempts.missing_delays += 1;
                    backoff.delay_for(attempts.missing_delays - 1)
                };

                let until = Instant::now() + delay;
                if retry.global {
                    self.global.block_until(until);
                } else {
                    bucket.block_until(until);
                }

                if attempts.rate_limited > self.config.max_rate_limit_retries {
                    break Err(HttpError::RateLimitExceeded {
                        route: route.clone(),
                        attempts: attempts.rate_limited,
                    });
                }

                tracing::warn!(
                    route = %route,
                    bucket = %bucket.key(),
                    global = retry.global,
                    retry_after_ms = delay.as_millis() as u64,
                    server_delay = retry.delay.is_some(),
                    attempt = attempts.rate_limited,
                    "Rate limited, retrying at head of queue"
                );
                continue;
            }

            match response.status {
                status if status < 400 => break Ok(response),
                401 => {
                    break Err(HttpError::Authentication {
                        status: 401,
                        body: response.text(),
                    })
                }
                status if status >= 500 => {
                    attempts.failures += 1;
                    if attempts.failures > self.config.max_retries {
                        break Err(HttpError::Server {
                            status,
                            attempts: attempts.failures,
                        });
                    }

                    let delay = backoff.delay_for(attempts.failures - 1);
                    tracing::warn!(
                        route = %route,
                        status,
                        attempt = attempts.failures,
                        delay_ms = delay.as_millis() as u64,
                        "Server error, retrying"
                    );
                    if !sleep_unless_cancelled(delay, &mut job.reply).await {
                        return None;
                    }
                }
                status => {
                    break Err(HttpError::Client {
                        status,
                        body: response.text(),
                    })
                }
            }
        };

        if let Err(error) = &result {
            tracing::debug!(route = %route, job_id = job.id, error = %error, "Request failed");
        }

        if job.reply.send(result).is_err() {
            tracing::debug!(route = %route, job_id = job.id, "Result discarded, caller went away");
        }
        None
    }
}

/// Returns false if the caller cancelled during the sleep
async fn sleep_unless_cancelled(delay: Duration, reply: &mut Reply) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = reply.closed() => false,
    }
}
