use fnv::FnvHashMap;
use std::collections::VecDeque;
use std::task::{Context, Poll, Waker};
use url::Url;

use super::*;

/// Stream creation requests waiting for a free concurrency slot.
///
/// Requests are served highest priority first and in arrival order within
/// a priority. Results stay in the index until they are polled or the
/// session closes.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    next_id: u64,
    entries: FnvHashMap<u64, Entry>,
    queues: [VecDeque<u64>; NUM_PRIORITIES],
    pending: [usize; NUM_PRIORITIES],
    /// Set once the session has closed.
    closed: Option<Error>,
}

/// What a cancelled request had become.
#[derive(Debug, PartialEq)]
pub(crate) enum Cancelled {
    /// It was still waiting for a slot.
    Queued,
    /// It already had a stream, which the caller now owns.
    Served(StreamRef),
    /// It had failed, was already polled, or is unknown.
    Nothing,
}

/// Handle to a queued stream request, see
/// [`Session::poll_request`](crate::Session::poll_request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

#[derive(Debug)]
struct Entry {
    priority: Priority,
    url: Option<Url>,
    state: RequestState,
    task: Option<Waker>,
}

#[derive(Debug)]
enum RequestState {
    Queued,
    Done(Result<StreamRef, Error>),
}

impl RequestQueue {
    pub fn new() -> Self {
        RequestQueue::default()
    }

    pub fn enqueue(&mut self, priority: Priority, url: Url) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;

        tracing::trace!("enqueue stream request; id={}; priority={:?}", id, priority);

        self.entries.insert(
            id,
            Entry {
                priority,
                url: Some(url),
                state: RequestState::Queued,
                task: None,
            },
        );
        self.queues[priority.index()].push_back(id);
        self.pending[priority.index()] += 1;

        RequestId(id)
    }

    /// Forget a request, handing back the stream it was served with, if
    /// any.
    pub fn cancel(&mut self, id: RequestId) -> Cancelled {
        let entry = match self.entries.remove(&id.0) {
            Some(entry) => entry,
            None => return Cancelled::Nothing,
        };

        tracing::trace!("cancel stream request; id={}", id.0);

        match entry.state {
            RequestState::Queued => {
                let priority = entry.priority.index();
                self.pending[priority] -= 1;
                self.queues[priority].retain(|queued| *queued != id.0);
                Cancelled::Queued
            }
            RequestState::Done(Ok(stream)) => Cancelled::Served(stream),
            RequestState::Done(Err(_)) => Cancelled::Nothing,
        }
    }

    /// Take the next request to serve.
    pub fn pop_next(&mut self) -> Option<(RequestId, Url, Priority)> {
        for priority in Priority::descending() {
            let queue = &mut self.queues[priority.index()];

            while let Some(id) = queue.pop_front() {
                let entry = match self.entries.get_mut(&id) {
                    Some(entry) => entry,
                    None => continue,
                };

                if let Some(url) = entry.url.take() {
                    self.pending[priority.index()] -= 1;
                    return Some((RequestId(id), url, priority));
                }
            }
        }

        None
    }

    /// Complete a request taken with `pop_next` or fail a queued one.
    pub fn complete(&mut self, id: RequestId, result: Result<StreamRef, Error>) {
        if let Some(entry) = self.entries.get_mut(&id.0) {
            if entry.url.take().is_some() {
                self.pending[entry.priority.index()] -= 1;
            }
            entry.state = RequestState::Done(result);
            if let Some(task) = entry.task.take() {
                task.wake();
            }
        }
    }

    /// Fail every request still waiting. Returns how many there were.
    pub fn fail_all(&mut self, err: &Error) -> usize {
        let mut failed = 0;

        while let Some((id, _, _)) = self.pop_next() {
            self.complete(id, Err(err.clone()));
            failed += 1;
        }

        failed
    }

    /// Fail everything and drop every result that was not polled. Later
    /// polls of requests made before this resolve to `err`.
    pub fn close(&mut self, err: Error) {
        for entry in self.entries.values_mut() {
            if let Some(task) = entry.task.take() {
                task.wake();
            }
        }

        tracing::trace!("close stream requests; dropped={}", self.entries.len());

        self.entries.clear();
        for queue in self.queues.iter_mut() {
            queue.clear();
        }
        self.pending = [0; NUM_PRIORITIES];
        self.closed = Some(err);
    }

    pub fn poll_result(
        &mut self,
        id: RequestId,
        cx: &mut Context,
    ) -> Poll<Result<StreamRef, Error>> {
        let entry = match self.entries.get_mut(&id.0) {
            Some(entry) => entry,
            None => {
                return match self.closed {
                    Some(ref err) if id.0 < self.next_id => Poll::Ready(Err(err.clone())),
                    _ => Poll::Ready(Err(UserError::UnknownRequest.into())),
                };
            }
        };

        match entry.state {
            RequestState::Queued => {
                entry.task = Some(cx.waker().clone());
                Poll::Pending
            }
            RequestState::Done(_) => match self.entries.remove(&id.0) {
                Some(Entry {
                    state: RequestState::Done(result),
                    ..
                }) => Poll::Ready(result),
                _ => Poll::Ready(Err(UserError::UnknownRequest.into())),
            },
        }
    }

    pub fn len(&self, priority: Priority) -> usize {
        self.pending[priority.index()]
    }

    pub fn total_len(&self) -> usize {
        self.pending.iter().sum()
    }
}
