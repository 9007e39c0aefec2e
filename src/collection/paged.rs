//! Lazy, single-consumer traversal over paged list endpoints.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{decode_as, record_link};
use crate::entity::ConcreteEntity;
use crate::error::{Error, Result};
use crate::link::LinkByUid;
use crate::session::{QueryParams, Session};

/// Pull-based cursor over pages of `T`.
///
/// Each page is fetched only when the previous one is drained. The
/// traversal ends when a page carries no continuation token, and never
/// yields the same object twice. A continuation token seen before also ends
/// the traversal instead of looping. The first error is yielded once and
/// ends the traversal.
///
/// Not meant to be shared: call the collection method again for a fresh
/// traversal.
pub struct PagedIter<T> {
    session: Arc<dyn Session>,
    path: String,
    params: QueryParams,
    body: Option<Value>,
    cursor: Option<String>,
    buffer: VecDeque<Value>,
    seen: FxHashSet<LinkByUid>,
    seen_cursors: FxHashSet<String>,
    exhausted: bool,
    pages: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ConcreteEntity> PagedIter<T> {
    /// Traverse a `GET` list endpoint.
    pub(crate) fn get(session: Arc<dyn Session>, path: String, params: QueryParams) -> Self {
        Self::new(session, path, params, None)
    }

    /// Traverse a `POST` list endpoint (the body is resent with every page).
    pub(crate) fn post(
        session: Arc<dyn Session>,
        path: String,
        params: QueryParams,
        body: Value,
    ) -> Self {
        Self::new(session, path, params, Some(body))
    }

    fn new(session: Arc<dyn Session>, path: String, params: QueryParams, body: Option<Value>) -> Self {
        Self {
            session,
            path,
            params,
            body,
            cursor: None,
            buffer: VecDeque::new(),
            seen: FxHashSet::default(),
            seen_cursors: FxHashSet::default(),
            exhausted: false,
            pages: 0,
            _marker: PhantomData,
        }
    }

    /// Pages fetched so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut params = self.params.clone();
        if let Some(cursor) = &self.cursor {
            params.push("cursor", cursor);
        }
        let page = match &self.body {
            Some(body) => self.session.post(&self.path, body, &params)?,
            None => self.session.get(&self.path, &params)?,
        };
        self.pages += 1;

        let contents = page
            .get("contents")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Decode(format!("page from {} has no 'contents' list", self.path)))?;
        self.buffer.extend(contents.iter().cloned());
        debug!(path = %self.path, page = self.pages, records = contents.len(), "fetched page");

        match page.get("next").and_then(Value::as_str) {
            Some(next) if !contents.is_empty() => {
                if self.seen_cursors.insert(next.to_string()) {
                    self.cursor = Some(next.to_string());
                } else {
                    warn!(path = %self.path, cursor = next, "continuation token repeated; stopping");
                    self.exhausted = true;
                }
            }
            _ => self.exhausted = true,
        }
        Ok(())
    }
}

impl<T: ConcreteEntity> Iterator for PagedIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                if let Some(link) = record_link(&record) {
                    if !self.seen.insert(link) {
                        continue;
                    }
                }
                return Some(decode_as::<T>(&record));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}

impl<T> fmt::Debug for PagedIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedIter")
            .field("path", &self.path)
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
