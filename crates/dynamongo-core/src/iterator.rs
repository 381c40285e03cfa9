//! Lazy iteration across result pages.

use std::collections::VecDeque;
use std::marker::PhantomData;

use dynamongo_model::{Item, ModelSchema, QueryInput, ScanInput};

use crate::cursor::Cursor;
use crate::error::AdapterResult;
use crate::executor::Adapter;
use crate::model::Model;

#[derive(Debug, Clone)]
enum Source {
    Query(QueryInput),
    Scan(ScanInput),
}

impl Source {
    fn exclusive_start(&self) -> Option<&String> {
        match self {
            Self::Query(input) => input.exclusive_start.as_ref(),
            Self::Scan(input) => input.exclusive_start.as_ref(),
        }
    }

    fn set_exclusive_start(&mut self, token: Option<String>) {
        match self {
            Self::Query(input) => input.exclusive_start = token,
            Self::Scan(input) => input.exclusive_start = token,
        }
    }
}

/// Items of a query or scan, fetched one page at a time.
///
/// The first error ends the iteration.
#[derive(Debug)]
pub struct ItemIterator<'a> {
    adapter: &'a Adapter,
    schema: &'a ModelSchema,
    source: Source,
    buffer: VecDeque<Item>,
    done: bool,
    last_yielded: Option<Item>,
    last_page_scanned: usize,
    total_yielded: usize,
}

impl<'a> ItemIterator<'a> {
    pub(crate) fn query(adapter: &'a Adapter, schema: &'a ModelSchema, input: QueryInput) -> Self {
        Self::new(adapter, schema, Source::Query(input))
    }

    pub(crate) fn scan(adapter: &'a Adapter, schema: &'a ModelSchema, input: ScanInput) -> Self {
        Self::new(adapter, schema, Source::Scan(input))
    }

    fn new(adapter: &'a Adapter, schema: &'a ModelSchema, source: Source) -> Self {
        Self {
            adapter,
            schema,
            source,
            buffer: VecDeque::new(),
            done: false,
            last_yielded: None,
            last_page_scanned: 0,
            total_yielded: 0,
        }
    }

    /// Token resuming right after the last yielded item. Before the first
    /// item this is the starting token, if any.
    pub fn cursor(&self) -> AdapterResult<Option<String>> {
        let Some(item) = &self.last_yielded else {
            return Ok(self.initial_token().cloned());
        };
        let scope = match &self.source {
            Source::Query(input) => self.adapter.query_scope(self.schema, input)?,
            Source::Scan(input) => {
                let as_query = QueryInput::builder()
                    .consistent_read(input.consistent_read)
                    .build();
                self.adapter.query_scope(self.schema, &as_query)?
            }
        };
        Ok(Some(Cursor::from_item(item, &scope)?.encode()?))
    }

    /// Scanned count of the most recently fetched page.
    #[must_use]
    pub fn last_page_scanned(&self) -> usize {
        self.last_page_scanned
    }

    /// Items yielded so far.
    #[must_use]
    pub fn total_yielded(&self) -> usize {
        self.total_yielded
    }

    fn initial_token(&self) -> Option<&String> {
        if self.total_yielded == 0 {
            self.source.exclusive_start()
        } else {
            None
        }
    }

    pub(crate) fn stop(&mut self) {
        self.done = true;
        self.buffer.clear();
    }

    fn fetch(&mut self) -> AdapterResult<()> {
        let page = match &self.source {
            Source::Query(input) => self.adapter.query(self.schema, input)?,
            Source::Scan(input) => self.adapter.scan(self.schema, input)?,
        };
        self.last_page_scanned = page.scanned_count;
        self.buffer.extend(page.items);
        match page.cursor {
            Some(token) => self.source.set_exclusive_start(Some(token)),
            None => self.done = true,
        }
        Ok(())
    }
}

impl Iterator for ItemIterator<'_> {
    type Item = AdapterResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                self.total_yielded += 1;
                self.last_yielded = Some(item.clone());
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.stop();
                return Some(Err(e));
            }
        }
    }
}

/// Typed entities of a query or scan.
#[derive(Debug)]
pub struct ResultIterator<'a, M> {
    inner: ItemIterator<'a>,
    _model: PhantomData<fn() -> M>,
}

impl<'a, M: Model> ResultIterator<'a, M> {
    pub(crate) fn new(inner: ItemIterator<'a>) -> Self {
        Self {
            inner,
            _model: PhantomData,
        }
    }

    /// Token resuming right after the last yielded entity.
    pub fn cursor(&self) -> AdapterResult<Option<String>> {
        self.inner.cursor()
    }

    /// Scanned count of the most recently fetched page.
    #[must_use]
    pub fn last_page_scanned(&self) -> usize {
        self.inner.last_page_scanned()
    }

    /// Entities yielded so far.
    #[must_use]
    pub fn total_yielded(&self) -> usize {
        self.inner.total_yielded()
    }
}

impl<M: Model> Iterator for ResultIterator<'_, M> {
    type Item = AdapterResult<M>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.inner.next()? {
            Ok(item) => item,
            Err(e) => return Some(Err(e)),
        };
        match M::from_item(item) {
            Ok(model) => Some(Ok(model)),
            Err(e) => {
                self.inner.stop();
                Some(Err(e))
            }
        }
    }
}
