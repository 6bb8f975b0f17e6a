//! Depth-first walk of a cluster namespace driven by the aggregate API.

use crate::{api::AggregateApi, error::Result};
use std::collections::VecDeque;
use tracing::debug;

/// Totals for one visited namespace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    pub path: String,
    pub total_size_bytes: u64,
    pub total_file_count: Option<u64>,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

// A directory whose children are being expanded.
struct Frame {
    path: String,
    pending: VecDeque<String>,
    cursor: Cursor,
}

/// Lazy pre-order sequence of results. Listing pages are fetched only when
/// the directories already seen are exhausted. After an error the sequence
/// ends.
pub struct Traversal<'a, S: AggregateApi + ?Sized> {
    session: &'a S,
    root: Option<String>,
    recurse: bool,
    stack: Vec<Frame>,
    finished: bool,
}

/// Query `path` and, when `recurse` is set, every directory below it.
pub fn query<'a, S: AggregateApi + ?Sized>(
    session: &'a S,
    path: &str,
    recurse: bool,
) -> Traversal<'a, S> {
    Traversal {
        session,
        root: Some(path.to_string()),
        recurse,
        stack: Vec::new(),
        finished: false,
    }
}

pub fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

impl<S: AggregateApi + ?Sized> Traversal<'_, S> {
    fn visit(&mut self, path: String) -> Result<AggregateResult> {
        let aggregates = self.session.aggregates(&path)?;
        debug!("{}: {} bytes", path, aggregates.total_size_bytes);
        if self.recurse {
            self.stack.push(Frame {
                path: path.clone(),
                pending: VecDeque::new(),
                cursor: Cursor::Start,
            });
        }
        Ok(AggregateResult {
            path,
            total_size_bytes: aggregates.total_size_bytes,
            total_file_count: aggregates.total_files,
        })
    }

    fn advance(&mut self) -> Option<Result<AggregateResult>> {
        if let Some(root) = self.root.take() {
            return Some(self.visit(root));
        }
        loop {
            let frame = self.stack.last_mut()?;
            if let Some(child) = frame.pending.pop_front() {
                return Some(self.visit(child));
            }
            let cursor = match std::mem::replace(&mut frame.cursor, Cursor::Done) {
                Cursor::Done => {
                    self.stack.pop();
                    continue;
                }
                Cursor::Start => None,
                Cursor::Next(next) => Some(next),
            };
            let page = match self.session.list_page(&frame.path, cursor.as_deref()) {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            frame.cursor = page.next.map_or(Cursor::Done, Cursor::Next);
            let parent = &frame.path;
            let children: Vec<String> = page
                .entries
                .into_iter()
                .filter(|entry| entry.is_directory)
                .map(|entry| child_path(parent, &entry.name))
                .collect();
            frame.pending.extend(children);
        }
    }
}

impl<S: AggregateApi + ?Sized> Iterator for Traversal<'_, S> {
    type Item = Result<AggregateResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.advance();
        match item {
            Some(Ok(_)) => {}
            _ => {
                self.finished = true;
                self.stack.clear();
            }
        }
        item
    }
}
