//! In-memory remote source for testing.

use super::{NodeBatch, RemoteSource};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use figpack_extract::{Document, Node, Page};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The two operations of [`RemoteSource`], for scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    File,
    Nodes,
}

#[derive(Default)]
struct Recorded {
    file_calls: usize,
    node_requests: Vec<Vec<String>>,
    failures: HashMap<MockOp, VecDeque<ErrorKind>>,
}

/// Serves a fixed [`Document`], honouring requested depths.
///
/// Calls are recorded so tests can assert how the client used the source,
/// and failures can be queued per operation; each queued failure is returned
/// (in order) by the next call of that operation instead of data.
pub struct MockSource {
    name: String,
    document: Document,
    hidden: HashSet<String>,
    recorded: Mutex<Recorded>,
}

impl MockSource {
    pub fn new(document: Document) -> Self {
        Self {
            name: "mock".to_string(),
            document,
            hidden: HashSet::new(),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Leave these page identifiers out of every subtree response, as if the
    /// remote had lost them between the shallow and deep fetches.
    pub fn with_hidden_pages(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hidden.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_failures(self, op: MockOp, failures: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.recorded().failures.entry(op).or_default().extend(failures);
        self
    }

    pub fn file_calls(&self) -> usize {
        self.recorded().file_calls
    }

    pub fn node_calls(&self) -> usize {
        self.recorded().node_requests.len()
    }

    /// Identifiers requested by each subtree fetch, in call order.
    pub fn node_requests(&self) -> Vec<Vec<String>> {
        self.recorded().node_requests.clone()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_failure(&self, op: MockOp) -> Option<ErrorKind> {
        self.recorded().failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn page_as_node(page: &Page) -> Node {
        Node::container(page.id.clone(), page.name.clone()).with_children(page.children.clone())
    }

    fn find(&self, id: &str) -> Option<Node> {
        fn search<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
            nodes.iter().find_map(|node| match node.id == id {
                true => Some(node),
                false => search(&node.children, id),
            })
        }
        if let Some(page) = self.document.pages.iter().find(|page| page.id == id) {
            return Some(Self::page_as_node(page));
        }
        self.document.pages.iter().find_map(|page| search(&page.children, id)).cloned()
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_file(&self, file_key: &str, depth: u32) -> Result<Document> {
        self.recorded().file_calls += 1;
        if let Some(kind) = self.next_failure(MockOp::File) {
            exn::bail!(kind);
        }
        tracing::trace!(file_key, depth, "Mock file fetch");
        let pages = self
            .document
            .pages
            .iter()
            .map(|page| {
                let children = match depth {
                    0 | 1 => Vec::new(),
                    _ => page.children.iter().map(|child| child.truncated(depth - 2)).collect(),
                };
                Page::new(page.id.clone(), page.name.clone(), children)
            })
            .collect();
        Ok(Document::new(self.document.version.clone(), pages))
    }

    async fn fetch_nodes(&self, file_key: &str, ids: &[String], depth: u32) -> Result<NodeBatch> {
        self.recorded().node_requests.push(ids.to_vec());
        if let Some(kind) = self.next_failure(MockOp::Nodes) {
            exn::bail!(kind);
        }
        tracing::trace!(file_key, depth, ids = ids.len(), "Mock nodes fetch");
        Ok(ids
            .iter()
            .filter(|id| !self.hidden.contains(id.as_str()))
            .filter_map(|id| self.find(id).map(|node| (id.clone(), node.truncated(depth))))
            .collect())
    }
}
