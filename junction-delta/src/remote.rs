//! The remote space collaborator, plus an in-memory implementation.

use std::collections::BTreeMap;

use thiserror::Error;

use junction_core::types::title_key;
use junction_core::PageId;

/// Failure reported by a transport. Never retried by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered but the payload was not understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status { code: 404, .. })
    }
}

/// Operations the executor needs from the hosting service.
///
/// `parent` is `None` for pages that live directly under the space root
/// when the space has no homepage id configured.
pub trait RemoteSpaceClient {
    fn find_page_by_title(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
    ) -> Result<Option<PageId>, TransportError>;

    fn create_page(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
        body: &str,
    ) -> Result<PageId, TransportError>;

    fn update_page(&mut self, id: &PageId, title: &str, body: &str) -> Result<(), TransportError>;

    fn move_page(
        &mut self,
        id: &PageId,
        new_parent: Option<&PageId>,
        new_title: &str,
    ) -> Result<(), TransportError>;

    fn delete_page(&mut self, id: &PageId) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// In-memory space
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub title: String,
    pub parent: Option<PageId>,
    pub body: String,
}

/// One recorded call against [`InMemorySpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Find { title: String },
    Create { title: String, parent: Option<PageId> },
    Update { id: PageId },
    Move { id: PageId, new_parent: Option<PageId>, new_title: String },
    Delete { id: PageId },
}

impl RemoteCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, RemoteCall::Find { .. })
    }
}

/// A remote space held in memory.
///
/// Enforces the rules a real space enforces and the executor must respect:
/// sibling titles are unique (case-insensitive), parents must exist, and a
/// page with children cannot be deleted.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpace {
    pages: BTreeMap<PageId, RemotePage>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    /// Fail the mutating call with this zero-based index.
    fail_mutation_at: Option<usize>,
}

impl InMemorySpace {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            ..Self::default()
        }
    }

    /// Seed a page that already exists remotely, e.g. the space homepage or
    /// a page someone created by hand.
    pub fn seed(&mut self, title: &str, parent: Option<&PageId>, body: &str) -> PageId {
        let id = self.allocate();
        self.pages.insert(
            id.clone(),
            RemotePage {
                title: title.to_string(),
                parent: parent.cloned(),
                body: body.to_string(),
            },
        );
        id
    }

    /// Make the `n`th mutating call (zero-based) fail with a 500.
    pub fn fail_mutation_at(mut self, n: usize) -> Self {
        self.fail_mutation_at = Some(n);
        self
    }

    pub fn page(&self, id: &PageId) -> Option<&RemotePage> {
        self.pages.get(id)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&PageId, &RemotePage)> {
        self.pages.iter()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn calls(&self) -> &[RemoteCall] {
        &self.calls
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.iter().filter(|c| c.is_mutation()).count()
    }

    /// Title chain from the top of the space down to `id`.
    pub fn title_path(&self, id: &PageId) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.pages.get(id);
        while let Some(page) = current {
            chain.push(page.title.clone());
            current = page.parent.as_ref().and_then(|p| self.pages.get(p));
        }
        chain.reverse();
        chain
    }

    fn allocate(&mut self) -> PageId {
        self.next_id += 1;
        PageId(self.next_id.to_string())
    }

    fn record(&mut self, call: RemoteCall) -> Result<(), TransportError> {
        let is_mutation = call.is_mutation();
        let index = self.mutation_count();
        self.calls.push(call);
        if is_mutation && self.fail_mutation_at == Some(index) {
            return Err(TransportError::Status {
                code: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn sibling_with_title(&self, parent: Option<&PageId>, title: &str, except: Option<&PageId>) -> Option<&PageId> {
        let wanted = title_key(title);
        self.pages
            .iter()
            .find(|(id, p)| {
                Some(*id) != except && p.parent.as_ref() == parent && title_key(&p.title) == wanted
            })
            .map(|(id, _)| id)
    }

    fn check_parent(&self, parent: Option<&PageId>) -> Result<(), TransportError> {
        match parent {
            Some(p) if !self.pages.contains_key(p) => Err(not_found(p)),
            _ => Ok(()),
        }
    }

    fn check_title_free(&self, parent: Option<&PageId>, title: &str, except: Option<&PageId>) -> Result<(), TransportError> {
        if self.sibling_with_title(parent, title, except).is_some() {
            return Err(TransportError::Status {
                code: 400,
                message: format!("a page titled '{title}' already exists here"),
            });
        }
        Ok(())
    }
}

fn not_found(id: &PageId) -> TransportError {
    TransportError::Status {
        code: 404,
        message: format!("no page with id {id}"),
    }
}

impl RemoteSpaceClient for InMemorySpace {
    fn find_page_by_title(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
    ) -> Result<Option<PageId>, TransportError> {
        self.record(RemoteCall::Find {
            title: title.to_string(),
        })?;
        Ok(self.sibling_with_title(parent, title, None).cloned())
    }

    fn create_page(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
        body: &str,
    ) -> Result<PageId, TransportError> {
        self.record(RemoteCall::Create {
            title: title.to_string(),
            parent: parent.cloned(),
        })?;
        self.check_parent(parent)?;
        self.check_title_free(parent, title, None)?;
        Ok(self.seed(title, parent, body))
    }

    fn update_page(&mut self, id: &PageId, title: &str, body: &str) -> Result<(), TransportError> {
        self.record(RemoteCall::Update { id: id.clone() })?;
        let page = self.pages.get_mut(id).ok_or_else(|| not_found(id))?;
        page.title = title.to_string();
        page.body = body.to_string();
        Ok(())
    }

    fn move_page(
        &mut self,
        id: &PageId,
        new_parent: Option<&PageId>,
        new_title: &str,
    ) -> Result<(), TransportError> {
        self.record(RemoteCall::Move {
            id: id.clone(),
            new_parent: new_parent.cloned(),
            new_title: new_title.to_string(),
        })?;
        if !self.pages.contains_key(id) {
            return Err(not_found(id));
        }
        self.check_parent(new_parent)?;
        self.check_title_free(new_parent, new_title, Some(id))?;
        if let Some(page) = self.pages.get_mut(id) {
            page.parent = new_parent.cloned();
            page.title = new_title.to_string();
        }
        Ok(())
    }

    fn delete_page(&mut self, id: &PageId) -> Result<(), TransportError> {
        self.record(RemoteCall::Delete { id: id.clone() })?;
        if !self.pages.contains_key(id) {
            return Err(not_found(id));
        }
        if self.pages.values().any(|p| p.parent.as_ref() == Some(id)) {
            return Err(TransportError::Status {
                code: 400,
                message: format!("page {id} still has children"),
            });
        }
        self.pages.remove(id);
        Ok(())
    }
}
