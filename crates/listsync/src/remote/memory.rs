//! In-process implementation of [`CollectionClient`].
//!
//! `InMemoryRemote` keeps users, the caller's block list, follow graphs and
//! collections in memory and behaves like the remote service where it
//! matters to the sync engine: adds silently skip accounts the service would
//! refuse, listings are cursor-paged, and any operation can be made to fail
//! on demand. It backs the engine's tests and offline simulations.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::errors::{RemoteError, Result};
use super::types::{
    Caller, CollectionClient, CollectionRef, FollowKind, MAX_ADD_IDS, MAX_LOOKUP_IDS, Page,
    Relationship, ResolvedUser, UserRef,
};

/// Default number of items per page for paged listings.
const DEFAULT_PAGE_SIZE: usize = 20;

/// Remote operations, used for call logs and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    VerifyCaller,
    FindCollection,
    ListMembers,
    BulkLookup,
    ListCollections,
    Relationship,
    BlockedUsers,
    FollowGraph,
    CreateCollection,
    DestroyCollection,
    AddMembers,
}

impl Operation {
    /// Whether the operation mutates remote state.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateCollection | Self::DestroyCollection | Self::AddMembers
        )
    }
}

#[derive(Debug, Clone)]
struct MemUser {
    display_name: String,
    protected: bool,
    blocks_caller: Option<bool>,
}

#[derive(Debug, Clone)]
struct MemCollection {
    id: String,
    name: String,
    members: Vec<String>,
}

impl MemCollection {
    fn to_ref(&self) -> CollectionRef {
        CollectionRef {
            id: self.id.clone(),
            name: self.name.clone(),
            member_count: self.members.len(),
        }
    }
}

#[derive(Debug)]
struct State {
    caller: Caller,
    users: BTreeMap<String, MemUser>,
    blocked_by_caller: BTreeSet<String>,
    follow: HashMap<(String, FollowKind), Vec<String>>,
    collections: Vec<MemCollection>,
    refused_on_add: BTreeSet<String>,
    faults: HashMap<Operation, VecDeque<RemoteError>>,
    calls: Vec<Operation>,
    add_batches: Vec<Vec<String>>,
    next_id: u64,
    page_size: usize,
}

/// In-memory remote list service.
///
/// Cloning shares the underlying state, so a test can hand one clone to the
/// engine and inspect the other afterwards.
#[derive(Debug, Clone)]
pub struct InMemoryRemote {
    state: Arc<Mutex<State>>,
}

impl InMemoryRemote {
    /// Create a remote whose credential belongs to `caller_id` and may write.
    pub fn new(caller_id: impl Into<String>) -> Self {
        let caller_id = caller_id.into();
        let mut users = BTreeMap::new();
        users.insert(
            caller_id.clone(),
            MemUser {
                display_name: caller_id.clone(),
                protected: false,
                blocks_caller: Some(false),
            },
        );

        Self {
            state: Arc::new(Mutex::new(State {
                caller: Caller {
                    id: caller_id.clone(),
                    display_name: caller_id,
                    can_write: true,
                },
                users,
                blocked_by_caller: BTreeSet::new(),
                follow: HashMap::new(),
                collections: Vec::new(),
                refused_on_add: BTreeSet::new(),
                faults: HashMap::new(),
                calls: Vec::new(),
                add_batches: Vec::new(),
                next_id: 1,
                page_size: DEFAULT_PAGE_SIZE,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_user(self, id: &str, name: &str, protected: bool, blocks_caller: Option<bool>) -> Self {
        self.lock().users.insert(
            id.to_string(),
            MemUser {
                display_name: name.to_string(),
                protected,
                blocks_caller,
            },
        );
        self
    }

    /// Register an ordinary public account.
    pub fn with_user(self, id: &str, name: &str) -> Self {
        self.insert_user(id, name, false, Some(false))
    }

    /// Register several ordinary accounts whose display name equals their id.
    pub fn with_users(self, ids: &[&str]) -> Self {
        ids.iter().fold(self, |remote, id| remote.with_user(id, id))
    }

    /// Register a protected account.
    pub fn with_protected_user(self, id: &str, name: &str) -> Self {
        self.insert_user(id, name, true, Some(false))
    }

    /// Register an account that blocks the caller.
    pub fn with_user_blocking_caller(self, id: &str, name: &str) -> Self {
        self.insert_user(id, name, false, Some(true))
    }

    /// Register an account whose relationship reports no blocking flag.
    pub fn with_user_unknown_relationship(self, id: &str, name: &str) -> Self {
        self.insert_user(id, name, false, None)
    }

    /// Put `id` on the caller's block list.
    pub fn with_blocked_by_caller(self, id: &str) -> Self {
        self.lock().blocked_by_caller.insert(id.to_string());
        self
    }

    /// Set a user's followees or followers.
    pub fn with_follow_graph(self, user_id: &str, kind: FollowKind, ids: &[&str]) -> Self {
        self.lock().follow.insert(
            (user_id.to_string(), kind),
            ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    /// Create a collection owned by the caller with the given members.
    pub fn with_collection(self, name: &str, members: &[&str]) -> Self {
        {
            let mut state = self.lock();
            let id = format!("list-{}", state.next_id);
            state.next_id += 1;
            state.collections.push(MemCollection {
                id,
                name: name.to_string(),
                members: members.iter().map(|m| m.to_string()).collect(),
            });
        }
        self
    }

    /// Make the credential read-only.
    pub fn read_only(self) -> Self {
        self.lock().caller.can_write = false;
        self
    }

    /// Set the number of items per page for paged listings.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// Multiple faults for the same operation are returned in FIFO order.
    pub fn fail_next(&self, op: Operation, error: RemoteError) {
        self.lock().faults.entry(op).or_default().push_back(error);
    }

    /// Make add-members silently skip `user_id`, as the service does for
    /// accounts that became ineligible after they were checked.
    pub fn refuse_on_add(&self, user_id: &str) {
        self.lock().refused_on_add.insert(user_id.to_string());
    }

    /// Add a member directly, as another writer would.
    pub fn insert_member(&self, collection_name: &str, user_id: &str) {
        let mut state = self.lock();
        if let Some(collection) = state
            .collections
            .iter_mut()
            .find(|c| c.name == collection_name)
        {
            collection.members.push(user_id.to_string());
        }
    }

    /// Current state of a collection, by name.
    pub fn collection(&self, name: &str) -> Option<CollectionRef> {
        self.lock()
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(MemCollection::to_ref)
    }

    /// Current members of a collection, by name.
    pub fn members(&self, name: &str) -> Option<Vec<String>> {
        self.lock()
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.members.clone())
    }

    /// All operations performed so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    /// Number of times `op` was called.
    pub fn call_count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// The identifiers submitted by each add-members call, in order.
    pub fn add_batches(&self) -> Vec<Vec<String>> {
        self.lock().add_batches.clone()
    }

    /// Record the call and return an injected fault, if any.
    fn enter(&self, op: Operation) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(op);
        if let Some(err) = state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }
}

fn page_of(ids: &[String], cursor: Option<String>, page_size: usize) -> Result<Page<UserRef>> {
    slice_page(ids, cursor, page_size, |id| UserRef::new(id.clone()))
}

fn slice_page<T, U>(
    items: &[T],
    cursor: Option<String>,
    page_size: usize,
    to_item: impl Fn(&T) -> U,
) -> Result<Page<U>> {
    let start = match cursor {
        Some(c) => c
            .parse::<usize>()
            .map_err(|_| RemoteError::api(400, format!("invalid cursor: {c}")))?,
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let page = items
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(to_item)
        .collect();
    let next_cursor = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: page,
        next_cursor,
    })
}

fn find_collection_mut<'a>(
    state: &'a mut State,
    collection: &CollectionRef,
) -> Result<&'a mut MemCollection> {
    state
        .collections
        .iter_mut()
        .find(|c| c.id == collection.id)
        .ok_or_else(|| RemoteError::not_found(format!("collection {}", collection.name)))
}

#[async_trait]
impl CollectionClient for InMemoryRemote {
    async fn verify_caller(&self) -> Result<Caller> {
        let state = self.enter(Operation::VerifyCaller)?;
        Ok(state.caller.clone())
    }

    async fn find_collection(&self, name: &str) -> Result<Option<CollectionRef>> {
        let state = self.enter(Operation::FindCollection)?;
        Ok(state
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(MemCollection::to_ref))
    }

    async fn owned_collections(&self, cursor: Option<String>) -> Result<Page<CollectionRef>> {
        let state = self.enter(Operation::ListCollections)?;
        slice_page(&state.collections, cursor, state.page_size, MemCollection::to_ref)
    }

    async fn list_members(
        &self,
        collection: &CollectionRef,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>> {
        let mut state = self.enter(Operation::ListMembers)?;
        let page_size = state.page_size;
        let found = find_collection_mut(&mut state, collection)?;
        page_of(&found.members, cursor, page_size)
    }

    async fn bulk_lookup(&self, user_ids: &[String]) -> Result<Vec<ResolvedUser>> {
        let state = self.enter(Operation::BulkLookup)?;
        if user_ids.len() > MAX_LOOKUP_IDS {
            return Err(RemoteError::api(
                400,
                format!("too many ids in lookup: {}", user_ids.len()),
            ));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| {
                state.users.get(id).map(|user| ResolvedUser {
                    id: id.clone(),
                    display_name: user.display_name.clone(),
                    protected: user.protected,
                })
            })
            .collect())
    }

    async fn relationship(&self, source_id: &str, target_id: &str) -> Result<Relationship> {
        let state = self.enter(Operation::Relationship)?;
        let target = state
            .users
            .get(target_id)
            .ok_or_else(|| RemoteError::not_found(format!("user {target_id}")))?;
        if source_id != state.caller.id {
            return Ok(Relationship::default());
        }
        Ok(Relationship {
            blocking: Some(state.blocked_by_caller.contains(target_id)),
            blocked_by: target.blocks_caller,
        })
    }

    async fn blocked_users(&self, cursor: Option<String>) -> Result<Page<UserRef>> {
        let state = self.enter(Operation::BlockedUsers)?;
        let ids: Vec<String> = state.blocked_by_caller.iter().cloned().collect();
        page_of(&ids, cursor, state.page_size)
    }

    async fn follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>> {
        let state = self.enter(Operation::FollowGraph)?;
        let ids = state
            .follow
            .get(&(user_id.to_string(), kind))
            .ok_or_else(|| RemoteError::not_found(format!("user {user_id}")))?;
        let mut page = page_of(ids, cursor, state.page_size)?;
        for user in &mut page.items {
            user.display_name = state.users.get(&user.id).map(|u| u.display_name.clone());
        }
        Ok(page)
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionRef> {
        let mut state = self.enter(Operation::CreateCollection)?;
        if !state.caller.can_write {
            return Err(RemoteError::AuthRequired);
        }
        let collection = MemCollection {
            id: format!("list-{}", state.next_id),
            name: name.to_string(),
            members: Vec::new(),
        };
        state.next_id += 1;
        let created = collection.to_ref();
        state.collections.push(collection);
        Ok(created)
    }

    async fn destroy_collection(&self, collection: &CollectionRef) -> Result<()> {
        let mut state = self.enter(Operation::DestroyCollection)?;
        if !state.caller.can_write {
            return Err(RemoteError::AuthRequired);
        }
        let before = state.collections.len();
        state.collections.retain(|c| c.id != collection.id);
        if state.collections.len() == before {
            return Err(RemoteError::not_found(format!(
                "collection {}",
                collection.name
            )));
        }
        Ok(())
    }

    async fn add_members(
        &self,
        collection: &CollectionRef,
        user_ids: &[String],
    ) -> Result<CollectionRef> {
        let mut state = self.enter(Operation::AddMembers)?;
        if !state.caller.can_write {
            return Err(RemoteError::AuthRequired);
        }
        if user_ids.len() > MAX_ADD_IDS {
            return Err(RemoteError::api(
                400,
                format!("too many ids in add: {}", user_ids.len()),
            ));
        }
        state.add_batches.push(user_ids.to_vec());

        let accepted: Vec<String> = user_ids
            .iter()
            .filter(|id| {
                !state.refused_on_add.contains(*id)
                    && !state.blocked_by_caller.contains(*id)
                    && state
                        .users
                        .get(*id)
                        .is_some_and(|u| !u.protected && u.blocks_caller != Some(true))
            })
            .cloned()
            .collect();

        let found = find_collection_mut(&mut state, collection)?;
        for id in accepted {
            if !found.members.contains(&id) {
                found.members.push(id);
            }
        }
        Ok(found.to_ref())
    }
}
