//! In-memory [`WorkloadAccessor`] emulating the API server's optimistic concurrency.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use async_trait::async_trait;
use kube::ResourceExt;

use crate::{
    client::{Error, WorkloadAccessor},
    workload::Workload,
};

type Key = (String, String);

pub(crate) struct FakeAccessor<W> {
    state: Mutex<State<W>>,
}

struct State<W> {
    objects: BTreeMap<Key, W>,
    pending_conflicts: usize,
    failing_updates: bool,
    unreadable: BTreeSet<String>,
    get_calls: usize,
    update_calls: usize,
}

impl<W: Workload> FakeAccessor<W> {
    pub(crate) fn new(objects: impl IntoIterator<Item = W>) -> Self {
        let accessor = Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                pending_conflicts: 0,
                failing_updates: false,
                unreadable: BTreeSet::new(),
                get_calls: 0,
                update_calls: 0,
            }),
        };
        for object in objects {
            accessor.insert(object);
        }
        accessor
    }

    pub(crate) fn insert(&self, mut object: W) {
        object.meta_mut().resource_version = Some("1".to_owned());
        self.lock().objects.insert(key(&object), object);
    }

    pub(crate) fn object(&self, namespace: &str, name: &str) -> W {
        self.lock()
            .objects
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .expect("object must exist")
    }

    /// Changes a stored object as another client would, bumping its resource version.
    pub(crate) fn modify(&self, namespace: &str, name: &str, change: impl FnOnce(&mut W)) {
        let mut state = self.lock();
        let object = state
            .objects
            .get_mut(&(namespace.to_owned(), name.to_owned()))
            .expect("object must exist");
        change(object);
        bump_resource_version(object);
    }

    /// The next `count` updates race against a concurrent writer and lose.
    pub(crate) fn inject_conflicts(&self, count: usize) {
        self.lock().pending_conflicts = count;
    }

    pub(crate) fn fail_updates(&self) {
        self.lock().failing_updates = true;
    }

    pub(crate) fn make_unreadable(&self, name: &str) {
        self.lock().unreadable.insert(name.to_owned());
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.lock().get_calls
    }

    pub(crate) fn update_calls(&self) -> usize {
        self.lock().update_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<W>> {
        self.state.lock().expect("lock must not be poisoned")
    }
}

#[async_trait]
impl<W: Workload> WorkloadAccessor<W> for FakeAccessor<W> {
    async fn list(&self, namespace: &str) -> Result<Vec<W>, Error> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((object_namespace, _), _)| object_namespace == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<W, Error> {
        let mut state = self.lock();
        state.get_calls += 1;

        if state.unreadable.contains(name) {
            return Err(Error::Get {
                source: format!("{}s \"{name}\" is forbidden", W::KIND).into(),
            });
        }

        state
            .objects
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| Error::Get {
                source: format!("{}s \"{name}\" not found", W::KIND).into(),
            })
    }

    async fn update(&self, namespace: &str, workload: &W) -> Result<W, Error> {
        let mut state = self.lock();
        state.update_calls += 1;

        if state.failing_updates {
            return Err(Error::Update {
                source: "admission webhook denied the request".into(),
            });
        }

        let racing = state.pending_conflicts > 0;
        if racing {
            state.pending_conflicts -= 1;
        }

        let stored = state
            .objects
            .get_mut(&(namespace.to_owned(), workload.name_any()))
            .ok_or_else(|| Error::Update {
                source: "object not found".into(),
            })?;
        if racing {
            bump_resource_version(stored);
        }
        if stored.resource_version() != workload.resource_version() {
            return Err(Error::Conflict {
                source: "resource version mismatch".into(),
            });
        }

        let mut updated = workload.clone();
        bump_resource_version(&mut updated);
        *stored = updated.clone();

        Ok(updated)
    }
}

fn key<W: Workload>(object: &W) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

fn bump_resource_version<W: Workload>(object: &mut W) {
    let version = object
        .resource_version()
        .and_then(|version| version.parse::<u64>().ok())
        .unwrap_or_default();
    object.meta_mut().resource_version = Some((version + 1).to_string());
}
