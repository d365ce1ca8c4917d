//! In-memory identity database for tests
//!
//! Paths still live on the real filesystem (under a temporary root), but
//! accounts and ownership are kept in memory so tests run unprivileged.
//! Every mutating call bumps a counter.

use anyhow::{Result, bail};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{GroupEntry, Host, Ownership, UserEntry, UserSpec};

#[derive(Debug, Default)]
struct State {
    groups: BTreeMap<String, GroupEntry>,
    users: BTreeMap<String, UserEntry>,
    owners: HashMap<PathBuf, Ownership>,
}

#[derive(Debug)]
pub struct MemoryHost {
    root: PathBuf,
    state: Mutex<State>,
    mutations: AtomicUsize,
}

impl MemoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Number of mutating calls so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_id(used: impl Iterator<Item = u32>) -> u32 {
        used.max().map_or(1000, |id| id + 1)
    }
}

impl Host for MemoryHost {
    fn root(&self) -> &Path {
        &self.root
    }

    fn group(&self, name: &str) -> Result<Option<GroupEntry>> {
        Ok(self.lock().groups.get(name).cloned())
    }

    fn user(&self, name: &str) -> Result<Option<UserEntry>> {
        Ok(self.lock().users.get(name).cloned())
    }

    fn create_group(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.groups.contains_key(name) {
            bail!("group '{name}' already exists");
        }
        let gid = Self::next_id(state.groups.values().map(|g| g.gid));
        state.groups.insert(
            name.to_string(),
            GroupEntry {
                name: name.to_string(),
                gid,
            },
        );
        drop(state);
        self.bump();
        Ok(())
    }

    fn create_user(&self, spec: &UserSpec) -> Result<()> {
        let mut state = self.lock();
        if state.users.contains_key(&spec.name) {
            bail!("user '{}' already exists", spec.name);
        }
        let Some(gid) = state.groups.get(&spec.group).map(|g| g.gid) else {
            bail!("group '{}' does not exist", spec.group);
        };
        let uid = Self::next_id(state.users.values().map(|u| u.uid));
        state.users.insert(
            spec.name.clone(),
            UserEntry {
                name: spec.name.clone(),
                uid,
                gid,
                home: spec.home.clone(),
                shell: spec.shell.clone(),
            },
        );

        if spec.manage_home {
            let home = crate::paths::rooted(&self.root, &spec.home);
            std::fs::create_dir_all(&home)?;
            state.owners.insert(home, Ownership { uid, gid });
        }
        drop(state);
        self.bump();
        Ok(())
    }

    fn modify_user(&self, spec: &UserSpec) -> Result<()> {
        let mut state = self.lock();
        let Some(gid) = state.groups.get(&spec.group).map(|g| g.gid) else {
            bail!("group '{}' does not exist", spec.group);
        };
        let Some(user) = state.users.get_mut(&spec.name) else {
            bail!("user '{}' does not exist", spec.name);
        };
        user.gid = gid;
        user.shell.clone_from(&spec.shell);
        user.home.clone_from(&spec.home);
        drop(state);
        self.bump();
        Ok(())
    }

    fn ownership(&self, path: &Path) -> Result<Ownership> {
        if std::fs::symlink_metadata(path).is_err() {
            bail!("{} does not exist", path.display());
        }
        Ok(self
            .lock()
            .owners
            .get(path)
            .copied()
            .unwrap_or(Ownership { uid: 0, gid: 0 }))
    }

    fn set_ownership(&self, path: &Path, owner: Ownership) -> Result<()> {
        self.lock().owners.insert(path.to_path_buf(), owner);
        self.bump();
        Ok(())
    }
}
