use std::collections::BTreeMap;
use std::sync::Arc;

use benchdrive_api::{Db, Workload};

use crate::error::{DriverError, Result};

pub type DbFactory<P> = Arc<dyn Fn() -> Box<dyn Db<P>> + Send + Sync>;
pub type WorkloadFactory<P> = Arc<dyn Fn() -> Box<dyn Workload<P>> + Send + Sync>;

/// Named constructors for the database adapters and workloads a driver
/// can be pointed at.
pub struct Registry<P> {
    dbs: BTreeMap<String, DbFactory<P>>,
    workloads: BTreeMap<String, WorkloadFactory<P>>,
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self {
            dbs: BTreeMap::new(),
            workloads: BTreeMap::new(),
        }
    }
}

impl<P> Registry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_db<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Db<P>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("registered database {name}");
        self.dbs.insert(name, Arc::new(factory));
    }

    pub fn register_workload<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Workload<P>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("registered workload {name}");
        self.workloads.insert(name, Arc::new(factory));
    }

    pub fn create_db(&self, name: &str) -> Result<Box<dyn Db<P>>> {
        self.dbs
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DriverError::UnknownPlugin {
                kind: "database",
                name: name.to_string(),
                available: join_names(self.dbs.keys()),
            })
    }

    pub fn create_workload(&self, name: &str) -> Result<Box<dyn Workload<P>>> {
        self.workloads
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DriverError::UnknownPlugin {
                kind: "workload",
                name: name.to_string(),
                available: join_names(self.workloads.keys()),
            })
    }

    pub fn db_names(&self) -> impl Iterator<Item = &str> {
        self.dbs.keys().map(String::as_str)
    }

    pub fn workload_names(&self) -> impl Iterator<Item = &str> {
        self.workloads.keys().map(String::as_str)
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.map(String::as_str).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
