use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A phantom-tagged string id. Keeps e.g. a transaction id and a worker id
/// from being accidentally swapped at a call site even though both are
/// plain strings underneath.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[serde(transparent)]
pub struct Id<T> {
    id: String,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Id { id: id.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn generate() -> Self {
        Id::new(uuid::Uuid::new_v4().to_string())
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.rsplit("::").next().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");
        write!(f, "{}({:?})", display_name, self.id)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id: Id<T>) -> Self {
        id.id
    }
}

impl<T> From<String> for Id<T> {
    fn from(id: String) -> Self {
        Id::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTag;
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerTag;

pub type TransactionId = Id<TransactionTag>;
pub type VehicleId = Id<VehicleTag>;
pub type RequestId = Id<RequestTag>;
pub type WorkerId = Id<WorkerTag>;
