//! Owner entity lifecycle notifications.
//!
//! The application calls [`OwnerLifecycle::notify`] right after an owner row
//! (a user, a site, ...) has been committed. Handlers run synchronously, in
//! registration order, and the first error stops dispatch and is returned.

use crate::StorageError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerChange {
    Created,
    Updated,
    Deleted,
}

impl OwnerChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerChange::Created => "created",
            OwnerChange::Updated => "updated",
            OwnerChange::Deleted => "deleted",
        }
    }
}

impl fmt::Display for OwnerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEvent {
    pub entity_type: String,
    pub owner_id: i64,
    pub change: OwnerChange,
}

impl OwnerEvent {
    pub fn new(entity_type: impl Into<String>, owner_id: i64, change: OwnerChange) -> Self {
        Self {
            entity_type: entity_type.into(),
            owner_id,
            change,
        }
    }

    pub fn created(entity_type: impl Into<String>, owner_id: i64) -> Self {
        Self::new(entity_type, owner_id, OwnerChange::Created)
    }

    pub fn updated(entity_type: impl Into<String>, owner_id: i64) -> Self {
        Self::new(entity_type, owner_id, OwnerChange::Updated)
    }

    pub fn deleted(entity_type: impl Into<String>, owner_id: i64) -> Self {
        Self::new(entity_type, owner_id, OwnerChange::Deleted)
    }
}

pub trait OwnerEventHandler {
    fn handle(&self, event: &OwnerEvent) -> Result<(), StorageError>;
}

impl<F> OwnerEventHandler for F
where
    F: Fn(&OwnerEvent) -> Result<(), StorageError>,
{
    fn handle(&self, event: &OwnerEvent) -> Result<(), StorageError> {
        self(event)
    }
}

#[derive(Default)]
pub struct OwnerLifecycle<'a> {
    handlers: Vec<Box<dyn OwnerEventHandler + 'a>>,
}

impl<'a> OwnerLifecycle<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, handler: impl OwnerEventHandler + 'a) {
        self.handlers.push(Box::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn notify(&self, event: &OwnerEvent) -> Result<(), StorageError> {
        for handler in &self.handlers {
            handler.handle(event)?;
        }
        Ok(())
    }
}
