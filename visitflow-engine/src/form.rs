use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use visitflow_types::{FieldId, FieldMap, FieldValue};

/// In-progress values of a form being edited.
///
/// Shared between the presenting layer and the rule trigger; cloning yields
/// another handle to the same values. Every change is published on a watch
/// channel.
#[derive(Clone)]
pub struct LiveForm {
    values: Arc<Mutex<FieldMap>>,
    published: Arc<watch::Sender<FieldMap>>,
}

impl Default for LiveForm {
    fn default() -> Self {
        Self::new(FieldMap::new())
    }
}

impl LiveForm {
    #[must_use]
    pub fn new(initial: FieldMap) -> Self {
        let (tx, _) = watch::channel(initial.clone());
        Self {
            values: Arc::new(Mutex::new(initial)),
            published: Arc::new(tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FieldMap> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, values: &FieldMap) {
        self.published.send_replace(values.clone());
    }

    #[must_use]
    pub fn values(&self) -> FieldMap {
        self.lock().clone()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.lock().get(field).cloned()
    }

    /// Sets one field, as a user edit would.
    pub fn set(&self, field: impl Into<FieldId>, value: impl Into<FieldValue>) {
        let mut values = self.lock();
        values.insert(field.into(), value.into());
        self.publish(&values);
    }

    /// Overwrites the given fields.
    pub fn apply(&self, assignments: &FieldMap) {
        if assignments.is_empty() {
            return;
        }
        let mut values = self.lock();
        values.extend(assignments.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.publish(&values);
    }

    /// Removes a field's value. Returns whether it held a non-empty value.
    pub fn clear(&self, field: &str) -> bool {
        let mut values = self.lock();
        let had_value = values.remove(field).is_some_and(|v| !v.is_empty());
        if had_value {
            self.publish(&values);
        }
        had_value
    }

    /// Receiver of every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FieldMap> {
        self.published.subscribe()
    }
}
