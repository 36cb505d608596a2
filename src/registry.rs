//! Process-wide registry of lazily initialised singletons.
//!
//! Initialisation code may run more than once per process (development
//! reloads, repeated bootstrap calls, serverless warm starts). Anything
//! that must exist at most once, such as the scheduler and the lookup
//! cache, is obtained through [`ProcessRegistry::get_or_init`] so that
//! re-running setup returns the existing instance instead of building a
//! second one.
//!
//! Slots are keyed by name alone. A name holds one value of one type;
//! asking for it as another type is a [`RegistryError::TypeMismatch`].

use once_cell::sync::OnceCell;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// The process-wide registry behind [`ProcessRegistry::global`].
///
/// This is the only global mutable state in the crate.
static GLOBAL_REGISTRY: OnceLock<ProcessRegistry> = OnceLock::new();

/// Registry misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The name is already claimed by a value of a different type.
    #[error("registry slot `{key}` holds a {held}, not a {requested}")]
    TypeMismatch {
        /// The contested slot name.
        key: String,
        /// Type already stored under `key`.
        held: &'static str,
        /// Type the caller asked for.
        requested: &'static str,
    },
}

/// One named slot: a cell for a single value type.
struct Slot {
    type_name: &'static str,
    cell: Arc<dyn Any + Send + Sync>,
    is_set: fn(&(dyn Any + Send + Sync)) -> bool,
}

impl Slot {
    fn new<T: Send + Sync + 'static>() -> Self {
        Self {
            type_name: type_name::<T>(),
            cell: Arc::new(OnceCell::<Arc<T>>::new()),
            is_set: |cell| {
                cell.downcast_ref::<OnceCell<Arc<T>>>()
                    .is_some_and(|cell| cell.get().is_some())
            },
        }
    }

    fn cell<T: Send + Sync + 'static>(&self) -> Option<Arc<OnceCell<Arc<T>>>> {
        Arc::clone(&self.cell).downcast::<OnceCell<Arc<T>>>().ok()
    }

    /// Nobody has initialised this slot and no caller is initialising it.
    fn is_vacant(&self) -> bool {
        Arc::strong_count(&self.cell) == 1 && !(self.is_set)(self.cell.as_ref())
    }
}

/// Named slots each holding at most one value for the lifetime of the registry.
#[derive(Default)]
pub struct ProcessRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.slots.lock().unwrap_or_else(|e| e.into_inner()).len();
        f.debug_struct("ProcessRegistry")
            .field("slots", &len)
            .finish()
    }
}

impl ProcessRegistry {
    /// Create an empty, isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ProcessRegistry {
        GLOBAL_REGISTRY.get_or_init(ProcessRegistry::new)
    }

    /// Return the value stored under `key`, creating it with `factory` if absent.
    ///
    /// `factory` runs at most once per successful initialisation: concurrent
    /// first callers block until the winner's factory returns, then all
    /// receive the same `Arc`. Factories for different keys run
    /// independently.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged. A failed factory leaves the
    /// slot empty, so a later call runs a factory again.
    ///
    /// Returns [`RegistryError::TypeMismatch`] (converted into `E`) when
    /// `key` is already claimed by another type; no factory runs.
    pub fn get_or_init<T, E, F>(&self, key: &str, factory: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: From<RegistryError>,
        F: FnOnce() -> Result<T, E>,
    {
        let cell = self.cell::<T>(key)?;
        let value = cell.get_or_try_init(|| {
            tracing::debug!(key, "initialising registry slot");
            factory().map(Arc::new)
        })?;
        Ok(Arc::clone(value))
    }

    /// [`get_or_init`](Self::get_or_init) with a factory that cannot fail.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TypeMismatch`] when `key` holds another type.
    pub fn get_or_init_with<T, F>(&self, key: &str, factory: F) -> Result<Arc<T>, RegistryError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.get_or_init(key, || Ok(factory()))
    }

    /// Return the value stored under `key`, if initialised as a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let cell = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.get(key)?.cell::<T>()
        }?;
        cell.get().cloned()
    }

    /// Returns `true` if `key` holds an initialised value of type `T`.
    pub fn contains<T: Send + Sync + 'static>(&self, key: &str) -> bool {
        self.get::<T>(key).is_some()
    }

    /// Find or create the (possibly empty) cell for `key`.
    ///
    /// The map lock is only held for the lookup, never while a factory runs.
    /// A slot of another type is only replaced while it is vacant, i.e. its
    /// last factory failed and nobody is retrying it.
    fn cell<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Arc<OnceCell<Arc<T>>>, RegistryError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(key.to_owned()).or_insert_with(Slot::new::<T>);
        if let Some(cell) = slot.cell::<T>() {
            return Ok(cell);
        }
        if !slot.is_vacant() {
            return Err(RegistryError::TypeMismatch {
                key: key.to_owned(),
                held: slot.type_name,
                requested: type_name::<T>(),
            });
        }
        *slot = Slot::new::<T>();
        slot.cell::<T>().ok_or_else(|| RegistryError::TypeMismatch {
            key: key.to_owned(),
            held: slot.type_name,
            requested: type_name::<T>(),
        })
    }
}
