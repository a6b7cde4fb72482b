//! StaticLocator - 固定の host UI を返す locator
//!
//! CLI のデモとテストで使う。実ブラウザ側の locator は `LookupRules` を
//! DOM に当てるが、ここでは結果だけを直接登録する。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::{ComposeFields, ControlHandle, ControlId, ExtractionError};
use crate::ports::ElementLocator;

#[derive(Debug, Clone)]
struct Entry {
    handle: ControlHandle,
    fields: Result<Option<ComposeFields>, ExtractionError>,
}

#[derive(Debug, Default)]
pub struct StaticLocator {
    controls: Mutex<BTreeMap<ControlId, Entry>>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ControlId, Entry>> {
        self.controls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_control(&self, handle: ControlHandle, fields: ComposeFields) {
        self.lock().insert(
            handle.id.clone(),
            Entry {
                handle,
                fields: Ok(Some(fields)),
            },
        );
    }

    pub fn set_fields(&self, id: &ControlId, fields: ComposeFields) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.fields = Ok(Some(fields));
        }
    }

    /// Keep the control but report no surrounding compose surface.
    pub fn detach_fields(&self, id: &ControlId) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.fields = Ok(None);
        }
    }

    pub fn fail_control(&self, id: ControlId, err: ExtractionError) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.fields = Err(err);
        }
    }

    pub fn remove_control(&self, id: &ControlId) {
        self.lock().remove(id);
    }
}

impl ElementLocator for StaticLocator {
    fn send_controls(&self) -> Vec<ControlHandle> {
        self.lock().values().map(|e| e.handle.clone()).collect()
    }

    fn compose_fields(
        &self,
        control: &ControlHandle,
    ) -> Result<Option<ComposeFields>, ExtractionError> {
        match self.lock().get(&control.id) {
            Some(entry) => entry.fields.clone(),
            None => Err(ExtractionError::DetachedControl(control.id.to_string())),
        }
    }
}
