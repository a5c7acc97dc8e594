//! Selection model over the fetched verification list

use shared_types::{Verification, VerificationId};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<Verification>,
    selected: Option<VerificationId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first; entries with an unreadable timestamp go last
    pub fn entries(&self) -> &[Verification] {
        &self.entries
    }

    pub fn selected(&self) -> Option<&VerificationId> {
        self.selected.as_ref()
    }

    pub fn selected_entry(&self) -> Option<&Verification> {
        let id = self.selected.as_ref()?;
        self.get(id)
    }

    pub fn get(&self, id: &VerificationId) -> Option<&Verification> {
        self.entries.iter().find(|v| &v.id == id)
    }

    /// Replace the list after a fetch. A selection that disappeared is
    /// dropped; with nothing selected, the newest entry is picked.
    pub fn replace(&mut self, mut entries: Vec<Verification>) {
        entries.sort_by(|a, b| b.created_at_utc().cmp(&a.created_at_utc()));
        self.entries = entries;

        if let Some(id) = &self.selected {
            if self.get(id).is_none() {
                tracing::debug!("Selected verification {} no longer listed", id);
                self.selected = None;
            }
        }
        if self.selected.is_none() {
            self.selected = self.entries.first().map(|v| v.id.clone());
        }
    }

    /// Case-insensitive substring match on the name
    pub fn search(&self, query: &str) -> Vec<&Verification> {
        let query = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|v| query.is_empty() || v.name.to_lowercase().contains(&query))
            .collect()
    }

    /// Select `id`, or deselect it if it is already selected. Returns the
    /// new selection.
    pub fn toggle(&mut self, id: &VerificationId) -> Option<&VerificationId> {
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        } else if self.get(id).is_some() {
            self.selected = Some(id.clone());
        }
        self.selected.as_ref()
    }

    /// Forget a deleted entry, dropping the selection if it pointed there
    pub fn remove(&mut self, id: &VerificationId) {
        self.entries.retain(|v| &v.id != id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
    }
}
