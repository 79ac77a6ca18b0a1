/// An ordered list of entries that are unique by name.
///
/// Entries keep the position at which their name was first seen. `upsert`
/// lets a later layer replace an earlier value, `insert_absent` only fills in
/// names nobody claimed yet. Environment variables, volume mounts and volumes
/// are all merged through this type.
#[derive(Debug, Clone)]
pub struct NamedList<T> {
    entries: Vec<T>,
    name_of: fn(&T) -> &str,
}

impl<T> NamedList<T> {
    pub fn new(name_of: fn(&T) -> &str) -> Self {
        Self {
            entries: Vec::new(),
            name_of,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| (self.name_of)(e) == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert, replacing any existing entry with the same name in place.
    pub fn upsert(&mut self, entry: T) {
        match self.position((self.name_of)(&entry)) {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Insert only if no entry with the same name exists yet.
    pub fn insert_absent(&mut self, entry: T) {
        if !self.contains((self.name_of)(&entry)) {
            self.entries.push(entry);
        }
    }

    pub fn extend_upsert(&mut self, entries: impl IntoIterator<Item = T>) {
        for e in entries {
            self.upsert(e);
        }
    }

    pub fn extend_absent(&mut self, entries: impl IntoIterator<Item = T>) {
        for e in entries {
            self.insert_absent(e);
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }
}
