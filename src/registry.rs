use dashmap::DashMap;

use crate::engine::Error;
use crate::model::{Table, TableId, TableShape};

/// Authoritative table metadata. State only; the engine journals every
/// mutation before applying it here.
pub struct TableRegistry {
    tables: DashMap<TableId, Table>,
    by_number: DashMap<String, TableId>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            by_number: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains_number(&self, number: &str) -> bool {
        self.by_number.contains_key(number)
    }

    pub fn get(&self, id: &TableId) -> Result<Table, Error> {
        self.tables
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(Error::TableNotFound(*id))
    }

    pub fn get_by_number(&self, number: &str) -> Option<Table> {
        let id = *self.by_number.get(number)?;
        self.tables.get(&id).map(|e| e.value().clone())
    }

    /// Active tables ordered by their human-facing number.
    pub fn active_tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self
            .tables
            .iter()
            .filter(|e| e.value().is_active)
            .map(|e| e.value().clone())
            .collect();
        tables.sort_by(|a, b| a.number.cmp(&b.number));
        tables
    }

    /// Every table, active or not, ordered by number (admin listings).
    pub fn all_tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.tables.iter().map(|e| e.value().clone()).collect();
        tables.sort_by(|a, b| a.number.cmp(&b.number));
        tables
    }

    pub fn apply_registered(&self, table: Table) {
        self.by_number.insert(table.number.clone(), table.id);
        self.tables.insert(table.id, table);
    }

    pub fn apply_updated(&self, id: TableId, name: Option<String>, seats: u32, shape: TableShape) {
        if let Some(mut entry) = self.tables.get_mut(&id) {
            let table = entry.value_mut();
            table.name = name;
            table.seats = seats;
            table.shape = shape;
        }
    }

    /// Visible to the availability resolver immediately. Existing bookings
    /// on the table are untouched.
    pub fn apply_active(&self, id: TableId, active: bool) {
        if let Some(mut entry) = self.tables.get_mut(&id) {
            entry.value_mut().is_active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn table(number: &str, seats: u32) -> Table {
        Table {
            id: Ulid::new(),
            number: number.into(),
            name: None,
            seats,
            shape: TableShape::Rectangle,
            is_active: true,
        }
    }

    #[test]
    fn get_unknown_table_fails() {
        let registry = TableRegistry::new();
        let id = Ulid::new();
        assert!(matches!(registry.get(&id), Err(Error::TableNotFound(e)) if e == id));
    }

    #[test]
    fn lookup_by_number() {
        let registry = TableRegistry::new();
        let t1 = table("T1", 4);
        registry.apply_registered(t1.clone());
        assert_eq!(registry.get_by_number("T1"), Some(t1));
        assert_eq!(registry.get_by_number("T9"), None);
        assert!(registry.contains_number("T1"));
    }

    #[test]
    fn active_tables_sorted_and_filtered() {
        let registry = TableRegistry::new();
        let t2 = table("T2", 2);
        let t1 = table("T1", 4);
        let t3 = table("T3", 6);
        registry.apply_registered(t2.clone());
        registry.apply_registered(t1.clone());
        registry.apply_registered(t3.clone());
        registry.apply_active(t2.id, false);

        let active = registry.active_tables();
        let numbers: Vec<_> = active.iter().map(|t| t.number.as_str()).collect();
        assert_eq!(numbers, vec!["T1", "T3"]);
        assert_eq!(registry.all_tables().len(), 3);
    }

    #[test]
    fn deactivation_round_trips() {
        let registry = TableRegistry::new();
        let t1 = table("T1", 4);
        registry.apply_registered(t1.clone());
        registry.apply_active(t1.id, false);
        assert!(!registry.get(&t1.id).unwrap().is_active);
        registry.apply_active(t1.id, true);
        assert!(registry.get(&t1.id).unwrap().is_active);
    }

    #[test]
    fn update_edits_metadata_only() {
        let registry = TableRegistry::new();
        let t1 = table("T1", 4);
        registry.apply_registered(t1.clone());
        registry.apply_updated(t1.id, Some("window booth".into()), 6, TableShape::Booth);
        let got = registry.get(&t1.id).unwrap();
        assert_eq!(got.seats, 6);
        assert_eq!(got.shape, TableShape::Booth);
        assert_eq!(got.number, "T1");
    }
}
