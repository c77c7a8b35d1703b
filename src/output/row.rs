use std::fmt::Display;

/// One result row: ordered column names with their values
///
/// Column order is preserved so the first row written to a new file decides
/// the CSV header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::set`]
    pub fn with(mut self, column: &str, value: impl Display) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, replacing its value if present or appending it otherwise
    pub fn set(&mut self, column: &str, value: impl Display) {
        let value = value.to_string();
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    /// Appends every column of `other`
    pub fn extend(&mut self, other: &Row) {
        for (column, value) in &other.cells {
            self.set(column, value);
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
