use std::ops::Index;
use std::rc::Rc;

use crate::column::Column;
use crate::value::Value;

/// Reshapes decoded values into the row handed out to the caller.
///
/// The hook receives the column descriptors and the decoded values in
/// column order and may reorder or rewrite them positionally.
pub type RowFactory = fn(&[Column], Vec<Value>) -> Row;

/// One decoded row of a result set.
///
/// Values sit in column order; the column descriptors are shared with
/// the cursor's `description`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Rc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    /// Assemble a row from its descriptors and values.
    #[must_use]
    pub fn new(columns: Rc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// The column descriptors for this row.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at the given column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// The value under the given column name, if any column matches.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|column| column.name == name)?;
        self.values.get(index)
    }

    /// Consume the row, yielding its values in column order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
