use crate::domain::table::Table;

/// Leading `n` rows of every column, order and names kept.
///
/// Any `n` is accepted; `n >= rows` returns the full table.
pub fn preview(table: &Table, n: usize) -> Table {
    table.head(n)
}

/// Bounds a requested preview size to `[1, min(max_rows, row_count)]`.
///
/// A table without rows has nothing to preview, so the result is 0.
pub fn clamp_preview_rows(requested: usize, row_count: usize, max_rows: usize) -> usize {
    let upper = row_count.min(max_rows);
    if upper == 0 {
        return 0;
    }
    requested.clamp(1, upper)
}
